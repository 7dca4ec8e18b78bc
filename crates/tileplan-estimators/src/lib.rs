#![forbid(unsafe_code)]
//! Pure numerical cycle/temp-byte estimators for every supported vertex
//! variant, reduction, cast, exchange, and memset.
//!
//! Everything here is a deterministic function of small integer/boolean
//! arguments -- there is no I/O and no shared state -- so every estimator
//! is safe to memoise by argument tuple, which is exactly what
//! `tileplan-solver`'s `Model::call` does when a planner family hangs one
//! of these off a constraint variable.

pub mod conv;
pub mod consts;
pub mod exchange;
pub mod misc;
pub mod reduce;
pub mod sparse;
pub mod transform;
pub mod worker;

pub use conv::ConvCycleParams;
pub use reduce::{ReduceParams, ReduceStage};
