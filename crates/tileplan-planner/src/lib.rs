#![forbid(unsafe_code)]
//! Per-family constraint-model builders, search drivers, the
//! parameter-transform module, the plan-constraints interpreter, the
//! plan cache, and the multi-plan composer.
//!
//! This is the crate application code calls: each `plan_*` entry point
//! canonicalises its operator's parameters, searches the relevant
//! constraint-model space via `tileplan-solver`, and returns the cheapest
//! feasible plan plus its cost. [`cache::PlanCache`] memoises convolution
//! plans across calls, and [`multi_plan`] co-plans several convolutions
//! that share one device's tile budget.

pub mod cache;
mod constraints_tree;
pub mod conv;
pub mod ctc;
pub mod dither;
pub mod embedding;
pub mod error;
pub mod multi_plan;
pub mod pool;
pub mod sparse;
pub mod transform;

pub use cache::PlanCache;
pub use conv::plan_convolution;
pub use ctc::plan_ctc;
pub use embedding::plan_embedding;
pub use multi_plan::{compose_plans, plan_serial, ComposedPlan, OperatorRequest, DEFAULT_CYCLE_BACK_OFF};
pub use pool::plan_pool;
pub use sparse::plan_sparse;
