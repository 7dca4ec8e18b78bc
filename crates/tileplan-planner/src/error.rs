//! Planner-level error type, layered on `tileplan_core::Error`.

pub use tileplan_core::{Error, Result};
