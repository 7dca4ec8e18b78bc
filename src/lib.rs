//! Facade crate re-exporting the `tileplan` workspace's public API in one
//! place, so an application can depend on `tileplan` alone rather than
//! naming each workspace member.

pub use tileplan_core as core;
pub use tileplan_estimators as estimators;
pub use tileplan_methods as methods;
pub use tileplan_planner as planner;
pub use tileplan_solver as solver;

pub use tileplan_core::prelude::*;
pub use tileplan_planner::{compose_plans, plan_convolution, plan_ctc, plan_embedding, plan_pool, plan_sparse, PlanCache};
