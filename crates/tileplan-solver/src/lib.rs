#![forbid(unsafe_code)]
//! A small mixed-integer constraint model and branch-and-bound scheduler.
//!
//! This is the workhorse every `tileplan-planner` family builds its search
//! space on top of: a [`Model`] of [`Variable`]s with bounded integer
//! [`Domain`]s, a closed set of arithmetic and comparison constraints
//! between them, and a [`Scheduler`] that finds an assignment minimising a
//! tuple of objective variables in lexicographic order, pruning the search
//! as soon as a branch's partial lower bound can no longer beat the best
//! solution found so far.
//!
//! Modelled on the public interface of popsolver's `Model`: variables are
//! created top-down from constants and domain bounds, derived variables
//! are introduced via builder methods (`product`, `sum`, `floordiv`, ...),
//! and an expensive per-candidate cost is attached through [`Model::call`]
//! rather than recomputed eagerly for every domain value.

mod call;
mod constraint;
mod domain;
mod model;
mod scheduler;
mod solution;
mod value;
mod variable;

pub use call::Memo;
pub use constraint::ConstraintKind;
pub use domain::Domain;
pub use model::{Infeasible, Model};
pub use scheduler::Scheduler;
pub use solution::Solution;
pub use value::Value;
pub use variable::Variable;
