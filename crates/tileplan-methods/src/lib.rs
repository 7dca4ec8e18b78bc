#![forbid(unsafe_code)]
//! The tagged sum of on-tile compute methods and their applicability
//! predicates.
//!
//! Each method is a plain variant of `tileplan_core::ConvMethod` /
//! `SparseMethod` plus a small parameter tuple; dispatch is a `match`, not
//! runtime polymorphism.

pub mod conv;
pub mod sparse;

pub use conv::{enumerate_conv_methods, ConvMethodCandidate};
pub use sparse::{forward_candidate, grad_a_candidate, grad_w_candidate, SparseMethodCandidate};
