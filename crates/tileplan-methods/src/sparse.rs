//! Sparse-dense matmul on-tile method candidates.

use tileplan_core::prelude::SparseMethod;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseMethodCandidate {
    pub method: SparseMethod,
    /// True when this method reuses the forward pass's buckets rather
    /// than computing its own.
    pub reuses_forward_buckets: bool,
}

/// The forward pass always has a `Forward` candidate.
pub fn forward_candidate() -> SparseMethodCandidate {
    SparseMethodCandidate {
        method: SparseMethod::Forward,
        reuses_forward_buckets: false,
    }
}

/// `GradA` is available whenever the caller has asked for it; it reuses
/// forward buckets transposed in place only when `shared_buckets` is set,
/// in which case it is realised as a `Transpose` rather than a fresh
/// `GradA` bucket sweep.
pub fn grad_a_candidate(do_grad_a_pass: bool, shared_buckets: bool) -> Option<SparseMethodCandidate> {
    if !do_grad_a_pass {
        return None;
    }
    if shared_buckets {
        Some(SparseMethodCandidate {
            method: SparseMethod::Transpose,
            reuses_forward_buckets: true,
        })
    } else {
        Some(SparseMethodCandidate {
            method: SparseMethod::GradA,
            reuses_forward_buckets: false,
        })
    }
}

/// `GradW` is available whenever the caller has asked for it.
pub fn grad_w_candidate(do_grad_w_pass: bool) -> Option<SparseMethodCandidate> {
    do_grad_w_pass.then_some(SparseMethodCandidate {
        method: SparseMethod::GradW,
        reuses_forward_buckets: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_buckets_turns_grad_a_into_transpose() {
        let c = grad_a_candidate(true, true).unwrap();
        assert_eq!(c.method, SparseMethod::Transpose);
        assert!(c.reuses_forward_buckets);
    }

    #[test]
    fn grad_a_disabled_yields_no_candidate() {
        assert!(grad_a_candidate(false, false).is_none());
    }
}
