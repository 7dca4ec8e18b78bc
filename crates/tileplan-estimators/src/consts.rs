//! Empirical calibration constants for the cycle estimators.
//!
//! These are empirical calibrations whose exact derivation is not
//! documented upstream; the values are reproduced verbatim rather than
//! re-derived.

/// Fixed overhead per `HMAC` supervisor worker, independent of convolution
/// size.
pub const HMAC_WORKER_NONLOOP_OVERHEAD: u64 = 16;
/// Per-conv-size overhead added once per non-empty work item.
pub const HMAC_PER_CONV_SIZE_OVERHEAD: u64 = 19;
/// Overhead charged for a zero-length work item instead of the full
/// per-conv-size overhead.
pub const HMAC_ZERO_CONV_SIZE_OVERHEAD: u64 = 7;

pub fn conv_horizontal_mac_overhead(float_activations: bool) -> u64 {
    if float_activations {
        58
    } else {
        63
    }
}

pub const CONV_NX1_OVERHEAD: u64 = 101;

/// `(total, input-channel-related)` worker cycle savings from state
/// retention, for the 1x1 (AMP) vertex.
pub fn conv_1x1_worker_retention_savings(float_activations: bool, float_partials: bool) -> (u64, u64) {
    if !float_activations && float_partials {
        (10, 2)
    } else {
        (0, 0)
    }
}

pub fn convnx1_worker_retention_savings(_float_activations: bool, _float_partials: bool) -> u64 {
    4
}

pub fn zero_partials_retention_savings(float_partials: bool) -> u64 {
    if float_partials {
        9
    } else {
        10
    }
}

/// Fudge factor applied to input/output rearrangement transform cycles.
pub const TRANSFORM_FUDGE_REARRANGE: f64 = 5.0 / 4.0;
/// Fudge factor applied to regroup transform cycles.
pub const TRANSFORM_FUDGE_REGROUP: f64 = 5.0 / 3.0;

pub const AMP_SUPERVISOR_NONLOOP_OVERHEAD: u64 = 50;
pub const AMP_OUT_PASSES_OVERHEAD: u64 = 7;
pub const AMP_EXCESS_IN_CHAN_OVERHEAD: u64 = 1;
