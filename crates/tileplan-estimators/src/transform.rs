//! Rearrange/transform and tile-level-transform cycle estimators:
//! rearrange-input, rearrange-weights, rearrange-output,
//! regroup-output, regroup-weights, each moving some byte count at the
//! `memcpyBytesPerCycle` rate with a fixed fudge factor.

use crate::consts::{TRANSFORM_FUDGE_REARRANGE, TRANSFORM_FUDGE_REGROUP};

/// A plain rearrangement (copy with a stride/layout change), at the
/// `5/4` fudge factor.
pub fn rearrange_cycles(bytes: u64, memcpy_bytes_per_cycle: f64) -> u64 {
    let rate = memcpy_bytes_per_cycle.max(1e-6);
    ((bytes as f64) * TRANSFORM_FUDGE_REARRANGE / rate).ceil() as u64
}

/// A regroup (change of vectorisation grouping), at the `5/3` fudge
/// factor -- regrouping touches more cache lines per byte moved than a
/// straight rearrange.
pub fn regroup_cycles(bytes: u64, memcpy_bytes_per_cycle: f64) -> u64 {
    let rate = memcpy_bytes_per_cycle.max(1e-6);
    ((bytes as f64) * TRANSFORM_FUDGE_REGROUP / rate).ceil() as u64
}

/// Sum of the five named transform sub-costs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformByteCounts {
    pub rearrange_input_bytes: u64,
    pub rearrange_weights_bytes: u64,
    pub rearrange_output_bytes: u64,
    pub regroup_output_bytes: u64,
    pub regroup_weights_bytes: u64,
}

pub fn transform_cycles(counts: &TransformByteCounts, memcpy_bytes_per_cycle: f64) -> u64 {
    rearrange_cycles(counts.rearrange_input_bytes, memcpy_bytes_per_cycle)
        + rearrange_cycles(counts.rearrange_weights_bytes, memcpy_bytes_per_cycle)
        + rearrange_cycles(counts.rearrange_output_bytes, memcpy_bytes_per_cycle)
        + regroup_cycles(counts.regroup_output_bytes, memcpy_bytes_per_cycle)
        + regroup_cycles(counts.regroup_weights_bytes, memcpy_bytes_per_cycle)
}

/// Cycles to broadcast a zero constant over `padding_elements` input
/// channels for AMP/SLIC input-channel padding.
pub fn tile_level_zero_pad_cycles(padding_elements: u64, vector_width: u32) -> u64 {
    if padding_elements == 0 {
        return 0;
    }
    padding_elements.div_ceil(vector_width.max(1) as u64) + 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regroup_is_more_expensive_than_rearrange_for_the_same_bytes() {
        let bytes = 4096;
        let rate = 8.0;
        assert!(regroup_cycles(bytes, rate) > rearrange_cycles(bytes, rate));
    }

    #[test]
    fn zero_padding_is_free_when_no_padding() {
        assert_eq!(tile_level_zero_pad_cycles(0, 8), 0);
    }
}
