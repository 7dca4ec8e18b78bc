//! Per-vertex cycle estimators for the convolution compute methods
//!. Every function here is a pure, non-negative
//! `u64` computed from small integer/boolean inputs; callers are expected
//! to memoise through [`tileplan_solver::Model::call`] rather than here.

use crate::worker::supervisor_cycles;
use crate::{consts, reduce::dense_dot_product_cycles};

/// Common shape description threaded through every convolution vertex
/// estimator.
#[derive(Debug, Clone)]
pub struct ConvCycleParams {
    pub batch_elements: u64,
    pub output_field_shape: Vec<u64>,
    pub kernel_shape: Vec<u64>,
    pub in_chans_per_group: u64,
    pub out_chans_per_group: u64,
    pub num_conv_units: u32,
    pub input_load_elems_per_cycle: u32,
    pub coeff_load_bytes_per_cycle: u32,
    pub num_worker_contexts: u32,
    pub float_activations: bool,
    pub float_partials: bool,
    pub input_dilation: Vec<u64>,
    pub stride: Vec<u64>,
    pub kernel_height: Option<u32>,
    pub window_width: Option<u32>,
}

impl ConvCycleParams {
    fn output_elements(&self) -> u64 {
        self.batch_elements * self.output_field_shape.iter().product::<u64>()
    }

    fn kernel_elements(&self) -> u64 {
        self.kernel_shape.iter().product::<u64>().max(1)
    }
}

/// AMP (matrix-multiply engine) 1x1 inner loop, with or without zeroing the
/// accumulator before the first partial is written.
pub fn amp_1x1_cycles(p: &ConvCycleParams, output_zeroing: bool) -> u64 {
    let mut core_cycles = if p.float_activations { 8 } else { 4 };
    if p.num_conv_units == 4 {
        core_cycles /= 2;
    }
    let (retention_total, _retention_in_chan) =
        consts::conv_1x1_worker_retention_savings(p.float_activations, p.float_partials);
    let zero_per_group = if p.float_partials { 4 } else { 2 };

    let per_worker = |n: u64| -> u64 {
        if n == 0 {
            match (p.float_activations, p.float_partials, output_zeroing) {
                (true, _, _) => 24,
                (false, true, true) => 22,
                (false, true, false) => 25,
                (false, false, true) => 20,
                (false, false, false) => 23,
            }
        } else {
            let zero_cycles = if output_zeroing { zero_per_group * n } else { 0 };
            5 + n * core_cycles + zero_cycles
        }
    };

    let inner = supervisor_cycles(p.output_elements(), p.num_worker_contexts, per_worker);
    let savings = retention_total * p.num_worker_contexts as u64;
    consts::AMP_SUPERVISOR_NONLOOP_OVERHEAD + inner.saturating_sub(savings)
}

/// AMP outer loop over input-channel and output-channel passes, wrapping
/// [`amp_1x1_cycles`] per pass.
pub fn amp_1x1_outer_loop_cycles(
    p: &ConvCycleParams,
    num_in_chan_passes: u64,
    num_out_chan_passes: u64,
) -> u64 {
    let inner = amp_1x1_cycles(p, true);
    let num_loads = (p.in_chans_per_group as u64).div_ceil(p.input_load_elems_per_cycle.max(1) as u64);
    consts::AMP_SUPERVISOR_NONLOOP_OVERHEAD
        + num_in_chan_passes
            * (15
                + consts::AMP_EXCESS_IN_CHAN_OVERHEAD
                + num_out_chan_passes
                    * (10
                        + consts::AMP_EXCESS_IN_CHAN_OVERHEAD
                        + 19
                        + num_loads
                        + inner))
}

/// AMP with kernel size > 1 (the "nx1" vertex): the 1x1 inner loop plus a
/// fixed per-kernel-position overhead, repeated per kernel element.
pub fn amp_nx1_cycles(p: &ConvCycleParams) -> u64 {
    let retention = consts::convnx1_worker_retention_savings(p.float_activations, p.float_partials);
    let zero_savings = consts::zero_partials_retention_savings(p.float_partials);
    let inner = amp_1x1_cycles(p, false) * p.kernel_elements();
    consts::CONV_NX1_OVERHEAD
        + inner.saturating_sub(retention * p.num_worker_contexts as u64)
        + p.num_worker_contexts as u64 * zero_savings
}

/// Horizontal MAC / HMAC: one multiply-accumulate lane per output channel
/// pair, looping over kernel positions.
pub fn horizontal_mac_cycles(p: &ConvCycleParams) -> u64 {
    let out_chans_per_group = if p.float_partials {
        p.out_chans_per_group
    } else {
        p.out_chans_per_group / 2
    };
    let dot_product = dense_dot_product_cycles(p.float_activations, p.float_partials, p.in_chans_per_group);
    let kernel_elems = p.kernel_elements();

    let per_worker = |n: u64| -> u64 {
        if n == 0 {
            consts::HMAC_ZERO_CONV_SIZE_OVERHEAD
        } else {
            kernel_elems
                * (consts::HMAC_PER_CONV_SIZE_OVERHEAD
                    + n * (7 + out_chans_per_group * dot_product))
        }
    };
    let inner = supervisor_cycles(p.output_elements(), p.num_worker_contexts, per_worker)
        + consts::HMAC_WORKER_NONLOOP_OVERHEAD * p.num_worker_contexts as u64;
    consts::conv_horizontal_mac_overhead(p.float_activations) + inner
}

/// SLIC (sliding convolution): a fixed 4-wide kernel window evaluated by a
/// dedicated engine with an implicit-zero fast path.
pub fn slic_cycles(p: &ConvCycleParams, implicit_zero: bool, outer_loop: bool) -> u64 {
    let window_width = p.window_width.unwrap_or(4) as u64;
    let per_element = if implicit_zero { 2 } else { 3 };
    let base = supervisor_cycles(p.output_elements(), p.num_worker_contexts, |n| {
        n * per_element * window_width + 6
    });
    let outer_overhead = if outer_loop { 20 } else { 0 };
    base + outer_overhead + 12
}

/// VMAC (vertical MAC): lanes run across convolution groups rather than
/// channels; cost is dominated by the per-group dot product.
pub fn vmac_cycles(p: &ConvCycleParams, conv_groups_per_group: u64) -> u64 {
    let dot_product = dense_dot_product_cycles(p.float_activations, p.float_partials, p.in_chans_per_group);
    supervisor_cycles(p.output_elements(), p.num_worker_contexts, |n| {
        n * conv_groups_per_group * (dot_product + 4) + 10
    })
}

/// Outer-product vertex: each worker handles a contiguous span of the
/// output field with a single input channel and an all-ones kernel.
pub fn outer_product_cycles(float_activations: bool, width: u64, num_worker_contexts: u32) -> u64 {
    let vector_width: u64 = if float_activations { 2 } else { 4 };
    let per_worker = |n: u64| -> u64 { n.div_ceil(vector_width) + 7 };
    supervisor_cycles(width, num_worker_contexts, per_worker) + 6
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConvCycleParams {
        ConvCycleParams {
            batch_elements: 1,
            output_field_shape: vec![4, 4],
            kernel_shape: vec![3, 3],
            in_chans_per_group: 16,
            out_chans_per_group: 16,
            num_conv_units: 8,
            input_load_elems_per_cycle: 4,
            coeff_load_bytes_per_cycle: 8,
            num_worker_contexts: 6,
            float_activations: false,
            float_partials: false,
            input_dilation: vec![1, 1],
            stride: vec![1, 1],
            kernel_height: None,
            window_width: None,
        }
    }

    #[test]
    fn amp_1x1_cycles_are_positive_and_finite() {
        let p = params();
        assert!(amp_1x1_cycles(&p, true) > 0);
        assert!(amp_1x1_cycles(&p, false) > 0);
    }

    #[test]
    fn zero_output_field_costs_zero_supervisor_cycles_for_the_loop_body() {
        let mut p = params();
        p.output_field_shape = vec![0, 4];
        // output_elements() is 0, so the per-worker closure always sees n=0.
        assert_eq!(p.output_elements(), 0);
    }

    #[test]
    fn outer_product_scales_with_width() {
        let narrow = outer_product_cycles(false, 8, 6);
        let wide = outer_product_cycles(false, 800, 6);
        assert!(wide > narrow);
    }

    #[test]
    fn slic_implicit_zero_is_cheaper_than_explicit() {
        let p = params();
        let implicit = slic_cycles(&p, true, false);
        let explicit = slic_cycles(&p, false, false);
        assert!(implicit <= explicit);
    }
}
