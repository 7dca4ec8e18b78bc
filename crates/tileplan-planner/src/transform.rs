//! Parameter-transform module.
//!
//! Every transform here is a pure function from canonical parameters to
//! canonical parameters. The fixed composition order is:
//! add extra field dimensions → defer dilation on qualifying dimensions →
//! optionally swap operands → expand selected field dimensions into input
//! channels → flatten selected field dimensions into the batch or
//! output-channel axis → optionally combine convolution groups → pad to
//! grain sizes. The search driver enumerates *subsets* of the optional
//! steps rather than orderings.

use tileplan_core::prelude::{ConvParams, DimTransform};

/// `canDeferDilation(dim)`: true iff padding is zero, output stride is 1,
/// output truncation is zero, and the transformed kernel size is 1 in that
/// dimension.
pub fn can_defer_dilation(params: &ConvParams, dim: usize) -> bool {
    let it = &params.input_transform[dim];
    let ot = &params.output_transform[dim];
    let kt = &params.kernel_transform[dim];
    let transformed_kernel_size = params.kernel_shape[dim]
        .saturating_sub(kt.truncation_lower)
        .saturating_sub(kt.truncation_upper);
    it.padding_lower == 0
        && it.padding_upper == 0
        && ot.dilation <= 1
        && ot.truncation_lower == 0
        && ot.truncation_upper == 0
        && transformed_kernel_size == 1
}

/// `dimCanBeFlattened(dim)`: true iff the dimension carries no active
/// transform on any of its three transform roles.
pub fn dim_can_be_flattened(params: &ConvParams, dim: usize) -> bool {
    params.input_transform[dim].is_identity()
        && params.output_transform[dim].is_identity()
        && params.kernel_transform[dim].is_identity()
}

/// Adds a trailing singleton field dimension. Used to give the transform
/// pipeline a dimension to expand/flatten into when the operator as given
/// has none it can use.
pub fn add_extra_field_dim(params: &ConvParams) -> ConvParams {
    let mut p = params.clone();
    p.field_shape.push(1);
    p.kernel_shape.push(1);
    p.input_transform.push(DimTransform::identity());
    p.output_transform.push(DimTransform::identity());
    p.kernel_transform.push(DimTransform::identity());
    p
}

/// Defers the input dilation on every dimension satisfying
/// [`can_defer_dilation`] by moving it into the output-transform stride,
/// which later cost estimation treats identically but which avoids an
/// explicit input-side rearrangement.
pub fn defer_dilation(params: &ConvParams) -> ConvParams {
    let mut p = params.clone();
    for dim in 0..p.num_field_dims() {
        if can_defer_dilation(params, dim) && p.input_transform[dim].dilation > 1 {
            let dilation = p.input_transform[dim].dilation;
            p.output_transform[dim].dilation = dilation;
            p.input_transform[dim].dilation = 1;
        }
    }
    p
}

/// Swaps the input-channel and output-channel roles of the operator: the
/// activations become the weights and vice versa. Used by the
/// fully-connected joint plan, whose first transform always has
/// `swapOperands = true`.
pub fn swap_operands(params: &ConvParams) -> ConvParams {
    let mut p = params.clone();
    std::mem::swap(&mut p.in_chans_per_group, &mut p.out_chans_per_group);
    p
}

/// Swaps the batch and input-channel axes: used by the weight-update
/// sub-model of a fully-connected joint plan, which contracts over the
/// batch axis instead of the input-channel axis.
pub fn swap_batch_and_in_chans(params: &ConvParams) -> ConvParams {
    let mut p = params.clone();
    std::mem::swap(&mut p.batch_size, &mut p.in_chans_per_group);
    p
}

/// Expands field dimension `dim` into the input-channel axis: input size
/// becomes output size, input channels multiply by the truncated kernel
/// size, kernel size collapses to 1, and the dimension's transforms reset
/// to identity.
pub fn expand_dim(params: &ConvParams, dim: usize) -> ConvParams {
    let mut p = params.clone();
    let kt = &params.kernel_transform[dim];
    let truncated_kernel = params.kernel_shape[dim]
        .saturating_sub(kt.truncation_lower)
        .saturating_sub(kt.truncation_upper)
        .max(1);
    p.field_shape[dim] = params.output_size(dim);
    p.in_chans_per_group *= truncated_kernel;
    p.kernel_shape[dim] = 1;
    p.input_transform[dim] = DimTransform::identity();
    p.output_transform[dim] = DimTransform::identity();
    p.kernel_transform[dim] = DimTransform::identity();
    p
}

/// Flattens field dimension `dim` into the output-channel axis: output
/// channels multiply by the dimension's output size, and that output size
/// collapses to 1. Requires [`dim_can_be_flattened`].
pub fn flatten_dim_into_out_chans(params: &ConvParams, dim: usize) -> ConvParams {
    let mut p = params.clone();
    let out_size = params.output_size(dim);
    p.out_chans_per_group *= out_size.max(1);
    p.field_shape[dim] = 1;
    p.kernel_shape[dim] = 1;
    p
}

/// Combines convolution groups by factor `f`: the number of groups divides
/// by `f` (rounded up), and input/output channels per group multiply by
/// `f`.
pub fn combine_conv_groups(params: &ConvParams, f: u64) -> ConvParams {
    let f = f.max(1);
    let mut p = params.clone();
    p.num_conv_groups = p.num_conv_groups.div_ceil(f);
    p.in_chans_per_group *= f;
    p.out_chans_per_group *= f;
    p
}

/// Pads input/output channel counts up to the grain sizes a chosen method
/// requires. Padding is represented as extra (zero-valued, at code-gen
/// time) channels; the planner only needs the padded counts to cost
/// exchange/compute correctly.
pub fn pad_to_grain(params: &ConvParams, in_chan_grain: u64, out_chan_grain: u64) -> ConvParams {
    let mut p = params.clone();
    if in_chan_grain > 0 {
        p.in_chans_per_group = p.in_chans_per_group.div_ceil(in_chan_grain) * in_chan_grain;
    }
    if out_chan_grain > 0 {
        p.out_chans_per_group = p.out_chans_per_group.div_ceil(out_chan_grain) * out_chan_grain;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileplan_core::prelude::NumType;

    fn base() -> ConvParams {
        ConvParams {
            input_type: NumType::Half,
            output_type: NumType::Half,
            batch_size: 4,
            num_conv_groups: 2,
            in_chans_per_group: 8,
            out_chans_per_group: 8,
            field_shape: vec![4],
            kernel_shape: vec![3],
            input_transform: vec![DimTransform::identity()],
            output_transform: vec![DimTransform::identity()],
            kernel_transform: vec![DimTransform::identity()],
        }
    }

    #[test]
    fn swap_operands_is_its_own_inverse() {
        let p = base();
        let swapped = swap_operands(&p);
        let back = swap_operands(&swapped);
        assert_eq!(back.in_chans_per_group, p.in_chans_per_group);
        assert_eq!(back.out_chans_per_group, p.out_chans_per_group);
    }

    #[test]
    fn swap_batch_and_in_chans_is_its_own_inverse() {
        let p = base();
        let swapped = swap_batch_and_in_chans(&p);
        let back = swap_batch_and_in_chans(&swapped);
        assert_eq!(back.batch_size, p.batch_size);
        assert_eq!(back.in_chans_per_group, p.in_chans_per_group);
    }

    #[test]
    fn combine_conv_groups_preserves_total_channel_volume_direction() {
        let p = base();
        let combined = combine_conv_groups(&p, 2);
        assert_eq!(combined.num_conv_groups, 1);
        assert_eq!(combined.in_chans_per_group, 16);
        assert_eq!(combined.out_chans_per_group, 16);
    }

    #[test]
    fn expand_dim_collapses_kernel_to_one() {
        let p = base();
        let expanded = expand_dim(&p, 0);
        assert_eq!(expanded.kernel_shape[0], 1);
        assert_eq!(expanded.in_chans_per_group, p.in_chans_per_group * 3);
    }

    #[test]
    fn dim_can_be_flattened_is_false_once_a_transform_is_active() {
        let mut p = base();
        assert!(dim_can_be_flattened(&p, 0));
        p.input_transform[0].padding_lower = 1;
        assert!(!dim_can_be_flattened(&p, 0));
    }

    #[test]
    fn can_defer_dilation_requires_unit_kernel_and_no_padding() {
        let mut p = base();
        p.kernel_shape[0] = 1;
        p.input_transform[0].dilation = 2;
        assert!(can_defer_dilation(&p, 0));
        p.input_transform[0].padding_lower = 1;
        assert!(!can_defer_dilation(&p, 0));
    }
}
