//! Convolution method candidates and their applicability predicates.

use tileplan_core::prelude::{ConvMethod, ConvParams, NumType, Pass, TargetDescriptor};

/// A fully-specified method candidate: the method tag plus the
/// grouping/type scalars that go along with it once chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvMethodCandidate {
    pub method: ConvMethod,
    pub conv_groups_per_group: u64,
    pub in_chans_per_group_grain: u64,
    pub partial_chans_per_group: u64,
    pub slic_window_width: Option<u32>,
}

fn kernel_is_all_ones(params: &ConvParams) -> bool {
    params.kernel_shape.iter().all(|&k| k == 1)
}

fn no_flip(transforms: &[tileplan_core::prelude::DimTransform]) -> bool {
    transforms.iter().all(|t| !t.flip)
}

/// AMP: matrix-multiply engines. Requires engines for the (activation,
/// partial) type pair, `weightsPerConvUnit` divisible by `inChansPerGroup`,
/// `outChansPerGroup` divisible by the required engine count, and a
/// single convolution group per group.
pub fn amp_applicable(
    params: &ConvParams,
    target: &TargetDescriptor,
    partials_type: NumType,
) -> Option<ConvMethodCandidate> {
    let engines = target.conv_units(params.input_type, partials_type);
    if engines == 0 {
        return None;
    }
    let weights_per_unit = target.weights_per_conv_unit(params.input_type) as u64;
    if weights_per_unit == 0 || weights_per_unit % params.in_chans_per_group != 0 {
        return None;
    }
    if params.out_chans_per_group % engines as u64 != 0 {
        return None;
    }
    Some(ConvMethodCandidate {
        method: ConvMethod::Amp,
        conv_groups_per_group: 1,
        in_chans_per_group_grain: weights_per_unit / (weights_per_unit / params.in_chans_per_group).max(1),
        partial_chans_per_group: engines as u64,
        slic_window_width: None,
    })
}

/// SLIC: sliding convolution. Half activations only; no per-dimension flip
/// or kernel dilation/padding; innermost output stride <= 2; fixed
/// 4-element kernel window; not usable in a joint fully-connected plan.
pub fn slic_applicable(params: &ConvParams, pass: Pass) -> Vec<ConvMethodCandidate> {
    if pass.is_fully_connected() {
        return Vec::new();
    }
    if params.input_type != NumType::Half {
        return Vec::new();
    }
    if !no_flip(&params.kernel_transform) || !no_flip(&params.input_transform) {
        return Vec::new();
    }
    let kernel_dilation_or_pad = params
        .kernel_transform
        .iter()
        .any(|t| t.dilation > 1 || t.padding_lower > 0 || t.padding_upper > 0);
    if kernel_dilation_or_pad {
        return Vec::new();
    }
    let Some(innermost) = params.output_transform.last() else {
        return Vec::new();
    };
    if innermost.dilation > 2 {
        return Vec::new();
    }
    let window_ok = params.kernel_shape.last().copied() == Some(4);
    if !window_ok {
        return Vec::new();
    }
    // Supported conv-groups x channels groupings: {1x4, 2x2, 4x1}.
    [(1u64, 4u64), (2, 2), (4, 1)]
        .into_iter()
        .map(|(groups, chans)| ConvMethodCandidate {
            method: ConvMethod::Slic,
            conv_groups_per_group: groups,
            in_chans_per_group_grain: chans,
            partial_chans_per_group: chans,
            slic_window_width: Some(4),
        })
        .collect()
}

/// MAC / HMAC (horizontal MAC): grain size 1 for float activations, 2 for
/// half; partial-chans-per-group 1 for float partials, 2 for half.
pub fn mac_applicable(params: &ConvParams, partials_type: NumType, use_hmac: bool) -> ConvMethodCandidate {
    let grain = if params.input_type == NumType::Float { 1 } else { 2 };
    let partial_chans_per_group = if partials_type == NumType::Float { 1 } else { 2 };
    ConvMethodCandidate {
        method: if use_hmac { ConvMethod::Hmac } else { ConvMethod::Mac },
        conv_groups_per_group: 1,
        in_chans_per_group_grain: grain,
        partial_chans_per_group,
        slic_window_width: None,
    }
}

/// VMAC (vertical MAC): half activations, 2-byte input type; innermost
/// grouping is over convolution groups, candidate widths given by halving
/// the hardware vector width down to a 64-bit floor.
pub fn vmac_applicable(params: &ConvParams, target: &TargetDescriptor) -> Vec<ConvMethodCandidate> {
    if params.input_type != NumType::Half {
        return Vec::new();
    }
    if target.type_size(params.input_type) != 2 {
        return Vec::new();
    }
    let vector_width = target.vector_width_for(params.input_type) as u64;
    let floor_elems = 64 / (target.type_size(params.input_type) as u64 * 8);
    let mut width = vector_width.max(1);
    let mut candidates = Vec::new();
    while width >= floor_elems.max(1) {
        candidates.push(ConvMethodCandidate {
            method: ConvMethod::Vmac,
            conv_groups_per_group: width,
            in_chans_per_group_grain: 1,
            partial_chans_per_group: 1,
            slic_window_width: None,
        });
        if width == floor_elems.max(1) {
            break;
        }
        width /= 2;
    }
    candidates
}

/// OuterProduct: one input channel; batch == 1 on the tile (enforced in
/// the constraint model, not checked statically here); all-ones kernel;
/// no input dilation/flip; no output stride.
pub fn outer_product_applicable(params: &ConvParams) -> Option<ConvMethodCandidate> {
    if params.in_chans_per_group != 1 {
        return None;
    }
    if !kernel_is_all_ones(params) {
        return None;
    }
    if !no_flip(&params.input_transform) {
        return None;
    }
    if params.input_transform.iter().any(|t| t.dilation > 1) {
        return None;
    }
    if params.output_transform.iter().any(|t| t.dilation > 1) {
        return None;
    }
    Some(ConvMethodCandidate {
        method: ConvMethod::OuterProduct,
        conv_groups_per_group: 1,
        in_chans_per_group_grain: 1,
        partial_chans_per_group: 1,
        slic_window_width: None,
    })
}

/// Produces the ordered candidate sequence for a convolution, most-likely-
/// best first so the solver's incremental best-cost pruning is tightest
/// earliest. AMP leads when applicable (it is almost
/// always fastest when engines are available), followed by SLIC, VMAC,
/// HMAC/MAC, and finally OuterProduct.
pub fn enumerate_conv_methods(
    params: &ConvParams,
    target: &TargetDescriptor,
    partials_type: NumType,
    pass: Pass,
) -> Vec<ConvMethodCandidate> {
    let mut out = Vec::new();
    out.extend(amp_applicable(params, target, partials_type));
    out.extend(slic_applicable(params, pass));
    out.extend(vmac_applicable(params, target));
    out.push(mac_applicable(params, partials_type, true));
    out.push(mac_applicable(params, partials_type, false));
    out.extend(outer_product_applicable(params));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileplan_core::prelude::DimTransform;

    fn conv_params() -> ConvParams {
        ConvParams {
            input_type: NumType::Half,
            output_type: NumType::Half,
            batch_size: 1,
            num_conv_groups: 1,
            in_chans_per_group: 16,
            out_chans_per_group: 16,
            field_shape: vec![4, 4],
            kernel_shape: vec![3, 3],
            input_transform: vec![DimTransform::identity(); 2],
            output_transform: vec![DimTransform::identity(); 2],
            kernel_transform: vec![DimTransform::identity(); 2],
        }
    }

    #[test]
    fn amp_is_applicable_with_a_reference_target() {
        let params = conv_params();
        let target = TargetDescriptor::reference_ipu(1216, 1);
        assert!(amp_applicable(&params, &target, NumType::Half).is_some());
    }

    #[test]
    fn outer_product_requires_all_ones_kernel_and_one_input_channel() {
        let mut params = conv_params();
        params.kernel_shape = vec![1, 1];
        params.in_chans_per_group = 1;
        assert!(outer_product_applicable(&params).is_some());

        params.in_chans_per_group = 2;
        assert!(outer_product_applicable(&params).is_none());
    }

    #[test]
    fn slic_requires_half_precision_and_window_width_four() {
        let mut params = conv_params();
        params.kernel_shape = vec![1, 4];
        let candidates = slic_applicable(&params, Pass::InferenceFwd);
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.slic_window_width == Some(4)));

        params.input_type = NumType::Float;
        assert!(slic_applicable(&params, Pass::InferenceFwd).is_empty());
    }

    #[test]
    fn slic_is_disallowed_in_joint_fc_plans() {
        let mut params = conv_params();
        params.kernel_shape = vec![1, 4];
        assert!(slic_applicable(&params, Pass::FcTrainingFwd).is_empty());
    }

    #[test]
    fn enumerate_conv_methods_is_non_empty_for_a_representative_operator() {
        let params = conv_params();
        let target = TargetDescriptor::reference_ipu(1216, 1);
        let candidates = enumerate_conv_methods(&params, &target, NumType::Half, Pass::InferenceFwd);
        assert!(!candidates.is_empty());
        // AMP is the heuristic first choice when applicable.
        assert_eq!(candidates[0].method, ConvMethod::Amp);
    }
}
