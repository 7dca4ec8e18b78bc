//! Deterministic start-tile dithering.
//!
//! The starting tile for a convolution is a deterministic hash of a
//! pass-oblivious subset of the parameters, folded into a span aligned to
//! the shared-exchange-bus width. A direction flag is chosen by the low
//! bit of the hash. This choice is orthogonal to planning and must not
//! affect plan selection -- it is computed after the cheapest plan has
//! already been chosen.

use tileplan_core::hash::{hash_serde, Hash256};
use tileplan_core::prelude::ConvParams;

/// The subset of an operator's parameters that participates in dithering.
/// Deliberately excludes anything pass-specific.
#[derive(serde::Serialize)]
struct DitherKey<'a> {
    input_type: tileplan_core::prelude::NumType,
    num_conv_groups: u64,
    in_chans_per_group: u64,
    out_chans_per_group: u64,
    field_shape: &'a [u64],
    kernel_shape: &'a [u64],
}

pub struct Dither {
    pub start_tile: u64,
    pub ascending: bool,
}

/// Folds a blake3 hash of `params` into a tile span of width
/// `shared_bus_width` within `total_tiles`, with the direction flag taken
/// from the hash's low bit.
pub fn dither_start_tile(params: &ConvParams, total_tiles: u64, shared_bus_width: u64) -> Dither {
    if total_tiles == 0 {
        return Dither {
            start_tile: 0,
            ascending: true,
        };
    }
    let key = DitherKey {
        input_type: params.input_type,
        num_conv_groups: params.num_conv_groups,
        in_chans_per_group: params.in_chans_per_group,
        out_chans_per_group: params.out_chans_per_group,
        field_shape: &params.field_shape,
        kernel_shape: &params.kernel_shape,
    };
    let hash: Hash256 = hash_serde(&key).unwrap_or(Hash256([0; 32]));
    let width = shared_bus_width.max(1).min(total_tiles);
    let num_spans = (total_tiles / width).max(1);
    let (span, ascending) = hash.fold_into_span(num_spans);
    Dither {
        start_tile: span * width,
        ascending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileplan_core::prelude::{DimTransform, NumType};

    fn params() -> ConvParams {
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
    fn dithering_is_deterministic() {
        let p = params();
        let a = dither_start_tile(&p, 1216, 4);
        let b = dither_start_tile(&p, 1216, 4);
        assert_eq!(a.start_tile, b.start_tile);
        assert_eq!(a.ascending, b.ascending);
    }

    #[test]
    fn start_tile_is_aligned_to_shared_bus_width() {
        let p = params();
        let d = dither_start_tile(&p, 1216, 4);
        assert_eq!(d.start_tile % 4, 0);
    }
}
