//! Static description of the device the planner targets.
//!
//! The target is an opaque-to-the-planner description of tile counts,
//! exchange bandwidths, type sizes, vector widths, and engine counts
//!. The runtime graph-construction API that
//! would normally supply these numbers is out of scope; callers build a
//! `TargetDescriptor` directly or deserialise one from JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::NumType;

/// Per-hierarchy-level exchange bandwidth and tile count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    pub tiles: u64,
    /// Bytes moved per cycle across this level's exchange fabric.
    pub exchange_bytes_per_cycle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub num_ipus: u64,
    pub tiles_per_ipu: u64,
    /// Levels ordered outermost (inter-IPU) to innermost (intra-IPU); the
    /// per-tile leaf is implicit and not listed here.
    pub hierarchy: Vec<HierarchyLevel>,
    pub bytes_per_tile: u64,
    pub data_path_width: u64,
    pub num_worker_contexts: u32,
    /// Vector width (elements) per numeric type.
    pub vector_width: BTreeMap<NumType, u32>,
    pub type_size_bytes: BTreeMap<NumType, u32>,
    /// Convolution engine ("conv unit") counts keyed by
    /// (activation type, partial type).
    pub conv_units_per_tile: BTreeMap<(NumType, NumType), u32>,
    pub supports_shared_exchange_bus: bool,
    pub tiles_per_shared_exchange_bus: u64,
    pub memcpy_bytes_per_cycle: f64,
    pub weights_per_conv_unit: BTreeMap<NumType, u32>,
    pub exchange_atom_bytes: u32,
}

impl TargetDescriptor {
    /// Total tiles across all IPUs.
    pub fn total_tiles(&self) -> u64 {
        self.num_ipus * self.tiles_per_ipu
    }

    pub fn type_size(&self, ty: NumType) -> u32 {
        *self.type_size_bytes.get(&ty).unwrap_or(&(ty.default_size_bytes()))
    }

    pub fn vector_width_for(&self, ty: NumType) -> u32 {
        *self.vector_width.get(&ty).unwrap_or(&1)
    }

    pub fn conv_units(&self, activation: NumType, partial: NumType) -> u32 {
        *self.conv_units_per_tile.get(&(activation, partial)).unwrap_or(&0)
    }

    pub fn weights_per_conv_unit(&self, activation: NumType) -> u32 {
        *self.weights_per_conv_unit.get(&activation).unwrap_or(&0)
    }

    /// A reasonably representative IPU-class target, used in tests and as
    /// a starting point for callers prototyping against the planner.
    pub fn reference_ipu(tiles_per_ipu: u64, num_ipus: u64) -> Self {
        let mut vector_width = BTreeMap::new();
        vector_width.insert(NumType::Half, 8);
        vector_width.insert(NumType::Float, 4);

        let mut type_size_bytes = BTreeMap::new();
        type_size_bytes.insert(NumType::Half, 2);
        type_size_bytes.insert(NumType::Float, 4);

        let mut conv_units_per_tile = BTreeMap::new();
        conv_units_per_tile.insert((NumType::Half, NumType::Half), 16);
        conv_units_per_tile.insert((NumType::Half, NumType::Float), 8);
        conv_units_per_tile.insert((NumType::Float, NumType::Float), 8);

        let mut weights_per_conv_unit = BTreeMap::new();
        weights_per_conv_unit.insert(NumType::Half, 8);
        weights_per_conv_unit.insert(NumType::Float, 4);

        let mut hierarchy = Vec::new();
        if num_ipus > 1 {
            hierarchy.push(HierarchyLevel {
                tiles: tiles_per_ipu * num_ipus,
                exchange_bytes_per_cycle: 0.125,
            });
        }
        hierarchy.push(HierarchyLevel {
            tiles: tiles_per_ipu * num_ipus,
            exchange_bytes_per_cycle: 4.0,
        });

        Self {
            num_ipus,
            tiles_per_ipu,
            hierarchy,
            bytes_per_tile: 256 * 1024,
            data_path_width: 64,
            num_worker_contexts: 6,
            vector_width,
            type_size_bytes,
            conv_units_per_tile,
            supports_shared_exchange_bus: true,
            tiles_per_shared_exchange_bus: 4,
            memcpy_bytes_per_cycle: 8.0,
            weights_per_conv_unit,
            exchange_atom_bytes: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_target_has_positive_tiles() {
        let t = TargetDescriptor::reference_ipu(1216, 1);
        assert_eq!(t.total_tiles(), 1216);
        assert!(t.conv_units(NumType::Half, NumType::Half) > 0);
    }
}
