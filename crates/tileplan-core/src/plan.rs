//! The `Plan` and `Cost` value types.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::options::{Objective, SecondaryKey};
use crate::types::NumType;

/// On-tile compute methods for convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConvMethod {
    Amp,
    Slic,
    Mac,
    Hmac,
    Vmac,
    OuterProduct,
}

impl std::fmt::Display for ConvMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConvMethod::Amp => "AMP",
            ConvMethod::Slic => "SLIC",
            ConvMethod::Mac => "MAC",
            ConvMethod::Hmac => "HMAC",
            ConvMethod::Vmac => "VMAC",
            ConvMethod::OuterProduct => "OuterProduct",
        };
        write!(f, "{s}")
    }
}

/// On-tile compute methods for sparse-dense matmul.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SparseMethod {
    Forward,
    GradA,
    Transpose,
    GradW,
}

/// A parallel split, and, for the input/output channel axes, an
/// additional serial split that becomes a repeat loop at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelSplit {
    pub parallel: u64,
    pub serial: u64,
}

impl ChannelSplit {
    pub fn unit() -> Self {
        Self {
            parallel: 1,
            serial: 1,
        }
    }
}

/// Per-dimension partition factors at one hierarchy level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub field_split: Vec<u64>,
    pub kernel_split: Vec<u64>,
    pub batch_split: u64,
    pub conv_group_split: u64,
    pub out_chan_split: ChannelSplit,
    pub in_chan_split: ChannelSplit,
}

/// Which functional transforms were applied entering a hierarchy level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransformRecord {
    pub swap_operands: bool,
    pub expand_dims: Vec<usize>,
    pub out_chan_flatten_dims: Vec<usize>,
    pub combine_conv_groups: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub partial_type: NumType,
    pub result_type: NumType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GrainSizes {
    pub conv_groups_per_group: u64,
    pub in_chans_per_group: u64,
    pub partial_chans_per_group: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodParams {
    pub slic_window_width: Option<u32>,
    pub engine_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvPlan {
    pub transforms: Vec<TransformRecord>,
    pub partitions: Vec<PartitionRecord>,
    pub types: Vec<TypeRecord>,
    pub method: ConvMethod,
    pub grain: GrainSizes,
    pub method_params: MethodParams,
    pub is_joint_plan: bool,
    pub start_tile: u64,
    pub direction_ascending: bool,
}

/// Itemised cycle breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub rearrange_before_slice: u64,
    pub dynamic_slice: u64,
    pub transform: u64,
    pub exchange_in: u64,
    pub exchange_weights: u64,
    pub exchange_reduce: u64,
    pub tile_level_transform: u64,
    pub partial_calc: u64,
    pub reduce: u64,
    pub dynamic_update: u64,
    pub add_in_place: u64,
    pub cast: u64,
}

impl CostBreakdown {
    pub fn total_cycles(&self) -> u64 {
        self.rearrange_before_slice
            + self.dynamic_slice
            + self.transform
            + self.exchange_in
            + self.exchange_weights
            + self.exchange_reduce
            + self.tile_level_transform
            + self.partial_calc
            + self.reduce
            + self.dynamic_update
            + self.add_in_place
            + self.cast
    }
}

/// The (totalCycles, totalTempBytes, totalTiles, totalPerStepCycleDiff)
/// cost tuple, plus the itemised breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cost {
    pub cycles: u64,
    pub temp_bytes: u64,
    pub tiles: u64,
    pub per_step_cycle_diff: u64,
}

impl Cost {
    /// A distinguished sentinel representing infeasibility. Always compares as worse than any feasible cost.
    pub fn highest() -> Self {
        Self {
            cycles: u64::MAX,
            temp_bytes: u64::MAX,
            tiles: u64::MAX,
            per_step_cycle_diff: u64::MAX,
        }
    }

    pub fn is_highest(&self) -> bool {
        *self == Self::highest()
    }

    /// Lexicographic comparison under `objective`.
    pub fn compare(&self, other: &Self, objective: Objective, secondary: SecondaryKey) -> Ordering {
        if self.is_highest() && other.is_highest() {
            return Ordering::Equal;
        }
        if self.is_highest() {
            return Ordering::Greater;
        }
        if other.is_highest() {
            return Ordering::Less;
        }
        match objective {
            Objective::MinimiseCycles => self
                .cycles
                .cmp(&other.cycles)
                .then(self.temp_bytes.cmp(&other.temp_bytes))
                .then(self.tiles.cmp(&other.tiles)),
            Objective::MinimiseTileTempMemory => self
                .temp_bytes
                .cmp(&other.temp_bytes)
                .then(self.cycles.cmp(&other.cycles))
                .then(self.tiles.cmp(&other.tiles)),
            Objective::MinimiseTiles => self
                .tiles
                .cmp(&other.tiles)
                .then(self.cycles.cmp(&other.cycles))
                .then(self.temp_bytes.cmp(&other.temp_bytes)),
            Objective::MinimiseCostDiff => {
                let primary = self.per_step_cycle_diff.cmp(&other.per_step_cycle_diff);
                let secondary_ord = match secondary {
                    SecondaryKey::Tiles => self.tiles.cmp(&other.tiles),
                    SecondaryKey::Bytes => self.temp_bytes.cmp(&other.temp_bytes),
                };
                primary.then(secondary_ord)
            }
        }
    }
}

/// Partition chosen for a sparse-dense matmul plan: a
/// parallel split per logical axis, with groups and rows/columns sharing
/// the same shape as a convolution's batch/channel splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SparsePartition {
    pub group_split: u64,
    pub row_split: u64,
    pub col_split: u64,
    pub z_split: u64,
}

/// Itemised cycle breakdown for sparse-dense matmul, following the
/// four-stage `addEstimates`/`addEstimatesGradW` structure: distribution
/// exchange, initial (gather + elementwise) compute, propagating
/// exchange around the bucket ring, and the final reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SparseCostBreakdown {
    pub distribution_exchange: u64,
    pub gather: u64,
    pub elementwise: u64,
    pub propagating_exchange: u64,
    pub reduce: u64,
}

impl SparseCostBreakdown {
    pub fn total_cycles(&self) -> u64 {
        self.distribution_exchange + self.gather + self.elementwise + self.propagating_exchange + self.reduce
    }
}

/// A single pass's method, bucket sizing and cost over a sparse-dense
/// matmul's partition. Each of forward/gradA/gradW gets its own, since
/// they run with different on-tile methods and bucket shapes even when
/// they share the same partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsePassPlan {
    pub method: SparseMethod,
    pub meta_info_bucket_elems: u64,
    pub value_bucket_elems: u64,
    pub reuses_forward_buckets: bool,
    pub breakdown: SparseCostBreakdown,
}

/// A sparse-dense matmul plan. The forward pass is always present;
/// `grad_a`/`grad_w` are populated only when the caller asked for the
/// corresponding backward passes, and coexist with the forward pass
/// rather than competing with it for the partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsePlan {
    pub partition: SparsePartition,
    pub forward: SparsePassPlan,
    pub grad_a: Option<SparsePassPlan>,
    pub grad_w: Option<SparsePassPlan>,
}

/// Partition chosen for a CTC-loss plan: a parallel
/// split over batch, time, and the extended-label axis, plus the two
/// named strategy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CtcPartition {
    pub batch_split: u64,
    pub time_split: u64,
    pub label_split: u64,
    pub last_blank_on_separate_tile: bool,
    pub slice_from_input: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CtcCostBreakdown {
    pub alpha_beta_compute: u64,
    pub alpha_beta_exchange: u64,
    pub alpha_beta_sync: u64,
    pub gradient_compute: u64,
    pub gradient_exchange: u64,
    pub gradient_sync: u64,
}

impl CtcCostBreakdown {
    pub fn total_cycles(&self) -> u64 {
        self.alpha_beta_compute
            + self.alpha_beta_exchange
            + self.alpha_beta_sync
            + self.gradient_compute
            + self.gradient_exchange
            + self.gradient_sync
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CtcPlan {
    pub partition: CtcPartition,
    pub breakdown: CtcCostBreakdown,
}

/// Partition for a pooling plan: a parallel split per field dimension
/// plus batch and channels, no serial axis -- pooling carries no
/// reduction across tiles.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolPartition {
    pub batch_split: u64,
    pub channel_split: u64,
    pub field_split: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolPlan {
    pub partition: PoolPartition,
    pub cycles: u64,
    pub temp_bytes: u64,
}

/// Partition for an embedding slice/update plan: a parallel split over
/// the indices being gathered/scattered and over the embedding-size
/// axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmbeddingPartition {
    pub index_split: u64,
    pub embedding_size_split: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingPlan {
    pub partition: EmbeddingPartition,
    pub cycles: u64,
    pub temp_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_cost_is_always_worse() {
        let finite = Cost {
            cycles: 100,
            temp_bytes: 10,
            tiles: 4,
            per_step_cycle_diff: 0,
        };
        let worst = Cost::highest();
        assert_eq!(
            finite.compare(&worst, Objective::MinimiseCycles, SecondaryKey::Tiles),
            Ordering::Less
        );
    }

    #[test]
    fn ordering_respects_objective_choice() {
        let a = Cost {
            cycles: 10,
            temp_bytes: 100,
            tiles: 4,
            per_step_cycle_diff: 0,
        };
        let b = Cost {
            cycles: 20,
            temp_bytes: 50,
            tiles: 4,
            per_step_cycle_diff: 0,
        };
        assert_eq!(
            a.compare(&b, Objective::MinimiseCycles, SecondaryKey::Tiles),
            Ordering::Less
        );
        assert_eq!(
            a.compare(&b, Objective::MinimiseTileTempMemory, SecondaryKey::Tiles),
            Ordering::Greater
        );
    }
}
