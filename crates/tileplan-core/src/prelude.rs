//! Convenient re-exports for downstream crates.

pub use crate::error::{Error, Result};
pub use crate::hash::{hash_bytes, hash_serde, Hash256};
pub use crate::options::{
    ConstraintValue, ConvOptions, CtcOptions, Objective, Pass, PlanConstraints, SecondaryKey,
    SparseOptions,
};
pub use crate::plan::{
    ChannelSplit, ConvMethod, ConvPlan, Cost, CostBreakdown, CtcCostBreakdown, CtcPartition,
    CtcPlan, EmbeddingPartition, EmbeddingPlan, GrainSizes, MethodParams, PartitionRecord,
    PoolPartition, PoolPlan, SparseCostBreakdown, SparseMethod, SparsePartition, SparsePassPlan,
    SparsePlan, TransformRecord, TypeRecord,
};
pub use crate::target::{HierarchyLevel, TargetDescriptor};
pub use crate::types::{
    ConvParams, CtcParams, DimTransform, EmbeddingOp, EmbeddingParams, NumType, PoolKind,
    PoolParams, SparseMatMulParams, SparsityParams,
};
