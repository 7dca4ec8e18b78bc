//! User-facing option bundles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::NumType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pass {
    None,
    NoneMatmul,
    InferenceFwd,
    TrainingFwd,
    TrainingBwd,
    TrainingWu,
    FcInferenceFwd,
    FcTrainingFwd,
    FcTrainingBwd,
    FcTrainingWu,
}

impl Pass {
    /// Fully-connected passes participate in the joint (forward + backward
    /// + weight-update) plan.
    pub fn is_fully_connected(self) -> bool {
        matches!(
            self,
            Pass::FcInferenceFwd | Pass::FcTrainingFwd | Pass::FcTrainingBwd | Pass::FcTrainingWu
        )
    }

    pub fn is_training(self) -> bool {
        matches!(
            self,
            Pass::TrainingFwd
                | Pass::TrainingBwd
                | Pass::TrainingWu
                | Pass::FcTrainingFwd
                | Pass::FcTrainingBwd
                | Pass::FcTrainingWu
        )
    }
}

/// A nested key -> value tree used to express user-supplied plan
/// constraints. Values are integers,
/// booleans, strings (for enum tokens such as method names), or nested
/// maps; a small interpreter in `tileplan-planner` walks this tree and
/// emits equality constraints into the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Map(BTreeMap<String, ConstraintValue>),
}

pub type PlanConstraints = BTreeMap<String, ConstraintValue>;

impl ConstraintValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstraintValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstraintValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstraintValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConstraintValue>> {
        match self {
            ConstraintValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    MinimiseCycles,
    MinimiseTileTempMemory,
    MinimiseTiles,
    MinimiseCostDiff,
}

impl Default for Objective {
    fn default() -> Self {
        Objective::MinimiseCycles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecondaryKey {
    Tiles,
    Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvOptions {
    pub pass: Pass,
    pub partials_type: NumType,
    pub inter_tile_partials_type: NumType,
    pub inter_ipu_partials_type: NumType,
    /// `0.0` selects pure memory minimisation; otherwise a fraction in
    /// `(0, 1]` of per-tile bytes available for temporaries.
    pub available_memory_proportion: f64,
    pub enable_multi_stage_reduce: bool,
    pub enable_fast_reduce: bool,
    pub enable_single_input_reduce: bool,
    pub enable_amp_half_engines_plan: bool,
    pub enable_conv_dithering: bool,
    pub use_128_bit_conv_unit_load: bool,
    pub num_ipus: u64,
    pub tiles_per_ipu: u64,
    pub plan_constraints: PlanConstraints,
    pub plan_constraints_output_filename: Option<String>,
    pub objective: Objective,
    pub cycles_bound: Option<u64>,
    pub tile_temp_memory_bound: Option<u64>,
    pub cost_diff_secondary_key: SecondaryKey,
}

impl Default for ConvOptions {
    fn default() -> Self {
        Self {
            pass: Pass::InferenceFwd,
            partials_type: NumType::Float,
            inter_tile_partials_type: NumType::Float,
            inter_ipu_partials_type: NumType::Float,
            available_memory_proportion: 0.6,
            enable_multi_stage_reduce: true,
            enable_fast_reduce: true,
            enable_single_input_reduce: true,
            enable_amp_half_engines_plan: false,
            enable_conv_dithering: false,
            use_128_bit_conv_unit_load: false,
            num_ipus: 1,
            tiles_per_ipu: 1216,
            plan_constraints: PlanConstraints::new(),
            plan_constraints_output_filename: None,
            objective: Objective::MinimiseCycles,
            cycles_bound: None,
            tile_temp_memory_bound: None,
            cost_diff_secondary_key: SecondaryKey::Tiles,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseOptions {
    pub available_memory_proportion: f64,
    pub meta_info_bucket_oversize_proportion: f64,
    pub do_grad_a_pass: bool,
    pub do_grad_w_pass: bool,
    pub shared_buckets: bool,
    pub partials_type: NumType,
    pub plan_constraints: PlanConstraints,
}

impl Default for SparseOptions {
    fn default() -> Self {
        Self {
            available_memory_proportion: 0.6,
            meta_info_bucket_oversize_proportion: 0.1,
            do_grad_a_pass: false,
            do_grad_w_pass: false,
            shared_buckets: false,
            partials_type: NumType::Float,
            plan_constraints: PlanConstraints::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtcOptions {
    pub available_memory_proportion: f64,
    pub plan_constraints: PlanConstraints,
}

impl Default for CtcOptions {
    fn default() -> Self {
        Self {
            available_memory_proportion: 0.6,
            plan_constraints: PlanConstraints::new(),
        }
    }
}
