//! Convolution planning.

mod build;
mod search;

use tileplan_core::prelude::{
    ConvOptions, ConvParams, ConvPlan, Cost, GrainSizes, MethodParams, Objective,
    PartitionRecord, TransformRecord, TypeRecord,
};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::Result;
use tracing::{debug, warn};

use crate::dither::dither_start_tile;

/// How many times the available-memory proportion is doubled before the
/// search falls back to an unbounded-memory pass.
const MAX_MEMORY_RELAXATIONS: u32 = 4;

fn zero_dim_plan(is_joint_plan: bool) -> (ConvPlan, Cost) {
    let plan = ConvPlan {
        transforms: vec![TransformRecord::default()],
        partitions: vec![PartitionRecord {
            field_split: Vec::new(),
            kernel_split: Vec::new(),
            batch_split: 1,
            conv_group_split: 1,
            out_chan_split: tileplan_core::prelude::ChannelSplit::unit(),
            in_chan_split: tileplan_core::prelude::ChannelSplit::unit(),
        }],
        types: vec![TypeRecord {
            partial_type: tileplan_core::prelude::NumType::Float,
            result_type: tileplan_core::prelude::NumType::Float,
        }],
        method: tileplan_core::prelude::ConvMethod::OuterProduct,
        grain: GrainSizes::default(),
        method_params: MethodParams::default(),
        is_joint_plan,
        start_tile: 0,
        direction_ascending: true,
    };
    (plan, Cost::default())
}

/// Plans one convolution invocation end to end: canonicalises the
/// operator, runs the bounded-memory search with progressive relaxation,
/// and dithers the winning plan's starting tile. `reference_cost`, when `Some`, feeds the `MinimiseCostDiff`
/// objective used by the multi-plan composer to
/// penalise a sub-plan that runs longer than a prior step in the same
/// joint schedule.
pub fn plan_convolution(
    params: &ConvParams,
    target: &TargetDescriptor,
    options: &ConvOptions,
    reference_cost: Option<Cost>,
) -> Result<(ConvPlan, Cost)> {
    let params = params.canonicalize();
    let is_joint_plan = options.pass.is_fully_connected();

    if params.has_zero_dim() {
        return Ok(zero_dim_plan(is_joint_plan));
    }

    let bytes_per_tile = target.bytes_per_tile as f64;
    let mut proportion = options.available_memory_proportion;
    let mut result = None;

    if proportion > 0.0 {
        for attempt in 0..=MAX_MEMORY_RELAXATIONS {
            let bound = Some((bytes_per_tile * proportion) as u64);
            match search::search_best_plan(&params, target, options, is_joint_plan, bound, reference_cost) {
                Ok(r) => {
                    result = Some(r);
                    break;
                }
                Err(_) if attempt < MAX_MEMORY_RELAXATIONS => {
                    warn!(attempt, proportion, "convolution search infeasible under memory bound, relaxing");
                    proportion = (proportion * 2.0).min(1.0);
                }
                Err(_) => {
                    debug!("convolution search exhausted memory relaxations, falling back to a memory-minimising search");
                }
            }
        }
    }

    // Last resort: every memory-bounded attempt (or the bound itself, when
    // `available_memory_proportion` is non-positive) was infeasible. Fall
    // back to an unbounded search that minimises temp memory instead of
    // cycles, so a plan -- the smallest one achievable, even if over budget
    // -- is always returned.
    let result = match result {
        Some(r) => r,
        None => {
            let fallback_options = ConvOptions {
                objective: Objective::MinimiseTileTempMemory,
                ..options.clone()
            };
            search::search_best_plan(&params, target, &fallback_options, is_joint_plan, None, reference_cost)?
        }
    };

    let dither = if matches!(options.objective, Objective::MinimiseCostDiff) || !options_allow_dither(options) {
        crate::dither::Dither {
            start_tile: 0,
            ascending: true,
        }
    } else {
        dither_start_tile(&params, target.total_tiles(), target.tiles_per_shared_exchange_bus)
    };

    let plan = ConvPlan {
        transforms: vec![result.transform],
        partitions: vec![result.partition],
        types: vec![result.types],
        method: result.method,
        grain: result.grain,
        method_params: result.method_params,
        is_joint_plan,
        start_tile: dither.start_tile,
        direction_ascending: dither.ascending,
    };
    Ok((plan, result.cost))
}

fn options_allow_dither(options: &ConvOptions) -> bool {
    options.enable_conv_dithering
}
