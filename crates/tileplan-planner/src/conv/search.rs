//! Search driver for convolution planning.
//!
//! Enumerates a bounded set of parameter-transform combinations and, for
//! each, every applicable on-tile method, builds a constraint model per
//! combination via [`super::build::build_conv_model`], solves it, and
//! keeps the cheapest feasible result under the caller's objective.

use tileplan_core::prelude::{
    ConvMethod, ConvOptions, ConvParams, Cost, CostBreakdown, GrainSizes, MethodParams, Objective,
    PartitionRecord, Pass, SecondaryKey, TransformRecord, TypeRecord,
};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::{Error, Result};
use tileplan_methods::conv::{enumerate_conv_methods, ConvMethodCandidate};
use tileplan_solver::{Scheduler, Value, Variable};

use super::build::{build_conv_model, decode_solution, joint_sub_pass_cost, BuildInputs, FixedPartition};
use crate::transform;

/// One fully-specified choice of the optional transform steps. Only a
/// single dimension is ever expanded or flattened per candidate:
/// enumerating every subset of dimensions is combinatorially unnecessary
/// in practice since a second dimension can always be picked up by a
/// later hierarchy level, and the search stays linear in the number of
/// field dimensions rather than exponential.
#[derive(Debug, Clone, Copy)]
struct TransformCombo {
    swap_operands: bool,
    expand_dim: Option<usize>,
    flatten_dim: Option<usize>,
    combine_conv_groups: u64,
}

fn base_combo(swap_operands: bool) -> TransformCombo {
    TransformCombo {
        swap_operands,
        expand_dim: None,
        flatten_dim: None,
        combine_conv_groups: 1,
    }
}

/// The bounded candidate list of transform combinations considered for
/// one search. A joint fully-connected plan always
/// swaps operands on its first transform; an
/// ordinary convolution is never searched with the operands swapped,
/// since swapping only pays off when channels and batch trade volume
/// the way a fully-connected layer's do.
fn candidate_combos(params: &ConvParams, is_joint_plan: bool) -> Vec<TransformCombo> {
    let mut combos = vec![base_combo(is_joint_plan)];
    for dim in 0..params.num_field_dims() {
        if !transform::dim_can_be_flattened(params, dim) {
            continue;
        }
        if params.kernel_shape[dim] > 1 {
            let mut c = base_combo(is_joint_plan);
            c.expand_dim = Some(dim);
            combos.push(c);
        }
        if params.field_shape[dim] > 1 {
            let mut c = base_combo(is_joint_plan);
            c.flatten_dim = Some(dim);
            combos.push(c);
        }
    }
    if params.num_conv_groups > 1 {
        let mut c = base_combo(is_joint_plan);
        c.combine_conv_groups = params.num_conv_groups;
        combos.push(c);
    }
    combos
}

/// Applies one [`TransformCombo`] to `params` in the fixed composition
/// order, recording what it did in a [`TransformRecord`].
fn apply_combo(params: &ConvParams, combo: TransformCombo) -> (ConvParams, TransformRecord) {
    let base = if params.num_field_dims() == 0 {
        transform::add_extra_field_dim(params)
    } else {
        params.clone()
    };
    let mut p = transform::defer_dilation(&base);
    if combo.swap_operands {
        p = transform::swap_operands(&p);
    }
    let mut expand_dims = Vec::new();
    if let Some(dim) = combo.expand_dim {
        p = transform::expand_dim(&p, dim);
        expand_dims.push(dim);
    }
    let mut out_chan_flatten_dims = Vec::new();
    if let Some(dim) = combo.flatten_dim {
        p = transform::flatten_dim_into_out_chans(&p, dim);
        out_chan_flatten_dims.push(dim);
    }
    if combo.combine_conv_groups > 1 {
        p = transform::combine_conv_groups(&p, combo.combine_conv_groups);
    }
    (
        p,
        TransformRecord {
            swap_operands: combo.swap_operands,
            expand_dims,
            out_chan_flatten_dims,
            combine_conv_groups: combo.combine_conv_groups,
        },
    )
}

fn objective_vars(objective: Objective, vars: &super::build::ConvModelVars) -> Vec<Variable> {
    match objective {
        Objective::MinimiseCycles => vec![vars.cycles, vars.temp_bytes, vars.tiles_used],
        Objective::MinimiseTileTempMemory => vec![vars.temp_bytes, vars.cycles, vars.tiles_used],
        Objective::MinimiseTiles => vec![vars.tiles_used, vars.cycles, vars.temp_bytes],
        Objective::MinimiseCostDiff => vec![vars.per_step_cycle_diff, vars.tiles_used],
    }
}

/// The outcome of one search pass: the best plan's constituent records
/// plus its cost, with the transform/method choice baked in so the
/// caller can assemble a full [`tileplan_core::prelude::ConvPlan`].
pub struct SearchResult {
    pub transform: TransformRecord,
    pub partition: PartitionRecord,
    pub types: TypeRecord,
    pub grain: GrainSizes,
    pub method: ConvMethod,
    pub method_params: MethodParams,
    pub breakdown: CostBreakdown,
    pub cost: Cost,
}

/// One search pass over every transform/method combination, at a given
/// memory bound. `memory_bound_bytes`, when `Some`, caps each candidate's
/// temp-byte total; `None` searches unbounded.
#[allow(clippy::too_many_arguments)]
pub fn search_best_plan(
    params: &ConvParams,
    target: &TargetDescriptor,
    options: &ConvOptions,
    is_joint_plan: bool,
    memory_bound_bytes: Option<u64>,
    reference_cost: Option<Cost>,
) -> Result<SearchResult> {
    let tiles_available = target.total_tiles();
    let exchange_bytes_per_cycle = target
        .hierarchy
        .last()
        .map(|h| h.exchange_bytes_per_cycle)
        .unwrap_or(1.0);

    let mut best: Option<SearchResult> = None;

    for combo in candidate_combos(params, is_joint_plan) {
        let (transformed, transform_record) = apply_combo(params, combo);
        if transformed.has_zero_dim() {
            continue;
        }
        let method_candidates =
            enumerate_conv_methods(&transformed, target, options.partials_type, options.pass);
        for method in method_candidates {
            let padded = transform::pad_to_grain(
                &transformed,
                method.in_chans_per_group_grain,
                method.partial_chans_per_group,
            );
            if padded.has_zero_dim() {
                continue;
            }
            let inputs = BuildInputs {
                params: &padded,
                target,
                tiles_available,
                exchange_bytes_per_cycle,
                method,
                partials_type: options.partials_type,
                is_joint_plan,
                reference_cost,
            };
            let (mut model, vars) = build_conv_model(&inputs);
            if let Some(bound) = memory_bound_bytes {
                let bound_var = model.add_constant(Value(bound), "memory_bound");
                model.less_or_equal(vars.temp_bytes, bound_var);
            }
            if let Some(bound) = options.cycles_bound {
                let bound_var = model.add_constant(Value(bound), "cycles_bound");
                model.less_or_equal(vars.cycles, bound_var);
            }
            if apply_plan_constraints(&mut model, &options.plan_constraints, &vars).is_err() {
                continue;
            }
            let objectives = objective_vars(options.objective, &vars);
            let solution = match Scheduler::new(&mut model).minimize(&objectives) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let (partition, types, grain, method_params, breakdown) =
                decode_solution(&solution, &vars, method, options.partials_type, padded.output_type);
            let mut cost = Cost {
                cycles: breakdown.total_cycles(),
                temp_bytes: solution.get(vars.temp_bytes).get(),
                tiles: solution.get(vars.tiles_used).get(),
                per_step_cycle_diff: solution.get(vars.per_step_cycle_diff).get(),
            };

            // A fully-connected training-forward plan is a joint plan: the
            // backward and weight-update sub-models share this partition,
            // permuting the operator's channel/batch roles, and their costs
            // fold into the forward pass's as a sum of cycles and a max of
            // temp bytes.
            if options.pass == Pass::FcTrainingFwd {
                let fixed = FixedPartition {
                    batch_split: partition.batch_split,
                    conv_group_split: partition.conv_group_split,
                    field_split: partition.field_split.clone(),
                    kernel_split: partition.kernel_split.clone(),
                    in_chan_parallel: partition.in_chan_split.parallel,
                    in_chan_serial: partition.in_chan_split.serial,
                    out_chan_parallel: partition.out_chan_split.parallel,
                    out_chan_serial: partition.out_chan_split.serial,
                };
                let backward_params = transform::swap_operands(&padded);
                let weight_update_params = transform::swap_batch_and_in_chans(&padded);
                let (bwd_cycles, bwd_temp_bytes) = joint_sub_pass_cost(
                    &fixed,
                    &backward_params,
                    target,
                    method,
                    options.partials_type,
                    exchange_bytes_per_cycle,
                );
                let (wu_cycles, wu_temp_bytes) = joint_sub_pass_cost(
                    &fixed,
                    &weight_update_params,
                    target,
                    method,
                    options.partials_type,
                    exchange_bytes_per_cycle,
                );
                cost.cycles += bwd_cycles + wu_cycles;
                cost.temp_bytes = cost.temp_bytes.max(bwd_temp_bytes).max(wu_temp_bytes);
            }
            let candidate = SearchResult {
                transform: transform_record.clone(),
                partition,
                types,
                grain,
                method: method.method,
                method_params,
                breakdown,
                cost,
            };
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    if candidate
                        .cost
                        .compare(&current.cost, options.objective, options.cost_diff_secondary_key)
                        == std::cmp::Ordering::Less
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }
    }

    best.ok_or_else(|| Error::Infeasible("no convolution plan satisfies the given constraints".to_string()))
}

/// Pins the partition variables named in `tree`, if any.
/// Returns `Err` if a named constraint value is out of range for its
/// variable; the caller treats that as this combination being
/// unsearchable rather than a hard error, since a later combination may
/// still satisfy the same constraint tree.
fn apply_plan_constraints(
    model: &mut tileplan_solver::Model,
    tree: &tileplan_core::prelude::PlanConstraints,
    vars: &super::build::ConvModelVars,
) -> std::result::Result<(), ()> {
    use crate::constraints_tree::apply_int_constraint;

    apply_int_constraint(model, tree, &["partition", "batchSplit"], vars.batch_split);
    apply_int_constraint(model, tree, &["partition", "convGroupSplit"], vars.conv_group_split);
    apply_int_constraint(model, tree, &["partition", "outChanSplit", "parallel"], vars.out_chan_parallel);
    apply_int_constraint(model, tree, &["partition", "outChanSplit", "serial"], vars.out_chan_serial);
    apply_int_constraint(model, tree, &["partition", "inChanSplit", "parallel"], vars.in_chan_parallel);
    apply_int_constraint(model, tree, &["partition", "inChanSplit", "serial"], vars.in_chan_serial);
    for (dim, &var) in vars.field_split.iter().enumerate() {
        apply_int_constraint(model, tree, &["partition", "fieldSplit", &dim.to_string()], var);
    }
    for (dim, &var) in vars.kernel_split.iter().enumerate() {
        apply_int_constraint(model, tree, &["partition", "kernelSplit", &dim.to_string()], var);
    }
    Ok(())
}
