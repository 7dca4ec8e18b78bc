//! CTC-loss planner.
//!
//! The loss is computed in the log domain via [`tileplan_estimators::reduce::log_add`]
//! for numeric stability, so every alpha/beta update costs
//! roughly twice a plain dense accumulate. The planner splits batch, time,
//! and the extended-label axis in parallel -- there is no serial axis here,
//! since the recurrence along time is carried by the alpha/beta exchange
//! itself rather than by repeat loops the way a convolution's reduction is.

use tileplan_core::prelude::{Cost, CtcCostBreakdown, CtcOptions, CtcParams, CtcPartition, CtcPlan};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::{Error, Result};
use tileplan_estimators::exchange::exchange_cycles;
use tileplan_estimators::worker::supervisor_cycles;
use tileplan_solver::{Model, Scheduler, Value, Variable};

struct CtcModelVars {
    batch_split: Variable,
    time_split: Variable,
    label_split: Variable,
    last_blank_on_separate_tile: Variable,
    slice_from_input: Variable,
    tiles_used: Variable,
    temp_bytes: Variable,
    alpha_beta_compute: Variable,
    alpha_beta_exchange: Variable,
    alpha_beta_sync: Variable,
    gradient_compute: Variable,
    gradient_exchange: Variable,
    gradient_sync: Variable,
}

const SYNC_OVERHEAD_CYCLES: u64 = 20;

fn build_model(params: &CtcParams, target: &TargetDescriptor) -> (Model, CtcModelVars) {
    let mut m = Model::new();

    let tiles_const = m.add_constant(Value(target.total_tiles().max(1)), "tiles");
    let batch_const = m.add_constant(Value(params.batch_size.max(1)), "batch");
    let time_const = m.add_constant(Value(params.max_time.max(1)), "time");
    let label_const = m.add_constant(Value(params.extended_label_length().max(1)), "label");

    let batch_split = m.add_variable(Value::ONE, Value(params.batch_size.max(1)), "batch_split");
    m.factor_of(batch_const, batch_split);
    let time_split = m.add_variable(Value::ONE, Value(params.max_time.max(1)), "time_split");
    m.factor_of(time_const, time_split);
    let label_split = m.add_variable(Value::ONE, Value(params.extended_label_length().max(1)), "label_split");
    m.factor_of(label_const, label_split);

    let last_blank_on_separate_tile = m.add_variable(Value::ZERO, Value::ONE, "last_blank_on_separate_tile");
    let slice_from_input = m.add_variable(Value::ZERO, Value::ONE, "slice_from_input");

    let tiles_used = m.product(&[batch_split, time_split, label_split], "tiles_used");
    m.less_or_equal(tiles_used, tiles_const);

    let batch_per_tile = m.ceildiv(batch_const, batch_split, "batch_per_tile");
    let time_per_tile = m.ceildiv(time_const, time_split, "time_per_tile");
    let label_per_tile = m.ceildiv(label_const, label_split, "label_per_tile");

    let elems_per_tile = m.product(&[batch_per_tile, time_per_tile, label_per_tile], "elems_per_tile");

    let num_worker_contexts = target.num_worker_contexts;
    // Each alpha/beta update folds two predecessor paths with one log-add
    // apiece plus the transition-probability multiply; roughly twice the
    // cost of a plain dense accumulate.
    let alpha_beta_compute = m.call(&[elems_per_tile, slice_from_input], Value(u64::MAX), "alpha_beta_compute", move |args| {
        let base = supervisor_cycles(args[0].get(), num_worker_contexts, |n| n * 9 + 14);
        let slice_penalty = if args[1].get() != 0 { args[0].get() / 4 + 8 } else { 0 };
        Some(Value(base + slice_penalty))
    });

    let input_type_size = target.type_size(params.input_type) as u64;
    let exchange_bytes_per_cycle = target
        .hierarchy
        .last()
        .map(|h| h.exchange_bytes_per_cycle)
        .unwrap_or(1.0);
    let supports_shared_bus = target.supports_shared_exchange_bus;
    let tiles_per_shared_bus = target.tiles_per_shared_exchange_bus;

    // The alpha/beta recurrence carries one boundary row of label-per-tile
    // values across each time-split seam.
    let alpha_beta_boundary_elems = m.product(&[label_per_tile, batch_per_tile], "alpha_beta_boundary_elems");
    let alpha_beta_exchange = m.call(&[alpha_beta_boundary_elems, time_split], Value(u64::MAX), "alpha_beta_exchange", move |args| {
        let seams = args[1].get().saturating_sub(1);
        if seams == 0 {
            return Some(Value::ZERO);
        }
        let bytes = args[0].get() * input_type_size;
        let per_seam = exchange_cycles(bytes, exchange_bytes_per_cycle, supports_shared_bus, tiles_per_shared_bus, seams);
        Some(Value(per_seam * seams))
    });
    let alpha_beta_sync = m.call(&[time_split], Value(u64::MAX), "alpha_beta_sync", |args| {
        let seams = args[0].get().saturating_sub(1);
        Some(Value(seams * SYNC_OVERHEAD_CYCLES))
    });

    // The backward gradient pass re-walks the same per-tile elements,
    // combining the stored alpha and beta terms -- one log-add and one
    // multiply per element, no recurrence carry.
    let gradient_compute = m.call(&[elems_per_tile, last_blank_on_separate_tile], Value(u64::MAX), "gradient_compute", move |args| {
        let base = supervisor_cycles(args[0].get(), num_worker_contexts, |n| n * 6 + 10);
        let blank_penalty = if args[1].get() != 0 { batch_per_tile_const_penalty() } else { 0 };
        Some(Value(base + blank_penalty))
    });
    let gradient_boundary_elems = m.product(&[time_per_tile, batch_per_tile], "gradient_boundary_elems");
    let gradient_exchange = m.call(&[gradient_boundary_elems, label_split], Value(u64::MAX), "gradient_exchange", move |args| {
        let seams = args[1].get().saturating_sub(1);
        if seams == 0 {
            return Some(Value::ZERO);
        }
        let bytes = args[0].get() * input_type_size;
        let per_seam = exchange_cycles(bytes, exchange_bytes_per_cycle, supports_shared_bus, tiles_per_shared_bus, seams);
        Some(Value(per_seam * seams))
    });
    let gradient_sync = m.call(&[label_split], Value(u64::MAX), "gradient_sync", |args| {
        let seams = args[0].get().saturating_sub(1);
        Some(Value(seams * SYNC_OVERHEAD_CYCLES))
    });

    let alpha_beta_bytes = m.call(&[elems_per_tile], Value(u64::MAX), "alpha_beta_bytes", move |args| {
        Some(Value(args[0].get() * input_type_size * 2))
    });
    let gradient_bytes = m.call(&[elems_per_tile], Value(u64::MAX), "gradient_bytes", move |args| {
        Some(Value(args[0].get() * input_type_size))
    });
    let temp_bytes = m.sum(&[alpha_beta_bytes, gradient_bytes], "temp_bytes");

    let vars = CtcModelVars {
        batch_split,
        time_split,
        label_split,
        last_blank_on_separate_tile,
        slice_from_input,
        tiles_used,
        temp_bytes,
        alpha_beta_compute,
        alpha_beta_exchange,
        alpha_beta_sync,
        gradient_compute,
        gradient_exchange,
        gradient_sync,
    };
    (m, vars)
}

/// Flat penalty for keeping the trailing blank symbol's gradient on a
/// separate tile, independent of per-tile element count.
fn batch_per_tile_const_penalty() -> u64 {
    16
}

/// Plans one CTC-loss invocation: the alpha/beta forward-backward pass
/// and the gradient-from-alpha/beta pass, split in parallel over batch,
/// time, and the extended-label axis.
pub fn plan_ctc(params: &CtcParams, target: &TargetDescriptor, options: &CtcOptions) -> Result<(CtcPlan, Cost)> {
    if params.has_zero_dim() {
        return Ok((
            CtcPlan {
                partition: CtcPartition::default(),
                breakdown: CtcCostBreakdown::default(),
            },
            Cost::default(),
        ));
    }

    let (mut model, vars) = build_model(params, target);

    if options.available_memory_proportion > 0.0 {
        let bound = (target.bytes_per_tile as f64 * options.available_memory_proportion) as u64;
        let bound_var = model.add_constant(Value(bound), "memory_bound");
        model.less_or_equal(vars.temp_bytes, bound_var);
    }

    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "batchSplit"], vars.batch_split);
    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "timeSplit"], vars.time_split);
    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "labelSplit"], vars.label_split);

    let total = model.sum(
        &[
            vars.alpha_beta_compute,
            vars.alpha_beta_exchange,
            vars.alpha_beta_sync,
            vars.gradient_compute,
            vars.gradient_exchange,
            vars.gradient_sync,
        ],
        "total_cycles",
    );

    let solution = Scheduler::new(&mut model)
        .minimize(&[total, vars.temp_bytes, vars.tiles_used])
        .map_err(|_| Error::Infeasible("no CTC plan satisfies the given constraints".to_string()))?;

    let breakdown = CtcCostBreakdown {
        alpha_beta_compute: solution.get(vars.alpha_beta_compute).get(),
        alpha_beta_exchange: solution.get(vars.alpha_beta_exchange).get(),
        alpha_beta_sync: solution.get(vars.alpha_beta_sync).get(),
        gradient_compute: solution.get(vars.gradient_compute).get(),
        gradient_exchange: solution.get(vars.gradient_exchange).get(),
        gradient_sync: solution.get(vars.gradient_sync).get(),
    };
    let partition = CtcPartition {
        batch_split: solution.get(vars.batch_split).get(),
        time_split: solution.get(vars.time_split).get(),
        label_split: solution.get(vars.label_split).get(),
        last_blank_on_separate_tile: solution.get(vars.last_blank_on_separate_tile).get() != 0,
        slice_from_input: solution.get(vars.slice_from_input).get() != 0,
    };
    let cost = Cost {
        cycles: breakdown.total_cycles(),
        temp_bytes: solution.get(vars.temp_bytes).get(),
        tiles: solution.get(vars.tiles_used).get(),
        per_step_cycle_diff: 0,
    };

    Ok((CtcPlan { partition, breakdown }, cost))
}
