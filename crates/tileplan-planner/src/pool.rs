//! Pooling planner.
//!
//! Pooling carries no cross-tile reduction -- every output element only
//! ever reads from one input window -- so the partition is a plain
//! parallel split over batch, channels, and each field dimension, with no
//! serial axis and no inter-tile accumulation. The only exchange is the
//! halo of input elements a field-split seam needs from its neighbour when
//! the pooling window overlaps the split boundary.

use tileplan_core::prelude::{Cost, PoolKind, PoolParams, PoolPartition, PoolPlan};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::Result;
use tileplan_estimators::exchange::exchange_cycles;
use tileplan_estimators::worker::supervisor_cycles;
use tileplan_solver::{Model, Scheduler, Value, Variable};

fn output_size(field: u64, kernel: u64, stride: u64) -> u64 {
    if field < kernel {
        return 0;
    }
    (field - kernel) / stride.max(1) + 1
}

struct PoolModelVars {
    batch_split: Variable,
    channel_split: Variable,
    field_split: Vec<Variable>,
    tiles_used: Variable,
    cycles: Variable,
    temp_bytes: Variable,
}

fn build_model(params: &PoolParams, target: &TargetDescriptor) -> (Model, PoolModelVars) {
    let mut m = Model::new();

    let tiles_const = m.add_constant(Value(target.total_tiles().max(1)), "tiles");
    let batch_const = m.add_constant(Value(params.batch_size.max(1)), "batch");
    let channels_const = m.add_constant(Value(params.channels.max(1)), "channels");

    let batch_split = m.add_variable(Value::ONE, Value(params.batch_size.max(1)), "batch_split");
    m.factor_of(batch_const, batch_split);
    let channel_split = m.add_variable(Value::ONE, Value(params.channels.max(1)), "channel_split");
    m.factor_of(channels_const, channel_split);

    let output_shape: Vec<u64> = (0..params.field_shape.len())
        .map(|dim| output_size(params.field_shape[dim], params.kernel_shape[dim], params.stride[dim]).max(1))
        .collect();

    let mut field_split = Vec::with_capacity(output_shape.len());
    let mut field_split_consts = Vec::with_capacity(output_shape.len());
    for (dim, &out_dim) in output_shape.iter().enumerate() {
        let dim_const = m.add_constant(Value(out_dim), format!("out_dim_{dim}"));
        let split = m.add_variable(Value::ONE, Value(out_dim), format!("field_split_{dim}"));
        m.factor_of(dim_const, split);
        field_split_consts.push(dim_const);
        field_split.push(split);
    }

    let mut tile_factors = vec![batch_split, channel_split];
    tile_factors.extend(field_split.iter().copied());
    let tiles_used = m.product(&tile_factors, "tiles_used");
    m.less_or_equal(tiles_used, tiles_const);

    let batch_per_tile = m.ceildiv(batch_const, batch_split, "batch_per_tile");
    let channel_per_tile = m.ceildiv(channels_const, channel_split, "channel_per_tile");
    let mut field_per_tile = Vec::with_capacity(field_split.len());
    for (dim, &split) in field_split.iter().enumerate() {
        let per_tile = m.ceildiv(field_split_consts[dim], split, format!("field_per_tile_{dim}"));
        field_per_tile.push(per_tile);
    }

    let mut out_factors = vec![batch_per_tile, channel_per_tile];
    out_factors.extend(field_per_tile.iter().copied());
    let out_elems_per_tile = m.product(&out_factors, "out_elems_per_tile");

    let window_volume: u64 = params.kernel_shape.iter().product::<u64>().max(1);
    let num_worker_contexts = target.num_worker_contexts;
    let is_max = matches!(params.kind, PoolKind::Max);
    let compute = m.call(&[out_elems_per_tile], Value(u64::MAX), "compute", move |args| {
        let per_elem_cost = window_volume + if is_max { 2 } else { 3 };
        Some(Value(supervisor_cycles(args[0].get(), num_worker_contexts, move |n| n * per_elem_cost + 6)))
    });

    let halo_overlap: u64 = (0..params.field_shape.len())
        .map(|dim| params.kernel_shape[dim].saturating_sub(params.stride[dim]))
        .sum();
    let type_size = target.type_size(params.input_type) as u64;
    let exchange_bytes_per_cycle = target
        .hierarchy
        .last()
        .map(|h| h.exchange_bytes_per_cycle)
        .unwrap_or(1.0);
    let supports_shared_bus = target.supports_shared_exchange_bus;
    let tiles_per_shared_bus = target.tiles_per_shared_exchange_bus;
    let num_field_splits_gt_one: Variable = {
        let mut any_split = field_split.first().copied().unwrap_or(batch_split);
        for &s in field_split.iter().skip(1) {
            any_split = m.max(&[any_split, s], "max_field_split");
        }
        any_split
    };
    let halo_exchange = m.call(&[num_field_splits_gt_one, channel_per_tile], Value(u64::MAX), "halo_exchange", move |args| {
        if args[0].get() <= 1 || halo_overlap == 0 {
            return Some(Value::ZERO);
        }
        let bytes = halo_overlap * args[1].get() * type_size;
        Some(Value(exchange_cycles(bytes, exchange_bytes_per_cycle, supports_shared_bus, tiles_per_shared_bus, args[0].get())))
    });

    let cycles = m.sum(&[compute, halo_exchange], "cycles");
    let temp_bytes = m.call(&[out_elems_per_tile], Value(u64::MAX), "temp_bytes", move |args| {
        Some(Value(args[0].get() * type_size))
    });

    let vars = PoolModelVars {
        batch_split,
        channel_split,
        field_split,
        tiles_used,
        cycles,
        temp_bytes,
    };
    (m, vars)
}

/// Plans one pooling invocation.
pub fn plan_pool(params: &PoolParams, target: &TargetDescriptor, available_memory_proportion: f64) -> Result<(PoolPlan, Cost)> {
    if params.has_zero_dim() {
        return Ok((
            PoolPlan {
                partition: PoolPartition::default(),
                cycles: 0,
                temp_bytes: 0,
            },
            Cost::default(),
        ));
    }

    let (mut model, vars) = build_model(params, target);
    if available_memory_proportion > 0.0 {
        let bound = (target.bytes_per_tile as f64 * available_memory_proportion) as u64;
        let bound_var = model.add_constant(Value(bound), "memory_bound");
        model.less_or_equal(vars.temp_bytes, bound_var);
    }

    let solution = Scheduler::new(&mut model)
        .minimize(&[vars.cycles, vars.temp_bytes, vars.tiles_used])
        .map_err(|_| tileplan_core::Error::Infeasible("no pooling plan satisfies the given constraints".to_string()))?;

    let partition = PoolPartition {
        batch_split: solution.get(vars.batch_split).get(),
        channel_split: solution.get(vars.channel_split).get(),
        field_split: vars.field_split.iter().map(|&v| solution.get(v).get()).collect(),
    };
    let cycles = solution.get(vars.cycles).get();
    let temp_bytes = solution.get(vars.temp_bytes).get();
    let cost = Cost {
        cycles,
        temp_bytes,
        tiles: solution.get(vars.tiles_used).get(),
        per_step_cycle_diff: 0,
    };

    Ok((PoolPlan { partition, cycles, temp_bytes }, cost))
}
