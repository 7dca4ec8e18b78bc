//! Embedding slice/update planner.
//!
//! A gather (`Slice`) or scatter-accumulate (`Update`) over a table of
//! `numEntries x embeddingSize`, driven by `numIndices` lookups. The
//! partition splits the indices being gathered and the embedding-size
//! axis; `Update` additionally needs a reduction across tiles that land on
//! the same table row from different index splits, so its cost carries an
//! extra accumulate term `Slice` does not.

use tileplan_core::prelude::{Cost, EmbeddingOp, EmbeddingParams, EmbeddingPartition, EmbeddingPlan};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::Result;
use tileplan_estimators::worker::supervisor_cycles;
use tileplan_solver::{Model, Scheduler, Value, Variable};

struct EmbeddingModelVars {
    index_split: Variable,
    embedding_size_split: Variable,
    tiles_used: Variable,
    cycles: Variable,
    temp_bytes: Variable,
}

fn build_model(params: &EmbeddingParams, target: &TargetDescriptor) -> (Model, EmbeddingModelVars) {
    let mut m = Model::new();

    let tiles_const = m.add_constant(Value(target.total_tiles().max(1)), "tiles");
    let indices_const = m.add_constant(Value(params.num_indices.max(1)), "indices");
    let size_const = m.add_constant(Value(params.embedding_size.max(1)), "size");

    let index_split = m.add_variable(Value::ONE, Value(params.num_indices.max(1)), "index_split");
    m.factor_of(indices_const, index_split);
    let embedding_size_split = m.add_variable(Value::ONE, Value(params.embedding_size.max(1)), "embedding_size_split");
    m.factor_of(size_const, embedding_size_split);

    let tiles_used = m.product(&[index_split, embedding_size_split], "tiles_used");
    m.less_or_equal(tiles_used, tiles_const);

    let indices_per_tile = m.ceildiv(indices_const, index_split, "indices_per_tile");
    let size_per_tile = m.ceildiv(size_const, embedding_size_split, "size_per_tile");
    let elems_per_tile = m.product(&[indices_per_tile, size_per_tile], "elems_per_tile");

    let num_worker_contexts = target.num_worker_contexts;
    let is_update = matches!(params.op, EmbeddingOp::Update);
    let compute = m.call(&[elems_per_tile], Value(u64::MAX), "compute", move |args| {
        let per_elem = if is_update { 3 } else { 2 };
        Some(Value(supervisor_cycles(args[0].get(), num_worker_contexts, move |n| n * per_elem + 6)))
    });

    // Update accumulates contributions from every index that maps to the
    // same table row; modelled as one extra pass proportional to how many
    // index-split tiles can collide, i.e. `index_split` itself.
    let accumulate = m.call(&[size_per_tile, index_split], Value(u64::MAX), "accumulate", move |args| {
        if !is_update || args[1].get() <= 1 {
            return Some(Value::ZERO);
        }
        Some(Value(supervisor_cycles(args[0].get() * args[1].get(), num_worker_contexts, |n| n * 4 + 6)))
    });

    let cycles = m.sum(&[compute, accumulate], "cycles");

    let type_size = target.type_size(params.input_type) as u64;
    let temp_bytes = m.call(&[elems_per_tile], Value(u64::MAX), "temp_bytes", move |args| {
        Some(Value(args[0].get() * type_size))
    });

    let vars = EmbeddingModelVars {
        index_split,
        embedding_size_split,
        tiles_used,
        cycles,
        temp_bytes,
    };
    (m, vars)
}

/// Plans one embedding slice/update invocation.
pub fn plan_embedding(
    params: &EmbeddingParams,
    target: &TargetDescriptor,
    available_memory_proportion: f64,
) -> Result<(EmbeddingPlan, Cost)> {
    if params.has_zero_dim() {
        return Ok((
            EmbeddingPlan {
                partition: EmbeddingPartition::default(),
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
        .map_err(|_| tileplan_core::Error::Infeasible("no embedding plan satisfies the given constraints".to_string()))?;

    let partition = EmbeddingPartition {
        index_split: solution.get(vars.index_split).get(),
        embedding_size_split: solution.get(vars.embedding_size_split).get(),
    };
    let cycles = solution.get(vars.cycles).get();
    let temp_bytes = solution.get(vars.temp_bytes).get();
    let cost = Cost {
        cycles,
        temp_bytes,
        tiles: solution.get(vars.tiles_used).get(),
        per_step_cycle_diff: 0,
    };

    Ok((EmbeddingPlan { partition, cycles, temp_bytes }, cost))
}
