//! Sparse-dense matmul planner.
//!
//! Solves one constraint model -- a flat (group, row, column, batch)
//! partition -- against the forward pass's cost, the way the convolution
//! planner solves one partition per joint plan. GradA/gradW, when
//! requested, are not separate candidates competing with forward on
//! cost: they run over the *same* solved partition, so once the model
//! is solved they are derived directly from it with the plain
//! `tileplan-estimators` functions rather than a fresh model per pass.

use tileplan_core::prelude::{
    Cost, SparseCostBreakdown, SparseMatMulParams, SparseMethod, SparseOptions, SparsePartition,
    SparsePassPlan, SparsePlan,
};
use tileplan_core::target::TargetDescriptor;
use tileplan_core::{Error, Result};
use tileplan_estimators::{exchange, reduce as reduce_est, sparse as sparse_est, ReduceParams};
use tileplan_methods::sparse::{forward_candidate, grad_a_candidate, grad_w_candidate, SparseMethodCandidate};
use tileplan_solver::{Model, Scheduler, Value, Variable};

struct SparseModelVars {
    group_split: Variable,
    row_split: Variable,
    col_split: Variable,
    z_split: Variable,
    tiles_used: Variable,
    temp_bytes: Variable,
    meta_bucket_elems: Variable,
    value_bucket_elems: Variable,
    distribution_exchange: Variable,
    gather: Variable,
    elementwise: Variable,
    propagating_exchange: Variable,
    reduce: Variable,
}

/// Builds the partition search model around the forward pass's own cost
/// shape (distribution exchange, gather+elementwise, propagating
/// exchange, reduce). GradA/gradW never search their own partition --
/// they are derived afterwards from whatever partition this model picks.
fn build_model(params: &SparseMatMulParams, target: &TargetDescriptor, options: &SparseOptions) -> (Model, SparseModelVars) {
    let mut m = Model::new();

    let tiles_const = m.add_constant(Value(target.total_tiles().max(1)), "tiles");
    let groups_const = m.add_constant(Value(params.num_groups.max(1)), "groups");
    let rows_const = m.add_constant(Value(params.in_chans.max(1)), "rows");
    let cols_const = m.add_constant(Value(params.out_chans.max(1)), "cols");
    let z_const = m.add_constant(Value(params.batch_size.max(1)), "z");

    let group_split = m.add_variable(Value::ONE, Value(params.num_groups.max(1)), "group_split");
    m.factor_of(groups_const, group_split);
    let row_split = m.add_variable(Value::ONE, Value(params.in_chans.max(1)), "row_split");
    m.factor_of(rows_const, row_split);
    let col_split = m.add_variable(Value::ONE, Value(params.out_chans.max(1)), "col_split");
    m.factor_of(cols_const, col_split);
    let z_split = m.add_variable(Value::ONE, Value(params.batch_size.max(1)), "z_split");
    m.factor_of(z_const, z_split);

    let tiles_used = m.product(&[group_split, row_split, col_split, z_split], "tiles_used");
    m.less_or_equal(tiles_used, tiles_const);

    let rows_per_tile = m.ceildiv(rows_const, row_split, "rows_per_tile");
    let cols_per_tile = m.ceildiv(cols_const, col_split, "cols_per_tile");
    let z_per_tile = m.ceildiv(z_const, z_split, "z_per_tile");

    let nz_ratio = params.sparsity.nz_ratio;
    let oversize = options.meta_info_bucket_oversize_proportion;
    let meta_bytes = 4u32;
    let value_bytes = target.type_size(params.input_type);
    let atom_bytes = target.exchange_atom_bytes;

    let meta_bucket_elems = m.call(&[rows_per_tile, cols_per_tile], Value(u64::MAX), "meta_bucket_elems", move |args| {
        let (meta, _) = sparse_est::bucket_sizes(args[0].get(), args[1].get(), nz_ratio, oversize, meta_bytes, value_bytes, atom_bytes);
        Some(Value(meta))
    });
    let value_bucket_elems = m.call(&[rows_per_tile, cols_per_tile], Value(u64::MAX), "value_bucket_elems", move |args| {
        let (_, value) = sparse_est::bucket_sizes(args[0].get(), args[1].get(), nz_ratio, oversize, meta_bytes, value_bytes, atom_bytes);
        Some(Value(value))
    });

    let bucket_bytes = m.call(&[meta_bucket_elems, value_bucket_elems], Value(u64::MAX), "bucket_bytes", move |args| {
        Some(Value(args[0].get() * meta_bytes as u64 + args[1].get() * value_bytes as u64))
    });

    let exchange_bytes_per_cycle = target
        .hierarchy
        .last()
        .map(|h| h.exchange_bytes_per_cycle)
        .unwrap_or(1.0);
    let dense_type_size = target.type_size(params.input_type) as u64;
    let dense_elems = m.product(&[rows_per_tile, z_per_tile], "dense_elems");
    let distribution_exchange = m.call(&[bucket_bytes, dense_elems], Value(u64::MAX), "distribution_exchange", move |args| {
        let dense_bytes = args[1].get() * dense_type_size;
        Some(Value(exchange::two_operand_exchange_cycles(args[0].get(), dense_bytes, exchange_bytes_per_cycle)))
    });

    let num_worker_contexts = target.num_worker_contexts;
    let nonzero_groups = m.call(&[rows_per_tile, cols_per_tile], Value(u64::MAX), "nonzero_groups", move |args| {
        Some(Value(sparse_est::expected_nonzero_groups(args[0].get(), args[1].get(), nz_ratio) as u64))
    });
    let gather = m.call(&[nonzero_groups], Value(u64::MAX), "gather", move |args| {
        Some(Value(sparse_est::sparse_gather_cycles(args[0].get(), num_worker_contexts)))
    });
    let elementwise = m.call(&[nonzero_groups, z_per_tile], Value(u64::MAX), "elementwise", move |args| {
        Some(Value(sparse_est::sparse_dense_elementwise_cycles(args[0].get(), args[1].get(), num_worker_contexts)))
    });

    let propagating_exchange = m.call(&[bucket_bytes, row_split], Value(u64::MAX), "propagating_exchange", move |args| {
        Some(Value(sparse_est::propagating_exchange_cycles(args[0].get(), args[1].get(), exchange_bytes_per_cycle)))
    });

    let data_path_width = target.data_path_width as u32;
    let float_partials = options.partials_type.is_float();
    let reduce_out = m.product(&[cols_per_tile, z_per_tile], "reduce_out");
    let reduce = m.call(&[reduce_out, row_split], Value(u64::MAX), "reduce", move |args| {
        let depth = args[1].get();
        if depth <= 1 {
            return Some(Value::ZERO);
        }
        let p = ReduceParams {
            out_size: args[0].get(),
            reduction_depth: depth,
            data_path_width,
            float_partials,
            float_output: float_partials,
            single_input_specialisation: false,
            fast_reduce: true,
            num_worker_contexts,
        };
        Some(Value(reduce_est::reduce_cycle_estimate(&p)))
    });

    let ping_pong_bytes = m.call(&[bucket_bytes], Value(u64::MAX), "ping_pong_bytes", |args| {
        Some(Value(args[0].get() * 2))
    });
    let temp_bytes = m.sum(&[ping_pong_bytes, dense_elems], "temp_bytes_raw");

    let vars = SparseModelVars {
        group_split,
        row_split,
        col_split,
        z_split,
        tiles_used,
        temp_bytes,
        meta_bucket_elems,
        value_bucket_elems,
        distribution_exchange,
        gather,
        elementwise,
        propagating_exchange,
        reduce,
    };
    (m, vars)
}

/// The already-solved partition's per-tile shape, handed to the
/// gradA/gradW pure-function pass computations.
struct PassInputs {
    rows_per_tile: u64,
    cols_per_tile: u64,
    z_per_tile: u64,
    row_split: u64,
}

struct PassFixedParams {
    nz_ratio: f64,
    oversize: f64,
    meta_bytes: u32,
    value_bytes: u32,
    atom_bytes: u32,
    exchange_bytes_per_cycle: f64,
    num_worker_contexts: u32,
    data_path_width: u32,
    float_partials: bool,
}

/// Computes one pass's method/bucket-sizing/cost directly against an
/// already-solved partition, instead of re-running the solver.
/// `swap_bucket_axes` mirrors the transpose access pattern gradA uses:
/// its bucket shape is the forward one with the row/column dimensions
/// swapped.
fn compute_pass(candidate: SparseMethodCandidate, swap_bucket_axes: bool, inputs: &PassInputs, fixed: &PassFixedParams) -> SparsePassPlan {
    let (bucket_rows, bucket_cols) = if swap_bucket_axes {
        (inputs.cols_per_tile, inputs.rows_per_tile)
    } else {
        (inputs.rows_per_tile, inputs.cols_per_tile)
    };
    let (meta_info_bucket_elems, own_value_bucket_elems) = sparse_est::bucket_sizes(
        bucket_rows,
        bucket_cols,
        fixed.nz_ratio,
        fixed.oversize,
        fixed.meta_bytes,
        fixed.value_bytes,
        fixed.atom_bytes,
    );
    let value_bucket_elems = if candidate.reuses_forward_buckets { 0 } else { own_value_bucket_elems };
    let bucket_bytes = meta_info_bucket_elems * fixed.meta_bytes as u64 + own_value_bucket_elems * fixed.value_bytes as u64;

    let distribution_exchange = if candidate.reuses_forward_buckets {
        0
    } else {
        let dense_bytes = inputs.rows_per_tile * inputs.z_per_tile * fixed.value_bytes as u64;
        exchange::two_operand_exchange_cycles(bucket_bytes, dense_bytes, fixed.exchange_bytes_per_cycle)
    };

    let nonzero_groups = sparse_est::expected_nonzero_groups(bucket_rows, bucket_cols, fixed.nz_ratio) as u64;
    let gather = sparse_est::sparse_gather_cycles(nonzero_groups, fixed.num_worker_contexts);
    let elementwise = sparse_est::sparse_dense_elementwise_cycles(nonzero_groups, inputs.z_per_tile, fixed.num_worker_contexts);

    let propagating_exchange = if candidate.reuses_forward_buckets {
        0
    } else {
        sparse_est::propagating_exchange_cycles(bucket_bytes, inputs.row_split, fixed.exchange_bytes_per_cycle)
    };

    let reduce = if inputs.row_split <= 1 {
        0
    } else {
        reduce_est::reduce_cycle_estimate(&ReduceParams {
            out_size: inputs.cols_per_tile * inputs.z_per_tile,
            reduction_depth: inputs.row_split,
            data_path_width: fixed.data_path_width,
            float_partials: fixed.float_partials,
            float_output: fixed.float_partials,
            single_input_specialisation: false,
            fast_reduce: true,
            num_worker_contexts: fixed.num_worker_contexts,
        })
    };

    SparsePassPlan {
        method: candidate.method,
        meta_info_bucket_elems,
        value_bucket_elems,
        reuses_forward_buckets: candidate.reuses_forward_buckets,
        breakdown: SparseCostBreakdown {
            distribution_exchange,
            gather,
            elementwise,
            propagating_exchange,
            reduce,
        },
    }
}

/// A pass that reuses the forward bucket allocation contributes no extra
/// temporary memory of its own; otherwise it pays for its own ping-pong
/// bucket pair plus its dense operand.
fn pass_temp_bytes(pass: &SparsePassPlan, inputs: &PassInputs, value_bytes: u32, meta_bytes: u32) -> u64 {
    if pass.reuses_forward_buckets {
        return 0;
    }
    let bucket_bytes = pass.meta_info_bucket_elems * meta_bytes as u64 + pass.value_bucket_elems * value_bytes as u64;
    let ping_pong_bytes = bucket_bytes * 2;
    let dense_elems = inputs.rows_per_tile * inputs.z_per_tile;
    ping_pong_bytes + dense_elems
}

/// Plans one sparse-dense matmul invocation: solves the shared partition
/// against the forward pass, then derives whichever of gradA/gradW were
/// requested against that same partition. The returned cost sums cycles
/// across present passes and takes the max of their temp-byte footprints,
/// since the passes run sequentially over the same tile memory.
pub fn plan_sparse(params: &SparseMatMulParams, target: &TargetDescriptor, options: &SparseOptions) -> Result<(SparsePlan, Cost)> {
    if params.has_zero_dim() {
        let forward = SparsePassPlan {
            method: SparseMethod::Forward,
            meta_info_bucket_elems: 0,
            value_bucket_elems: 0,
            reuses_forward_buckets: false,
            breakdown: SparseCostBreakdown::default(),
        };
        let plan = SparsePlan {
            partition: SparsePartition::default(),
            forward,
            grad_a: None,
            grad_w: None,
        };
        return Ok((plan, Cost::default()));
    }

    let bytes_per_tile = target.bytes_per_tile as f64;
    let memory_bound = if options.available_memory_proportion > 0.0 {
        Some((bytes_per_tile * options.available_memory_proportion) as u64)
    } else {
        None
    };

    let (mut model, vars) = build_model(params, target, options);
    if let Some(bound) = memory_bound {
        let bound_var = model.add_constant(Value(bound), "memory_bound");
        model.less_or_equal(vars.temp_bytes, bound_var);
    }
    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "groupSplit"], vars.group_split);
    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "rowSplit"], vars.row_split);
    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "colSplit"], vars.col_split);
    crate::constraints_tree::apply_int_constraint(&mut model, &options.plan_constraints, &["partition", "zSplit"], vars.z_split);

    let objectives = [vars.distribution_exchange, vars.gather, vars.elementwise, vars.propagating_exchange, vars.reduce];
    // The solver minimises lexicographically; summing the itemised cycle
    // terms into one variable first gives a true total-cycles objective
    // instead of stage-by-stage lexicographic preference.
    let total = model.sum(&objectives, "total_cycles");
    let solution = Scheduler::new(&mut model)
        .minimize(&[total, vars.tiles_used])
        .map_err(|_| Error::Infeasible("no sparse matmul plan satisfies the given constraints".to_string()))?;

    let partition = SparsePartition {
        group_split: solution.get(vars.group_split).get(),
        row_split: solution.get(vars.row_split).get(),
        col_split: solution.get(vars.col_split).get(),
        z_split: solution.get(vars.z_split).get(),
    };
    let tiles_used = solution.get(vars.tiles_used).get();

    let forward = SparsePassPlan {
        method: forward_candidate().method,
        meta_info_bucket_elems: solution.get(vars.meta_bucket_elems).get(),
        value_bucket_elems: solution.get(vars.value_bucket_elems).get(),
        reuses_forward_buckets: false,
        breakdown: SparseCostBreakdown {
            distribution_exchange: solution.get(vars.distribution_exchange).get(),
            gather: solution.get(vars.gather).get(),
            elementwise: solution.get(vars.elementwise).get(),
            propagating_exchange: solution.get(vars.propagating_exchange).get(),
            reduce: solution.get(vars.reduce).get(),
        },
    };
    let forward_temp_bytes = solution.get(vars.temp_bytes).get();

    let inputs = PassInputs {
        rows_per_tile: params.in_chans.max(1).div_ceil(partition.row_split.max(1)),
        cols_per_tile: params.out_chans.max(1).div_ceil(partition.col_split.max(1)),
        z_per_tile: params.batch_size.max(1).div_ceil(partition.z_split.max(1)),
        row_split: partition.row_split,
    };
    let meta_bytes = 4u32;
    let value_bytes = target.type_size(params.input_type);
    let fixed = PassFixedParams {
        nz_ratio: params.sparsity.nz_ratio,
        oversize: options.meta_info_bucket_oversize_proportion,
        meta_bytes,
        value_bytes,
        atom_bytes: target.exchange_atom_bytes,
        exchange_bytes_per_cycle: target.hierarchy.last().map(|h| h.exchange_bytes_per_cycle).unwrap_or(1.0),
        num_worker_contexts: target.num_worker_contexts,
        data_path_width: target.data_path_width as u32,
        float_partials: options.partials_type.is_float(),
    };

    let (grad_a, grad_a_temp_bytes) = match grad_a_candidate(options.do_grad_a_pass, options.shared_buckets) {
        Some(candidate) => {
            let pass = compute_pass(candidate, true, &inputs, &fixed);
            let temp = pass_temp_bytes(&pass, &inputs, value_bytes, meta_bytes);
            (Some(pass), temp)
        }
        None => (None, 0),
    };
    let (grad_w, grad_w_temp_bytes) = match grad_w_candidate(options.do_grad_w_pass) {
        Some(candidate) => {
            let pass = compute_pass(candidate, false, &inputs, &fixed);
            let temp = pass_temp_bytes(&pass, &inputs, value_bytes, meta_bytes);
            (Some(pass), temp)
        }
        None => (None, 0),
    };

    let cycles = forward.breakdown.total_cycles()
        + grad_a.as_ref().map(|p| p.breakdown.total_cycles()).unwrap_or(0)
        + grad_w.as_ref().map(|p| p.breakdown.total_cycles()).unwrap_or(0);
    let temp_bytes = forward_temp_bytes.max(grad_a_temp_bytes).max(grad_w_temp_bytes);

    let plan = SparsePlan {
        partition,
        forward,
        grad_a,
        grad_w,
    };
    let cost = Cost {
        cycles,
        temp_bytes,
        tiles: tiles_used,
        per_step_cycle_diff: 0,
    };

    Ok((plan, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileplan_core::prelude::{NumType, SparsityParams};

    fn params() -> SparseMatMulParams {
        SparseMatMulParams {
            input_type: NumType::Float,
            num_groups: 1,
            in_chans: 512,
            out_chans: 512,
            batch_size: 4,
            sparsity: SparsityParams {
                nz_ratio: 0.1,
                block_sparse: false,
            },
        }
    }

    #[test]
    fn forward_only_has_no_grad_a_pass() {
        let target = TargetDescriptor::reference_ipu(1216, 1);
        let options = SparseOptions {
            do_grad_a_pass: false,
            do_grad_w_pass: false,
            ..SparseOptions::default()
        };
        let (plan, _cost) = plan_sparse(&params(), &target, &options).unwrap();
        assert_eq!(plan.forward.method, SparseMethod::Forward);
        assert!(plan.grad_a.is_none());
        assert!(plan.grad_w.is_none());
    }

    #[test]
    fn shared_buckets_grad_a_is_transpose_with_swapped_bucket_shape() {
        let target = TargetDescriptor::reference_ipu(1216, 1);
        let options = SparseOptions {
            do_grad_a_pass: true,
            shared_buckets: true,
            ..SparseOptions::default()
        };
        let (plan, _cost) = plan_sparse(&params(), &target, &options).unwrap();
        let grad_a = plan.grad_a.expect("grad_a pass requested");
        assert_eq!(grad_a.method, SparseMethod::Transpose);
        assert!(grad_a.reuses_forward_buckets);
        assert_eq!(grad_a.value_bucket_elems, 0);

        let (meta_swapped, _) = sparse_est::bucket_sizes(
            params().out_chans.div_ceil(plan.partition.col_split),
            params().in_chans.div_ceil(plan.partition.row_split),
            params().sparsity.nz_ratio,
            options.meta_info_bucket_oversize_proportion,
            4,
            target.type_size(NumType::Float),
            target.exchange_atom_bytes,
        );
        assert_eq!(grad_a.meta_info_bucket_elems, meta_swapped);
    }

    #[test]
    fn unshared_grad_a_gets_its_own_method_and_buckets() {
        let target = TargetDescriptor::reference_ipu(1216, 1);
        let options = SparseOptions {
            do_grad_a_pass: true,
            shared_buckets: false,
            ..SparseOptions::default()
        };
        let (plan, _cost) = plan_sparse(&params(), &target, &options).unwrap();
        let grad_a = plan.grad_a.expect("grad_a pass requested");
        assert_eq!(grad_a.method, SparseMethod::GradA);
        assert!(!grad_a.reuses_forward_buckets);
        assert!(grad_a.value_bucket_elems > 0);
    }

    #[test]
    fn grad_w_pass_coexists_with_forward() {
        let target = TargetDescriptor::reference_ipu(1216, 1);
        let options = SparseOptions {
            do_grad_w_pass: true,
            ..SparseOptions::default()
        };
        let (plan, cost) = plan_sparse(&params(), &target, &options).unwrap();
        let grad_w = plan.grad_w.expect("grad_w pass requested");
        assert_eq!(grad_w.method, SparseMethod::GradW);
        assert_eq!(cost.cycles, plan.forward.breakdown.total_cycles() + grad_w.breakdown.total_cycles());
    }
}
