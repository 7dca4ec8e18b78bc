//! Constraint-model builder for convolution.
//!
//! Builds one [`tileplan_solver::Model`] per (transform subset, method
//! candidate) combination the search driver visits. The model covers
//! exactly one partition level above the implicit tile leaf -- typically
//! one level plus the tile leaf -- with variables named after the
//! `PartitionRecord` fields they ultimately populate.

use tileplan_core::prelude::{
    ChannelSplit, ConvMethod, ConvParams, CostBreakdown, GrainSizes, MethodParams, NumType,
    PartitionRecord, TypeRecord,
};
use tileplan_core::target::TargetDescriptor;
use tileplan_estimators::conv::ConvCycleParams;
use tileplan_methods::ConvMethodCandidate;
use tileplan_solver::{Model, Value, Variable};

/// Handles into a built model needed to decode a [`tileplan_solver::Solution`]
/// back into a `PartitionRecord` and `CostBreakdown`.
pub struct ConvModelVars {
    pub batch_split: Variable,
    pub conv_group_split: Variable,
    pub field_split: Vec<Variable>,
    pub kernel_split: Vec<Variable>,
    pub out_chan_parallel: Variable,
    pub out_chan_serial: Variable,
    pub in_chan_parallel: Variable,
    pub in_chan_serial: Variable,
    pub tiles_used: Variable,
    pub cycles: Variable,
    pub temp_bytes: Variable,
    pub per_step_cycle_diff: Variable,
    pub breakdown: BreakdownVars,
}

#[derive(Clone, Copy)]
pub struct BreakdownVars {
    pub rearrange_before_slice: Variable,
    pub dynamic_slice: Variable,
    pub transform: Variable,
    pub exchange_in: Variable,
    pub exchange_weights: Variable,
    pub exchange_reduce: Variable,
    pub tile_level_transform: Variable,
    pub partial_calc: Variable,
    pub reduce: Variable,
    pub dynamic_update: Variable,
    pub add_in_place: Variable,
    pub cast: Variable,
}

/// Static (split-independent) inputs to the model: the transformed
/// operator, the chosen method, the target, and the handful of host-side
/// flags that change which constraints get added but are not themselves
/// search variables.
pub struct BuildInputs<'a> {
    pub params: &'a ConvParams,
    pub target: &'a TargetDescriptor,
    pub tiles_available: u64,
    pub exchange_bytes_per_cycle: f64,
    pub method: ConvMethodCandidate,
    pub partials_type: NumType,
    pub is_joint_plan: bool,
    pub reference_cost: Option<tileplan_core::prelude::Cost>,
}

fn dispatch_partial_calc(
    method: ConvMethod,
    conv_groups_per_group: u64,
    cycle_params: ConvCycleParams,
) -> u64 {
    use tileplan_estimators::conv as est;
    match method {
        ConvMethod::Amp => {
            let kernel_elems: u64 = cycle_params.kernel_shape.iter().product::<u64>().max(1);
            if kernel_elems > 1 {
                est::amp_nx1_cycles(&cycle_params)
            } else {
                est::amp_1x1_outer_loop_cycles(&cycle_params, 1, 1)
            }
        }
        ConvMethod::Slic => est::slic_cycles(&cycle_params, true, true),
        ConvMethod::Mac => est::horizontal_mac_cycles(&cycle_params),
        ConvMethod::Hmac => est::horizontal_mac_cycles(&cycle_params),
        ConvMethod::Vmac => est::vmac_cycles(&cycle_params, conv_groups_per_group),
        ConvMethod::OuterProduct => {
            let width = cycle_params.output_field_shape.iter().product::<u64>().max(1);
            est::outer_product_cycles(cycle_params.float_activations, width, cycle_params.num_worker_contexts)
        }
    }
}

/// The partition-level search variables: the same split variables are
/// reused across a joint plan's forward/backward/weight-update
/// sub-models rather than re-searched per sub-model.
pub struct PartitionVars {
    pub batch_split: Variable,
    pub conv_group_split: Variable,
    pub field_split: Vec<Variable>,
    pub kernel_split: Vec<Variable>,
    pub out_chan_parallel: Variable,
    pub out_chan_serial: Variable,
    pub in_chan_parallel: Variable,
    pub in_chan_serial: Variable,
    pub tiles_used: Variable,
}

/// A partition already solved by the forward pass, fed back in as fixed
/// constants for the backward/weight-update sub-models of a joint plan.
pub struct FixedPartition {
    pub batch_split: u64,
    pub conv_group_split: u64,
    pub field_split: Vec<u64>,
    pub kernel_split: Vec<u64>,
    pub in_chan_parallel: u64,
    pub in_chan_serial: u64,
    pub out_chan_parallel: u64,
    pub out_chan_serial: u64,
}

/// Builds the free partition-search variables for one convolution model:
/// batch/group/field/kernel splits plus the channel parallel/serial
/// splits, with the architecture's factor-of and at-most-one-serial-split
/// constraints.
fn build_free_partition(m: &mut Model, params: &ConvParams, tiles_available: u64, is_joint_plan: bool) -> PartitionVars {
    let tiles_const = m.add_constant(Value(tiles_available.max(1)), "tiles");

    let batch_const = m.add_constant(Value(params.batch_size.max(1)), "batch");
    let batch_split = m.add_variable(Value::ONE, Value(params.batch_size.max(1)), "batch_split");
    m.factor_of(batch_const, batch_split);

    let conv_groups_const = m.add_constant(Value(params.num_conv_groups.max(1)), "conv_groups");
    let conv_group_split = m.add_variable(Value::ONE, Value(params.num_conv_groups.max(1)), "conv_group_split");
    m.factor_of(conv_groups_const, conv_group_split);

    let num_field_dims = params.num_field_dims();
    let mut field_size_consts = Vec::with_capacity(num_field_dims);
    let mut field_split = Vec::with_capacity(num_field_dims);
    for d in 0..num_field_dims {
        let size = params.output_size(d).max(1);
        let size_var = m.add_constant(Value(size), format!("field_size_{d}"));
        let split_var = m.add_variable(Value::ONE, Value(size), format!("field_split_{d}"));
        m.factor_of(size_var, split_var);
        field_size_consts.push(size_var);
        field_split.push(split_var);
    }

    let num_kernel_dims = params.kernel_shape.len();
    let mut kernel_size_consts = Vec::with_capacity(num_kernel_dims);
    let mut kernel_split = Vec::with_capacity(num_kernel_dims);
    for (d, &k) in params.kernel_shape.iter().enumerate() {
        let k = k.max(1);
        let size_var = m.add_constant(Value(k), format!("kernel_size_{d}"));
        let split_var = m.add_variable(Value::ONE, Value(k), format!("kernel_split_{d}"));
        if d + 1 == num_kernel_dims {
            // Architecture limitation: the innermost kernel dimension is
            // never parallel-split.
            m.equal_to(split_var, Value::ONE, format!("kernel_split_{d}_fixed"));
        } else {
            m.factor_of(size_var, split_var);
        }
        kernel_size_consts.push(size_var);
        kernel_split.push(split_var);
    }

    let in_chan_total = params.total_in_chans().max(1);
    let out_chan_total = params.total_out_chans().max(1);
    let in_chan_const = m.add_constant(Value(in_chan_total), "in_chan_total");
    let out_chan_const = m.add_constant(Value(out_chan_total), "out_chan_total");

    let in_chan_parallel = m.add_variable(Value::ONE, Value(in_chan_total), "in_chan_parallel");
    m.factor_of(in_chan_const, in_chan_parallel);
    let in_chan_serial = m.add_variable(Value::ONE, Value(in_chan_total), "in_chan_serial");
    m.factor_of(in_chan_const, in_chan_serial);

    let out_chan_parallel = m.add_variable(Value::ONE, Value(out_chan_total), "out_chan_parallel");
    m.factor_of(out_chan_const, out_chan_parallel);
    let out_chan_serial = m.add_variable(Value::ONE, Value(out_chan_total), "out_chan_serial");
    m.factor_of(out_chan_const, out_chan_serial);

    // For a joint fully-connected plan the forward-pass output-channel
    // parallel split is fixed to 1.
    if is_joint_plan {
        m.equal_to(out_chan_parallel, Value::ONE, "joint_plan_out_chan_parallel");
    }

    // Only one of the input-channel / output-channel serial splits may
    // exceed 1 per plan.
    let one = m.one();
    let in_extra = m.sub(in_chan_serial, one, "in_chan_serial_extra");
    let out_extra = m.sub(out_chan_serial, one, "out_chan_serial_extra");
    let serial_conflict = m.product(&[in_extra, out_extra], "serial_conflict");
    m.equal_to(serial_conflict, Value::ZERO, "at_most_one_serial_split");

    let mut parallel_terms = vec![batch_split, conv_group_split, in_chan_parallel, out_chan_parallel];
    parallel_terms.extend(field_split.iter().copied());
    let tiles_used = m.product(&parallel_terms, "tiles_used");
    m.less_or_equal(tiles_used, tiles_const);

    PartitionVars {
        batch_split,
        conv_group_split,
        field_split,
        kernel_split,
        out_chan_parallel,
        out_chan_serial,
        in_chan_parallel,
        in_chan_serial,
        tiles_used,
    }
}

/// Builds one pass's cost subgraph -- cycles, temp bytes, and the itemised
/// breakdown -- against an already-built [`PartitionVars`]. Called once
/// for an ordinary plan's forward pass, and up to three times (forward,
/// backward, weight-update) for a joint fully-connected plan, each time
/// with the partition's split variables reused but the operator's
/// channel/batch roles permuted for that pass.
#[allow(clippy::too_many_arguments)]
fn build_pass_cost(
    m: &mut Model,
    partition: &PartitionVars,
    params: &ConvParams,
    target: &TargetDescriptor,
    method: ConvMethodCandidate,
    partials_type: NumType,
    exchange_bytes_per_cycle: f64,
    is_joint_plan: bool,
    reference_cost: Option<tileplan_core::prelude::Cost>,
) -> (Variable, Variable, Variable, BreakdownVars) {
    let batch_split = partition.batch_split;
    let in_chan_parallel = partition.in_chan_parallel;
    let in_chan_serial = partition.in_chan_serial;
    let out_chan_parallel = partition.out_chan_parallel;
    let out_chan_serial = partition.out_chan_serial;
    let field_split = &partition.field_split;
    let kernel_split = &partition.kernel_split;

    let batch_const = m.add_constant(Value(params.batch_size.max(1)), "pass_batch");
    let num_field_dims = params.num_field_dims();
    let field_size_consts: Vec<Variable> = (0..num_field_dims)
        .map(|d| m.add_constant(Value(params.output_size(d).max(1)), format!("pass_field_size_{d}")))
        .collect();
    let kernel_size_consts: Vec<Variable> = params
        .kernel_shape
        .iter()
        .enumerate()
        .map(|(d, &k)| m.add_constant(Value(k.max(1)), format!("pass_kernel_size_{d}")))
        .collect();
    let in_chan_total = params.total_in_chans().max(1);
    let out_chan_total = params.total_out_chans().max(1);
    let in_chan_const = m.add_constant(Value(in_chan_total), "pass_in_chan_total");
    let out_chan_const = m.add_constant(Value(out_chan_total), "pass_out_chan_total");

    // Per-tile sizes after this level's split.
    let batch_per_tile = m.ceildiv(batch_const, batch_split, "batch_per_tile");
    let field_per_tile: Vec<Variable> = field_size_consts
        .iter()
        .zip(field_split.iter())
        .enumerate()
        .map(|(d, (&size, &split))| m.ceildiv(size, split, format!("field_per_tile_{d}")))
        .collect();
    let kernel_per_tile: Vec<Variable> = kernel_size_consts
        .iter()
        .zip(kernel_split.iter())
        .enumerate()
        .map(|(d, (&size, &split))| m.ceildiv(size, split, format!("kernel_per_tile_{d}")))
        .collect();
    let in_chan_per_tile = m.ceildiv(in_chan_const, in_chan_parallel, "in_chan_per_tile");
    let out_chan_per_tile = m.ceildiv(out_chan_const, out_chan_parallel, "out_chan_per_tile");

    // Partial-calc cycles: delegated to the estimator library via a
    // call-back.
    let float_activations = params.input_type.is_float();
    let float_partials = partials_type.is_float();
    let num_worker_contexts = target.num_worker_contexts;
    let num_conv_units = target.conv_units(params.input_type, partials_type);
    let input_load_elems = target.vector_width_for(params.input_type);
    let coeff_load_bytes = target.memcpy_bytes_per_cycle as u32;
    let method_tag = method.method;
    let conv_groups_per_group = method.conv_groups_per_group;
    let num_field = field_per_tile.len();

    let mut partial_calc_args = vec![batch_per_tile];
    partial_calc_args.extend(field_per_tile.iter().copied());
    partial_calc_args.extend(kernel_per_tile.iter().copied());
    partial_calc_args.push(in_chan_per_tile);
    partial_calc_args.push(out_chan_per_tile);
    let partial_calc = m.call(
        &partial_calc_args,
        Value(u32::MAX as u64),
        "partial_calc",
        move |args: &[Value]| {
            let batch = args[0].get();
            let field: Vec<u64> = args[1..1 + num_field].iter().map(|v| v.get()).collect();
            let kernel_start = 1 + num_field;
            let kernel: Vec<u64> = args[kernel_start..args.len() - 2].iter().map(|v| v.get()).collect();
            let in_chans = args[args.len() - 2].get();
            let out_chans = args[args.len() - 1].get();
            let cycle_params = ConvCycleParams {
                batch_elements: batch,
                output_field_shape: field,
                kernel_shape: kernel,
                in_chans_per_group: in_chans,
                out_chans_per_group: out_chans,
                num_conv_units,
                input_load_elems_per_cycle: input_load_elems,
                coeff_load_bytes_per_cycle: coeff_load_bytes,
                num_worker_contexts,
                float_activations,
                float_partials,
                input_dilation: Vec::new(),
                stride: Vec::new(),
                kernel_height: None,
                window_width: method.slic_window_width,
            };
            Some(Value(dispatch_partial_calc(method_tag, conv_groups_per_group, cycle_params)))
        },
    );

    // Exchange cycles: input activations, weights, and the first reduce
    // stage.
    let in_type_size = target.type_size(params.input_type) as u64;
    let out_type_size = target.type_size(params.output_type) as u64;
    let supports_shared_bus = target.supports_shared_exchange_bus;
    let tiles_per_shared_bus = target.tiles_per_shared_exchange_bus;

    let in_elems = m.product(&{
        let mut v = vec![batch_per_tile, in_chan_per_tile];
        v.extend(field_per_tile.iter().copied());
        v
    }, "in_elems_per_tile");
    let exchange_in = m.call(&[in_elems], Value(u32::MAX as u64), "exchange_in", move |args| {
        let bytes = args[0].get() * in_type_size;
        Some(Value(tileplan_estimators::exchange::exchange_cycles(
            bytes,
            exchange_bytes_per_cycle,
            supports_shared_bus,
            tiles_per_shared_bus,
            tiles_per_shared_bus,
        )))
    });

    let weight_type_size = target.type_size(params.input_type) as u64;
    let weight_elems = m.product(
        &{
            let mut v = vec![in_chan_per_tile, out_chan_per_tile];
            v.extend(kernel_per_tile.iter().copied());
            v
        },
        "weight_elems_per_tile",
    );
    let exchange_weights = m.call(&[weight_elems], Value(u32::MAX as u64), "exchange_weights", move |args| {
        let bytes = args[0].get() * weight_type_size;
        Some(Value(tileplan_estimators::exchange::exchange_cycles(
            bytes,
            exchange_bytes_per_cycle,
            supports_shared_bus,
            tiles_per_shared_bus,
            tiles_per_shared_bus,
        )))
    });

    let partials_type_size = target.type_size(partials_type) as u64;
    let out_elems = m.product(&{
        let mut v = vec![batch_per_tile, out_chan_per_tile];
        v.extend(field_per_tile.iter().copied());
        v
    }, "out_elems_per_tile");
    let exchange_reduce = m.call(
        &[out_elems, in_chan_serial],
        Value(u32::MAX as u64),
        "exchange_reduce",
        move |args| {
            let depth = args[1].get().max(1);
            if depth <= 1 {
                return Some(Value::ZERO);
            }
            let bytes = args[0].get() * partials_type_size * depth;
            Some(Value(tileplan_estimators::exchange::exchange_cycles(
                bytes,
                exchange_bytes_per_cycle,
                supports_shared_bus,
                tiles_per_shared_bus,
                tiles_per_shared_bus,
            )))
        },
    );

    // Transform (rearrange/regroup) cycles: proportional to the weight
    // bytes moved at this level.
    let memcpy_bytes_per_cycle = target.memcpy_bytes_per_cycle;
    let transform = m.call(&[weight_elems], Value(u32::MAX as u64), "transform", move |args| {
        let bytes = args[0].get() * weight_type_size;
        let counts = tileplan_estimators::transform::TransformByteCounts {
            rearrange_input_bytes: bytes / 4,
            rearrange_weights_bytes: bytes / 2,
            rearrange_output_bytes: bytes / 8,
            regroup_output_bytes: bytes / 8,
            regroup_weights_bytes: bytes / 8,
        };
        Some(Value(tileplan_estimators::transform::transform_cycles(&counts, memcpy_bytes_per_cycle)))
    });

    // Tile-level transform (input-channel zero padding for AMP/SLIC): a
    // static function of the grain-induced padding, independent of split.
    let grain_padding = in_chan_total.saturating_sub(params.total_in_chans());
    let vector_width = target.vector_width_for(params.input_type);
    let tile_level_transform = m.add_constant(
        Value(tileplan_estimators::transform::tile_level_zero_pad_cycles(grain_padding, vector_width)),
        "tile_level_transform",
    );

    // Reduction cycles: depth is the input-channel serial split.
    let data_path_width = target.data_path_width as u32;
    let reduce = m.call(&[out_elems, in_chan_serial], Value(u32::MAX as u64), "reduce", move |args| {
        let depth = args[1].get();
        if depth <= 1 {
            return Some(Value::ZERO);
        }
        let reduce_params = tileplan_estimators::ReduceParams {
            out_size: args[0].get(),
            reduction_depth: depth,
            data_path_width,
            float_partials,
            float_output: float_partials,
            single_input_specialisation: false,
            fast_reduce: true,
            num_worker_contexts,
        };
        Some(Value(tileplan_estimators::reduce::reduce_cycle_estimate(&reduce_params)))
    });

    // Dynamic-slice / dynamic-update / add-in-place / cast: zero when the
    // corresponding serial split is 1.
    let dynamic_slice = m.call(&[in_elems, in_chan_serial], Value(u32::MAX as u64), "dynamic_slice", move |args| {
        if args[1].get() <= 1 {
            return Some(Value::ZERO);
        }
        Some(Value(tileplan_estimators::misc::memset_zero_cycles(args[0].get(), 8, num_worker_contexts)))
    });
    let dynamic_update = m.call(&[out_elems, out_chan_serial], Value(u32::MAX as u64), "dynamic_update", move |args| {
        if args[1].get() <= 1 {
            return Some(Value::ZERO);
        }
        Some(Value(tileplan_estimators::misc::memset_zero_cycles(args[0].get(), 8, num_worker_contexts)))
    });
    let add_in_place = m.call(&[out_elems, out_chan_serial], Value(u32::MAX as u64), "add_in_place", move |args| {
        if args[1].get() <= 1 {
            return Some(Value::ZERO);
        }
        Some(Value(tileplan_estimators::misc::cast_cycles(args[0].get(), vector_width, num_worker_contexts)))
    });
    let needs_cast = params.output_type != partials_type;
    let cast = m.call(&[out_elems], Value(u32::MAX as u64), "cast", move |args| {
        if !needs_cast {
            return Some(Value::ZERO);
        }
        Some(Value(tileplan_estimators::misc::cast_cycles(args[0].get(), vector_width, num_worker_contexts)))
    });

    // Rearrange-before-slice: a one-off weight rearrangement required when
    // any serial split exceeds 1 in a fully-connected joint plan
    //.
    let rearrange_before_slice = m.call(
        &[weight_elems, in_chan_serial, out_chan_serial],
        Value(u32::MAX as u64),
        "rearrange_before_slice",
        move |args| {
            if !is_joint_plan || (args[1].get() <= 1 && args[2].get() <= 1) {
                return Some(Value::ZERO);
            }
            let bytes = args[0].get() * weight_type_size;
            Some(Value(tileplan_estimators::transform::rearrange_cycles(bytes, memcpy_bytes_per_cycle)))
        },
    );

    let cycles = m.sum(
        &[
            rearrange_before_slice,
            dynamic_slice,
            transform,
            exchange_in,
            exchange_weights,
            exchange_reduce,
            tile_level_transform,
            partial_calc,
            reduce,
            dynamic_update,
            add_in_place,
            cast,
        ],
        "total_cycles",
    );

    // Temp-byte live-set composition: the max of a few plausible co-existing byte
    // compositions, plus add-in-place and persistent rearrange bytes.
    let rearrange_persist_bytes = m.call(&[weight_elems], Value(u64::MAX), "rearrange_persist_bytes", move |args| {
        Some(Value(args[0].get() * weight_type_size))
    });
    let transform_and_conv_bytes = m.call(&[in_elems, out_elems], Value(u64::MAX), "transform_and_conv_bytes", move |args| {
        Some(Value((args[0].get() + args[1].get()) * in_type_size))
    });
    let reduce_bytes = m.call(&[out_elems, in_chan_serial], Value(u64::MAX), "reduce_bytes", move |args| {
        let depth = args[1].get();
        if depth <= 1 {
            return Some(Value::ZERO);
        }
        Some(Value(args[0].get() * partials_type_size * depth))
    });
    let add_in_place_bytes = m.call(&[out_elems], Value(u64::MAX), "add_in_place_bytes", move |args| {
        Some(Value(args[0].get() * out_type_size))
    });
    let temp_bytes_max = m.max(&[rearrange_persist_bytes, transform_and_conv_bytes, reduce_bytes], "temp_bytes_composition_max");
    let temp_bytes = m.sum(&[temp_bytes_max, add_in_place_bytes], "total_temp_bytes");

    let per_step_cycle_diff = m.call(&[cycles], Value(u64::MAX), "per_step_cycle_diff", move |args| {
        match reference_cost {
            Some(ref r) => Some(Value(args[0].get().saturating_sub(r.cycles))),
            None => Some(Value::ZERO),
        }
    });

    (
        cycles,
        temp_bytes,
        per_step_cycle_diff,
        BreakdownVars {
            rearrange_before_slice,
            dynamic_slice,
            transform,
            exchange_in,
            exchange_weights,
            exchange_reduce,
            tile_level_transform,
            partial_calc,
            reduce,
            dynamic_update,
            add_in_place,
            cast,
        },
    )
}

/// Builds the constraint model for one (transformed-params, method
/// candidate) pair: the free partition search plus its forward-pass cost
/// subgraph.
pub fn build_conv_model(inputs: &BuildInputs<'_>) -> (Model, ConvModelVars) {
    let mut m = Model::new();
    let partition = build_free_partition(&mut m, inputs.params, inputs.tiles_available, inputs.is_joint_plan);
    let (cycles, temp_bytes, per_step_cycle_diff, breakdown) = build_pass_cost(
        &mut m,
        &partition,
        inputs.params,
        inputs.target,
        inputs.method,
        inputs.partials_type,
        inputs.exchange_bytes_per_cycle,
        inputs.is_joint_plan,
        inputs.reference_cost,
    );
    let vars = ConvModelVars {
        batch_split: partition.batch_split,
        conv_group_split: partition.conv_group_split,
        field_split: partition.field_split,
        kernel_split: partition.kernel_split,
        out_chan_parallel: partition.out_chan_parallel,
        out_chan_serial: partition.out_chan_serial,
        in_chan_parallel: partition.in_chan_parallel,
        in_chan_serial: partition.in_chan_serial,
        tiles_used: partition.tiles_used,
        cycles,
        temp_bytes,
        per_step_cycle_diff,
        breakdown,
    };
    (m, vars)
}

/// Computes one joint sub-model's (backward or weight-update) cycles and
/// temp bytes against a partition the forward pass already solved,
/// instead of re-searching it: the split variables are fixed to forward's
/// solved values and only this pass's own cost subgraph is built and
/// propagated to a fixpoint.
pub fn joint_sub_pass_cost(
    fixed: &FixedPartition,
    params: &ConvParams,
    target: &TargetDescriptor,
    method: ConvMethodCandidate,
    partials_type: NumType,
    exchange_bytes_per_cycle: f64,
) -> (u64, u64) {
    let mut m = Model::new();
    let batch_split = m.add_constant(Value(fixed.batch_split.max(1)), "fixed_batch_split");
    let conv_group_split = m.add_constant(Value(fixed.conv_group_split.max(1)), "fixed_conv_group_split");
    let field_split: Vec<Variable> = fixed
        .field_split
        .iter()
        .enumerate()
        .map(|(d, &v)| m.add_constant(Value(v.max(1)), format!("fixed_field_split_{d}")))
        .collect();
    let kernel_split: Vec<Variable> = fixed
        .kernel_split
        .iter()
        .enumerate()
        .map(|(d, &v)| m.add_constant(Value(v.max(1)), format!("fixed_kernel_split_{d}")))
        .collect();
    let in_chan_parallel = m.add_constant(Value(fixed.in_chan_parallel.max(1)), "fixed_in_chan_parallel");
    let in_chan_serial = m.add_constant(Value(fixed.in_chan_serial.max(1)), "fixed_in_chan_serial");
    let out_chan_parallel = m.add_constant(Value(fixed.out_chan_parallel.max(1)), "fixed_out_chan_parallel");
    let out_chan_serial = m.add_constant(Value(fixed.out_chan_serial.max(1)), "fixed_out_chan_serial");
    let mut parallel_terms = vec![batch_split, conv_group_split, in_chan_parallel, out_chan_parallel];
    parallel_terms.extend(field_split.iter().copied());
    let tiles_used = m.product(&parallel_terms, "fixed_tiles_used");

    let partition = PartitionVars {
        batch_split,
        conv_group_split,
        field_split,
        kernel_split,
        out_chan_parallel,
        out_chan_serial,
        in_chan_parallel,
        in_chan_serial,
        tiles_used,
    };
    let (cycles, temp_bytes, _per_step_cycle_diff, _breakdown) =
        build_pass_cost(&mut m, &partition, params, target, method, partials_type, exchange_bytes_per_cycle, true, None);

    m.propagate_to_fixpoint()
        .expect("a partition fixed to already-solved constants is always internally consistent");
    (m.domain(cycles).min().get(), m.domain(temp_bytes).min().get())
}

/// Decodes a solved model into a `PartitionRecord`, `TypeRecord`, grain
/// sizes, method params, and an itemised `CostBreakdown`.
pub fn decode_solution(
    solution: &tileplan_solver::Solution,
    vars: &ConvModelVars,
    method: ConvMethodCandidate,
    partials_type: NumType,
    result_type: NumType,
) -> (PartitionRecord, TypeRecord, GrainSizes, MethodParams, CostBreakdown) {
    let partition = PartitionRecord {
        field_split: vars.field_split.iter().map(|v| solution.get(*v).get()).collect(),
        kernel_split: vars.kernel_split.iter().map(|v| solution.get(*v).get()).collect(),
        batch_split: solution.get(vars.batch_split).get(),
        conv_group_split: solution.get(vars.conv_group_split).get(),
        out_chan_split: ChannelSplit {
            parallel: solution.get(vars.out_chan_parallel).get(),
            serial: solution.get(vars.out_chan_serial).get(),
        },
        in_chan_split: ChannelSplit {
            parallel: solution.get(vars.in_chan_parallel).get(),
            serial: solution.get(vars.in_chan_serial).get(),
        },
    };
    let types = TypeRecord {
        partial_type: partials_type,
        result_type,
    };
    let grain = GrainSizes {
        conv_groups_per_group: method.conv_groups_per_group,
        in_chans_per_group: method.in_chans_per_group_grain,
        partial_chans_per_group: method.partial_chans_per_group,
    };
    let method_params = MethodParams {
        slic_window_width: method.slic_window_width,
        engine_count: None,
    };
    let b = &vars.breakdown;
    let breakdown = CostBreakdown {
        rearrange_before_slice: solution.get(b.rearrange_before_slice).get(),
        dynamic_slice: solution.get(b.dynamic_slice).get(),
        transform: solution.get(b.transform).get(),
        exchange_in: solution.get(b.exchange_in).get(),
        exchange_weights: solution.get(b.exchange_weights).get(),
        exchange_reduce: solution.get(b.exchange_reduce).get(),
        tile_level_transform: solution.get(b.tile_level_transform).get(),
        partial_calc: solution.get(b.partial_calc).get(),
        reduce: solution.get(b.reduce).get(),
        dynamic_update: solution.get(b.dynamic_update).get(),
        add_in_place: solution.get(b.add_in_place).get(),
        cast: solution.get(b.cast).get(),
    };
    (partition, types, grain, method_params, breakdown)
}
