//! End-to-end integration tests

use tileplan::{
    plan_convolution, plan_ctc, plan_sparse, ConvMethod, ConvOptions, ConvParams, CtcOptions,
    CtcParams, DimTransform, NumType, Pass, SparseMatMulParams, SparseMethod, SparseOptions,
    SparsityParams, TargetDescriptor,
};

fn identity_transforms(dims: usize) -> Vec<DimTransform> {
    vec![DimTransform::identity(); dims]
}

#[test]
fn convolution_inference_forward_picks_amp() {
    let params = ConvParams {
        input_type: NumType::Half,
        output_type: NumType::Half,
        batch_size: 1,
        num_conv_groups: 1,
        in_chans_per_group: 16,
        out_chans_per_group: 16,
        field_shape: vec![4, 4],
        kernel_shape: vec![3, 3],
        input_transform: identity_transforms(2),
        output_transform: identity_transforms(2),
        kernel_transform: identity_transforms(2),
    };
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = ConvOptions {
        pass: Pass::InferenceFwd,
        partials_type: NumType::Half,
        available_memory_proportion: 0.6,
        ..ConvOptions::default()
    };

    let (plan, cost) = plan_convolution(&params, &target, &options, None).unwrap();

    assert_eq!(plan.method, ConvMethod::Amp);
    assert!(!plan.transforms[0].swap_operands);
    assert!(cost.tiles >= 1);
    assert!(cost.cycles < u64::MAX);
}

#[test]
fn fully_connected_training_forward_is_a_joint_plan() {
    let params = ConvParams {
        input_type: NumType::Half,
        output_type: NumType::Half,
        batch_size: 32,
        num_conv_groups: 1,
        in_chans_per_group: 1024,
        out_chans_per_group: 1024,
        field_shape: vec![1],
        kernel_shape: vec![1],
        input_transform: identity_transforms(1),
        output_transform: identity_transforms(1),
        kernel_transform: identity_transforms(1),
    };
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = ConvOptions {
        pass: Pass::FcTrainingFwd,
        partials_type: NumType::Float,
        available_memory_proportion: 0.6,
        ..ConvOptions::default()
    };

    let (plan, _cost) = plan_convolution(&params, &target, &options, None).unwrap();

    assert_eq!(plan.method, ConvMethod::Amp);
    assert!(plan.transforms[0].swap_operands);
    assert_eq!(plan.partitions[0].out_chan_split.parallel, 1);
    assert!(plan.is_joint_plan);
}

#[test]
fn zero_dim_convolution_is_free() {
    let params = ConvParams {
        input_type: NumType::Half,
        output_type: NumType::Half,
        batch_size: 0,
        num_conv_groups: 1,
        in_chans_per_group: 16,
        out_chans_per_group: 16,
        field_shape: vec![4, 4],
        kernel_shape: vec![3, 3],
        input_transform: identity_transforms(2),
        output_transform: identity_transforms(2),
        kernel_transform: identity_transforms(2),
    };
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = ConvOptions::default();

    let (_plan, cost) = plan_convolution(&params, &target, &options, None).unwrap();
    assert_eq!(cost.cycles, 0);
    assert_eq!(cost.temp_bytes, 0);
}

#[test]
fn sparse_forward_only_has_no_grad_a_bucket() {
    let params = SparseMatMulParams {
        input_type: NumType::Float,
        num_groups: 1,
        in_chans: 512,
        out_chans: 512,
        batch_size: 4,
        sparsity: SparsityParams {
            nz_ratio: 0.1,
            block_sparse: false,
        },
    };
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = SparseOptions {
        do_grad_a_pass: false,
        do_grad_w_pass: false,
        ..SparseOptions::default()
    };

    let (plan, _cost) = plan_sparse(&params, &target, &options).unwrap();

    assert_eq!(plan.forward.method, SparseMethod::Forward);
    assert!(plan.grad_a.is_none());
}

#[test]
fn sparse_shared_buckets_gradA_reuses_forward_shape() {
    let params = SparseMatMulParams {
        input_type: NumType::Float,
        num_groups: 1,
        in_chans: 512,
        out_chans: 512,
        batch_size: 4,
        sparsity: SparsityParams {
            nz_ratio: 0.1,
            block_sparse: false,
        },
    };
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = SparseOptions {
        do_grad_a_pass: true,
        shared_buckets: true,
        ..SparseOptions::default()
    };

    let (plan, _cost) = plan_sparse(&params, &target, &options).unwrap();

    assert_eq!(plan.forward.method, SparseMethod::Forward);
    let grad_a = plan.grad_a.expect("shared-bucket grad_a pass should be present");
    assert_eq!(grad_a.method, SparseMethod::Transpose);
    assert!(grad_a.reuses_forward_buckets);
}

#[test]
fn ctc_loss_partition_fits_within_total_tiles() {
    let params = CtcParams {
        input_type: NumType::Float,
        batch_size: 16,
        max_time: 100,
        max_label_length: 40,
        num_classes: 30,
    };
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = CtcOptions {
        available_memory_proportion: 0.6,
        ..CtcOptions::default()
    };

    let (plan, _cost) = plan_ctc(&params, &target, &options).unwrap();

    let used = plan.partition.batch_split
        * plan.partition.time_split
        * (plan.partition.label_split + plan.partition.last_blank_on_separate_tile as u64);
    assert!(used <= target.total_tiles());
    assert!(plan.partition.batch_split >= 1);
    assert!(plan.partition.time_split >= 1);
    assert!(plan.partition.label_split >= 1);
}
