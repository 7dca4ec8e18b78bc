use criterion::{criterion_group, criterion_main, Criterion};
use tileplan::{plan_convolution, ConvOptions, ConvParams, DimTransform, NumType, Pass, TargetDescriptor};

fn make_params() -> ConvParams {
    ConvParams {
        input_type: NumType::Half,
        output_type: NumType::Half,
        batch_size: 1,
        num_conv_groups: 1,
        in_chans_per_group: 16,
        out_chans_per_group: 16,
        field_shape: vec![4, 4],
        kernel_shape: vec![3, 3],
        input_transform: vec![DimTransform::identity(); 2],
        output_transform: vec![DimTransform::identity(); 2],
        kernel_transform: vec![DimTransform::identity(); 2],
    }
}

fn bench_plan_convolution(c: &mut Criterion) {
    let params = make_params();
    let target = TargetDescriptor::reference_ipu(1216, 1);
    let options = ConvOptions {
        pass: Pass::InferenceFwd,
        available_memory_proportion: 0.6,
        ..ConvOptions::default()
    };
    c.bench_function("plan_convolution_inference_fwd", |b| {
        b.iter(|| {
            let _ = plan_convolution(&params, &target, &options, None).unwrap();
        })
    });
}

criterion_group!(planning, bench_plan_convolution);
criterion_main!(planning);
