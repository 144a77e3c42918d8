use criterion::{Criterion, black_box, criterion_group, criterion_main};

use memlp::{Activation, MlpBuilder, TrainConfig, serialise};

fn build() -> memlp::Mlp {
    MlpBuilder::from_sizes(
        &[129, 256, 256, 10],
        &[Activation::ReLU, Activation::Tanh, Activation::Identity],
    )
    .unwrap()
    .build_with_seed(0)
    .unwrap()
}

fn mlp_output_bench(c: &mut Criterion) {
    let mlp = build();
    let input = vec![0.1_f32; mlp.input_dim()];

    c.bench_function("mlp_output_129_256_256_10", |b| {
        b.iter(|| {
            let out = mlp.output(black_box(&input)).unwrap();
            black_box(out);
        })
    });
}

fn mlp_train_step_bench(c: &mut Criterion) {
    let mut mlp = build();
    let features = vec![vec![0.1_f32; mlp.input_dim()]; 16];
    let labels = vec![vec![0.0_f32; mlp.output_dim()]; 16];
    let cfg = TrainConfig {
        learning_rate: 1e-3,
        max_iterations: 1,
        ..TrainConfig::default()
    };

    c.bench_function("mlp_train_step_16x129", |b| {
        b.iter(|| {
            let report = mlp.train(black_box(&features), &labels, &cfg).unwrap();
            black_box(report);
        })
    });
}

fn codec_bench(c: &mut Criterion) {
    let mlp = build();
    let weights = mlp.layer_weights(1).unwrap();
    let mut buffer = Vec::new();

    c.bench_function("codec_encode_decode_256x256", |b| {
        b.iter(|| {
            let end = serialise::from_vector_2d(0, black_box(&weights), &mut buffer).unwrap();
            let mut out: Vec<Vec<f32>> = Vec::new();
            serialise::to_vector_2d(0, &buffer[..end], &mut out).unwrap();
            black_box(out);
        })
    });
}

criterion_group!(benches, mlp_output_bench, mlp_train_step_bench, codec_bench);
criterion_main!(benches);
