use criterion::{black_box, criterion_group, criterion_main, Criterion};

use noise_meter::audio::{SampleBlock, SampleFormat};
use noise_meter::level::LevelEstimator;

fn bench_estimator(c: &mut Criterion) {
    // One read's worth of audio at the default configuration
    let i16_block = SampleBlock::I16((0..4410).map(|i| ((i * 37) % 8192) as i16).collect());
    let f32_block = SampleBlock::F32((0..4410).map(|i| ((i % 100) as f32 - 50.0) / 50.0).collect());

    let i16_estimator = LevelEstimator::new(SampleFormat::I16);
    let f32_estimator = LevelEstimator::new(SampleFormat::F32);

    c.bench_function("level_i16_4410", |b| {
        b.iter(|| i16_estimator.level(black_box(&i16_block)))
    });

    c.bench_function("level_f32_4410", |b| {
        b.iter(|| f32_estimator.level(black_box(&f32_block)))
    });
}

criterion_group!(benches, bench_estimator);
criterion_main!(benches);
