use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use frontier_sim::config::GameConfig;
use frontier_sim::noise::NoiseField;
use frontier_sim::sim::SimState;
use frontier_sim::types::*;
use std::hint::black_box;

fn bench_noise(c: &mut Criterion) {
    let params = GameConfig::default().noise;
    c.bench_function("noise_chunk", |b| {
        b.iter_batched(
            || NoiseField::new(0xBEEF, params.clone()),
            |mut field| black_box(field.chunk(Point::new(3, -2)).max),
            BatchSize::SmallInput,
        )
    });
}

fn bench_new_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("worldgen");
    group.sample_size(20);
    group.bench_function("new_game_3x3", |b| {
        b.iter(|| SimState::new_game(black_box(0xBEEF), GameConfig::default()))
    });
    group.bench_function("step_opening", |b| {
        b.iter_batched(
            || SimState::new_game(0xBEEF, GameConfig::default()).unwrap_or_else(|_| SimState::new(0)),
            |mut sim| {
                for _ in 0..64 {
                    sim.step(&[], 0.1);
                }
                sim
            },
            BatchSize::LargeInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_noise, bench_new_game);
criterion_main!(benches);
