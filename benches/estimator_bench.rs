//! Benchmarks for the estimation engine.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use vram_planner::architecture;
use vram_planner::config::Config;
use vram_planner::quantization::{self, RecommendOptions};
use vram_planner::{normalize, Planner};

fn bench_architecture_estimate(c: &mut Criterion) {
    c.bench_function("architecture_estimate_sweep_1_to_200b", |b| {
        b.iter(|| {
            for params in 1..=200 {
                black_box(architecture::estimate_detailed(black_box(params as f64)).ok());
            }
        })
    });
}

fn bench_recommend(c: &mut Criterion) {
    c.bench_function("quantization_recommend_13b_24gb", |b| {
        b.iter(|| {
            black_box(quantization::recommend(
                black_box(24.0),
                black_box(13.0),
                RecommendOptions::default(),
            ))
        })
    });
}

fn bench_full_plan(c: &mut Criterion) {
    let config = Config::default();
    let planner = Planner::new(&config).unwrap();
    let record = json!({
        "gpuSpecs": { "totalMemoryGB": 80, "memoryBandwidthGBps": 2039, "hasTensorCores": true, "gpuCount": 2 },
        "modelSpecs": { "name": "meta-llama/Llama-2-70b-chat-hf", "parametersBillion": 70, "quantization": "awq" },
        "workloadSpecs": { "expectedConcurrency": 64, "averageSequenceLength": 1024, "maxSequenceLength": 4096, "optimizationPosture": "balanced" }
    });

    c.bench_function("normalize_and_plan_70b_awq", |b| {
        b.iter(|| {
            let input = normalize(black_box(&record), &config.defaults).unwrap();
            black_box(planner.plan(&input).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_architecture_estimate,
    bench_recommend,
    bench_full_plan,
);
criterion_main!(benches);
