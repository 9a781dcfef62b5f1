//! Memoria Core Benchmarks
//!
//! Benchmarks for the pure-function cores of scoring (§4.B), anchor
//! extraction (§4.D), and the information-bottleneck selector (§4.I)
//! using Criterion. Run with: cargo bench -p memoria-core

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use memoria_core::model::{Layer, MemoryRecord};
use memoria_core::{
    adaptive_beta, compute_memory_score, effective_decay_rate, rank_memories_by_score,
    sanitize_fts5_query, score_record, select_context, BottleneckCandidate, BudgetPreference,
    ScoringWeights,
};

fn sample_record(importance: f32, access_count: u64, days_old: i64) -> MemoryRecord {
    let mut record = MemoryRecord::new("tenant-bench", "default", "agent-1", "sample content", Layer::Semantic, "bench");
    record.importance = importance;
    record.access_count = access_count;
    record.last_accessed_at = Utc::now() - Duration::days(days_old);
    record
}

fn bench_effective_decay_rate(c: &mut Criterion) {
    c.bench_function("effective_decay_rate", |b| {
        b.iter(|| {
            for access_count in [0u64, 1, 5, 20, 100] {
                black_box(effective_decay_rate(black_box(0.05), black_box(access_count)));
            }
        })
    });
}

fn bench_compute_memory_score(c: &mut Criterion) {
    let weights = ScoringWeights::default();
    let id = uuid::Uuid::new_v4();
    c.bench_function("compute_memory_score", |b| {
        b.iter(|| {
            black_box(compute_memory_score(
                black_box(id),
                black_box(0.82),
                black_box(0.7),
                black_box(12),
                black_box(9.0 * 86_400.0),
                black_box(weights),
                black_box(0.05),
            ));
        })
    });
}

fn bench_rank_memories_by_score(c: &mut Criterion) {
    let weights = ScoringWeights::default();
    let now = Utc::now();
    let pairs: Vec<_> = (0..256)
        .map(|i| {
            let record = sample_record((i % 100) as f32 / 100.0, (i % 30) as u64, (i % 60) as i64);
            let similarity = (i % 100) as f32 / 100.0;
            let (score, _warnings) = score_record(&record, similarity, now, weights, 0.05);
            (record, score)
        })
        .collect();

    c.bench_function("rank_memories_by_score_256", |b| {
        b.iter(|| {
            black_box(rank_memories_by_score(black_box(pairs.clone())));
        })
    });
}

fn bench_adaptive_beta(c: &mut Criterion) {
    c.bench_function("adaptive_beta", |b| {
        b.iter(|| {
            for complexity in [0.1f32, 0.4, 0.6, 0.9] {
                for remaining in [0.1f32, 0.5, 0.9] {
                    black_box(adaptive_beta(black_box(1.0), black_box(complexity), black_box(remaining)));
                }
            }
        })
    });
}

fn bench_select_context(c: &mut Criterion) {
    let query_embedding: Vec<f32> = (0..256).map(|i| (i as f32 * 0.01).sin()).collect();
    let candidates: Vec<BottleneckCandidate> = (0..200)
        .map(|i| BottleneckCandidate {
            id: uuid::Uuid::new_v4(),
            embedding: (0..256).map(|d| ((i + d) as f32 * 0.013).cos()).collect(),
            tokens: 50 + (i % 10) * 10,
            importance: (i % 100) as f32 / 100.0,
            layer: Layer::Semantic,
        })
        .collect();
    let beta = BudgetPreference::Balanced.base_beta();

    c.bench_function("select_context_200_candidates", |b| {
        b.iter(|| {
            black_box(select_context(
                black_box(&candidates),
                black_box(&query_embedding),
                black_box(2000),
                black_box(beta),
                black_box(0.1),
            ));
        })
    });
}

fn bench_sanitize_fts5(c: &mut Criterion) {
    c.bench_function("sanitize_fts5_query", |b| {
        b.iter(|| {
            black_box(sanitize_fts5_query(black_box(
                "hello world \"exact phrase\" OR special-chars!@#",
            )));
        })
    });
}

criterion_group!(
    benches,
    bench_effective_decay_rate,
    bench_compute_memory_score,
    bench_rank_memories_by_score,
    bench_adaptive_beta,
    bench_select_context,
    bench_sanitize_fts5,
);
criterion_main!(benches);
