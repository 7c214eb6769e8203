use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use mancala_core::board::{Board, RuleSet};
use mancala_core::search::{Search, SolverConfig};

fn solve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    group.sample_size(10);

    let board = Board::uniform(4);
    let config = SolverConfig {
        depth: 10,
        ..SolverConfig::default()
    };

    group.bench_function("uniform-4 depth 10", |b| {
        let mut search = Search::new();
        b.iter(|| {
            search.cache_mut().invalidate();
            let result = search
                .solve(black_box(&board), RuleSet::Classic, &config)
                .unwrap();
            black_box(result.evaluation)
        });
    });

    group.finish();
}

fn distribution_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("distribution");
    group.sample_size(10);

    let board = Board::uniform(4);
    let config = SolverConfig {
        depth: 8,
        ..SolverConfig::default()
    };

    group.bench_function("uniform-4 depth 8", |b| {
        let mut search = Search::new();
        b.iter(|| {
            search.cache_mut().invalidate();
            let dist = search
                .distribution(black_box(&board), RuleSet::Classic, &config)
                .unwrap();
            black_box(dist.scores)
        });
    });

    group.finish();
}

criterion_group!(benches, solve_benchmark, distribution_benchmark);
criterion_main!(benches);
