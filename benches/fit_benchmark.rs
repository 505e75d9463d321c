//! Benchmarks for the cross-validated lasso and the logistic bootstrap
//!
//! Run with: cargo bench --bench fit_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;

use tempfit::pipeline::{
    bootstrap_coefficients, fit_lasso, penalty_grid, BootstrapConfig, ClassifierSpec, DesignMatrix,
    LassoConfig, Penalty,
};

/// Sparse linear signal: only the first five columns matter
fn generate_regression(n_rows: usize, n_features: usize, seed: u64) -> DesignMatrix {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n_rows)
        .map(|_| (0..n_features).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect())
        .collect();
    let y: Vec<f64> = rows
        .iter()
        .map(|r| {
            let signal: f64 = r.iter().take(5).enumerate().map(|(j, v)| (j + 1) as f64 * v).sum();
            signal + rng.gen::<f64>() - 0.5
        })
        .collect();
    let columns = (0..n_features).map(|j| format!("feature_{}", j)).collect();
    DesignMatrix::from_rows(columns, &rows, y).expect("Failed to build design matrix")
}

fn generate_classification(n_rows: usize, n_features: usize, seed: u64) -> DesignMatrix {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let rows: Vec<Vec<f64>> = (0..n_rows)
        .map(|_| (0..n_features).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect())
        .collect();
    let y: Vec<f64> = rows
        .iter()
        .map(|r| {
            let eta: f64 = r.iter().sum();
            let p = 1.0 / (1.0 + (-eta).exp());
            if rng.gen::<f64>() < p {
                1.0
            } else {
                0.0
            }
        })
        .collect();
    let columns = (0..n_features).map(|j| format!("feature_{}", j)).collect();
    DesignMatrix::from_rows(columns, &rows, y).expect("Failed to build design matrix")
}

/// 10-fold CV over a 100-point grid for growing predictor counts
fn benchmark_lasso_by_columns(c: &mut Criterion) {
    let mut group = c.benchmark_group("lasso_cv_by_columns");
    group.sample_size(10);

    let n_rows = 2_000;
    for n_cols in [10, 50, 100, 200] {
        let design = generate_regression(n_rows, n_cols, 42);
        let config = LassoConfig::default();
        let grid = penalty_grid(&design, &Penalty::Lasso, config.n_lambda, None)
            .expect("Failed to build penalty grid");

        group.throughput(Throughput::Elements(n_cols as u64));
        group.bench_with_input(BenchmarkId::new("lasso", n_cols), &design, |b, design| {
            b.iter(|| {
                let _ = fit_lasso(black_box(design), black_box(&grid), black_box(&config));
            });
        });
    }

    group.finish();
}

/// Bootstrap coefficient inference for growing replicate counts
fn benchmark_bootstrap_by_replicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap_by_replicates");
    group.sample_size(10);

    let design = generate_classification(500, 5, 7);
    let spec = ClassifierSpec::default();
    for replicates in [100, 500, 1_000] {
        let config = BootstrapConfig {
            replicates,
            ..BootstrapConfig::default()
        };

        group.throughput(Throughput::Elements(replicates as u64));
        group.bench_with_input(BenchmarkId::new("logistic", replicates), &config, |b, config| {
            b.iter(|| {
                let _ = bootstrap_coefficients(black_box(&design), black_box(&spec), black_box(config));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_lasso_by_columns, benchmark_bootstrap_by_replicates);
criterion_main!(benches);
