//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::path::PathBuf;

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use tempfit::pipeline::{CategoricalField, Dataset, DatasetSchema};

/// Roughly normal noise (sum of four uniforms, sd ≈ 0.58 before scaling)
fn noise(rng: &mut StdRng, scale: f64) -> f64 {
    let sum: f64 = (0..4).map(|_| rng.gen::<f64>()).sum();
    (sum - 2.0) * scale
}

/// Panel of `seasons` periods with `per_season` players each:
/// `points = 2 * f1 + 0 * f2 + noise`
pub fn linear_panel(seed: u64, seasons: i64, per_season: usize) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut season = Vec::new();
    let mut player = Vec::new();
    let mut f1 = Vec::new();
    let mut f2 = Vec::new();
    let mut points = Vec::new();

    for s in 0..seasons {
        for p in 0..per_season {
            let a: f64 = rng.gen_range(-1.0..1.0);
            let b: f64 = rng.gen_range(-1.0..1.0);
            season.push(2015 + s);
            player.push(format!("player_{:03}", p));
            f1.push(a);
            f2.push(b);
            points.push(2.0 * a + noise(&mut rng, 0.5));
        }
    }

    df! {
        "season" => season,
        "player" => player,
        "f1" => f1,
        "f2" => f2,
        "points" => points,
    }
    .unwrap()
}

pub fn linear_schema() -> DatasetSchema {
    DatasetSchema::new("season", "points")
        .with_entity("player")
        .with_numeric(["f1", "f2"])
}

pub fn linear_dataset(seed: u64) -> Dataset {
    Dataset::new(linear_panel(seed, 8, 25), linear_schema()).unwrap()
}

/// 100 executions, 97 of which failed (`execution_status = 0`).
///
/// `signal` is 1 on rows 10, 30 and 50 and 0 elsewhere; the successes are rows
/// 10, 50 and 90. The fitted probabilities are therefore 2/3 and 1/97, so a 0.5
/// threshold scores 98 of 100 rows against the 97 of the majority class.
pub fn rare_outcome_frame() -> DataFrame {
    let status: Vec<i32> = (0..100).map(|i| i32::from(i == 10 || i == 50 || i == 90)).collect();
    let signal: Vec<f64> = (0..100)
        .map(|i| if i == 10 || i == 30 || i == 50 { 1.0 } else { 0.0 })
        .collect();
    let period: Vec<i64> = (0..100).map(|i| 2000 + (i % 10) as i64).collect();
    df! {
        "period" => period,
        "signal" => signal,
        "execution_status" => status,
    }
    .unwrap()
}

pub fn rare_outcome_schema() -> DatasetSchema {
    DatasetSchema::new("period", "execution_status").with_numeric(["signal"])
}

/// Levels A, B, C with 100 rows each. Positives: A 80, B 30, C 30,
/// so only level A moves the response away from the reference B.
pub fn level_frame() -> DataFrame {
    let mut level = Vec::new();
    let mut outcome = Vec::new();
    let mut period = Vec::new();
    for (name, positives) in [("A", 80), ("B", 30), ("C", 30)] {
        for i in 0..100 {
            level.push(name);
            outcome.push(i32::from(i < positives));
            period.push(2010 + (i % 5) as i64);
        }
    }
    df! {
        "period" => period,
        "level" => level,
        "outcome" => outcome,
    }
    .unwrap()
}

pub fn level_schema(reference: &str) -> DatasetSchema {
    DatasetSchema::new("period", "outcome").with_categorical(CategoricalField::new("level", reference))
}

/// Binary response driven by one numeric predictor
pub fn logistic_frame(seed: u64, rows: usize) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let x: Vec<f64> = (0..rows).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let y: Vec<i32> = x
        .iter()
        .map(|&v| {
            let p = 1.0 / (1.0 + (-(0.3 + 1.2 * v)).exp());
            i32::from(rng.gen::<f64>() < p)
        })
        .collect();
    let period: Vec<i64> = (0..rows).map(|i| (i % 4) as i64).collect();
    df! {
        "period" => period,
        "x" => x,
        "y" => y,
    }
    .unwrap()
}

pub fn logistic_schema() -> DatasetSchema {
    DatasetSchema::new("period", "y").with_numeric(["x"])
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("test_data.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Write a JSON run configuration next to the data
pub fn write_config(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("run.json");
    std::fs::write(&path, json).unwrap();
    path
}
