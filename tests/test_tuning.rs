//! Tests for the hyperparameter search and the final network fit

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use tempfit::pipeline::metrics::score;
use tempfit::pipeline::{
    build, fit_final, tune, tune_observed, tune_until, HyperparameterGrid, PipelineError,
    RunStatus, TemporalSplit, TimeWindow, TrainTest, TrainingSettings, TuningConfig,
};

use common::linear_dataset;

fn small_grid() -> HyperparameterGrid {
    HyperparameterGrid {
        hidden_units_1: vec![8, 16],
        hidden_units_2: vec![4, 8],
        dropout_1: vec![0.1],
        dropout_2: vec![0.0],
        learning_rate: vec![0.005, 0.02],
    }
}

fn quick_config(seed: Option<u64>) -> TuningConfig {
    TuningConfig {
        sample_fraction: 0.5,
        validation_fraction: 0.2,
        training: TrainingSettings {
            max_epochs: 60,
            batch_size: 32,
            patience: 8,
            min_delta: 0.0,
        },
        seed,
    }
}

fn train_test() -> TrainTest {
    let split =
        TemporalSplit::new(TimeWindow::through(2020), TimeWindow::new(Some(2021), None)).unwrap();
    build(&linear_dataset(17), &split).unwrap()
}

#[test]
fn test_search_samples_fraction_of_grid() {
    let sets = train_test();
    let outcome = tune(&sets.train, &small_grid(), &quick_config(Some(3))).unwrap();

    assert_eq!(outcome.planned, 4);
    assert_eq!(outcome.runs.len(), 4);
    assert!(!outcome.interrupted);
    assert_eq!(outcome.seed, 3);
    assert!(outcome.runs.windows(2).all(|w| w[0].index < w[1].index));

    let best_completed = outcome
        .runs
        .iter()
        .filter(|r| r.status == RunStatus::Completed)
        .map(|r| r.validation_mse)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(outcome.best.validation_mse, best_completed);
    assert!(outcome.runs.iter().all(|r| r.epochs_run <= 60));
}

#[test]
fn test_same_seed_reproduces_search() {
    let sets = train_test();
    let first = tune(&sets.train, &small_grid(), &quick_config(Some(99))).unwrap();
    let second = tune(&sets.train, &small_grid(), &quick_config(Some(99))).unwrap();

    let indices = |o: &tempfit::pipeline::TuningOutcome| o.runs.iter().map(|r| r.index).collect::<Vec<_>>();
    assert_eq!(indices(&first), indices(&second));
    assert_eq!(first.best.index, second.best.index);
    assert_eq!(first.best.validation_mse, second.best.validation_mse);
}

#[test]
fn test_drawn_seed_is_reported_and_reusable() {
    let sets = train_test();
    let drawn = tune(&sets.train, &small_grid(), &quick_config(None)).unwrap();
    let replay = tune(&sets.train, &small_grid(), &quick_config(Some(drawn.seed))).unwrap();

    assert_eq!(drawn.best.index, replay.best.index);
    assert_eq!(drawn.best.validation_mse, replay.best.validation_mse);
}

#[test]
fn test_interrupt_before_any_run() {
    let sets = train_test();
    let stop = AtomicBool::new(true);

    match tune_until(&sets.train, &small_grid(), &quick_config(Some(1)), &stop).unwrap_err() {
        PipelineError::Interrupted { planned } => assert_eq!(planned, 4),
        other => panic!("Expected Interrupted, got {other:?}"),
    }
}

#[test]
fn test_interrupt_mid_search_keeps_finished_runs() {
    let sets = train_test();
    let stop = AtomicBool::new(false);
    // one worker runs the sampled configurations in order, so only the first starts
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();

    let outcome = pool
        .install(|| {
            tune_observed(&sets.train, &small_grid(), &quick_config(Some(3)), &stop, |_| {
                stop.store(true, Ordering::Relaxed)
            })
        })
        .unwrap();

    assert!(outcome.interrupted);
    assert_eq!(outcome.planned, 4);
    assert_eq!(outcome.runs.len(), 1);
    assert!(outcome.runs.len() < outcome.planned);
    assert_eq!(outcome.runs[0].status, RunStatus::Completed);
    assert_eq!(outcome.best.index, outcome.runs[0].index);
    assert_eq!(outcome.best.validation_mse, outcome.runs[0].validation_mse);
}

#[test]
fn test_all_runs_diverge() {
    let sets = train_test();
    let grid = HyperparameterGrid {
        learning_rate: vec![1e300],
        ..small_grid()
    };

    match tune(&sets.train, &grid, &quick_config(Some(2))).unwrap_err() {
        PipelineError::NoConvergingRun { runs } => assert_eq!(runs, 2),
        other => panic!("Expected NoConvergingRun, got {other:?}"),
    }
}

#[test]
fn test_empty_grid_entry_fails_fast() {
    let sets = train_test();
    let grid = HyperparameterGrid {
        hidden_units_2: Vec::new(),
        ..small_grid()
    };

    let err = tune(&sets.train, &grid, &quick_config(Some(1))).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyGrid { parameter: "hidden_units_2" }));
}

#[test]
fn test_final_fit_predicts_held_out_periods() {
    let sets = train_test();
    let config = quick_config(Some(5));
    let outcome = tune(&sets.train, &small_grid(), &config).unwrap();
    let network = fit_final(&sets.train, &outcome, &config).unwrap();

    assert_eq!(network.config, outcome.best.config);
    let predicted = network.predict(&sets.test.x).unwrap();
    assert_eq!(predicted.len(), sets.test.nrows());

    let evaluation = score(&sets.test.y, &predicted, &sets.test.response).unwrap();
    assert!(evaluation.r_squared > 0.3, "R² was {}", evaluation.r_squared);
}
