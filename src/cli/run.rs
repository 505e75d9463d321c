//! Subcommand drivers: load, split, fit, report

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use console::style;

use super::args::DataArgs;
use super::config::RunConfig;
use crate::pipeline::{
    bootstrap_auc, bootstrap_coefficients, build, build_full, classification_summary, evaluate,
    fit_final, fit_lasso, fit_logistic, load_dataset, load_frame, load_model, metrics,
    penalty_grid, rank_predictions, save_model, tune_observed, tuning::planned_runs,
    variance_inflation_factors, Dataset, FittedModel, Penalty, SelectionRule, TemporalSplit,
    TrainTest,
};
use crate::report::{
    export_report, print_classification, print_coefficient_table, print_evaluation,
    print_lasso_fit, print_predictions, print_tuning, print_vif, BootstrapReport, LassoReport,
    RunMetadata, TuningReport,
};
use crate::utils::{
    create_spinner, finish_with_success, print_banner, print_completion, print_info,
    print_metric, print_run_card, print_step_header, print_success,
};

/// CLI overrides for the `lasso` command
#[derive(Debug, Default, Clone)]
pub struct LassoOverrides {
    pub folds: Option<usize>,
    pub penalty: Option<Penalty>,
    pub rule: Option<SelectionRule>,
    pub seed: Option<u64>,
}

fn load(data: &DataArgs, command: &str) -> Result<(RunConfig, Dataset)> {
    let config = RunConfig::load(&data.config)?;
    print_banner(env!("CARGO_PKG_VERSION"), command);

    let spinner = create_spinner("Loading dataset...");
    let dataset = load_dataset(&data.input, &config.schema)?;
    finish_with_success(
        &spinner,
        &format!("Loaded {} rows", style(dataset.height()).yellow()),
    );
    Ok((config, dataset))
}

/// Configured split, or one suggested from the observed periods
fn resolve_split(config: &RunConfig, dataset: &Dataset) -> Result<TemporalSplit> {
    match config.split {
        Some(split) => Ok(split),
        None => {
            let periods = dataset.periods()?;
            let split = TemporalSplit::suggest(&periods, config.test_fraction)?;
            print_info(&format!(
                "No split configured; holding out the most recent {:.0}% of rows",
                config.test_fraction * 100.0
            ));
            Ok(split)
        }
    }
}

fn describe_split(split: &TemporalSplit) -> String {
    let bound = |b: Option<i64>| b.map_or("…".to_string(), |v| v.to_string());
    format!(
        "train {}..{}, test {}..{}",
        bound(split.train.start),
        bound(split.train.end),
        bound(split.test.start),
        bound(split.test.end)
    )
}

fn build_features(
    command: &str,
    data: &DataArgs,
    config: &RunConfig,
    dataset: &Dataset,
) -> Result<(TrainTest, RunMetadata)> {
    let split = resolve_split(config, dataset)?;
    let description = describe_split(&split);
    print_run_card(&data.input, &config.schema.response, &description);

    print_step_header(1, "Feature Matrix");
    let sets = build(dataset, &split).context("Failed to build the feature matrices")?;
    print_success(&format!(
        "{} train / {} test rows, {} predictor column(s)",
        sets.train.nrows(),
        sets.test.nrows(),
        sets.train.ncols()
    ));

    let mut metadata = RunMetadata::new(command, &data.input, &config.schema.response);
    metadata.split = Some(description);
    metadata.train_rows = sets.train.nrows();
    metadata.test_rows = Some(sets.test.nrows());
    Ok((sets, metadata))
}

fn export_to(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    write(path)?;
    print_success(&format!("Report written to {}", path.display()));
    Ok(())
}

/// Cross-validated penalized linear fit, scored on the held-out periods
pub fn run_lasso(
    data: &DataArgs,
    overrides: &LassoOverrides,
    top: usize,
    model_path: Option<&PathBuf>,
) -> Result<()> {
    let start = Instant::now();
    let (mut config, dataset) = load(data, "lasso")?;
    if let Some(folds) = overrides.folds {
        config.lasso.folds = folds;
    }
    if let Some(penalty) = overrides.penalty {
        config.lasso.penalty = penalty;
    }
    if let Some(rule) = overrides.rule {
        config.lasso.rule = rule;
    }
    if let Some(seed) = overrides.seed {
        config.lasso.seed = seed;
    }
    config.lasso.validate()?;

    let (sets, metadata) = build_features("lasso", data, &config, &dataset)?;

    print_step_header(2, "Regularized Fit");
    let spinner = create_spinner(&format!(
        "Cross-validating {} over {} folds...",
        config.lasso.penalty, config.lasso.folds
    ));
    let grid = penalty_grid(
        &sets.train,
        &config.lasso.penalty,
        config.lasso.n_lambda,
        config.lasso.lambda_min_ratio,
    )?;
    let fit = fit_lasso(&sets.train, &grid, &config.lasso)?;
    finish_with_success(&spinner, "Penalty selected");
    print_lasso_fit(&fit.model, &fit.cv);

    print_step_header(3, "Held-out Evaluation");
    let evaluation = evaluate(&fit.model, &sets.test)?;
    print_evaluation(&evaluation, sets.test.nrows());
    let predictions = rank_predictions(&fit.model, &sets.test)?;
    print_predictions(&predictions, top, &config.schema.response);

    if let Some(path) = model_path {
        save_model(&FittedModel::Linear(fit.model.clone()), path)?;
        print_success(&format!("Model saved to {}", path.display()));
    }
    if let Some(path) = &data.export {
        let report = LassoReport {
            metadata,
            model: &fit.model,
            cross_validation: &fit.cv,
            evaluation,
            predictions: &predictions,
        };
        export_to(path, |p| export_report(&report, p))?;
    }

    print_completion(&format!("lasso ({:.1}s)", start.elapsed().as_secs_f64()));
    Ok(())
}

/// Random search over the network grid, final fit, held-out evaluation
pub fn run_tune(
    data: &DataArgs,
    sample_fraction: Option<f64>,
    seed: Option<u64>,
    top: usize,
) -> Result<()> {
    let start = Instant::now();
    let (mut config, dataset) = load(data, "tune")?;
    if let Some(fraction) = sample_fraction {
        config.tuning.sample_fraction = fraction;
    }
    if seed.is_some() {
        config.tuning.seed = seed;
    }
    config.tuning.validate()?;

    let (sets, metadata) = build_features("tune", data, &config, &dataset)?;

    print_step_header(2, "Hyperparameter Search");
    let planned = planned_runs(config.grid.size(), config.tuning.sample_fraction);
    let spinner = create_spinner(&format!(
        "Training {} sampled configuration(s) from a grid of {}...",
        planned,
        config.grid.size()
    ));
    let finished = AtomicUsize::new(0);
    let outcome = tune_observed(
        &sets.train,
        &config.grid,
        &config.tuning,
        &AtomicBool::new(false),
        |_| {
            let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
            spinner.set_message(format!("Trained {}/{} configuration(s)...", done, planned));
        },
    )?;
    finish_with_success(&spinner, "Search complete");
    print_tuning(&outcome, top);
    print_metric("Best validation MSE", outcome.best.validation_mse);

    print_step_header(3, "Final Fit");
    let spinner = create_spinner(&format!("Retraining {} on all training rows...", outcome.best.config));
    let network = fit_final(&sets.train, &outcome, &config.tuning)?;
    finish_with_success(&spinner, "Final network trained");

    let predicted = network.predict(&sets.test.x)?;
    let evaluation = metrics::score(&sets.test.y, &predicted, &sets.test.response)?;
    print_evaluation(&evaluation, sets.test.nrows());
    let predictions = metrics::rank_predictions(&sets.test.entities, &predicted);
    print_predictions(&predictions, top, &config.schema.response);

    if let Some(path) = &data.export {
        let report = TuningReport {
            metadata,
            outcome: &outcome,
            evaluation,
            predictions: &predictions,
        };
        export_to(path, |p| export_report(&report, p))?;
    }

    print_completion(&format!("tune ({:.1}s)", start.elapsed().as_secs_f64()));
    Ok(())
}

/// Bootstrap inference for a binary response on the full dataset
pub fn run_bootstrap(
    data: &DataArgs,
    replicates: Option<usize>,
    seed: Option<u64>,
    model_path: Option<&PathBuf>,
) -> Result<()> {
    let start = Instant::now();
    let (mut config, dataset) = load(data, "bootstrap")?;
    if let Some(replicates) = replicates {
        config.bootstrap.replicates = replicates;
    }
    if let Some(seed) = seed {
        config.bootstrap.seed = seed;
    }
    config.bootstrap.validate()?;
    print_run_card(&data.input, &config.schema.response, "all periods");

    print_step_header(1, "Feature Matrix");
    let design = build_full(&dataset).context("Failed to build the feature matrix")?;
    print_success(&format!(
        "{} rows, {} predictor column(s)",
        design.nrows(),
        design.ncols()
    ));

    print_step_header(2, "Collinearity");
    let vif = variance_inflation_factors(&design)?;
    print_vif(&vif);

    print_step_header(3, "Bootstrap Inference");
    let model = fit_logistic(&design, &config.classifier)?;
    let spinner = create_spinner(&format!(
        "Resampling {} replicates...",
        config.bootstrap.replicates
    ));
    let coefficients = bootstrap_coefficients(&design, &config.classifier, &config.bootstrap)?;
    let auc = bootstrap_auc(&design, &config.classifier, &config.bootstrap)?;
    finish_with_success(&spinner, "Bootstrap complete");
    print_coefficient_table(&coefficients);

    let summary = classification_summary(&model, &design, config.threshold)?;
    print_classification(&summary, &auc);

    if let Some(path) = model_path {
        save_model(&FittedModel::Logistic(model), path)?;
        print_success(&format!("Model saved to {}", path.display()));
    }
    if let Some(path) = &data.export {
        let mut metadata = RunMetadata::new("bootstrap", &data.input, &config.schema.response);
        metadata.train_rows = design.nrows();
        let report = BootstrapReport {
            metadata,
            coefficients: &coefficients,
            auc,
            classification: summary,
            vif: &vif,
        };
        export_to(path, |p| export_report(&report, p))?;
    }

    print_completion(&format!("bootstrap ({:.1}s)", start.elapsed().as_secs_f64()));
    Ok(())
}

/// Score new rows with a saved model and rank them
pub fn run_predict(input: &Path, model_path: &Path, config_path: Option<&Path>, top: usize) -> Result<()> {
    let model = load_model(model_path)?;
    let frame = load_frame(input)?;
    let values = model.predict_frame(&frame)?;

    let entity_column = match config_path {
        Some(path) => RunConfig::load(path)?.schema.entity_column,
        None => None,
    };
    let entities: Vec<String> = match entity_column {
        Some(column) => crate::pipeline::dataset::label_column(&frame, &column)?,
        None => (0..frame.height()).map(|i| i.to_string()).collect(),
    };

    let predictions = metrics::rank_predictions(&entities, &values);
    print_predictions(&predictions, top, model.response());
    Ok(())
}
