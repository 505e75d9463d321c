//! Random grid search over network hyperparameters
//!
//! A fraction of the Cartesian product is sampled without replacement and each
//! sampled configuration is trained with early stopping on a held-out block of
//! the most recent training rows. Runs are independent and execute in
//! parallel; each derives its RNG from the base seed and its grid index.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::design::DesignMatrix;
use super::error::{PipelineError, Result};
use super::network::{train, Monitor, NetworkConfig, NetworkModel, TrainingSettings};
use super::stats::stream_rng;

/// Candidate values for every tuned hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperparameterGrid {
    pub hidden_units_1: Vec<usize>,
    pub hidden_units_2: Vec<usize>,
    pub dropout_1: Vec<f64>,
    pub dropout_2: Vec<f64>,
    pub learning_rate: Vec<f64>,
}

impl Default for HyperparameterGrid {
    fn default() -> Self {
        Self {
            hidden_units_1: vec![16, 32, 64, 128],
            hidden_units_2: vec![16, 32, 64, 128],
            dropout_1: vec![0.1, 0.2, 0.3],
            dropout_2: vec![0.1, 0.2, 0.3],
            learning_rate: vec![0.001, 0.01, 0.1],
        }
    }
}

impl HyperparameterGrid {
    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("hidden_units_1", self.hidden_units_1.len()),
            ("hidden_units_2", self.hidden_units_2.len()),
            ("dropout_1", self.dropout_1.len()),
            ("dropout_2", self.dropout_2.len()),
            ("learning_rate", self.learning_rate.len()),
        ];
        if let Some((parameter, _)) = lengths.iter().find(|(_, len)| *len == 0) {
            return Err(PipelineError::EmptyGrid {
                parameter: *parameter,
            });
        }

        if self.hidden_units_1.iter().chain(&self.hidden_units_2).any(|&h| h == 0) {
            return Err(PipelineError::InvalidConfig(
                "hidden layer sizes must be at least 1".to_string(),
            ));
        }
        if let Some(p) = self
            .dropout_1
            .iter()
            .chain(&self.dropout_2)
            .find(|p| !(0.0..1.0).contains(*p))
        {
            return Err(PipelineError::InvalidConfig(format!(
                "dropout rates must be in [0, 1), got {}",
                p
            )));
        }
        if let Some(lr) = self.learning_rate.iter().find(|lr| !(lr.is_finite() && **lr > 0.0)) {
            return Err(PipelineError::InvalidConfig(format!(
                "learning rates must be positive, got {}",
                lr
            )));
        }
        Ok(())
    }

    /// Number of combinations in the Cartesian product
    pub fn size(&self) -> usize {
        self.hidden_units_1.len()
            * self.hidden_units_2.len()
            * self.dropout_1.len()
            * self.dropout_2.len()
            * self.learning_rate.len()
    }

    /// Decode a product index; the learning rate varies fastest
    pub fn combination(&self, index: usize) -> NetworkConfig {
        let mut rest = index;
        let mut digit = |len: usize| {
            let d = rest % len;
            rest /= len;
            d
        };
        let lr = digit(self.learning_rate.len());
        let d2 = digit(self.dropout_2.len());
        let d1 = digit(self.dropout_1.len());
        let h2 = digit(self.hidden_units_2.len());
        let h1 = digit(self.hidden_units_1.len());

        NetworkConfig {
            hidden_units_1: self.hidden_units_1[h1],
            hidden_units_2: self.hidden_units_2[h2],
            dropout_1: self.dropout_1[d1],
            dropout_2: self.dropout_2[d2],
            learning_rate: self.learning_rate[lr],
        }
    }
}

/// Search settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Share of the grid to sample, in (0, 1]
    pub sample_fraction: f64,
    /// Share of the most recent training rows held out for early stopping, in (0, 1)
    pub validation_fraction: f64,
    pub training: TrainingSettings,
    /// Drawn from OS entropy when absent
    pub seed: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            sample_fraction: 0.1,
            validation_fraction: 0.2,
            training: TrainingSettings::default(),
            seed: None,
        }
    }
}

impl TuningConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        self.training.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Diverged,
}

/// One sampled configuration and how it fared
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    /// Position in the Cartesian product
    pub index: usize,
    pub config: NetworkConfig,
    pub validation_mse: f64,
    pub best_epoch: usize,
    pub epochs_run: usize,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BestConfig {
    pub index: usize,
    pub config: NetworkConfig,
    pub validation_mse: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TuningOutcome {
    pub best: BestConfig,
    /// Finished runs, in grid order
    pub runs: Vec<Run>,
    pub planned: usize,
    pub interrupted: bool,
    /// Seed that reproduces this search and the final fit
    pub seed: u64,
}

/// Rows ordered oldest first, split into (fit, validation) with the newest rows held out
fn temporal_holdout(design: &DesignMatrix, fraction: f64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n = design.nrows();
    if n < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "tuning needs at least 2 training rows, got {}",
            n
        )));
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| design.periods[i]);

    let held = ((n as f64 * fraction).ceil() as usize).clamp(1, n - 1);
    let validation = order.split_off(n - held);
    Ok((order, validation))
}

/// Number of combinations sampled from a grid of `size`
pub fn planned_runs(size: usize, sample_fraction: f64) -> usize {
    ((size as f64 * sample_fraction).ceil() as usize).clamp(1, size)
}

/// Sample and train, then pick the configuration with the lowest validation MSE
pub fn tune(train_set: &DesignMatrix, grid: &HyperparameterGrid, config: &TuningConfig) -> Result<TuningOutcome> {
    tune_until(train_set, grid, config, &AtomicBool::new(false))
}

/// Like [`tune`], but runs not yet started are skipped once `stop` is set
pub fn tune_until(
    train_set: &DesignMatrix,
    grid: &HyperparameterGrid,
    config: &TuningConfig,
    stop: &AtomicBool,
) -> Result<TuningOutcome> {
    tune_observed(train_set, grid, config, stop, |_| {})
}

/// [`tune_until`] that also hands every finished run to `on_run` as it completes
pub fn tune_observed<F>(
    train_set: &DesignMatrix,
    grid: &HyperparameterGrid,
    config: &TuningConfig,
    stop: &AtomicBool,
    on_run: F,
) -> Result<TuningOutcome>
where
    F: Fn(&Run) + Sync,
{
    grid.validate()?;
    config.validate()?;

    let seed = match config.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            info!(seed, "no seed given; drew one from OS entropy");
            seed
        }
    };

    let size = grid.size();
    let planned = planned_runs(size, config.sample_fraction);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sampled = rand::seq::index::sample(&mut rng, size, planned).into_vec();
    sampled.sort_unstable();

    let (fit_rows, validation_rows) = temporal_holdout(train_set, config.validation_fraction)?;
    let fit = train_set.select_rows(&fit_rows);
    let validation = train_set.select_rows(&validation_rows);

    info!(
        grid_size = size,
        planned,
        fit_rows = fit.nrows(),
        validation_rows = validation.nrows(),
        "starting hyperparameter search"
    );

    let finished: Vec<Option<Result<Run>>> = sampled
        .par_iter()
        .map(|&index| {
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            let network = grid.combination(index);
            let monitor = Monitor::Holdout {
                x: &validation.x,
                y: &validation.y,
            };
            let result = train(
                &fit.x,
                &fit.y,
                &fit.columns,
                &network,
                &config.training,
                monitor,
                stream_rng(seed, index as u64),
            )
            .map(|(_, report)| {
                let status = if report.diverged() {
                    RunStatus::Diverged
                } else {
                    RunStatus::Completed
                };
                debug!(
                    index,
                    %network,
                    validation_mse = report.best_loss,
                    epochs = report.epochs_run,
                    "tuning run finished"
                );
                Run {
                    index,
                    config: network,
                    validation_mse: report.best_loss,
                    best_epoch: report.best_epoch,
                    epochs_run: report.epochs_run,
                    status,
                }
            });
            if let Ok(run) = &result {
                on_run(run);
            }
            Some(result)
        })
        .collect();

    let interrupted = finished.iter().any(Option::is_none);
    let runs = finished.into_iter().flatten().collect::<Result<Vec<Run>>>()?;

    let best = runs
        .iter()
        .filter(|run| run.status == RunStatus::Completed)
        .min_by(|a, b| {
            a.validation_mse
                .partial_cmp(&b.validation_mse)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|run| BestConfig {
            index: run.index,
            config: run.config,
            validation_mse: run.validation_mse,
        });

    let best = match best {
        Some(best) => best,
        None if runs.is_empty() => return Err(PipelineError::Interrupted { planned }),
        None => return Err(PipelineError::NoConvergingRun { runs: runs.len() }),
    };

    info!(
        completed = runs.len(),
        planned,
        interrupted,
        best = %best.config,
        validation_mse = best.validation_mse,
        "hyperparameter search finished"
    );

    Ok(TuningOutcome {
        best,
        runs,
        planned,
        interrupted,
        seed,
    })
}

/// Retrain the winning configuration on every training row.
///
/// There is no held-out block left, so early stopping watches the full
/// training loss (without dropout) with the same patience.
pub fn fit_final(train_set: &DesignMatrix, outcome: &TuningOutcome, config: &TuningConfig) -> Result<NetworkModel> {
    config.training.validate()?;
    let (model, report) = train(
        &train_set.x,
        &train_set.y,
        &train_set.columns,
        &outcome.best.config,
        &config.training,
        Monitor::Training,
        stream_rng(outcome.seed, outcome.best.index as u64),
    )?;
    if report.diverged() {
        return Err(PipelineError::NoConvergingRun { runs: 1 });
    }
    info!(
        config = %outcome.best.config,
        epochs = report.epochs_run,
        training_mse = report.best_loss,
        "final network fitted"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_size() {
        let grid = HyperparameterGrid::default();
        assert_eq!(grid.size(), 432);
        assert_eq!(planned_runs(grid.size(), 0.1), 44);
        assert_eq!(planned_runs(grid.size(), 1.0), 432);
    }

    #[test]
    fn test_combination_decodes_every_index_once() {
        let grid = HyperparameterGrid {
            hidden_units_1: vec![1, 2],
            hidden_units_2: vec![3],
            dropout_1: vec![0.0, 0.5],
            dropout_2: vec![0.1],
            learning_rate: vec![0.01, 0.1, 1.0],
        };
        let mut seen: Vec<(usize, u64, u64)> = (0..grid.size())
            .map(|i| {
                let c = grid.combination(i);
                (c.hidden_units_1, c.dropout_1.to_bits(), c.learning_rate.to_bits())
            })
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 12);
        assert_eq!(grid.combination(0).learning_rate, 0.01);
        assert_eq!(grid.combination(1).learning_rate, 0.1);
        assert_eq!(grid.combination(11).hidden_units_1, 2);
    }

    #[test]
    fn test_empty_grid_names_parameter() {
        let grid = HyperparameterGrid {
            dropout_2: vec![],
            ..HyperparameterGrid::default()
        };
        match grid.validate().unwrap_err() {
            PipelineError::EmptyGrid { parameter } => assert_eq!(parameter, "dropout_2"),
            other => panic!("Expected EmptyGrid, got {other:?}"),
        }
    }

    #[test]
    fn test_fraction_bounds() {
        let config = TuningConfig {
            sample_fraction: 0.0,
            ..TuningConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
        let config = TuningConfig {
            validation_fraction: 1.0,
            ..TuningConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_holdout_takes_newest_periods() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let mut design = DesignMatrix::from_rows(vec!["x".into()], &rows, vec![0.0; 10]).unwrap();
        design.periods = vec![5, 1, 9, 3, 7, 2, 8, 4, 6, 0];
        let (fit, validation) = temporal_holdout(&design, 0.2).unwrap();
        assert_eq!(fit.len(), 8);
        let mut newest: Vec<i64> = validation.iter().map(|&i| design.periods[i]).collect();
        newest.sort();
        assert_eq!(newest, vec![8, 9]);
    }
}
