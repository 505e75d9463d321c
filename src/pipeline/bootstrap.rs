//! Bootstrap inference for the logistic classifier
//!
//! Every replicate draws `n` rows with replacement using its own seeded RNG,
//! refits the classifier and records one statistic; the resample is then
//! dropped. Replicates run in parallel and are aggregated once all finish.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::design::DesignMatrix;
use super::error::{PipelineError, Result};
use super::logistic::{check_binary, fit_logistic, ClassifierSpec, LogisticModel};
use super::metrics::{accuracy, auc, majority_baseline};
use super::stats::{mean, sample_sd, significance_marker, stream_rng, two_sided_p_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub replicates: usize,
    pub seed: u64,
    /// Single-class resamples redrawn per replicate before giving up
    pub max_redraws: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            replicates: 1000,
            seed: 42,
            max_redraws: 100,
        }
    }
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.replicates < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "bootstrap needs at least 2 replicates, got {}",
                self.replicates
            )));
        }
        Ok(())
    }
}

/// One row of the coefficient table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z: f64,
    pub p_value: f64,
    pub significance: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoefficientTable {
    /// Intercept first, then one row per design column
    pub rows: Vec<CoefficientRow>,
    pub replicates: usize,
    pub seed: u64,
}

impl CoefficientTable {
    pub fn get(&self, name: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|row| row.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimismCorrectedAuc {
    /// AUC of the full-data fit on the full data
    pub apparent: f64,
    /// Mean AUC of the resample fits on the original data
    pub mean_original: f64,
    /// Mean AUC of the resample fits on their own resample
    pub mean_resample: f64,
    /// Mean of (resample AUC - original-data AUC)
    pub optimism: f64,
    /// `mean_original - optimism`
    pub corrected: f64,
    pub replicates: usize,
}

/// Majority-class baseline and model accuracy, reported side by side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationSummary {
    pub rows: usize,
    pub majority_class: f64,
    pub baseline_accuracy: f64,
    pub model_accuracy: f64,
    pub threshold: f64,
    pub auc: Option<f64>,
}

/// Row indices for one replicate, redrawing single-class resamples
fn draw_resample(y: &[f64], replicate: usize, config: &BootstrapConfig) -> Result<Vec<usize>> {
    let n = y.len();
    let mut rng = stream_rng(config.seed, replicate as u64);

    for attempt in 0..=config.max_redraws {
        let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let positives = rows.iter().filter(|&&i| y[i] == 1.0).count();
        if positives > 0 && positives < n {
            if attempt > 0 {
                debug!(replicate, redraws = attempt, "redrew single-class resample");
            }
            return Ok(rows);
        }
    }

    warn!(replicate, attempts = config.max_redraws + 1, "every resample had a single class");
    Err(PipelineError::BootstrapExhausted {
        replicate,
        attempts: config.max_redraws + 1,
    })
}

fn check_inputs(design: &DesignMatrix, spec: &ClassifierSpec, config: &BootstrapConfig) -> Result<()> {
    config.validate()?;
    spec.validate()?;
    check_binary(&design.y, &design.response)
}

/// Bootstrap standard errors, z statistics and p-values for every coefficient
pub fn bootstrap_coefficients(
    design: &DesignMatrix,
    spec: &ClassifierSpec,
    config: &BootstrapConfig,
) -> Result<CoefficientTable> {
    check_inputs(design, spec, config)?;
    let original = fit_logistic(design, spec)?;

    let draws: Vec<Vec<f64>> = (0..config.replicates)
        .into_par_iter()
        .map(|replicate| {
            let rows = draw_resample(&design.y, replicate, config)?;
            let model = fit_logistic(&design.select_rows(&rows), spec)?;
            Ok(model.parameters())
        })
        .collect::<Result<Vec<_>>>()?;

    let estimates = original.parameters();
    let rows: Vec<CoefficientRow> = original
        .parameter_names()
        .into_iter()
        .enumerate()
        .map(|(k, name)| {
            let values: Vec<f64> = draws.iter().map(|draw| draw[k]).collect();
            let std_error = sample_sd(&values);
            let estimate = estimates[k];
            let z = estimate / std_error;
            let p_value = two_sided_p_value(z);
            CoefficientRow {
                name,
                estimate,
                std_error,
                z,
                p_value,
                significance: significance_marker(p_value),
            }
        })
        .collect();

    info!(
        replicates = config.replicates,
        parameters = rows.len(),
        significant = rows.iter().filter(|r| r.p_value < 0.05).count(),
        "bootstrap coefficient inference complete"
    );

    Ok(CoefficientTable {
        rows,
        replicates: config.replicates,
        seed: config.seed,
    })
}

fn auc_or_degenerate(scores: &[f64], labels: &[f64], field: &str) -> Result<f64> {
    auc(scores, labels).ok_or_else(|| PipelineError::InsufficientVariation {
        field: field.to_string(),
        class: labels.first().copied().unwrap_or(0.0),
    })
}

/// Optimism-corrected AUC: each replicate fits on its resample and scores both
/// the original rows and the resample itself
pub fn bootstrap_auc(
    design: &DesignMatrix,
    spec: &ClassifierSpec,
    config: &BootstrapConfig,
) -> Result<OptimismCorrectedAuc> {
    check_inputs(design, spec, config)?;
    let field = design.response.as_str();

    let full = fit_logistic(design, spec)?;
    let apparent = auc_or_degenerate(&full.predict_proba(&design.x)?, &design.y, field)?;

    let pairs: Vec<(f64, f64)> = (0..config.replicates)
        .into_par_iter()
        .map(|replicate| {
            let rows = draw_resample(&design.y, replicate, config)?;
            let resample = design.select_rows(&rows);
            let model = fit_logistic(&resample, spec)?;

            let on_original = auc_or_degenerate(&model.predict_proba(&design.x)?, &design.y, field)?;
            let on_resample = auc_or_degenerate(&model.predict_proba(&resample.x)?, &resample.y, field)?;
            Ok((on_original, on_resample))
        })
        .collect::<Result<Vec<_>>>()?;

    let original: Vec<f64> = pairs.iter().map(|(a, _)| *a).collect();
    let resampled: Vec<f64> = pairs.iter().map(|(_, b)| *b).collect();
    let optimism: Vec<f64> = pairs.iter().map(|(a, b)| b - a).collect();

    let mean_original = mean(&original);
    let optimism = mean(&optimism);
    let result = OptimismCorrectedAuc {
        apparent,
        mean_original,
        mean_resample: mean(&resampled),
        optimism,
        corrected: mean_original - optimism,
        replicates: config.replicates,
    };

    info!(
        apparent = result.apparent,
        optimism = result.optimism,
        corrected = result.corrected,
        "optimism-corrected AUC"
    );
    Ok(result)
}

/// Baseline vs model accuracy at `threshold`, plus the apparent AUC
pub fn classification_summary(
    model: &LogisticModel,
    design: &DesignMatrix,
    threshold: f64,
) -> Result<ClassificationSummary> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(PipelineError::InvalidConfig(format!(
            "classification threshold must be in [0, 1], got {}",
            threshold
        )));
    }
    let probabilities = model.predict_proba(&design.x)?;
    let (baseline_accuracy, majority_class) = majority_baseline(&design.y);

    Ok(ClassificationSummary {
        rows: design.nrows(),
        majority_class,
        baseline_accuracy,
        model_accuracy: accuracy(&probabilities, &design.y, threshold),
        threshold,
        auc: auc(&probabilities, &design.y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rare_positive_design() -> DesignMatrix {
        // one positive in 40 rows: most resamples miss it
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let mut y = vec![0.0; 40];
        y[39] = 1.0;
        DesignMatrix::from_rows(vec!["x".into()], &rows, y).unwrap()
    }

    #[test]
    fn test_redraw_bound_exhausted() {
        let design = rare_positive_design();
        let config = BootstrapConfig {
            replicates: 50,
            seed: 1,
            max_redraws: 0,
        };
        // P(no positive in a resample of 40) = (39/40)^40 ≈ 0.36, so some replicate fails
        let err = bootstrap_coefficients(&design, &ClassifierSpec::default(), &config).unwrap_err();
        assert!(matches!(err, PipelineError::BootstrapExhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_draw_resample_is_seeded() {
        let design = rare_positive_design();
        let config = BootstrapConfig::default();
        let a = draw_resample(&design.y, 3, &config).unwrap();
        let b = draw_resample(&design.y, 3, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.iter().any(|&i| i == 39));
    }

    #[test]
    fn test_neighbouring_seeds_draw_unrelated_replicates() {
        let design = rare_positive_design();
        let first = BootstrapConfig {
            seed: 1,
            ..BootstrapConfig::default()
        };
        let second = BootstrapConfig {
            seed: 2,
            ..BootstrapConfig::default()
        };
        for replicate in 0..20 {
            let a = draw_resample(&design.y, replicate, &first).unwrap();
            let b = draw_resample(&design.y, replicate, &second).unwrap();
            let shifted = draw_resample(&design.y, replicate + 1, &first).unwrap();
            assert_ne!(a, b);
            assert_ne!(shifted, b, "replicate {} of seed 1 reused by seed 2", replicate + 1);
        }
    }

    #[test]
    fn test_single_class_original_rejected() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let design = DesignMatrix::from_rows(vec!["x".into()], &rows, vec![0.0; 10]).unwrap();
        let err = bootstrap_auc(&design, &ClassifierSpec::default(), &BootstrapConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientVariation { .. }));
    }

    #[test]
    fn test_replicates_validated() {
        let config = BootstrapConfig {
            replicates: 1,
            ..BootstrapConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
