//! Scoring metrics for regression and classification fits

use serde::Serialize;

use super::error::{PipelineError, Result};

/// Tolerance used when grouping tied scores for AUC
const TIE_TOLERANCE: f64 = 1e-12;

/// Test-set scores of a regression model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub mse: f64,
    pub r_squared: f64,
}

/// One (entity, predicted value) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub entity: String,
    pub value: f64,
}

/// Mean squared error
pub fn mean_squared_error(observed: &[f64], predicted: &[f64]) -> f64 {
    if observed.is_empty() {
        return f64::NAN;
    }
    sum_squared_error(observed, predicted) / observed.len() as f64
}

fn sum_squared_error(observed: &[f64], predicted: &[f64]) -> f64 {
    observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| {
            let d = o - p;
            d * d
        })
        .sum()
}

/// `R² = 1 - SSE / SST`, with SST taken about the mean of `observed`.
///
/// Invariant under `v -> a * v + c` (a != 0) applied to observed and predicted
/// together, since SSE and SST both scale by `a²`. Shifting or rescaling only
/// the observed values changes it. A constant `observed` (SST = 0) is an error.
pub fn r_squared(observed: &[f64], predicted: &[f64], field: &str) -> Result<f64> {
    let n = observed.len();
    if n == 0 {
        return Err(PipelineError::InvalidConfig(
            "cannot score an empty set of observations".to_string(),
        ));
    }

    let mean = observed.iter().sum::<f64>() / n as f64;
    let sst: f64 = observed.iter().map(|o| (o - mean) * (o - mean)).sum();
    let scale = observed.iter().fold(0.0f64, |acc, o| acc.max(o.abs())).max(1.0);
    if sst <= f64::EPSILON * scale * scale * n as f64 {
        return Err(PipelineError::DegenerateResponse {
            field: field.to_string(),
            value: observed[0],
        });
    }

    Ok(1.0 - sum_squared_error(observed, predicted) / sst)
}

/// MSE and R² of predictions against observed values
pub fn score(observed: &[f64], predicted: &[f64], field: &str) -> Result<Evaluation> {
    Ok(Evaluation {
        mse: mean_squared_error(observed, predicted),
        r_squared: r_squared(observed, predicted, field)?,
    })
}

/// Area under the ROC curve via the Mann-Whitney U statistic.
///
/// Tied scores share their mid-rank. Labels are 0/1. Returns `None` when only
/// one class is present.
pub fn auc(scores: &[f64], labels: &[f64]) -> Option<f64> {
    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(labels)
        .map(|(&s, &y)| (s, y > 0.5))
        .collect();

    let total_pos = pairs.iter().filter(|(_, positive)| *positive).count() as f64;
    let total_neg = pairs.len() as f64 - total_pos;
    if total_pos == 0.0 || total_neg == 0.0 {
        return None;
    }

    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = pairs.len();
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && (pairs[j].0 - pairs[i].0).abs() <= TIE_TOLERANCE {
            j += 1;
        }
        // ranks i+1..=j share their average
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let positives = pairs[i..j].iter().filter(|(_, positive)| *positive).count() as f64;
        rank_sum_pos += avg_rank * positives;
        i = j;
    }

    let u = rank_sum_pos - total_pos * (total_pos + 1.0) / 2.0;
    Some((u / (total_pos * total_neg)).clamp(0.0, 1.0))
}

/// Share of rows whose thresholded probability matches the 0/1 label
pub fn accuracy(probabilities: &[f64], labels: &[f64], threshold: f64) -> f64 {
    if labels.is_empty() {
        return f64::NAN;
    }
    let correct = probabilities
        .iter()
        .zip(labels)
        .filter(|(&p, &y)| (p >= threshold) == (y > 0.5))
        .count();
    correct as f64 / labels.len() as f64
}

/// Accuracy of always predicting the majority class, and that class
pub fn majority_baseline(labels: &[f64]) -> (f64, f64) {
    if labels.is_empty() {
        return (f64::NAN, 0.0);
    }
    let positives = labels.iter().filter(|&&y| y > 0.5).count();
    let negatives = labels.len() - positives;
    let (class, count) = if positives > negatives {
        (1.0, positives)
    } else {
        (0.0, negatives)
    };
    (count as f64 / labels.len() as f64, class)
}

/// Pair entities with predictions, sorted by predicted value descending
pub fn rank_predictions(entities: &[String], values: &[f64]) -> Vec<Prediction> {
    let mut ranked: Vec<Prediction> = entities
        .iter()
        .zip(values)
        .map(|(entity, &value)| Prediction {
            entity: entity.clone(),
            value,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}
