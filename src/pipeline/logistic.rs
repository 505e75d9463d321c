//! Logistic regression for binary responses
//!
//! Iteratively reweighted least squares. Each outer step solves the weighted
//! least-squares problem by coordinate descent on standardized predictors, so
//! the same penalties as the linear engine apply (none by default).

use faer::Mat;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::design::{linear_predictor, DesignMatrix, Standardizer};
use super::encoding::FeatureEncoding;
use super::error::{PipelineError, Result};
use super::penalty::Penalty;

/// Fitted probabilities are kept inside this margin of 0 and 1
const PROBABILITY_FLOOR: f64 = 1e-5;
const MAX_INNER_SWEEPS: usize = 1_000;

/// Classifier settings. An unpenalized fit is `lambda = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSpec {
    pub penalty: Penalty,
    pub lambda: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ClassifierSpec {
    fn default() -> Self {
        Self {
            penalty: Penalty::Lasso,
            lambda: 0.0,
            max_iterations: 50,
            tolerance: 1e-8,
        }
    }
}

impl ClassifierSpec {
    pub fn validate(&self) -> Result<()> {
        self.penalty.validate()?;
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "classifier lambda must be finite and non-negative, got {}",
                self.lambda
            )));
        }
        if self.max_iterations == 0 || !(self.tolerance > 0.0) {
            return Err(PipelineError::InvalidConfig(
                "classifier max_iterations and tolerance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fitted logistic model on the original predictor scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub columns: Vec<String>,
    pub response: String,
    pub spec: ClassifierSpec,
    pub encoding: FeatureEncoding,
}

impl LogisticModel {
    /// Predicted probability of the positive class for every row
    pub fn predict_proba(&self, x: &Mat<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "model has {} coefficient(s) but the matrix has {} column(s)",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(linear_predictor(x, self.intercept, &self.coefficients)
            .into_iter()
            .map(sigmoid)
            .collect())
    }

    pub fn predict_frame(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let x = self.encoding.encode_frame(df)?;
        self.predict_proba(&x)
    }

    /// Intercept followed by the coefficients, matching `parameter_names`
    pub fn parameters(&self) -> Vec<f64> {
        std::iter::once(self.intercept)
            .chain(self.coefficients.iter().copied())
            .collect()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        std::iter::once("(Intercept)".to_string())
            .chain(self.columns.iter().cloned())
            .collect()
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Reject responses that are not 0/1 or contain a single class
pub fn check_binary(y: &[f64], field: &str) -> Result<()> {
    if let Some(bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "classification response '{}' must be coded 0/1, found {}",
            field, bad
        )));
    }
    let positives = y.iter().filter(|&&v| v == 1.0).count();
    if positives == 0 || positives == y.len() {
        return Err(PipelineError::InsufficientVariation {
            field: field.to_string(),
            class: y.first().copied().unwrap_or(0.0),
        });
    }
    Ok(())
}

/// Fit by IRLS
pub fn fit_logistic(design: &DesignMatrix, spec: &ClassifierSpec) -> Result<LogisticModel> {
    spec.validate()?;
    check_binary(&design.y, &design.response)?;

    let scaler = Standardizer::fit(&design.x);
    let z = scaler.transform(&design.x);
    let (intercept, beta, iterations) = irls(&z, &design.y, spec);
    let (intercept, coefficients) = scaler.unstandardize(intercept, &beta);

    debug!(
        iterations,
        rows = design.nrows(),
        columns = design.ncols(),
        "logistic fit complete"
    );

    Ok(LogisticModel {
        intercept,
        coefficients,
        columns: design.columns.clone(),
        response: design.response.clone(),
        spec: *spec,
        encoding: design.encoding.clone(),
    })
}

/// Returns (intercept, standardized coefficients, outer iterations)
fn irls(z: &Mat<f64>, y: &[f64], spec: &ClassifierSpec) -> (f64, Vec<f64>, usize) {
    let n = z.nrows();
    let p = z.ncols();
    let nf = n as f64;

    let y_mean = y.iter().sum::<f64>() / nf;
    let mut b0 = (y_mean / (1.0 - y_mean)).ln();
    let mut beta = vec![0.0; p];
    let mut eta = vec![b0; n];

    for iteration in 1..=spec.max_iterations {
        let mut weights = Vec::with_capacity(n);
        let mut residual = Vec::with_capacity(n);
        for i in 0..n {
            let prob = sigmoid(eta[i]).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
            let w = prob * (1.0 - prob);
            weights.push(w);
            // working response minus the current fit
            residual.push((y[i] - prob) / w);
        }

        let previous_b0 = b0;
        let previous_beta = beta.clone();
        weighted_descent(z, &weights, &mut residual, &mut b0, &mut beta, spec);

        for (i, e) in eta.iter_mut().enumerate() {
            *e = b0 + (0..p).map(|j| z[(i, j)] * beta[j]).sum::<f64>();
        }

        let change = beta
            .iter()
            .zip(&previous_beta)
            .map(|(b, pb)| (b - pb).abs())
            .fold((b0 - previous_b0).abs(), f64::max);
        // IRLS converges quadratically, so a step below √tol leaves an error near tol
        if change < spec.tolerance.sqrt() || !change.is_finite() {
            return (b0, beta, iteration);
        }
    }

    (b0, beta, spec.max_iterations)
}

/// Coordinate descent on `(1/2n) Σ w_i r_i² + penalty`, moving `residual` along
fn weighted_descent(
    z: &Mat<f64>,
    weights: &[f64],
    residual: &mut [f64],
    b0: &mut f64,
    beta: &mut [f64],
    spec: &ClassifierSpec,
) {
    let n = z.nrows();
    let nf = n as f64;
    let weight_sum: f64 = weights.iter().sum();
    let curvature: Vec<f64> = (0..beta.len())
        .map(|j| (0..n).map(|i| weights[i] * z[(i, j)] * z[(i, j)]).sum::<f64>() / nf)
        .collect();

    for _ in 0..MAX_INNER_SWEEPS {
        let mut max_change = 0.0f64;

        let shift = (0..n).map(|i| weights[i] * residual[i]).sum::<f64>() / weight_sum;
        if shift != 0.0 {
            *b0 += shift;
            residual.iter_mut().for_each(|r| *r -= shift);
            max_change = max_change.max(shift.abs());
        }

        for j in 0..beta.len() {
            if curvature[j] <= 0.0 {
                continue;
            }
            let gradient = (0..n).map(|i| weights[i] * z[(i, j)] * residual[i]).sum::<f64>() / nf;
            let rho = gradient + curvature[j] * beta[j];
            let updated = spec.penalty.update(rho, curvature[j], spec.lambda);
            let delta = updated - beta[j];
            if delta != 0.0 {
                for i in 0..n {
                    residual[i] -= z[(i, j)] * delta;
                }
                beta[j] = updated;
                max_change = max_change.max(delta.abs() * curvature[j].sqrt());
            }
        }

        if max_change < spec.tolerance {
            break;
        }
    }
}
