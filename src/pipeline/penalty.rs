//! Penalty types and penalty grids

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};

/// Smallest mixing weight used when deriving `lambda_max` for ridge-like penalties
const MIN_ALPHA_FOR_LAMBDA_MAX: f64 = 1e-3;

/// Regularizer applied to the non-intercept coefficients.
///
/// Uses the elastic-net parametrisation `lambda * ((1 - alpha) / 2 * ||b||² + alpha * ||b||₁)`,
/// so `Lasso` is `alpha = 1` and `Ridge` is `alpha = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Penalty {
    #[default]
    Lasso,
    Ridge,
    ElasticNet {
        alpha: f64,
    },
}

impl Penalty {
    /// L1 share of the penalty
    pub fn alpha(&self) -> f64 {
        match self {
            Penalty::Lasso => 1.0,
            Penalty::Ridge => 0.0,
            Penalty::ElasticNet { alpha } => *alpha,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let alpha = self.alpha();
        if !(0.0..=1.0).contains(&alpha) {
            return Err(PipelineError::InvalidConfig(format!(
                "elastic-net alpha must be in [0, 1], got {}",
                alpha
            )));
        }
        Ok(())
    }

    /// Coordinate-wise minimiser for a standardized column.
    ///
    /// `rho` is the partial-residual correlation and `curvature` the column's
    /// (weighted) mean square; both are on the 1/n scale.
    pub fn update(&self, rho: f64, curvature: f64, lambda: f64) -> f64 {
        let alpha = self.alpha();
        let denom = curvature + lambda * (1.0 - alpha);
        if denom <= 0.0 {
            return 0.0;
        }
        soft_threshold(rho, lambda * alpha) / denom
    }
}

impl std::fmt::Display for Penalty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Penalty::Lasso => write!(f, "lasso"),
            Penalty::Ridge => write!(f, "ridge"),
            Penalty::ElasticNet { alpha } => write!(f, "elastic-net(alpha={})", alpha),
        }
    }
}

impl std::str::FromStr for Penalty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.as_str() {
            "lasso" | "l1" => Ok(Penalty::Lasso),
            "ridge" | "l2" => Ok(Penalty::Ridge),
            _ => match lower.strip_prefix("elastic-net:") {
                Some(alpha) => alpha
                    .parse::<f64>()
                    .map(|alpha| Penalty::ElasticNet { alpha })
                    .map_err(|_| format!("Invalid elastic-net alpha: '{}'", alpha)),
                None => Err(format!(
                    "Unknown penalty: '{}'. Use 'lasso', 'ridge' or 'elastic-net:<alpha>'.",
                    s
                )),
            },
        }
    }
}

/// `sign(z) * max(|z| - gamma, 0)`
#[inline]
pub fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

/// Descending sequence of candidate penalty strengths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyGrid(Vec<f64>);

impl PenaltyGrid {
    /// Wrap explicit values; they are sorted descending and must be positive and finite
    pub fn from_values(mut values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(PipelineError::InvalidConfig("penalty grid is empty".to_string()));
        }
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(PipelineError::InvalidConfig(format!(
                "penalty grid values must be finite and non-negative, got {}",
                bad
            )));
        }
        values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Self(values))
    }

    /// `n` geometrically spaced values from `lambda_max` down to `lambda_max * min_ratio`
    pub fn geometric(lambda_max: f64, min_ratio: f64, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(PipelineError::InvalidConfig(
                "penalty grid needs at least one value".to_string(),
            ));
        }
        if !(min_ratio > 0.0 && min_ratio < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "lambda_min_ratio must be in (0, 1), got {}",
                min_ratio
            )));
        }
        if !(lambda_max.is_finite() && lambda_max > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "lambda_max must be positive and finite, got {}",
                lambda_max
            )));
        }

        if n == 1 {
            return Ok(Self(vec![lambda_max]));
        }
        let step = min_ratio.ln() / (n - 1) as f64;
        Ok(Self(
            (0..n)
                .map(|k| lambda_max * (step * k as f64).exp())
                .collect(),
        ))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn max(&self) -> f64 {
        self.0[0]
    }
}

/// Smallest penalty at which every coefficient is zero.
///
/// `gradients` are the absolute correlations `|x_j' (y - ȳ)| / n` of the
/// standardized columns with the centred response.
pub fn lambda_max(gradients: &[f64], penalty: &Penalty) -> f64 {
    let max_gradient = gradients.iter().fold(0.0f64, |acc, g| acc.max(g.abs()));
    max_gradient / penalty.alpha().max(MIN_ALPHA_FOR_LAMBDA_MAX)
}
