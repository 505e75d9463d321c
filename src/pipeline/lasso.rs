//! Regularized linear fit engine
//!
//! Coordinate descent with covariance updates on standardized predictors,
//! warm-started along a descending penalty grid. The penalty is chosen by
//! seeded K-fold cross-validation and the model is refit on all training rows.

use faer::Mat;
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::design::{linear_predictor, select_rows, DesignMatrix, Standardizer};
use super::encoding::FeatureEncoding;
use super::error::{PipelineError, Result};
use super::metrics::{self, Evaluation, Prediction};
use super::penalty::{lambda_max, Penalty, PenaltyGrid};

/// How the penalty is picked from the cross-validation curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Smallest mean CV error
    #[default]
    Min,
    /// Largest penalty whose mean CV error is within one standard error of the minimum
    OneStandardError,
}

impl std::str::FromStr for SelectionRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "min" => Ok(SelectionRule::Min),
            "1se" | "one-se" | "one_standard_error" => Ok(SelectionRule::OneStandardError),
            _ => Err(format!("Unknown selection rule: '{}'. Use 'min' or '1se'.", s)),
        }
    }
}

/// Settings for penalty selection and fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LassoConfig {
    pub penalty: Penalty,
    pub folds: usize,
    pub n_lambda: usize,
    /// Defaults to 1e-4 when rows exceed columns, else 1e-2
    pub lambda_min_ratio: Option<f64>,
    pub rule: SelectionRule,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for LassoConfig {
    fn default() -> Self {
        Self {
            penalty: Penalty::Lasso,
            folds: 10,
            n_lambda: 100,
            lambda_min_ratio: None,
            rule: SelectionRule::Min,
            max_iterations: 10_000,
            tolerance: 1e-7,
            seed: 42,
        }
    }
}

impl LassoConfig {
    pub fn validate(&self) -> Result<()> {
        self.penalty.validate()?;
        if self.folds < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.folds
            )));
        }
        if self.n_lambda == 0 {
            return Err(PipelineError::InvalidConfig(
                "n_lambda must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) || self.max_iterations == 0 {
            return Err(PipelineError::InvalidConfig(
                "tolerance and max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fitted linear model on the original predictor scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub columns: Vec<String>,
    pub response: String,
    pub penalty: Penalty,
    pub lambda: f64,
    pub encoding: FeatureEncoding,
}

impl LinearModel {
    pub fn predict(&self, x: &Mat<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "model has {} coefficient(s) but the matrix has {} column(s)",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        Ok(linear_predictor(x, self.intercept, &self.coefficients))
    }

    /// Encode a raw frame with the stored encoding and predict every row
    pub fn predict_frame(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let x = self.encoding.encode_frame(df)?;
        self.predict(&x)
    }

    pub fn nonzero_count(&self) -> usize {
        self.coefficients.iter().filter(|c| **c != 0.0).count()
    }

    /// (column, coefficient) pairs for the non-zero coefficients
    pub fn selected(&self) -> Vec<(&str, f64)> {
        self.columns
            .iter()
            .zip(&self.coefficients)
            .filter(|(_, c)| **c != 0.0)
            .map(|(name, c)| (name.as_str(), *c))
            .collect()
    }
}

/// Coefficients at one point of the penalty path
#[derive(Debug, Clone, PartialEq)]
pub struct PathPoint {
    pub lambda: f64,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl PathPoint {
    pub fn nonzero_count(&self) -> usize {
        self.coefficients.iter().filter(|c| **c != 0.0).count()
    }
}

/// Cross-validation curve over the penalty grid
#[derive(Debug, Clone, Serialize)]
pub struct CrossValidation {
    pub lambdas: Vec<f64>,
    pub mean_mse: Vec<f64>,
    /// Standard error of the fold MSEs
    pub se_mse: Vec<f64>,
    /// Non-zero coefficients of the full-data path at each penalty
    pub nonzero: Vec<usize>,
    pub folds: usize,
    pub rule: SelectionRule,
    pub selected: usize,
}

impl CrossValidation {
    pub fn selected_lambda(&self) -> f64 {
        self.lambdas[self.selected]
    }

    pub fn selected_mse(&self) -> f64 {
        self.mean_mse[self.selected]
    }
}

/// Selected model with the CV curve that chose it
#[derive(Debug, Clone)]
pub struct LassoFit {
    pub model: LinearModel,
    pub cv: CrossValidation,
}

/// Standardized normal equations of one design: `G = Zᵀ Z / n`, `c = Zᵀ (y - ȳ) / n`
struct CovarianceSystem {
    scaler: Standardizer,
    gram: Mat<f64>,
    corr: Vec<f64>,
    y_mean: f64,
}

impl CovarianceSystem {
    fn new(x: &Mat<f64>, y: &[f64]) -> Self {
        let n = y.len().max(1) as f64;
        let scaler = Standardizer::fit(x);
        let z = scaler.transform(x);
        let y_mean = y.iter().sum::<f64>() / n;

        let mut gram = z.transpose() * z.as_ref();
        for i in 0..gram.nrows() {
            for j in 0..gram.ncols() {
                gram[(i, j)] /= n;
            }
        }

        let corr = (0..z.ncols())
            .map(|j| {
                (0..z.nrows())
                    .map(|i| z[(i, j)] * (y[i] - y_mean))
                    .sum::<f64>()
                    / n
            })
            .collect();

        Self {
            scaler,
            gram,
            corr,
            y_mean,
        }
    }

    fn lambda_max(&self, penalty: &Penalty) -> f64 {
        lambda_max(&self.corr, penalty)
    }

    /// Minimise at one penalty, starting from (and updating) `beta`
    fn solve(
        &self,
        penalty: &Penalty,
        lambda: f64,
        beta: &mut [f64],
        max_iterations: usize,
        tolerance: f64,
    ) -> usize {
        let p = beta.len();
        // g = G beta, kept current as coordinates move
        let mut g: Vec<f64> = (0..p)
            .map(|i| (0..p).map(|k| self.gram[(i, k)] * beta[k]).sum())
            .collect();

        for iteration in 1..=max_iterations {
            let mut max_change = 0.0f64;
            for j in 0..p {
                let curvature = self.gram[(j, j)];
                if curvature <= 0.0 {
                    continue;
                }
                let rho = self.corr[j] - g[j] + curvature * beta[j];
                let updated = penalty.update(rho, curvature, lambda);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    for (i, gi) in g.iter_mut().enumerate() {
                        *gi += self.gram[(i, j)] * delta;
                    }
                    beta[j] = updated;
                    max_change = max_change.max(delta.abs() * curvature.sqrt());
                }
            }
            if max_change < tolerance {
                return iteration;
            }
        }

        debug!(lambda, max_iterations, "coordinate descent hit the iteration cap");
        max_iterations
    }

    fn path(&self, penalty: &Penalty, grid: &PenaltyGrid, max_iterations: usize, tolerance: f64) -> Vec<PathPoint> {
        let mut beta = vec![0.0; self.corr.len()];
        grid.values()
            .iter()
            .map(|&lambda| {
                self.solve(penalty, lambda, &mut beta, max_iterations, tolerance);
                let (intercept, coefficients) = self.scaler.unstandardize(self.y_mean, &beta);
                PathPoint {
                    lambda,
                    intercept,
                    coefficients,
                }
            })
            .collect()
    }
}

fn check_response(y: &[f64], field: &str) -> Result<()> {
    let first = y.first().copied().unwrap_or(f64::NAN);
    if y.iter().all(|v| (v - first).abs() <= 1e-12 * first.abs().max(1.0)) {
        return Err(PipelineError::DegenerateResponse {
            field: field.to_string(),
            value: first,
        });
    }
    Ok(())
}

/// Descending grid from `lambda_max` (all coefficients zero) to `lambda_max * min_ratio`
pub fn penalty_grid(
    train: &DesignMatrix,
    penalty: &Penalty,
    n: usize,
    min_ratio: Option<f64>,
) -> Result<PenaltyGrid> {
    penalty.validate()?;
    check_response(&train.y, &train.response)?;

    let system = CovarianceSystem::new(&train.x, &train.y);
    if system.scaler.usable_columns() == 0 {
        return Err(PipelineError::SingularFeatureSet {
            rows: train.nrows(),
            usable_columns: 0,
            folds: 0,
        });
    }

    let ratio = min_ratio.unwrap_or(if train.nrows() > train.ncols() { 1e-4 } else { 1e-2 });
    PenaltyGrid::geometric(system.lambda_max(penalty), ratio, n)
}

/// Coefficients at every penalty of the grid, warm-started from the largest
pub fn fit_path(train: &DesignMatrix, grid: &PenaltyGrid, config: &LassoConfig) -> Result<Vec<PathPoint>> {
    config.validate()?;
    let system = CovarianceSystem::new(&train.x, &train.y);
    Ok(system.path(&config.penalty, grid, config.max_iterations, config.tolerance))
}

/// Fit at one fixed penalty
pub fn fit_at(train: &DesignMatrix, lambda: f64, config: &LassoConfig) -> Result<LinearModel> {
    config.validate()?;
    check_response(&train.y, &train.response)?;

    let system = CovarianceSystem::new(&train.x, &train.y);
    // warm-start from lambda_max down to the target so large problems converge quickly
    let top = system.lambda_max(&config.penalty).max(lambda);
    let grid = if top > lambda && lambda > 0.0 {
        let mut values: Vec<f64> = PenaltyGrid::geometric(top, lambda / top, 20)?.values().to_vec();
        values[19] = lambda;
        PenaltyGrid::from_values(values)?
    } else {
        PenaltyGrid::from_values(vec![lambda])?
    };

    let point = system
        .path(&config.penalty, &grid, config.max_iterations, config.tolerance)
        .pop()
        .ok_or_else(|| PipelineError::InvalidConfig("empty penalty path".to_string()))?;

    Ok(model_from_point(train, point, config.penalty))
}

fn model_from_point(train: &DesignMatrix, point: PathPoint, penalty: Penalty) -> LinearModel {
    LinearModel {
        intercept: point.intercept,
        coefficients: point.coefficients,
        columns: train.columns.clone(),
        response: train.response.clone(),
        penalty,
        lambda: point.lambda,
        encoding: train.encoding.clone(),
    }
}

/// Seeded assignment of each row to one of `folds` folds, sizes differing by at most one
pub fn fold_assignment(n: usize, folds: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);

    let mut assignment = vec![0; n];
    for (position, &row) in order.iter().enumerate() {
        assignment[row] = position % folds;
    }
    assignment
}

/// K-fold CV error of every penalty on the grid
pub fn cross_validate(train: &DesignMatrix, grid: &PenaltyGrid, config: &LassoConfig) -> Result<CrossValidation> {
    config.validate()?;
    let n = train.nrows();
    let system = CovarianceSystem::new(&train.x, &train.y);
    let usable = system.scaler.usable_columns();
    if n < config.folds || usable == 0 {
        return Err(PipelineError::SingularFeatureSet {
            rows: n,
            usable_columns: usable,
            folds: config.folds,
        });
    }
    check_response(&train.y, &train.response)?;

    let assignment = fold_assignment(n, config.folds, config.seed);

    let fold_errors: Vec<Vec<f64>> = (0..config.folds)
        .into_par_iter()
        .map(|fold| {
            let (held_out, kept): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| assignment[i] == fold);

            let x_fit = select_rows(&train.x, &kept);
            let y_fit: Vec<f64> = kept.iter().map(|&i| train.y[i]).collect();
            let x_val = select_rows(&train.x, &held_out);
            let y_val: Vec<f64> = held_out.iter().map(|&i| train.y[i]).collect();

            let path = CovarianceSystem::new(&x_fit, &y_fit).path(
                &config.penalty,
                grid,
                config.max_iterations,
                config.tolerance,
            );

            let errors: Vec<f64> = path
                .iter()
                .map(|point| {
                    let predicted = linear_predictor(&x_val, point.intercept, &point.coefficients);
                    metrics::mean_squared_error(&y_val, &predicted)
                })
                .collect();
            debug!(fold, rows = held_out.len(), "cross-validation fold complete");
            errors
        })
        .collect();

    let k = config.folds as f64;
    let mut mean_mse = Vec::with_capacity(grid.len());
    let mut se_mse = Vec::with_capacity(grid.len());
    for l in 0..grid.len() {
        let errors: Vec<f64> = fold_errors.iter().map(|fold| fold[l]).collect();
        let mean = errors.iter().sum::<f64>() / k;
        let var = errors.iter().map(|e| (e - mean) * (e - mean)).sum::<f64>() / (k - 1.0);
        mean_mse.push(mean);
        se_mse.push((var / k).sqrt());
    }

    let selected = select_index(&mean_mse, &se_mse, config.rule);
    let nonzero = system
        .path(&config.penalty, grid, config.max_iterations, config.tolerance)
        .iter()
        .map(PathPoint::nonzero_count)
        .collect();

    Ok(CrossValidation {
        lambdas: grid.values().to_vec(),
        mean_mse,
        se_mse,
        nonzero,
        folds: config.folds,
        rule: config.rule,
        selected,
    })
}

/// Grid position picked by `rule`. The grid is descending, so scanning from the
/// front settles exact ties on the larger penalty.
fn select_index(mean_mse: &[f64], se_mse: &[f64], rule: SelectionRule) -> usize {
    let mut best = 0;
    for (i, &m) in mean_mse.iter().enumerate() {
        if m < mean_mse[best] {
            best = i;
        }
    }

    match rule {
        SelectionRule::Min => best,
        SelectionRule::OneStandardError => {
            let limit = mean_mse[best] + se_mse[best];
            mean_mse.iter().position(|&m| m <= limit).unwrap_or(best)
        }
    }
}

/// Select the penalty by cross-validation and refit on every training row
pub fn fit_lasso(train: &DesignMatrix, grid: &PenaltyGrid, config: &LassoConfig) -> Result<LassoFit> {
    let cv = cross_validate(train, grid, config)?;
    let model = fit_at(train, cv.selected_lambda(), config)?;

    info!(
        penalty = %config.penalty,
        lambda = cv.selected_lambda(),
        cv_mse = cv.selected_mse(),
        nonzero = model.nonzero_count(),
        columns = model.coefficients.len(),
        "selected penalty"
    );

    Ok(LassoFit { model, cv })
}

/// Test-set MSE and R² of a fitted model
pub fn evaluate(model: &LinearModel, test: &DesignMatrix) -> Result<Evaluation> {
    let predicted = model.predict(&test.x)?;
    metrics::score(&test.y, &predicted, &test.response)
}

/// Predictions for a design matrix, ranked descending
pub fn rank_predictions(model: &LinearModel, design: &DesignMatrix) -> Result<Vec<Prediction>> {
    let predicted = model.predict(&design.x)?;
    Ok(metrics::rank_predictions(&design.entities, &predicted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_design(n: usize) -> DesignMatrix {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let a = (i as f64 * 0.37).sin() * 3.0;
                let b = ((i * 7 % 11) as f64) - 5.0;
                vec![a, b]
            })
            .collect();
        let y = rows.iter().map(|r| 1.5 + 2.0 * r[0] - 0.5 * r[1]).collect();
        DesignMatrix::from_rows(vec!["a".into(), "b".into()], &rows, y).unwrap()
    }

    #[test]
    fn test_small_penalty_recovers_ols() {
        let design = linear_design(60);
        let model = fit_at(&design, 1e-8, &LassoConfig::default()).unwrap();
        assert!((model.intercept - 1.5).abs() < 1e-4);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-4);
        assert!((model.coefficients[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_lambda_max_zeroes_everything() {
        let design = linear_design(40);
        let config = LassoConfig::default();
        let grid = penalty_grid(&design, &config.penalty, 10, None).unwrap();
        let path = fit_path(&design, &grid, &config).unwrap();
        assert_eq!(path[0].nonzero_count(), 0);
        let mean = design.y.iter().sum::<f64>() / 40.0;
        assert!((path[0].intercept - mean).abs() < 1e-10);
        assert_eq!(path[9].nonzero_count(), 2);
    }

    #[test]
    fn test_ridge_keeps_all_coefficients() {
        let design = linear_design(40);
        let config = LassoConfig {
            penalty: Penalty::Ridge,
            ..LassoConfig::default()
        };
        let model = fit_at(&design, 5.0, &config).unwrap();
        assert_eq!(model.nonzero_count(), 2);
    }

    #[test]
    fn test_fewer_rows_than_folds() {
        let design = linear_design(5);
        let config = LassoConfig::default();
        let grid = PenaltyGrid::from_values(vec![1.0, 0.1]).unwrap();
        let err = cross_validate(&design, &grid, &config).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SingularFeatureSet { rows: 5, folds: 10, .. }
        ));
    }

    #[test]
    fn test_constant_response_is_degenerate() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let design = DesignMatrix::from_rows(vec!["a".into()], &rows, vec![4.0; 20]).unwrap();
        let err = penalty_grid(&design, &Penalty::Lasso, 10, None).unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateResponse { .. }));
    }

    #[test]
    fn test_fold_assignment_is_balanced_and_seeded() {
        let a = fold_assignment(23, 5, 7);
        let b = fold_assignment(23, 5, 7);
        assert_eq!(a, b);
        for fold in 0..5 {
            let size = a.iter().filter(|&&f| f == fold).count();
            assert!(size == 4 || size == 5);
        }
    }

    #[test]
    fn test_select_index_rules() {
        let mean = [5.0, 3.0, 2.0, 2.0, 2.5];
        let se = [0.1, 0.1, 1.2, 0.1, 0.1];
        assert_eq!(select_index(&mean, &se, SelectionRule::Min), 2);
        assert_eq!(select_index(&mean, &se, SelectionRule::OneStandardError), 1);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let design = linear_design(30);
        let model = fit_at(&design, 0.01, &LassoConfig::default()).unwrap();
        let narrow = Mat::<f64>::zeros(3, 1);
        assert!(matches!(
            model.predict(&narrow).unwrap_err(),
            PipelineError::SchemaMismatch(_)
        ));
    }
}
