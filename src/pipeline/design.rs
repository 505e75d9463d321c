//! Numeric design matrices and column standardization

use faer::Mat;

use super::encoding::FeatureEncoding;
use super::error::{PipelineError, Result};

/// Numeric matrix derived from a dataset, with the encoding that produced it.
///
/// The intercept is never stored as a column; the fit engines add it.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: Mat<f64>,
    pub y: Vec<f64>,
    pub columns: Vec<String>,
    pub entities: Vec<String>,
    pub periods: Vec<i64>,
    pub response: String,
    pub encoding: FeatureEncoding,
}

impl DesignMatrix {
    /// Build a matrix directly from row-major values. Used for synthetic data
    /// and by callers that do their own encoding.
    pub fn from_rows(columns: Vec<String>, rows: &[Vec<f64>], y: Vec<f64>) -> Result<Self> {
        if rows.len() != y.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "{} row(s) of predictors but {} response value(s)",
                rows.len(),
                y.len()
            )));
        }
        if let Some((row, values)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(PipelineError::SchemaMismatch(format!(
                "row {} has {} value(s), expected {}",
                row,
                values.len(),
                columns.len()
            )));
        }

        let x = Mat::from_fn(rows.len(), columns.len(), |i, j| rows[i][j]);
        let n = y.len();
        Ok(Self {
            x,
            y,
            encoding: FeatureEncoding::passthrough(columns.clone()),
            columns,
            entities: (0..n).map(|i| i.to_string()).collect(),
            periods: vec![0; n],
            response: "y".to_string(),
        })
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    /// Copy of the selected rows, in the given order (repeats allowed)
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            x: select_rows(&self.x, rows),
            y: rows.iter().map(|&i| self.y[i]).collect(),
            columns: self.columns.clone(),
            entities: rows.iter().map(|&i| self.entities[i].clone()).collect(),
            periods: rows.iter().map(|&i| self.periods[i]).collect(),
            response: self.response.clone(),
            encoding: self.encoding.clone(),
        }
    }

    /// Column `j` as an owned vector
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.x.nrows()).map(|i| self.x[(i, j)]).collect()
    }
}

/// Copy the selected rows of a matrix
pub fn select_rows(x: &Mat<f64>, rows: &[usize]) -> Mat<f64> {
    Mat::from_fn(rows.len(), x.ncols(), |i, j| x[(rows[i], j)])
}

/// Per-column centring and scaling learned from one matrix.
///
/// Scales are population standard deviations. Constant columns keep a scale of
/// zero and standardize to zero, so they can never receive a coefficient.
#[derive(Debug, Clone)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(x: &Mat<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());

        for j in 0..x.ncols() {
            let mean = (0..x.nrows()).map(|i| x[(i, j)]).sum::<f64>() / n;
            let var = (0..x.nrows())
                .map(|i| {
                    let d = x[(i, j)] - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            let sd = var.sqrt();
            means.push(mean);
            scales.push(if sd > 1e-12 { sd } else { 0.0 });
        }

        Self { means, scales }
    }

    pub fn transform(&self, x: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(x.nrows(), x.ncols(), |i, j| {
            let scale = self.scales[j];
            if scale > 0.0 {
                (x[(i, j)] - self.means[j]) / scale
            } else {
                0.0
            }
        })
    }

    /// Number of columns with non-zero variance
    pub fn usable_columns(&self) -> usize {
        self.scales.iter().filter(|&&s| s > 0.0).count()
    }

    /// Map standardized-scale coefficients back to the original scale
    pub fn unstandardize(&self, intercept: f64, beta: &[f64]) -> (f64, Vec<f64>) {
        let coefficients: Vec<f64> = beta
            .iter()
            .zip(&self.scales)
            .map(|(b, &s)| if s > 0.0 { b / s } else { 0.0 })
            .collect();
        let shift: f64 = coefficients
            .iter()
            .zip(&self.means)
            .map(|(c, m)| c * m)
            .sum();
        (intercept - shift, coefficients)
    }
}

/// Linear predictor `b0 + X b` for every row
pub fn linear_predictor(x: &Mat<f64>, intercept: f64, coefficients: &[f64]) -> Vec<f64> {
    (0..x.nrows())
        .map(|i| {
            intercept
                + coefficients
                    .iter()
                    .enumerate()
                    .map(|(j, c)| c * x[(i, j)])
                    .sum::<f64>()
        })
        .collect()
}
