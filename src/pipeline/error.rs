//! Error taxonomy for the modeling pipeline.
//!
//! Every variant is a local data-validation failure detected before or during
//! a fit. None of them is transient, so callers should not retry; each one
//! carries the field, row or parameter that caused it.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised by the feature builder, the fit engines and the bootstrap engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A named column is missing, or train/test column sets differ after encoding.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A categorical level appears in data that was not seen when the encoding was fitted.
    #[error("Unseen category '{level}' in field '{field}' (row {row}); the training encoding has no column for it")]
    UnseenCategory {
        field: String,
        level: String,
        row: usize,
    },

    /// The configured reference level does not occur in the training rows.
    #[error("Reference level '{level}' for field '{field}' does not occur in the training data (levels: {available:?})")]
    InvalidReferenceLevel {
        field: String,
        level: String,
        available: Vec<String>,
    },

    /// A predictor, response or time value is null.
    #[error("Missing value in field '{field}' at row {row}")]
    MissingValue { field: String, row: usize },

    /// The temporal split windows are empty, inverted or leak future rows into training.
    #[error("Invalid temporal split: {0}")]
    InvalidSplit(String),

    /// Fewer usable degrees of freedom than the cross-validation needs.
    #[error("Singular feature set: {rows} training row(s) and {usable_columns} non-constant column(s) cannot support {folds}-fold cross-validation")]
    SingularFeatureSet {
        rows: usize,
        usable_columns: usize,
        folds: usize,
    },

    /// The response is constant, so SST = 0 and R² is undefined.
    #[error("Degenerate response '{field}': every value equals {value}")]
    DegenerateResponse { field: String, value: f64 },

    /// Every sampled tuning run produced a non-finite loss.
    #[error("No converging run: all {runs} sampled configuration(s) diverged")]
    NoConvergingRun { runs: usize },

    /// A hyperparameter was given no candidate values.
    #[error("Hyperparameter grid entry '{parameter}' has no candidate values")]
    EmptyGrid { parameter: &'static str },

    /// The tuning search was stopped before any run completed.
    #[error("Tuning interrupted before any of the {planned} planned run(s) completed")]
    Interrupted { planned: usize },

    /// A classification response contains a single class.
    #[error("Insufficient variation in '{field}': only class {class} present")]
    InsufficientVariation { field: String, class: f64 },

    /// Too many single-class resamples were drawn for one bootstrap replicate.
    #[error("Bootstrap exhausted: replicate {replicate} drew {attempts} single-class resample(s) in a row")]
    BootstrapExhausted { replicate: usize, attempts: usize },

    /// A configuration value is outside its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;
