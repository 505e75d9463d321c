//! tempfit: temporal modeling library
//!
//! Builds train/test feature matrices split by time period, fits
//! cross-validated penalized regressions, tunes a small neural network
//! by random grid search, and reports bootstrap inference for logistic
//! classifiers.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;
