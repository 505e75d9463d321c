//! Command-line argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::pipeline::{Penalty, SelectionRule};

/// tempfit - temporal train/test modeling with regularized fits, tuned networks and bootstrap inference
#[derive(Parser, Debug)]
#[command(name = "tempfit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Input data and run configuration shared by the fitting commands
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Run configuration file (JSON) with the dataset schema and fit settings
    #[arg(short, long)]
    pub config: PathBuf,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    pub export: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Select a penalty by cross-validation, fit, and score the held-out periods
    Lasso {
        #[command(flatten)]
        data: DataArgs,

        /// Number of cross-validation folds (overrides the config file)
        #[arg(long, value_parser = validate_folds)]
        folds: Option<usize>,

        /// Penalty type: lasso, ridge or elastic-net:<alpha>
        #[arg(long)]
        penalty: Option<Penalty>,

        /// Penalty selection rule: min or 1se
        #[arg(long)]
        rule: Option<SelectionRule>,

        /// Seed for the fold assignment
        #[arg(long)]
        seed: Option<u64>,

        /// Number of ranked predictions to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Save the fitted model as JSON for scoring future periods
        #[arg(long)]
        save_model: Option<PathBuf>,
    },

    /// Random grid search over network hyperparameters, then a final fit
    Tune {
        #[command(flatten)]
        data: DataArgs,

        /// Share of the hyperparameter grid to sample, in (0, 1]
        #[arg(long, value_parser = validate_fraction)]
        sample_fraction: Option<f64>,

        /// Seed for sampling and training; drawn at random when absent
        #[arg(long)]
        seed: Option<u64>,

        /// Number of ranked predictions to print
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Bootstrap coefficient inference and optimism-corrected AUC for a binary response
    Bootstrap {
        #[command(flatten)]
        data: DataArgs,

        /// Number of bootstrap resamples
        #[arg(long)]
        replicates: Option<usize>,

        /// Base seed for the resamples
        #[arg(long)]
        seed: Option<u64>,

        /// Save the full-data classifier as JSON
        #[arg(long)]
        save_model: Option<PathBuf>,
    },

    /// Score new observations with a saved model
    Predict {
        /// File of new observations (CSV or Parquet)
        #[arg(short, long)]
        input: PathBuf,

        /// Saved model (JSON)
        #[arg(short, long)]
        model: PathBuf,

        /// Run configuration; supplies the entity column used to label predictions
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of ranked predictions to print
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

/// Validator for fraction parameters in (0, 1]
fn validate_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(format!("fraction must be in (0, 1], got {}", value))
    }
}

/// Validator for the fold count
fn validate_folds(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid integer", s))?;

    if value < 2 {
        Err(format!("at least 2 folds are required, got {}", value))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_fraction() {
        assert_eq!(validate_fraction("0.1"), Ok(0.1));
        assert_eq!(validate_fraction("1"), Ok(1.0));
        assert!(validate_fraction("0").is_err());
        assert!(validate_fraction("1.5").is_err());
        assert!(validate_fraction("abc").is_err());
    }

    #[test]
    fn test_validate_folds() {
        assert_eq!(validate_folds("5"), Ok(5));
        assert!(validate_folds("1").is_err());
        assert!(validate_folds("-3").is_err());
    }
}
