//! CLI module - argument parsing, run configuration and subcommand drivers

pub mod args;
pub mod config;
pub mod run;

pub use args::{Cli, Commands, DataArgs};
pub use config::RunConfig;
pub use run::{run_bootstrap, run_lasso, run_predict, run_tune, LassoOverrides};
