//! tempfit: temporal modeling CLI

use anyhow::Result;
use clap::Parser;

use tempfit::cli::{run_bootstrap, run_lasso, run_predict, run_tune, Cli, Commands, LassoOverrides};
use tempfit::utils::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Lasso {
            data,
            folds,
            penalty,
            rule,
            seed,
            top,
            save_model,
        } => {
            let overrides = LassoOverrides {
                folds: *folds,
                penalty: *penalty,
                rule: *rule,
                seed: *seed,
            };
            run_lasso(data, &overrides, *top, save_model.as_ref())
        }
        Commands::Tune {
            data,
            sample_fraction,
            seed,
            top,
        } => run_tune(data, *sample_fraction, *seed, *top),
        Commands::Bootstrap {
            data,
            replicates,
            seed,
            save_model,
        } => run_bootstrap(data, *replicates, *seed, save_model.as_ref()),
        Commands::Predict {
            input,
            model,
            config,
            top,
        } => run_predict(input, model, config.as_deref(), *top),
    }
}
