//! Run configuration file

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::{
    BootstrapConfig, ClassifierSpec, DatasetSchema, HyperparameterGrid, LassoConfig,
    TemporalSplit, TuningConfig,
};

/// Share of rows held out when no explicit split is configured
pub const DEFAULT_TEST_FRACTION: f64 = 0.3;

/// Everything a run needs besides the data itself. Only `schema` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub schema: DatasetSchema,
    /// Explicit train/test windows; suggested from the data when absent
    #[serde(default)]
    pub split: Option<TemporalSplit>,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default)]
    pub lasso: LassoConfig,
    #[serde(default)]
    pub grid: HyperparameterGrid,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub classifier: ClassifierSpec,
    /// Probability cut-off for the accuracy report
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_test_fraction() -> f64 {
    DEFAULT_TEST_FRACTION
}

fn default_threshold() -> f64 {
    0.5
}

impl RunConfig {
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            schema,
            split: None,
            test_fraction: DEFAULT_TEST_FRACTION,
            lasso: LassoConfig::default(),
            grid: HyperparameterGrid::default(),
            tuning: TuningConfig::default(),
            bootstrap: BootstrapConfig::default(),
            classifier: ClassifierSpec::default(),
            threshold: default_threshold(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).context("Failed to parse run configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            anyhow::bail!("test_fraction must be in (0, 1), got {}", self.test_fraction);
        }
        if let Some(split) = &self.split {
            split.validate()?;
        }
        self.lasso.validate()?;
        self.grid.validate()?;
        self.tuning.validate()?;
        self.bootstrap.validate()?;
        self.classifier.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Penalty, SelectionRule};

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = RunConfig::from_json(
            r#"{ "schema": { "time_column": "season", "response": "points", "numeric": ["minutes"] } }"#,
        )
        .unwrap();
        assert!(config.split.is_none());
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.lasso.folds, 10);
        assert_eq!(config.grid.size(), 432);
        assert_eq!(config.bootstrap.replicates, 1000);
        assert_eq!(config.threshold, 0.5);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = RunConfig::from_json(
            r#"{
                "schema": {
                    "time_column": "season",
                    "response": "points",
                    "categorical": [{ "name": "team", "reference": "BOS" }]
                },
                "split": { "train": { "end": 2022 }, "test": { "start": 2023, "end": 2023 } },
                "lasso": { "folds": 5, "rule": "one_standard_error", "penalty": { "type": "elastic_net", "alpha": 0.5 } },
                "tuning": { "sample_fraction": 0.25, "seed": 7 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.lasso.folds, 5);
        assert_eq!(config.lasso.rule, SelectionRule::OneStandardError);
        assert_eq!(config.lasso.penalty, Penalty::ElasticNet { alpha: 0.5 });
        assert_eq!(config.tuning.seed, Some(7));
        assert_eq!(config.schema.categorical[0].reference, "BOS");
        assert_eq!(config.split.unwrap().test.start, Some(2023));
    }

    #[test]
    fn test_rejects_overlapping_split() {
        let err = RunConfig::from_json(
            r#"{
                "schema": { "time_column": "t", "response": "y" },
                "split": { "train": { "end": 5 }, "test": { "start": 5 } }
            }"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("split"));
    }

    #[test]
    fn test_rejects_empty_grid_entry() {
        let err = RunConfig::from_json(
            r#"{ "schema": { "time_column": "t", "response": "y" }, "grid": { "learning_rate": [] } }"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("learning_rate"));
    }
}
