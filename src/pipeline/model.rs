//! JSON persistence of fitted models for scoring future periods

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use super::lasso::LinearModel;
use super::logistic::LogisticModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Linear(LinearModel),
    Logistic(LogisticModel),
}

impl FittedModel {
    /// Score every row of a frame: predicted values, or positive-class probabilities
    pub fn predict_frame(&self, df: &DataFrame) -> crate::pipeline::Result<Vec<f64>> {
        match self {
            FittedModel::Linear(model) => model.predict_frame(df),
            FittedModel::Logistic(model) => model.predict_frame(df),
        }
    }

    pub fn response(&self) -> &str {
        match self {
            FittedModel::Linear(model) => &model.response,
            FittedModel::Logistic(model) => &model.response,
        }
    }
}

/// On-disk wrapper with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub created: String,
    pub version: String,
    pub model: FittedModel,
}

pub fn save_model(model: &FittedModel, path: &Path) -> Result<()> {
    let saved = SavedModel {
        created: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: model.clone(),
    };
    let json = serde_json::to_string_pretty(&saved).context("Failed to serialize model to JSON")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write model to {}", path.display()))?;
    Ok(())
}

pub fn load_model(path: &Path) -> Result<FittedModel> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model file {}", path.display()))?;
    let saved: SavedModel = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a saved model", path.display()))?;
    Ok(saved.model)
}
