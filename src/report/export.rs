//! JSON export of run results

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::{
    ClassificationSummary, CoefficientTable, CrossValidation, Evaluation, LinearModel,
    OptimismCorrectedAuc, Prediction, TuningOutcome, VifEntry,
};

/// Provenance attached to every export
#[derive(Debug, Serialize)]
pub struct RunMetadata {
    /// ISO 8601 timestamp
    pub timestamp: String,
    pub tempfit_version: String,
    pub command: String,
    pub input_file: String,
    pub response: String,
    /// Human-readable split description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<String>,
    pub train_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_rows: Option<usize>,
}

impl RunMetadata {
    pub fn new(command: &str, input_file: &Path, response: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            tempfit_version: env!("CARGO_PKG_VERSION").to_string(),
            command: command.to_string(),
            input_file: input_file.display().to_string(),
            response: response.to_string(),
            split: None,
            train_rows: 0,
            test_rows: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LassoReport<'a> {
    pub metadata: RunMetadata,
    pub model: &'a LinearModel,
    pub cross_validation: &'a CrossValidation,
    pub evaluation: Evaluation,
    pub predictions: &'a [Prediction],
}

#[derive(Debug, Serialize)]
pub struct TuningReport<'a> {
    pub metadata: RunMetadata,
    pub outcome: &'a TuningOutcome,
    pub evaluation: Evaluation,
    pub predictions: &'a [Prediction],
}

#[derive(Debug, Serialize)]
pub struct BootstrapReport<'a> {
    pub metadata: RunMetadata,
    pub coefficients: &'a CoefficientTable,
    pub auc: OptimismCorrectedAuc,
    pub classification: ClassificationSummary,
    pub vif: &'a [VifEntry],
}

/// Serialize any report to pretty JSON at `output_path`
pub fn export_report<T: Serialize>(report: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;
    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;
    Ok(())
}
