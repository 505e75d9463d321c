//! CSV and Parquet loading

use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

use super::dataset::{Dataset, DatasetSchema};

/// Scan a CSV or Parquet file, chosen by extension
pub fn scan_file(path: &Path) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()
            .with_context(|| format!("Failed to read CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to read Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: '{}'. Supported formats: csv, parquet",
            extension
        ),
    };

    Ok(lf)
}

/// Load a file and validate it against the schema
pub fn load_dataset(path: &Path, schema: &DatasetSchema) -> Result<Dataset> {
    let df = scan_file(path)?
        .collect()
        .with_context(|| format!("Failed to collect {}", path.display()))?;
    let (rows, cols) = df.shape();
    info!(
        path = %path.display(),
        rows,
        cols,
        memory_mb = df.estimated_size() as f64 / (1024.0 * 1024.0),
        "loaded dataset"
    );

    Dataset::new(df, schema.clone())
        .with_context(|| format!("{} does not match the configured schema", path.display()))
}

/// Load a file of new observations for scoring. Only the predictor columns
/// the model was trained on need to be present.
pub fn load_frame(path: &Path) -> Result<DataFrame> {
    scan_file(path)?
        .collect()
        .with_context(|| format!("Failed to collect {}", path.display()))
}
