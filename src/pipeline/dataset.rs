//! Dataset schema and typed column extraction

use std::collections::HashSet;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, Result};

/// A categorical predictor and the level absorbed into the intercept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalField {
    pub name: String,
    pub reference: String,
}

impl CategoricalField {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }
}

/// Caller-provided description of which columns play which role.
///
/// Columns not named here are ignored. Identifier columns are listed only so
/// that validation can reject a schema that also uses them as predictors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSchema {
    /// Temporal ordinal, increasing with recency
    pub time_column: String,
    /// Response field
    pub response: String,
    /// Label used when reporting predictions (player name, defendant id, ...)
    #[serde(default)]
    pub entity_column: Option<String>,
    /// Numeric predictors, passed through unchanged
    #[serde(default)]
    pub numeric: Vec<String>,
    /// Categorical predictors with their reference levels
    #[serde(default)]
    pub categorical: Vec<CategoricalField>,
    /// Identifier / free-text fields that never enter the design matrix
    #[serde(default)]
    pub identifiers: Vec<String>,
}

impl DatasetSchema {
    pub fn new(time_column: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            time_column: time_column.into(),
            response: response.into(),
            entity_column: None,
            numeric: Vec::new(),
            categorical: Vec::new(),
            identifiers: Vec::new(),
        }
    }

    pub fn with_entity(mut self, column: impl Into<String>) -> Self {
        self.entity_column = Some(column.into());
        self
    }

    pub fn with_numeric<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.numeric.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_categorical(mut self, field: CategoricalField) -> Self {
        self.categorical.push(field);
        self
    }

    pub fn with_identifiers<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Names of every predictor field, numeric first then categorical
    pub fn predictor_fields(&self) -> Vec<&str> {
        self.numeric
            .iter()
            .map(String::as_str)
            .chain(self.categorical.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Check that every named column exists and that no column plays two roles
    pub fn validate(&self, df: &DataFrame) -> Result<()> {
        let available: HashSet<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut required: Vec<&str> = vec![self.time_column.as_str(), self.response.as_str()];
        required.extend(self.predictor_fields());
        required.extend(self.identifiers.iter().map(String::as_str));
        if let Some(entity) = &self.entity_column {
            required.push(entity.as_str());
        }

        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| !available.contains(*name))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch(format!(
                "column(s) {:?} not found in dataset",
                missing
            )));
        }

        let mut seen = HashSet::new();
        let roles = self
            .predictor_fields()
            .into_iter()
            .chain(self.identifiers.iter().map(String::as_str))
            .chain([self.time_column.as_str(), self.response.as_str()]);
        for name in roles {
            if !seen.insert(name) {
                return Err(PipelineError::SchemaMismatch(format!(
                    "column '{}' is assigned more than one role",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// A DataFrame paired with a schema that has been validated against it
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    schema: DatasetSchema,
}

impl Dataset {
    pub fn new(frame: DataFrame, schema: DatasetSchema) -> Result<Self> {
        schema.validate(&frame)?;
        Ok(Self { frame, schema })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Time ordinal of every row
    pub fn periods(&self) -> Result<Vec<i64>> {
        integer_column(&self.frame, &self.schema.time_column)
    }

    /// Entity labels, falling back to the row index when no entity column is configured
    pub fn entities(&self) -> Result<Vec<String>> {
        match &self.schema.entity_column {
            Some(column) => label_column(&self.frame, column),
            None => Ok((0..self.frame.height()).map(|i| i.to_string()).collect()),
        }
    }
}

/// Extract a column as f64, failing on nulls
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    optional_numeric_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PipelineError::MissingValue {
                field: name.to_string(),
                row,
            })
        })
        .collect()
}

/// Extract a column as f64, keeping nulls (and non-finite values) as `None`
pub fn optional_numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?;
    let float_col = column.cast(&DataType::Float64).map_err(|_| {
        PipelineError::SchemaMismatch(format!("column '{}' is not numeric", name))
    })?;

    Ok(float_col
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| v.is_finite()))
        .collect())
}

/// Extract a column as i64, failing on nulls
pub fn integer_column(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let column = df.column(name)?;
    let int_col = column.cast(&DataType::Int64).map_err(|_| {
        PipelineError::SchemaMismatch(format!("column '{}' is not an integer ordinal", name))
    })?;

    int_col
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PipelineError::MissingValue {
                field: name.to_string(),
                row,
            })
        })
        .collect()
}

/// Extract a column as categorical levels, keeping nulls as `None`
pub fn optional_level_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?;
    let str_col = column.cast(&DataType::String)?;

    Ok(str_col
        .str()?
        .into_iter()
        .map(|value| value.map(|s| s.to_string()))
        .collect())
}

/// Extract a label column; nulls become an empty label rather than an error
pub fn label_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df.column(name)?;
    let str_col = column.cast(&DataType::String)?;

    Ok(str_col
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df! {
            "season" => [2018i64, 2019, 2020],
            "player" => ["a", "b", "c"],
            "team" => ["X", "Y", "X"],
            "minutes" => [30.0f64, 25.0, 12.0],
            "points" => [20.0f64, 15.0, 4.0],
        }
        .unwrap()
    }

    fn sample_schema() -> DatasetSchema {
        DatasetSchema::new("season", "points")
            .with_entity("player")
            .with_numeric(["minutes"])
            .with_categorical(CategoricalField::new("team", "X"))
    }

    #[test]
    fn test_validate_accepts_matching_schema() {
        let dataset = Dataset::new(sample_df(), sample_schema()).unwrap();
        assert_eq!(dataset.height(), 3);
        assert_eq!(dataset.periods().unwrap(), vec![2018, 2019, 2020]);
        assert_eq!(dataset.entities().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let schema = sample_schema().with_numeric(["rebounds"]);
        let err = Dataset::new(sample_df(), schema).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
        assert!(err.to_string().contains("rebounds"));
    }

    #[test]
    fn test_validate_rejects_duplicate_role() {
        let schema = sample_schema().with_identifiers(["minutes"]);
        let err = Dataset::new(sample_df(), schema).unwrap_err();
        assert!(err.to_string().contains("more than one role"));
    }

    #[test]
    fn test_numeric_column_reports_null_row() {
        let df = df! {
            "x" => [Some(1.0f64), None, Some(3.0)],
        }
        .unwrap();
        let err = numeric_column(&df, "x").unwrap_err();
        match err {
            PipelineError::MissingValue { field, row } => {
                assert_eq!(field, "x");
                assert_eq!(row, 1);
            }
            other => panic!("Expected MissingValue, got {other:?}"),
        }
    }

    #[test]
    fn test_entities_fall_back_to_row_index() {
        let schema = DatasetSchema::new("season", "points").with_numeric(["minutes"]);
        let dataset = Dataset::new(sample_df(), schema).unwrap();
        assert_eq!(dataset.entities().unwrap(), vec!["0", "1", "2"]);
    }
}
