//! Feature matrix builder
//!
//! Turns a dataset into numeric design matrices. Numeric fields pass through,
//! each categorical field becomes one indicator column per non-reference level
//! seen in training, and identifier fields are left out. The encoding fitted
//! on training rows is applied unchanged to test rows and to future periods.

use std::collections::BTreeSet;

use faer::Mat;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::dataset::{optional_level_column, optional_numeric_column, Dataset, DatasetSchema};
use super::design::DesignMatrix;
use super::error::{PipelineError, Result};
use super::split::TemporalSplit;

/// Indicator encoding of one categorical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoding {
    pub field: String,
    /// Level absorbed into the intercept
    pub reference: String,
    /// Non-reference training levels, one column each, sorted
    pub levels: Vec<String>,
}

impl CategoricalEncoding {
    /// Enumerate training levels and drop the reference
    pub fn fit(field: &str, reference: &str, values: &[&str]) -> Result<Self> {
        let distinct: BTreeSet<&str> = values.iter().copied().collect();
        if !distinct.contains(reference) {
            return Err(PipelineError::InvalidReferenceLevel {
                field: field.to_string(),
                level: reference.to_string(),
                available: distinct.iter().map(|s| s.to_string()).collect(),
            });
        }

        Ok(Self {
            field: field.to_string(),
            reference: reference.to_string(),
            levels: distinct
                .into_iter()
                .filter(|level| *level != reference)
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.levels
            .iter()
            .map(|level| format!("{}_{}", self.field, level))
            .collect()
    }

    /// Position of the indicator that is set for `level`, or `None` for the reference
    pub fn indicator_for(&self, level: &str, row: usize) -> Result<Option<usize>> {
        if level == self.reference {
            return Ok(None);
        }
        self.levels
            .iter()
            .position(|l| l == level)
            .map(Some)
            .ok_or_else(|| PipelineError::UnseenCategory {
                field: self.field.clone(),
                level: level.to_string(),
                row,
            })
    }
}

/// Complete column layout of a design matrix: numeric fields, then indicators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEncoding {
    pub numeric: Vec<String>,
    pub categorical: Vec<CategoricalEncoding>,
}

impl FeatureEncoding {
    /// Encoding that treats every column as numeric
    pub fn passthrough(columns: Vec<String>) -> Self {
        Self {
            numeric: columns,
            categorical: Vec::new(),
        }
    }

    /// Learn the encoding from the given rows of the frame
    pub fn fit(df: &DataFrame, schema: &DatasetSchema, rows: &[usize]) -> Result<Self> {
        let mut categorical = Vec::with_capacity(schema.categorical.len());
        for field in &schema.categorical {
            let values = optional_level_column(df, &field.name)?;
            let selected = rows
                .iter()
                .map(|&row| {
                    values[row]
                        .as_deref()
                        .ok_or_else(|| PipelineError::MissingValue {
                            field: field.name.clone(),
                            row,
                        })
                })
                .collect::<Result<Vec<&str>>>()?;

            let encoding = CategoricalEncoding::fit(&field.name, &field.reference, &selected)?;
            debug!(
                field = %field.name,
                reference = %field.reference,
                indicators = encoding.levels.len(),
                "encoded categorical field"
            );
            categorical.push(encoding);
        }

        Ok(Self {
            numeric: schema.numeric.clone(),
            categorical,
        })
    }

    pub fn columns(&self) -> Vec<String> {
        self.numeric
            .iter()
            .cloned()
            .chain(self.categorical.iter().flat_map(|c| c.column_names()))
            .collect()
    }

    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.levels.len()).sum::<usize>()
    }

    /// Encode the predictors of the given rows. The response is not read, so
    /// this also works on future periods whose outcome is unknown.
    pub fn encode_predictors(&self, df: &DataFrame, rows: &[usize]) -> Result<Mat<f64>> {
        let mut x = Mat::<f64>::zeros(rows.len(), self.width());

        for (j, name) in self.numeric.iter().enumerate() {
            let values = optional_numeric_column(df, name)?;
            for (i, &row) in rows.iter().enumerate() {
                x[(i, j)] = values[row].ok_or_else(|| PipelineError::MissingValue {
                    field: name.clone(),
                    row,
                })?;
            }
        }

        let mut offset = self.numeric.len();
        for encoding in &self.categorical {
            let values = optional_level_column(df, &encoding.field)?;
            for (i, &row) in rows.iter().enumerate() {
                let level = values[row]
                    .as_deref()
                    .ok_or_else(|| PipelineError::MissingValue {
                        field: encoding.field.clone(),
                        row,
                    })?;
                if let Some(k) = encoding.indicator_for(level, row)? {
                    x[(i, offset + k)] = 1.0;
                }
            }
            offset += encoding.levels.len();
        }

        Ok(x)
    }

    /// Encode every row of a frame's predictors
    pub fn encode_frame(&self, df: &DataFrame) -> Result<Mat<f64>> {
        let rows: Vec<usize> = (0..df.height()).collect();
        self.encode_predictors(df, &rows)
    }

    /// Encode predictors and response of the given rows into a design matrix
    pub fn design(&self, dataset: &Dataset, rows: &[usize]) -> Result<DesignMatrix> {
        let schema = dataset.schema();
        let df = dataset.frame();

        let x = self.encode_predictors(df, rows)?;
        let response = optional_numeric_column(df, &schema.response)?;
        let y = rows
            .iter()
            .map(|&row| {
                response[row].ok_or_else(|| PipelineError::MissingValue {
                    field: schema.response.clone(),
                    row,
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        let periods = dataset.periods()?;
        let entities = dataset.entities()?;

        Ok(DesignMatrix {
            x,
            y,
            columns: self.columns(),
            entities: rows.iter().map(|&r| entities[r].clone()).collect(),
            periods: rows.iter().map(|&r| periods[r]).collect(),
            response: schema.response.clone(),
            encoding: self.clone(),
        })
    }
}

/// Train and test design matrices sharing one encoding
#[derive(Debug, Clone)]
pub struct TrainTest {
    pub train: DesignMatrix,
    pub test: DesignMatrix,
    pub encoding: FeatureEncoding,
}

/// Split by time, fit the encoding on the training rows, encode both sides.
///
/// Both sides are encoded by the one fitted encoding, so they always share a
/// column layout. Fails with `UnseenCategory` when a test row carries a level
/// with no training column.
pub fn build(dataset: &Dataset, split: &TemporalSplit) -> Result<TrainTest> {
    let periods = dataset.periods()?;
    let indices = split.partition(&periods)?;

    let encoding = FeatureEncoding::fit(dataset.frame(), dataset.schema(), &indices.train)?;
    let train = encoding.design(dataset, &indices.train)?;
    let test = encoding.design(dataset, &indices.test)?;

    info!(
        train_rows = train.nrows(),
        test_rows = test.nrows(),
        columns = train.ncols(),
        test_fraction = indices.test_fraction(),
        "built design matrices"
    );

    Ok(TrainTest {
        train,
        test,
        encoding,
    })
}

/// Encode every row of the dataset with an encoding fitted on all of them
pub fn build_full(dataset: &Dataset) -> Result<DesignMatrix> {
    let rows: Vec<usize> = (0..dataset.height()).collect();
    let encoding = FeatureEncoding::fit(dataset.frame(), dataset.schema(), &rows)?;
    encoding.design(dataset, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorical_fit_drops_reference() {
        let enc = CategoricalEncoding::fit("team", "B", &["A", "B", "C", "A"]).unwrap();
        assert_eq!(enc.levels, vec!["A", "C"]);
        assert_eq!(enc.column_names(), vec!["team_A", "team_C"]);
    }

    #[test]
    fn test_categorical_fit_rejects_absent_reference() {
        let err = CategoricalEncoding::fit("team", "Z", &["A", "B"]).unwrap_err();
        match err {
            PipelineError::InvalidReferenceLevel { available, .. } => {
                assert_eq!(available, vec!["A", "B"]);
            }
            other => panic!("Expected InvalidReferenceLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_indicator_for_unseen_level() {
        let enc = CategoricalEncoding::fit("team", "B", &["A", "B"]).unwrap();
        assert_eq!(enc.indicator_for("B", 0).unwrap(), None);
        assert_eq!(enc.indicator_for("A", 0).unwrap(), Some(0));
        let err = enc.indicator_for("C", 7).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnseenCategory { ref level, row: 7, .. } if level == "C"
        ));
    }

    #[test]
    fn test_encode_frame_layout() {
        let df = df! {
            "minutes" => [10.0f64, 20.0, 30.0],
            "team" => ["A", "B", "C"],
        }
        .unwrap();
        let encoding = FeatureEncoding {
            numeric: vec!["minutes".into()],
            categorical: vec![CategoricalEncoding::fit("team", "B", &["A", "B", "C"]).unwrap()],
        };
        let x = encoding.encode_frame(&df).unwrap();
        assert_eq!(encoding.columns(), vec!["minutes", "team_A", "team_C"]);
        assert_eq!((x[(0, 0)], x[(0, 1)], x[(0, 2)]), (10.0, 1.0, 0.0));
        assert_eq!((x[(1, 0)], x[(1, 1)], x[(1, 2)]), (20.0, 0.0, 0.0));
        assert_eq!((x[(2, 0)], x[(2, 1)], x[(2, 2)]), (30.0, 0.0, 1.0));
    }
}
