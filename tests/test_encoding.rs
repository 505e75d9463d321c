//! Tests for temporal splitting and categorical encoding

mod common;

use polars::prelude::*;
use tempfit::pipeline::{
    build, CategoricalField, Dataset, DatasetSchema, PipelineError, TemporalSplit, TimeWindow,
};

use common::{level_frame, level_schema, linear_dataset};

fn split_through(train_end: i64) -> TemporalSplit {
    TemporalSplit::new(
        TimeWindow::through(train_end),
        TimeWindow::new(Some(train_end + 1), None),
    )
    .unwrap()
}

#[test]
fn test_indicator_count_is_levels_minus_one() {
    let dataset = Dataset::new(level_frame(), level_schema("B")).unwrap();
    let sets = build(&dataset, &split_through(2012)).unwrap();

    assert_eq!(sets.train.columns, vec!["level_A", "level_C"]);
    assert_eq!(sets.test.columns, sets.train.columns);
    assert_eq!(sets.encoding.columns(), sets.train.columns);
    assert_eq!(sets.test.ncols(), sets.train.ncols());
}

#[test]
fn test_reference_change_keeps_column_count() {
    let split = split_through(2012);
    let mut widths = Vec::new();
    for reference in ["A", "B", "C"] {
        let dataset = Dataset::new(level_frame(), level_schema(reference)).unwrap();
        let sets = build(&dataset, &split).unwrap();
        assert!(
            !sets.train.columns.contains(&format!("level_{}", reference)),
            "Reference level {} should be absorbed into the intercept",
            reference
        );
        widths.push(sets.train.ncols());
    }
    assert_eq!(widths, vec![2, 2, 2]);
}

#[test]
fn test_indicator_values_match_levels() {
    let dataset = Dataset::new(level_frame(), level_schema("B")).unwrap();
    let err = build(&dataset, &split_through(2014)).unwrap_err();
    // every period is in training when the test window starts past the data
    assert!(matches!(err, PipelineError::InvalidSplit(_)));

    let sets = build(&dataset, &split_through(2013)).unwrap();
    let a = sets.train.column(0);
    let c = sets.train.column(1);
    // rows are ordered A, B, C
    assert_eq!(a[0], 1.0);
    assert_eq!(c[0], 0.0);
    assert!(a.iter().zip(&c).all(|(x, y)| x + y <= 1.0));
}

#[test]
fn test_split_is_deterministic() {
    let dataset = linear_dataset(11);
    let split = split_through(2020);

    let first = build(&dataset, &split).unwrap();
    let second = build(&dataset, &split).unwrap();

    assert_eq!(first.train.periods, second.train.periods);
    assert_eq!(first.train.entities, second.train.entities);
    assert_eq!(first.test.periods, second.test.periods);
    assert!(first.train.periods.iter().all(|&t| t <= 2020));
    assert!(first.test.periods.iter().all(|&t| t > 2020));
    assert_eq!(first.train.nrows() + first.test.nrows(), 200);
}

#[test]
fn test_suggested_split_holds_out_newest_periods() {
    let dataset = linear_dataset(3);
    let periods = dataset.periods().unwrap();
    let split = TemporalSplit::suggest(&periods, 0.25).unwrap();

    // 8 equal seasons: two held out gives exactly 25%
    assert_eq!(split.train.end, Some(2020));
    assert_eq!(split.test.start, Some(2021));
}

#[test]
fn test_unseen_test_level_is_rejected() {
    let df = df! {
        "period" => [1i64, 1, 1, 2, 2],
        "level" => ["A", "B", "A", "B", "D"],
        "outcome" => [1.0f64, 0.0, 1.0, 0.0, 1.0],
    }
    .unwrap();
    let dataset = Dataset::new(df, level_schema("B")).unwrap();

    match build(&dataset, &split_through(1)).unwrap_err() {
        PipelineError::UnseenCategory { field, level, row } => {
            assert_eq!(field, "level");
            assert_eq!(level, "D");
            assert_eq!(row, 4);
        }
        other => panic!("Expected UnseenCategory, got {other:?}"),
    }
}

#[test]
fn test_missing_predictor_reports_row() {
    let df = df! {
        "season" => [1i64, 1, 2, 2],
        "minutes" => [Some(10.0f64), None, Some(12.0), Some(9.0)],
        "points" => [4.0f64, 5.0, 6.0, 3.0],
    }
    .unwrap();
    let schema = DatasetSchema::new("season", "points").with_numeric(["minutes"]);
    let dataset = Dataset::new(df, schema).unwrap();

    let err = build(&dataset, &split_through(1)).unwrap_err();
    assert!(matches!(err, PipelineError::MissingValue { row: 1, .. }));
}

#[test]
fn test_absent_reference_level_is_rejected() {
    let schema = DatasetSchema::new("period", "outcome")
        .with_categorical(CategoricalField::new("level", "Z"));
    let dataset = Dataset::new(level_frame(), schema).unwrap();

    let err = build(&dataset, &split_through(2012)).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidReferenceLevel { .. }));
}
