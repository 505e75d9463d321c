//! Temporal train/test partitioning
//!
//! Rows are assigned to train or test purely by their time ordinal, never by
//! random sampling, so no future period can leak into training.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{PipelineError, Result};

/// Tolerance before a realised test fraction is reported as far from the requested one
const FRACTION_WARN_TOLERANCE: f64 = 0.15;

/// Inclusive window over the time ordinal. A missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

impl TimeWindow {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Window containing exactly one period
    pub fn single(period: i64) -> Self {
        Self::new(Some(period), Some(period))
    }

    /// Everything up to and including `end`
    pub fn through(end: i64) -> Self {
        Self::new(None, Some(end))
    }

    pub fn contains(&self, t: i64) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t <= e)
    }
}

/// Caller-supplied split contract: train = older periods, test = held-out recent periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalSplit {
    pub train: TimeWindow,
    pub test: TimeWindow,
}

/// Row indices on each side of a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Share of partitioned rows that landed in the test set
    pub fn test_fraction(&self) -> f64 {
        let total = self.train.len() + self.test.len();
        if total == 0 {
            0.0
        } else {
            self.test.len() as f64 / total as f64
        }
    }
}

impl TemporalSplit {
    pub fn new(train: TimeWindow, test: TimeWindow) -> Result<Self> {
        let split = Self { train, test };
        split.validate()?;
        Ok(split)
    }

    /// The training window must close strictly before the test window opens
    pub fn validate(&self) -> Result<()> {
        for (name, window) in [("train", &self.train), ("test", &self.test)] {
            if let (Some(s), Some(e)) = (window.start, window.end) {
                if s > e {
                    return Err(PipelineError::InvalidSplit(format!(
                        "{} window starts at {} after it ends at {}",
                        name, s, e
                    )));
                }
            }
        }

        match (self.train.end, self.test.start) {
            (Some(train_end), Some(test_start)) if train_end < test_start => Ok(()),
            (Some(train_end), Some(test_start)) => Err(PipelineError::InvalidSplit(format!(
                "training window ends at {} but test window starts at {}; training must precede test",
                train_end, test_start
            ))),
            _ => Err(PipelineError::InvalidSplit(
                "training window needs an end and test window needs a start".to_string(),
            )),
        }
    }

    /// Partition rows by their time ordinal. Rows outside both windows are dropped.
    pub fn partition(&self, periods: &[i64]) -> Result<SplitIndices> {
        self.validate()?;

        let mut train = Vec::new();
        let mut test = Vec::new();
        for (row, &t) in periods.iter().enumerate() {
            if self.train.contains(t) {
                train.push(row);
            } else if self.test.contains(t) {
                test.push(row);
            }
        }

        if train.is_empty() {
            return Err(PipelineError::InvalidSplit(
                "no rows fall inside the training window".to_string(),
            ));
        }
        if test.is_empty() {
            return Err(PipelineError::InvalidSplit(
                "no rows fall inside the test window".to_string(),
            ));
        }

        Ok(SplitIndices { train, test })
    }

    /// Propose a split that holds out the most recent period(s).
    ///
    /// Periods are added to the test side from the newest backwards, stopping at
    /// the count whose test share is closest to `test_fraction`. At least one
    /// period stays on each side.
    pub fn suggest(periods: &[i64], test_fraction: f64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }

        let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
        for &t in periods {
            *counts.entry(t).or_insert(0) += 1;
        }
        if counts.len() < 2 {
            return Err(PipelineError::InvalidSplit(format!(
                "need at least two distinct periods to split, found {}",
                counts.len()
            )));
        }

        let total = periods.len() as f64;
        let newest_first: Vec<(i64, usize)> = counts.iter().rev().map(|(&t, &n)| (t, n)).collect();

        let mut best_k = 1;
        let mut best_gap = f64::INFINITY;
        let mut held_out = 0usize;
        for k in 1..newest_first.len() {
            held_out += newest_first[k - 1].1;
            let gap = (held_out as f64 / total - test_fraction).abs();
            if gap < best_gap {
                best_gap = gap;
                best_k = k;
            }
        }

        let test_start = newest_first[best_k - 1].0;
        let train_end = newest_first[best_k].0;
        let split = Self::new(TimeWindow::through(train_end), TimeWindow::new(Some(test_start), None))?;

        let realised = split.partition(periods)?.test_fraction();
        if (realised - test_fraction).abs() > FRACTION_WARN_TOLERANCE {
            warn!(
                requested = test_fraction,
                realised, "period sizes keep the suggested test share far from the request"
            );
        } else {
            info!(train_end, test_start, realised, "suggested temporal split");
        }

        Ok(split)
    }
}
