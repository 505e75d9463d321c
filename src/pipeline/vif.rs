//! Variance inflation factors
//!
//! Each predictor is regressed on all the others through the correlation
//! matrix, VIF = 1 / (1 - R²). Large values are flagged and logged, never
//! treated as errors.

use faer::prelude::*;
use faer::{Mat, Side};
use serde::Serialize;
use tracing::warn;

use super::design::{DesignMatrix, Standardizer};
use super::error::{PipelineError, Result};

/// VIF at or above this value is flagged
pub const VIF_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VifEntry {
    pub column: String,
    pub vif: f64,
    pub flagged: bool,
}

/// VIF of every column of the design matrix
pub fn variance_inflation_factors(design: &DesignMatrix) -> Result<Vec<VifEntry>> {
    if design.nrows() < 2 {
        return Err(PipelineError::InvalidConfig(format!(
            "VIF needs at least 2 rows, got {}",
            design.nrows()
        )));
    }

    let n = design.nrows() as f64;
    let scaler = Standardizer::fit(&design.x);
    let z = scaler.transform(&design.x);
    let corr = z.transpose() * z.as_ref();

    let usable: Vec<usize> = (0..design.ncols()).filter(|&j| scaler.scales[j] > 0.0).collect();

    let mut entries = Vec::with_capacity(design.ncols());
    for (j, column) in design.columns.iter().enumerate() {
        let vif = if scaler.scales[j] > 0.0 {
            let others: Vec<usize> = usable.iter().copied().filter(|&k| k != j).collect();
            let r_squared = explained_share(&corr, n, j, &others);
            if r_squared >= 1.0 {
                f64::INFINITY
            } else {
                1.0 / (1.0 - r_squared)
            }
        } else {
            f64::INFINITY
        };

        let flagged = vif >= VIF_THRESHOLD;
        if flagged {
            warn!(column = %column, vif, "high variance inflation factor");
        }
        entries.push(VifEntry {
            column: column.clone(),
            vif,
            flagged,
        });
    }

    Ok(entries)
}

/// R² of column `target` regressed on `others`, from the unnormalised correlation matrix.
///
/// When the other columns are themselves collinear their block is not positive
/// definite, the regression is not identified and R² is reported as 1.
fn explained_share(corr: &Mat<f64>, n: f64, target: usize, others: &[usize]) -> f64 {
    let m = others.len();
    if m == 0 {
        return 0.0;
    }

    let a = Mat::from_fn(m, m, |r, c| corr[(others[r], others[c])] / n);
    let b = Mat::from_fn(m, 1, |r, _| corr[(others[r], target)] / n);

    let llt = match a.cholesky(Side::Lower) {
        Ok(llt) => llt,
        Err(_) => return 1.0,
    };
    let coef = llt.solve(b.as_ref());
    let r_squared: f64 = (0..m).map(|r| coef[(r, 0)] * b[(r, 0)]).sum();
    if r_squared.is_finite() {
        r_squared.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthogonal_columns_have_unit_vif() {
        let rows = vec![
            vec![1.0, 1.0],
            vec![1.0, -1.0],
            vec![-1.0, 1.0],
            vec![-1.0, -1.0],
        ];
        let design = DesignMatrix::from_rows(vec!["a".into(), "b".into()], &rows, vec![0.0; 4]).unwrap();
        let vifs = variance_inflation_factors(&design).unwrap();
        assert!(vifs.iter().all(|v| (v.vif - 1.0).abs() < 1e-10 && !v.flagged));
    }

    #[test]
    fn test_known_correlation() {
        // corr(a, b) = 0.6 gives VIF = 1 / (1 - 0.36)
        let rows: Vec<Vec<f64>> = (0..100)
            .map(|i| {
                let u = if i % 2 == 0 { 1.0 } else { -1.0 };
                let v = if (i / 2) % 2 == 0 { 1.0 } else { -1.0 };
                vec![u, 0.6 * u + 0.8 * v]
            })
            .collect();
        let design = DesignMatrix::from_rows(vec!["a".into(), "b".into()], &rows, vec![0.0; 100]).unwrap();
        let vifs = variance_inflation_factors(&design).unwrap();
        assert!((vifs[0].vif - 1.0 / 0.64).abs() < 1e-8);
    }

    #[test]
    fn test_collinear_and_constant_columns() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                let a = i as f64;
                let b = ((i * 3) % 7) as f64;
                vec![a, b, 2.0 * a - b, 4.0]
            })
            .collect();
        let design = DesignMatrix::from_rows(
            vec!["a".into(), "b".into(), "c".into(), "k".into()],
            &rows,
            vec![0.0; 10],
        )
        .unwrap();
        let vifs = variance_inflation_factors(&design).unwrap();
        assert!(vifs[0].flagged && vifs[1].flagged && vifs[2].flagged);
        assert!(vifs[3].vif.is_infinite());
    }

    #[test]
    fn test_duplicated_column_is_flagged() {
        let rows: Vec<Vec<f64>> = (0..12)
            .map(|i| {
                let x = (i % 5) as f64;
                vec![x, x, ((i * 7) % 4) as f64]
            })
            .collect();
        let design = DesignMatrix::from_rows(
            vec!["x".into(), "x_copy".into(), "z".into()],
            &rows,
            vec![0.0; 12],
        )
        .unwrap();
        let vifs = variance_inflation_factors(&design).unwrap();
        assert!(vifs[0].vif > 1e6 && vifs[0].flagged);
        assert!(vifs[1].vif > 1e6 && vifs[1].flagged);
    }
}
