use ndarray::{Array1, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

use super::{flatten_rows, ClassifierSnapshot, HistogramClassifier};
use crate::error::{HistStructError, Result};

/// Default lower bound on the per-bin standard deviation.
pub const DEFAULT_SIGMA_FLOOR: f64 = 1e-6;

/// Scores a histogram by its largest per-bin pull with respect to a
/// reference set: `max_b |x_b - mean_b| / max(std_b, floor)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxPullClassifier {
    mean: Array1<f64>,
    std: Array1<f64>,
    sigma_floor: f64,
}

impl MaxPullClassifier {
    pub fn fit(reference: ArrayViewD<'_, f64>) -> Result<Self> {
        Self::fit_with_floor(reference, DEFAULT_SIGMA_FLOOR)
    }

    pub fn fit_with_floor(reference: ArrayViewD<'_, f64>, sigma_floor: f64) -> Result<Self> {
        let flat = flatten_rows(reference)?;
        let mean = flat.mean_axis(Axis(0)).ok_or_else(|| HistStructError::Classifier {
            name: "maxpull".to_string(),
            reason: "reference set is empty".to_string(),
        })?;
        let std = flat.std_axis(Axis(0), 0.0);
        Ok(Self {
            mean,
            std,
            sigma_floor,
        })
    }
}

impl HistogramClassifier for MaxPullClassifier {
    fn kind(&self) -> &str {
        "maxpull"
    }

    fn evaluate(&self, histograms: ArrayViewD<'_, f64>) -> Result<Array1<f64>> {
        let flat = flatten_rows(histograms)?;
        if flat.ncols() != self.mean.len() {
            return Err(HistStructError::length_mismatch(
                "histogram bins",
                self.mean.len(),
                flat.ncols(),
            ));
        }
        Ok(flat
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(self.std.iter()))
                    .map(|(x, (m, s))| (x - m).abs() / s.max(self.sigma_floor))
                    .fold(0.0, f64::max)
            })
            .collect())
    }

    fn snapshot(&self) -> ClassifierSnapshot {
        ClassifierSnapshot::MaxPull(self.clone())
    }
}
