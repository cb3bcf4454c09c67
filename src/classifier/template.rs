use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

use super::{flatten_rows, ClassifierSnapshot, HistogramClassifier, Reconstruct};
use crate::error::{HistStructError, Result};

/// Compares every histogram with the average of a reference set.
///
/// The score is the mean squared difference to the template; the
/// reconstruction of any histogram is the template itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateClassifier {
    template: Array1<f64>,
    bin_shape: Vec<usize>,
}

impl TemplateClassifier {
    /// Average the rows of `reference` (shape `(k, ...)`, `k > 0`).
    pub fn fit(reference: ArrayViewD<'_, f64>) -> Result<Self> {
        let flat = flatten_rows(reference.view())?;
        let template = flat.mean_axis(Axis(0)).ok_or_else(|| HistStructError::Classifier {
            name: "template".to_string(),
            reason: "reference set is empty".to_string(),
        })?;
        Ok(Self {
            template,
            bin_shape: reference.shape()[1..].to_vec(),
        })
    }

    pub fn template(&self) -> &Array1<f64> {
        &self.template
    }
}

impl HistogramClassifier for TemplateClassifier {
    fn kind(&self) -> &str {
        "template"
    }

    fn evaluate(&self, histograms: ArrayViewD<'_, f64>) -> Result<Array1<f64>> {
        let flat = flatten_rows(histograms)?;
        if flat.ncols() != self.template.len() {
            return Err(HistStructError::length_mismatch(
                "histogram bins",
                self.template.len(),
                flat.ncols(),
            ));
        }
        let nbins = self.template.len() as f64;
        Ok(flat
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(self.template.iter())
                    .map(|(x, t)| (x - t).powi(2))
                    .sum::<f64>()
                    / nbins
            })
            .collect())
    }

    fn as_reconstructor(&self) -> Option<&dyn Reconstruct> {
        Some(self)
    }

    fn snapshot(&self) -> ClassifierSnapshot {
        ClassifierSnapshot::Template(self.clone())
    }
}

impl Reconstruct for TemplateClassifier {
    fn reconstruct(&self, histograms: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        if histograms.ndim() < 2 || histograms.shape()[1..] != self.bin_shape[..] {
            return Err(HistStructError::InvalidShape(format!(
                "expected histograms of shape (k, {:?}), got {:?}",
                self.bin_shape,
                histograms.shape()
            )));
        }
        let rows = histograms.shape()[0];
        let mut shape = vec![rows];
        shape.extend_from_slice(&self.bin_shape);
        let data: Vec<f64> = (0..rows).flat_map(|_| self.template.iter().copied()).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| HistStructError::InvalidShape(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn scores_are_mean_squared_error_to_template() {
        let reference = array![[1.0, 3.0], [3.0, 5.0]].into_dyn();
        let clf = TemplateClassifier::fit(reference.view()).unwrap();
        assert_eq!(clf.template(), &array![2.0, 4.0]);

        let hists = array![[2.0, 4.0], [4.0, 4.0]].into_dyn();
        let scores = clf.evaluate(hists.view()).unwrap();
        assert_abs_diff_eq!(scores[0], 0.0);
        assert_abs_diff_eq!(scores[1], 2.0);
    }

    #[test]
    fn bin_count_must_match() {
        let clf = TemplateClassifier::fit(array![[1.0, 1.0]].into_dyn().view()).unwrap();
        let hists = array![[1.0, 2.0, 3.0]].into_dyn();
        assert!(matches!(
            clf.evaluate(hists.view()),
            Err(HistStructError::LengthMismatch { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn empty_reference_is_rejected() {
        let empty = ArrayD::<f64>::zeros(IxDyn(&[0, 3]));
        assert!(TemplateClassifier::fit(empty.view()).is_err());
    }

    #[test]
    fn reconstruction_repeats_template() {
        let clf = TemplateClassifier::fit(array![[1.0, 3.0], [3.0, 5.0]].into_dyn().view()).unwrap();
        let reco = clf
            .as_reconstructor()
            .unwrap()
            .reconstruct(array![[0.0, 0.0], [9.0, 9.0], [1.0, 1.0]].into_dyn().view())
            .unwrap();
        assert_eq!(reco.shape(), &[3, 2]);
        assert_eq!(reco[[2, 1]], 4.0);
    }
}
