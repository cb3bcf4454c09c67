/// Scoring models bound to histogram types.
///
/// ```text
///   ┌──────────────────────┐   evaluate (N, ...) -> (N)
///   │ HistogramClassifier  │─────────────────────────────► scores
///   └──────────────────────┘
///              │ as_reconstructor()   (optional capability)
///              ▼
///   ┌──────────────────────┐   reconstruct (k, ...) -> (k, ...)
///   │     Reconstruct      │─────────────────────────────► figures
///   └──────────────────────┘
/// ```
use std::fmt;

use ndarray::{Array1, Array2, ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::error::{HistStructError, Result};

pub mod max_pull;
pub mod template;

pub use max_pull::MaxPullClassifier;
pub use template::TemplateClassifier;

// ---------------------------------------------------------------------------
// Capability interfaces
// ---------------------------------------------------------------------------

/// A model assigning one score per histogram.
///
/// `histograms` has shape `(N, ...)`; the result must have length `N`.
pub trait HistogramClassifier: fmt::Debug + Send + Sync {
    /// Short name of the model family, persisted alongside the structure.
    fn kind(&self) -> &str;

    fn evaluate(&self, histograms: ArrayViewD<'_, f64>) -> Result<Array1<f64>>;

    /// The reconstruction capability, for models that have one.
    fn as_reconstructor(&self) -> Option<&dyn Reconstruct> {
        None
    }

    /// Persistable form of the model. Models that cannot be persisted are
    /// saved by kind only and come back detached.
    fn snapshot(&self) -> ClassifierSnapshot {
        ClassifierSnapshot::Opaque {
            kind: self.kind().to_string(),
        }
    }
}

/// Models that can map histograms to their reconstruction.
pub trait Reconstruct {
    /// `histograms` has shape `(k, ...)`; the result has the same shape.
    fn reconstruct(&self, histograms: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifierSnapshot {
    Template(TemplateClassifier),
    MaxPull(MaxPullClassifier),
    Opaque { kind: String },
}

impl ClassifierSnapshot {
    pub fn kind(&self) -> &str {
        match self {
            ClassifierSnapshot::Template(c) => c.kind(),
            ClassifierSnapshot::MaxPull(c) => c.kind(),
            ClassifierSnapshot::Opaque { kind } => kind,
        }
    }

    pub fn restore(self) -> Box<dyn HistogramClassifier> {
        match self {
            ClassifierSnapshot::Template(c) => Box::new(c),
            ClassifierSnapshot::MaxPull(c) => Box::new(c),
            ClassifierSnapshot::Opaque { kind } => Box::new(DetachedClassifier { kind }),
        }
    }
}

/// Placeholder for a caller-defined model whose state was not persisted.
#[derive(Debug, Clone)]
pub struct DetachedClassifier {
    kind: String,
}

impl HistogramClassifier for DetachedClassifier {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn evaluate(&self, _histograms: ArrayViewD<'_, f64>) -> Result<Array1<f64>> {
        Err(HistStructError::Classifier {
            name: self.kind.clone(),
            reason: "model state was not saved with the structure; bind it again".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// View `(N, d1, d2, ...)` histograms as an `(N, d1 * d2 * ...)` matrix.
pub fn flatten_rows(histograms: ArrayViewD<'_, f64>) -> Result<Array2<f64>> {
    if histograms.ndim() < 2 {
        return Err(HistStructError::InvalidShape(format!(
            "expected at least 2 dimensions (samples, bins), got shape {:?}",
            histograms.shape()
        )));
    }
    let rows = histograms.shape()[0];
    let bins: usize = histograms.shape()[1..].iter().product();
    Array2::from_shape_vec((rows, bins), histograms.iter().copied().collect())
        .map_err(|e| HistStructError::InvalidShape(e.to_string()))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, IxDyn};

    use super::*;

    #[test]
    fn flatten_keeps_row_major_order() {
        let a = Array3::from_shape_fn((2, 2, 3), |(i, j, k)| (i * 100 + j * 10 + k) as f64).into_dyn();
        let flat = flatten_rows(a.view()).unwrap();
        assert_eq!(flat.shape(), &[2, 6]);
        assert_eq!(flat[[1, 4]], 111.0);
    }

    #[test]
    fn flatten_rejects_vectors() {
        let a = ArrayD::<f64>::zeros(IxDyn(&[4]));
        assert!(matches!(flatten_rows(a.view()), Err(HistStructError::InvalidShape(_))));
    }

    #[test]
    fn detached_classifier_refuses_to_evaluate() {
        let c = ClassifierSnapshot::Opaque {
            kind: "autoencoder".to_string(),
        }
        .restore();
        assert_eq!(c.kind(), "autoencoder");
        let a = ArrayD::<f64>::zeros(IxDyn(&[2, 3]));
        assert!(matches!(c.evaluate(a.view()), Err(HistStructError::Classifier { .. })));
        assert!(matches!(c.snapshot(), ClassifierSnapshot::Opaque { .. }));
    }
}
