use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD, ArrayViewD};

use super::{take_rows, HistStruct};
use crate::classifier::HistogramClassifier;
use crate::error::{HistStructError, Result};

// ---------------------------------------------------------------------------
// Classifier lifecycle
// ---------------------------------------------------------------------------

impl HistStruct {
    /// Bind `classifier` to a histogram type, replacing any previous one.
    ///
    /// With `evaluate_now` the classifier is run immediately and its scores
    /// are returned. If that evaluation fails the previous binding is kept.
    /// Scores computed by a replaced classifier stay in place until the next
    /// evaluation.
    pub fn bind_classifier(
        &mut self,
        type_name: &str,
        classifier: Box<dyn HistogramClassifier>,
        evaluate_now: bool,
    ) -> Result<Option<Array1<f64>>> {
        if !self.types.contains_key(type_name) {
            return Err(HistStructError::UnknownType(type_name.to_string()));
        }
        let scores = if evaluate_now {
            Some(self.score_with(type_name, classifier.as_ref())?)
        } else {
            None
        };
        log::info!("bound '{}' classifier to '{type_name}'", classifier.kind());
        self.classifiers.insert(type_name.to_string(), classifier);
        if let Some(scores) = &scores {
            self.scores.insert(type_name.to_string(), scores.clone());
        }
        Ok(scores)
    }

    /// Names of the types with a bound classifier, sorted.
    pub fn classifier_names(&self) -> Vec<String> {
        self.classifiers.keys().cloned().collect()
    }

    pub fn classifier(&self, type_name: &str) -> Option<&dyn HistogramClassifier> {
        self.classifiers.get(type_name).map(|c| c.as_ref())
    }

    /// Run the bound classifier on the full array of `type_name` and store
    /// the result as the current scores of that type.
    pub fn evaluate(&mut self, type_name: &str) -> Result<Array1<f64>> {
        self.histogram_type(type_name)?;
        let classifier = self
            .classifiers
            .get(type_name)
            .ok_or_else(|| HistStructError::NoClassifier(type_name.to_string()))?;
        let scores = self.score_with(type_name, classifier.as_ref())?;
        self.scores.insert(type_name.to_string(), scores.clone());
        Ok(scores)
    }

    /// Scores of `classifier` over every row of `type_name`, length-checked.
    fn score_with(&self, type_name: &str, classifier: &dyn HistogramClassifier) -> Result<Array1<f64>> {
        let hist = self.histogram_type(type_name)?;
        let scores = classifier.evaluate(hist.array.view())?;
        if scores.len() != self.len() {
            return Err(HistStructError::length_mismatch(
                format!("scores of '{type_name}'"),
                self.len(),
                scores.len(),
            ));
        }
        log::debug!("evaluated '{}' classifier on '{type_name}'", classifier.kind());
        Ok(scores)
    }

    /// Reconstruct `histograms` (shape `(k, ...)`) with the classifier of `type_name`.
    pub fn reconstruct(&self, type_name: &str, histograms: ArrayViewD<'_, f64>) -> Result<ArrayD<f64>> {
        self.histogram_type(type_name)?;
        let classifier = self
            .classifiers
            .get(type_name)
            .ok_or_else(|| HistStructError::NoClassifier(type_name.to_string()))?;
        let reconstructor = classifier
            .as_reconstructor()
            .ok_or_else(|| HistStructError::NoReconstruction(type_name.to_string()))?;
        reconstructor.reconstruct(histograms)
    }

    // -----------------------------------------------------------------------
    // Score queries
    // -----------------------------------------------------------------------

    pub fn has_scores(&self, type_name: &str) -> bool {
        self.scores.contains_key(type_name)
    }

    fn stored_scores(&self, type_name: &str) -> Result<&Array1<f64>> {
        self.histogram_type(type_name)?;
        self.scores
            .get(type_name)
            .ok_or_else(|| HistStructError::NoScore(type_name.to_string()))
    }

    /// Scores of one type, restricted to the rows passing all masks.
    pub fn get_scores(&self, type_name: &str, mask_names: Option<&[&str]>) -> Result<Array1<f64>> {
        let scores = self.stored_scores(type_name)?;
        let rows = self.selected_rows(mask_names)?;
        Ok(take_rows(scores, rows.as_deref()))
    }

    /// Scores of every registered type. Fails if any type has none.
    pub fn get_all_scores(&self, mask_names: Option<&[&str]>) -> Result<BTreeMap<String, Array1<f64>>> {
        let rows = self.selected_rows(mask_names)?;
        self.type_names
            .iter()
            .map(|name| {
                let scores = self.stored_scores(name)?;
                Ok((name.clone(), take_rows(scores, rows.as_deref())))
            })
            .collect()
    }

    /// Score of each requested type at (run, ls); `None` where no scores exist.
    ///
    /// `type_names` defaults to all registered types.
    pub fn get_scores_at(
        &self,
        run: i64,
        ls: i64,
        type_names: Option<&[&str]>,
        suppress_missing: bool,
    ) -> Result<BTreeMap<String, Option<f64>>> {
        let names: Vec<&str> = match type_names {
            Some(names) => names.to_vec(),
            None => self.type_names.iter().map(String::as_str).collect(),
        };
        if let Some(unknown) = names.iter().find(|n| !self.types.contains_key(**n)) {
            return Err(HistStructError::UnknownType(unknown.to_string()));
        }
        let row = self.index_of(run, ls)?;
        Ok(names
            .into_iter()
            .map(|name| {
                let score = self.scores.get(name).map(|s| s[row]);
                if score.is_none() && !suppress_missing {
                    log::warn!("no scores for histogram type '{name}', reporting None");
                }
                (name.to_string(), score)
            })
            .collect())
    }
}
