use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};

use super::HistStruct;
use crate::classifier::ClassifierSnapshot;
use crate::error::{HistStructError, Result};

/// Extension given to every saved structure.
pub const FILE_EXTENSION: &str = "hstruct";

const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// On-disk layout
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct TypeSnapshot {
    name: String,
    array: ArrayD<f64>,
    entries: Array1<f64>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    run_ids: Vec<i64>,
    ls_ids: Vec<i64>,
    /// In registration order.
    types: Vec<TypeSnapshot>,
    masks: BTreeMap<String, Vec<bool>>,
    classifiers: BTreeMap<String, ClassifierSnapshot>,
    scores: BTreeMap<String, Array1<f64>>,
}

impl HistStruct {
    /// Write the whole structure to `path`, with its extension replaced by
    /// `.hstruct`. Returns the path actually written.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        let path = path.with_extension(FILE_EXTENSION);
        let snapshot = Snapshot {
            version: FORMAT_VERSION,
            run_ids: self.index.run_ids().to_vec(),
            ls_ids: self.index.ls_ids().to_vec(),
            types: self
                .type_names
                .iter()
                .map(|name| {
                    let hist = &self.types[name];
                    TypeSnapshot {
                        name: name.clone(),
                        array: hist.array.clone(),
                        entries: hist.entries.clone(),
                    }
                })
                .collect(),
            masks: self.masks.clone(),
            classifiers: self
                .classifiers
                .iter()
                .map(|(name, c)| (name.clone(), c.snapshot()))
                .collect(),
            scores: self.scores.clone(),
        };

        let mut writer = BufWriter::new(File::create(&path)?);
        bincode::serialize_into(&mut writer, &snapshot)?;
        writer.flush()?;
        log::info!(
            "saved {} histogram types, {} masks to {}",
            self.type_names.len(),
            self.masks.len(),
            path.display()
        );
        Ok(path)
    }

    /// Read a structure written by [`save`](Self::save).
    ///
    /// Every type, mask and score vector goes through the same validation as
    /// when it was first added.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Snapshot = bincode::deserialize_from(reader)?;
        if snapshot.version != FORMAT_VERSION {
            return Err(HistStructError::Encoding(Box::new(bincode::ErrorKind::Custom(
                format!(
                    "unsupported file version {} (expected {FORMAT_VERSION})",
                    snapshot.version
                ),
            ))));
        }

        let mut hs = HistStruct::new();
        for t in snapshot.types {
            hs.add_type(&t.name, t.array, &snapshot.run_ids, &snapshot.ls_ids, Some(t.entries))?;
        }
        for (name, mask) in &snapshot.masks {
            hs.add_mask(name, mask)?;
        }
        for (name, classifier) in snapshot.classifiers {
            if matches!(classifier, ClassifierSnapshot::Opaque { .. }) {
                log::warn!(
                    "classifier '{}' of '{name}' was saved without its state; rebind it before evaluating",
                    classifier.kind()
                );
            }
            hs.bind_classifier(&name, classifier.restore(), false)?;
        }
        for (name, scores) in snapshot.scores {
            if !hs.has_type(&name) {
                return Err(HistStructError::UnknownType(name));
            }
            if scores.len() != hs.len() {
                return Err(HistStructError::length_mismatch(
                    format!("scores of '{name}'"),
                    hs.len(),
                    scores.len(),
                ));
            }
            hs.scores.insert(name, scores);
        }
        log::info!("loaded {} histogram types from {}", hs.type_names.len(), path.display());
        Ok(hs)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2, Array3, ArrayViewD};

    use super::*;
    use crate::classifier::{HistogramClassifier, TemplateClassifier};

    #[derive(Debug)]
    struct Constant;

    impl HistogramClassifier for Constant {
        fn kind(&self) -> &str {
            "constant"
        }

        fn evaluate(&self, histograms: ArrayViewD<'_, f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(histograms.shape()[0], 0.5))
        }
    }

    #[test]
    fn extension_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let hs = HistStruct::new();
        let written = hs.save(&dir.path().join("structure.pkl")).unwrap();
        assert_eq!(written, dir.path().join("structure.hstruct"));
        assert!(written.exists());
        let loaded = HistStruct::load(&written).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn caller_classifiers_come_back_detached() {
        let dir = tempfile::tempdir().unwrap();
        let mut hs = HistStruct::new();
        hs.add_type("A", Array2::<f64>::ones((2, 3)), &[1, 2], &[1, 1], None)
            .unwrap();
        hs.add_type("B", Array3::<f64>::ones((2, 2, 2)), &[1, 2], &[1, 1], None)
            .unwrap();
        hs.bind_classifier("A", Box::new(Constant), true).unwrap();
        let template = TemplateClassifier::fit(hs.get_array("B", None).unwrap().view()).unwrap();
        hs.bind_classifier("B", Box::new(template), false).unwrap();

        let path = hs.save(&dir.path().join("s")).unwrap();
        let mut loaded = HistStruct::load(&path).unwrap();
        assert_eq!(loaded.classifier_names(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(loaded.get_scores("A", None).unwrap(), array![0.5, 0.5]);
        assert!(matches!(loaded.evaluate("A"), Err(HistStructError::Classifier { .. })));
        assert_eq!(loaded.evaluate("B").unwrap(), array![0.0, 0.0]);
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.hstruct");
        std::fs::write(&path, b"not a histstruct").unwrap();
        assert!(HistStruct::load(&path).is_err());
    }
}
