//! Figure descriptions handed to a renderer.
//!
//! Nothing here draws: a [`Figure`] lists panels of styled histogram series
//! and a [`FigureSink`] decides what to do with it.
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use ndarray::{Array2, ArrayD, Axis, Ix2};
use serde::{Serialize, Serializer};

use crate::color::{self, Color, HISTOGRAM_COLOR, RECO_COLOR, REFERENCE_COLOR};
use crate::error::{HistStructError, Result};
use crate::store::HistStruct;

/// Panels per figure row.
const MAX_COLUMNS: usize = 4;
const REFERENCE_OPACITY: f32 = 0.3;

// ---------------------------------------------------------------------------
// Figure model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStyle {
    pub label: String,
    #[serde(serialize_with = "serialize_color")]
    pub color: Color,
    /// 0 (transparent) to 1 (opaque).
    pub opacity: f32,
}

impl SeriesStyle {
    pub fn new(label: impl Into<String>, color: Color, opacity: f32) -> Self {
        Self {
            label: label.into(),
            color,
            opacity,
        }
    }
}

fn serialize_color<S: Serializer>(color: &Color, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&color::to_hex(*color))
}

/// A set of 1D histograms drawn with one style; shape `(k, nbins)`.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub style: SeriesStyle,
    pub histograms: Array2<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Panel {
    pub title: String,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Figure {
    pub title: String,
    pub ncols: usize,
    pub nrows: usize,
    pub panels: Vec<Panel>,
}

impl Figure {
    fn new(title: String, panels: Vec<Panel>) -> Self {
        let ncols = panels.len().clamp(1, MAX_COLUMNS);
        let nrows = panels.len().div_ceil(ncols);
        Self {
            title,
            ncols,
            nrows,
            panels,
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Consumer of figure descriptions, e.g. a plotting backend.
pub trait FigureSink {
    fn render(&mut self, figure: &Figure) -> anyhow::Result<()>;
}

/// Writes every figure as `figure_<n>.json` into a directory.
#[derive(Debug)]
pub struct JsonFigureSink {
    dir: PathBuf,
    written: usize,
}

impl JsonFigureSink {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FigureSink for JsonFigureSink {
    fn render(&mut self, figure: &Figure) -> anyhow::Result<()> {
        let path = self.dir.join(format!("figure_{}.json", self.written));
        let text = serde_json::to_string_pretty(figure).context("encoding figure")?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        log::debug!("wrote figure '{}' to {}", figure.title, path.display());
        self.written += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Figure assembly
// ---------------------------------------------------------------------------

/// Source of the reconstruction series in a lumisection figure.
#[derive(Debug, Clone, Copy, Default)]
pub enum Reco<'a> {
    #[default]
    None,
    /// Computed on the fly by the classifier bound to each type.
    Auto,
    /// One `(1, nbins)` array per type.
    Provided(&'a BTreeMap<String, Array2<f64>>),
}

/// What to overlay on the histograms of a single lumisection.
#[derive(Debug, Clone)]
pub struct LumisectionPlot<'a> {
    /// Types to draw; all registered types when `None`.
    pub type_names: Option<&'a [&'a str]>,
    pub reco: Reco<'a>,
    pub reco_label: String,
    /// Reference histograms per type, shape `(k, nbins)`.
    pub references: Option<&'a BTreeMap<String, Array2<f64>>>,
    pub reference_label: String,
}

impl Default for LumisectionPlot<'_> {
    fn default() -> Self {
        Self {
            type_names: None,
            reco: Reco::None,
            reco_label: "reco".to_string(),
            references: None,
            reference_label: "reference".to_string(),
        }
    }
}

fn as_matrix(name: &str, array: ArrayD<f64>) -> Result<Array2<f64>> {
    array.into_dimensionality::<Ix2>().map_err(|_| {
        HistStructError::InvalidShape(format!("'{name}' is not a 1D histogram type and cannot be overlaid"))
    })
}

impl HistStruct {
    fn requested_types<'a>(&'a self, type_names: Option<&[&'a str]>) -> Result<Vec<&'a str>> {
        let names: Vec<&str> = match type_names {
            Some(names) => names.to_vec(),
            None => self.type_names.iter().map(String::as_str).collect(),
        };
        if let Some(unknown) = names.iter().find(|n| !self.has_type(n)) {
            return Err(HistStructError::UnknownType(unknown.to_string()));
        }
        Ok(names)
    }

    /// One panel per type, one series per set of masks.
    ///
    /// `styles` must hold one entry per mask set; evenly spaced colours are
    /// used when it is `None`.
    pub fn histogram_figure(
        &self,
        type_names: Option<&[&str]>,
        mask_sets: &[Vec<&str>],
        styles: Option<&[SeriesStyle]>,
    ) -> Result<Figure> {
        let names = self.requested_types(type_names)?;
        let styles: Vec<SeriesStyle> = match styles {
            Some(s) if s.len() != mask_sets.len() => {
                return Err(HistStructError::length_mismatch("series styles", mask_sets.len(), s.len()))
            }
            Some(s) => s.to_vec(),
            None => color::generate_palette(mask_sets.len())
                .into_iter()
                .zip(mask_sets)
                .map(|(c, masks)| SeriesStyle::new(masks.join(" & "), c, 1.0))
                .collect(),
        };

        let mut panels = Vec::with_capacity(names.len());
        for name in names {
            let series = mask_sets
                .iter()
                .zip(&styles)
                .map(|(masks, style)| {
                    let histograms = as_matrix(name, self.get_array(name, Some(masks.as_slice()))?)?;
                    Ok(Series {
                        style: style.clone(),
                        histograms,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            panels.push(Panel {
                title: name.to_string(),
                series,
            });
        }
        Ok(Figure::new(String::new(), panels))
    }

    /// Histograms of a single lumisection, with optional reconstruction and
    /// reference overlays.
    pub fn lumisection_figure(&self, run: i64, ls: i64, plot: &LumisectionPlot<'_>) -> Result<Figure> {
        let names = self.requested_types(plot.type_names)?;
        for name in &names {
            match plot.reco {
                Reco::Auto => {
                    let classifier = self
                        .classifier(name)
                        .ok_or_else(|| HistStructError::NoClassifier(name.to_string()))?;
                    if classifier.as_reconstructor().is_none() {
                        return Err(HistStructError::NoReconstruction(name.to_string()));
                    }
                }
                Reco::Provided(reco) if !reco.contains_key(*name) => {
                    return Err(HistStructError::MissingSeries {
                        what: "reconstructed",
                        name: name.to_string(),
                    })
                }
                _ => {}
            }
            if plot.references.is_some_and(|refs| !refs.contains_key(*name)) {
                return Err(HistStructError::MissingSeries {
                    what: "reference",
                    name: name.to_string(),
                });
            }
        }
        let row = self.index_of(run, ls)?;

        let mut panels = Vec::with_capacity(names.len());
        for name in names {
            let hist = self.types[name]
                .array
                .select(Axis(0), &[row]);
            let mut series = Vec::with_capacity(3);
            if let Some(refs) = plot.references {
                series.push(Series {
                    style: SeriesStyle::new(&plot.reference_label, REFERENCE_COLOR, REFERENCE_OPACITY),
                    histograms: refs[name].clone(),
                });
            }
            let reco = match plot.reco {
                Reco::None => None,
                Reco::Auto => Some(as_matrix(name, self.reconstruct(name, hist.view())?)?),
                Reco::Provided(reco) => Some(reco[name].clone()),
            };
            if let Some(histograms) = reco {
                series.push(Series {
                    style: SeriesStyle::new(&plot.reco_label, RECO_COLOR, 1.0),
                    histograms,
                });
            }
            series.push(Series {
                style: SeriesStyle::new(format!("hist (run: {run}, ls: {ls})"), HISTOGRAM_COLOR, 1.0),
                histograms: as_matrix(name, hist)?,
            });
            panels.push(Panel {
                title: name.to_string(),
                series,
            });
        }
        Ok(Figure::new(format!("run {run}, lumisection {ls}"), panels))
    }

    /// One lumisection figure for every lumisection of `run` passing the masks.
    pub fn run_figures(&self, run: i64, mask_names: Option<&[&str]>, plot: &LumisectionPlot<'_>) -> Result<Vec<Figure>> {
        let run_ids = self.get_run_ids(mask_names)?;
        let ls_ids = self.get_ls_ids(mask_names)?;
        let lumisections: Vec<i64> = run_ids
            .iter()
            .zip(&ls_ids)
            .filter(|(r, _)| **r == run)
            .map(|(_, ls)| *ls)
            .collect();
        log::info!("assembling figures for {} lumisections of run {run}", lumisections.len());
        lumisections
            .into_iter()
            .map(|ls| self.lumisection_figure(run, ls, plot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array1, Array3};

    use super::*;
    use crate::classifier::{MaxPullClassifier, TemplateClassifier};

    fn store() -> HistStruct {
        let mut hs = HistStruct::new();
        hs.add_type(
            "A",
            array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            &[1, 1, 2],
            &[1, 2, 1],
            Some(Array1::from(vec![10.0, 20.0, 30.0])),
        )
        .unwrap();
        hs.add_mask("run1", &[true, true, false]).unwrap();
        hs.add_mask("ls1", &[true, false, true]).unwrap();
        hs
    }

    #[test]
    fn overview_has_one_series_per_mask_set() {
        let hs = store();
        let fig = hs
            .histogram_figure(None, &[vec!["run1"], vec!["run1", "ls1"]], None)
            .unwrap();
        assert_eq!((fig.ncols, fig.nrows), (1, 1));
        let panel = &fig.panels[0];
        assert_eq!(panel.title, "A");
        assert_eq!(panel.series[0].histograms.nrows(), 2);
        assert_eq!(panel.series[1].histograms, array![[1.0, 2.0]]);
        assert_eq!(panel.series[1].style.label, "run1 & ls1");
        assert_ne!(panel.series[0].style.color, panel.series[1].style.color);
    }

    #[test]
    fn overview_checks_styles_and_rank() {
        let mut hs = store();
        let styles = [SeriesStyle::new("x", HISTOGRAM_COLOR, 1.0)];
        assert!(matches!(
            hs.histogram_figure(None, &[vec![], vec![]], Some(&styles)),
            Err(HistStructError::LengthMismatch { .. })
        ));
        hs.add_type("2d", Array3::<f64>::zeros((3, 2, 2)), &[1, 1, 2], &[1, 2, 1], None)
            .unwrap();
        assert!(matches!(
            hs.histogram_figure(None, &[vec![]], None),
            Err(HistStructError::InvalidShape(_))
        ));
        assert!(hs.histogram_figure(Some(&["A"][..]), &[vec![]], None).is_ok());
    }

    #[test]
    fn lumisection_figure_with_overlays() {
        let mut hs = store();
        let reference = hs.get_array("A", None).unwrap();
        hs.bind_classifier("A", Box::new(TemplateClassifier::fit(reference.view()).unwrap()), false)
            .unwrap();
        let refs = BTreeMap::from([("A".to_string(), array![[0.0, 1.0], [1.0, 0.0]])]);
        let plot = LumisectionPlot {
            reco: Reco::Auto,
            references: Some(&refs),
            ..Default::default()
        };
        let fig = hs.lumisection_figure(1, 2, &plot).unwrap();
        assert_eq!(fig.title, "run 1, lumisection 2");
        let labels: Vec<&str> = fig.panels[0].series.iter().map(|s| s.style.label.as_str()).collect();
        assert_eq!(labels, vec!["reference", "reco", "hist (run: 1, ls: 2)"]);
        assert_eq!(fig.panels[0].series[0].style.opacity, REFERENCE_OPACITY);
        assert_eq!(fig.panels[0].series[1].histograms, array![[3.0, 4.0]]);
        assert_eq!(fig.panels[0].series[2].histograms, array![[3.0, 4.0]]);
    }

    #[test]
    fn lumisection_figure_validates_inputs_first() {
        let mut hs = store();
        let auto = LumisectionPlot {
            reco: Reco::Auto,
            ..Default::default()
        };
        assert!(matches!(
            hs.lumisection_figure(1, 1, &auto),
            Err(HistStructError::NoClassifier(_))
        ));
        let reference = hs.get_array("A", None).unwrap();
        hs.bind_classifier("A", Box::new(MaxPullClassifier::fit(reference.view()).unwrap()), false)
            .unwrap();
        assert!(matches!(
            hs.lumisection_figure(1, 1, &auto),
            Err(HistStructError::NoReconstruction(_))
        ));

        let empty = BTreeMap::new();
        let provided = LumisectionPlot {
            reco: Reco::Provided(&empty),
            ..Default::default()
        };
        assert!(matches!(
            hs.lumisection_figure(1, 1, &provided),
            Err(HistStructError::MissingSeries { what: "reconstructed", .. })
        ));
        assert!(matches!(
            hs.lumisection_figure(7, 7, &LumisectionPlot::default()),
            Err(HistStructError::Lookup { .. })
        ));
    }

    #[test]
    fn run_figures_follow_masks() {
        let hs = store();
        let plot = LumisectionPlot::default();
        assert_eq!(hs.run_figures(1, None, &plot).unwrap().len(), 2);
        let figs = hs.run_figures(1, Some(&["ls1"][..]), &plot).unwrap();
        assert_eq!(figs.len(), 1);
        assert_eq!(figs[0].title, "run 1, lumisection 1");
    }

    #[test]
    fn json_sink_writes_one_file_per_figure() {
        let dir = tempfile::tempdir().unwrap();
        let hs = store();
        let mut sink = JsonFigureSink::new(dir.path().join("figs")).unwrap();
        for fig in hs.run_figures(1, None, &LumisectionPlot::default()).unwrap() {
            sink.render(&fig).unwrap();
        }
        assert_eq!(sink.written(), 2);
        let text = fs::read_to_string(dir.path().join("figs").join("figure_0.json")).unwrap();
        assert!(text.contains("\"#000000\""));
    }
}
