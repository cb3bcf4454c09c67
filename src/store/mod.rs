/// The aligned histogram store.
///
/// ```text
///            SampleIndex  (run, ls) x N, fixed by the first type
///                 │
///   ┌─────────────┼──────────────┬───────────────┐
///   ▼             ▼              ▼               ▼
/// types        masks        classifiers       scores
/// (N, ...)     [bool; N]    one per type      [f64; N] per type
/// ```
use std::collections::{BTreeMap, HashMap};

use ndarray::{Array, Array1, ArrayD, Axis, Dimension, RemoveAxis};

use crate::classifier::HistogramClassifier;
use crate::data::model::RawTable;
use crate::data::prepare::{prepare, PrepareOptions, PreparedHistograms};
use crate::error::{HistStructError, Result};

pub mod index;
pub mod masks;
pub mod persist;
pub mod scores;

pub use index::SampleIndex;

/// Arrays registered under one histogram type name.
#[derive(Debug, Clone)]
pub(crate) struct HistogramType {
    /// Shape `(N, ...)`.
    pub(crate) array: ArrayD<f64>,
    /// Raw entry counts, captured before any normalization.
    pub(crate) entries: Array1<f64>,
}

// ---------------------------------------------------------------------------
// HistStruct – the complete aligned collection
// ---------------------------------------------------------------------------

/// A mutually consistent collection of histogram arrays keyed by
/// (run, lumisection), with masks, classifiers and scores over the same rows.
///
/// Start from [`HistStruct::new`] and register types with
/// [`add_type`](HistStruct::add_type) or
/// [`add_type_from_raw`](HistStruct::add_type_from_raw). The first type fixes
/// the row count and the coordinates; every later type must carry the same
/// coordinates in the same order.
#[derive(Debug, Default)]
pub struct HistStruct {
    pub(crate) index: SampleIndex,
    /// Registration order of the types.
    pub(crate) type_names: Vec<String>,
    pub(crate) types: HashMap<String, HistogramType>,
    pub(crate) masks: BTreeMap<String, Vec<bool>>,
    pub(crate) classifiers: BTreeMap<String, Box<dyn HistogramClassifier>>,
    pub(crate) scores: BTreeMap<String, Array1<f64>>,
}

impl HistStruct {
    /// An empty structure without rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows (0 before the first type is registered).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Registered type names, in registration order.
    pub fn type_names(&self) -> &[String] {
        &self.type_names
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn sample_index(&self) -> &SampleIndex {
        &self.index
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register the histograms of one type.
    ///
    /// `array` has shape `(N, ...)` with one row per (run, lumisection).
    /// `entry_counts` defaults to zeros; pass the counts recorded before
    /// normalization when statistics masks are needed.
    pub fn add_type<D: Dimension>(
        &mut self,
        name: &str,
        array: Array<f64, D>,
        run_ids: &[i64],
        ls_ids: &[i64],
        entry_counts: Option<Array1<f64>>,
    ) -> Result<()> {
        if self.types.contains_key(name) {
            return Err(HistStructError::DuplicateType(name.to_string()));
        }
        let array = array.into_dyn();
        let new_index = self.check_coordinates(None, name, &array, run_ids, ls_ids)?;
        let rows = run_ids.len();
        let entries = match entry_counts {
            Some(e) if e.len() != rows => {
                return Err(HistStructError::length_mismatch(
                    format!("entry counts of '{name}'"),
                    rows,
                    e.len(),
                ))
            }
            Some(e) => e,
            None => Array1::zeros(rows),
        };
        self.commit_type(name.to_string(), array, entries, new_index);
        Ok(())
    }

    /// Register every histogram type found in a raw table.
    ///
    /// Entry counts are taken from the raw rows before `prepare_fn` runs.
    /// All types are prepared and validated before any of them is
    /// registered. Returns the names added, in table order.
    pub fn add_type_from_raw<F>(&mut self, raw: &RawTable, mut prepare_fn: F) -> Result<Vec<String>>
    where
        F: FnMut(&RawTable) -> Result<PreparedHistograms>,
    {
        let names = raw.hist_names();
        if let Some(existing) = names.iter().find(|n| self.types.contains_key(n.as_str())) {
            return Err(HistStructError::DuplicateType(existing.clone()));
        }

        let mut pending_index: Option<SampleIndex> = None;
        let mut staged = Vec::with_capacity(names.len());
        for name in &names {
            let sub = raw.select(name);
            let recorded = sub
                .entries_by_coordinate()
                .map_err(|(run, ls)| HistStructError::DuplicateCoordinate { run, ls })?;
            let prepared = prepare_fn(&sub)?;
            if let Some(index) = self.check_coordinates(
                pending_index.as_ref(),
                name,
                &prepared.array,
                &prepared.run_ids,
                &prepared.ls_ids,
            )? {
                pending_index = Some(index);
            }
            let entries = prepared
                .run_ids
                .iter()
                .zip(&prepared.ls_ids)
                .map(|(run, ls)| {
                    recorded
                        .get(&(*run, *ls))
                        .copied()
                        .ok_or_else(|| HistStructError::Alignment(name.clone()))
                })
                .collect::<Result<Array1<f64>>>()?;
            staged.push((name.clone(), prepared.array, entries));
        }

        for (name, array, entries) in staged {
            self.commit_type(name, array, entries, pending_index.take());
        }
        Ok(names)
    }

    /// [`add_type_from_raw`](Self::add_type_from_raw) with the default preparation.
    pub fn add_raw_table(&mut self, raw: &RawTable, options: &PrepareOptions) -> Result<Vec<String>> {
        self.add_type_from_raw(raw, |sub| prepare(sub, options))
    }

    /// Validate the shape and coordinates of a type about to be registered.
    ///
    /// `pending` is an index established earlier in the same batch. Returns
    /// the index to adopt when none is established yet.
    fn check_coordinates(
        &self,
        pending: Option<&SampleIndex>,
        name: &str,
        array: &ArrayD<f64>,
        run_ids: &[i64],
        ls_ids: &[i64],
    ) -> Result<Option<SampleIndex>> {
        if array.ndim() < 2 {
            return Err(HistStructError::InvalidShape(format!(
                "'{name}' must have shape (samples, bins, ...), got {:?}",
                array.shape()
            )));
        }
        if array.shape()[1..].contains(&0) {
            return Err(HistStructError::InvalidShape(format!(
                "'{name}' has an empty bin axis: {:?}",
                array.shape()
            )));
        }
        if run_ids.len() != ls_ids.len() {
            return Err(HistStructError::length_mismatch(
                format!("lumisection numbers of '{name}'"),
                run_ids.len(),
                ls_ids.len(),
            ));
        }
        if array.len_of(Axis(0)) != run_ids.len() {
            return Err(HistStructError::length_mismatch(
                format!("histogram array of '{name}'"),
                run_ids.len(),
                array.len_of(Axis(0)),
            ));
        }
        let established = pending.or(if self.type_names.is_empty() {
            None
        } else {
            Some(&self.index)
        });
        match established {
            Some(index) if index.matches(run_ids, ls_ids) => Ok(None),
            Some(_) => Err(HistStructError::Alignment(name.to_string())),
            None => SampleIndex::new(run_ids.to_vec(), ls_ids.to_vec()).map(Some),
        }
    }

    fn commit_type(&mut self, name: String, array: ArrayD<f64>, entries: Array1<f64>, new_index: Option<SampleIndex>) {
        if let Some(index) = new_index {
            log::debug!("sample index fixed at {} rows", index.len());
            self.index = index;
        }
        log::info!("registered histogram type '{name}' with shape {:?}", array.shape());
        self.type_names.push(name.clone());
        self.types.insert(name, HistogramType { array, entries });
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn histogram_type(&self, name: &str) -> Result<&HistogramType> {
        self.types
            .get(name)
            .ok_or_else(|| HistStructError::UnknownType(name.to_string()))
    }

    /// Rows passing every mask in `mask_names`; `None` means all rows.
    pub(crate) fn selected_rows(&self, mask_names: Option<&[&str]>) -> Result<Option<Vec<usize>>> {
        let Some(names) = mask_names else {
            return Ok(None);
        };
        let mask = self.combine_masks(names)?;
        Ok(Some(
            mask.iter()
                .enumerate()
                .filter_map(|(i, &keep)| keep.then_some(i))
                .collect(),
        ))
    }

    /// Number of bins per histogram: the product of all non-sample dimensions.
    pub fn bin_count(&self, name: &str) -> Result<usize> {
        Ok(self.histogram_type(name)?.array.shape()[1..].iter().product())
    }

    /// Histograms of one type, restricted to the rows passing all masks.
    pub fn get_array(&self, name: &str, mask_names: Option<&[&str]>) -> Result<ArrayD<f64>> {
        let hist = self.histogram_type(name)?;
        let rows = self.selected_rows(mask_names)?;
        Ok(take_rows(&hist.array, rows.as_deref()))
    }

    /// Histograms of every type, restricted to the rows passing all masks.
    pub fn get_arrays(&self, mask_names: Option<&[&str]>) -> Result<BTreeMap<String, ArrayD<f64>>> {
        let rows = self.selected_rows(mask_names)?;
        Ok(self
            .types
            .iter()
            .map(|(name, hist)| (name.clone(), take_rows(&hist.array, rows.as_deref())))
            .collect())
    }

    /// Entry counts of one type, restricted to the rows passing all masks.
    pub fn get_entry_counts(&self, name: &str, mask_names: Option<&[&str]>) -> Result<Array1<f64>> {
        let hist = self.histogram_type(name)?;
        let rows = self.selected_rows(mask_names)?;
        Ok(take_rows(&hist.entries, rows.as_deref()))
    }

    /// Entry counts of every type, restricted to the rows passing all masks.
    pub fn get_all_entry_counts(&self, mask_names: Option<&[&str]>) -> Result<BTreeMap<String, Array1<f64>>> {
        let rows = self.selected_rows(mask_names)?;
        Ok(self
            .types
            .iter()
            .map(|(name, hist)| (name.clone(), take_rows(&hist.entries, rows.as_deref())))
            .collect())
    }

    pub fn get_run_ids(&self, mask_names: Option<&[&str]>) -> Result<Vec<i64>> {
        let rows = self.selected_rows(mask_names)?;
        Ok(take_values(self.index.run_ids(), rows.as_deref()))
    }

    pub fn get_ls_ids(&self, mask_names: Option<&[&str]>) -> Result<Vec<i64>> {
        let rows = self.selected_rows(mask_names)?;
        Ok(take_values(self.index.ls_ids(), rows.as_deref()))
    }

    /// Row of the coordinate (run, ls).
    pub fn index_of(&self, run: i64, ls: i64) -> Result<usize> {
        let row = self.index.index_of(run, ls)?;
        log::debug!("run {run}, lumisection {ls} -> row {row}");
        Ok(row)
    }
}

pub(crate) fn take_rows<D: RemoveAxis>(array: &Array<f64, D>, rows: Option<&[usize]>) -> Array<f64, D> {
    match rows {
        Some(rows) => array.select(Axis(0), rows),
        None => array.clone(),
    }
}

fn take_values(values: &[i64], rows: Option<&[usize]>) -> Vec<i64> {
    match rows {
        Some(rows) => rows.iter().map(|&i| values[i]).collect(),
        None => values.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array3};

    use super::*;
    use crate::data::model::RawHistogram;

    fn three_rows() -> HistStruct {
        let mut hs = HistStruct::new();
        hs.add_type(
            "A",
            Array2::from_shape_fn((3, 5), |(i, j)| (i * 5 + j) as f64),
            &[1, 1, 1],
            &[10, 11, 12],
            Some(Array1::from(vec![100.0, 200.0, 300.0])),
        )
        .unwrap();
        hs
    }

    #[test]
    fn first_type_fixes_the_index() {
        let hs = three_rows();
        assert_eq!(hs.len(), 3);
        assert_eq!(hs.type_names(), &["A".to_string()]);
        assert_eq!(hs.get_run_ids(None).unwrap(), vec![1, 1, 1]);
        assert_eq!(hs.get_ls_ids(None).unwrap(), vec![10, 11, 12]);
        assert_eq!(hs.bin_count("A").unwrap(), 5);
    }

    #[test]
    fn misaligned_type_is_rejected() {
        let mut hs = three_rows();
        let err = hs
            .add_type("B", Array2::<f64>::zeros((3, 5)), &[1, 1, 2], &[10, 11, 12], None)
            .unwrap_err();
        assert!(matches!(err, HistStructError::Alignment(ref n) if n == "B"));
        assert!(!hs.has_type("B"));

        // same coordinates in another order are misaligned too
        let err = hs
            .add_type("B", Array2::<f64>::zeros((3, 5)), &[1, 1, 1], &[12, 11, 10], None)
            .unwrap_err();
        assert!(matches!(err, HistStructError::Alignment(_)));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut hs = three_rows();
        let err = hs
            .add_type("A", Array2::<f64>::zeros((3, 2)), &[1, 1, 1], &[10, 11, 12], None)
            .unwrap_err();
        assert!(matches!(err, HistStructError::DuplicateType(_)));
        assert_eq!(hs.get_array("A", None).unwrap().shape(), &[3, 5]);
    }

    #[test]
    fn entry_counts_default_to_zero_and_are_length_checked() {
        let mut hs = three_rows();
        hs.add_type("B", Array2::<f64>::ones((3, 2)), &[1, 1, 1], &[10, 11, 12], None)
            .unwrap();
        assert_eq!(hs.get_entry_counts("B", None).unwrap(), Array1::<f64>::zeros(3));

        let err = hs
            .add_type(
                "C",
                Array2::<f64>::ones((3, 2)),
                &[1, 1, 1],
                &[10, 11, 12],
                Some(Array1::zeros(2)),
            )
            .unwrap_err();
        assert!(matches!(err, HistStructError::LengthMismatch { expected: 3, found: 2, .. }));
        assert_eq!(hs.type_names().len(), 2);
    }

    #[test]
    fn array_rows_must_match_coordinates() {
        let mut hs = HistStruct::new();
        let err = hs
            .add_type("A", Array2::<f64>::zeros((2, 5)), &[1, 1, 1], &[1, 2, 3], None)
            .unwrap_err();
        assert!(matches!(err, HistStructError::LengthMismatch { .. }));
        assert!(hs.is_empty());
    }

    #[test]
    fn duplicated_coordinates_never_become_an_index() {
        let mut hs = HistStruct::new();
        let err = hs
            .add_type("A", Array2::<f64>::zeros((2, 5)), &[1, 1], &[4, 4], None)
            .unwrap_err();
        assert!(matches!(err, HistStructError::DuplicateCoordinate { run: 1, ls: 4 }));
        assert!(hs.type_names().is_empty());
    }

    #[test]
    fn multidimensional_bin_count() {
        let mut hs = HistStruct::new();
        hs.add_type("2d", Array3::<f64>::zeros((2, 3, 4)), &[1, 1], &[1, 2], None)
            .unwrap();
        assert_eq!(hs.bin_count("2d").unwrap(), 12);
    }

    #[test]
    fn empty_bin_axis_is_rejected() {
        let mut hs = HistStruct::new();
        let err = hs
            .add_type("flat", Array2::<f64>::zeros((2, 0)), &[1, 1], &[1, 2], Some(Array1::from(vec![5.0, 0.0])))
            .unwrap_err();
        assert!(matches!(err, HistStructError::InvalidShape(_)));
        let err = hs
            .add_type("2d", Array3::<f64>::zeros((2, 3, 0)), &[1, 1], &[1, 2], None)
            .unwrap_err();
        assert!(matches!(err, HistStructError::InvalidShape(_)));
        assert!(hs.is_empty());
    }

    #[test]
    fn masked_retrieval() {
        let mut hs = three_rows();
        hs.add_mask("odd", &[true, false, true]).unwrap();
        let arr = hs.get_array("A", Some(&["odd"][..])).unwrap();
        assert_eq!(arr.shape(), &[2, 5]);
        assert_eq!(arr[[1, 0]], 10.0);
        assert_eq!(
            hs.get_entry_counts("A", Some(&["odd"][..])).unwrap(),
            Array1::from(vec![100.0, 300.0])
        );
        assert_eq!(hs.get_ls_ids(Some(&["odd"][..])).unwrap(), vec![10, 12]);
        assert_eq!(hs.get_arrays(Some(&[][..])).unwrap()["A"].shape(), &[3, 5]);
        assert!(matches!(hs.get_array("Z", None), Err(HistStructError::UnknownType(_))));
        assert!(matches!(hs.get_array("A", Some(&["nope"][..])), Err(HistStructError::UnknownMask(_))));
    }

    fn raw_table() -> RawTable {
        let mut rows = Vec::new();
        for (ls, entries) in [(2, 20.0), (1, 10.0)] {
            rows.push(RawHistogram::new_1d("x", 5, ls, entries, vec![1.0, 3.0]));
            rows.push(RawHistogram::new_1d("y", 5, ls, entries * 2.0, vec![2.0, 2.0, 4.0]));
        }
        RawTable::from_rows(rows)
    }

    #[test]
    fn raw_table_entries_follow_prepared_order() {
        let mut hs = HistStruct::new();
        let added = hs.add_raw_table(&raw_table(), &PrepareOptions::default()).unwrap();
        assert_eq!(added, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(hs.get_ls_ids(None).unwrap(), vec![1, 2]);
        assert_eq!(hs.get_entry_counts("x", None).unwrap(), Array1::from(vec![10.0, 20.0]));
        assert_eq!(hs.get_entry_counts("y", None).unwrap(), Array1::from(vec![20.0, 40.0]));
        assert_eq!(hs.get_array("x", None).unwrap()[[0, 1]], 0.75);
    }

    #[test]
    fn raw_table_with_existing_name_adds_nothing() {
        let mut hs = HistStruct::new();
        hs.add_type("y", Array2::<f64>::zeros((2, 3)), &[5, 5], &[1, 2], None)
            .unwrap();
        let err = hs.add_raw_table(&raw_table(), &PrepareOptions::default()).unwrap_err();
        assert!(matches!(err, HistStructError::DuplicateType(ref n) if n == "y"));
        assert_eq!(hs.type_names(), &["y".to_string()]);
    }

    #[test]
    fn raw_table_is_validated_before_any_registration() {
        let mut table = raw_table();
        // "y" misses one lumisection, so it cannot align with "x"
        table.rows.retain(|r| !(r.hname == "y" && r.ls == 2));
        let mut hs = HistStruct::new();
        let err = hs.add_raw_table(&table, &PrepareOptions::default()).unwrap_err();
        assert!(matches!(err, HistStructError::LengthMismatch { .. } | HistStructError::Alignment(_)));
        assert!(hs.type_names().is_empty());
        assert!(hs.is_empty());
    }
}
