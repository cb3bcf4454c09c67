use std::ops::Range;

use ndarray::{concatenate, ArrayD, Axis, IxDyn, Slice};

use super::model::RawTable;
use crate::error::{HistStructError, Result};

// ---------------------------------------------------------------------------
// Preprocessing options
// ---------------------------------------------------------------------------

/// Preprocessing applied when turning a raw sub-table into an array.
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareOptions {
    /// One bin range per histogram dimension; `None` keeps every bin.
    pub crop: Option<Vec<Range<usize>>>,
    /// Scale every histogram to unit sum (empty histograms are left untouched).
    pub normalize: bool,
    /// One grouping factor per histogram dimension; groups of bins are summed.
    pub rebin: Option<Vec<usize>>,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            crop: None,
            normalize: true,
            rebin: None,
        }
    }
}

/// Output of [`prepare`]: an array of shape `(N, ...)` and its coordinates.
#[derive(Debug, Clone)]
pub struct PreparedHistograms {
    pub array: ArrayD<f64>,
    pub run_ids: Vec<i64>,
    pub ls_ids: Vec<i64>,
}

// ---------------------------------------------------------------------------
// prepare
// ---------------------------------------------------------------------------

/// Convert the rows of a single histogram type into an aligned array.
///
/// Rows are ordered by (run, lumisection). The steps run in the order crop,
/// rebin, normalize.
pub fn prepare(table: &RawTable, options: &PrepareOptions) -> Result<PreparedHistograms> {
    let first = table
        .rows
        .first()
        .ok_or_else(|| HistStructError::InvalidShape("no histograms to prepare".to_string()))?;
    let bin_shape = first.shape.clone();

    for row in &table.rows {
        if row.shape != bin_shape || !row.is_consistent() {
            return Err(HistStructError::InvalidShape(format!(
                "histogram '{}' at run {}, lumisection {} has layout {:?} with {} bins, expected {:?}",
                row.hname,
                row.run,
                row.ls,
                row.shape,
                row.bins.len(),
                bin_shape
            )));
        }
    }

    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by_key(|&i| (table.rows[i].run, table.rows[i].ls));

    let mut full_shape = vec![table.len()];
    full_shape.extend_from_slice(&bin_shape);
    let data: Vec<f64> = order
        .iter()
        .flat_map(|&i| table.rows[i].bins.iter().copied())
        .collect();
    let mut array = ArrayD::from_shape_vec(IxDyn(&full_shape), data)
        .map_err(|e| HistStructError::InvalidShape(e.to_string()))?;

    if let Some(crop) = &options.crop {
        array = crop_bins(array, crop)?;
    }
    if let Some(factors) = &options.rebin {
        array = rebin(array, factors)?;
    }
    if options.normalize {
        normalize_rows(&mut array);
    }

    Ok(PreparedHistograms {
        array,
        run_ids: order.iter().map(|&i| table.rows[i].run).collect(),
        ls_ids: order.iter().map(|&i| table.rows[i].ls).collect(),
    })
}

fn crop_bins(array: ArrayD<f64>, crop: &[Range<usize>]) -> Result<ArrayD<f64>> {
    check_per_dimension(&array, crop.len(), "crop")?;
    let mut out = array;
    for (d, range) in crop.iter().enumerate() {
        let axis = Axis(d + 1);
        let size = out.len_of(axis);
        if range.start >= range.end || range.end > size {
            return Err(HistStructError::InvalidShape(format!(
                "crop range {range:?} is invalid for dimension {d} of size {size}"
            )));
        }
        out = out
            .slice_axis(axis, Slice::from(range.clone()))
            .to_owned();
    }
    Ok(out)
}

/// Sum groups of `factor` consecutive bins along every histogram dimension.
pub fn rebin(array: ArrayD<f64>, factors: &[usize]) -> Result<ArrayD<f64>> {
    check_per_dimension(&array, factors.len(), "rebin")?;
    let mut out = array;
    for (d, &factor) in factors.iter().enumerate() {
        if factor == 1 {
            continue;
        }
        let axis = Axis(d + 1);
        let size = out.len_of(axis);
        if factor == 0 || size % factor != 0 {
            return Err(HistStructError::InvalidShape(format!(
                "rebinning factor {factor} does not divide dimension {d} of size {size}"
            )));
        }
        let groups: Vec<ArrayD<f64>> = (0..size / factor)
            .map(|k| {
                out.slice_axis(axis, Slice::from(k * factor..(k + 1) * factor))
                    .sum_axis(axis)
                    .insert_axis(axis)
            })
            .collect();
        let views: Vec<_> = groups.iter().map(|g| g.view()).collect();
        out = concatenate(axis, &views).map_err(|e| HistStructError::InvalidShape(e.to_string()))?;
    }
    Ok(out)
}

fn normalize_rows(array: &mut ArrayD<f64>) {
    for mut row in array.axis_iter_mut(Axis(0)) {
        let total = row.sum();
        if total > 0.0 {
            row.mapv_inplace(|v| v / total);
        }
    }
}

fn check_per_dimension(array: &ArrayD<f64>, given: usize, what: &str) -> Result<()> {
    let dims = array.ndim() - 1;
    if given != dims {
        return Err(HistStructError::InvalidShape(format!(
            "{what} needs one entry per histogram dimension ({dims}), got {given}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::data::model::RawHistogram;

    fn table() -> RawTable {
        RawTable::from_rows(vec![
            RawHistogram::new_1d("a", 2, 1, 10.0, vec![1.0, 1.0, 2.0, 4.0]),
            RawHistogram::new_1d("a", 1, 5, 20.0, vec![0.0, 0.0, 0.0, 0.0]),
            RawHistogram::new_1d("a", 1, 3, 30.0, vec![1.0, 2.0, 3.0, 4.0]),
        ])
    }

    #[test]
    fn rows_are_sorted_by_coordinate() {
        let options = PrepareOptions {
            normalize: false,
            ..Default::default()
        };
        let out = prepare(&table(), &options).unwrap();
        assert_eq!(out.run_ids, vec![1, 1, 2]);
        assert_eq!(out.ls_ids, vec![3, 5, 1]);
        assert_eq!(out.array.shape(), &[3, 4]);
        assert_eq!(out.array[[0, 3]], 4.0);
    }

    #[test]
    fn crop_rebin_normalize() {
        let options = PrepareOptions {
            crop: Some(vec![0..4]),
            normalize: true,
            rebin: Some(vec![2]),
        };
        let out = prepare(&table(), &options).unwrap();
        assert_eq!(out.array.shape(), &[3, 2]);
        assert_abs_diff_eq!(out.array[[0, 0]], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(out.array[[0, 1]], 0.7, epsilon = 1e-12);
        // an empty histogram stays empty
        assert_eq!(out.array[[1, 0]], 0.0);
        assert_abs_diff_eq!(out.array[[2, 1]], 0.75, epsilon = 1e-12);
    }

    #[test]
    fn crop_selects_bin_range() {
        let options = PrepareOptions {
            crop: Some(vec![1..3]),
            normalize: false,
            rebin: None,
        };
        let out = prepare(&table(), &options).unwrap();
        assert_eq!(out.array.shape(), &[3, 2]);
        assert_eq!(out.array[[0, 0]], 2.0);
        assert_eq!(out.array[[0, 1]], 3.0);
    }

    #[test]
    fn two_dimensional_rebin() {
        let mut h = RawHistogram::new_1d("b", 1, 1, 4.0, (0..8).map(f64::from).collect());
        h.shape = vec![2, 4];
        let options = PrepareOptions {
            crop: None,
            normalize: false,
            rebin: Some(vec![2, 2]),
        };
        let out = prepare(&RawTable::from_rows(vec![h]), &options).unwrap();
        assert_eq!(out.array.shape(), &[1, 1, 2]);
        assert_eq!(out.array[[0, 0, 0]], 0.0 + 1.0 + 4.0 + 5.0);
        assert_eq!(out.array[[0, 0, 1]], 2.0 + 3.0 + 6.0 + 7.0);
    }

    #[test]
    fn invalid_rebin_factor_is_rejected() {
        let options = PrepareOptions {
            rebin: Some(vec![3]),
            ..Default::default()
        };
        assert!(matches!(
            prepare(&table(), &options),
            Err(HistStructError::InvalidShape(_))
        ));
    }

    #[test]
    fn heterogeneous_layouts_are_rejected() {
        let mut t = table();
        t.rows.push(RawHistogram::new_1d("a", 3, 1, 1.0, vec![1.0]));
        assert!(prepare(&t, &PrepareOptions::default()).is_err());
    }
}
