use std::collections::{BTreeMap, HashSet};

// ---------------------------------------------------------------------------
// RawHistogram – one row of the source table
// ---------------------------------------------------------------------------

/// A single histogram as it appears in a raw monitoring table: one
/// histogram type for one lumisection.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHistogram {
    /// Histogram type name (e.g. `chargeInner_PXLayer_1`).
    pub hname: String,
    pub run: i64,
    pub ls: i64,
    /// Number of entries recorded in the histogram, before any normalization.
    pub entries: f64,
    /// Flattened bin contents in row-major order.
    pub bins: Vec<f64>,
    /// Bin layout: `[nbins]` for 1D histograms, `[ny, nx]` for 2D ones.
    pub shape: Vec<usize>,
}

impl RawHistogram {
    /// Create a 1D histogram row; the shape is taken from the bin count.
    pub fn new_1d(hname: &str, run: i64, ls: i64, entries: f64, bins: Vec<f64>) -> Self {
        let shape = vec![bins.len()];
        RawHistogram {
            hname: hname.to_string(),
            run,
            ls,
            entries,
            bins,
            shape,
        }
    }

    /// Whether the declared shape accounts for every bin.
    pub fn is_consistent(&self) -> bool {
        self.shape.iter().product::<usize>() == self.bins.len()
    }
}

// ---------------------------------------------------------------------------
// RawTable – the complete loaded table
// ---------------------------------------------------------------------------

/// A raw table that may mix several histogram types.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<RawHistogram>,
}

impl RawTable {
    pub fn from_rows(rows: Vec<RawHistogram>) -> Self {
        RawTable { rows }
    }

    /// Histogram type names in order of first appearance.
    pub fn hist_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.hname.as_str()))
            .map(|row| row.hname.clone())
            .collect()
    }

    /// Sub-table holding only the rows of one histogram type.
    pub fn select(&self, hname: &str) -> RawTable {
        RawTable {
            rows: self
                .rows
                .iter()
                .filter(|row| row.hname == hname)
                .cloned()
                .collect(),
        }
    }

    /// Entry counts keyed by (run, lumisection).
    ///
    /// Returns the first duplicated coordinate as an error value.
    pub fn entries_by_coordinate(&self) -> Result<BTreeMap<(i64, i64), f64>, (i64, i64)> {
        let mut out = BTreeMap::new();
        for row in &self.rows {
            if out.insert((row.run, row.ls), row.entries).is_some() {
                return Err((row.run, row.ls));
            }
        }
        Ok(out)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hname: &str, run: i64, ls: i64) -> RawHistogram {
        RawHistogram::new_1d(hname, run, ls, 10.0, vec![1.0, 2.0])
    }

    #[test]
    fn hist_names_keep_first_appearance_order() {
        let table = RawTable::from_rows(vec![
            row("b", 1, 1),
            row("a", 1, 1),
            row("b", 1, 2),
            row("a", 1, 2),
        ]);
        assert_eq!(table.hist_names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(table.select("a").len(), 2);
        assert!(table.select("c").is_empty());
    }

    #[test]
    fn duplicated_coordinate_is_reported() {
        let table = RawTable::from_rows(vec![row("a", 1, 1), row("a", 1, 1)]);
        assert_eq!(table.entries_by_coordinate(), Err((1, 1)));
    }

    #[test]
    fn shape_consistency() {
        let mut h = row("a", 1, 1);
        assert!(h.is_consistent());
        h.shape = vec![3];
        assert!(!h.is_consistent());
    }
}
