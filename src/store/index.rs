use std::collections::HashMap;

use crate::error::{HistStructError, Result};

/// The ordered (run, lumisection) coordinates shared by every array in a
/// [`HistStruct`](super::HistStruct).
///
/// Coordinates are unique and never reordered; the reverse map is built once
/// when the index is created.
#[derive(Debug, Clone, Default)]
pub struct SampleIndex {
    run_ids: Vec<i64>,
    ls_ids: Vec<i64>,
    rows: HashMap<(i64, i64), usize>,
}

impl SampleIndex {
    pub fn new(run_ids: Vec<i64>, ls_ids: Vec<i64>) -> Result<Self> {
        if run_ids.len() != ls_ids.len() {
            return Err(HistStructError::length_mismatch(
                "lumisection numbers",
                run_ids.len(),
                ls_ids.len(),
            ));
        }
        let mut rows = HashMap::with_capacity(run_ids.len());
        for (i, (&run, &ls)) in run_ids.iter().zip(&ls_ids).enumerate() {
            if rows.insert((run, ls), i).is_some() {
                return Err(HistStructError::DuplicateCoordinate { run, ls });
            }
        }
        Ok(Self {
            run_ids,
            ls_ids,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.run_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.run_ids.is_empty()
    }

    pub fn run_ids(&self) -> &[i64] {
        &self.run_ids
    }

    pub fn ls_ids(&self) -> &[i64] {
        &self.ls_ids
    }

    /// Whether the given coordinates equal this index, element by element.
    pub fn matches(&self, run_ids: &[i64], ls_ids: &[i64]) -> bool {
        self.run_ids == run_ids && self.ls_ids == ls_ids
    }

    /// Row holding the coordinate (run, ls).
    pub fn index_of(&self, run: i64, ls: i64) -> Result<usize> {
        self.rows
            .get(&(run, ls))
            .copied()
            .ok_or(HistStructError::Lookup {
                run,
                ls,
                matches: 0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_unique_row() {
        let index = SampleIndex::new(vec![1, 1, 1], vec![10, 11, 12]).unwrap();
        assert_eq!(index.index_of(1, 11).unwrap(), 1);
        assert!(matches!(
            index.index_of(9, 9),
            Err(HistStructError::Lookup { matches: 0, .. })
        ));
    }

    #[test]
    fn duplicated_coordinates_are_rejected() {
        assert!(matches!(
            SampleIndex::new(vec![1, 2, 1], vec![5, 5, 5]),
            Err(HistStructError::DuplicateCoordinate { run: 1, ls: 5 })
        ));
    }

    #[test]
    fn coordinate_lengths_must_agree() {
        assert!(matches!(
            SampleIndex::new(vec![1, 2], vec![5]),
            Err(HistStructError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn matches_is_order_sensitive() {
        let index = SampleIndex::new(vec![1, 2], vec![5, 6]).unwrap();
        assert!(index.matches(&[1, 2], &[5, 6]));
        assert!(!index.matches(&[2, 1], &[6, 5]));
    }
}
