use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{HistStructError, Result};

// ---------------------------------------------------------------------------
// LumiSelection: which lumisections are selected per run
// ---------------------------------------------------------------------------

/// A run → lumisection-ranges selection in the standard certification JSON
/// format:
///
/// ```json
/// { "315257": [[1, 88], [91, 92]], "315259": [[1, 172]] }
/// ```
///
/// Ranges are inclusive at both ends. A run absent from the map selects nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<[i64; 2]>>", into = "BTreeMap<String, Vec<[i64; 2]>>")]
pub struct LumiSelection {
    ranges: BTreeMap<i64, Vec<(i64, i64)>>,
}

impl TryFrom<BTreeMap<String, Vec<[i64; 2]>>> for LumiSelection {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Vec<[i64; 2]>>) -> std::result::Result<Self, Self::Error> {
        let mut ranges = BTreeMap::new();
        for (run, pairs) in raw {
            let run: i64 = run
                .trim()
                .parse()
                .map_err(|_| format!("run key '{run}' is not an integer"))?;
            let pairs = pairs
                .into_iter()
                .map(|[first, last]| {
                    if first > last {
                        Err(format!("run {run}: range [{first}, {last}] is reversed"))
                    } else {
                        Ok((first, last))
                    }
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ranges.insert(run, pairs);
        }
        Ok(LumiSelection { ranges })
    }
}

impl From<LumiSelection> for BTreeMap<String, Vec<[i64; 2]>> {
    fn from(sel: LumiSelection) -> Self {
        sel.ranges
            .into_iter()
            .map(|(run, pairs)| {
                (
                    run.to_string(),
                    pairs.into_iter().map(|(a, b)| [a, b]).collect(),
                )
            })
            .collect()
    }
}

impl LumiSelection {
    /// Parse a selection from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| HistStructError::Selection(e.to_string()))
    }

    /// Read a selection from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Add an inclusive lumisection range for `run`.
    pub fn insert_range(&mut self, run: i64, first: i64, last: i64) {
        self.ranges.entry(run).or_default().push((first, last));
    }

    /// Whether the lumisection `ls` of `run` is selected.
    pub fn contains(&self, run: i64, ls: i64) -> bool {
        self.ranges
            .get(&run)
            .is_some_and(|pairs| pairs.iter().any(|&(first, last)| first <= ls && ls <= last))
    }

    /// Selected runs in ascending order.
    pub fn runs(&self) -> impl Iterator<Item = i64> + '_ {
        self.ranges.keys().copied()
    }
}

/// Return a mask telling, per row, whether (run, lumisection) is selected.
pub fn in_selection(run_ids: &[i64], ls_ids: &[i64], selection: &LumiSelection) -> Result<Vec<bool>> {
    if run_ids.len() != ls_ids.len() {
        return Err(HistStructError::length_mismatch(
            "lumisection numbers",
            run_ids.len(),
            ls_ids.len(),
        ));
    }
    Ok(run_ids
        .iter()
        .zip(ls_ids)
        .map(|(&run, &ls)| selection.contains(run, ls))
        .collect())
}

// ---------------------------------------------------------------------------
// Standard certification selections
// ---------------------------------------------------------------------------

/// The two standard certification selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Certification {
    /// Lumisections flagged good by every subsystem.
    Golden,
    /// Lumisections recorded with all detector components powered on.
    DcsOn,
}

impl Certification {
    /// Load the selection file this certification points to.
    pub fn load(self, config: &Config) -> Result<LumiSelection> {
        let path = match self {
            Certification::Golden => &config.golden_json,
            Certification::DcsOn => &config.dcson_json,
        };
        log::debug!("loading {self:?} selection from {}", path.display());
        LumiSelection::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_certification_json() {
        let sel = LumiSelection::from_json_str(r#"{"315257": [[1, 3], [7, 7]], "315259": [[2, 2]]}"#).unwrap();
        assert!(sel.contains(315257, 1));
        assert!(sel.contains(315257, 3));
        assert!(!sel.contains(315257, 4));
        assert!(sel.contains(315257, 7));
        assert!(!sel.contains(315258, 1));
        assert_eq!(sel.runs().collect::<Vec<_>>(), vec![315257, 315259]);
    }

    #[test]
    fn rejects_malformed_selection() {
        assert!(LumiSelection::from_json_str(r#"{"abc": [[1, 2]]}"#).is_err());
        assert!(LumiSelection::from_json_str(r#"{"1": [[5, 2]]}"#).is_err());
    }

    #[test]
    fn mask_over_coordinates() {
        let mut sel = LumiSelection::default();
        sel.insert_range(1, 10, 11);
        let mask = in_selection(&[1, 1, 1, 2], &[10, 11, 12, 10], &sel).unwrap();
        assert_eq!(mask, vec![true, true, false, false]);
        assert!(in_selection(&[1], &[], &sel).is_err());
    }

    #[test]
    fn certification_resolves_through_config() {
        let mut golden = tempfile::NamedTempFile::new().unwrap();
        write!(golden, r#"{{"5": [[1, 2]]}}"#).unwrap();
        golden.flush().unwrap();
        let config = Config {
            golden_json: golden.path().to_path_buf(),
            ..Config::default()
        };
        let sel = Certification::Golden.load(&config).unwrap();
        assert!(sel.contains(5, 2));
        assert!(Certification::DcsOn.load(&config).is_err());
    }
}
