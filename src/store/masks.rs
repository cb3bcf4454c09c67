use super::HistStruct;
use crate::config::Config;
use crate::data::selection::{in_selection, Certification, LumiSelection};
use crate::error::{HistStructError, Result};

// ---------------------------------------------------------------------------
// Mask registry
// ---------------------------------------------------------------------------

impl HistStruct {
    /// Register a named row selection. `mask` must have one value per row,
    /// so at least one histogram type must be registered first.
    pub fn add_mask(&mut self, name: &str, mask: &[bool]) -> Result<()> {
        if self.masks.contains_key(name) {
            return Err(HistStructError::DuplicateMask(name.to_string()));
        }
        if self.type_names.is_empty() {
            return Err(HistStructError::NoRows(name.to_string()));
        }
        if mask.len() != self.len() {
            return Err(HistStructError::length_mismatch(
                format!("mask '{name}'"),
                self.len(),
                mask.len(),
            ));
        }
        let selected = mask.iter().filter(|&&keep| keep).count();
        log::info!("added mask '{name}' selecting {selected} of {} rows", self.len());
        self.masks.insert(name.to_string(), mask.to_vec());
        Ok(())
    }

    /// Remove a mask. Removing an unknown mask only logs a warning.
    pub fn remove_mask(&mut self, name: &str) {
        if self.masks.remove(name).is_none() {
            log::warn!("cannot remove mask '{name}': no such mask");
        }
    }

    /// Registered mask names, sorted.
    pub fn mask_names(&self) -> Vec<String> {
        self.masks.keys().cloned().collect()
    }

    pub fn get_mask(&self, name: &str) -> Result<&[bool]> {
        self.masks
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| HistStructError::UnknownMask(name.to_string()))
    }

    /// Row-wise AND of the named masks; all rows pass when `names` is empty.
    pub fn combine_masks(&self, names: &[&str]) -> Result<Vec<bool>> {
        let mut combined = vec![true; self.len()];
        for name in names {
            let mask = self.get_mask(name)?;
            for (out, &keep) in combined.iter_mut().zip(mask) {
                *out &= keep;
            }
        }
        Ok(combined)
    }

    // -----------------------------------------------------------------------
    // Derived masks
    // -----------------------------------------------------------------------

    /// Mask of the rows whose (run, lumisection) lies in `selection`.
    pub fn add_selection_mask(&mut self, name: &str, selection: &LumiSelection) -> Result<()> {
        let mask = in_selection(self.index.run_ids(), self.index.ls_ids(), selection)?;
        self.add_mask(name, &mask)
    }

    /// Mask from one of the standard certification selections.
    pub fn add_certification_mask(&mut self, name: &str, certification: Certification, config: &Config) -> Result<()> {
        if self.masks.contains_key(name) {
            return Err(HistStructError::DuplicateMask(name.to_string()));
        }
        let selection = certification.load(config)?;
        self.add_selection_mask(name, &selection)
    }

    /// Mask of the rows where every listed type has more than
    /// `ratio_threshold` entries per bin. `type_names` defaults to all types.
    pub fn add_statistics_mask(&mut self, name: &str, type_names: Option<&[&str]>, ratio_threshold: f64) -> Result<()> {
        let names: Vec<&str> = match type_names {
            Some(names) => names.to_vec(),
            None => self.type_names.iter().map(String::as_str).collect(),
        };
        let mut mask = vec![true; self.len()];
        for type_name in names {
            let nbins = self.bin_count(type_name)? as f64;
            let entries = &self.types[type_name].entries;
            for (keep, &n) in mask.iter_mut().zip(entries.iter()) {
                *keep &= n / nbins > ratio_threshold;
            }
        }
        self.add_mask(name, &mask)
    }
}
