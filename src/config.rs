use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable overriding [`Config::golden_json`].
pub const GOLDEN_JSON_ENV: &str = "HISTSTRUCT_GOLDEN_JSON";
/// Environment variable overriding [`Config::dcson_json`].
pub const DCSON_JSON_ENV: &str = "HISTSTRUCT_DCSON_JSON";
/// Environment variable overriding [`Config::min_entries_per_bin`].
pub const MIN_ENTRIES_ENV: &str = "HISTSTRUCT_MIN_ENTRIES_PER_BIN";

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Locations of the certification selections and default thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Selection of lumisections certified good by all subsystems.
    pub golden_json: PathBuf,
    /// Selection of lumisections with all detector components on.
    pub dcson_json: PathBuf,
    /// Default entries-per-bin threshold of the statistics mask.
    pub min_entries_per_bin: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            golden_json: PathBuf::from("json/golden.json"),
            dcson_json: PathBuf::from("json/dcson.json"),
            min_entries_per_bin: 100.0,
        }
    }
}

impl Config {
    /// Read a configuration from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults overridden by the `HISTSTRUCT_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(GOLDEN_JSON_ENV) {
            self.golden_json = PathBuf::from(path);
        }
        if let Some(path) = lookup(DCSON_JSON_ENV) {
            self.dcson_json = PathBuf::from(path);
        }
        if let Some(value) = lookup(MIN_ENTRIES_ENV) {
            match value.parse() {
                Ok(threshold) => self.min_entries_per_bin = threshold,
                Err(_) => log::warn!("ignoring {MIN_ENTRIES_ENV}={value}: not a number"),
            }
        }
        self
    }
}
