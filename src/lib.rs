//! Consistent storage of many histogram types over the same
//! (run, lumisection) rows, with masks, classifiers and scores.
//!
//! ```no_run
//! use histstruct::{HistStruct, PrepareOptions};
//! use histstruct::data::loader::load_file;
//!
//! # fn main() -> anyhow::Result<()> {
//! let raw = load_file(std::path::Path::new("run297050.parquet"))?;
//! let mut hs = HistStruct::new();
//! hs.add_raw_table(&raw, &PrepareOptions::default())?;
//! hs.add_statistics_mask("highstat", None, 100.0)?;
//! let selected = hs.get_arrays(Some(&["highstat"][..]))?;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod figure;
pub mod store;

pub use classifier::{HistogramClassifier, Reconstruct};
pub use config::Config;
pub use data::prepare::PrepareOptions;
pub use error::{HistStructError, Result};
pub use store::HistStruct;
