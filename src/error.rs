use thiserror::Error;

/// Errors produced by the histogram store and its collaborators.
///
/// Every variant is raised by validation that runs before the store is
/// mutated, so a failed call leaves the structure exactly as it was.
#[derive(Error, Debug)]
pub enum HistStructError {
    #[error("histogram type '{0}' is already registered")]
    DuplicateType(String),

    #[error("mask '{0}' already exists")]
    DuplicateMask(String),

    /// Masks need the row count fixed by the first histogram type.
    #[error("mask '{0}' cannot be added before any histogram type is registered")]
    NoRows(String),

    /// The coordinates of a new type disagree with the sample index.
    #[error("run/lumisection numbers of '{0}' are not consistent with the sample index")]
    Alignment(String),

    #[error("{what} has length {found}, expected {expected}")]
    LengthMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("histogram type '{0}' is not registered")]
    UnknownType(String),

    #[error("mask '{0}' is not registered")]
    UnknownMask(String),

    #[error("no classifier is bound to histogram type '{0}'")]
    NoClassifier(String),

    #[error("scores for histogram type '{0}' were never computed")]
    NoScore(String),

    /// Zero or several rows match the requested coordinate.
    #[error("run {run}, lumisection {ls}: expected exactly one matching row, found {matches}")]
    Lookup { run: i64, ls: i64, matches: usize },

    #[error("run {run}, lumisection {ls} appears more than once")]
    DuplicateCoordinate { run: i64, ls: i64 },

    #[error("invalid histogram shape: {0}")]
    InvalidShape(String),

    #[error("classifier bound to '{0}' does not support reconstruction")]
    NoReconstruction(String),

    #[error("classifier for '{name}' failed: {reason}")]
    Classifier { name: String, reason: String },

    #[error("no {what} histograms provided for '{name}'")]
    MissingSeries { what: &'static str, name: String },

    #[error("invalid lumisection selection: {0}")]
    Selection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HistStructError {
    pub(crate) fn length_mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        HistStructError::LengthMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, HistStructError>;
