use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Corpus or cache source missing or corrupt at load time.
    #[error("{what} unavailable: {reason}")]
    DataUnavailable { what: String, reason: String },
    /// Writing the query cache back to storage failed.
    #[error("failed to persist {path:?}: {reason}")]
    PersistenceFailure { path: PathBuf, reason: String },
    #[error("document index {index} out of range for corpus of {count}")]
    IndexOutOfRange { index: usize, count: usize },
}

impl Error {
    pub(crate) fn unavailable(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataUnavailable { what: what.into(), reason: reason.to_string() }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::PersistenceFailure { path: path.into(), reason: reason.to_string() }
    }
}
