use std::path::PathBuf;

/// Errors surfaced by the durable store operations.
///
/// Every variant means the operation left the stored record untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The database could not be opened: the directory or file is not
    /// accessible, another process kept it locked past the open timeout, or
    /// the on-disk schema is newer than the declared one.
    #[error("config store at '{path}' is unavailable: {details}")]
    StoreUnavailable {
        /// Database file that failed to open
        path: PathBuf,
        /// Why the open failed
        details: String,
    },

    /// A read-only transaction failed or the stored record could not be decoded.
    #[error("failed to read config record '{key}': {details}")]
    ReadError {
        /// Record key being read
        key: String,
        /// Engine or decoding error details
        details: String,
    },

    /// A read-write transaction aborted before commit.
    #[error("failed to write config record '{key}': {details}")]
    WriteError {
        /// Record key being written or deleted
        key: String,
        /// Engine or encoding error details
        details: String,
    },
}

impl StoreError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, details: impl ToString) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            details: details.to_string(),
        }
    }

    pub(crate) fn read(key: &str, details: impl ToString) -> Self {
        Self::ReadError {
            key: key.to_string(),
            details: details.to_string(),
        }
    }

    pub(crate) fn write(key: &str, details: impl ToString) -> Self {
        Self::WriteError {
            key: key.to_string(),
            details: details.to_string(),
        }
    }
}
