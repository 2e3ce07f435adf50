use std::path::Path;

use thiserror::Error;

use crate::config_store::StoreError;

/// Top-level error for settings loading and store construction.
#[derive(Error, Debug)]
pub enum HlpError {
    /// Settings failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid TOML.
    #[error("{0}")]
    TomlParse(String),

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias using [`HlpError`].
pub type Result<T> = std::result::Result<T, HlpError>;

impl HlpError {
    /// Wraps a TOML error, naming the file when known.
    pub fn toml_parse(error: impl std::fmt::Display, path: Option<&Path>) -> Self {
        match path {
            Some(p) => {
                let clean_path = p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
                HlpError::TomlParse(format!(
                    "Failed to parse TOML at {:?}: {}",
                    clean_path, error
                ))
            }
            None => HlpError::TomlParse(format!("Failed to parse TOML: {}", error)),
        }
    }

    /// Settings validation failure.
    pub fn config(details: impl Into<String>) -> Self {
        HlpError::Config(details.into())
    }
}
