use std::{fs, path::Path, path::PathBuf};

use tracing::{debug, instrument, warn};

use super::{ConfigPaths, LogLevel, Settings, TransportKind};
use crate::{HlpError, Result};

impl Settings {
    /// Loads settings from the default settings file.
    ///
    /// A missing file is not an error; defaults are used. Environment
    /// overrides are applied afterwards and the result is validated.
    ///
    /// # Errors
    /// Returns an error if the settings directory cannot be determined, the
    /// file cannot be read or parsed, or validation fails.
    pub fn load() -> Result<Self> {
        let path = ConfigPaths::main_config()?;
        Self::load_from(&path)
    }

    /// Loads settings from a specific file, applying environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if validation fails.
    #[instrument]
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            debug!("Loading settings from {}", path.display());
            let content = fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| HlpError::toml_parse(e, Some(path)))?
        } else {
            debug!("No settings file at {}, using defaults", path.display());
            Self::default()
        };

        settings.apply_overrides(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from a TOML string without applying overrides.
    ///
    /// # Errors
    /// Returns `HlpError::TomlParse` on malformed input and `HlpError::Config`
    /// if validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| HlpError::toml_parse(e, None))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Applies `HLP_DATA_DIR`, `HLP_TRANSPORT` and `HLP_LOG_LEVEL` overrides
    /// looked up through `lookup`. Unrecognised values are ignored with a
    /// warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("HLP_DATA_DIR").filter(|d| !d.is_empty()) {
            self.database.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(transport) = lookup("HLP_TRANSPORT") {
            match transport.trim() {
                "file" => self.notifier.transport = TransportKind::File,
                "in-process" => self.notifier.transport = TransportKind::InProcess,
                "disabled" | "none" => self.notifier.transport = TransportKind::Disabled,
                other => warn!("Ignoring unknown HLP_TRANSPORT value '{other}'"),
            }
        }

        if let Some(level) = lookup("HLP_LOG_LEVEL") {
            match LogLevel::parse(&level) {
                Some(level) => self.logging.level = level,
                None => warn!("Ignoring unknown HLP_LOG_LEVEL value '{level}'"),
            }
        }
    }
}
