//! Settings for the config store itself.
//!
//! Names the database, schema version, collection and record key the
//! durable store uses, the broadcast channel the notifier uses, and how
//! logging is set up. All settings are serializable to/from TOML and
//! every field has a default matching the stock deployment.

mod loading;
mod log_level;
mod paths;


use std::{path::PathBuf, time::Duration};

pub use log_level::{LogFormat, LogLevel};
pub use paths::ConfigPaths;
use serde::{Deserialize, Serialize};

use crate::{HlpError, Result, config_store::DatabaseConfig};

/// Top-level settings structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Durable store location and schema.
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Change notification transport.
    #[serde(default)]
    pub notifier: NotifierSettings,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Database naming and versioning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database identifier; the file is `<data_dir>/<name>.redb`.
    pub name: String,

    /// Declared schema version. Raising it runs the schema setup on next open.
    pub version: u64,

    /// Name of the single collection holding the record.
    pub store: String,

    /// Fixed key the record is stored under.
    pub key: String,

    /// Directory holding the database and channel files.
    /// Falls back to [`ConfigPaths::data_dir`] when unset.
    pub data_dir: Option<PathBuf>,

    /// How long `open` waits for another process to release the database.
    pub open_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: String::from("hlp-db"),
            version: 1,
            store: String::from("config"),
            key: String::from("player"),
            data_dir: None,
            open_timeout_ms: 2_000,
        }
    }
}

/// Which broadcast transport carries cross-context signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Channel files in `<data_dir>/channels`, watched for changes.
    #[default]
    File,

    /// Contexts inside the current process only.
    InProcess,

    /// No broadcast primitive; same-context notification only.
    Disabled,
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifierSettings {
    /// Broadcast channel name shared by every context.
    pub channel: String,

    /// Transport used for the broadcast path.
    pub transport: TransportKind,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            channel: String::from("hlp-config"),
            transport: TransportKind::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: LogLevel,

    /// Console output format.
    pub format: LogFormat,

    /// Also write a daily-rotated log file under `<data_dir>/logs`.
    pub file: bool,
}

impl Settings {
    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    /// Returns `HlpError::Config` if a name is empty or the version is 0.
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;

        for (field, value) in [
            ("database.name", &db.name),
            ("database.store", &db.store),
            ("database.key", &db.key),
            ("notifier.channel", &self.notifier.channel),
        ] {
            if value.trim().is_empty() {
                return Err(HlpError::config(format!("{field} must not be empty")));
            }
        }

        if db.version == 0 {
            return Err(HlpError::config("database.version must be at least 1"));
        }

        Ok(())
    }

    /// Resolved data directory.
    ///
    /// # Errors
    /// Returns `HlpError::Io` if no data directory is configured and neither
    /// `XDG_DATA_HOME` nor `HOME` is set.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.database.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(ConfigPaths::data_dir()?),
        }
    }

    /// Directory holding broadcast channel files.
    ///
    /// # Errors
    /// Same as [`Settings::data_dir`].
    pub fn channel_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("channels"))
    }

    /// Builds the durable store configuration.
    ///
    /// # Errors
    /// Same as [`Settings::data_dir`].
    pub fn database_config(&self) -> Result<DatabaseConfig> {
        let db = &self.database;

        Ok(DatabaseConfig {
            name: db.name.clone(),
            version: db.version,
            store_name: db.store.clone(),
            record_key: db.key.clone(),
            data_dir: self.data_dir()?,
            open_timeout: Duration::from_millis(db.open_timeout_ms),
        })
    }
}
