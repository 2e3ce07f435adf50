use std::{
    env,
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
};

const APP_DIR: &str = "hlp";

/// Utility struct for locating settings, data and log directories
///
/// Follows the XDG Base Directory specification
pub struct ConfigPaths;

impl ConfigPaths {
    /// Returns the settings directory path
    ///
    /// - First checks `XDG_CONFIG_HOME`
    /// - Falls back to `$HOME/.config`
    /// - Appends "hlp" to the base config directory
    ///
    /// # Errors
    /// Returns an error if neither `XDG_CONFIG_HOME` nor `HOME` environment variables are set
    pub fn config_dir() -> Result<PathBuf, Error> {
        let config_home = env::var("XDG_CONFIG_HOME")
            .or_else(|_| env::var("HOME").map(|home| format!("{home}/.config")))
            .map_err(|_| {
                Error::new(
                    ErrorKind::NotFound,
                    "Neither XDG_CONFIG_HOME nor HOME environment variable found",
                )
            })?;

        Ok(PathBuf::from(config_home).join(APP_DIR))
    }

    /// Returns the default directory shared by every context: the database
    /// file and the broadcast channel files live here.
    ///
    /// - First checks `XDG_DATA_HOME/hlp`
    /// - Falls back to `$HOME/.local/share/hlp`
    ///
    /// Settings may point elsewhere; see `Settings::data_dir`.
    ///
    /// # Errors
    /// Returns an error if neither `XDG_DATA_HOME` nor `HOME` is set
    pub fn data_dir() -> Result<PathBuf, Error> {
        let data_home = env::var("XDG_DATA_HOME")
            .or_else(|_| env::var("HOME").map(|home| format!("{home}/.local/share")))
            .map_err(|_| {
                Error::new(
                    ErrorKind::NotFound,
                    "Neither XDG_DATA_HOME nor HOME environment variable found",
                )
            })?;

        Ok(PathBuf::from(data_home).join(APP_DIR))
    }

    /// Get the log directory under `data_dir`
    ///
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    pub fn log_dir(data_dir: &Path) -> Result<PathBuf, Error> {
        let log_dir = data_dir.join("logs");

        if !log_dir.exists() {
            std::fs::create_dir_all(&log_dir)?;
        }

        Ok(log_dir)
    }

    /// Returns the path to the settings file
    ///
    /// # Errors
    /// Returns an error if the settings directory cannot be determined
    pub fn main_config() -> Result<PathBuf, Error> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}
