use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config_store::StoreError;

/// Errors that can occur during CLI command execution.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid arguments were provided to a command.
    ///
    /// Returned when the record given to `save` is not valid JSON.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The config store rejected the operation.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// A general service error occurred, such as the shutdown signal
    /// handler failing to install.
    #[error("Service error: {0}")]
    ServiceError(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Type alias for command execution results.
///
/// Success carries the text to print.
pub type CommandResult = Result<String, CliError>;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "hlp-config")]
#[command(about = "Read, write and watch the shared config record")]
pub struct Cli {
    /// Settings file to load instead of the default location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory shared by every context, overriding settings.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the stored record as JSON, or `null` when nothing is stored.
    Get,

    /// Store a record, replacing the current one.
    Save {
        /// Record as a JSON document.
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        json: Option<String>,

        /// Read the record from a JSON file instead.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Remove the stored record.
    Clear,

    /// Print the record every time any context changes it, until Ctrl+C.
    Watch,

    /// Show where the record lives and how changes are broadcast.
    Info,
}
