//! Command-line interface for the config store.
//!
//! Thin front end over [`ConfigStore`](crate::config_store::ConfigStore):
//! one command per store operation plus `watch` and `info`.

pub mod formatting;
mod service;
mod types;


pub use service::CliService;
pub use types::{Cli, CliError, CommandResult, Commands};
