//! hlp-config - a single config record shared by every context on a machine.
//!
//! The record lives in a versioned local database. Every committed write
//! signals all subscribed contexts, which re-read the record themselves:
//!
//! - Durable store with all-or-nothing get/save/clear
//! - Change notifier with a cross-context and a same-context path
//! - Degrades to same-context notification when no broadcast transport exists
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hlp_config::{config_store::ConfigStore, config::Settings};
//!
//! # async fn run() -> hlp_config::Result<()> {
//! let store = ConfigStore::from_settings(&Settings::load()?)?;
//!
//! let _subscription = store.subscribe_config(|| println!("config changed"));
//!
//! store.save_config(serde_json::json!({"volume": 0.5, "theme": "dark"})).await?;
//! let current: Option<serde_json::Value> = store.get_config().await?;
//! println!("{current:?}");
//! # Ok(())
//! # }
//! ```

/// Settings for database naming, notification transport and logging.
pub mod config;

/// Core error types and result aliases.
pub mod core;

/// Durable config record storage.
pub mod config_store;

/// Change notification across and within contexts.
pub mod notifier;

/// Command-line interface over the config store.
pub mod cli;

/// Tracing subscriber setup.
pub mod tracing_config;

/// Re-exported core types for convenience.
pub use core::{HlpError, Result};
