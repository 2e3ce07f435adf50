//! Durable, versioned storage of the single config record.
//!
//! [`ConfigStore`] is the entry point: it reads and writes the record
//! through a `redb` database and signals subscribers after every committed
//! write.

mod database;
mod durable;
mod error;
mod store;

#[cfg(test)]
mod tests;

pub use database::{DatabaseConfig, DatabaseHandle, open};
pub use durable::DurableStore;
pub use error::StoreError;
pub use store::{ConfigRecord, ConfigStore};
