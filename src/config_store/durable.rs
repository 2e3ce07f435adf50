use std::sync::Arc;

use redb::{ReadableTable, TableError, WriteTransaction};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{
    StoreError,
    database::{self, DatabaseConfig, DatabaseHandle},
};

/// Transactional access to the single config record.
///
/// Each operation opens the database, runs one transaction on the blocking
/// pool and releases the handle. Serialization between writers is left to
/// the engine: `redb` admits one write transaction at a time and the file
/// lock orders writers from different processes.
#[derive(Debug, Clone)]
pub struct DurableStore {
    config: Arc<DatabaseConfig>,
}

impl DurableStore {
    /// Creates a store for `config`. Nothing is opened until first use.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The database this store reads and writes.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Opens the database, running the schema setup if needed.
    ///
    /// # Errors
    /// Returns `StoreError::StoreUnavailable` if the database cannot be opened.
    pub async fn open(&self) -> Result<DatabaseHandle, StoreError> {
        database::open(&self.config).await
    }

    /// Reads and decodes the record. An absent record is `Ok(None)`.
    ///
    /// # Errors
    /// * `StoreError::StoreUnavailable` - If the database cannot be opened
    /// * `StoreError::ReadError` - If the transaction fails or the record does not decode as `T`
    pub async fn get<T>(&self) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let handle = self.open().await?;
        let key = self.config.record_key.clone();

        tokio::task::spawn_blocking(move || read_record(&handle))
            .await
            .map_err(|e| StoreError::read(&key, e))?
    }

    /// Encodes `payload` and upserts it under the record key.
    ///
    /// Encoding happens inside the write transaction; if it fails the
    /// transaction is aborted and the previous record stays as it was.
    ///
    /// # Errors
    /// * `StoreError::StoreUnavailable` - If the database cannot be opened
    /// * `StoreError::WriteError` - If encoding or the transaction fails
    pub async fn put<T>(&self, payload: T) -> Result<(), StoreError>
    where
        T: Serialize + Send + 'static,
    {
        let handle = self.open().await?;
        let key = self.config.record_key.clone();

        tokio::task::spawn_blocking(move || put_record(&handle, &payload))
            .await
            .map_err(|e| StoreError::write(&key, e))?
    }

    /// Deletes the record. Deleting an absent record succeeds.
    ///
    /// # Errors
    /// * `StoreError::StoreUnavailable` - If the database cannot be opened
    /// * `StoreError::WriteError` - If the transaction fails
    pub async fn delete(&self) -> Result<(), StoreError> {
        let handle = self.open().await?;
        let key = self.config.record_key.clone();

        tokio::task::spawn_blocking(move || delete_record(&handle))
            .await
            .map_err(|e| StoreError::write(&key, e))?
    }
}

fn read_record<T: DeserializeOwned>(handle: &DatabaseHandle) -> Result<Option<T>, StoreError> {
    let key = handle.record_key();
    let txn = handle
        .database()
        .begin_read()
        .map_err(|e| StoreError::read(key, e))?;

    let table = match txn.open_table(handle.store_table()) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(e) => return Err(StoreError::read(key, e)),
    };

    let Some(stored) = table.get(key).map_err(|e| StoreError::read(key, e))? else {
        debug!(key, "No stored record");
        return Ok(None);
    };

    let record = serde_json::from_slice(stored.value())
        .map_err(|e| StoreError::read(key, format!("stored record does not decode: {e}")))?;
    Ok(Some(record))
}

fn put_record<T: Serialize>(handle: &DatabaseHandle, payload: &T) -> Result<(), StoreError> {
    let key = handle.record_key();
    let txn = handle
        .database()
        .begin_write()
        .map_err(|e| StoreError::write(key, e))?;

    let staged = (|| -> Result<(), StoreError> {
        let mut table = txn
            .open_table(handle.store_table())
            .map_err(|e| StoreError::write(key, e))?;
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| StoreError::write(key, format!("record cannot be encoded: {e}")))?;
        table
            .insert(key, bytes.as_slice())
            .map_err(|e| StoreError::write(key, e))?;
        Ok(())
    })();

    finish(txn, key, staged)
}

fn delete_record(handle: &DatabaseHandle) -> Result<(), StoreError> {
    let key = handle.record_key();
    let txn = handle
        .database()
        .begin_write()
        .map_err(|e| StoreError::write(key, e))?;

    let staged = (|| -> Result<(), StoreError> {
        let mut table = txn
            .open_table(handle.store_table())
            .map_err(|e| StoreError::write(key, e))?;
        table.remove(key).map_err(|e| StoreError::write(key, e))?;
        Ok(())
    })();

    finish(txn, key, staged)
}

/// Commits when every staged step succeeded, aborts otherwise.
fn finish(
    txn: WriteTransaction,
    key: &str,
    staged: Result<(), StoreError>,
) -> Result<(), StoreError> {
    match staged {
        Ok(()) => txn.commit().map_err(|e| StoreError::write(key, e)),
        Err(e) => {
            if let Err(abort_err) = txn.abort() {
                warn!(key, error = %abort_err, "Failed to abort write transaction");
            }
            Err(e)
        }
    }
}
