use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use crate::{
    Result,
    config::{Settings, TransportKind},
    notifier::{BroadcastTransport, ChangeNotifier, FileTransport, InProcessTransport, Subscription},
};

use super::{DatabaseConfig, DatabaseHandle, DurableStore, StoreError};

/// The settings blob as stored: any JSON value.
pub type ConfigRecord = serde_json::Value;

/// One execution context's view of the shared config record.
///
/// Reads go straight to the durable store. Writes go through it and, once
/// committed, signal every subscriber in every context sharing the data
/// directory. Clones share the same context.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    durable: DurableStore,
    notifier: ChangeNotifier,
}

impl ConfigStore {
    /// Creates a context from an explicit database and notifier.
    ///
    /// Nothing is opened until the first operation.
    pub fn new(database: DatabaseConfig, notifier: ChangeNotifier) -> Self {
        Self {
            durable: DurableStore::new(database),
            notifier,
        }
    }

    /// Creates a context from loaded settings.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be resolved.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let database = settings.database_config()?;

        let transport: Option<Arc<dyn BroadcastTransport>> = match settings.notifier.transport {
            TransportKind::File => Some(Arc::new(FileTransport::new(settings.channel_dir()?))),
            TransportKind::InProcess => Some(Arc::new(InProcessTransport::shared())),
            TransportKind::Disabled => None,
        };

        let notifier = ChangeNotifier::new(settings.notifier.channel.clone(), transport);
        Ok(Self::new(database, notifier))
    }

    /// The database this context uses.
    pub fn database(&self) -> &DatabaseConfig {
        self.durable.config()
    }

    /// The notifier this context signals through.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Opens the database, running the schema setup if the declared version
    /// is newer than the on-disk one.
    ///
    /// # Errors
    /// Returns `StoreError::StoreUnavailable` if the database cannot be opened.
    pub async fn open(&self) -> std::result::Result<DatabaseHandle, StoreError> {
        self.durable.open().await
    }

    /// Reads the stored record, `None` if nothing is stored.
    ///
    /// # Errors
    /// * `StoreError::StoreUnavailable` - If the database cannot be opened
    /// * `StoreError::ReadError` - If the read transaction fails or the record does not decode as `T`
    #[instrument(skip(self), fields(key = %self.database().record_key))]
    pub async fn get_config<T>(&self) -> std::result::Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.durable.get().await
    }

    /// Stores `payload`, replacing any previous record, then notifies.
    ///
    /// Handlers subscribed in this context have run by the time this returns.
    /// On failure nothing is notified and the previous record is untouched.
    ///
    /// # Errors
    /// * `StoreError::StoreUnavailable` - If the database cannot be opened
    /// * `StoreError::WriteError` - If encoding or the write transaction fails
    #[instrument(skip(self, payload), fields(key = %self.database().record_key))]
    pub async fn save_config<T>(&self, payload: T) -> std::result::Result<(), StoreError>
    where
        T: Serialize + Send + 'static,
    {
        self.durable.put(payload).await?;
        debug!("Config saved");

        self.notifier.notify().await;
        Ok(())
    }

    /// Removes the stored record, then notifies.
    ///
    /// # Errors
    /// * `StoreError::StoreUnavailable` - If the database cannot be opened
    /// * `StoreError::WriteError` - If the write transaction fails
    #[instrument(skip(self), fields(key = %self.database().record_key))]
    pub async fn clear_config(&self) -> std::result::Result<(), StoreError> {
        self.durable.delete().await?;
        debug!("Config cleared");

        self.notifier.notify().await;
        Ok(())
    }

    /// Calls `handler` whenever the record may have changed, in this context
    /// or any other. The handler receives nothing; it should re-read.
    pub fn subscribe_config<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.notifier.subscribe(Arc::new(handler))
    }

    /// Re-reads the record after every change signal.
    ///
    /// Yields the current record once up front, then again after each signal.
    /// Dropping the stream unsubscribes.
    pub fn watch<T>(&self) -> impl Stream<Item = std::result::Result<Option<T>, StoreError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let store = self.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = self.subscribe_config(move || {
            let _ = tx.send(());
        });

        stream! {
            let _subscription = subscription;

            yield store.get_config::<T>().await;

            while rx.recv().await.is_some() {
                // Coalesce signals that arrived while the last read ran.
                while rx.try_recv().is_ok() {}

                yield store.get_config::<T>().await;
            }
        }
    }
}
