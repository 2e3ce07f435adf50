use std::{fs, future::Future};

use futures::StreamExt;
use tracing::{info, instrument};

use crate::config_store::{ConfigRecord, ConfigStore};

use super::{
    CliError, CommandResult, Commands,
    formatting::{format_description, format_label, format_record},
};

/// Runs CLI commands against one config store context.
pub struct CliService {
    store: ConfigStore,
}

impl CliService {
    /// Creates a CLI service over `store`.
    pub fn new(store: ConfigStore) -> Self {
        Self { store }
    }

    /// Executes a one-shot command and returns the text to print.
    ///
    /// `watch` runs until Ctrl+C; use [`CliService::watch_until`] to stop it
    /// on another signal.
    ///
    /// # Errors
    /// * `CliError::InvalidArguments` - If a record to save is not valid JSON
    /// * `CliError::IoError` - If a record file cannot be read
    /// * `CliError::StoreError` - If the store operation fails
    /// * `CliError::ServiceError` - If the Ctrl+C handler cannot be installed
    #[instrument(skip(self))]
    pub async fn execute(&self, command: &Commands) -> CommandResult {
        match command {
            Commands::Get => self.get().await,
            Commands::Save { json, file } => {
                let raw = match (json, file) {
                    (Some(json), _) => json.clone(),
                    (None, Some(path)) => fs::read_to_string(path)?,
                    (None, None) => {
                        return Err(CliError::InvalidArguments(
                            "Expected a JSON record or --file for 'save'".to_string(),
                        ));
                    }
                };
                self.save(&raw).await
            }
            Commands::Clear => {
                self.store.clear_config().await?;
                Ok("Config cleared".to_string())
            }
            Commands::Watch => self.watch_until(tokio::signal::ctrl_c()).await,
            Commands::Info => self.info().await,
        }
    }

    /// Prints the record now and after every change until `shutdown` resolves.
    ///
    /// # Errors
    /// * `CliError::StoreError` - If a re-read fails
    /// * `CliError::ServiceError` - If `shutdown` resolves with an error
    pub async fn watch_until(
        &self,
        shutdown: impl Future<Output = std::io::Result<()>>,
    ) -> CommandResult {
        let stream = self.store.watch::<ConfigRecord>();
        futures::pin_mut!(stream);
        tokio::pin!(shutdown);

        info!(channel = %self.store.notifier().channel(), "Watching config");
        let mut updates = 0usize;

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    signal.map_err(|e| {
                        CliError::ServiceError(format!("Failed to wait for shutdown signal: {e}"))
                    })?;
                    break;
                }
                next = stream.next() => {
                    let Some(record) = next else {
                        break;
                    };
                    let record = record?;
                    println!(
                        "{} {}",
                        format_description(&chrono::Local::now().format("%H:%M:%S").to_string()),
                        format_record(record.as_ref())
                    );
                    updates += 1;
                }
            }
        }

        Ok(format!("Watch ended after {updates} update(s)"))
    }

    async fn get(&self) -> CommandResult {
        let record = self.store.get_config::<ConfigRecord>().await?;
        Ok(format_record(record.as_ref()))
    }

    async fn save(&self, raw: &str) -> CommandResult {
        let record: ConfigRecord = serde_json::from_str(raw)
            .map_err(|e| CliError::InvalidArguments(format!("Record is not valid JSON: {e}")))?;

        self.store.save_config(record).await?;
        Ok("Config saved".to_string())
    }

    async fn info(&self) -> CommandResult {
        let handle = self.store.open().await?;
        let database = self.store.database();
        let notifier = self.store.notifier();

        let broadcast = if notifier.is_degraded() {
            "same-context only"
        } else {
            "broadcast"
        };

        let lines = [
            ("database", handle.path().display().to_string()),
            ("schema version", handle.version().to_string()),
            ("store", handle.store_name().to_string()),
            ("key", database.record_key.clone()),
            ("channel", format!("{} ({broadcast})", notifier.channel())),
        ];

        Ok(lines
            .iter()
            .map(|(label, value)| format!("{}: {value}", format_label(label)))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
