//! Unit tests for config_store module.
//! Each test works in its own temporary data directory.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::{fs, time::Duration};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use tempfile::TempDir;

use crate::config_store::{DatabaseConfig, DurableStore, StoreError, open};

/// A payload whose encoding always fails, aborting the write transaction.
struct Unencodable;

impl Serialize for Unencodable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("refusing to encode"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PlayerSettings {
    volume: f64,
    theme: String,
}

fn durable_in(temp: &TempDir) -> DurableStore {
    DurableStore::new(DatabaseConfig::new(temp.path()))
}

mod database {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DatabaseConfig::new("/data");

        assert_eq!(config.name, "hlp-db");
        assert_eq!(config.version, 1);
        assert_eq!(config.store_name, "config");
        assert_eq!(config.record_key, "player");
        assert_eq!(config.path(), std::path::PathBuf::from("/data/hlp-db.redb"));
    }

    #[tokio::test]
    async fn open_creates_database_lazily() {
        let temp = TempDir::new().unwrap();
        let data_dir = temp.path().join("nested/data");
        let config = DatabaseConfig::new(&data_dir);

        assert!(!config.path().exists());

        let handle = open(&config).await.unwrap();

        assert!(config.path().exists());
        assert_eq!(handle.version(), 1);
        assert_eq!(handle.store_name(), "config");
    }

    #[tokio::test]
    async fn repeated_opens_are_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);

        store.open().await.unwrap();
        store.put(json!({"volume": 1})).await.unwrap();
        store.open().await.unwrap();
        store.open().await.unwrap();

        let record: Option<serde_json::Value> = store.get().await.unwrap();
        assert_eq!(record, Some(json!({"volume": 1})));
    }

    #[tokio::test]
    async fn concurrent_handles_share_one_connection() {
        let temp = TempDir::new().unwrap();
        let config = DatabaseConfig::new(temp.path());

        let (first, second) = tokio::join!(open(&config), open(&config));

        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn upgrade_keeps_existing_record() {
        let temp = TempDir::new().unwrap();
        let v1 = DurableStore::new(DatabaseConfig::new(temp.path()));
        v1.put(json!({"theme": "dark"})).await.unwrap();

        let v2 = DurableStore::new(DatabaseConfig::new(temp.path()).with_version(2));
        let handle = v2.open().await.unwrap();
        assert_eq!(handle.version(), 2);
        drop(handle);

        let record: Option<serde_json::Value> = v2.get().await.unwrap();
        assert_eq!(record, Some(json!({"theme": "dark"})));
    }

    #[tokio::test]
    async fn older_declared_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        open(&DatabaseConfig::new(temp.path()).with_version(3))
            .await
            .unwrap();

        let err = open(&DatabaseConfig::new(temp.path()).with_version(2))
            .await
            .unwrap_err();

        match err {
            StoreError::StoreUnavailable { details, .. } => {
                assert!(details.contains("newer than requested"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn version_zero_is_rejected() {
        let temp = TempDir::new().unwrap();
        let err = open(&DatabaseConfig::new(temp.path()).with_version(0))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::StoreUnavailable { .. }));
        assert!(!DatabaseConfig::new(temp.path()).path().exists());
    }

    #[tokio::test]
    async fn unusable_data_dir_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let store = DurableStore::new(DatabaseConfig::new(blocker.join("data")));

        assert!(matches!(
            store.open().await,
            Err(StoreError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            store.get::<serde_json::Value>().await,
            Err(StoreError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            store.put(json!(1)).await,
            Err(StoreError::StoreUnavailable { .. })
        ));
        assert!(matches!(
            store.delete().await,
            Err(StoreError::StoreUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn file_locked_elsewhere_times_out() {
        let temp = TempDir::new().unwrap();
        let mut config = DatabaseConfig::new(temp.path());
        config.open_timeout = Duration::from_millis(100);

        // Stands in for another process holding the file.
        let foreign = redb::Database::create(config.path()).unwrap();

        let err = open(&config).await.unwrap_err();
        match err {
            StoreError::StoreUnavailable { details, .. } => {
                assert!(details.contains("locked"));
            }
            other => panic!("unexpected error: {other}"),
        }

        drop(foreign);
        assert!(open(&config).await.is_ok());
    }

    #[tokio::test]
    async fn open_waits_for_lock_release() {
        let temp = TempDir::new().unwrap();
        let mut config = DatabaseConfig::new(temp.path());
        config.open_timeout = Duration::from_secs(5);

        let foreign = redb::Database::create(config.path()).unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(foreign);
        });

        let handle = open(&config).await.unwrap();
        assert_eq!(handle.version(), 1);
        release.await.unwrap();
    }
}

mod durable {
    use super::*;

    #[tokio::test]
    async fn absent_record_reads_as_none() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);

        let record: Option<serde_json::Value> = store.get().await.unwrap();
        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);
        let settings = PlayerSettings {
            volume: 0.5,
            theme: "dark".to_string(),
        };

        store.put(settings.clone()).await.unwrap();

        assert_eq!(store.get::<PlayerSettings>().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn put_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);

        store.put(json!({"volume": 0.1})).await.unwrap();
        store.put(json!({"volume": 0.9})).await.unwrap();

        let record: Option<serde_json::Value> = store.get().await.unwrap();
        assert_eq!(record, Some(json!({"volume": 0.9})));
    }

    #[tokio::test]
    async fn record_of_wrong_shape_is_a_read_error() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);
        store.put(json!(["not", "settings"])).await.unwrap();

        let err = store.get::<PlayerSettings>().await.unwrap_err();
        assert!(matches!(err, StoreError::ReadError { ref key, .. } if key == "player"));
    }

    #[tokio::test]
    async fn failed_encoding_aborts_and_keeps_prior_record() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);
        store.put(json!({"theme": "light"})).await.unwrap();

        let err = store.put(Unencodable).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteError { .. }));
        assert!(err.to_string().contains("refusing to encode"));

        let record: Option<serde_json::Value> = store.get().await.unwrap();
        assert_eq!(record, Some(json!({"theme": "light"})));
    }

    #[tokio::test]
    async fn failed_first_write_leaves_store_empty() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);

        assert!(store.put(Unencodable).await.is_err());

        let record: Option<serde_json::Value> = store.get().await.unwrap();
        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_absence() {
        let temp = TempDir::new().unwrap();
        let store = durable_in(&temp);

        store.delete().await.unwrap();
        store.put(json!({"volume": 0.5})).await.unwrap();
        store.delete().await.unwrap();

        let record: Option<serde_json::Value> = store.get().await.unwrap();
        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn custom_names_are_isolated() {
        let temp = TempDir::new().unwrap();
        let player = durable_in(&temp);
        let mut other_config = DatabaseConfig::new(temp.path());
        other_config.record_key = "library".to_string();
        let library = DurableStore::new(other_config);

        player.put(json!("player")).await.unwrap();
        library.put(json!("library")).await.unwrap();

        assert_eq!(
            player.get::<serde_json::Value>().await.unwrap(),
            Some(json!("player"))
        );
        assert_eq!(
            library.get::<serde_json::Value>().await.unwrap(),
            Some(json!("library"))
        );
    }
}
