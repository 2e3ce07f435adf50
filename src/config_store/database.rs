use std::{
    cmp::Ordering,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, Mutex, PoisonError, Weak},
    time::Duration,
};

use redb::{Database, DatabaseError, ReadableTable, TableDefinition, TableError};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, trace};

use crate::config::DatabaseSettings;

use super::StoreError;

/// Schema metadata lives next to the record collection.
const SCHEMA_TABLE: TableDefinition<&str, u64> = TableDefinition::new("__schema");
const SCHEMA_VERSION_KEY: &str = "version";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One engine connection per database file for the whole process.
///
/// `redb` locks the file per connection, so every context in this process
/// shares the live connection while any of them holds a handle. The entry
/// dies with the last handle, which releases the file for other processes.
static OPEN_DATABASES: LazyLock<Mutex<HashMap<PathBuf, Weak<Database>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Identifies the database and the single record it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Database identifier; the file is `<data_dir>/<name>.redb`.
    pub name: String,
    /// Declared schema version.
    pub version: u64,
    /// Name of the collection holding the record.
    pub store_name: String,
    /// Fixed key of the record.
    pub record_key: String,
    /// Directory shared by every context.
    pub data_dir: PathBuf,
    /// How long to wait for another process to release the file.
    pub open_timeout: Duration,
}

impl DatabaseConfig {
    /// Default naming and version rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let defaults = DatabaseSettings::default();

        Self {
            name: defaults.name,
            version: defaults.version,
            store_name: defaults.store,
            record_key: defaults.key,
            data_dir: data_dir.into(),
            open_timeout: Duration::from_millis(defaults.open_timeout_ms),
        }
    }

    /// Same configuration with a different declared schema version.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Location of the database file.
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.redb", self.name))
    }

    pub(crate) fn store_table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.store_name)
    }
}

/// An open database whose schema matches the declared version.
///
/// Cheap to clone. Dropping the last handle in the process closes the
/// engine connection.
#[derive(Clone)]
pub struct DatabaseHandle {
    db: Arc<Database>,
    config: Arc<DatabaseConfig>,
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("path", &self.config.path())
            .field("version", &self.config.version)
            .finish()
    }
}

impl DatabaseHandle {
    /// Schema version of the open database.
    pub fn version(&self) -> u64 {
        self.config.version
    }

    /// Location of the database file.
    pub fn path(&self) -> PathBuf {
        self.config.path()
    }

    /// Name of the record collection.
    pub fn store_name(&self) -> &str {
        &self.config.store_name
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn record_key(&self) -> &str {
        &self.config.record_key
    }

    pub(crate) fn store_table(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        self.config.store_table()
    }
}

/// Opens the database described by `config`, creating it if absent.
///
/// When the declared version is newer than the on-disk one the schema setup
/// runs once: the record collection is created if it does not exist and the
/// new version is recorded. If another process holds the file, waits up to
/// `open_timeout` for it to be released.
///
/// # Errors
/// Returns `StoreError::StoreUnavailable` if the data directory or file
/// cannot be created or opened, the file stays locked, the on-disk schema is
/// newer than `config.version`, or `config.version` is 0.
#[instrument(skip(config), fields(path = %config.path().display(), version = config.version))]
pub async fn open(config: &DatabaseConfig) -> Result<DatabaseHandle, StoreError> {
    if config.version == 0 {
        return Err(StoreError::unavailable(
            config.path(),
            "schema version must be at least 1",
        ));
    }

    let config = Arc::new(config.clone());
    let deadline = Instant::now() + config.open_timeout;

    loop {
        let attempt_config = Arc::clone(&config);
        let attempt = tokio::task::spawn_blocking(move || try_open(&attempt_config))
            .await
            .map_err(|e| StoreError::unavailable(config.path(), e))??;

        match attempt {
            Some(db) => return Ok(DatabaseHandle { db, config }),
            None if Instant::now() < deadline => {
                trace!("Database locked by another process, waiting");
                sleep(LOCK_POLL_INTERVAL).await;
            }
            None => {
                return Err(StoreError::unavailable(
                    config.path(),
                    format!(
                        "database is locked by another process (waited {}ms)",
                        config.open_timeout.as_millis()
                    ),
                ));
            }
        }
    }
}

fn try_open(config: &DatabaseConfig) -> Result<Option<Arc<Database>>, StoreError> {
    fs::create_dir_all(&config.data_dir).map_err(|e| {
        StoreError::unavailable(config.path(), format!("cannot create data directory: {e}"))
    })?;

    let data_dir = fs::canonicalize(&config.data_dir)
        .map_err(|e| StoreError::unavailable(config.path(), e))?;
    let path = data_dir.join(format!("{}.redb", config.name));

    let Some(db) = acquire(&path)? else {
        return Ok(None);
    };

    ensure_schema(&db, config, &path)?;
    Ok(Some(db))
}

fn acquire(path: &Path) -> Result<Option<Arc<Database>>, StoreError> {
    let mut open = OPEN_DATABASES
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(db) = open.get(path).and_then(Weak::upgrade) {
        return Ok(Some(db));
    }

    match Database::create(path) {
        Ok(db) => {
            debug!("Opened database {}", path.display());
            let db = Arc::new(db);
            open.retain(|_, existing| existing.strong_count() > 0);
            open.insert(path.to_path_buf(), Arc::downgrade(&db));
            Ok(Some(db))
        }
        Err(DatabaseError::DatabaseAlreadyOpen) => Ok(None),
        Err(e) => Err(StoreError::unavailable(path, e)),
    }
}

fn ensure_schema(db: &Database, config: &DatabaseConfig, path: &Path) -> Result<(), StoreError> {
    let on_disk = on_disk_version(db).map_err(|e| StoreError::unavailable(path, e))?;

    match on_disk.cmp(&config.version) {
        Ordering::Equal => Ok(()),
        Ordering::Greater => Err(version_conflict(path, on_disk, config.version)),
        Ordering::Less => {
            let found = run_schema_setup(db, config).map_err(|e| StoreError::unavailable(path, e))?;

            match found.cmp(&config.version) {
                Ordering::Less => {
                    info!(
                        from = found,
                        to = config.version,
                        store = %config.store_name,
                        "Upgraded database schema"
                    );
                    Ok(())
                }
                Ordering::Equal => Ok(()),
                Ordering::Greater => Err(version_conflict(path, found, config.version)),
            }
        }
    }
}

fn version_conflict(path: &Path, on_disk: u64, requested: u64) -> StoreError {
    StoreError::unavailable(
        path,
        format!("on-disk schema version {on_disk} is newer than requested version {requested}"),
    )
}

fn on_disk_version(db: &Database) -> Result<u64, redb::Error> {
    let txn = db.begin_read()?;

    let table = match txn.open_table(SCHEMA_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let version = table.get(SCHEMA_VERSION_KEY)?.map(|v| v.value()).unwrap_or(0);
    Ok(version)
}

/// Creates the record collection and records the version, in one write
/// transaction. Returns the version found before the setup ran; the setup
/// only writes when that version is older than the declared one, so racing
/// openers upgrade exactly once.
fn run_schema_setup(db: &Database, config: &DatabaseConfig) -> Result<u64, redb::Error> {
    let txn = db.begin_write()?;

    let found = {
        let mut schema = txn.open_table(SCHEMA_TABLE)?;
        let found = schema
            .get(SCHEMA_VERSION_KEY)?
            .map(|v| v.value())
            .unwrap_or(0);

        if found < config.version {
            txn.open_table(config.store_table())?;
            schema.insert(SCHEMA_VERSION_KEY, config.version)?;
        }

        found
    };

    txn.commit()?;
    Ok(found)
}
