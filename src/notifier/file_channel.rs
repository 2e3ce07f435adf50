use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{BroadcastChannel, BroadcastTransport, ChangeMessage, MessageListener, NotifyError};

const CHANNEL_EXTENSION: &str = "channel";

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// What a channel file holds: the last message and which channel posted it.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    origin: String,
    message: ChangeMessage,
}

/// Cross-process broadcast transport built on channel files.
///
/// Every context pointing at the same directory shares the channels in it.
/// Posting atomically replaces `<dir>/<name>.channel`; listening watches the
/// directory and reads each replacement once.
#[derive(Debug, Clone)]
pub struct FileTransport {
    dir: PathBuf,
}

impl FileTransport {
    /// Creates a transport rooted at `dir`. The directory is created on first open.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the channel files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BroadcastTransport for FileTransport {
    fn open(&self, name: &str) -> Result<Box<dyn BroadcastChannel>, NotifyError> {
        fs::create_dir_all(&self.dir).map_err(|e| NotifyError::Unavailable {
            details: format!("cannot create channel directory {}: {e}", self.dir.display()),
        })?;

        let origin = format!(
            "{}-{}",
            std::process::id(),
            NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed)
        );

        Ok(Box::new(FileChannel {
            name: name.to_string(),
            dir: self.dir.clone(),
            path: self.dir.join(format!("{name}.{CHANNEL_EXTENSION}")),
            origin,
            watcher: None,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

struct FileChannel {
    name: String,
    dir: PathBuf,
    path: PathBuf,
    origin: String,
    watcher: Option<RecommendedWatcher>,
    /// Shared with the watcher callback, which may still be running after
    /// the watcher is dropped.
    closed: Arc<AtomicBool>,
}

impl FileChannel {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn io_error(&self, error: impl std::fmt::Display) -> NotifyError {
        NotifyError::Io {
            path: self.path.clone(),
            details: error.to_string(),
        }
    }
}

impl BroadcastChannel for FileChannel {
    fn post(&self, message: &ChangeMessage) -> Result<(), NotifyError> {
        if self.is_closed() {
            return Err(NotifyError::Closed {
                name: self.name.clone(),
            });
        }

        let envelope = Envelope {
            origin: self.origin.clone(),
            message: *message,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| NotifyError::Encoding {
            details: e.to_string(),
        })?;

        // Written beside the target, then renamed over it, so readers never
        // see a partial envelope.
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", self.name, self.origin));
        fs::write(&staging, bytes).map_err(|e| self.io_error(e))?;
        fs::rename(&staging, &self.path).map_err(|e| {
            let _ = fs::remove_file(&staging);
            self.io_error(e)
        })?;

        trace!(channel = %self.name, origin = %self.origin, "Posted channel file");
        Ok(())
    }

    fn listen(&mut self, listener: MessageListener) -> Result<(), NotifyError> {
        if self.is_closed() {
            return Err(NotifyError::Closed {
                name: self.name.clone(),
            });
        }

        let path = self.path.clone();
        let own_origin = self.origin.clone();
        let closed = Arc::clone(&self.closed);
        let last_seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else {
                return;
            };

            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }

            if !event.paths.iter().any(|p| p.file_name() == path.file_name()) {
                return;
            }

            let Some(envelope) = read_envelope(&path) else {
                return;
            };

            if envelope.origin == own_origin {
                return;
            }

            {
                let mut last = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
                if last.as_deref() == Some(envelope.origin.as_str()) {
                    return;
                }
                *last = Some(envelope.origin);
            }

            if closed.load(Ordering::SeqCst) {
                return;
            }

            listener(&envelope.message);
        })
        .map_err(|e| self.io_error(e))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| self.io_error(e))?;

        debug!(channel = %self.name, dir = %self.dir.display(), "Listening on channel file");
        self.watcher = Some(watcher);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.watcher = None;
    }
}

/// Reads the current envelope, ignoring files that vanished or hold
/// something unreadable.
fn read_envelope(path: &Path) -> Option<Envelope> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            trace!(path = %path.display(), error = %e, "Ignoring unreadable channel file");
            None
        }
    }
}
