use std::{
    collections::HashMap,
    sync::{
        Arc, LazyLock, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use tracing::trace;

use super::{BroadcastChannel, BroadcastTransport, ChangeMessage, MessageListener, NotifyError};

static SHARED: LazyLock<InProcessTransport> = LazyLock::new(InProcessTransport::new);

/// Listener registered by one channel object
struct Endpoint {
    id: usize,
    listener: MessageListener,
}

#[derive(Default)]
struct Hub {
    channels: Mutex<HashMap<String, Vec<Endpoint>>>,
    next_id: AtomicUsize,
}

/// Broadcast transport connecting contexts that live in the same process.
///
/// Delivery is synchronous: `post` returns after every other listening
/// channel with the same name has run its listener.
#[derive(Clone, Default)]
pub struct InProcessTransport {
    hub: Arc<Hub>,
}

impl InProcessTransport {
    /// Creates an isolated hub. Only channels opened through clones of this
    /// value can reach each other.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide hub used when settings select the in-process transport.
    pub fn shared() -> Self {
        SHARED.clone()
    }

    /// Number of channels currently listening on `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.hub
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(0, Vec::len)
    }
}

impl BroadcastTransport for InProcessTransport {
    fn open(&self, name: &str) -> Result<Box<dyn BroadcastChannel>, NotifyError> {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(InProcessChannel {
            id,
            name: name.to_string(),
            hub: Arc::clone(&self.hub),
            closed: false,
        }))
    }
}

struct InProcessChannel {
    id: usize,
    name: String,
    hub: Arc<Hub>,
    closed: bool,
}

impl BroadcastChannel for InProcessChannel {
    fn post(&self, message: &ChangeMessage) -> Result<(), NotifyError> {
        if self.closed {
            return Err(NotifyError::Closed {
                name: self.name.clone(),
            });
        }

        // Listeners run outside the lock so they may open or close channels.
        let listeners: Vec<MessageListener> = self
            .hub
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.name)
            .map(|endpoints| {
                endpoints
                    .iter()
                    .filter(|endpoint| endpoint.id != self.id)
                    .map(|endpoint| Arc::clone(&endpoint.listener))
                    .collect()
            })
            .unwrap_or_default();

        trace!(channel = %self.name, receivers = listeners.len(), "Posting in-process message");

        for listener in listeners {
            listener(message);
        }

        Ok(())
    }

    fn listen(&mut self, listener: MessageListener) -> Result<(), NotifyError> {
        if self.closed {
            return Err(NotifyError::Closed {
                name: self.name.clone(),
            });
        }

        let mut channels = self
            .hub
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let endpoints = channels.entry(self.name.clone()).or_default();

        endpoints.retain(|endpoint| endpoint.id != self.id);
        endpoints.push(Endpoint {
            id: self.id,
            listener,
        });

        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut channels = self
            .hub
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(endpoints) = channels.get_mut(&self.name) {
            endpoints.retain(|endpoint| endpoint.id != self.id);
            if endpoints.is_empty() {
                channels.remove(&self.name);
            }
        }
    }
}

impl Drop for InProcessChannel {
    fn drop(&mut self) {
        self.close();
    }
}
