use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use tracing::trace;

/// Zero-argument change handler.
pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// Identifies a listener registered on a [`LocalDispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

struct Registered {
    id: ListenerId,
    handler: ChangeHandler,
}

struct Inner {
    event: String,
    listeners: Mutex<Vec<Registered>>,
    next_id: AtomicUsize,
}

/// Same-context event dispatcher.
///
/// Plays the role of a custom event on the context's own event target:
/// `dispatch` runs every registered handler synchronously on the caller's
/// thread. Clones share the same registry.
#[derive(Clone)]
pub struct LocalDispatcher {
    inner: Arc<Inner>,
}

impl LocalDispatcher {
    /// Creates an empty dispatcher for the event named `event`.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                event: event.into(),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(1),
            }),
        }
    }

    /// Name of the dispatched event.
    pub fn event(&self) -> &str {
        &self.inner.event
    }

    /// Registers `handler` and returns its id.
    pub fn add(&self, handler: ChangeHandler) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Registered { id, handler });
        id
    }

    /// Removes the listener with `id`. Returns whether it was registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|registered| registered.id != id);
        listeners.len() != before
    }

    /// Runs every registered handler once.
    ///
    /// Handlers are snapshotted first, so a handler may add or remove
    /// listeners while the dispatch is running.
    pub fn dispatch(&self) {
        let handlers: Vec<ChangeHandler> = self
            .lock()
            .iter()
            .map(|registered| Arc::clone(&registered.handler))
            .collect();

        trace!(event = %self.inner.event, listeners = handlers.len(), "Dispatching local event");

        for handler in handlers {
            handler();
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registered>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
