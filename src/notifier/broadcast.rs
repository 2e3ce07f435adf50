use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use super::{
    BroadcastChannel, BroadcastTransport, ChangeHandler, ChangeMessage, ListenerId,
    LocalDispatcher, MessageListener, gate::DeliveryGate,
};

/// Default name of the same-context event.
pub const LOCAL_EVENT: &str = "hlp-config-change";

/// Fans a content-free change signal out over two independent paths.
///
/// The broadcast path reaches other contexts through a [`BroadcastTransport`];
/// the local path reaches handlers in this context through a
/// [`LocalDispatcher`]. Without a transport the notifier runs in degraded
/// mode: only same-context handlers are reached. Nothing here returns an
/// error to the caller.
#[derive(Clone)]
pub struct ChangeNotifier {
    channel: String,
    transport: Option<Arc<dyn BroadcastTransport>>,
    local: LocalDispatcher,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("channel", &self.channel)
            .field("degraded", &self.is_degraded())
            .field("local_listeners", &self.local.len())
            .finish()
    }
}

impl ChangeNotifier {
    /// Creates a notifier posting on `channel` through `transport`.
    ///
    /// Passing `None` selects degraded mode.
    pub fn new(channel: impl Into<String>, transport: Option<Arc<dyn BroadcastTransport>>) -> Self {
        let channel = channel.into();

        if transport.is_none() {
            debug!(channel = %channel, "No broadcast transport, notifying this context only");
        }

        Self {
            channel,
            transport,
            local: LocalDispatcher::new(LOCAL_EVENT),
        }
    }

    /// A notifier with no broadcast transport.
    pub fn same_context_only(channel: impl Into<String>) -> Self {
        Self::new(channel, None)
    }

    /// Whether the broadcast path is unavailable.
    pub fn is_degraded(&self) -> bool {
        self.transport.is_none()
    }

    /// Broadcast channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Signals every subscriber that the record changed.
    ///
    /// Posts one `config-updated` message on a transient channel from the
    /// blocking pool, then dispatches the local event. Handlers in this
    /// context have run by the time this returns. Transport failures are
    /// logged and swallowed.
    pub async fn notify(&self) {
        if let Some(transport) = &self.transport {
            let transport = Arc::clone(transport);
            let channel = self.channel.clone();

            if let Err(e) =
                tokio::task::spawn_blocking(move || post_change(transport.as_ref(), &channel)).await
            {
                warn!(channel = %self.channel, error = %e, "Broadcast task failed");
            }
        }

        self.local.dispatch();
    }

    /// Registers `handler` on both paths.
    ///
    /// The handler runs once per local dispatch and once per `config-updated`
    /// message from another channel; other message kinds are ignored. The
    /// returned [`Subscription`] detaches both when unsubscribed or dropped.
    pub fn subscribe(&self, handler: ChangeHandler) -> Subscription {
        let gate = Arc::new(DeliveryGate::default());
        let handler: ChangeHandler = {
            let gate = Arc::clone(&gate);
            Arc::new(move || {
                if let Some(_pass) = gate.enter() {
                    handler();
                }
            })
        };

        let channel = self.transport.as_ref().and_then(|transport| {
            let remote_handler = Arc::clone(&handler);
            let listener: MessageListener = Arc::new(move |message: &ChangeMessage| {
                if message.is_config_update() {
                    remote_handler();
                }
            });

            let attached = transport.open(&self.channel).and_then(|mut channel| {
                channel.listen(listener)?;
                Ok(channel)
            });

            match attached {
                Ok(channel) => Some(channel),
                Err(e) => {
                    debug!(channel = %self.channel, error = %e, "Subscribing to this context only");
                    None
                }
            }
        });

        let local_id = self.local.add(handler);

        Subscription {
            attached: Mutex::new(Some(Attached {
                gate,
                local_id,
                local: self.local.clone(),
                channel,
            })),
        }
    }
}

struct Attached {
    gate: Arc<DeliveryGate>,
    local_id: ListenerId,
    local: LocalDispatcher,
    channel: Option<Box<dyn BroadcastChannel>>,
}

/// A subscription handle that cleans up when dropped.
///
/// [`Subscription::unsubscribe`] detaches the handler from both paths and
/// closes the channel. It may be called any number of times. Once it
/// returns the handler is not running on another thread and will not run
/// again.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    attached: Mutex<Option<Attached>>,
}

impl Subscription {
    /// Detaches the handler. Later calls do nothing.
    ///
    /// Blocks until handler calls already under way on other threads finish.
    pub fn unsubscribe(&self) {
        let attached = self
            .attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(attached) = attached else {
            return;
        };

        attached.gate.close();

        if let Some(mut channel) = attached.channel {
            channel.close();
        }
        attached.local.remove(attached.local_id);
    }

    /// Whether the handler is still attached.
    pub fn is_active(&self) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Whether a broadcast channel is attached, as opposed to same-context only.
    pub fn has_broadcast(&self) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|attached| attached.channel.is_some())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

fn post_change(transport: &dyn BroadcastTransport, channel: &str) {
    match transport.open(channel) {
        Ok(mut open) => {
            if let Err(e) = open.post(&ChangeMessage::config_updated()) {
                warn!(channel, error = %e, "Failed to broadcast config change");
            }
            open.close();
        }
        Err(e) => {
            debug!(channel, error = %e, "Broadcast channel unavailable");
        }
    }
}
