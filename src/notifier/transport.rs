use std::{path::PathBuf, sync::Arc};

use super::ChangeMessage;

/// Callback receiving messages posted by other channels.
pub type MessageListener = Arc<dyn Fn(&ChangeMessage) + Send + Sync>;

/// Errors internal to broadcast transports.
///
/// These never escape a store operation; the notifier logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport cannot provide channels in this environment.
    #[error("broadcast transport unavailable: {details}")]
    Unavailable {
        /// Why the transport is unavailable
        details: String,
    },

    /// Reading or writing a channel file failed.
    #[error("I/O error on channel '{path}': {details}")]
    Io {
        /// Channel file involved
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// A message could not be encoded for the wire.
    #[error("failed to encode broadcast message: {details}")]
    Encoding {
        /// Encoder error details
        details: String,
    },

    /// The channel was already closed.
    #[error("channel '{name}' is closed")]
    Closed {
        /// Channel name
        name: String,
    },
}

/// A source of named broadcast channels shared by every context of an origin.
///
/// This is the seam where the cross-context primitive is swapped: a file
/// channel for separate processes, an in-process hub, or nothing at all.
pub trait BroadcastTransport: Send + Sync {
    /// Opens a new channel object bound to `name`.
    ///
    /// # Errors
    /// Returns `NotifyError::Unavailable` if the transport cannot provide
    /// channels right now.
    fn open(&self, name: &str) -> Result<Box<dyn BroadcastChannel>, NotifyError>;
}

/// One open channel object.
///
/// A message posted on a channel reaches every other open channel with the
/// same name, never the posting channel itself. Delivery is best-effort with
/// no acknowledgement.
pub trait BroadcastChannel: Send {
    /// Posts `message` to every other channel with the same name.
    ///
    /// # Errors
    /// Returns an error if the channel is closed or the message cannot be written.
    fn post(&self, message: &ChangeMessage) -> Result<(), NotifyError>;

    /// Installs the listener for messages from other channels, replacing any
    /// previous one.
    ///
    /// # Errors
    /// Returns an error if the channel is closed or cannot start listening.
    fn listen(&mut self, listener: MessageListener) -> Result<(), NotifyError>;

    /// Stops listening and releases the channel. Closing twice is a no-op.
    fn close(&mut self);
}
