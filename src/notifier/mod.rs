//! Change notification across and within contexts.
//!
//! A write signals "the config changed" without carrying any of it.
//! Other contexts hear it through a [`BroadcastTransport`]; the writing
//! context hears it through its own [`LocalDispatcher`], so a missing
//! transport degrades to same-context delivery instead of failing.

mod broadcast;
mod file_channel;
mod gate;
mod in_process;
mod local;
mod message;
mod transport;

#[cfg(test)]
mod tests;

pub use broadcast::{ChangeNotifier, LOCAL_EVENT, Subscription};
pub use file_channel::FileTransport;
pub use in_process::InProcessTransport;
pub use local::{ChangeHandler, ListenerId, LocalDispatcher};
pub use message::{ChangeMessage, MessageKind};
pub use transport::{BroadcastChannel, BroadcastTransport, MessageListener, NotifyError};
