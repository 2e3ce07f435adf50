use serde::{Deserialize, Serialize};

/// Kind tag of a broadcast message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// The stored config changed and should be re-read.
    ConfigUpdated,

    /// Any other kind posted on the channel by someone else.
    #[serde(other)]
    Unknown,
}

/// A content-free change signal.
///
/// Carries no part of the record. Receivers learn only that a re-read is
/// warranted, never what changed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeMessage {
    /// What kind of signal this is.
    pub kind: MessageKind,
    /// Milliseconds since the Unix epoch at posting time.
    pub timestamp: i64,
}

impl ChangeMessage {
    /// A `config-updated` signal stamped with the current time.
    pub fn config_updated() -> Self {
        Self {
            kind: MessageKind::ConfigUpdated,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether listeners should re-read the record.
    pub fn is_config_update(&self) -> bool {
        self.kind == MessageKind::ConfigUpdated
    }
}
