//! Session data model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connectivity of the session's single transport connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// No live connection.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The connection is open.
    Connected,
}

/// Visibility of the hosting surface (tab, window, app).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Foreground,
    Hidden,
}

/// Kind of message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text, ciphered on the wire.
    Text,
    /// Storage path of an uploaded file, never ciphered.
    File,
}

/// Delivery progress of a message.
///
/// Ordered so that a merge can keep the most advanced copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
}

/// Composite key collapsing duplicate log entries: `(sent_at, sender)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub sent_at: String,
    pub sender: String,
}

/// One entry of the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Local identifier, never sent over the wire.
    pub id: Uuid,
    pub sender: String,
    pub receiver: String,
    pub kind: MessageKind,
    /// Plain text for text messages, storage path for files.
    pub payload: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub sent_at: String,
    pub status: DeliveryStatus,
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        payload: impl Into<String>,
        sent_at: impl Into<String>,
        status: DeliveryStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            kind: MessageKind::Text,
            payload: payload.into(),
            file_name: None,
            mime_type: None,
            sent_at: sent_at.into(),
            status,
        }
    }

    /// Create a file message pointing at an already uploaded storage path.
    ///
    /// When no file name is given, the last path segment is used.
    #[must_use]
    pub fn file(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        storage_path: impl Into<String>,
        file_name: Option<String>,
        mime_type: Option<String>,
        sent_at: impl Into<String>,
        status: DeliveryStatus,
    ) -> Self {
        let payload = storage_path.into();
        let file_name = file_name.or_else(|| {
            payload
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
        });
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            kind: MessageKind::File,
            payload,
            file_name,
            mime_type,
            sent_at: sent_at.into(),
            status,
        }
    }

    /// Key used to collapse duplicates during merges.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            sent_at: self.sent_at.clone(),
            sender: self.sender.clone(),
        }
    }

    /// Whether this message belongs to the conversation between `a` and `b`.
    #[must_use]
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender == a && self.receiver == b) || (self.sender == b && self.receiver == a)
    }
}

/// A known counterpart with presence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Display identity (username).
    pub identity: String,
    /// Stable external address (for example an email), when the backend provides one.
    pub address: Option<String>,
    pub is_online: Option<bool>,
    pub last_activity_seen_at: Option<String>,
}

impl RosterEntry {
    /// Roster entry carrying only a display identity.
    #[must_use]
    pub fn named(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Self::default()
        }
    }
}
