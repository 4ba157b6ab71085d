//! Wire protocol for client-server communication.
//!
//! Frames are JSON objects discriminated by a `type` field.

use chatline_core::RosterEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Close code for a normal, intentional closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame has no type field")]
    MissingType,
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
}

/// Chat message body shared by `message` and `file` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub sender: String,
    pub receiver: String,
    /// Ciphered text, or a storage path for files.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Register this connection under a username.
    Init { username: String },
    /// Request a roster snapshot.
    GetUsers,
    /// Request history with a partner.
    History { receiver: String },
    /// Liveness probe.
    Ping,
    /// Text message (ciphered content).
    Message(WireMessage),
    /// File message (storage path content).
    File(WireMessage),
}

impl ClientFrame {
    /// Serialize to JSON text.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Roster item as sent by the backend: a bare username or a profile object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RosterItem {
    Name(String),
    Profile(RosterProfile),
}

/// Roster profile object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterProfile {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default, alias = "lastActivity")]
    pub last_seen: Option<String>,
}

impl From<RosterItem> for RosterEntry {
    fn from(item: RosterItem) -> Self {
        match item {
            RosterItem::Name(name) => Self::named(name),
            RosterItem::Profile(p) => Self {
                identity: p.username,
                address: p.email,
                is_online: p.is_online,
                last_activity_seen_at: p.last_seen,
            },
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Roster snapshot.
    #[serde(rename = "clientList")]
    ClientList {
        #[serde(default, alias = "users")]
        clients: Vec<RosterItem>,
    },
    /// Roster snapshot (alternate spelling).
    #[serde(rename = "userlist")]
    UserList {
        #[serde(default, alias = "clients")]
        users: Vec<RosterItem>,
    },
    /// Live text message.
    #[serde(rename = "message")]
    Message(WireMessage),
    /// History batch for one conversation.
    #[serde(rename = "chatHistory")]
    ChatHistory {
        #[serde(default)]
        receiver: Option<String>,
        #[serde(default)]
        history: Vec<WireMessage>,
    },
    /// Live file message.
    #[serde(rename = "file")]
    File(WireMessage),
    /// Liveness ack.
    #[serde(rename = "pong")]
    Pong,
    /// Presence: user came online.
    #[serde(rename = "userOnline")]
    UserOnline { username: String },
    /// Presence: user went offline.
    #[serde(rename = "userOffline")]
    UserOffline { username: String },
    /// Server-side unread counter for a partner.
    #[serde(rename = "unreadCount")]
    UnreadCount { username: String, count: u32 },
}

impl ServerFrame {
    const KNOWN_TYPES: &'static [&'static str] = &[
        "clientList",
        "userlist",
        "message",
        "chatHistory",
        "file",
        "pong",
        "userOnline",
        "userOffline",
        "unreadCount",
    ];

    /// Decode a text frame.
    ///
    /// # Errors
    /// Returns `UnknownType` for well-formed frames of an unrecognized type,
    /// and `Json`/`MissingType` for malformed ones.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if !Self::KNOWN_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_owned()));
        }
        Ok(serde_json::from_value(value)?)
    }
}
