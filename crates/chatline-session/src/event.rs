//! Events consumed and effects produced by the session machine.

use std::time::Duration;

use chatline_core::Visibility;
use chatline_transport::{ClientFrame, ConnectionId, TransportEvent};
use uuid::Uuid;

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Reconnect,
    Heartbeat,
    /// Retry of the outbound message with this local id.
    SendRetry(Uuid),
}

/// One scheduled timer.
///
/// `seq` is unique per scheduling, so a fire that raced with a cancel is
/// recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub seq: u64,
    pub kind: TimerKind,
}

/// Outbound payload of a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    /// File already uploaded out of band.
    File {
        storage_path: String,
        file_name: Option<String>,
        mime_type: Option<String>,
    },
}

/// Request to send something to a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Partner address as the UI knows it (display name or stable address).
    pub partner: String,
    pub content: OutboundContent,
}

impl SendRequest {
    #[must_use]
    pub fn text(partner: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            partner: partner.into(),
            content: OutboundContent::Text(body.into()),
        }
    }

    #[must_use]
    pub fn file(
        partner: impl Into<String>,
        storage_path: impl Into<String>,
        file_name: Option<String>,
        mime_type: Option<String>,
    ) -> Self {
        Self {
            partner: partner.into(),
            content: OutboundContent::File {
                storage_path: storage_path.into(),
                file_name,
                mime_type,
            },
        }
    }
}

/// Input to the session timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Open a connection unless one is live.
    Connect,
    /// Something happened on a connection.
    Transport(TransportEvent),
    /// The hosting surface changed visibility.
    Visibility(Visibility),
    /// A scheduled timer elapsed.
    TimerFired(TimerId),
    /// Send a message.
    Send(SendRequest),
    /// Ask the backend for a roster snapshot.
    RequestRoster,
    /// Make `address` the active conversation partner and load its history.
    OpenConversation(String),
    /// Leave the active conversation and forget the persisted partner.
    CloseConversation,
    /// Seed the active partner from persisted state without re-persisting it.
    RestorePartner(Option<String>),
    /// Tear the session down.
    Shutdown,
}

/// Side effect requested by the session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenConnection(ConnectionId),
    CloseConnection { id: ConnectionId, code: u16 },
    SendFrame { id: ConnectionId, frame: ClientFrame },
    ScheduleTimer { timer: TimerId, after: Duration },
    CancelTimer(TimerId),
    PersistActivePartner(String),
    ForgetActivePartner,
}
