//! Connection seam between the session and a concrete transport.

use std::{fmt, sync::Arc};

use tokio::sync::mpsc;

/// Identity of one connection attempt.
///
/// Every attempt gets a fresh id, so callbacks from a superseded connection
/// can be recognized and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The connection is open.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The connection is closed; no further events follow.
    Closed { code: u16, reason: String },
    /// A transport error; a `Closed` event usually follows.
    Error(String),
}

/// Transport event tagged with the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub id: ConnectionId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    #[must_use]
    pub const fn new(id: ConnectionId, kind: TransportEventKind) -> Self {
        Self { id, kind }
    }
}

/// Callback receiving transport events, in order, for every connection.
pub type TransportSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Command sent to a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Send a text frame.
    Text(String),
    /// Close with the given code.
    Close(u16),
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Connection closed")]
    ChannelClosed,
}

/// Handle to a live connection owned by the session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the connection task drains.
    #[must_use]
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (outgoing, rx) = mpsc::unbounded_channel();
        (Self { id, outgoing }, rx)
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a text frame.
    ///
    /// # Errors
    /// Returns error if the connection task is gone.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Ask the connection to close with `code`.
    ///
    /// # Errors
    /// Returns error if the connection task is gone.
    pub fn close(&self, code: u16) -> Result<(), SendError> {
        self.outgoing
            .send(Outgoing::Close(code))
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Opens connections to the backend.
///
/// `open` must return immediately; connection progress is reported through
/// `sink`, starting with `Opened` or `Error`/`Closed`.
pub trait Connector: Send + Sync {
    fn open(&self, id: ConnectionId, url: &str, sink: TransportSink) -> ConnectionHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_forwards_outgoing_commands() {
        let (handle, mut rx) = ConnectionHandle::new(ConnectionId(7));
        handle.send_text("{}".into()).unwrap();
        handle.close(1000).unwrap();

        assert_eq!(rx.recv().await, Some(Outgoing::Text("{}".into())));
        assert_eq!(rx.recv().await, Some(Outgoing::Close(1000)));
        assert_eq!(handle.id().to_string(), "conn-7");
    }

    #[test]
    fn send_fails_once_task_is_gone() {
        let (handle, rx) = ConnectionHandle::new(ConnectionId(1));
        drop(rx);
        tokio_test::assert_err!(handle.send_text("x".into()));
    }
}
