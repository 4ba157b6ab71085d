//! Transport layer for chatline sessions.
//!
//! Provides:
//! - Wire protocol (JSON frames tagged by `type`)
//! - `Connector` seam used by the session to open connections
//! - WebSocket connector (feature: websocket)

pub mod connector;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use connector::{
    ConnectionHandle, ConnectionId, Connector, Outgoing, SendError, TransportEvent,
    TransportEventKind, TransportSink,
};
pub use protocol::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, ClientFrame, ProtocolError, RosterItem, ServerFrame,
    WireMessage,
};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
