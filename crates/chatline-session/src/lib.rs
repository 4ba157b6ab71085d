//! Session manager for realtime chat.
//!
//! Provides:
//! - `SessionMachine` - pure event-to-effect state machine
//! - `SessionManager` / `SessionHandle` - async driver and its command handle
//! - Reconnect, heartbeat and send-retry policies
//! - Partner stores (feature: memory, file-store)

pub mod backoff;
pub mod config;
mod connection;
mod dispatcher;
pub mod event;
pub mod machine;
pub mod manager;
mod router;
pub mod storage;

pub use backoff::BackoffPolicy;
pub use config::{ConfigError, SessionConfig};
pub use event::{Effect, OutboundContent, SendRequest, SessionEvent, TimerId, TimerKind};
pub use machine::SessionMachine;
pub use manager::{HandleError, ManagerError, SessionHandle, SessionManager};

#[cfg(feature = "file-store")]
pub use storage::FilePartnerStore;
#[cfg(feature = "memory")]
pub use storage::MemoryPartnerStore;
