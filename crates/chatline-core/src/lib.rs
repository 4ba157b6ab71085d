//! Core building blocks for the chatline session manager.
//!
//! This crate provides:
//! - `Message`, `RosterEntry` and friends - the session data model
//! - `MessageLog` - append-only log with dedup-key merge
//! - `SessionState` - the state store read by UI layers
//! - `Cipher` - reversible content transform used on the wire
//! - Identity resolution and the storage/clock traits

pub mod cipher;
pub mod error;
pub mod identity;
pub mod model;
pub mod msg_log;
pub mod state;
pub mod traits;

pub use cipher::{Cipher, CipherError};
pub use error::SessionError;
pub use identity::{resolve, try_resolve};
pub use model::{
    Connectivity, DedupKey, DeliveryStatus, Message, MessageKind, RosterEntry, Visibility,
};
pub use msg_log::MessageLog;
pub use state::SessionState;
pub use traits::{Clock, PartnerStore, StorageError, SystemClock};
