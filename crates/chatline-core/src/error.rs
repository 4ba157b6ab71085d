//! Session-level error conditions.
//!
//! None of these are fatal: the session keeps running and tries to heal via
//! reconnect. The `Display` text is what ends up in the user-visible error
//! string.

use thiserror::Error;

/// Session error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Connection error: {0}. Attempting to reconnect...")]
    Transport(String),
    #[error("Failed to send after {attempts} attempts")]
    DeliveryExhausted { attempts: u32 },
    #[error("Undecodable frame: {0}")]
    Decode(String),
    #[error("No roster entry for {0}")]
    IdentityUnresolved(String),
}
