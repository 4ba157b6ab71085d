//! Core traits for persistence and time.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use thiserror::Error;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for persisting the last active conversation partner.
///
/// Entries are keyed per local profile so several identities can share one
/// store.
#[async_trait]
pub trait PartnerStore: Send + Sync {
    /// Load the saved partner for `profile`.
    async fn load(&self, profile: &str) -> Result<Option<String>, StorageError>;

    /// Save `partner` as the active partner for `profile`.
    async fn save(&self, profile: &str, partner: &str) -> Result<(), StorageError>;

    /// Forget the saved partner for `profile`.
    async fn clear(&self, profile: &str) -> Result<(), StorageError>;
}

/// Source of message timestamps.
pub trait Clock: Send + Sync {
    /// Timestamp for a message created now.
    fn timestamp(&self) -> String;
}

/// Wall clock producing RFC 3339 UTC timestamps with millisecond precision.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn timestamp(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
