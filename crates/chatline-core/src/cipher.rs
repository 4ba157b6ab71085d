//! Reversible content transform applied to text payloads on the wire.
//!
//! This is an XOR obfuscation over UTF-16 code units, kept for compatibility
//! with the browser client. It provides no confidentiality: deployments that
//! need it must run the connection over TLS (`wss://`).
//!
//! Keys are restricted to ASCII. XOR with a unit below 0x80 keeps every code
//! unit in its surrogate class, so any valid string maps to a valid string and
//! the transform cannot fail.

use thiserror::Error;

/// Key used by the reference backend and browser client.
pub const DEFAULT_KEY: &str = "secretKey";

/// Cipher error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("Cipher key must not be empty")]
    EmptyKey,
    #[error("Cipher key must be ASCII")]
    NonAsciiKey,
}

/// XOR transform; `encode` and `decode` are the same involution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cipher {
    key: Vec<u16>,
}

impl Default for Cipher {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.encode_utf16().collect(),
        }
    }
}

impl Cipher {
    /// Create a cipher with the given key.
    ///
    /// # Errors
    /// Returns error if the key is empty or not ASCII.
    pub fn new(key: &str) -> Result<Self, CipherError> {
        if key.is_empty() {
            return Err(CipherError::EmptyKey);
        }
        if !key.is_ascii() {
            return Err(CipherError::NonAsciiKey);
        }
        Ok(Self {
            key: key.encode_utf16().collect(),
        })
    }

    /// Obfuscate plain text.
    #[must_use]
    pub fn encode(&self, text: &str) -> String {
        self.apply(text)
    }

    /// Recover plain text.
    #[must_use]
    pub fn decode(&self, text: &str) -> String {
        self.apply(text)
    }

    fn apply(&self, text: &str) -> String {
        let units: Vec<u16> = text
            .encode_utf16()
            .zip(self.key.iter().cycle())
            .map(|(unit, k)| unit ^ k)
            .collect();
        String::from_utf16_lossy(&units)
    }
}
