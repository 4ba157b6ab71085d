//! Address to display-identity resolution.

use crate::{error::SessionError, model::RosterEntry};

/// Resolve `address` against the roster.
///
/// Matches an entry whose stable address or display identity equals
/// `address` exactly and returns its display identity.
///
/// # Errors
/// Returns `IdentityUnresolved` when no entry matches.
pub fn try_resolve(roster: &[RosterEntry], address: &str) -> Result<String, SessionError> {
    roster
        .iter()
        .find(|e| e.address.as_deref() == Some(address) || e.identity == address)
        .map(|e| e.identity.clone())
        .ok_or_else(|| SessionError::IdentityUnresolved(address.to_owned()))
}

/// Resolve `address`, falling back to the address itself.
///
/// The fallback covers the window before the first roster snapshot arrives.
#[must_use]
pub fn resolve(roster: &[RosterEntry], address: &str) -> String {
    try_resolve(roster, address).unwrap_or_else(|e| {
        tracing::debug!(%address, "{e}, using address as identity");
        address.to_owned()
    })
}
