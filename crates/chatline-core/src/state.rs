//! Session state store.
//!
//! One `SessionState` exists per session. It is mutated only on the session's
//! event timeline and handed out to UI layers as read-only snapshots.

use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::{
    error::SessionError,
    identity::resolve,
    model::{Connectivity, Message, RosterEntry, Visibility},
    msg_log::MessageLog,
};

/// Process-wide state of one chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    local_identity: String,
    /// Current connectivity.
    pub connectivity: Connectivity,
    /// Visibility of the hosting surface.
    pub visibility: Visibility,
    /// Roster as last reported by the backend.
    pub roster: Vec<RosterEntry>,
    /// Message log.
    pub messages: MessageLog,
    /// Partner of the conversation currently on screen, as addressed by the UI.
    pub active_partner: Option<String>,
    /// Consecutive abnormal closes since the last successful open.
    pub reconnect_attempt: u32,
    /// Single overwritable user-facing error.
    pub error: Option<String>,
    /// Whether a roster request is outstanding.
    pub loading: bool,
    unread: HashMap<String, u32>,
    undelivered: HashSet<Uuid>,
}

impl SessionState {
    /// Fresh state for `local_identity`.
    #[must_use]
    pub fn new(local_identity: impl Into<String>) -> Self {
        Self {
            local_identity: local_identity.into(),
            connectivity: Connectivity::Disconnected,
            visibility: Visibility::Foreground,
            roster: Vec::new(),
            messages: MessageLog::new(),
            active_partner: None,
            reconnect_attempt: 0,
            error: None,
            loading: true,
            unread: HashMap::new(),
            undelivered: HashSet::new(),
        }
    }

    /// Identity this session runs as.
    #[must_use]
    pub fn local_identity(&self) -> &str {
        &self.local_identity
    }

    /// Whether send affordances should be enabled.
    #[must_use]
    pub fn can_send(&self) -> bool {
        self.connectivity == Connectivity::Connected
    }

    /// Record a non-fatal error, replacing any previous one.
    pub fn raise(&mut self, error: &SessionError) {
        self.error = Some(error.to_string());
    }

    /// Clear the error string.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Replace the roster wholesale.
    pub fn replace_roster(&mut self, roster: Vec<RosterEntry>) {
        self.roster = roster;
    }

    /// Roster entry for a display identity.
    pub fn roster_entry_mut(&mut self, identity: &str) -> Option<&mut RosterEntry> {
        self.roster.iter_mut().find(|e| e.identity == identity)
    }

    /// Conversation with `partner`, computed from the log.
    #[must_use]
    pub fn conversation(&self, partner: &str) -> Vec<&Message> {
        self.messages.conversation(&self.local_identity, partner)
    }

    /// Display identity of the active partner, resolved against the roster.
    #[must_use]
    pub fn active_partner_identity(&self) -> Option<String> {
        self.active_partner
            .as_deref()
            .map(|address| resolve(&self.roster, address))
    }

    /// Conversation with the active partner, if any.
    #[must_use]
    pub fn active_conversation(&self) -> Vec<&Message> {
        self.active_partner_identity()
            .map(|p| self.conversation(&p))
            .unwrap_or_default()
    }

    /// Roster for display: self excluded, filtered by a case-insensitive
    /// substring, online entries first, then most recent activity.
    ///
    /// Activity is the later of the roster's last-seen stamp and the last
    /// logged message with that partner. Unparseable stamps sort as oldest.
    #[must_use]
    pub fn roster_view(&self, search: &str) -> Vec<&RosterEntry> {
        let needle = search.to_lowercase();
        let mut view: Vec<_> = self
            .roster
            .iter()
            .filter(|e| e.identity != self.local_identity)
            .filter(|e| needle.is_empty() || e.identity.to_lowercase().contains(&needle))
            .map(|e| {
                let online = e.is_online.unwrap_or(false);
                ((Reverse(online), Reverse(self.last_activity(e))), e)
            })
            .collect();

        view.sort_by(|(a, _), (b, _)| a.cmp(b));
        view.into_iter().map(|(_, e)| e).collect()
    }

    fn last_activity(&self, entry: &RosterEntry) -> Option<DateTime<Utc>> {
        let seen = entry.last_activity_seen_at.as_deref().and_then(parse_activity);
        let logged = self
            .messages
            .last_between(&self.local_identity, &entry.identity)
            .and_then(|m| parse_activity(&m.sent_at));
        seen.max(logged)
    }

    /// Unread count for `partner`.
    #[must_use]
    pub fn unread(&self, partner: &str) -> u32 {
        self.unread.get(partner).copied().unwrap_or(0)
    }

    /// Bump the unread count for `partner`.
    pub fn mark_unread(&mut self, partner: &str) {
        *self.unread.entry(partner.to_owned()).or_insert(0) += 1;
    }

    /// Overwrite the unread count for `partner`.
    pub fn set_unread(&mut self, partner: &str, count: u32) {
        if count == 0 {
            self.unread.remove(partner);
        } else {
            self.unread.insert(partner.to_owned(), count);
        }
    }

    /// Local ids of messages whose retry budget ran out.
    #[must_use]
    pub fn undelivered(&self) -> &HashSet<Uuid> {
        &self.undelivered
    }

    /// Record a message whose retry budget ran out.
    pub fn mark_undelivered(&mut self, id: Uuid) {
        self.undelivered.insert(id);
    }
}

/// Parse an activity stamp: RFC 3339, or the browser's `YYYY-MM-DD HH:mm`
/// form (any run of whitespace between date and time, read as UTC).
fn parse_activity(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| naive.and_utc())
}
