//! Message log with dedup-key merge.

use std::collections::HashMap;

use uuid::Uuid;

use crate::model::{DedupKey, Message};

/// Ordered message log owned by the session.
///
/// Entries sharing a [`DedupKey`] collapse to one during every merge. The
/// surviving entry keeps the slot (and local id) of the first occurrence and
/// the content of the most advanced copy, so a delivered copy always wins.
///
/// The log has no eviction policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in log order.
    #[must_use]
    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Iterate entries in log order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// Append without deduplication (optimistic local echo).
    pub fn append(&mut self, msg: Message) {
        self.entries.push(msg);
    }

    /// Look up an entry by local id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.entries.iter().find(|m| m.id == id)
    }

    /// Look up an entry by local id for mutation.
    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.entries.iter_mut().find(|m| m.id == id)
    }

    /// Merge a single entry.
    ///
    /// Returns `true` when the entry was appended, `false` when it collapsed
    /// into an existing one.
    pub fn upsert(&mut self, msg: Message) -> bool {
        let key = msg.dedup_key();
        match self.entries.iter_mut().find(|m| m.dedup_key() == key) {
            Some(existing) => {
                absorb(existing, msg);
                false
            }
            None => {
                self.entries.push(msg);
                true
            }
        }
    }

    /// Append a batch, then deduplicate the whole log by dedup key.
    ///
    /// Applying the same batch any number of times yields the same log.
    pub fn merge<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = Message>,
    {
        self.entries.extend(batch);
        self.dedup();
    }

    /// Collapse entries sharing a dedup key, keeping first positions.
    pub fn dedup(&mut self) {
        let mut slots: HashMap<DedupKey, usize> = HashMap::with_capacity(self.entries.len());
        let mut kept: Vec<Message> = Vec::with_capacity(self.entries.len());

        for msg in self.entries.drain(..) {
            let key = msg.dedup_key();
            if let Some(&idx) = slots.get(&key) {
                absorb(&mut kept[idx], msg);
            } else {
                slots.insert(key, kept.len());
                kept.push(msg);
            }
        }

        self.entries = kept;
    }

    /// Computed view of the conversation between `local` and `partner`.
    #[must_use]
    pub fn conversation(&self, local: &str, partner: &str) -> Vec<&Message> {
        self.entries
            .iter()
            .filter(|m| m.is_between(local, partner))
            .collect()
    }

    /// Most recent entry exchanged between `local` and `partner`.
    #[must_use]
    pub fn last_between(&self, local: &str, partner: &str) -> Option<&Message> {
        self.entries
            .iter()
            .rev()
            .find(|m| m.is_between(local, partner))
    }
}

/// Fold `incoming` into `existing` when it is at least as advanced.
fn absorb(existing: &mut Message, incoming: Message) {
    if incoming.status >= existing.status {
        let id = existing.id;
        *existing = Message { id, ..incoming };
    }
}
