//! Inbound frame routing.

use chatline_core::{DeliveryStatus, Message, MessageKind, RosterEntry, SessionError};
use chatline_transport::{ProtocolError, RosterItem, ServerFrame, WireMessage};
use tracing::{debug, trace, warn};

use crate::machine::SessionMachine;

impl SessionMachine {
    /// Decode one inbound text frame and apply it.
    pub(crate) fn route(&mut self, text: &str) {
        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(ProtocolError::UnknownType(kind)) => {
                debug!(%kind, "dropping frame of unrecognized type");
                return;
            }
            Err(err) => {
                warn!("{}", SessionError::Decode(err.to_string()));
                return;
            }
        };

        match frame {
            ServerFrame::ClientList { clients: items } | ServerFrame::UserList { users: items } => {
                self.apply_roster(items);
            }
            ServerFrame::Message(wire) => self.accept_live(wire, MessageKind::Text),
            ServerFrame::File(wire) => self.accept_live(wire, MessageKind::File),
            ServerFrame::ChatHistory { receiver, history } => {
                self.merge_history(receiver.as_deref(), history);
            }
            ServerFrame::Pong => trace!("pong"),
            ServerFrame::UserOnline { username } => self.set_presence(&username, true),
            ServerFrame::UserOffline { username } => self.set_presence(&username, false),
            ServerFrame::UnreadCount { username, count } => {
                self.state.set_unread(&username, count);
            }
        }
    }

    fn apply_roster(&mut self, items: Vec<RosterItem>) {
        let roster: Vec<RosterEntry> = items.into_iter().map(Into::into).collect();
        debug!(entries = roster.len(), "roster snapshot");
        self.state.replace_roster(roster);
        self.state.loading = false;
    }

    fn to_message(&self, wire: WireMessage, kind: MessageKind) -> Message {
        match kind {
            MessageKind::Text => Message::text(
                wire.sender,
                wire.receiver,
                self.cipher.decode(&wire.content),
                wire.timestamp,
                DeliveryStatus::Delivered,
            ),
            MessageKind::File => Message::file(
                wire.sender,
                wire.receiver,
                wire.content,
                wire.file_name,
                wire.mime_type,
                wire.timestamp,
                DeliveryStatus::Delivered,
            ),
        }
    }

    fn accept_live(&mut self, wire: WireMessage, kind: MessageKind) {
        let local = self.state.local_identity().to_owned();
        if wire.sender != local && wire.receiver != local {
            debug!(sender = %wire.sender, receiver = %wire.receiver, "dropping message addressed elsewhere");
            return;
        }

        let message = self.to_message(wire, kind);
        let inbound = message.sender != local;
        let partner = if inbound {
            message.sender.clone()
        } else {
            message.receiver.clone()
        };
        let sent_at = message.sent_at.clone();

        let appended = self.state.messages.upsert(message);
        if let Some(entry) = self.state.roster_entry_mut(&partner) {
            entry.last_activity_seen_at = Some(sent_at);
        }

        let viewing = self.state.active_partner_identity().as_deref() == Some(partner.as_str());
        if appended && inbound && !viewing {
            self.state.mark_unread(&partner);
        }
    }

    fn merge_history(&mut self, receiver: Option<&str>, history: Vec<WireMessage>) {
        let batch: Vec<Message> = history
            .into_iter()
            .map(|wire| {
                let kind = history_kind(&wire);
                self.to_message(wire, kind)
            })
            .collect();
        debug!(?receiver, entries = batch.len(), "history batch");
        self.state.messages.merge(batch);
    }

    fn set_presence(&mut self, identity: &str, online: bool) {
        match self.state.roster_entry_mut(identity) {
            Some(entry) => entry.is_online = Some(online),
            None => trace!(%identity, "presence for identity not in roster"),
        }
    }
}

/// History entries carry no frame type; file metadata marks a file entry.
fn history_kind(wire: &WireMessage) -> MessageKind {
    if wire.file_name.is_some() || wire.mime_type.is_some() {
        MessageKind::File
    } else {
        MessageKind::Text
    }
}

#[cfg(test)]
mod tests {
    use chatline_core::Cipher;
    use chatline_transport::ConnectionId;

    use super::*;
    use crate::{SendRequest, event::SessionEvent, machine::test_support::*};

    fn message_json(sender: &str, receiver: &str, text: &str, timestamp: &str) -> String {
        serde_json::json!({
            "type": "message",
            "sender": sender,
            "receiver": receiver,
            "content": Cipher::default().encode(text),
            "timestamp": timestamp,
        })
        .to_string()
    }

    fn history_json(entries: &[(&str, &str, &str, &str)]) -> String {
        let history: Vec<_> = entries
            .iter()
            .map(|(sender, receiver, text, timestamp)| {
                serde_json::json!({
                    "sender": sender,
                    "receiver": receiver,
                    "content": Cipher::default().encode(text),
                    "timestamp": timestamp,
                })
            })
            .collect();
        serde_json::json!({ "type": "chatHistory", "history": history }).to_string()
    }

    fn with_roster(machine: &mut SessionMachine, id: ConnectionId, names: &[&str]) {
        let json = serde_json::json!({ "type": "clientList", "clients": names }).to_string();
        machine.handle(inbound(id, &json));
    }

    #[test]
    fn roster_snapshot_replaces_roster_and_clears_loading() {
        let (mut machine, id) = connected("alice");
        with_roster(&mut machine, id, &["alice", "bob", "carol"]);
        assert_eq!(machine.state().roster.len(), 3);
        assert!(!machine.state().loading);

        with_roster(&mut machine, id, &["bob"]);
        assert_eq!(machine.state().roster, vec![RosterEntry::named("bob")]);
    }

    #[test]
    fn userlist_of_names_becomes_roster() {
        let (mut machine, id) = connected("alice");
        machine.handle(inbound(id, r#"{"type":"userlist","users":["alice","bob"]}"#));

        let names: Vec<&str> = machine
            .state()
            .roster
            .iter()
            .map(|e| e.identity.as_str())
            .collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn inbound_message_is_deciphered_and_counted_unread() {
        let (mut machine, id) = connected("alice");
        machine.handle(inbound(id, &message_json("bob", "alice", "hello", "t1")));

        let state = machine.state();
        let received = &state.messages.entries()[0];
        assert_eq!(received.payload, "hello");
        assert_eq!(received.status, DeliveryStatus::Delivered);
        assert_eq!(state.unread("bob"), 1);
    }

    #[test]
    fn message_from_active_partner_is_not_unread() {
        let (mut machine, id) = connected("alice");
        machine.handle(SessionEvent::OpenConversation("bob".into()));
        machine.handle(inbound(id, &message_json("bob", "alice", "hello", "t1")));

        assert_eq!(machine.state().unread("bob"), 0);
        assert_eq!(machine.state().active_conversation().len(), 1);
    }

    #[test]
    fn message_for_other_parties_is_dropped() {
        let (mut machine, id) = connected("alice");
        machine.handle(inbound(id, &message_json("bob", "carol", "psst", "t1")));
        assert!(machine.state().messages.is_empty());
    }

    #[test]
    fn duplicate_live_frames_append_once() {
        let (mut machine, id) = connected("alice");
        let frame = message_json("bob", "alice", "hello", "t1");
        machine.handle(inbound(id, &frame));
        machine.handle(inbound(id, &frame));

        assert_eq!(machine.state().messages.len(), 1);
        assert_eq!(machine.state().unread("bob"), 1);
    }

    #[test]
    fn echo_of_own_send_converges_to_delivered() {
        let (mut machine, id) = connected("alice");
        machine.handle(SessionEvent::Send(SendRequest::text("bob", "hi")));
        let local = machine.state().messages.entries()[0].clone();
        assert_eq!(local.status, DeliveryStatus::Sent);

        machine.handle(inbound(
            id,
            &message_json("alice", "bob", "hi", &local.sent_at),
        ));

        let state = machine.state();
        assert_eq!(state.messages.len(), 1);
        let entry = &state.messages.entries()[0];
        assert_eq!(entry.id, local.id);
        assert_eq!(entry.status, DeliveryStatus::Delivered);
        assert_eq!(state.unread("bob"), 0);
    }

    #[test]
    fn history_replay_is_idempotent() {
        let (mut machine, id) = connected("alice");
        let history = history_json(&[
            ("alice", "bob", "hi", "t1"),
            ("bob", "alice", "hey", "t2"),
        ]);
        machine.handle(inbound(id, &history));
        let once = machine.state().messages.clone();
        machine.handle(inbound(id, &history));

        assert_eq!(machine.state().messages, once);
        assert_eq!(once.len(), 2);
        assert_eq!(once.entries()[1].payload, "hey");
    }

    #[test]
    fn history_after_live_message_does_not_duplicate() {
        let (mut machine, id) = connected("alice");
        machine.handle(inbound(id, &message_json("bob", "alice", "hey", "t2")));
        machine.handle(inbound(
            id,
            &history_json(&[("alice", "bob", "hi", "t1"), ("bob", "alice", "hey", "t2")]),
        ));

        assert_eq!(machine.state().messages.len(), 2);
        assert!(
            machine
                .state()
                .messages
                .iter()
                .all(|m| m.status == DeliveryStatus::Delivered)
        );
    }

    #[test]
    fn file_frames_are_not_deciphered() {
        let (mut machine, id) = connected("alice");
        let json = serde_json::json!({
            "type": "file",
            "sender": "bob",
            "receiver": "alice",
            "content": "uploads/cat.png",
            "timestamp": "t1",
            "mimeType": "image/png",
        })
        .to_string();
        machine.handle(inbound(id, &json));

        let received = &machine.state().messages.entries()[0];
        assert_eq!(received.kind, MessageKind::File);
        assert_eq!(received.payload, "uploads/cat.png");
        assert_eq!(received.file_name.as_deref(), Some("cat.png"));
    }

    #[test]
    fn history_file_entries_keep_metadata_and_path() {
        let (mut machine, id) = connected("alice");
        let live = serde_json::json!({
            "type": "file",
            "sender": "bob",
            "receiver": "alice",
            "content": "uploads/cat.png",
            "timestamp": "t1",
            "fileName": "cat.png",
            "mimeType": "image/png",
        });
        machine.handle(inbound(id, &live.to_string()));

        let history = serde_json::json!({
            "type": "chatHistory",
            "history": [
                {
                    "sender": "bob",
                    "receiver": "alice",
                    "content": "uploads/cat.png",
                    "timestamp": "t1",
                    "fileName": "cat.png",
                    "mimeType": "image/png",
                },
                {
                    "sender": "alice",
                    "receiver": "bob",
                    "content": "uploads/dog.png",
                    "timestamp": "t2",
                    "fileName": "dog.png",
                    "mimeType": "image/png",
                },
                {
                    "sender": "bob",
                    "receiver": "alice",
                    "content": Cipher::default().encode("nice"),
                    "timestamp": "t3",
                },
            ],
        });
        machine.handle(inbound(id, &history.to_string()));

        let entries = machine.state().messages.entries();
        assert_eq!(entries.len(), 3);
        for (entry, path, name) in [
            (&entries[0], "uploads/cat.png", "cat.png"),
            (&entries[1], "uploads/dog.png", "dog.png"),
        ] {
            assert_eq!(entry.kind, MessageKind::File);
            assert_eq!(entry.payload, path);
            assert_eq!(entry.file_name.as_deref(), Some(name));
            assert_eq!(entry.mime_type.as_deref(), Some("image/png"));
        }
        assert_eq!(entries[2].kind, MessageKind::Text);
        assert_eq!(entries[2].payload, "nice");
    }

    #[test]
    fn presence_and_activity_update_roster() {
        let (mut machine, id) = connected("alice");
        with_roster(&mut machine, id, &["alice", "bob"]);

        machine.handle(inbound(id, r#"{"type":"userOnline","username":"bob"}"#));
        machine.handle(inbound(id, &message_json("bob", "alice", "hi", "t9")));
        let bob = machine.state().roster[1].clone();
        assert_eq!(bob.is_online, Some(true));
        assert_eq!(bob.last_activity_seen_at.as_deref(), Some("t9"));

        machine.handle(inbound(id, r#"{"type":"userOffline","username":"bob"}"#));
        assert_eq!(machine.state().roster[1].is_online, Some(false));
    }

    #[test]
    fn unread_count_frame_overwrites_counter() {
        let (mut machine, id) = connected("alice");
        machine.handle(inbound(
            id,
            r#"{"type":"unreadCount","username":"bob","count":4}"#,
        ));
        assert_eq!(machine.state().unread("bob"), 4);
    }

    #[test]
    fn unknown_and_malformed_frames_are_dropped() {
        let (mut machine, id) = connected("alice");
        let before = machine.state().clone();

        assert!(
            machine
                .handle(inbound(id, r#"{"type":"typing","username":"bob"}"#))
                .is_empty()
        );
        assert!(machine.handle(inbound(id, "{not json")).is_empty());
        assert!(
            machine
                .handle(inbound(id, r#"{"type":"message","sender":1}"#))
                .is_empty()
        );

        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn pong_changes_nothing() {
        let (mut machine, id) = connected("alice");
        let before = machine.state().clone();
        assert!(machine.handle(inbound(id, r#"{"type":"pong"}"#)).is_empty());
        assert_eq!(machine.state(), &before);
    }
}
