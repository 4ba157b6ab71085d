//! Outbound path: sends with bounded retry, roster and history requests.

use chatline_core::{DeliveryStatus, Message, MessageKind, SessionError, identity::resolve};
use chatline_transport::{ClientFrame, WireMessage};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    event::{Effect, OutboundContent, SendRequest, TimerKind},
    machine::{PendingSend, SessionMachine},
};

impl SessionMachine {
    /// Append a local message and try to deliver it.
    pub(crate) fn send(&mut self, request: SendRequest) {
        let receiver = resolve(&self.state.roster, &request.partner);
        let sender = self.state.local_identity().to_owned();
        let sent_at = self.clock.timestamp();

        let message = match request.content {
            OutboundContent::Text(body) => {
                Message::text(sender, receiver, body, sent_at, DeliveryStatus::Sending)
            }
            OutboundContent::File {
                storage_path,
                file_name,
                mime_type,
            } => Message::file(
                sender,
                receiver,
                storage_path,
                file_name,
                mime_type,
                sent_at,
                DeliveryStatus::Sent,
            ),
        };

        let id = message.id;
        debug!(%id, receiver = %message.receiver, kind = ?message.kind, "queued outbound message");
        self.state.messages.append(message);
        self.pending.insert(id, PendingSend::default());
        self.attempt_delivery(id);
    }

    /// Transmit `id` if connected, otherwise schedule a retry or give up.
    pub(crate) fn attempt_delivery(&mut self, id: Uuid) {
        let Some(message) = self.state.messages.get(id) else {
            self.pending.remove(&id);
            return;
        };

        if self.live_connection().is_some() {
            let frame = self.wire_frame(message);
            self.transmit(frame);
            if let Some(message) = self.state.messages.get_mut(id) {
                if message.status == DeliveryStatus::Sending {
                    message.status = DeliveryStatus::Sent;
                }
            }
            self.pending.remove(&id);
            return;
        }

        let attempts = self.pending.get(&id).map_or(0, |p| p.attempts);
        if attempts >= self.send_max_retries {
            self.pending.remove(&id);
            let error = SessionError::DeliveryExhausted { attempts };
            warn!(%id, attempts, "{error}");
            self.state.raise(&error);
            self.state.mark_undelivered(id);
            return;
        }

        let delay = self.send_retry.delay_for_attempt(attempts);
        let timer = self.schedule(TimerKind::SendRetry(id), delay);
        let pending = self.pending.entry(id).or_default();
        pending.attempts = attempts + 1;
        pending.timer = Some(timer);
        debug!(%id, attempt = attempts + 1, ?delay, "not connected, send retry scheduled");
    }

    fn wire_frame(&self, message: &Message) -> ClientFrame {
        let mut wire = WireMessage {
            sender: message.sender.clone(),
            receiver: message.receiver.clone(),
            content: message.payload.clone(),
            timestamp: message.sent_at.clone(),
            file_name: None,
            mime_type: None,
        };
        match message.kind {
            MessageKind::Text => {
                wire.content = self.cipher.encode(&message.payload);
                ClientFrame::Message(wire)
            }
            MessageKind::File => {
                wire.file_name.clone_from(&message.file_name);
                wire.mime_type.clone_from(&message.mime_type);
                ClientFrame::File(wire)
            }
        }
    }

    pub(crate) fn request_roster(&mut self) {
        if self.live_connection().is_none() {
            debug!("not connected, roster request skipped");
            return;
        }
        self.state.loading = true;
        self.state.clear_error();
        self.transmit(ClientFrame::GetUsers);
    }

    pub(crate) fn open_conversation(&mut self, address: &str) {
        let partner = resolve(&self.state.roster, address);
        info!(%address, %partner, "opening conversation");
        self.state.active_partner = Some(address.to_owned());
        self.state.set_unread(&partner, 0);
        self.emit(Effect::PersistActivePartner(address.to_owned()));
        self.transmit(ClientFrame::History { receiver: partner });
    }

    pub(crate) fn close_conversation(&mut self) {
        if let Some(partner) = self.state.active_partner.take() {
            info!(%partner, "closing conversation");
        }
        self.emit(Effect::ForgetActivePartner);
    }

    pub(crate) fn restore_partner(&mut self, partner: Option<String>) {
        if self.state.active_partner.is_some() {
            return;
        }
        debug!(?partner, "restored active partner");
        self.state.active_partner = partner;
    }
}
