//! Pure session state machine.
//!
//! `SessionMachine` owns the session state and every piece of bookkeeping
//! the connection lifecycle needs (live connection id, timer ids, retry
//! counters). It performs no I/O: each event is folded into the state and
//! the caller receives the ordered list of effects to carry out.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chatline_core::{Cipher, CipherError, Clock, Connectivity, SessionState};
use chatline_transport::{ClientFrame, ConnectionId};
use tracing::trace;
use uuid::Uuid;

use crate::{
    backoff::BackoffPolicy,
    config::SessionConfig,
    event::{Effect, SessionEvent, TimerId, TimerKind},
};

/// Retry bookkeeping of one outbound message.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PendingSend {
    pub(crate) attempts: u32,
    pub(crate) timer: Option<TimerId>,
}

/// Event-to-effect state machine of one chat session.
pub struct SessionMachine {
    pub(crate) state: SessionState,
    pub(crate) cipher: Cipher,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) reconnect: BackoffPolicy,
    pub(crate) send_retry: BackoffPolicy,
    pub(crate) send_max_retries: u32,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) heartbeat_window: Duration,
    /// Connection the session currently owns, if any.
    pub(crate) connection: Option<ConnectionId>,
    pub(crate) reconnect_timer: Option<TimerId>,
    pub(crate) heartbeat_timer: Option<TimerId>,
    /// Connected time accumulated by heartbeat ticks.
    pub(crate) heartbeat_elapsed: Duration,
    pub(crate) pending: HashMap<Uuid, PendingSend>,
    pub(crate) stopped: bool,
    next_connection: u64,
    next_timer: u64,
    effects: Vec<Effect>,
}

impl SessionMachine {
    /// Create a machine for `local_identity`.
    ///
    /// # Errors
    /// Returns error if the configured cipher key is unusable.
    pub fn new(
        config: &SessionConfig,
        local_identity: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CipherError> {
        Ok(Self {
            state: SessionState::new(local_identity),
            cipher: Cipher::new(&config.cipher_key)?,
            clock,
            reconnect: config.reconnect,
            send_retry: config.send_retry(),
            send_max_retries: config.send_max_retries,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_window: config.heartbeat_window,
            connection: None,
            reconnect_timer: None,
            heartbeat_timer: None,
            heartbeat_elapsed: Duration::ZERO,
            pending: HashMap::new(),
            stopped: false,
            next_connection: 0,
            next_timer: 0,
            effects: Vec::new(),
        })
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether the session has been shut down.
    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Fold one event into the state, returning the effects to perform in order.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        if self.stopped {
            trace!(?event, "session stopped, ignoring event");
            return Vec::new();
        }

        match event {
            SessionEvent::Connect => self.connect(),
            SessionEvent::Transport(event) => self.on_transport(event),
            SessionEvent::Visibility(visibility) => self.on_visibility(visibility),
            SessionEvent::TimerFired(timer) => self.on_timer(timer),
            SessionEvent::Send(request) => self.send(request),
            SessionEvent::RequestRoster => self.request_roster(),
            SessionEvent::OpenConversation(address) => self.open_conversation(&address),
            SessionEvent::CloseConversation => self.close_conversation(),
            SessionEvent::RestorePartner(partner) => self.restore_partner(partner),
            SessionEvent::Shutdown => self.shutdown(),
        }

        std::mem::take(&mut self.effects)
    }

    fn on_timer(&mut self, timer: TimerId) {
        match timer.kind {
            TimerKind::Reconnect if self.reconnect_timer == Some(timer) => {
                self.reconnect_timer = None;
                self.connect();
            }
            TimerKind::Heartbeat if self.heartbeat_timer == Some(timer) => {
                self.heartbeat_timer = None;
                self.heartbeat_tick();
            }
            TimerKind::SendRetry(id)
                if self.pending.get(&id).and_then(|p| p.timer) == Some(timer) =>
            {
                if let Some(pending) = self.pending.get_mut(&id) {
                    pending.timer = None;
                }
                self.attempt_delivery(id);
            }
            _ => trace!(?timer, "ignoring stale timer"),
        }
    }

    pub(crate) fn emit(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub(crate) fn next_connection_id(&mut self) -> ConnectionId {
        self.next_connection += 1;
        ConnectionId(self.next_connection)
    }

    pub(crate) fn schedule(&mut self, kind: TimerKind, after: Duration) -> TimerId {
        self.next_timer += 1;
        let timer = TimerId {
            seq: self.next_timer,
            kind,
        };
        self.emit(Effect::ScheduleTimer { timer, after });
        timer
    }

    pub(crate) fn cancel(&mut self, timer: Option<TimerId>) {
        if let Some(timer) = timer {
            self.emit(Effect::CancelTimer(timer));
        }
    }

    /// Live connection id when the session is connected.
    pub(crate) fn live_connection(&self) -> Option<ConnectionId> {
        self.connection
            .filter(|_| self.state.connectivity == Connectivity::Connected)
    }

    /// Queue a frame on the live connection. Returns false when not connected.
    pub(crate) fn transmit(&mut self, frame: ClientFrame) -> bool {
        let Some(id) = self.live_connection() else {
            trace!(?frame, "not connected, frame not sent");
            return false;
        };
        self.emit(Effect::SendFrame { id, frame });
        true
    }
}
