//! Connection lifecycle: open, close, reconnect backoff, heartbeat, visibility.

use std::time::Duration;

use chatline_core::{Connectivity, SessionError, Visibility, identity::resolve};
use chatline_transport::{
    CLOSE_NORMAL, ClientFrame, ConnectionId, TransportEvent, TransportEventKind,
};
use tracing::{debug, info, warn};

use crate::{
    event::{Effect, TimerKind},
    machine::SessionMachine,
};

impl SessionMachine {
    /// Open a connection unless one is already owned.
    pub(crate) fn connect(&mut self) {
        if let Some(id) = self.connection {
            debug!(%id, "connection already live, connect ignored");
            return;
        }

        let pending = self.reconnect_timer.take();
        self.cancel(pending);

        let id = self.next_connection_id();
        self.connection = Some(id);
        self.state.connectivity = Connectivity::Connecting;
        info!(%id, attempt = self.state.reconnect_attempt, "opening connection");
        self.emit(Effect::OpenConnection(id));
    }

    pub(crate) fn on_transport(&mut self, event: TransportEvent) {
        if self.connection != Some(event.id) {
            debug!(id = %event.id, "discarding event from superseded connection");
            return;
        }

        match event.kind {
            TransportEventKind::Opened => self.on_open(),
            TransportEventKind::Frame(text) => self.route(&text),
            TransportEventKind::Closed { code, reason } => self.on_close(event.id, code, &reason),
            TransportEventKind::Error(message) => {
                warn!(id = %event.id, %message, "transport error");
                self.state.raise(&SessionError::Transport(message));
            }
        }
    }

    fn on_open(&mut self) {
        self.state.connectivity = Connectivity::Connected;
        self.state.reconnect_attempt = 0;
        self.state.clear_error();
        info!(id = ?self.connection, "connection open");

        let previous = self.heartbeat_timer.take();
        self.cancel(previous);
        self.heartbeat_elapsed = Duration::ZERO;
        self.heartbeat_timer = Some(self.schedule(TimerKind::Heartbeat, self.heartbeat_interval));

        let username = self.state.local_identity().to_owned();
        self.transmit(ClientFrame::Ping);
        self.transmit(ClientFrame::Init { username });
        self.request_roster();
        if let Some(partner) = self.state.active_partner.clone() {
            let receiver = resolve(&self.state.roster, &partner);
            self.transmit(ClientFrame::History { receiver });
        }
    }

    fn on_close(&mut self, id: ConnectionId, code: u16, reason: &str) {
        self.connection = None;
        self.state.connectivity = Connectivity::Disconnected;
        self.state.loading = false;
        let heartbeat = self.heartbeat_timer.take();
        self.cancel(heartbeat);

        if code == CLOSE_NORMAL {
            info!(%id, "connection closed normally");
            return;
        }

        let delay = self.reconnect.delay_for_attempt(self.state.reconnect_attempt);
        self.state.reconnect_attempt += 1;
        warn!(
            %id,
            code,
            reason,
            attempt = self.state.reconnect_attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "connection lost, reconnect scheduled"
        );
        let previous = self.reconnect_timer.take();
        self.cancel(previous);
        self.reconnect_timer = Some(self.schedule(TimerKind::Reconnect, delay));
    }

    pub(crate) fn heartbeat_tick(&mut self) {
        self.heartbeat_elapsed += self.heartbeat_interval;
        if self.heartbeat_elapsed >= self.heartbeat_window {
            debug!("heartbeat window elapsed, liveness probes stopped");
            return;
        }

        if self.state.visibility == Visibility::Foreground {
            self.transmit(ClientFrame::Ping);
        }
        self.heartbeat_timer = Some(self.schedule(TimerKind::Heartbeat, self.heartbeat_interval));
    }

    pub(crate) fn on_visibility(&mut self, visibility: Visibility) {
        self.state.visibility = visibility;
        if visibility == Visibility::Foreground {
            debug!("surface visible, reconnecting immediately if needed");
            self.connect();
        }
    }

    pub(crate) fn shutdown(&mut self) {
        let timers = [self.reconnect_timer.take(), self.heartbeat_timer.take()];
        for timer in timers {
            self.cancel(timer);
        }
        let retries: Vec<_> = self.pending.drain().filter_map(|(_, p)| p.timer).collect();
        for timer in retries {
            self.cancel(Some(timer));
        }

        if let Some(id) = self.connection.take() {
            self.emit(Effect::CloseConnection {
                id,
                code: CLOSE_NORMAL,
            });
        }
        self.state.connectivity = Connectivity::Disconnected;
        self.stopped = true;
        info!("session shut down");
    }
}

#[cfg(test)]
mod tests {
    use chatline_transport::CLOSE_ABNORMAL;

    use super::*;
    use crate::{
        event::{SessionEvent, TimerId},
        machine::test_support::*,
    };

    fn reconnect_timer(effects: &[Effect]) -> (TimerId, Duration) {
        scheduled(effects)
            .into_iter()
            .find(|(t, _)| t.kind == TimerKind::Reconnect)
            .expect("no reconnect scheduled")
    }

    #[test]
    fn connect_is_idempotent_while_connection_is_owned() {
        let mut machine = machine("alice");
        let first = machine.handle(SessionEvent::Connect);
        assert_eq!(first.len(), 1);
        assert_eq!(machine.state().connectivity, Connectivity::Connecting);

        assert!(machine.handle(SessionEvent::Connect).is_empty());
    }

    #[test]
    fn connect_while_connected_is_a_noop() {
        let (mut machine, id) = connected("alice");
        assert!(machine.handle(SessionEvent::Connect).is_empty());
        assert_eq!(machine.connection, Some(id));
        assert_eq!(machine.state().connectivity, Connectivity::Connected);
    }

    #[test]
    fn open_runs_handshake_in_order() {
        let mut machine = machine("alice");
        let id = opened_id(&machine.handle(SessionEvent::Connect));
        let effects = machine.handle(transport(id, TransportEventKind::Opened));

        assert_eq!(
            frames(&effects),
            vec![
                ClientFrame::Ping,
                ClientFrame::Init {
                    username: "alice".into()
                },
                ClientFrame::GetUsers,
            ]
        );
        let state = machine.state();
        assert_eq!(state.connectivity, Connectivity::Connected);
        assert_eq!(state.reconnect_attempt, 0);
        assert!(state.loading);
        assert!(state.error.is_none());

        let timers = scheduled(&effects);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].0.kind, TimerKind::Heartbeat);
        assert_eq!(timers[0].1, Duration::from_secs(60));
    }

    #[test]
    fn open_requests_history_for_restored_partner() {
        let mut machine = machine("alice");
        machine.handle(SessionEvent::RestorePartner(Some("bob".into())));
        let id = opened_id(&machine.handle(SessionEvent::Connect));
        let effects = machine.handle(transport(id, TransportEventKind::Opened));

        assert_eq!(
            frames(&effects).last(),
            Some(&ClientFrame::History {
                receiver: "bob".into()
            })
        );
    }

    #[test]
    fn normal_close_does_not_reconnect() {
        let (mut machine, id) = connected("alice");
        let effects = machine.handle(closed(id, CLOSE_NORMAL));

        assert_eq!(machine.state().connectivity, Connectivity::Disconnected);
        assert!(
            scheduled(&effects)
                .iter()
                .all(|(t, _)| t.kind != TimerKind::Reconnect)
        );
    }

    #[test]
    fn repeated_failures_back_off_exponentially() {
        let mut machine = machine("alice");
        let mut id = opened_id(&machine.handle(SessionEvent::Connect));

        let (timer, delay) = reconnect_timer(&machine.handle(closed(id, CLOSE_ABNORMAL)));
        assert_eq!(delay, Duration::from_millis(1_000));
        assert_eq!(machine.state().reconnect_attempt, 1);

        id = opened_id(&machine.handle(SessionEvent::TimerFired(timer)));
        let (_, delay) = reconnect_timer(&machine.handle(closed(id, CLOSE_ABNORMAL)));
        assert_eq!(delay, Duration::from_millis(2_000));
        assert_eq!(machine.state().reconnect_attempt, 2);
    }

    #[test]
    fn reconnect_delay_is_capped() {
        let mut machine = machine("alice");
        let mut last = Duration::ZERO;
        for _ in 0..10 {
            let id = opened_id(&machine.handle(SessionEvent::Connect));
            let (_, delay) = reconnect_timer(&machine.handle(closed(id, CLOSE_ABNORMAL)));
            assert!(delay >= last);
            last = delay;
        }
        assert_eq!(last, Duration::from_millis(32_000));
    }

    #[test]
    fn successful_open_resets_attempts_and_error() {
        let mut machine = machine("alice");
        let id = opened_id(&machine.handle(SessionEvent::Connect));
        machine.handle(transport(id, TransportEventKind::Error("refused".into())));
        assert_eq!(
            machine.state().error.as_deref(),
            Some("Connection error: refused. Attempting to reconnect...")
        );
        let (timer, _) = reconnect_timer(&machine.handle(closed(id, CLOSE_ABNORMAL)));

        let id = opened_id(&machine.handle(SessionEvent::TimerFired(timer)));
        machine.handle(transport(id, TransportEventKind::Opened));
        assert_eq!(machine.state().reconnect_attempt, 0);
        assert!(machine.state().error.is_none());
    }

    #[test]
    fn events_from_superseded_connection_are_discarded() {
        let mut machine = machine("alice");
        let old = opened_id(&machine.handle(SessionEvent::Connect));
        let (timer, _) = reconnect_timer(&machine.handle(closed(old, CLOSE_ABNORMAL)));
        let new = opened_id(&machine.handle(SessionEvent::TimerFired(timer)));
        assert_ne!(old, new);

        assert!(machine.handle(closed(old, CLOSE_ABNORMAL)).is_empty());
        assert!(
            machine
                .handle(transport(old, TransportEventKind::Opened))
                .is_empty()
        );
        assert_eq!(machine.state().connectivity, Connectivity::Connecting);
        assert_eq!(machine.state().reconnect_attempt, 1);
    }

    #[test]
    fn foreground_preempts_pending_backoff() {
        let mut machine = machine("alice");
        let id = opened_id(&machine.handle(SessionEvent::Connect));
        let (timer, _) = reconnect_timer(&machine.handle(closed(id, CLOSE_ABNORMAL)));

        let effects = machine.handle(SessionEvent::Visibility(Visibility::Foreground));
        assert!(effects.contains(&Effect::CancelTimer(timer)));
        let fresh = opened_id(&effects);

        // The cancelled timer may still fire; it must not open a second connection.
        assert!(machine.handle(SessionEvent::TimerFired(timer)).is_empty());
        assert_eq!(machine.connection, Some(fresh));
    }

    #[test]
    fn foreground_flicker_opens_at_most_one_connection() {
        let mut machine = machine("alice");
        let id = opened_id(&machine.handle(SessionEvent::Connect));
        machine.handle(closed(id, CLOSE_ABNORMAL));

        let mut opened = 0;
        for visibility in [
            Visibility::Foreground,
            Visibility::Hidden,
            Visibility::Foreground,
            Visibility::Foreground,
        ] {
            opened += machine
                .handle(SessionEvent::Visibility(visibility))
                .iter()
                .filter(|e| matches!(e, Effect::OpenConnection(_)))
                .count();
        }
        assert_eq!(opened, 1);
    }

    #[test]
    fn heartbeat_skips_ping_while_hidden() {
        let (mut machine, _) = connected("alice");
        let timer = machine.heartbeat_timer.unwrap();
        machine.handle(SessionEvent::Visibility(Visibility::Hidden));

        let effects = machine.handle(SessionEvent::TimerFired(timer));
        assert!(frames(&effects).is_empty());
        assert_eq!(scheduled(&effects).len(), 1);
    }

    #[test]
    fn heartbeat_pings_while_visible() {
        let (mut machine, _) = connected("alice");
        let timer = machine.heartbeat_timer.unwrap();

        let effects = machine.handle(SessionEvent::TimerFired(timer));
        assert_eq!(frames(&effects), vec![ClientFrame::Ping]);
    }

    #[test]
    fn heartbeat_stops_after_window() {
        let (mut machine, _) = connected("alice");
        let mut ticks = 0;
        while let Some(timer) = machine.heartbeat_timer {
            machine.handle(SessionEvent::TimerFired(timer));
            ticks += 1;
            assert!(ticks <= 200, "heartbeat never stopped");
        }
        // 3h window at a 60s period.
        assert_eq!(ticks, 180);
    }

    #[test]
    fn close_cancels_heartbeat() {
        let (mut machine, id) = connected("alice");
        let heartbeat = machine.heartbeat_timer.unwrap();
        let effects = machine.handle(closed(id, CLOSE_ABNORMAL));

        assert!(effects.contains(&Effect::CancelTimer(heartbeat)));
        assert!(machine.handle(SessionEvent::TimerFired(heartbeat)).is_empty());
    }

    #[test]
    fn shutdown_closes_normally_and_cancels_timers() {
        let (mut machine, id) = connected("alice");
        let heartbeat = machine.heartbeat_timer.unwrap();
        let effects = machine.handle(SessionEvent::Shutdown);

        assert!(effects.contains(&Effect::CancelTimer(heartbeat)));
        assert!(effects.contains(&Effect::CloseConnection {
            id,
            code: CLOSE_NORMAL
        }));
        assert_eq!(machine.state().connectivity, Connectivity::Disconnected);
    }
}
