//! Session manager driving the state machine.
//!
//! All inputs (UI commands, transport callbacks, timer fires) flow through one
//! unbounded queue owned by the manager task, so every state transition is
//! applied in arrival order on a single timeline.

use std::{collections::HashMap, sync::Arc};

use chatline_core::{
    CipherError, Clock, PartnerStore, SessionState, SystemClock, Visibility,
};
use chatline_transport::{
    ClientFrame, ConnectionHandle, ConnectionId, Connector, TransportEvent, TransportEventKind,
    TransportSink,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::{
    config::SessionConfig,
    event::{Effect, SendRequest, SessionEvent, TimerId},
    machine::SessionMachine,
};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),
}

/// Error returned by [`SessionHandle`] once the session is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("Session is shut down")]
    Closed,
}

/// Owns the session timeline and performs the machine's effects.
pub struct SessionManager<C, S>
where
    C: Connector,
    S: PartnerStore,
{
    endpoint: String,
    machine: SessionMachine,
    connector: C,
    store: Arc<S>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl<C, S> SessionManager<C, S>
where
    C: Connector + 'static,
    S: PartnerStore + 'static,
{
    /// Create a manager for `local_identity` and the handle used to drive it.
    ///
    /// # Errors
    /// Returns error if the configured cipher key is unusable.
    pub fn new(
        config: &SessionConfig,
        local_identity: impl Into<String>,
        connector: C,
        store: Arc<S>,
    ) -> Result<(Self, SessionHandle), ManagerError> {
        let machine = SessionMachine::new(config, local_identity, Arc::new(SystemClock))?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(machine.state().clone());

        let handle = SessionHandle {
            events: events_tx.clone(),
            state: state_rx,
        };
        let manager = Self {
            endpoint: config.endpoint.clone(),
            machine,
            connector,
            store,
            events_tx,
            events_rx,
            state_tx,
            connections: HashMap::new(),
            timers: HashMap::new(),
        };
        Ok((manager, handle))
    }

    /// Replace the clock used to timestamp outbound messages.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.machine.clock = clock;
        self
    }

    /// Run the manager on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Restore the active partner, connect, then process events until
    /// shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let profile = self.machine.state().local_identity().to_owned();
        match self.store.load(&profile).await {
            Ok(partner) => self.dispatch(SessionEvent::RestorePartner(partner)).await,
            Err(e) => warn!(%profile, error = %e, "could not restore active partner"),
        }
        self.dispatch(SessionEvent::Connect).await;

        loop {
            let next = tokio::select! {
                event = self.events_rx.recv() => event,
                () = self.state_tx.closed() => None,
            };
            let Some(event) = next else {
                debug!("all session handles dropped");
                self.dispatch(SessionEvent::Shutdown).await;
                break;
            };

            self.dispatch(event).await;
            if self.machine.is_stopped() {
                break;
            }
        }

        self.teardown();
    }

    async fn dispatch(&mut self, event: SessionEvent) {
        match &event {
            SessionEvent::TimerFired(timer) => {
                self.timers.remove(timer);
            }
            SessionEvent::Transport(TransportEvent {
                id,
                kind: TransportEventKind::Closed { .. },
            }) => {
                self.connections.remove(id);
            }
            _ => {}
        }

        for effect in self.machine.handle(event) {
            self.apply(effect).await;
        }

        let next = self.machine.state();
        self.state_tx.send_if_modified(|current| {
            if current == next {
                false
            } else {
                current.clone_from(next);
                true
            }
        });
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::OpenConnection(id) => {
                let handle = self.connector.open(id, &self.endpoint, self.sink());
                self.connections.insert(id, handle);
            }
            Effect::CloseConnection { id, code } => {
                if let Some(handle) = self.connections.remove(&id) {
                    if let Err(e) = handle.close(code) {
                        debug!(%id, error = %e, "connection already gone");
                    }
                }
            }
            Effect::SendFrame { id, frame } => self.send_frame(id, &frame),
            Effect::ScheduleTimer { timer, after } => {
                let events = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = events.send(SessionEvent::TimerFired(timer));
                });
                if let Some(previous) = self.timers.insert(timer, task) {
                    previous.abort();
                }
            }
            Effect::CancelTimer(timer) => {
                if let Some(task) = self.timers.remove(&timer) {
                    task.abort();
                }
            }
            Effect::PersistActivePartner(partner) => {
                let profile = self.machine.state().local_identity();
                if let Err(e) = self.store.save(profile, &partner).await {
                    warn!(%profile, error = %e, "failed to persist active partner");
                }
            }
            Effect::ForgetActivePartner => {
                let profile = self.machine.state().local_identity();
                if let Err(e) = self.store.clear(profile).await {
                    warn!(%profile, error = %e, "failed to forget active partner");
                }
            }
        }
    }

    fn send_frame(&self, id: ConnectionId, frame: &ClientFrame) {
        let Some(handle) = self.connections.get(&id) else {
            debug!(%id, "no live handle, frame dropped");
            return;
        };
        match frame.encode() {
            Ok(text) => {
                if let Err(e) = handle.send_text(text) {
                    warn!(%id, error = %e, "failed to queue frame");
                }
            }
            Err(e) => error!(%id, error = %e, "failed to encode frame"),
        }
    }

    fn sink(&self) -> TransportSink {
        let events = self.events_tx.clone();
        Arc::new(move |event| {
            let _ = events.send(SessionEvent::Transport(event));
        })
    }

    fn teardown(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
        self.connections.clear();
        info!("session manager stopped");
    }
}

/// Cloneable handle for issuing commands and observing state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    fn emit(&self, event: SessionEvent) -> Result<(), HandleError> {
        self.events.send(event).map_err(|_| HandleError::Closed)
    }

    /// Open a connection unless one is live.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn connect(&self) -> Result<(), HandleError> {
        self.emit(SessionEvent::Connect)
    }

    /// Send a text message to `partner`.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn send_text(
        &self,
        partner: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), HandleError> {
        self.emit(SessionEvent::Send(SendRequest::text(partner, body)))
    }

    /// Send a reference to an already uploaded file to `partner`.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn send_file(
        &self,
        partner: impl Into<String>,
        storage_path: impl Into<String>,
        file_name: Option<String>,
        mime_type: Option<String>,
    ) -> Result<(), HandleError> {
        self.emit(SessionEvent::Send(SendRequest::file(
            partner,
            storage_path,
            file_name,
            mime_type,
        )))
    }

    /// Ask the backend for a roster snapshot.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn request_roster(&self) -> Result<(), HandleError> {
        self.emit(SessionEvent::RequestRoster)
    }

    /// Make `address` the active partner and load its history.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn open_conversation(&self, address: impl Into<String>) -> Result<(), HandleError> {
        self.emit(SessionEvent::OpenConversation(address.into()))
    }

    /// Leave the active conversation and forget the persisted partner.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn close_conversation(&self) -> Result<(), HandleError> {
        self.emit(SessionEvent::CloseConversation)
    }

    /// Report a visibility change of the hosting surface.
    ///
    /// # Errors
    /// Returns error if the session is shut down.
    pub fn set_visibility(&self, visibility: Visibility) -> Result<(), HandleError> {
        self.emit(SessionEvent::Visibility(visibility))
    }

    /// Close the connection normally and stop the session.
    ///
    /// # Errors
    /// Returns error if the session is already shut down.
    pub fn shutdown(&self) -> Result<(), HandleError> {
        self.emit(SessionEvent::Shutdown)
    }

    /// Latest state snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Stream of state snapshots, starting with the current one.
    #[must_use]
    pub fn updates(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.clone())
    }
}
