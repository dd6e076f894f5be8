//! Session lifecycle: one logical connection to the generation service.
//!
//! `SessionConnection` is owned by the engine thread. Connecting runs on a
//! background thread; while an attempt is in flight every `connect()` call
//! returns the same `PendingConnect`. Inbound traffic is translated into
//! `ConnectionNotice`s for the engine to act on.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use promptdj_types::FilteredTextSet;

use crate::protocol::{AudioChunk, Inbound, ServerMessage, SessionEvent, SessionId};
use crate::transport::{Connector, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// What the engine has to do about an inbound item.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionNotice {
    /// Setup acknowledged.
    Connected,
    /// A prompt text was filtered; already recorded in the filtered set.
    FilteredPrompt(String),
    /// Audio for the chunk processor.
    AudioChunks(Vec<AudioChunk>),
    /// The session is gone. The handle has been invalidated.
    Lost(String),
}

struct ConnectSlot {
    id: SessionId,
    outcome: Mutex<SlotState>,
    done: Condvar,
}

#[derive(Default)]
struct SlotState {
    finished: Option<Result<(), String>>,
    session: Option<Box<dyn Session>>,
}

/// Shared handle to an in-flight connect attempt.
#[derive(Clone)]
pub struct PendingConnect {
    slot: Arc<ConnectSlot>,
}

impl PendingConnect {
    fn new(id: SessionId) -> Self {
        Self {
            slot: Arc::new(ConnectSlot {
                id,
                outcome: Mutex::new(SlotState::default()),
                done: Condvar::new(),
            }),
        }
    }

    fn resolve(&self, result: std::io::Result<Box<dyn Session>>) {
        let mut state = match self.slot.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match result {
            Ok(session) => {
                state.session = Some(session);
                state.finished = Some(Ok(()));
            }
            Err(e) => state.finished = Some(Err(e.to_string())),
        }
        self.slot.done.notify_all();
    }

    pub fn session_id(&self) -> SessionId {
        self.slot.id
    }

    /// Whether two handles refer to the same attempt.
    pub fn same_attempt(&self, other: &PendingConnect) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Outcome, if the attempt has finished.
    pub fn outcome(&self) -> Option<Result<(), String>> {
        let state = match self.slot.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.finished.clone()
    }

    /// Block until the attempt finishes or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<Result<(), String>> {
        let guard = match self.slot.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (state, _) = match self
            .slot
            .done
            .wait_timeout_while(guard, timeout, |s| s.finished.is_none())
        {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.finished.clone()
    }

    fn take_session(&self) -> Option<Box<dyn Session>> {
        let mut state = match self.slot.outcome.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.session.take()
    }
}

impl std::fmt::Debug for PendingConnect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnect")
            .field("session", &self.slot.id)
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Owns at most one live session with the generation service.
pub struct SessionConnection {
    connector: Arc<dyn Connector>,
    model: String,
    inbound_tx: Sender<SessionEvent>,
    state: ConnectionState,
    next_id: u64,
    current: Option<SessionId>,
    pending: Option<PendingConnect>,
    session: Option<Box<dyn Session>>,
    filtered: FilteredTextSet,
}

impl SessionConnection {
    pub fn new(
        connector: Arc<dyn Connector>,
        model: impl Into<String>,
        inbound_tx: Sender<SessionEvent>,
    ) -> Self {
        Self {
            connector,
            model: model.into(),
            inbound_tx,
            state: ConnectionState::Disconnected,
            next_id: 1,
            current: None,
            pending: None,
            session: None,
            filtered: FilteredTextSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    pub fn filtered(&self) -> &FilteredTextSet {
        &self.filtered
    }

    /// A session handle is installed and usable for outbound control.
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_connecting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn session_mut(&mut self) -> Option<&mut (dyn Session + 'static)> {
        self.session.as_deref_mut()
    }

    /// Start a connect attempt, or join the one in flight.
    ///
    /// Returns `None` when a session is already installed.
    pub fn connect(&mut self) -> Option<PendingConnect> {
        if self.session.is_some() {
            return None;
        }
        if let Some(pending) = &self.pending {
            return Some(pending.clone());
        }

        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        self.current = Some(id);
        self.filtered.clear();
        self.state = ConnectionState::Connecting;

        let pending = PendingConnect::new(id);
        let worker = pending.clone();
        let connector = Arc::clone(&self.connector);
        let model = self.model.clone();
        let inbound_tx = self.inbound_tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("promptdj-connect-{}", id.0))
            .spawn(move || {
                let result = connector.connect(id, &model, inbound_tx);
                worker.resolve(result);
            });
        if let Err(e) = spawned {
            pending.resolve(Err(e));
        }

        self.pending = Some(pending.clone());
        Some(pending)
    }

    /// Collect the result of the in-flight attempt, installing the session
    /// handle on success. Returns `None` while still connecting or when no
    /// attempt is pending.
    pub fn poll_connect(&mut self) -> Option<Result<(), String>> {
        let outcome = self.pending.as_ref()?.outcome()?;
        let pending = self.pending.take()?;

        match &outcome {
            Ok(()) => match pending.take_session() {
                Some(session) => {
                    info!(target: "session", "{} established", pending.session_id());
                    self.session = Some(session);
                }
                None => {
                    self.fail();
                    return Some(Err("connect finished without a session".to_string()));
                }
            },
            Err(e) => {
                warn!(target: "session", "{} connect failed: {}", pending.session_id(), e);
                self.fail();
            }
        }
        Some(outcome)
    }

    /// Translate one inbound item. Items from sessions other than the
    /// current one are dropped.
    pub fn handle_event(&mut self, event: SessionEvent) -> Option<ConnectionNotice> {
        if self.current != Some(event.session) {
            debug!(target: "session", "dropping inbound from stale {}", event.session);
            return None;
        }

        match event.inbound {
            Inbound::Message(ServerMessage::SetupComplete {}) => {
                self.state = ConnectionState::Connected;
                Some(ConnectionNotice::Connected)
            }
            Inbound::Message(ServerMessage::FilteredPrompt(filtered)) => {
                info!(
                    target: "session",
                    "prompt filtered: {} ({})",
                    filtered.text,
                    filtered.filtered_reason.as_deref().unwrap_or("no reason given")
                );
                self.filtered.insert(filtered.text.clone());
                Some(ConnectionNotice::FilteredPrompt(filtered.text))
            }
            Inbound::Message(ServerMessage::ServerContent(content)) => {
                if content.audio_chunks.is_empty() {
                    None
                } else {
                    Some(ConnectionNotice::AudioChunks(content.audio_chunks))
                }
            }
            Inbound::Message(ServerMessage::Error { message }) => {
                self.fail();
                Some(ConnectionNotice::Lost(message))
            }
            Inbound::Message(ServerMessage::Close {}) => {
                self.fail();
                Some(ConnectionNotice::Lost("session closed by service".to_string()))
            }
            Inbound::Disconnected(reason) => {
                self.fail();
                Some(ConnectionNotice::Lost(reason))
            }
        }
    }

    /// Destroy the session handle and any pending attempt.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.pending = None;
        self.current = None;
        if self.state != ConnectionState::Errored {
            self.state = ConnectionState::Disconnected;
        }
    }

    fn fail(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.pending = None;
        self.current = None;
        self.state = ConnectionState::Errored;
    }
}
