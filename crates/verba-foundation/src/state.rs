use crate::error::AppError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Session lifecycle. The UI (or CLI status line) derives its view from this
/// state; buttons never mutate pipeline state directly.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Loading,
    Recording { paused: bool },
    Stopping,
}

/// Events that drive the session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Start,
    Loaded,
    Pause,
    Resume,
    Stop,
    Stopped,
}

pub struct SessionStateMachine {
    state: Arc<RwLock<SessionState>>,
    state_tx: Sender<SessionState>,
    state_rx: Receiver<SessionState>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(SessionState::Idle)),
            state_tx,
            state_rx,
        }
    }

    /// Apply an event, validating the transition. Invalid transitions are
    /// programming errors and reported as fatal.
    pub fn apply(&self, event: SessionEvent) -> Result<SessionState, AppError> {
        let mut current = self.state.write();

        let next = match (&*current, &event) {
            (SessionState::Idle, SessionEvent::Start) => SessionState::Loading,
            (SessionState::Loading, SessionEvent::Loaded) => {
                SessionState::Recording { paused: false }
            }
            (SessionState::Loading, SessionEvent::Stop) => SessionState::Stopping,
            (SessionState::Recording { paused: false }, SessionEvent::Pause) => {
                SessionState::Recording { paused: true }
            }
            (SessionState::Recording { paused: true }, SessionEvent::Resume) => {
                SessionState::Recording { paused: false }
            }
            (SessionState::Recording { .. }, SessionEvent::Stop) => SessionState::Stopping,
            (SessionState::Stopping, SessionEvent::Stopped) => SessionState::Idle,
            (state, event) => {
                return Err(AppError::Fatal(format!(
                    "Invalid session transition: {:?} on {:?}",
                    state, event
                )));
            }
        };

        tracing::info!("Session state: {:?} -> {:?}", *current, next);
        *current = next.clone();
        let _ = self.state_tx.send(next.clone());
        Ok(next)
    }

    pub fn current(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.current(), SessionState::Recording { paused: false })
    }

    pub fn subscribe(&self) -> Receiver<SessionState> {
        self.state_rx.clone()
    }
}
