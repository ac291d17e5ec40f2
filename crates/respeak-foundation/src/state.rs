use crate::error::AudioError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of one capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Opening,
    Running,
    Draining,
    Closed,
    Faulted,
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Closed | CaptureState::Faulted)
    }
}

/// Shared, transition-validated state cell for a capture session.
///
/// Clones observe the same underlying state. Transitions are broadcast so an
/// owner can wait for a terminal state without polling the capture thread.
#[derive(Clone)]
pub struct SessionState {
    state: Arc<RwLock<CaptureState>>,
    state_tx: Sender<CaptureState>,
    state_rx: Receiver<CaptureState>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(CaptureState::Idle)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: CaptureState) -> Result<(), AudioError> {
        let mut current = self.state.write();

        let valid = matches!(
            (*current, new_state),
            (CaptureState::Idle, CaptureState::Opening)
                | (CaptureState::Opening, CaptureState::Running)
                | (CaptureState::Opening, CaptureState::Faulted)
                | (CaptureState::Running, CaptureState::Draining)
                | (CaptureState::Running, CaptureState::Faulted)
                | (CaptureState::Draining, CaptureState::Closed)
        );

        if !valid {
            return Err(AudioError::Fatal(format!(
                "invalid capture state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::debug!("capture state: {:?} -> {:?}", *current, new_state);
        *current = new_state;
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> CaptureState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> Receiver<CaptureState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lifecycle_is_valid() {
        let state = SessionState::new();
        for next in [
            CaptureState::Opening,
            CaptureState::Running,
            CaptureState::Draining,
            CaptureState::Closed,
        ] {
            state.transition(next).unwrap();
        }
        assert_eq!(state.current(), CaptureState::Closed);
        assert!(state.current().is_terminal());
    }

    #[test]
    fn faulted_reachable_from_opening_and_running() {
        let state = SessionState::new();
        state.transition(CaptureState::Opening).unwrap();
        state.transition(CaptureState::Faulted).unwrap();

        let state = SessionState::new();
        state.transition(CaptureState::Opening).unwrap();
        state.transition(CaptureState::Running).unwrap();
        state.transition(CaptureState::Faulted).unwrap();
        assert!(state.current().is_terminal());
    }

    #[test]
    fn skipping_states_is_rejected() {
        let state = SessionState::new();
        assert!(state.transition(CaptureState::Running).is_err());
        assert!(state.transition(CaptureState::Closed).is_err());
        assert_eq!(state.current(), CaptureState::Idle);
    }

    #[test]
    fn clones_share_state() {
        let state = SessionState::new();
        let observer = state.clone();
        state.transition(CaptureState::Opening).unwrap();
        assert_eq!(observer.current(), CaptureState::Opening);
    }

    #[test]
    fn transitions_are_broadcast() {
        let state = SessionState::new();
        let rx = state.subscribe();
        state.transition(CaptureState::Opening).unwrap();
        state.transition(CaptureState::Running).unwrap();
        assert_eq!(rx.try_recv().unwrap(), CaptureState::Opening);
        assert_eq!(rx.try_recv().unwrap(), CaptureState::Running);
    }
}
