//! Session lifecycle status and state machine.
//!
//! Defines the possible states of a port-forward session and the valid
//! transitions between them.

use crate::error::{TunnelError, TunnelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle status of a port-forward session.
///
/// State machine:
/// ```text
/// new()    → Unstarted
/// start()  → Starting → Ready (listener bound, tunnel dialed)
///                     → Failed (resolution, bind or dial error)
/// stop()   → Stopped (from Starting or Ready)
/// forwarder failure after Ready → Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, start() not called yet.
    Unstarted,

    /// start() is resolving the backend or waiting for the forwarder.
    Starting,

    /// Listener bound and tunnel established; local connections are forwarded.
    Ready,

    /// Stop was requested. Terminal.
    Stopped,

    /// Start failed or the forwarder died. Terminal.
    Failed,
}

impl SessionStatus {
    /// Starting or Ready: a forwarder may be running.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Starting | SessionStatus::Ready)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionStatus::Ready)
    }

    /// Stopped and Failed are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }

    /// Sessions start once.
    pub fn can_start(&self) -> bool {
        matches!(self, SessionStatus::Unstarted)
    }

    /// stop() has an effect only while a forwarder may be running.
    pub fn can_stop(&self) -> bool {
        self.is_active()
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, target),
            (Unstarted, Starting) |
            // Starting resolves exactly one way
            (Starting, Ready) |
            (Starting, Failed) |
            (Starting, Stopped) |
            // Ready ends by request or by forwarder failure
            (Ready, Stopped) |
            (Ready, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Unstarted => "unstarted",
            SessionStatus::Starting => "starting",
            SessionStatus::Ready => "ready",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a session's lifecycle.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Why the session failed; set only together with `Failed`.
    pub error: Option<TunnelError>,
    /// Last state change timestamp (UTC).
    pub last_updated: DateTime<Utc>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Unstarted,
            error: None,
            last_updated: Utc::now(),
        }
    }

    /// Attempt state transition with validation.
    ///
    /// Returns error if the transition is not valid.
    pub fn transition_to(&mut self, new_status: SessionStatus) -> TunnelResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(TunnelError::InvalidState(format!(
                "cannot transition from {} to {}",
                self.status, new_status
            )));
        }

        self.status = new_status;
        self.last_updated = Utc::now();
        Ok(())
    }

    /// Move to Failed, recording the cause.
    pub fn fail(&mut self, error: TunnelError) -> TunnelResult<()> {
        self.transition_to(SessionStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, observable session state.
///
/// Both the controller and the forwarder task apply transitions; the first
/// valid one wins and terminal states stick.
#[derive(Clone)]
pub(crate) struct StateHandle {
    tx: Arc<watch::Sender<SessionState>>,
}

impl StateHandle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::new());
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.tx.borrow().status
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub(crate) fn transition(&self, status: SessionStatus) -> TunnelResult<()> {
        let mut result = Ok(());
        self.tx.send_if_modified(|state| match state.transition_to(status) {
            Ok(()) => true,
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }

    pub(crate) fn fail(&self, error: TunnelError) -> TunnelResult<()> {
        let mut result = Ok(());
        self.tx.send_if_modified(|state| match state.fail(error) {
            Ok(()) => true,
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_active() {
        assert!(!SessionStatus::Unstarted.is_active());
        assert!(SessionStatus::Starting.is_active());
        assert!(SessionStatus::Ready.is_active());
        assert!(!SessionStatus::Stopped.is_active());
        assert!(!SessionStatus::Failed.is_active());
    }

    #[test]
    fn test_status_can_start() {
        assert!(SessionStatus::Unstarted.can_start());
        assert!(!SessionStatus::Starting.can_start());
        assert!(!SessionStatus::Ready.can_start());
        assert!(!SessionStatus::Stopped.can_start());
        assert!(!SessionStatus::Failed.can_start());
    }

    #[test]
    fn test_status_can_stop() {
        assert!(!SessionStatus::Unstarted.can_stop());
        assert!(SessionStatus::Starting.can_stop());
        assert!(SessionStatus::Ready.can_stop());
        assert!(!SessionStatus::Stopped.can_stop());
        assert!(!SessionStatus::Failed.can_stop());
    }

    #[test]
    fn test_valid_transitions() {
        use SessionStatus::*;

        assert!(Unstarted.can_transition_to(Starting));
        assert!(!Unstarted.can_transition_to(Ready));
        assert!(!Unstarted.can_transition_to(Stopped));

        assert!(Starting.can_transition_to(Ready));
        assert!(Starting.can_transition_to(Failed));
        assert!(Starting.can_transition_to(Stopped));
        assert!(!Starting.can_transition_to(Starting));

        assert!(Ready.can_transition_to(Stopped));
        assert!(Ready.can_transition_to(Failed));
        assert!(!Ready.can_transition_to(Starting));
        assert!(!Ready.can_transition_to(Ready));
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        use SessionStatus::*;
        for terminal in [Stopped, Failed] {
            assert!(terminal.is_terminal());
            for target in [Unstarted, Starting, Ready, Stopped, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_state_transition() {
        let mut state = SessionState::new();
        assert_eq!(state.status, SessionStatus::Unstarted);

        assert!(state.transition_to(SessionStatus::Starting).is_ok());
        assert!(state.transition_to(SessionStatus::Ready).is_ok());
        assert!(state.transition_to(SessionStatus::Stopped).is_ok());
        assert_eq!(state.status, SessionStatus::Stopped);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_invalid_transition() {
        let mut state = SessionState::new();

        let result = state.transition_to(SessionStatus::Ready);
        assert!(matches!(result, Err(TunnelError::InvalidState(_))));
        assert_eq!(state.status, SessionStatus::Unstarted);
    }

    #[test]
    fn test_ready_and_failed_are_exclusive() {
        let mut state = SessionState::new();
        state.transition_to(SessionStatus::Starting).unwrap();
        state.fail(TunnelError::Tunnel("dial".into())).unwrap();

        assert!(state.transition_to(SessionStatus::Ready).is_err());
        assert_eq!(state.status, SessionStatus::Failed);
        assert_eq!(state.error, Some(TunnelError::Tunnel("dial".into())));
    }

    #[test]
    fn test_fail_after_stop_is_rejected() {
        let mut state = SessionState::new();
        state.transition_to(SessionStatus::Starting).unwrap();
        state.transition_to(SessionStatus::Stopped).unwrap();

        assert!(state.fail(TunnelError::Tunnel("late".into())).is_err());
        assert_eq!(state.status, SessionStatus::Stopped);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_handle_notifies_subscribers() {
        let handle = StateHandle::new();
        let mut rx = handle.subscribe();

        handle.transition(SessionStatus::Starting).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, SessionStatus::Starting);

        // Rejected transitions leave subscribers untouched
        assert!(handle.transition(SessionStatus::Unstarted).is_err());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(handle.status(), SessionStatus::Starting);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Ready.to_string(), "ready");
        assert_eq!(SessionStatus::Failed.to_string(), "failed");
    }
}
