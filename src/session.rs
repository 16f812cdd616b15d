//! Per-actor session state.
//!
//! Sessions are created on first interaction and live for the process
//! lifetime. Every state change goes through [`Sessions::transition`], which
//! rejects moves the table in [`SessionState::can_transition_to`] forbids.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{ActorId, SessionState};

#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    pub handle: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            handle: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Sessions {
    sessions: HashMap<ActorId, Session>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor, refreshing its handle when one is supplied.
    pub fn touch(&mut self, actor: ActorId, handle: Option<&str>) {
        let session = self.sessions.entry(actor).or_default();
        if let Some(h) = handle {
            session.handle = Some(h.to_string());
        }
    }

    pub fn state(&self, actor: ActorId) -> SessionState {
        self.sessions
            .get(&actor)
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn handle(&self, actor: ActorId) -> Option<&str> {
        self.sessions.get(&actor).and_then(|s| s.handle.as_deref())
    }

    /// Move `actor` to `to`, returning the previous state.
    pub fn transition(&mut self, actor: ActorId, to: SessionState) -> Result<SessionState> {
        let session = self.sessions.entry(actor).or_default();
        let from = session.state;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        session.state = to;
        Ok(from)
    }

    pub fn known_actors(&self) -> Vec<ActorId> {
        let mut actors: Vec<_> = self.sessions.keys().copied().collect();
        actors.sort();
        actors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InputKind;

    #[test]
    fn unknown_actor_is_idle() {
        let sessions = Sessions::new();
        assert_eq!(sessions.state(ActorId(1)), SessionState::Idle);
    }

    #[test]
    fn rejected_transition_leaves_state_alone() {
        let mut sessions = Sessions::new();
        let err = sessions.transition(ActorId(1), SessionState::Queued).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(sessions.state(ActorId(1)), SessionState::Idle);
    }

    #[test]
    fn submission_path_round_trips_to_idle() {
        let mut sessions = Sessions::new();
        let a = ActorId(1);
        sessions
            .transition(a, SessionState::AwaitingInput { kind: InputKind::Submission })
            .unwrap();
        sessions.transition(a, SessionState::Queued).unwrap();
        sessions.transition(a, SessionState::AwaitingResult).unwrap();
        let prev = sessions.transition(a, SessionState::Idle).unwrap();
        assert_eq!(prev, SessionState::AwaitingResult);
    }

    #[test]
    fn touch_keeps_latest_handle() {
        let mut sessions = Sessions::new();
        sessions.touch(ActorId(1), Some("old"));
        sessions.touch(ActorId(1), None);
        assert_eq!(sessions.handle(ActorId(1)), Some("old"));
        sessions.touch(ActorId(1), Some("new"));
        assert_eq!(sessions.handle(ActorId(1)), Some("new"));
        assert_eq!(sessions.known_actors(), vec![ActorId(1)]);
    }
}
