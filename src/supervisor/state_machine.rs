use thiserror::Error;

/// Lifecycle of the supervised server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Running,
    Terminating,
    /// Exit code, `None` when the process was ended by a signal.
    Exited(Option<i32>),
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(State, State),
}

pub struct StateMachine {
    pub state: State,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: State::NotStarted }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &State) -> bool {
        matches!(
            (&self.state, to),
            (State::NotStarted, State::Running)
                | (State::Running, State::Terminating)
                | (State::Running, State::Exited(_))
                | (State::Terminating, State::Exited(_))
        )
    }

    pub fn transition(&mut self, to: State) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::debug!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }

    pub fn is_exited(&self) -> bool {
        matches!(self.state, State::Exited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state, State::NotStarted);
        assert!(sm.transition(State::Running).is_ok());
        assert!(sm.transition(State::Terminating).is_ok());
        assert!(sm.transition(State::Exited(Some(0))).is_ok());
        assert!(sm.is_exited());
    }

    #[test]
    fn child_may_exit_on_its_own() {
        let mut sm = StateMachine::new();
        sm.transition(State::Running).unwrap();
        assert!(sm.transition(State::Exited(Some(2))).is_ok());
    }

    #[test]
    fn terminating_only_once() {
        let mut sm = StateMachine::new();
        sm.transition(State::Running).unwrap();
        sm.transition(State::Terminating).unwrap();
        assert!(sm.transition(State::Terminating).is_err());
    }

    #[test]
    fn exited_is_final() {
        let mut sm = StateMachine::new();
        sm.transition(State::Running).unwrap();
        sm.transition(State::Exited(None)).unwrap();
        assert!(sm.transition(State::Running).is_err());
        assert!(sm.transition(State::Terminating).is_err());
        assert!(sm.transition(State::Exited(Some(0))).is_err());
    }

    #[test]
    fn invalid_transition() {
        let mut sm = StateMachine::new();
        // cannot terminate what never started
        assert!(sm.transition(State::Terminating).is_err());
    }
}
