//! Session state machine.

/// Represents the lifecycle state of a shell session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Process is being started.
    #[default]
    Spawning,
    /// Idle, accepting `run()` calls.
    Ready,
    /// A command is running; further `run()` calls are rejected.
    Executing,
    /// The running command was interrupted; draining before returning to Ready.
    Interrupted,
    /// The running command hit its deadline; draining before returning to Ready.
    TimedOut,
    /// Process terminated and descriptors released.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Spawning -> Ready
    /// - Ready -> Executing
    /// - Executing -> Ready | Interrupted | TimedOut
    /// - Interrupted -> Ready
    /// - TimedOut -> Ready
    /// - any non-closed state -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Spawning, Ready)
                | (Ready, Executing)
                | (Executing, Ready)
                | (Executing, Interrupted)
                | (Executing, TimedOut)
                | (Interrupted, Ready)
                | (TimedOut, Ready)
                | (Spawning, Closed)
                | (Ready, Closed)
                | (Executing, Closed)
                | (Interrupted, Closed)
                | (TimedOut, Closed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ShellTetherError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Check if session can accept commands.
    pub fn can_execute(&self) -> bool {
        matches!(self, SessionState::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let mut state = SessionState::Spawning;
        assert!(state.transition_to(SessionState::Ready).is_ok());
        assert!(state.transition_to(SessionState::Executing).is_ok());
        assert!(state.transition_to(SessionState::Ready).is_ok());

        assert!(state.transition_to(SessionState::Executing).is_ok());
        assert!(state.transition_to(SessionState::Interrupted).is_ok());
        assert!(state.transition_to(SessionState::Ready).is_ok());

        assert!(state.transition_to(SessionState::Executing).is_ok());
        assert!(state.transition_to(SessionState::TimedOut).is_ok());
        assert!(state.transition_to(SessionState::Ready).is_ok());

        assert!(state.transition_to(SessionState::Closed).is_ok());
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    fn test_ready_cannot_be_interrupted() {
        let mut state = SessionState::Ready;
        assert!(state.transition_to(SessionState::Interrupted).is_err());
        assert_eq!(state, SessionState::Ready);
    }

    #[test]
    fn test_executing_cannot_execute_again() {
        let mut state = SessionState::Executing;
        assert!(state.transition_to(SessionState::Executing).is_err());
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut state = SessionState::Closed;
        assert!(state.is_terminal());
        assert!(state.transition_to(SessionState::Ready).is_err());
        assert!(state.transition_to(SessionState::Closed).is_err());
        assert!(state.transition_to(SessionState::Executing).is_err());
    }

    #[test]
    fn test_can_execute() {
        assert!(!SessionState::Spawning.can_execute());
        assert!(SessionState::Ready.can_execute());
        assert!(!SessionState::Executing.can_execute());
        assert!(!SessionState::Interrupted.can_execute());
        assert!(!SessionState::Closed.can_execute());
    }

    #[test]
    fn test_default() {
        assert_eq!(SessionState::default(), SessionState::Spawning);
    }
}
