// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Engine attempt state machine with typed state transitions.
//!
//! Checkpoint: Idle → Configured → Launched → AwaitingToken → Completed.
//! Restore: Idle → Configured → Execd, then Failed only if exec itself fails.
//! Invalid transitions result in StateTransitionError.

use std::time::Instant;

use crate::error::StateTransitionError;

/// Lifecycle states of one checkpoint or restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing validated yet.
    Idle,

    /// Required options present. The image has not been touched yet.
    Configured,

    /// Engine spawned for a checkpoint.
    Launched,

    /// Engine finished, waiting for the restore token.
    AwaitingToken,

    /// Restore token received.
    Completed,

    /// Handing the process image over to the engine. Only observed again if
    /// the replacement fails.
    Execd,

    /// Attempt aborted.
    Failed,
}

impl EngineState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Configured => "Configured",
            Self::Launched => "Launched",
            Self::AwaitingToken => "AwaitingToken",
            Self::Completed => "Completed",
            Self::Execd => "Execd",
            Self::Failed => "Failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Configured) |
            // From Configured
            (Self::Configured, Self::Launched) |
            (Self::Configured, Self::Execd) |
            // From Launched
            (Self::Launched, Self::AwaitingToken) |
            // From AwaitingToken
            (Self::AwaitingToken, Self::Completed) |
            // Exec returned, so the image was not replaced
            (Self::Execd, Self::Failed) |
            // Any live state can fail
            (Self::Idle, Self::Failed) |
            (Self::Configured, Self::Failed) |
            (Self::Launched, Self::Failed) |
            (Self::AwaitingToken, Self::Failed)
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one engine attempt.
#[derive(Debug)]
pub struct EngineStateMachine {
    current_state: EngineState,
    last_transition: Instant,
    transition_count: u64,
}

impl EngineStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: EngineState::Idle,
            last_transition: Instant::now(),
            transition_count: 0,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> EngineState {
        self.current_state
    }

    /// Get time since last transition.
    pub fn time_in_current_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    /// Get total number of transitions.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: EngineState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.current_state.name(),
            to = target.name(),
            elapsed_ms = self.last_transition.elapsed().as_millis() as u64,
            "Engine state transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Move to Failed from any live state. No-op once terminal.
    pub fn fail(&mut self) {
        if !self.current_state.is_terminal() {
            let _ = self.transition_to(EngineState::Failed);
        }
    }
}

impl Default for EngineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = EngineStateMachine::new();
        assert_eq!(sm.state(), EngineState::Idle);
        assert_eq!(sm.transition_count(), 0);
    }

    #[test]
    fn test_checkpoint_path() {
        let mut sm = EngineStateMachine::new();
        for target in [
            EngineState::Configured,
            EngineState::Launched,
            EngineState::AwaitingToken,
            EngineState::Completed,
        ] {
            assert!(sm.transition_to(target).is_ok(), "to {}", target);
        }
        assert_eq!(sm.transition_count(), 4);
    }

    #[test]
    fn test_restore_path() {
        let mut sm = EngineStateMachine::new();
        sm.transition_to(EngineState::Configured).unwrap();
        sm.transition_to(EngineState::Execd).unwrap();
        assert!(!sm.state().is_terminal());

        // Only a failed exec leaves Execd.
        assert!(sm.transition_to(EngineState::Configured).is_err());
        sm.fail();
        assert_eq!(sm.state(), EngineState::Failed);
    }

    #[test]
    fn test_time_in_state_resets_on_transition() {
        let mut sm = EngineStateMachine::new();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(sm.time_in_current_state() >= std::time::Duration::from_millis(20));

        sm.transition_to(EngineState::Configured).unwrap();
        assert!(sm.time_in_current_state() < std::time::Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = EngineStateMachine::new();

        // Idle → Launched (skipping Configured)
        assert!(sm.transition_to(EngineState::Launched).is_err());

        sm.transition_to(EngineState::Configured).unwrap();
        // Configured → AwaitingToken (skipping Launched)
        assert!(sm.transition_to(EngineState::AwaitingToken).is_err());
    }

    #[test]
    fn test_terminal_states() {
        let mut sm = EngineStateMachine::new();
        sm.fail();
        assert_eq!(sm.state(), EngineState::Failed);

        let result = sm.transition_to(EngineState::Configured);
        assert!(matches!(
            result,
            Err(StateTransitionError::TerminalState { state: "Failed" })
        ));

        // Failing twice keeps the state.
        sm.fail();
        assert_eq!(sm.transition_count(), 1);
    }
}
