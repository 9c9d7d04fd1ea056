//! Status transition rules and validation.

use super::types::RunStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: RunStatus },
}

pub struct StateTransition;

impl StateTransition {
    /// Validate a status change. Staying in the same status is not a transition.
    pub fn validate(from: RunStatus, to: RunStatus) -> Result<(), TransitionError> {
        // Terminal states only leave through a fresh start.
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (RunStatus::Idle, RunStatus::Running) => true,

            // Backend skipped the ack and paused or finished straight away.
            (RunStatus::Idle, RunStatus::Paused) => true,

            (RunStatus::Running, RunStatus::Paused) => true,

            // The only backwards edge: resume with an operator message.
            (RunStatus::Paused, RunStatus::Running) => true,

            (_, RunStatus::Completed) | (_, RunStatus::Error) => true,

            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }
}
