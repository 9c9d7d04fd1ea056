//! Manual action gateway.
//!
//! Operator actions travel over an ordinary request/response call, not the
//! stream. Their result is folded back with the same tool-result transition
//! the stream uses, so frames and timeline stay consistent regardless of source.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::state::{RunState, RunStatus};
use crate::view::{is_action_allowed, normalize_available_actions, GameAction};

/// A discrete operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualAction {
    pub action: GameAction,
    /// `(x, y)` grid coordinate; required by `ACTION6` and rejected otherwise.
    pub coordinates: Option<(u32, u32)>,
}

impl ManualAction {
    pub fn new(action: GameAction) -> Self {
        Self {
            action,
            coordinates: None,
        }
    }

    pub fn at(action: GameAction, x: u32, y: u32) -> Self {
        Self {
            action,
            coordinates: Some((x, y)),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        match (self.action.requires_coordinates(), self.coordinates) {
            (true, None) => Err(GatewayError::MissingCoordinates {
                action: self.action.as_str(),
            }),
            (false, Some(_)) => Err(GatewayError::UnexpectedCoordinates {
                action: self.action.as_str(),
            }),
            _ => Ok(()),
        }
    }

    pub fn to_request(&self) -> ManualActionRequest {
        ManualActionRequest {
            action: self.action.as_str().to_string(),
            x: self.coordinates.map(|(x, _)| x),
            y: self.coordinates.map(|(_, y)| y),
        }
    }

    pub fn label(&self) -> String {
        match self.coordinates {
            Some((x, y)) => format!("{} ({x}, {y})", self.action),
            None => self.action.to_string(),
        }
    }
}

/// Body of the manual-action call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualActionRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<u32>,
}

/// Whether the run can accept a manual action right now.
///
/// The gateway opens only between turns: a session handle must exist, the
/// stream must not be live, and the task's last declared sub-state must still
/// be open. A terminal sub-state closes the gateway even while the run is paused.
pub fn availability(state: &RunState) -> Result<&str, GatewayError> {
    let handle = state
        .session_handle
        .as_deref()
        .ok_or(GatewayError::NoSession)?;

    match state.status {
        RunStatus::Paused => {}
        RunStatus::Completed if state.sub_state.is_some() => {}
        status @ (RunStatus::Idle | RunStatus::Running | RunStatus::Error | RunStatus::Completed) => {
            return Err(GatewayError::Busy(status));
        }
    }

    if let Some(sub_state) = state.sub_state {
        if sub_state.is_terminal() {
            return Err(GatewayError::TaskFinished(sub_state.as_str().to_string()));
        }
    }
    Ok(handle)
}

/// Full precondition check for one action. Returns the session handle to use.
///
/// The action must be offered by the newest snapshot, whichever frame the
/// operator is viewing. An absent or unclassifiable list allows everything.
pub fn check(state: &RunState, action: &ManualAction) -> Result<String, GatewayError> {
    action.validate()?;
    let handle = availability(state)?;
    let offered = state
        .frames
        .last()
        .and_then(|s| s.available_actions.as_deref());
    let allowed = normalize_available_actions(offered);
    if !is_action_allowed(allowed.as_ref(), action.action) {
        return Err(GatewayError::NotAllowed {
            action: action.action.as_str(),
        });
    }
    Ok(handle.to_string())
}
