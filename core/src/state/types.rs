//! Run state data model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::event::{Snapshot, TaskState};

/// Operator-supplied parameters for one run. Immutable once the run starts.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Puzzle/game identifier, e.g. `ls20`.
    pub target: String,
    /// Agent or model identity.
    pub agent: String,
    #[serde(default)]
    pub instructions: String,
    /// Turn/iteration limit.
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl RunConfiguration {
    pub fn new(target: impl Into<String>, agent: impl Into<String>, max_turns: u32) -> Self {
        Self {
            target: target.into(),
            agent: agent.into(),
            max_turns,
            ..Default::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Checks run before any network call is made.
    pub fn validate(&self, require_credential: bool) -> Result<(), ValidationError> {
        if self.target.trim().is_empty() {
            return Err(ValidationError::Missing { field: "target" });
        }
        if self.agent.trim().is_empty() {
            return Err(ValidationError::Missing { field: "agent" });
        }
        if self.max_turns == 0 {
            return Err(ValidationError::NotPositive { field: "max_turns" });
        }
        let has_credential = self
            .credential
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false);
        if require_credential && !has_credential {
            return Err(ValidationError::CredentialRequired);
        }
        Ok(())
    }
}

impl fmt::Debug for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfiguration")
            .field("target", &self.target)
            .field("agent", &self.agent)
            .field("instructions", &self.instructions)
            .field("max_turns", &self.max_turns)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Outer lifecycle status of a run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    Reasoning,
    AssistantMessage,
    ToolCall,
    ToolResult,
    /// Text the operator sent with a continue call.
    OperatorMessage,
}

impl TimelineKind {
    pub fn default_label(self) -> &'static str {
        match self {
            Self::Reasoning => "Reasoning",
            Self::AssistantMessage => "Assistant",
            Self::ToolCall => "Tool call",
            Self::ToolResult => "Tool result",
            Self::OperatorMessage => "Operator",
        }
    }
}

/// One committed, immutable unit of narrated activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub kind: TimelineKind,
    pub label: String,
    pub content: String,
    /// Index into `frames` of the snapshot this entry produced, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

/// Final summary fields, copied verbatim from the completion event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub final_score: Option<i64>,
    pub final_state: Option<TaskState>,
    pub step_count: Option<u32>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Last status line reported by a multi-stage solver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: Option<String>,
    pub message: Option<String>,
    pub iteration: Option<u32>,
}

/// The single mutable aggregate for one run attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub target: Option<String>,
    pub agent: Option<String>,

    pub frames: Vec<Snapshot>,
    pub current_frame_index: usize,
    pub timeline: Vec<TimelineEntry>,

    pub streaming_message: String,
    pub streaming_reasoning: String,
    pub streaming_code: String,
    /// Completed code blocks, oldest first.
    pub committed_code: Vec<String>,

    pub usage: Usage,
    /// Cumulative cost in USD.
    pub cost: f64,

    pub error: Option<String>,
    pub session_handle: Option<String>,

    pub sub_state: Option<TaskState>,
    pub summary: Option<RunSummary>,
    pub progress: Option<Progress>,
    pub pause_reason: Option<String>,
    /// Last manual action failure; dismissible and never affects `status`.
    pub action_error: Option<String>,

    /// Stamped by the controller when an event is applied; not part of the fold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Fresh state for a new run attempt.
    pub fn fresh(config: &RunConfiguration) -> Self {
        Self {
            target: Some(config.target.clone()),
            agent: Some(config.agent.clone()),
            ..Default::default()
        }
    }

    pub fn current_frame(&self) -> Option<&Snapshot> {
        self.frames.get(self.current_frame_index)
    }

    /// True when the operator is looking at the newest frame (or there is none).
    pub fn is_following(&self) -> bool {
        self.frames.is_empty() || self.current_frame_index + 1 == self.frames.len()
    }

    /// Operator scrubbing. Clamped to the available frames; history is untouched.
    pub fn select_frame(&mut self, index: usize) -> Option<usize> {
        if self.frames.is_empty() {
            self.current_frame_index = 0;
            return None;
        }
        self.current_frame_index = index.min(self.frames.len() - 1);
        Some(self.current_frame_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_missing_fields() {
        let cfg = RunConfiguration::new("", "agent", 5);
        assert_eq!(
            cfg.validate(false),
            Err(ValidationError::Missing { field: "target" })
        );

        let cfg = RunConfiguration::new("ls20", "  ", 5);
        assert_eq!(
            cfg.validate(false),
            Err(ValidationError::Missing { field: "agent" })
        );

        let cfg = RunConfiguration::new("ls20", "agent", 0);
        assert_eq!(
            cfg.validate(false),
            Err(ValidationError::NotPositive { field: "max_turns" })
        );
    }

    #[test]
    fn test_validate_credential_requirement() {
        let cfg = RunConfiguration::new("ls20", "agent", 5);
        assert!(cfg.validate(false).is_ok());
        assert_eq!(
            cfg.validate(true),
            Err(ValidationError::CredentialRequired)
        );
        assert_eq!(
            cfg.clone().with_credential(" ").validate(true),
            Err(ValidationError::CredentialRequired)
        );
        assert!(cfg.with_credential("sk-test").validate(true).is_ok());
    }

    #[test]
    fn test_debug_redacts_credential() {
        let cfg = RunConfiguration::new("ls20", "agent", 5).with_credential("sk-secret");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_select_frame_clamps() {
        let mut state = RunState::default();
        assert_eq!(state.select_frame(3), None);

        state.frames = vec![Snapshot::default(), Snapshot::default()];
        assert_eq!(state.select_frame(7), Some(1));
        assert_eq!(state.select_frame(0), Some(0));
        assert!(!state.is_following());
    }
}
