use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One decoded stream message. The wire `type` field selects the variant.
///
/// Unrecognized `type` values decode to [`RunEvent::Unknown`] so that newer
/// backends never break older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "session.started")]
    SessionStarted(SessionStarted),

    #[serde(rename = "reasoning.delta")]
    ReasoningDelta(Delta),
    #[serde(rename = "reasoning.complete")]
    ReasoningComplete(Completion),

    #[serde(rename = "message.delta")]
    MessageDelta(Delta),
    #[serde(rename = "message.complete")]
    MessageComplete(Completion),

    #[serde(rename = "code.delta")]
    CodeDelta(Delta),
    #[serde(rename = "code.complete")]
    CodeComplete(Completion),

    #[serde(rename = "tool.call")]
    ToolCall(ToolCall),
    #[serde(rename = "tool.result")]
    ToolResult(ToolResult),

    #[serde(rename = "usage")]
    Usage(UsageUpdate),

    #[serde(rename = "progress")]
    Progress(ProgressUpdate),

    #[serde(rename = "run.paused")]
    Paused(PauseSignal),
    #[serde(rename = "run.completed")]
    Completed(CompletionSignal),
    #[serde(rename = "run.error")]
    Error(ErrorSignal),

    #[serde(other)]
    Unknown,
}

impl RunEvent {
    /// Wire name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted(_) => "session.started",
            Self::ReasoningDelta(_) => "reasoning.delta",
            Self::ReasoningComplete(_) => "reasoning.complete",
            Self::MessageDelta(_) => "message.delta",
            Self::MessageComplete(_) => "message.complete",
            Self::CodeDelta(_) => "code.delta",
            Self::CodeComplete(_) => "code.complete",
            Self::ToolCall(_) => "tool.call",
            Self::ToolResult(_) => "tool.result",
            Self::Usage(_) => "usage",
            Self::Progress(_) => "progress",
            Self::Paused(_) => "run.paused",
            Self::Completed(_) => "run.completed",
            Self::Error(_) => "run.error",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal_signal(&self) -> bool {
        matches!(self, Self::Paused(_) | Self::Completed(_) | Self::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub delta: String,
}

/// Closes a streaming block. When `content` is absent the buffered text is committed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Also the response body of a manual action call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

/// One committed board state of the underlying task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layers of 2-D cell grids, outermost first.
    #[serde(default)]
    pub grid: Vec<Vec<Vec<u8>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    /// Raw restriction list as the backend sent it; see `view::classify_actions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_actions: Option<Vec<Value>>,
}

/// Sub-state the backend declares for the task itself, independent of the run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    NotPlayed,
    NotFinished,
    Win,
    GameOver,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Win | Self::GameOver)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotPlayed => "NOT_PLAYED",
            Self::NotFinished => "NOT_FINISHED",
            Self::Win => "WIN",
            Self::GameOver => "GAME_OVER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageUpdate {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionSignal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_count: Option<u32>,
    /// Any other summary fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSignal {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_type_is_accepted() {
        let ev: RunEvent =
            serde_json::from_value(json!({"type": "council.vote", "member": "a"})).unwrap();
        assert_eq!(ev, RunEvent::Unknown);
    }

    #[test]
    fn test_tool_result_with_snapshot() {
        let ev: RunEvent = serde_json::from_value(json!({
            "type": "tool.result",
            "name": "ACTION1",
            "result": {"ok": true},
            "snapshot": {
                "grid": [[[0, 1], [2, 3]]],
                "state": "NOT_FINISHED",
                "score": 2,
                "available_actions": [1, "ACTION2"]
            }
        }))
        .unwrap();

        let RunEvent::ToolResult(result) = ev else {
            panic!("expected tool result");
        };
        let snapshot = result.snapshot.unwrap();
        assert_eq!(snapshot.grid[0][1], vec![2, 3]);
        assert_eq!(snapshot.state, Some(TaskState::NotFinished));
        assert_eq!(snapshot.available_actions.unwrap().len(), 2);
    }

    #[test]
    fn test_unrecognized_task_state_does_not_fail() {
        let signal: PauseSignal =
            serde_json::from_value(json!({"state": "SUSPENDED"})).unwrap();
        assert_eq!(signal.state, Some(TaskState::Unknown));
        assert!(!TaskState::Unknown.is_terminal());
    }

    #[test]
    fn test_completion_keeps_extra_fields() {
        let ev: RunEvent = serde_json::from_value(json!({
            "type": "run.completed",
            "final_score": 7,
            "final_state": "WIN",
            "step_count": 42,
            "scorecard_url": "https://example.com/s/1"
        }))
        .unwrap();
        let RunEvent::Completed(done) = ev else {
            panic!("expected completion");
        };
        assert_eq!(done.final_state, Some(TaskState::Win));
        assert_eq!(done.extra["scorecard_url"], "https://example.com/s/1");
    }

    #[test]
    fn test_known_type_with_bad_fields_is_an_error() {
        let res = serde_json::from_value::<RunEvent>(json!({"type": "usage", "cost": "lots"}));
        assert!(res.is_err());
    }
}
