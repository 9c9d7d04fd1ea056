//! Pure transition function: `(state, event) -> state`.
//!
//! Everything here is deterministic. Wall-clock stamping and I/O live in the
//! session controller so that folding the same events always gives the same state.

use serde_json::Value;

use crate::event::{
    Completion, CompletionSignal, PauseSignal, ProgressUpdate, RunEvent, SessionStarted, Snapshot,
    ToolCall, ToolResult, UsageUpdate,
};

use super::transitions::{StateTransition, TransitionError};
use super::types::{
    Progress, RunState, RunStatus, RunSummary, TimelineEntry, TimelineKind,
};

pub const STREAM_ENDED_REASON: &str = "stream ended before a terminal event";
pub const CANCELLED_MESSAGE: &str = "run cancelled by operator";

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Ignored,
    Updated,
    StatusChanged { from: RunStatus, to: RunStatus },
}

impl Applied {
    pub fn changed(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

#[derive(Clone, Copy)]
enum Buffer {
    Reasoning,
    Message,
    Code,
}

/// Apply one event to an owned state.
pub fn reduce(mut state: RunState, event: &RunEvent) -> RunState {
    state.apply(event);
    state
}

/// Apply events strictly in order.
pub fn fold<'a, I>(state: RunState, events: I) -> RunState
where
    I: IntoIterator<Item = &'a RunEvent>,
{
    events.into_iter().fold(state, reduce)
}

impl RunState {
    pub fn apply(&mut self, event: &RunEvent) -> Applied {
        if matches!(event, RunEvent::Unknown) {
            return Applied::Ignored;
        }
        if self.status.is_terminal() {
            tracing::debug!(
                target: "arcscope.run",
                status = %self.status,
                event = event.kind(),
                "event after terminal status ignored"
            );
            return Applied::Ignored;
        }

        match event {
            RunEvent::SessionStarted(p) => self.on_session_started(p),
            RunEvent::ReasoningDelta(d) => self.on_delta(Buffer::Reasoning, &d.delta),
            RunEvent::ReasoningComplete(c) => self.on_complete(Buffer::Reasoning, c),
            RunEvent::MessageDelta(d) => self.on_delta(Buffer::Message, &d.delta),
            RunEvent::MessageComplete(c) => self.on_complete(Buffer::Message, c),
            RunEvent::CodeDelta(d) => self.on_delta(Buffer::Code, &d.delta),
            RunEvent::CodeComplete(c) => self.on_complete(Buffer::Code, c),
            RunEvent::ToolCall(call) => self.on_tool_call(call),
            RunEvent::ToolResult(result) => self.on_tool_result(result),
            RunEvent::Usage(u) => self.on_usage(u),
            RunEvent::Progress(p) => self.on_progress(p),
            RunEvent::Paused(p) => self.on_paused(p),
            RunEvent::Completed(c) => self.on_completed(c),
            RunEvent::Error(e) => {
                let message = if e.message.trim().is_empty() {
                    "backend reported an error".to_string()
                } else {
                    e.message.clone()
                };
                self.fail(message)
            }
            RunEvent::Unknown => Applied::Ignored,
        }
    }

    /// `paused -> running` with the operator's message recorded in the timeline.
    pub fn resume(&mut self, message: &str) -> Result<Applied, TransitionError> {
        if self.status != RunStatus::Paused {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to: RunStatus::Running,
            });
        }
        let applied = self.transition(RunStatus::Running)?;
        if !message.trim().is_empty() {
            self.push_entry(TimelineKind::OperatorMessage, None, message.to_string(), None);
        }
        self.pause_reason = None;
        self.action_error = None;
        Ok(applied)
    }

    /// Fatal failure. Frames and timeline stay for diagnosis.
    pub fn fail(&mut self, message: impl Into<String>) -> Applied {
        match self.transition(RunStatus::Error) {
            Ok(applied) => {
                self.error = Some(message.into());
                applied
            }
            Err(_) => Applied::Ignored,
        }
    }

    /// Transport closed cleanly without a terminal event.
    pub fn end_of_stream(&mut self) -> Applied {
        if !matches!(self.status, RunStatus::Idle | RunStatus::Running) {
            return Applied::Ignored;
        }
        if self.sub_state.map(|s| s.is_terminal()).unwrap_or(false) {
            self.on_completed(&CompletionSignal {
                final_state: self.sub_state,
                ..Default::default()
            })
        } else {
            self.on_paused(&PauseSignal {
                reason: Some(STREAM_ENDED_REASON.to_string()),
                state: None,
            })
        }
    }

    /// Synthetic terminal transition for an operator cancel.
    pub fn cancel(&mut self) -> Applied {
        if matches!(self.status, RunStatus::Idle | RunStatus::Running) {
            self.fail(CANCELLED_MESSAGE)
        } else {
            Applied::Ignored
        }
    }

    /// Fold a manual action response with the streamed tool-result transition.
    /// Also accepted after completion while the task itself is still open.
    /// A terminal task state reported here ends a paused run.
    pub fn apply_action_result(&mut self, result: &ToolResult) -> Applied {
        if self.status == RunStatus::Error {
            return Applied::Ignored;
        }
        let applied = self.on_tool_result(result);
        let reported = result.snapshot.as_ref().and_then(|s| s.state);
        let Some(final_state) = reported.filter(|s| s.is_terminal()) else {
            return applied;
        };
        match self.status {
            RunStatus::Paused => self.on_completed(&CompletionSignal {
                final_state: Some(final_state),
                step_count: result.snapshot.as_ref().and_then(|s| s.step),
                ..Default::default()
            }),
            RunStatus::Completed => {
                if let Some(summary) = self.summary.as_mut() {
                    summary.final_state = Some(final_state);
                }
                self.session_handle = None;
                applied
            }
            _ => applied,
        }
    }

    fn transition(&mut self, to: RunStatus) -> Result<Applied, TransitionError> {
        let from = self.status;
        if from == to {
            return Ok(Applied::Updated);
        }
        StateTransition::validate(from, to).inspect_err(|err| {
            tracing::warn!(target: "arcscope.run", error = %err, "status change rejected");
        })?;
        self.status = to;
        tracing::debug!(target: "arcscope.run", stage = "status", from = %from, to = %to);
        Ok(Applied::StatusChanged { from, to })
    }

    /// Content arriving before the ack means the backend skipped it.
    fn ensure_running(&mut self) -> Applied {
        if self.status == RunStatus::Idle {
            self.transition(RunStatus::Running)
                .unwrap_or(Applied::Updated)
        } else {
            Applied::Updated
        }
    }

    fn on_session_started(&mut self, p: &SessionStarted) -> Applied {
        match self.session_handle.as_deref() {
            None => {
                self.frames.clear();
                self.current_frame_index = 0;
                self.timeline.clear();
                self.streaming_message.clear();
                self.streaming_reasoning.clear();
                self.streaming_code.clear();
                self.committed_code.clear();
                self.error = None;
                self.summary = None;
                self.pause_reason = None;
                self.action_error = None;
                self.session_handle = Some(p.session_id.clone());
                if let Some(target) = &p.target {
                    self.target = Some(target.clone());
                }
                if let Some(agent) = &p.agent {
                    self.agent = Some(agent.clone());
                }
            }
            Some(existing) if existing != p.session_id => {
                tracing::warn!(
                    target: "arcscope.run",
                    existing = %existing,
                    received = %p.session_id,
                    "session handle already assigned; keeping the original"
                );
            }
            Some(_) => {}
        }
        self.ensure_running()
    }

    fn buffer_mut(&mut self, buffer: Buffer) -> &mut String {
        match buffer {
            Buffer::Reasoning => &mut self.streaming_reasoning,
            Buffer::Message => &mut self.streaming_message,
            Buffer::Code => &mut self.streaming_code,
        }
    }

    fn on_delta(&mut self, buffer: Buffer, delta: &str) -> Applied {
        let applied = self.ensure_running();
        self.buffer_mut(buffer).push_str(delta);
        applied
    }

    fn on_complete(&mut self, buffer: Buffer, c: &Completion) -> Applied {
        let applied = self.ensure_running();
        let buffered = std::mem::take(self.buffer_mut(buffer));
        let content = match &c.content {
            Some(content) if !content.is_empty() => content.clone(),
            _ => buffered,
        };
        if content.is_empty() {
            return applied;
        }
        match buffer {
            Buffer::Reasoning => {
                self.push_entry(TimelineKind::Reasoning, c.label.clone(), content, None)
            }
            Buffer::Message => {
                self.push_entry(TimelineKind::AssistantMessage, c.label.clone(), content, None)
            }
            Buffer::Code => self.committed_code.push(content),
        }
        applied
    }

    fn on_tool_call(&mut self, call: &ToolCall) -> Applied {
        let applied = self.ensure_running();
        self.push_entry(
            TimelineKind::ToolCall,
            non_empty(&call.name),
            render_value(&call.arguments),
            None,
        );
        applied
    }

    fn on_tool_result(&mut self, result: &ToolResult) -> Applied {
        let applied = self.ensure_running();
        let frame = result.snapshot.as_ref().map(|s| self.push_frame(s.clone()));
        self.push_entry(
            TimelineKind::ToolResult,
            non_empty(&result.name),
            render_value(&result.result),
            frame,
        );
        applied
    }

    /// Append a frame, auto-following only when the operator was at the tail.
    fn push_frame(&mut self, snapshot: Snapshot) -> usize {
        let follow = self.is_following();
        if let Some(state) = snapshot.state {
            self.sub_state = Some(state);
        }
        self.frames.push(snapshot);
        let index = self.frames.len() - 1;
        if follow {
            self.current_frame_index = index;
        }
        index
    }

    fn on_usage(&mut self, u: &UsageUpdate) -> Applied {
        let applied = self.ensure_running();
        // Counters come straight off the wire; clamp instead of overflowing.
        let usage = &mut self.usage;
        usage.input_tokens = usage.input_tokens.saturating_add(u.input_tokens);
        usage.output_tokens = usage.output_tokens.saturating_add(u.output_tokens);
        usage.reasoning_tokens = usage.reasoning_tokens.saturating_add(u.reasoning_tokens);
        let total = if u.total_tokens > 0 {
            u.total_tokens
        } else {
            u.input_tokens.saturating_add(u.output_tokens)
        };
        usage.total_tokens = usage.total_tokens.saturating_add(total);
        if u.cost.is_finite() && u.cost > 0.0 {
            self.cost += u.cost;
        }
        applied
    }

    fn on_progress(&mut self, p: &ProgressUpdate) -> Applied {
        let applied = self.ensure_running();
        let progress = self.progress.get_or_insert_with(Progress::default);
        if p.stage.is_some() {
            progress.stage = p.stage.clone();
        }
        if p.message.is_some() {
            progress.message = p.message.clone();
        }
        if p.iteration.is_some() {
            progress.iteration = p.iteration;
        }
        applied
    }

    fn on_paused(&mut self, p: &PauseSignal) -> Applied {
        match self.transition(RunStatus::Paused) {
            Ok(applied) => {
                self.pause_reason = p.reason.clone();
                if let Some(state) = p.state {
                    self.sub_state = Some(state);
                }
                applied
            }
            Err(_) => Applied::Ignored,
        }
    }

    fn on_completed(&mut self, c: &CompletionSignal) -> Applied {
        let applied = match self.transition(RunStatus::Completed) {
            Ok(applied) => applied,
            Err(_) => return Applied::Ignored,
        };
        if let Some(state) = c.final_state {
            self.sub_state = Some(state);
        }
        self.summary = Some(RunSummary {
            final_score: c.final_score,
            final_state: c.final_state,
            step_count: c.step_count,
            extra: c.extra.clone(),
        });
        // The handle survives only while the task itself can still take input.
        let task_open = self.sub_state.map(|s| !s.is_terminal()).unwrap_or(false);
        if !task_open {
            self.session_handle = None;
        }
        applied
    }

    fn push_entry(
        &mut self,
        kind: TimelineKind,
        label: Option<String>,
        content: String,
        frame: Option<usize>,
    ) {
        let label = label.unwrap_or_else(|| kind.default_label().to_string());
        self.timeline.push(TimelineEntry {
            kind,
            label,
            content,
            frame,
        });
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
