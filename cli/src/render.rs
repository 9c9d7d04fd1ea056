//! Terminal rendering of a run. Everything here reads `RunState` and returns strings.

use arcscope_core::api::{
    available_actions, frame_position, RunState, RunStatus, RunSummary, TaskState, TimelineEntry, TimelineKind,
    Usage,
};
use serde::Serialize;

const CONTENT_PREVIEW_LIMIT: usize = 400;

fn kind_tag(kind: TimelineKind) -> &'static str {
    match kind {
        TimelineKind::Reasoning => "reasoning",
        TimelineKind::AssistantMessage => "message",
        TimelineKind::ToolCall => "tool.call",
        TimelineKind::ToolResult => "tool.result",
        TimelineKind::OperatorMessage => "operator",
    }
}

fn preview(content: &str) -> String {
    let flat = content.trim().replace('\n', " ");
    let mut out: String = flat.chars().take(CONTENT_PREVIEW_LIMIT).collect();
    if flat.chars().nth(CONTENT_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

pub fn format_entry(entry: &TimelineEntry) -> String {
    let mut line = format!("[{}] {}", kind_tag(entry.kind), entry.label);
    let content = preview(&entry.content);
    if !content.is_empty() {
        line.push_str(": ");
        line.push_str(&content);
    }
    if let Some(frame) = entry.frame {
        line.push_str(&format!(" (frame {})", frame + 1));
    }
    line
}

pub fn format_frame(state: &RunState) -> Option<String> {
    let (position, total) = frame_position(state)?;
    let snapshot = state.current_frame()?;
    let mut line = format!("frame {position}/{total}");
    if let Some(step) = snapshot.step {
        line.push_str(&format!(" step={step}"));
    }
    if let Some(score) = snapshot.score {
        line.push_str(&format!(" score={score}"));
    }
    if let Some(task) = snapshot.state {
        line.push_str(&format!(" state={}", task.as_str()));
    }
    if let Some(allowed) = available_actions(state) {
        let names: Vec<&str> = allowed.iter().map(|a| a.as_str()).collect();
        line.push_str(&format!(" actions={}", names.join(",")));
    }
    Some(line)
}

pub fn format_status(state: &RunState) -> String {
    let mut line = format!("status={}", state.status);
    if let Some(handle) = &state.session_handle {
        line.push_str(&format!(" session={handle}"));
    }
    if let Some(task) = state.sub_state {
        line.push_str(&format!(" task={}", task.as_str()));
    }
    if let Some(reason) = &state.pause_reason {
        line.push_str(&format!(" reason={reason:?}"));
    }
    if let Some(error) = &state.error {
        line.push_str(&format!(" error={error:?}"));
    }
    line
}

/// Prints each timeline entry once as the run progresses.
#[derive(Debug, Default)]
pub struct TimelinePrinter {
    printed: usize,
    frames_seen: usize,
    last_status: Option<RunStatus>,
}

impl TimelinePrinter {
    /// Lines for whatever changed since the previous call.
    pub fn drain(&mut self, state: &RunState) -> Vec<String> {
        let mut lines = Vec::new();

        // A fresh run starts the timeline over.
        if state.timeline.len() < self.printed || state.frames.len() < self.frames_seen {
            self.printed = 0;
            self.frames_seen = 0;
        }

        for entry in &state.timeline[self.printed..] {
            lines.push(format_entry(entry));
        }
        self.printed = state.timeline.len();

        if state.frames.len() != self.frames_seen {
            self.frames_seen = state.frames.len();
            lines.extend(format_frame(state));
        }

        if self.last_status != Some(state.status) {
            self.last_status = Some(state.status);
            lines.push(format_status(state));
        }
        lines
    }
}

/// Final summary of a run, for `--format json`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub target: Option<String>,
    pub agent: Option<String>,
    pub session_handle: Option<String>,
    pub task_state: Option<TaskState>,
    pub frames: usize,
    pub timeline_entries: usize,
    pub tool_calls: usize,
    pub committed_code: Vec<String>,
    pub usage: Usage,
    pub cost: f64,
    pub summary: Option<RunSummary>,
    pub pause_reason: Option<String>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn from_state(state: &RunState) -> Self {
        Self {
            status: state.status,
            target: state.target.clone(),
            agent: state.agent.clone(),
            session_handle: state.session_handle.clone(),
            task_state: state.sub_state,
            frames: state.frames.len(),
            timeline_entries: state.timeline.len(),
            tool_calls: state
                .timeline
                .iter()
                .filter(|e| e.kind == TimelineKind::ToolCall)
                .count(),
            committed_code: state.committed_code.clone(),
            usage: state.usage.clone(),
            cost: state.cost,
            summary: state.summary.clone(),
            pause_reason: state.pause_reason.clone(),
            error: state.error.clone(),
        }
    }
}

pub fn format_text(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("status: {}\n", report.status));
    if let Some(target) = &report.target {
        out.push_str(&format!("target: {target}\n"));
    }
    if let Some(agent) = &report.agent {
        out.push_str(&format!("agent: {agent}\n"));
    }
    if let Some(task) = report.task_state {
        out.push_str(&format!("task: {}\n", task.as_str()));
    }
    out.push_str(&format!(
        "frames: {}  timeline: {}  tool calls: {}\n",
        report.frames, report.timeline_entries, report.tool_calls
    ));
    out.push_str(&format!(
        "tokens: in={} out={} reasoning={} total={}  cost: ${:.4}\n",
        report.usage.input_tokens,
        report.usage.output_tokens,
        report.usage.reasoning_tokens,
        report.usage.total_tokens,
        report.cost
    ));
    if let Some(summary) = &report.summary {
        if let Some(score) = summary.final_score {
            out.push_str(&format!("final score: {score}\n"));
        }
        if let Some(steps) = summary.step_count {
            out.push_str(&format!("steps: {steps}\n"));
        }
    }
    if !report.committed_code.is_empty() {
        out.push_str(&format!("code blocks: {}\n", report.committed_code.len()));
    }
    if let Some(reason) = &report.pause_reason {
        out.push_str(&format!("paused: {reason}\n"));
    }
    if let Some(error) = &report.error {
        out.push_str(&format!("error: {error}\n"));
    }
    out
}
