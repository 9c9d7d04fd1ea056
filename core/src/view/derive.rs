use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::event::Snapshot;
use crate::gateway;
use crate::state::{RunState, TimelineEntry, TimelineKind};

use super::actions::{normalize_available_actions, GameAction};

/// `frames[current_frame_index]`.
pub fn current_snapshot(state: &RunState) -> Option<&Snapshot> {
    state.current_frame()
}

/// 1-based `(position, total)` for a "3/5" style indicator.
pub fn frame_position(state: &RunState) -> Option<(usize, usize)> {
    if state.frames.is_empty() {
        None
    } else {
        Some((state.current_frame_index + 1, state.frames.len()))
    }
}

pub fn timeline_of_kind<'a>(
    state: &'a RunState,
    kinds: &'a [TimelineKind],
) -> impl Iterator<Item = &'a TimelineEntry> + 'a {
    state
        .timeline
        .iter()
        .filter(move |entry| kinds.contains(&entry.kind))
}

/// Tool calls and tool results only.
pub fn tool_timeline(state: &RunState) -> Vec<&TimelineEntry> {
    timeline_of_kind(state, &[TimelineKind::ToolCall, TimelineKind::ToolResult]).collect()
}

pub fn latest_entry(state: &RunState) -> Option<&TimelineEntry> {
    state.timeline.last()
}

/// Allowed actions for the snapshot being viewed. `None` means allow all.
pub fn available_actions(state: &RunState) -> Option<BTreeSet<GameAction>> {
    current_snapshot(state)
        .and_then(|s| s.available_actions.as_deref())
        .and_then(|values| normalize_available_actions(Some(values)))
}

/// Whether the manual action affordance should be enabled.
pub fn gateway_open(state: &RunState) -> bool {
    gateway::availability(state).is_ok()
}

/// Time since the last applied event. Derived on read, never stored.
pub fn staleness(state: &RunState, now: DateTime<Utc>) -> Option<chrono::Duration> {
    state
        .last_event_at
        .map(|at| (now - at).max(chrono::Duration::zero()))
}
