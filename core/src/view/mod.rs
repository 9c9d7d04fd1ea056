//! Presentation adapters: pure derivations recomputed from `RunState` on read.

mod actions;
mod derive;

pub use actions::{
    classify_actions, is_action_allowed, normalize_available_actions, ActionRestriction,
    GameAction,
};
pub use derive::{
    available_actions, current_snapshot, frame_position, gateway_open, latest_entry, staleness,
    timeline_of_kind, tool_timeline,
};
