//! # Run state
//!
//! The canonical `RunState` for one run attempt and the pure transition
//! function that folds decoded events into it.
//!
//! - `frames` and `timeline` are append-only within a run; only a fresh start
//!   resets them.
//! - `current_frame_index` follows the newest frame unless the operator has
//!   scrubbed away from the tail.
//! - Status only moves forward, except `paused -> running` on resume.

pub mod reducer;
pub mod transitions;
pub mod types;

pub use reducer::{fold, reduce, Applied, CANCELLED_MESSAGE, STREAM_ENDED_REASON};
pub use transitions::{StateTransition, TransitionError};
pub use types::{
    Progress, RunConfiguration, RunState, RunStatus, RunSummary, TimelineEntry, TimelineKind,
    Usage,
};
