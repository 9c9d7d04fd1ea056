//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `arcscope_core::api` instead of reaching into internal modules.

pub use crate::config::{
    apply_env_overrides, load_default, load_from_path, AppConfig, BackendConfig, LoggingConfig,
    StreamConfig,
};
pub use crate::error::{
    CliError, DecodeError, GatewayError, RunError, TransportError, ValidationError,
};
pub use crate::event::{
    decode_frame, decode_stream, EventDecoder, RunEvent, Snapshot, TaskState, ToolResult,
};
pub use crate::gateway::{ManualAction, ManualActionRequest};
pub use crate::session::{ByteStream, ControllerOptions, RunBackend, RunController, RunNotice};
pub use crate::state::{
    fold, reduce, Applied, RunConfiguration, RunState, RunStatus, RunSummary, TimelineEntry,
    TimelineKind, Usage,
};
pub use crate::view::{
    available_actions, current_snapshot, frame_position, gateway_open, is_action_allowed,
    latest_entry, staleness, timeline_of_kind, tool_timeline, GameAction,
};
