//! Stream envelope decoding: raw `data: <json>` frames to typed run events.

mod decoder;
mod model;

pub use decoder::{decode_frame, decode_stream, EventDecoder};
pub use model::{
    Completion, CompletionSignal, Delta, ErrorSignal, PauseSignal, ProgressUpdate, RunEvent,
    SessionStarted, Snapshot, TaskState, ToolCall, ToolResult, UsageUpdate,
};
