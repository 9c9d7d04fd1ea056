//! Transport session manager.
//!
//! One `RunController` per run view. It owns the live stream, folds decoded
//! events into the canonical `RunState` and hands out snapshots and change
//! notices to whoever renders them.

mod controller;
mod traits;

pub use controller::{ControllerOptions, RunController, RunNotice};
pub use traits::{ByteStream, RunBackend};
