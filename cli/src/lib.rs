//! arcscope-cli library: modules exposed for unit tests and the binary.

pub mod commands;
pub mod flow;
pub mod render;
