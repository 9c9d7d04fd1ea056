use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::TransportError;
use crate::event::ToolResult;
use crate::gateway::ManualActionRequest;
use crate::state::RunConfiguration;

/// Raw response body of a streaming call.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// The backend job executor, seen from the client.
#[async_trait]
pub trait RunBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Start a run; the body is the event stream.
    async fn start_run(&self, config: &RunConfiguration) -> Result<ByteStream, TransportError>;

    /// Resume a paused run with an operator message; the body is a new event stream.
    async fn continue_run(
        &self,
        session_handle: &str,
        message: &str,
    ) -> Result<ByteStream, TransportError>;

    /// One non-streaming operator action. The response has the shape of a tool result.
    async fn manual_action(
        &self,
        session_handle: &str,
        request: &ManualActionRequest,
    ) -> Result<ToolResult, TransportError>;
}
