use std::path::PathBuf;

use arcscope_core::api::{
    ByteStream, ManualActionRequest, RunBackend, RunConfiguration, ToolResult, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;

const DEFAULT_CHUNK_BYTES: usize = 4096;

/// Serves a captured event stream from disk as if it came over the wire.
///
/// Read-only: continuing a run or sending actions is refused.
pub struct ReplayRunBackend {
    events_file: PathBuf,
    chunk_bytes: usize,
}

impl ReplayRunBackend {
    pub fn new(events_file: impl Into<PathBuf>) -> Self {
        Self {
            events_file: events_file.into(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    /// Split the body into chunks of this size. Mostly useful to exercise framing.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }
}

#[async_trait]
impl RunBackend for ReplayRunBackend {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start_run(&self, _config: &RunConfiguration) -> Result<ByteStream, TransportError> {
        let content = tokio::fs::read(&self.events_file).await.map_err(|err| {
            TransportError::Connect(format!("{}: {err}", self.events_file.display()))
        })?;
        tracing::debug!(
            target: "arcscope.replay",
            stage = "replay.open",
            file = %self.events_file.display(),
            bytes = content.len()
        );
        let chunks: Vec<Result<Bytes, TransportError>> = content
            .chunks(self.chunk_bytes)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn continue_run(
        &self,
        _session_handle: &str,
        _message: &str,
    ) -> Result<ByteStream, TransportError> {
        Err(TransportError::Connect(
            "replay backend cannot continue a run".to_string(),
        ))
    }

    async fn manual_action(
        &self,
        _session_handle: &str,
        _request: &ManualActionRequest,
    ) -> Result<ToolResult, TransportError> {
        Err(TransportError::Connect(
            "replay backend does not accept actions".to_string(),
        ))
    }
}
