#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcscope_core::api::{
    ByteStream, ControllerOptions, ManualActionRequest, RunBackend, RunConfiguration,
    RunController, RunState, ToolResult, TransportError,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

/// One scripted response body.
pub struct Script {
    pub chunks: Vec<Result<Bytes, TransportError>>,
    /// Keep the connection open after the last chunk.
    pub hang: bool,
}

impl Script {
    pub fn frames(frames: &[String]) -> Self {
        Self {
            chunks: frames.iter().map(|f| Ok(sse(f))).collect(),
            hang: false,
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn then_error(mut self, message: &str) -> Self {
        self.chunks
            .push(Err(TransportError::Stream(message.to_string())));
        self
    }
}

/// Backend that replays scripted bodies in request order.
#[derive(Default)]
pub struct ScriptedBackend {
    streams: Mutex<VecDeque<Script>>,
    actions: Mutex<VecDeque<Result<ToolResult, TransportError>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn with_streams(scripts: Vec<Script>) -> Arc<Self> {
        let backend = Self::default();
        backend.streams.lock().unwrap().extend(scripts);
        Arc::new(backend)
    }

    pub fn push_action(&self, result: Result<ToolResult, TransportError>) {
        self.actions.lock().unwrap().push_back(result);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn next_stream(&self) -> Result<ByteStream, TransportError> {
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::Connect("connection refused".to_string()))?;
        let body = futures::stream::iter(script.chunks);
        let stream: ByteStream = if script.hang {
            Box::pin(body.chain(futures::stream::pending()))
        } else {
            Box::pin(body)
        };
        Ok(stream)
    }
}

#[async_trait]
impl RunBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start_run(&self, config: &RunConfiguration) -> Result<ByteStream, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("start {} {}", config.target, config.max_turns));
        self.next_stream()
    }

    async fn continue_run(
        &self,
        session_handle: &str,
        message: &str,
    ) -> Result<ByteStream, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("continue {session_handle} {message}"));
        self.next_stream()
    }

    async fn manual_action(
        &self,
        session_handle: &str,
        request: &ManualActionRequest,
    ) -> Result<ToolResult, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("action {session_handle} {}", request.action));
        self.actions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Connect("connection refused".to_string())))
    }
}

pub fn controller(backend: Arc<ScriptedBackend>) -> RunController {
    RunController::new(backend, ControllerOptions::default())
}

pub fn sse(json: &str) -> Bytes {
    Bytes::from(format!("data: {json}\n\n"))
}

pub fn started(id: &str) -> String {
    format!(r#"{{"type":"session.started","session_id":"{id}"}}"#)
}

/// A tool result carrying snapshot number `step`.
pub fn turn(step: u32) -> String {
    format!(
        r#"{{"type":"tool.result","name":"ACTION1","result":{{"ok":true}},"snapshot":{{"grid":[[[{step},0],[0,{step}]]],"state":"NOT_FINISHED","step":{step},"score":0}}}}"#
    )
}

pub fn paused(state: &str) -> String {
    format!(r#"{{"type":"run.paused","reason":"turn limit","state":"{state}"}}"#)
}

pub fn completed(state: &str) -> String {
    format!(r#"{{"type":"run.completed","final_state":"{state}","final_score":1,"step_count":5}}"#)
}

pub fn message(text: &str) -> String {
    format!(r#"{{"type":"message.complete","content":"{text}"}}"#)
}

/// Poll until `until` holds or give up after one second.
pub async fn settle(controller: &RunController, until: impl Fn(&RunState) -> bool) {
    for _ in 0..200 {
        if controller.read(&until) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "run never reached the expected state (status {})",
        controller.status()
    );
}
