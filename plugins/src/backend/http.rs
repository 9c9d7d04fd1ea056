use std::time::Duration;

use arcscope_core::api::{
    BackendConfig, ByteStream, ManualActionRequest, RunBackend, RunConfiguration, ToolResult,
    TransportError,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use serde::Serialize;

const BODY_PREVIEW_LIMIT: usize = 512;

fn transport_error(err: reqwest::Error, url: &str) -> TransportError {
    let message = format!("{err} (url={url})");
    if err.is_timeout() {
        TransportError::Timeout(message)
    } else if err.is_connect() {
        TransportError::Connect(message)
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(message)
    } else {
        TransportError::Stream(message)
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().nth(BODY_PREVIEW_LIMIT).is_some() {
        out.push_str("...");
    }
    out
}

const HANDLE_PLACEHOLDER: &str = "{handle}";

/// Raw path segments of a configured route. `{handle}` is filled per call.
fn route(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| transport_error(err, &url))?;
    Err(TransportError::Status {
        status: status.as_u16(),
        body: preview_body(&body),
    })
}

async fn parse_tool_result(resp: reqwest::Response) -> Result<ToolResult, TransportError> {
    let resp = ensure_success(resp).await?;
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| transport_error(err, &url))?;

    if body.trim().is_empty() {
        return Ok(ToolResult::default());
    }

    serde_json::from_str::<ToolResult>(&body).map_err(|err| {
        TransportError::Body(format!(
            "failed to decode response body: {} | body={}",
            err,
            preview_body(&body)
        ))
    })
}

#[derive(Serialize)]
struct ContinueBody<'a> {
    message: &'a str,
}

/// `RunBackend` over HTTP: two streaming POST endpoints and one JSON call.
#[derive(Clone)]
pub struct HttpRunBackend {
    api_key: String,
    http: reqwest::Client,
    action_timeout: Duration,
    base: Url,
    start_route: Vec<String>,
    continue_route: Vec<String>,
    action_route: Vec<String>,
}

impl HttpRunBackend {
    pub fn new(cfg: &BackendConfig) -> anyhow::Result<Self> {
        // No whole-request timeout here: it would cut long-lived streams.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .build()?;
        let base = Url::parse(cfg.base_url.trim())?;
        if base.cannot_be_a_base() {
            anyhow::bail!("backend url cannot carry a path: {}", cfg.base_url);
        }
        Ok(Self {
            api_key: cfg.api_key.clone(),
            http,
            action_timeout: Duration::from_millis(cfg.timeout_ms),
            base,
            start_route: route(&cfg.start_path),
            continue_route: route(&cfg.continue_path),
            action_route: route(&cfg.action_path),
        })
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    /// Route appended to the base url; segments are percent-encoded by `Url`.
    fn endpoint(&self, route: &[String], handle: &str) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Connect(format!("invalid backend url {}", self.base)))?
            .pop_if_empty()
            .extend(route.iter().map(|segment| {
                if segment == HANDLE_PLACEHOLDER {
                    handle
                } else {
                    segment.as_str()
                }
            }));
        Ok(url)
    }

    async fn open_stream<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<ByteStream, TransportError> {
        let req = self
            .http
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(body);
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| transport_error(err, url.as_str()))?;
        let status = resp.status();
        let resp = ensure_success(resp).await?;
        tracing::debug!(
            target: "arcscope.http",
            stage = "stream.open.out",
            url = %url,
            status = %status
        );

        let url = url.to_string();
        let bytes = resp
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|err| transport_error(err, &url)));
        Ok(Box::pin(bytes))
    }
}

#[async_trait]
impl RunBackend for HttpRunBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn start_run(&self, config: &RunConfiguration) -> Result<ByteStream, TransportError> {
        let url = self.endpoint(&self.start_route, "")?;
        tracing::debug!(
            target: "arcscope.http",
            stage = "run.start.in",
            url = %url,
            puzzle = %config.target,
            agent = %config.agent,
            max_turns = config.max_turns,
            instructions_len = config.instructions.len()
        );
        self.open_stream(url, config).await
    }

    async fn continue_run(
        &self,
        session_handle: &str,
        message: &str,
    ) -> Result<ByteStream, TransportError> {
        let url = self.endpoint(&self.continue_route, session_handle)?;
        tracing::debug!(
            target: "arcscope.http",
            stage = "run.continue.in",
            url = %url,
            message_len = message.len()
        );
        self.open_stream(url, &ContinueBody { message }).await
    }

    async fn manual_action(
        &self,
        session_handle: &str,
        request: &ManualActionRequest,
    ) -> Result<ToolResult, TransportError> {
        let url = self.endpoint(&self.action_route, session_handle)?;
        tracing::debug!(
            target: "arcscope.http",
            stage = "action.in",
            url = %url,
            action = %request.action
        );
        let req = self
            .http
            .post(url.clone())
            .timeout(self.action_timeout)
            .json(request);
        let resp = self
            .auth(req)
            .send()
            .await
            .map_err(|err| transport_error(err, url.as_str()))?;
        let status = resp.status();
        let result = parse_tool_result(resp).await?;
        tracing::debug!(target: "arcscope.http", stage = "action.out", status = %status);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcscope_core::api::EventDecoder;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn backend(url: String, api_key: &str) -> HttpRunBackend {
        HttpRunBackend::new(&BackendConfig {
            base_url: url,
            api_key: api_key.to_string(),
            timeout_ms: 1_000,
            ..Default::default()
        })
        .unwrap()
    }

    async fn collect(stream: ByteStream) -> Vec<u8> {
        stream
            .map(|chunk| chunk.unwrap().to_vec())
            .concat()
            .await
    }

    #[test]
    fn test_preview_body_empty() {
        assert_eq!(preview_body("  \n"), "<empty body>");
    }

    #[test]
    fn test_preview_body_truncates() {
        let long = "x".repeat(BODY_PREVIEW_LIMIT + 10);
        let preview = preview_body(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.len(), BODY_PREVIEW_LIMIT + 3);
        assert_eq!(preview_body("short"), "short");
    }

    #[test]
    fn test_handle_is_encoded_into_path() {
        let client = backend("http://arc.local:8080/".to_string(), "");
        let url = client.endpoint(&client.continue_route, "g 1/x").unwrap();
        assert_eq!(url.as_str(), "http://arc.local:8080/api/runs/g%201%2Fx/continue");
    }

    #[test]
    fn test_base_path_is_kept() {
        let client = backend("http://arc.local/prefix/".to_string(), "");
        let url = client.endpoint(&client.start_route, "").unwrap();
        assert_eq!(url.as_str(), "http://arc.local/prefix/api/runs/stream");
    }

    #[test]
    fn test_rejects_url_without_path() {
        let cfg = BackendConfig {
            base_url: "mailto:ops@arc.local".to_string(),
            ..Default::default()
        };
        assert!(HttpRunBackend::new(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_start_streams_body() {
        let mut server = Server::new_async().await;
        let body = concat!(
            "data: {\"type\":\"session.started\",\"session_id\":\"g-1\"}\n\n",
            "data: {\"type\":\"run.paused\"}\n\n"
        );
        let _m = server
            .mock("POST", "/api/runs/stream")
            .match_header("accept", "text/event-stream")
            .match_body(Matcher::PartialJson(json!({
                "target": "ls20",
                "agent": "council",
                "max_turns": 5
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = backend(server.url(), "");
        let stream = client
            .start_run(&RunConfiguration::new("ls20", "council", 5))
            .await
            .unwrap();
        let bytes = collect(stream).await;

        let mut decoder = EventDecoder::new();
        let events = decoder.push(&bytes);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "session.started");
    }

    #[tokio::test]
    async fn test_start_status_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/runs/stream")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = backend(server.url(), "");
        let err = match client
            .start_run(&RunConfiguration::new("ls20", "council", 5))
            .await
        {
            Ok(_) => panic!("expected a status error"),
            Err(err) => err,
        };
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_continue_posts_message_to_handle() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/runs/g-7/continue")
            .match_body(Matcher::Json(json!({"message": "try action 4"})))
            .with_status(200)
            .with_body("data: {\"type\":\"run.completed\"}\n\n")
            .create_async()
            .await;

        let client = backend(server.url(), "");
        let stream = client.continue_run("g-7", "try action 4").await.unwrap();
        let bytes = collect(stream).await;
        assert!(String::from_utf8_lossy(&bytes).contains("run.completed"));
    }

    #[tokio::test]
    async fn test_manual_action_returns_tool_result() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/runs/g-7/action")
            .match_body(Matcher::Json(json!({"action": "ACTION6", "x": 3, "y": 9})))
            .with_status(200)
            .with_body(
                json!({
                    "name": "ACTION6",
                    "result": {"ok": true},
                    "snapshot": {"grid": [[[0, 1]]], "state": "NOT_FINISHED", "step": 4}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = backend(server.url(), "");
        let request = ManualActionRequest {
            action: "ACTION6".to_string(),
            x: Some(3),
            y: Some(9),
        };
        let result = client.manual_action("g-7", &request).await.unwrap();
        assert_eq!(result.name, "ACTION6");
        assert_eq!(result.snapshot.unwrap().step, Some(4));
    }

    #[tokio::test]
    async fn test_manual_action_decode_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/runs/g-7/action")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = backend(server.url(), "");
        let request = ManualActionRequest {
            action: "RESET".to_string(),
            x: None,
            y: None,
        };
        let err = client.manual_action("g-7", &request).await.unwrap_err();
        assert!(matches!(err, TransportError::Body(ref m) if m.contains("body=not json")));
    }

    #[tokio::test]
    async fn test_auth_header_included_when_api_key_set() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/runs/g-1/action")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = backend(server.url(), "secret-token");
        let request = ManualActionRequest {
            action: "ACTION1".to_string(),
            x: None,
            y: None,
        };
        client.manual_action("g-1", &request).await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_header_absent_when_api_key_empty() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/runs/g-1/action")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = backend(server.url(), "");
        let request = ManualActionRequest {
            action: "ACTION1".to_string(),
            x: None,
            y: None,
        };
        let result = client.manual_action("g-1", &request).await.unwrap();
        assert_eq!(result, ToolResult::default());
    }
}
