use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{DecodeError, TransportError};

use super::model::RunEvent;

const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental decoder for `data: <json>\n\n` framed streams.
///
/// - Bytes are buffered until a blank-line boundary arrives, so multi-byte
///   characters split across chunks survive.
/// - Multiple `data:` lines in one frame are joined with `\n`.
/// - Comment lines (`: keep-alive`) and `event:`/`id:`/`retry:` fields are ignored.
/// - A malformed frame is logged and counted, never fatal.
#[derive(Debug)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    // Bytes of `buffer` already searched for a boundary.
    scanned: usize,
    max_frame_bytes: usize,
    // Set after an oversized partial frame was thrown away; skip to the next boundary.
    discarding: bool,
    dropped: u64,
    decoded: u64,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_frame_bytes: max_frame_bytes.max(1),
            discarding: false,
            dropped: 0,
            decoded: 0,
        }
    }

    /// Frames dropped so far (malformed, oversized or not utf-8).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// Bytes held back waiting for a boundary.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one transport chunk, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<RunEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some((end, sep_len)) = find_boundary(&self.buffer, self.scanned) {
            let frame: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            self.scanned = 0;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            self.decode_into(&frame, &mut out);
        }

        if self.buffer.len() > self.max_frame_bytes {
            let size = self.buffer.len();
            if !self.discarding {
                self.record_drop(&DecodeError::Oversized {
                    size,
                    limit: self.max_frame_bytes,
                });
            }
            self.buffer.clear();
            self.discarding = true;
        }
        // A separator can still complete across the last two bytes.
        self.scanned = self.buffer.len().saturating_sub(2);

        out
    }

    /// Decode whatever is left once the transport has closed.
    pub fn finish(&mut self) -> Vec<RunEvent> {
        let frame = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        let discarding = std::mem::replace(&mut self.discarding, false);
        let mut out = Vec::new();
        if !discarding && !frame.iter().all(u8::is_ascii_whitespace) {
            self.decode_into(&frame, &mut out);
        }
        out
    }

    fn decode_into(&mut self, frame: &[u8], out: &mut Vec<RunEvent>) {
        if frame.len() > self.max_frame_bytes {
            self.record_drop(&DecodeError::Oversized {
                size: frame.len(),
                limit: self.max_frame_bytes,
            });
            return;
        }
        match decode_frame(frame) {
            Ok(Some(event)) => {
                self.decoded += 1;
                if matches!(event, RunEvent::Unknown) {
                    tracing::trace!(target: "arcscope.stream", "ignoring unknown event type");
                }
                out.push(event);
            }
            Ok(None) => {}
            Err(err) => self.record_drop(&err),
        }
    }

    fn record_drop(&mut self, err: &DecodeError) {
        self.dropped += 1;
        tracing::warn!(
            target: "arcscope.stream",
            stage = "decode.drop",
            dropped = self.dropped,
            error = %err,
            "dropping malformed stream frame"
        );
    }
}

/// Position of the first blank-line boundary at or after `from`, and the separator length.
fn find_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' {
            if buf[i + 1] == b'\n' {
                return Some((i, 2));
            }
            if buf[i + 1] == b'\r' && buf.get(i + 2) == Some(&b'\n') {
                return Some((i, 3));
            }
        }
        i += 1;
    }
    None
}

/// Decode one complete frame. `Ok(None)` means the frame carried no payload.
pub fn decode_frame(frame: &[u8]) -> Result<Option<RunEvent>, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::Utf8)?;

    let mut data: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if data.is_empty() {
        return Ok(None);
    }
    let payload = data.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Ok(None);
    }

    serde_json::from_str::<RunEvent>(payload)
        .map(Some)
        .map_err(|source| DecodeError::Json { source })
}

/// Turn a byte stream into a lazy event stream.
///
/// Ends after the first transport error, which is yielded as the final item.
pub fn decode_stream<S>(
    bytes: S,
    mut decoder: EventDecoder,
) -> impl Stream<Item = Result<RunEvent, TransportError>>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Send + Unpin,
{
    async_stream::stream! {
        let mut bytes = bytes;
        let mut failed = None;
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            }
        }
        match failed {
            Some(err) => yield Err(err),
            None => {
                for event in decoder.finish() {
                    yield Ok(event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::model::{Delta, ToolCall};
    use serde_json::json;

    fn frame(v: serde_json::Value) -> String {
        format!("data: {}\n\n", v)
    }

    #[test]
    fn test_decodes_multiple_frames_in_one_chunk() {
        let input = format!(
            "{}{}",
            frame(json!({"type": "reasoning.delta", "delta": "hm"})),
            frame(json!({"type": "tool.call", "name": "ACTION1", "arguments": {}}))
        );
        let mut dec = EventDecoder::new();
        let events = dec.push(input.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RunEvent::ReasoningDelta(Delta {
                delta: "hm".to_string()
            })
        );
        assert_eq!(
            events[1],
            RunEvent::ToolCall(ToolCall {
                id: None,
                name: "ACTION1".to_string(),
                arguments: json!({}),
            })
        );
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let input = frame(json!({"type": "message.delta", "delta": "hello"}));
        let (a, b) = input.split_at(12);

        let mut dec = EventDecoder::new();
        assert!(dec.push(a.as_bytes()).is_empty());
        assert_eq!(dec.pending_bytes(), 12);
        let events = dec.push(b.as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(dec.pending_bytes(), 0);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let input = frame(json!({"type": "message.delta", "delta": "网格"}));
        let bytes = input.as_bytes();
        let split = input.find('网').unwrap() + 1;

        let mut dec = EventDecoder::new();
        assert!(dec.push(&bytes[..split]).is_empty());
        let events = dec.push(&bytes[split..]);
        assert_eq!(
            events,
            vec![RunEvent::MessageDelta(Delta {
                delta: "网格".to_string()
            })]
        );
    }

    #[test]
    fn test_malformed_frame_does_not_poison_stream() {
        let input = format!(
            "{}data: {{not json\n\n{}",
            frame(json!({"type": "code.delta", "delta": "a"})),
            frame(json!({"type": "code.delta", "delta": "b"}))
        );
        let mut dec = EventDecoder::new();
        let events = dec.push(input.as_bytes());
        assert_eq!(events.len(), 2);
        assert_eq!(dec.dropped(), 1);
        assert_eq!(dec.decoded(), 2);
    }

    #[test]
    fn test_comments_done_and_crlf() {
        let input = ": keep-alive\n\nevent: message\r\ndata: {\"type\":\"progress\",\"stage\":\"iterating\"}\r\n\r\ndata: [DONE]\n\n";
        let mut dec = EventDecoder::new();
        let events = dec.push(input.as_bytes());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RunEvent::Progress(_)));
        assert_eq!(dec.dropped(), 0);
    }

    #[test]
    fn test_separator_split_across_pushes() {
        let body = "data: {\"type\":\"progress\",\"stage\":\"a\"}";
        let mut dec = EventDecoder::new();
        assert!(dec.push(body.as_bytes()).is_empty());
        assert!(dec.push(b"\r\n").is_empty());
        assert!(dec.push(b"\r").is_empty());
        let events = dec.push(b"\ndata: {\"type\":\"progress\",\"stage\":\"b\"}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RunEvent::Progress(p) if p.stage.as_deref() == Some("a")));

        let events = dec.push(b"\n");
        assert!(matches!(&events[0], RunEvent::Progress(p) if p.stage.as_deref() == Some("b")));
        assert_eq!(dec.pending_bytes(), 0);
    }

    #[test]
    fn test_large_frame_in_small_chunks() {
        let text = "z".repeat(20_000);
        let input = frame(json!({"type": "message.complete", "content": text}));
        let mut dec = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in input.as_bytes().chunks(7) {
            events.extend(dec.push(chunk));
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], RunEvent::MessageComplete(c) if c.content.as_deref() == Some(text.as_str())));
        assert_eq!(dec.pending_bytes(), 0);
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let input = "data: {\"type\":\"run.error\",\ndata: \"message\":\"boom\"}\n\n";
        let events = EventDecoder::new().push(input.as_bytes());
        assert!(matches!(&events[0], RunEvent::Error(e) if e.message == "boom"));
    }

    #[test]
    fn test_oversized_partial_frame_is_skipped_until_boundary() {
        let mut dec = EventDecoder::with_max_frame_bytes(48);
        let big = format!("data: {}", "x".repeat(64));
        assert!(dec.push(big.as_bytes()).is_empty());
        assert_eq!(dec.dropped(), 1);
        assert_eq!(dec.pending_bytes(), 0);

        let rest = format!(
            "yyyy\n\n{}",
            frame(json!({"type": "usage", "cost": 0.5}))
        );
        let events = dec.push(rest.as_bytes());
        assert_eq!(events.len(), 1);
        assert_eq!(dec.dropped(), 1);
    }

    #[test]
    fn test_finish_decodes_unterminated_tail() {
        let mut dec = EventDecoder::new();
        assert!(dec
            .push(b"data: {\"type\":\"run.completed\",\"step_count\":3}")
            .is_empty());
        let events = dec.finish();
        assert_eq!(events.len(), 1);
        assert!(dec.finish().is_empty());
    }

    #[tokio::test]
    async fn test_decode_stream_yields_transport_error_last() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from(frame(json!({"type": "reasoning.delta", "delta": "x"})))),
            Err(TransportError::Stream("reset by peer".to_string())),
            Ok(Bytes::from(frame(json!({"type": "reasoning.delta", "delta": "y"})))),
        ];
        let stream = decode_stream(futures::stream::iter(chunks), EventDecoder::new());
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(TransportError::Stream(_))));
    }

    #[test]
    fn test_decode_stream_flushes_tail_on_clean_end() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"message.delta\",")),
            Ok(Bytes::from_static(b"\"delta\":\"tail\"}")),
        ];
        let items: Vec<_> = tokio_test::block_on(
            decode_stream(futures::stream::iter(chunks), EventDecoder::new()).collect(),
        );
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Ok(RunEvent::MessageDelta(d)) if d.delta == "tail"));
    }
}
