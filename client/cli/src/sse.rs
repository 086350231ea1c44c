//! A small, dependency-free SSE frame reader over a streaming response body.
//!
//! The teacher's client talks to a WebSocket hub (`api::ws` on the server
//! side); Driftbox's server speaks plain SSE instead (`event: <type>\ndata:
//! <json>\n\n`, with a bare `: connected\n\n` comment as the first frame), so
//! there's no teacher module to adapt here — this hand-rolls just enough of
//! the SSE wire format to split bytes on blank-line frame boundaries and pull
//! out `event:`/`data:` fields, per the shape the server actually writes in
//! `api/rest/events.rs`.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
}

pub struct SseStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buf: Vec<u8>,
}

impl SseStream {
    pub fn new(resp: reqwest::Response) -> Self {
        Self {
            inner: Box::pin(resp.bytes_stream()),
            buf: Vec::new(),
        }
    }

    /// Pull the next complete frame, reading more bytes off the stream as
    /// needed. Returns `None` once the stream ends.
    pub async fn next_event(&mut self) -> anyhow::Result<Option<SseEvent>> {
        loop {
            if let Some(frame) = take_frame(&mut self.buf) {
                if let Some(event) = parse_frame(&frame) {
                    return Ok(Some(event));
                }
                // Comment-only frame (e.g. `: connected`) or empty: keep reading.
                continue;
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }
}

/// Extracts one `\n\n`-terminated frame from the front of `buf`, if present.
fn take_frame(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let pos = buf.windows(2).position(|w| w == b"\n\n")?;
    let frame = buf[..pos].to_vec();
    buf.drain(..pos + 2);
    Some(frame)
}

fn parse_frame(frame: &[u8]) -> Option<SseEvent> {
    let text = std::str::from_utf8(frame).ok()?;
    let mut event = None;
    let mut data: Option<String> = None;
    let mut saw_field = false;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
            saw_field = true;
        } else if let Some(rest) = line.strip_prefix("data:") {
            let piece = rest.trim();
            data = Some(match data {
                Some(existing) => format!("{existing}\n{piece}"),
                None => piece.to_string(),
            });
            saw_field = true;
        }
        // Lines starting with ':' are comments (the keepalive frame); ignored.
    }

    if saw_field {
        Some(SseEvent { event, data })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_event_frame() {
        let frame = b"event: create\ndata: {\"path\":\"/a.txt\"}";
        let event = parse_frame(frame).unwrap();
        assert_eq!(event.event.as_deref(), Some("create"));
        assert_eq!(event.data.as_deref(), Some("{\"path\":\"/a.txt\"}"));
    }

    #[test]
    fn comment_only_frame_has_no_fields() {
        let frame = b": connected";
        assert!(parse_frame(frame).is_none());
    }

    #[test]
    fn take_frame_splits_on_blank_line_and_drains_buffer() {
        let mut buf = b"event: modify\ndata: {}\n\nevent: delete\ndata: {}\n\n".to_vec();
        let first = take_frame(&mut buf).unwrap();
        assert_eq!(first, b"event: modify\ndata: {}");
        assert_eq!(buf, b"event: delete\ndata: {}\n\n");
    }

    #[test]
    fn take_frame_returns_none_on_incomplete_buffer() {
        let mut buf = b"event: modify\ndata: {}".to_vec();
        assert!(take_frame(&mut buf).is_none());
    }
}
