//! Server-sent events
//!
//! All three vendors stream completions as SSE. [`SseParser`] splits raw
//! bytes into events; [`chunk_stream`] runs a vendor [`ChunkDecoder`] over
//! them and yields one [`AgentResponse`] per decoded chunk.

use std::collections::VecDeque;

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Response;
use swarm_core::error::{AgentError, Result};
use swarm_core::message::Message;
use swarm_core::provider::{CHUNK_INDEX_KEY, CompletionStream};
use swarm_core::response::AgentResponse;

use crate::http::transport_error;

/// One event: optional `event:` name and the joined `data:` lines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser; bytes may be split anywhere, including inside a character
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed bytes, returning every event completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&rest))
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data.join("\n"),
    })
}

/// Events of a streaming HTTP response
pub(crate) fn events(
    provider: &'static str,
    response: Response,
) -> BoxStream<'static, Result<SseEvent>> {
    let bytes = response.bytes_stream().boxed();
    let state = (bytes, SseParser::default(), VecDeque::new(), false);

    futures::stream::unfold(state, move |state| async move {
        let (mut bytes, mut parser, mut pending, mut done) = state;
        loop {
            if let Some(event) = pending.pop_front() {
                return Some((Ok(event), (bytes, parser, pending, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => pending.extend(parser.feed(&chunk)),
                Some(Err(err)) => {
                    let err = transport_error(provider, &err);
                    return Some((Err(err), (bytes, parser, pending, true)));
                }
                None => {
                    done = true;
                    pending.extend(parser.finish());
                }
            }
        }
    })
    .boxed()
}

/// Turns vendor events into chunk responses
pub(crate) trait ChunkDecoder: Send + 'static {
    /// Zero or more chunks for one event
    fn decode(&mut self, event: &SseEvent) -> Result<Vec<AgentResponse>>;

    /// Chunks still owed when the stream ends
    fn finish(&mut self) -> Vec<AgentResponse> {
        Vec::new()
    }
}

/// Counts chunks and stamps every chunk message with its origin and index
#[derive(Debug)]
pub(crate) struct ChunkStamp {
    provider: &'static str,
    pub model: String,
    next: usize,
}

impl ChunkStamp {
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            next: 0,
        }
    }

    pub fn stamp(&mut self, message: Message) -> Message {
        let index = self.next;
        self.next += 1;
        message
            .with_origin(self.provider, self.model.clone())
            .with_extra(CHUNK_INDEX_KEY, serde_json::Value::from(index))
    }
}

pub(crate) fn parse_data<T: serde::de::DeserializeOwned>(
    provider: &str,
    event: &SseEvent,
) -> Result<T> {
    serde_json::from_str(&event.data)
        .map_err(|e| AgentError::Parse(format!("bad {provider} stream event: {e}")))
}

/// Decode a streaming response into per-chunk responses
pub(crate) fn chunk_stream<D: ChunkDecoder>(
    provider: &'static str,
    response: Response,
    decoder: D,
) -> CompletionStream {
    let state = (events(provider, response), decoder, VecDeque::new(), false);

    let stream = futures::stream::unfold(state, |state| async move {
        let (mut events, mut decoder, mut pending, mut done) = state;
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, (events, decoder, pending, done)));
            }
            if done {
                return None;
            }
            match events.next().await {
                Some(Ok(event)) => match decoder.decode(&event) {
                    Ok(chunks) => pending.extend(chunks.into_iter().map(Ok)),
                    Err(err) => {
                        done = true;
                        pending.push_back(Err(err));
                    }
                },
                Some(Err(err)) => {
                    done = true;
                    pending.push_back(Err(err));
                }
                None => {
                    done = true;
                    pending.extend(decoder.finish().into_iter().map(Ok));
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_feeds() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: message_start\r\nda").is_empty());
        let events = parser.feed(b"ta: {\"a\":1}\r\n\r\n: keep-alive\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent {
                    event: Some("message_start".into()),
                    data: r#"{"a":1}"#.into(),
                },
                SseEvent {
                    event: None,
                    data: "[DONE]".into(),
                },
            ]
        );
    }

    #[test]
    fn test_multibyte_character_split() {
        let mut parser = SseParser::default();
        let bytes = "data: för\n\n".as_bytes();
        // split inside the two-byte 'ö'
        assert!(parser.feed(&bytes[..8]).is_empty());
        let events = parser.feed(&bytes[8..]);
        assert_eq!(events[0].data, "för");
    }

    #[test]
    fn test_multiline_data_and_trailing_event() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"data: one\ndata: two").is_empty());
        assert_eq!(parser.finish().unwrap().data, "one\ntwo");
    }

    #[test]
    fn test_stamp_numbers_chunks() {
        let mut stamp = ChunkStamp::new("openai", "gpt-4o");
        let first = stamp.stamp(Message::assistant("a"));
        let second = stamp.stamp(Message::assistant("b"));
        assert_eq!(first.metadata.extra[CHUNK_INDEX_KEY], serde_json::json!(0));
        assert_eq!(second.metadata.extra[CHUNK_INDEX_KEY], serde_json::json!(1));
        assert_eq!(second.metadata.provider.as_deref(), Some("openai"));
    }
}
