//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! Both HTTP providers stream their replies as SSE. This module turns the raw
//! response byte stream into [`SseEvent`]s; the providers decide what the
//! `data` payloads mean.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::{Error, Result};

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// All `data:` lines of the event joined with newlines.
    pub data: String,
}

/// Process a stream of bytes into a stream of server-sent events.
///
/// Events are delimited by a blank line. Comment lines and events without any
/// `data:` line are skipped. Carriage returns are discarded, and bytes are
/// buffered until an event is complete, so multi-byte characters split across
/// chunks decode correctly.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result.map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, mut finished)| async move {
            loop {
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        Some(event) => return Some((event, (stream, buffer, finished))),
                        None => continue,
                    }
                }

                if finished {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, finished)));
                    }
                    None => {
                        // Flush a final event that lacks its trailing blank line.
                        finished = true;
                        if !buffer.is_empty() {
                            buffer.extend_from_slice(b"\n\n");
                        }
                    }
                }
            }
        },
    )
}

/// Extract one complete event from the front of `buffer`.
///
/// Returns `None` when the buffer holds no complete event yet. The inner
/// `None` marks an event that carried no data and should be skipped.
fn extract_event(buffer: &[u8]) -> Option<(Option<Result<SseEvent>>, Vec<u8>)> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let rest = buffer[end + 2..].to_vec();

    let text = match std::str::from_utf8(&buffer[..end]) {
        Ok(text) => text,
        Err(e) => {
            return Some((
                Some(Err(Error::streaming(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ))),
                rest,
            ));
        }
    };

    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
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
        return Some((None, rest));
    }
    Some((
        Some(Ok(SseEvent {
            event,
            data: data.join("\n"),
        })),
        rest,
    ))
}
