//! Reassembly of `data: <json>` event streams from the completion endpoint.
//!
//! Upstream chunks arrive with arbitrary boundaries: one chunk may hold several
//! events, or only part of one. [`StreamReassembler`] keeps the unterminated
//! tail between chunks and only decodes a line once its `\n` has arrived.
//! [`reassemble`] drives it from a byte stream into a bounded channel of
//! [`RelayEvent`]s that always ends with exactly one terminal event.

use bytes::Bytes;
use futures::StreamExt;
use log::{ debug, warn };
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::ByteStream;
use crate::models::relay::RelayEvent;

/// Payload the upstream sends to mark its own end of stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const EVENT_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Error)]
#[error("malformed event line ({reason}): {line}")]
pub struct MalformedEventLine {
    pub line: String,
    pub reason: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Line splitter with a carry-over buffer. The buffer is bytes rather than
/// text so a multi-byte character cut by a chunk boundary decodes once its
/// line is complete. Between calls it holds at most one partial line.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    carry: Vec<u8>,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns the content fragments of every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // The carry-over never contains a terminator, so only new bytes are searched.
        let mut search_from = self.carry.len();
        self.carry.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.carry[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            if let Some(fragment) = recover(decode_line(&self.carry[start..end])) {
                fragments.push(fragment);
            }
            start = end + 1;
            search_from = start;
        }
        self.carry.drain(..start);
        fragments
    }

    /// Called once the upstream has closed: an unterminated last line is complete now.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.carry);
        if rest.is_empty() {
            return None;
        }
        recover(decode_line(&rest))
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

fn recover(decoded: Result<Option<String>, MalformedEventLine>) -> Option<String> {
    match decoded {
        Ok(fragment) => fragment,
        Err(e) => {
            warn!("Dropping {}", e);
            None
        }
    }
}

/// Decodes one complete line. `Ok(None)` covers everything that carries no
/// content: blank lines, the sentinel, non-data fields and empty deltas.
pub fn decode_line(raw: &[u8]) -> Result<Option<String>, MalformedEventLine> {
    let text = String::from_utf8_lossy(raw);
    let line = text.strip_suffix('\r').unwrap_or(&text);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == DONE_SENTINEL {
        return Ok(None);
    }

    let chunk = serde_json::from_str::<StreamChunk>(data).map_err(|e| MalformedEventLine {
        line: line.to_string(),
        reason: e.to_string(),
    })?;

    Ok(
        chunk.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
    )
}

async fn next_chunk(
    upstream: &mut ByteStream,
    idle_timeout: Option<Duration>
) -> Result<Option<Bytes>, String> {
    let next = match idle_timeout {
        Some(limit) =>
            tokio::time
                ::timeout(limit, upstream.next()).await
                .map_err(|_| format!("upstream stream idle for more than {:?}", limit))?,
        None => upstream.next().await,
    };

    match next {
        Some(Ok(chunk)) => Ok(Some(chunk)),
        Some(Err(e)) => Err(format!("upstream stream failed: {}", e)),
        None => Ok(None),
    }
}

/// Spawns the reader task and returns the normalized event stream.
///
/// The task reads one chunk at a time and waits for channel capacity before
/// reading the next, so unsent data stays bounded. Dropping the returned
/// stream stops the task, even mid-wait on the upstream, and drops `upstream`
/// with it.
pub fn reassemble(
    mut upstream: ByteStream,
    idle_timeout: Option<Duration>
) -> ReceiverStream<RelayEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut reassembler = StreamReassembler::new();

        let terminal = loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("Stream consumer went away; releasing upstream");
                    return;
                }
                next = next_chunk(&mut upstream, idle_timeout) => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    debug!("Upstream chunk: {} bytes", chunk.len());
                    for fragment in reassembler.push(&chunk) {
                        if tx.send(RelayEvent::Content(fragment)).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(fragment) = reassembler.finish() {
                        if tx.send(RelayEvent::Content(fragment)).await.is_err() {
                            return;
                        }
                    }
                    break RelayEvent::Done;
                }
                Err(message) => {
                    warn!("{}", message);
                    break RelayEvent::Error(message);
                }
            }
        };

        let _ = tx.send(terminal).await;
    });

    ReceiverStream::new(rx)
}
