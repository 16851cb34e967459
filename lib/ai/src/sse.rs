//! Server-Sent Events reader.
//!
//! Chat-completion gateways stream `data:` events terminated by a blank line.
//! The reader is generic over any buffered async source so it can be driven
//! by a reqwest body or, in tests, by a byte slice.

use crate::error::CompletionError;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::io::StreamReader;

/// A single SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type, if the server named one.
    pub event: Option<String>,
    /// The event data. Multi-line data is joined with `\n`.
    pub data: String,
}

/// Incremental SSE parser over a line source.
pub struct SseReader<R> {
    lines: Lines<R>,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> SseReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            finished: false,
        }
    }

    /// Returns the next complete event, or `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns `StreamInterrupted` if the underlying source fails.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, CompletionError> {
        if self.finished {
            return Ok(None);
        }

        let mut event = None;
        let mut data = String::new();

        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| CompletionError::StreamInterrupted {
                    reason: e.to_string(),
                })?;

            let Some(line) = line else {
                self.finished = true;
                return Ok((!data.is_empty()).then_some(SseEvent { event, data }));
            };

            if line.is_empty() {
                if data.is_empty() {
                    event = None;
                    continue;
                }
                return Ok(Some(SseEvent { event, data }));
            }

            if let Some(kind) = field(&line, "event") {
                event = Some(kind.to_string());
            } else if let Some(payload) = field(&line, "data") {
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(payload);
            }
            // id:, retry: and comment lines are ignored
        }
    }
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Builds an SSE reader over a reqwest response body.
pub fn from_response(response: reqwest::Response) -> SseReader<impl AsyncBufRead + Unpin> {
    let bytes = Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other)),
    );
    SseReader::new(BufReader::new(StreamReader::new(bytes)))
}
