use std::collections::VecDeque;

use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use tracing::debug;

use super::LlmError;

/// One newline-delimited record emitted by `/api/generate` while streaming.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
}

struct DecoderState<S> {
    body: S,
    buffer: LineBuffer,
    ready: VecDeque<String>,
    finished: bool,
}

/// Byte buffer that splits on newlines. Bytes already searched are not searched again,
/// so a long record arriving in many small pieces is scanned once.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    scanned: usize,
}

impl LineBuffer {
    /// Append `chunk` and hand every completed line (without its newline) to `on_line`.
    fn push(&mut self, chunk: &[u8], mut on_line: impl FnMut(&[u8])) {
        self.bytes.extend_from_slice(chunk);
        let mut line_start = 0;
        for pos in self.scanned..self.bytes.len() {
            if self.bytes[pos] == b'\n' {
                on_line(&self.bytes[line_start..pos]);
                line_start = pos + 1;
            }
        }
        self.bytes.drain(..line_start);
        self.scanned = self.bytes.len();
    }

    fn take_rest(&mut self) -> Vec<u8> {
        self.scanned = 0;
        std::mem::take(&mut self.bytes)
    }
}

/// Turn a raw byte stream of newline-delimited JSON into the text increments it carries.
///
/// Records may arrive split across several byte chunks; partial lines are buffered until the
/// newline shows up. Lines that do not parse, or that carry no `response` field, are skipped.
/// The stream ends when `body` ends; a trailing record without a newline is still decoded.
pub fn ndjson_tokens<S, B, E>(body: S) -> impl Stream<Item = Result<String, LlmError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecoderState {
        body,
        buffer: LineBuffer::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(token) = state.ready.pop_front() {
                return Some((Ok(token), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let ready = &mut state.ready;
                    state.buffer.push(bytes.as_ref(), |line| {
                        if let Some(token) = decode_line(line) {
                            ready.push_back(token);
                        }
                    });
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(LlmError::Transport(err.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.buffer.take_rest();
                    if let Some(token) = decode_line(&rest) {
                        state.ready.push_back(token);
                    }
                }
            }
        }
    })
}

fn decode_line(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<GenerateChunk>(trimmed) {
        Ok(chunk) => chunk.response,
        Err(err) => {
            debug!(%err, "skipping malformed stream line");
            None
        }
    }
}
