//! Turns a `streamGenerateContent?alt=sse` body into reply text fragments.

use std::collections::VecDeque;
use std::fmt::Display;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use super::{GenerationFailure, GenerationResult, TextStream};

struct SseState<B, E> {
    body: BoxStream<'static, Result<B, E>>,
    buffer: Vec<u8>,
    pending: VecDeque<GenerationResult<String>>,
    done: bool,
}

/// Splits a byte stream into `data:` events and yields the text of each
/// event's candidate parts. Chunk boundaries may fall anywhere, including
/// inside a UTF-8 sequence.
pub fn text_stream<S, B, E>(body: S) -> TextStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        body: body.boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    // nothing after an error is trusted
                    st.done = true;
                    st.pending.clear();
                }
                return Some((item, st));
            }
            if st.done {
                return None;
            }

            match st.body.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(newline) = st.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = st.buffer.drain(..=newline).collect();
                        if let Some(item) = parse_line(&line) {
                            st.pending.push_back(item);
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(GenerationFailure::new(format!("Stream interrupted: {}", e))), st));
                }
                None => {
                    st.done = true;
                    let rest = std::mem::take(&mut st.buffer);
                    if let Some(item) = parse_line(&rest) {
                        st.pending.push_back(item);
                    }
                }
            }
        }
    })
    .boxed()
}

fn parse_line(line: &[u8]) -> Option<GenerationResult<String>> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let event: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Unparseable stream event");
            return Some(Err(GenerationFailure::new(format!("Malformed stream event: {}", e))));
        }
    };
    if let Some(message) = event["error"]["message"].as_str() {
        return Some(Err(GenerationFailure::new(message)));
    }

    let text = super::gemini::candidate_text(&event);
    if text.is_empty() { None } else { Some(Ok(text)) }
}
