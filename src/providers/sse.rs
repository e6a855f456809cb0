//! Incremental decoding of `text/event-stream` payload lines.
//!
//! Providers deliver completions as SSE over a chunked HTTP body. Chunk
//! boundaries fall anywhere, including inside a UTF-8 sequence, so bytes are
//! buffered and only complete lines are decoded. Lines without a `data:`
//! prefix (event names, comments, blanks) are skipped.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::AppError;

struct DecodeState<S> {
    inner: Pin<Box<S>>,
    buf: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

/// Decode a byte-chunk stream into the payloads of its `data:` lines.
///
/// A read error ends the stream after yielding one `Err`; the orchestrator
/// treats that as a fatal provider failure.
pub(crate) fn data_lines<S, B, E>(stream: S) -> impl Stream<Item = Result<String, AppError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        inner: Box::pin(stream),
        buf: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if st.done {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = st.buf.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line);
                        let line = line.trim_end_matches(['\n', '\r']);
                        if let Some(data) = line.strip_prefix("data:") {
                            st.pending.push_back(data.trim_start().to_string());
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((
                        Err(AppError::Provider(format!("stream read failed: {e}"))),
                        st,
                    ));
                }
                None => {
                    st.done = true;
                }
            }
        }
    })
}
