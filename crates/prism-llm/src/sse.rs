//! Server-Sent Events line parser.
//!
//! All three vendor APIs stream over HTTP SSE. This parser turns a raw byte
//! stream into the `data:` payload strings, handling chunked line
//! buffering, comment lines, `[DONE]` markers, and a possibly unterminated
//! final line (Google ends streams without a trailing newline).

use async_stream::stream;
use bytes::BytesMut;
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::provider::AdapterError;

/// Parse SSE `data:` payloads out of an HTTP byte stream.
///
/// Yields one `String` per non-empty data line; `[DONE]` markers and
/// comments are filtered out. A transport error mid-stream surfaces as an
/// `Err` item and ends the stream.
pub fn data_lines<S>(
    byte_stream: S,
) -> impl Stream<Item = Result<String, AdapterError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + Unpin + 'static,
{
    stream! {
        let mut byte_stream = byte_stream;
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes = buffer.split_to(newline + 1);
                let line = match std::str::from_utf8(&line_bytes) {
                    Ok(s) => s,
                    Err(_) => {
                        warn!("skipping non-UTF-8 SSE line");
                        continue;
                    }
                };
                if let Some(data) = extract_data(line) {
                    yield Ok(data);
                }
            }

            match byte_stream.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    yield Err(AdapterError::Http(e));
                    return;
                }
                None => {
                    // Unterminated trailing line.
                    if !buffer.is_empty() {
                        if let Ok(line) = std::str::from_utf8(&buffer) {
                            if let Some(data) = extract_data(line) {
                                yield Ok(data);
                            }
                        }
                    }
                    return;
                }
            }
        }
    }
}

/// Extract the payload from one SSE line.
///
/// Returns `None` for empty lines, comments, `event:` lines, and the
/// `[DONE]` marker.
fn extract_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
