// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// SSE delta decoding
//
// Turns an OpenAI-style `text/event-stream` body into text deltas:
// - `data: {"choices":[{"delta":{"content":"..."}}]}` -> delta
// - `data: [DONE]` -> end of stream
// - `data: {"error":{...}}` -> ProviderError
// Lines are split on raw bytes so multi-byte characters that straddle
// network chunks are decoded intact.

use std::collections::VecDeque;

use futures_util::stream::StreamExt;

use super::http::ByteStream;
use super::{DeltaStream, ProviderError};

/// Decode a streamed chat completion body into text deltas.
///
/// Empty deltas (role-only or finish chunks) are skipped. After the first
/// error the stream ends.
pub fn decode_deltas(input: ByteStream) -> DeltaStream {
    let state = DecoderState {
        input,
        line_buffer: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    let stream = futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.input.next().await {
                Some(Ok(chunk)) => {
                    state.line_buffer.extend_from_slice(&chunk);
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.ready.push_back(Err(e.into()));
                }
                None => {
                    // Process any remaining partial line
                    let rest = std::mem::take(&mut state.line_buffer);
                    if !rest.is_empty() {
                        state.handle_line(&rest);
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

// ---------------------------------------------------------------------------
// Decoder state
// ---------------------------------------------------------------------------

struct DecoderState {
    input: ByteStream,
    /// Bytes after the last newline seen.
    line_buffer: Vec<u8>,
    /// Decoded items waiting to be yielded, in arrival order.
    ready: VecDeque<Result<String, ProviderError>>,
    /// Set on `[DONE]`, on the first error, or when input is exhausted.
    finished: bool,
}

impl DecoderState {
    fn drain_lines(&mut self) {
        while !self.finished {
            let Some(pos) = self.line_buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.line_buffer.drain(..=pos).collect();
            self.handle_line(&line);
        }
    }

    fn handle_line(&mut self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(l) => l,
            Err(e) => {
                self.fail(ProviderError::MalformedStream(format!("invalid UTF-8: {e}")));
                return;
            }
        };

        let Some(data) = parse_data_line(line) else {
            return;
        };

        match classify_data(data) {
            DataLine::Delta(text) => {
                if !text.is_empty() {
                    self.ready.push_back(Ok(text));
                }
            }
            DataLine::Done => self.finished = true,
            DataLine::Ignore => {}
            DataLine::Error(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: ProviderError) {
        self.ready.push_back(Err(error));
        self.finished = true;
    }
}

// ---------------------------------------------------------------------------
// Line parsing
// ---------------------------------------------------------------------------

/// Return the payload of a `data:` line, or None for blank, comment, and
/// other field lines.
fn parse_data_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();

    // Empty line is an event separator in SSE, not a chunk
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))
}

enum DataLine {
    Delta(String),
    Done,
    Ignore,
    Error(ProviderError),
}

fn classify_data(data: &str) -> DataLine {
    let data = data.trim();
    if data == "[DONE]" {
        return DataLine::Done;
    }

    let json: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            return DataLine::Error(ProviderError::MalformedStream(format!(
                "data line is not JSON: {e}"
            )))
        }
    };

    if let Some(error) = json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return DataLine::Error(ProviderError::MalformedStream(format!(
            "provider reported error mid-stream: {message}"
        )));
    }

    match json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(text) => DataLine::Delta(text.to_string()),
        None => DataLine::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HttpError;
    use bytes::Bytes;

    fn body(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures_util::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    async fn collect(stream: DeltaStream) -> Vec<Result<String, ProviderError>> {
        stream.collect().await
    }

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices":[{"index":0,"delta":{"content":text}}]})
        )
    }

    #[tokio::test]
    async fn decodes_deltas_in_order() {
        let raw = format!("{}{}data: [DONE]\n\n", delta_line("Hel"), delta_line("lo"));
        let input: ByteStream = Box::pin(futures_util::stream::iter(vec![Ok(Bytes::from(raw))]));

        let out: Vec<String> = collect(decode_deltas(input))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_chunks() {
        let input = body(vec![
            b"data: {\"choices\":[{\"delta\":{\"con",
            b"tent\":\"abc\"}}]}\n\ndata: [DO",
            b"NE]\n\n",
        ]);
        let out = collect(decode_deltas(input)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "abc");
    }

    #[tokio::test]
    async fn keeps_multibyte_characters_split_across_chunks() {
        let raw = delta_line("héllo");
        let bytes = raw.into_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let (a, b) = bytes.split_at(split);
        let input: ByteStream = Box::pin(futures_util::stream::iter(vec![
            Ok(Bytes::copy_from_slice(a)),
            Ok(Bytes::copy_from_slice(b)),
        ]));

        let out = collect(decode_deltas(input)).await;
        assert_eq!(out[0].as_ref().unwrap(), "héllo");
    }

    #[tokio::test]
    async fn skips_role_and_finish_chunks() {
        let input = body(vec![
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            b": keep-alive comment\n\n",
            b"data: [DONE]\n\n",
        ]);
        let out = collect(decode_deltas(input)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn stops_reading_after_done() {
        let input = body(vec![
            b"data: [DONE]\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        ]);
        assert!(collect(decode_deltas(input)).await.is_empty());
    }

    #[tokio::test]
    async fn stream_without_done_ends_cleanly() {
        let input = body(vec![b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]);
        let out = collect(decode_deltas(input)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "tail");
    }

    #[tokio::test]
    async fn error_payload_ends_stream_with_error() {
        let input = body(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            b"data: {\"error\":{\"message\":\"overloaded\"}}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        ]);
        let out = collect(decode_deltas(input)).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "ok");
        match &out[1] {
            Err(ProviderError::MalformedStream(msg)) => assert!(msg.contains("overloaded")),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_data_is_malformed() {
        let input = body(vec![b"data: not json\n\n"]);
        let out = collect(decode_deltas(input)).await;
        assert!(matches!(out[0], Err(ProviderError::MalformedStream(_))));
    }

    #[tokio::test]
    async fn transport_error_is_surfaced() {
        let input: ByteStream = Box::pin(futures_util::stream::iter(vec![
            Ok(Bytes::from(delta_line("a"))),
            Err(HttpError::Transport("connection reset".into())),
        ]));
        let out = collect(decode_deltas(input)).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(ProviderError::Transport(_))));
    }
}
