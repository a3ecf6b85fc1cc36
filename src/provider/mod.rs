// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Completion provider
//
// Responsibilities:
// - Define the CompletionProvider seam the delivery layer drives
// - OpenAI-compatible chat completions adapter (text and vision)
// - Decode streamed SSE responses into ordered text deltas
// - Keep raw upstream error detail inside ProviderError (never sent to clients)

mod http;
mod openai;
mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};

use crate::images::ImageAttachment;

pub use http::{ByteStream, HttpBody, HttpError, HttpRequest, HttpResponse, HttpSender, ReqwestHttpSender};
pub use openai::OpenAiProvider;
pub use sse::decode_deltas;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the completion provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider request timed out: {0}")]
    Timeout(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider stream: {0}")]
    MalformedStream(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<HttpError> for ProviderError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout(msg) => ProviderError::Timeout(msg),
            HttpError::Transport(msg) => ProviderError::Transport(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// One completion call: system prompt, user message, optional images.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub message: String,
    pub images: Vec<ImageAttachment>,
    /// Ask the provider for incremental deltas rather than a finished string.
    pub stream: bool,
}

/// Ordered, non-restartable sequence of text fragments.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// What the provider hands back for a request.
pub enum Completion {
    Full(String),
    Stream(DeltaStream),
}

impl Completion {
    /// Present either form as a delta stream.
    pub fn into_deltas(self) -> DeltaStream {
        match self {
            Completion::Full(text) => Box::pin(futures_util::stream::once(async move { Ok(text) })),
            Completion::Stream(stream) => stream,
        }
    }

    /// Resolve either form to the finished text.
    pub async fn into_text(self) -> Result<String, ProviderError> {
        match self {
            Completion::Full(text) => Ok(text),
            Completion::Stream(mut stream) => {
                let mut text = String::new();
                while let Some(delta) = stream.next().await {
                    text.push_str(&delta?);
                }
                Ok(text)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Trait: CompletionProvider (dependency injection point)
// ---------------------------------------------------------------------------

/// Abstraction over the model API.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_completion_becomes_single_delta() {
        let mut deltas = Completion::Full("hello".into()).into_deltas();
        assert_eq!(deltas.next().await.unwrap().unwrap(), "hello");
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn streamed_completion_concatenates() {
        let parts = vec![Ok("a".to_string()), Ok("b".to_string()), Ok("c".to_string())];
        let completion = Completion::Stream(Box::pin(futures_util::stream::iter(parts)));
        assert_eq!(completion.into_text().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn streamed_completion_propagates_error() {
        let parts = vec![
            Ok("a".to_string()),
            Err(ProviderError::MalformedStream("bad".into())),
        ];
        let completion = Completion::Stream(Box::pin(futures_util::stream::iter(parts)));
        assert!(matches!(
            completion.into_text().await,
            Err(ProviderError::MalformedStream(_))
        ));
    }

    #[test]
    fn http_timeout_maps_to_provider_timeout() {
        let err: ProviderError = HttpError::Timeout("slow".into()).into();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }
}
