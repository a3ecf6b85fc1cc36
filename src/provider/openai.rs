// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// OpenAI-compatible chat completions adapter
//
// Builds `POST {base_url}/v1/chat/completions` requests with a system
// message and a user message. Requests carrying images switch to the
// configured vision model and send the user turn as content parts:
//
// ```json
// {"role": "user", "content": [
//   {"type": "text", "text": "..."},
//   {"type": "image_url", "image_url": {"url": "data:image/png;base64,..."}}
// ]}
// ```

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use serde_json::json;

use super::http::{HttpRequest, HttpSender};
use super::sse::decode_deltas;
use super::{Completion, CompletionProvider, CompletionRequest, ProviderError};
use crate::config::ProviderSettings;

/// Upper bound on how much of an error body is kept for logging.
const ERROR_BODY_LIMIT: usize = 2048;

pub struct OpenAiProvider {
    http: Arc<dyn HttpSender>,
    settings: ProviderSettings,
}

impl OpenAiProvider {
    pub fn new(http: Arc<dyn HttpSender>, settings: ProviderSettings) -> Self {
        Self { http, settings }
    }

    fn model_for(&self, request: &CompletionRequest) -> &str {
        if request.images.is_empty() {
            &self.settings.model
        } else {
            &self.settings.vision_model
        }
    }

    /// Build the JSON request body for a completion call.
    pub fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let user_content = if request.images.is_empty() {
            json!(request.message)
        } else {
            let mut parts = Vec::with_capacity(request.images.len() + 1);
            parts.push(json!({"type": "text", "text": request.message}));
            for image in &request.images {
                parts.push(json!({"type": "image_url", "image_url": {"url": image.as_str()}}));
            }
            serde_json::Value::Array(parts)
        };

        let mut body = json!({
            "model": self.model_for(request),
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": user_content},
            ],
        });
        if request.stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if !self.settings.api_key.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.settings.api_key)) {
                headers.insert("authorization", value);
            }
        }
        headers
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = serde_json::to_vec(&self.request_body(&request))
            .map_err(|e| ProviderError::MalformedResponse(format!("request encoding failed: {e}")))?;

        tracing::debug!(
            model = self.model_for(&request),
            images = request.images.len(),
            stream = request.stream,
            "sending completion request"
        );

        // A whole-request timeout would cut long generations short, so it
        // only applies to buffered calls.
        let http_req = HttpRequest {
            method: Method::POST,
            url: self.url(),
            headers: self.headers(),
            body: Bytes::from(body),
            timeout_ms: if request.stream {
                None
            } else {
                self.settings.timeout_ms
            },
            stream: request.stream,
        };

        let response = self.http.send(http_req).await?;

        if !response.status.is_success() {
            let status = response.status.as_u16();
            let raw = response.body.collect().await.unwrap_or_default();
            let text = String::from_utf8_lossy(&raw);
            let body: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(ProviderError::Status { status, body });
        }

        if request.stream {
            return Ok(Completion::Stream(decode_deltas(response.body.into_stream())));
        }

        let raw = response.body.collect().await?;
        let json: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| ProviderError::MalformedResponse(format!("body is not JSON: {e}")))?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .ok_or_else(|| {
                ProviderError::MalformedResponse("missing choices[0].message.content".into())
            })?;

        Ok(Completion::Full(content.as_str().unwrap_or_default().to_string()))
    }
}
