// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Inline image attachments
//
// Clients send images as `data:image/<subtype>;base64,<payload>` URIs.
// Anything else is dropped without failing the request.

use std::sync::LazyLock;

use base64::Engine as _;
use regex::Regex;

static DATA_URI_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/[A-Za-z0-9.+-]+;base64,")
        .unwrap_or_else(|e| panic!("invalid data URI pattern: {e}"))
});

/// A validated inline image, kept as the original data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    data_uri: String,
}

impl ImageAttachment {
    /// Validate a candidate data URI.
    ///
    /// The header must name an image media type with base64 encoding and the
    /// payload must be non-empty, decodable base64.
    pub fn parse(candidate: &str) -> Option<Self> {
        let header = DATA_URI_HEADER.find(candidate)?;
        let payload = &candidate[header.end()..];
        if payload.is_empty() {
            return None;
        }
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?;
        Some(Self {
            data_uri: candidate.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.data_uri
    }
}

/// Keep only the well-formed image data URIs from an arbitrary JSON value.
///
/// Non-array values and non-string entries contribute nothing.
pub fn sanitize_images(value: Option<&serde_json::Value>) -> Vec<ImageAttachment> {
    let Some(serde_json::Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.as_str())
        .filter_map(ImageAttachment::parse)
        .collect()
}
