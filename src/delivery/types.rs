// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::sections::ExtractedSection;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Sections through the first worked-example page.
pub const DEFAULT_EARLY_BATCH_THRESHOLD: usize = 15;

pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// The only failure text a client ever sees.
pub const PUBLIC_ERROR_MESSAGE: &str = "Failed to generate response";

/// Per-stream delivery tuning, shared by every coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Number of sections delivered in the early batch.
    pub early_batch_threshold: usize,
    pub heartbeat_interval: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            early_batch_threshold: DEFAULT_EARLY_BATCH_THRESHOLD,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// One frame on the client-facing event stream.
///
/// Serialized with a `type` discriminator:
/// `{"type":"sectionsReady","sections":[...]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DeliveryEvent {
    Heartbeat,
    /// A provider delta, forwarded verbatim.
    Chunk { content: String },
    /// The early batch: exactly `early_batch_threshold` sections.
    SectionsReady { sections: Vec<ExtractedSection> },
    /// Sections beyond those already sent, starting at `start_index`.
    RemainingSections {
        sections: Vec<ExtractedSection>,
        #[serde(rename = "startIndex")]
        start_index: usize,
    },
    Done {
        #[serde(rename = "totalSections")]
        total_sections: usize,
    },
    Error { error: String },
}

impl DeliveryEvent {
    pub fn public_error() -> Self {
        DeliveryEvent::Error {
            error: PUBLIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// `done` and `error` end the stream; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryEvent::Done { .. } | DeliveryEvent::Error { .. })
    }

    /// JSON payload without SSE framing.
    pub fn to_json(&self) -> String {
        // Every variant holds plain strings and integers.
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"type":"error","error":"{PUBLIC_ERROR_MESSAGE}"}}"#))
    }

    /// Encode as one SSE frame: `data: <json>\n\n`.
    pub fn to_frame(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.to_json()))
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle of one coordinator. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl DeliveryPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryPhase::Done | DeliveryPhase::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(ordinal: usize) -> ExtractedSection {
        ExtractedSection {
            kind: "idea1".into(),
            title: "Idea 1".into(),
            content: "body".into(),
            ordinal,
        }
    }

    #[test]
    fn heartbeat_frame() {
        assert_eq!(
            DeliveryEvent::Heartbeat.to_frame(),
            Bytes::from_static(b"data: {\"type\":\"heartbeat\"}\n\n")
        );
    }

    #[test]
    fn chunk_keeps_content_verbatim() {
        let event = DeliveryEvent::Chunk {
            content: "  <!--TOPIC_START-->\n".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["content"], "  <!--TOPIC_START-->\n");
    }

    #[test]
    fn remaining_sections_uses_camel_case_fields() {
        let event = DeliveryEvent::RemainingSections {
            sections: vec![section(15)],
            start_index: 15,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(json["type"], "remainingSections");
        assert_eq!(json["startIndex"], 15);
        assert_eq!(json["sections"][0]["type"], "idea1");
        assert_eq!(json["sections"][0]["ordinal"], 15);
    }

    #[test]
    fn done_and_error_are_terminal() {
        let done = DeliveryEvent::Done { total_sections: 3 };
        assert!(done.is_terminal());
        assert_eq!(done.to_json(), r#"{"type":"done","totalSections":3}"#);

        let error = DeliveryEvent::public_error();
        assert!(error.is_terminal());
        assert_eq!(
            error.to_json(),
            r#"{"type":"error","error":"Failed to generate response"}"#
        );

        assert!(!DeliveryEvent::Heartbeat.is_terminal());
        assert!(!DeliveryEvent::SectionsReady { sections: vec![] }.is_terminal());
    }

    #[test]
    fn sections_ready_tag() {
        let event = DeliveryEvent::SectionsReady {
            sections: vec![section(0)],
        };
        assert!(event.to_json().starts_with(r#"{"type":"sectionsReady","sections":["#));
    }
}
