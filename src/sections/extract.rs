// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Incremental section extraction
//
// `extract` recomputes every complete section from the whole buffer on each
// call. It never patches earlier results, so a growing buffer can be
// re-extracted at any point and yields the same answer for the same text.

use serde::{Deserialize, Serialize};

use super::catalog::{SectionCatalog, SectionDefinition};

/// A section whose start and end markers were both found, with content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    pub ordinal: usize,
}

/// Extract every fully delimited, non-empty section from `buffer`.
///
/// Output is in ascending ordinal order, one entry per definition at most.
pub fn extract(catalog: &SectionCatalog, buffer: &str) -> Vec<ExtractedSection> {
    let mut sections: Vec<ExtractedSection> = catalog
        .iter()
        .filter_map(|def| extract_one(def, buffer))
        .collect();
    sections.sort_by_key(|s| s.ordinal);
    sections
}

/// Match a single definition against the buffer.
///
/// Both markers are located by their first occurrence from the start of the
/// buffer. An end marker that begins before the start marker finishes is
/// treated as no match.
fn extract_one(def: &SectionDefinition, buffer: &str) -> Option<ExtractedSection> {
    let start = buffer.find(def.start_marker)?;
    let end = buffer.find(def.end_marker)?;
    let content_start = start + def.start_marker.len();
    if end < content_start {
        return None;
    }

    let content = buffer[content_start..end].trim();
    if content.is_empty() {
        return None;
    }

    Some(ExtractedSection {
        kind: def.kind.to_string(),
        title: def.title.to_string(),
        content: content.to_string(),
        ordinal: def.ordinal,
    })
}

// ---------------------------------------------------------------------------
// End marker tracking
// ---------------------------------------------------------------------------

/// Tracks which end markers have appeared in a growing buffer.
///
/// Only the newly appended tail (plus enough overlap to catch a marker split
/// across two appends) is scanned per call, so the cost per delta is bounded
/// by the delta size rather than the buffer size. A section cannot be
/// complete before its end marker is present, so `seen()` is an upper bound
/// on the number of extractable sections.
#[derive(Debug, Clone)]
pub struct EndMarkerTracker {
    seen: Vec<bool>,
    seen_count: usize,
    scanned_to: usize,
    overlap: usize,
}

impl EndMarkerTracker {
    pub fn new(catalog: &SectionCatalog) -> Self {
        Self {
            seen: vec![false; catalog.len()],
            seen_count: 0,
            scanned_to: 0,
            overlap: catalog.longest_end_marker().saturating_sub(1),
        }
    }

    /// Scan the part of `buffer` added since the last call.
    ///
    /// Returns true if at least one end marker was seen for the first time.
    pub fn observe(&mut self, catalog: &SectionCatalog, buffer: &str) -> bool {
        let mut from = self.scanned_to.saturating_sub(self.overlap).min(buffer.len());
        while !buffer.is_char_boundary(from) {
            from -= 1;
        }
        let window = &buffer[from..];

        let mut found = false;
        for def in catalog.iter() {
            if self.seen[def.ordinal] {
                continue;
            }
            if window.contains(def.end_marker) {
                self.seen[def.ordinal] = true;
                self.seen_count += 1;
                found = true;
            }
        }

        self.scanned_to = buffer.len();
        found
    }

    /// Number of distinct end markers seen so far.
    pub fn seen(&self) -> usize {
        self.seen_count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
