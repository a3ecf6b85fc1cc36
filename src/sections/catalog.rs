// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Section catalog
//
// The fixed vocabulary of delimited sub-documents the model is prompted to
// emit. Each entry carries its ordinal explicitly; the catalog sorts by it
// on construction so table order in source is never load-bearing.

use std::collections::HashSet;
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// One named section the model may emit, bounded by a start/end marker pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDefinition {
    /// Position in the catalog; the canonical ordering key for output.
    pub ordinal: usize,
    pub start_marker: &'static str,
    pub end_marker: &'static str,
    /// Machine-readable type tag (serialized as `type`).
    pub kind: &'static str,
    /// Human-readable title shown by the client.
    pub title: &'static str,
}

/// Errors raised when a catalog table violates its invariants.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,

    #[error("duplicate ordinal {0}")]
    DuplicateOrdinal(usize),

    #[error("ordinals are not dense: expected {expected}, found {found}")]
    OrdinalGap { expected: usize, found: usize },

    #[error("section \"{0}\" has an empty marker")]
    EmptyMarker(&'static str),

    #[error("duplicate type tag \"{0}\"")]
    DuplicateKind(&'static str),
}

macro_rules! section {
    ($ordinal:expr, $name:literal, $kind:literal, $title:literal) => {
        SectionDefinition {
            ordinal: $ordinal,
            start_marker: concat!("<!--", $name, "_START-->"),
            end_marker: concat!("<!--", $name, "_END-->"),
            kind: $kind,
            title: $title,
        }
    };
}

/// The section table the learning prompts are written against.
///
/// Ordinals 5..=14 make up the first worked-example page; the default early
/// delivery threshold (15) is the count of sections through that page.
const STANDARD_SECTIONS: &[SectionDefinition] = &[
    section!(0, "EXPLANATION", "explanation", "Introduction"),
    section!(1, "IDEA1", "idea1", "Idea 1"),
    section!(2, "IDEA2", "idea2", "Idea 2"),
    section!(3, "IDEA3", "idea3", "Idea 3"),
    section!(4, "TOPIC", "topic", "Topic"),
    // Page 1: beginner examples
    section!(5, "EXAMPLE1_HEADER", "example1_header", "Beginner Examples"),
    section!(6, "EXAMPLE1_SBYS", "example1_sbys", "Step-by-Step"),
    section!(7, "EXAMPLE1_EX1", "example1_ex1", "Example 1"),
    section!(8, "EXAMPLE1_EX1SUM", "example1_ex1sum", "Example 1 Summary"),
    section!(9, "EXAMPLE1_EX2", "example1_ex2", "Example 2"),
    section!(10, "EXAMPLE1_EX2SUM", "example1_ex2sum", "Example 2 Summary"),
    section!(11, "EXAMPLE1_EX3", "example1_ex3", "Example 3"),
    section!(12, "EXAMPLE1_EX3SUM", "example1_ex3sum", "Example 3 Summary"),
    section!(13, "EXAMPLE1_CHECKPOINT", "example1_checkpoint", "Checkpoint 1"),
    section!(14, "EXAMPLE1_ANSWER", "example1_answer", "Answer 1"),
    // Page 2: mid-level examples
    section!(15, "EXAMPLE2_HEADER", "example2_header", "Mid-Level Examples"),
    section!(16, "EXAMPLE2_SBYS", "example2_sbys", "Step-by-Step"),
    section!(17, "EXAMPLE2_EX1", "example2_ex1", "Example 1"),
    section!(18, "EXAMPLE2_EX1SUM", "example2_ex1sum", "Example 1 Summary"),
    section!(19, "EXAMPLE2_EX2", "example2_ex2", "Example 2"),
    section!(20, "EXAMPLE2_EX2SUM", "example2_ex2sum", "Example 2 Summary"),
    section!(21, "EXAMPLE2_EX3", "example2_ex3", "Example 3"),
    section!(22, "EXAMPLE2_EX3SUM", "example2_ex3sum", "Example 3 Summary"),
    section!(23, "EXAMPLE2_CHECKPOINT", "example2_checkpoint", "Checkpoint 2"),
    section!(24, "EXAMPLE2_ANSWER", "example2_answer", "Answer 2"),
    // Page 3: advanced examples
    section!(25, "EXAMPLE3_HEADER", "example3_header", "Advanced Examples"),
    section!(26, "EXAMPLE3_SBYS", "example3_sbys", "Step-by-Step"),
    section!(27, "EXAMPLE3_EX1", "example3_ex1", "Example 1"),
    section!(28, "EXAMPLE3_EX1SUM", "example3_ex1sum", "Example 1 Summary"),
    section!(29, "EXAMPLE3_EX2", "example3_ex2", "Example 2"),
    section!(30, "EXAMPLE3_EX2SUM", "example3_ex2sum", "Example 2 Summary"),
    section!(31, "EXAMPLE3_EX3", "example3_ex3", "Example 3"),
    section!(32, "EXAMPLE3_EX3SUM", "example3_ex3sum", "Example 3 Summary"),
    section!(33, "EXAMPLE3_CHECKPOINT", "example3_checkpoint", "Checkpoint 3"),
    section!(34, "EXAMPLE3_ANSWER", "example3_answer", "Answer 3"),
    // Page 4: practice
    section!(35, "PRACTICE", "practice", "Practice Problem"),
    section!(36, "HINT1", "hint1", "Hint 1"),
    section!(37, "HINT2", "hint2", "Hint 2"),
    section!(38, "HINT3", "hint3", "Hint 3"),
    section!(39, "SOLUTION", "solution", "Solution"),
];

static STANDARD: LazyLock<SectionCatalog> = LazyLock::new(|| {
    SectionCatalog::new(STANDARD_SECTIONS.to_vec())
        .unwrap_or_else(|e| panic!("built-in section table is invalid: {e}"))
});

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// An ordered, read-only set of section definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCatalog {
    definitions: Vec<SectionDefinition>,
}

impl SectionCatalog {
    /// Build a catalog from definitions in any order.
    ///
    /// Definitions are sorted by ordinal. Ordinals must be dense from 0,
    /// type tags unique, and markers non-empty.
    pub fn new(mut definitions: Vec<SectionDefinition>) -> Result<Self, CatalogError> {
        if definitions.is_empty() {
            return Err(CatalogError::Empty);
        }
        definitions.sort_by_key(|d| d.ordinal);

        let mut kinds = HashSet::with_capacity(definitions.len());
        for (expected, def) in definitions.iter().enumerate() {
            if def.ordinal < expected {
                return Err(CatalogError::DuplicateOrdinal(def.ordinal));
            }
            if def.ordinal > expected {
                return Err(CatalogError::OrdinalGap {
                    expected,
                    found: def.ordinal,
                });
            }
            if def.start_marker.is_empty() || def.end_marker.is_empty() {
                return Err(CatalogError::EmptyMarker(def.kind));
            }
            if !kinds.insert(def.kind) {
                return Err(CatalogError::DuplicateKind(def.kind));
            }
        }

        Ok(Self { definitions })
    }

    /// The built-in catalog shared by every request.
    pub fn standard() -> &'static SectionCatalog {
        &STANDARD
    }

    /// Definitions in ascending ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &SectionDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&SectionDefinition> {
        self.definitions.get(ordinal)
    }

    /// Length in bytes of the longest end marker.
    pub fn longest_end_marker(&self) -> usize {
        self.definitions
            .iter()
            .map(|d| d.end_marker.len())
            .max()
            .unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
