// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Section parsing
//
// Responsibilities:
// - Hold the fixed catalog of marker-delimited sections
// - Extract complete sections from a (possibly partial) model response
// - Track end markers cheaply so callers know when re-extraction can pay off

mod catalog;
mod extract;

pub use catalog::{CatalogError, SectionCatalog, SectionDefinition};
pub use extract::{extract, EndMarkerTracker, ExtractedSection};
