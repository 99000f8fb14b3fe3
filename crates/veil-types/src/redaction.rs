//! Redaction state shared between the PII middleware and the audit layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What a redaction pass changed: how many values were masked and which
/// categories they belonged to.
///
/// The summary is monotone over the lifetime of a single request: counts only
/// grow and types only accrete. `BTreeSet` keeps the category list in a
/// deterministic sorted order for the audit line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSummary {
    /// Number of distinct masked values (one per replacement).
    pub count: usize,
    /// Category tags whose mask changed at least one value.
    pub types: BTreeSet<String>,
}

impl RedactionSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `replacements` masked values under `tag`.
    ///
    /// A zero replacement count records nothing: a pattern that declined all
    /// of its matches must not report its tag.
    pub fn record(&mut self, replacements: usize, tag: &str) {
        if replacements > 0 {
            self.count += replacements;
            self.types.insert(tag.to_string());
        }
    }

    /// Fold another summary into this one.
    pub fn absorb(&mut self, other: RedactionSummary) {
        self.count += other.count;
        self.types.extend(other.types);
    }

    /// True when nothing was masked.
    pub fn is_empty(&self) -> bool {
        self.count == 0 && self.types.is_empty()
    }
}

/// A PII entity span located by the NER provider.
///
/// Offsets are byte positions into the exact text that was submitted for
/// detection. The NER wrapper validates them before use; spans it cannot
/// interpret cause the whole text to pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiEntity {
    /// Provider entity category (e.g. `NAME`, `ADDRESS`).
    pub entity_type: String,
    /// Byte offset of the first byte of the span.
    pub begin_offset: usize,
    /// Byte offset one past the last byte of the span.
    pub end_offset: usize,
}
