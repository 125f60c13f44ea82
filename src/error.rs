//! Error taxonomy of the remapping engine.
//!
//! Registry construction errors are fatal for a run. Record errors are
//! caught at the remapper boundary, counted, and the record is skipped.
//! Non-fatal conditions are [`Warning`]s: the record is emitted with a
//! best-effort result and an `XW:Z` annotation.

use crate::registry::{Haplotype, VariantKind};
use std::fmt;
use thiserror::Error;

/// The registry that produced the pseudo genome is not well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Variant positions within one chromosome/haplotype must strictly increase.
    #[error(
        "malformed registry: {chromosome} ({haplotype}) variant at {position} follows variant at {previous}"
    )]
    Unsorted {
        chromosome: String,
        haplotype: Haplotype,
        previous: u64,
        position: u64,
    },

    /// A variant starts inside the reference span of the previous one.
    #[error(
        "malformed registry: {chromosome} ({haplotype}) variant at {position} overlaps variant spanning {previous_start}..{previous_end}"
    )]
    Overlapping {
        chromosome: String,
        haplotype: Haplotype,
        previous_start: u64,
        previous_end: u64,
        position: u64,
    },

    /// Every kind of variant consumes at least one base in one coordinate space.
    #[error("malformed registry: {chromosome} ({haplotype}) {kind} at {position} has zero length")]
    ZeroLength {
        chromosome: String,
        haplotype: Haplotype,
        kind: VariantKind,
        position: u64,
    },
}

/// A record that cannot be remapped and is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("corrupt operation string for {read}: {reason}")]
    CorruptOperationString { read: String, reason: String },
}

impl RecordError {
    pub(crate) fn corrupt(read: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptOperationString {
            read: read.into(),
            reason: reason.into(),
        }
    }
}

/// Non-fatal per-record conditions, written to the `XW:Z` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// The alignment starts or ends inside an insertion of the pseudo genome.
    AmbiguousClipBoundary,
    /// The mate could not be found within the mate window.
    UnresolvedMate,
}

impl Warning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Warning::AmbiguousClipBoundary => "ambiguous_clip_boundary",
            Warning::UnresolvedMate => "unresolved_mate",
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
