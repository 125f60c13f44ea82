//! Coordinate translation between the pseudo genome and the reference.
//!
//! Translation of a single position is only unambiguous outside indels. A
//! pseudo position inside an inserted block has no reference base, and a
//! reference position inside a deleted block has no pseudo base; both come
//! back flagged with the anchor of the variant so callers decide what to do.

use crate::registry::{Ledger, VariantKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    Exact(u64),
    /// Pseudo position `offset` bases into an insertion anchored before
    /// reference base `anchor`.
    InsideInsertion { anchor: u64, offset: u64 },
    /// Reference position `offset` bases into a deletion whose junction is at
    /// pseudo position `anchor`.
    InsideDeletion { anchor: u64, offset: u64 },
}

impl Translation {
    /// Translated position, or the variant anchor for interior positions.
    pub fn position(&self) -> u64 {
        match *self {
            Translation::Exact(pos) => pos,
            Translation::InsideInsertion { anchor, .. } => anchor,
            Translation::InsideDeletion { anchor, .. } => anchor,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Translation::Exact(_))
    }
}

impl Ledger {
    pub fn pseudo_to_reference(&self, pos: u64) -> Translation {
        let variants = self.variants();
        let idx = variants.partition_point(|v| v.pseudo_position <= pos);
        if idx == 0 {
            return Translation::Exact(pos);
        }
        let last = idx - 1;
        let v = &variants[last];
        if pos < v.pseudo_end() {
            let offset = pos - v.pseudo_position;
            return match v.kind {
                VariantKind::Insertion => Translation::InsideInsertion {
                    anchor: v.reference_position,
                    offset,
                },
                _ => Translation::Exact(v.reference_position + offset),
            };
        }
        Translation::Exact(pos.saturating_add_signed(-self.offset_before(last + 1)))
    }

    pub fn reference_to_pseudo(&self, pos: u64) -> Translation {
        let variants = self.variants();
        let idx = variants.partition_point(|v| v.reference_position <= pos);
        if idx == 0 {
            return Translation::Exact(pos);
        }
        let last = idx - 1;
        let v = &variants[last];
        if pos < v.reference_end() {
            let offset = pos - v.reference_position;
            return match v.kind {
                VariantKind::Deletion => Translation::InsideDeletion {
                    anchor: v.pseudo_position,
                    offset,
                },
                _ => Translation::Exact(v.pseudo_position + offset),
            };
        }
        Translation::Exact(pos.saturating_add_signed(self.offset_before(last + 1)))
    }
}
