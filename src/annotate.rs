//! Variant-overlap tags.
//!
//! | tag    | value                                   |
//! |--------|-----------------------------------------|
//! | `s0:i` | substitutions touched                   |
//! | `i0:i` | insertions touched                      |
//! | `i1:i` | inserted bases carried by the read      |
//! | `d0:i` | deletions spanned                       |
//! | `d1:i` | deleted reference bases spanned         |
//! | `XV:Z` | comma-separated variant ids (optional)  |
//! | `XW:Z` | non-fatal warnings                      |

use crate::error::Warning;
use crate::registry::VariantKind;
use crate::transform::Overlap;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::{Data as SamData, data::field::Value};

pub const SUBSTITUTIONS_TAG: Tag = Tag::new(b's', b'0');
pub const INSERTIONS_TAG: Tag = Tag::new(b'i', b'0');
pub const INSERTED_BASES_TAG: Tag = Tag::new(b'i', b'1');
pub const DELETIONS_TAG: Tag = Tag::new(b'd', b'0');
pub const DELETED_BASES_TAG: Tag = Tag::new(b'd', b'1');
pub const VARIANT_IDS_TAG: Tag = Tag::new(b'X', b'V');
pub const WARNINGS_TAG: Tag = Tag::new(b'X', b'W');

/// Immutable summary of the variants one alignment touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantTags {
    pub substitutions: u32,
    pub insertions: u32,
    pub inserted_bases: u64,
    pub deletions: u32,
    pub deleted_bases: u64,
    /// Ids in encounter order, 5' to 3' along the reference.
    pub variant_ids: Vec<String>,
}

impl VariantTags {
    pub fn is_empty(&self) -> bool {
        self.variant_ids.is_empty()
    }

    pub fn apply(&self, data: &mut SamData, with_ids: bool) {
        data.insert(SUBSTITUTIONS_TAG, Value::from(clamp(self.substitutions as u64)));
        data.insert(INSERTIONS_TAG, Value::from(clamp(self.insertions as u64)));
        data.insert(INSERTED_BASES_TAG, Value::from(clamp(self.inserted_bases)));
        data.insert(DELETIONS_TAG, Value::from(clamp(self.deletions as u64)));
        data.insert(DELETED_BASES_TAG, Value::from(clamp(self.deleted_bases)));

        data.remove(&VARIANT_IDS_TAG);
        if with_ids && !self.variant_ids.is_empty() {
            data.insert(
                VARIANT_IDS_TAG,
                Value::String(self.variant_ids.join(",").into()),
            );
        }
    }
}

fn clamp(n: u64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub fn annotate(overlaps: &[Overlap]) -> VariantTags {
    let mut tags = VariantTags {
        variant_ids: Vec::with_capacity(overlaps.len()),
        ..VariantTags::default()
    };
    for overlap in overlaps {
        match overlap.variant.kind {
            VariantKind::Substitution => tags.substitutions += 1,
            VariantKind::Insertion => {
                tags.insertions += 1;
                tags.inserted_bases += overlap.pseudo_consumed;
            }
            VariantKind::Deletion => {
                tags.deletions += 1;
                tags.deleted_bases += overlap.reference_consumed;
            }
        }
        tags.variant_ids.push(overlap.variant.label());
    }
    tags
}

/// Append a warning to `XW:Z`, keeping earlier ones.
pub fn push_warning(data: &mut SamData, warning: Warning) {
    let mut warnings: Vec<String> = match data.get(&WARNINGS_TAG) {
        Some(Value::String(s)) => s.to_string().split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    if warnings.iter().any(|w| w == warning.as_str()) {
        return;
    }
    warnings.push(warning.as_str().to_string());
    data.insert(WARNINGS_TAG, Value::String(warnings.join(",").into()));
}
