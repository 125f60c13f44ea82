//! Modification registry: the per chromosome/haplotype catalog of variants
//! that turned the reference genome into the pseudo genome.
//!
//! Coordinate conventions:
//! - All positions are 0-based.
//! - An insertion of `n` bases at reference position `p` places the inserted
//!   block immediately before reference base `p`; it spans `n` pseudo bases
//!   and no reference bases.
//! - A deletion of `n` bases at reference position `p` removes reference
//!   bases `[p, p + n)`; its pseudo span is empty and its pseudo position is
//!   the junction between the flanking pseudo bases.
//!
//! Variants of one ledger live in a single contiguous vector sorted on both
//! axes, so every lookup is a binary search followed by a forward scan.

use crate::error::RegistryError;
use crate::types::{HashMap, HashMapExt};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which copy of a chromosome a ledger describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Haplotype {
    /// Haploid registry (or a diploid registry applied to both copies alike).
    #[default]
    Single,
    Reference,
    Paternal,
    Maternal,
}

impl Haplotype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Haplotype::Single => "single",
            Haplotype::Reference => "reference",
            Haplotype::Paternal => "paternal",
            Haplotype::Maternal => "maternal",
        }
    }
}

impl fmt::Display for Haplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown haplotype: {0:?}")]
pub struct ParseHaplotypeError(pub String);

impl FromStr for Haplotype {
    type Err = ParseHaplotypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" | "s" | "." => Ok(Haplotype::Single),
            "reference" | "ref" | "r" => Ok(Haplotype::Reference),
            "paternal" | "p" => Ok(Haplotype::Paternal),
            "maternal" | "m" => Ok(Haplotype::Maternal),
            _ => Err(ParseHaplotypeError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Substitution,
    Insertion,
    Deletion,
}

impl VariantKind {
    /// Single-letter code used in MOD files and variant ids.
    pub fn code(&self) -> char {
        match self {
            VariantKind::Substitution => 's',
            VariantKind::Insertion => 'i',
            VariantKind::Deletion => 'd',
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VariantKind::Substitution => "substitution",
            VariantKind::Insertion => "insertion",
            VariantKind::Deletion => "deletion",
        })
    }
}

/// One mutation site, positioned in both coordinate spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variant {
    pub kind: VariantKind,
    pub reference_position: u64,
    pub pseudo_position: u64,
    pub reference_length: u64,
    pub pseudo_length: u64,
}

impl Variant {
    pub fn reference_end(&self) -> u64 {
        self.reference_position + self.reference_length
    }

    pub fn pseudo_end(&self) -> u64 {
        self.pseudo_position + self.pseudo_length
    }

    /// Net bases this variant adds to the pseudo genome.
    pub fn delta(&self) -> i64 {
        self.pseudo_length as i64 - self.reference_length as i64
    }

    /// Kind code followed by the 1-based reference position, e.g. `s1001`.
    pub fn label(&self) -> String {
        format!("{}{}", self.kind.code(), self.reference_position + 1)
    }
}

/// A variant as supplied by a registry source, before pseudo positions are
/// derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDef {
    pub chromosome: String,
    pub haplotype: Haplotype,
    pub kind: VariantKind,
    /// 0-based reference position.
    pub position: u64,
    /// Substituted, inserted or deleted bases.
    pub length: u64,
}

impl VariantDef {
    pub fn new(
        chromosome: impl Into<String>,
        haplotype: Haplotype,
        kind: VariantKind,
        position: u64,
        length: u64,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            haplotype,
            kind,
            position,
            length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub chromosome: String,
    pub haplotype: Haplotype,
}

impl LedgerKey {
    pub fn new(chromosome: impl Into<String>, haplotype: Haplotype) -> Self {
        Self {
            chromosome: chromosome.into(),
            haplotype,
        }
    }
}

/// Ordered variants of one chromosome/haplotype plus a cumulative-offset index.
#[derive(Debug, Clone)]
pub struct Ledger {
    key: LedgerKey,
    variants: Vec<Variant>,
    // offsets[i] = sum of (pseudo_length - reference_length) over variants[..i];
    // offsets[variants.len()] is the total.
    offsets: Vec<i64>,
}

impl Ledger {
    /// Build a ledger from `(kind, reference position, length)` sites given in
    /// registry order.
    pub fn build<I>(key: LedgerKey, sites: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (VariantKind, u64, u64)>,
    {
        let sites = sites.into_iter();
        let mut variants: Vec<Variant> = Vec::with_capacity(sites.size_hint().0);
        let mut offsets: Vec<i64> = Vec::with_capacity(sites.size_hint().0 + 1);
        offsets.push(0);
        let mut offset = 0i64;

        for (kind, position, length) in sites {
            if length == 0 {
                return Err(RegistryError::ZeroLength {
                    chromosome: key.chromosome.clone(),
                    haplotype: key.haplotype,
                    kind,
                    position,
                });
            }
            if let Some(prev) = variants.last() {
                if position <= prev.reference_position {
                    return Err(RegistryError::Unsorted {
                        chromosome: key.chromosome.clone(),
                        haplotype: key.haplotype,
                        previous: prev.reference_position,
                        position,
                    });
                }
                if position < prev.reference_end() {
                    return Err(RegistryError::Overlapping {
                        chromosome: key.chromosome.clone(),
                        haplotype: key.haplotype,
                        previous_start: prev.reference_position,
                        previous_end: prev.reference_end(),
                        position,
                    });
                }
            }

            let (reference_length, pseudo_length) = match kind {
                VariantKind::Substitution => (length, length),
                VariantKind::Insertion => (0, length),
                VariantKind::Deletion => (length, 0),
            };
            // Deleted bases always precede `position`, so this never underflows.
            let variant = Variant {
                kind,
                reference_position: position,
                pseudo_position: position.saturating_add_signed(offset),
                reference_length,
                pseudo_length,
            };
            offset += variant.delta();
            variants.push(variant);
            offsets.push(offset);
        }

        Ok(Self {
            key,
            variants,
            offsets,
        })
    }

    pub fn key(&self) -> &LedgerKey {
        &self.key
    }

    pub fn chromosome(&self) -> &str {
        &self.key.chromosome
    }

    pub fn haplotype(&self) -> Haplotype {
        self.key.haplotype
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Pseudo length minus reference length of the whole chromosome.
    pub fn total_offset(&self) -> i64 {
        self.offsets[self.variants.len()]
    }

    /// Cumulative offset of all variants strictly before `variants[idx]`.
    pub(crate) fn offset_before(&self, idx: usize) -> i64 {
        self.offsets[idx]
    }

    /// Reference length of a chromosome whose pseudo sequence has `pseudo_length` bases.
    pub fn reference_length(&self, pseudo_length: u64) -> u64 {
        pseudo_length.saturating_add_signed(-self.total_offset())
    }

    /// Variants whose pseudo span intersects `[start, start + length)`.
    ///
    /// A deletion has an empty pseudo span; it is returned only when its
    /// junction lies strictly inside the range, i.e. the range covers a
    /// pseudo base on each side of it.
    pub fn variants_overlapping_pseudo_range(&self, start: u64, length: u64) -> &[Variant] {
        if length == 0 {
            return &[];
        }
        let end = start.saturating_add(length);
        let lo = self.variants.partition_point(|v| v.pseudo_end() <= start);
        let hi = lo + self.variants[lo..].partition_point(|v| v.pseudo_position < end);
        &self.variants[lo..hi]
    }
}

/// All ledgers of a run, keyed by chromosome then haplotype.
#[derive(Debug, Default)]
pub struct Registry {
    ledgers: HashMap<String, Vec<Ledger>>,
    variant_count: usize,
}

impl Registry {
    /// Build the registry from variant definitions in registry order.
    pub fn build<I>(defs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = VariantDef>,
    {
        let mut order: Vec<LedgerKey> = Vec::new();
        let mut grouped: HashMap<LedgerKey, Vec<(VariantKind, u64, u64)>> = HashMap::new();
        for def in defs {
            let key = LedgerKey::new(def.chromosome, def.haplotype);
            let sites = grouped.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                Vec::new()
            });
            sites.push((def.kind, def.position, def.length));
        }

        let mut registry = Registry::default();
        for key in order {
            let sites = grouped.remove(&key).unwrap_or_default();
            let ledger = Ledger::build(key, sites)?;
            registry.insert(ledger);
        }
        Ok(registry)
    }

    fn insert(&mut self, ledger: Ledger) {
        self.variant_count += ledger.len();
        let slot = self.ledgers.entry(ledger.chromosome().to_string()).or_default();
        slot.retain(|l| l.haplotype() != ledger.haplotype());
        slot.push(ledger);
    }

    /// `None` means the chromosome/haplotype has no modifications.
    pub fn ledger_for(&self, chromosome: &str, haplotype: Haplotype) -> Option<&Ledger> {
        self.ledgers
            .get(chromosome)?
            .iter()
            .find(|l| l.haplotype() == haplotype)
    }

    pub fn has_haplotype(&self, chromosome: &str, haplotype: Haplotype) -> bool {
        self.ledger_for(chromosome, haplotype).is_some()
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &Ledger> {
        self.ledgers.values().flatten()
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.ledgers.keys().map(String::as_str)
    }

    pub fn variant_count(&self) -> usize {
        self.variant_count
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }
}
