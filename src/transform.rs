//! CIGAR transformation from pseudo-genome to reference coordinates.
//!
//! The walk keeps two cursors in lock-step: a pseudo cursor driven by the
//! input operations and a reference cursor derived from the ledger. Every
//! input operation is split at variant boundaries:
//!
//! - substitutions keep the alignment shape (`=` turns into `X` because the
//!   read carries the alternate allele);
//! - aligned bases inside an insertion of the pseudo genome have no
//!   reference counterpart and become `I`;
//! - crossing a deletion junction emits a `D` (or widens an `N`) of the
//!   deleted reference length;
//! - read insertions, clips and padding never touch variants.
//!
//! A variant boundary that coincides with an operation boundary is resolved
//! before the next input operation is started.

use crate::registry::{Ledger, Variant, VariantKind};
use noodles::sam::alignment::record::cigar::{op::Kind as CigarKind, Op as SamCigarOp};
use noodles::sam::alignment::record_buf::Cigar as SamCigar;

/// How much of one variant a single alignment consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlap {
    pub variant: Variant,
    pub pseudo_consumed: u64,
    pub reference_consumed: u64,
}

#[derive(Debug, Clone)]
pub struct Transformed {
    /// 0-based reference position of the first reference-consuming operation.
    pub reference_start: u64,
    pub cigar: SamCigar,
    /// Variants touched, 5' to 3' along the reference.
    pub overlaps: Vec<Overlap>,
    /// The alignment starts or ends strictly inside an insertion.
    pub ambiguous_clip_boundary: bool,
    /// False when no reference-consuming operation is left.
    pub aligned: bool,
}

pub fn consumes_reference(kind: CigarKind) -> bool {
    matches!(
        kind,
        CigarKind::Match
            | CigarKind::Deletion
            | CigarKind::Skip
            | CigarKind::SequenceMatch
            | CigarKind::SequenceMismatch
    )
}

pub fn consumes_read(kind: CigarKind) -> bool {
    matches!(
        kind,
        CigarKind::Match
            | CigarKind::Insertion
            | CigarKind::SoftClip
            | CigarKind::SequenceMatch
            | CigarKind::SequenceMismatch
    )
}

fn is_aligned(kind: CigarKind) -> bool {
    matches!(
        kind,
        CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch
    )
}

/// Reference (here: pseudo) bases spanned by the operations.
pub fn reference_span(ops: &[SamCigarOp]) -> u64 {
    ops.iter()
        .filter(|op| consumes_reference(op.kind()))
        .map(|op| op.len() as u64)
        .sum()
}

/// Read bases described by the operations.
pub fn query_length(ops: &[SamCigarOp]) -> u64 {
    ops.iter()
        .filter(|op| consumes_read(op.kind()))
        .map(|op| op.len() as u64)
        .sum()
}

pub fn transform_cigar(ledger: &Ledger, pseudo_start: u64, ops: &[SamCigarOp]) -> Transformed {
    let span = reference_span(ops);
    let variants = ledger.variants_overlapping_pseudo_range(pseudo_start, span);
    let pseudo_end = pseudo_start + span;
    let reference_start = ledger.pseudo_to_reference(pseudo_start).position();

    let ambiguous_clip_boundary = variants
        .first()
        .is_some_and(|v| v.kind == VariantKind::Insertion && v.pseudo_position < pseudo_start)
        || variants
            .last()
            .is_some_and(|v| v.kind == VariantKind::Insertion && v.pseudo_end() > pseudo_end);

    let mut walker = Walker {
        variants,
        next: 0,
        pseudo: pseudo_start,
        reference: reference_start,
        builder: CigarBuilder::default(),
        overlaps: Vec::new(),
    };
    for op in ops {
        walker.step(op.kind(), op.len() as u64);
    }

    let (cigar, aligned) = walker.builder.finish();
    Transformed {
        reference_start,
        cigar,
        overlaps: walker.overlaps,
        ambiguous_clip_boundary,
        aligned,
    }
}

struct Walker<'a> {
    variants: &'a [Variant],
    next: usize,
    pseudo: u64,
    reference: u64,
    builder: CigarBuilder,
    overlaps: Vec<Overlap>,
}

impl Walker<'_> {
    fn step(&mut self, kind: CigarKind, len: u64) {
        if !consumes_reference(kind) {
            self.builder.push(kind, len, Origin::Read);
            return;
        }

        let mut remaining = len;
        while remaining > 0 {
            self.settle(kind);
            let take = match self.variants.get(self.next).copied() {
                Some(v) if v.pseudo_position <= self.pseudo => {
                    let take = remaining.min(v.pseudo_end() - self.pseudo);
                    self.consume_inside(&v, kind, take);
                    if self.pseudo == v.pseudo_end() {
                        self.next += 1;
                    }
                    take
                }
                next => {
                    let limit = next.map_or(u64::MAX, |v| v.pseudo_position - self.pseudo);
                    let take = remaining.min(limit);
                    self.builder.push(kind, take, Origin::Read);
                    self.pseudo += take;
                    self.reference += take;
                    take
                }
            };
            remaining -= take;
        }
        self.settle(kind);
    }

    /// Skip variants already behind the cursor and resolve deletion
    /// junctions sitting exactly at it.
    fn settle(&mut self, kind: CigarKind) {
        while let Some(v) = self.variants.get(self.next).copied() {
            let behind = if v.kind == VariantKind::Deletion {
                v.pseudo_position < self.pseudo
            } else {
                v.pseudo_end() <= self.pseudo
            };
            if behind {
                self.next += 1;
                continue;
            }
            if v.kind != VariantKind::Deletion || v.pseudo_position != self.pseudo {
                break;
            }
            let out = if kind == CigarKind::Skip {
                CigarKind::Skip
            } else {
                CigarKind::Deletion
            };
            self.builder.push(out, v.reference_length, Origin::Variant);
            self.reference += v.reference_length;
            self.record(&v, 0, v.reference_length);
            self.next += 1;
        }
    }

    fn consume_inside(&mut self, v: &Variant, kind: CigarKind, take: u64) {
        match v.kind {
            VariantKind::Substitution => {
                let out = if kind == CigarKind::SequenceMatch {
                    CigarKind::SequenceMismatch
                } else {
                    kind
                };
                self.builder.push(out, take, Origin::Read);
                self.reference += take;
                if is_aligned(kind) {
                    self.record(v, take, take);
                }
            }
            VariantKind::Insertion => {
                // D/N over inserted bases: absent from both the read and the reference.
                if is_aligned(kind) {
                    self.builder.push(CigarKind::Insertion, take, Origin::Variant);
                    self.record(v, take, 0);
                }
            }
            VariantKind::Deletion => {}
        }
        self.pseudo += take;
    }

    fn record(&mut self, variant: &Variant, pseudo: u64, reference: u64) {
        if let Some(last) = self.overlaps.last_mut()
            && last.variant == *variant
        {
            last.pseudo_consumed += pseudo;
            last.reference_consumed += reference;
            return;
        }
        self.overlaps.push(Overlap {
            variant: *variant,
            pseudo_consumed: pseudo,
            reference_consumed: reference,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Read,
    Variant,
}

#[derive(Debug, Clone, Copy)]
struct Piece {
    kind: CigarKind,
    len: u64,
    origin: Origin,
}

#[derive(Debug, Default)]
struct CigarBuilder {
    pieces: Vec<Piece>,
}

impl CigarBuilder {
    fn push(&mut self, kind: CigarKind, len: u64, origin: Origin) {
        if len == 0 {
            return;
        }
        if let Some(last) = self.pieces.last_mut()
            && last.kind == kind
            && last.origin == origin
        {
            last.len += len;
            return;
        }
        self.pieces.push(Piece { kind, len, origin });
    }

    /// Soft-clip the read bases outside the reference-consuming core on
    /// every side that carries inserted variant bases, then coalesce
    /// same-kind neighbours. Soft clips only ever sit at the ends.
    fn finish(mut self) -> (SamCigar, bool) {
        let first = self.pieces.iter().position(|p| consumes_reference(p.kind));
        let last = self.pieces.iter().rposition(|p| consumes_reference(p.kind));

        match (first, last) {
            (Some(f), Some(l)) => {
                clip_if_inserted(&mut self.pieces[..f]);
                clip_if_inserted(&mut self.pieces[l + 1..]);
            }
            _ => clip(&mut self.pieces),
        }

        let mut ops: Vec<SamCigarOp> = Vec::with_capacity(self.pieces.len());
        for piece in &self.pieces {
            if let Some(prev) = ops.last_mut()
                && prev.kind() == piece.kind
            {
                *prev = SamCigarOp::new(piece.kind, prev.len() + piece.len as usize);
                continue;
            }
            ops.push(SamCigarOp::new(piece.kind, piece.len as usize));
        }

        (ops.into_iter().collect(), first.is_some())
    }
}

fn clip_if_inserted(pieces: &mut [Piece]) {
    let inserted = pieces
        .iter()
        .any(|p| p.origin == Origin::Variant && p.kind == CigarKind::Insertion);
    if inserted {
        clip(pieces);
    }
}

fn clip(pieces: &mut [Piece]) {
    for piece in pieces.iter_mut().filter(|p| consumes_read(p.kind)) {
        piece.kind = CigarKind::SoftClip;
    }
}

/// SAM text form of the operations, `*` when empty.
pub fn format_cigar(ops: &[SamCigarOp]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    let mut out = String::with_capacity(ops.len() * 4);
    for op in ops {
        let code = match op.kind() {
            CigarKind::Match => 'M',
            CigarKind::Insertion => 'I',
            CigarKind::Deletion => 'D',
            CigarKind::Skip => 'N',
            CigarKind::SoftClip => 'S',
            CigarKind::HardClip => 'H',
            CigarKind::Pad => 'P',
            CigarKind::SequenceMatch => '=',
            CigarKind::SequenceMismatch => 'X',
        };
        out.push_str(&op.len().to_string());
        out.push(code);
    }
    out
}
