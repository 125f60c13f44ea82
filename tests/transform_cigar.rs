use lapels_rs::registry::LedgerKey;
use lapels_rs::transform::{format_cigar, query_length, reference_span};
use lapels_rs::{Haplotype, Ledger, Translation, VariantKind, transform_cigar};
use noodles::sam::alignment::record::cigar::{Op as SamCigarOp, op::Kind as CigarKind};
use proptest::prelude::*;

fn ledger(sites: &[(VariantKind, u64, u64)]) -> Ledger {
    Ledger::build(LedgerKey::new("chr1", Haplotype::Single), sites.iter().copied())
        .expect("valid ledger")
}

fn ops(pairs: &[(CigarKind, usize)]) -> Vec<SamCigarOp> {
    pairs.iter().map(|&(kind, len)| SamCigarOp::new(kind, len)).collect()
}

fn cigar_kinds(cigar: &noodles::sam::alignment::record_buf::Cigar) -> Vec<(CigarKind, usize)> {
    cigar.as_ref().iter().map(|op| (op.kind(), op.len())).collect()
}

#[test]
fn read_across_insertion_gets_insertion_op() {
    let l = ledger(&[(VariantKind::Insertion, 100, 3)]);
    let t = transform_cigar(&l, 90, &ops(&[(CigarKind::Match, 20)]));

    assert_eq!(t.reference_start, 90);
    assert_eq!(
        cigar_kinds(&t.cigar),
        vec![
            (CigarKind::Match, 10),
            (CigarKind::Insertion, 3),
            (CigarKind::Match, 7),
        ]
    );
    assert_eq!(reference_span(t.cigar.as_ref()), 17);
    assert_eq!(t.overlaps.len(), 1);
    assert_eq!(t.overlaps[0].variant.kind, VariantKind::Insertion);
    assert_eq!(t.overlaps[0].pseudo_consumed, 3);
    assert!(!t.ambiguous_clip_boundary);
    assert!(t.aligned);
}

#[test]
fn read_across_deletion_gets_deletion_op() {
    let l = ledger(&[(VariantKind::Deletion, 50, 4)]);
    let t = transform_cigar(&l, 45, &ops(&[(CigarKind::Match, 10)]));

    assert_eq!(t.reference_start, 45);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M4D5M");
    assert_eq!(t.overlaps.len(), 1);
    assert_eq!(t.overlaps[0].variant.kind, VariantKind::Deletion);
    assert_eq!(t.overlaps[0].reference_consumed, 4);
    assert_eq!(t.overlaps[0].pseudo_consumed, 0);
}

#[test]
fn read_downstream_of_variants_is_shifted() {
    let l = ledger(&[(VariantKind::Insertion, 10, 5)]);
    let t = transform_cigar(&l, 100, &ops(&[(CigarKind::Match, 20)]));

    assert_eq!(t.reference_start, 95);
    assert_eq!(format_cigar(t.cigar.as_ref()), "20M");
    assert!(t.overlaps.is_empty());
}

#[test]
fn adjacent_substitutions_keep_shape() {
    let l = ledger(&[
        (VariantKind::Substitution, 30, 1),
        (VariantKind::Substitution, 31, 1),
    ]);
    let t = transform_cigar(&l, 25, &ops(&[(CigarKind::Match, 10)]));

    assert_eq!(t.reference_start, 25);
    assert_eq!(format_cigar(t.cigar.as_ref()), "10M");
    let positions: Vec<u64> = t
        .overlaps
        .iter()
        .map(|o| o.variant.reference_position)
        .collect();
    assert_eq!(positions, vec![30, 31]);
    assert!(
        t.overlaps
            .iter()
            .all(|o| o.variant.kind == VariantKind::Substitution)
    );
}

#[test]
fn sequence_match_over_substitution_becomes_mismatch() {
    let l = ledger(&[(VariantKind::Substitution, 5, 2)]);
    let t = transform_cigar(&l, 0, &ops(&[(CigarKind::SequenceMatch, 10)]));
    assert_eq!(format_cigar(t.cigar.as_ref()), "5=2X3=");
}

#[test]
fn empty_ledger_is_identity() {
    let l = ledger(&[]);
    let input = ops(&[
        (CigarKind::SoftClip, 3),
        (CigarKind::Match, 10),
        (CigarKind::Insertion, 2),
        (CigarKind::Deletion, 4),
        (CigarKind::Match, 5),
    ]);
    let t = transform_cigar(&l, 1234, &input);
    assert_eq!(t.reference_start, 1234);
    assert_eq!(t.cigar.as_ref(), input.as_slice());
    assert!(t.overlaps.is_empty());
}

#[test]
fn junction_at_operation_boundary_resolves_first() {
    let l = ledger(&[(VariantKind::Deletion, 105, 4)]);
    let input = ops(&[
        (CigarKind::Match, 5),
        (CigarKind::Insertion, 2),
        (CigarKind::Match, 5),
    ]);
    let t = transform_cigar(&l, 100, &input);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M4D2I5M");
}

#[test]
fn junction_inside_skip_widens_skip() {
    let l = ledger(&[(VariantKind::Deletion, 110, 4)]);
    let input = ops(&[
        (CigarKind::Match, 5),
        (CigarKind::Skip, 10),
        (CigarKind::Match, 5),
    ]);
    let t = transform_cigar(&l, 100, &input);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M14N5M");
    assert_eq!(t.overlaps[0].reference_consumed, 4);
}

#[test]
fn read_deletion_over_inserted_bases_shrinks() {
    let l = ledger(&[(VariantKind::Insertion, 105, 3)]);
    let input = ops(&[
        (CigarKind::Match, 5),
        (CigarKind::Deletion, 3),
        (CigarKind::Match, 5),
    ]);
    let t = transform_cigar(&l, 100, &input);
    assert_eq!(format_cigar(t.cigar.as_ref()), "10M");
    assert!(t.overlaps.is_empty());
}

#[test]
fn read_deletion_absorbs_reference_deletion() {
    let l = ledger(&[(VariantKind::Deletion, 106, 4)]);
    let input = ops(&[
        (CigarKind::Match, 5),
        (CigarKind::Deletion, 2),
        (CigarKind::Match, 5),
    ]);
    let t = transform_cigar(&l, 100, &input);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M6D5M");
}

#[test]
fn start_inside_insertion_soft_clips_and_warns() {
    let l = ledger(&[(VariantKind::Insertion, 100, 6)]);
    // pseudo 100..106 is inserted; start 3 bases in
    let t = transform_cigar(&l, 103, &ops(&[(CigarKind::Match, 10)]));

    assert_eq!(t.reference_start, 100);
    assert_eq!(format_cigar(t.cigar.as_ref()), "3S7M");
    assert!(t.ambiguous_clip_boundary);
    assert!(t.aligned);
    assert_eq!(t.overlaps[0].pseudo_consumed, 3);
}

#[test]
fn end_inside_insertion_soft_clips_and_warns() {
    let l = ledger(&[(VariantKind::Insertion, 100, 6)]);
    let t = transform_cigar(
        &l,
        95,
        &ops(&[(CigarKind::Match, 8), (CigarKind::SoftClip, 2)]),
    );
    assert_eq!(t.reference_start, 95);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M5S");
    assert!(t.ambiguous_clip_boundary);
}

#[test]
fn read_starting_at_insertion_is_clipped_without_warning() {
    let l = ledger(&[(VariantKind::Insertion, 100, 4)]);
    let t = transform_cigar(&l, 100, &ops(&[(CigarKind::Match, 10)]));
    assert_eq!(t.reference_start, 100);
    assert_eq!(format_cigar(t.cigar.as_ref()), "4S6M");
    assert!(!t.ambiguous_clip_boundary);
}

#[test]
fn read_insertion_before_clipped_bases_joins_the_clip() {
    let l = ledger(&[(VariantKind::Insertion, 100, 4)]);
    let t = transform_cigar(
        &l,
        100,
        &ops(&[(CigarKind::Insertion, 2), (CigarKind::Match, 10)]),
    );
    assert_eq!(t.reference_start, 100);
    assert_eq!(format_cigar(t.cigar.as_ref()), "6S6M");
    assert!(t.aligned);
}

#[test]
fn read_insertion_after_clipped_bases_joins_the_clip() {
    let l = ledger(&[(VariantKind::Insertion, 100, 4)]);
    let t = transform_cigar(
        &l,
        95,
        &ops(&[(CigarKind::Match, 8), (CigarKind::Insertion, 2)]),
    );
    assert_eq!(t.reference_start, 95);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M5S");
    assert!(t.ambiguous_clip_boundary);
}

#[test]
fn edge_read_insertion_is_kept_without_clipping() {
    let l = ledger(&[(VariantKind::Substitution, 50, 1)]);
    let t = transform_cigar(
        &l,
        45,
        &ops(&[(CigarKind::Insertion, 2), (CigarKind::Match, 10)]),
    );
    assert_eq!(format_cigar(t.cigar.as_ref()), "2I10M");
}

#[test]
fn read_inside_insertion_is_unaligned() {
    let l = ledger(&[(VariantKind::Insertion, 100, 50)]);
    let t = transform_cigar(&l, 110, &ops(&[(CigarKind::Match, 20)]));
    assert!(!t.aligned);
    assert!(t.ambiguous_clip_boundary);
    assert_eq!(t.reference_start, 100);
    assert_eq!(format_cigar(t.cigar.as_ref()), "20S");
}

#[test]
fn deletion_then_insertion_at_same_junction() {
    let l = ledger(&[(VariantKind::Deletion, 50, 4), (VariantKind::Insertion, 54, 3)]);
    let t = transform_cigar(&l, 45, &ops(&[(CigarKind::Match, 13)]));
    assert_eq!(t.reference_start, 45);
    assert_eq!(format_cigar(t.cigar.as_ref()), "5M4D3I5M");
    let kinds: Vec<VariantKind> = t.overlaps.iter().map(|o| o.variant.kind).collect();
    assert_eq!(kinds, vec![VariantKind::Deletion, VariantKind::Insertion]);
}

#[test]
fn clips_and_padding_pass_through() {
    let l = ledger(&[(VariantKind::Substitution, 12, 1)]);
    let input = ops(&[
        (CigarKind::HardClip, 4),
        (CigarKind::SoftClip, 2),
        (CigarKind::Match, 10),
        (CigarKind::Pad, 1),
        (CigarKind::Match, 3),
    ]);
    let t = transform_cigar(&l, 10, &input);
    assert_eq!(format_cigar(t.cigar.as_ref()), "4H2S10M1P3M");
    assert_eq!(t.overlaps.len(), 1);
}

fn arb_sites() -> impl Strategy<Value = Vec<(VariantKind, u64, u64)>> {
    let kind = prop_oneof![
        Just(VariantKind::Substitution),
        Just(VariantKind::Insertion),
        Just(VariantKind::Deletion),
    ];
    prop::collection::vec((kind, 1u64..15, 1u64..6), 0..15).prop_map(|raw| {
        let mut pos = 0u64;
        let mut sites = Vec::with_capacity(raw.len());
        for (kind, gap, len) in raw {
            pos += gap;
            sites.push((kind, pos, len));
            if kind != VariantKind::Insertion {
                pos += len;
            }
        }
        sites
    })
}

fn arb_ops() -> impl Strategy<Value = Vec<SamCigarOp>> {
    let kind = prop_oneof![
        4 => Just(CigarKind::Match),
        1 => Just(CigarKind::Insertion),
        1 => Just(CigarKind::Deletion),
        1 => Just(CigarKind::Skip),
        1 => Just(CigarKind::SequenceMatch),
        1 => Just(CigarKind::SequenceMismatch),
    ];
    (
        (0usize..4, 0usize..3),
        prop::collection::vec((kind, 1usize..12), 1..8),
        (0usize..3, 0usize..4),
    )
        .prop_map(|((lead, lead_ins), body, (trail_ins, trail))| {
            let mut out = Vec::new();
            if lead > 0 {
                out.push(SamCigarOp::new(CigarKind::SoftClip, lead));
            }
            if lead_ins > 0 {
                out.push(SamCigarOp::new(CigarKind::Insertion, lead_ins));
            }
            out.push(SamCigarOp::new(CigarKind::Match, 1));
            out.extend(body.into_iter().map(|(k, n)| SamCigarOp::new(k, n)));
            if trail_ins > 0 {
                out.push(SamCigarOp::new(CigarKind::Insertion, trail_ins));
            }
            if trail > 0 {
                out.push(SamCigarOp::new(CigarKind::SoftClip, trail));
            }
            out
        })
}

proptest! {
    #[test]
    fn query_length_is_preserved(sites in arb_sites(), start in 0u64..120, input in arb_ops()) {
        let l = ledger(&sites);
        let t = transform_cigar(&l, start, &input);
        prop_assert_eq!(query_length(t.cigar.as_ref()), query_length(&input));
    }

    #[test]
    fn reference_span_matches_translated_ends(
        sites in arb_sites(),
        start in 0u64..120,
        input in arb_ops(),
    ) {
        let l = ledger(&sites);
        let t = transform_cigar(&l, start, &input);
        let pseudo_end = start + reference_span(&input);
        // reference position just past the last pseudo base the read covers
        let reference_end = match l.pseudo_to_reference(pseudo_end - 1) {
            Translation::Exact(pos) => pos + 1,
            inside => inside.position(),
        };
        let span = reference_span(t.cigar.as_ref());
        if t.aligned && !t.ambiguous_clip_boundary {
            prop_assert_eq!(t.reference_start + span, reference_end);
        }
    }

    #[test]
    fn output_is_coalesced(sites in arb_sites(), start in 0u64..120, input in arb_ops()) {
        let l = ledger(&sites);
        let t = transform_cigar(&l, start, &input);
        for pair in t.cigar.as_ref().windows(2) {
            prop_assert_ne!(pair[0].kind(), pair[1].kind());
        }
        prop_assert!(t.cigar.as_ref().iter().all(|op| op.len() > 0));
    }

    #[test]
    fn soft_clips_only_at_the_ends(sites in arb_sites(), start in 0u64..120, input in arb_ops()) {
        let l = ledger(&sites);
        let t = transform_cigar(&l, start, &input);
        let ops = t.cigar.as_ref();
        let last = ops.len().saturating_sub(1);
        for (i, op) in ops.iter().enumerate() {
            if op.kind() == CigarKind::SoftClip {
                prop_assert!(i == 0 || i == last, "interior clip in {}", format_cigar(ops));
            }
        }
    }

    #[test]
    fn variant_free_ledger_is_identity(start in 0u64..120, input in arb_ops()) {
        let l = ledger(&[]);
        let t = transform_cigar(&l, start, &input);
        prop_assert_eq!(t.reference_start, start);
        prop_assert_eq!(query_length(t.cigar.as_ref()), query_length(&input));
        prop_assert_eq!(reference_span(t.cigar.as_ref()), reference_span(&input));
    }
}
