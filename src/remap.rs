//! Per-record remapping.
//!
//! A record goes through: unmapped check, ledger lookup, start translation,
//! CIGAR transformation, annotation, emission. Mate fields of paired
//! primary records are left to [`crate::mates`].

use crate::annotate::{VariantTags, annotate, push_warning};
use crate::error::{RecordError, Warning};
use crate::header::ContigMap;
use crate::mates::MateKey;
use crate::registry::{Ledger, Registry};
use crate::transform::{format_cigar, query_length, reference_span, transform_cigar};
use noodles::core::Position;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;

pub const ORIGINAL_CIGAR_TAG: Tag = Tag::new(b'O', b'C');
pub const ORIGINAL_POSITION_TAG: Tag = Tag::new(b'O', b'P');
const MD_TAG: Tag = Tag::new(b'M', b'D');
const NM_TAG: Tag = Tag::new(b'N', b'M');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapConfig {
    /// Write `XV:Z` with the ids of touched variants.
    pub variant_ids: bool,
    /// Keep the pseudo-genome CIGAR (`OC:Z`) and start (`OP:i`).
    pub original_tags: bool,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            variant_ids: false,
            original_tags: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Unmapped,
    /// No ledger for the contig; position and CIGAR untouched.
    PassThrough,
    Remapped,
    /// Remapped on a best-effort basis, see [`Warning::AmbiguousClipBoundary`].
    AmbiguousClipBoundary,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub record: RecordBuf,
    pub disposition: Disposition,
    pub tags: VariantTags,
}

/// Run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub records: u64,
    pub unmapped: u64,
    pub pass_through: u64,
    pub remapped: u64,
    pub ambiguous_clip_boundary: u64,
    pub unresolved_mate: u64,
    pub corrupt_operation_string: u64,
    pub cancelled: bool,
}

impl Summary {
    pub fn count(&mut self, disposition: Disposition) {
        self.records += 1;
        match disposition {
            Disposition::Unmapped => self.unmapped += 1,
            Disposition::PassThrough => self.pass_through += 1,
            Disposition::Remapped => self.remapped += 1,
            Disposition::AmbiguousClipBoundary => self.ambiguous_clip_boundary += 1,
        }
    }

    pub fn count_corrupt(&mut self) {
        self.records += 1;
        self.corrupt_operation_string += 1;
    }

    pub fn merge(&mut self, other: &Summary) {
        self.records += other.records;
        self.unmapped += other.unmapped;
        self.pass_through += other.pass_through;
        self.remapped += other.remapped;
        self.ambiguous_clip_boundary += other.ambiguous_clip_boundary;
        self.unresolved_mate += other.unresolved_mate;
        self.corrupt_operation_string += other.corrupt_operation_string;
        self.cancelled |= other.cancelled;
    }
}

pub struct Remapper<'a> {
    registry: &'a Registry,
    contigs: &'a ContigMap,
    config: RemapConfig,
}

impl<'a> Remapper<'a> {
    pub fn new(registry: &'a Registry, contigs: &'a ContigMap, config: RemapConfig) -> Self {
        Self {
            registry,
            contigs,
            config,
        }
    }

    pub fn config(&self) -> &RemapConfig {
        &self.config
    }

    fn ledger(&self, input_id: usize) -> Option<&'a Ledger> {
        let entry = self.contigs.get(input_id)?;
        self.registry.ledger_for(&entry.chromosome, entry.haplotype?)
    }

    /// Remap a batch, skipping (and counting) records that cannot be remapped.
    pub fn remap_batch(&self, records: Vec<RecordBuf>, summary: &mut Summary) -> Vec<RecordBuf> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            match self.remap(record) {
                Ok(outcome) => {
                    summary.count(outcome.disposition);
                    out.push(outcome.record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping record");
                    summary.count_corrupt();
                }
            }
        }
        out
    }

    pub fn remap(&self, mut record: RecordBuf) -> Result<Outcome, RecordError> {
        let read = record
            .name()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .unwrap_or_else(|| "*".to_string());

        let input_id = record.reference_sequence_id();
        if let Some(id) = input_id {
            let output_id = self.contigs.output_id(id).ok_or_else(|| {
                RecordError::corrupt(&read, format!("reference sequence id {id} not in header"))
            })?;
            *record.reference_sequence_id_mut() = Some(output_id);
        }
        self.remap_mate_fields(&mut record, input_id);

        if record.flags().is_unmapped() {
            return Ok(Outcome {
                record,
                disposition: Disposition::Unmapped,
                tags: VariantTags::default(),
            });
        }

        let input_id = input_id
            .ok_or_else(|| RecordError::corrupt(&read, "mapped record without reference sequence"))?;
        let start = record
            .alignment_start()
            .ok_or_else(|| RecordError::corrupt(&read, "mapped record without alignment start"))?;
        validate_operations(&record, &read)?;

        let Some(ledger) = self.ledger(input_id) else {
            return Ok(Outcome {
                record,
                disposition: Disposition::PassThrough,
                tags: VariantTags::default(),
            });
        };

        let ops = record.cigar().as_ref();
        let pseudo_start = usize::from(start) as u64 - 1;
        let original_cigar = format_cigar(ops);
        let transformed = transform_cigar(ledger, pseudo_start, ops);
        let tags = annotate(&transformed.overlaps);

        *record.alignment_start_mut() = Position::new(transformed.reference_start as usize + 1);
        *record.cigar_mut() = transformed.cigar;

        let data = record.data_mut();
        if !tags.is_empty() {
            data.remove(&MD_TAG);
            data.remove(&NM_TAG);
        }
        tags.apply(data, self.config.variant_ids);
        if self.config.original_tags {
            data.insert(ORIGINAL_CIGAR_TAG, Value::String(original_cigar.into()));
            data.insert(
                ORIGINAL_POSITION_TAG,
                Value::from(i32::try_from(usize::from(start)).unwrap_or(i32::MAX)),
            );
        }

        let mut disposition = Disposition::Remapped;
        if transformed.ambiguous_clip_boundary || !transformed.aligned {
            disposition = Disposition::AmbiguousClipBoundary;
            push_warning(record.data_mut(), Warning::AmbiguousClipBoundary);
            tracing::warn!(
                read = %read,
                chromosome = ledger.chromosome(),
                pseudo_start,
                aligned = transformed.aligned,
                "alignment boundary falls inside an insertion"
            );
        }
        if !transformed.aligned {
            let mut flags = record.flags();
            flags.insert(Flags::UNMAPPED);
            *record.flags_mut() = flags;
        }

        tracing::trace!(read = %read, variants = tags.variant_ids.len(), "remapped");
        Ok(Outcome {
            record,
            disposition,
            tags,
        })
    }

    /// Translate the mate contig id. Records outside pair coordination get
    /// their mate start translated directly and a zero template length.
    fn remap_mate_fields(&self, record: &mut RecordBuf, input_id: Option<usize>) {
        let Some(mate_input_id) = record.mate_reference_sequence_id() else {
            return;
        };
        *record.mate_reference_sequence_id_mut() = self.contigs.output_id(mate_input_id);

        if MateKey::for_record(record).is_some() {
            return;
        }
        let own_ledger = input_id.and_then(|id| self.ledger(id));
        let mate_ledger = self.ledger(mate_input_id);
        if own_ledger.is_none() && mate_ledger.is_none() {
            return;
        }
        if let Some(mate_start) = record.mate_alignment_start()
            && let Some(ledger) = mate_ledger
        {
            let translated = ledger
                .pseudo_to_reference(usize::from(mate_start) as u64 - 1)
                .position();
            *record.mate_alignment_start_mut() = Position::new(translated as usize + 1);
        }
        *record.template_length_mut() = 0;
    }
}

fn validate_operations(record: &RecordBuf, read: &str) -> Result<(), RecordError> {
    let ops = record.cigar().as_ref();
    if reference_span(ops) == 0 {
        return Err(RecordError::corrupt(read, "no reference-consuming operation"));
    }
    let read_length = record.sequence().len() as u64;
    let cigar_length = query_length(ops);
    if read_length != 0 && cigar_length != read_length {
        return Err(RecordError::corrupt(
            read,
            format!("operations describe {cigar_length} bases, sequence has {read_length}"),
        ));
    }
    Ok(())
}
