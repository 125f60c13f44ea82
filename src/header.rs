//! Contig resolution and the output header.
//!
//! Pseudo-genome contigs of a diploid build are named after the chromosome
//! plus a haplotype suffix (`chr1_paternal`, `chr1_maternal`). Both copies
//! collapse onto one reference contig in the output.

use crate::registry::{Haplotype, Registry};
use crate::types::{HashMap, HashMapExt, RefId};
use anyhow::{Context, Result};
use noodles::sam;
use noodles::sam::header::record::value::{Map, map::ReferenceSequence};
use std::num::NonZeroUsize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaplotypeSuffixes {
    pub paternal: String,
    pub maternal: String,
}

impl Default for HaplotypeSuffixes {
    fn default() -> Self {
        Self {
            paternal: "_paternal".to_string(),
            maternal: "_maternal".to_string(),
        }
    }
}

impl HaplotypeSuffixes {
    /// Split a contig name into chromosome and haplotype, if suffixed.
    pub fn split<'a>(&self, name: &'a str) -> (&'a str, Option<Haplotype>) {
        let candidates = [
            (self.paternal.as_str(), Haplotype::Paternal),
            (self.maternal.as_str(), Haplotype::Maternal),
        ];
        for (suffix, haplotype) in candidates {
            if suffix.is_empty() {
                continue;
            }
            if let Some(chromosome) = name.strip_suffix(suffix)
                && !chromosome.is_empty()
            {
                return (chromosome, Some(haplotype));
            }
        }
        (name, None)
    }
}

/// Where the records of one input contig go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigEntry {
    pub chromosome: String,
    /// Ledger haplotype to remap with; `None` passes records through.
    pub haplotype: Option<Haplotype>,
    pub output_id: RefId,
}

#[derive(Debug, Clone)]
pub struct ContigMap {
    entries: Vec<ContigEntry>,
    outputs: Vec<(String, u64)>,
}

impl ContigMap {
    pub fn build(input: &sam::Header, registry: &Registry, suffixes: &HaplotypeSuffixes) -> Self {
        let mut entries = Vec::with_capacity(input.reference_sequences().len());
        let mut outputs: Vec<(String, u64)> = Vec::new();
        let mut output_ids: HashMap<String, RefId> = HashMap::new();

        for (name, sequence) in input.reference_sequences() {
            let name = name.to_string();
            let pseudo_length = sequence.length().get() as u64;
            let (chromosome, suffix) = suffixes.split(&name);

            let haplotype = match suffix {
                Some(haplotype) => [haplotype, Haplotype::Single]
                    .into_iter()
                    .find(|&h| registry.has_haplotype(chromosome, h)),
                None => [Haplotype::Single, Haplotype::Reference]
                    .into_iter()
                    .find(|&h| registry.has_haplotype(chromosome, h)),
            };
            let reference_length = haplotype
                .and_then(|h| registry.ledger_for(chromosome, h))
                .map_or(pseudo_length, |ledger| ledger.reference_length(pseudo_length));

            let output_id = match output_ids.get(chromosome) {
                Some(&id) => {
                    let known = outputs[id].1;
                    if known != reference_length {
                        tracing::warn!(
                            contig = %name,
                            chromosome,
                            known,
                            derived = reference_length,
                            "reference length disagrees between haplotypes; keeping the first"
                        );
                    }
                    id
                }
                None => {
                    let id = outputs.len();
                    outputs.push((chromosome.to_string(), reference_length));
                    output_ids.insert(chromosome.to_string(), id);
                    id
                }
            };

            tracing::debug!(contig = %name, chromosome, ?haplotype, output_id, "resolved contig");
            entries.push(ContigEntry {
                chromosome: chromosome.to_string(),
                haplotype,
                output_id,
            });
        }

        Self { entries, outputs }
    }

    pub fn get(&self, id: RefId) -> Option<&ContigEntry> {
        self.entries.get(id)
    }

    pub fn output_id(&self, id: RefId) -> Option<RefId> {
        self.get(id).map(|entry| entry.output_id)
    }

    pub fn input_len(&self) -> usize {
        self.entries.len()
    }

    /// Output contigs as `(name, reference length)`.
    pub fn outputs(&self) -> &[(String, u64)] {
        &self.outputs
    }

    /// The input header with its reference sequences replaced by the
    /// reference chromosomes.
    pub fn output_header(&self, input: &sam::Header) -> Result<sam::Header> {
        let mut header = input.clone();
        let sequences = header.reference_sequences_mut();
        sequences.clear();
        for (name, length) in &self.outputs {
            let length = NonZeroUsize::new(*length as usize)
                .with_context(|| format!("reference sequence {name} has zero length"))?;
            sequences.insert(name.clone().into(), Map::<ReferenceSequence>::new(length));
        }
        Ok(header)
    }
}
