//! lapels-rs: remap alignments made against a pseudo genome back onto the
//! reference genome.
//!
//! # Library usage
//!
//! ```no_run
//! use lapels_rs::{HaplotypeSuffixes, ContigMap, Registry, RemapConfig, Remapper};
//! use lapels_rs::{PipelineOptions, bam_io, mod_file, pipeline};
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//!
//! # fn main() -> anyhow::Result<()> {
//! let defs = mod_file::load_mod_file(Path::new("sample.mod"))?;
//! let registry = Registry::build(defs)?;
//!
//! let (mut reader, header) = bam_io::open_bam(Path::new("pseudo.bam"))?;
//! let contigs = ContigMap::build(&header, &registry, &HaplotypeSuffixes::default());
//! let remapper = Remapper::new(&registry, &contigs, RemapConfig::default());
//!
//! let mut out = Vec::new();
//! let summary = pipeline::remap_stream(
//!     &remapper,
//!     reader.record_bufs(&header),
//!     &mut out,
//!     &PipelineOptions::default(),
//!     &AtomicBool::new(false),
//! )?;
//! println!("{} records remapped", summary.remapped);
//! # Ok(())
//! # }
//! ```

pub(crate) mod types;

pub mod annotate;
pub mod bam_io;
pub mod cli;
pub mod error;
pub mod header;
pub mod mates;
pub mod mod_file;
pub mod pipeline;
pub mod registry;
pub mod remap;
pub mod transform;
pub mod translate;

// Flat re-exports for the most commonly used public types.
pub use annotate::{VariantTags, annotate};
pub use error::{RecordError, RegistryError, Warning};
pub use header::{ContigMap, HaplotypeSuffixes};
pub use pipeline::{OutputOrder, PipelineOptions, remap_stream};
pub use registry::{Haplotype, Ledger, Registry, Variant, VariantDef, VariantKind};
pub use remap::{Disposition, Outcome, RemapConfig, Remapper, Summary};
pub use transform::{Overlap, Transformed, transform_cigar};
pub use translate::Translation;
