use crate::header::HaplotypeSuffixes;
use crate::pipeline::{OutputOrder, PipelineOptions};
use crate::remap::RemapConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lapels-rs",
    about = "Remap alignments against a pseudo genome back to reference coordinates",
    version
)]
pub struct Args {
    /// Input BAM with alignments against the pseudo genome
    pub in_bam: PathBuf,

    /// MOD file(s) describing how the pseudo genome was derived
    #[arg(short = 'm', long = "mod", value_name = "MOD", required = true)]
    pub mod_files: Vec<PathBuf>,

    /// Output BAM path
    #[arg(short = 'o', long = "out", value_name = "BAM")]
    pub out_bam: PathBuf,

    /// Number of threads (CPUs) to use
    #[arg(short = 'p', long = "threads", default_value_t = 1)]
    pub threads: u8,

    /// Records per batch handed to a worker
    #[arg(long, default_value_t = 1024)]
    pub batch_size: usize,

    /// Sort output by reference coordinate (holds all records in memory)
    #[arg(long)]
    pub sort_by_coordinate: bool,

    /// Records to wait for a mate in another batch
    #[arg(long, default_value_t = 100_000)]
    pub mate_window: usize,

    /// Write XV:Z with the ids of the variants each read touches
    #[arg(long)]
    pub variant_ids: bool,

    /// Do not keep the original CIGAR (OC) and position (OP)
    #[arg(long)]
    pub no_original_tags: bool,

    /// Contig name suffix of the paternal haplotype
    #[arg(long, default_value = "_paternal")]
    pub paternal_suffix: String,

    /// Contig name suffix of the maternal haplotype
    #[arg(long, default_value = "_maternal")]
    pub maternal_suffix: String,

    /// Set logging level to WARN
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

impl Args {
    pub fn remap_config(&self) -> RemapConfig {
        RemapConfig {
            variant_ids: self.variant_ids,
            original_tags: !self.no_original_tags,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            threads: self.threads as usize,
            batch_size: self.batch_size,
            order: if self.sort_by_coordinate {
                OutputOrder::Coordinate
            } else {
                OutputOrder::Input
            },
            mate_window: self.mate_window,
            ..PipelineOptions::default()
        }
    }

    pub fn suffixes(&self) -> HaplotypeSuffixes {
        HaplotypeSuffixes {
            paternal: self.paternal_suffix.clone(),
            maternal: self.maternal_suffix.clone(),
        }
    }
}
