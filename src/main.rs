use anyhow::Result;
use clap::Parser;
use lapels_rs::bam_io;
use lapels_rs::cli::Args;
use lapels_rs::header::ContigMap;
use lapels_rs::mod_file;
use lapels_rs::pipeline;
use lapels_rs::registry::Registry;
use lapels_rs::remap::Remapper;
use mimalloc::MiMalloc;
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.quiet {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut defs = Vec::new();
    for path in &args.mod_files {
        defs.extend(mod_file::load_mod_file(path)?);
    }
    let registry = Registry::build(defs)?;
    tracing::info!(
        ledgers = registry.ledgers().count(),
        variants = registry.variant_count(),
        "registry built"
    );

    let (mut reader, in_header) = bam_io::open_bam(&args.in_bam)?;
    let contigs = ContigMap::build(&in_header, &registry, &args.suffixes());
    let out_header = contigs.output_header(&in_header)?;
    let mut sink = bam_io::create_bam(&args.out_bam, &out_header)?;

    let remapper = Remapper::new(&registry, &contigs, args.remap_config());
    let options = args.pipeline_options();
    let cancel = AtomicBool::new(false);
    let summary = pipeline::remap_stream(
        &remapper,
        reader.record_bufs(&in_header),
        &mut sink,
        &options,
        &cancel,
    )?;

    tracing::info!(
        records = summary.records,
        remapped = summary.remapped,
        pass_through = summary.pass_through,
        unmapped = summary.unmapped,
        ambiguous_clip_boundary = summary.ambiguous_clip_boundary,
        unresolved_mate = summary.unresolved_mate,
        corrupt_operation_string = summary.corrupt_operation_string,
        "lapels-rs: processing complete"
    );
    Ok(())
}
