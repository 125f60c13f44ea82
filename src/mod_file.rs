//! MOD files: the text form of a modification registry.
//!
//! One variant per tab-separated line:
//!
//! ```text
//! #haplotype=paternal
//! s   chr1    1001    A/G
//! i   chr1    2001    TTA
//! d   chr1    3001    CA
//! d   chr2    501     12      maternal
//! ```
//!
//! Positions are 1-based. Substitutions carry `REF/ALT` or just `ALT`,
//! insertions the inserted bases, deletions the deleted bases or their
//! count. An optional fifth column overrides the file's haplotype.

use crate::registry::{Haplotype, VariantDef, VariantKind};
use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const HAPLOTYPE_DIRECTIVE: &str = "#haplotype=";

pub fn load_mod_file(path: &Path) -> Result<Vec<VariantDef>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let defs = parse_mod(BufReader::new(file), &path.display().to_string())?;
    tracing::info!(path = %path.display(), variants = defs.len(), "loaded MOD file");
    Ok(defs)
}

/// Parse MOD lines; `source` names the input in error messages.
pub fn parse_mod<R: BufRead>(reader: R, source: &str) -> Result<Vec<VariantDef>> {
    let mut defs = Vec::new();
    let mut haplotype = Haplotype::Single;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.with_context(|| format!("{source}:{line_no}: read failed"))?;
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix(HAPLOTYPE_DIRECTIVE) {
            haplotype = name
                .trim()
                .parse()
                .with_context(|| format!("{source}:{line_no}: bad haplotype directive"))?;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        let def = parse_line(line, haplotype).with_context(|| format!("{source}:{line_no}"))?;
        defs.push(def);
    }
    Ok(defs)
}

fn parse_line(line: &str, default_haplotype: Haplotype) -> Result<VariantDef> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < 4 {
        bail!("expected at least 4 tab-separated fields, found {}", fields.len());
    }

    let kind = match fields[0] {
        "s" | "S" => VariantKind::Substitution,
        "i" | "I" => VariantKind::Insertion,
        "d" | "D" => VariantKind::Deletion,
        other => bail!("unknown variant type {other:?}"),
    };
    let chromosome = fields[1];
    if chromosome.is_empty() {
        bail!("empty chromosome name");
    }
    let position: u64 = fields[2]
        .parse()
        .with_context(|| format!("bad position {:?}", fields[2]))?;
    if position == 0 {
        bail!("positions are 1-based");
    }
    let length = data_length(kind, fields[3])?;
    let haplotype = match fields.get(4) {
        Some(h) if !h.is_empty() => h.parse()?,
        _ => default_haplotype,
    };

    Ok(VariantDef::new(chromosome, haplotype, kind, position - 1, length))
}

fn data_length(kind: VariantKind, data: &str) -> Result<u64> {
    let bases = |s: &str| -> Result<u64> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_alphabetic()) {
            bail!("bad sequence {s:?}");
        }
        Ok(s.len() as u64)
    };
    match kind {
        VariantKind::Substitution => match data.split_once('/') {
            Some((reference, alternate)) => {
                let (r, a) = (bases(reference)?, bases(alternate)?);
                if r != a {
                    bail!("substitution {data:?} changes length");
                }
                Ok(a)
            }
            None => bases(data),
        },
        VariantKind::Insertion => bases(data),
        VariantKind::Deletion => {
            if data.bytes().all(|b| b.is_ascii_digit()) && !data.is_empty() {
                data.parse().with_context(|| format!("bad deletion length {data:?}"))
            } else {
                bases(data)
            }
        }
    }
}
