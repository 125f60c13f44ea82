use anyhow::{Context, Result};
use noodles::sam::alignment::RecordBuf;
use noodles::{bam, sam};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub fn open_bam(path: &Path) -> Result<(bam::io::Reader<impl Read + Send>, sam::Header)> {
    let mut reader = bam::io::reader::Builder
        .build_from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let header = reader
        .read_header()
        .with_context(|| format!("failed to read header of {}", path.display()))?;
    Ok((reader, header))
}

/// Destination of remapped records.
pub trait RecordSink {
    fn write_record(&mut self, record: RecordBuf) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<RecordBuf> {
    fn write_record(&mut self, record: RecordBuf) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

/// Any noodles alignment writer, paired with the header it was opened with.
pub struct AlignmentSink<'h, W> {
    header: &'h sam::Header,
    writer: W,
}

impl<'h, W> AlignmentSink<'h, W>
where
    W: sam::alignment::io::Write,
{
    pub fn new(header: &'h sam::Header, writer: W) -> Self {
        Self { header, writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> RecordSink for AlignmentSink<'_, W>
where
    W: sam::alignment::io::Write,
{
    fn write_record(&mut self, record: RecordBuf) -> Result<()> {
        self.writer.write_alignment_record(self.header, &record)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.finish(self.header)?;
        Ok(())
    }
}

/// Create a BAM file and write its header.
pub fn create_bam<'h>(
    path: &Path,
    header: &'h sam::Header,
) -> Result<AlignmentSink<'h, impl sam::alignment::io::Write>> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = bam::io::Writer::new(file);
    writer
        .write_header(header)
        .with_context(|| format!("failed to write header to {}", path.display()))?;
    Ok(AlignmentSink::new(header, writer))
}
