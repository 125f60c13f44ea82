//! Batching, the worker pool and the ordered merge stage.
//!
//! Records are cut into batches in input order. With more than one thread a
//! reader thread feeds a bounded work channel, workers remap and pair each
//! batch, and the calling thread merges results back into input order
//! before they pass through the mate window to the sink.

use crate::bam_io::RecordSink;
use crate::mates::{MateWindow, SharedMates, Staged, pair_batch};
use crate::remap::{Remapper, Summary};
use crate::types::BatchId;
use anyhow::Result;
use crossfire::mpmc;
use noodles::sam::alignment::RecordBuf;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputOrder {
    /// Same order as the input stream.
    #[default]
    Input,
    /// Sorted by output reference sequence and start. Holds every record in
    /// memory until the end of the run.
    Coordinate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub threads: usize,
    pub batch_size: usize,
    pub order: OutputOrder,
    /// Records a record may wait for its mate before it is given up on.
    pub mate_window: usize,
    /// Upper bound on views published for mates in other batches.
    pub mate_table_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: 1024,
            order: OutputOrder::Input,
            mate_window: 100_000,
            mate_table_capacity: 1_000_000,
        }
    }
}

struct WorkItem {
    idx: BatchId,
    records: Vec<RecordBuf>,
    corrupt: u64,
}

struct ResultItem {
    idx: BatchId,
    staged: Vec<Staged>,
    summary: Summary,
}

/// Cuts a record stream into batches. Records that fail to decode are
/// counted and dropped; any other read error ends the stream.
struct Batcher<I> {
    records: I,
    batch_size: usize,
    next_idx: BatchId,
    failed: bool,
}

impl<I> Batcher<I> {
    fn new(records: I, batch_size: usize) -> Self {
        Self {
            records,
            batch_size: batch_size.max(1),
            next_idx: 0,
            failed: false,
        }
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = io::Result<RecordBuf>>,
{
    type Item = Result<WorkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let mut records = Vec::with_capacity(self.batch_size);
        let mut corrupt = 0u64;
        while records.len() < self.batch_size {
            match self.records.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                    tracing::warn!(error = %e, "skipping undecodable record");
                    corrupt += 1;
                }
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(anyhow::Error::new(e).context("failed to read record")));
                }
                None => break,
            }
        }
        if records.is_empty() && corrupt == 0 {
            return None;
        }
        let idx = self.next_idx;
        self.next_idx += 1;
        Some(Ok(WorkItem {
            idx,
            records,
            corrupt,
        }))
    }
}

fn process_batch(remapper: &Remapper<'_>, item: WorkItem, mates: &SharedMates) -> ResultItem {
    let mut summary = Summary {
        records: item.corrupt,
        corrupt_operation_string: item.corrupt,
        ..Summary::default()
    };
    let records = remapper.remap_batch(item.records, &mut summary);
    let staged = pair_batch(records, mates);
    ResultItem {
        idx: item.idx,
        staged,
        summary,
    }
}

/// Merge stage: mate window, output order, sink.
struct Emitter<'s, S> {
    sink: &'s mut S,
    window: MateWindow,
    order: OutputOrder,
    sorted: Vec<RecordBuf>,
}

impl<'s, S: RecordSink> Emitter<'s, S> {
    fn new(sink: &'s mut S, options: &PipelineOptions) -> Self {
        Self {
            sink,
            window: MateWindow::new(options.mate_window),
            order: options.order,
            sorted: Vec::new(),
        }
    }

    fn accept(&mut self, staged: Vec<Staged>, mates: &SharedMates) -> Result<()> {
        let ready = self.window.push(staged, mates);
        self.emit(ready)
    }

    fn emit(&mut self, records: Vec<RecordBuf>) -> Result<()> {
        match self.order {
            OutputOrder::Input => {
                for record in records {
                    self.sink.write_record(record)?;
                }
            }
            OutputOrder::Coordinate => self.sorted.extend(records),
        }
        Ok(())
    }

    /// Flush everything and return the number of unresolved mates.
    fn finish(mut self, mates: &SharedMates) -> Result<u64> {
        let rest = self.window.finish(mates);
        self.emit(rest)?;
        if self.order == OutputOrder::Coordinate {
            let mut sorted = std::mem::take(&mut self.sorted);
            sorted.sort_by_key(coordinate_key);
            for record in sorted {
                self.sink.write_record(record)?;
            }
        }
        self.sink.finish()?;
        Ok(self.window.unresolved())
    }
}

// Unplaced records sort last; the sort is stable so ties keep input order.
fn coordinate_key(record: &RecordBuf) -> (usize, usize) {
    (
        record.reference_sequence_id().unwrap_or(usize::MAX),
        record.alignment_start().map_or(usize::MAX, usize::from),
    )
}

/// Remap a record stream into `sink`.
///
/// `cancel` is checked between batches: once set, no new batch is started,
/// batches in flight complete, and output stops before the first batch that
/// was skipped.
pub fn remap_stream<I, S>(
    remapper: &Remapper<'_>,
    records: I,
    sink: &mut S,
    options: &PipelineOptions,
    cancel: &AtomicBool,
) -> Result<Summary>
where
    I: Iterator<Item = io::Result<RecordBuf>> + Send,
    S: RecordSink,
{
    let mates = SharedMates::new(options.mate_table_capacity);
    let mut emitter = Emitter::new(sink, options);
    let mut summary = Summary::default();

    if options.threads <= 1 {
        for item in Batcher::new(records, options.batch_size) {
            if cancel.load(Ordering::Relaxed) {
                summary.cancelled = true;
                break;
            }
            let result = process_batch(remapper, item?, &mates);
            summary.merge(&result.summary);
            emitter.accept(result.staged, &mates)?;
        }
    } else {
        crossfire::detect_backoff_cfg();
        let worker_count = options.threads;
        let cap = worker_count.saturating_mul(4).max(8);
        let (tx_work, rx_work) = mpmc::bounded_blocking::<WorkItem>(cap);
        let (tx_res, rx_res) = mpmc::unbounded_blocking::<ResultItem>();
        let stop = AtomicBool::new(false);
        let batch_size = options.batch_size;

        thread::scope(|scope| -> Result<()> {
            for _ in 0..worker_count {
                let rx_work = rx_work.clone();
                let tx_res = tx_res.clone();
                let mates = &mates;
                scope.spawn(move || {
                    while let Ok(item) = rx_work.recv() {
                        if cancel.load(Ordering::Relaxed) {
                            continue;
                        }
                        let _ = tx_res.send(process_batch(remapper, item, mates));
                    }
                });
            }
            drop(tx_res);
            drop(rx_work);

            let stop = &stop;
            let reader = scope.spawn(move || -> Result<bool> {
                for item in Batcher::new(records, batch_size) {
                    if cancel.load(Ordering::Relaxed) {
                        return Ok(true);
                    }
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    tx_work.send(item?)?;
                }
                Ok(false)
            });

            let mut pending: BTreeMap<BatchId, ResultItem> = BTreeMap::new();
            let mut next_idx: BatchId = 0;
            let merged = (|| -> Result<()> {
                while let Ok(res) = rx_res.recv() {
                    pending.insert(res.idx, res);
                    while let Some(result) = pending.remove(&next_idx) {
                        summary.merge(&result.summary);
                        emitter.accept(result.staged, &mates)?;
                        next_idx += 1;
                    }
                }
                Ok(())
            })();
            if merged.is_err() {
                stop.store(true, Ordering::Relaxed);
            }

            let reader_cancelled = reader
                .join()
                .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
            merged?;

            if !pending.is_empty() {
                tracing::debug!(
                    next_idx,
                    dropped = pending.len(),
                    "dropping batches behind a skipped one"
                );
            }
            summary.cancelled = reader_cancelled || cancel.load(Ordering::Relaxed);
            Ok(())
        })?;
    }

    summary.unresolved_mate = emitter.finish(&mates)?;
    Ok(summary)
}
