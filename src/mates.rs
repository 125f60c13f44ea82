//! Mate coordination.
//!
//! Paired records carry their mate's placement, which changes when the mate
//! is remapped. Mates in the same batch are patched right away. A record
//! whose mate sits in another batch publishes its own view in a shared
//! [`MateTable`] and waits in the [`MateWindow`] of the merge stage until
//! the partner's view shows up or the window runs out.

use crate::annotate::push_warning;
use crate::error::Warning;
use crate::transform::reference_span;
use crate::types::{HashMap, HashMapExt, RefId};
use noodles::core::Position;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Flags;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MateKey {
    pub name: Vec<u8>,
    pub segment: Segment,
}

impl MateKey {
    /// Primary records of a pair with a name and exactly one segment flag.
    pub fn for_record(record: &RecordBuf) -> Option<MateKey> {
        let flags = record.flags();
        if !flags.is_segmented() || flags.is_secondary() || flags.is_supplementary() {
            return None;
        }
        let segment = match (flags.is_first_segment(), flags.is_last_segment()) {
            (true, false) => Segment::First,
            (false, true) => Segment::Last,
            _ => return None,
        };
        let name = record.name()?;
        Some(MateKey {
            name: name.to_vec(),
            segment,
        })
    }

    pub fn mate(&self) -> MateKey {
        let segment = match self.segment {
            Segment::First => Segment::Last,
            Segment::Last => Segment::First,
        };
        MateKey {
            name: self.name.clone(),
            segment,
        }
    }
}

/// What a remapped record tells its mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MateView {
    pub reference_id: Option<RefId>,
    /// 0-based start; `None` for records without placement.
    pub start: Option<u64>,
    /// 0-based exclusive end of the reference span.
    pub end: u64,
    pub reverse: bool,
    pub unmapped: bool,
}

impl MateView {
    pub fn of(record: &RecordBuf) -> MateView {
        let flags = record.flags();
        let start = record
            .alignment_start()
            .map(|position| usize::from(position) as u64 - 1);
        let unmapped = flags.is_unmapped();
        let span = if unmapped {
            0
        } else {
            reference_span(record.cigar().as_ref())
        };
        MateView {
            reference_id: record.reference_sequence_id(),
            start,
            end: start.map_or(0, |s| s + span),
            reverse: flags.is_reverse_complemented(),
            unmapped,
        }
    }

    fn placed(&self) -> bool {
        self.reference_id.is_some() && self.start.is_some()
    }
}

fn to_position(start: Option<u64>) -> Option<Position> {
    start.and_then(|s| Position::new(s as usize + 1))
}

/// Signed observed template length in the SAM sense.
///
/// Zero when either mate is unmapped or the mates sit on different contigs.
/// Positive for the leftmost mate; on a tie the first segment gets the plus
/// sign.
pub fn template_length(own: &MateView, mate: &MateView, own_is_first: bool) -> i32 {
    if own.unmapped || mate.unmapped || own.reference_id != mate.reference_id {
        return 0;
    }
    let (Some(own_start), Some(mate_start)) = (own.start, mate.start) else {
        return 0;
    };
    let left = own_start.min(mate_start);
    let right = own.end.max(mate.end);
    let len = i32::try_from(right - left).unwrap_or(i32::MAX);
    if own_start < mate_start || (own_start == mate_start && own_is_first) {
        len
    } else {
        -len
    }
}

/// Patch a record's mate fields from its mate's view.
pub fn apply_mate(record: &mut RecordBuf, mate: &MateView) {
    let mut own = MateView::of(record);

    if own.unmapped && !mate.unmapped && mate.placed() {
        *record.reference_sequence_id_mut() = mate.reference_id;
        *record.alignment_start_mut() = to_position(mate.start);
        own.reference_id = mate.reference_id;
        own.start = mate.start;
        own.end = mate.start.unwrap_or(0);
    }

    let (mate_reference_id, mate_start) = if mate.unmapped && !own.unmapped {
        (own.reference_id, own.start)
    } else {
        (mate.reference_id, mate.start)
    };

    let mut flags = record.flags();
    flags.set(Flags::MATE_UNMAPPED, mate.unmapped);
    flags.set(Flags::MATE_REVERSE_COMPLEMENTED, mate.reverse);
    let own_is_first = flags.is_first_segment();
    *record.flags_mut() = flags;

    *record.mate_reference_sequence_id_mut() = mate_reference_id;
    *record.mate_alignment_start_mut() = to_position(mate_start);
    *record.template_length_mut() = template_length(&own, mate, own_is_first);
}

/// Mate fields could not be determined.
pub fn mark_unresolved(record: &mut RecordBuf) {
    *record.mate_alignment_start_mut() = None;
    *record.template_length_mut() = 0;
    push_warning(record.data_mut(), Warning::UnresolvedMate);
}

/// Published views of records still waiting for their mate.
#[derive(Debug)]
pub struct MateTable {
    views: HashMap<MateKey, MateView>,
    capacity: usize,
}

impl MateTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            views: HashMap::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Returns false when the table is full.
    pub fn publish(&mut self, key: MateKey, view: MateView) -> bool {
        if self.views.len() >= self.capacity && !self.views.contains_key(&key) {
            return false;
        }
        self.views.insert(key, view);
        true
    }

    pub fn take(&mut self, key: &MateKey) -> Option<MateView> {
        self.views.remove(key)
    }
}

/// [`MateTable`] shared between workers and the merge stage.
#[derive(Debug)]
pub struct SharedMates {
    table: Mutex<MateTable>,
}

impl SharedMates {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Mutex::new(MateTable::new(capacity)),
        }
    }

    /// Publish `own` and take the partner's view in one step, so of two
    /// mates processed concurrently at least one sees the other.
    pub fn exchange(&self, own: MateKey, view: MateView) -> Option<MateView> {
        let partner = own.mate();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if !table.publish(own, view) {
            tracing::debug!("mate table full; record will wait without publishing");
        }
        table.take(&partner)
    }

    pub fn take(&self, key: &MateKey) -> Option<MateView> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take(key)
    }

    pub fn withdraw(&self, own: &MateKey) {
        self.take(own);
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A remapped record on its way to the sink.
#[derive(Debug, Clone)]
pub struct Staged {
    pub record: RecordBuf,
    /// Key of the mate this record still waits for.
    pub waiting_for: Option<MateKey>,
}

impl Staged {
    pub fn ready(record: RecordBuf) -> Self {
        Self {
            record,
            waiting_for: None,
        }
    }
}

/// Pair the records of one batch with each other, then with the shared
/// table. Records left unpaired come back waiting for their mate.
pub fn pair_batch(mut records: Vec<RecordBuf>, mates: &SharedMates) -> Vec<Staged> {
    let keys: Vec<Option<MateKey>> = records.iter().map(MateKey::for_record).collect();
    let views: Vec<MateView> = records.iter().map(MateView::of).collect();

    let mut by_key: HashMap<&MateKey, usize> = HashMap::with_capacity(records.len());
    for (idx, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            by_key.entry(key).or_insert(idx);
        }
    }

    let mut partner: Vec<Option<usize>> = vec![None; records.len()];
    for (idx, key) in keys.iter().enumerate() {
        let Some(key) = key else { continue };
        if partner[idx].is_some() || by_key.get(key) != Some(&idx) {
            continue;
        }
        if let Some(&other) = by_key.get(&key.mate())
            && partner[other].is_none()
        {
            partner[idx] = Some(other);
            partner[other] = Some(idx);
        }
    }

    let mut waiting: Vec<Option<MateKey>> = vec![None; records.len()];
    for (idx, record) in records.iter_mut().enumerate() {
        if let Some(other) = partner[idx] {
            apply_mate(record, &views[other]);
            continue;
        }
        let Some(key) = &keys[idx] else { continue };
        match mates.exchange(key.clone(), views[idx]) {
            Some(view) => apply_mate(record, &view),
            None => waiting[idx] = Some(key.mate()),
        }
    }

    records
        .into_iter()
        .zip(waiting)
        .map(|(record, waiting_for)| Staged {
            record,
            waiting_for,
        })
        .collect()
}

/// Ordered holding area of the merge stage.
///
/// Records leave strictly in arrival order. A record waiting for its mate
/// holds back everything behind it until the mate's view arrives or more
/// than `capacity` records are queued, at which point it is released with
/// its mate fields cleared.
#[derive(Debug)]
pub struct MateWindow {
    queue: VecDeque<Staged>,
    capacity: usize,
    waiting: usize,
    unresolved: u64,
}

impl MateWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            waiting: 0,
            unresolved: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Records released without their mate so far.
    pub fn unresolved(&self) -> u64 {
        self.unresolved
    }

    pub fn push(&mut self, staged: Vec<Staged>, mates: &SharedMates) -> Vec<RecordBuf> {
        for entry in staged {
            if entry.waiting_for.is_some() {
                self.waiting += 1;
            }
            self.queue.push_back(entry);
        }
        self.retry(mates);

        let mut out = Vec::new();
        self.release_ready(&mut out);
        while self.queue.len() > self.capacity {
            if let Some(entry) = self.queue.pop_front() {
                out.push(self.give_up(entry, mates));
            }
            self.release_ready(&mut out);
        }
        out
    }

    /// Release everything, giving up on mates that never showed.
    pub fn finish(&mut self, mates: &SharedMates) -> Vec<RecordBuf> {
        self.retry(mates);
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(entry) = self.queue.pop_front() {
            out.push(self.give_up(entry, mates));
        }
        out
    }

    fn retry(&mut self, mates: &SharedMates) {
        if self.waiting == 0 {
            return;
        }
        for entry in self.queue.iter_mut() {
            let Some(key) = &entry.waiting_for else { continue };
            if let Some(view) = mates.take(key) {
                apply_mate(&mut entry.record, &view);
                entry.waiting_for = None;
                self.waiting -= 1;
            }
        }
    }

    fn release_ready(&mut self, out: &mut Vec<RecordBuf>) {
        while self
            .queue
            .front()
            .is_some_and(|entry| entry.waiting_for.is_none())
        {
            if let Some(entry) = self.queue.pop_front() {
                out.push(entry.record);
            }
        }
    }

    fn give_up(&mut self, entry: Staged, mates: &SharedMates) -> RecordBuf {
        let mut record = entry.record;
        if let Some(key) = entry.waiting_for {
            self.waiting -= 1;
            self.unresolved += 1;
            mates.withdraw(&key.mate());
            tracing::debug!(
                read = %String::from_utf8_lossy(&key.name),
                "mate not found within the window"
            );
            mark_unresolved(&mut record);
        }
        record
    }
}
