//! Multi-resolution event summaries.
//!
//! The summary index maintains a decimal bucket tree over event start
//! times: the root spans one second when created, grows by a factor of ten
//! to cover new times, and nodes subdivide into ten children down to the
//! finest retained granularity of 100ms. Counters are incremented on every
//! node along the insertion path, so a node always holds the aggregate of
//! its subtree and fully-covered subtrees merge in O(1).
//!
//! Range queries use half-open `[start, end)` ranges and select every
//! finest bucket whose start time falls inside the range. Quantizing both
//! endpoints up to the finest bucket width makes the selection exactly
//! additive: splitting a range at any point partitions the selected
//! buckets.

use crate::error::{Error, Result};
use crate::store::{EventMeta, EventSink};
use crate::types::EventClass;

/// Bucket widths, in trace milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Granularity {
    /// 1000ms buckets.
    Second,
    /// 100ms buckets. The finest width actually retained.
    Decisecond,
    /// 10ms buckets. Synthesized on demand, stored at 100ms.
    Centisecond,
    /// 1ms buckets. Synthesized on demand, stored at 100ms.
    Millisecond,
}

/// Width of the finest retained bucket, in milliseconds.
pub const FINEST_MS: u64 = 100;

impl Granularity {
    /// Bucket width in milliseconds.
    pub fn millis(self) -> u64 {
        match self {
            Granularity::Second => 1000,
            Granularity::Decisecond => 100,
            Granularity::Centisecond => 10,
            Granularity::Millisecond => 1,
        }
    }

    /// Bucket width clamped to the finest retained width.
    pub fn retained_millis(self) -> u64 {
        self.millis().max(FINEST_MS)
    }
}

/// Aggregate counters over one time span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SummaryData {
    /// Start of the covered span, in trace milliseconds.
    pub time_start: u32,
    /// End of the covered span, exclusive.
    pub time_end: u32,
    /// Events of any class in the span.
    pub total_event_count: u64,
    /// Instance events in the span.
    pub instance_count: u64,
    /// Scope events in the span.
    pub scope_count: u64,
}

impl SummaryData {
    /// A zeroed summary spanning `[start, end)`.
    pub fn empty(start: u32, end: u32) -> Self {
        SummaryData {
            time_start: start,
            time_end: end,
            total_event_count: 0,
            instance_count: 0,
            scope_count: 0,
        }
    }

    /// Whether the span saw no events.
    pub fn is_empty(&self) -> bool {
        self.total_event_count == 0
    }
}

/// Running merge of bucket contributions.
#[derive(Debug, Default)]
struct Acc {
    total: u64,
    instances: u64,
    scopes: u64,
    min: Option<u64>,
    max: Option<u64>,
}

impl Acc {
    fn add(&mut self, node: &Node) {
        self.total += node.total;
        self.instances += node.instances;
        self.scopes += node.scopes;
        let end = node.start + node.width;
        self.min = Some(self.min.map_or(node.start, |m| m.min(node.start)));
        self.max = Some(self.max.map_or(end, |m| m.max(end)));
    }

    fn into_summary(self, fallback_start: u32, fallback_end: u32) -> SummaryData {
        SummaryData {
            time_start: self.min.map_or(fallback_start, |t| t as u32),
            time_end: self.max.map_or(fallback_end, |t| t.min(u32::MAX as u64) as u32),
            total_event_count: self.total,
            instance_count: self.instances,
            scope_count: self.scopes,
        }
    }
}

/// One node of the decimal bucket tree.
#[derive(Debug)]
struct Node {
    start: u64,
    width: u64,
    total: u64,
    instances: u64,
    scopes: u64,
    // Ten slots, allocated lazily on first descent.
    children: Vec<Option<Box<Node>>>,
}

impl Node {
    fn new(start: u64, width: u64) -> Self {
        Node {
            start,
            width,
            total: 0,
            instances: 0,
            scopes: 0,
            children: Vec::new(),
        }
    }

    fn contains(&self, time: u64) -> bool {
        time >= self.start && time < self.start + self.width
    }

    fn bump(&mut self, class: EventClass) {
        self.total += 1;
        match class {
            EventClass::Instance => self.instances += 1,
            EventClass::Scope => self.scopes += 1,
        }
    }
}

/// Streaming multi-resolution summary over event start times.
#[derive(Debug, Default)]
pub struct SummaryIndex {
    root: Option<Box<Node>>,
    inserting: bool,
}

impl SummaryIndex {
    /// An empty summary index.
    pub fn new() -> Self {
        SummaryIndex::default()
    }

    /// Total events counted so far.
    pub fn total_event_count(&self) -> u64 {
        self.root.as_ref().map_or(0, |r| r.total)
    }

    /// Aggregate over `[start, end)`. A range covering no data returns a
    /// zeroed summary, not an error.
    pub fn query_summary(&self, start: u32, end: u32) -> SummaryData {
        let (qa, qb) = quantize(start as u64, end as u64);
        let mut acc = Acc::default();
        if let Some(root) = &self.root {
            collect(root, qa, qb, &mut acc);
        }
        acc.into_summary(start, end)
    }

    /// Emit granularity-aligned buckets covering `[start, end)`, merging
    /// finer stored buckets. Buckets that saw no events are skipped, so a
    /// range outside all data yields an empty sequence.
    pub fn for_each(
        &self,
        start: u32,
        end: u32,
        granularity: Granularity,
        mut callback: impl FnMut(&SummaryData),
    ) {
        let width = granularity.retained_millis();
        let (qa, qb) = quantize(start as u64, end as u64);
        let root = match &self.root {
            Some(root) => root,
            None => return,
        };
        let mut bucket_start = qa / width * width;
        while bucket_start < qb {
            let lo = bucket_start.max(qa);
            let hi = (bucket_start + width).min(qb);
            let mut acc = Acc::default();
            collect(root, lo, hi, &mut acc);
            if acc.total > 0 {
                callback(&acc.into_summary(lo as u32, hi as u32));
            }
            bucket_start += width;
        }
    }

    fn record_time(&mut self, time: u64, class: EventClass) {
        let mut root = match self.root.take() {
            Some(root) => root,
            None => Box::new(Node::new(time / 1000 * 1000, 1000)),
        };
        // Grow the root tenfold until it spans the new time.
        while !root.contains(time) {
            let width = root.width * 10;
            let start = root.start / width * width;
            let mut wider = Box::new(Node::new(start, width));
            wider.total = root.total;
            wider.instances = root.instances;
            wider.scopes = root.scopes;
            wider.children = vec![None, None, None, None, None, None, None, None, None, None];
            let slot = ((root.start - start) / root.width) as usize;
            wider.children[slot] = Some(root);
            root = wider;
        }

        root.bump(class);
        let mut node = root.as_mut();
        while node.width > FINEST_MS {
            if node.children.is_empty() {
                node.children = vec![None, None, None, None, None, None, None, None, None, None];
            }
            let child_width = node.width / 10;
            let slot = ((time - node.start) / child_width) as usize;
            let child_start = node.start + slot as u64 * child_width;
            node = node.children[slot]
                .get_or_insert_with(|| Box::new(Node::new(child_start, child_width)));
            node.bump(class);
        }
        self.root = Some(root);
    }
}

/// Quantize a half-open query range up to finest-bucket boundaries. A
/// finest bucket is selected iff its start time lies in the original
/// range, which this rounding encodes exactly.
fn quantize(start: u64, end: u64) -> (u64, u64) {
    let up = |t: u64| (t + FINEST_MS - 1) / FINEST_MS * FINEST_MS;
    (up(start), up(end.max(start)))
}

fn collect(node: &Node, qa: u64, qb: u64, acc: &mut Acc) {
    let node_end = node.start + node.width;
    if node.start >= qb || node_end <= qa || node.total == 0 {
        return;
    }
    if node.start >= qa && node_end <= qb {
        acc.add(node);
        return;
    }
    // Partial overlap. Finest buckets are boundary-aligned with the
    // quantized range, so only interior nodes reach this point.
    for child in node.children.iter().flatten() {
        collect(child, qa, qb, acc);
    }
}

impl EventSink for SummaryIndex {
    fn begin_inserting(&mut self) -> Result<()> {
        if self.inserting {
            return Err(Error::ProtocolViolation(
                "begin_inserting on summary index while already inserting".into(),
            ));
        }
        self.inserting = true;
        Ok(())
    }

    fn insert_event(&mut self, event: &EventMeta<'_>) -> Result<()> {
        if !self.inserting {
            return Err(Error::ProtocolViolation(
                "insert_event on summary index outside a bracket".into(),
            ));
        }
        self.record_time(event.time as u64, event.class);
        Ok(())
    }

    fn end_inserting(&mut self) -> Result<()> {
        if !self.inserting {
            return Err(Error::ProtocolViolation(
                "end_inserting on summary index without begin_inserting".into(),
            ));
        }
        self.inserting = false;
        Ok(())
    }
}
