//! The trace event database facade.
//!
//! [`EventDatabase`] owns the type and zone registries, the canonical
//! store, the summary index, all derived indexes, the filter chain and
//! the stream decoder, and wires them together: bytes fed in are framed
//! into records, control records mutate the registries, and user events
//! fan out to the store and every active sink in one insertion bracket
//! per `feed` call.
//!
//! Control flow mirrors the wire protocol: a `trace.zone#set` record
//! picks the zone subsequent events are attributed to, `trace.scope#leave`
//! closes the innermost open scope, and `trace.event#define` registers
//! the schema later records of that id are decoded with.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;

use crate::args::{ArgValue, ArgumentData};
use crate::error::{Error, Result};
use crate::event_type::{builtin, parse_signature_args, EventType, EventTypeRegistry};
use crate::filter::{Filter, FilterChain};
use crate::index::{EventTypeIndex, TimeRangeIndex, ZoneIndex};
use crate::stats::{SortMode, StatisticsBuilder, TypeStatistics};
use crate::store::{EventMeta, EventRecord, EventSink, EventStore};
use crate::stream::{DecodedRecord, StreamDecoder, TraceHeader};
use crate::summary::{Granularity, SummaryData, SummaryIndex};
use crate::types::{type_flags, ArgDataId, EventClass, EventId, TypeId, ZoneId, NIL_ARGS};
use crate::zone::{Zone, ZoneKind, ZoneRegistry};

/// What one `feed` call accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    /// Wire records decoded by this call, control records included.
    pub records: u64,
    /// Events appended to the store by this call.
    pub events: u64,
    /// Bytes buffered waiting for the rest of a record.
    pub pending_bytes: usize,
}

/// Final accounting for a fully ingested stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    /// Total wire records decoded.
    pub records: u64,
    /// Total events stored.
    pub events: u64,
    /// Total bytes consumed.
    pub bytes: u64,
}

/// In-memory trace event database.
pub struct EventDatabase {
    types: EventTypeRegistry,
    zones: ZoneRegistry,
    store: EventStore,
    summary: SummaryIndex,
    event_indexes: FxHashMap<String, EventTypeIndex>,
    zone_indexes: FxHashMap<ZoneId, ZoneIndex>,
    time_range_indexes: FxHashMap<ZoneId, TimeRangeIndex>,
    filters: FilterChain,
    decoder: StreamDecoder,
    wire_zones: FxHashMap<u32, ZoneId>,
    current_zone: Option<ZoneId>,
    default_zone: Option<ZoneId>,
    inserting: bool,
    records: u64,
    events: u64,
    bytes_fed: u64,
}

impl EventDatabase {
    /// An empty database expecting a stream header (or direct driving).
    pub fn new() -> Self {
        EventDatabase {
            types: EventTypeRegistry::new(),
            zones: ZoneRegistry::new(),
            store: EventStore::new(),
            summary: SummaryIndex::new(),
            event_indexes: FxHashMap::default(),
            zone_indexes: FxHashMap::default(),
            time_range_indexes: FxHashMap::default(),
            filters: FilterChain::new(),
            decoder: StreamDecoder::new(),
            wire_zones: FxHashMap::default(),
            current_zone: None,
            default_zone: None,
            inserting: false,
            records: 0,
            events: 0,
            bytes_fed: 0,
        }
    }

    // ---- ingestion: wire stream ----

    /// Feed a chunk of the binary trace stream. Chunks may split records
    /// anywhere; a trailing partial record is buffered for the next call.
    ///
    /// On a fatal decode error everything ingested so far stays
    /// queryable; further `feed` calls are rejected.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<IngestProgress> {
        if self.inserting {
            return Err(Error::ProtocolViolation(
                "feed during an open insertion bracket".into(),
            ));
        }
        self.decoder.feed(chunk)?;
        self.bytes_fed += chunk.len() as u64;

        let records_before = self.records;
        let events_before = self.events;
        self.begin_inserting()?;
        let pumped = self.pump();
        let ended = self.end_inserting();
        pumped?;
        ended?;
        Ok(IngestProgress {
            records: self.records - records_before,
            events: self.events - events_before,
            pending_bytes: self.decoder.pending_bytes(),
        })
    }

    /// Declare the stream complete. Closes any scopes still open at the
    /// last seen event time and reports totals. Bytes left over from a
    /// record that never completed surface as `TruncatedBuffer`.
    pub fn finish(&mut self) -> Result<IngestReport> {
        if self.inserting {
            return Err(Error::ProtocolViolation(
                "finish during an open insertion bracket".into(),
            ));
        }
        if let Some(last) = self.store.last_event_time() {
            self.store.close_open_scopes(last);
        }
        let pending = self.decoder.pending_bytes();
        if pending > 0 {
            return Err(Error::TruncatedBuffer {
                needed: pending + 1,
                available: pending,
            });
        }
        let report = IngestReport {
            records: self.records,
            events: self.events,
            bytes: self.bytes_fed,
        };
        tracing::info!(
            records = report.records,
            events = report.events,
            bytes = report.bytes,
            "trace stream complete"
        );
        Ok(report)
    }

    /// The parsed stream header, once fed.
    pub fn header(&self) -> Option<&TraceHeader> {
        self.decoder.header()
    }

    fn pump(&mut self) -> Result<()> {
        loop {
            let record = match self.decoder.next_record(&self.types)? {
                Some(record) => record,
                None => return Ok(()),
            };
            self.records += 1;
            if let Err(err) = self.handle_record(record) {
                if err.is_fatal_for_stream() {
                    self.decoder.poison();
                }
                return Err(err);
            }
        }
    }

    fn handle_record(&mut self, record: DecodedRecord) -> Result<()> {
        match record.type_id {
            builtin::DEFINE_EVENT => self.handle_define(&record.args),
            builtin::CREATE_ZONE => self.handle_create_zone(&record.args),
            builtin::SET_ZONE => self.handle_set_zone(&record.args),
            builtin::LEAVE_SCOPE => self.store.leave_scope(record.time).map(|_| ()),
            builtin::APPEND_SCOPE_DATA => self.handle_append_scope_data(record.args),
            _ => self
                .insert_decoded(record.type_id, record.time, record.args)
                .map(|_| ()),
        }
    }

    fn handle_define(&mut self, args: &ArgumentData) -> Result<()> {
        let wire_id = require_u32(args, "wireId", "define")? as TypeId;
        let class = EventClass::from_wire(require_u32(args, "eventClass", "define")? as u8)
            .ok_or_else(|| Error::MalformedRecord("define record has a bad event class".into()))?;
        let flags = require_u32(args, "flags", "define")?;
        let name = require_str(args, "name", "define")?;
        let signature = require_str(args, "args", "define")?;
        let args = parse_signature_args(signature)
            .map_err(|err| Error::MalformedRecord(format!("define record: {err}")))?;
        let ty = EventType {
            name: name.to_string(),
            class,
            flags,
            args,
        };
        tracing::debug!(id = wire_id, name, "defined event type");
        self.types.define_at(wire_id, ty).map(|_| ())
    }

    fn handle_create_zone(&mut self, args: &ArgumentData) -> Result<()> {
        let wire_id = require_u32(args, "zoneId", "zone create")?;
        let name = require_str(args, "name", "zone create")?;
        let kind = ZoneKind::from_wire(require_str(args, "type", "zone create")?);
        let location = require_str(args, "location", "zone create")?;
        let zone = self.zones.create_zone(name, kind, location);
        self.wire_zones.insert(wire_id, zone);
        self.ensure_zone_index(zone)
    }

    fn handle_set_zone(&mut self, args: &ArgumentData) -> Result<()> {
        let wire_id = require_u32(args, "zoneId", "zone set")?;
        let zone = self.wire_zones.get(&wire_id).copied().ok_or_else(|| {
            Error::MalformedRecord(format!("zone set references undefined zone {wire_id}"))
        })?;
        self.current_zone = Some(zone);
        Ok(())
    }

    fn handle_append_scope_data(&mut self, args: ArgumentData) -> Result<()> {
        let key = require_str(&args, "key", "scope data")?.to_string();
        let value = require_str(&args, "value", "scope data")?.to_string();
        let mut data = ArgumentData::new();
        data.set(key, ArgValue::Str(value));
        self.store.append_scope_arguments(data)
    }

    // ---- ingestion: direct driving ----

    /// Open an insertion bracket on the store and every active sink.
    pub fn begin_inserting(&mut self) -> Result<()> {
        if self.inserting {
            return Err(Error::ProtocolViolation(
                "begin_inserting while already inserting".into(),
            ));
        }
        self.store.begin_inserting()?;
        self.summary.begin_inserting()?;
        for index in self.event_indexes.values_mut() {
            index.begin_inserting()?;
        }
        for index in self.zone_indexes.values_mut() {
            index.begin_inserting()?;
        }
        for index in self.time_range_indexes.values_mut() {
            index.begin_inserting()?;
        }
        self.inserting = true;
        Ok(())
    }

    /// Close the current insertion bracket. Open scopes stay open; they
    /// may continue in the next bracket.
    pub fn end_inserting(&mut self) -> Result<()> {
        if !self.inserting {
            return Err(Error::ProtocolViolation(
                "end_inserting without begin_inserting".into(),
            ));
        }
        self.store.end_inserting()?;
        self.summary.end_inserting()?;
        for index in self.event_indexes.values_mut() {
            index.end_inserting()?;
        }
        for index in self.zone_indexes.values_mut() {
            index.end_inserting()?;
        }
        for index in self.time_range_indexes.values_mut() {
            index.end_inserting()?;
        }
        self.inserting = false;
        Ok(())
    }

    /// Append an instance event by type name, defining the type on first
    /// use. Valid only inside an insertion bracket.
    pub fn append_instance(&mut self, name: &str, time: u32) -> Result<EventId> {
        let type_id = self.ensure_type(name, EventClass::Instance)?;
        self.insert_decoded(type_id, time, ArgumentData::new())
    }

    /// Open a scope event by type name, defining the type on first use.
    pub fn enter_scope(&mut self, name: &str, time: u32) -> Result<EventId> {
        let type_id = self.ensure_type(name, EventClass::Scope)?;
        self.insert_decoded(type_id, time, ArgumentData::new())
    }

    /// Close the innermost open scope at `time`.
    pub fn leave_scope(&mut self, time: u32) -> Result<EventId> {
        self.store.leave_scope(time)
    }

    fn ensure_type(&mut self, name: &str, class: EventClass) -> Result<TypeId> {
        if let Some((id, ty)) = self.types.get_by_name(name) {
            if ty.class != class {
                return Err(Error::MalformedRecord(format!(
                    "event type {name:?} already registered with a different class"
                )));
            }
            return Ok(id);
        }
        let ty = match class {
            EventClass::Instance => EventType::instance(name),
            EventClass::Scope => EventType::scope(name),
        };
        self.types.define(ty)
    }

    fn insert_decoded(
        &mut self,
        type_id: TypeId,
        time: u32,
        args: ArgumentData,
    ) -> Result<EventId> {
        let zone = match self.current_zone {
            Some(zone) => zone,
            None => {
                let zone = self.ensure_default_zone()?;
                self.current_zone = Some(zone);
                zone
            }
        };
        let argument_data_id = if args.is_empty() {
            NIL_ARGS
        } else {
            self.store.add_argument_data(args)?
        };
        let ty = self
            .types
            .get(type_id)
            .ok_or(Error::UnknownEventType(type_id))?;
        let zone_name = self
            .zones
            .get(zone)
            .map(|z| z.name.as_str())
            .unwrap_or_default();
        let meta = EventMeta {
            id: self.store.next_event_id(),
            type_id,
            type_name: &ty.name,
            class: ty.class,
            type_flags: ty.flags,
            zone,
            zone_name,
            time,
            argument_data_id,
        };
        self.store.insert_event(&meta)?;
        if self.filters.accepts(&meta) {
            self.summary.insert_event(&meta)?;
            for index in self.event_indexes.values_mut() {
                index.insert_event(&meta)?;
            }
            for index in self.zone_indexes.values_mut() {
                index.insert_event(&meta)?;
            }
            for index in self.time_range_indexes.values_mut() {
                index.insert_event(&meta)?;
            }
        }
        self.events += 1;
        Ok(meta.id)
    }

    fn ensure_default_zone(&mut self) -> Result<ZoneId> {
        if let Some(zone) = self.default_zone {
            return Ok(zone);
        }
        let zone = self.zones.ensure_default();
        self.default_zone = Some(zone);
        self.ensure_zone_index(zone)?;
        Ok(zone)
    }

    // Zone indexes track every zone from the moment it exists.
    fn ensure_zone_index(&mut self, zone: ZoneId) -> Result<()> {
        if let Entry::Vacant(slot) = self.zone_indexes.entry(zone) {
            let mut index = ZoneIndex::new(zone);
            backfill(&self.store, &self.types, &self.zones, &self.filters, &mut index)?;
            if self.inserting {
                index.begin_inserting()?;
            }
            slot.insert(index);
        }
        Ok(())
    }

    // ---- filters ----

    /// Append a filter to the chain. Filters apply to events ingested
    /// after this call and to indexes created (and backfilled) after it;
    /// already-indexed events are not re-evaluated.
    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Drop all filters.
    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// The current filter chain.
    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    // ---- query surface ----

    /// An existing event type index, if one was created.
    pub fn event_index(&self, name: &str) -> Option<&EventTypeIndex> {
        self.event_indexes.get(name)
    }

    /// Get or create the index for an event type name, backfilling it
    /// from the store.
    pub fn create_event_index(&mut self, name: &str) -> Result<&EventTypeIndex> {
        match self.event_indexes.entry(name.to_string()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let mut index = EventTypeIndex::new(name);
                backfill(&self.store, &self.types, &self.zones, &self.filters, &mut index)?;
                if self.inserting {
                    index.begin_inserting()?;
                }
                Ok(slot.insert(index))
            }
        }
    }

    /// The index over a zone's events. Present for every created zone.
    pub fn zone_index(&self, zone: ZoneId) -> Option<&ZoneIndex> {
        self.zone_indexes.get(&zone)
    }

    /// Get or create the scope range index for a zone, backfilling it
    /// from the store.
    pub fn time_range_index(&mut self, zone: ZoneId) -> Result<&TimeRangeIndex> {
        match self.time_range_indexes.entry(zone) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let mut index = TimeRangeIndex::new(zone);
                backfill(&self.store, &self.types, &self.zones, &self.filters, &mut index)?;
                if self.inserting {
                    index.begin_inserting()?;
                }
                Ok(slot.insert(index))
            }
        }
    }

    /// The multi-resolution summary over all accepted events.
    pub fn summary_index(&self) -> &SummaryIndex {
        &self.summary
    }

    /// Aggregate counters over `[start, end)`.
    pub fn query_summary(&self, start: u32, end: u32) -> SummaryData {
        self.summary.query_summary(start, end)
    }

    /// Walk granularity-aligned summary buckets over `[start, end)`.
    pub fn for_each_summary(
        &self,
        start: u32,
        end: u32,
        granularity: Granularity,
        callback: impl FnMut(&SummaryData),
    ) {
        self.summary.for_each(start, end, granularity, callback)
    }

    /// Per-type statistics over `[start, end)`, ordered per `sort`.
    /// Builtin and internal event types are skipped.
    pub fn query_statistics(&self, start: u32, end: u32, sort: SortMode) -> Vec<TypeStatistics> {
        let mut builder = StatisticsBuilder::new();
        for id in 1..=self.store.len() as EventId {
            let rec = match self.store.record(id) {
                Some(rec) => rec,
                None => break,
            };
            if rec.start_time < start || rec.start_time >= end {
                continue;
            }
            let ty = match self.types.get(rec.type_id) {
                Some(ty) => ty,
                None => continue,
            };
            if ty.flags & (type_flags::INTERNAL | type_flags::BUILTIN) != 0 {
                continue;
            }
            if !self.filters.accepts(&self.meta_of(id, &rec, ty)) {
                continue;
            }
            let own_time = match ty.class {
                EventClass::Scope => (rec.end_time.saturating_sub(rec.start_time))
                    .saturating_sub(rec.child_time) as u64,
                EventClass::Instance => 0,
            };
            builder.record(&ty.name, own_time);
        }
        builder.finish(sort)
    }

    /// Look up an event's argument payload by payload id.
    pub fn argument_data(&self, id: ArgDataId) -> Option<&ArgumentData> {
        self.store.argument_data(id)
    }

    /// One event's record, by id.
    pub fn event(&self, id: EventId) -> Option<EventRecord> {
        self.store.record(id)
    }

    /// Events stored so far.
    pub fn event_count(&self) -> usize {
        self.store.len()
    }

    /// Time of the earliest event, if any.
    pub fn first_event_time(&self) -> Option<u32> {
        self.store.first_event_time()
    }

    /// Time of the latest event, if any.
    pub fn last_event_time(&self) -> Option<u32> {
        self.store.last_event_time()
    }

    /// All zones, in creation order.
    pub fn zones(&self) -> impl Iterator<Item = (ZoneId, &Zone)> {
        self.zones.iter()
    }

    /// One zone, by id.
    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id)
    }

    /// The canonical store, for forest navigation.
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The event type registry.
    pub fn event_types(&self) -> &EventTypeRegistry {
        &self.types
    }

    fn meta_of<'a>(&'a self, id: EventId, rec: &EventRecord, ty: &'a EventType) -> EventMeta<'a> {
        let zone = self.store.zone_of(id).unwrap_or_default();
        EventMeta {
            id,
            type_id: rec.type_id,
            type_name: &ty.name,
            class: ty.class,
            type_flags: ty.flags,
            zone,
            zone_name: self
                .zones
                .get(zone)
                .map(|z| z.name.as_str())
                .unwrap_or_default(),
            time: rec.start_time,
            argument_data_id: rec.argument_data_id,
        }
    }
}

impl Default for EventDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Replay the store through a freshly created sink so late-created
/// indexes see the events that arrived before them.
fn backfill<S: EventSink>(
    store: &EventStore,
    types: &EventTypeRegistry,
    zones: &ZoneRegistry,
    filters: &FilterChain,
    sink: &mut S,
) -> Result<()> {
    sink.begin_inserting()?;
    for id in 1..=store.len() as EventId {
        let rec = match store.record(id) {
            Some(rec) => rec,
            None => break,
        };
        let ty = match types.get(rec.type_id) {
            Some(ty) => ty,
            None => continue,
        };
        let zone = store.zone_of(id).unwrap_or_default();
        let meta = EventMeta {
            id,
            type_id: rec.type_id,
            type_name: &ty.name,
            class: ty.class,
            type_flags: ty.flags,
            zone,
            zone_name: zones.get(zone).map(|z| z.name.as_str()).unwrap_or_default(),
            time: rec.start_time,
            argument_data_id: rec.argument_data_id,
        };
        if filters.accepts(&meta) {
            sink.insert_event(&meta)?;
        }
    }
    sink.end_inserting()
}

fn require_u32(args: &ArgumentData, key: &str, what: &str) -> Result<u32> {
    args.get(key).and_then(|v| v.as_u32()).ok_or_else(|| {
        Error::MalformedRecord(format!("{what} record is missing {key:?}"))
    })
}

fn require_str<'a>(args: &'a ArgumentData, key: &str, what: &str) -> Result<&'a str> {
    args.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        Error::MalformedRecord(format!("{what} record is missing {key:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterTarget;

    fn driven_db() -> EventDatabase {
        let mut db = EventDatabase::new();
        db.begin_inserting().unwrap();
        db.enter_scope("app#main", 5).unwrap();
        db.append_instance("app#tick", 10).unwrap();
        db.append_instance("app#tick", 20).unwrap();
        db.append_instance("app#tick", 30).unwrap();
        db.leave_scope(40).unwrap();
        db.end_inserting().unwrap();
        db
    }

    #[test]
    fn test_direct_driving_builds_a_queryable_trace() {
        let mut db = driven_db();
        assert_eq!(db.event_count(), 4);
        assert_eq!(db.query_summary(0, 50).total_event_count, 4);
        assert_eq!(db.create_event_index("app#tick").unwrap().count(), 3);
        let zone = db.zones().next().map(|(id, _)| id).unwrap();
        assert_eq!(db.zone_index(zone).unwrap().count(), 4);
        assert_eq!(db.time_range_index(zone).unwrap().ids(), &[1]);
    }

    #[test]
    fn test_insert_without_bracket_is_rejected() {
        let mut db = EventDatabase::new();
        let err = db.append_instance("app#tick", 10).unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(db.event_count(), 0);
    }

    #[test]
    fn test_late_index_is_backfilled() {
        let mut db = driven_db();
        db.begin_inserting().unwrap();
        db.append_instance("app#tick", 50).unwrap();
        db.end_inserting().unwrap();
        // Created after all five events; still sees all four ticks.
        assert_eq!(db.create_event_index("app#tick").unwrap().count(), 4);
    }

    #[test]
    fn test_filters_apply_to_sinks_not_store() {
        let mut db = EventDatabase::new();
        db.add_filter(Filter::exclude(FilterTarget::Provider("gc".into())));
        db.begin_inserting().unwrap();
        db.append_instance("app#tick", 10).unwrap();
        db.append_instance("gc#collect", 20).unwrap();
        db.end_inserting().unwrap();
        assert_eq!(db.event_count(), 2, "the store keeps everything");
        assert_eq!(db.query_summary(0, 100).total_event_count, 1);
        assert_eq!(db.create_event_index("gc#collect").unwrap().count(), 0);
    }

    #[test]
    fn test_statistics_own_time() {
        let mut db = EventDatabase::new();
        db.begin_inserting().unwrap();
        db.enter_scope("app#outer", 0).unwrap();
        db.enter_scope("app#inner", 10).unwrap();
        db.leave_scope(30).unwrap();
        db.leave_scope(50).unwrap();
        db.append_instance("app#mark", 60).unwrap();
        db.end_inserting().unwrap();

        let table = db.query_statistics(0, 100, SortMode::TotalTime);
        assert_eq!(table[0].name, "app#outer");
        assert_eq!(table[0].total_time, 30, "own time excludes the inner scope");
        assert_eq!(table[1].name, "app#inner");
        assert_eq!(table[1].total_time, 20);
        let mark = table.iter().find(|e| e.name == "app#mark").unwrap();
        assert_eq!(mark.total_time, 0);
        assert_eq!(mark.count, 1);
    }

    #[test]
    fn test_finish_closes_open_scopes() {
        let mut db = EventDatabase::new();
        db.begin_inserting().unwrap();
        db.enter_scope("app#main", 5).unwrap();
        db.append_instance("app#tick", 25).unwrap();
        db.end_inserting().unwrap();
        db.finish().unwrap();
        assert_eq!(db.event(1).unwrap().end_time, 25);
    }
}
