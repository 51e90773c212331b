//! The canonical event store and the shared ingestion protocol.
//!
//! The store owns the only authoritative copy of decoded events, laid out
//! struct-of-arrays: one column per record field, indexed by `id - 1`.
//! Everything else in the database (indexes, summaries) holds integer ids
//! into this arena, so the scope forest needs no pointers and no cycles.
//!
//! Scope structure is built while streaming: an explicit stack of open
//! scopes assigns `parent_id` and `depth` at insert time, links sibling
//! chains, and on scope leave patches `end_time`, `child_time` and
//! `system_time`. The stack survives `end_inserting`, so scopes may span
//! chunk boundaries; [`EventStore::close_open_scopes`] closes whatever is
//! left when the trace truly ends.

use crate::args::ArgumentData;
use crate::error::{Error, Result};
use crate::types::{
    type_flags, ArgDataId, EventClass, EventId, TypeId, ZoneId, NIL_ARGS, NIL_EVENT,
};
use smallvec::SmallVec;

/// The three-call ingestion protocol.
///
/// Any component wanting a live view of the event stream implements these
/// three operations and is driven identically by the decode loop:
/// `begin_inserting` once, `insert_event` per event in chronological
/// order, `end_inserting` to close the batch. Calling `insert_event`
/// outside a bracket is a [`Error::ProtocolViolation`].
pub trait EventSink {
    /// Open an insertion bracket.
    fn begin_inserting(&mut self) -> Result<()>;
    /// Offer one event, in global chronological order.
    fn insert_event(&mut self, event: &EventMeta<'_>) -> Result<()>;
    /// Close the current insertion bracket.
    fn end_inserting(&mut self) -> Result<()>;
}

/// The view of one event offered to every sink during ingestion.
///
/// Carries the resolved type and zone names so each sink can evaluate its
/// own filter chain without holding a registry reference.
#[derive(Debug, Clone, Copy)]
pub struct EventMeta<'a> {
    /// Id the event will have in the canonical store.
    pub id: EventId,
    /// Registered event type id.
    pub type_id: TypeId,
    /// Resolved event type name.
    pub type_name: &'a str,
    /// Instance or scope.
    pub class: EventClass,
    /// The event type's behavior flags.
    pub type_flags: u32,
    /// Zone the event is attributed to.
    pub zone: ZoneId,
    /// Resolved zone name.
    pub zone_name: &'a str,
    /// Event time (enter time for scopes), in trace milliseconds.
    pub time: u32,
    /// Argument payload id, or [`NIL_ARGS`].
    pub argument_data_id: ArgDataId,
}

/// One event record assembled from the store's columns.
///
/// Fixed-width, 11 numeric fields. `end_time == 0` iff the event is an
/// instance event; `parent_id`/`next_sibling_id` form a forest addressed
/// by id, with [`NIL_EVENT`] terminating chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    /// Event id (position in the store, 1-based).
    pub id: EventId,
    /// Event type id.
    pub type_id: TypeId,
    /// Enclosing scope's event id, or [`NIL_EVENT`] at the root.
    pub parent_id: EventId,
    /// Nesting depth; 0 is the root.
    pub depth: u32,
    /// Event time (enter time for scopes).
    pub start_time: u32,
    /// Leave time for scopes; 0 for instance events.
    pub end_time: u32,
    /// Next sibling under the same parent, or [`NIL_EVENT`].
    pub next_sibling_id: EventId,
    /// Argument payload id, or [`NIL_ARGS`].
    pub argument_data_id: ArgDataId,
    /// Application tag; unused by the core.
    pub tag: u32,
    /// Time descendants spent in system-flagged scopes.
    pub system_time: u32,
    /// Total duration of immediate children.
    pub child_time: u32,
}

/// An open scope being tracked by the streaming scope stack.
#[derive(Debug)]
struct ScopeFrame {
    event_id: EventId,
    child_time: u32,
    system_time: u32,
    last_child: EventId,
    system_flagged: bool,
}

/// Append-only canonical event store.
#[derive(Debug)]
pub struct EventStore {
    // Record columns, indexed by id - 1.
    type_ids: Vec<TypeId>,
    parent_ids: Vec<EventId>,
    depths: Vec<u32>,
    start_times: Vec<u32>,
    end_times: Vec<u32>,
    next_siblings: Vec<EventId>,
    argument_ids: Vec<ArgDataId>,
    tags: Vec<u32>,
    system_times: Vec<u32>,
    child_times: Vec<u32>,
    // Zone attribution, parallel to the record columns.
    zone_ids: Vec<ZoneId>,

    // Argument payload side table; index 0 is reserved.
    arguments: Vec<Option<ArgumentData>>,

    scope_stack: SmallVec<[ScopeFrame; 16]>,
    root_last_child: EventId,

    inserting: bool,
    loaded: bool,

    first_time: u32,
    last_time: u32,
}

impl EventStore {
    /// Create an empty, loaded store.
    pub fn new() -> Self {
        EventStore {
            type_ids: Vec::new(),
            parent_ids: Vec::new(),
            depths: Vec::new(),
            start_times: Vec::new(),
            end_times: Vec::new(),
            next_siblings: Vec::new(),
            argument_ids: Vec::new(),
            tags: Vec::new(),
            system_times: Vec::new(),
            child_times: Vec::new(),
            zone_ids: Vec::new(),
            arguments: vec![None],
            scope_stack: SmallVec::new(),
            root_last_child: NIL_EVENT,
            inserting: false,
            loaded: true,
            first_time: 0,
            last_time: 0,
        }
    }

    /// Number of events stored.
    pub fn len(&self) -> usize {
        self.type_ids.len()
    }

    /// Whether the store holds no events.
    pub fn is_empty(&self) -> bool {
        self.type_ids.is_empty()
    }

    /// The id the next inserted event will receive.
    pub fn next_event_id(&self) -> EventId {
        self.type_ids.len() as EventId + 1
    }

    /// Whether the store's data is materialized (not unloaded).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Time of the first stored event, if any.
    pub fn first_event_time(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            Some(self.first_time)
        }
    }

    /// Time of the last stored event, if any.
    pub fn last_event_time(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            Some(self.last_time)
        }
    }

    /// Number of open scopes on the streaming stack.
    pub fn open_scope_count(&self) -> usize {
        self.scope_stack.len()
    }

    /// Assemble the record for an event id.
    pub fn record(&self, id: EventId) -> Option<EventRecord> {
        let idx = self.index_of(id)?;
        Some(EventRecord {
            id,
            type_id: self.type_ids[idx],
            parent_id: self.parent_ids[idx],
            depth: self.depths[idx],
            start_time: self.start_times[idx],
            end_time: self.end_times[idx],
            next_sibling_id: self.next_siblings[idx],
            argument_data_id: self.argument_ids[idx],
            tag: self.tags[idx],
            system_time: self.system_times[idx],
            child_time: self.child_times[idx],
        })
    }

    /// Zone an event is attributed to.
    pub fn zone_of(&self, id: EventId) -> Option<ZoneId> {
        Some(self.zone_ids[self.index_of(id)?])
    }

    /// The enclosing scope of an event, if it has one.
    pub fn parent(&self, id: EventId) -> Option<EventId> {
        match self.parent_ids[self.index_of(id)?] {
            NIL_EVENT => None,
            parent => Some(parent),
        }
    }

    /// The next sibling of an event, if it has one.
    pub fn next_sibling(&self, id: EventId) -> Option<EventId> {
        match self.next_siblings[self.index_of(id)?] {
            NIL_EVENT => None,
            sibling => Some(sibling),
        }
    }

    /// Iterate the immediate children of a scope event, in order.
    pub fn children(&self, id: EventId) -> ChildIter<'_> {
        // The first child of a scope, if any, is the event inserted
        // immediately after it.
        let first = match self.record(id + 1) {
            Some(rec) if rec.parent_id == id => id + 1,
            _ => NIL_EVENT,
        };
        ChildIter { store: self, next: first }
    }

    /// Look up an argument payload by id.
    pub fn argument_data(&self, id: ArgDataId) -> Option<&ArgumentData> {
        if id == NIL_ARGS {
            return None;
        }
        self.arguments.get(id as usize).and_then(|a| a.as_ref())
    }

    /// Store an argument payload, returning its id. Valid only inside an
    /// insertion bracket.
    pub fn add_argument_data(&mut self, args: ArgumentData) -> Result<ArgDataId> {
        self.check_inserting("add_argument_data")?;
        let id = self.arguments.len() as ArgDataId;
        self.arguments.push(Some(args));
        Ok(id)
    }

    /// Close the innermost open scope at `time`, patching its end time and
    /// rolling timing data up to its parent. Returns the closed scope's id.
    pub fn leave_scope(&mut self, time: u32) -> Result<EventId> {
        self.check_inserting("leave_scope")?;
        let frame = self
            .scope_stack
            .pop()
            .ok_or_else(|| Error::ProtocolViolation("scope leave without an open scope".into()))?;
        let closed = frame.event_id;
        self.close_frame(frame, time);
        self.observe_time(time);
        Ok(closed)
    }

    /// Shallow-merge arguments into the innermost open scope's payload,
    /// creating the payload if the scope had none.
    pub fn append_scope_arguments(&mut self, args: ArgumentData) -> Result<()> {
        self.check_inserting("append_scope_arguments")?;
        let scope_id = self
            .scope_stack
            .last()
            .map(|f| f.event_id)
            .ok_or_else(|| Error::ProtocolViolation("no open scope to append data to".into()))?;
        let idx = (scope_id - 1) as usize;
        match self.argument_ids[idx] {
            NIL_ARGS => {
                let id = self.arguments.len() as ArgDataId;
                self.arguments.push(Some(args));
                self.argument_ids[idx] = id;
            }
            existing => {
                if let Some(slot) = self.arguments[existing as usize].as_mut() {
                    slot.merge(args);
                }
            }
        }
        Ok(())
    }

    /// Close every scope still open, at `time`. Called when the trace ends
    /// so partial traces still satisfy the scope invariants.
    pub fn close_open_scopes(&mut self, time: u32) {
        while let Some(frame) = self.scope_stack.pop() {
            self.close_frame(frame, time);
        }
    }

    /// Drop all record and argument storage to free memory. An unloaded
    /// store rejects further insertion brackets.
    pub fn unload(&mut self) {
        tracing::debug!(events = self.len(), "unloading event store");
        self.type_ids = Vec::new();
        self.parent_ids = Vec::new();
        self.depths = Vec::new();
        self.start_times = Vec::new();
        self.end_times = Vec::new();
        self.next_siblings = Vec::new();
        self.argument_ids = Vec::new();
        self.tags = Vec::new();
        self.system_times = Vec::new();
        self.child_times = Vec::new();
        self.zone_ids = Vec::new();
        self.arguments = vec![None];
        self.scope_stack.clear();
        self.root_last_child = NIL_EVENT;
        self.inserting = false;
        self.loaded = false;
    }

    fn close_frame(&mut self, frame: ScopeFrame, time: u32) {
        let idx = (frame.event_id - 1) as usize;
        let duration = time.saturating_sub(self.start_times[idx]);
        self.end_times[idx] = time;
        self.child_times[idx] = frame.child_time;
        self.system_times[idx] = frame.system_time;
        if let Some(parent) = self.scope_stack.last_mut() {
            parent.child_time += duration;
            if frame.system_flagged {
                parent.system_time += duration;
            }
        }
    }

    fn index_of(&self, id: EventId) -> Option<usize> {
        if id == NIL_EVENT || id > self.type_ids.len() as EventId {
            None
        } else {
            Some((id - 1) as usize)
        }
    }

    fn observe_time(&mut self, time: u32) {
        if self.is_empty() {
            return;
        }
        if time < self.first_time {
            self.first_time = time;
        }
        if time > self.last_time {
            self.last_time = time;
        }
    }

    fn check_inserting(&self, op: &str) -> Result<()> {
        if !self.loaded {
            return Err(Error::ProtocolViolation(format!(
                "{op} on an unloaded store"
            )));
        }
        if !self.inserting {
            return Err(Error::ProtocolViolation(format!(
                "{op} outside a begin_inserting/end_inserting bracket"
            )));
        }
        Ok(())
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventStore {
    fn begin_inserting(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(Error::ProtocolViolation(
                "begin_inserting on an unloaded store".into(),
            ));
        }
        if self.inserting {
            return Err(Error::ProtocolViolation(
                "begin_inserting while already inserting".into(),
            ));
        }
        self.inserting = true;
        Ok(())
    }

    fn insert_event(&mut self, event: &EventMeta<'_>) -> Result<()> {
        self.check_inserting("insert_event")?;
        if event.id != self.next_event_id() {
            return Err(Error::ProtocolViolation(format!(
                "event id {} out of sequence (expected {})",
                event.id,
                self.next_event_id()
            )));
        }

        let parent_id = self
            .scope_stack
            .last()
            .map(|f| f.event_id)
            .unwrap_or(NIL_EVENT);
        let depth = self.scope_stack.len() as u32;

        // Link the previous sibling under the same parent to this event.
        let prev = match self.scope_stack.last_mut() {
            Some(frame) => std::mem::replace(&mut frame.last_child, event.id),
            None => std::mem::replace(&mut self.root_last_child, event.id),
        };
        if prev != NIL_EVENT {
            self.next_siblings[(prev - 1) as usize] = event.id;
        }

        self.type_ids.push(event.type_id);
        self.parent_ids.push(parent_id);
        self.depths.push(depth);
        self.start_times.push(event.time);
        self.end_times.push(0);
        self.next_siblings.push(NIL_EVENT);
        self.argument_ids.push(event.argument_data_id);
        self.tags.push(0);
        self.system_times.push(0);
        self.child_times.push(0);
        self.zone_ids.push(event.zone);

        if event.class == EventClass::Scope {
            self.scope_stack.push(ScopeFrame {
                event_id: event.id,
                child_time: 0,
                system_time: 0,
                last_child: NIL_EVENT,
                system_flagged: event.type_flags & type_flags::SYSTEM_TIME != 0,
            });
        }

        if self.len() == 1 {
            self.first_time = event.time;
            self.last_time = event.time;
        } else {
            self.observe_time(event.time);
        }
        Ok(())
    }

    fn end_inserting(&mut self) -> Result<()> {
        if !self.inserting {
            return Err(Error::ProtocolViolation(
                "end_inserting without begin_inserting".into(),
            ));
        }
        self.inserting = false;
        tracing::trace!(events = self.len(), "closed store insertion bracket");
        Ok(())
    }
}

/// Iterator over the immediate children of a scope event.
pub struct ChildIter<'a> {
    store: &'a EventStore,
    next: EventId,
}

impl Iterator for ChildIter<'_> {
    type Item = EventId;

    fn next(&mut self) -> Option<EventId> {
        if self.next == NIL_EVENT {
            return None;
        }
        let current = self.next;
        self.next = self.store.next_sibling(current).unwrap_or(NIL_EVENT);
        Some(current)
    }
}
