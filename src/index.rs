//! Derived indexes over the canonical store.
//!
//! An index is a membership predicate plus a dense list of event ids, fed
//! through the same three-call ingestion protocol as the store itself. It
//! never copies event payload; order within an index is arrival order,
//! which is global chronological order.

use crate::error::{Error, Result};
use crate::store::{EventMeta, EventSink};
use crate::types::{EventClass, EventId, ZoneId};

/// Keeps events whose type resolves to a fixed name.
#[derive(Debug)]
pub struct EventTypeIndex {
    name: String,
    ids: Vec<EventId>,
    inserting: bool,
}

impl EventTypeIndex {
    /// An empty index for the given event type name.
    pub fn new(name: impl Into<String>) -> Self {
        EventTypeIndex {
            name: name.into(),
            ids: Vec::new(),
            inserting: false,
        }
    }

    /// The type name this index tracks.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of matching events seen.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Whether no matching events have been seen.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Matching event ids, in chronological order.
    pub fn ids(&self) -> &[EventId] {
        &self.ids
    }
}

impl EventSink for EventTypeIndex {
    fn begin_inserting(&mut self) -> Result<()> {
        begin(&mut self.inserting, "event type index")
    }

    fn insert_event(&mut self, event: &EventMeta<'_>) -> Result<()> {
        check(self.inserting, "event type index")?;
        if event.type_name == self.name {
            self.ids.push(event.id);
        }
        Ok(())
    }

    fn end_inserting(&mut self) -> Result<()> {
        end(&mut self.inserting, "event type index")
    }
}

/// Keeps events attributed to a fixed zone.
#[derive(Debug)]
pub struct ZoneIndex {
    zone: ZoneId,
    ids: Vec<EventId>,
    inserting: bool,
}

impl ZoneIndex {
    /// An empty index for the given zone.
    pub fn new(zone: ZoneId) -> Self {
        ZoneIndex {
            zone,
            ids: Vec::new(),
            inserting: false,
        }
    }

    /// The zone this index tracks.
    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    /// Number of matching events seen.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Whether no matching events have been seen.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Matching event ids, in chronological order.
    pub fn ids(&self) -> &[EventId] {
        &self.ids
    }
}

impl EventSink for ZoneIndex {
    fn begin_inserting(&mut self) -> Result<()> {
        begin(&mut self.inserting, "zone index")
    }

    fn insert_event(&mut self, event: &EventMeta<'_>) -> Result<()> {
        check(self.inserting, "zone index")?;
        if event.zone == self.zone {
            self.ids.push(event.id);
        }
        Ok(())
    }

    fn end_inserting(&mut self) -> Result<()> {
        end(&mut self.inserting, "zone index")
    }
}

/// Keeps scope events belonging to a fixed zone, for range painting.
#[derive(Debug)]
pub struct TimeRangeIndex {
    zone: ZoneId,
    ids: Vec<EventId>,
    inserting: bool,
}

impl TimeRangeIndex {
    /// An empty index for the given zone.
    pub fn new(zone: ZoneId) -> Self {
        TimeRangeIndex {
            zone,
            ids: Vec::new(),
            inserting: false,
        }
    }

    /// The zone this index tracks.
    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    /// Number of matching events seen.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Whether no matching events have been seen.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Matching event ids, in chronological order.
    pub fn ids(&self) -> &[EventId] {
        &self.ids
    }
}

impl EventSink for TimeRangeIndex {
    fn begin_inserting(&mut self) -> Result<()> {
        begin(&mut self.inserting, "time range index")
    }

    fn insert_event(&mut self, event: &EventMeta<'_>) -> Result<()> {
        check(self.inserting, "time range index")?;
        if event.zone == self.zone && event.class == EventClass::Scope {
            self.ids.push(event.id);
        }
        Ok(())
    }

    fn end_inserting(&mut self) -> Result<()> {
        end(&mut self.inserting, "time range index")
    }
}

fn begin(inserting: &mut bool, what: &str) -> Result<()> {
    if *inserting {
        return Err(Error::ProtocolViolation(format!(
            "begin_inserting on {what} while already inserting"
        )));
    }
    *inserting = true;
    Ok(())
}

fn check(inserting: bool, what: &str) -> Result<()> {
    if !inserting {
        return Err(Error::ProtocolViolation(format!(
            "insert_event on {what} outside a bracket"
        )));
    }
    Ok(())
}

fn end(inserting: &mut bool, what: &str) -> Result<()> {
    if !*inserting {
        return Err(Error::ProtocolViolation(format!(
            "end_inserting on {what} without begin_inserting"
        )));
    }
    *inserting = false;
    Ok(())
}
