//! Shared id and classification types.
//!
//! Events, zones and argument payloads are addressed by dense integer ids
//! rather than references: the canonical store is an arena and everything
//! else holds indices into it, which keeps the scope forest trivially
//! serializable and free of ownership cycles.

/// Id of an event in the canonical store.
///
/// Ids are assigned sequentially from 1 in insertion order, which equals
/// chronological order. They are never reused or removed.
pub type EventId = u32;

/// Id of a registered event type.
pub type TypeId = u16;

/// Id of a zone in the zone registry.
pub type ZoneId = u32;

/// Id of an argument-data payload in the store's side table.
pub type ArgDataId = u32;

/// Sentinel for "no event": terminates sibling chains and marks roots.
pub const NIL_EVENT: EventId = 0;

/// Sentinel for "no argument data".
pub const NIL_ARGS: ArgDataId = 0;

/// First event type id available to user-defined types. Smaller ids are
/// reserved for built-in control records.
pub const FIRST_USER_TYPE_ID: TypeId = 16;

/// Classification of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// A point-in-time event with no duration (`end_time == 0`).
    Instance,
    /// A duration event with enter/leave semantics (`end_time != 0`),
    /// nested via parent/sibling links.
    Scope,
}

impl EventClass {
    /// Decode a wire class byte.
    pub fn from_wire(value: u8) -> Option<EventClass> {
        match value {
            0 => Some(EventClass::Instance),
            1 => Some(EventClass::Scope),
            _ => None,
        }
    }

    /// Encode as a wire class byte.
    pub fn to_wire(self) -> u8 {
        match self {
            EventClass::Instance => 0,
            EventClass::Scope => 1,
        }
    }
}

/// Event type behavior flags.
///
/// Carried on [`crate::event_type::EventType`] and settable from the wire
/// define record.
pub mod type_flags {
    /// Durations of scopes with this flag also accrue to the enclosing
    /// scope's `system_time`.
    pub const SYSTEM_TIME: u32 = 1 << 0;

    /// The type is internal bookkeeping; statistics queries skip it.
    pub const INTERNAL: u32 = 1 << 1;

    /// The type is a built-in; statistics queries skip it.
    pub const BUILTIN: u32 = 1 << 2;
}
