//! Zones: named execution contexts that events are attributed to.
//!
//! A zone is immutable once created and is referenced by [`ZoneId`]
//! identity, never compared or copied. The registry is an arena: creating
//! a zone with a name that already exists still produces a new zone.

use crate::types::ZoneId;
use serde::Serialize;

/// Name of the zone created implicitly when a stream emits events before
/// any zone-create record.
pub const DEFAULT_ZONE_NAME: &str = "default";

/// The kind of execution context a zone represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ZoneKind {
    /// Script (e.g. JavaScript) execution.
    Script,
    /// Native code execution.
    Native,
    /// GPU work.
    Gpu,
    /// Browser-internal activity.
    Browser,
    /// Any other kind, preserved verbatim from the stream.
    Other(String),
}

impl ZoneKind {
    /// Parse the wire representation of a zone kind.
    pub fn from_wire(value: &str) -> ZoneKind {
        match value {
            "script" => ZoneKind::Script,
            "native" => ZoneKind::Native,
            "gpu" => ZoneKind::Gpu,
            "browser" => ZoneKind::Browser,
            other => ZoneKind::Other(other.to_string()),
        }
    }
}

/// A named execution context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    /// Human-readable name ("Main Thread", "Worker 1", ...).
    pub name: String,
    /// Kind of context.
    pub kind: ZoneKind,
    /// Origin location (URI, process id, ...). May be empty.
    pub location: String,
}

/// Arena of all zones seen in a trace.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
    default_zone: Option<ZoneId>,
}

impl ZoneRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new zone. Always allocates a fresh id, even if an identical
    /// zone already exists.
    pub fn create_zone(&mut self, name: &str, kind: ZoneKind, location: &str) -> ZoneId {
        let id = self.zones.len() as ZoneId;
        self.zones.push(Zone {
            name: name.to_string(),
            kind,
            location: location.to_string(),
        });
        tracing::debug!(zone = name, id, "created zone");
        id
    }

    /// Get the default zone, creating it on first use.
    pub fn ensure_default(&mut self) -> ZoneId {
        match self.default_zone {
            Some(id) => id,
            None => {
                let id = self.create_zone(DEFAULT_ZONE_NAME, ZoneKind::Script, "");
                self.default_zone = Some(id);
                id
            }
        }
    }

    /// Look up a zone by id.
    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id as usize)
    }

    /// Number of zones created so far.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether no zones have been created.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// All zones in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ZoneId, &Zone)> {
        self.zones.iter().enumerate().map(|(i, z)| (i as ZoneId, z))
    }
}
