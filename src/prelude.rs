//! Convenient imports for tracedb.
//!
//! Re-exports the types most callers need:
//!
//! ```ignore
//! use tracedb::prelude::*;
//!
//! let mut db = EventDatabase::new();
//! db.feed(&bytes)?;
//! let report = db.finish()?;
//! ```

// Main entry point
pub use crate::database::{EventDatabase, IngestProgress, IngestReport};

// Error handling
pub use crate::error::{Error, Result};

// Event model
pub use crate::args::{ArgValue, ArgumentData};
pub use crate::event_type::{ArgKind, Argument, EventType};
pub use crate::store::{EventMeta, EventRecord, EventSink};
pub use crate::types::{EventClass, EventId, TypeId, ZoneId};
pub use crate::zone::{Zone, ZoneKind};

// Queries
pub use crate::filter::{Filter, FilterTarget};
pub use crate::stats::{SortMode, TypeStatistics};
pub use crate::summary::{Granularity, SummaryData};
