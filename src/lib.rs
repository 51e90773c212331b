//! # tracedb
//!
//! Streaming, append-only trace event database.
//!
//! tracedb decodes a binary trace record stream into a compact in-memory
//! representation, maintains derived indexes over it (by event type, by
//! zone, by time range) and multi-resolution time-bucketed summaries, so
//! a tool can ask "what happened between T0 and T1" at any zoom level
//! without re-scanning the event log.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tracedb::prelude::*;
//!
//! let mut db = EventDatabase::new();
//!
//! // Feed the wire stream in arbitrary chunks.
//! db.feed(&chunk)?;
//! let report = db.finish()?;
//!
//! // Query.
//! let summary = db.query_summary(0, 5_000);
//! db.for_each_summary(0, 5_000, Granularity::Second, |bucket| {
//!     println!("{}..{}: {}", bucket.time_start, bucket.time_end,
//!         bucket.total_event_count);
//! });
//! let frames = db.create_event_index("app#frame")?;
//! ```
//!
//! ## Pieces
//!
//! - [`EventDatabase`] - the facade: ingestion, registries, queries
//! - [`EventStore`] - canonical struct-of-arrays event storage
//! - [`EventTypeIndex`], [`ZoneIndex`], [`TimeRangeIndex`] - derived views
//! - [`SummaryIndex`] - decimal bucket tree over event times
//! - [`FilterChain`] - include/exclude filtering at ingestion
//! - [`StreamDecoder`] - chunked wire stream framing

#![warn(missing_docs)]

mod args;
mod codec;
mod cursor;
mod database;
mod error;
mod event_type;
mod filter;
mod index;
mod stats;
mod store;
mod stream;
mod summary;
mod types;
mod zone;

pub mod prelude;

// Main entry point
pub use database::{EventDatabase, IngestProgress, IngestReport};
pub use error::{Error, Result};

// Storage and ingestion protocol
pub use store::{ChildIter, EventMeta, EventRecord, EventSink, EventStore};

// Event model
pub use args::{ArgValue, ArgumentData};
pub use event_type::{
    builtin, parse_signature_args, provider_of, ArgKind, Argument, EventType, EventTypeRegistry,
};
pub use types::{
    type_flags, ArgDataId, EventClass, EventId, TypeId, ZoneId, FIRST_USER_TYPE_ID, NIL_ARGS,
    NIL_EVENT,
};
pub use zone::{Zone, ZoneKind, ZoneRegistry, DEFAULT_ZONE_NAME};

// Derived views and aggregation
pub use filter::{Filter, FilterAction, FilterChain, FilterTarget};
pub use index::{EventTypeIndex, TimeRangeIndex, ZoneIndex};
pub use stats::{SortMode, StatisticsBuilder, TypeStatistics};
pub use summary::{Granularity, SummaryData, SummaryIndex, FINEST_MS};

// Wire format
pub use codec::{decode_args_interpreted, read_arg, CompiledArgDecoder};
pub use cursor::Cursor;
pub use stream::{
    file_flags, DecodedRecord, StreamDecoder, TraceHeader, TRACE_MAGIC, TRACE_VERSION,
};
