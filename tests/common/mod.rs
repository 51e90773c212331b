//! Shared test helpers: a byte-level trace stream writer.

use byteorder::{BigEndian, WriteBytesExt};
use tracedb::{builtin, TRACE_MAGIC, TRACE_VERSION};

/// Builds wire-format trace streams for tests, one record at a time.
pub struct TraceWriter {
    buf: Vec<u8>,
}

#[allow(dead_code)]
impl TraceWriter {
    /// A stream with a standard header and no flags.
    pub fn new() -> Self {
        Self::with_flags(0)
    }

    /// A stream with a standard header and the given flag bits.
    pub fn with_flags(flags: u32) -> Self {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(TRACE_MAGIC).unwrap();
        buf.write_u32::<BigEndian>(TRACE_VERSION).unwrap();
        buf.write_u32::<BigEndian>(flags).unwrap();
        TraceWriter { buf }
    }

    /// An empty buffer with no header, for malformed-stream tests.
    pub fn headerless() -> Self {
        TraceWriter { buf: Vec::new() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Start a record: type id and time.
    pub fn record(&mut self, type_id: u16, time: u32) -> &mut Self {
        self.buf.write_u16::<BigEndian>(type_id).unwrap();
        self.buf.write_u32::<BigEndian>(time).unwrap();
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.write_u16::<BigEndian>(v).unwrap();
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.write_u32::<BigEndian>(v).unwrap();
        self
    }

    /// Length-prefixed string, used for both ascii and utf8 arguments.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.buf.write_u16::<BigEndian>(s.len() as u16).unwrap();
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// A `trace.event#define` control record.
    pub fn define(&mut self, wire_id: u16, class: u8, flags: u32, name: &str, args: &str) {
        self.record(builtin::DEFINE_EVENT, 0)
            .u16(wire_id)
            .u8(class)
            .u32(flags)
            .string(name)
            .string(args);
    }

    /// A `trace.zone#create` control record.
    pub fn create_zone(&mut self, zone_id: u16, name: &str, kind: &str, location: &str) {
        self.record(builtin::CREATE_ZONE, 0)
            .u16(zone_id)
            .string(name)
            .string(kind)
            .string(location);
    }

    /// A `trace.zone#set` control record.
    pub fn set_zone(&mut self, zone_id: u16) {
        self.record(builtin::SET_ZONE, 0).u16(zone_id);
    }

    /// A `trace.scope#leave` control record.
    pub fn leave(&mut self, time: u32) {
        self.record(builtin::LEAVE_SCOPE, time);
    }

    /// A `trace.scope#appendData` control record.
    pub fn append_data(&mut self, time: u32, key: &str, value: &str) {
        self.record(builtin::APPEND_SCOPE_DATA, time)
            .string(key)
            .string(value);
    }
}
