//! Binary trace stream framing.
//!
//! The decoder consumes the versioned stream header and then yields one
//! typed record at a time, looking up each record's schema in the type
//! registry to know how many bytes it spans. Input may be fed in
//! arbitrary chunks: a trailing partial record is buffered until more
//! bytes arrive, so chunk boundaries can fall anywhere, including inside
//! an argument.
//!
//! Record length is only knowable through the registered schema, so an
//! unknown type id or a schema-level decode failure poisons the decoder
//! for the remainder of the stream. Everything decoded before the failure
//! stays valid.

use crate::args::ArgumentData;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::event_type::EventTypeRegistry;
use crate::types::TypeId;

/// Leading magic of a trace stream.
pub const TRACE_MAGIC: u32 = 0xDEAD_BEEF;

/// The one supported wire format version.
pub const TRACE_VERSION: u32 = 3;

/// Stream header flag bits.
pub mod file_flags {
    /// Times were captured with a high resolution clock.
    pub const HAS_HIGH_RESOLUTION_TIMES: u32 = 1 << 0;
    /// Time fields carry a counter instead of milliseconds.
    pub const TIMES_AS_COUNT: u32 = 1 << 1;
}

/// Parsed stream header.
#[derive(Debug, Clone, Copy)]
pub struct TraceHeader {
    /// Wire format version.
    pub version: u32,
    /// [`file_flags`] bitmask.
    pub flags: u32,
}

impl TraceHeader {
    /// Whether times came from a high resolution clock.
    pub fn has_high_resolution_times(&self) -> bool {
        self.flags & file_flags::HAS_HIGH_RESOLUTION_TIMES != 0
    }

    /// Whether time fields are counters rather than milliseconds.
    pub fn times_as_count(&self) -> bool {
        self.flags & file_flags::TIMES_AS_COUNT != 0
    }
}

/// One decoded wire record, control or user.
#[derive(Debug)]
pub struct DecodedRecord {
    /// Registered type id.
    pub type_id: TypeId,
    /// Record time in trace milliseconds.
    pub time: u32,
    /// Decoded argument payload, possibly empty.
    pub args: ArgumentData,
}

/// Incremental decoder over a chunked byte stream.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    pos: usize,
    header: Option<TraceHeader>,
    poisoned: bool,
}

impl StreamDecoder {
    /// A decoder expecting a stream header.
    pub fn new() -> Self {
        StreamDecoder::default()
    }

    /// Append a chunk of input.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::ProtocolViolation(
                "feeding a stream that already failed".into(),
            ));
        }
        // Drop the consumed prefix before growing the buffer.
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// The parsed header, once enough bytes have been fed.
    pub fn header(&self) -> Option<&TraceHeader> {
        self.header.as_ref()
    }

    /// Bytes fed but not yet consumed by a complete record.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether a fatal decode error has stopped the stream.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Mark the stream failed. Used when a decoded control record turns
    /// out to be semantically invalid, which is just as unrecoverable as
    /// a framing error.
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Decode the next record, if a complete one is buffered.
    ///
    /// Returns `Ok(None)` when more input is needed. Errors other than
    /// truncation are fatal and poison the decoder.
    pub fn next_record(&mut self, types: &EventTypeRegistry) -> Result<Option<DecodedRecord>> {
        if self.poisoned {
            return Err(Error::ProtocolViolation(
                "reading from a stream that already failed".into(),
            ));
        }
        if self.header.is_none() && !self.try_parse_header()? {
            return Ok(None);
        }

        let mut cur = Cursor::new(&self.buf[self.pos..]);
        let record = match Self::parse_record(&mut cur, types) {
            Ok(record) => record,
            Err(err) if err.is_truncation() => return Ok(None),
            Err(err) => {
                self.poisoned = true;
                tracing::warn!(error = %err, offset = self.pos, "trace stream decode failed");
                return Err(err);
            }
        };
        self.pos += cur.pos();
        Ok(Some(record))
    }

    fn try_parse_header(&mut self) -> Result<bool> {
        let mut cur = Cursor::new(&self.buf[self.pos..]);
        let magic = match cur.read_u32() {
            Ok(magic) => magic,
            Err(_) => return Ok(false),
        };
        if magic != TRACE_MAGIC {
            self.poisoned = true;
            return Err(Error::BadMagic(magic));
        }
        let (version, flags) = match (cur.read_u32(), cur.read_u32()) {
            (Ok(version), Ok(flags)) => (version, flags),
            _ => return Ok(false),
        };
        if version != TRACE_VERSION {
            self.poisoned = true;
            return Err(Error::UnsupportedVersion {
                found: version,
                expected: TRACE_VERSION,
            });
        }
        self.pos += cur.pos();
        let header = TraceHeader { version, flags };
        tracing::debug!(version, flags, "parsed trace stream header");
        self.header = Some(header);
        Ok(true)
    }

    fn parse_record(cur: &mut Cursor<'_>, types: &EventTypeRegistry) -> Result<DecodedRecord> {
        let type_id = cur.read_u16()?;
        let time = cur.read_u32()?;
        let decoder = types
            .decoder(type_id)
            .ok_or(Error::UnknownEventType(type_id))?;
        let args = decoder.decode(cur)?;
        Ok(DecodedRecord {
            type_id,
            time,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_type::{builtin, EventType};
    use crate::types::EventClass;
    use byteorder::{BigEndian, WriteBytesExt};

    fn header_bytes(flags: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<BigEndian>(TRACE_MAGIC).unwrap();
        out.write_u32::<BigEndian>(TRACE_VERSION).unwrap();
        out.write_u32::<BigEndian>(flags).unwrap();
        out
    }

    fn record_head(type_id: TypeId, time: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u16::<BigEndian>(type_id).unwrap();
        out.write_u32::<BigEndian>(time).unwrap();
        out
    }

    #[test]
    fn test_header_then_leave_record() {
        let registry = EventTypeRegistry::new();
        let mut decoder = StreamDecoder::new();
        let mut bytes = header_bytes(file_flags::HAS_HIGH_RESOLUTION_TIMES);
        bytes.extend(record_head(builtin::LEAVE_SCOPE, 42));
        decoder.feed(&bytes).unwrap();

        let record = decoder.next_record(&registry).unwrap().unwrap();
        assert_eq!(record.type_id, builtin::LEAVE_SCOPE);
        assert_eq!(record.time, 42);
        assert!(record.args.is_empty());
        assert!(decoder.header().unwrap().has_high_resolution_times());
        assert_eq!(decoder.pending_bytes(), 0);
        assert!(decoder.next_record(&registry).unwrap().is_none());
    }

    #[test]
    fn test_byte_at_a_time_feeding() {
        let mut registry = EventTypeRegistry::new();
        let ty = EventType::parse(EventClass::Instance, "app#tick(uint32 n)").unwrap();
        let id = registry.define(ty).unwrap();

        let mut bytes = header_bytes(0);
        bytes.extend(record_head(id, 7));
        bytes.write_u32::<BigEndian>(99).unwrap();

        let mut decoder = StreamDecoder::new();
        let mut decoded = Vec::new();
        for byte in &bytes {
            decoder.feed(std::slice::from_ref(byte)).unwrap();
            while let Some(record) = decoder.next_record(&registry).unwrap() {
                decoded.push(record);
            }
        }
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].time, 7);
        assert_eq!(
            decoded[0].args.get("n"),
            Some(&crate::args::ArgValue::U32(99))
        );
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let registry = EventTypeRegistry::new();
        let mut decoder = StreamDecoder::new();
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(0x1234_5678).unwrap();
        bytes.write_u32::<BigEndian>(TRACE_VERSION).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
        decoder.feed(&bytes).unwrap();
        assert!(matches!(
            decoder.next_record(&registry),
            Err(Error::BadMagic(0x1234_5678))
        ));
        assert!(decoder.is_poisoned());
        assert!(decoder.feed(&[0]).is_err());
    }

    #[test]
    fn test_unsupported_version_is_fatal() {
        let registry = EventTypeRegistry::new();
        let mut decoder = StreamDecoder::new();
        let mut bytes = Vec::new();
        bytes.write_u32::<BigEndian>(TRACE_MAGIC).unwrap();
        bytes.write_u32::<BigEndian>(9).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
        decoder.feed(&bytes).unwrap();
        assert!(matches!(
            decoder.next_record(&registry),
            Err(Error::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn test_unknown_type_id_is_fatal() {
        let registry = EventTypeRegistry::new();
        let mut decoder = StreamDecoder::new();
        let mut bytes = header_bytes(0);
        bytes.extend(record_head(200, 5));
        decoder.feed(&bytes).unwrap();
        assert!(matches!(
            decoder.next_record(&registry),
            Err(Error::UnknownEventType(200))
        ));
        assert!(decoder.is_poisoned());
    }

    #[test]
    fn test_partial_record_stays_pending() {
        let mut registry = EventTypeRegistry::new();
        let ty = EventType::parse(EventClass::Instance, "app#tick(uint32 n)").unwrap();
        let id = registry.define(ty).unwrap();

        let mut bytes = header_bytes(0);
        bytes.extend(record_head(id, 7));
        bytes.extend([0, 0]); // half of the uint32 argument
        let mut decoder = StreamDecoder::new();
        decoder.feed(&bytes).unwrap();
        assert!(decoder.next_record(&registry).unwrap().is_none());
        assert_eq!(decoder.pending_bytes(), 8);
        assert!(!decoder.is_poisoned());
    }
}
