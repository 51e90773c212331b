//! Bounds-checked read cursor over a record buffer.
//!
//! All multi-byte values are big-endian, matching the trace wire format.
//! Every read checks the remaining length first and reports
//! [`Error::TruncatedBuffer`] without consuming anything, so a cursor that
//! fails mid-record can be abandoned and retried once more bytes arrive.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

/// Marker in a string length prefix that denotes a string-table reference.
/// String tables are not part of this format, so it decodes as an error.
const STRING_TABLE_MARKER: u16 = 0xFFFF;

/// A read position over a byte buffer.
#[derive(Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    /// Current offset from the start of the buffer.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether all bytes have been consumed.
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Check that `needed` bytes remain.
    pub fn require(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            Err(Error::TruncatedBuffer {
                needed,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    /// Consume `len` bytes and return them as a slice.
    pub fn split(&mut self, len: usize) -> Result<&'a [u8]> {
        self.require(len)?;
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read one unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.split(1)?[0])
    }

    /// Read one signed byte.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.split(2)?))
    }

    /// Read a big-endian i16.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.split(2)?))
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.split(4)?))
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.split(4)?))
    }

    /// Read a big-endian IEEE-754 f32.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.split(4)?))
    }

    /// Read a length-prefixed ASCII string.
    ///
    /// Wire form: `u16` byte count, then that many bytes. A count of zero
    /// is the empty string.
    pub fn read_ascii(&mut self) -> Result<String> {
        let len = self.read_string_length()?;
        let bytes = self.split(len)?;
        if !bytes.is_ascii() {
            return Err(Error::MalformedRecord(
                "non-ASCII byte in ascii string".to_string(),
            ));
        }
        // ASCII is valid UTF-8.
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a length-prefixed UTF-8 string.
    ///
    /// Wire form: `u16` byte count, then that many bytes.
    pub fn read_utf8(&mut self) -> Result<String> {
        let len = self.read_string_length()?;
        let bytes = self.split(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::MalformedRecord("invalid UTF-8 in utf8 string".to_string()))
    }

    /// Read a count-prefixed byte array (`u32` count, then bytes).
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.split(len)?.to_vec())
    }

    fn read_string_length(&mut self) -> Result<usize> {
        let len = self.read_u16()?;
        if len == STRING_TABLE_MARKER {
            return Err(Error::MalformedRecord(
                "string table references are not supported".to_string(),
            ));
        }
        Ok(len as usize)
    }
}
