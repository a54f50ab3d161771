//! Core bytecode structures plus a compact binary roundtrip implementation.

use core::iter::FusedIterator;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::{opcode::Opcode, value::Value};
use crate::ChunkResult;

/// Largest number of constants a chunk can address with a one-byte index.
pub const MAX_CONSTANTS: usize = 256;

const MAGIC: &[u8; 4] = b"EMBC";
const CHUNK_VERSION: u16 = 1;

const CONST_TAG_UNIT: u8 = 0x00;
const CONST_TAG_INT: u8 = 0x01;

/// Errors returned when writing, decoding or loading a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// The byte at `offset` is not a known opcode.
    #[error("malformed chunk: unknown opcode 0x{byte:02X} at offset {offset}")]
    UnknownOpcode {
        /// Offset of the offending byte.
        offset: usize,
        /// Raw byte value.
        byte: u8,
    },
    /// The code ends in the middle of an instruction.
    #[error("malformed chunk: truncated {opcode} at offset {offset} (needs {expected} operand byte(s), {found} left)")]
    Truncated {
        /// Offset of the opcode byte.
        offset: usize,
        /// Instruction being decoded.
        opcode: Opcode,
        /// Operand bytes required by the opcode.
        expected: usize,
        /// Operand bytes actually available.
        found: usize,
    },
    /// Decoding was asked to start past the end of the code.
    #[error("offset {offset} is past the end of the code ({len} bytes)")]
    OffsetOutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Code length.
        len: usize,
    },
    /// A 257th constant was added.
    #[error("constant pool overflow: a chunk holds at most 256 constants")]
    ConstantPoolOverflow,
    /// A `CONST` operand points past the end of the pool.
    #[error("constant index {index} out of range (pool holds {len})")]
    ConstantIndexOutOfRange {
        /// Index read from the code.
        index: u8,
        /// Pool length at lookup time.
        len: usize,
    },
    /// Growing a buffer failed; the chunk is left untouched.
    #[error("allocation failed while growing the {0}")]
    OutOfMemory(&'static str),
    /// Binary payload does not match the container layout.
    #[error("format error: {0}")]
    Format(&'static str),
    /// CRC32 mismatch detected while decoding a payload.
    #[error("hash mismatch (crc32): expected=0x{expected:08X}, found=0x{found:08X}")]
    HashMismatch {
        /// CRC32 recomputed from the payload.
        expected: u32,
        /// CRC32 value read from the payload.
        found: u32,
    },
}

impl ChunkError {
    /// True when the instruction stream itself is ill-formed.
    pub const fn is_malformed(&self) -> bool {
        matches!(self, ChunkError::UnknownOpcode { .. } | ChunkError::Truncated { .. })
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte.
    pub offset: usize,
    /// Decoded opcode.
    pub opcode: Opcode,
    /// Operand byte, present iff the opcode takes one.
    pub operand: Option<u8>,
}

impl Instruction {
    /// Encoded size (opcode byte plus operands).
    pub const fn encoded_len(&self) -> usize { self.opcode.encoded_len() }

    /// Offset of the following instruction.
    pub const fn next_offset(&self) -> usize { self.offset + self.encoded_len() }
}

/// Executable unit: encoded instructions plus the constant pool they index.
///
/// The chunk owns both buffers. The write side does not check that operand
/// counts match the preceding opcode; [`validate_chunk`](crate::helpers::validate_chunk)
/// and the decoder report such faults.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chunk {
    name: String,
    code: Vec<u8>,
    pool: Vec<Value>,
}

impl Chunk {
    /// Create an empty chunk labelled `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), code: Vec::new(), pool: Vec::new() }
    }

    /// Display label.
    pub fn name(&self) -> &str { &self.name }

    /// Rename the chunk.
    pub fn set_name(&mut self, name: impl Into<String>) { self.name = name.into(); }

    /// Encoded instruction stream.
    pub fn code(&self) -> &[u8] { &self.code }

    /// Constant pool, in index order.
    pub fn constants(&self) -> &[Value] { &self.pool }

    /// Length of the code in bytes.
    pub fn len(&self) -> usize { self.code.len() }

    /// True if no byte was written yet.
    pub fn is_empty(&self) -> bool { self.code.is_empty() }

    /// Append an opcode byte.
    pub fn write_opcode(&mut self, op: Opcode) -> ChunkResult<()> { self.write_byte(op.as_byte()) }

    /// Append one raw operand byte.
    pub fn write_byte(&mut self, byte: u8) -> ChunkResult<()> {
        self.code.try_reserve(1).map_err(|_| ChunkError::OutOfMemory("code buffer"))?;
        self.code.push(byte);
        Ok(())
    }

    /// Append raw operand bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> ChunkResult<()> {
        self.code.try_reserve(bytes.len()).map_err(|_| ChunkError::OutOfMemory("code buffer"))?;
        self.code.extend_from_slice(bytes);
        Ok(())
    }

    /// Append a constant and return its index.
    pub fn add_constant(&mut self, value: Value) -> ChunkResult<u8> {
        let index = u8::try_from(self.pool.len()).map_err(|_| ChunkError::ConstantPoolOverflow)?;
        self.pool.try_reserve(1).map_err(|_| ChunkError::OutOfMemory("constant pool"))?;
        self.pool.push(value);
        Ok(index)
    }

    /// Add `value` to the pool and emit `CONST index`.
    pub fn emit_constant(&mut self, value: Value) -> ChunkResult<u8> {
        // Reserve code space first so a failed allocation leaves the pool alone.
        self.code.try_reserve(Opcode::Const.encoded_len()).map_err(|_| ChunkError::OutOfMemory("code buffer"))?;
        let index = self.add_constant(value)?;
        self.code.extend_from_slice(&[Opcode::Const.as_byte(), index]);
        Ok(index)
    }

    /// Lookup a constant by index.
    pub fn get_constant(&self, index: u8) -> ChunkResult<Value> {
        self.pool
            .get(usize::from(index))
            .copied()
            .ok_or(ChunkError::ConstantIndexOutOfRange { index, len: self.pool.len() })
    }

    /// Drop both buffers and start over with empty ones. The name is kept.
    pub fn reset(&mut self) {
        self.code = Vec::new();
        self.pool = Vec::new();
    }

    /// Decode the instruction starting at `offset`.
    ///
    /// Never reads past the end of the code: a missing operand is reported as
    /// [`ChunkError::Truncated`].
    pub fn decode_at(&self, offset: usize) -> ChunkResult<Instruction> {
        let byte = *self
            .code
            .get(offset)
            .ok_or(ChunkError::OffsetOutOfBounds { offset, len: self.code.len() })?;
        let opcode = Opcode::from_byte(byte).ok_or(ChunkError::UnknownOpcode { offset, byte })?;

        let expected = opcode.operand_len();
        let available = self.code.len() - offset - 1;
        if available < expected {
            return Err(ChunkError::Truncated { offset, opcode, expected, found: available });
        }
        let operand = (expected == 1).then(|| self.code[offset + 1]);
        Ok(Instruction { offset, opcode, operand })
    }

    /// Iterate over decoded instructions; stops after the first error.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions { chunk: self, offset: 0, failed: false }
    }

    /// Encode the chunk to a compact binary payload.
    ///
    /// Lengths are stored as `u32`; a name or code buffer longer than
    /// `u32::MAX` bytes yields [`ChunkError::Format`].
    pub fn to_bytes(&self) -> ChunkResult<Vec<u8>> {
        let mut out = Vec::with_capacity(MAGIC.len() + 16 + self.name.len() + self.pool.len() * 9 + self.code.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&CHUNK_VERSION.to_le_bytes());

        write_str(&mut out, &self.name)?;

        write_len(&mut out, self.pool.len())?;
        for value in &self.pool {
            match value {
                Value::Unit => out.push(CONST_TAG_UNIT),
                Value::Int(v) => {
                    out.push(CONST_TAG_INT);
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }

        write_len(&mut out, self.code.len())?;
        out.extend_from_slice(&self.code);

        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    /// Decode a chunk from [`Chunk::to_bytes`] output.
    pub fn from_bytes(data: &[u8]) -> ChunkResult<Self> {
        if data.len() < MAGIC.len() + 2 + 4 + 4 + 4 + 4 {
            return Err(ChunkError::Format("too short"));
        }

        let (payload, crc_bytes) = data.split_at(data.len() - 4);
        let found = read_u32(crc_bytes, &mut 0)?;
        let expected = crc32fast::hash(payload);
        if expected != found {
            return Err(ChunkError::HashMismatch { expected, found });
        }

        if &payload[..MAGIC.len()] != MAGIC {
            return Err(ChunkError::Format("bad magic"));
        }
        let mut off = MAGIC.len();

        let version = read_u16(payload, &mut off)?;
        if version != CHUNK_VERSION {
            return Err(ChunkError::Format("unsupported version"));
        }

        let name = read_string(payload, &mut off)?;
        let mut chunk = Chunk::new(name);

        let const_count = read_u32(payload, &mut off)? as usize;
        if const_count > MAX_CONSTANTS {
            return Err(ChunkError::Format("too many constants"));
        }
        for _ in 0..const_count {
            let value = match read_u8(payload, &mut off)? {
                CONST_TAG_UNIT => Value::Unit,
                CONST_TAG_INT => Value::Int(read_i64(payload, &mut off)?),
                _ => return Err(ChunkError::Format("unknown const tag")),
            };
            chunk.add_constant(value)?;
        }

        let code_len = read_u32(payload, &mut off)? as usize;
        let code = read_exact(payload, &mut off, code_len)?;
        chunk.write_bytes(code)?;

        if off != payload.len() {
            return Err(ChunkError::Format("trailing bytes"));
        }

        Ok(chunk)
    }
}

/// Iterator returned by [`Chunk::instructions`].
pub struct Instructions<'a> {
    chunk: &'a Chunk,
    offset: usize,
    failed: bool,
}

impl Iterator for Instructions<'_> {
    type Item = ChunkResult<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.chunk.len() {
            return None;
        }
        match self.chunk.decode_at(self.offset) {
            Ok(ins) => {
                self.offset = ins.next_offset();
                Some(Ok(ins))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Instructions<'_> {}

fn write_len(buf: &mut Vec<u8>, len: usize) -> ChunkResult<()> {
    let len = u32::try_from(len).map_err(|_| ChunkError::Format("length exceeds u32"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> ChunkResult<()> {
    write_len(buf, s.len())?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_u8(data: &[u8], off: &mut usize) -> ChunkResult<u8> {
    let v = *data.get(*off).ok_or(ChunkError::Format("u8 eof"))?;
    *off += 1;
    Ok(v)
}

fn read_u16(data: &[u8], off: &mut usize) -> ChunkResult<u16> {
    let bytes = read_exact(data, off, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], off: &mut usize) -> ChunkResult<u32> {
    let bytes = read_exact(data, off, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_i64(data: &[u8], off: &mut usize) -> ChunkResult<i64> {
    let bytes = read_exact(data, off, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(i64::from_le_bytes(raw))
}

fn read_string(data: &[u8], off: &mut usize) -> ChunkResult<String> {
    let len = read_u32(data, off)? as usize;
    let bytes = read_exact(data, off, len)?;
    let s = core::str::from_utf8(bytes).map_err(|_| ChunkError::Format("utf8"))?;
    Ok(String::from(s))
}

fn read_exact<'a>(data: &'a [u8], off: &mut usize, len: usize) -> ChunkResult<&'a [u8]> {
    let end = off.checked_add(len).ok_or(ChunkError::Format("overflow"))?;
    if end > data.len() {
        return Err(ChunkError::Format("slice eof"));
    }
    let slice = &data[*off..end];
    *off = end;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Chunk {
        let mut chunk = Chunk::new("sample");
        chunk.emit_constant(Value::Int(10)).unwrap();
        chunk.emit_constant(Value::Unit).unwrap();
        chunk.write_opcode(Opcode::Add).unwrap();
        chunk.write_opcode(Opcode::Return).unwrap();
        chunk
    }

    #[test]
    fn writer_layout() {
        let mut chunk = Chunk::new("main");
        let idx = chunk.add_constant(Value::Int(10)).unwrap();
        chunk.write_opcode(Opcode::Const).unwrap();
        chunk.write_byte(idx).unwrap();
        chunk.write_opcode(Opcode::Return).unwrap();

        assert_eq!(chunk.code(), &[0x01, 0x00, 0x00]);
        assert_eq!(chunk.constants(), &[Value::Int(10)]);
        assert_eq!(chunk.name(), "main");
    }

    #[test]
    fn constant_indices_are_sequential() {
        let mut chunk = Chunk::new("c");
        assert_eq!(chunk.add_constant(Value::Int(1)).unwrap(), 0);
        assert_eq!(chunk.add_constant(Value::Int(1)).unwrap(), 1);
        assert_eq!(chunk.get_constant(1).unwrap(), Value::Int(1));
    }

    #[test]
    fn pool_caps_at_256_entries() {
        let mut chunk = Chunk::new("big");
        for i in 0..MAX_CONSTANTS {
            let idx = chunk.add_constant(Value::Int(i as i64)).unwrap();
            assert_eq!(usize::from(idx), i);
        }
        assert_eq!(chunk.add_constant(Value::Int(256)), Err(ChunkError::ConstantPoolOverflow));
        assert_eq!(chunk.constants().len(), MAX_CONSTANTS);
        assert_eq!(chunk.get_constant(255).unwrap(), Value::Int(255));
    }

    #[test]
    fn get_constant_out_of_range() {
        let mut chunk = Chunk::new("c");
        chunk.add_constant(Value::Int(3)).unwrap();
        assert_eq!(
            chunk.get_constant(1),
            Err(ChunkError::ConstantIndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn reset_clears_buffers_and_keeps_name() {
        let mut chunk = sample();
        chunk.reset();
        assert!(chunk.is_empty());
        assert!(chunk.constants().is_empty());
        assert_eq!(chunk.name(), "sample");

        chunk.emit_constant(Value::Int(1)).unwrap();
        assert_eq!(chunk.code(), &[0x01, 0x00]);
    }

    #[test]
    fn decode_walks_the_stream() {
        let chunk = sample();
        let decoded: Vec<Instruction> = chunk.instructions().collect::<Result<_, _>>().unwrap();
        let shape: Vec<(usize, Opcode, Option<u8>)> =
            decoded.iter().map(|i| (i.offset, i.opcode, i.operand)).collect();
        assert_eq!(
            shape,
            vec![
                (0, Opcode::Const, Some(0)),
                (2, Opcode::Const, Some(1)),
                (4, Opcode::Add, None),
                (5, Opcode::Return, None),
            ]
        );
    }

    #[test]
    fn decode_reports_unknown_and_truncated() {
        let mut chunk = Chunk::new("bad");
        chunk.write_byte(0x42).unwrap();
        assert_eq!(chunk.decode_at(0), Err(ChunkError::UnknownOpcode { offset: 0, byte: 0x42 }));

        let mut chunk = Chunk::new("cut");
        chunk.write_opcode(Opcode::Return).unwrap();
        chunk.write_opcode(Opcode::Const).unwrap();
        let err = chunk.decode_at(1).unwrap_err();
        assert_eq!(
            err,
            ChunkError::Truncated { offset: 1, opcode: Opcode::Const, expected: 1, found: 0 }
        );
        assert!(err.is_malformed());

        let all: Vec<_> = chunk.instructions().collect();
        assert_eq!(all.len(), 2);
        assert!(all[1].is_err());

        assert_eq!(chunk.decode_at(2), Err(ChunkError::OffsetOutOfBounds { offset: 2, len: 2 }));
    }

    #[test]
    fn binary_roundtrip() {
        let chunk = sample();
        let bytes = chunk.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"EMBC");
        assert_eq!(Chunk::from_bytes(&bytes).unwrap(), chunk);
    }

    #[test]
    fn binary_rejects_corruption() {
        let mut bytes = sample().to_bytes().unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(Chunk::from_bytes(&bytes), Err(ChunkError::HashMismatch { .. })));

        assert_eq!(Chunk::from_bytes(b"EMBC"), Err(ChunkError::Format("too short")));
    }

    #[test]
    fn binary_rejects_bad_magic() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[0] = b'X';
        let len = bytes.len();
        let crc = crc32fast::hash(&bytes[..len - 4]);
        bytes[len - 4..].copy_from_slice(&crc.to_le_bytes());
        assert_eq!(Chunk::from_bytes(&bytes), Err(ChunkError::Format("bad magic")));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn container_lengths_past_u32_are_refused() {
        let mut buf = Vec::new();
        let too_long = u32::MAX as usize + 1;
        assert_eq!(write_len(&mut buf, too_long), Err(ChunkError::Format("length exceeds u32")));
        assert!(buf.is_empty());

        assert_eq!(write_len(&mut buf, u32::MAX as usize), Ok(()));
        assert_eq!(buf, u32::MAX.to_le_bytes());
    }
}
