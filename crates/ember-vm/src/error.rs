use std::io;

use ember_core::{ChunkError, Opcode};
use thiserror::Error;

/// Result alias for VM operations.
pub type VmResult<T> = std::result::Result<T, VmError>;

/// Execution failures. Each one halts the current run.
#[derive(Debug, Error)]
pub enum VmError {
    /// The instruction stream could not be decoded, or a `CONST` operand
    /// points past the constant pool.
    #[error("at offset {offset:08}: {source}")]
    Chunk {
        /// Offset of the faulting instruction.
        offset: usize,
        /// Decoding or lookup failure.
        #[source]
        source: ChunkError,
    },

    /// Execution walked off the end of the code without a `RETURN`.
    #[error("at offset {offset:08}: reached end of code without RETURN")]
    EndOfCode {
        /// Code length, i.e. where the instruction pointer stopped.
        offset: usize,
    },

    /// Pop on an empty stack.
    #[error("at offset {offset:08}: stack underflow in {opcode}")]
    StackUnderflow {
        /// Offset of the faulting instruction.
        offset: usize,
        /// Instruction that popped.
        opcode: Opcode,
    },

    /// Push past the configured stack limit.
    #[error("at offset {offset:08}: stack overflow (limit {limit})")]
    StackOverflow {
        /// Offset of the faulting instruction.
        offset: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Arithmetic on a non-integer operand.
    #[error("at offset {offset:08}: {opcode} expects int operands, found {found}")]
    TypeMismatch {
        /// Offset of the faulting instruction.
        offset: usize,
        /// Arithmetic instruction.
        opcode: Opcode,
        /// Type name of the offending value.
        found: &'static str,
    },

    /// `DIV` with a zero divisor.
    #[error("at offset {offset:08}: division by zero")]
    DivisionByZero {
        /// Offset of the faulting instruction.
        offset: usize,
    },

    /// Result does not fit in an `i64`.
    #[error("at offset {offset:08}: integer overflow in {opcode}")]
    ArithmeticOverflow {
        /// Offset of the faulting instruction.
        offset: usize,
        /// Arithmetic instruction.
        opcode: Opcode,
    },

    /// Growing the stack or the chunk table failed.
    #[error("out of memory while growing the {0}")]
    OutOfMemory(&'static str),

    /// No chunk is loaded at this index.
    #[error("no chunk loaded at index {index}")]
    UnknownChunk {
        /// Requested index.
        index: usize,
    },

    /// Writing to the output sink failed.
    #[error("output: {0}")]
    Io(#[from] io::Error),
}

impl VmError {
    /// Offset of the instruction that failed, when the error comes from one.
    pub const fn offset(&self) -> Option<usize> {
        match self {
            VmError::Chunk { offset, .. }
            | VmError::EndOfCode { offset }
            | VmError::StackUnderflow { offset, .. }
            | VmError::StackOverflow { offset, .. }
            | VmError::TypeMismatch { offset, .. }
            | VmError::DivisionByZero { offset }
            | VmError::ArithmeticOverflow { offset, .. } => Some(*offset),
            VmError::OutOfMemory(_) | VmError::UnknownChunk { .. } | VmError::Io(_) => None,
        }
    }

    /// True for decode failures (unknown opcode, truncated instruction).
    pub const fn is_malformed_chunk(&self) -> bool {
        match self {
            VmError::Chunk { source, .. } => source.is_malformed(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn messages_carry_the_offset() {
        let e = VmError::StackUnderflow { offset: 4, opcode: Opcode::Return };
        assert_eq!(e.to_string(), "at offset 00000004: stack underflow in RETURN");
        assert_eq!(e.offset(), Some(4));

        let e = VmError::Chunk { offset: 2, source: ChunkError::ConstantIndexOutOfRange { index: 9, len: 1 } };
        assert_eq!(e.to_string(), "at offset 00000002: constant index 9 out of range (pool holds 1)");
        assert!(!e.is_malformed_chunk());

        let e = VmError::Chunk { offset: 0, source: ChunkError::UnknownOpcode { offset: 0, byte: 0x7F } };
        assert!(e.is_malformed_chunk());
        assert_eq!(VmError::UnknownChunk { index: 3 }.offset(), None);
    }
}
