//! Bytecode primitives: runtime values, the opcode table, chunks and the
//! text tooling around them (assembler, disassembler, validation).
//!
//! Both the disassembler and the VM decode through [`Chunk::decode_at`], so
//! operand arity lives in exactly one place ([`Opcode::operand_len`]).

/// Runtime values.
pub mod value;
/// Instruction set and its byte encoding.
pub mod opcode;
/// Chunk representation plus binary roundtrip helpers.
pub mod chunk;
pub mod helpers;
pub mod disasm;
pub mod asm;

pub use asm::{AsmError, AsmErrorKind};
pub use chunk::{Chunk, ChunkError, Instruction, MAX_CONSTANTS};
pub use opcode::Opcode;
pub use value::Value;
