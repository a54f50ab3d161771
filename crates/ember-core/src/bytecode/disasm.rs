//! Textual disassembly of a chunk's instruction stream.
//!
//! Output format (one line per instruction, offsets zero-padded to 8 digits):
//!
//! ```text
//! === main ===
//! 00000000 CONST [0]; 10
//! 00000002 RETURN
//! ```

use core::fmt::Write;

use crate::bytecode::chunk::{Chunk, Instruction};
use crate::bytecode::opcode::Opcode;
use crate::ChunkResult;

/// Disassemble the whole chunk, header included.
///
/// Stops at the first malformed instruction and returns its error; nothing
/// past the end of the code is ever read.
pub fn disassemble_chunk(chunk: &Chunk) -> ChunkResult<String> {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", chunk.name());

    let mut offset = 0;
    while offset < chunk.len() {
        let (line, next) = disassemble_instruction(chunk, offset)?;
        out.push_str(&line);
        offset = next;
    }
    Ok(out)
}

/// Disassemble the single instruction at `offset`.
///
/// Returns the rendered line (newline-terminated) and the offset of the next
/// instruction.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> ChunkResult<(String, usize)> {
    let ins = chunk.decode_at(offset)?;
    let mut line = format_instruction(chunk, &ins)?;
    line.push('\n');
    Ok((line, ins.next_offset()))
}

/// Render an already decoded instruction, without trailing newline.
pub fn format_instruction(chunk: &Chunk, ins: &Instruction) -> ChunkResult<String> {
    match (ins.opcode, ins.operand) {
        (Opcode::Const, Some(index)) => {
            let value = chunk.get_constant(index)?;
            Ok(format!("{:08} {} [{index}]; {value}", ins.offset, ins.opcode))
        }
        (op, _) => Ok(format!("{:08} {op}", ins.offset)),
    }
}
