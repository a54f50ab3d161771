//! Helper validations reused by tooling.

use crate::bytecode::chunk::{Chunk, ChunkError, MAX_CONSTANTS};
use crate::ChunkResult;

/// Basic structural validation of a chunk.
///
/// Every opcode byte must decode, every operand must be present and every
/// `CONST` must reference an existing pool slot. The first fault found is
/// returned. Chunks built by deserialization skip the writer's pool cap, so
/// the pool length is checked too.
pub fn validate_chunk(chunk: &Chunk) -> ChunkResult<()> {
    if chunk.constants().len() > MAX_CONSTANTS {
        return Err(ChunkError::ConstantPoolOverflow);
    }

    for ins in chunk.instructions() {
        let ins = ins?;
        if let Some(index) = ins.operand {
            chunk.get_constant(index)?;
        }
    }
    Ok(())
}
