//! Small assembly language used by the CLI and the tests to build chunks.
//!
//! ```text
//! ; (10 - 3) * 2
//! .name main
//! CONST 10
//! CONST 3
//! SUB
//! CONST 2
//! MUL
//! RETURN
//! ```
//!
//! Additional forms:
//! - `.const <lit>` adds a constant without emitting an opcode.
//! - `CONST [<n>]` emits a raw pool index (nothing is added to the pool).
//! - Literals are decimal integers or `none`.
//! - `;` starts a comment, anywhere on the line.

use thiserror::Error;

use crate::bytecode::{
    chunk::{Chunk, ChunkError},
    opcode::Opcode,
    value::Value,
};

/// Assembly failure, tagged with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct AsmError {
    /// Source line of the failing statement.
    pub line: usize,
    /// What went wrong.
    pub kind: AsmErrorKind,
}

/// Reasons an assembly line is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmErrorKind {
    /// Mnemonic or directive not recognised.
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    /// Operand is not an integer, `none` or `[index]`.
    #[error("invalid literal `{0}`")]
    InvalidLiteral(String),
    /// Instruction needs an operand that was not given.
    #[error("`{0}` expects an operand")]
    MissingOperand(&'static str),
    /// Operand given to an instruction that takes none.
    #[error("`{0}` takes no operand")]
    UnexpectedOperand(&'static str),
    /// Writer rejected the statement (pool overflow, allocation).
    #[error(transparent)]
    Chunk(#[from] ChunkError),
}

/// Assemble `source` into a [`Chunk`] labelled `name` (overridable with `.name`).
pub fn assemble(source: &str, name: &str) -> Result<Chunk, AsmError> {
    let mut chunk = Chunk::new(name);

    for (idx, raw_line) in source.lines().enumerate() {
        let line = idx + 1;
        let text = raw_line.split(';').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }
        assemble_line(&mut chunk, text).map_err(|kind| AsmError { line, kind })?;
    }

    Ok(chunk)
}

fn assemble_line(chunk: &mut Chunk, text: &str) -> Result<(), AsmErrorKind> {
    let (head, rest) = match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    };

    match head {
        ".name" => {
            if rest.is_empty() {
                return Err(AsmErrorKind::MissingOperand(".name"));
            }
            chunk.set_name(rest);
        }
        ".const" => {
            let value = parse_literal(rest, ".const")?;
            chunk.add_constant(value)?;
        }
        _ => {
            let op = Opcode::from_name(head)
                .ok_or_else(|| AsmErrorKind::UnknownInstruction(head.to_string()))?;
            match op {
                Opcode::Const => {
                    if let Some(index) = parse_raw_index(rest)? {
                        chunk.write_opcode(Opcode::Const)?;
                        chunk.write_byte(index)?;
                    } else {
                        chunk.emit_constant(parse_literal(rest, op.name())?)?;
                    }
                }
                _ if !rest.is_empty() => return Err(AsmErrorKind::UnexpectedOperand(op.name())),
                _ => chunk.write_opcode(op)?,
            }
        }
    }
    Ok(())
}

fn parse_literal(text: &str, what: &'static str) -> Result<Value, AsmErrorKind> {
    if text.is_empty() {
        return Err(AsmErrorKind::MissingOperand(what));
    }
    if text.eq_ignore_ascii_case("none") {
        return Ok(Value::Unit);
    }
    text.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| AsmErrorKind::InvalidLiteral(text.to_string()))
}

fn parse_raw_index(text: &str) -> Result<Option<u8>, AsmErrorKind> {
    let Some(inner) = text.strip_prefix('[') else { return Ok(None) };
    let inner = inner
        .strip_suffix(']')
        .ok_or_else(|| AsmErrorKind::InvalidLiteral(text.to_string()))?;
    inner
        .trim()
        .parse::<u8>()
        .map(Some)
        .map_err(|_| AsmErrorKind::InvalidLiteral(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assembles_arithmetic() {
        let src = "\
; (10 - 3) * 2
.name calc
CONST 10
CONST 3   ; rhs
sub
CONST 2
MUL
RETURN
";
        let chunk = assemble(src, "fallback").unwrap();
        assert_eq!(chunk.name(), "calc");
        assert_eq!(chunk.constants(), &[Value::Int(10), Value::Int(3), Value::Int(2)]);
        assert_eq!(chunk.code(), &[0x01, 0, 0x01, 1, 0x04, 0x01, 2, 0x05, 0x00]);
    }

    #[test]
    fn raw_index_and_const_directive() {
        let chunk = assemble(".const none\n.const -5\nCONST [1]\nRETURN", "raw").unwrap();
        assert_eq!(chunk.name(), "raw");
        assert_eq!(chunk.constants(), &[Value::Unit, Value::Int(-5)]);
        assert_eq!(chunk.code(), &[0x01, 1, 0x00]);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = assemble("CONST 1\nJUMP 4", "e").unwrap_err();
        assert_eq!(err, AsmError { line: 2, kind: AsmErrorKind::UnknownInstruction("JUMP".into()) });
        assert_eq!(err.to_string(), "line 2: unknown instruction `JUMP`");

        let err = assemble("\n\nCONST", "e").unwrap_err();
        assert_eq!(err, AsmError { line: 3, kind: AsmErrorKind::MissingOperand("CONST") });

        let err = assemble("ADD 1", "e").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnexpectedOperand("ADD"));

        let err = assemble("CONST ten", "e").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::InvalidLiteral("ten".into()));

        let err = assemble("CONST [300]", "e").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::InvalidLiteral("[300]".into()));
    }

    #[test]
    fn pool_overflow_surfaces_at_the_offending_line() {
        let src = ".const 0\n".repeat(256) + "CONST 1\n";
        let err = assemble(&src, "big").unwrap_err();
        assert_eq!(err, AsmError { line: 257, kind: AsmErrorKind::Chunk(ChunkError::ConstantPoolOverflow) });
    }
}
