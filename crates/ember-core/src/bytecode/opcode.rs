use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Closed instruction set.
///
/// The discriminant is the on-wire byte and must stay stable: chunks
/// persisted with [`Chunk::to_bytes`](crate::Chunk::to_bytes) store it as is.
///
/// | op     | byte | operands |
/// |--------|------|----------|
/// | RETURN | 0x00 | 0        |
/// | CONST  | 0x01 | 1        |
/// | NEGATE | 0x02 | 0        |
/// | ADD    | 0x03 | 0        |
/// | SUB    | 0x04 | 0        |
/// | MUL    | 0x05 | 0        |
/// | DIV    | 0x06 | 0        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Opcode {
    /// Pop the top of the stack, emit it and stop the current run.
    Return = 0x00,
    /// Push `pool[operand]`. Operand: u8 constant index.
    Const = 0x01,
    /// Pop one integer, push its negation.
    Negate = 0x02,
    /// Pop two integers, push their sum.
    Add = 0x03,
    /// Pop two integers, push their difference.
    Sub = 0x04,
    /// Pop two integers, push their product.
    Mul = 0x05,
    /// Pop two integers, push their truncated quotient.
    Div = 0x06,
}

impl Opcode {
    /// Every opcode, in encoding order.
    pub const ALL: [Opcode; 7] = [
        Opcode::Return,
        Opcode::Const,
        Opcode::Negate,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
    ];

    /// Decode an opcode byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Opcode::Return),
            0x01 => Some(Opcode::Const),
            0x02 => Some(Opcode::Negate),
            0x03 => Some(Opcode::Add),
            0x04 => Some(Opcode::Sub),
            0x05 => Some(Opcode::Mul),
            0x06 => Some(Opcode::Div),
            _ => None,
        }
    }

    /// Encoded byte.
    pub const fn as_byte(self) -> u8 { self as u8 }

    /// Number of operand bytes following the opcode byte.
    ///
    /// This is the only arity table; the writer, the disassembler and the VM
    /// all go through it.
    pub const fn operand_len(self) -> usize {
        match self {
            Opcode::Const => 1,
            Opcode::Return
            | Opcode::Negate
            | Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div => 0,
        }
    }

    /// Total encoded size of an instruction with this opcode.
    pub const fn encoded_len(self) -> usize { 1 + self.operand_len() }

    /// Canonical upper-case name, as printed by the disassembler.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Return => "RETURN",
            Opcode::Const => "CONST",
            Opcode::Negate => "NEGATE",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
        }
    }

    /// Case-insensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// True for the four two-operand arithmetic instructions.
    pub const fn is_binary(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> { Self::from_byte(byte).ok_or(byte) }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self { op.as_byte() }
}
