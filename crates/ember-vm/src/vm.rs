use std::fmt::Write as _;
use std::io::{self, Write};

use ember_core::disasm::{disassemble_chunk, format_instruction};
use ember_core::{Chunk, ChunkError, Instruction, Opcode, Value};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::error::{VmError, VmResult};

/// Execution knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VmConfig {
    /// Before each instruction, write the stack and the decoded instruction
    /// to the output sink.
    pub trace_execution: bool,
    /// Maximum stack depth; `None` leaves the stack unbounded.
    pub stack_limit: Option<usize>,
}

/// Where the VM is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VmState {
    /// Nothing executed yet.
    #[default]
    Idle,
    /// Inside the fetch/decode/execute loop.
    Running,
    /// Last run reached `RETURN`.
    Halted,
    /// Last run stopped on an error.
    Failed,
}

/// Point-in-time copy of the VM registers and stack.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snapshot {
    /// Lifecycle state.
    pub state: VmState,
    /// Index of the chunk last executed.
    pub current_chunk: Option<usize>,
    /// Instruction pointer.
    pub ip: usize,
    /// Operand stack, bottom first.
    pub stack: Vec<Value>,
}

/// Stack-based bytecode interpreter.
///
/// Chunks handed to [`Vm::interpret`] are kept for the lifetime of the VM.
/// The operand stack is not cleared between runs: values left below the one
/// popped by `RETURN` stay visible through [`Vm::trace`]. An instruction that
/// fails leaves the stack as it was before that instruction.
pub struct Vm {
    config: VmConfig,
    chunks: Vec<Chunk>,
    stack: Vec<Value>,
    current_chunk: Option<usize>,
    ip: usize,
    state: VmState,
    out: Box<dyn Write + Send>,
}

impl Default for Vm {
    fn default() -> Self { Self::new() }
}

impl Vm {
    /// VM writing to the real stdout, default configuration.
    pub fn new() -> Self { Self::with_config(VmConfig::default()) }

    /// VM writing to stdout with the given configuration.
    pub fn with_config(config: VmConfig) -> Self { Self::with_output(config, io::stdout()) }

    /// VM writing to a custom sink (buffer, file, [`Captured`](crate::Captured)…).
    pub fn with_output<W: Write + Send + 'static>(config: VmConfig, out: W) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            stack: Vec::new(),
            current_chunk: None,
            ip: 0,
            state: VmState::Idle,
            out: Box::new(out),
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &VmConfig { &self.config }

    /// Lifecycle state.
    pub const fn state(&self) -> VmState { self.state }

    /// Operand stack, bottom first.
    pub fn stack(&self) -> &[Value] { &self.stack }

    /// Every chunk loaded so far, in load order.
    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    /// Index of the chunk last executed.
    pub const fn current_chunk(&self) -> Option<usize> { self.current_chunk }

    /// Instruction pointer (byte offset into the current chunk).
    pub const fn ip(&self) -> usize { self.ip }

    /// Take ownership of `chunk`, then execute it from offset 0 until
    /// `RETURN` or the first error.
    ///
    /// The returned value is the one `RETURN` popped; it is also written to
    /// the output sink followed by a newline.
    #[instrument(level = "debug", skip_all, fields(chunk = %chunk.name(), len = chunk.len()))]
    pub fn interpret(&mut self, chunk: Chunk) -> VmResult<Value> {
        self.chunks.try_reserve(1).map_err(|_| VmError::OutOfMemory("chunk table"))?;
        self.chunks.push(chunk);
        let index = self.chunks.len() - 1;
        self.current_chunk = Some(index);
        self.ip = 0;
        self.run(index)
    }

    /// Render the stack bottom to top, one `{index:08} {value}` line per entry.
    pub fn trace(&self) -> String {
        let mut out = String::new();
        for (i, value) in self.stack.iter().enumerate() {
            let _ = writeln!(out, "{i:08} {value}");
        }
        out
    }

    /// Disassemble a loaded chunk.
    pub fn disassemble(&self, index: usize) -> VmResult<String> {
        let chunk = self.chunks.get(index).ok_or(VmError::UnknownChunk { index })?;
        disassemble_chunk(chunk).map_err(|source| VmError::Chunk { offset: 0, source })
    }

    /// Copy of the registers and stack.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            current_chunk: self.current_chunk,
            ip: self.ip,
            stack: self.stack.clone(),
        }
    }

    fn run(&mut self, index: usize) -> VmResult<Value> {
        self.state = VmState::Running;
        match self.execute(index) {
            Ok(value) => {
                self.state = VmState::Halted;
                debug!(%value, "halted");
                Ok(value)
            }
            Err(e) => {
                self.state = VmState::Failed;
                debug!(error = %e, ip = self.ip, "run failed");
                Err(e)
            }
        }
    }

    fn execute(&mut self, index: usize) -> VmResult<Value> {
        loop {
            let offset = self.ip;
            let ins = self.fetch(index)?;
            trace!(offset, op = %ins.opcode, "exec");
            if self.config.trace_execution {
                self.write_trace(index, &ins)?;
            }
            self.ip = ins.next_offset();

            match ins.opcode {
                Opcode::Const => {
                    let Some(slot) = ins.operand else {
                        return Err(VmError::Chunk {
                            offset,
                            source: ChunkError::Truncated { offset, opcode: ins.opcode, expected: 1, found: 0 },
                        });
                    };
                    let value = self.chunks[index]
                        .get_constant(slot)
                        .map_err(|source| VmError::Chunk { offset, source })?;
                    self.push(value, offset)?;
                }
                Opcode::Negate => {
                    let v = self.peek_int(0, offset, ins.opcode)?;
                    let negated = v
                        .checked_neg()
                        .ok_or(VmError::ArithmeticOverflow { offset, opcode: ins.opcode })?;
                    self.replace_top(1, Value::Int(negated));
                }
                Opcode::Add => self.binary(offset, ins.opcode, i64::checked_add)?,
                Opcode::Sub => self.binary(offset, ins.opcode, i64::checked_sub)?,
                Opcode::Mul => self.binary(offset, ins.opcode, i64::checked_mul)?,
                Opcode::Div => {
                    let (lhs, rhs) = self.peek_operands(offset, ins.opcode)?;
                    if rhs == 0 {
                        return Err(VmError::DivisionByZero { offset });
                    }
                    // checked_div truncates toward zero; it only fails on MIN / -1.
                    let quotient = lhs
                        .checked_div(rhs)
                        .ok_or(VmError::ArithmeticOverflow { offset, opcode: ins.opcode })?;
                    self.replace_top(2, Value::Int(quotient));
                }
                Opcode::Return => {
                    let value = self.pop(offset, ins.opcode)?;
                    writeln!(self.out, "{value}")?;
                    self.out.flush()?;
                    return Ok(value);
                }
            }
        }
    }

    fn fetch(&self, index: usize) -> VmResult<Instruction> {
        let chunk = &self.chunks[index];
        if self.ip >= chunk.len() {
            return Err(VmError::EndOfCode { offset: self.ip });
        }
        chunk.decode_at(self.ip).map_err(|source| VmError::Chunk { offset: self.ip, source })
    }

    fn write_trace(&mut self, index: usize, ins: &Instruction) -> VmResult<()> {
        let line = format_instruction(&self.chunks[index], ins)
            .map_err(|source| VmError::Chunk { offset: ins.offset, source })?;
        let stack = self.trace();
        write!(self.out, "{stack}")?;
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    fn push(&mut self, value: Value, offset: usize) -> VmResult<()> {
        if let Some(limit) = self.config.stack_limit {
            if self.stack.len() >= limit {
                return Err(VmError::StackOverflow { offset, limit });
            }
        }
        self.stack.try_reserve(1).map_err(|_| VmError::OutOfMemory("operand stack"))?;
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, offset: usize, opcode: Opcode) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow { offset, opcode })
    }

    /// Int at `depth` below the top, left in place.
    fn peek_int(&self, depth: usize, offset: usize, opcode: Opcode) -> VmResult<i64> {
        let slot = self
            .stack
            .len()
            .checked_sub(depth + 1)
            .ok_or(VmError::StackUnderflow { offset, opcode })?;
        match self.stack[slot] {
            Value::Int(v) => Ok(v),
            other => Err(VmError::TypeMismatch { offset, opcode, found: other.type_name() }),
        }
    }

    /// Top of stack is the right-hand operand, the value beneath it the left.
    /// Both are checked before either is consumed.
    fn peek_operands(&self, offset: usize, opcode: Opcode) -> VmResult<(i64, i64)> {
        if self.stack.len() < 2 {
            return Err(VmError::StackUnderflow { offset, opcode });
        }
        let lhs = self.peek_int(1, offset, opcode)?;
        let rhs = self.peek_int(0, offset, opcode)?;
        Ok((lhs, rhs))
    }

    /// Drop the `consumed` topmost values and push `result` in their place.
    /// Never grows the stack.
    fn replace_top(&mut self, consumed: usize, result: Value) {
        self.stack.truncate(self.stack.len() - consumed);
        self.stack.push(result);
    }

    fn binary(&mut self, offset: usize, opcode: Opcode, op: fn(i64, i64) -> Option<i64>) -> VmResult<()> {
        let (lhs, rhs) = self.peek_operands(offset, opcode)?;
        let result = op(lhs, rhs).ok_or(VmError::ArithmeticOverflow { offset, opcode })?;
        self.replace_top(2, Value::Int(result));
        Ok(())
    }
}
