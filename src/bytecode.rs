use std::fmt::Write;

use crate::{object::Heap, value::Value};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Pop,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Return,
    Sentinel,
}

impl OpCode {
    fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Return => "OP_RETURN",
            OpCode::Sentinel => "OP_SENTINEL",
        }
    }

    /// Whether the opcode is followed by a one-byte constant index.
    fn has_constant_operand(&self) -> bool {
        matches!(
            self,
            OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal
        )
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> u8 {
        value as u8
    }
}

#[derive(Debug, thiserror::Error)]
#[error(
    "Invalid byte {0} found when expecting OpCode value between 0 and {}",
    OpCode::Sentinel as u8
)]
pub struct OpCodeFromU8Error(u8);

impl TryFrom<u8> for OpCode {
    type Error = OpCodeFromU8Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < OpCode::Sentinel as u8 {
            // SAFETY: `OpCode` is `repr(u8)` with contiguous discriminants
            // starting at zero, and `value` is below the last one.
            Ok(unsafe { std::mem::transmute::<u8, OpCode>(value) })
        } else {
            Err(OpCodeFromU8Error(value))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("Too many constants in one chunk.")]
    TooManyConstants,
}

/// Bytecode for one unit of source, with a line number for every byte.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Chunk {
    code: Vec<u8>,
    lines: Vec<usize>,
    constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get_bytecode(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    pub fn add_bytecode(&mut self, byte: impl Into<u8>, line: usize) {
        self.code.push(byte.into());
        self.lines.push(line);
    }

    /// Source line of the byte at `offset`, or 0 past the end of the code.
    pub fn line(&self, offset: usize) -> usize {
        self.lines.get(offset).copied().unwrap_or_default()
    }

    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    pub fn get_constant(&self, index: u8) -> Option<Value> {
        self.constants.get(index as usize).copied()
    }

    /// Appends `value` to the constant pool and returns its index.
    pub fn add_constant(&mut self, value: Value) -> Result<u8, ChunkError> {
        let index =
            u8::try_from(self.constants.len()).map_err(|_| ChunkError::TooManyConstants)?;
        self.constants.push(value);
        Ok(index)
    }

    pub fn disassemble(&self, name: &str, heap: &Heap) -> String {
        let mut out = format!("== {} ==\n", name);

        let mut offset = 0;
        while offset < self.code.len() {
            offset = self.disassemble_instruction(offset, heap, &mut out);
        }
        out
    }

    /// Appends one instruction to `out` and returns the offset of the next.
    pub fn disassemble_instruction(&self, offset: usize, heap: &Heap, out: &mut String) -> usize {
        let _ = write!(out, "{:04} ", offset);

        if offset > 0 && self.lines[offset] == self.lines[offset - 1] {
            out.push_str("   | ");
        } else {
            let _ = write!(out, "{:4} ", self.lines[offset]);
        }

        let byte = self.code[offset];
        let Ok(instruction) = OpCode::try_from(byte) else {
            let _ = writeln!(out, "Unknown opcode {}", byte);
            return offset + 1;
        };

        if !instruction.has_constant_operand() {
            let _ = writeln!(out, "{}", instruction.name());
            return offset + 1;
        }

        let Some(&constant) = self.code.get(offset + 1) else {
            let _ = writeln!(out, "{:<16} <missing operand>", instruction.name());
            return offset + 1;
        };
        match self.get_constant(constant) {
            Some(value) => {
                let _ = writeln!(
                    out,
                    "{:<16} {:4} '{}'",
                    instruction.name(),
                    constant,
                    value.display(heap)
                );
            }
            None => {
                let _ = writeln!(out, "{:<16} {:4} <invalid>", instruction.name(), constant);
            }
        }
        offset + 2
    }
}
