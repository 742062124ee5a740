mod stack;

use std::{cell::RefCell, io::Write, rc::Rc};

use tracing::debug;

use crate::{
    bytecode::{Chunk, OpCode, OpCodeFromU8Error},
    compiler::{self, CompileError},
    object::{Heap, ObjRef},
    table::Table,
    value::Value,
};

use self::stack::Stack;

/// Outcome of one `interpret` call, as seen by an embedding harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    #[error("{0}")]
    Compile(#[from] CompileError),
    #[error("{source}\n[line {line}] in script\n")]
    Runtime { line: usize, source: RuntimeError },
}

impl InterpretError {
    pub fn status(&self) -> InterpretResult {
        match self {
            InterpretError::Compile(_) => InterpretResult::CompileError,
            InterpretError::Runtime { .. } => InterpretResult::RuntimeError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to read instruction")]
    OpCodeFromU8(#[from] OpCodeFromU8Error),
    #[error("Operand must be a number.")]
    NegateNonNumber,
    #[error("Operands must be numbers.")]
    NonNumberOperands,
    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Bytecode ended without a return.")]
    MissingReturn,
    #[error("Invalid constant index {0}.")]
    InvalidConstant(u8),
    #[error("Global name constant is not a string.")]
    NonStringGlobalName,
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

struct Execution<'a> {
    chunk: &'a Chunk,
    ip: usize,
}

impl Execution<'_> {
    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let byte = self
            .chunk
            .get_bytecode(self.ip)
            .ok_or(RuntimeError::MissingReturn)?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_constant(&mut self) -> Result<Value, RuntimeError> {
        let index = self.read_byte()?;
        self.chunk
            .get_constant(index)
            .ok_or(RuntimeError::InvalidConstant(index))
    }

    fn read_string(&mut self) -> Result<ObjRef, RuntimeError> {
        self.read_constant()?
            .as_object()
            .ok_or(RuntimeError::NonStringGlobalName)
    }

    /// Line of the instruction currently executing.
    fn line(&self) -> usize {
        self.chunk.line(self.ip.saturating_sub(1))
    }
}

/// One interpreter session: the operand stack, globals, and every heap object
/// allocated while it is alive.
pub struct Vm {
    stack: Stack,
    globals: Table,
    heap: Heap,
    stdout: Rc<RefCell<dyn Write>>,
    stderr: Rc<RefCell<dyn Write>>,
}

impl Vm {
    pub fn new(stdout: Rc<RefCell<dyn Write>>, stderr: Rc<RefCell<dyn Write>>) -> Self {
        debug!("creating session");
        Self {
            stack: Stack::new(),
            globals: Table::new(),
            heap: Heap::new(),
            stdout,
            stderr,
        }
    }

    /// A session printing to the process's standard output and error.
    pub fn with_stdio() -> Self {
        Self::new(
            Rc::new(RefCell::new(std::io::stdout())),
            Rc::new(RefCell::new(std::io::stderr())),
        )
    }

    /// Compiles `source` and, when that succeeds, runs it against this
    /// session. Diagnostics are written to the error channel before returning.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        debug!(len = source.len(), "interpreting source");

        let chunk = match compiler::compile(source, &mut self.heap) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(errors = e.diagnostics.len(), "compilation failed");
                self.report(&e);
                return Err(e.into());
            }
        };
        debug!(
            bytes = chunk.len(),
            constants = chunk.constants().len(),
            "compiled chunk"
        );

        let mut execution = Execution {
            chunk: &chunk,
            ip: 0,
        };
        if let Err(source) = self.run(&mut execution) {
            let error = InterpretError::Runtime {
                line: execution.line(),
                source,
            };
            debug!(%error, "runtime error");
            self.stack.reset();
            self.report(&error);
            return Err(error);
        }
        Ok(())
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Looks up a global by name without interning `name`.
    pub fn global(&self, name: &str) -> Option<Value> {
        let key = self
            .heap
            .find_interned(name, crate::object::hash_string(name))?;
        self.globals.get(key)
    }

    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    fn report(&self, error: &dyn std::fmt::Display) {
        // Nothing sensible is left to do if the error channel itself fails.
        let _ = write!(self.stderr.borrow_mut(), "{}", error);
    }

    fn run(&mut self, execution: &mut Execution<'_>) -> Result<(), RuntimeError> {
        loop {
            #[cfg(feature = "trace")]
            {
                let mut instruction = String::new();
                execution
                    .chunk
                    .disassemble_instruction(execution.ip, &self.heap, &mut instruction);
                tracing::trace!("{}", self.stack.render(&self.heap));
                tracing::trace!("{}", instruction.trim_end());
            }

            match OpCode::try_from(execution.read_byte()?)? {
                OpCode::Constant => {
                    let constant = execution.read_constant()?;
                    self.stack.push(constant)?;
                }
                OpCode::Nil => self.stack.push(Value::Nil)?,
                OpCode::True => self.stack.push(Value::Boolean(true))?,
                OpCode::False => self.stack.push(Value::Boolean(false))?,
                OpCode::Pop => {
                    self.stack.pop();
                }
                OpCode::GetGlobal => {
                    let name = execution.read_string()?;
                    let Some(value) = self.globals.get(name) else {
                        return Err(self.undefined(name));
                    };
                    self.stack.push(value)?;
                }
                OpCode::DefineGlobal => {
                    let name = execution.read_string()?;
                    self.globals.insert(name, self.stack.peek(0));
                    self.stack.pop();
                }
                OpCode::SetGlobal => {
                    let name = execution.read_string()?;
                    if self.globals.insert(name, self.stack.peek(0)) {
                        self.globals.delete(name);
                        return Err(self.undefined(name));
                    }
                }
                OpCode::Equal => {
                    let b = self.stack.pop();
                    let a = self.stack.pop();
                    self.stack.push(Value::Boolean(a == b))?;
                }
                OpCode::Greater => self.numeric_op(|a, b| Value::Boolean(a > b))?,
                OpCode::Less => self.numeric_op(|a, b| Value::Boolean(a < b))?,
                OpCode::Add => match (self.stack.peek(1), self.stack.peek(0)) {
                    (Value::Object(a), Value::Object(b)) => {
                        self.stack.pop();
                        self.stack.pop();
                        let result = self.concatenate(a, b);
                        self.stack.push(Value::Object(result))?;
                    }
                    (Value::Number(_), Value::Number(_)) => {
                        self.numeric_op(|a, b| Value::Number(a + b))?
                    }
                    _ => return Err(RuntimeError::InvalidAddOperands),
                },
                OpCode::Subtract => self.numeric_op(|a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.numeric_op(|a, b| Value::Number(a * b))?,
                OpCode::Divide => self.numeric_op(|a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let value = self.stack.pop();
                    self.stack.push(Value::Boolean(value.is_falsey()))?;
                }
                OpCode::Negate => match self.stack.peek(0) {
                    Value::Number(n) => {
                        self.stack.pop();
                        self.stack.push(Value::Number(-n))?;
                    }
                    _ => return Err(RuntimeError::NegateNonNumber),
                },
                OpCode::Print => {
                    let value = self.stack.pop();
                    writeln!(self.stdout.borrow_mut(), "{}", value.display(&self.heap))?;
                }
                OpCode::Return => return Ok(()),
                OpCode::Sentinel => unreachable!("Sentinel should be constructed in VM bytecode"),
            }
        }
    }

    /// Pops two numbers and pushes `op(a, b)`. Both operands stay on the stack
    /// when either is not a number.
    fn numeric_op(&mut self, op: impl Fn(f64, f64) -> Value) -> Result<(), RuntimeError> {
        let (Value::Number(a), Value::Number(b)) = (self.stack.peek(1), self.stack.peek(0)) else {
            return Err(RuntimeError::NonNumberOperands);
        };
        self.stack.pop();
        self.stack.pop();
        self.stack.push(op(a, b))
    }

    fn concatenate(&mut self, a: ObjRef, b: ObjRef) -> ObjRef {
        let a = self.heap.as_str(a);
        let b = self.heap.as_str(b);
        let mut chars = String::with_capacity(a.len() + b.len());
        chars.push_str(a);
        chars.push_str(b);
        self.heap.take_string(chars)
    }

    fn undefined(&self, name: ObjRef) -> RuntimeError {
        RuntimeError::UndefinedVariable(self.heap.as_str(name).to_string())
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        debug!(
            globals = self.globals.len(),
            objects = self.heap.len(),
            "destroying session"
        );
    }
}
