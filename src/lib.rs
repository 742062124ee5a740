//! A bytecode compiler and stack-based virtual machine for a small
//! dynamically typed scripting language.
//!
//! Source text is scanned on demand by the [`tokenizer`], compiled in a single
//! pass into a [`bytecode::Chunk`] by the [`compiler`], and executed by a
//! [`vm::Vm`] session that owns the globals, the interned strings and every
//! heap object.

pub mod bytecode;
pub mod compiler;
pub mod object;
pub mod table;
pub mod tokenizer;
pub mod value;
pub mod vm;

pub use vm::{InterpretError, InterpretResult, Vm};
