//! Crate-wide error taxonomy.
//!
//! Usage errors are checked by `main` before any file I/O and are not
//! represented here. Everything else — load errors, a missing `main`,
//! and runtime traps — is fatal and carries a diagnostic up to `main`
//! via `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JvmError {
    #[error("failed to read class file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed class file: {0}")]
    MalformedClass(String),

    #[error("class has no method named `main` with descriptor `([Ljava/lang/String;)V`")]
    MissingMain,

    #[error("no method named `{name}` with the requested descriptor")]
    MethodNotFound { name: String },

    #[error("division by zero")]
    DivideByZero,

    #[error("unknown opcode 0x{opcode:02x} at pc {pc}")]
    UnknownOpcode { opcode: u8, pc: usize },

    #[error("operand stack overflow (capacity {capacity})")]
    StackOverflow { capacity: usize },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("local variable index {index} out of bounds (max_locals {max_locals})")]
    LocalIndexOutOfBounds { index: usize, max_locals: usize },

    #[error("constant pool index {index} out of bounds (pool size {size})")]
    ConstantPoolIndexOutOfBounds { index: usize, size: usize },

    #[error("constant pool entry {index} is not a method reference")]
    NotAMethodRef { index: usize },

    #[error("constant pool entry {index} is not an integer constant")]
    NotAnInteger { index: usize },

    #[error("heap reference {reference} does not name a live array")]
    HeapReferenceOutOfBounds { reference: i32 },

    #[error("array index {index} out of bounds (length {length})")]
    ArrayIndexOutOfBounds { index: i32, length: i32 },

    #[error("code fell short of the bytes an instruction at pc {pc} required")]
    TruncatedInstruction { pc: usize },
}

pub type Result<T> = std::result::Result<T, JvmError>;
