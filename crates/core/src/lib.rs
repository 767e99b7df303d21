//! Lumen Core: the bytecode data model shared by the compiler and the VM
//!
//! This crate holds everything both sides of the pipeline must agree on:
//!
//! - `OpCode`: the instruction alphabet and its operand layout
//! - `Value`: compile-time constant values (the constant pool element type)
//! - `Chunk`: the complete product of one compilation unit (code, line map,
//!   constant pool, global-name table, nested function table, strict flag)
//! - `FunctionProto`: one entry of a chunk's function table
//! - Register and jump-displacement limits
//!
//! The compiler crate appends to chunks and patches jump displacements; the
//! runtime crate decodes them. Neither depends on the other, only on this.

pub mod chunk;
pub mod opcode;
pub mod value;

pub use chunk::{Chunk, FunctionProto};
pub use opcode::OpCode;
pub use value::Value;

/// A VM register index. Registers are byte-wide operands in the instruction
/// stream, so the whole register file of one frame fits in `u8`.
pub type Register = u8;

/// Sentinel: no register has been assigned yet.
pub const NIL_REGISTER: Register = 0xFF;

/// Sentinel: a sub-compilation failed and already reported its diagnostic.
pub const BAD_REGISTER: Register = 0xFE;

/// Number of allocatable registers per frame. The two top indices are
/// reserved as sentinels.
pub const MAX_REGISTERS: usize = 250;

/// Largest forward jump displacement (signed 16-bit, big-endian on the wire).
pub const JUMP_MAX: i32 = i16::MAX as i32;

/// Largest backward jump displacement.
pub const JUMP_MIN: i32 = i16::MIN as i32;
