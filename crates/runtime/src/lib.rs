//! Lumen Runtime: a register VM for compiled Lumen chunks
//!
//! Interprets the instruction stream `lumen-compiler` emits. One frame per
//! activation, a register file sized by the function proto, a handler stack
//! per frame for `try`/`finally`, and a pending-completion record that the
//! `EndFinally` epilogue dispatches to honor `break`/`continue`/`return`
//! routed through finally bodies.
//!
//! # Modules
//!
//! - `value`: runtime values (objects, arrays, closures, iterators)
//! - `vm`: the dispatch loop
//! - `error`: runtime error type

pub mod error;
pub mod value;
pub mod vm;

pub use error::RuntimeError;
pub use value::Value;
pub use vm::Vm;
