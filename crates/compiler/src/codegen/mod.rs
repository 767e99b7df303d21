//! Bytecode Code Generation
//!
//! This module lowers the statement AST into register-VM bytecode. It is
//! split into focused submodules:
//!
//! - `state.rs`: the `Compiler` and per-function `FuncState` frames
//! - `registers.rs`: first-fit register allocator with pinning
//! - `symbols.rs`: lexically-scoped symbol table and binding kinds
//! - `emit.rs`: instruction emission, placeholder jumps, the patcher
//! - `context.rs`: loop/label contexts and finally contexts
//! - `statements.rs`: statement dispatch, declarations, return,
//!   break/continue, labels
//! - `loops.rs`: the five loop forms and loop-header bindings
//! - `control_flow.rs`: `if`, two-phase `switch`, `try…catch…finally`
//! - `expressions.rs`: the expression compiler
//! - `functions.rs`: function-literal compilation and closure emission
//! - `program.rs`: the unit-level driver
//! - `error.rs`: fatal error types
//!
//! # Key Concepts
//!
//! ## Registers
//!
//! Every value lives in a byte-indexed frame register. Registers backing a
//! binding are *pinned* for the binding's lifetime and released when its
//! scope ends; expression temporaries are freed before the expression
//! returns. The allocator's high-water mark becomes the frame size.
//!
//! ## Forward jumps
//!
//! A branch whose target is ahead of the cursor is emitted with two
//! reserved displacement bytes and buffered — on the active loop context
//! for `break`/`continue`, locally otherwise — until its target PC exists
//! and `patch` resolves it. Displacements are signed 16-bit; overflow is a
//! fatal internal error rather than silently wrong bytecode.
//!
//! ## Completion values
//!
//! Iteration statements and `switch` produce the last non-empty statement
//! value. Each reserves a completion register, initializes it to
//! `undefined`, and threads it into its body as the destination hint;
//! `break`/`continue` reset it, except inside a `finally` body where the
//! accumulated value propagates outward.
//!
//! ## Finally routing
//!
//! Non-local exits inside `try…finally` cannot jump straight to their
//! target: the finally body must run first. Lowering records the pending
//! completion (`PushBreak`/`PushContinue`, `ReturnViaFinally`) and detours
//! through the finally entry; the `EndFinally` epilogue dispatches the
//! record once the finally body has run.

mod context;
mod control_flow;
mod emit;
mod error;
mod expressions;
mod functions;
mod loops;
mod program;
mod registers;
mod state;
mod statements;
mod symbols;

pub use error::CodegenError;
pub use state::Compiler;
pub use symbols::{Binding, BindingKind, SymbolTable};
