//! Lumen Compiler Library
//!
//! Lowers a parsed Lumen program (a TypeScript-like scripting language)
//! into bytecode for the Lumen register VM. The front end that produces the
//! AST is external; it hands the tree over in-process or as a JSON
//! document.
//!
//! ```rust
//! use lumenc::{CompilerConfig, DiagnosticSink, ast, compile};
//!
//! let program = ast::Program { statements: vec![] };
//! let mut sink = DiagnosticSink::new();
//! let chunk = compile(&program, &CompilerConfig::default(), &mut sink);
//! assert!(chunk.is_some());
//! ```
//!
//! Compilation either yields a structurally valid chunk or withholds it:
//! when any diagnostic of error severity was recorded, or when an internal
//! invariant broke (jump displacement overflow, register exhaustion),
//! `compile` returns `None` and the sink holds the details.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;

pub use codegen::{CodegenError, Compiler};
pub use config::{CompilerConfig, UnitKind};
pub use diagnostics::{Diagnostic, DiagnosticSink, Severity, Span};

use ast::Program;
use lumen_core::Chunk;

/// Compile one unit. Returns the chunk only when no error-severity
/// diagnostic was recorded; the sink aggregates everything either way.
pub fn compile(
    program: &Program,
    config: &CompilerConfig,
    sink: &mut DiagnosticSink,
) -> Option<Chunk> {
    let outcome = {
        let compiler = Compiler::new(sink, config);
        compiler.compile_unit(program)
    };
    match outcome {
        Ok(chunk) if !sink.has_errors() => Some(chunk),
        Ok(_) => None,
        Err(fatal) => {
            sink.add_error(Span { line: 0 }, fatal.to_string());
            None
        }
    }
}

/// Convenience wrapper that owns the sink and returns diagnostics on
/// failure.
pub fn compile_program(
    program: &Program,
    config: &CompilerConfig,
) -> Result<Chunk, Vec<Diagnostic>> {
    let mut sink = DiagnosticSink::new();
    match compile(program, config, &mut sink) {
        Some(chunk) => Ok(chunk),
        None => Err(sink.into_diagnostics()),
    }
}
