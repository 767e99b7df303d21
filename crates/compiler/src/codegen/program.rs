//! Unit-level compilation driver
//!
//! Compiles a whole program (script or eval body) into its chunk: reserves
//! the unit completion register, walks the statements, terminates with a
//! `Return` of the completion value, then seals the chunk with the module
//! global-name table. The balanced-stack invariants are checked here so a
//! lowering bug surfaces as an internal error instead of corrupt bytecode.

use super::CodegenError;
use super::state::Compiler;
use crate::ast::Program;
use lumen_core::{Chunk, OpCode};

impl Compiler<'_> {
    /// Compile `program` to completion. User-level problems land in the
    /// sink; the returned chunk is structurally valid either way. Fatal
    /// conditions surface as `Err` and the chunk is lost.
    pub fn compile_unit(mut self, program: &Program) -> Result<Chunk, CodegenError> {
        let first_line = program
            .statements
            .first()
            .map(|s| s.token().line)
            .unwrap_or(0);
        let last_line = program
            .statements
            .last()
            .map(|s| s.token().line)
            .unwrap_or(first_line);

        // The unit completion register: expression statements and loop
        // completions accumulate here, and the unit returns it.
        let completion = self.alloc_reg()?;
        self.emit_load_undefined(completion, first_line);

        self.compile_statements(&program.statements, Some(completion))?;
        self.emit_reg(OpCode::Return, completion, last_line);

        let frame = self
            .funcs
            .pop()
            .ok_or_else(|| CodegenError::Internal("function frame stack underflow".to_string()))?;
        if !self.funcs.is_empty() {
            return Err(CodegenError::Internal(
                "nested function frames left open at unit end".to_string(),
            ));
        }
        if !frame.loop_stack.is_empty() {
            return Err(CodegenError::Internal(
                "loop contexts left open at unit end".to_string(),
            ));
        }
        if !frame.finally_stack.is_empty() {
            return Err(CodegenError::Internal(
                "finally contexts left open at unit end".to_string(),
            ));
        }

        let mut chunk = frame.chunk;
        chunk.globals = self.globals;
        Ok(chunk)
    }
}
