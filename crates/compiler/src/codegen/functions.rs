//! Function-literal compilation
//!
//! A literal compiles in its own `FuncState` frame pushed onto the
//! compiler's stack: fresh chunk, fresh register file, fresh scope chain.
//! Free variables referenced from the body are collected on the frame as
//! the body compiles; the caller turns them into upvalue descriptor bytes
//! when it emits the `Closure` instruction.

use super::CodegenError;
use super::state::{Compiler, FreeSymbol, FuncState};
use super::symbols::{Binding, BindingKind, is_reserved_in_strict};
use crate::ast::FunctionLiteral;
use lumen_core::{FunctionProto, OpCode, Register};

impl Compiler<'_> {
    /// Compile `literal` into a `FunctionProto` appended to the current
    /// chunk's function table. Returns the table index and the literal's
    /// free symbols, in capture order.
    pub(super) fn compile_function_literal(
        &mut self,
        literal: &FunctionLiteral,
        name_hint: &str,
    ) -> Result<(u16, Vec<FreeSymbol>), CodegenError> {
        let arity = literal.parameters.len();
        if arity > u8::MAX as usize {
            self.sink
                .add_error(literal.token, "function has more than 255 parameters");
            // Compile an empty stand-in so the caller's Closure still
            // references a real table entry.
            let mut stand_in =
                FuncState::new(name_hint, 0, self.config.strict, self.config.max_registers);
            stand_in
                .chunk
                .emit_opcode(OpCode::ReturnUndefined, literal.token.line);
            return self.finish_function(stand_in);
        }

        let strict = self.config.strict;
        let mut frame = FuncState::new(
            name_hint,
            arity as u8,
            strict,
            self.config.max_registers,
        );
        // Parameters occupy the first registers of the frame, pinned for the
        // whole body.
        for param in &literal.parameters {
            if strict && is_reserved_in_strict(&param.name) {
                self.sink.add_error(
                    param.token,
                    format!("'{}' cannot be bound in strict mode", param.name),
                );
            }
            if frame.table.resolved_in_current_scope(&param.name) {
                self.sink.add_error(
                    param.token,
                    format!("duplicate parameter name '{}'", param.name),
                );
                continue;
            }
            let reg = frame.regs.alloc()?;
            frame.regs.pin(reg);
            frame.table.define(
                &param.name,
                Binding::new(BindingKind::Local { reg }, false, &param.name),
            );
        }
        self.funcs.push(frame);

        let body_result = self.compile_statements(&literal.body, None);

        // Terminate the body unconditionally; a trailing `return` makes this
        // unreachable, which the VM never minds.
        self.emit_op(OpCode::ReturnUndefined, literal.token.line);

        let frame = self
            .funcs
            .pop()
            .ok_or_else(|| CodegenError::Internal("function frame stack underflow".to_string()))?;
        body_result?;
        self.finish_function(frame)
    }

    fn finish_function(
        &mut self,
        frame: FuncState,
    ) -> Result<(u16, Vec<FreeSymbol>), CodegenError> {
        let register_count = frame.regs.high_water().max(frame.arity as usize);
        let proto = FunctionProto {
            name: frame.name,
            arity: frame.arity,
            register_count: register_count as u8,
            upvalue_count: frame.upvalues.len() as u8,
            chunk: frame.chunk,
        };
        let functions = &mut self.func_mut().chunk.functions;
        functions.push(proto);
        let fidx = u16::try_from(functions.len() - 1)
            .map_err(|_| CodegenError::Internal("function table overflowed u16".to_string()))?;
        Ok((fidx, frame.upvalues))
    }

    /// Emit `Closure dst, fidx` with descriptor bytes derived from `free`
    /// against the current frame. Must run after any `update_register`
    /// fix-up for the closure's own name.
    pub(super) fn emit_closure(
        &mut self,
        dst: Register,
        fidx: u16,
        free: &[FreeSymbol],
        line: u32,
    ) -> Result<(), CodegenError> {
        let mut descriptors = Vec::with_capacity(free.len());
        for symbol in free {
            descriptors.push(self.upvalue_descriptor(&symbol.name)?);
        }
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::Closure, line);
        chunk.emit_byte(dst);
        chunk.emit_u16(fidx);
        chunk.emit_byte(descriptors.len() as u8);
        for (is_local, index) in descriptors {
            chunk.emit_byte(is_local as u8);
            chunk.emit_byte(index);
        }
        Ok(())
    }
}
