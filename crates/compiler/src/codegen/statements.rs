//! Statement lowering
//!
//! The dispatcher over statement AST variants, plus the forms that do not
//! open their own control-flow region: declarations, `return`, `break`,
//! `continue`, labeled statements and `throw`. Loops live in `loops.rs`,
//! `if`/`switch`/`try` in `control_flow.rs`.
//!
//! Every lowering returns the statement's completion register: the caller's
//! hint when the statement wrote a value into it, `NIL_REGISTER` for empty
//! completions, or `BAD_REGISTER` after a reported diagnostic. Fatal
//! conditions travel as `Err` and abort the unit.

use super::CodegenError;
use super::state::Compiler;
use super::symbols::{Binding, BindingKind, is_reserved_in_strict};
use crate::ast::{DeclKind, Declarator, Expr, FunctionLiteral, Ident, Stmt, Token};
use lumen_core::{BAD_REGISTER, NIL_REGISTER, OpCode, Register};

impl Compiler<'_> {
    /// Compile a statement sequence. A statement that reports a diagnostic
    /// does not stop the walk; lowering recovers and keeps collecting.
    pub(super) fn compile_statements(
        &mut self,
        statements: &[Stmt],
        hint: Option<Register>,
    ) -> Result<Register, CodegenError> {
        let mut result = NIL_REGISTER;
        for stmt in statements {
            let r = self.compile_statement(stmt, hint)?;
            if r == BAD_REGISTER {
                result = BAD_REGISTER;
            } else if result != BAD_REGISTER && r != NIL_REGISTER {
                result = r;
            }
        }
        Ok(result)
    }

    /// Dispatch one statement. `hint` is the completion-value destination
    /// the enclosing construct threads through.
    pub(super) fn compile_statement(
        &mut self,
        stmt: &Stmt,
        hint: Option<Register>,
    ) -> Result<Register, CodegenError> {
        match stmt {
            Stmt::VarDecl {
                kind, declarators, ..
            } => self.compile_var_decl(*kind, declarators),
            Stmt::Function { function } => self.compile_function_declaration(function),
            Stmt::Expression { expr } => self.compile_expression_statement(expr, hint),
            Stmt::Block { statements, .. } => {
                self.begin_scope();
                let result = self.compile_statements(statements, hint);
                self.end_scope();
                result
            }
            Stmt::If {
                condition,
                consequence,
                alternative,
                token,
            } => self.compile_if(condition, consequence, alternative.as_deref(), hint, token.line),
            Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::For { .. }
            | Stmt::ForIn { .. }
            | Stmt::ForOf { .. } => self.compile_loop(stmt, None, hint),
            Stmt::Switch {
                scrutinee,
                cases,
                token,
            } => self.compile_switch(None, scrutinee, cases, hint, token.line),
            Stmt::Break { label, token } => self.compile_break(label.as_ref(), hint, *token),
            Stmt::Continue { label, token } => self.compile_continue(label.as_ref(), hint, *token),
            Stmt::Return { value, token } => self.compile_return(value.as_ref(), *token),
            Stmt::Labeled { label, body } => self.compile_labeled(label, body, hint),
            Stmt::Try {
                body,
                catch_param,
                catch_body,
                finally_body,
                token,
            } => self.compile_try(
                body,
                catch_param.as_ref(),
                catch_body.as_deref(),
                finally_body.as_deref(),
                hint,
                token.line,
            ),
            Stmt::Throw { value, token } => self.compile_throw(value, token.line),
            Stmt::Empty => Ok(NIL_REGISTER),
        }
    }

    fn compile_expression_statement(
        &mut self,
        expr: &Expr,
        hint: Option<Register>,
    ) -> Result<Register, CodegenError> {
        match hint {
            Some(dst) => self.compile_expression(expr, dst),
            None => {
                // Value discarded; evaluate for effect only.
                let (temp, ok) = self.compile_expr_to_temp(expr)?;
                self.free_reg(temp);
                Ok(if ok { NIL_REGISTER } else { BAD_REGISTER })
            }
        }
    }

    fn compile_throw(&mut self, value: &Expr, line: u32) -> Result<Register, CodegenError> {
        let (temp, ok) = self.compile_expr_to_temp(value)?;
        if ok {
            self.emit_reg(OpCode::Throw, temp, line);
        }
        self.free_reg(temp);
        Ok(if ok { NIL_REGISTER } else { BAD_REGISTER })
    }

    // ---------------------------------------------------------------------
    // Declarations
    // ---------------------------------------------------------------------

    fn compile_var_decl(
        &mut self,
        kind: DeclKind,
        declarators: &[Declarator],
    ) -> Result<Register, CodegenError> {
        let mut any_bad = false;
        for declarator in declarators {
            if !self.validate_binding_name(&declarator.name) {
                any_bad = true;
                continue;
            }
            if kind == DeclKind::Const && declarator.value.is_none() {
                self.sink.add_error(
                    declarator.name.token,
                    format!("missing initializer in const declaration of '{}'", declarator.name.name),
                );
                any_bad = true;
                continue;
            }
            let ok = self.compile_declarator(kind, declarator)?;
            any_bad = any_bad || !ok;
        }
        Ok(if any_bad { BAD_REGISTER } else { NIL_REGISTER })
    }

    /// Strict-mode validation of a binding name, shared by declarations and
    /// catch parameters.
    pub(super) fn validate_binding_name(&mut self, name: &Ident) -> bool {
        if self.config.strict && is_reserved_in_strict(&name.name) {
            self.sink.add_error(
                name.token,
                format!("'{}' cannot be bound in strict mode", name.name),
            );
            return false;
        }
        true
    }

    fn compile_declarator(
        &mut self,
        kind: DeclKind,
        declarator: &Declarator,
    ) -> Result<bool, CodegenError> {
        let name = &declarator.name;
        let is_const = kind == DeclKind::Const;
        let line = name.token.line;

        // Function-literal initializers get the recursion-capable protocol.
        if let Some(Expr::Function { function }) = &declarator.value {
            return self.compile_function_valued_binding(name, is_const, function);
        }

        if self.binds_globally() {
            let slot = self.define_global(&name.name, is_const);
            let temp = self.alloc_reg()?;
            let ok = match &declarator.value {
                Some(value) => self.compile_expression(value, temp)? != BAD_REGISTER,
                None => {
                    self.emit_load_undefined(temp, line);
                    true
                }
            };
            if ok {
                self.emit_set_global(slot, temp, line);
            }
            self.free_reg(temp);
            return Ok(ok);
        }

        // `var` hoists: the local exists (as undefined) before its
        // initializer runs, so references inside the initializer resolve to
        // it rather than to an outer binding or a global.
        if kind == DeclKind::Var {
            // Re-declaration in the same scope reuses the register.
            let existing = match self.func().table.resolve(&name.name) {
                Some((b, 0)) => match b.kind {
                    BindingKind::Local { reg } => Some(reg),
                    _ => None,
                },
                _ => None,
            };
            let reg = match existing {
                Some(reg) => reg,
                None => {
                    let reg = self.alloc_reg()?;
                    self.func_mut().regs.pin(reg);
                    self.emit_load_undefined(reg, line);
                    self.func_mut().table.define(
                        &name.name,
                        Binding::new(BindingKind::Local { reg }, false, &name.name),
                    );
                    reg
                }
            };
            let ok = match &declarator.value {
                Some(value) => {
                    // The initializer can read the hoisted binding, so it is
                    // staged in a temporary before the register is written.
                    let (temp, ok) = self.compile_expr_to_temp(value)?;
                    if ok {
                        self.emit_move(reg, temp, line);
                    }
                    self.free_reg(temp);
                    ok
                }
                None => true,
            };
            return Ok(ok);
        }

        // `let` / `const`: the initializer compiles before the name exists,
        // so `let x = x` reads the outer `x`.
        let reg = self.alloc_reg()?;
        let ok = match &declarator.value {
            Some(value) => self.compile_expression(value, reg)? != BAD_REGISTER,
            None => {
                self.emit_load_undefined(reg, line);
                true
            }
        };
        if !ok {
            self.free_reg(reg);
            return Ok(false);
        }
        self.func_mut().regs.pin(reg);
        self.func_mut().table.define(
            &name.name,
            Binding::new(BindingKind::Local { reg }, is_const, &name.name),
        );
        Ok(true)
    }

    /// The §declaration protocol for a binding whose initializer is a
    /// function literal: pre-insert the name so the body can reference
    /// itself, compile the literal, materialize the closure, then fix the
    /// binding up to the closure register.
    fn compile_function_valued_binding(
        &mut self,
        name: &Ident,
        is_const: bool,
        function: &FunctionLiteral,
    ) -> Result<bool, CodegenError> {
        let line = name.token.line;
        if self.binds_globally() {
            // The slot exists before the body compiles, so recursive
            // self-reference resolves straight to the global.
            let slot = self.define_global(&name.name, is_const);
            let (fidx, free) = self.compile_function_literal(function, &name.name)?;
            let temp = self.alloc_reg()?;
            self.emit_closure(temp, fidx, &free, line)?;
            self.emit_set_global(slot, temp, line);
            self.free_reg(temp);
            return Ok(true);
        }

        self.func_mut().table.define(
            &name.name,
            Binding::new(BindingKind::Unresolved, is_const, &name.name),
        );
        let (fidx, free) = self.compile_function_literal(function, &name.name)?;
        let reg = self.alloc_reg()?;
        self.func_mut().regs.pin(reg);
        // Fix up before deriving descriptors: a self-capture must resolve to
        // the closure's own register.
        self.func_mut().table.update_register(&name.name, reg);
        self.emit_closure(reg, fidx, &free, line)?;
        Ok(true)
    }

    fn compile_function_declaration(
        &mut self,
        function: &FunctionLiteral,
    ) -> Result<Register, CodegenError> {
        let Some(name) = function.name.clone() else {
            self.sink
                .add_error(function.token, "function declaration requires a name");
            return Ok(BAD_REGISTER);
        };
        if !self.validate_binding_name(&name) {
            return Ok(BAD_REGISTER);
        }
        let ok = self.compile_function_valued_binding(&name, false, function)?;
        Ok(if ok { NIL_REGISTER } else { BAD_REGISTER })
    }

    // ---------------------------------------------------------------------
    // Return
    // ---------------------------------------------------------------------

    fn compile_return(
        &mut self,
        value: Option<&Expr>,
        token: Token,
    ) -> Result<Register, CodegenError> {
        let line = token.line;
        let frame = self.func();
        // Iterator-protocol loops between here and the function boundary
        // need their `return()` invoked before we leave.
        let cleanups: Vec<Register> = frame
            .loop_stack
            .iter()
            .rev()
            .filter_map(|ctx| ctx.iterator_cleanup)
            .filter(|ic| ic.uses_protocol)
            .map(|ic| ic.iterator_reg)
            .collect();
        let via_finally = frame.in_finally_block || !frame.finally_stack.is_empty();
        // Tail calls bypass the frame teardown the cleanups and finally
        // routing rely on.
        let tail_ok = cleanups.is_empty() && !via_finally && self.in_function();

        match value {
            Some(value) => {
                let saved = std::mem::replace(&mut self.func_mut().tail_position, tail_ok);
                let compiled = self.compile_expr_to_temp(value);
                self.func_mut().tail_position = saved;
                let (temp, ok) = compiled?;
                if ok {
                    for reg in &cleanups {
                        self.emit_reg(OpCode::IteratorCleanup, *reg, line);
                    }
                    let op = if via_finally {
                        OpCode::ReturnViaFinally
                    } else {
                        OpCode::Return
                    };
                    self.emit_reg(op, temp, line);
                }
                self.free_reg(temp);
                Ok(if ok { NIL_REGISTER } else { BAD_REGISTER })
            }
            None => {
                for reg in &cleanups {
                    self.emit_reg(OpCode::IteratorCleanup, *reg, line);
                }
                let op = if via_finally {
                    OpCode::ReturnUndefinedViaFinally
                } else {
                    OpCode::ReturnUndefined
                };
                self.emit_op(op, line);
                Ok(NIL_REGISTER)
            }
        }
    }

    // ---------------------------------------------------------------------
    // break / continue
    // ---------------------------------------------------------------------

    fn compile_break(
        &mut self,
        label: Option<&Ident>,
        hint: Option<Register>,
        token: Token,
    ) -> Result<Register, CodegenError> {
        let Some(target) = self.resolve_jump_target(label.map(|l| l.name.as_str()), false) else {
            match label {
                Some(label) => self.sink.add_error(
                    label.token,
                    format!("undefined label '{}'", label.name),
                ),
                None => self
                    .sink
                    .add_error(token, "'break' outside of loop or switch"),
            }
            return Ok(BAD_REGISTER);
        };
        self.emit_non_local_exit(target, true, hint, token.line)?;
        Ok(NIL_REGISTER)
    }

    fn compile_continue(
        &mut self,
        label: Option<&Ident>,
        hint: Option<Register>,
        token: Token,
    ) -> Result<Register, CodegenError> {
        let Some(target) = self.resolve_jump_target(label.map(|l| l.name.as_str()), true) else {
            match label {
                Some(label) => self.sink.add_error(
                    label.token,
                    format!("undefined label '{}'", label.name),
                ),
                None => self.sink.add_error(token, "'continue' outside of loop"),
            }
            return Ok(BAD_REGISTER);
        };
        if !self.func().loop_stack[target].is_loop() {
            let label = label.map(|l| l.name.as_str()).unwrap_or_default();
            self.sink.add_error(
                token,
                format!("'continue' target '{}' is not a loop", label),
            );
            return Ok(BAD_REGISTER);
        }
        self.emit_non_local_exit(target, false, hint, token.line)?;
        Ok(NIL_REGISTER)
    }

    /// Shared tail of `break`/`continue`: iterator cleanup for the contexts
    /// being exited, completion-value update on the target, finally
    /// re-routing, and the pending forward jump itself.
    fn emit_non_local_exit(
        &mut self,
        target: usize,
        is_break: bool,
        hint: Option<Register>,
        line: u32,
    ) -> Result<(), CodegenError> {
        let frame = self.func();
        // `break` tears down the target's own iterator too; `continue` keeps
        // it live for the next iteration.
        let first = if is_break { target } else { target + 1 };
        let cleanups: Vec<Register> = frame.loop_stack[first..]
            .iter()
            .rev()
            .filter_map(|ctx| ctx.iterator_cleanup)
            .filter(|ic| ic.uses_protocol)
            .map(|ic| ic.iterator_reg)
            .collect();
        let completion = frame.loop_stack[target].completion_reg;
        let in_finally_block = frame.in_finally_block;
        let current_handler_depth = frame.handler_depth;
        let target_handler_depth = frame.loop_stack[target].handler_depth;
        // Finally regions the exit leaves, innermost first. Each one's body
        // must run on the way out, and each one's guard must come off the
        // runtime handler stack.
        let crossed: Vec<(usize, usize)> = frame
            .finally_stack
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, f)| target < f.loop_stack_depth_at_creation)
            .map(|(i, f)| (i, f.handler_depth_at_creation))
            .collect();

        for reg in &cleanups {
            self.emit_reg(OpCode::IteratorCleanup, *reg, line);
        }

        if completion != BAD_REGISTER {
            match hint {
                // Inside a finally body the accumulated completion value
                // propagates outward instead of resetting.
                Some(hint_reg) if in_finally_block => self.emit_move(completion, hint_reg, line),
                _ => self.emit_load_undefined(completion, line),
            }
        }

        if !crossed.is_empty() {
            // The exit detours through every crossed finally body, innermost
            // outward. Each hop drops the handlers above that region's
            // guard, records the pending completion, and jumps to the
            // finally entry (which pops the guard itself); `EndFinally`
            // dispatches the record onto the next hop's stub. The last
            // record's displacement is patched when the target loop closes.
            let record_op = if is_break {
                OpCode::PushBreak
            } else {
                OpCode::PushContinue
            };
            let mut depth_above = current_handler_depth;
            let last = crossed.len() - 1;
            for (hop, &(fi, guard_depth)) in crossed.iter().enumerate() {
                for _ in guard_depth..depth_above {
                    self.emit_op(OpCode::PopHandler, line);
                }
                let record = self.emit_placeholder_jump(record_op, None, line);
                let to_finally = self.emit_placeholder_jump(OpCode::Jump, None, line);
                self.func_mut().finally_stack[fi]
                    .jump_to_finally_placeholders
                    .push(to_finally);
                if hop == last {
                    let frame = self.func_mut();
                    if is_break {
                        frame.loop_stack[target].break_placeholders.push(record);
                    } else {
                        frame.loop_stack[target].continue_placeholders.push(record);
                    }
                } else {
                    // The next hop's stub starts here.
                    self.patch(record)?;
                }
                depth_above = guard_depth - 1;
            }
            return Ok(());
        }

        // Handlers installed since the target loop was entered are being
        // jumped out of; drop them before the branch.
        for _ in target_handler_depth..current_handler_depth {
            self.emit_op(OpCode::PopHandler, line);
        }
        let pos = self.emit_placeholder_jump(OpCode::Jump, None, line);
        let frame = self.func_mut();
        if is_break {
            frame.loop_stack[target].break_placeholders.push(pos);
        } else {
            frame.loop_stack[target].continue_placeholders.push(pos);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Labeled statements
    // ---------------------------------------------------------------------

    fn compile_labeled(
        &mut self,
        label: &Ident,
        body: &Stmt,
        hint: Option<Register>,
    ) -> Result<Register, CodegenError> {
        if self
            .func()
            .loop_stack
            .iter()
            .any(|ctx| ctx.label.as_deref() == Some(label.name.as_str()))
        {
            self.sink.add_error(
                label.token,
                format!("label '{}' is already in use", label.name),
            );
            return Ok(BAD_REGISTER);
        }
        match body {
            Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::For { .. }
            | Stmt::ForIn { .. }
            | Stmt::ForOf { .. } => self.compile_loop(body, Some(label.name.clone()), hint),
            Stmt::Switch {
                scrutinee,
                cases,
                token,
            } => self.compile_switch(Some(label.name.clone()), scrutinee, cases, hint, token.line),
            _ => {
                // A labeled non-loop only collects breaks; `continue`
                // targeting it is rejected during lowering.
                let ctx = super::context::LoopContext::for_labeled_block(
                    label.name.clone(),
                    hint.unwrap_or(BAD_REGISTER),
                );
                self.push_loop_context(ctx);
                let result = self.compile_statement(body, hint);
                let ctx = self
                    .func_mut()
                    .loop_stack
                    .pop()
                    .ok_or_else(|| CodegenError::Internal("loop stack underflow".to_string()))?;
                self.patch_all(&ctx.break_placeholders)?;
                result
            }
        }
    }
}
