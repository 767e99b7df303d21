//! Branching statement lowering: `if`, `switch`, `try…catch…finally`
//!
//! `switch` compiles in two phases: all case comparisons first, then all
//! case bodies in source order with no jumps between them, which yields
//! natural fall-through and keeps comparison jumps short. `try…finally`
//! installs VM handlers and pushes a finally context so `break`/`continue`/
//! `return` inside the protected region detour through the finally body.

use super::CodegenError;
use super::context::LoopContext;
use super::state::Compiler;
use super::symbols::{Binding, BindingKind};
use crate::ast::{Expr, Ident, Stmt, SwitchCase};
use lumen_core::{BAD_REGISTER, NIL_REGISTER, OpCode, Register};

impl Compiler<'_> {
    pub(super) fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &Stmt,
        alternative: Option<&Stmt>,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let (cond, cond_ok) = self.compile_expr_to_temp(condition)?;
        if !cond_ok {
            self.free_reg(cond);
            return Ok(BAD_REGISTER);
        }
        let to_else = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(cond), line);
        self.free_reg(cond);

        let then_result = self.compile_statement(consequence, hint)?;
        match alternative {
            Some(alternative) => {
                let to_end = self.emit_placeholder_jump(OpCode::Jump, None, line);
                self.patch(to_else)?;
                let else_result = self.compile_statement(alternative, hint)?;
                self.patch(to_end)?;
                if then_result == BAD_REGISTER || else_result == BAD_REGISTER {
                    Ok(BAD_REGISTER)
                } else {
                    Ok(hint.unwrap_or(NIL_REGISTER))
                }
            }
            None => {
                self.patch(to_else)?;
                if then_result == BAD_REGISTER {
                    Ok(BAD_REGISTER)
                } else {
                    Ok(hint.unwrap_or(NIL_REGISTER))
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // switch
    // ---------------------------------------------------------------------

    pub(super) fn compile_switch(
        &mut self,
        label: Option<String>,
        scrutinee: &Expr,
        cases: &[SwitchCase],
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        // More than one default clause is a lowering-time diagnostic.
        let defaults: Vec<usize> = cases
            .iter()
            .enumerate()
            .filter(|(_, c)| c.condition.is_none())
            .map(|(i, _)| i)
            .collect();
        if defaults.len() > 1 {
            let token = cases[defaults[1]].token;
            self.sink
                .add_error(token, "multiple default clauses in switch statement");
            return Ok(BAD_REGISTER);
        }
        let default_case = defaults.first().copied();

        // The scrutinee is evaluated once and stays live across every
        // comparison and body.
        let (scrut, scrut_ok) = self.compile_expr_to_temp(scrutinee)?;
        if !scrut_ok {
            self.free_reg(scrut);
            return Ok(BAD_REGISTER);
        }
        self.func_mut().regs.pin(scrut);

        let (completion, owned) = match hint {
            Some(reg) => (reg, false),
            None => (self.alloc_reg()?, true),
        };
        self.emit_load_undefined(completion, line);

        self.push_loop_context(LoopContext::for_switch(label, completion));

        let inner = self.compile_switch_phases(scrut, cases, default_case, completion, line);

        let close = {
            let ctx = self
                .func_mut()
                .loop_stack
                .pop()
                .ok_or_else(|| CodegenError::Internal("loop stack underflow".to_string()))?;
            self.patch_all(&ctx.break_placeholders)
        };

        self.func_mut().regs.unpin(scrut);
        self.free_reg(scrut);
        if owned {
            self.free_reg(completion);
        }

        close?;
        match inner? {
            true => Ok(hint.unwrap_or(NIL_REGISTER)),
            false => Ok(BAD_REGISTER),
        }
    }

    fn compile_switch_phases(
        &mut self,
        scrut: Register,
        cases: &[SwitchCase],
        default_case: Option<usize>,
        completion: Register,
        line: u32,
    ) -> Result<bool, CodegenError> {
        let mut ok = true;

        // Phase 1: comparisons in source order. A match jumps forward to
        // its body; a mismatch falls into the next comparison.
        let mut body_jumps: Vec<(usize, usize)> = Vec::new();
        for (i, case) in cases.iter().enumerate() {
            let Some(condition) = &case.condition else {
                continue;
            };
            let case_line = case.token.line;
            let (value, value_ok) = self.compile_expr_to_temp(condition)?;
            if value_ok {
                self.emit_abc(OpCode::StrictEqual, value, scrut, value, case_line);
                self.emit_ab(OpCode::Not, value, value, case_line);
                let pos = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(value), case_line);
                body_jumps.push((i, pos));
            } else {
                ok = false;
            }
            self.free_reg(value);
        }
        // No comparison matched: fall to the default body, or past the end.
        let to_default = self.emit_placeholder_jump(OpCode::Jump, None, line);

        // Phase 2: bodies in source order, no jumps in between, giving
        // natural fall-through.
        let mut default_patched = false;
        for (i, case) in cases.iter().enumerate() {
            for &(_, pos) in body_jumps.iter().filter(|(ci, _)| *ci == i) {
                self.patch(pos)?;
            }
            if default_case == Some(i) {
                self.patch(to_default)?;
                default_patched = true;
            }
            if self.compile_statements(&case.body, Some(completion))? == BAD_REGISTER {
                ok = false;
            }
        }
        if !default_patched {
            self.patch(to_default)?;
        }
        Ok(ok)
    }

    // ---------------------------------------------------------------------
    // try…catch…finally
    // ---------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub(super) fn compile_try(
        &mut self,
        body: &[Stmt],
        catch_param: Option<&Ident>,
        catch_body: Option<&[Stmt]>,
        finally_body: Option<&[Stmt]>,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let has_catch = catch_body.is_some();
        let has_finally = finally_body.is_some();
        if !has_catch && !has_finally {
            // Degenerate tree; behave like a plain block.
            self.begin_scope();
            let result = self.compile_statements(body, hint);
            self.end_scope();
            return result;
        }
        let mut ok = true;

        // Handler installation order matters: the finally guard goes under
        // the catch handler, so a throw runs the catch first and the finally
        // still runs if the catch body throws again.
        let finally_guard = has_finally.then(|| {
            let pos = self.emit_placeholder_jump(OpCode::PushFinallyGuard, None, line);
            self.func_mut().handler_depth += 1;
            pos
        });
        // Depth with the guard on top: exits detouring through the finally
        // pop down to here.
        let guard_depth = self.func().handler_depth;
        let exc_reg = if has_catch {
            let reg = self.alloc_reg()?;
            self.func_mut().regs.pin(reg);
            Some(reg)
        } else {
            None
        };
        let catch_entry = exc_reg.map(|reg| {
            let pos = self.emit_placeholder_jump(OpCode::PushCatch, Some(reg), line);
            self.func_mut().handler_depth += 1;
            pos
        });

        if has_finally {
            let depth = self.func().loop_stack.len();
            self.func_mut()
                .finally_stack
                .push(super::context::FinallyContext::new(depth, guard_depth));
        }

        // Protected region.
        self.begin_scope();
        if self.compile_statements(body, hint)? == BAD_REGISTER {
            ok = false;
        }
        self.end_scope();

        // Normal completion of the body: drop the catch handler and step
        // over the catch body.
        let skip_catch = if has_catch {
            self.emit_op(OpCode::PopHandler, line);
            self.func_mut().handler_depth -= 1;
            Some(self.emit_placeholder_jump(OpCode::Jump, None, line))
        } else {
            None
        };

        let mut exc_owned = exc_reg.is_some();
        if let (Some(entry), Some(reg), Some(catch_stmts)) = (catch_entry, exc_reg, catch_body) {
            // The VM pops the catch handler on throw and lands here with the
            // thrown value already in `reg`.
            self.patch(entry)?;
            self.begin_scope();
            if let Some(param) = catch_param {
                if self.validate_binding_name(param) {
                    // The scope teardown releases the register with the
                    // binding.
                    self.func_mut().table.define(
                        &param.name,
                        Binding::new(BindingKind::Local { reg }, false, &param.name),
                    );
                    exc_owned = false;
                }
            }
            if self.compile_statements(catch_stmts, hint)? == BAD_REGISTER {
                ok = false;
            }
            self.end_scope();
        }
        if let Some(pos) = skip_catch {
            self.patch(pos)?;
        }

        if let Some(finally_stmts) = finally_body {
            let ctx = self
                .func_mut()
                .finally_stack
                .pop()
                .ok_or_else(|| CodegenError::Internal("finally stack underflow".to_string()))?;
            // Non-local exits out of the protected region land here, ahead
            // of the handler pop.
            self.patch_all(&ctx.jump_to_finally_placeholders)?;
            self.emit_op(OpCode::PopHandler, line);
            self.func_mut().handler_depth -= 1;
            // Thrown-path entry: the VM already popped the guard, so it
            // lands past the PopHandler.
            if let Some(pos) = finally_guard {
                self.patch(pos)?;
            }

            let saved = std::mem::replace(&mut self.func_mut().in_finally_block, true);
            self.begin_scope();
            let body_result = self.compile_statements(finally_stmts, hint);
            self.end_scope();
            self.func_mut().in_finally_block = saved;
            if body_result? == BAD_REGISTER {
                ok = false;
            }
            self.emit_op(OpCode::EndFinally, line);
        }

        if exc_owned && let Some(reg) = exc_reg {
            self.func_mut().regs.unpin(reg);
            self.free_reg(reg);
        }
        Ok(if ok { hint.unwrap_or(NIL_REGISTER) } else { BAD_REGISTER })
    }
}
