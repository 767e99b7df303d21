//! Loop lowering
//!
//! All five loop forms share one skeleton: initialize the completion
//! register, push a loop context at the head PC, compile condition and body,
//! write the back edge, then pop the context and patch the buffered exit
//! placeholders. The forms differ in where the condition sits and where
//! `continue` lands:
//!
//! - `while`, `for…in`, `for…of`: continue re-enters at the condition, so
//!   continue placeholders patch *backward* to the loop head.
//! - `for`: continue lands on the update expression, patched forward once
//!   the body is done.
//! - `do…while`: continue lands just before the trailing condition; the back
//!   edge is a conditional jump on the negated condition.
//!
//! Context pop and placeholder patching run on every exit path, including
//! after a reported diagnostic, so the chunk never keeps a dangling jump.

use super::CodegenError;
use super::context::{IteratorCleanup, LoopContext};
use super::state::{Compiler, ResolvedName};
use super::symbols::{Binding, BindingKind};
use crate::ast::{DeclKind, Expr, ForHead, Ident, MemberKey, Pattern, Stmt};
use lumen_core::{BAD_REGISTER, NIL_REGISTER, OpCode, Register, Value};

/// Outcome of the fallible inner section of a loop lowering: the
/// condition-exit placeholder (when one was emitted) and whether the body
/// compiled cleanly.
struct LoopBody {
    exit: Option<usize>,
    ok: bool,
}

impl Compiler<'_> {
    /// Entry point for all loop statement forms. `label` arrives from an
    /// enclosing labeled statement.
    pub(super) fn compile_loop(
        &mut self,
        stmt: &Stmt,
        label: Option<String>,
        hint: Option<Register>,
    ) -> Result<Register, CodegenError> {
        match stmt {
            Stmt::While {
                condition,
                body,
                token,
            } => self.compile_while(label, condition, body, hint, token.line),
            Stmt::DoWhile {
                body,
                condition,
                token,
            } => self.compile_do_while(label, body, condition, hint, token.line),
            Stmt::For {
                initializer,
                condition,
                update,
                body,
                token,
            } => self.compile_for(
                label,
                initializer.as_deref(),
                condition.as_ref(),
                update.as_ref(),
                body,
                hint,
                token.line,
            ),
            Stmt::ForIn {
                left,
                object,
                body,
                token,
            } => self.compile_for_in(label, left, object, body, hint, token.line),
            Stmt::ForOf {
                left,
                iterable,
                body,
                token,
            } => self.compile_for_of(label, left, iterable, body, hint, token.line),
            _ => Err(CodegenError::Internal(
                "compile_loop called on a non-loop statement".to_string(),
            )),
        }
    }

    /// Reserve the loop's completion register: the caller's hint when
    /// present, otherwise a temporary released at loop end.
    fn completion_for(
        &mut self,
        hint: Option<Register>,
        line: u32,
    ) -> Result<(Register, bool), CodegenError> {
        let (reg, owned) = match hint {
            Some(reg) => (reg, false),
            None => (self.alloc_reg()?, true),
        };
        self.emit_load_undefined(reg, line);
        Ok((reg, owned))
    }

    /// Pop the loop context and resolve everything it buffered. Break
    /// placeholders land on the current PC; continue placeholders land on
    /// `continue_to` when given (backward for `while`-style loops) or were
    /// already patched by the caller (`for`).
    fn close_loop(
        &mut self,
        exit: Option<usize>,
        continue_to: Option<usize>,
    ) -> Result<(), CodegenError> {
        let ctx = self
            .func_mut()
            .loop_stack
            .pop()
            .ok_or_else(|| CodegenError::Internal("loop stack underflow".to_string()))?;
        if let Some(pos) = exit {
            self.patch(pos)?;
        }
        self.patch_all(&ctx.break_placeholders)?;
        match continue_to {
            Some(target) => {
                for pos in &ctx.continue_placeholders {
                    self.patch_to(*pos, target)?;
                }
            }
            None => {
                if !ctx.continue_placeholders.is_empty() {
                    return Err(CodegenError::Internal(
                        "unpatched continue placeholders at loop close".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Anchor every pending placeholder of the innermost context to the
    /// current PC and pop it. Fatal-error path only: the chunk is about to
    /// be withheld, but it must not hold dangling jumps.
    fn abandon_loop(&mut self) {
        if let Some(ctx) = self.func_mut().loop_stack.pop() {
            let positions: Vec<usize> = ctx
                .break_placeholders
                .iter()
                .chain(ctx.continue_placeholders.iter())
                .copied()
                .collect();
            for pos in positions {
                let _ = self.patch(pos);
            }
        }
    }

    // ---------------------------------------------------------------------
    // while
    // ---------------------------------------------------------------------

    fn compile_while(
        &mut self,
        label: Option<String>,
        condition: &Expr,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let (completion, owned) = self.completion_for(hint, line)?;
        let loop_start = self.current_pc();
        self.push_loop_context(LoopContext::for_loop(
            label,
            loop_start,
            loop_start,
            completion,
        ));

        let inner = self.compile_condition_and_body(condition, body, completion, loop_start, line);
        let result = match inner {
            Ok(LoopBody { exit, ok }) => {
                self.close_loop(exit, Some(loop_start))?;
                Ok(if ok { hint.unwrap_or(NIL_REGISTER) } else { BAD_REGISTER })
            }
            Err(e) => {
                self.abandon_loop();
                Err(e)
            }
        };
        if owned {
            self.free_reg(completion);
        }
        result
    }

    /// Shared by `while` and the two iteration loop tails: condition with
    /// exit placeholder, body, back edge to `loop_start`.
    fn compile_condition_and_body(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        completion: Register,
        loop_start: usize,
        line: u32,
    ) -> Result<LoopBody, CodegenError> {
        let (cond, ok) = self.compile_expr_to_temp(condition)?;
        if !ok {
            self.free_reg(cond);
            return Ok(LoopBody { exit: None, ok: false });
        }
        let exit = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(cond), line);
        self.free_reg(cond);
        let body_ok = self.compile_statement(body, Some(completion))? != BAD_REGISTER;
        self.emit_jump_to(loop_start, line)?;
        Ok(LoopBody {
            exit: Some(exit),
            ok: body_ok,
        })
    }

    // ---------------------------------------------------------------------
    // do…while
    // ---------------------------------------------------------------------

    fn compile_do_while(
        &mut self,
        label: Option<String>,
        body: &Stmt,
        condition: &Expr,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let (completion, owned) = self.completion_for(hint, line)?;
        let body_start = self.current_pc();
        self.push_loop_context(LoopContext::for_loop(
            label,
            body_start,
            body_start,
            completion,
        ));

        let inner = (|| -> Result<(usize, bool), CodegenError> {
            let body_ok = self.compile_statement(body, Some(completion))? != BAD_REGISTER;
            // Continue lands here, just before the condition.
            let cond_pos = self.current_pc();
            let (cond, cond_ok) = self.compile_expr_to_temp(condition)?;
            if cond_ok {
                // Back edge: loop again while the condition holds, i.e.
                // jump-if-false on the negated condition.
                self.emit_ab(OpCode::Not, cond, cond, line);
                self.emit_cond_jump_to(cond, body_start, line)?;
            }
            self.free_reg(cond);
            Ok((cond_pos, body_ok && cond_ok))
        })();

        let result = match inner {
            Ok((cond_pos, ok)) => {
                // Record the resolved continue target on the context before
                // closing it out.
                if let Some(ctx) = self.func_mut().loop_stack.last_mut() {
                    ctx.continue_target_pc = cond_pos as i32;
                }
                self.close_loop(None, Some(cond_pos))?;
                Ok(if ok { hint.unwrap_or(NIL_REGISTER) } else { BAD_REGISTER })
            }
            Err(e) => {
                self.abandon_loop();
                Err(e)
            }
        };
        if owned {
            self.free_reg(completion);
        }
        result
    }

    // ---------------------------------------------------------------------
    // for
    // ---------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn compile_for(
        &mut self,
        label: Option<String>,
        initializer: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        // Header scope: `let`/`const`/`var` declarators in the initializer
        // must be visible to the condition and update.
        self.begin_scope();
        let init_ok = match initializer {
            Some(init) => self.compile_statement(init, None)? != BAD_REGISTER,
            None => true,
        };

        let (completion, owned) = self.completion_for(hint, line)?;
        let loop_start = self.current_pc();
        self.push_loop_context(LoopContext::for_loop(
            label,
            loop_start,
            loop_start,
            completion,
        ));

        let inner = (|| -> Result<LoopBody, CodegenError> {
            let exit = match condition {
                Some(condition) => {
                    let (cond, ok) = self.compile_expr_to_temp(condition)?;
                    if !ok {
                        self.free_reg(cond);
                        return Ok(LoopBody { exit: None, ok: false });
                    }
                    let exit = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(cond), line);
                    self.free_reg(cond);
                    Some(exit)
                }
                None => None,
            };
            let body_ok = self.compile_statement(body, Some(completion))? != BAD_REGISTER;

            // Continue placeholders resolve to the update expression, which
            // runs between iterations. No new ones can arrive past here.
            let update_pos = self.current_pc();
            let pending = match self.func_mut().loop_stack.last_mut() {
                Some(ctx) => {
                    ctx.continue_target_pc = update_pos as i32;
                    std::mem::take(&mut ctx.continue_placeholders)
                }
                None => Vec::new(),
            };
            self.patch_all(&pending)?;

            let update_ok = match update {
                Some(update) => {
                    let (temp, ok) = self.compile_expr_to_temp(update)?;
                    self.free_reg(temp);
                    ok
                }
                None => true,
            };
            self.emit_jump_to(loop_start, line)?;
            Ok(LoopBody {
                exit,
                ok: body_ok && update_ok,
            })
        })();

        let result = match inner {
            Ok(LoopBody { exit, ok }) => {
                self.close_loop(exit, None)?;
                Ok(if ok && init_ok {
                    hint.unwrap_or(NIL_REGISTER)
                } else {
                    BAD_REGISTER
                })
            }
            Err(e) => {
                self.abandon_loop();
                Err(e)
            }
        };
        if owned {
            self.free_reg(completion);
        }
        self.end_scope();
        result
    }

    // ---------------------------------------------------------------------
    // for…in
    // ---------------------------------------------------------------------

    fn compile_for_in(
        &mut self,
        label: Option<String>,
        left: &ForHead,
        object: &Expr,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        self.begin_scope();
        if !self.declare_for_head(left)? {
            self.end_scope();
            return Ok(BAD_REGISTER);
        }

        let (obj, obj_ok) = self.compile_expr_to_temp(object)?;
        if !obj_ok {
            self.free_reg(obj);
            self.end_scope();
            return Ok(BAD_REGISTER);
        }
        // One opcode reads the own-enumerable key list; iteration is then a
        // counted walk over it.
        let keys = self.alloc_reg()?;
        self.emit_ab(OpCode::GetOwnKeys, keys, obj, line);
        self.free_reg(obj);
        self.func_mut().regs.pin(keys);

        let counters = self.setup_counted_walk(keys, line);
        let result = match counters {
            Ok((idx, len, one)) => {
                let r = self.compile_counted_loop(
                    label, left, keys, idx, len, one, body, hint, line, false,
                );
                for reg in [keys, idx, len, one] {
                    self.func_mut().regs.unpin(reg);
                    self.free_reg(reg);
                }
                r
            }
            Err(e) => {
                self.func_mut().regs.unpin(keys);
                self.free_reg(keys);
                Err(e)
            }
        };
        self.end_scope();
        result
    }

    /// Allocate and initialize the pinned index/length/step registers of a
    /// counted walk over `source` (a key list or an array).
    fn setup_counted_walk(
        &mut self,
        source: Register,
        line: u32,
    ) -> Result<(Register, Register, Register), CodegenError> {
        let idx = self.alloc_reg()?;
        self.emit_load_const(idx, Value::Number(0.0), line)?;
        self.func_mut().regs.pin(idx);
        let len = self.alloc_reg()?;
        self.emit_get_prop(len, source, "length", line)?;
        self.func_mut().regs.pin(len);
        let one = self.alloc_reg()?;
        self.emit_load_const(one, Value::Number(1.0), line)?;
        self.func_mut().regs.pin(one);
        Ok((idx, len, one))
    }

    /// The shared counted loop of `for…in` and the `for…of` array fast
    /// path: `while (idx < len) { elem = source[idx]; idx += 1; bind; body }`.
    #[allow(clippy::too_many_arguments)]
    fn compile_counted_loop(
        &mut self,
        label: Option<String>,
        left: &ForHead,
        source: Register,
        idx: Register,
        len: Register,
        one: Register,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
        array_source: bool,
    ) -> Result<Register, CodegenError> {
        let (completion, owned) = self.completion_for(hint, line)?;
        let loop_start = self.current_pc();
        let mut ctx = LoopContext::for_loop(label, loop_start, loop_start, completion);
        if array_source {
            ctx.iterator_cleanup = Some(IteratorCleanup {
                iterator_reg: source,
                uses_protocol: false,
            });
        }
        self.push_loop_context(ctx);

        let inner = (|| -> Result<LoopBody, CodegenError> {
            let cond = self.alloc_reg()?;
            self.emit_abc(OpCode::Less, cond, idx, len, line);
            let exit = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(cond), line);
            self.free_reg(cond);

            let elem = self.alloc_reg()?;
            self.emit_abc(OpCode::GetIndex, elem, source, idx, line);
            self.emit_abc(OpCode::Add, idx, idx, one, line);
            let bind_ok = self.assign_for_head(left, elem, line)?;
            self.free_reg(elem);

            let body_ok = self.compile_statement(body, Some(completion))? != BAD_REGISTER;
            self.emit_jump_to(loop_start, line)?;
            Ok(LoopBody {
                exit: Some(exit),
                ok: bind_ok && body_ok,
            })
        })();

        let result = match inner {
            Ok(LoopBody { exit, ok }) => {
                self.close_loop(exit, Some(loop_start))?;
                Ok(if ok { hint.unwrap_or(NIL_REGISTER) } else { BAD_REGISTER })
            }
            Err(e) => {
                self.abandon_loop();
                Err(e)
            }
        };
        if owned {
            self.free_reg(completion);
        }
        result
    }

    // ---------------------------------------------------------------------
    // for…of
    // ---------------------------------------------------------------------

    fn compile_for_of(
        &mut self,
        label: Option<String>,
        left: &ForHead,
        iterable: &Expr,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        self.begin_scope();
        if !self.declare_for_head(left)? {
            self.end_scope();
            return Ok(BAD_REGISTER);
        }

        let (it, it_ok) = self.compile_expr_to_temp(iterable)?;
        if !it_ok {
            self.free_reg(it);
            self.end_scope();
            return Ok(BAD_REGISTER);
        }
        self.func_mut().regs.pin(it);

        // Runtime dispatch on the iterable's type: arrays take the counted
        // fast path, everything else drives the iterator protocol. The body
        // is compiled once per path.
        let result = (|| -> Result<Register, CodegenError> {
            let tag = self.alloc_reg()?;
            self.emit_ab(OpCode::IsArray, tag, it, line);
            let to_protocol = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(tag), line);
            self.free_reg(tag);

            let fast = self.compile_for_of_fast(label.clone(), left, it, body, hint, line)?;
            let skip_protocol = self.emit_placeholder_jump(OpCode::Jump, None, line);
            self.patch(to_protocol)?;
            let slow = self.compile_for_of_protocol(label, left, it, body, hint, line)?;
            self.patch(skip_protocol)?;
            Ok(if fast == BAD_REGISTER || slow == BAD_REGISTER {
                BAD_REGISTER
            } else {
                hint.unwrap_or(NIL_REGISTER)
            })
        })();

        self.func_mut().regs.unpin(it);
        self.free_reg(it);
        self.end_scope();
        result
    }

    fn compile_for_of_fast(
        &mut self,
        label: Option<String>,
        left: &ForHead,
        it: Register,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let (idx, len, one) = self.setup_counted_walk(it, line)?;
        let result =
            self.compile_counted_loop(label, left, it, idx, len, one, body, hint, line, true);
        for reg in [idx, len, one] {
            self.func_mut().regs.unpin(reg);
            self.free_reg(reg);
        }
        result
    }

    fn compile_for_of_protocol(
        &mut self,
        label: Option<String>,
        left: &ForHead,
        it: Register,
        body: &Stmt,
        hint: Option<Register>,
        line: u32,
    ) -> Result<Register, CodegenError> {
        // Fetch the well-known iterator symbol off the global Symbol
        // namespace, index the iterable with it, and invoke the result as a
        // method so `this` binds to the iterable.
        let iter = self.alloc_reg()?;
        let sym = self.alloc_reg()?;
        let slot = self.global_slot("Symbol");
        self.emit_reg_u16(OpCode::GetGlobal, sym, slot, line);
        self.emit_get_prop(sym, sym, "iterator", line)?;
        let pair = self.func_mut().regs.alloc_span(2)?;
        self.emit_abc(OpCode::GetIndex, pair, it, sym, line);
        self.emit_move(pair + 1, it, line);
        self.emit_abc(OpCode::CallMethod, iter, pair, 0, line);
        self.func_mut().regs.free_span(pair, 2);
        self.free_reg(sym);
        self.func_mut().regs.pin(iter);

        let (completion, owned) = self.completion_for(hint, line)?;
        let loop_start = self.current_pc();
        let mut ctx = LoopContext::for_loop(label, loop_start, loop_start, completion);
        // Non-local exits must invoke the live iterator's `return()`.
        ctx.iterator_cleanup = Some(IteratorCleanup {
            iterator_reg: iter,
            uses_protocol: true,
        });
        self.push_loop_context(ctx);

        let inner = (|| -> Result<LoopBody, CodegenError> {
            let pair = self.func_mut().regs.alloc_span(2)?;
            self.emit_get_prop(pair, iter, "next", line)?;
            self.emit_move(pair + 1, iter, line);
            let step = self.alloc_reg()?;
            self.emit_abc(OpCode::CallMethod, step, pair, 0, line);
            self.func_mut().regs.free_span(pair, 2);

            let done = self.alloc_reg()?;
            self.emit_get_prop(done, step, "done", line)?;
            self.emit_ab(OpCode::Not, done, done, line);
            let exit = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(done), line);
            self.free_reg(done);

            let value = self.alloc_reg()?;
            self.emit_get_prop(value, step, "value", line)?;
            let bind_ok = self.assign_for_head(left, value, line)?;
            self.free_reg(value);
            self.free_reg(step);

            let body_ok = self.compile_statement(body, Some(completion))? != BAD_REGISTER;
            self.emit_jump_to(loop_start, line)?;
            Ok(LoopBody {
                exit: Some(exit),
                ok: bind_ok && body_ok,
            })
        })();

        let result = match inner {
            Ok(LoopBody { exit, ok }) => {
                self.close_loop(exit, Some(loop_start))?;
                Ok(if ok { hint.unwrap_or(NIL_REGISTER) } else { BAD_REGISTER })
            }
            Err(e) => {
                self.abandon_loop();
                Err(e)
            }
        };
        if owned {
            self.free_reg(completion);
        }
        self.func_mut().regs.unpin(iter);
        self.free_reg(iter);
        result
    }

    // ---------------------------------------------------------------------
    // Loop-header bindings
    // ---------------------------------------------------------------------

    /// Declare the header bindings of an iteration loop before the loop
    /// runs: declarator forms define locals (or globals for top-level `var`
    /// per the scope placement rule); bare targets declare nothing.
    fn declare_for_head(&mut self, head: &ForHead) -> Result<bool, CodegenError> {
        match head {
            ForHead::Decl { kind, pattern } => self.declare_pattern(*kind, pattern),
            ForHead::Target { .. } => Ok(true),
        }
    }

    fn declare_pattern(&mut self, kind: DeclKind, pattern: &Pattern) -> Result<bool, CodegenError> {
        match pattern {
            Pattern::Identifier { ident } => self.declare_header_ident(kind, ident),
            Pattern::Member { target } => {
                self.sink.add_error(
                    target.token(),
                    "member expression is not a valid declaration target",
                );
                Ok(false)
            }
            Pattern::Array { elements } => {
                let mut ok = true;
                for pattern in elements.iter().flatten() {
                    ok &= self.declare_pattern(kind, pattern)?;
                }
                Ok(ok)
            }
            Pattern::Object { properties } => {
                let mut ok = true;
                for (_, pattern) in properties {
                    ok &= self.declare_pattern(kind, pattern)?;
                }
                Ok(ok)
            }
        }
    }

    fn declare_header_ident(&mut self, kind: DeclKind, ident: &Ident) -> Result<bool, CodegenError> {
        if !self.validate_binding_name(ident) {
            return Ok(false);
        }
        let is_const = kind == DeclKind::Const;
        if kind == DeclKind::Var && self.binds_globally() {
            self.define_global(&ident.name, false);
            return Ok(true);
        }
        // `var` that resolves to an existing local assigns into it.
        if kind == DeclKind::Var
            && let Some(ResolvedName::Local { .. }) = self.resolve_name(&ident.name)
        {
            return Ok(true);
        }
        let reg = self.alloc_reg()?;
        self.func_mut().regs.pin(reg);
        self.emit_load_undefined(reg, ident.token.line);
        self.func_mut().table.define(
            &ident.name,
            Binding::new(BindingKind::Local { reg }, is_const, &ident.name),
        );
        Ok(true)
    }

    /// Per-iteration binding of the produced value (a key or an element)
    /// into the loop header's target.
    fn assign_for_head(
        &mut self,
        head: &ForHead,
        value: Register,
        line: u32,
    ) -> Result<bool, CodegenError> {
        let pattern = match head {
            ForHead::Decl { pattern, .. } | ForHead::Target { pattern } => pattern,
        };
        self.assign_pattern(pattern, value, line)
    }

    fn assign_pattern(
        &mut self,
        pattern: &Pattern,
        value: Register,
        line: u32,
    ) -> Result<bool, CodegenError> {
        match pattern {
            Pattern::Identifier { ident } => self.assign_ident(ident, value, line),
            Pattern::Member { target } => self.assign_member_target(target, value, line),
            Pattern::Array { elements } => {
                let mut ok = true;
                for (i, element) in elements.iter().enumerate() {
                    let Some(element) = element else { continue };
                    let key = self.alloc_reg()?;
                    self.emit_load_const(key, Value::Number(i as f64), line)?;
                    let extracted = self.alloc_reg()?;
                    self.emit_abc(OpCode::GetIndex, extracted, value, key, line);
                    ok &= self.assign_pattern(element, extracted, line)?;
                    self.free_reg(extracted);
                    self.free_reg(key);
                }
                Ok(ok)
            }
            Pattern::Object { properties } => {
                let mut ok = true;
                for (key, element) in properties {
                    let extracted = self.alloc_reg()?;
                    self.emit_get_prop(extracted, value, &key.name, line)?;
                    ok &= self.assign_pattern(element, extracted, line)?;
                    self.free_reg(extracted);
                }
                Ok(ok)
            }
        }
    }

    fn assign_ident(
        &mut self,
        ident: &Ident,
        value: Register,
        line: u32,
    ) -> Result<bool, CodegenError> {
        match self.resolve_name(&ident.name) {
            Some(ResolvedName::Local { reg, is_const }) => {
                // The header's own fresh binding is assignable even for
                // `const`; it is pinned to the iteration.
                let _ = is_const;
                self.emit_move(reg, value, line);
                Ok(true)
            }
            Some(ResolvedName::Global { slot, .. }) => {
                self.emit_set_global(slot, value, line);
                Ok(true)
            }
            Some(ResolvedName::Upvalue { index, .. }) => {
                self.emit_ab(OpCode::SetUpvalue, index, value, line);
                Ok(true)
            }
            Some(ResolvedName::Unresolved { .. }) => Err(CodegenError::Internal(format!(
                "loop binding '{}' has no register",
                ident.name
            ))),
            None => {
                if self.config.strict {
                    self.sink.add_error(
                        ident.token,
                        format!("assignment to undeclared name '{}'", ident.name),
                    );
                    return Ok(false);
                }
                let slot = self.global_slot(&ident.name);
                self.emit_set_global(slot, value, line);
                Ok(true)
            }
        }
    }

    fn assign_member_target(
        &mut self,
        target: &Expr,
        value: Register,
        line: u32,
    ) -> Result<bool, CodegenError> {
        let Expr::Member { object, property, .. } = target else {
            self.sink
                .add_error(target.token(), "invalid loop assignment target");
            return Ok(false);
        };
        let (obj, ok) = self.compile_expr_to_temp(object)?;
        if !ok {
            self.free_reg(obj);
            return Ok(false);
        }
        match property {
            MemberKey::Prop { name } => {
                self.emit_set_prop(obj, &name.name, value, line)?;
            }
            MemberKey::Index { expr } => {
                let (key, key_ok) = self.compile_expr_to_temp(expr)?;
                if key_ok {
                    self.emit_abc(OpCode::SetIndex, obj, key, value, line);
                }
                self.free_reg(key);
                if !key_ok {
                    self.free_reg(obj);
                    return Ok(false);
                }
            }
        }
        self.free_reg(obj);
        Ok(true)
    }
}
