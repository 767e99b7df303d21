//! Expression compilation
//!
//! Every expression compiles into a caller-chosen destination register.
//! Temporaries allocated on the way are freed before returning, so an
//! expression never changes the allocator's live set.
//!
//! User-level problems (assignment to a constant, invalid targets) are
//! reported to the sink and surface as the `BAD_REGISTER` sentinel, which
//! callers propagate without emitting further code for the statement.
//! `Err` is reserved for fatal conditions.

use super::CodegenError;
use super::state::{Compiler, ResolvedName};
use crate::ast::{
    AssignOp, BinaryOp, Expr, FunctionLiteral, Ident, LogicalOp, MemberKey, PropKey, UnaryOp,
    UpdateOp,
};
use lumen_core::{BAD_REGISTER, OpCode, Register, Value};

impl Compiler<'_> {
    pub(super) fn alloc_reg(&mut self) -> Result<Register, CodegenError> {
        self.func_mut().regs.alloc()
    }

    pub(super) fn free_reg(&mut self, reg: Register) {
        self.func_mut().regs.free(reg);
    }

    /// Compile `expr` into `dst`. Returns `dst`, or `BAD_REGISTER` after a
    /// reported diagnostic.
    pub(super) fn compile_expression(
        &mut self,
        expr: &Expr,
        dst: Register,
    ) -> Result<Register, CodegenError> {
        match expr {
            Expr::Number { value, token } => {
                self.emit_load_const(dst, Value::Number(*value), token.line)?;
                Ok(dst)
            }
            Expr::String { value, token } => {
                self.emit_load_const(dst, Value::String(value.clone()), token.line)?;
                Ok(dst)
            }
            Expr::Boolean { value, token } => {
                self.emit_load_const(dst, Value::Bool(*value), token.line)?;
                Ok(dst)
            }
            Expr::Null { token } => {
                self.emit_load_const(dst, Value::Null, token.line)?;
                Ok(dst)
            }
            Expr::Undefined { token } => {
                self.emit_load_undefined(dst, token.line);
                Ok(dst)
            }
            Expr::Identifier { ident } => self.compile_identifier_read(ident, dst),
            Expr::Assign {
                target,
                op,
                value,
                token,
            } => self.compile_assignment(target, *op, value, dst, token.line),
            Expr::Update {
                target,
                op,
                prefix,
                token,
            } => self.compile_update(target, *op, *prefix, dst, token.line),
            Expr::Binary {
                op,
                left,
                right,
                token,
            } => self.compile_binary(*op, left, right, dst, token.line),
            Expr::Logical {
                op,
                left,
                right,
                token,
            } => self.compile_logical(*op, left, right, dst, token.line),
            Expr::Unary { op, operand, token } => {
                self.compile_unary(*op, operand, dst, token.line)
            }
            Expr::Conditional {
                condition,
                consequence,
                alternative,
                token,
            } => self.compile_conditional(condition, consequence, alternative, dst, token.line),
            Expr::Call {
                callee,
                arguments,
                token,
            } => self.compile_call(callee, arguments, dst, token.line),
            Expr::Member {
                object,
                property,
                token,
            } => self.compile_member_read(object, property, dst, token.line),
            Expr::Array { elements, token } => self.compile_array(elements, dst, token.line),
            Expr::Object { properties, token } => self.compile_object(properties, dst, token.line),
            Expr::Function { function } => self.compile_function_expression(function, dst),
        }
    }

    /// Compile `expr` into a fresh temporary. The caller frees it.
    pub(super) fn compile_expr_to_temp(
        &mut self,
        expr: &Expr,
    ) -> Result<(Register, bool), CodegenError> {
        let temp = self.alloc_reg()?;
        let r = self.compile_expression(expr, temp)?;
        Ok((temp, r != BAD_REGISTER))
    }

    fn compile_identifier_read(
        &mut self,
        ident: &Ident,
        dst: Register,
    ) -> Result<Register, CodegenError> {
        let line = ident.token.line;
        match self.resolve_name(&ident.name) {
            Some(ResolvedName::Local { reg, .. }) => self.emit_move(dst, reg, line),
            Some(ResolvedName::Global { slot, .. }) => {
                self.emit_reg_u16(OpCode::GetGlobal, dst, slot, line)
            }
            Some(ResolvedName::Upvalue { index, .. }) => {
                self.emit_ab(OpCode::GetUpvalue, dst, index, line)
            }
            Some(ResolvedName::Unresolved { .. }) => {
                return Err(CodegenError::Internal(format!(
                    "read of '{}' before its register was fixed up",
                    ident.name
                )));
            }
            None => {
                // Undeclared names address the global table dynamically; a
                // slot is reserved on first reference.
                let slot = self.global_slot(&ident.name);
                self.emit_reg_u16(OpCode::GetGlobal, dst, slot, line);
            }
        }
        Ok(dst)
    }

    fn compile_assignment(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let saved_tail = std::mem::replace(&mut self.func_mut().tail_position, false);
        let result = self.compile_assignment_inner(target, op, value, dst, line);
        self.func_mut().tail_position = saved_tail;
        result
    }

    fn compile_assignment_inner(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        match target {
            Expr::Identifier { ident } => {
                match self.resolve_name(&ident.name) {
                    Some(ResolvedName::Local { reg, is_const }) => {
                        if is_const {
                            self.sink.add_error(
                                ident.token,
                                format!("assignment to constant '{}'", ident.name),
                            );
                            return Ok(BAD_REGISTER);
                        }
                        match op {
                            AssignOp::Assign => {
                                // Staged through `dst`: the value expression
                                // may still read the target register.
                                if self.compile_expression(value, dst)? == BAD_REGISTER {
                                    return Ok(BAD_REGISTER);
                                }
                                self.emit_move(reg, dst, line);
                                return Ok(dst);
                            }
                            AssignOp::AddAssign | AssignOp::SubAssign => {
                                let (temp, ok) = self.compile_expr_to_temp(value)?;
                                if ok {
                                    self.emit_abc(compound_op(op), reg, reg, temp, line);
                                }
                                self.free_reg(temp);
                                if !ok {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                        }
                        self.emit_move(dst, reg, line);
                        Ok(dst)
                    }
                    Some(ResolvedName::Global { slot, is_const }) => {
                        if is_const {
                            self.sink.add_error(
                                ident.token,
                                format!("assignment to constant '{}'", ident.name),
                            );
                            return Ok(BAD_REGISTER);
                        }
                        match op {
                            AssignOp::Assign => {
                                if self.compile_expression(value, dst)? == BAD_REGISTER {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                            AssignOp::AddAssign | AssignOp::SubAssign => {
                                self.emit_reg_u16(OpCode::GetGlobal, dst, slot, line);
                                let (temp, ok) = self.compile_expr_to_temp(value)?;
                                if ok {
                                    self.emit_abc(compound_op(op), dst, dst, temp, line);
                                }
                                self.free_reg(temp);
                                if !ok {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                        }
                        self.emit_set_global(slot, dst, line);
                        Ok(dst)
                    }
                    Some(ResolvedName::Upvalue { index, is_const }) => {
                        if is_const {
                            self.sink.add_error(
                                ident.token,
                                format!("assignment to constant '{}'", ident.name),
                            );
                            return Ok(BAD_REGISTER);
                        }
                        match op {
                            AssignOp::Assign => {
                                if self.compile_expression(value, dst)? == BAD_REGISTER {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                            AssignOp::AddAssign | AssignOp::SubAssign => {
                                self.emit_ab(OpCode::GetUpvalue, dst, index, line);
                                let (temp, ok) = self.compile_expr_to_temp(value)?;
                                if ok {
                                    self.emit_abc(compound_op(op), dst, dst, temp, line);
                                }
                                self.free_reg(temp);
                                if !ok {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                        }
                        self.emit_ab(OpCode::SetUpvalue, index, dst, line);
                        Ok(dst)
                    }
                    Some(ResolvedName::Unresolved { .. }) => Err(CodegenError::Internal(format!(
                        "write to '{}' before its register was fixed up",
                        ident.name
                    ))),
                    None => {
                        if self.config.strict {
                            self.sink.add_error(
                                ident.token,
                                format!("assignment to undeclared name '{}'", ident.name),
                            );
                            return Ok(BAD_REGISTER);
                        }
                        // Sloppy mode: assignment creates a global.
                        let slot = self.global_slot(&ident.name);
                        match op {
                            AssignOp::Assign => {
                                if self.compile_expression(value, dst)? == BAD_REGISTER {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                            AssignOp::AddAssign | AssignOp::SubAssign => {
                                self.emit_reg_u16(OpCode::GetGlobal, dst, slot, line);
                                let (temp, ok) = self.compile_expr_to_temp(value)?;
                                if ok {
                                    self.emit_abc(compound_op(op), dst, dst, temp, line);
                                }
                                self.free_reg(temp);
                                if !ok {
                                    return Ok(BAD_REGISTER);
                                }
                            }
                        }
                        self.emit_set_global(slot, dst, line);
                        Ok(dst)
                    }
                }
            }
            Expr::Member { object, property, .. } => {
                let (obj, ok) = self.compile_expr_to_temp(object)?;
                if !ok {
                    self.free_reg(obj);
                    return Ok(BAD_REGISTER);
                }
                let result = self.compile_member_assignment(obj, property, op, value, dst, line);
                self.free_reg(obj);
                result
            }
            _ => {
                self.sink
                    .add_error(target.token(), "invalid assignment target");
                Ok(BAD_REGISTER)
            }
        }
    }

    fn compile_member_assignment(
        &mut self,
        obj: Register,
        property: &MemberKey,
        op: AssignOp,
        value: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        match property {
            MemberKey::Prop { name } => {
                if op != AssignOp::Assign {
                    self.emit_get_prop(dst, obj, &name.name, line)?;
                    let (temp, ok) = self.compile_expr_to_temp(value)?;
                    if ok {
                        self.emit_abc(compound_op(op), dst, dst, temp, line);
                    }
                    self.free_reg(temp);
                    if !ok {
                        return Ok(BAD_REGISTER);
                    }
                } else if self.compile_expression(value, dst)? == BAD_REGISTER {
                    return Ok(BAD_REGISTER);
                }
                self.emit_set_prop(obj, &name.name, dst, line)?;
                Ok(dst)
            }
            MemberKey::Index { expr } => {
                let (key, ok) = self.compile_expr_to_temp(expr)?;
                if !ok {
                    self.free_reg(key);
                    return Ok(BAD_REGISTER);
                }
                if op != AssignOp::Assign {
                    self.emit_abc(OpCode::GetIndex, dst, obj, key, line);
                    let (temp, ok) = self.compile_expr_to_temp(value)?;
                    if ok {
                        self.emit_abc(compound_op(op), dst, dst, temp, line);
                    }
                    self.free_reg(temp);
                    if !ok {
                        self.free_reg(key);
                        return Ok(BAD_REGISTER);
                    }
                } else if self.compile_expression(value, dst)? == BAD_REGISTER {
                    self.free_reg(key);
                    return Ok(BAD_REGISTER);
                }
                self.emit_abc(OpCode::SetIndex, obj, key, dst, line);
                self.free_reg(key);
                Ok(dst)
            }
        }
    }

    fn compile_update(
        &mut self,
        target: &Expr,
        op: UpdateOp,
        prefix: bool,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let arith = match op {
            UpdateOp::Increment => OpCode::Add,
            UpdateOp::Decrement => OpCode::Sub,
        };
        match target {
            Expr::Identifier { ident } => {
                let resolved = self.resolve_name(&ident.name);
                if let Some(
                    ResolvedName::Local { is_const: true, .. }
                    | ResolvedName::Global { is_const: true, .. }
                    | ResolvedName::Upvalue { is_const: true, .. },
                ) = resolved
                {
                    self.sink.add_error(
                        ident.token,
                        format!("assignment to constant '{}'", ident.name),
                    );
                    return Ok(BAD_REGISTER);
                }
                let one = self.alloc_reg()?;
                self.emit_load_const(one, Value::Number(1.0), line)?;
                let result = match resolved {
                    Some(ResolvedName::Local { reg, .. }) => {
                        if prefix {
                            self.emit_abc(arith, reg, reg, one, line);
                            self.emit_move(dst, reg, line);
                        } else {
                            let old = self.alloc_reg()?;
                            self.emit_move(old, reg, line);
                            self.emit_abc(arith, reg, reg, one, line);
                            self.emit_move(dst, old, line);
                            self.free_reg(old);
                        }
                        Ok(dst)
                    }
                    Some(ResolvedName::Global { .. }) | None => {
                        let slot = match resolved {
                            Some(ResolvedName::Global { slot, .. }) => slot,
                            _ => self.global_slot(&ident.name),
                        };
                        let cur = self.alloc_reg()?;
                        self.emit_reg_u16(OpCode::GetGlobal, cur, slot, line);
                        if prefix {
                            self.emit_abc(arith, cur, cur, one, line);
                            self.emit_set_global(slot, cur, line);
                            self.emit_move(dst, cur, line);
                        } else {
                            self.emit_move(dst, cur, line);
                            self.emit_abc(arith, cur, cur, one, line);
                            self.emit_set_global(slot, cur, line);
                        }
                        self.free_reg(cur);
                        Ok(dst)
                    }
                    Some(ResolvedName::Upvalue { index, .. }) => {
                        let cur = self.alloc_reg()?;
                        self.emit_ab(OpCode::GetUpvalue, cur, index, line);
                        if prefix {
                            self.emit_abc(arith, cur, cur, one, line);
                            self.emit_ab(OpCode::SetUpvalue, index, cur, line);
                            self.emit_move(dst, cur, line);
                        } else {
                            self.emit_move(dst, cur, line);
                            self.emit_abc(arith, cur, cur, one, line);
                            self.emit_ab(OpCode::SetUpvalue, index, cur, line);
                        }
                        self.free_reg(cur);
                        Ok(dst)
                    }
                    Some(ResolvedName::Unresolved { .. }) => Err(CodegenError::Internal(format!(
                        "update of '{}' before its register was fixed up",
                        ident.name
                    ))),
                };
                self.free_reg(one);
                result
            }
            Expr::Member { object, property, .. } => {
                let (obj, ok) = self.compile_expr_to_temp(object)?;
                if !ok {
                    self.free_reg(obj);
                    return Ok(BAD_REGISTER);
                }
                let one = self.alloc_reg()?;
                self.emit_load_const(one, Value::Number(1.0), line)?;
                let cur = self.alloc_reg()?;
                let result = (|| -> Result<Register, CodegenError> {
                    match property {
                        MemberKey::Prop { name } => {
                            self.emit_get_prop(cur, obj, &name.name, line)?;
                            if prefix {
                                self.emit_abc(arith, cur, cur, one, line);
                                self.emit_set_prop(obj, &name.name, cur, line)?;
                                self.emit_move(dst, cur, line);
                            } else {
                                self.emit_move(dst, cur, line);
                                self.emit_abc(arith, cur, cur, one, line);
                                self.emit_set_prop(obj, &name.name, cur, line)?;
                            }
                        }
                        MemberKey::Index { expr } => {
                            let (key, ok) = self.compile_expr_to_temp(expr)?;
                            if !ok {
                                self.free_reg(key);
                                return Ok(BAD_REGISTER);
                            }
                            self.emit_abc(OpCode::GetIndex, cur, obj, key, line);
                            if prefix {
                                self.emit_abc(arith, cur, cur, one, line);
                                self.emit_abc(OpCode::SetIndex, obj, key, cur, line);
                                self.emit_move(dst, cur, line);
                            } else {
                                self.emit_move(dst, cur, line);
                                self.emit_abc(arith, cur, cur, one, line);
                                self.emit_abc(OpCode::SetIndex, obj, key, cur, line);
                            }
                            self.free_reg(key);
                        }
                    }
                    Ok(dst)
                })();
                self.free_reg(cur);
                self.free_reg(one);
                self.free_reg(obj);
                result
            }
            _ => {
                self.sink
                    .add_error(target.token(), "invalid increment/decrement target");
                Ok(BAD_REGISTER)
            }
        }
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let saved_tail = std::mem::replace(&mut self.func_mut().tail_position, false);
        let result = self.compile_binary_inner(op, left, right, dst, line);
        self.func_mut().tail_position = saved_tail;
        result
    }

    fn compile_binary_inner(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                if self.compile_expression(left, dst)? == BAD_REGISTER {
                    return Ok(BAD_REGISTER);
                }
                let (temp, ok) = self.compile_expr_to_temp(right)?;
                if ok {
                    let opcode = match op {
                        BinaryOp::Add => OpCode::Add,
                        BinaryOp::Sub => OpCode::Sub,
                        BinaryOp::Mul => OpCode::Mul,
                        _ => OpCode::Div,
                    };
                    self.emit_abc(opcode, dst, dst, temp, line);
                }
                self.free_reg(temp);
                if ok { Ok(dst) } else { Ok(BAD_REGISTER) }
            }
            BinaryOp::Less => {
                if self.compile_expression(left, dst)? == BAD_REGISTER {
                    return Ok(BAD_REGISTER);
                }
                let (temp, ok) = self.compile_expr_to_temp(right)?;
                if ok {
                    self.emit_abc(OpCode::Less, dst, dst, temp, line);
                }
                self.free_reg(temp);
                if ok { Ok(dst) } else { Ok(BAD_REGISTER) }
            }
            BinaryOp::StrictEqual => {
                if self.compile_expression(left, dst)? == BAD_REGISTER {
                    return Ok(BAD_REGISTER);
                }
                let (temp, ok) = self.compile_expr_to_temp(right)?;
                if ok {
                    self.emit_abc(OpCode::StrictEqual, dst, dst, temp, line);
                }
                self.free_reg(temp);
                if ok { Ok(dst) } else { Ok(BAD_REGISTER) }
            }
            BinaryOp::StrictNotEqual => {
                let r = self.compile_binary_inner(BinaryOp::StrictEqual, left, right, dst, line)?;
                if r == BAD_REGISTER {
                    return Ok(BAD_REGISTER);
                }
                self.emit_ab(OpCode::Not, dst, dst, line);
                Ok(dst)
            }
            // The remaining comparisons reduce to `Less` with swapped
            // operands and/or a negation; both sides need preserving.
            BinaryOp::Greater | BinaryOp::LessEqual | BinaryOp::GreaterEqual => {
                let (l, ok_l) = self.compile_expr_to_temp(left)?;
                if !ok_l {
                    self.free_reg(l);
                    return Ok(BAD_REGISTER);
                }
                let (r, ok_r) = self.compile_expr_to_temp(right)?;
                if !ok_r {
                    self.free_reg(l);
                    self.free_reg(r);
                    return Ok(BAD_REGISTER);
                }
                match op {
                    BinaryOp::Greater => self.emit_abc(OpCode::Less, dst, r, l, line),
                    BinaryOp::LessEqual => {
                        self.emit_abc(OpCode::Less, dst, r, l, line);
                        self.emit_ab(OpCode::Not, dst, dst, line);
                    }
                    _ => {
                        self.emit_abc(OpCode::Less, dst, l, r, line);
                        self.emit_ab(OpCode::Not, dst, dst, line);
                    }
                }
                self.free_reg(l);
                self.free_reg(r);
                Ok(dst)
            }
        }
    }

    fn compile_logical(
        &mut self,
        op: LogicalOp,
        left: &Expr,
        right: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        // The right operand inherits the tail position (`return a && f()`),
        // the left operand never is one.
        let entry_tail = self.func().tail_position;
        self.func_mut().tail_position = false;
        if self.compile_expression(left, dst)? == BAD_REGISTER {
            self.func_mut().tail_position = entry_tail;
            return Ok(BAD_REGISTER);
        }
        let mut to_end: Vec<usize> = Vec::new();
        let mut to_right: Vec<usize> = Vec::new();
        match op {
            LogicalOp::And => {
                to_end.push(self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(dst), line));
            }
            LogicalOp::Or => {
                let t = self.alloc_reg()?;
                self.emit_ab(OpCode::Not, t, dst, line);
                to_end.push(self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(t), line));
                self.free_reg(t);
            }
            LogicalOp::Coalesce => {
                let t = self.alloc_reg()?;
                let probe = self.alloc_reg()?;
                self.emit_load_undefined(probe, line);
                self.emit_abc(OpCode::StrictEqual, t, dst, probe, line);
                self.emit_ab(OpCode::Not, t, t, line);
                to_right.push(self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(t), line));
                self.emit_load_const(probe, Value::Null, line)?;
                self.emit_abc(OpCode::StrictEqual, t, dst, probe, line);
                self.emit_ab(OpCode::Not, t, t, line);
                to_right.push(self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(t), line));
                to_end.push(self.emit_placeholder_jump(OpCode::Jump, None, line));
                self.free_reg(probe);
                self.free_reg(t);
            }
        }
        self.patch_all(&to_right)?;
        self.func_mut().tail_position = entry_tail;
        let r = self.compile_expression(right, dst)?;
        self.patch_all(&to_end)?;
        if r == BAD_REGISTER {
            return Ok(BAD_REGISTER);
        }
        Ok(dst)
    }

    fn compile_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let saved_tail = std::mem::replace(&mut self.func_mut().tail_position, false);
        let r = self.compile_expression(operand, dst);
        self.func_mut().tail_position = saved_tail;
        if r? == BAD_REGISTER {
            return Ok(BAD_REGISTER);
        }
        let opcode = match op {
            UnaryOp::Not => OpCode::Not,
            UnaryOp::Neg => OpCode::Neg,
            UnaryOp::TypeOf => OpCode::TypeOf,
        };
        self.emit_ab(opcode, dst, dst, line);
        Ok(dst)
    }

    fn compile_conditional(
        &mut self,
        condition: &Expr,
        consequence: &Expr,
        alternative: &Expr,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        // Both branches inherit the tail position; the condition does not.
        let entry_tail = self.func().tail_position;
        self.func_mut().tail_position = false;
        let (cond, ok) = self.compile_expr_to_temp(condition)?;
        if !ok {
            self.free_reg(cond);
            self.func_mut().tail_position = entry_tail;
            return Ok(BAD_REGISTER);
        }
        let to_else = self.emit_placeholder_jump(OpCode::JumpIfFalse, Some(cond), line);
        self.free_reg(cond);

        self.func_mut().tail_position = entry_tail;
        let then_ok = self.compile_expression(consequence, dst)? != BAD_REGISTER;
        let to_end = self.emit_placeholder_jump(OpCode::Jump, None, line);
        self.patch(to_else)?;
        self.func_mut().tail_position = entry_tail;
        let else_ok = self.compile_expression(alternative, dst)? != BAD_REGISTER;
        self.patch(to_end)?;
        if then_ok && else_ok {
            Ok(dst)
        } else {
            Ok(BAD_REGISTER)
        }
    }

    fn compile_call(
        &mut self,
        callee: &Expr,
        arguments: &[Expr],
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        // Capture the flag before operand compilation clears it.
        let is_tail = self.func().tail_position;
        self.func_mut().tail_position = false;

        let argc = arguments.len();
        if argc > u8::MAX as usize {
            self.sink.add_error(
                crate::ast::Token::new(line),
                "call has more than 255 arguments",
            );
            return Ok(BAD_REGISTER);
        }

        // Method calls evaluate the receiver once and thread it as `this`.
        let result = if let Expr::Member { object, property, .. } = callee {
            let base = self.func_mut().regs.alloc_span(2 + argc)?;
            let ok = (|| -> Result<bool, CodegenError> {
                if self.compile_expression(object, base + 1)? == BAD_REGISTER {
                    return Ok(false);
                }
                match property {
                    MemberKey::Prop { name } => {
                        self.emit_get_prop(base, base + 1, &name.name, line)?;
                    }
                    MemberKey::Index { expr } => {
                        let (key, ok) = self.compile_expr_to_temp(expr)?;
                        if ok {
                            self.emit_abc(OpCode::GetIndex, base, base + 1, key, line);
                        }
                        self.free_reg(key);
                        if !ok {
                            return Ok(false);
                        }
                    }
                }
                for (i, arg) in arguments.iter().enumerate() {
                    if self.compile_expression(arg, base + 2 + i as Register)? == BAD_REGISTER {
                        return Ok(false);
                    }
                }
                self.emit_abc(OpCode::CallMethod, dst, base, argc as u8, line);
                Ok(true)
            })();
            self.func_mut().regs.free_span(base, 2 + argc);
            ok?
        } else {
            let base = self.func_mut().regs.alloc_span(1 + argc)?;
            let ok = (|| -> Result<bool, CodegenError> {
                if self.compile_expression(callee, base)? == BAD_REGISTER {
                    return Ok(false);
                }
                for (i, arg) in arguments.iter().enumerate() {
                    if self.compile_expression(arg, base + 1 + i as Register)? == BAD_REGISTER {
                        return Ok(false);
                    }
                }
                if is_tail {
                    self.emit_abc_tail(base, argc as u8, line);
                } else {
                    self.emit_abc(OpCode::Call, dst, base, argc as u8, line);
                }
                Ok(true)
            })();
            self.func_mut().regs.free_span(base, 1 + argc);
            ok?
        };

        self.func_mut().tail_position = is_tail;
        if result { Ok(dst) } else { Ok(BAD_REGISTER) }
    }

    fn emit_abc_tail(&mut self, f: Register, argc: u8, line: u32) {
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::TailCall, line);
        chunk.emit_byte(f);
        chunk.emit_byte(argc);
    }

    fn compile_member_read(
        &mut self,
        object: &Expr,
        property: &MemberKey,
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let saved_tail = std::mem::replace(&mut self.func_mut().tail_position, false);
        let result = (|| -> Result<Register, CodegenError> {
            let (obj, ok) = self.compile_expr_to_temp(object)?;
            if !ok {
                self.free_reg(obj);
                return Ok(BAD_REGISTER);
            }
            match property {
                MemberKey::Prop { name } => {
                    self.emit_get_prop(dst, obj, &name.name, line)?;
                }
                MemberKey::Index { expr } => {
                    let (key, ok) = self.compile_expr_to_temp(expr)?;
                    if ok {
                        self.emit_abc(OpCode::GetIndex, dst, obj, key, line);
                    }
                    self.free_reg(key);
                    if !ok {
                        self.free_reg(obj);
                        return Ok(BAD_REGISTER);
                    }
                }
            }
            self.free_reg(obj);
            Ok(dst)
        })();
        self.func_mut().tail_position = saved_tail;
        result
    }

    fn compile_array(
        &mut self,
        elements: &[Expr],
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        let n = elements.len();
        if n > u8::MAX as usize {
            self.sink.add_error(
                crate::ast::Token::new(line),
                "array literal has more than 255 elements",
            );
            return Ok(BAD_REGISTER);
        }
        if n == 0 {
            self.emit_abc(OpCode::NewArray, dst, 0, 0, line);
            return Ok(dst);
        }
        let base = self.func_mut().regs.alloc_span(n)?;
        let ok = (|| -> Result<bool, CodegenError> {
            for (i, element) in elements.iter().enumerate() {
                if self.compile_expression(element, base + i as Register)? == BAD_REGISTER {
                    return Ok(false);
                }
            }
            self.emit_abc(OpCode::NewArray, dst, base, n as u8, line);
            Ok(true)
        })();
        self.func_mut().regs.free_span(base, n);
        if ok? { Ok(dst) } else { Ok(BAD_REGISTER) }
    }

    fn compile_object(
        &mut self,
        properties: &[(PropKey, Expr)],
        dst: Register,
        line: u32,
    ) -> Result<Register, CodegenError> {
        self.emit_reg(OpCode::NewObject, dst, line);
        for (key, value) in properties {
            let (temp, ok) = self.compile_expr_to_temp(value)?;
            if ok {
                let name = match key {
                    PropKey::Ident { name } => name.name.clone(),
                    PropKey::String { value } => value.clone(),
                };
                self.emit_set_prop(dst, &name, temp, line)?;
            }
            self.free_reg(temp);
            if !ok {
                return Ok(BAD_REGISTER);
            }
        }
        Ok(dst)
    }

    fn compile_function_expression(
        &mut self,
        function: &FunctionLiteral,
        dst: Register,
    ) -> Result<Register, CodegenError> {
        let hint = function
            .name
            .as_ref()
            .map(|n| n.name.clone())
            .unwrap_or_default();
        let (fidx, free) = self.compile_function_literal(function, &hint)?;
        self.emit_closure(dst, fidx, &free, function.token.line)?;
        Ok(dst)
    }
}

fn compound_op(op: AssignOp) -> OpCode {
    match op {
        AssignOp::AddAssign => OpCode::Add,
        _ => OpCode::Sub,
    }
}
