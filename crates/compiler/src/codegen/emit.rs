//! Instruction emission and jump patching
//!
//! Forward jumps are emitted with two reserved displacement bytes and
//! patched once the target PC exists. Displacements are signed 16-bit,
//! relative to the first byte after the instruction; anything outside that
//! window is a fatal error, both for patched forward jumps and for the
//! manually-written back edges of loop tails.

use super::CodegenError;
use super::state::Compiler;
use lumen_core::{JUMP_MAX, JUMP_MIN, OpCode, Register, Value};

impl Compiler<'_> {
    pub(super) fn current_pc(&self) -> usize {
        self.func().chunk.current_pc()
    }

    pub(super) fn emit_op(&mut self, op: OpCode, line: u32) {
        self.func_mut().chunk.emit_opcode(op, line);
    }

    /// `op dst` single-register instruction.
    pub(super) fn emit_reg(&mut self, op: OpCode, reg: Register, line: u32) {
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(op, line);
        chunk.emit_byte(reg);
    }

    /// `op a, b` two-register instruction.
    pub(super) fn emit_ab(&mut self, op: OpCode, a: Register, b: Register, line: u32) {
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(op, line);
        chunk.emit_byte(a);
        chunk.emit_byte(b);
    }

    /// `op a, b, c` three-register (or reg/count) instruction.
    pub(super) fn emit_abc(&mut self, op: OpCode, a: Register, b: Register, c: u8, line: u32) {
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(op, line);
        chunk.emit_byte(a);
        chunk.emit_byte(b);
        chunk.emit_byte(c);
    }

    /// `op reg, imm:u16` instruction (`LoadConst`, `GetGlobal`).
    pub(super) fn emit_reg_u16(&mut self, op: OpCode, reg: Register, imm: u16, line: u32) {
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(op, line);
        chunk.emit_byte(reg);
        chunk.emit_u16(imm);
    }

    pub(super) fn emit_move(&mut self, dst: Register, src: Register, line: u32) {
        if dst != src {
            self.emit_ab(OpCode::Move, dst, src, line);
        }
    }

    pub(super) fn emit_load_undefined(&mut self, dst: Register, line: u32) {
        self.emit_reg(OpCode::LoadUndefined, dst, line);
    }

    /// Intern `value` and load it into `dst`.
    pub(super) fn emit_load_const(
        &mut self,
        dst: Register,
        value: Value,
        line: u32,
    ) -> Result<(), CodegenError> {
        let idx = self.add_constant(value)?;
        self.emit_reg_u16(OpCode::LoadConst, dst, idx, line);
        Ok(())
    }

    pub(super) fn add_constant(&mut self, value: Value) -> Result<u16, CodegenError> {
        let idx = self.func_mut().chunk.add_constant(value);
        u16::try_from(idx)
            .map_err(|_| CodegenError::Internal("constant pool overflowed u16".to_string()))
    }

    pub(super) fn emit_set_global(&mut self, slot: u16, src: Register, line: u32) {
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::SetGlobal, line);
        chunk.emit_u16(slot);
        chunk.emit_byte(src);
    }

    /// `GetProp dst, obj, name` with the property name interned.
    pub(super) fn emit_get_prop(
        &mut self,
        dst: Register,
        obj: Register,
        name: &str,
        line: u32,
    ) -> Result<(), CodegenError> {
        let idx = self.add_constant(Value::String(name.to_string()))?;
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::GetProp, line);
        chunk.emit_byte(dst);
        chunk.emit_byte(obj);
        chunk.emit_u16(idx);
        Ok(())
    }

    pub(super) fn emit_set_prop(
        &mut self,
        obj: Register,
        name: &str,
        src: Register,
        line: u32,
    ) -> Result<(), CodegenError> {
        let idx = self.add_constant(Value::String(name.to_string()))?;
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::SetProp, line);
        chunk.emit_byte(obj);
        chunk.emit_u16(idx);
        chunk.emit_byte(src);
        Ok(())
    }

    /// Emit a branch instruction with a reserved displacement, returning the
    /// position of its opcode byte for later patching. `reg` is present for
    /// the branch forms that test or carry a register.
    pub(super) fn emit_placeholder_jump(
        &mut self,
        op: OpCode,
        reg: Option<Register>,
        line: u32,
    ) -> usize {
        let chunk = &mut self.func_mut().chunk;
        let pos = chunk.current_pc();
        chunk.emit_opcode(op, line);
        if let Some(reg) = reg {
            chunk.emit_byte(reg);
        }
        chunk.emit_u16(0xFFFF);
        pos
    }

    /// Patch the branch at `pos` to land on the current PC.
    pub(super) fn patch(&mut self, pos: usize) -> Result<(), CodegenError> {
        let target = self.current_pc();
        self.patch_to(pos, target)
    }

    /// Patch the branch at `pos` to land on `target` (which may be behind
    /// `pos` — `while` continues patch backwards to the loop head).
    pub(super) fn patch_to(&mut self, pos: usize, target: usize) -> Result<(), CodegenError> {
        let chunk = &mut self.func_mut().chunk;
        let len = chunk
            .instruction_len_at(pos)
            .ok_or_else(|| CodegenError::Internal(format!("no instruction at {}", pos)))?;
        let disp = target as i64 - (pos + len) as i64;
        if disp > JUMP_MAX as i64 || disp < JUMP_MIN as i64 {
            return Err(CodegenError::JumpTooFar { from: pos, to: target });
        }
        chunk.write_i16_at(pos + len - 2, disp as i16);
        Ok(())
    }

    /// Patch a batch of placeholders to the current PC.
    pub(super) fn patch_all(&mut self, positions: &[usize]) -> Result<(), CodegenError> {
        for &pos in positions {
            self.patch(pos)?;
        }
        Ok(())
    }

    /// Emit an unconditional jump whose (usually backward) target is already
    /// known, e.g. a loop tail's back edge.
    pub(super) fn emit_jump_to(&mut self, target: usize, line: u32) -> Result<(), CodegenError> {
        let pos = self.current_pc();
        let disp = target as i64 - (pos + OpCode::Jump.base_len()) as i64;
        if disp > JUMP_MAX as i64 || disp < JUMP_MIN as i64 {
            return Err(CodegenError::JumpTooFar { from: pos, to: target });
        }
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::Jump, line);
        chunk.emit_u16(disp as i16 as u16);
        Ok(())
    }

    /// Back edge of `do…while`: `JumpIfFalse` on the negated condition, so
    /// the loop re-enters while the original condition holds.
    pub(super) fn emit_cond_jump_to(
        &mut self,
        reg: Register,
        target: usize,
        line: u32,
    ) -> Result<(), CodegenError> {
        let pos = self.current_pc();
        let disp = target as i64 - (pos + OpCode::JumpIfFalse.base_len()) as i64;
        if disp > JUMP_MAX as i64 || disp < JUMP_MIN as i64 {
            return Err(CodegenError::JumpTooFar { from: pos, to: target });
        }
        let chunk = &mut self.func_mut().chunk;
        chunk.emit_opcode(OpCode::JumpIfFalse, line);
        chunk.emit_byte(reg);
        chunk.emit_u16(disp as i16 as u16);
        Ok(())
    }
}
