//! Instruction alphabet for the Lumen register VM
//!
//! Every instruction is an opcode byte followed by a fixed operand layout,
//! except `Closure`, which carries a trailing list of upvalue descriptors.
//! Register operands are one byte. Constant-pool indices, global slots and
//! function indices are big-endian `u16`. Branch displacements are big-endian
//! signed 16-bit values relative to the first byte *after* the instruction.
//!
//! Branch-family opcodes keep their displacement in the final two bytes of
//! the instruction; the compiler's patcher relies on that.

use serde::{Deserialize, Serialize};

/// One opcode of the Lumen instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    /// `dst` — write `undefined` into `dst`.
    LoadUndefined = 0,
    /// `dst, const:u16` — load a constant-pool entry.
    LoadConst,
    /// `dst, src` — register copy.
    Move,
    /// `dst, func:u16, n, n x (is_local, index)` — materialize a closure over
    /// function-table entry `func`, capturing `n` upvalues. `is_local = 1`
    /// captures the enclosing frame's register `index`; `is_local = 0` chains
    /// the enclosing closure's upvalue `index`.
    Closure,
    /// `dst, slot:u16` — read a global slot.
    GetGlobal,
    /// `slot:u16, src` — write a global slot.
    SetGlobal,
    /// `dst, obj, name:u16` — property read; `name` indexes the constant pool.
    GetProp,
    /// `obj, name:u16, src` — property write.
    SetProp,
    /// `dst, obj, key` — computed member read.
    GetIndex,
    /// `obj, key, src` — computed member write.
    SetIndex,
    /// `dst, obj` — own-enumerable string keys of `obj`, insertion-ordered.
    GetOwnKeys,
    /// `dst, src` — the `typeof` string of `src`.
    TypeOf,
    /// `dst, a, b` — strict equality.
    StrictEqual,
    /// `dst, a, b` — numeric/lexicographic less-than.
    Less,
    /// `dst, a, b` — addition; concatenates when either side is a string.
    Add,
    /// `dst, a, b` — subtraction.
    Sub,
    /// `dst, a, b` — multiplication.
    Mul,
    /// `dst, a, b` — division.
    Div,
    /// `dst, src` — boolean negation (of truthiness).
    Not,
    /// `dst, src` — numeric negation.
    Neg,
    /// `dst, src` — true iff `src` is an array.
    IsArray,
    /// `disp:i16` — unconditional relative jump.
    Jump,
    /// `reg, disp:i16` — jump when `reg` is falsy.
    JumpIfFalse,
    /// `reg` — return `reg` to the caller.
    Return,
    /// return `undefined` to the caller.
    ReturnUndefined,
    /// `reg` — return `reg`, routing through the innermost active `finally`.
    ReturnViaFinally,
    /// return `undefined`, routing through the innermost active `finally`.
    ReturnUndefinedViaFinally,
    /// `disp:i16` — record a pending break completion whose destination is
    /// the displacement target; consumed by `EndFinally`.
    PushBreak,
    /// `disp:i16` — record a pending continue completion.
    PushContinue,
    /// `reg` — invoke the `return()` method of the iterator in `reg`, if any.
    IteratorCleanup,
    /// `dst, f, argc` — call `f` with arguments in `f+1 ..= f+argc`.
    Call,
    /// `f, argc` — tail call: replace the current frame.
    TailCall,
    /// `dst, m, argc` — call method `m` with receiver in `m+1` and arguments
    /// in `m+2 ..= m+1+argc`.
    CallMethod,
    /// `dst, idx` — read upvalue cell `idx` of the running closure.
    GetUpvalue,
    /// `idx, src` — write upvalue cell `idx`.
    SetUpvalue,
    /// `dst, base, n` — build an array from registers `base .. base+n`.
    NewArray,
    /// `dst` — fresh empty object.
    NewObject,
    /// `reg, disp:i16` — install a catch handler; a throw lands the thrown
    /// value in `reg` and resumes at the displacement target.
    PushCatch,
    /// `disp:i16` — install a finally guard; throws and `ReturnViaFinally`
    /// route through the displacement target.
    PushFinallyGuard,
    /// pop the innermost handler installed in this frame.
    PopHandler,
    /// `reg` — throw the value in `reg`.
    Throw,
    /// finally epilogue: dispatch the pending completion record.
    EndFinally,
}

impl OpCode {
    /// Decode an opcode byte. `None` for bytes outside the alphabet.
    pub fn from_byte(b: u8) -> Option<OpCode> {
        if b <= OpCode::EndFinally as u8 {
            // Safety not required: exhaustive match keeps this table honest.
            Some(match b {
                0 => OpCode::LoadUndefined,
                1 => OpCode::LoadConst,
                2 => OpCode::Move,
                3 => OpCode::Closure,
                4 => OpCode::GetGlobal,
                5 => OpCode::SetGlobal,
                6 => OpCode::GetProp,
                7 => OpCode::SetProp,
                8 => OpCode::GetIndex,
                9 => OpCode::SetIndex,
                10 => OpCode::GetOwnKeys,
                11 => OpCode::TypeOf,
                12 => OpCode::StrictEqual,
                13 => OpCode::Less,
                14 => OpCode::Add,
                15 => OpCode::Sub,
                16 => OpCode::Mul,
                17 => OpCode::Div,
                18 => OpCode::Not,
                19 => OpCode::Neg,
                20 => OpCode::IsArray,
                21 => OpCode::Jump,
                22 => OpCode::JumpIfFalse,
                23 => OpCode::Return,
                24 => OpCode::ReturnUndefined,
                25 => OpCode::ReturnViaFinally,
                26 => OpCode::ReturnUndefinedViaFinally,
                27 => OpCode::PushBreak,
                28 => OpCode::PushContinue,
                29 => OpCode::IteratorCleanup,
                30 => OpCode::Call,
                31 => OpCode::TailCall,
                32 => OpCode::CallMethod,
                33 => OpCode::GetUpvalue,
                34 => OpCode::SetUpvalue,
                35 => OpCode::NewArray,
                36 => OpCode::NewObject,
                37 => OpCode::PushCatch,
                38 => OpCode::PushFinallyGuard,
                39 => OpCode::PopHandler,
                40 => OpCode::Throw,
                41 => OpCode::EndFinally,
                _ => return None,
            })
        } else {
            None
        }
    }

    /// Instruction length in bytes, counting the opcode byte.
    ///
    /// For `Closure` this is the base length only; the real instruction is
    /// `base_len() + 2 * n` where `n` is the descriptor count in byte 4.
    pub fn base_len(self) -> usize {
        match self {
            OpCode::ReturnUndefined
            | OpCode::ReturnUndefinedViaFinally
            | OpCode::PopHandler
            | OpCode::EndFinally => 1,
            OpCode::LoadUndefined
            | OpCode::Return
            | OpCode::ReturnViaFinally
            | OpCode::IteratorCleanup
            | OpCode::Throw
            | OpCode::NewObject => 2,
            OpCode::Move
            | OpCode::GetOwnKeys
            | OpCode::TypeOf
            | OpCode::Not
            | OpCode::Neg
            | OpCode::IsArray
            | OpCode::Jump
            | OpCode::PushBreak
            | OpCode::PushContinue
            | OpCode::TailCall
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::PushFinallyGuard => 3,
            OpCode::LoadConst
            | OpCode::GetGlobal
            | OpCode::SetGlobal
            | OpCode::GetIndex
            | OpCode::SetIndex
            | OpCode::StrictEqual
            | OpCode::Less
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::JumpIfFalse
            | OpCode::Call
            | OpCode::CallMethod
            | OpCode::NewArray
            | OpCode::PushCatch => 4,
            OpCode::GetProp | OpCode::SetProp | OpCode::Closure => 5,
        }
    }

    /// True for opcodes that carry a branch displacement in their final two
    /// bytes.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::PushBreak
                | OpCode::PushContinue
                | OpCode::PushCatch
                | OpCode::PushFinallyGuard
        )
    }

    /// Mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::LoadUndefined => "load_undefined",
            OpCode::LoadConst => "load_const",
            OpCode::Move => "move",
            OpCode::Closure => "closure",
            OpCode::GetGlobal => "get_global",
            OpCode::SetGlobal => "set_global",
            OpCode::GetProp => "get_prop",
            OpCode::SetProp => "set_prop",
            OpCode::GetIndex => "get_index",
            OpCode::SetIndex => "set_index",
            OpCode::GetOwnKeys => "get_own_keys",
            OpCode::TypeOf => "typeof",
            OpCode::StrictEqual => "strict_equal",
            OpCode::Less => "less",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Not => "not",
            OpCode::Neg => "neg",
            OpCode::IsArray => "is_array",
            OpCode::Jump => "jump",
            OpCode::JumpIfFalse => "jump_if_false",
            OpCode::Return => "return",
            OpCode::ReturnUndefined => "return_undefined",
            OpCode::ReturnViaFinally => "return_via_finally",
            OpCode::ReturnUndefinedViaFinally => "return_undefined_via_finally",
            OpCode::PushBreak => "push_break",
            OpCode::PushContinue => "push_continue",
            OpCode::IteratorCleanup => "iterator_cleanup",
            OpCode::Call => "call",
            OpCode::TailCall => "tail_call",
            OpCode::CallMethod => "call_method",
            OpCode::GetUpvalue => "get_upvalue",
            OpCode::SetUpvalue => "set_upvalue",
            OpCode::NewArray => "new_array",
            OpCode::NewObject => "new_object",
            OpCode::PushCatch => "push_catch",
            OpCode::PushFinallyGuard => "push_finally_guard",
            OpCode::PopHandler => "pop_handler",
            OpCode::Throw => "throw",
            OpCode::EndFinally => "end_finally",
        }
    }
}
