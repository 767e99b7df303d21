//! VM tests over hand-assembled chunks
//!
//! These bypass the compiler entirely: each test lays out a small
//! instruction stream by hand and checks the interpreter's observable
//! behavior, so a compiler regression cannot mask a VM one.

use lumen_core::{Chunk, FunctionProto, OpCode, Value as Constant};
use lumen_runtime::{Value, Vm};

struct Asm {
    chunk: Chunk,
}

impl Asm {
    fn new() -> Asm {
        Asm {
            chunk: Chunk::new(false),
        }
    }

    fn op(&mut self, op: OpCode, operands: &[u8]) -> &mut Asm {
        self.chunk.emit_opcode(op, 1);
        for &b in operands {
            self.chunk.emit_byte(b);
        }
        self
    }

    fn op_u16(&mut self, op: OpCode, pre: &[u8], imm: u16, post: &[u8]) -> &mut Asm {
        self.chunk.emit_opcode(op, 1);
        for &b in pre {
            self.chunk.emit_byte(b);
        }
        self.chunk.emit_u16(imm);
        for &b in post {
            self.chunk.emit_byte(b);
        }
        self
    }

    fn constant(&mut self, v: Constant) -> u16 {
        self.chunk.add_constant(v) as u16
    }

    fn run(&mut self) -> Value {
        Vm::new().run(&self.chunk).expect("runtime error")
    }
}

#[test]
fn test_load_const_and_add() {
    let mut asm = Asm::new();
    let two = asm.constant(Constant::Number(2.0));
    let three = asm.constant(Constant::Number(3.0));
    asm.op_u16(OpCode::LoadConst, &[0], two, &[]);
    asm.op_u16(OpCode::LoadConst, &[1], three, &[]);
    asm.op(OpCode::Add, &[2, 0, 1]);
    asm.op(OpCode::Return, &[2]);
    match asm.run() {
        Value::Number(n) => assert_eq!(n, 5.0),
        other => panic!("expected number, got {:?}", other),
    }
}

#[test]
fn test_string_concatenation() {
    let mut asm = Asm::new();
    let a = asm.constant(Constant::String("ab".into()));
    let b = asm.constant(Constant::Number(3.0));
    asm.op_u16(OpCode::LoadConst, &[0], a, &[]);
    asm.op_u16(OpCode::LoadConst, &[1], b, &[]);
    asm.op(OpCode::Add, &[2, 0, 1]);
    asm.op(OpCode::Return, &[2]);
    assert_eq!(asm.run().to_display_string(), "ab3");
}

#[test]
fn test_jump_if_false_skips_forward() {
    let mut asm = Asm::new();
    let one = asm.constant(Constant::Number(1.0));
    let two = asm.constant(Constant::Number(2.0));
    asm.op_u16(OpCode::LoadConst, &[0], one, &[]);
    asm.op(OpCode::Not, &[1, 0]); // r1 = false
    // Jump over the next LoadConst (4 bytes).
    asm.op_u16(OpCode::JumpIfFalse, &[1], 4, &[]);
    asm.op_u16(OpCode::LoadConst, &[0], two, &[]);
    asm.op(OpCode::Return, &[0]);
    match asm.run() {
        Value::Number(n) => assert_eq!(n, 1.0),
        other => panic!("expected 1, got {:?}", other),
    }
}

#[test]
fn test_backward_jump_loops() {
    // r0 = 0; loop: r0 = r0 + 1; if r0 < 3 jump back; return r0.
    let mut asm = Asm::new();
    let zero = asm.constant(Constant::Number(0.0));
    let one = asm.constant(Constant::Number(1.0));
    let three = asm.constant(Constant::Number(3.0));
    asm.op_u16(OpCode::LoadConst, &[0], zero, &[]);
    asm.op_u16(OpCode::LoadConst, &[1], one, &[]);
    asm.op_u16(OpCode::LoadConst, &[2], three, &[]);
    let loop_start = asm.chunk.current_pc();
    asm.op(OpCode::Add, &[0, 0, 1]);
    asm.op(OpCode::Less, &[3, 0, 2]);
    asm.op(OpCode::Not, &[3, 3]);
    // JumpIfFalse is 4 bytes; displacement back to loop_start.
    let disp = loop_start as i64 - (asm.chunk.current_pc() as i64 + 4);
    asm.op_u16(OpCode::JumpIfFalse, &[3], disp as i16 as u16, &[]);
    asm.op(OpCode::Return, &[0]);
    match asm.run() {
        Value::Number(n) => assert_eq!(n, 3.0),
        other => panic!("expected 3, got {:?}", other),
    }
}

#[test]
fn test_call_and_return() {
    // fn add1(x) { return x + 1 }  (hand-assembled proto)
    let mut body = Chunk::new(false);
    let one = body.add_constant(Constant::Number(1.0)) as u16;
    body.emit_opcode(OpCode::LoadConst, 1);
    body.emit_byte(1);
    body.emit_u16(one);
    body.emit_opcode(OpCode::Add, 1);
    body.emit_byte(2);
    body.emit_byte(0);
    body.emit_byte(1);
    body.emit_opcode(OpCode::Return, 1);
    body.emit_byte(2);

    let mut asm = Asm::new();
    asm.chunk.functions.push(FunctionProto {
        name: "add1".into(),
        arity: 1,
        register_count: 3,
        upvalue_count: 0,
        chunk: body,
    });
    let arg = asm.constant(Constant::Number(41.0));
    asm.op_u16(OpCode::Closure, &[0], 0, &[0]);
    asm.op_u16(OpCode::LoadConst, &[1], arg, &[]);
    asm.op(OpCode::Call, &[2, 0, 1]);
    asm.op(OpCode::Return, &[2]);
    match asm.run() {
        Value::Number(n) => assert_eq!(n, 42.0),
        other => panic!("expected 42, got {:?}", other),
    }
}

#[test]
fn test_upvalue_capture_shares_cell() {
    // Inner function reads upvalue 0, captured from the root's r0.
    let mut body = Chunk::new(false);
    body.emit_opcode(OpCode::GetUpvalue, 1);
    body.emit_byte(0);
    body.emit_byte(0);
    body.emit_opcode(OpCode::Return, 1);
    body.emit_byte(0);

    let mut asm = Asm::new();
    asm.chunk.functions.push(FunctionProto {
        name: "get".into(),
        arity: 0,
        register_count: 1,
        upvalue_count: 1,
        chunk: body,
    });
    let v = asm.constant(Constant::Number(7.0));
    asm.op_u16(OpCode::LoadConst, &[0], v, &[]);
    // Closure r1 = fn[0] capturing local r0.
    asm.op_u16(OpCode::Closure, &[1], 0, &[1, 1, 0]);
    asm.op(OpCode::Call, &[2, 1, 0]);
    asm.op(OpCode::Return, &[2]);
    match asm.run() {
        Value::Number(n) => assert_eq!(n, 7.0),
        other => panic!("expected 7, got {:?}", other),
    }
}

#[test]
fn test_array_answers_string_index_keys() {
    // r0 = [7]; read r0["0"], write r0["0"] = 9, read back r0[0].
    let mut asm = Asm::new();
    let seven = asm.constant(Constant::Number(7.0));
    let key = asm.constant(Constant::String("0".into()));
    let nine = asm.constant(Constant::Number(9.0));
    let zero = asm.constant(Constant::Number(0.0));
    asm.op_u16(OpCode::LoadConst, &[1], seven, &[]);
    asm.op(OpCode::NewArray, &[0, 1, 1]);
    asm.op_u16(OpCode::LoadConst, &[2], key, &[]);
    asm.op(OpCode::GetIndex, &[3, 0, 2]);
    asm.op_u16(OpCode::LoadConst, &[4], nine, &[]);
    asm.op(OpCode::SetIndex, &[0, 2, 4]);
    asm.op_u16(OpCode::LoadConst, &[5], zero, &[]);
    asm.op(OpCode::GetIndex, &[6, 0, 5]);
    asm.op(OpCode::Add, &[7, 3, 6]);
    asm.op(OpCode::Return, &[7]);
    match asm.run() {
        Value::Number(n) => assert_eq!(n, 16.0),
        other => panic!("expected 16, got {:?}", other),
    }
}

#[test]
fn test_throw_lands_in_catch() {
    let mut asm = Asm::new();
    let boom = asm.constant(Constant::String("boom".into()));
    // PushCatch r1 -> catch body; throw; catch body returns the caught value.
    asm.op_u16(OpCode::PushCatch, &[1], 6, &[]); // over LoadConst(4) + Throw(2)
    asm.op_u16(OpCode::LoadConst, &[0], boom, &[]);
    asm.op(OpCode::Throw, &[0]);
    asm.op(OpCode::Return, &[1]);
    assert_eq!(asm.run().to_display_string(), "boom");
}

#[test]
fn test_uncaught_throw_is_a_runtime_error() {
    let mut asm = Asm::new();
    let boom = asm.constant(Constant::String("boom".into()));
    asm.op_u16(OpCode::LoadConst, &[0], boom, &[]);
    asm.op(OpCode::Throw, &[0]);
    let err = Vm::new().run(&asm.chunk).expect_err("should not succeed");
    assert!(err.message.contains("uncaught"));
    assert!(err.message.contains("boom"));
}

#[test]
fn test_finally_guard_runs_on_throw_and_rethrows() {
    // PushFinallyGuard -> finally; throw; finally: set global 0; EndFinally
    // rethrows; no catch -> runtime error, but the global write happened.
    let mut chunk = Chunk::new(false);
    chunk.globals.push("witness".into());
    let boom = chunk.add_constant(Constant::String("boom".into())) as u16;
    let mark = chunk.add_constant(Constant::Number(1.0)) as u16;
    chunk.emit_opcode(OpCode::PushFinallyGuard, 1);
    chunk.emit_u16(6); // over LoadConst(4) + Throw(2)
    chunk.emit_opcode(OpCode::LoadConst, 1);
    chunk.emit_byte(0);
    chunk.emit_u16(boom);
    chunk.emit_opcode(OpCode::Throw, 1);
    chunk.emit_byte(0);
    // finally body
    chunk.emit_opcode(OpCode::LoadConst, 1);
    chunk.emit_byte(1);
    chunk.emit_u16(mark);
    chunk.emit_opcode(OpCode::SetGlobal, 1);
    chunk.emit_u16(0);
    chunk.emit_byte(1);
    chunk.emit_opcode(OpCode::EndFinally, 1);

    let mut vm = Vm::new();
    let err = vm.run(&chunk).expect_err("rethrow must surface");
    assert!(err.message.contains("boom"));
    match vm.global(&chunk, "witness") {
        Some(Value::Number(n)) => assert_eq!(n, 1.0),
        other => panic!("finally body did not run: {:?}", other),
    }
}

#[test]
fn test_string_iterator_protocol() {
    // let it = "ab"[Symbol.iterator]() via GetIndex + CallMethod, then
    // drive next() twice and observe done/value.
    let mut chunk = Chunk::new(false);
    chunk.globals.push("Symbol".into());
    let s = chunk.add_constant(Constant::String("ab".into())) as u16;
    let iter_name = chunk.add_constant(Constant::String("iterator".into())) as u16;
    let next_name = chunk.add_constant(Constant::String("next".into())) as u16;
    let value_name = chunk.add_constant(Constant::String("value".into())) as u16;

    // r0 = "ab"; r1 = Symbol; r1 = r1.iterator; r2 = r0[r1]; r3 = this=r0
    chunk.emit_opcode(OpCode::LoadConst, 1);
    chunk.emit_byte(0);
    chunk.emit_u16(s);
    chunk.emit_opcode(OpCode::GetGlobal, 1);
    chunk.emit_byte(1);
    chunk.emit_u16(0);
    chunk.emit_opcode(OpCode::GetProp, 1);
    chunk.emit_byte(1);
    chunk.emit_byte(1);
    chunk.emit_u16(iter_name);
    chunk.emit_opcode(OpCode::GetIndex, 1);
    chunk.emit_byte(2);
    chunk.emit_byte(0);
    chunk.emit_byte(1);
    chunk.emit_opcode(OpCode::Move, 1);
    chunk.emit_byte(3);
    chunk.emit_byte(0);
    // r4 = iterator
    chunk.emit_opcode(OpCode::CallMethod, 1);
    chunk.emit_byte(4);
    chunk.emit_byte(2);
    chunk.emit_byte(0);
    // r5 = r4.next; r6 = this=r4; r7 = result; r8 = result.value
    chunk.emit_opcode(OpCode::GetProp, 1);
    chunk.emit_byte(5);
    chunk.emit_byte(4);
    chunk.emit_u16(next_name);
    chunk.emit_opcode(OpCode::Move, 1);
    chunk.emit_byte(6);
    chunk.emit_byte(4);
    chunk.emit_opcode(OpCode::CallMethod, 1);
    chunk.emit_byte(7);
    chunk.emit_byte(5);
    chunk.emit_byte(0);
    chunk.emit_opcode(OpCode::GetProp, 1);
    chunk.emit_byte(8);
    chunk.emit_byte(7);
    chunk.emit_u16(value_name);
    chunk.emit_opcode(OpCode::Return, 1);
    chunk.emit_byte(8);

    let mut vm = Vm::new();
    let result = vm.run(&chunk).expect("runtime error");
    assert_eq!(result.to_display_string(), "a");
}
