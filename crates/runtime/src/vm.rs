//! The dispatch loop
//!
//! One `Frame` per activation. Calls push frames, returns pop them and
//! write the result into the caller's destination register. Exception
//! handlers and finally guards live on a per-frame handler stack;
//! `Throw` unwinds through it, and the pending-completion record carries
//! `break`/`continue`/`return` completions through finally bodies.

use crate::error::RuntimeError;
use crate::value::{ClosureData, IterState, Key, LoadedFunction, NativeFn, ObjectData, Value};
use lumen_core::{Chunk, OpCode};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Call-depth cap; recursion past this raises a runtime error.
const MAX_FRAMES: usize = 1024;

#[derive(Debug)]
enum Handler {
    /// A `catch`: land the thrown value in `reg` and resume at `pc`.
    Catch { reg: usize, pc: usize },
    /// A `finally` guard: run the finally body at `pc` with the pending
    /// record set before continuing the abrupt completion.
    Finally { pc: usize },
}

/// Pending abrupt completion carried through a finally body.
#[derive(Debug, Default)]
enum Pending {
    #[default]
    None,
    Break(usize),
    Continue(usize),
    Return(Value),
    Rethrow(Value),
}

struct Frame {
    func: Rc<LoadedFunction>,
    regs: Vec<Value>,
    pc: usize,
    upvalues: Vec<Rc<RefCell<Value>>>,
    /// Capture cells for this frame's registers, created lazily when a
    /// closure captures a local.
    cells: HashMap<u8, Rc<RefCell<Value>>>,
    handlers: Vec<Handler>,
    pending: Pending,
    /// Caller register receiving the return value.
    dst: usize,
    /// True for internal calls (iterator cleanup) whose result is dropped.
    discard: bool,
    this: Value,
}

impl Frame {
    fn new(func: Rc<LoadedFunction>, dst: usize, this: Value) -> Frame {
        let register_count = func.register_count;
        Frame {
            func,
            regs: vec![Value::Undefined; register_count],
            pc: 0,
            upvalues: Vec::new(),
            cells: HashMap::new(),
            handlers: Vec::new(),
            pending: Pending::None,
            dst,
            discard: false,
            this,
        }
    }
}

/// The Lumen virtual machine.
pub struct Vm {
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Vm {
        Vm {
            globals: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Execute a compiled unit and return its completion value.
    pub fn run(&mut self, chunk: &Chunk) -> Result<Value, RuntimeError> {
        self.globals = vec![Value::Undefined; chunk.globals.len()];
        // The well-known symbol namespace: `Symbol.iterator`.
        if let Some(slot) = chunk.globals.iter().position(|g| g == "Symbol") {
            let ns = ObjectData::default();
            ns.set(
                Key::Str(Rc::from("iterator")),
                Value::Symbol(Rc::from("Symbol.iterator")),
            );
            self.globals[slot] = Value::Object(Rc::new(ns));
        }

        let root = LoadedFunction::load_root(chunk);
        self.frames.push(Frame::new(root, 0, Value::Undefined));
        let result = self.dispatch();
        self.frames.clear();
        result
    }

    /// Read a global slot after a run, for tests and tooling.
    pub fn global(&self, chunk: &Chunk, name: &str) -> Option<Value> {
        let slot = chunk.globals.iter().position(|g| g == name)?;
        self.globals.get(slot).cloned()
    }

    fn error(&self, message: impl Into<String>, op_pc: usize) -> RuntimeError {
        let line = self
            .frames
            .last()
            .map(|f| f.func.chunk.line_for_pc(op_pc))
            .unwrap_or(0);
        RuntimeError::new(message, line)
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("dispatch requires a frame")
    }

    fn reg(&self, index: usize) -> Value {
        self.frames
            .last()
            .expect("dispatch requires a frame")
            .regs[index]
            .clone()
    }

    fn set_reg(&mut self, index: usize, value: Value) {
        self.frame().regs[index] = value;
    }

    fn constant(&self, index: usize) -> Value {
        self.frames
            .last()
            .expect("dispatch requires a frame")
            .func
            .constants[index]
            .clone()
    }

    fn dispatch(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let frame = self.frames.last().expect("dispatch requires a frame");
            let op_pc = frame.pc;
            let code = &frame.func.chunk.code;
            if op_pc >= code.len() {
                return Err(self.error("execution ran past the end of the chunk", op_pc));
            }
            let byte = code[op_pc];
            let Some(op) = OpCode::from_byte(byte) else {
                return Err(self.error(format!("invalid opcode 0x{:02x}", byte), op_pc));
            };

            match op {
                OpCode::LoadUndefined => {
                    let dst = self.operand(1) as usize;
                    self.advance(2);
                    self.set_reg(dst, Value::Undefined);
                }
                OpCode::LoadConst => {
                    let dst = self.operand(1) as usize;
                    let idx = self.operand_u16(2) as usize;
                    self.advance(4);
                    let value = self.constant(idx);
                    self.set_reg(dst, value);
                }
                OpCode::Move => {
                    let dst = self.operand(1) as usize;
                    let src = self.operand(2) as usize;
                    self.advance(3);
                    let value = self.reg(src);
                    self.set_reg(dst, value);
                }
                OpCode::Closure => self.op_closure(),
                OpCode::GetGlobal => {
                    let dst = self.operand(1) as usize;
                    let slot = self.operand_u16(2) as usize;
                    self.advance(4);
                    let value = match self.globals.get(slot) {
                        Some(value) => value.clone(),
                        None => return Err(self.error("global slot out of range", op_pc)),
                    };
                    self.set_reg(dst, value);
                }
                OpCode::SetGlobal => {
                    let slot = self.operand_u16(1) as usize;
                    let src = self.operand(3) as usize;
                    self.advance(4);
                    if slot >= self.globals.len() {
                        return Err(self.error("global slot out of range", op_pc));
                    }
                    self.globals[slot] = self.reg(src);
                }
                OpCode::GetProp => {
                    let dst = self.operand(1) as usize;
                    let obj = self.operand(2) as usize;
                    let idx = self.operand_u16(3) as usize;
                    self.advance(5);
                    let name = self.constant_name(idx, op_pc)?;
                    let object = self.reg(obj);
                    let value = get_property(&object, &name);
                    self.set_reg(dst, value);
                }
                OpCode::SetProp => {
                    let obj = self.operand(1) as usize;
                    let idx = self.operand_u16(2) as usize;
                    let src = self.operand(4) as usize;
                    self.advance(5);
                    let name = self.constant_name(idx, op_pc)?;
                    let object = self.reg(obj);
                    let value = self.reg(src);
                    if let Value::Object(data) = &object {
                        data.set(Key::Str(name), value);
                    }
                }
                OpCode::GetIndex => {
                    let (dst, obj, key) = self.operands_abc();
                    self.advance(4);
                    let object = self.reg(obj);
                    let key = self.reg(key);
                    let value = self.get_index(&object, &key, op_pc)?;
                    self.set_reg(dst, value);
                }
                OpCode::SetIndex => {
                    let (obj, key, src) = self.operands_abc();
                    self.advance(4);
                    let object = self.reg(obj);
                    let key = self.reg(key);
                    let value = self.reg(src);
                    self.set_index(&object, &key, value, op_pc)?;
                }
                OpCode::GetOwnKeys => {
                    let dst = self.operand(1) as usize;
                    let obj = self.operand(2) as usize;
                    self.advance(3);
                    let keys = match self.reg(obj) {
                        Value::Object(data) => data
                            .string_keys()
                            .into_iter()
                            .map(Value::String)
                            .collect(),
                        Value::Array(a) => (0..a.borrow().len())
                            .map(|i| Value::string(&i.to_string()))
                            .collect(),
                        _ => Vec::new(),
                    };
                    self.set_reg(dst, Value::new_array(keys));
                }
                OpCode::TypeOf => {
                    let dst = self.operand(1) as usize;
                    let src = self.operand(2) as usize;
                    self.advance(3);
                    let name = self.reg(src).type_of();
                    self.set_reg(dst, Value::string(name));
                }
                OpCode::StrictEqual => {
                    let (dst, a, b) = self.operands_abc();
                    self.advance(4);
                    let eq = self.reg(a).strict_equals(&self.reg(b));
                    self.set_reg(dst, Value::Bool(eq));
                }
                OpCode::Less => {
                    let (dst, a, b) = self.operands_abc();
                    self.advance(4);
                    let result = match (self.reg(a), self.reg(b)) {
                        (Value::Number(x), Value::Number(y)) => x < y,
                        (Value::String(x), Value::String(y)) => x < y,
                        _ => false,
                    };
                    self.set_reg(dst, Value::Bool(result));
                }
                OpCode::Add => {
                    let (dst, a, b) = self.operands_abc();
                    self.advance(4);
                    let result = match (self.reg(a), self.reg(b)) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        (Value::String(x), y) => {
                            Value::string(&format!("{}{}", x, y.to_display_string()))
                        }
                        (x, Value::String(y)) => {
                            Value::string(&format!("{}{}", x.to_display_string(), y))
                        }
                        (x, y) => {
                            let msg = format!("cannot add {} and {}", x.type_of(), y.type_of());
                            return Err(self.error(msg, op_pc));
                        }
                    };
                    self.set_reg(dst, result);
                }
                OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    let (dst, a, b) = self.operands_abc();
                    self.advance(4);
                    let (x, y) = match (self.reg(a), self.reg(b)) {
                        (Value::Number(x), Value::Number(y)) => (x, y),
                        (x, y) => {
                            let msg =
                                format!("arithmetic on {} and {}", x.type_of(), y.type_of());
                            return Err(self.error(msg, op_pc));
                        }
                    };
                    let result = match op {
                        OpCode::Sub => x - y,
                        OpCode::Mul => x * y,
                        _ => x / y,
                    };
                    self.set_reg(dst, Value::Number(result));
                }
                OpCode::Not => {
                    let dst = self.operand(1) as usize;
                    let src = self.operand(2) as usize;
                    self.advance(3);
                    let value = !self.reg(src).is_truthy();
                    self.set_reg(dst, Value::Bool(value));
                }
                OpCode::Neg => {
                    let dst = self.operand(1) as usize;
                    let src = self.operand(2) as usize;
                    self.advance(3);
                    let result = match self.reg(src) {
                        Value::Number(n) => Value::Number(-n),
                        other => {
                            let msg = format!("cannot negate {}", other.type_of());
                            return Err(self.error(msg, op_pc));
                        }
                    };
                    self.set_reg(dst, result);
                }
                OpCode::IsArray => {
                    let dst = self.operand(1) as usize;
                    let src = self.operand(2) as usize;
                    self.advance(3);
                    let is_array = matches!(self.reg(src), Value::Array(_));
                    self.set_reg(dst, Value::Bool(is_array));
                }
                OpCode::Jump => {
                    let disp = self.operand_i16(1) as isize;
                    self.advance(3);
                    self.jump(disp, op_pc)?;
                }
                OpCode::JumpIfFalse => {
                    let reg = self.operand(1) as usize;
                    let disp = self.operand_i16(2) as isize;
                    self.advance(4);
                    if !self.reg(reg).is_truthy() {
                        self.jump(disp, op_pc)?;
                    }
                }
                OpCode::Return => {
                    let reg = self.operand(1) as usize;
                    let value = self.reg(reg);
                    if let Some(result) = self.do_return(value) {
                        return Ok(result);
                    }
                }
                OpCode::ReturnUndefined => {
                    if let Some(result) = self.do_return(Value::Undefined) {
                        return Ok(result);
                    }
                }
                OpCode::ReturnViaFinally => {
                    let reg = self.operand(1) as usize;
                    let value = self.reg(reg);
                    if let Some(result) = self.return_via_finally(value) {
                        return Ok(result);
                    }
                }
                OpCode::ReturnUndefinedViaFinally => {
                    if let Some(result) = self.return_via_finally(Value::Undefined) {
                        return Ok(result);
                    }
                }
                OpCode::PushBreak => {
                    let disp = self.operand_i16(1) as isize;
                    self.advance(3);
                    let target = self.branch_target(disp, op_pc)?;
                    self.frame().pending = Pending::Break(target);
                }
                OpCode::PushContinue => {
                    let disp = self.operand_i16(1) as isize;
                    self.advance(3);
                    let target = self.branch_target(disp, op_pc)?;
                    self.frame().pending = Pending::Continue(target);
                }
                OpCode::IteratorCleanup => {
                    let reg = self.operand(1) as usize;
                    self.advance(2);
                    self.iterator_cleanup(reg)?;
                }
                OpCode::Call => {
                    let (dst, f, argc) = self.operands_abc();
                    self.advance(4);
                    let callee = self.reg(f);
                    let args = self.arg_window(f + 1, argc);
                    self.invoke(callee, dst, args, Value::Undefined, op_pc)?;
                }
                OpCode::TailCall => {
                    let f = self.operand(1) as usize;
                    let argc = self.operand(2) as usize;
                    self.advance(3);
                    self.op_tail_call(f, argc, op_pc)?;
                }
                OpCode::CallMethod => {
                    let (dst, m, argc) = self.operands_abc();
                    self.advance(4);
                    let callee = self.reg(m);
                    let this = self.reg(m + 1);
                    let args = self.arg_window(m + 2, argc);
                    self.invoke(callee, dst, args, this, op_pc)?;
                }
                OpCode::GetUpvalue => {
                    let dst = self.operand(1) as usize;
                    let idx = self.operand(2) as usize;
                    self.advance(3);
                    let cell = self
                        .frames
                        .last()
                        .and_then(|f| f.upvalues.get(idx))
                        .cloned();
                    match cell {
                        Some(cell) => {
                            let value = cell.borrow().clone();
                            self.set_reg(dst, value);
                        }
                        None => return Err(self.error("upvalue index out of range", op_pc)),
                    }
                }
                OpCode::SetUpvalue => {
                    let idx = self.operand(1) as usize;
                    let src = self.operand(2) as usize;
                    self.advance(3);
                    let value = self.reg(src);
                    let cell = self
                        .frames
                        .last()
                        .and_then(|f| f.upvalues.get(idx))
                        .cloned();
                    match cell {
                        Some(cell) => *cell.borrow_mut() = value,
                        None => return Err(self.error("upvalue index out of range", op_pc)),
                    }
                }
                OpCode::NewArray => {
                    let (dst, base, n) = self.operands_abc();
                    self.advance(4);
                    let elements = self.arg_window(base, n);
                    self.set_reg(dst, Value::new_array(elements));
                }
                OpCode::NewObject => {
                    let dst = self.operand(1) as usize;
                    self.advance(2);
                    self.set_reg(dst, Value::new_object());
                }
                OpCode::PushCatch => {
                    let reg = self.operand(1) as usize;
                    let disp = self.operand_i16(2) as isize;
                    self.advance(4);
                    let pc = self.branch_target(disp, op_pc)?;
                    self.frame().handlers.push(Handler::Catch { reg, pc });
                }
                OpCode::PushFinallyGuard => {
                    let disp = self.operand_i16(1) as isize;
                    self.advance(3);
                    let pc = self.branch_target(disp, op_pc)?;
                    self.frame().handlers.push(Handler::Finally { pc });
                }
                OpCode::PopHandler => {
                    self.advance(1);
                    if self.frame().handlers.pop().is_none() {
                        return Err(self.error("handler stack underflow", op_pc));
                    }
                }
                OpCode::Throw => {
                    let reg = self.operand(1) as usize;
                    self.advance(2);
                    let value = self.reg(reg);
                    self.throw(value, op_pc)?;
                }
                OpCode::EndFinally => {
                    self.advance(1);
                    if let Some(result) = self.end_finally(op_pc)? {
                        return Ok(result);
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Decoding helpers
    // -----------------------------------------------------------------

    fn operand(&self, offset: usize) -> u8 {
        let frame = self.frames.last().expect("dispatch requires a frame");
        frame.func.chunk.code[frame.pc + offset]
    }

    fn operand_u16(&self, offset: usize) -> u16 {
        let frame = self.frames.last().expect("dispatch requires a frame");
        frame.func.chunk.read_u16(frame.pc + offset)
    }

    fn operand_i16(&self, offset: usize) -> i16 {
        let frame = self.frames.last().expect("dispatch requires a frame");
        frame.func.chunk.read_i16(frame.pc + offset)
    }

    fn operands_abc(&self) -> (usize, usize, usize) {
        (
            self.operand(1) as usize,
            self.operand(2) as usize,
            self.operand(3) as usize,
        )
    }

    fn advance(&mut self, len: usize) {
        self.frame().pc += len;
    }

    fn arg_window(&self, base: usize, count: usize) -> Vec<Value> {
        let frame = self.frames.last().expect("dispatch requires a frame");
        frame.regs[base..base + count].to_vec()
    }

    fn constant_name(&self, idx: usize, op_pc: usize) -> Result<Rc<str>, RuntimeError> {
        match self.constant(idx) {
            Value::String(s) => Ok(s),
            other => Err(self.error(
                format!("property name constant is {}", other.type_of()),
                op_pc,
            )),
        }
    }

    /// Resolve a displacement relative to the already-advanced PC into an
    /// absolute, bounds-checked target.
    fn branch_target(&self, disp: isize, op_pc: usize) -> Result<usize, RuntimeError> {
        let frame = self.frames.last().expect("dispatch requires a frame");
        let target = frame.pc as isize + disp;
        if target < 0 || target > frame.func.chunk.code.len() as isize {
            return Err(self.error("branch target out of range", op_pc));
        }
        Ok(target as usize)
    }

    fn jump(&mut self, disp: isize, op_pc: usize) -> Result<(), RuntimeError> {
        let target = self.branch_target(disp, op_pc)?;
        self.frame().pc = target;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Properties and indexing
    // -----------------------------------------------------------------

    fn get_index(
        &self,
        object: &Value,
        key: &Value,
        op_pc: usize,
    ) -> Result<Value, RuntimeError> {
        match (object, key) {
            (Value::Array(a), Value::Number(_) | Value::String(_)) => {
                let arr = a.borrow();
                Ok(match array_index(key) {
                    Some(idx) if idx < arr.len() => arr[idx].clone(),
                    _ => Value::Undefined,
                })
            }
            (Value::Array(_) | Value::String(_), Value::Symbol(_)) => {
                // Strings and arrays answer the well-known iterator symbol
                // with the built-in factory.
                Ok(Value::Native(NativeFn::IteratorFactory))
            }
            (Value::String(s), Value::Number(n)) => {
                if n.fract() == 0.0 && *n >= 0.0 {
                    match s.chars().nth(*n as usize) {
                        Some(c) => Ok(Value::string(&c.to_string())),
                        None => Ok(Value::Undefined),
                    }
                } else {
                    Ok(Value::Undefined)
                }
            }
            (Value::Object(data), Value::Symbol(s)) => {
                Ok(data.get(&Key::Sym(s.clone())).unwrap_or(Value::Undefined))
            }
            (Value::Object(data), key) => {
                let name: Rc<str> = Rc::from(key.to_display_string().as_str());
                Ok(data.get(&Key::Str(name)).unwrap_or(Value::Undefined))
            }
            (other, _) => Err(self.error(format!("cannot index {}", other.type_of()), op_pc)),
        }
    }

    fn set_index(
        &self,
        object: &Value,
        key: &Value,
        value: Value,
        op_pc: usize,
    ) -> Result<(), RuntimeError> {
        match (object, key) {
            (Value::Array(a), Value::Number(_) | Value::String(_)) => {
                let Some(idx) = array_index(key) else {
                    return Ok(());
                };
                let mut arr = a.borrow_mut();
                if idx >= arr.len() {
                    arr.resize(idx + 1, Value::Undefined);
                }
                arr[idx] = value;
                Ok(())
            }
            (Value::Object(data), Value::Symbol(s)) => {
                data.set(Key::Sym(s.clone()), value);
                Ok(())
            }
            (Value::Object(data), key) => {
                let name: Rc<str> = Rc::from(key.to_display_string().as_str());
                data.set(Key::Str(name), value);
                Ok(())
            }
            (other, _) => Err(self.error(format!("cannot index {}", other.type_of()), op_pc)),
        }
    }

    // -----------------------------------------------------------------
    // Closures and calls
    // -----------------------------------------------------------------

    fn op_closure(&mut self) {
        let dst = self.operand(1) as usize;
        let fidx = self.operand_u16(2) as usize;
        let n = self.operand(4) as usize;
        let mut upvalues = Vec::with_capacity(n);
        for i in 0..n {
            let is_local = self.operand(5 + 2 * i) == 1;
            let index = self.operand(6 + 2 * i);
            let cell = if is_local {
                let frame = self.frame();
                if let Some(cell) = frame.cells.get(&index).cloned() {
                    cell
                } else {
                    let cell = Rc::new(RefCell::new(frame.regs[index as usize].clone()));
                    frame.cells.insert(index, cell.clone());
                    cell
                }
            } else {
                let frame = self.frames.last().expect("dispatch requires a frame");
                frame.upvalues[index as usize].clone()
            };
            upvalues.push(cell);
        }
        self.advance(5 + 2 * n);
        let frame = self.frame();
        let func = frame.func.functions[fidx].clone();
        frame.regs[dst] = Value::Closure(Rc::new(ClosureData { func, upvalues }));
    }

    fn iterator_cleanup(&mut self, reg: usize) -> Result<(), RuntimeError> {
        match self.reg(reg) {
            Value::Iterator(state) => {
                close_iterator(&state);
                Ok(())
            }
            Value::Object(data) => {
                // A user iterator: honor its `return()` method when present.
                match data.get(&Key::Str(Rc::from("return"))) {
                    Some(Value::Closure(closure)) => {
                        self.push_frame_discard(closure, Value::Object(data))
                    }
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn push_frame_discard(
        &mut self,
        closure: Rc<ClosureData>,
        this: Value,
    ) -> Result<(), RuntimeError> {
        if self.frames.len() >= MAX_FRAMES {
            let pc = self.frames.last().map(|f| f.pc).unwrap_or(0);
            return Err(self.error("call stack overflow", pc));
        }
        let mut frame = Frame::new(closure.func.clone(), 0, this);
        frame.upvalues = closure.upvalues.clone();
        frame.discard = true;
        self.frames.push(frame);
        Ok(())
    }

    fn invoke(
        &mut self,
        callee: Value,
        dst: usize,
        args: Vec<Value>,
        this: Value,
        op_pc: usize,
    ) -> Result<(), RuntimeError> {
        match callee {
            Value::Closure(closure) => {
                if self.frames.len() >= MAX_FRAMES {
                    return Err(self.error("call stack overflow", op_pc));
                }
                let mut frame = Frame::new(closure.func.clone(), dst, this);
                frame.upvalues = closure.upvalues.clone();
                let copy = args.len().min(frame.regs.len());
                frame.regs[..copy].clone_from_slice(&args[..copy]);
                self.frames.push(frame);
                Ok(())
            }
            Value::Native(native) => {
                let result = self.call_native(native, this, &args, op_pc)?;
                self.set_reg(dst, result);
                Ok(())
            }
            other => Err(self.error(format!("{} is not callable", other.type_of()), op_pc)),
        }
    }

    fn op_tail_call(&mut self, f: usize, argc: usize, op_pc: usize) -> Result<(), RuntimeError> {
        let callee = self.reg(f);
        let args = self.arg_window(f + 1, argc);
        match callee {
            Value::Closure(closure) => {
                // Reuse the current activation: the caller's destination and
                // discard flag carry over.
                let (dst, discard, this) = {
                    let frame = self.frame();
                    (frame.dst, frame.discard, frame.this.clone())
                };
                self.frames.pop();
                let mut frame = Frame::new(closure.func.clone(), dst, this);
                frame.upvalues = closure.upvalues.clone();
                frame.discard = discard;
                let copy = args.len().min(frame.regs.len());
                frame.regs[..copy].clone_from_slice(&args[..copy]);
                self.frames.push(frame);
                Ok(())
            }
            Value::Native(native) => {
                let result = self.call_native(native, Value::Undefined, &args, op_pc)?;
                // A native tail call degenerates to a plain return.
                if self.do_return(result).is_some() {
                    return Err(self.error("tail call from the unit frame", op_pc));
                }
                Ok(())
            }
            other => Err(self.error(format!("{} is not callable", other.type_of()), op_pc)),
        }
    }

    fn call_native(
        &mut self,
        native: NativeFn,
        this: Value,
        _args: &[Value],
        op_pc: usize,
    ) -> Result<Value, RuntimeError> {
        match native {
            NativeFn::IteratorFactory => match this {
                Value::String(s) => Ok(Value::Iterator(Rc::new(RefCell::new(IterState::Str {
                    chars: s.chars().collect(),
                    index: 0,
                    done: false,
                })))),
                Value::Array(a) => Ok(Value::Iterator(Rc::new(RefCell::new(
                    IterState::Array {
                        array: a,
                        index: 0,
                        done: false,
                    },
                )))),
                other => {
                    Err(self.error(format!("{} is not iterable", other.type_of()), op_pc))
                }
            },
            NativeFn::IterNext => match this {
                Value::Iterator(state) => Ok(iterator_next(&state)),
                other => Err(self.error(
                    format!("next() receiver is {}", other.type_of()),
                    op_pc,
                )),
            },
            NativeFn::IterReturn => match this {
                Value::Iterator(state) => {
                    close_iterator(&state);
                    Ok(iter_result(true, Value::Undefined))
                }
                other => Err(self.error(
                    format!("return() receiver is {}", other.type_of()),
                    op_pc,
                )),
            },
        }
    }

    // -----------------------------------------------------------------
    // Returns, throws, finally dispatch
    // -----------------------------------------------------------------

    /// Pop the current frame, delivering `value` to the caller. Returns the
    /// unit result when the popped frame was the last one.
    fn do_return(&mut self, value: Value) -> Option<Value> {
        let frame = self.frames.pop().expect("return requires a frame");
        match self.frames.last_mut() {
            Some(caller) => {
                if !frame.discard {
                    caller.regs[frame.dst] = value;
                }
                None
            }
            None => Some(value),
        }
    }

    /// `ReturnViaFinally`: route through the innermost finally guard of the
    /// current frame, or return plainly when none is installed.
    fn return_via_finally(&mut self, value: Value) -> Option<Value> {
        let frame = self.frames.last_mut().expect("return requires a frame");
        while let Some(handler) = frame.handlers.pop() {
            if let Handler::Finally { pc } = handler {
                frame.pending = Pending::Return(value);
                frame.pc = pc;
                return None;
            }
            // Catch handlers between here and the finally do not trigger on
            // return; they are simply abandoned.
        }
        self.do_return(value)
    }

    fn throw(&mut self, exc: Value, op_pc: usize) -> Result<(), RuntimeError> {
        let uncaught = self.error(
            format!("uncaught exception: {}", exc.to_display_string()),
            op_pc,
        );
        while let Some(frame) = self.frames.last_mut() {
            while let Some(handler) = frame.handlers.pop() {
                match handler {
                    Handler::Catch { reg, pc } => {
                        frame.regs[reg] = exc;
                        frame.pc = pc;
                        frame.pending = Pending::None;
                        return Ok(());
                    }
                    Handler::Finally { pc } => {
                        frame.pending = Pending::Rethrow(exc);
                        frame.pc = pc;
                        return Ok(());
                    }
                }
            }
            self.frames.pop();
        }
        Err(uncaught)
    }

    /// `EndFinally`: dispatch the pending completion after a finally body.
    fn end_finally(&mut self, op_pc: usize) -> Result<Option<Value>, RuntimeError> {
        let pending = std::mem::take(&mut self.frame().pending);
        match pending {
            Pending::None => Ok(None),
            Pending::Break(pc) | Pending::Continue(pc) => {
                self.frame().pc = pc;
                Ok(None)
            }
            Pending::Return(value) => Ok(self.return_via_finally(value)),
            Pending::Rethrow(exc) => {
                self.throw(exc, op_pc)?;
                Ok(None)
            }
        }
    }
}

/// Array element index of `key`, accepting both numeric keys and their
/// canonical string forms (`GetOwnKeys` over an array produces the latter).
fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Some(*n as usize),
        Value::String(s) => s.parse::<usize>().ok(),
        _ => None,
    }
}

fn get_property(object: &Value, name: &Rc<str>) -> Value {
    match object {
        Value::Object(data) => data.get(&Key::Str(name.clone())).unwrap_or(Value::Undefined),
        Value::Array(a) => match &**name {
            "length" => Value::Number(a.borrow().len() as f64),
            _ => Value::Undefined,
        },
        Value::String(s) => match &**name {
            "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        },
        Value::Iterator(_) => match &**name {
            "next" => Value::Native(NativeFn::IterNext),
            "return" => Value::Native(NativeFn::IterReturn),
            _ => Value::Undefined,
        },
        _ => Value::Undefined,
    }
}

fn iter_result(done: bool, value: Value) -> Value {
    let data = ObjectData::default();
    data.set(Key::Str(Rc::from("done")), Value::Bool(done));
    data.set(Key::Str(Rc::from("value")), value);
    Value::Object(Rc::new(data))
}

fn iterator_next(state: &Rc<RefCell<IterState>>) -> Value {
    let mut state = state.borrow_mut();
    match &mut *state {
        IterState::Str { chars, index, done } => {
            if *done || *index >= chars.len() {
                *done = true;
                iter_result(true, Value::Undefined)
            } else {
                let c = chars[*index];
                *index += 1;
                iter_result(false, Value::string(&c.to_string()))
            }
        }
        IterState::Array { array, index, done } => {
            let current = {
                let arr = array.borrow();
                if *done || *index >= arr.len() {
                    None
                } else {
                    Some(arr[*index].clone())
                }
            };
            match current {
                Some(value) => {
                    *index += 1;
                    iter_result(false, value)
                }
                None => {
                    *done = true;
                    iter_result(true, Value::Undefined)
                }
            }
        }
    }
}

fn close_iterator(state: &Rc<RefCell<IterState>>) {
    let mut state = state.borrow_mut();
    match &mut *state {
        IterState::Str { done, .. } | IterState::Array { done, .. } => *done = true,
    }
}
