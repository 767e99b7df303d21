//! Compiler state and core types
//!
//! One `Compiler` drives one compilation unit. Function literals nest, so
//! the compiler keeps a stack of `FuncState` frames — innermost last — each
//! owning its chunk, register allocator, scope chain, upvalue list, and the
//! loop/finally context stacks that never cross a function boundary.
//!
//! The module global-name table is unit-wide and lives on the `Compiler`
//! itself; it is written into the root chunk when the unit finishes.

use super::context::{FinallyContext, LoopContext};
use super::registers::RegisterAllocator;
use super::symbols::{Binding, BindingKind, SymbolTable};
use super::CodegenError;
use crate::config::CompilerConfig;
use crate::diagnostics::DiagnosticSink;
use lumen_core::{Chunk, Register};

/// One free variable captured by a nested function. The descriptor bytes
/// (`is_local`, index) are derived against the enclosing frame when the
/// `Closure` instruction is emitted, after any `update_register` fix-up has
/// run; until then the capture is tracked by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeSymbol {
    pub name: String,
}

/// Per-function compilation state.
#[derive(Debug)]
pub struct FuncState {
    /// Name hint for the function table entry; empty for the unit itself.
    pub name: String,
    pub arity: u8,
    pub chunk: Chunk,
    pub regs: RegisterAllocator,
    pub table: SymbolTable,
    /// Captured free variables, in capture order; the position is the
    /// upvalue index `GetUpvalue` uses.
    pub upvalues: Vec<FreeSymbol>,
    /// Active loops / labeled statements, innermost last.
    pub loop_stack: Vec<LoopContext>,
    /// Active `try…finally` regions, innermost last.
    pub finally_stack: Vec<FinallyContext>,
    /// Runtime handler-stack depth at the current emission point, tracked
    /// so non-local exits can pop the handlers they jump out of.
    pub handler_depth: usize,
    /// True while lowering statements physically inside a `finally` body.
    pub in_finally_block: bool,
    /// Read-only traversal attribute consulted by call lowering (§tail
    /// calls). Set around return-value compilation, restored after.
    pub tail_position: bool,
}

impl FuncState {
    pub fn new(name: &str, arity: u8, strict: bool, max_registers: usize) -> FuncState {
        FuncState {
            name: name.to_string(),
            arity,
            chunk: Chunk::new(strict),
            regs: RegisterAllocator::new(max_registers),
            table: SymbolTable::new(),
            upvalues: Vec::new(),
            loop_stack: Vec::new(),
            finally_stack: Vec::new(),
            handler_depth: 0,
            in_finally_block: false,
            tail_position: false,
        }
    }
}

/// Result of resolving a name from the innermost scope outward, across
/// function boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedName {
    Local { reg: Register, is_const: bool },
    Global { slot: u16, is_const: bool },
    Upvalue { index: u8, is_const: bool },
    /// Declared but not yet backed by storage (recursive literal fix-up
    /// pending).
    Unresolved { is_const: bool },
}

/// Bytecode compiler for one unit.
pub struct Compiler<'a> {
    pub(super) sink: &'a mut DiagnosticSink,
    pub(super) config: &'a CompilerConfig,
    pub(super) funcs: Vec<FuncState>,
    /// Module global-name table: slot index -> name.
    pub(super) globals: Vec<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(sink: &'a mut DiagnosticSink, config: &'a CompilerConfig) -> Compiler<'a> {
        let root = FuncState::new("", 0, config.strict, config.max_registers);
        Compiler {
            sink,
            config,
            funcs: vec![root],
            globals: Vec::new(),
        }
    }

    /// Innermost function frame.
    pub(super) fn func(&self) -> &FuncState {
        self.funcs.last().expect("compiler always has a root frame")
    }

    pub(super) fn func_mut(&mut self) -> &mut FuncState {
        self.funcs.last_mut().expect("compiler always has a root frame")
    }

    /// True while compiling inside a function literal (as opposed to the
    /// unit's top level).
    pub(super) fn in_function(&self) -> bool {
        self.funcs.len() > 1
    }

    /// Reserve a slot in the module global-name table, reusing an existing
    /// one for the same name.
    pub(super) fn global_slot(&mut self, name: &str) -> u16 {
        if let Some(idx) = self.globals.iter().position(|g| g == name) {
            return idx as u16;
        }
        self.globals.push(name.to_string());
        (self.globals.len() - 1) as u16
    }

    /// Record a global-slot binding for `name` in the current scope,
    /// reserving the slot if absent.
    pub(super) fn define_global(&mut self, name: &str, is_const: bool) -> u16 {
        let slot = self.global_slot(name);
        self.func_mut()
            .table
            .define(name, Binding::new(BindingKind::Global { slot }, is_const, name));
        slot
    }

    /// Resolve `name` from the innermost scope outward. Captures across
    /// function boundaries are materialized as upvalues on every frame the
    /// reference crosses.
    pub(super) fn resolve_name(&mut self, name: &str) -> Option<ResolvedName> {
        let top = self.funcs.len() - 1;
        self.resolve_in_func(top, name)
    }

    fn resolve_in_func(&mut self, fi: usize, name: &str) -> Option<ResolvedName> {
        if let Some((binding, _)) = self.funcs[fi].table.resolve(name) {
            let is_const = binding.is_const;
            return Some(match binding.kind {
                BindingKind::Local { reg } => ResolvedName::Local { reg, is_const },
                BindingKind::Global { slot } => ResolvedName::Global { slot, is_const },
                BindingKind::Upvalue { index } => ResolvedName::Upvalue { index, is_const },
                BindingKind::Unresolved => ResolvedName::Unresolved { is_const },
            });
        }
        if fi == 0 {
            return None;
        }
        match self.resolve_in_func(fi - 1, name)? {
            ResolvedName::Local { is_const, .. }
            | ResolvedName::Upvalue { is_const, .. }
            | ResolvedName::Unresolved { is_const } => {
                let index = self.add_upvalue(fi, name);
                Some(ResolvedName::Upvalue { index, is_const })
            }
            // Globals are addressed directly from any depth; no capture.
            global @ ResolvedName::Global { .. } => Some(global),
        }
    }

    fn add_upvalue(&mut self, fi: usize, name: &str) -> u8 {
        let upvalues = &mut self.funcs[fi].upvalues;
        if let Some(pos) = upvalues.iter().position(|u| u.name == name) {
            return pos as u8;
        }
        upvalues.push(FreeSymbol {
            name: name.to_string(),
        });
        (upvalues.len() - 1) as u8
    }

    /// Derive the `(is_local, index)` descriptor bytes for one free symbol
    /// of a just-compiled function literal, against the current frame.
    pub(super) fn upvalue_descriptor(&self, name: &str) -> Result<(bool, u8), CodegenError> {
        let frame = self.func();
        if let Some((binding, _)) = frame.table.resolve(name) {
            return match binding.kind {
                BindingKind::Local { reg } => Ok((true, reg)),
                BindingKind::Upvalue { index } => Ok((false, index)),
                BindingKind::Unresolved => Err(CodegenError::Internal(format!(
                    "free symbol '{}' captured before register fix-up",
                    name
                ))),
                BindingKind::Global { .. } => Err(CodegenError::Internal(format!(
                    "free symbol '{}' resolved to a global at emission",
                    name
                ))),
            };
        }
        if let Some(pos) = frame.upvalues.iter().position(|u| u.name == name) {
            return Ok((false, pos as u8));
        }
        Err(CodegenError::Internal(format!(
            "free symbol '{}' not reachable from the enclosing frame",
            name
        )))
    }

    /// Push a loop/label context, stamping the current handler depth so
    /// non-local exits know how many handlers they cross.
    pub(super) fn push_loop_context(&mut self, mut ctx: LoopContext) {
        ctx.handler_depth = self.func().handler_depth;
        self.func_mut().loop_stack.push(ctx);
    }

    /// Enter a block scope of the current function.
    pub(super) fn begin_scope(&mut self) {
        self.func_mut().table.begin_scope();
    }

    /// Leave a block scope, releasing every register its bindings pinned.
    pub(super) fn end_scope(&mut self) {
        let popped = self.func_mut().table.end_scope();
        for (_, binding) in popped {
            if let BindingKind::Local { reg } = binding.kind {
                let frame = self.func_mut();
                frame.regs.unpin(reg);
                frame.regs.free(reg);
            }
        }
    }

    /// Scope placement rule: a declaration binds globally iff there is no
    /// enclosing function, the current symbol table has no outer parent,
    /// and the unit is not an indirect eval.
    pub(super) fn binds_globally(&self) -> bool {
        !self.in_function()
            && self.func().table.is_root()
            && self.config.unit != crate::config::UnitKind::IndirectEval
    }

    /// Find the loop context a `break`/`continue` targets. With no label,
    /// the innermost loop or switch wins (for `continue`, the innermost
    /// *loop*); labeled blocks answer only to their label. Returns the index
    /// into the loop stack.
    pub(super) fn resolve_jump_target(&self, label: Option<&str>, for_continue: bool) -> Option<usize> {
        let stack = &self.func().loop_stack;
        match label {
            Some(label) => stack
                .iter()
                .rposition(|ctx| ctx.label.as_deref() == Some(label)),
            None => {
                if for_continue {
                    stack.iter().rposition(|ctx| ctx.is_loop())
                } else {
                    stack.iter().rposition(|ctx| ctx.implicit_break_target)
                }
            }
        }
    }
}
