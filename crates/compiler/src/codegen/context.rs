//! Loop, label and finally contexts
//!
//! `break`/`continue` cannot be emitted as resolved jumps: their targets lie
//! ahead of the cursor. Each active loop or labeled statement keeps a
//! context buffering those forward placeholders until the statement closes
//! and patches them. `try…finally` keeps a parallel context so non-local
//! exits inside the protected region can be re-routed through the finally
//! body first.

use lumen_core::{BAD_REGISTER, Register};

/// What a loop must tear down when control leaves it abnormally.
#[derive(Debug, Clone, Copy)]
pub struct IteratorCleanup {
    /// Register pinned to the live iterator for the loop's duration.
    pub iterator_reg: Register,
    /// True for iterator-protocol loops, whose `return()` method must run on
    /// non-local exit. The `for…of` array fast path sets this false.
    pub uses_protocol: bool,
}

/// Context of one active loop, switch, or labeled statement.
#[derive(Debug)]
pub struct LoopContext {
    /// Label bound to the statement, if any.
    pub label: Option<String>,
    /// PC of the loop head; -1 for non-loop contexts (labeled blocks,
    /// switch).
    pub loop_start_pc: i32,
    /// Where `continue` lands; -1 for non-loop contexts, which reject
    /// `continue` during lowering.
    pub continue_target_pc: i32,
    /// Positions of pending forward jumps emitted by `break`.
    pub break_placeholders: Vec<usize>,
    /// Positions of pending jumps emitted by `continue`.
    pub continue_placeholders: Vec<usize>,
    /// Iterator teardown for `for…of` protocol loops.
    pub iterator_cleanup: Option<IteratorCleanup>,
    /// Completion-value register; `BAD_REGISTER` when the statement has no
    /// completion destination.
    pub completion_reg: Register,
    /// Whether an unlabeled `break` may target this context. True for loops
    /// and switch; labeled non-loop statements answer only to their label.
    pub implicit_break_target: bool,
    /// Runtime handler-stack depth when the context was pushed. A non-local
    /// exit targeting this context pops every handler installed above it.
    pub handler_depth: usize,
}

impl LoopContext {
    /// Context for a real loop.
    pub fn for_loop(
        label: Option<String>,
        loop_start_pc: usize,
        continue_target_pc: usize,
        completion_reg: Register,
    ) -> LoopContext {
        LoopContext {
            label,
            loop_start_pc: loop_start_pc as i32,
            continue_target_pc: continue_target_pc as i32,
            break_placeholders: Vec::new(),
            continue_placeholders: Vec::new(),
            iterator_cleanup: None,
            completion_reg,
            implicit_break_target: true,
            handler_depth: 0,
        }
    }

    /// Context for a switch: `break` targets it, `continue` skips it.
    pub fn for_switch(label: Option<String>, completion_reg: Register) -> LoopContext {
        LoopContext {
            label,
            loop_start_pc: -1,
            continue_target_pc: -1,
            break_placeholders: Vec::new(),
            continue_placeholders: Vec::new(),
            iterator_cleanup: None,
            completion_reg,
            implicit_break_target: true,
            handler_depth: 0,
        }
    }

    /// Context for a labeled non-loop statement: only `break <label>`
    /// reaches it.
    pub fn for_labeled_block(label: String, completion_reg: Register) -> LoopContext {
        LoopContext {
            label: Some(label),
            loop_start_pc: -1,
            continue_target_pc: -1,
            break_placeholders: Vec::new(),
            continue_placeholders: Vec::new(),
            iterator_cleanup: None,
            completion_reg,
            implicit_break_target: false,
            handler_depth: 0,
        }
    }

    /// Whether `continue` may target this context.
    pub fn is_loop(&self) -> bool {
        self.loop_start_pc >= 0
    }

    pub fn has_completion(&self) -> bool {
        self.completion_reg != BAD_REGISTER
    }
}

/// Context of one active `try…finally`.
#[derive(Debug)]
pub struct FinallyContext {
    /// Loop-stack depth when the try entered. A `break`/`continue` whose
    /// target context sits *below* this depth exits the protected region
    /// and must run the finally body on the way out.
    pub loop_stack_depth_at_creation: usize,
    /// Pending unconditional jumps into the finally entry, patched when the
    /// entry PC is known.
    pub jump_to_finally_placeholders: Vec<usize>,
    /// Runtime handler-stack depth with this region's guard on top. Exits
    /// detouring through the finally pop down to here first; the finally
    /// entry itself pops the guard.
    pub handler_depth_at_creation: usize,
}

impl FinallyContext {
    pub fn new(loop_stack_depth: usize, handler_depth: usize) -> FinallyContext {
        FinallyContext {
            loop_stack_depth_at_creation: loop_stack_depth,
            jump_to_finally_placeholders: Vec::new(),
            handler_depth_at_creation: handler_depth,
        }
    }
}
