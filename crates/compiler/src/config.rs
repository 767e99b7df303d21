//! Compiler configuration
//!
//! Knobs the embedder controls per compilation unit. The defaults compile a
//! plain non-strict top-level script.

use lumen_core::MAX_REGISTERS;

/// What kind of unit is being compiled. Scope placement of top-level
/// declarations depends on this: scripts bind at global scope, eval bodies
/// bind locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitKind {
    /// Top-level module/script.
    #[default]
    Script,
    /// `eval` called through a reference, evaluated against its own scope.
    IndirectEval,
    /// `eval` called directly inside a function.
    DirectEval,
}

/// Per-unit compiler configuration.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Strict-mode flag for the unit; stamped onto the emitted chunk and
    /// enables the reserved-name binding checks.
    pub strict: bool,
    /// Kind of unit being compiled.
    pub unit: UnitKind,
    /// Register budget per frame. Tests shrink this to exercise exhaustion;
    /// everything else uses the hardware-format maximum.
    pub max_registers: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            strict: false,
            unit: UnitKind::Script,
            max_registers: MAX_REGISTERS,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> CompilerConfig {
        CompilerConfig::default()
    }

    pub fn strict(mut self, strict: bool) -> CompilerConfig {
        self.strict = strict;
        self
    }

    pub fn unit(mut self, unit: UnitKind) -> CompilerConfig {
        self.unit = unit;
        self
    }
}
