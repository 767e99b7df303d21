//! Lexically-scoped symbol table
//!
//! One table per block scope, chained through `outer`. Entries are
//! insertion-ordered so scope teardown can release registers
//! deterministically. Lookup walks outward; definition inserts into the
//! innermost scope.
//!
//! A binding starts `Unresolved` when a name must exist before its value
//! does (recursive function literals) and is fixed up with
//! `update_register` once the closure register materializes.

use lumen_core::Register;

/// Storage a name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Declared but not yet backed by storage. Reading one of these is a
    /// compiler bug, not a user error.
    Unresolved,
    /// A frame register, pinned for the binding's lifetime.
    Local { reg: Register },
    /// A module global slot.
    Global { slot: u16 },
    /// A capture cell of the current closure.
    Upvalue { index: u8 },
}

/// One name in one scope.
#[derive(Debug, Clone)]
pub struct Binding {
    pub kind: BindingKind,
    pub is_const: bool,
    pub original_name: String,
}

impl Binding {
    pub fn new(kind: BindingKind, is_const: bool, name: &str) -> Binding {
        Binding {
            kind,
            is_const,
            original_name: name.to_string(),
        }
    }
}

/// A chain of block scopes inside one function.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    entries: Vec<(String, Binding)>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// True when this is the outermost scope of its function. Top-level
    /// declaration placement (§global vs local) keys off this.
    pub fn is_root(&self) -> bool {
        self.outer.is_none()
    }

    /// Enter a nested scope: the current table becomes the outer of a fresh
    /// one.
    pub fn begin_scope(&mut self) {
        let outer = std::mem::take(self);
        self.outer = Some(Box::new(outer));
    }

    /// Leave the innermost scope, returning its bindings (insertion order)
    /// so the caller can release their registers.
    pub fn end_scope(&mut self) -> Vec<(String, Binding)> {
        let outer = self.outer.take().map(|b| *b).unwrap_or_default();
        let inner = std::mem::replace(self, outer);
        inner.entries
    }

    /// Insert into the innermost scope, shadowing any outer binding of the
    /// same name. Redefinition within one scope replaces the entry.
    pub fn define(&mut self, name: &str, binding: Binding) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = binding;
        } else {
            self.entries.push((name.to_string(), binding));
        }
    }

    /// Walk outward for `name`. Returns the binding and the scope depth it
    /// was found at (0 = innermost).
    pub fn resolve(&self, name: &str) -> Option<(&Binding, usize)> {
        let mut table = self;
        let mut depth = 0;
        loop {
            if let Some((_, b)) = table.entries.iter().find(|(n, _)| n == name) {
                return Some((b, depth));
            }
            match &table.outer {
                Some(outer) => {
                    table = outer;
                    depth += 1;
                }
                None => return None,
            }
        }
    }

    /// Whether `name` is defined in the innermost scope only.
    pub fn resolved_in_current_scope(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Late-bind an existing binding to a register. Used to fix up the
    /// `Unresolved` placeholder of a recursive function literal once its
    /// closure register exists.
    pub fn update_register(&mut self, name: &str, reg: Register) -> bool {
        let mut table = self;
        loop {
            if let Some((_, b)) = table.entries.iter_mut().find(|(n, _)| n == name) {
                b.kind = BindingKind::Local { reg };
                return true;
            }
            match &mut table.outer {
                Some(outer) => table = outer,
                None => return false,
            }
        }
    }
}

/// Names that may not be bound in strict mode.
pub fn is_reserved_in_strict(name: &str) -> bool {
    matches!(
        name,
        "arguments"
            | "eval"
            | "implements"
            | "interface"
            | "let"
            | "package"
            | "private"
            | "protected"
            | "public"
            | "static"
            | "yield"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(reg: Register) -> Binding {
        Binding::new(BindingKind::Local { reg }, false, "t")
    }

    #[test]
    fn test_resolve_walks_outward() {
        let mut table = SymbolTable::new();
        table.define("x", local(0));
        table.begin_scope();
        table.define("y", local(1));
        let (bx, depth) = table.resolve("x").unwrap();
        assert_eq!(bx.kind, BindingKind::Local { reg: 0 });
        assert_eq!(depth, 1);
        assert_eq!(table.resolve("y").unwrap().1, 0);
        assert!(table.resolve("z").is_none());
    }

    #[test]
    fn test_inner_scope_shadows() {
        let mut table = SymbolTable::new();
        table.define("x", local(0));
        table.begin_scope();
        table.define("x", local(5));
        assert_eq!(
            table.resolve("x").unwrap().0.kind,
            BindingKind::Local { reg: 5 }
        );
        let popped = table.end_scope();
        assert_eq!(popped.len(), 1);
        assert_eq!(
            table.resolve("x").unwrap().0.kind,
            BindingKind::Local { reg: 0 }
        );
    }

    #[test]
    fn test_update_register_fixes_placeholder() {
        let mut table = SymbolTable::new();
        table.define("f", Binding::new(BindingKind::Unresolved, false, "f"));
        table.begin_scope();
        assert!(table.update_register("f", 3));
        table.end_scope();
        assert_eq!(
            table.resolve("f").unwrap().0.kind,
            BindingKind::Local { reg: 3 }
        );
        assert!(!table.update_register("missing", 0));
    }

    #[test]
    fn test_end_scope_returns_bindings_in_insertion_order() {
        let mut table = SymbolTable::new();
        table.begin_scope();
        table.define("a", local(0));
        table.define("b", local(1));
        let popped = table.end_scope();
        let names: Vec<_> = popped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_strict_reserved_names() {
        assert!(is_reserved_in_strict("arguments"));
        assert!(is_reserved_in_strict("eval"));
        assert!(is_reserved_in_strict("yield"));
        assert!(!is_reserved_in_strict("value"));
    }
}
