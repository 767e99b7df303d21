//! Diagnostic sink
//!
//! Lowering never prints or panics on user errors; it records them here and
//! keeps going where recovery is possible, so one compile surfaces as many
//! problems as it can. The caller inspects the sink and withholds the chunk
//! when any error was recorded.

use crate::ast::Token;
use serde::Serialize;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    /// Convert to the LSP DiagnosticSeverity number.
    pub fn to_lsp_severity(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
        }
    }
}

/// Source region a diagnostic points at. The front end works in lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: u32,
}

impl From<Token> for Span {
    fn from(t: Token) -> Span {
        Span { line: t.line }
    }
}

/// One reported problem.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: line {}: {}", kind, self.span.line, self.message)
    }
}

/// Collector the compiler reports into. Owned by the caller so diagnostics
/// from several units can aggregate.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl DiagnosticSink {
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    pub fn add_error(&mut self, span: impl Into<Span>, message: impl Into<String>) {
        self.errors += 1;
        self.diagnostics.push(Diagnostic {
            span: span.into(),
            message: message.into(),
            severity: Severity::Error,
        });
    }

    pub fn add_warning(&mut self, span: impl Into<Span>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            span: span.into(),
            message: message.into(),
            severity: Severity::Warning,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_counts_only_errors() {
        let mut sink = DiagnosticSink::new();
        sink.add_warning(Span { line: 1 }, "odd but legal");
        assert!(!sink.has_errors());
        sink.add_error(Span { line: 2 }, "bad");
        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.diagnostics().len(), 2);
    }

    #[test]
    fn test_display_format() {
        let d = Diagnostic {
            span: Span { line: 7 },
            message: "undefined label 'outer'".into(),
            severity: Severity::Error,
        };
        assert_eq!(d.to_string(), "error: line 7: undefined label 'outer'");
    }
}
