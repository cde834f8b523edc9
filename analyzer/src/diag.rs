// diag.rs: Unified diagnostics model
//
// Provides the shared diagnostic types used by the front end, the
// configuration layer and the dispatcher.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0202`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Front end
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error
    pub const E0101: DiagCode = DiagCode("E0101"); // duplicate block label
    pub const E0102: DiagCode = DiagCode("E0102"); // unknown branch target
    pub const E0103: DiagCode = DiagCode("E0103"); // duplicate function
    pub const E0104: DiagCode = DiagCode("E0104"); // function not found
    pub const E0105: DiagCode = DiagCode("E0105"); // invalid `set` value
    pub const W0106: DiagCode = DiagCode("W0106"); // unknown `set` name
    pub const E0107: DiagCode = DiagCode("E0107"); // function has no blocks
    pub const E0108: DiagCode = DiagCode("E0108"); // operation outside a block
    pub const E0109: DiagCode = DiagCode("E0109"); // operation after terminator
    pub const E0110: DiagCode = DiagCode("E0110"); // block without terminator

    // Dispatcher
    pub const E0201: DiagCode = DiagCode("E0201"); // port index out of range
    pub const W0202: DiagCode = DiagCode("W0202"); // primitive operand count mismatch

    // Configuration
    pub const E0301: DiagCode = DiagCode("E0301"); // invalid analysis configuration
    pub const W0302: DiagCode = DiagCode("W0302"); // single port under shift-invariant normalization
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase. `span` is `None` for graphs that were
/// built programmatically rather than parsed from text.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, span: Option<Span>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    pub fn error(code: DiagCode, span: Option<Span>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    pub fn warning(code: DiagCode, span: Option<Span>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }

    /// Render with a `file:line:col:` prefix resolved against `source`.
    pub fn render(&self, file: &str, source: &str) -> String {
        match self.span {
            Some(span) => {
                let (line, col) = line_col(source, span.start);
                format!("{file}:{line}:{col}: {self}")
            }
            None => format!("{file}: {self}"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Any error-level diagnostic in `diags`?
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let prefix = &source[..offset];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(nl) => prefix[nl + 1..].chars().count() + 1,
        None => prefix.chars().count() + 1,
    };
    (line, col)
}
