// AST node types for .sbg source files.
//
// Mirrors the surface grammar accepted by `parser`. Every node carries a
// `SimpleSpan` for error reporting in the graph builder.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A complete .sbg module: a sequence of top-level items.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub items: Vec<Item>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Set(SetStmt),
    Declare(Ident),
    Function(FnDef),
}

// ── set_stmt: 'set' IDENT '=' INT ──

#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub name: Ident,
    pub value: i64,
    pub value_span: Span,
}

// ── fn_def: 'fn' IDENT '{' body_line* '}' ──

/// A function definition. Body lines are kept flat; grouping into blocks
/// happens in the graph builder so label/terminator errors get diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: Ident,
    pub lines: Vec<BodyLine>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyLine {
    /// `name:` starts a new basic block.
    Label(Ident),
    Op(OpStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpStmt {
    pub kind: OpKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Call(CallStmt),
    /// `br a, b, ...`: successors in declared order.
    Branch(Vec<Ident>),
    Return,
    /// Any other operation; the source text is kept for traces.
    Opaque(String),
}

/// `[%r =] call NAME(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct CallStmt {
    pub result: Option<Ident>,
    pub callee: Ident,
    pub args: Vec<ArgExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgExpr {
    Int(i64, Span),
    /// `?`: explicitly unknown value.
    Hole(Span),
    /// A named value (`%x`, `n`); not a compile-time constant.
    Symbol(Ident),
}

impl ArgExpr {
    pub fn span(&self) -> Span {
        match self {
            ArgExpr::Int(_, span) | ArgExpr::Hole(span) => *span,
            ArgExpr::Symbol(ident) => ident.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
