// graph.rs: Program graph model and construction
//
// The analysis-facing view of a program: functions made of basic blocks,
// each block an ordered list of operations plus its successor blocks. Call
// targets are resolved once, here, from stable names to `Callee` values, so
// no later phase compares names or handles.
//
// Two ways in: `build_module` lowers a parsed .sbg AST, and `FunctionBuilder`
// lets any other front end (or a test) assemble a function directly.
//
// Preconditions: `ast` is the output of `parser::parse`.
// Postconditions: every kept operation has a function-unique `OpId`; every
//                 block's `succs` refer to blocks of the same function;
//                 block ids equal their index in `Function::blocks`.
// Failure modes: label, terminator and duplicate-name problems produce
//                `Diagnostic` errors; the offending line is skipped.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::ast::{self, Span};
use crate::diag::{codes, Diagnostic};
use crate::id::{BlockId, IdAllocator, OpId};
use crate::primitive::PrimitiveKind;

// ── Public types ────────────────────────────────────────────────────────────

/// A call operand as seen by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Literal(i64),
    /// Not a compile-time constant.
    Unknown,
}

impl Operand {
    pub fn literal(self) -> Option<i64> {
        match self {
            Operand::Literal(v) => Some(v),
            Operand::Unknown => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::Unknown => write!(f, "?"),
        }
    }
}

/// Resolved call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Primitive(PrimitiveKind),
    /// Declared without a body; calls to it are ignored.
    Declaration(String),
    /// A defined, non-primitive function of the same module.
    Function(String),
    Unresolved(String),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Primitive(kind) => kind.name(),
            Callee::Declaration(name) | Callee::Function(name) | Callee::Unresolved(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Call {
        callee: Callee,
        operands: Vec<Operand>,
    },
    /// Anything the analysis does not interpret, terminators included.
    Other { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: OpId,
    pub kind: OpKind,
    pub span: Option<Span>,
}

impl Operation {
    pub fn callee(&self) -> Option<&Callee> {
        match &self.kind {
            OpKind::Call { callee, .. } => Some(callee),
            OpKind::Other { .. } => None,
        }
    }

    pub fn operands(&self) -> &[Operand] {
        match &self.kind {
            OpKind::Call { operands, .. } => operands,
            OpKind::Other { .. } => &[],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::Call { callee, operands } => {
                write!(f, "call {}(", callee.name())?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
            OpKind::Other { text } => write!(f, "{text}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    pub ops: Vec<Operation>,
    /// Successors in declared order. May repeat a block.
    pub succs: Vec<BlockId>,
    pub span: Option<Span>,
}

/// A function body. The first block is the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn op_count(&self) -> usize {
        self.blocks.iter().map(|b| b.ops.len()).sum()
    }
}

/// A module-level `set NAME = VALUE` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: String,
    pub value: i64,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub settings: Vec<Setting>,
    pub declarations: Vec<String>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Last `set` directive for `name` wins.
    pub fn setting(&self, name: &str) -> Option<&Setting> {
        self.settings.iter().rev().find(|s| s.name == name)
    }
}

/// Result of graph construction.
#[derive(Debug)]
pub struct GraphResult {
    pub module: Module,
    pub diagnostics: Vec<Diagnostic>,
}

// ── Callee resolution ───────────────────────────────────────────────────────

/// Maps callee names to `Callee` once per module.
///
/// A name that is declared but never defined is a declaration even when it
/// spells a primitive: only defined primitives are recognized.
#[derive(Debug, Clone, Default)]
pub struct CalleeResolver {
    declared: HashSet<String>,
    defined: HashSet<String>,
}

impl CalleeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>) {
        self.declared.insert(name.into());
    }

    pub fn define(&mut self, name: impl Into<String>) {
        self.defined.insert(name.into());
    }

    pub fn resolve(&self, name: &str) -> Callee {
        if self.declared.contains(name) && !self.defined.contains(name) {
            return Callee::Declaration(name.to_string());
        }
        match PrimitiveKind::from_name(name) {
            // A function of the module shadows a short spelling, never an `SB_` name.
            Some(kind) if kind.name() == name || !self.defined.contains(name) => {
                return Callee::Primitive(kind);
            }
            _ => {}
        }
        if self.defined.contains(name) {
            return Callee::Function(name.to_string());
        }
        Callee::Unresolved(name.to_string())
    }
}

// ── Programmatic construction ──────────────────────────────────────────────

/// Assembles a `Function` without going through the text format.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    blocks: Vec<BasicBlock>,
    ids: IdAllocator,
    resolver: CalleeResolver,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            name: name.into(),
            blocks: Vec::new(),
            ids: IdAllocator::new(),
            resolver: CalleeResolver::new(),
        }
    }

    /// Use `resolver` for subsequent `call`s.
    pub fn with_resolver(mut self, resolver: CalleeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Append a new block. The first block appended is the entry.
    pub fn block(&mut self, name: impl Into<String>) -> BlockId {
        let id = self.ids.alloc_block();
        self.blocks.push(BasicBlock {
            id,
            name: name.into(),
            ops: Vec::new(),
            succs: Vec::new(),
            span: None,
        });
        id
    }

    /// Append a call to `callee`, resolved by name.
    pub fn call(&mut self, block: BlockId, callee: &str, operands: &[Operand]) -> OpId {
        let callee = self.resolver.resolve(callee);
        self.push(
            block,
            OpKind::Call {
                callee,
                operands: operands.to_vec(),
            },
        )
    }

    /// Append a call to a stream primitive.
    pub fn primitive(&mut self, block: BlockId, kind: PrimitiveKind, operands: &[Operand]) -> OpId {
        self.push(
            block,
            OpKind::Call {
                callee: Callee::Primitive(kind),
                operands: operands.to_vec(),
            },
        )
    }

    pub fn other(&mut self, block: BlockId, text: impl Into<String>) -> OpId {
        self.push(block, OpKind::Other { text: text.into() })
    }

    /// Terminate `block` with a branch to `targets`, in order.
    pub fn branch(&mut self, block: BlockId, targets: &[BlockId]) -> OpId {
        let names: Vec<&str> = targets
            .iter()
            .map(|t| self.blocks[t.index()].name.as_str())
            .collect();
        let text = format!("br {}", names.join(", "));
        self.blocks[block.index()].succs.extend_from_slice(targets);
        self.other(block, text)
    }

    pub fn ret(&mut self, block: BlockId) -> OpId {
        self.other(block, "ret")
    }

    pub fn finish(self) -> Function {
        Function {
            name: self.name,
            blocks: self.blocks,
        }
    }

    fn push(&mut self, block: BlockId, kind: OpKind) -> OpId {
        self.push_spanned(block, kind, None)
    }

    fn push_spanned(&mut self, block: BlockId, kind: OpKind, span: Option<Span>) -> OpId {
        let id = self.ids.alloc_op();
        self.blocks[block.index()]
            .ops
            .push(Operation { id, kind, span });
        id
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

/// Lower a parsed .sbg module into the program graph.
pub fn build_module(ast: &ast::Module) -> GraphResult {
    let mut diagnostics = Vec::new();
    let mut module = Module::default();
    let mut resolver = CalleeResolver::new();
    let mut fn_spans: HashMap<&str, Span> = HashMap::new();

    for item in &ast.items {
        match &item.kind {
            ast::ItemKind::Set(set) => module.settings.push(Setting {
                name: set.name.name.clone(),
                value: set.value,
                span: Some(set.value_span),
            }),
            ast::ItemKind::Declare(name) => {
                resolver.declare(name.name.clone());
                module.declarations.push(name.name.clone());
            }
            ast::ItemKind::Function(def) => {
                if let Some(first) = fn_spans.get(def.name.name.as_str()) {
                    diagnostics.push(
                        Diagnostic::error(
                            codes::E0103,
                            Some(def.name.span),
                            format!("function `{}` is defined more than once", def.name.name),
                        )
                        .with_related(*first, "first definition here"),
                    );
                    continue;
                }
                fn_spans.insert(def.name.name.as_str(), def.name.span);
                resolver.define(def.name.name.clone());
            }
        }
    }

    let mut lowered: HashSet<&str> = HashSet::new();
    for item in &ast.items {
        if let ast::ItemKind::Function(def) = &item.kind {
            if !lowered.insert(def.name.name.as_str()) {
                continue;
            }
            let mut lowerer = FnLowerer::new(def, &resolver);
            lowerer.lower();
            diagnostics.append(&mut lowerer.diagnostics);
            module.functions.push(lowerer.builder.finish());
        }
    }

    GraphResult {
        module,
        diagnostics,
    }
}

// ── Function lowering ───────────────────────────────────────────────────────

struct FnLowerer<'a> {
    def: &'a ast::FnDef,
    builder: FunctionBuilder,
    labels: HashMap<&'a str, (BlockId, Span)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> FnLowerer<'a> {
    fn new(def: &'a ast::FnDef, resolver: &CalleeResolver) -> Self {
        FnLowerer {
            def,
            builder: FunctionBuilder::new(def.name.name.clone()).with_resolver(resolver.clone()),
            labels: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn lower(&mut self) {
        self.collect_labels();
        if self.builder.blocks.is_empty() {
            self.diagnostics.push(
                Diagnostic::error(
                    codes::E0107,
                    Some(self.def.name.span),
                    format!("function `{}` has no basic blocks", self.def.name.name),
                )
                .with_hint("start the body with a label such as `entry:`"),
            );
            return;
        }
        self.lower_lines();
    }

    /// First pass: allocate one block per distinct label, in source order,
    /// so forward branches resolve.
    fn collect_labels(&mut self) {
        let def = self.def;
        for line in &def.lines {
            let ast::BodyLine::Label(label) = line else {
                continue;
            };
            if let Some((_, first)) = self.labels.get(label.name.as_str()) {
                self.diagnostics.push(
                    Diagnostic::error(
                        codes::E0101,
                        Some(label.span),
                        format!("block label `{}` is defined more than once", label.name),
                    )
                    .with_related(*first, "first defined here"),
                );
                continue;
            }
            let id = self.builder.block(label.name.clone());
            self.builder.blocks[id.index()].span = Some(label.span);
            self.labels.insert(label.name.as_str(), (id, label.span));
        }
    }

    fn lower_lines(&mut self) {
        let def = self.def;
        let mut current: Option<BlockId> = None;
        let mut terminated = false;
        // Duplicate labels keep appending to the first block of that name
        // only until the duplicate; afterwards their lines are dropped.
        let mut seen_labels: HashSet<&str> = HashSet::new();

        for line in &def.lines {
            match line {
                ast::BodyLine::Label(label) => {
                    self.check_terminated(current, terminated);
                    if !seen_labels.insert(label.name.as_str()) {
                        current = None;
                        terminated = true;
                        continue;
                    }
                    current = self.labels.get(label.name.as_str()).map(|(id, _)| *id);
                    terminated = false;
                }
                ast::BodyLine::Op(op) => {
                    let Some(block) = current else {
                        if !terminated {
                            self.diagnostics.push(Diagnostic::error(
                                codes::E0108,
                                Some(op.span),
                                "operation appears before the first block label",
                            ));
                        }
                        continue;
                    };
                    if terminated {
                        self.diagnostics.push(Diagnostic::error(
                            codes::E0109,
                            Some(op.span),
                            format!(
                                "operation after the terminator of block `{}`",
                                self.builder.blocks[block.index()].name
                            ),
                        ));
                        continue;
                    }
                    terminated = self.lower_op(block, op);
                }
            }
        }
        self.check_terminated(current, terminated);
    }

    fn check_terminated(&mut self, current: Option<BlockId>, terminated: bool) {
        let Some(block) = current else {
            return;
        };
        if terminated {
            return;
        }
        let bb = &self.builder.blocks[block.index()];
        self.diagnostics.push(
            Diagnostic::error(
                codes::E0110,
                bb.span,
                format!("block `{}` does not end with `br` or `ret`", bb.name),
            )
            .with_hint("add `ret` or a `br` to the next block"),
        );
    }

    /// Lower one operation; returns whether it terminated the block.
    fn lower_op(&mut self, block: BlockId, op: &ast::OpStmt) -> bool {
        match &op.kind {
            ast::OpKind::Call(call) => {
                let operands = call
                    .args
                    .iter()
                    .map(|arg| match arg {
                        ast::ArgExpr::Int(v, _) => Operand::Literal(*v),
                        ast::ArgExpr::Hole(_) | ast::ArgExpr::Symbol(_) => Operand::Unknown,
                    })
                    .collect();
                let callee = self.builder.resolver.resolve(&call.callee.name);
                self.builder
                    .push_spanned(block, OpKind::Call { callee, operands }, Some(op.span));
                false
            }
            ast::OpKind::Branch(targets) => {
                let mut succs = Vec::with_capacity(targets.len());
                for target in targets {
                    match self.labels.get(target.name.as_str()) {
                        Some((id, _)) => succs.push(*id),
                        None => self.diagnostics.push(Diagnostic::error(
                            codes::E0102,
                            Some(target.span),
                            format!("branch to unknown block `{}`", target.name),
                        )),
                    }
                }
                let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
                self.builder.blocks[block.index()].succs = succs;
                self.builder.push_spanned(
                    block,
                    OpKind::Other {
                        text: format!("br {}", names.join(", ")),
                    },
                    Some(op.span),
                );
                true
            }
            ast::OpKind::Return => {
                self.builder.push_spanned(
                    block,
                    OpKind::Other {
                        text: "ret".to_string(),
                    },
                    Some(op.span),
                );
                true
            }
            ast::OpKind::Opaque(text) => {
                self.builder.push_spanned(
                    block,
                    OpKind::Other { text: text.clone() },
                    Some(op.span),
                );
                false
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagCode;

    fn build(source: &str) -> GraphResult {
        let parsed = crate::parser::parse(source);
        assert!(
            parsed.errors.is_empty(),
            "parse errors: {:?}",
            parsed.errors
        );
        build_module(&parsed.module.expect("module"))
    }

    fn build_ok(source: &str) -> Module {
        let result = build(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        result.module
    }

    fn codes_of(result: &GraphResult) -> Vec<DiagCode> {
        result.diagnostics.iter().filter_map(|d| d.code).collect()
    }

    #[test]
    fn blocks_ops_and_successors() {
        let module = build_ok(
            "fn main {\nentry:\n  call SB_CONFIG()\n  br left, right\nleft:\n  br exit\nright:\n  br exit\nexit:\n  call SB_WAIT()\n  ret\n}",
        );
        let f = module.function("main").expect("main");
        assert_eq!(f.blocks.len(), 4);
        assert_eq!(f.entry(), Some(BlockId(0)));
        assert_eq!(f.block(BlockId(0)).succs, vec![BlockId(1), BlockId(2)]);
        assert_eq!(f.block(BlockId(1)).succs, vec![BlockId(3)]);
        assert!(f.block(BlockId(3)).succs.is_empty());
        assert_eq!(f.op_count(), 6);
        assert_eq!(
            f.block(BlockId(0)).ops[0].callee(),
            Some(&Callee::Primitive(PrimitiveKind::Config))
        );
    }

    #[test]
    fn op_ids_are_function_unique_and_ordered() {
        let module = build_ok("fn main {\nentry:\n  nop\n  br b\nb:\n  ret\n}");
        let f = &module.functions[0];
        let ids: Vec<OpId> = f
            .blocks
            .iter()
            .flat_map(|b| b.ops.iter().map(|op| op.id))
            .collect();
        assert_eq!(ids, vec![OpId(0), OpId(1), OpId(2)]);
    }

    #[test]
    fn operands_literal_or_unknown() {
        let module =
            build_ok("fn main {\nentry:\n  call SB_DISCARD(4, n)\n  call SB_CONSTANT(?, 0, 9)\n  ret\n}");
        let ops = &module.functions[0].blocks[0].ops;
        assert_eq!(
            ops[0].operands(),
            &[Operand::Literal(4), Operand::Unknown]
        );
        assert_eq!(
            ops[1].operands(),
            &[Operand::Unknown, Operand::Literal(0), Operand::Literal(9)]
        );
    }

    #[test]
    fn callee_resolution_precedence() {
        let module = build_ok(
            "declare SB_WAIT\ndeclare helper\nfn util {\nentry:\n  ret\n}\nfn main {\nentry:\n  call SB_WAIT()\n  call helper()\n  call util()\n  call mystery()\n  call SB_CONFIG()\n  ret\n}",
        );
        let f = module.function("main").expect("main");
        let callees: Vec<&Callee> = f.blocks[0].ops.iter().filter_map(|op| op.callee()).collect();
        assert_eq!(
            callees,
            vec![
                &Callee::Declaration("SB_WAIT".into()),
                &Callee::Declaration("helper".into()),
                &Callee::Function("util".into()),
                &Callee::Unresolved("mystery".into()),
                &Callee::Primitive(PrimitiveKind::Config),
            ]
        );
    }

    #[test]
    fn defined_primitive_is_not_a_declaration() {
        let module = build_ok(
            "declare SB_WAIT\nfn SB_WAIT {\nentry:\n  ret\n}\nfn main {\nentry:\n  call SB_WAIT()\n  ret\n}",
        );
        let f = module.function("main").expect("main");
        assert_eq!(
            f.blocks[0].ops[0].callee(),
            Some(&Callee::Primitive(PrimitiveKind::Wait))
        );
    }

    #[test]
    fn short_spellings_resolve_unless_shadowed() {
        let module = build_ok(
            "fn WAIT {\nentry:\n  ret\n}\nfn main {\nentry:\n  call CONFIG()\n  call MEM_TO_PORT_STREAM(?, 8, 8, 8, 1)\n  call WAIT()\n  ret\n}",
        );
        let f = module.function("main").expect("main");
        let callees: Vec<&Callee> = f.blocks[0].ops.iter().filter_map(|op| op.callee()).collect();
        assert_eq!(
            callees,
            vec![
                &Callee::Primitive(PrimitiveKind::Config),
                &Callee::Primitive(PrimitiveKind::MemPortStream),
                &Callee::Function("WAIT".into()),
            ]
        );
    }

    #[test]
    fn settings_last_wins() {
        let module = build_ok("set ports = 2\nset ports = 3\n");
        assert_eq!(module.setting("ports").map(|s| s.value), Some(3));
        assert!(module.setting("word_size").is_none());
    }

    #[test]
    fn duplicate_label_is_error() {
        let result = build("fn main {\nentry:\n  ret\nentry:\n  ret\n}");
        assert_eq!(codes_of(&result), vec![codes::E0101]);
        assert_eq!(result.module.functions[0].blocks.len(), 1);
    }

    #[test]
    fn unknown_branch_target_is_error() {
        let result = build("fn main {\nentry:\n  br nowhere\n}");
        assert_eq!(codes_of(&result), vec![codes::E0102]);
        assert!(result.module.functions[0].blocks[0].succs.is_empty());
    }

    #[test]
    fn duplicate_function_is_error() {
        let result = build("fn main {\nentry:\n  ret\n}\nfn main {\nentry:\n  ret\n}");
        assert_eq!(codes_of(&result), vec![codes::E0103]);
        assert_eq!(result.module.functions.len(), 1);
    }

    #[test]
    fn empty_function_is_error() {
        let result = build("fn main {\n}");
        assert_eq!(codes_of(&result), vec![codes::E0107]);
    }

    #[test]
    fn op_before_label_is_error() {
        let result = build("fn main {\n  nop\nentry:\n  ret\n}");
        assert_eq!(codes_of(&result), vec![codes::E0108]);
    }

    #[test]
    fn op_after_terminator_is_error() {
        let result = build("fn main {\nentry:\n  ret\n  nop\n}");
        assert_eq!(codes_of(&result), vec![codes::E0109]);
    }

    #[test]
    fn missing_terminator_is_error() {
        let result = build("fn main {\nentry:\n  nop\nnext:\n  ret\n}");
        assert_eq!(codes_of(&result), vec![codes::E0110]);
    }

    #[test]
    fn builder_branch_records_successors_and_text() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block("entry");
        let exit = b.block("exit");
        b.primitive(entry, PrimitiveKind::Config, &[]);
        b.branch(entry, &[exit, exit]);
        b.ret(exit);
        let f = b.finish();
        assert_eq!(f.block(entry).succs, vec![exit, exit]);
        assert_eq!(f.block(entry).ops[1].to_string(), "br exit, exit");
        assert_eq!(f.block(entry).ops[0].to_string(), "call SB_CONFIG()");
    }

    #[test]
    fn operation_display() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block("entry");
        b.call(
            entry,
            "SB_DISCARD",
            &[Operand::Literal(4), Operand::Unknown],
        );
        let f = b.finish();
        assert_eq!(f.blocks[0].ops[0].to_string(), "call SB_DISCARD(4, ?)");
    }
}
