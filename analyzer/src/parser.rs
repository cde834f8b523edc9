// Parser for .sbg source files.
//
// Parses a token stream (from the lexer) into a flat AST: top-level `set`,
// `declare` and `fn` items, with each function body kept as a list of label
// and operation lines. Uses chumsky combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub module: Option<Module>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse an .sbg source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = module_parser(source);
    let (module, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        module,
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `module_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn module_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Module, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let nl = just(Token::Newline).repeated().ignored();
    let line_sep = just(Token::Newline).repeated().at_least(1);

    // ── Names ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let local = just(Token::Local).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let int = select! {
        Token::Int(n) => n,
        Token::Hex(n) => n,
    };

    // ── Call arguments ──

    let arg = choice((
        int.clone().map_with(|n, e| ArgExpr::Int(n, e.span())),
        just(Token::Question).map_with(|_, e| ArgExpr::Hole(e.span())),
        ident.clone().map(ArgExpr::Symbol),
        local.clone().map(ArgExpr::Symbol),
    ));

    // ── Operations ──

    let call = local
        .clone()
        .then_ignore(just(Token::Equals))
        .or_not()
        .then_ignore(just(Token::Call))
        .then(ident.clone())
        .then(
            arg.separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|((result, callee), args)| {
            OpKind::Call(CallStmt {
                result,
                callee,
                args,
            })
        });

    let branch = just(Token::Br)
        .ignore_then(
            ident
                .clone()
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .map(OpKind::Branch);

    let ret = just(Token::Ret).to(OpKind::Return);

    // Anything else up to the end of the line. Structural tokens are excluded
    // so a malformed `call`/`br` line is reported instead of swallowed.
    let opaque = any()
        .filter(|t: &Token| {
            !matches!(
                t,
                Token::Newline
                    | Token::LBrace
                    | Token::RBrace
                    | Token::Colon
                    | Token::Call
                    | Token::Br
                    | Token::Ret
                    | Token::Fn
                    | Token::Set
                    | Token::Declare
            )
        })
        .repeated()
        .at_least(1)
        .map_with(move |_, e| {
            let span: SimpleSpan = e.span();
            OpKind::Opaque(source[span.start()..span.end()].to_string())
        });

    let op = choice((call, branch, ret, opaque)).map_with(|kind, e| OpStmt {
        kind,
        span: e.span(),
    });

    let label = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .map(BodyLine::Label);

    let body_line = label.or(op.map(BodyLine::Op));

    let fn_body = nl
        .clone()
        .ignore_then(
            body_line
                .separated_by(line_sep.clone())
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl.clone());

    // ── Items ──

    let set_stmt = just(Token::Set)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(int.map_with(|n, e| (n, e.span())))
        .map(|(name, (value, value_span))| {
            ItemKind::Set(SetStmt {
                name,
                value,
                value_span,
            })
        });

    let declare_stmt = just(Token::Declare)
        .ignore_then(ident.clone())
        .map(ItemKind::Declare);

    let fn_def = just(Token::Fn)
        .ignore_then(ident.clone())
        .then(fn_body.delimited_by(just(Token::LBrace), just(Token::RBrace)))
        .map_with(|(name, lines), e| {
            ItemKind::Function(FnDef {
                name,
                lines,
                span: e.span(),
            })
        });

    let item = choice((set_stmt, declare_stmt, fn_def)).map_with(|kind, e| Item {
        kind,
        span: e.span(),
    });

    // ── Module ──

    nl.clone()
        .ignore_then(
            item.separated_by(line_sep)
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(|items, e| Module {
            items,
            span: e.span(),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.module.expect("expected module")
    }

    fn only_fn(module: &Module) -> &FnDef {
        assert_eq!(module.items.len(), 1, "expected 1 item");
        let ItemKind::Function(def) = &module.items[0].kind else {
            panic!("expected function")
        };
        def
    }

    fn op_kinds(def: &FnDef) -> Vec<&OpKind> {
        def.lines
            .iter()
            .filter_map(|line| match line {
                BodyLine::Op(op) => Some(&op.kind),
                BodyLine::Label(_) => None,
            })
            .collect()
    }

    #[test]
    fn empty_module() {
        let module = parse_ok("");
        assert!(module.items.is_empty());
    }

    #[test]
    fn blank_lines_and_comments_only() {
        let module = parse_ok("\n# nothing here\n\n");
        assert!(module.items.is_empty());
    }

    #[test]
    fn set_and_declare() {
        let module = parse_ok("set ports = 4\ndeclare SB_BARRIER\n");
        assert_eq!(module.items.len(), 2);
        let ItemKind::Set(set) = &module.items[0].kind else {
            panic!("expected set")
        };
        assert_eq!(set.name.name, "ports");
        assert_eq!(set.value, 4);
        let ItemKind::Declare(name) = &module.items[1].kind else {
            panic!("expected declare")
        };
        assert_eq!(name.name, "SB_BARRIER");
    }

    #[test]
    fn function_with_blocks() {
        let module = parse_ok(
            "fn main {\nentry:\n  call SB_CONFIG()\n  br a, b\na:\n  ret\nb:\n  ret\n}\n",
        );
        let def = only_fn(&module);
        assert_eq!(def.name.name, "main");
        let labels: Vec<&str> = def
            .lines
            .iter()
            .filter_map(|line| match line {
                BodyLine::Label(l) => Some(l.name.as_str()),
                BodyLine::Op(_) => None,
            })
            .collect();
        assert_eq!(labels, vec!["entry", "a", "b"]);
        let kinds = op_kinds(def);
        assert_eq!(kinds.len(), 4);
        let OpKind::Branch(targets) = kinds[1] else {
            panic!("expected branch")
        };
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(kinds[2], &OpKind::Return);
    }

    #[test]
    fn call_arguments() {
        let module =
            parse_ok("fn main {\nentry:\n  %r = call SB_MEM_PORT_STREAM(%p, 8, 0x8, n, ?)\n  ret\n}");
        let def = only_fn(&module);
        let OpKind::Call(call) = op_kinds(def)[0] else {
            panic!("expected call")
        };
        assert_eq!(call.result.as_ref().map(|r| r.name.as_str()), Some("%r"));
        assert_eq!(call.callee.name, "SB_MEM_PORT_STREAM");
        assert_eq!(call.args.len(), 5);
        assert!(matches!(&call.args[0], ArgExpr::Symbol(id) if id.name == "%p"));
        assert!(matches!(call.args[1], ArgExpr::Int(8, _)));
        assert!(matches!(call.args[2], ArgExpr::Int(8, _)));
        assert!(matches!(&call.args[3], ArgExpr::Symbol(id) if id.name == "n"));
        assert!(matches!(call.args[4], ArgExpr::Hole(_)));
    }

    #[test]
    fn opaque_operation_keeps_text() {
        let module = parse_ok("fn main {\nentry:\n  %c = load flag, 4\n  ret\n}");
        let def = only_fn(&module);
        assert_eq!(
            op_kinds(def)[0],
            &OpKind::Opaque("%c = load flag, 4".to_string())
        );
    }

    #[test]
    fn two_functions() {
        let module = parse_ok("fn a {\nentry:\n  ret\n}\n\nfn b {\nentry:\n  ret\n}\n");
        assert_eq!(module.items.len(), 2);
    }

    #[test]
    fn unterminated_function_is_error() {
        let result = parse("fn main {\nentry:\n  ret\n");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn malformed_call_is_error() {
        let result = parse("fn main {\nentry:\n  call SB_WAIT(\n  ret\n}");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn lex_errors_are_merged() {
        let result = parse("fn main {\nentry:\n  ret @\n}");
        assert!(!result.errors.is_empty());
    }
}
