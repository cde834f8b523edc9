// Lexer for .sbg (stream block graph) source files.
//
// Tokenizes the textual control-flow-graph format consumed by the analyzer.
// Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// .sbg token types.
///
/// Identifiers and locals carry no value; use the span to retrieve the text
/// from the source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("set")]
    Set,
    #[token("declare")]
    Declare,
    #[token("fn")]
    Fn,
    #[token("call")]
    Call,
    #[token("br")]
    Br,
    #[token("ret")]
    Ret,

    // ── Symbols ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,

    // ── Literals ──
    //
    // Hex must appear before Int so `0x10` is not lexed as `0` + ident.
    /// Hexadecimal integer literal (e.g. `0x40`).
    #[regex(r"-?0[xX][0-9a-fA-F]+", parse_hex)]
    Hex(i64),

    /// Decimal integer literal, optionally negative.
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    // ── Names ──
    /// SSA-style local value: `%name`.
    #[regex(r"%[a-zA-Z0-9_.]+")]
    Local,

    // logos prioritises fixed `#[token]` matches over regex for the same
    // length, so `fn` matches Fn, not Ident.
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_.]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_.]*")]
    Ident,

    // ── Structure ──
    /// One or more newlines (significant: operation terminator).
    #[regex(r"\n+")]
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Set => write!(f, "set"),
            Token::Declare => write!(f, "declare"),
            Token::Fn => write!(f, "fn"),
            Token::Call => write!(f, "call"),
            Token::Br => write!(f, "br"),
            Token::Ret => write!(f, "ret"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Colon => write!(f, ":"),
            Token::Question => write!(f, "?"),
            Token::Hex(v) => write!(f, "{v:#x}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Local => write!(f, "<local>"),
            Token::Ident => write!(f, "<ident>"),
            Token::Newline => write!(f, "<newline>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn parse_hex(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    let slice = lex.slice();
    let (negative, digits) = match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, slice),
    };
    let value = i64::from_str_radix(&digits[2..], 16).ok()?;
    Some(if negative { -value } else { value })
}

// ── Public API ──

/// Lex an .sbg source string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            lex_ok("fn main call SB_WAIT ret"),
            vec![Token::Fn, Token::Ident, Token::Call, Token::Ident, Token::Ret]
        );
    }

    #[test]
    fn keyword_prefix_is_ident() {
        assert_eq!(lex_ok("fnord"), vec![Token::Ident]);
        assert_eq!(lex_ok("return"), vec![Token::Ident]);
    }

    #[test]
    fn integer_literals() {
        assert_eq!(
            lex_ok("8 -3 0x40"),
            vec![Token::Int(8), Token::Int(-3), Token::Hex(64)]
        );
    }

    #[test]
    fn call_with_holes_and_locals() {
        assert_eq!(
            lex_ok("%r = call SB_DISCARD(4, ?)"),
            vec![
                Token::Local,
                Token::Equals,
                Token::Call,
                Token::Ident,
                Token::LParen,
                Token::Int(4),
                Token::Comma,
                Token::Question,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn comments_skipped_newlines_kept() {
        assert_eq!(
            lex_ok("ret # done\n\n  ret"),
            vec![Token::Ret, Token::Newline, Token::Ret]
        );
    }

    #[test]
    fn bad_character_is_reported_and_lexing_continues() {
        let result = lex("ret @ ret");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 4, end: 5 });
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn token_spans() {
        let result = lex("br exit");
        assert_eq!(result.tokens[1].1, Span { start: 3, end: 7 });
    }
}
