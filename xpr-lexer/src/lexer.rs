use logos::Logos;
use xpr_source::{ExpError, ExpErrorKind, ExpResult};

use crate::opcode::OpCode;
use crate::token::{Token, TokenKind};

/// Raw lexical tokens. Numeric bases, string escapes, and identifier
/// lowercasing are resolved inside the callbacks; everything downstream of
/// this enum (unary-operator disambiguation, predefined-constant folding)
/// needs lookback across tokens and is handled as a second pass in [`lex`].
#[derive(Logos, Debug, Clone, PartialEq)]
enum Raw {
    #[regex(r"0x[0-9a-fA-F]+", |lex| parse_radix(&lex.slice()[2..], 16))]
    #[regex(r"0o[0-7]+", |lex| parse_radix(&lex.slice()[2..], 8))]
    #[regex(r"0b[01]+", |lex| parse_radix(&lex.slice()[2..], 2))]
    Integer(i64),

    #[regex(r"[0-9]+\.[0-9]+(e[+-][0-9]+)?", |lex| lex.slice().parse().ok())]
    #[regex(r"[0-9]+e[+-][0-9]+", |lex| lex.slice().parse().ok())]
    Real(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse().ok())]
    DecimalInteger(i64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r"'([^'\\]|\\.)*'", |lex| unquote(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_ascii_lowercase())]
    Ident(String),

    #[token(">=")]
    Ge,
    #[token("<=")]
    Le,
    #[token(">>")]
    ShiftRight,
    #[token("<<")]
    ShiftLeft,
    #[token("==")]
    BoolEquals,
    #[token("!=")]
    NotEquals,
    #[token("&&")]
    BoolAnd,
    #[token("||")]
    BoolOr,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("/")]
    Div,
    #[token("%")]
    Mod,
    #[token("*")]
    Mul,
    #[token("^")]
    Hat,
    #[token("~")]
    BitNot,
    #[token("?")]
    IfThen,
    #[token(":")]
    Else,
    #[token(">")]
    Gt,
    #[token("<")]
    Lt,
    #[token("=")]
    AssignEquals,
    #[token("!")]
    BoolNot,
    #[token("&")]
    BitAnd,
    #[token("|")]
    BitOr,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    #[regex(r"[ \t\r\n]+", logos::skip)]
    #[error]
    Error,
}

fn parse_radix(digits: &str, radix: u32) -> Option<i64> {
    let mut value: u64 = 0;
    for c in digits.chars() {
        let digit = c.to_digit(radix)?;
        let shift = match radix {
            16 => 4,
            8 => 3,
            _ => 1,
        };
        value = value.wrapping_shl(shift) | digit as u64;
    }
    Some(value as i64)
}

/// Strips the surrounding quote and applies the language's backslash
/// escapes (`\n \r \t \\ \' \"`); an unrecognized escape leaves the
/// character after the backslash untouched.
fn unquote(slice: &str) -> String {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn raw_to_kind(raw: Raw) -> TokenKind {
    match raw {
        Raw::Integer(v) | Raw::DecimalInteger(v) => TokenKind::Integer(v),
        Raw::Real(v) => TokenKind::Real(v),
        Raw::Str(s) => TokenKind::String(s),
        Raw::Ident(name) => TokenKind::Parameter(name),
        Raw::Ge => TokenKind::Operator(OpCode::Ge),
        Raw::Le => TokenKind::Operator(OpCode::Le),
        Raw::ShiftRight => TokenKind::Operator(OpCode::ShiftRight),
        Raw::ShiftLeft => TokenKind::Operator(OpCode::ShiftLeft),
        Raw::BoolEquals => TokenKind::Operator(OpCode::BoolEquals),
        Raw::NotEquals => TokenKind::Operator(OpCode::NotEquals),
        Raw::BoolAnd => TokenKind::Operator(OpCode::BoolAnd),
        Raw::BoolOr => TokenKind::Operator(OpCode::BoolOr),
        Raw::Plus => TokenKind::Operator(OpCode::Plus),
        Raw::Minus => TokenKind::Operator(OpCode::Minus),
        Raw::Div => TokenKind::Operator(OpCode::Div),
        Raw::Mod => TokenKind::Operator(OpCode::Mod),
        Raw::Mul => TokenKind::Operator(OpCode::Mul),
        Raw::Hat => TokenKind::Operator(OpCode::Pow),
        Raw::BitNot => TokenKind::Operator(OpCode::BitNot),
        Raw::IfThen => TokenKind::Operator(OpCode::IfThen),
        Raw::Else => TokenKind::Operator(OpCode::Else),
        Raw::Gt => TokenKind::Operator(OpCode::Gt),
        Raw::Lt => TokenKind::Operator(OpCode::Lt),
        Raw::AssignEquals => TokenKind::Operator(OpCode::AssignEquals),
        Raw::BoolNot => TokenKind::Operator(OpCode::BoolNot),
        Raw::BitAnd => TokenKind::Operator(OpCode::BitAnd),
        Raw::BitOr => TokenKind::Operator(OpCode::BitOr),
        Raw::LParen => TokenKind::LParen,
        Raw::RParen => TokenKind::RParen,
        Raw::Comma => TokenKind::Comma,
        Raw::Error => unreachable!("Error tokens are handled before conversion"),
    }
}

/// Lexes `source` into a flat token list, applying unary-operator
/// disambiguation by lookback as each token is emitted.
#[tracing::instrument(skip_all, fields(len = source.len()))]
pub fn lex(source: &str) -> ExpResult<Vec<Token>> {
    if source.trim().is_empty() {
        return Err(ExpError::at(
            ExpErrorKind::InvalExpr,
            "Empty expression was provided",
            0,
        ));
    }

    let mut tokens = Vec::new();
    let mut lexer = Raw::lexer(source);
    while let Some(raw) = lexer.next() {
        let span = lexer.span();
        if raw == Raw::Error {
            let byte = source.as_bytes()[span.start];
            if byte == b'\'' || byte == b'"' {
                return Err(ExpError::at(
                    ExpErrorKind::InvalExpr,
                    "Missing terminating quote character",
                    span.start,
                ));
            }
            return Err(ExpError::at(
                ExpErrorKind::InvalExpr,
                format!("Invalid or unsupported token '{}'", byte as char),
                span.start,
            ));
        }

        let mut kind = raw_to_kind(raw);
        if let TokenKind::Operator(op) = kind {
            if op.is_plus_or_minus() {
                let rewrite = match tokens.last() {
                    None => true,
                    Some(prev) => matches!(
                        prev,
                        Token {
                            kind: TokenKind::Comma | TokenKind::LParen | TokenKind::Operator(_),
                            ..
                        }
                    ),
                };
                if rewrite {
                    kind = TokenKind::Operator(op.to_unary());
                }
            }
        }
        tokens.push(Token::new(span.start, kind));
    }

    Ok(tokens)
}

/// Folds the case-insensitive predefined-constant identifiers (`pi`, `e`,
/// `true`/`yes`/`on`, `false`/`no`/`off`) into literal tokens, so that a
/// host's parameter callback never sees them. An identifier immediately
/// followed by `(` is left alone, in case the host wants to expose a
/// same-named function instead.
pub fn fold_predefined_constants(tokens: &mut [Token]) {
    let followed_by_lparen: Vec<bool> = (0..tokens.len())
        .map(|i| matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::LParen)))
        .collect();

    for (i, token) in tokens.iter_mut().enumerate() {
        if followed_by_lparen[i] {
            continue;
        }
        let name = match &token.kind {
            TokenKind::Parameter(name) => name.as_str(),
            _ => continue,
        };
        let folded = match name {
            "pi" => Some(TokenKind::Real(std::f64::consts::PI)),
            "e" => Some(TokenKind::Real(std::f64::consts::E)),
            "true" | "yes" | "on" => Some(TokenKind::Boolean(true)),
            "false" | "no" | "off" => Some(TokenKind::Boolean(false)),
            _ => None,
        };
        if let Some(kind) = folded {
            token.kind = kind;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opcodes(tokens: &[Token]) -> Vec<Option<OpCode>> {
        tokens.iter().map(|t| t.kind.clone().operator()).collect()
    }

    #[test]
    fn lexes_basic_arithmetic() {
        let tokens = lex("2+2").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Integer(2));
        assert_eq!(tokens[1].kind, TokenKind::Operator(OpCode::Plus));
        assert_eq!(tokens[2].kind, TokenKind::Integer(2));
    }

    #[test]
    fn disambiguates_unary_minus_at_start() {
        let tokens = lex("-2").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Operator(OpCode::UnaryMinus));
    }

    #[test]
    fn disambiguates_unary_after_operator_and_lparen() {
        let tokens = lex("3*(-2)").unwrap();
        assert_eq!(
            opcodes(&tokens),
            vec![None, Some(OpCode::Mul), None, Some(OpCode::UnaryMinus), None, None]
        );
    }

    #[test]
    fn does_not_rewrite_binary_minus() {
        let tokens = lex("3-2").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Operator(OpCode::Minus));
    }

    #[test]
    fn hex_octal_binary_literals() {
        assert_eq!(lex("0xff").unwrap()[0].kind, TokenKind::Integer(255));
        assert_eq!(lex("0o7").unwrap()[0].kind, TokenKind::Integer(7));
        assert_eq!(lex("0b101").unwrap()[0].kind, TokenKind::Integer(5));
    }

    #[test]
    fn real_literal_requires_mandatory_exponent_sign() {
        assert_eq!(lex("1e+5").unwrap()[0].kind, TokenKind::Real(1e5));
    }

    #[test]
    fn string_escapes() {
        let tokens = lex(r#"'a\nb\z'"#).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::String("a\nbz".to_string()));
    }

    #[test]
    fn unterminated_string_error() {
        let err = lex("'abc").unwrap_err();
        assert_eq!(err.message, "Missing terminating quote character");
    }

    #[test]
    fn empty_expression_error() {
        let err = lex("   ").unwrap_err();
        assert_eq!(err.message, "Empty expression was provided");
    }

    #[test]
    fn identifier_lowercased() {
        let tokens = lex("MyVar").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Parameter("myvar".to_string()));
    }

    #[test]
    fn two_char_operators_win_over_one_char() {
        let tokens = lex("1>=2").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Operator(OpCode::Ge));
    }

    #[test]
    fn folds_predefined_constants_case_insensitively() {
        let mut tokens = lex("PI + YES").unwrap();
        fold_predefined_constants(&mut tokens);
        assert_eq!(tokens[0].kind, TokenKind::Real(std::f64::consts::PI));
        assert_eq!(tokens[2].kind, TokenKind::Boolean(true));
    }

    #[test]
    fn does_not_fold_a_constant_name_used_as_a_function_call() {
        let mut tokens = lex("pi(1)").unwrap();
        fold_predefined_constants(&mut tokens);
        assert_eq!(tokens[0].kind, TokenKind::Parameter("pi".to_string()));
    }

    /// Renders a token list down to its kind shape, ignoring byte offsets, so
    /// snapshots stay readable and stable under minor span shifts.
    fn shape(tokens: &[Token]) -> String {
        tokens.iter().map(describe).collect::<Vec<_>>().join("\n")
    }

    fn describe(token: &Token) -> String {
        match &token.kind {
            TokenKind::Integer(v) => format!("Integer({v})"),
            TokenKind::Real(v) => format!("Real({v})"),
            TokenKind::Boolean(v) => format!("Boolean({v})"),
            TokenKind::String(s) => format!("String({s:?})"),
            TokenKind::Parameter(name) => format!("Parameter({name})"),
            TokenKind::Function(name) => format!("Function({name})"),
            TokenKind::LParen => "LParen".to_string(),
            TokenKind::RParen => "RParen".to_string(),
            TokenKind::Comma => "Comma".to_string(),
            TokenKind::Operator(op) => format!("Operator({op:?})"),
            TokenKind::IfCondition => "IfCondition".to_string(),
            TokenKind::IfBranch(body) => format!("IfBranch[{}]", shape(body)),
        }
    }

    #[test]
    fn snapshot_basic_arithmetic_token_shape() {
        let tokens = lex("1 + 2 * 3").unwrap();
        insta::assert_snapshot!(shape(&tokens), @r###"
        Integer(1)
        Operator(Plus)
        Integer(2)
        Operator(Mul)
        Integer(3)
        "###);
    }

    #[test]
    fn snapshot_string_and_real_token_shape() {
        let tokens = lex("'ab' + 1.5").unwrap();
        insta::assert_snapshot!(shape(&tokens), @r###"
        String("ab")
        Operator(Plus)
        Real(1.5)
        "###);
    }

    #[test]
    fn snapshot_predefined_constants_after_folding() {
        let mut tokens = lex("PI + YES").unwrap();
        fold_predefined_constants(&mut tokens);
        insta::assert_snapshot!(shape(&tokens), @r###"
        Real(3.141592653589793)
        Operator(Plus)
        Boolean(true)
        "###);
    }
}
