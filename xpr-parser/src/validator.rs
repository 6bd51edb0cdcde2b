//! Structural validation of a lexed token list, plus the
//! `Parameter` -> `Function` promotion that precedes it.

use xpr_lexer::{OpCode, Token, TokenKind};
use xpr_source::{ExpError, ExpErrorKind, ExpResult};

/// Promotes each `Parameter` immediately followed by `(` to `Function`,
/// then walks the list with one token of lookback/lookahead checking the
/// structural rules in the table below.
#[tracing::instrument(skip_all, fields(len = tokens.len()))]
pub fn validate(tokens: &mut [Token]) -> ExpResult<()> {
    promote_functions(tokens);
    check_structure(tokens)
}

fn promote_functions(tokens: &mut [Token]) {
    let followed_by_lparen: Vec<bool> = (0..tokens.len())
        .map(|i| matches!(tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::LParen)))
        .collect();

    for (i, token) in tokens.iter_mut().enumerate() {
        if !followed_by_lparen[i] {
            continue;
        }
        if let TokenKind::Parameter(name) = &token.kind {
            token.kind = TokenKind::Function(name.clone());
        }
    }
}

fn is_unary(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::UnaryPlus | OpCode::UnaryMinus | OpCode::BoolNot | OpCode::BitNot
    )
}

fn err(kind: ExpErrorKind, message: &str, position: usize) -> ExpError {
    ExpError::at(kind, message, position)
}

/// One token of lookback (`prev`) and lookahead (`next`); `None` stands for
/// "start of input" or "end of input" respectively.
fn check_structure(tokens: &[Token]) -> ExpResult<()> {
    for (i, token) in tokens.iter().enumerate() {
        let prev = if i == 0 { None } else { Some(&tokens[i - 1].kind) };
        let next = tokens.get(i + 1).map(|t| &t.kind);

        match &token.kind {
            TokenKind::LParen => {
                let ok_prev = matches!(prev, None)
                    || matches!(
                        prev,
                        Some(
                            TokenKind::LParen
                                | TokenKind::Comma
                                | TokenKind::Operator(_)
                                | TokenKind::Function(_)
                        )
                    );
                if !ok_prev {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Unexpected left parenthesis",
                        token.position,
                    ));
                }

                let is_call = matches!(prev, Some(TokenKind::Function(_)));
                let starved = matches!(next, Some(TokenKind::Comma))
                    || (matches!(next, Some(TokenKind::RParen)) && !is_call);
                if starved {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Parenthesis without operand on the right",
                        token.position,
                    ));
                }
            }
            TokenKind::RParen => {
                let ok_next = matches!(next, None)
                    || matches!(
                        next,
                        Some(TokenKind::RParen | TokenKind::Comma | TokenKind::Operator(_))
                    );
                if !ok_next {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Parenthesis without operator on the right",
                        token.position,
                    ));
                }
                if matches!(prev, Some(TokenKind::Comma)) {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Unexpected right parenthesis",
                        token.position,
                    ));
                }
            }
            TokenKind::Function(_) => {
                let ok_prev = matches!(prev, None)
                    || matches!(
                        prev,
                        Some(TokenKind::LParen | TokenKind::Comma | TokenKind::Operator(_))
                    );
                if !ok_prev {
                    return Err(err(ExpErrorKind::InvalExpr, "Unexpected function", token.position));
                }
            }
            TokenKind::Integer(_)
            | TokenKind::Real(_)
            | TokenKind::Boolean(_)
            | TokenKind::String(_)
            | TokenKind::Parameter(_) => {
                let ok_prev = matches!(prev, None)
                    || matches!(
                        prev,
                        Some(TokenKind::Operator(_) | TokenKind::LParen | TokenKind::Comma)
                    );
                if !ok_prev {
                    return Err(err(ExpErrorKind::InvalExpr, "Unexpected operand", token.position));
                }

                let ok_next = matches!(next, None)
                    || matches!(
                        next,
                        Some(TokenKind::Operator(_) | TokenKind::RParen | TokenKind::Comma)
                    );
                if !ok_next {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Operand without operator on the right",
                        token.position,
                    ));
                }
            }
            TokenKind::Operator(op) => {
                let at_binary_boundary = matches!(prev, None)
                    || matches!(
                        prev,
                        Some(TokenKind::LParen | TokenKind::Comma | TokenKind::Operator(_))
                    );
                if at_binary_boundary && !is_unary(*op) {
                    return Err(err(ExpErrorKind::InvalExpr, "Unexpected operator", token.position));
                }

                let starved = matches!(next, None)
                    || matches!(next, Some(TokenKind::RParen | TokenKind::Comma));
                if starved {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Operator without right operand",
                        token.position,
                    ));
                }
            }
            TokenKind::Comma => {}
            TokenKind::IfCondition | TokenKind::IfBranch(_) => {
                unreachable!("the validator runs before the shunting-yard stage")
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpr_lexer::lex;

    fn validate_source(source: &str) -> ExpResult<()> {
        let mut tokens = lex(source).unwrap();
        validate(&mut tokens)
    }

    #[test]
    fn promotes_identifier_before_lparen_to_function() {
        let mut tokens = lex("sin(1)").unwrap();
        promote_functions(&mut tokens);
        assert_eq!(tokens[0].kind, TokenKind::Function("sin".to_string()));
    }

    #[test]
    fn accepts_well_formed_expression() {
        assert!(validate_source("1 + 2 * (3 - 4)").is_ok());
        assert!(validate_source("f(1, 2, g())").is_ok());
        assert!(validate_source("-1 + -2").is_ok());
    }

    #[test]
    fn rejects_operator_missing_right_operand() {
        let err = validate_source("1 + (2*)").unwrap_err();
        assert_eq!(err.message, "Operator without right operand");
    }

    #[test]
    fn rejects_adjacent_operands() {
        let err = validate_source("1 2").unwrap_err();
        assert_eq!(err.message, "Operand without operator on the right");
    }

    #[test]
    fn rejects_comma_right_after_lparen() {
        let err = validate_source("f(,1)").unwrap_err();
        assert_eq!(err.message, "Parenthesis without operand on the right");
    }

    #[test]
    fn rejects_empty_grouping_parens() {
        let err = validate_source("1 + ()").unwrap_err();
        assert_eq!(err.message, "Parenthesis without operand on the right");
    }

    #[test]
    fn allows_empty_function_call_parens() {
        assert!(validate_source("rand()").is_ok());
    }

    #[test]
    fn rejects_binary_operator_at_start() {
        let err = validate_source("* 2").unwrap_err();
        assert_eq!(err.message, "Unexpected operator");
    }

    #[test]
    fn allows_unary_operator_at_start() {
        assert!(validate_source("-2").is_ok());
        assert!(validate_source("!true").is_ok());
    }
}
