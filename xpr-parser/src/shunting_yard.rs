//! Dijkstra shunting-yard, extended with variadic-argument counting and
//! recursive ternary compilation, as described in the component design doc.

use xpr_lexer::{OpCode, Token, TokenKind};
use xpr_source::{ExpError, ExpErrorKind, ExpResult};

/// What an inner (ternary-branch) shunting-yard call is collecting, and how
/// it ends: whether it consumes its terminator or leaves it for the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    TopLevel,
    /// Collecting the "then" branch: ends on an unmatched `:`, consuming it.
    Then,
    /// Collecting the "else" branch: ends on an unmatched `:` (not consumed,
    /// the enclosing `Then` call needs it) or an unmatched `)`/end of input.
    Else,
}

/// A shared cursor into the flat token slice; every recursive call advances
/// the same position so sibling calls never see each other's tokens twice.
struct State<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> State<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }
}

fn err(kind: ExpErrorKind, message: &str, position: usize) -> ExpError {
    ExpError::at(kind, message, position)
}

/// Compiles a validated token list into RPN.
#[tracing::instrument(skip_all, fields(len = tokens.len()))]
pub fn compile(tokens: &[Token]) -> ExpResult<Vec<Token>> {
    let mut state = State { tokens, pos: 0 };
    let output = run(&mut state, Mode::TopLevel)?;
    if output.is_empty() {
        return Err(err(ExpErrorKind::InvalExpr, "Empty expression was provided", 0));
    }
    Ok(output)
}

/// Pops operators to `output` while the top of `operators` binds at least as
/// tightly as `incoming` given associativity, stopping at an `LParen`.
fn pop_while_precedes(operators: &mut Vec<Token>, output: &mut Vec<Token>, incoming: OpCode) {
    while let Some(top) = operators.last() {
        let top_op = match &top.kind {
            TokenKind::Operator(op) => *op,
            _ => break,
        };
        let should_pop = if incoming.is_left_to_right() {
            top_op.precedence() >= incoming.precedence()
        } else {
            top_op.precedence() > incoming.precedence()
        };
        if !should_pop {
            break;
        }
        output.push(operators.pop().unwrap());
    }
}

/// Pops operators up to (and discarding) the matching `LParen`. Returns an
/// error at `error_position` if the stack is exhausted first.
fn drain_to_lparen(
    operators: &mut Vec<Token>,
    output: &mut Vec<Token>,
    error_position: usize,
) -> ExpResult<()> {
    loop {
        match operators.pop() {
            Some(Token { kind: TokenKind::LParen, .. }) => return Ok(()),
            Some(tok) => output.push(tok),
            None => {
                return Err(err(
                    ExpErrorKind::InvalExpr,
                    "Unexpected right parenthesis",
                    error_position,
                ))
            }
        }
    }
}

fn has_open_lparen(operators: &[Token]) -> bool {
    operators.iter().any(|t| matches!(t.kind, TokenKind::LParen))
}

/// Runs one (possibly recursive) shunting-yard pass starting at the shared
/// cursor's current position, per `mode`'s termination rule.
fn run(state: &mut State, mode: Mode) -> ExpResult<Vec<Token>> {
    let mut output: Vec<Token> = Vec::new();
    let mut operators: Vec<Token> = Vec::new();
    let mut argc_stack: Vec<i64> = Vec::new();
    let mut had_value_stack: Vec<bool> = vec![false];
    let mut pending_function_paren = false;

    loop {
        let Some(token) = state.peek() else { break };

        match &token.kind {
            TokenKind::Operator(OpCode::Else) if mode == Mode::Then => {
                state.advance();
                break;
            }
            TokenKind::Operator(OpCode::Else) if mode == Mode::Else => break,
            TokenKind::Operator(OpCode::Else) if mode == Mode::TopLevel => {
                return Err(err(ExpErrorKind::InvalExpr, "Unexpected colon", token.position));
            }

            TokenKind::RParen if mode == Mode::Else && !has_open_lparen(&operators) => break,

            TokenKind::Operator(OpCode::IfThen) => {
                let position = token.position;
                let op = OpCode::IfThen;
                pop_while_precedes(&mut operators, &mut output, op);
                state.advance();

                let then_branch = run(state, Mode::Then)?;
                let else_branch = run(state, Mode::Else)?;

                *had_value_stack.last_mut().unwrap() = true;
                output.push(Token::new(position, TokenKind::IfBranch(then_branch)));
                output.push(Token::new(position, TokenKind::IfBranch(else_branch)));
                output.push(Token::new(position, TokenKind::IfCondition));
            }

            TokenKind::Integer(_)
            | TokenKind::Real(_)
            | TokenKind::Boolean(_)
            | TokenKind::String(_)
            | TokenKind::Parameter(_) => {
                *had_value_stack.last_mut().unwrap() = true;
                output.push(state.advance().unwrap().clone());
            }

            TokenKind::Function(_) => {
                *had_value_stack.last_mut().unwrap() = true;
                operators.push(state.advance().unwrap().clone());
                argc_stack.push(0);
                had_value_stack.push(false);
                pending_function_paren = true;
            }

            TokenKind::LParen => {
                if pending_function_paren {
                    pending_function_paren = false;
                } else {
                    had_value_stack.push(false);
                }
                operators.push(state.advance().unwrap().clone());
            }

            TokenKind::RParen => {
                let position = token.position;
                state.advance();
                drain_to_lparen(&mut operators, &mut output, position)?;

                if matches!(operators.last().map(|t| &t.kind), Some(TokenKind::Function(_))) {
                    let function = operators.pop().unwrap();
                    let n = argc_stack.pop().unwrap();
                    let h = had_value_stack.pop().unwrap();
                    let argc = n + if h { 1 } else { 0 };
                    output.push(Token::new(function.position, TokenKind::Integer(argc)));
                    output.push(function);
                } else {
                    // A grouping `(...)` always yields a value (the validator
                    // rejects an empty `()` that isn't a function call), so
                    // the enclosing frame now has a value too.
                    had_value_stack.pop();
                    *had_value_stack.last_mut().unwrap() = true;
                }
            }

            TokenKind::Comma => {
                let position = token.position;
                state.advance();
                drain_to_lparen_keep(&mut operators, &mut output, position)?;
                let h = had_value_stack.pop().unwrap();
                if h {
                    if let Some(top) = argc_stack.last_mut() {
                        *top += 1;
                    }
                }
                had_value_stack.push(false);
            }

            TokenKind::Operator(op) => {
                let op = *op;
                pop_while_precedes(&mut operators, &mut output, op);
                operators.push(state.advance().unwrap().clone());
            }

            TokenKind::IfCondition | TokenKind::IfBranch(_) => {
                unreachable!("these are shunting-yard output, never input")
            }
        }
    }

    match mode {
        Mode::TopLevel => {
            while let Some(top) = operators.pop() {
                if matches!(top.kind, TokenKind::LParen) {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Left parenthesis is opened but right parenthesis was not found",
                        top.position,
                    ));
                }
                output.push(top);
            }
        }
        Mode::Then => {
            while let Some(top) = operators.pop() {
                if matches!(top.kind, TokenKind::LParen) {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Non-closed left parenthesis in conditional expression",
                        top.position,
                    ));
                }
                output.push(top);
            }
        }
        Mode::Else => {
            while let Some(top) = operators.pop() {
                if matches!(top.kind, TokenKind::LParen) {
                    return Err(err(
                        ExpErrorKind::InvalExpr,
                        "Left parenthesis is opened but right parenthesis was not found",
                        top.position,
                    ));
                }
                output.push(top);
            }
        }
    }

    Ok(output)
}

/// Like [`drain_to_lparen`] but leaves the `LParen` itself on the stack,
/// since a comma's enclosing call is still open.
fn drain_to_lparen_keep(
    operators: &mut Vec<Token>,
    output: &mut Vec<Token>,
    error_position: usize,
) -> ExpResult<()> {
    loop {
        match operators.last() {
            Some(Token { kind: TokenKind::LParen, .. }) => return Ok(()),
            Some(_) => output.push(operators.pop().unwrap()),
            None => {
                return Err(err(ExpErrorKind::InvalExpr, "Unexpected comma", error_position))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpr_lexer::lex;

    fn compile_source(source: &str) -> Vec<Token> {
        let tokens = lex(source).unwrap();
        compile(&tokens).unwrap()
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn simple_precedence() {
        let rpn = compile_source("1 + 2 * 3");
        assert_eq!(
            kinds(&rpn),
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Integer(3),
                TokenKind::Operator(OpCode::Mul),
                TokenKind::Operator(OpCode::Plus),
            ]
        );
    }

    #[test]
    fn grouping_parens_override_precedence() {
        let rpn = compile_source("(1 + 2) * 3");
        assert_eq!(
            kinds(&rpn),
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Operator(OpCode::Plus),
                TokenKind::Integer(3),
                TokenKind::Operator(OpCode::Mul),
            ]
        );
    }

    #[test]
    fn power_is_right_associative() {
        let rpn = compile_source("2 ^ 3 ^ 2");
        assert_eq!(
            kinds(&rpn),
            vec![
                TokenKind::Integer(2),
                TokenKind::Integer(3),
                TokenKind::Integer(2),
                TokenKind::Operator(OpCode::Pow),
                TokenKind::Operator(OpCode::Pow),
            ]
        );
    }

    #[test]
    fn nullary_function_call_gets_zero_argc() {
        let rpn = compile_source("rand()");
        assert_eq!(kinds(&rpn), vec![TokenKind::Integer(0), TokenKind::Function("rand".into())]);
    }

    #[test]
    fn variadic_function_call_counts_arguments() {
        let rpn = compile_source("max(1, 2, 3)");
        assert_eq!(
            kinds(&rpn),
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Integer(3),
                TokenKind::Integer(3),
                TokenKind::Function("max".into()),
            ]
        );
    }

    #[test]
    fn grouped_argument_counts_toward_argc() {
        let rpn = compile_source("f(1, (2+3))");
        match &kinds(&rpn)[..] {
            [TokenKind::Integer(1), TokenKind::Integer(2), TokenKind::Integer(3), TokenKind::Operator(OpCode::Plus), TokenKind::Integer(argc), TokenKind::Function(name)] =>
            {
                assert_eq!(*argc, 2);
                assert_eq!(name, "f");
            }
            other => panic!("unexpected RPN shape: {other:?}"),
        }
    }

    #[test]
    fn nested_function_calls() {
        let rpn = compile_source("f(g())");
        assert_eq!(
            kinds(&rpn),
            vec![
                TokenKind::Integer(0),
                TokenKind::Function("g".into()),
                TokenKind::Integer(1),
                TokenKind::Function("f".into()),
            ]
        );
    }

    #[test]
    fn ternary_compiles_to_branches_and_condition() {
        let rpn = compile_source("1 ? 2 : 3");
        match &kinds(&rpn)[..] {
            [TokenKind::Integer(1), TokenKind::IfBranch(then_branch), TokenKind::IfBranch(else_branch), TokenKind::IfCondition] =>
            {
                assert_eq!(kinds(then_branch), vec![TokenKind::Integer(2)]);
                assert_eq!(kinds(else_branch), vec![TokenKind::Integer(3)]);
            }
            other => panic!("unexpected RPN shape: {other:?}"),
        }
    }

    #[test]
    fn nested_ternary_in_else_branch() {
        let tokens = lex("1 ? 2 : 3 ? 4 : 5").unwrap();
        let rpn = compile(&tokens).unwrap();
        assert_eq!(rpn.len(), 4);
        assert!(matches!(rpn[0].kind, TokenKind::Integer(1)));
        assert!(matches!(rpn[1].kind, TokenKind::IfBranch(_)));
        assert!(matches!(rpn[2].kind, TokenKind::IfBranch(_)));
        assert!(matches!(rpn[3].kind, TokenKind::IfCondition));
    }

    #[test]
    fn mismatched_lparen_is_reported() {
        let tokens = lex("(1 + 2").unwrap();
        let err = compile(&tokens).unwrap_err();
        assert_eq!(err.message, "Left parenthesis is opened but right parenthesis was not found");
    }

    #[test]
    fn empty_input_is_reported() {
        let err = compile(&[]).unwrap_err();
        assert_eq!(err.message, "Empty expression was provided");
    }

    /// Renders compiled RPN down to its kind shape, ignoring byte offsets, so
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
    fn snapshot_simple_precedence_rpn_shape() {
        let rpn = compile_source("1 + 2 * 3");
        insta::assert_snapshot!(shape(&rpn), @r###"
        Integer(1)
        Integer(2)
        Integer(3)
        Operator(Mul)
        Operator(Plus)
        "###);
    }

    #[test]
    fn snapshot_variadic_function_call_rpn_shape() {
        let rpn = compile_source("max(1, 2, 3)");
        insta::assert_snapshot!(shape(&rpn), @r###"
        Integer(1)
        Integer(2)
        Integer(3)
        Integer(3)
        Function(max)
        "###);
    }

    #[test]
    fn snapshot_ternary_rpn_shape() {
        let rpn = compile_source("1 ? 2 : 3");
        insta::assert_snapshot!(shape(&rpn), @r###"
        Integer(1)
        IfBranch[Integer(2)]
        IfBranch[Integer(3)]
        IfCondition
        "###);
    }
}
