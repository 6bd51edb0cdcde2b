//! The RPN stack machine: consumes the shunting-yard output in order,
//! dispatching literals straight to the stack and operators/functions/`?:`
//! to the rest of this crate.

use xpr_lexer::{OpCode, Token, TokenKind};
use xpr_source::{ExpError, ExpErrorKind, ExpResult};
use xpr_value::Value;

use crate::functions::{call_builtin, FunctionOutcome};
use crate::operators::{apply_binary, apply_unary};

/// Resolves a free identifier (one not known to be a function call) to a
/// value, or reports that the host doesn't recognize it either.
pub type ParameterHandler<'a> = dyn Fn(&str) -> Option<Value> + 'a;

/// Resolves a function call the builtin registry didn't recognize.
pub type FunctionHandler<'a> = dyn Fn(&str, &[Value]) -> FunctionOutcome + 'a;

/// What lives on the execution stack: an already-evaluated `Value`, or an
/// unevaluated ternary-branch sub-program waiting for its condition.
enum StackItem {
    Value(Value),
    Branch(Vec<Token>),
}

impl StackItem {
    fn into_value(self, position: usize) -> ExpResult<Value> {
        match self {
            StackItem::Value(v) => Ok(v),
            StackItem::Branch(_) => Err(ExpError::at(
                ExpErrorKind::InvalExpr,
                "Invalid or unsupported token",
                position,
            )),
        }
    }
}

fn err(kind: ExpErrorKind, message: impl Into<String>, position: usize) -> ExpError {
    ExpError::at(kind, message, position)
}

/// Executes a compiled RPN program against a fresh stack, returning the
/// single resulting value.
#[tracing::instrument(skip_all, fields(len = rpn.len()))]
pub fn execute(
    rpn: &[Token],
    parameter_handler: Option<&ParameterHandler<'_>>,
    function_handler: Option<&FunctionHandler<'_>>,
) -> ExpResult<Value> {
    let mut stack: Vec<StackItem> = Vec::new();

    for token in rpn {
        match &token.kind {
            TokenKind::Integer(v) => stack.push(StackItem::Value(Value::Integer(*v))),
            TokenKind::Real(v) => stack.push(StackItem::Value(Value::Real(*v))),
            TokenKind::Boolean(v) => stack.push(StackItem::Value(Value::Boolean(*v))),
            TokenKind::String(s) => stack.push(StackItem::Value(Value::String(s.clone()))),

            TokenKind::Parameter(name) => {
                let value = match parameter_handler.and_then(|handler| handler(name)) {
                    Some(value) => value,
                    None => {
                        return Err(err(
                            ExpErrorKind::InvalParam,
                            format!("Unknown parameter '{name}'"),
                            token.position,
                        ))
                    }
                };
                stack.push(StackItem::Value(value));
            }

            TokenKind::IfBranch(body) => stack.push(StackItem::Branch(body.clone())),

            TokenKind::Operator(op) => {
                stack.push(StackItem::Value(eval_operator(
                    *op,
                    &mut stack,
                    token.position,
                )?));
            }

            TokenKind::IfCondition => {
                let result = eval_if_condition(
                    &mut stack,
                    token.position,
                    parameter_handler,
                    function_handler,
                )?;
                stack.push(StackItem::Value(result));
            }

            TokenKind::Function(name) => {
                let result = eval_function(
                    name,
                    &mut stack,
                    token.position,
                    function_handler,
                )?;
                stack.push(StackItem::Value(xpr_value::narrow(result)));
            }

            TokenKind::LParen | TokenKind::RParen | TokenKind::Comma => {
                return Err(err(
                    ExpErrorKind::InvalExpr,
                    "Invalid or unsupported token",
                    token.position,
                ))
            }
        }
    }

    match stack.len() {
        0 => Err(err(
            ExpErrorKind::InvalExpr,
            "Expression is possibly malformed, it has too many operators",
            0,
        )),
        1 => stack.pop().unwrap().into_value(0),
        _ => Err(err(
            ExpErrorKind::InvalExpr,
            "Expression is possibly malformed, it has too many operands",
            0,
        )),
    }
}

fn eval_operator(op: OpCode, stack: &mut Vec<StackItem>, position: usize) -> ExpResult<Value> {
    let arity = op.argument_count();
    if stack.len() < arity {
        return Err(err(
            ExpErrorKind::InvalExpr,
            format!("{} operator does not have sufficient number of operands", op.display_name()),
            position,
        ));
    }

    let result = if arity == 1 {
        let arg = stack.pop().unwrap().into_value(position)?;
        apply_unary(op, arg, position)?
    } else {
        let rhs = stack.pop().unwrap().into_value(position)?;
        let lhs = stack.pop().unwrap().into_value(position)?;
        apply_binary(op, lhs, rhs, position)?
    };
    Ok(xpr_value::narrow(result))
}

fn eval_if_condition(
    stack: &mut Vec<StackItem>,
    position: usize,
    parameter_handler: Option<&ParameterHandler<'_>>,
    function_handler: Option<&FunctionHandler<'_>>,
) -> ExpResult<Value> {
    if stack.len() < 3 {
        return Err(err(
            ExpErrorKind::InvalExpr,
            "Conditional expression does not have sufficient number of operands",
            position,
        ));
    }
    let else_branch = match stack.pop().unwrap() {
        StackItem::Branch(body) => body,
        StackItem::Value(_) => {
            return Err(err(
                ExpErrorKind::InvalExpr,
                "Conditional expression does not have sufficient number of operands",
                position,
            ))
        }
    };
    let then_branch = match stack.pop().unwrap() {
        StackItem::Branch(body) => body,
        StackItem::Value(_) => {
            return Err(err(
                ExpErrorKind::InvalExpr,
                "Conditional expression does not have sufficient number of operands",
                position,
            ))
        }
    };
    let condition = stack.pop().unwrap().into_value(position)?;

    let selected = if condition.to_boolean(position)? {
        then_branch
    } else {
        else_branch
    };
    execute(&selected, parameter_handler, function_handler)
}

fn eval_function(
    name: &str,
    stack: &mut Vec<StackItem>,
    position: usize,
    function_handler: Option<&FunctionHandler<'_>>,
) -> ExpResult<Value> {
    let argc = match stack.pop() {
        Some(StackItem::Value(Value::Integer(n))) => n as usize,
        _ => {
            return Err(err(
                ExpErrorKind::InvalExpr,
                "Algorithm error: no argument count found for function",
                position,
            ))
        }
    };
    if argc > stack.len() {
        return Err(err(
            ExpErrorKind::InvalExpr,
            "Expression is possibly malformed, it has too many operators",
            position,
        ));
    }

    let mut args = Vec::with_capacity(argc);
    for item in stack.split_off(stack.len() - argc) {
        args.push(item.into_value(position)?);
    }

    if let Some(result) = call_builtin(name, &args, position) {
        return result;
    }

    match function_handler.map(|handler| handler(name, &args)) {
        Some(FunctionOutcome::Found(value)) => Ok(value),
        Some(FunctionOutcome::Unknown) | None => Err(err(
            ExpErrorKind::InvalFunc,
            format!("Unknown function '{name}'"),
            position,
        )),
        Some(FunctionOutcome::Failed(message)) => {
            Err(err(ExpErrorKind::UserFuncError, message, position))
        }
    }
}
