//! Per-operator numeric/string semantics. Every operator is a single
//! function taking the already-popped operand(s) and the position of the
//! operator token (used for every error this module raises), and returning
//! a `Value` or an `ExpError`.

use std::cmp::Ordering;

use xpr_lexer::OpCode;
use xpr_source::{ExpError, ExpErrorKind, ExpResult};
use xpr_value::Value;

fn err(kind: ExpErrorKind, message: impl Into<String>, position: usize) -> ExpError {
    ExpError::at(kind, message, position)
}

/// Dispatches a unary operator (`UnaryPlus`, `UnaryMinus`, `BoolNot`, `BitNot`).
pub fn apply_unary(op: OpCode, arg: Value, position: usize) -> ExpResult<Value> {
    match op {
        OpCode::UnaryPlus => arg.to_numeric(position),
        OpCode::UnaryMinus => match arg.to_numeric(position)? {
            Value::Integer(v) => Ok(Value::Integer(-v)),
            Value::Real(v) => Ok(Value::Real(-v)),
            _ => unreachable!("to_numeric only returns Integer or Real"),
        },
        OpCode::BoolNot => Ok(Value::Boolean(!arg.to_boolean(position)?)),
        OpCode::BitNot => Ok(Value::Integer(!arg.as_strict_integer(position)?)),
        _ => unreachable!("apply_unary called with a binary operator"),
    }
}

/// Dispatches a binary operator. `lhs`/`rhs` are already in left-to-right
/// order.
pub fn apply_binary(op: OpCode, lhs: Value, rhs: Value, position: usize) -> ExpResult<Value> {
    match op {
        OpCode::Plus => eval_plus(lhs, rhs, position),
        OpCode::Minus => Ok(Value::Real(lhs.to_real(position)? - rhs.to_real(position)?)),
        OpCode::Mul => Ok(Value::Real(lhs.to_real(position)? * rhs.to_real(position)?)),
        OpCode::Div => {
            let a = lhs.to_real(position)?;
            let b = rhs.to_real(position)?;
            if b == 0.0 {
                return Err(err(ExpErrorKind::DivByZero, "Division by zero", position));
            }
            Ok(Value::Real(a / b))
        }
        OpCode::Mod => eval_mod(lhs, rhs, position),
        OpCode::Pow => eval_pow(lhs, rhs, position),
        OpCode::ShiftLeft => {
            let a = lhs.as_strict_integer(position)?;
            let b = rhs.as_strict_integer(position)?;
            Ok(Value::Integer(a.wrapping_shl(b as u32)))
        }
        OpCode::ShiftRight => {
            let a = lhs.as_strict_integer(position)?;
            let b = rhs.as_strict_integer(position)?;
            Ok(Value::Integer(a.wrapping_shr(b as u32)))
        }
        OpCode::BitAnd => {
            let a = lhs.as_strict_integer(position)?;
            let b = rhs.as_strict_integer(position)?;
            Ok(Value::Integer(a & b))
        }
        OpCode::BitOr => {
            let a = lhs.as_strict_integer(position)?;
            let b = rhs.as_strict_integer(position)?;
            Ok(Value::Integer(a | b))
        }
        OpCode::Gt | OpCode::Lt | OpCode::Ge | OpCode::Le => eval_ordering(op, lhs, rhs, position),
        OpCode::BoolEquals | OpCode::NotEquals | OpCode::AssignEquals => {
            eval_equality(op, lhs, rhs, position)
        }
        OpCode::BoolAnd => {
            let a = lhs.to_boolean(position)?;
            let b = rhs.to_boolean(position)?;
            Ok(Value::Boolean(a && b))
        }
        OpCode::BoolOr => {
            let a = lhs.to_boolean(position)?;
            let b = rhs.to_boolean(position)?;
            Ok(Value::Boolean(a || b))
        }
        OpCode::UnaryPlus | OpCode::UnaryMinus | OpCode::BoolNot | OpCode::BitNot => {
            unreachable!("apply_binary called with a unary operator")
        }
        OpCode::IfThen | OpCode::Else => {
            unreachable!("the ternary is dispatched through IfCondition, not an operator")
        }
    }
}

/// `+`: if either side is a `String`, unconditionally falls back to
/// concatenation (stringifying both sides first), even when that string
/// happens to look numeric; otherwise Real+Real.
fn eval_plus(lhs: Value, rhs: Value, position: usize) -> ExpResult<Value> {
    let either_string = matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_));
    if !either_string {
        return Ok(Value::Real(lhs.to_real(position)? + rhs.to_real(position)?));
    }
    let mut concatenated = String::new();
    lhs.to_string_into(&mut concatenated);
    rhs.to_string_into(&mut concatenated);
    Ok(Value::String(concatenated))
}

fn eval_mod(lhs: Value, rhs: Value, position: usize) -> ExpResult<Value> {
    let a = lhs.as_strict_integer(position)?;
    let b = rhs.as_strict_integer(position)?;
    if b == 0 {
        return Err(err(ExpErrorKind::DivByZero, "Division by zero", position));
    }
    // `i64::MIN % -1` would overflow a checked `%`; the mathematical
    // remainder is always 0 in that case.
    Ok(Value::Integer(a.checked_rem(b).unwrap_or(0)))
}

fn eval_pow(lhs: Value, rhs: Value, position: usize) -> ExpResult<Value> {
    let base = lhs.to_real(position)?;
    let exp = rhs.to_real(position)?;
    if base == 0.0 && exp <= 0.0 {
        return Err(err(ExpErrorKind::DivByZero, "Division by zero", position));
    }
    if base < 0.0 && rhs.as_strict_integer(position).is_err() {
        return Err(err(
            ExpErrorKind::Complex,
            "Negative base raised to a non-integer power produces a complex number",
            position,
        ));
    }
    Ok(Value::Real(base.powf(exp)))
}

fn eval_ordering(op: OpCode, lhs: Value, rhs: Value, position: usize) -> ExpResult<Value> {
    let ordering = if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
        a.as_bytes().cmp(b.as_bytes())
    } else {
        lhs.to_real(position)?
            .partial_cmp(&rhs.to_real(position)?)
            .unwrap_or(Ordering::Equal)
    };
    let result = match op {
        OpCode::Gt => ordering == Ordering::Greater,
        OpCode::Lt => ordering == Ordering::Less,
        OpCode::Ge => ordering != Ordering::Less,
        OpCode::Le => ordering != Ordering::Greater,
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

fn eval_equality(op: OpCode, lhs: Value, rhs: Value, position: usize) -> ExpResult<Value> {
    let equal = if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
        a == b
    } else {
        lhs.to_real(position)? == rhs.to_real(position)?
    };
    let result = match op {
        OpCode::BoolEquals | OpCode::AssignEquals => equal,
        OpCode::NotEquals => !equal,
        _ => unreachable!(),
    };
    Ok(Value::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_concatenates_when_a_side_is_non_numeric_string() {
        let result = apply_binary(
            OpCode::Plus,
            Value::String("Hello, ".into()),
            Value::String("world".into()),
            0,
        )
        .unwrap();
        assert_eq!(result, Value::String("Hello, world".into()));
    }

    #[test]
    fn plus_concatenates_even_when_string_looks_like_a_number() {
        let result = apply_binary(OpCode::Plus, Value::Integer(2), Value::String("3".into()), 0)
            .unwrap();
        assert_eq!(result, Value::String("23".into()));
    }

    #[test]
    fn div_by_zero_is_an_error() {
        let err = apply_binary(OpCode::Div, Value::Integer(1), Value::Integer(0), 5).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::DivByZero);
        assert_eq!(err.position, Some(5));
    }

    #[test]
    fn negative_base_non_integer_exponent_is_complex() {
        let err = apply_binary(OpCode::Pow, Value::Integer(-2), Value::Real(0.5), 3).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::Complex);
    }

    #[test]
    fn zero_to_negative_power_is_div_by_zero() {
        let err = apply_binary(OpCode::Pow, Value::Integer(0), Value::Integer(-1), 0).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::DivByZero);
    }

    #[test]
    fn string_comparisons_are_lexicographic() {
        let result = apply_binary(
            OpCode::Lt,
            Value::String("abc".into()),
            Value::String("abd".into()),
            0,
        )
        .unwrap();
        assert_eq!(result, Value::Boolean(true));
    }

    #[test]
    fn shift_wraps_the_shift_amount() {
        let result = apply_binary(OpCode::ShiftLeft, Value::Integer(1), Value::Integer(64), 0)
            .unwrap();
        assert_eq!(result, Value::Integer(1));
    }

    #[test]
    fn bitwise_or_matches_narrowed_hex_and_octal_literals() {
        let result = apply_binary(OpCode::BitOr, Value::Integer(5), Value::Integer(7), 0).unwrap();
        assert_eq!(result, Value::Integer(7));
    }

    #[test]
    fn assign_equals_behaves_like_bool_equals() {
        let result =
            apply_binary(OpCode::AssignEquals, Value::Integer(1), Value::Integer(1), 0).unwrap();
        assert_eq!(result, Value::Boolean(true));
    }

    #[test]
    fn bool_ops_reject_non_boolean_real() {
        let err = apply_binary(OpCode::BoolAnd, Value::Real(0.5), Value::Boolean(true), 0)
            .unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::NonBoolean);
    }
}
