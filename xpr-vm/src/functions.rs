//! The builtin function registry: a static name → evaluator lookup (already
//! lowercased, case-sensitive match), falling back to a host-supplied
//! function callback when the name isn't recognized.

use rand::Rng;

use xpr_source::{ExpError, ExpErrorKind, ExpResult};
use xpr_value::Value;

/// What a host's function callback reports back for a name it was asked to
/// resolve.
pub enum FunctionOutcome {
    /// The host resolved the call; this is its result.
    Found(Value),
    /// The host does not recognize this function name either.
    Unknown,
    /// The host recognized the name but the call itself failed.
    Failed(String),
}

fn err(kind: ExpErrorKind, message: impl Into<String>, position: usize) -> ExpError {
    ExpError::at(kind, message, position)
}

fn argc_low(name: &str, min: usize, position: usize) -> ExpError {
    err(
        ExpErrorKind::InvalArgCountLow,
        format!("{name}() requires at least {min} argument(s)"),
        position,
    )
}

fn argc_high(name: &str, max: usize, position: usize) -> ExpError {
    err(
        ExpErrorKind::InvalArgCountHigh,
        format!("{name}() accepts at most {max} argument(s)"),
        position,
    )
}

fn require_argc(name: &str, args: &[Value], min: usize, max: usize, position: usize) -> ExpResult<()> {
    if args.len() < min {
        return Err(argc_low(name, min, position));
    }
    if args.len() > max {
        return Err(argc_high(name, max, position));
    }
    Ok(())
}

fn require_exact(name: &str, args: &[Value], n: usize, position: usize) -> ExpResult<()> {
    require_argc(name, args, n, n, position)
}

fn trigonometric(position: usize) -> ExpError {
    err(ExpErrorKind::Trigonometric, "Argument is out of range for this trigonometric function", position)
}

fn complex(position: usize) -> ExpError {
    err(ExpErrorKind::Complex, "Argument would produce a complex result", position)
}

fn int_overflow(position: usize) -> ExpError {
    err(ExpErrorKind::IntOverflow, "Result does not fit in a 64-bit integer", position)
}

/// Converts a finite-checked `f64` result into a `Value`, rejecting results
/// that don't fit in `i64` (used by `ceil`/`floor`/`round`, which are
/// documented to raise `IntOverflow` rather than silently saturating).
fn real_result_in_i64_range(v: f64, position: usize) -> ExpResult<Value> {
    if !v.is_finite() || v < i64::MIN as f64 || v > i64::MAX as f64 {
        return Err(int_overflow(position));
    }
    Ok(Value::Real(v))
}

fn checked_trig(v: f64, position: usize) -> ExpResult<Value> {
    if v.is_finite() {
        Ok(Value::Real(v))
    } else {
        Err(trigonometric(position))
    }
}

/// Looks up `name` in the builtin registry and evaluates it against the
/// already-popped `args`. Returns `None` when the name isn't a builtin at
/// all, so the caller can fall through to the host's function callback.
pub fn call_builtin(name: &str, args: &[Value], position: usize) -> Option<ExpResult<Value>> {
    let result = match name {
        "abs" => one_real(name, args, position, f64::abs),
        "acos" => one_real_checked(name, args, position, |v| {
            if (-1.0..=1.0).contains(&v) {
                Ok(v.acos())
            } else {
                Err(trigonometric(position))
            }
        }),
        "asin" => one_real_checked(name, args, position, |v| {
            if (-1.0..=1.0).contains(&v) {
                Ok(v.asin())
            } else {
                Err(trigonometric(position))
            }
        }),
        "atan" => one_real(name, args, position, f64::atan),
        "atan2" => atan2(args, position),
        "ceil" => one_real_in_i64_range(name, args, position, f64::ceil),
        "cos" => one_real(name, args, position, f64::cos),
        "cosh" => one_real_trig(name, args, position, f64::cosh),
        "exp" => one_real(name, args, position, f64::exp),
        "floor" => one_real_in_i64_range(name, args, position, f64::floor),
        "fmod" => fmod(args, position),
        "log" => one_real_checked(name, args, position, |v| {
            if v > 0.0 {
                Ok(v.ln())
            } else {
                Err(complex(position))
            }
        }),
        "log10" => one_real_checked(name, args, position, |v| {
            if v > 0.0 {
                Ok(v.log10())
            } else {
                Err(complex(position))
            }
        }),
        "min" => fold_extremum(name, args, position, |a, b| a.min(b)),
        "max" => fold_extremum(name, args, position, |a, b| a.max(b)),
        "pow" => pow(args, position),
        "rand" | "random" => rand_fn(name, args, position),
        "round" => one_real_in_i64_range(name, args, position, f64::round),
        "sin" => one_real(name, args, position, f64::sin),
        "sinh" => one_real_trig(name, args, position, f64::sinh),
        "sqr" => one_real(name, args, position, |v| v * v),
        "sqrt" => one_real_checked(name, args, position, |v| {
            if v >= 0.0 {
                Ok(v.sqrt())
            } else {
                Err(complex(position))
            }
        }),
        "tan" => one_real(name, args, position, f64::tan),
        "tanh" => one_real_trig(name, args, position, f64::tanh),
        "bin2dec" => radix_to_dec(name, args, position, 2),
        "dec2bin" => dec_to_radix(name, args, position, 2),
        "dec2hex" => dec_to_radix(name, args, position, 16),
        "dec2oct" => dec_to_radix(name, args, position, 8),
        "hex2dec" => radix_to_dec(name, args, position, 16),
        "oct2dec" => radix_to_dec(name, args, position, 8),
        "boolean" | "bool" => {
            require_exact(name, args, 1, position).and_then(|()| args[0].to_boolean(position).map(Value::Boolean))
        }
        "float" | "double" => {
            require_exact(name, args, 1, position).and_then(|()| args[0].to_real(position).map(Value::Real))
        }
        "integer" | "int" => {
            require_exact(name, args, 1, position).and_then(|()| args[0].to_integer(position).map(Value::Integer))
        }
        "string" | "str" => require_exact(name, args, 1, position).map(|()| {
            let mut s = String::new();
            args[0].to_string_into(&mut s);
            Value::String(s)
        }),
        "ltrim" => trim_fn(name, args, position, |s| s.trim_start().to_string()),
        "rtrim" => trim_fn(name, args, position, |s| s.trim_end().to_string()),
        "trim" => trim_fn(name, args, position, |s| s.trim().to_string()),
        "strcasecmp" => strcasecmp(args, position),
        "strcmp" => strcmp(args, position),
        "strlen" => require_exact(name, args, 1, position).and_then(|()| {
            let s = as_string(&args[0], position)?;
            Ok(Value::Integer(s.len() as i64))
        }),
        "strtolower" | "strlwr" | "tolower" | "lowercase" => {
            trim_fn(name, args, position, |s| s.to_ascii_lowercase())
        }
        "strtoupper" | "strupr" | "toupper" | "uppercase" => {
            trim_fn(name, args, position, |s| s.to_ascii_uppercase())
        }
        "capitalise" => trim_fn(name, args, position, capitalise),
        "substr" | "substring" => substr(args, position),
        _ => return None,
    };
    Some(result)
}

/// `ceil`/`floor`/`round`: apply `f`, then reject a result outside `i64`'s
/// range rather than silently narrowing to an out-of-range `Real`.
fn one_real_in_i64_range(
    name: &str,
    args: &[Value],
    position: usize,
    f: impl Fn(f64) -> f64,
) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    real_result_in_i64_range(f(args[0].to_real(position)?), position)
}

fn one_real(name: &str, args: &[Value], position: usize, f: impl Fn(f64) -> f64) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    Ok(Value::Real(f(args[0].to_real(position)?)))
}

fn one_real_checked(
    name: &str,
    args: &[Value],
    position: usize,
    f: impl Fn(f64) -> ExpResult<f64>,
) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    Ok(Value::Real(f(args[0].to_real(position)?)?))
}

fn one_real_trig(name: &str, args: &[Value], position: usize, f: impl Fn(f64) -> f64) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    checked_trig(f(args[0].to_real(position)?), position)
}

fn atan2(args: &[Value], position: usize) -> ExpResult<Value> {
    require_exact("atan2", args, 2, position)?;
    let y = args[0].to_real(position)?;
    let x = args[1].to_real(position)?;
    if x == 0.0 && y != 0.0 {
        return Err(err(ExpErrorKind::DivByZero, "Division by zero", position));
    }
    Ok(Value::Real(y.atan2(x)))
}

fn fmod(args: &[Value], position: usize) -> ExpResult<Value> {
    require_exact("fmod", args, 2, position)?;
    let a = args[0].to_real(position)?;
    let b = args[1].to_real(position)?;
    Ok(Value::Real(a - b * (a / b).trunc()))
}

fn pow(args: &[Value], position: usize) -> ExpResult<Value> {
    require_exact("pow", args, 2, position)?;
    crate::operators::apply_binary(xpr_lexer::OpCode::Pow, args[0].clone(), args[1].clone(), position)
}

fn fold_extremum(
    name: &str,
    args: &[Value],
    position: usize,
    pick: impl Fn(f64, f64) -> f64,
) -> ExpResult<Value> {
    require_argc(name, args, 1, usize::MAX, position)?;
    let mut acc = args[0].to_real(position)?;
    for arg in &args[1..] {
        acc = pick(acc, arg.to_real(position)?);
    }
    Ok(Value::Real(acc))
}

fn rand_fn(name: &str, args: &[Value], position: usize) -> ExpResult<Value> {
    require_argc(name, args, 0, 2, position)?;
    let mut rng = rand::thread_rng();
    let value = match args.len() {
        0 => rng.gen::<f64>(),
        1 => {
            let high = args[0].to_real(position)?;
            rng.gen::<f64>() * high
        }
        2 => {
            let low = args[0].to_real(position)?;
            let high = args[1].to_real(position)?;
            low + rng.gen::<f64>() * (high - low)
        }
        _ => unreachable!(),
    };
    Ok(Value::Real(value))
}

fn radix_to_dec(name: &str, args: &[Value], position: usize, radix: u32) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    let s = as_string(&args[0], position)?;
    let mut acc: i64 = 0;
    for c in s.trim().chars() {
        let digit = c
            .to_digit(radix)
            .ok_or_else(|| err(ExpErrorKind::InvalArg, format!("'{c}' is not a valid digit for {name}()"), position))?
            as i64;
        acc = acc
            .checked_mul(radix as i64)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| int_overflow(position))?;
    }
    Ok(Value::Integer(acc))
}

fn dec_to_radix(name: &str, args: &[Value], position: usize, radix: u32) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    let n = args[0].as_strict_integer(position)?;
    if n == 0 {
        return Ok(Value::String("0".to_string()));
    }
    let negative = n < 0;
    let mut digits = Vec::new();
    let mut magnitude = n.unsigned_abs();
    while magnitude > 0 {
        let digit = (magnitude % radix as u64) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap());
        magnitude /= radix as u64;
    }
    if negative {
        digits.push('-');
    }
    digits.reverse();
    Ok(Value::String(digits.into_iter().collect()))
}

/// Coerces to a `String` payload without going through numeric coercion
/// first, so string-oriented builtins (`trim`, `strlen`, ...) stringify
/// non-string arguments via the canonical formatter instead of rejecting
/// them.
fn as_string(value: &Value, _position: usize) -> ExpResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ => {
            let mut s = String::new();
            value.to_string_into(&mut s);
            Ok(s)
        }
    }
}

fn trim_fn(name: &str, args: &[Value], position: usize, f: impl Fn(&str) -> String) -> ExpResult<Value> {
    require_exact(name, args, 1, position)?;
    let s = as_string(&args[0], position)?;
    Ok(Value::String(f(&s)))
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn strcmp(args: &[Value], position: usize) -> ExpResult<Value> {
    require_exact("strcmp", args, 2, position)?;
    let a = as_string(&args[0], position)?;
    let b = as_string(&args[1], position)?;
    let ordering = match a.as_bytes().cmp(b.as_bytes()) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    Ok(Value::Integer(ordering))
}

fn strcasecmp(args: &[Value], position: usize) -> ExpResult<Value> {
    require_exact("strcasecmp", args, 2, position)?;
    let a = as_string(&args[0], position)?;
    let b = as_string(&args[1], position)?;
    Ok(Value::Boolean(a.to_ascii_lowercase() == b.to_ascii_lowercase()))
}

fn substr(args: &[Value], position: usize) -> ExpResult<Value> {
    require_argc("substr", args, 2, 3, position)?;
    let s = as_string(&args[0], position)?;
    let len = s.len() as i64;
    let start = args[1].to_integer(position)?;
    if start < -len || start > len {
        return Err(err(ExpErrorKind::InvalArg, "substr() start index is out of range", position));
    }
    let start_index = if start < 0 { (len + start) as usize } else { start as usize };

    let requested_len = match args.get(2) {
        Some(v) => {
            let l = v.to_integer(position)?;
            if l < 0 {
                return Err(err(ExpErrorKind::InvalArg, "substr() length must not be negative", position));
            }
            l as usize
        }
        None => (len as usize) - start_index,
    };
    let end_index = (start_index + requested_len).min(len as usize);
    Ok(Value::String(s[start_index..end_index].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> ExpResult<Value> {
        call_builtin(name, args, 0).expect("builtin must be recognized")
    }

    #[test]
    fn unknown_name_falls_through_to_host() {
        assert!(call_builtin("definitely_not_builtin", &[], 0).is_none());
    }

    #[test]
    fn sqrt_domain_error() {
        let err = call("sqrt", &[Value::Integer(-1)]).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::Complex);
    }

    #[test]
    fn asin_domain_error() {
        let err = call("asin", &[Value::Real(2.0)]).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::Trigonometric);
    }

    #[test]
    fn atan2_div_by_zero() {
        let err = call("atan2", &[Value::Integer(1), Value::Integer(0)]).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::DivByZero);
    }

    #[test]
    fn min_max_are_variadic() {
        let min = call("min", &[Value::Integer(3), Value::Integer(1), Value::Integer(2)]).unwrap();
        assert_eq!(min, Value::Real(1.0));
        let max = call("max", &[Value::Integer(3), Value::Integer(1), Value::Integer(2)]).unwrap();
        assert_eq!(max, Value::Real(3.0));
    }

    #[test]
    fn min_max_accept_a_single_argument() {
        assert_eq!(call("min", &[Value::Integer(5)]).unwrap(), Value::Real(5.0));
        assert_eq!(call("max", &[Value::Integer(5)]).unwrap(), Value::Real(5.0));
    }

    #[test]
    fn min_requires_at_least_one_arg() {
        let err = call("min", &[]).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::InvalArgCountLow);
    }

    #[test]
    fn substr_negative_start_counts_from_end() {
        let result = call(
            "substr",
            &[Value::String("abcdef".into()), Value::Integer(-2)],
        )
        .unwrap();
        assert_eq!(result, Value::String("ef".into()));
    }

    #[test]
    fn substr_with_explicit_length() {
        let result = call(
            "substr",
            &[Value::String("abcdef".into()), Value::Integer(2), Value::Integer(3)],
        )
        .unwrap();
        assert_eq!(result, Value::String("cde".into()));
    }

    #[test]
    fn strcmp_uses_both_arguments() {
        let result = call("strcmp", &[Value::String("a".into()), Value::String("b".into())]).unwrap();
        assert_eq!(result, Value::Integer(-1));
        let result = call("strcmp", &[Value::String("b".into()), Value::String("a".into())]).unwrap();
        assert_eq!(result, Value::Integer(1));
    }

    #[test]
    fn strtoupper_uppercases() {
        let result = call("strtoupper", &[Value::String("world".into())]).unwrap();
        assert_eq!(result, Value::String("WORLD".into()));
    }

    #[test]
    fn bin2dec_and_dec2bin_roundtrip() {
        let decimal = call("bin2dec", &[Value::String("101".into())]).unwrap();
        assert_eq!(decimal, Value::Integer(5));
        let binary = call("dec2bin", &[Value::Integer(5)]).unwrap();
        assert_eq!(binary, Value::String("101".into()));
    }

    #[test]
    fn ceil_overflow_is_reported() {
        let err = call("ceil", &[Value::Real(1e30)]).unwrap_err();
        assert_eq!(err.kind, ExpErrorKind::IntOverflow);
    }

    #[test]
    fn fmod_computes_true_remainder() {
        let result = call("fmod", &[Value::Real(5.5), Value::Real(2.0)]).unwrap();
        assert_eq!(result, Value::Real(1.5));
    }
}
