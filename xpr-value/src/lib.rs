//! Runtime value representation.
//!
//! Important types in this crate:
//! * [`Value`] - the four dynamic types the expression language evaluates to.
//! * The `to_*`/`as_*` family of coercion helpers, which implement the
//!   coercion table every operator and builtin function pulls from lazily.

use std::fmt;

use xpr_source::{ExpError, ExpErrorKind, ExpResult};

/// A dynamically-typed value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    String(String),
}

impl Value {
    /// Name used only inside error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
        }
    }

    /// Coerces to `bool`. Numeric values only coerce at exactly `0`/`1`;
    /// strings recognize the boolean words after trimming blanks.
    pub fn to_boolean(&self, position: usize) -> ExpResult<bool> {
        match self {
            Value::Integer(v) => Ok(*v != 0),
            Value::Boolean(v) => Ok(*v),
            Value::Real(v) => {
                if *v == 0.0 {
                    Ok(false)
                } else if *v == 1.0 {
                    Ok(true)
                } else {
                    Err(not_boolean(position))
                }
            }
            Value::String(s) => parse_bool_word(s).ok_or_else(|| not_boolean(position)),
        }
    }

    /// Coerces to `f64`. Strings are parsed as numbers (with a boolean-word
    /// fallback); see [`parse_numeric_string`].
    pub fn to_real(&self, position: usize) -> ExpResult<f64> {
        match self {
            Value::Integer(v) => Ok(*v as f64),
            Value::Real(v) => Ok(*v),
            Value::Boolean(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Value::String(s) => parse_numeric_string(s, position)?.to_real(position),
        }
    }

    /// Coerces to `i64`, truncating a `Real` towards zero. A `Real` outside
    /// `i64`'s range is an overflow, not a truncation.
    pub fn to_integer(&self, position: usize) -> ExpResult<i64> {
        match self {
            Value::Integer(v) => Ok(*v),
            Value::Boolean(v) => Ok(if *v { 1 } else { 0 }),
            Value::Real(v) => real_to_i64(*v, position),
            Value::String(s) => parse_numeric_string(s, position)?.to_integer(position),
        }
    }

    /// Coerces to a numeric `Value` (`Integer` or `Real`), preserving which
    /// of the two it was. Used by unary `+`/`-`, which need to know.
    pub fn to_numeric(&self, position: usize) -> ExpResult<Value> {
        match self {
            Value::Integer(_) | Value::Real(_) => Ok(self.clone()),
            Value::Boolean(v) => Ok(Value::Integer(if *v { 1 } else { 0 })),
            Value::String(s) => parse_numeric_string(s, position),
        }
    }

    /// The "strict integer" test from the glossary: an `Integer`, or a
    /// `Real`/`String` that is exactly integral. Unlike [`Self::to_integer`],
    /// a `Boolean` does not qualify.
    pub fn as_strict_integer(&self, position: usize) -> ExpResult<i64> {
        match self {
            Value::Integer(v) => Ok(*v),
            Value::Real(v) => {
                let rounded = real_to_i64(*v, position)?;
                if *v == rounded as f64 {
                    Ok(rounded)
                } else {
                    Err(not_integer(position))
                }
            }
            Value::String(s) => parse_numeric_string(s, position)?.as_strict_integer(position),
            Value::Boolean(_) => Err(not_integer(position)),
        }
    }

    /// Formats the value per the canonical stringify rule used for both
    /// string coercion and `Display`/the CLI's printed result: integers as
    /// signed decimal, reals with 9 fractional digits then trailing zeros
    /// (and a trailing `.`) trimmed, booleans as `True`/`False`, strings
    /// verbatim.
    pub fn to_string_into(&self, buf: &mut String) {
        use std::fmt::Write;
        match self {
            Value::Integer(v) => {
                let _ = write!(buf, "{}", v);
            }
            Value::Real(v) => {
                let formatted = format!("{:.9}", v);
                let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
                buf.push_str(if trimmed.is_empty() { "0" } else { trimmed });
            }
            Value::Boolean(v) => buf.push_str(if *v { "True" } else { "False" }),
            Value::String(s) => buf.push_str(s),
        }
    }
}

fn not_boolean(position: usize) -> ExpError {
    ExpError::at(ExpErrorKind::NonBoolean, "Value is not boolean", position)
}

fn not_numeric(position: usize) -> ExpError {
    ExpError::at(ExpErrorKind::NonNumeric, "Value is not numeric", position)
}

fn not_integer(position: usize) -> ExpError {
    ExpError::at(ExpErrorKind::NonInteger, "Value is not an integer", position)
}

fn real_to_i64(v: f64, position: usize) -> ExpResult<i64> {
    if v.is_finite() && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
        Ok(v as i64)
    } else {
        Err(ExpError::at(
            ExpErrorKind::IntOverflow,
            "Value does not fit in a 64-bit integer",
            position,
        ))
    }
}

/// Recognizes `true/yes/on/t/y` and `false/no/off/f/n`, case-insensitively,
/// after trimming ASCII blanks.
fn parse_bool_word(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "t" | "y" => Some(true),
        "false" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

/// Parses a string as a number: trims blanks, tries a hex literal, then a
/// signed decimal/real literal (exponent sign mandatory, same grammar the
/// lexer uses); if the whole string isn't consumed by either, falls back to
/// the boolean words (yielding `Integer(0)`/`Integer(1)`). An empty or
/// unparseable string is `NonNumeric`.
pub fn parse_numeric_string(raw: &str, position: usize) -> ExpResult<Value> {
    let trimmed = raw.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
    if trimmed.is_empty() {
        return Err(not_numeric(position));
    }
    if let Some(value) = try_parse_hex(trimmed) {
        return Ok(Value::Integer(value));
    }
    if let Some(value) = try_parse_decimal(trimmed) {
        return Ok(value);
    }
    if let Some(b) = parse_bool_word(trimmed) {
        return Ok(Value::Integer(if b { 1 } else { 0 }));
    }
    Err(not_numeric(position))
}

fn try_parse_hex(s: &str) -> Option<i64> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let value = u64::from_str_radix(digits, 16).ok()? as i64;
    Some(if negative { value.wrapping_neg() } else { value })
}

/// Decimal/real grammar: optional sign, digits, optional `.digits` (exactly
/// once), optional `e[+-]digits` (sign mandatory). Must consume the whole
/// string or it isn't a match.
fn try_parse_decimal(s: &str) -> Option<Value> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }

    let mut is_real = false;
    if i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j == frac_start {
            return None;
        }
        is_real = true;
        i = j;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j >= bytes.len() || (bytes[j] != b'+' && bytes[j] != b'-') {
            return None;
        }
        j += 1;
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j == exp_start {
            return None;
        }
        is_real = true;
        i = j;
    }

    if i != bytes.len() {
        return None;
    }
    if is_real {
        s.parse::<f64>().ok().map(Value::Real)
    } else {
        s.parse::<i64>().ok().map(Value::Integer)
    }
}

/// Real-to-integer narrowing, applied after every operator and function
/// call: a whole-valued `Real` that fits in `i64` becomes an `Integer`
/// (which also normalizes `-0.0` to `0`).
pub fn narrow(value: Value) -> Value {
    match value {
        Value::Real(r) => {
            if r == 0.0 {
                return Value::Integer(0);
            }
            if r.is_finite() && r == r.round() && r >= i64::MIN as f64 && r <= i64::MAX as f64 {
                Value::Integer(r as i64)
            } else {
                Value::Real(r)
            }
        }
        other => other,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        self.to_string_into(&mut buf);
        f.write_str(&buf)
    }
}
