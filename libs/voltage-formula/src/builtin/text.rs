//! String functions
//!
//! Positions and lengths count characters, not bytes; positions are 1-based.

use super::{binary, unary, variadic, BinaryOp, UnaryOp};
use crate::operand::{Operand, Value};
use crate::registry::FunctionRegistry;
use crate::token::{Arity, TokenKind};

pub(crate) fn register(registry: &FunctionRegistry) {
    let function = TokenKind::Function;
    let general: [(&'static str, fn(&Operand) -> Value); 8] = [
        ("Len", len),
        ("Trim", |v| Value::Text(v.as_string().trim().to_string())),
        ("LTrim", |v| Value::Text(v.as_string().trim_start().to_string())),
        ("RTrim", |v| Value::Text(v.as_string().trim_end().to_string())),
        ("UCase", |v| Value::Text(v.as_string().to_uppercase())),
        ("LCase", |v| Value::Text(v.as_string().to_lowercase())),
        ("Val", |v| Value::Number(v.as_number())),
        ("Str", |v| Value::Text(v.as_string())),
    ];
    for (name, f) in general {
        unary(registry, name, function, UnaryOp::General(f));
    }

    binary(registry, "Left", function, BinaryOp::General(left));
    binary(registry, "Right", function, BinaryOp::General(right));
    binary(registry, "InStr", function, BinaryOp::General(in_str));
    variadic(registry, "Mid", Arity::Range { min: 2, max: 3 }, mid);
    variadic(registry, "Concat", Arity::AtLeast(1), concat);
}

/// Character count from a numeric operand; negative or NaN counts are 0
fn count(operand: &Operand) -> usize {
    let n = operand.as_number();
    if n.is_nan() || n <= 0.0 {
        0
    } else {
        n.trunc() as usize
    }
}

fn len(v: &Operand) -> Value {
    Value::Integer(v.as_string().chars().count() as i64)
}

fn left(s: &Operand, n: &Operand) -> Value {
    Value::Text(s.as_string().chars().take(count(n)).collect())
}

fn right(s: &Operand, n: &Operand) -> Value {
    let text = s.as_string();
    let skip = text.chars().count().saturating_sub(count(n));
    Value::Text(text.chars().skip(skip).collect())
}

/// `InStr(haystack, needle)`: 1-based position of the first match, 0 if absent
fn in_str(haystack: &Operand, needle: &Operand) -> Value {
    let haystack = haystack.as_string();
    let position = haystack
        .find(needle.as_string().as_str())
        .map_or(0, |byte| haystack[..byte].chars().count() + 1);
    Value::Integer(position as i64)
}

/// `Mid(text, start[, length])`
fn mid(args: &[Operand]) -> Value {
    let text = args.first().map(Operand::as_string).unwrap_or_default();
    let start = args.get(1).map_or(1, count).max(1);
    let chars = text.chars().skip(start - 1);
    let result = match args.get(2) {
        Some(length) => chars.take(count(length)).collect(),
        None => chars.collect(),
    };
    Value::Text(result)
}

fn concat(args: &[Operand]) -> Value {
    Value::Text(args.iter().map(Operand::as_string).collect())
}
