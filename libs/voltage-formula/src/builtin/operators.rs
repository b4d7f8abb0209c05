//! Arithmetic, comparison, logical and bitwise operators
//!
//! Bitwise operators work on the 32-bit integer view of their operands
//! (see [`Operand::as_integer`]); a NaN operand yields NaN.

use super::{binary, unary, BinaryOp, UnaryOp};
use crate::operand::{Operand, Value};
use crate::registry::FunctionRegistry;
use crate::token::TokenKind;
use std::cmp::Ordering;

/// Registry name of unary minus
pub const NEGATE: &str = "NEG";
/// Registry name of logical not
pub const LOGICAL_NOT: &str = "!";

// Higher binds tighter
pub const PRECEDENCE_NEGATE: u8 = 100;
pub const PRECEDENCE_MULTIPLICATIVE: u8 = 80;
pub const PRECEDENCE_ADDITIVE: u8 = 70;
pub const PRECEDENCE_COMPARISON: u8 = 60;
pub const PRECEDENCE_LOGICAL_NOT: u8 = 50;
pub const PRECEDENCE_BITWISE_NOT: u8 = 40;
pub const PRECEDENCE_AND: u8 = 30;
pub const PRECEDENCE_OR: u8 = 20;
pub const PRECEDENCE_IMP: u8 = 10;

pub(crate) fn register(registry: &FunctionRegistry) {
    let multiplicative = TokenKind::infix(PRECEDENCE_MULTIPLICATIVE);
    let additive = TokenKind::infix(PRECEDENCE_ADDITIVE);
    let comparison = TokenKind::infix(PRECEDENCE_COMPARISON);

    binary(registry, "+", additive, BinaryOp::Numeric(|a, b| a + b));
    binary(registry, "-", additive, BinaryOp::Numeric(|a, b| a - b));
    binary(registry, "*", multiplicative, BinaryOp::Numeric(|a, b| a * b));
    binary(registry, "/", multiplicative, BinaryOp::Numeric(divide));
    binary(registry, "MOD", multiplicative, BinaryOp::Numeric(modulo));
    unary(
        registry,
        NEGATE,
        TokenKind::prefix(PRECEDENCE_NEGATE),
        UnaryOp::Numeric(|v| -v),
    );

    binary(registry, "=", comparison, BinaryOp::General(equal));
    binary(registry, "==", comparison, BinaryOp::General(equal));
    binary(registry, "<>", comparison, BinaryOp::General(not_equal));
    binary(registry, "!=", comparison, BinaryOp::General(not_equal));
    binary(registry, "<", comparison, BinaryOp::General(less));
    binary(registry, "<=", comparison, BinaryOp::General(less_equal));
    binary(registry, ">", comparison, BinaryOp::General(greater));
    binary(registry, ">=", comparison, BinaryOp::General(greater_equal));

    unary(
        registry,
        LOGICAL_NOT,
        TokenKind::prefix(PRECEDENCE_LOGICAL_NOT),
        UnaryOp::General(logical_not),
    );
    unary(
        registry,
        "NOT",
        TokenKind::prefix(PRECEDENCE_BITWISE_NOT),
        UnaryOp::General(|v| bitwise1(v, |a| !a)),
    );
    binary(
        registry,
        "AND",
        TokenKind::infix(PRECEDENCE_AND),
        BinaryOp::General(|a, b| bitwise2(a, b, |a, b| a & b)),
    );
    binary(
        registry,
        "OR",
        TokenKind::infix(PRECEDENCE_OR),
        BinaryOp::General(|a, b| bitwise2(a, b, |a, b| a | b)),
    );
    binary(
        registry,
        "XOR",
        TokenKind::infix(PRECEDENCE_OR),
        BinaryOp::General(|a, b| bitwise2(a, b, |a, b| a ^ b)),
    );
    binary(
        registry,
        "IMP",
        TokenKind::infix(PRECEDENCE_IMP),
        BinaryOp::General(|a, b| bitwise2(a, b, |a, b| !a | b)),
    );
}

fn divide(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        f64::NAN
    } else {
        a / b
    }
}

/// Remainder with the sign of the dividend
fn modulo(a: f64, b: f64) -> f64 {
    a % b
}

/// Compare text as text, timestamps as instants, anything else numerically.
/// `None` when the operands are unordered (NaN involved).
fn compare(a: &Operand, b: &Operand) -> Option<Ordering> {
    match (a.value(), b.value()) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        _ => a.as_number().partial_cmp(&b.as_number()),
    }
}

fn equal(a: &Operand, b: &Operand) -> Value {
    Value::Boolean(compare(a, b) == Some(Ordering::Equal))
}

fn not_equal(a: &Operand, b: &Operand) -> Value {
    Value::Boolean(matches!(compare(a, b), Some(Ordering::Less | Ordering::Greater)))
}

fn less(a: &Operand, b: &Operand) -> Value {
    Value::Boolean(compare(a, b) == Some(Ordering::Less))
}

fn less_equal(a: &Operand, b: &Operand) -> Value {
    Value::Boolean(matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal)))
}

fn greater(a: &Operand, b: &Operand) -> Value {
    Value::Boolean(compare(a, b) == Some(Ordering::Greater))
}

fn greater_equal(a: &Operand, b: &Operand) -> Value {
    Value::Boolean(matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal)))
}

fn logical_not(v: &Operand) -> Value {
    let n = v.as_number();
    if n.is_nan() {
        Value::Number(f64::NAN)
    } else {
        Value::Boolean(n == 0.0)
    }
}

fn bitwise1(v: &Operand, f: fn(i32) -> i32) -> Value {
    if v.is_nan() {
        return Value::Number(f64::NAN);
    }
    Value::Integer(i64::from(f(v.as_integer())))
}

fn bitwise2(a: &Operand, b: &Operand, f: fn(i32, i32) -> i32) -> Value {
    if a.is_nan() || b.is_nan() {
        return Value::Number(f64::NAN);
    }
    Value::Integer(i64::from(f(a.as_integer(), b.as_integer())))
}
