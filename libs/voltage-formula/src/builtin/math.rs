//! Math functions
//!
//! Out-of-domain arguments produce NaN, never an error.

use super::{binary, constant, unary, variadic, BinaryOp, UnaryOp};
use crate::operand::{Operand, Value};
use crate::registry::FunctionRegistry;
use crate::token::{Arity, TokenKind};

pub(crate) fn register(registry: &FunctionRegistry) {
    let function = TokenKind::Function;
    let numeric: [(&'static str, fn(f64) -> f64); 17] = [
        ("ABS", f64::abs),
        ("SQRT", f64::sqrt),
        ("EXP", f64::exp),
        ("LN", f64::ln),
        ("LOG10", f64::log10),
        ("SIN", f64::sin),
        ("COS", f64::cos),
        ("TAN", f64::tan),
        ("ASIN", f64::asin),
        ("ACOS", f64::acos),
        ("ATAN", f64::atan),
        ("SINH", f64::sinh),
        ("COSH", f64::cosh),
        ("TANH", f64::tanh),
        ("FLOOR", f64::floor),
        ("CEIL", f64::ceil),
        ("SIGN", sign),
    ];
    for (name, f) in numeric {
        unary(registry, name, function, UnaryOp::Numeric(f));
    }

    binary(registry, "ATAN2", function, BinaryOp::Numeric(f64::atan2));
    binary(registry, "SCALE", function, BinaryOp::Numeric(scale));
    variadic(registry, "ROUND", Arity::Range { min: 1, max: 2 }, round);
    variadic(registry, "MIN", Arity::AtLeast(1), |args| fold(args, f64::min));
    variadic(registry, "MAX", Arity::AtLeast(1), |args| fold(args, f64::max));
    variadic(registry, "CLAMP", Arity::Exact(3), clamp);
    constant(registry, "PI", std::f64::consts::PI);
}

/// Scale a value by a factor
pub fn scale(value: f64, factor: f64) -> f64 {
    value * factor
}

/// Sign function: returns -1, 0, or 1 (NaN stays NaN)
pub fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        value * 0.0
    }
}

/// `ROUND(value[, decimals])`, half away from zero
fn round(args: &[Operand]) -> Value {
    let value = args.first().map_or(f64::NAN, Operand::as_number);
    let decimals = args.get(1).map_or(0, Operand::as_integer);
    let factor = 10_f64.powi(decimals);
    Value::Number((value * factor).round() / factor)
}

/// `CLAMP(value, min, max)`; an inverted range is NaN
fn clamp(args: &[Operand]) -> Value {
    let [value, min, max] = [0, 1, 2].map(|i| args.get(i).map_or(f64::NAN, Operand::as_number));
    if min > max || min.is_nan() || max.is_nan() {
        return Value::Number(f64::NAN);
    }
    Value::Number(value.clamp(min, max))
}

/// MIN/MAX fold where any NaN argument makes the result NaN
fn fold(args: &[Operand], f: fn(f64, f64) -> f64) -> Value {
    let mut values = args.iter().map(Operand::as_number);
    let Some(first) = values.next() else {
        return Value::Number(f64::NAN);
    };
    let result = values.fold(first, |acc, v| {
        if acc.is_nan() || v.is_nan() {
            f64::NAN
        } else {
            f(acc, v)
        }
    });
    Value::Number(result)
}
