//! Clock and date functions

use super::{binary, clock, unary, BinaryOp, UnaryOp};
use crate::operand::{Operand, Value};
use crate::registry::FunctionRegistry;
use crate::token::TokenKind;
use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike, Utc};

pub(crate) fn register(registry: &FunctionRegistry) {
    let function = TokenKind::Function;

    clock(registry, "Now", local_frame);
    clock(registry, "NowUTC", |now| now);

    let general: [(&'static str, fn(&Operand) -> Value); 8] = [
        ("Year", |v| part(v, |ts| i64::from(ts.year()))),
        ("Month", |v| part(v, |ts| i64::from(ts.month()))),
        ("Day", |v| part(v, |ts| i64::from(ts.day()))),
        ("Hour", |v| part(v, |ts| i64::from(ts.hour()))),
        ("Minute", |v| part(v, |ts| i64::from(ts.minute()))),
        ("Second", |v| part(v, |ts| i64::from(ts.second()))),
        ("DateValue", date_value),
        ("TimeStamp", |v| Value::Timestamp(v.timestamp())),
    ];
    for (name, f) in general {
        unary(registry, name, function, UnaryOp::General(f));
    }

    binary(registry, "Age", function, BinaryOp::General(age));
}

/// Local wall-clock reading of `instant`. Only the value is shifted; the
/// operand keeps the real instant as its timestamp.
fn local_frame(instant: DateTime<Utc>) -> DateTime<Utc> {
    wall_clock(instant, *instant.with_timezone(&Local).offset())
}

fn wall_clock(instant: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    instant.with_timezone(&offset).naive_local().and_utc()
}

/// Calendar component of a timestamp value; NaN for non-timestamps
fn part(v: &Operand, f: fn(DateTime<Utc>) -> i64) -> Value {
    v.as_timestamp()
        .map_or(Value::Number(f64::NAN), |ts| Value::Integer(f(ts)))
}

fn date_value(v: &Operand) -> Value {
    v.as_timestamp()
        .map_or(Value::Number(f64::NAN), Value::Timestamp)
}

/// Seconds from the first operand's timestamp to the second's
fn age(from: &Operand, to: &Operand) -> Value {
    let elapsed = to.timestamp().signed_duration_since(from.timestamp());
    Value::Number(elapsed.num_milliseconds() as f64 / 1000.0)
}
