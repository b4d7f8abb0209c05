//! Operand model
//!
//! An [`Operand`] is one value flowing through evaluation together with the
//! acquisition time it is "as of". Values are stored in a small closed
//! union and coerced on demand by total accessors: a conversion that makes
//! no sense yields a sentinel (NaN, `0`, `None`) instead of failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Default text form of timestamp values
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Naive layouts accepted by [`parse_timestamp`] after RFC 3339 (interpreted as UTC)
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Input operands for one evaluation cycle, keyed by input slot name
pub type Inputs = HashMap<String, Operand>;

/// Untagged-at-the-source value carried by an operand
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
}

impl Value {
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, Self::Timestamp(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // f64 Display prints integral reals without a fractional part
            Self::Number(v) => write!(f, "{}", v),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(DEFAULT_TIMESTAMP_FORMAT)),
            Self::Boolean(b) => f.write_str(if *b { "1" } else { "0" }),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// Value + acquisition timestamp, set together and never mutated afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    value: Value,
    timestamp: DateTime<Utc>,
}

impl Operand {
    /// Timestamp carried by literals: earlier than any sample, so merging
    /// with a real operand always selects the sample's time.
    pub const TIMELESS: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

    pub fn new(value: impl Into<Value>, timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            timestamp,
        }
    }

    /// Constant with no acquisition time
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(value, Self::TIMELESS)
    }

    /// Clock reading: value and timestamp are the same instant
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self::new(Value::Timestamp(at), at)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Numeric view. Text is parsed (NaN on failure), booleans are 1/0 and
    /// timestamps have no numeric form (NaN).
    pub fn as_number(&self) -> f64 {
        match &self.value {
            Value::Number(v) => *v,
            Value::Integer(i) => *i as f64,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            },
            Value::Text(s) => parse_number(s),
            Value::Timestamp(_) => f64::NAN,
        }
    }

    /// 32-bit two's-complement view used by bitwise operators
    pub fn as_integer(&self) -> i32 {
        match &self.value {
            // Low 32 bits, reinterpreted as signed
            Value::Integer(i) => *i as u32 as i32,
            _ => wrap_i32(self.as_number()),
        }
    }

    pub fn as_string(&self) -> String {
        self.value.to_string()
    }

    /// Timestamp view. Text is parsed; numeric sources are not timestamps.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.value {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// NaN check on the numeric view
    pub fn is_nan(&self) -> bool {
        self.as_number().is_nan()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timestamp == Self::TIMELESS {
            write!(f, "{}", self.value)
        } else {
            write!(
                f,
                "{} @ {}",
                self.value,
                self.timestamp.format(DEFAULT_TIMESTAMP_FORMAT)
            )
        }
    }
}

/// Later of two timestamps (timestamp merge rule for binary operations)
pub fn merge_timestamps(a: DateTime<Utc>, b: DateTime<Utc>) -> DateTime<Utc> {
    a.max(b)
}

/// Latest timestamp of a group of operands, `TIMELESS` when empty
pub fn latest_timestamp<'a>(operands: impl IntoIterator<Item = &'a Operand>) -> DateTime<Utc> {
    operands
        .into_iter()
        .map(Operand::timestamp)
        .fold(Operand::TIMELESS, merge_timestamps)
}

/// Truncate toward zero and wrap into signed 32-bit range.
///
/// The value is masked to 32 bits; a masked value above `i32::MAX` becomes
/// `value - 2^32`. Non-finite input maps to 0.
pub fn wrap_i32(value: f64) -> i32 {
    if !value.is_finite() {
        return 0;
    }
    let masked = value.trunc().rem_euclid(TWO_POW_32);
    if masked > f64::from(i32::MAX) {
        (masked - TWO_POW_32) as i32
    } else {
        masked as i32
    }
}

/// Parse numeric text, NaN when it is not a number
pub fn parse_number(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse timestamp text: RFC 3339 first, then naive layouts read as UTC,
/// then a bare date at midnight.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
