//! Built-in operator and function catalog
//!
//! | Group      | Names |
//! |------------|-------|
//! | Operators  | `+ - * / MOD NEG = == <> != < <= > >= ! NOT AND OR XOR IMP` |
//! | Math       | `ABS SQRT EXP LN LOG10 SIN COS TAN ASIN ACOS ATAN ATAN2 SINH COSH TANH FLOOR CEIL ROUND SIGN MIN MAX CLAMP SCALE PI` |
//! | Text       | `Len Trim LTrim RTrim UCase LCase Left Right Mid InStr Concat Val Str` |
//! | Time       | `Now NowUTC Year Month Day Hour Minute Second DateValue TimeStamp Age` |
//! | Random     | `Rnd` |
//! | Stateful   | `RunningTotal Previous Delta WindowAvg MovingAvg WindowStdDev WindowMin WindowMax Integrate RateOfChange` |
//!
//! Most leaves are plain `fn` pointers wrapped in one of the generic token
//! shapes below; only the stateful functions have their own token types.

pub mod math;
pub mod operators;
pub mod stateful;
pub mod text;
pub mod time;

use crate::error::Result;
use crate::operand::{latest_timestamp, merge_timestamps, Operand, Value};
use crate::registry::FunctionRegistry;
use crate::token::{Arity, OperandStack, Token, TokenKind};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Register the whole catalog into `registry`
pub fn register_all(registry: &FunctionRegistry) {
    operators::register(registry);
    math::register(registry);
    text::register(registry);
    time::register(registry);
    stateful::register(registry);
    registry.register("Rnd", || Box::new(Random) as Box<dyn Token>);
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum UnaryOp {
    Numeric(fn(f64) -> f64),
    General(fn(&Operand) -> Value),
}

/// One operand in, one out; the result keeps the operand's timestamp
#[derive(Debug, Clone)]
pub(crate) struct Unary {
    name: &'static str,
    kind: TokenKind,
    op: UnaryOp,
}

impl Token for Unary {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> TokenKind {
        self.kind
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let operand = stack.pop(self.name)?;
        let value = match self.op {
            UnaryOp::Numeric(f) => Value::Number(f(operand.as_number())),
            UnaryOp::General(f) => f(&operand),
        };
        stack.push(Operand::new(value, operand.timestamp()));
        Ok(0)
    }
}

pub(crate) fn unary(registry: &FunctionRegistry, name: &'static str, kind: TokenKind, op: UnaryOp) {
    registry.register(name, move || Box::new(Unary { name, kind, op }) as Box<dyn Token>);
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum BinaryOp {
    Numeric(fn(f64, f64) -> f64),
    General(fn(&Operand, &Operand) -> Value),
}

/// Two operands in, one out; the result takes the later timestamp
#[derive(Debug, Clone)]
pub(crate) struct Binary {
    name: &'static str,
    kind: TokenKind,
    op: BinaryOp,
}

impl Token for Binary {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> TokenKind {
        self.kind
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let (left, right) = stack.pop_pair(self.name)?;
        let value = match self.op {
            BinaryOp::Numeric(f) => Value::Number(f(left.as_number(), right.as_number())),
            BinaryOp::General(f) => f(&left, &right),
        };
        let timestamp = merge_timestamps(left.timestamp(), right.timestamp());
        stack.push(Operand::new(value, timestamp));
        Ok(0)
    }
}

pub(crate) fn binary(
    registry: &FunctionRegistry,
    name: &'static str,
    kind: TokenKind,
    op: BinaryOp,
) {
    registry.register(name, move || Box::new(Binary { name, kind, op }) as Box<dyn Token>);
}

/// Function over a call-site-sized argument list; the result takes the
/// latest argument timestamp
#[derive(Debug, Clone)]
pub(crate) struct Variadic {
    name: &'static str,
    arity: Arity,
    count: usize,
    op: fn(&[Operand]) -> Value,
}

impl Token for Variadic {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn bind_arguments(&mut self, count: usize) {
        self.count = count;
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let args = stack.pop_n(self.name, self.count)?;
        let value = (self.op)(&args);
        stack.push(Operand::new(value, latest_timestamp(&args)));
        Ok(0)
    }
}

pub(crate) fn variadic(
    registry: &FunctionRegistry,
    name: &'static str,
    arity: Arity,
    op: fn(&[Operand]) -> Value,
) {
    registry.register(name, move || {
        Box::new(Variadic {
            name,
            arity,
            count: arity.minimum(),
            op,
        }) as Box<dyn Token>
    });
}

/// Named constant such as `PI`
#[derive(Debug, Clone)]
pub(crate) struct Constant {
    name: &'static str,
    value: f64,
}

impl Token for Constant {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        stack.push(Operand::literal(self.value));
        Ok(0)
    }
}

pub(crate) fn constant(registry: &FunctionRegistry, name: &'static str, value: f64) {
    registry.register(name, move || Box::new(Constant { name, value }) as Box<dyn Token>);
}

/// Current instant shared by every zero-argument reader
pub(crate) fn current_instant() -> DateTime<Utc> {
    Utc::now()
}

/// Clock reader; the result is stamped with the real instant read, while
/// the value is that instant expressed in the reader's frame
#[derive(Debug, Clone)]
pub(crate) struct Clock {
    name: &'static str,
    frame: fn(DateTime<Utc>) -> DateTime<Utc>,
}

impl Token for Clock {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let now = current_instant();
        stack.push(Operand::new(Value::Timestamp((self.frame)(now)), now));
        Ok(0)
    }
}

pub(crate) fn clock(
    registry: &FunctionRegistry,
    name: &'static str,
    frame: fn(DateTime<Utc>) -> DateTime<Utc>,
) {
    registry.register(name, move || Box::new(Clock { name, frame }) as Box<dyn Token>);
}

/// `Rnd`: uniform in [0, 1), stamped with the current UTC instant
#[derive(Debug, Clone)]
struct Random;

impl Token for Random {
    fn name(&self) -> &str {
        "Rnd"
    }

    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let value: f64 = rand::thread_rng().gen();
        stack.push(Operand::new(value, current_instant()));
        Ok(0)
    }
}
