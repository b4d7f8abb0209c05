//! Token abstraction
//!
//! A token is one unit of syntax in an executable sequence: a literal, an
//! input slot reference, an operator or a function. Every token implements
//! [`Token::evaluate`] over a shared [`OperandStack`]. Token instances are
//! created once per syntactic occurrence at parse time and reused for every
//! evaluation cycle, so stateful functions keep their history in `self`.

use crate::error::{FormulaError, Result};
use crate::operand::{Inputs, Operand};
use std::fmt;

/// Operator associativity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Associativity {
    #[default]
    Left,
    Right,
}

/// Where an operator sits relative to its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixity {
    /// `-x`, `!x`, `NOT x`
    Prefix,
    /// `a + b`, `a MOD b`
    Infix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Operator {
        /// Higher binds tighter
        precedence: u8,
        associativity: Associativity,
        fixity: Fixity,
    },
    Function,
    Literal,
}

impl TokenKind {
    pub fn infix(precedence: u8) -> Self {
        Self::Operator {
            precedence,
            associativity: Associativity::Left,
            fixity: Fixity::Infix,
        }
    }

    pub fn prefix(precedence: u8) -> Self {
        Self::Operator {
            precedence,
            associativity: Associativity::Right,
            fixity: Fixity::Prefix,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Self::Operator { .. })
    }
}

/// Number of operands a token consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range { min: usize, max: usize },
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::Exact(n) => count == n,
            Self::Range { min, max } => (min..=max).contains(&count),
            Self::AtLeast(n) => count >= n,
        }
    }

    pub fn minimum(self) -> usize {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => n,
            Self::Range { min, .. } => min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{}", n),
            Self::Range { min, max } => write!(f, "{} to {}", min, max),
            Self::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Unit of evaluation plugged into the registry
///
/// # Contract
/// - `evaluate` pops exactly the operands it consumes (top of stack is the
///   rightmost argument) and pushes exactly one result.
/// - Too few operands is an [`FormulaError::Arity`], never a silent answer.
/// - Domain problems produce NaN, not errors.
/// - Upcoming tokens may be inspected, or consumed by returning their count.
/// - A binary result is stamped with the later operand timestamp, a unary
///   result with its operand's timestamp.
pub trait Token: Send + fmt::Debug {
    /// Registry name exactly as registered
    fn name(&self) -> &str;

    fn kind(&self) -> TokenKind {
        TokenKind::Function
    }

    fn arity(&self) -> Arity;

    /// Call-site argument count, supplied once by the parser before the
    /// first evaluation. Only variadic tokens need to remember it.
    fn bind_arguments(&mut self, _count: usize) {}

    /// Execute against the cycle's stack. `remaining` holds the tokens that
    /// have not been evaluated yet in this cycle.
    ///
    /// Returns how many of `remaining` this token consumed (normally 0). The
    /// evaluator skips consumed tokens for the rest of the cycle, so the
    /// consuming token takes over their stack effect.
    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        remaining: &[Box<dyn Token>],
    ) -> Result<usize>;

    /// Whether this instance keeps history across cycles
    fn is_stateful(&self) -> bool {
        false
    }

    /// Return to the just-constructed state. Must be idempotent.
    fn reset(&mut self) {}

    /// Operand this token pushes independent of the cycle's inputs, if any.
    /// Lets look-ahead tokens fold constants they consume.
    fn constant(&self) -> Option<&Operand> {
        None
    }
}

/// Operand stack for one evaluation cycle
///
/// Created fresh per cycle so a failed cycle cannot leak operands into the
/// next one. Also exposes the cycle's input operands to input references.
#[derive(Debug)]
pub struct OperandStack<'a> {
    operands: Vec<Operand>,
    inputs: &'a Inputs,
}

impl<'a> OperandStack<'a> {
    pub fn new(inputs: &'a Inputs) -> Self {
        Self {
            operands: Vec::new(),
            inputs,
        }
    }

    pub fn push(&mut self, operand: Operand) {
        self.operands.push(operand);
    }

    /// Pop one operand for `name`
    pub fn pop(&mut self, name: &str) -> Result<Operand> {
        self.operands
            .pop()
            .ok_or_else(|| FormulaError::arity(name, 1, 0))
    }

    /// Pop `count` operands for `name`, returned leftmost argument first
    pub fn pop_n(&mut self, name: &str, count: usize) -> Result<Vec<Operand>> {
        let available = self.operands.len();
        if available < count {
            return Err(FormulaError::arity(name, count, available));
        }
        Ok(self.operands.split_off(available - count))
    }

    /// Pop a (left, right) operand pair for `name`
    pub fn pop_pair(&mut self, name: &str) -> Result<(Operand, Operand)> {
        let available = self.operands.len();
        if available < 2 {
            return Err(FormulaError::arity(name, 2, available));
        }
        let right = self.pop(name)?;
        let left = self.pop(name)?;
        Ok((left, right))
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    pub fn peek(&self) -> Option<&Operand> {
        self.operands.last()
    }

    /// Current operand for an input slot
    pub fn input(&self, name: &str) -> Option<&Operand> {
        self.inputs.get(name)
    }

    pub(crate) fn into_operands(self) -> Vec<Operand> {
        self.operands
    }
}

/// Numeric, string or date constant from the expression text
#[derive(Debug, Clone)]
pub struct Literal {
    text: String,
    operand: Operand,
}

impl Literal {
    pub fn new(text: impl Into<String>, operand: Operand) -> Self {
        Self {
            text: text.into(),
            operand,
        }
    }
}

impl Token for Literal {
    fn name(&self) -> &str {
        &self.text
    }

    fn kind(&self) -> TokenKind {
        TokenKind::Literal
    }

    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        stack.push(self.operand.clone());
        Ok(0)
    }

    fn constant(&self) -> Option<&Operand> {
        Some(&self.operand)
    }
}

/// Reference to an external input slot (e.g. a sensor channel)
#[derive(Debug, Clone)]
pub struct InputRef {
    slot: String,
}

impl InputRef {
    pub fn new(slot: impl Into<String>) -> Self {
        Self { slot: slot.into() }
    }
}

impl Token for InputRef {
    fn name(&self) -> &str {
        &self.slot
    }

    fn kind(&self) -> TokenKind {
        TokenKind::Literal
    }

    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let operand = stack
            .input(&self.slot)
            .cloned()
            .ok_or_else(|| FormulaError::missing_input(&self.slot))?;
        stack.push(operand);
        Ok(0)
    }
}
