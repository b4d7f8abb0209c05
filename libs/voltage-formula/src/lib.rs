//! voltage-formula - Formula engine for VoltageEMS calculated channels
//!
//! Parses user-authored formulas once and re-evaluates them on every new
//! batch of samples. Every value carries the acquisition timestamp it is
//! "as of", and results inherit the latest timestamp of their inputs.
//!
//! # Features
//!
//! - **Timestamped operands**: number, integer, text, timestamp and boolean values
//! - **Extensible registry**: operators and functions are plug-ins created by name
//! - **Shunting-yard parser**: precedence-aware, errors carry the byte position
//! - **Stateful functions**: running totals, windows, integration, rate of change
//! - **Lifecycle**: broadcast reset of stateful history on reload or restart
//!
//! # Example
//!
//! ```rust
//! use voltage_formula::{Expression, Inputs, Operand};
//! use chrono::{TimeZone, Utc};
//!
//! let expr = Expression::parse("ATAN(X)+MOD(Y,2)", ["X", "Y"]).unwrap();
//!
//! let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let mut inputs = Inputs::new();
//! inputs.insert("X".to_string(), Operand::new(1.0, at));
//! inputs.insert("Y".to_string(), Operand::new(7.0, at));
//!
//! let result = expr.evaluate(&inputs).unwrap();
//! assert!((result.as_number() - (1.0_f64.atan() + 1.0)).abs() < 1e-12);
//! assert_eq!(result.timestamp(), at);
//! ```
//!
//! # Operators
//!
//! | Precedence | Operators | Notes |
//! |------------|-----------|-------|
//! | 100 | `-x` | unary minus |
//! | 80 | `*` `/` `MOD` | division by zero is NaN |
//! | 70 | `+` `-` | |
//! | 60 | `=` `==` `<>` `!=` `<` `<=` `>` `>=` | |
//! | 50 | `!x` | logical not |
//! | 40 | `NOT x` | bitwise, 32-bit |
//! | 30 | `AND` | bitwise, 32-bit |
//! | 20 | `OR` `XOR` | bitwise, 32-bit |
//! | 10 | `IMP` | `!a \| b`, bitwise |
//!
//! # Stateful Functions
//!
//! | Function | Signature | Description |
//! |----------|-----------|-------------|
//! | `RunningTotal` | `RunningTotal(x)` | Sum of all valid samples |
//! | `Previous` | `Previous(x)` | Last valid sample |
//! | `Delta` | `Delta(x)` | Change since the last sample |
//! | `WindowAvg` / `MovingAvg` | `WindowAvg(x, n)` | Sliding window average |
//! | `WindowStdDev` | `WindowStdDev(x, n)` | Population standard deviation |
//! | `WindowMin` / `WindowMax` | `WindowMin(x, n)` | Sliding window extremes |
//! | `Integrate` | `Integrate(x)` or `Integrate(x, factor)` | Time integral over sample timestamps |
//! | `RateOfChange` | `RateOfChange(x)` | dv/dt per second |

pub mod builtin;
pub mod channel;
pub mod config;
pub mod error;
pub mod expression;
pub mod lexer;
pub mod lifecycle;
pub mod operand;
pub mod parser;
pub mod registry;
pub mod token;

// Re-exports for convenience
pub use channel::{Channel, ChannelSet};
pub use config::{ChannelDefinition, FormulaConfig};
pub use error::{FormulaError, Result};
pub use expression::{CycleState, Expression};
pub use lifecycle::StateLifecycle;
pub use operand::{Inputs, Operand, Value};
pub use registry::{FunctionRegistry, TokenFactory};
pub use token::{Arity, Associativity, Fixity, OperandStack, Token, TokenKind};
