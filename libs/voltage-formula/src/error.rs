//! Error types for voltage-formula

use thiserror::Error;

/// Formula errors
///
/// Domain conditions (division by zero, out-of-range trig input, text that
/// does not parse as a number) are never reported here: they evaluate to NaN.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    /// Expression text could not be compiled
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// A token found fewer operands on the stack than it consumes
    #[error("Arity error: '{name}' requires {required} operand(s), found {available}")]
    Arity {
        name: String,
        required: usize,
        available: usize,
    },

    /// Name is not present in the function registry
    #[error("Function not registered: {0}")]
    NotRegistered(String),

    /// A referenced input slot was not supplied for this cycle
    #[error("Input not available: {0}")]
    MissingInput(String),

    /// Evaluation finished with a malformed stack
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FormulaError {
    pub fn syntax(position: usize, msg: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: msg.into(),
        }
    }

    pub fn arity(name: impl Into<String>, required: usize, available: usize) -> Self {
        Self::Arity {
            name: name.into(),
            required,
            available,
        }
    }

    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::NotRegistered(name.into())
    }

    pub fn missing_input(name: impl Into<String>) -> Self {
        Self::MissingInput(name.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound(name.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Compile-time failure, surfaced to whoever configured the expression
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }

    /// Defect in the expression definition detected while evaluating
    pub fn is_arity(&self) -> bool {
        matches!(self, Self::Arity { .. })
    }
}

impl From<figment::Error> for FormulaError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FormulaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FormulaError::syntax(4, "unknown function 'FOO'");
        assert_eq!(
            err.to_string(),
            "Syntax error at position 4: unknown function 'FOO'"
        );

        let err = FormulaError::arity("MOD", 2, 1);
        assert_eq!(
            err.to_string(),
            "Arity error: 'MOD' requires 2 operand(s), found 1"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(FormulaError::syntax(0, "x").is_syntax());
        assert!(!FormulaError::syntax(0, "x").is_arity());
        assert!(FormulaError::arity("+", 2, 0).is_arity());
        assert!(!FormulaError::missing_input("X").is_arity());
    }
}
