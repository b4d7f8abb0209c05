//! Compiled expressions and the per-cycle evaluator
//!
//! An [`Expression`] is parsed once and evaluated on every new batch of
//! input operands. Each cycle runs the cached token sequence against a fresh
//! [`OperandStack`]; only the token instances (and the history kept by
//! stateful ones) survive between cycles.

use crate::error::{FormulaError, Result};
use crate::operand::{Inputs, Operand};
use crate::parser::Parser;
use crate::registry::FunctionRegistry;
use crate::token::{OperandStack, Token};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Evaluation cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    /// No cycle has run yet
    #[default]
    Idle,
    Running,
    /// Last cycle produced a result
    Done,
    /// Last cycle failed
    Failed,
}

/// Token sequence shared between an expression and the lifecycle manager
#[derive(Debug)]
pub(crate) struct Program {
    tokens: Vec<Box<dyn Token>>,
    state: CycleState,
    /// Arity failures are logged once per expression
    arity_reported: bool,
}

impl Program {
    fn new(tokens: Vec<Box<dyn Token>>) -> Self {
        Self {
            tokens,
            state: CycleState::Idle,
            arity_reported: false,
        }
    }

    /// Reset every stateful token, returning how many were reset
    pub(crate) fn reset(&mut self) -> usize {
        let mut count = 0;
        for token in self.tokens.iter_mut().filter(|t| t.is_stateful()) {
            token.reset();
            count += 1;
        }
        count
    }

    fn stateful_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_stateful()).count()
    }

    fn run(&mut self, inputs: &Inputs) -> Result<Operand> {
        let mut stack = OperandStack::new(inputs);
        let mut index = 0;
        while index < self.tokens.len() {
            let (evaluated, remaining) = self.tokens.split_at_mut(index + 1);
            let consumed = evaluated[index].evaluate(&mut stack, remaining)?;
            if consumed > remaining.len() {
                return Err(FormulaError::evaluation(format!(
                    "'{}' consumed {} token(s), only {} remaining",
                    evaluated[index].name(),
                    consumed,
                    remaining.len()
                )));
            }
            index += 1 + consumed;
        }

        let mut operands = stack.into_operands();
        match (operands.pop(), operands.len()) {
            (Some(result), 0) => Ok(result),
            (None, _) => Err(FormulaError::evaluation("sequence produced no result")),
            (Some(_), residual) => Err(FormulaError::evaluation(format!(
                "{} operand(s) left on the stack",
                residual + 1
            ))),
        }
    }
}

/// A parsed formula ready for repeated evaluation
#[derive(Debug)]
pub struct Expression {
    source: String,
    /// Input slots the formula references, in order of first use
    inputs: Vec<String>,
    program: Arc<Mutex<Program>>,
    stateful: usize,
}

impl Expression {
    /// Parse `source` against `registry`. `inputs` are the slot names bare
    /// identifiers may refer to.
    pub fn compile<I, S>(source: &str, registry: &FunctionRegistry, inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parsed = Parser::new(registry).with_inputs(inputs).parse(source)?;
        let program = Program::new(parsed.tokens);
        let stateful = program.stateful_count();

        debug!(
            formula = source,
            tokens = program.tokens.len(),
            stateful = stateful,
            "formula compiled"
        );

        Ok(Self {
            source: source.to_string(),
            inputs: parsed.inputs,
            program: Arc::new(Mutex::new(program)),
            stateful,
        })
    }

    /// Parse against the process-wide registry
    pub fn parse<I, S>(source: &str, inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::compile(source, &FunctionRegistry::global(), inputs)
    }

    /// Run one cycle
    ///
    /// Every referenced input must be present in `inputs`; otherwise the cycle
    /// fails with [`FormulaError::MissingInput`] before any token runs.
    pub fn evaluate(&self, inputs: &Inputs) -> Result<Operand> {
        let mut program = self.program.lock();

        if let Some(missing) = self.inputs.iter().find(|name| !inputs.contains_key(*name)) {
            program.state = CycleState::Failed;
            return Err(FormulaError::missing_input(missing));
        }

        program.state = CycleState::Running;
        match program.run(inputs) {
            Ok(result) => {
                program.state = CycleState::Done;
                debug!(formula = %self.source, result = %result, "cycle done");
                Ok(result)
            },
            Err(err) => {
                program.state = CycleState::Failed;
                if err.is_arity() && !program.arity_reported {
                    program.arity_reported = true;
                    warn!(formula = %self.source, error = %err, "formula evaluation failed");
                }
                Err(err)
            },
        }
    }

    /// State of the most recent cycle
    pub fn state(&self) -> CycleState {
        self.program.lock().state
    }

    /// Token names in evaluation order
    pub fn sequence(&self) -> Vec<String> {
        self.program
            .lock()
            .tokens
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Clear the history of every stateful token in this expression
    pub fn reset(&self) -> usize {
        self.program.lock().reset()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful > 0
    }

    pub fn stateful_tokens(&self) -> usize {
        self.stateful
    }

    pub(crate) fn handle(&self) -> Weak<Mutex<Program>> {
        Arc::downgrade(&self.program)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::token::{Arity, TokenKind};
    use chrono::{DateTime, TimeZone, Utc};
    use tracing_test::traced_test;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn inputs(pairs: &[(&str, Operand)]) -> Inputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Claims to be a plain function but pops more than its call supplies
    #[derive(Debug)]
    struct Greedy;

    impl Token for Greedy {
        fn name(&self) -> &str {
            "Greedy"
        }

        fn kind(&self) -> TokenKind {
            TokenKind::Function
        }

        fn arity(&self) -> Arity {
            Arity::Exact(1)
        }

        fn evaluate(
            &mut self,
            stack: &mut OperandStack<'_>,
            _remaining: &[Box<dyn Token>],
        ) -> Result<usize> {
            let args = stack.pop_n("Greedy", 3)?;
            stack.push(args[0].clone());
            Ok(0)
        }
    }

    /// Pushes 1 and folds a directly following constant, scaled by ten
    #[derive(Debug)]
    struct Lookahead;

    impl Token for Lookahead {
        fn name(&self) -> &str {
            "Lookahead"
        }

        fn arity(&self) -> Arity {
            Arity::Exact(0)
        }

        fn evaluate(
            &mut self,
            stack: &mut OperandStack<'_>,
            remaining: &[Box<dyn Token>],
        ) -> Result<usize> {
            stack.push(Operand::literal(1.0));
            match remaining.first().and_then(|next| next.constant()) {
                Some(constant) => {
                    stack.push(Operand::literal(constant.as_number() * 10.0));
                    Ok(1)
                },
                None => Ok(0),
            }
        }
    }

    /// Claims more upcoming tokens than exist
    #[derive(Debug)]
    struct Overreach;

    impl Token for Overreach {
        fn name(&self) -> &str {
            "Overreach"
        }

        fn arity(&self) -> Arity {
            Arity::Exact(0)
        }

        fn evaluate(
            &mut self,
            stack: &mut OperandStack<'_>,
            remaining: &[Box<dyn Token>],
        ) -> Result<usize> {
            stack.push(Operand::literal(0.0));
            Ok(remaining.len() + 1)
        }
    }

    #[test]
    fn test_lookahead_consumes_next_literal() {
        let registry = FunctionRegistry::with_builtins();
        registry.register("Lookahead", || Box::new(Lookahead) as Box<dyn Token>);

        let expr = Expression::compile("Lookahead() + 5", &registry, Vec::<String>::new()).unwrap();
        assert_eq!(expr.sequence(), ["Lookahead", "5", "+"]);
        // 1 + 50: the literal 5 is folded, not evaluated a second time
        assert_eq!(expr.evaluate(&Inputs::new()).unwrap().as_number(), 51.0);

        let expr = Expression::compile("Lookahead() + X", &registry, ["X"]).unwrap();
        let result = expr
            .evaluate(&inputs(&[("X", Operand::literal(5.0))]))
            .unwrap();
        assert_eq!(result.as_number(), 6.0);
    }

    #[test]
    fn test_consuming_past_the_end_fails() {
        let registry = FunctionRegistry::with_builtins();
        registry.register("Overreach", || Box::new(Overreach) as Box<dyn Token>);

        let expr = Expression::compile("Overreach() + 1", &registry, Vec::<String>::new()).unwrap();
        let err = expr.evaluate(&Inputs::new()).unwrap_err();
        assert!(matches!(err, FormulaError::Evaluation(_)));
        assert_eq!(expr.state(), CycleState::Failed);
    }

    #[test]
    fn test_evaluate_arithmetic() {
        let expr = Expression::parse("1 + 2 * 3", Vec::<String>::new()).unwrap();
        assert_eq!(expr.state(), CycleState::Idle);

        let result = expr.evaluate(&Inputs::new()).unwrap();
        assert_eq!(result.as_number(), 7.0);
        assert_eq!(result.timestamp(), Operand::TIMELESS);
        assert_eq!(expr.state(), CycleState::Done);
    }

    #[test]
    fn test_result_carries_input_timestamp() {
        let expr = Expression::parse("X * 2", ["X"]).unwrap();
        let result = expr
            .evaluate(&inputs(&[("X", Operand::new(4.0, ts(50)))]))
            .unwrap();
        assert_eq!(result.as_number(), 8.0);
        assert_eq!(result.timestamp(), ts(50));
    }

    #[test]
    fn test_missing_input_fails_before_running() {
        let expr = Expression::parse("X + Y", ["X", "Y"]).unwrap();
        let err = expr
            .evaluate(&inputs(&[("X", Operand::literal(1.0))]))
            .unwrap_err();
        assert_eq!(err, FormulaError::missing_input("Y"));
        assert_eq!(expr.state(), CycleState::Failed);
    }

    #[test]
    fn test_unreferenced_inputs_are_not_required() {
        let expr = Expression::parse("X", ["X", "Y"]).unwrap();
        assert_eq!(expr.inputs(), ["X".to_string()]);
        let result = expr
            .evaluate(&inputs(&[("X", Operand::literal(3.0))]))
            .unwrap();
        assert_eq!(result.as_number(), 3.0);
    }

    #[traced_test]
    #[test]
    fn test_arity_failure_logged_once() {
        let registry = FunctionRegistry::with_builtins();
        registry.register("Greedy", || Box::new(Greedy) as Box<dyn Token>);
        let expr = Expression::compile("Greedy(1)", &registry, Vec::<String>::new()).unwrap();

        for _ in 0..3 {
            let err = expr.evaluate(&Inputs::new()).unwrap_err();
            assert_eq!(err, FormulaError::arity("Greedy", 3, 1));
            assert_eq!(expr.state(), CycleState::Failed);
        }

        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("formula evaluation failed"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }

    #[test]
    fn test_sequence_is_postfix() {
        let expr = Expression::parse("ATAN(X)+MOD(Y,2)", ["X", "Y"]).unwrap();
        assert_eq!(expr.sequence(), ["X", "ATAN", "Y", "2", "MOD", "+"]);
        assert!(!expr.is_stateful());
        assert_eq!(expr.reset(), 0);
    }

    #[test]
    fn test_reset_counts_stateful_tokens() {
        let expr = Expression::parse("RunningTotal(X) + Previous(X) + 1", ["X"]).unwrap();
        assert!(expr.is_stateful());
        assert_eq!(expr.stateful_tokens(), 2);
        assert_eq!(expr.reset(), 2);
    }
}
