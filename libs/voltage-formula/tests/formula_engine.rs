//! Formula Engine Integration Tests
//!
//! End-to-end checks through the public API:
//! - Timestamp propagation through operators and functions
//! - Parse-time rejection of malformed formulas
//! - Stateful functions across cycles and their reset lifecycle
//! - Runtime registration of custom functions
//! - Channel sets loaded from configuration files

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use chrono::{DateTime, TimeZone, Utc};
use std::io::Write;
use std::sync::Arc;
use voltage_formula::{
    Arity, ChannelDefinition, ChannelSet, CycleState, Expression, Fixity, FormulaConfig,
    FormulaError, FunctionRegistry, Inputs, Operand, OperandStack, StateLifecycle, Token,
    TokenKind, Value,
};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn sample(name: &str, value: f64, at: DateTime<Utc>) -> Inputs {
    let mut inputs = Inputs::new();
    inputs.insert(name.to_string(), Operand::new(value, at));
    inputs
}

fn eval(formula: &str) -> Operand {
    Expression::parse(formula, Vec::<String>::new())
        .unwrap()
        .evaluate(&Inputs::new())
        .unwrap()
}

// ============================================================================
// Timestamp Propagation
// ============================================================================

#[test]
fn test_mod_takes_later_timestamp() {
    let expr = Expression::parse("A MOD B", ["A", "B"]).unwrap();
    let mut inputs = sample("A", 7.0, ts(1));
    inputs.insert("B".to_string(), Operand::new(3.0, ts(2)));

    let result = expr.evaluate(&inputs).unwrap();
    assert_eq!(result.as_number(), 1.0);
    assert_eq!(result.timestamp(), ts(2));
}

#[test]
fn test_atan_plus_mod() {
    let expr = Expression::parse("ATAN(X)+MOD(Y,2)", ["X", "Y"]).unwrap();
    let mut inputs = sample("X", 1.0, ts(10));
    inputs.insert("Y".to_string(), Operand::new(7.0, ts(10)));

    let result = expr.evaluate(&inputs).unwrap();
    assert!((result.as_number() - (1.0_f64.atan() + 1.0)).abs() < 1e-12);
    assert_eq!(result.timestamp(), ts(10));
}

#[test]
fn test_literals_never_win_the_timestamp() {
    let expr = Expression::parse("(X + 100) * 2 - PI", ["X"]).unwrap();
    let result = expr.evaluate(&sample("X", 1.0, ts(42))).unwrap();
    assert_eq!(result.timestamp(), ts(42));

    assert_eq!(eval("1 + 2").timestamp(), Operand::TIMELESS);
}

/// Create a catalog token, bind `args.len()` arguments and run it once
fn run_token(name: &str, args: &[Operand]) -> voltage_formula::Result<Operand> {
    let mut token = FunctionRegistry::global().create(name)?;
    token.bind_arguments(args.len());
    let inputs = Inputs::new();
    let mut stack = OperandStack::new(&inputs);
    for arg in args {
        stack.push(arg.clone());
    }
    token.evaluate(&mut stack, &[])?;
    stack.pop(name)
}

#[test]
fn test_every_binary_token_takes_later_timestamp() {
    let registry = FunctionRegistry::global();
    let mut checked = 0;
    for name in registry.names() {
        let token = registry.create(&name).unwrap();
        let infix = matches!(
            token.kind(),
            TokenKind::Operator {
                fixity: Fixity::Infix,
                ..
            }
        );
        if !infix && token.arity() != Arity::Exact(2) {
            continue;
        }

        let later_right = run_token(&name, &[Operand::new(3.0, ts(1)), Operand::new(2.0, ts(2))])
            .unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(later_right.timestamp(), ts(2), "{}", name);

        let later_left = run_token(&name, &[Operand::new(3.0, ts(5)), Operand::new(2.0, ts(4))])
            .unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(later_left.timestamp(), ts(5), "{}", name);
        checked += 1;
    }
    assert!(checked >= 25, "only {} binary tokens checked", checked);
}

#[test]
fn test_every_unary_token_keeps_operand_timestamp() {
    let registry = FunctionRegistry::global();
    let mut checked = 0;
    for name in registry.names() {
        if registry.create(&name).unwrap().arity() != Arity::Exact(1) {
            continue;
        }
        let result = run_token(&name, &[Operand::new(0.5, ts(7))])
            .unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(result.timestamp(), ts(7), "{}", name);
        checked += 1;
    }
    assert!(checked >= 30, "only {} unary tokens checked", checked);
}

#[test]
fn test_every_token_rejects_operand_shortfall() {
    let registry = FunctionRegistry::global();
    let inputs = Inputs::new();
    let mut checked = 0;
    for name in registry.names() {
        let mut token = registry.create(&name).unwrap();
        let minimum = token.arity().minimum();
        if minimum == 0 {
            continue;
        }
        token.bind_arguments(minimum);

        let mut stack = OperandStack::new(&inputs);
        for i in 1..minimum {
            stack.push(Operand::literal(i as f64));
        }
        let err = token.evaluate(&mut stack, &[]).unwrap_err();
        assert!(err.is_arity(), "{}: {}", name, err);
        checked += 1;
    }
    assert!(checked >= 50, "only {} tokens checked", checked);
}

// ============================================================================
// Operator Precedence
// ============================================================================

#[test]
fn test_precedence_table() {
    let cases = [
        ("1 + 2 * 3", 7.0),
        ("(1 + 2) * 3", 9.0),
        ("10 - 4 - 3", 3.0),
        ("2 * 7 MOD 4", 2.0),
        ("-2 * -3", 6.0),
        ("1 + 2 = 3", 1.0),
        ("!0 = 5", 1.0),
        ("NOT 0 AND 6", 6.0),
        ("1 OR 2 AND 3", 3.0),
        ("6 XOR 3", 5.0),
        ("0 IMP 0", -1.0),
        ("1 < 2 AND 3 > 2", 1.0),
    ];
    for (formula, expected) in cases {
        assert_eq!(eval(formula).as_number(), expected, "{}", formula);
    }
}

#[test]
fn test_domain_conditions_are_nan() {
    assert!(eval("1 / 0").is_nan());
    assert!(eval("ACOS(2)").is_nan());
    assert!(eval("SQRT(-4)").is_nan());
    assert!(eval("Val(\"abc\") + 1").is_nan());
}

#[test]
fn test_text_and_dates() {
    assert_eq!(eval("Len(\"Voltage\") * 2").as_number(), 14.0);
    assert_eq!(eval("Concat(UCase(\"kw\"), \"h\")").as_string(), "KWh");
    assert_eq!(eval("Year(#2024-03-05 07:08:09#)").as_number(), 2024.0);
    assert_eq!(eval("\"abc\" < \"abd\"").value(), &Value::Boolean(true));
}

// ============================================================================
// Parse Errors
// ============================================================================

#[test]
fn test_unregistered_function_is_syntax_error() {
    let err = Expression::parse("FOO(1)", Vec::<String>::new()).unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(err, FormulaError::syntax(0, "unknown function 'FOO'"));
}

#[test]
fn test_parse_errors_carry_position() {
    let cases = [
        ("(1 + 2", 0),
        ("1 + 2)", 5),
        ("1 + 1.2.3", 4),
        ("X + ", 4),
        ("ATAN(1, 2)", 0),
        ("1 $ 2", 2),
    ];
    for (formula, position) in cases {
        match Expression::parse(formula, ["X"]) {
            Err(FormulaError::Syntax { position: p, .. }) => assert_eq!(p, position, "{}", formula),
            other => panic!("{}: expected syntax error, got {:?}", formula, other),
        }
    }
}

// ============================================================================
// Stateful Functions
// ============================================================================

#[test]
fn test_window_stddev_over_cycles() {
    let expr = Expression::parse("WindowStdDev(X, 3)", ["X"]).unwrap();
    let mut last = f64::NAN;
    for (i, v) in [1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
        last = expr
            .evaluate(&sample("X", v, ts(i as i64)))
            .unwrap()
            .as_number();
    }
    assert!((last - 0.8165).abs() < 1e-4);
}

#[test]
fn test_running_total_skips_nan() {
    let expr = Expression::parse("RunningTotal(X)", ["X"]).unwrap();
    let outputs: Vec<f64> = [5.0, f64::NAN, 3.0]
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            expr.evaluate(&sample("X", v, ts(i as i64)))
                .unwrap()
                .as_number()
        })
        .collect();
    assert_eq!(outputs, vec![5.0, 5.0, 8.0]);
}

#[test]
fn test_each_occurrence_has_its_own_state() {
    let expr = Expression::parse("RunningTotal(X) - RunningTotal(X * 2)", ["X"]).unwrap();
    expr.evaluate(&sample("X", 1.0, ts(0))).unwrap();
    let result = expr.evaluate(&sample("X", 1.0, ts(1))).unwrap();
    assert_eq!(result.as_number(), 2.0 - 4.0);
}

#[test]
fn test_energy_from_power_samples() {
    // W sampled every 60 s, integrated to Wh
    let expr = Expression::parse("Integrate(P, 1 / 3600)", ["P"]).unwrap();
    let mut energy = 0.0;
    for minute in 0..=60 {
        energy = expr
            .evaluate(&sample("P", 1200.0, ts(minute * 60)))
            .unwrap()
            .as_number();
    }
    assert!((energy - 1200.0).abs() < 1e-9);
}

#[test]
fn test_reset_equals_fresh_instance() {
    let formula = "WindowAvg(X, 2) + Delta(X) + RunningTotal(X)";
    let used = Expression::parse(formula, ["X"]).unwrap();
    for i in 0..4_i32 {
        used.evaluate(&sample("X", f64::from(i) * 3.0, ts(i64::from(i))))
            .unwrap();
    }
    assert_eq!(used.reset(), 3);
    assert_eq!(used.reset(), 3);

    let fresh = Expression::parse(formula, ["X"]).unwrap();
    for i in 10..13_i32 {
        let inputs = sample("X", f64::from(i), ts(i64::from(i)));
        assert_eq!(
            used.evaluate(&inputs).unwrap(),
            fresh.evaluate(&inputs).unwrap()
        );
    }
}

#[test]
fn test_lifecycle_broadcast_reset() {
    let lifecycle = StateLifecycle::new();
    let totals: Vec<Expression> = (0..3)
        .map(|_| Expression::parse("RunningTotal(X)", ["X"]).unwrap())
        .collect();
    for expr in &totals {
        assert!(lifecycle.track(expr));
        expr.evaluate(&sample("X", 10.0, ts(0))).unwrap();
    }

    assert_eq!(lifecycle.reset_all(), 3);
    for expr in &totals {
        let result = expr.evaluate(&sample("X", 1.0, ts(1))).unwrap();
        assert_eq!(result.as_number(), 1.0);
    }
}

// ============================================================================
// Evaluation Failures
// ============================================================================

#[test]
fn test_missing_input() {
    let expr = Expression::parse("X + Y", ["X", "Y"]).unwrap();
    let err = expr.evaluate(&sample("X", 1.0, ts(0))).unwrap_err();
    assert_eq!(err, FormulaError::missing_input("Y"));
    assert_eq!(expr.state(), CycleState::Failed);

    let mut inputs = sample("X", 1.0, ts(0));
    inputs.insert("Y".to_string(), Operand::new(2.0, ts(1)));
    assert_eq!(expr.evaluate(&inputs).unwrap().as_number(), 3.0);
    assert_eq!(expr.state(), CycleState::Done);
}

/// Custom plug-in: `Hypot(a, b)`
#[derive(Debug)]
struct Hypot;

impl Token for Hypot {
    fn name(&self) -> &str {
        "Hypot"
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> voltage_formula::Result<usize> {
        let (a, b) = stack.pop_pair(self.name())?;
        let at = a.timestamp().max(b.timestamp());
        stack.push(Operand::new(a.as_number().hypot(b.as_number()), at));
        Ok(0)
    }
}

#[test]
fn test_runtime_registration_and_shadowing() {
    let registry = FunctionRegistry::with_builtins();
    assert!(Expression::compile("Hypot(3, 4)", &registry, Vec::<String>::new()).is_err());

    registry.register("Hypot", || Box::new(Hypot) as Box<dyn Token>);
    let expr = Expression::compile("Hypot(3, 4)", &registry, Vec::<String>::new()).unwrap();
    assert_eq!(expr.evaluate(&Inputs::new()).unwrap().as_number(), 5.0);

    // Shadow a builtin; existing expressions keep their tokens
    let abs = Expression::compile("ABS(-2)", &registry, Vec::<String>::new()).unwrap();
    registry.register("ABS", || Box::new(Hypot) as Box<dyn Token>);
    assert_eq!(abs.evaluate(&Inputs::new()).unwrap().as_number(), 2.0);
    assert!(Expression::compile("ABS(-2)", &registry, Vec::<String>::new()).is_err());
}

// ============================================================================
// Channel Sets
// ============================================================================

#[test]
fn test_channel_set_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    write!(
        file,
        r#"
channels:
  - name: P_total
    formula: "P_a + P_b"
    inputs: [P_a, P_b]
  - name: E_total
    formula: "Integrate(P_total, 1 / 3600)"
    inputs: [P_total]
"#
    )
    .unwrap();

    let config = FormulaConfig::from_file(file.path()).unwrap();
    let lifecycle = Arc::new(StateLifecycle::new());
    let channels = ChannelSet::from_config(&config, Arc::clone(&lifecycle)).unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(lifecycle.tracked_expressions(), 1);

    let mut last = Vec::new();
    for hour in 0..=2 {
        let mut inputs = sample("P_a", 600.0, ts(hour * 3600));
        inputs.insert("P_b".to_string(), Operand::new(400.0, ts(hour * 3600)));
        last = channels.evaluate_all(&inputs);
    }
    let energy = last[1].1.as_ref().unwrap();
    assert!((energy.as_number() - 2000.0).abs() < 1e-9);
    assert_eq!(energy.timestamp(), ts(7200));
}

#[test]
fn test_channel_set_reload_resets_state() {
    let lifecycle = Arc::new(StateLifecycle::new());
    let mut channels = ChannelSet::new(FunctionRegistry::global(), Arc::clone(&lifecycle));
    channels
        .load(vec![ChannelDefinition::new("Total", "RunningTotal(X)", ["X"])])
        .unwrap();

    // Independent expression sharing the lifecycle
    let other = Expression::parse("RunningTotal(X)", ["X"]).unwrap();
    lifecycle.track(&other);
    other.evaluate(&sample("X", 50.0, ts(0))).unwrap();
    channels.evaluate("Total", &sample("X", 5.0, ts(0))).unwrap();

    channels
        .reload(vec![
            ChannelDefinition::new("Total", "RunningTotal(X)", ["X"]),
            ChannelDefinition::new("Avg", "WindowAvg(X, 2)", ["X"]),
        ])
        .unwrap();
    assert_eq!(channels.names(), vec!["Total", "Avg"]);

    let total = channels.evaluate("Total", &sample("X", 1.0, ts(1))).unwrap();
    assert_eq!(total.as_number(), 1.0);
    let other_total = other.evaluate(&sample("X", 1.0, ts(1))).unwrap();
    assert_eq!(other_total.as_number(), 1.0);
    // The replaced channel's expression was dropped and pruned
    assert_eq!(lifecycle.tracked_expressions(), 3);
}
