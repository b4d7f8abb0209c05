//! Stateful functions
//!
//! Each token instance keeps its own history between evaluation cycles and
//! clears it on [`Token::reset`]. NaN inputs are skipped: they never enter
//! an accumulator or a window. Time-based functions use the sample
//! timestamps carried by the operands, not the wall clock.

use crate::error::Result;
use crate::operand::{merge_timestamps, Operand};
use crate::registry::FunctionRegistry;
use crate::token::{Arity, OperandStack, Token};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

pub(crate) fn register(registry: &FunctionRegistry) {
    registry.register("RunningTotal", || Box::<RunningTotal>::default() as Box<dyn Token>);
    registry.register("Previous", || Box::<Previous>::default() as Box<dyn Token>);
    registry.register("Delta", || Box::<Delta>::default() as Box<dyn Token>);
    registry.register("Integrate", || Box::new(Integrate::new()) as Box<dyn Token>);
    registry.register("RateOfChange", || Box::<RateOfChange>::default() as Box<dyn Token>);

    let windows = [
        ("WindowAvg", WindowStat::Average),
        ("MovingAvg", WindowStat::Average),
        ("WindowStdDev", WindowStat::StdDev),
        ("WindowMin", WindowStat::Min),
        ("WindowMax", WindowStat::Max),
    ];
    for (name, stat) in windows {
        registry.register(name, move || Box::new(Window::new(name, stat)) as Box<dyn Token>);
    }
}

/// Seconds between two sample timestamps
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    to.signed_duration_since(from).num_milliseconds() as f64 / 1000.0
}

/// `RunningTotal(x)`: sum of every valid sample so far, NaN before the first
#[derive(Debug, Clone, Default)]
pub struct RunningTotal {
    total: Option<f64>,
}

impl Token for RunningTotal {
    fn name(&self) -> &str {
        "RunningTotal"
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let operand = stack.pop(self.name())?;
        let value = operand.as_number();
        if !value.is_nan() {
            self.total = Some(self.total.unwrap_or(0.0) + value);
        }
        stack.push(Operand::new(
            self.total.unwrap_or(f64::NAN),
            operand.timestamp(),
        ));
        Ok(0)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.total = None;
    }
}

/// `Previous(x)`: the last valid sample before this one, NaN on the first
#[derive(Debug, Clone, Default)]
pub struct Previous {
    last: Option<f64>,
}

impl Token for Previous {
    fn name(&self) -> &str {
        "Previous"
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let operand = stack.pop(self.name())?;
        let result = self.last.unwrap_or(f64::NAN);
        let value = operand.as_number();
        if !value.is_nan() {
            self.last = Some(value);
        }
        stack.push(Operand::new(result, operand.timestamp()));
        Ok(0)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// `Delta(x)`: change since the last valid sample, 0 on the first
#[derive(Debug, Clone, Default)]
pub struct Delta {
    last: Option<f64>,
}

impl Token for Delta {
    fn name(&self) -> &str {
        "Delta"
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let operand = stack.pop(self.name())?;
        let value = operand.as_number();
        let delta = if value.is_nan() {
            f64::NAN
        } else {
            let delta = self.last.map_or(0.0, |last| value - last);
            self.last = Some(value);
            delta
        };
        stack.push(Operand::new(delta, operand.timestamp()));
        Ok(0)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStat {
    Average,
    /// Population standard deviation
    StdDev,
    Min,
    Max,
}

impl WindowStat {
    fn compute(self, values: &VecDeque<f64>) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        match self {
            Self::Average => values.iter().sum::<f64>() / n,
            Self::StdDev => {
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                variance.sqrt()
            },
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Largest accepted window, in samples
pub const MAX_WINDOW: usize = 100_000;

/// `WindowAvg(x, n)` and friends: statistic over the last `n` valid samples
///
/// A window size outside `1..=MAX_WINDOW` (or NaN) yields NaN and leaves the
/// history untouched. Changing the window size between cycles starts a new
/// window.
#[derive(Debug, Clone)]
pub struct Window {
    name: &'static str,
    stat: WindowStat,
    size: usize,
    values: VecDeque<f64>,
}

impl Window {
    pub fn new(name: &'static str, stat: WindowStat) -> Self {
        Self {
            name,
            stat,
            size: 0,
            values: VecDeque::new(),
        }
    }
}

impl Token for Window {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let (sample, size) = stack.pop_pair(self.name)?;
        let timestamp = merge_timestamps(sample.timestamp(), size.timestamp());

        let n = size.as_number();
        if !(1.0..=MAX_WINDOW as f64).contains(&n) {
            stack.push(Operand::new(f64::NAN, timestamp));
            return Ok(0);
        }

        let window = n.trunc() as usize;
        if window != self.size {
            self.size = window;
            self.values.clear();
        }

        let value = sample.as_number();
        if !value.is_nan() {
            if self.values.len() == self.size {
                self.values.pop_front();
            }
            self.values.push_back(value);
        }

        let result = self.stat.compute(&self.values);
        debug!(
            func = self.name,
            value = value,
            window = window,
            result = result,
            "window"
        );
        stack.push(Operand::new(result, timestamp));
        Ok(0)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.size = 0;
        self.values.clear();
    }
}

/// `Integrate(x[, factor])`: accumulated `x * dt * factor`, `dt` in seconds
/// between sample timestamps. The first sample starts the integral at 0.
#[derive(Debug, Clone)]
pub struct Integrate {
    count: usize,
    last_ts: Option<DateTime<Utc>>,
    accumulated: f64,
}

impl Integrate {
    pub fn new() -> Self {
        Self {
            count: 1,
            last_ts: None,
            accumulated: 0.0,
        }
    }
}

impl Default for Integrate {
    fn default() -> Self {
        Self::new()
    }
}

impl Token for Integrate {
    fn name(&self) -> &str {
        "Integrate"
    }

    fn arity(&self) -> Arity {
        Arity::Range { min: 1, max: 2 }
    }

    fn bind_arguments(&mut self, count: usize) {
        self.count = count.max(1);
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let args = stack.pop_n(self.name(), self.count)?;
        let sample = &args[0];
        let unit_factor = args.get(1).map_or(1.0, Operand::as_number);
        let now = sample.timestamp();
        let value = sample.as_number();

        match self.last_ts {
            _ if value.is_nan() => {},
            // First sample - start integrating, no accumulation yet
            None => self.last_ts = Some(now),
            Some(last_ts) => {
                let dt = seconds_between(last_ts, now);
                if dt > 0.0 {
                    let delta = value * dt * unit_factor;
                    self.accumulated += delta;
                    self.last_ts = Some(now);
                    debug!(
                        value = value,
                        dt = dt,
                        delta = delta,
                        accumulated = self.accumulated,
                        "integrate"
                    );
                }
            },
        }

        let timestamp = args.iter().map(Operand::timestamp).fold(now, merge_timestamps);
        stack.push(Operand::new(self.accumulated, timestamp));
        Ok(0)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.last_ts = None;
        self.accumulated = 0.0;
    }
}

/// `RateOfChange(x)`: `dv/dt` per second between consecutive valid samples
#[derive(Debug, Clone, Default)]
pub struct RateOfChange {
    last: Option<(DateTime<Utc>, f64)>,
}

impl Token for RateOfChange {
    fn name(&self) -> &str {
        "RateOfChange"
    }

    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }

    fn evaluate(
        &mut self,
        stack: &mut OperandStack<'_>,
        _remaining: &[Box<dyn Token>],
    ) -> Result<usize> {
        let operand = stack.pop(self.name())?;
        let now = operand.timestamp();
        let value = operand.as_number();

        let rate = if value.is_nan() {
            f64::NAN
        } else {
            let rate = match self.last {
                None => 0.0,
                Some((last_ts, last_value)) => {
                    let dt = seconds_between(last_ts, now);
                    let rate = if dt > 0.0 {
                        (value - last_value) / dt
                    } else {
                        0.0
                    };
                    debug!(
                        value = value,
                        last_value = last_value,
                        dt = dt,
                        rate = rate,
                        "rate_of_change"
                    );
                    rate
                },
            };
            self.last = Some((now, value));
            rate
        };

        stack.push(Operand::new(rate, now));
        Ok(0)
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn reset(&mut self) {
        self.last = None;
    }
}
