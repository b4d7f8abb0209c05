//! Stateful lifecycle manager
//!
//! Keeps non-owning handles to every live expression that holds stateful
//! tokens and broadcasts reset signals to them on reload, reconfiguration
//! or restart. Resets are never issued per cycle.

use crate::expression::{Expression, Program};
use parking_lot::Mutex;
use std::sync::Weak;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct StateLifecycle {
    tracked: Mutex<Vec<Weak<Mutex<Program>>>>,
}

impl StateLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `expression`. Expressions without stateful tokens are
    /// ignored; returns whether it is now tracked.
    pub fn track(&self, expression: &Expression) -> bool {
        if !expression.is_stateful() {
            return false;
        }
        let mut tracked = self.tracked.lock();
        tracked.retain(|handle| handle.strong_count() > 0);
        tracked.push(expression.handle());
        debug!(formula = expression.source(), "stateful expression tracked");
        true
    }

    /// Reset every stateful token of every live tracked expression.
    ///
    /// Dropped expressions are pruned. Returns the number of tokens reset.
    pub fn reset_all(&self) -> usize {
        let mut tracked = self.tracked.lock();
        tracked.retain(|handle| handle.strong_count() > 0);

        let mut tokens = 0;
        for program in tracked.iter().filter_map(Weak::upgrade) {
            tokens += program.lock().reset();
        }

        info!(
            expressions = tracked.len(),
            tokens = tokens,
            "stateful functions reset"
        );
        tokens
    }

    /// Number of tracked expressions still alive
    pub fn tracked_expressions(&self) -> usize {
        self.tracked
            .lock()
            .iter()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }
}
