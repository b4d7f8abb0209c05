//! Derived channel set
//!
//! Compiles a list of channel definitions once, evaluates them per batch of
//! samples and drives the stateful lifecycle on reload and restart.

use crate::config::{ChannelDefinition, FormulaConfig};
use crate::error::{FormulaError, Result};
use crate::expression::Expression;
use crate::lifecycle::StateLifecycle;
use crate::operand::{Inputs, Operand};
use crate::registry::FunctionRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A compiled channel
#[derive(Debug)]
pub struct Channel {
    definition: ChannelDefinition,
    expression: Expression,
}

impl Channel {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ChannelDefinition {
        &self.definition
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

/// Calculated channels compiled against one registry
///
/// Channels are evaluated in definition order; a channel may read any
/// channel defined before it by listing that channel's name in its inputs.
#[derive(Debug)]
pub struct ChannelSet {
    registry: Arc<FunctionRegistry>,
    lifecycle: Arc<StateLifecycle>,
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
}

impl ChannelSet {
    pub fn new(registry: Arc<FunctionRegistry>, lifecycle: Arc<StateLifecycle>) -> Self {
        Self {
            registry,
            lifecycle,
            channels: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Build a set from configuration using the process-wide registry
    pub fn from_config(config: &FormulaConfig, lifecycle: Arc<StateLifecycle>) -> Result<Self> {
        let mut set = Self::new(FunctionRegistry::global(), lifecycle);
        set.load(config.channels.clone())?;
        Ok(set)
    }

    /// Compile and install `definitions`, replacing the current channels.
    ///
    /// All-or-nothing: if any formula fails to compile the current channels
    /// stay in place. Returns the number of channels loaded.
    pub fn load(&mut self, definitions: Vec<ChannelDefinition>) -> Result<usize> {
        let mut channels = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if index.contains_key(&definition.name) {
                return Err(FormulaError::config(format!(
                    "duplicate channel name: {}",
                    definition.name
                )));
            }
            let expression = Expression::compile(
                &definition.formula,
                &self.registry,
                definition.inputs.iter().map(String::as_str),
            )
            .inspect_err(|e| {
                warn!(
                    channel = %definition.name,
                    formula = %definition.formula,
                    error = %e,
                    "formula rejected"
                );
            })?;

            index.insert(definition.name.clone(), channels.len());
            channels.push(Channel {
                definition,
                expression,
            });
        }

        for channel in &channels {
            self.lifecycle.track(&channel.expression);
        }
        self.channels = channels;
        self.index = index;

        info!(channels = self.channels.len(), "channel set loaded");
        Ok(self.channels.len())
    }

    /// Replace the channels and reset every tracked stateful function
    pub fn reload(&mut self, definitions: Vec<ChannelDefinition>) -> Result<usize> {
        let loaded = self.load(definitions)?;
        self.lifecycle.reset_all();
        Ok(loaded)
    }

    /// Keep the channels, clear all stateful history
    pub fn restart(&self) -> usize {
        info!("channel set restart");
        self.lifecycle.reset_all()
    }

    /// Evaluate one channel
    pub fn evaluate(&self, name: &str, inputs: &Inputs) -> Result<Operand> {
        let channel = self
            .get(name)
            .ok_or_else(|| FormulaError::channel_not_found(name))?;
        channel.expression.evaluate(inputs)
    }

    /// Evaluate every channel in definition order
    ///
    /// Each successful result is visible to later channels under the
    /// channel's name. A failed channel is logged and reported in place.
    pub fn evaluate_all(&self, inputs: &Inputs) -> Vec<(String, Result<Operand>)> {
        let mut scope = inputs.clone();
        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let result = channel.expression.evaluate(&scope);
            match &result {
                Ok(value) => {
                    debug!(channel = channel.name(), value = %value, "channel evaluated");
                    scope.insert(channel.name().to_string(), value.clone());
                },
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "channel evaluation failed");
                },
            }
            results.push((channel.name().to_string(), result));
        }

        results
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.index.get(name).and_then(|&i| self.channels.get(i))
    }

    /// Channel names in definition order
    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(Channel::name).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn lifecycle(&self) -> &Arc<StateLifecycle> {
        &self.lifecycle
    }
}
