//! Function registry
//!
//! Name → factory table consulted by the parser. Each factory builds a fresh
//! token instance, so two occurrences of the same name in one expression
//! (or the same name in two expressions) never share state.

use crate::builtin;
use crate::error::{FormulaError, Result};
use crate::token::Token;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Zero-argument constructor for a fresh token
pub type TokenFactory = Arc<dyn Fn() -> Box<dyn Token> + Send + Sync>;

static GLOBAL: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();

/// Registry of operators and functions
///
/// Names are matched case-sensitively exactly as registered. Registering a
/// name again replaces the previous factory. The table is behind a
/// read-mostly lock so late registration is safe while other threads parse.
#[derive(Default)]
pub struct FunctionRegistry {
    factories: RwLock<HashMap<String, TokenFactory>>,
}

impl FunctionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in operators and functions
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_all(&registry);
        registry
    }

    /// Process-wide registry with the built-in catalog, created on first use
    pub fn global() -> Arc<FunctionRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::with_builtins())))
    }

    /// Associate `name` with a factory. The last registration wins.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Token> + Send + Sync + 'static,
    {
        let name = name.into();
        let previous = self.factories.write().insert(name.clone(), Arc::new(factory));
        if previous.is_some() {
            debug!(name = %name, "registry entry shadowed");
        }
    }

    /// Make `alias` build the same tokens as `target`
    pub fn alias(&self, alias: impl Into<String>, target: &str) -> Result<()> {
        let mut factories = self.factories.write();
        let factory = factories
            .get(target)
            .cloned()
            .ok_or_else(|| FormulaError::not_registered(target))?;
        factories.insert(alias.into(), factory);
        Ok(())
    }

    /// Build a fresh token for `name`
    pub fn create(&self, name: &str) -> Result<Box<dyn Token>> {
        // Release the lock before running the factory
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FormulaError::not_registered(name))?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
