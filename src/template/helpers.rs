//! Helper functions bound into every compiled unit.

use minijinja::{Environment, Error, Value, value::Rest};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Type-erased helper callable.
pub type HelperFn = dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync;

/// Shared name → helper mapping.
///
/// Cloning is cheap (the callables are reference counted), so the same
/// mapping is bound into each unit at parse time.
#[derive(Clone, Default)]
pub struct Helpers {
    funcs: BTreeMap<String, Arc<HelperFn>>,
}

impl Helpers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a helper.
    pub fn insert<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.funcs.insert(name.into(), Arc::new(func));
    }

    pub fn with<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.insert(name, func);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.funcs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Register every helper as a global function of `env`.
    pub(crate) fn bind(&self, env: &mut Environment<'static>) {
        for (name, func) in &self.funcs {
            let func = Arc::clone(func);
            env.add_function(name.clone(), move |args: Rest<Value>| func(&args));
        }
    }
}

impl fmt::Debug for Helpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.funcs.keys()).finish()
    }
}
