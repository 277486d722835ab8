//! The persistent global namespace of the built-in script language.
//!
//! One `Namespace` lives for the whole session: every run executes against
//! the same table, so names bound by one run are visible to the next until
//! the host resets the session.

use std::collections::HashMap;

use crate::script::Value;

/// Global name → value table.
#[derive(Debug, Default, Clone)]
pub struct Namespace {
    vars: HashMap<String, Value>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind) a name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Remove a binding, returning its value.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Iterate over all bindings (unordered).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
