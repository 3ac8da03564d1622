//! Variable scopes
//!
//! The root scope holds `env`, `request`, the exploded request fields and
//! every workflow-level variable. Each `for each` iteration pushes a scope
//! holding its loop name. Assigning a name that already exists updates it
//! where it lives, so a loop can accumulate into an outer variable.

use indexmap::IndexMap;

use super::types::values::Value;

#[derive(Debug, Clone)]
pub struct Environment {
    scopes: Vec<IndexMap<String, Value>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![IndexMap::new()],
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Update the innermost existing binding, or create one in the current scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return;
            }
        }
        self.define(name, value);
    }

    /// Bind `name` in the current scope, shadowing outer bindings.
    pub fn define(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    /// Drop the innermost scope. The root scope is never dropped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}
