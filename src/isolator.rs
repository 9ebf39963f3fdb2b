//! Immutable scope chain carried into every render.
//!
//! Each node holds an optional key/value pair and the isolated configuration
//! blob for its scope. Parents are referenced weakly: a child never keeps its
//! ancestors alive, so the chain is owned from the root downwards.

use std::sync::{Arc, Weak};

use serde_json::Value;

#[derive(Debug, Default)]
pub struct Isolator {
    parent: Option<Weak<Isolator>>,
    key: Option<String>,
    value: Option<Value>,
    isolated_config: Option<Arc<Value>>,
}

impl Isolator {
    /// Create a parentless scope wrapping the given isolated configuration.
    pub fn root(isolated_config: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            isolated_config: isolated_config.map(Arc::new),
            ..Default::default()
        })
    }

    /// Create a child scope that inherits this scope's isolated configuration.
    pub fn child(self: &Arc<Self>, key: impl Into<String>, value: Value) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::downgrade(self)),
            key: Some(key.into()),
            value: Some(value),
            isolated_config: self.isolated_config.clone(),
        })
    }

    /// Returns the parent scope if it is still alive.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn isolated_config(&self) -> Option<&Value> {
        self.isolated_config.as_deref()
    }

    /// Walk from this scope towards the root and return the first value bound to `key`.
    pub fn lookup(self: &Arc<Self>, key: &str) -> Option<Value> {
        let mut current = Some(Arc::clone(self));
        while let Some(scope) = current {
            if scope.key.as_deref() == Some(key) {
                return scope.value.clone();
            }
            current = scope.parent();
        }
        None
    }
}
