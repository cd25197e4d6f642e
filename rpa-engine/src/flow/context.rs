//! Context Store
//!
//! Run-scoped variable bag shared by actions and transitions. Handles are
//! cheap to clone and every clone sees the same variables, so an external
//! writer can update a value while an action is polling it.

use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of a dotted-path lookup
#[derive(Debug, Clone, PartialEq)]
pub enum PathLookup {
    /// Every segment resolved
    Found(Value),
    /// Resolution stopped at `missing`; `reached` is the last value that was
    /// successfully resolved (`None` when even the first segment is absent).
    Partial {
        reached: Option<Value>,
        missing: String,
    },
}

impl PathLookup {
    pub fn found(self) -> Option<Value> {
        match self {
            PathLookup::Found(value) => Some(value),
            PathLookup::Partial { .. } => None,
        }
    }
}

/// Mutable key/value store for one run
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from an input value. Objects contribute their keys;
    /// anything else is kept under `input`.
    pub fn from_input(input: &Value) -> Self {
        let context = Self::new();
        match input {
            Value::Object(map) => {
                for (key, value) in map {
                    context.set(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => context.set("input", other.clone()),
        }
        context
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Top-level read
    pub fn get(&self, key: &str) -> Option<Value> {
        self.vars.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.vars.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Resolve `"a.b.c"` against nested objects. A key that literally
    /// contains dots is matched before the path is split. Array elements can
    /// be addressed by numeric segments.
    pub fn resolve_path(&self, path: &str) -> PathLookup {
        if let Some(value) = self.get(path) {
            return PathLookup::Found(value);
        }

        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = match self.get(first) {
            Some(value) => value,
            None => {
                return PathLookup::Partial {
                    reached: None,
                    missing: first.to_string(),
                }
            }
        };

        for segment in segments {
            let next = match &current {
                Value::Object(map) => map.get(segment).cloned(),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => {
                    return PathLookup::Partial {
                        reached: Some(current),
                        missing: segment.to_string(),
                    }
                }
            }
        }

        PathLookup::Found(current)
    }

    /// Strict nested read: `None` unless every segment resolves
    pub fn get_path(&self, path: &str) -> Option<Value> {
        self.resolve_path(path).found()
    }

    /// Copy of every variable as a JSON object
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .vars
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        Value::Object(map)
    }
}
