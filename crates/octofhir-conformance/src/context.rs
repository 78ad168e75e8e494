//! Per-run key/value store shared by the steps of one sequence run.
//!
//! Earlier steps write discovered resources, counters and flags; later steps
//! read them. A missing key is never a crash: [`ExecutionContext::require`]
//! turns it into a `Skip`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::outcome::{Outcome, Verdict};

/// Conventional key names used by the built-in steps.
pub mod keys {
    /// Key under which resources of `resource_type` discovered by a search are stored.
    pub fn resources(resource_type: &str) -> String {
        format!("resources.{resource_type}")
    }

    /// Key for the count of returned resources that failed a filter check.
    pub fn invalid_count(resource_type: &str) -> String {
        format!("invalid_count.{resource_type}")
    }
}

#[derive(Default)]
pub struct ExecutionContext {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Returns `None` when the key is absent or holds a different type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Like [`get`](Self::get), but a missing value becomes a `Skip`.
    pub fn require<T: Any>(&self, key: &str) -> Verdict<&T> {
        self.get::<T>(key).ok_or_else(|| {
            Outcome::skip(format!(
                "Required value `{key}` was not provided by an earlier step."
            ))
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Keys from `keys` that are not present, in the given order.
    pub fn missing<'k>(&self, keys: &'k [String]) -> Vec<&'k str> {
        keys.iter()
            .filter(|k| !self.contains(k))
            .map(String::as_str)
            .collect()
    }

    /// Add `by` to the counter stored under `key`, starting from zero.
    pub fn increment(&mut self, key: &str, by: u64) -> u64 {
        match self.get_mut::<u64>(key) {
            Some(count) => {
                *count += by;
                *count
            }
            None => {
                self.set(key, by);
                by
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("ExecutionContext").field("keys", &keys).finish()
    }
}
