use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, RandomState};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::types::Native;

/// A zero-argument function callable from `${?name}` and `${!name}` markers.
pub type Function = Arc<dyn Fn() -> Native + Send + Sync>;

/// Named substitution functions.
///
/// [`FunctionTable::new`] starts with the built-ins:
///
/// - `null`: returns native `null`, so `${!null}` clears a value.
/// - `gen_hash`: a six-character uppercase hex tag, drawn once when the table
///   is built. Clones share it, so every configuration built from the
///   [`registry`](crate::registry) sees the same tag until
///   [`registry::reset`](crate::registry::reset).
#[derive(Clone)]
pub struct FunctionTable {
    functions: HashMap<String, Function>,
}

impl FunctionTable {
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.register("null", || Native::Null);
        let tag = run_tag();
        table.register("gen_hash", move || Native::String(tag.clone()));
        table
    }

    /// A table without the built-ins.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Register `f` under `name`, replacing any previous function of that name.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Native + Send + Sync + 'static,
    {
        let name = name.into();
        if self.functions.insert(name.clone(), Arc::new(f)).is_some() {
            debug!(function = %name, "Replaced registered function");
        }
    }

    /// Copy every function of `other` into this table; `other` wins on conflicts.
    pub fn extend(&mut self, other: &FunctionTable) {
        for (name, f) in &other.functions {
            self.functions.insert(name.clone(), Arc::clone(f));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Call `name`. `None` when no such function is registered.
    pub fn call(&self, name: &str) -> Option<Native> {
        self.functions.get(name).map(|f| f())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn run_tag() -> String {
    let seed = RandomState::new().hash_one((SystemTime::now(), std::process::id()));
    format!("{:06X}", seed & 0xFF_FFFF)
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("functions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_present() {
        let table = FunctionTable::new();
        assert_eq!(table.call("null"), Some(Native::Null));
        assert!(!FunctionTable::empty().contains("null"));
        assert!(!FunctionTable::empty().contains("gen_hash"));
    }

    #[test]
    fn gen_hash_is_stable_per_table() {
        let table = FunctionTable::new();
        let Some(Native::String(tag)) = table.call("gen_hash") else {
            panic!("gen_hash should return a string");
        };
        assert_eq!(tag.len(), 6);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(table.call("gen_hash"), Some(json!(tag)));
        assert_eq!(table.clone().call("gen_hash"), Some(json!(tag)));
    }

    #[test]
    fn register_and_call() {
        let mut table = FunctionTable::empty();
        table.register("years", || json!([2020, 2021]));
        assert_eq!(table.call("years"), Some(json!([2020, 2021])));
        assert_eq!(table.call("missing"), None);
    }

    #[test]
    fn later_registration_replaces() {
        let mut table = FunctionTable::empty();
        table.register("f", || json!(1));
        table.register("f", || json!(2));
        assert_eq!(table.call("f"), Some(json!(2)));
    }

    #[test]
    fn extend_prefers_other() {
        let mut base = FunctionTable::empty();
        base.register("a", || json!("base"));
        let mut other = FunctionTable::empty();
        other.register("a", || json!("other"));
        other.register("b", || json!("b"));
        base.extend(&other);
        assert_eq!(base.call("a"), Some(json!("other")));
        assert_eq!(base.names(), ["a", "b"]);
    }
}
