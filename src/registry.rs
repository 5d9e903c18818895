//! Process-wide registry: the "current" configuration and the default
//! function table.
//!
//! Lifecycle:
//!
//! - Nothing is installed until [`install`] (or a builder with
//!   [`use_global(true)`](crate::ConfigBuilder::use_global)) runs.
//! - [`current`] returns a deep copy of the installed configuration, or an
//!   empty one; it never fails.
//! - [`local`] is the same deep copy, named for its purpose: a private tree a
//!   thread can mutate without touching the shared one.
//! - [`reset`] uninstalls the configuration and restores the built-in
//!   function table.
//!
//! Installation takes a write lock; reads share a read lock. Replacing the
//! configuration while other threads read it is safe but racy in the
//! ordinary sense: each reader sees either the old or the new tree.

use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::Config;
use crate::functions::FunctionTable;
use crate::types::Native;

static CURRENT: RwLock<Option<Config>> = RwLock::new(None);

static FUNCTIONS: LazyLock<RwLock<FunctionTable>> =
    LazyLock::new(|| RwLock::new(FunctionTable::new()));

/// Make `config` the current configuration, returning the previous one.
pub fn install(config: Config) -> Option<Config> {
    debug!("Installing global configuration");
    CURRENT.write().replace(config)
}

/// A deep copy of the current configuration, or an empty one.
pub fn current() -> Config {
    CURRENT.read().clone().unwrap_or_default()
}

/// A private deep copy of the current configuration.
pub fn local() -> Config {
    current()
}

pub fn is_installed() -> bool {
    CURRENT.read().is_some()
}

/// Borrow the current configuration without copying it. Runs `f` with an
/// empty configuration when none is installed.
pub fn with_current<R>(f: impl FnOnce(&Config) -> R) -> R {
    match CURRENT.read().as_ref() {
        Some(config) => f(config),
        None => f(&Config::new()),
    }
}

/// Uninstall the current configuration and restore the built-in functions.
pub fn reset() {
    debug!("Resetting global registry");
    *CURRENT.write() = None;
    *FUNCTIONS.write() = FunctionTable::new();
}

/// Register a function every subsequently built configuration starts with.
pub fn register_function<F>(name: impl Into<String>, f: F)
where
    F: Fn() -> Native + Send + Sync + 'static,
{
    FUNCTIONS.write().register(name, f);
}

/// Snapshot of the registered functions.
pub fn functions() -> FunctionTable {
    FUNCTIONS.read().clone()
}

/// Serializes tests that touch the process-wide state.
#[cfg(test)]
pub(crate) fn test_guard() -> parking_lot::MutexGuard<'static, ()> {
    static LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());
    LOCK.lock()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_without_install_is_empty() {
        let _guard = test_guard();
        reset();
        assert!(!is_installed());
        let config = current();
        assert_eq!(config.to_native().unwrap(), json!({}));
        assert!(with_current(|c| c.get("anything").is_absent()));
    }

    #[test]
    fn install_replace_and_reset() {
        let _guard = test_guard();
        reset();
        assert!(install(Config::from_native(json!({"a": 1})).unwrap()).is_none());
        assert_eq!(current().value("a").unwrap(), json!(1));

        let previous = install(Config::from_native(json!({"a": 2})).unwrap());
        assert_eq!(previous.unwrap().value("a").unwrap(), json!(1));
        assert_eq!(with_current(|c| c.value("a").unwrap()), json!(2));

        reset();
        assert!(current().get("a").is_absent());
    }

    #[test]
    fn local_copies_are_private() {
        let _guard = test_guard();
        reset();
        install(Config::from_native(json!({"model": {"depth": 3}})).unwrap());
        let mut mine = local();
        mine.set("model.depth", json!(10)).unwrap();
        assert_eq!(current().value("model.depth").unwrap(), json!(3));
        reset();
    }

    #[test]
    fn registered_functions_are_snapshotted() {
        let _guard = test_guard();
        reset();
        register_function("seed", || json!(7));
        let snapshot = functions();
        assert_eq!(snapshot.call("seed"), Some(json!(7)));
        assert!(snapshot.contains("null"));
        reset();
        assert!(!functions().contains("seed"));
    }

    #[test]
    fn gen_hash_holds_until_reset() {
        let _guard = test_guard();
        reset();
        let first = functions().call("gen_hash").unwrap();
        assert_eq!(functions().call("gen_hash").unwrap(), first);

        // A fresh tag is random, so retry a few resets before calling it stuck.
        let changed = (0..8).any(|_| {
            reset();
            functions().call("gen_hash").unwrap() != first
        });
        assert!(changed);
        reset();
    }
}
