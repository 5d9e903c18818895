//! The top-level configuration object.
//!
//! A [`Config`] owns the tree plus everything needed to resolve it: the
//! function table, the environment and (optionally) the definitions it was
//! validated against. Reads through [`Config::resolve`] substitute markers
//! lazily and cache the result per value; every mutation through the
//! `Config` bumps a generation counter that invalidates all caches at once.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::checks::{CheckTable, FileSystem, StdFileSystem};
use crate::env::Environment;
use crate::error::{Result, SectfigError};
use crate::functions::FunctionTable;
use crate::node::{Container, Node, native_truthy};
use crate::schema::Schema;
use crate::substitute::{Resolver, Unresolved};
use crate::types::{AsPath, Native};
use crate::validate::{self, Context, ValidationReport};

/// Definitions plus the collaborators their checks use.
pub(crate) struct Definitions {
    pub schema: Schema,
    pub checks: CheckTable,
    pub fs: Arc<dyn FileSystem>,
    pub strict: bool,
}

impl fmt::Debug for Definitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definitions")
            .field("schema", &self.schema)
            .field("checks", &self.checks)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Config {
    root: Node,
    functions: FunctionTable,
    env: Environment,
    generation: u64,
    warnings: Mutex<Vec<Unresolved>>,
    definitions: Option<Arc<Definitions>>,
}

impl Config {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::from_root(Container::mapping())
    }

    /// Build a configuration over a native mapping.
    pub fn from_native(native: Native) -> Result<Self> {
        match native {
            Native::Object(map) => Ok(Self::from_root(Container::from_map(map))),
            Native::Null => Ok(Self::new()),
            other => Err(SectfigError::structure(
                "",
                format!("a configuration must be a mapping, got {other}"),
            )),
        }
    }

    fn from_root(root: Container) -> Self {
        Self {
            root: Node::Container(root),
            functions: FunctionTable::new(),
            env: Environment::default(),
            generation: 0,
            warnings: Mutex::new(Vec::new()),
            definitions: None,
        }
    }

    pub fn with_functions(mut self, functions: FunctionTable) -> Self {
        self.functions = functions;
        self.touch();
        self
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self.touch();
        self
    }

    pub(crate) fn with_definitions(mut self, definitions: Definitions) -> Self {
        self.definitions = Some(Arc::new(definitions));
        self
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Register a function on this configuration only.
    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Native + Send + Sync + 'static,
    {
        self.functions.register(name, f);
        self.touch();
    }

    pub fn definitions(&self) -> Option<&Schema> {
        self.definitions.as_deref().map(|d| &d.schema)
    }

    /// The node at `path` without resolving it; the absent sentinel on a miss.
    pub fn get(&self, path: impl AsPath) -> &Node {
        self.root.get(path)
    }

    pub fn get_or<'a>(&'a self, path: impl AsPath, default: &'a Node) -> &'a Node {
        self.root.get_or(path, default)
    }

    pub fn contains(&self, path: impl AsPath) -> bool {
        !self.root.get(path).is_absent()
    }

    /// Resolve the value at `path`. `None` when the path is absent.
    ///
    /// Only substitution cycles are errors; unresolved markers become empty
    /// strings and are recorded in [`Config::warnings`].
    pub fn resolve(&self, path: impl AsPath) -> Result<Option<Native>> {
        let segments = path.to_segments();
        let mut resolver = Resolver::new(&self.root, &self.functions, &self.env, self.generation);
        let result = resolver.resolve_path(&segments);
        self.record(resolver.into_warnings());
        result
    }

    /// Resolve the value at `path`, failing with `KeyNotFound` when absent.
    pub fn value(&self, path: impl AsPath) -> Result<Native> {
        let segments = path.to_segments();
        self.resolve(segments.as_slice())?
            .ok_or_else(|| SectfigError::KeyNotFound(segments.join(".")))
    }

    /// Truthiness of the resolved value: absent, empty and falsy values are false.
    /// Fails only when resolving the value hits a substitution cycle.
    pub fn is_truthy(&self, path: impl AsPath) -> Result<bool> {
        Ok(self.resolve(path)?.is_some_and(|value| native_truthy(&value)))
    }

    /// Set `path`, creating intermediate mappings. Invalidates every cached resolution.
    pub fn set(&mut self, path: impl AsPath, node: impl Into<Node>) -> Result<()> {
        let container = self.root_mut()?;
        container.set(path, node)?;
        self.touch();
        Ok(())
    }

    pub fn remove(&mut self, path: impl AsPath) -> Option<Node> {
        let removed = self.root_mut().ok()?.remove(path);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Resolve every value now. Fails on the first substitution cycle.
    pub fn compile(&self) -> Result<()> {
        self.to_native().map(|_| ())
    }

    /// The whole tree as a native structure, every value resolved.
    pub fn to_native(&self) -> Result<Native> {
        Ok(self.resolve(&[] as &[&str])?.unwrap_or(Native::Null))
    }

    /// Warnings about unresolved markers collected so far.
    pub fn warnings(&self) -> Vec<Unresolved> {
        self.warnings.lock().clone()
    }

    pub fn clear_warnings(&self) {
        self.warnings.lock().clear();
    }

    /// Validate against the definitions this configuration was built with.
    pub fn validate(&mut self) -> Result<ValidationReport> {
        let d = self.definitions.clone().ok_or(SectfigError::NoDefinitions)?;
        Ok(self.run_validation(&d.schema, &d.checks, d.fs.as_ref(), d.strict))
    }

    /// Validate against `schema`, using this configuration's checks and filesystem if it has any.
    pub fn validate_against(&mut self, schema: &Schema) -> ValidationReport {
        match self.definitions.clone() {
            Some(d) => self.run_validation(schema, &d.checks, d.fs.as_ref(), d.strict),
            None => self.run_validation(schema, &CheckTable::new(), &StdFileSystem, false),
        }
    }

    fn run_validation(
        &mut self,
        schema: &Schema,
        checks: &CheckTable,
        fs: &dyn FileSystem,
        strict: bool,
    ) -> ValidationReport {
        let Node::Container(root) = &mut self.root else {
            return ValidationReport::new();
        };
        let (mut report, injected) = validate::inject_defaults(schema, root);
        self.touch();

        let ctx = Context {
            schema,
            functions: &self.functions,
            env: &self.env,
            fs,
            checks,
            strict,
        };
        let findings = validate::check(&ctx, &self.root, self.generation, &injected, &mut report);
        self.record(findings.warnings);

        if !findings.coercions.is_empty() {
            validate::apply_coercions(&mut self.root, &findings.coercions);
            self.touch();
        }
        debug!(issues = report.len(), "Validation finished");
        report
    }

    fn root_mut(&mut self) -> Result<&mut Container> {
        self.root
            .as_container_mut()
            .ok_or_else(|| SectfigError::structure("", "configuration root is not a container"))
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    fn record(&self, warnings: Vec<Unresolved>) {
        if warnings.is_empty() {
            return;
        }
        let mut seen = self.warnings.lock();
        for warning in warnings {
            if !seen.contains(&warning) {
                seen.push(warning);
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy: the clone shares no structure with the original.
impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            functions: self.functions.clone(),
            env: self.env.clone(),
            generation: self.generation,
            warnings: Mutex::new(self.warnings.lock().clone()),
            definitions: self.definitions.clone(),
        }
    }
}

impl Index<&str> for Config {
    type Output = Node;

    fn index(&self, key: &str) -> &Node {
        self.root.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Value;
    use serde_json::json;

    fn config(doc: Native) -> Config {
        Config::from_native(doc)
            .unwrap()
            .with_env(Environment::fixed([("DATA".to_string(), "/data".to_string())]))
    }

    #[test]
    fn build_then_to_native_is_identity() {
        let doc = json!({
            "a": 1,
            "b": [1, "two", {"c": null}],
            "d": {"e": true, "f": 1.5, "g": "5"}
        });
        assert_eq!(config(doc.clone()).to_native().unwrap(), doc);
    }

    #[test]
    fn non_mapping_root_is_structure_error() {
        assert!(matches!(
            Config::from_native(json!([1, 2])),
            Err(SectfigError::Structure { .. })
        ));
    }

    #[test]
    fn missing_paths_are_absent_at_any_depth() {
        let cfg = config(json!({"a": {"b": 1}}));
        assert!(cfg.get("missing.deeper.path").is_absent());
        assert!(!cfg.is_truthy("missing.deeper.path").unwrap());
        assert!(cfg["missing"]["deeper"]["path"].is_absent());
        assert_eq!(cfg.resolve("a.nope").unwrap(), None);
    }

    #[test]
    fn value_reports_missing_key() {
        let cfg = config(json!({}));
        match cfg.value("x.y") {
            Err(SectfigError::KeyNotFound(key)) => assert_eq!(key, "x.y"),
            other => panic!("Expected KeyNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn substitution_tracks_mutation() {
        let mut cfg = config(json!({"a": "foo", "b": "bar", "c": "${.a}/${.b}"}));
        assert_eq!(cfg.value("c").unwrap(), json!("foo/bar"));
        cfg.set("a", json!("baz")).unwrap();
        assert_eq!(cfg.value("c").unwrap(), json!("baz/bar"));
    }

    #[test]
    fn cycle_is_an_error_not_a_hang() {
        let cfg = config(json!({"a": "${.b}", "b": "${.a}"}));
        assert!(matches!(cfg.value("a"), Err(SectfigError::SubstitutionCycle { .. })));
        assert!(cfg.compile().is_err());
    }

    #[test]
    fn unresolved_markers_are_warnings() {
        let cfg = config(json!({"p": "${$DATA}/${$MISSING}", "q": "${.nope}"}));
        assert_eq!(cfg.value("p").unwrap(), json!("/data/"));
        cfg.compile().unwrap();
        let warnings = cfg.warnings();
        let markers: Vec<&str> = warnings.iter().map(|w| w.marker.as_str()).collect();
        assert_eq!(markers, ["${$MISSING}", "${.nope}"]);
        cfg.clear_warnings();
        assert!(cfg.warnings().is_empty());
    }

    #[test]
    fn deep_copy_is_independent() {
        let original = config(json!({"model": {"params": {"depth": 3}}}));
        let mut copy = original.clone();
        copy.set("model.params.depth", json!(9)).unwrap();
        assert_eq!(original.value("model.params.depth").unwrap(), json!(3));
        assert_eq!(copy.value("model.params.depth").unwrap(), json!(9));
    }

    #[test]
    fn set_replaces_containers_and_scalars() {
        let mut cfg = config(json!({"a": {"b": 1}, "c": 2}));
        cfg.set("a", json!(5)).unwrap();
        cfg.set("c.d", Value::new("x")).unwrap();
        cfg.set("e.f.g", json!([1])).unwrap();
        assert_eq!(
            cfg.to_native().unwrap(),
            json!({"a": 5, "c": {"d": "x"}, "e": {"f": {"g": [1]}}})
        );
    }

    #[test]
    fn remove_invalidates() {
        let mut cfg = config(json!({"a": "x", "b": "${.a}!"}));
        assert_eq!(cfg.value("b").unwrap(), json!("x!"));
        assert!(cfg.remove("a").is_some());
        assert_eq!(cfg.value("b").unwrap(), json!("!"));
        assert!(cfg.remove("a").is_none());
    }

    #[test]
    fn truthiness_uses_resolved_form() {
        let cfg = config(json!({"zero": "${.n}", "n": 0, "empty": {}, "list": [1], "s": "x"}));
        assert!(!cfg.is_truthy("zero").unwrap());
        assert!(!cfg.is_truthy("empty").unwrap());
        assert!(cfg.is_truthy("list").unwrap());
        assert!(cfg.is_truthy("s").unwrap());
    }

    #[test]
    fn bare_marker_reads_from_root() {
        let cfg = config(json!({"root_key": "R", "abs": "${root_key}"}));
        assert_eq!(cfg.value("abs").unwrap(), json!("R"));
        assert!(cfg.warnings().is_empty());
    }

    #[test]
    fn truthiness_surfaces_cycles() {
        let cfg = config(json!({"a": "${.b}", "b": "${.a}", "flag": true}));
        assert!(matches!(
            cfg.is_truthy("a"),
            Err(SectfigError::SubstitutionCycle { .. })
        ));
        assert!(cfg.is_truthy("flag").unwrap());
    }

    #[test]
    fn per_config_functions() {
        let mut cfg = config(json!({"v": "${!answer}"}));
        assert_eq!(cfg.value("v").unwrap(), Native::Null);
        cfg.register_function("answer", || json!(42));
        assert_eq!(cfg.value("v").unwrap(), json!(42));
    }

    #[test]
    fn validate_requires_definitions() {
        let mut cfg = config(json!({}));
        assert!(matches!(cfg.validate(), Err(SectfigError::NoDefinitions)));
    }

    #[test]
    fn validate_against_injects_and_coerces() {
        let mut cfg = config(json!({"depth": "7"}));
        let schema = Schema::from_native(&json!({
            ".depth": {"dtype": "int"},
            ".name": {"default": "RF"}
        }))
        .unwrap();
        let report = cfg.validate_against(&schema);
        assert!(report.is_ok(), "{report}");
        assert_eq!(cfg.to_native().unwrap(), json!({"depth": 7, "name": "RF"}));
    }

    #[test]
    fn revalidation_is_stable() {
        let mut cfg = config(json!({}));
        let schema = Schema::from_native(&json!({".y": {"required": true}, ".x": {"default": 1}})).unwrap();
        let first = cfg.validate_against(&schema);
        let second = cfg.validate_against(&schema);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
