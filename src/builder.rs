use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::checks::{CheckTable, FileSystem, StdFileSystem};
use crate::config::{Config, Definitions};
use crate::env::Environment;
use crate::error::{Result, SectfigError};
use crate::format;
use crate::functions::FunctionTable;
use crate::merge::{deep_merge, layer};
use crate::ops::{self, ConfigResult};
use crate::overrides::{overrides_to_map, parse_override};
use crate::patch::{self, PatchSpec};
use crate::registry;
use crate::schema::Schema;
use crate::types::{ConfigAction, Native, NativeMap};
use crate::validate::ValidationReport;

/// Entry point for building a sectfig configuration.
pub struct Sectfig;

impl Sectfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Where a raw document comes from. Sources are layered in the order they
/// were added.
#[derive(Debug, Clone)]
enum Source {
    Document(Native),
    File(PathBuf),
}

/// Builder for loading, patching, and validating a configuration.
///
/// The pipeline runs in a fixed order:
///
/// 1. **Sources**: [`document()`](Self::document) and [`file()`](Self::file)
///    are layered in call order into one raw document.
/// 2. **Patch**: [`patch()`](Self::patch) picks and merges sections out of it.
///    Without a patch the whole document is the configuration.
/// 3. **Overrides**: [`set_override()`](Self::set_override) values are merged
///    on top with the highest precedence.
/// 4. **Definitions**: [`definitions()`](Self::definitions) inject defaults,
///    coerce, and check the result.
pub struct ConfigBuilder {
    sources: Vec<Source>,
    patch: PatchSpec,
    definitions: Option<Source>,
    strict: bool,
    functions: FunctionTable,
    checks: CheckTable,
    env_vars: Vec<(String, String)>,
    process_env: bool,
    overrides: Vec<(String, Native)>,
    fs: Arc<dyn FileSystem>,
    use_global: bool,
}

/// A built configuration together with what happened while building it.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    /// Validation issues; empty when no definitions were given.
    pub report: ValidationReport,
    /// Sections applied, in order.
    pub found: Vec<String>,
    /// Requested sections the document does not have.
    pub missing: Vec<String>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            patch: PatchSpec::default(),
            definitions: None,
            strict: false,
            functions: registry::functions(),
            checks: CheckTable::new(),
            env_vars: Vec::new(),
            process_env: true,
            overrides: Vec::new(),
            fs: Arc::new(StdFileSystem),
            use_global: false,
        }
    }

    /// Add an already-parsed document.
    pub fn document(mut self, document: Native) -> Self {
        self.sources.push(Source::Document(document));
        self
    }

    /// Add a document file. The format is picked from the extension.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    /// Select and merge sections, e.g. `"default<-gpu"` or `["default", "gpu"]`.
    pub fn patch(mut self, patch: impl Into<PatchSpec>) -> Self {
        self.patch = patch.into();
        self
    }

    /// Validate against an already-parsed definitions document.
    pub fn definitions(mut self, definitions: Native) -> Self {
        self.definitions = Some(Source::Document(definitions));
        self
    }

    pub fn definitions_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.definitions = Some(Source::File(path.into()));
        self
    }

    /// Enable or disable strict mode (default: `false`).
    /// In strict mode, keys the definitions do not declare are reported.
    /// A `strict` option in the definitions overrides this per mapping.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Register a function for `${?name}` and `${!name}` markers.
    pub fn function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Native + Send + Sync + 'static,
    {
        self.functions.register(name, f);
        self
    }

    /// Register a named check usable from the definitions' `checks` lists.
    /// The second argument is the check's parameters (null when bare).
    pub fn check<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Native, &Native) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.checks.register(name, f);
        self
    }

    /// Provide environment variables for `${$NAME}` markers. They take
    /// precedence over the process environment.
    pub fn env_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Stop reading the process environment; only [`env_vars`](Self::env_vars) are visible.
    pub fn no_process_env(mut self) -> Self {
        self.process_env = false;
        self
    }

    /// Override a dotted key after patching. Later overrides win.
    pub fn set_override(mut self, key: &str, value: impl Into<Native>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    /// Add an override from a `key=value` string. Strings without `=` are ignored.
    pub fn override_str(mut self, entry: &str) -> Self {
        if let Some(pair) = parse_override(entry) {
            self.overrides.push(pair);
        }
        self
    }

    /// Replace the filesystem used by `isfile` / `isdir` checks.
    pub fn file_system(mut self, fs: impl FileSystem + 'static) -> Self {
        self.fs = Arc::new(fs);
        self
    }

    /// Install the built configuration as the process-wide current one.
    pub fn use_global(mut self, use_global: bool) -> Self {
        self.use_global = use_global;
        self
    }

    /// Resolve the environment `$` markers read from.
    fn effective_env(&self) -> Environment {
        if self.env_vars.is_empty() && self.process_env {
            return Environment::Process;
        }
        let process: Vec<(String, String)> = if self.process_env {
            std::env::vars().collect()
        } else {
            Vec::new()
        };
        Environment::fixed(process.into_iter().chain(self.env_vars.iter().cloned()))
    }

    /// Parse the definitions, if any were given.
    fn effective_schema(&self) -> Result<Option<Schema>> {
        let native = match &self.definitions {
            None => return Ok(None),
            Some(source) => read_source(source)?,
        };
        Schema::from_native(&native).map(Some)
    }

    /// Layer every source into one raw document.
    fn raw_document(&self) -> Result<Native> {
        let mut raw = NativeMap::new();
        for source in &self.sources {
            match read_source(source)? {
                Native::Object(map) => raw = layer(raw, map),
                Native::Null => {}
                other => {
                    return Err(SectfigError::structure(
                        source_label(source),
                        format!("a document must be a mapping, got {other}"),
                    ));
                }
            }
        }
        Ok(Native::Object(raw))
    }

    fn assemble(&self) -> Result<Loaded> {
        let raw = self.raw_document()?;
        let (mut merged, found, missing) = if self.patch.is_empty() {
            let map = match raw {
                Native::Object(map) => map,
                _ => NativeMap::new(),
            };
            (deep_merge(NativeMap::new(), map), Vec::new(), Vec::new())
        } else {
            let outcome = patch::resolve(&raw, &self.patch)?;
            (outcome.merged, outcome.found, outcome.missing)
        };
        if !self.overrides.is_empty() {
            merged = deep_merge(merged, overrides_to_map(&self.overrides));
        }
        debug!(
            patch = %self.patch,
            keys = merged.len(),
            overrides = self.overrides.len(),
            "Merged configuration"
        );

        let mut config = Config::from_native(Native::Object(merged))?
            .with_functions(self.functions.clone())
            .with_env(self.effective_env());

        let report = match self.effective_schema()? {
            Some(schema) => {
                config = config.with_definitions(Definitions {
                    schema,
                    checks: self.checks.clone(),
                    fs: Arc::clone(&self.fs),
                    strict: self.strict,
                });
                config.validate()?
            }
            None => ValidationReport::new(),
        };

        Ok(Loaded {
            config,
            report,
            found,
            missing,
        })
    }

    fn install(&self, config: &Config) {
        if self.use_global {
            registry::install(config.clone());
        }
    }

    /// Build the configuration and return it with its validation report.
    /// Validation issues are data here; the caller decides what is fatal.
    pub fn load_with_report(self) -> Result<Loaded> {
        let loaded = self.assemble()?;
        self.install(&loaded.config);
        Ok(loaded)
    }

    /// Build the configuration, failing with [`SectfigError::Invalid`] when
    /// validation reports any issue.
    pub fn load(self) -> Result<Config> {
        let loaded = self.assemble()?;
        loaded.report.into_result()?;
        self.install(&loaded.config);
        Ok(loaded.config)
    }

    /// Handle a `ConfigAction` and print the result to stdout.
    pub fn handle_and_print(self, action: &ConfigAction) -> Result<()> {
        let result = self.handle(action)?;
        println!("{result}");
        Ok(())
    }

    /// Handle a `ConfigAction` (print / list / validate / generate / get).
    pub fn handle(self, action: &ConfigAction) -> Result<ConfigResult> {
        match action {
            ConfigAction::Print => {
                let loaded = self.load_with_report()?;
                ops::print_document(&loaded.config)
            }
            ConfigAction::List => {
                let loaded = self.load_with_report()?;
                ops::list_values(&loaded.config)
            }
            ConfigAction::Validate => {
                if self.definitions.is_none() {
                    return Err(SectfigError::NoDefinitions);
                }
                let loaded = self.load_with_report()?;
                Ok(ConfigResult::Report(loaded.report))
            }
            ConfigAction::Generate { output } => {
                let schema = self.effective_schema()?.ok_or(SectfigError::NoDefinitions)?;
                let template = schema.template();
                match output {
                    Some(path) => {
                        write_template(path, &template)?;
                        Ok(ConfigResult::TemplateWritten { path: path.clone() })
                    }
                    None => Ok(ConfigResult::Template(template)),
                }
            }
            ConfigAction::Get { key } => {
                let loaded = self.load_with_report()?;
                ops::get_value(&loaded.config, key)
            }
        }
    }
}

fn read_source(source: &Source) -> Result<Native> {
    match source {
        Source::Document(native) => Ok(native.clone()),
        Source::File(path) => format::load_file(path),
    }
}

fn source_label(source: &Source) -> String {
    match source {
        Source::Document(_) => String::new(),
        Source::File(path) => path.display().to_string(),
    }
}

fn write_template(path: &Path, template: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SectfigError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, template).map_err(|e| SectfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{DEFINITIONS, DOCUMENT, definitions, document};
    use crate::validate::IssueKind;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn fixture_builder() -> ConfigBuilder {
        Sectfig::builder()
            .document(document())
            .definitions(definitions())
            .env_vars([("DATA_DIR", "/data")])
            .no_process_env()
    }

    #[test]
    fn sections_inject_defaults_end_to_end() {
        let config = Sectfig::builder()
            .document(json!({"default": {"train": ["2020"], "model": {"name": "RF"}}}))
            .definitions(json!({".test": {"default": [2022]}}))
            .patch(["default"])
            .load()
            .unwrap();
        assert_eq!(config.value("train").unwrap(), json!(["2020"]));
        assert_eq!(config.value("test").unwrap(), json!([2022]));
        assert_eq!(config.value("model.name").unwrap(), json!("RF"));
    }

    #[test]
    fn default_section_validates() {
        let loaded = fixture_builder().patch("default").load_with_report().unwrap();
        assert!(loaded.report.is_ok(), "{}", loaded.report);
        assert_eq!(loaded.found, ["default"]);
        let config = loaded.config;
        assert_eq!(config.value("model.depth").unwrap(), json!(8));
        assert_eq!(config.value("device").unwrap(), json!("cpu"));
        assert_eq!(config.value("output").unwrap(), json!("/data/experiment"));
    }

    #[test]
    fn inherited_section_overrides_parent() {
        let config = fixture_builder().patch("gpu").load().unwrap();
        assert_eq!(config.value("device").unwrap(), json!("cuda"));
        assert_eq!(config.value("model.depth").unwrap(), json!(16));
        assert_eq!(config.value("model.name").unwrap(), json!("RF"));
        assert!(!config.contains("sectfig.patch"));
    }

    #[test]
    fn delete_token_section_falls_back_to_default() {
        let config = fixture_builder().patch("default<-debug").load().unwrap();
        assert_eq!(config.value("model.depth").unwrap(), json!(4));
    }

    #[test]
    fn missing_sections_are_reported() {
        let loaded = fixture_builder()
            .patch("default<-nope")
            .load_with_report()
            .unwrap();
        assert_eq!(loaded.found, ["default"]);
        assert_eq!(loaded.missing, ["nope"]);
    }

    #[test]
    fn no_patch_uses_whole_document() {
        let config = Sectfig::builder()
            .document(json!({"a": 1, "b": {"c": "\\"}}))
            .load()
            .unwrap();
        assert_eq!(config.to_native().unwrap(), json!({"a": 1, "b": {}}));
    }

    #[test]
    fn overrides_win_over_sections() {
        let config = fixture_builder()
            .patch("gpu")
            .set_override("model.depth", 20)
            .override_str("device=cpu")
            .override_str("ignored")
            .load()
            .unwrap();
        assert_eq!(config.value("model.depth").unwrap(), json!(20));
        assert_eq!(config.value("device").unwrap(), json!("cpu"));
    }

    #[test]
    fn failing_checks_make_load_fail() {
        let result = fixture_builder()
            .patch("default")
            .set_override("model.name", "SVM")
            .set_override("model.depth", 64)
            .load();
        match result {
            Err(SectfigError::Invalid(report)) => {
                assert_eq!(report.len(), 2);
                assert_eq!(report.of_kind(IssueKind::CheckFailed).count(), 2);
            }
            other => panic!("Expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn missing_required_is_reported() {
        let loaded = fixture_builder()
            .patch("default")
            .set_override("train", "\\")
            .load_with_report()
            .unwrap();
        let missing: Vec<&str> = loaded
            .report
            .of_kind(IssueKind::MissingRequired)
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(missing, ["train"]);
    }

    #[test]
    fn strict_mode_reports_unknown_keys() {
        let loaded = fixture_builder()
            .patch("default")
            .set_override("extra", true)
            .strict(true)
            .load_with_report()
            .unwrap();
        let unknown: Vec<&str> = loaded
            .report
            .of_kind(IssueKind::UnknownKey)
            .map(|i| i.path.as_str())
            .collect();
        assert_eq!(unknown, ["extra"]);
    }

    #[test]
    fn functions_and_custom_checks() {
        let config = Sectfig::builder()
            .document(json!({"seed": "${!seed}", "label": "run-${?seed}"}))
            .definitions(json!({".seed": {"dtype": "int", "checks": ["even"]}}))
            .function("seed", || json!(42))
            .check("even", |value, _| match value.as_i64() {
                Some(n) if n % 2 == 0 => Ok(()),
                _ => Err("must be even".into()),
            })
            .load()
            .unwrap();
        assert_eq!(config.value("seed").unwrap(), json!(42));
        assert_eq!(config.value("label").unwrap(), json!("run-42"));
    }

    #[test]
    fn file_checks_use_injected_file_system() {
        struct Everything;
        impl FileSystem for Everything {
            fn is_file(&self, _: &Path) -> bool {
                true
            }
            fn is_dir(&self, _: &Path) -> bool {
                true
            }
        }
        let defs = json!({".weights": {"dtype": "path", "checks": ["isfile"]}});
        let doc = json!({"weights": "/nowhere/model.bin"});

        let loaded = Sectfig::builder()
            .document(doc.clone())
            .definitions(defs.clone())
            .load_with_report()
            .unwrap();
        assert_eq!(loaded.report.of_kind(IssueKind::CheckFailed).count(), 1);

        let loaded = Sectfig::builder()
            .document(doc)
            .definitions(defs)
            .file_system(Everything)
            .load_with_report()
            .unwrap();
        assert!(loaded.report.is_ok());
    }

    #[test]
    fn env_vars_shadow_process_environment() {
        let builder = Sectfig::builder().env_vars([("SECTFIG_TEST_ONLY", "x")]);
        assert_eq!(builder.effective_env().get("SECTFIG_TEST_ONLY").as_deref(), Some("x"));
        let builder = Sectfig::builder().no_process_env();
        assert_eq!(builder.effective_env().get("PATH"), None);
    }

    #[test]
    fn files_are_layered_in_order() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base.yml");
        let local = dir.path().join("local.toml");
        let defs = dir.path().join("defs.yaml");
        fs::write(&base, DOCUMENT).unwrap();
        fs::write(&local, "[debug]\nextra = 1\n[default.model]\nname = \"NN\"\n").unwrap();
        fs::write(&defs, DEFINITIONS).unwrap();

        let config = Sectfig::builder()
            .file(&base)
            .file(&local)
            .definitions_file(&defs)
            .patch("default<-debug")
            .env_vars([("DATA_DIR", "/data")])
            .load()
            .unwrap();
        assert_eq!(config.value("model.name").unwrap(), json!("NN"));
        // The layered `debug` section still deletes the depth.
        assert_eq!(config.value("model.depth").unwrap(), json!(4));
        assert_eq!(config.value("extra").unwrap(), json!(1));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let result = Sectfig::builder().document(json!([1, 2])).load();
        assert!(matches!(result, Err(SectfigError::Structure { .. })));
    }

    #[test]
    fn patch_cycle_is_an_error() {
        let result = Sectfig::builder()
            .document(json!({"a": {"sectfig.patch": "b"}, "b": {"sectfig.patch": "a"}}))
            .patch("a")
            .load();
        assert!(matches!(result, Err(SectfigError::PatchCycle { .. })));
    }

    #[test]
    fn use_global_installs_config() {
        let _guard = registry::test_guard();
        registry::reset();
        registry::register_function("who", || json!("global"));
        let config = Sectfig::builder()
            .document(json!({"user": "${?who}"}))
            .use_global(true)
            .load()
            .unwrap();
        assert_eq!(config.value("user").unwrap(), json!("global"));
        assert_eq!(registry::current().value("user").unwrap(), json!("global"));
        registry::reset();
    }

    #[test]
    fn invalid_config_is_not_installed() {
        let _guard = registry::test_guard();
        registry::reset();
        let result = Sectfig::builder()
            .document(json!({}))
            .definitions(json!({".x": {"required": true}}))
            .use_global(true)
            .load();
        assert!(result.is_err());
        assert!(!registry::is_installed());
    }

    // -- handle() ------------------------------------------------------------

    #[test]
    fn handle_print_and_list() {
        match fixture_builder().patch("gpu").handle(&ConfigAction::Print).unwrap() {
            ConfigResult::Document(text) => assert!(text.contains("device: cuda")),
            other => panic!("Expected Document, got {other:?}"),
        }
        match fixture_builder().patch("gpu").handle(&ConfigAction::List).unwrap() {
            ConfigResult::Listing { entries } => {
                assert!(entries.contains(&("model.depth".into(), "16".into())));
            }
            other => panic!("Expected Listing, got {other:?}"),
        }
    }

    #[test]
    fn handle_validate() {
        let result = fixture_builder()
            .patch("default")
            .set_override("device", "tpu")
            .handle(&ConfigAction::Validate)
            .unwrap();
        match result {
            ConfigResult::Report(report) => {
                assert_eq!(report.len(), 1);
                assert_eq!(report.issues()[0].path, "device");
            }
            other => panic!("Expected Report, got {other:?}"),
        }
    }

    #[test]
    fn handle_validate_without_definitions() {
        let result = Sectfig::builder()
            .document(json!({}))
            .handle(&ConfigAction::Validate);
        assert!(matches!(result, Err(SectfigError::NoDefinitions)));
    }

    #[test]
    fn handle_get() {
        let result = fixture_builder()
            .patch("default")
            .handle(&ConfigAction::Get {
                key: "model.depth".into(),
            })
            .unwrap();
        assert_eq!(result.to_string(), "model.depth = 8");
    }

    #[test]
    fn handle_generate_to_stdout() {
        let result = fixture_builder()
            .handle(&ConfigAction::Generate { output: None })
            .unwrap();
        match result {
            ConfigResult::Template(text) => {
                assert!(text.contains("Training years"));
                assert!(text.contains("depth"));
            }
            other => panic!("Expected Template, got {other:?}"),
        }
    }

    #[test]
    fn handle_generate_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("template.yml");
        let result = fixture_builder()
            .handle(&ConfigAction::Generate {
                output: Some(path.clone()),
            })
            .unwrap();
        assert_eq!(result, ConfigResult::TemplateWritten { path: path.clone() });
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, Schema::from_native(&definitions()).unwrap().template());
    }

    #[test]
    fn handle_generate_without_definitions() {
        let result = Sectfig::builder().handle(&ConfigAction::Generate { output: None });
        assert!(matches!(result, Err(SectfigError::NoDefinitions)));
    }
}
