//! Config operations: printing, listing, key lookup, and result types.
//!
//! Provides the logic behind `config print`, `config list`, `config get`,
//! and the `ConfigResult` enum that callers use to display results. Template
//! generation lives on [`Schema::template`](crate::schema::Schema::template).

use std::fmt;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Result, SectfigError};
use crate::format::to_yaml_string;
use crate::types::{Native, join_path, parse_path};
use crate::validate::ValidationReport;

/// Result of a config operation. Returned to the caller for display.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigResult {
    /// The resolved configuration as YAML.
    Document(String),
    /// Outcome of validating against the definitions.
    Report(ValidationReport),
    /// A generated template string.
    Template(String),
    /// Confirmation that a template was written to a file.
    TemplateWritten { path: PathBuf },
    /// A key's resolved value and its description.
    KeyValue {
        key: String,
        value: String,
        doc: Vec<String>,
    },
    /// All resolved leaf values as dotted key-value pairs.
    Listing { entries: Vec<(String, String)> },
}

impl fmt::Display for ConfigResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigResult::Document(text) => write!(f, "{}", text.trim_end()),
            ConfigResult::Report(report) => write!(f, "{report}"),
            ConfigResult::Template(t) => write!(f, "{t}"),
            ConfigResult::TemplateWritten { path } => {
                write!(f, "Config template written to {}", path.display())
            }
            ConfigResult::KeyValue { key, value, doc } => {
                for line in doc {
                    writeln!(f, "# {line}")?;
                }
                write!(f, "{key} = {value}")
            }
            ConfigResult::Listing { entries } => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                Ok(())
            }
        }
    }
}

/// Dump the fully resolved configuration as YAML.
pub fn print_document(config: &Config) -> Result<ConfigResult> {
    let native = config.to_native()?;
    Ok(ConfigResult::Document(to_yaml_string(&native)?))
}

/// Every resolved leaf as a `(dotted key, display)` pair, in document order.
///
/// Mappings are flattened; sequences are leaves shown as compact JSON.
pub fn list_values(config: &Config) -> Result<ConfigResult> {
    let native = config.to_native()?;
    let mut entries = Vec::new();
    flatten(&native, &mut Vec::new(), &mut entries);
    Ok(ConfigResult::Listing { entries })
}

/// Get a resolved value by dotted key, with the description from the
/// configuration's definitions when it has any.
pub fn get_value(config: &Config, key: &str) -> Result<ConfigResult> {
    let segments = parse_path(key);
    let value = config
        .resolve(segments.as_slice())?
        .ok_or_else(|| SectfigError::KeyNotFound(key.into()))?;

    Ok(ConfigResult::KeyValue {
        key: join_path(&segments),
        value: format_value(&value),
        doc: lookup_doc(config, &segments),
    })
}

/// Strings are shown bare, everything else in compact JSON form.
pub fn format_value(value: &Native) -> String {
    match value {
        Native::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lookup_doc(config: &Config, segments: &[String]) -> Vec<String> {
    let Some(schema) = config.definitions().and_then(|s| s.lookup(segments)) else {
        return Vec::new();
    };
    schema
        .sdesc
        .iter()
        .chain(schema.ldesc.iter())
        .flat_map(|text| text.lines())
        .map(str::to_string)
        .collect()
}

fn flatten(value: &Native, prefix: &mut Vec<String>, out: &mut Vec<(String, String)>) {
    match value {
        Native::Object(map) if !map.is_empty() || prefix.is_empty() => {
            for (key, child) in map {
                prefix.push(key.clone());
                flatten(child, prefix, out);
                prefix.pop();
            }
        }
        leaf => out.push((join_path(prefix), format_value(leaf))),
    }
}
