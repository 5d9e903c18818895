//! Definitions: the schema tree validated against a configuration.
//!
//! A definitions document mirrors the configuration's shape. Keys starting
//! with `.` are child keys; bare keys are options of the node they sit in:
//!
//! ```yaml
//! .train:
//!   dtype: list
//!   required: true
//!   sdesc: Training years
//! .model:
//!   sdesc: Model settings
//!   .name:
//!     dtype: str
//!     default: RF
//!     checks:
//!       - oneof: [RF, NN]
//! ```
//!
//! The option set is closed: an unknown bare key is an error, so a misspelt
//! child key (missing its dot) is caught when the definitions are loaded.

use std::fmt::Write as _;

use crate::checks::Check;
use crate::dtype::Dtype;
use crate::error::{Result, SectfigError};
use crate::types::Native;

/// Prefix distinguishing child keys from options.
pub const CHILD_PREFIX: char = '.';

/// One schema option, as written in a definitions document.
#[derive(Debug, Clone)]
pub enum SchemaOption {
    /// `dtype` / `type`: one name or a list of accepted names.
    Dtype(Vec<Dtype>),
    Default(Native),
    Required(bool),
    /// `sdesc` / `short`
    ShortDesc(String),
    /// `ldesc` / `desc`
    LongDesc(String),
    Checks(Vec<Check>),
    /// Schema applied to every element of a list.
    Items(Box<Schema>),
    /// Alternatives; a value must satisfy one of them.
    Subtypes(Vec<Schema>),
    /// Report undeclared keys below this node.
    Strict(bool),
}

impl SchemaOption {
    pub fn parse(name: &str, value: &Native, path: &str) -> Result<Self> {
        let option = match name {
            "dtype" | "type" => SchemaOption::Dtype(parse_dtypes(value, path)?),
            "default" => SchemaOption::Default(value.clone()),
            "required" => SchemaOption::Required(expect_bool(name, value, path)?),
            "sdesc" | "short" => SchemaOption::ShortDesc(expect_str(name, value, path)?),
            "ldesc" | "desc" => SchemaOption::LongDesc(expect_str(name, value, path)?),
            "strict" => SchemaOption::Strict(expect_bool(name, value, path)?),
            "checks" => {
                let entries: &[Native] = match value {
                    Native::Array(entries) => entries.as_slice(),
                    Native::Null => &[],
                    single => std::slice::from_ref(single),
                };
                SchemaOption::Checks(
                    entries
                        .iter()
                        .map(|entry| Check::parse(entry, path))
                        .collect::<Result<_>>()?,
                )
            }
            "items" => SchemaOption::Items(Box::new(Schema::parse(value, &format!("{path}[]"))?)),
            "subtypes" => {
                let Native::Array(alternatives) = value else {
                    return Err(SectfigError::schema(path, "subtypes must be a list of schemas"));
                };
                SchemaOption::Subtypes(
                    alternatives
                        .iter()
                        .enumerate()
                        .map(|(i, alt)| Schema::parse(alt, &format!("{path}<{i}>")))
                        .collect::<Result<_>>()?,
                )
            }
            other => {
                return Err(SectfigError::schema(
                    path,
                    format!("unknown option '{other}' (child keys must start with '{CHILD_PREFIX}')"),
                ));
            }
        };
        Ok(option)
    }

    /// Canonical option name; aliases map to the same name.
    pub fn name(&self) -> &'static str {
        match self {
            SchemaOption::Dtype(_) => "dtype",
            SchemaOption::Default(_) => "default",
            SchemaOption::Required(_) => "required",
            SchemaOption::ShortDesc(_) => "sdesc",
            SchemaOption::LongDesc(_) => "ldesc",
            SchemaOption::Checks(_) => "checks",
            SchemaOption::Items(_) => "items",
            SchemaOption::Subtypes(_) => "subtypes",
            SchemaOption::Strict(_) => "strict",
        }
    }
}

fn parse_dtypes(value: &Native, path: &str) -> Result<Vec<Dtype>> {
    let names: Vec<&str> = match value {
        Native::String(name) => vec![name.as_str()],
        Native::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| SectfigError::schema(path, "dtype names must be strings"))
            })
            .collect::<Result<_>>()?,
        other => {
            return Err(SectfigError::schema(
                path,
                format!("dtype must be a name or a list of names, got {other}"),
            ));
        }
    };
    names
        .into_iter()
        .map(|name| name.parse::<Dtype>().map_err(|e| SectfigError::schema(path, e)))
        .collect()
}

fn expect_bool(name: &str, value: &Native, path: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| SectfigError::schema(path, format!("{name} must be a boolean, got {value}")))
}

fn expect_str(name: &str, value: &Native, path: &str) -> Result<String> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| SectfigError::schema(path, format!("{name} must be a string, got {value}")))
}

/// A node of the definitions tree.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Accepted dtypes; empty accepts anything.
    pub dtypes: Vec<Dtype>,
    pub default: Option<Native>,
    pub required: bool,
    pub sdesc: Option<String>,
    pub ldesc: Option<String>,
    pub checks: Vec<Check>,
    pub items: Option<Box<Schema>>,
    pub subtypes: Vec<Schema>,
    /// `None` inherits from the parent.
    pub strict: Option<bool>,
    /// Declared child keys, in document order.
    pub children: Vec<(String, Schema)>,
}

impl Schema {
    /// Parse a whole definitions document.
    pub fn from_native(native: &Native) -> Result<Self> {
        Self::parse(native, "")
    }

    fn parse(native: &Native, path: &str) -> Result<Self> {
        let map = match native {
            Native::Null => return Ok(Schema::default()),
            Native::Object(map) => map,
            other => {
                return Err(SectfigError::schema(
                    path,
                    format!("expected a mapping of options and child keys, got {other}"),
                ));
            }
        };

        let mut schema = Schema::default();
        let mut seen: Vec<&'static str> = Vec::new();
        for (key, value) in map {
            if let Some(child) = key.strip_prefix(CHILD_PREFIX) {
                if child.is_empty() {
                    return Err(SectfigError::schema(path, "empty child key"));
                }
                let child_path = if path.is_empty() {
                    child.to_string()
                } else {
                    format!("{path}.{child}")
                };
                schema
                    .children
                    .push((child.to_string(), Schema::parse(value, &child_path)?));
                continue;
            }

            let option = SchemaOption::parse(key, value, path)?;
            if seen.contains(&option.name()) {
                return Err(SectfigError::schema(
                    path,
                    format!("option '{}' given more than once", option.name()),
                ));
            }
            seen.push(option.name());
            schema.apply(option);
        }
        Ok(schema)
    }

    fn apply(&mut self, option: SchemaOption) {
        match option {
            SchemaOption::Dtype(dtypes) => self.dtypes = dtypes,
            SchemaOption::Default(value) => self.default = Some(value),
            SchemaOption::Required(required) => self.required = required,
            SchemaOption::ShortDesc(s) => self.sdesc = Some(s),
            SchemaOption::LongDesc(s) => self.ldesc = Some(s),
            SchemaOption::Checks(checks) => self.checks = checks,
            SchemaOption::Items(items) => self.items = Some(items),
            SchemaOption::Subtypes(subtypes) => self.subtypes = subtypes,
            SchemaOption::Strict(strict) => self.strict = Some(strict),
        }
    }

    pub fn child(&self, key: &str) -> Option<&Schema> {
        self.children
            .iter()
            .find_map(|(name, schema)| (name == key).then_some(schema))
    }

    /// Schema governing `segments`; list indices descend into `items`.
    pub fn lookup(&self, segments: &[String]) -> Option<&Schema> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        let next = match self.child(first) {
            Some(child) => child,
            None if first.parse::<usize>().is_ok() => self.items.as_deref()?,
            None => return None,
        };
        next.lookup(rest)
    }

    /// Whether this node describes a mapping: it declares children or is typed `dict`.
    pub fn is_mapping(&self) -> bool {
        !self.children.is_empty() || self.dtypes == [Dtype::Dict]
    }

    /// Whether a value of this node already has one of the declared dtypes.
    /// A node that declares children but no dtype only accepts mappings.
    pub fn accepts(&self, value: &Native) -> bool {
        if self.dtypes.is_empty() {
            return self.children.is_empty() || value.is_object();
        }
        self.dtypes.iter().any(|d| d.matches(value))
    }

    /// First declared dtype that can coerce `value`, with the coerced value.
    pub fn coerce(&self, value: &Native) -> Option<(Dtype, Native)> {
        self.dtypes
            .iter()
            .find_map(|d| d.coerce(value).map(|coerced| (*d, coerced)))
    }

    pub fn dtype_label(&self) -> String {
        if self.dtypes.is_empty() {
            let label = if self.is_mapping() { "dict" } else { "" };
            label.to_string()
        } else {
            self.dtypes
                .iter()
                .map(|d| d.label())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    /// Short description, falling back to the long one.
    pub fn description(&self) -> Option<&str> {
        self.sdesc.as_deref().or(self.ldesc.as_deref())
    }

    /// Render a commented YAML template of every declared key.
    ///
    /// ```text
    /// name: RF         # * | str  | Model name
    /// ```
    ///
    /// `*` marks required keys, `+` optional keys under a required mapping.
    /// Keys without a default are written as `${!null}` (or their dtype when
    /// required, so the file fails validation until the user fills them in).
    pub fn template(&self) -> String {
        let mut rows = Vec::new();
        template_rows(&self.children, "", false, &mut rows);

        let key_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0);
        let type_width = rows.iter().map(|r| r.2.len()).max().unwrap_or(0);

        let mut out = String::from(TEMPLATE_HEADER);
        for (line, flag, dtype, desc) in rows {
            let _ = writeln!(
                out,
                "{line:<key_width$}  # {flag} | {dtype:<type_width$} | {desc}"
            );
        }
        out
    }
}

const TEMPLATE_HEADER: &str = "\
# Substitution markers:
#   ${.key}  value at key (relative to this mapping, falling back to the root)
#   ${$NAME} environment variable NAME
#   ${?name} text returned by function name
#   ${!name} value returned by function name (whole value only)
#
# Flags: * required, + optional under a required mapping
";

type Row = (String, char, String, String);

fn template_rows(children: &[(String, Schema)], indent: &str, in_required: bool, rows: &mut Vec<Row>) {
    for (key, schema) in children {
        let flag = if schema.required {
            '*'
        } else if in_required {
            '+'
        } else {
            ' '
        };
        let desc = schema.description().unwrap_or_default().to_string();

        if schema.is_mapping() && schema.default.is_none() {
            rows.push((format!("{indent}{key}:"), flag, schema.dtype_label(), desc));
            template_rows(&schema.children, &format!("{indent}  "), schema.required, rows);
            continue;
        }

        if let Some(items) = schema.items.as_deref().filter(|i| i.is_mapping()) {
            rows.push((format!("{indent}{key}:"), flag, schema.dtype_label(), desc));
            rows.push((
                format!("{indent}  -"),
                ' ',
                String::new(),
                "each entry has the keys below".to_string(),
            ));
            template_rows(&items.children, &format!("{indent}    "), schema.required, rows);
            continue;
        }

        let value = match &schema.default {
            Some(default) => inline_yaml(default),
            None if schema.required => schema.dtype_label(),
            None => "${!null}".to_string(),
        };
        rows.push((format!("{indent}{key}: {value}"), flag, schema.dtype_label(), desc));
    }
}

fn inline_yaml(value: &Native) -> String {
    match value {
        Native::String(s) if s.is_empty() => "\"\"".to_string(),
        Native::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_options_and_children() {
        let schema = Schema::from_native(&json!({
            ".train": {"dtype": "list", "required": true, "sdesc": "Training years"},
            ".model": {
                ".name": {"type": "str", "default": "RF", "checks": [{"oneof": ["RF", "NN"]}]},
                ".depth": {"dtype": ["int", "null"], "desc": "Tree depth"}
            }
        }))
        .unwrap();

        let train = schema.child("train").unwrap();
        assert_eq!(train.dtypes, [Dtype::List]);
        assert!(train.required);
        assert_eq!(train.description(), Some("Training years"));

        let model = schema.child("model").unwrap();
        assert!(model.is_mapping());
        let name = model.child("name").unwrap();
        assert_eq!(name.default, Some(json!("RF")));
        assert_eq!(name.checks.len(), 1);
        let depth = model.child("depth").unwrap();
        assert_eq!(depth.dtypes, [Dtype::Int, Dtype::Null]);
        assert_eq!(depth.description(), Some("Tree depth"));
    }

    #[test]
    fn children_keep_document_order() {
        let schema = Schema::from_native(&json!({".b": {}, ".a": {}, ".c": null})).unwrap();
        let keys: Vec<&str> = schema.children.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn unknown_option_names_its_path() {
        let err = Schema::from_native(&json!({".model": {"name": {"dtype": "str"}}})).unwrap_err();
        match err {
            SectfigError::InvalidSchema { path, reason } => {
                assert_eq!(path, "model");
                assert!(reason.contains("unknown option 'name'"), "{reason}");
            }
            other => panic!("Expected InvalidSchema, got: {other:?}"),
        }
    }

    #[test]
    fn alias_given_twice_is_an_error() {
        let err = Schema::from_native(&json!({".x": {"type": "int", "dtype": "str"}})).unwrap_err();
        assert!(matches!(err, SectfigError::InvalidSchema { .. }));
    }

    #[test]
    fn bad_option_shapes() {
        assert!(Schema::from_native(&json!({".x": {"dtype": "complex"}})).is_err());
        assert!(Schema::from_native(&json!({".x": {"required": "yes"}})).is_err());
        assert!(Schema::from_native(&json!({".x": {"subtypes": {"dtype": "int"}}})).is_err());
        assert!(Schema::from_native(&json!({".x": 5})).is_err());
    }

    #[test]
    fn items_and_subtypes() {
        let schema = Schema::from_native(&json!({
            ".sects": {"dtype": "list", "items": {".name": {"dtype": "str"}}},
            ".value": {"subtypes": [{"dtype": "int"}, {"dtype": "list", "items": {"dtype": "int"}}]}
        }))
        .unwrap();
        let sects = schema.child("sects").unwrap();
        assert!(sects.items.as_ref().unwrap().is_mapping());
        assert_eq!(schema.child("value").unwrap().subtypes.len(), 2);
    }

    #[test]
    fn lookup_descends_into_items() {
        let schema = Schema::from_native(&json!({
            ".sects": {"items": {".name": {"sdesc": "Section name"}}}
        }))
        .unwrap();
        let segments = vec!["sects".to_string(), "3".to_string(), "name".to_string()];
        assert_eq!(
            schema.lookup(&segments).and_then(Schema::description),
            Some("Section name")
        );
        assert!(schema.lookup(&["nope".to_string()]).is_none());
    }

    #[test]
    fn accepts_and_coerce() {
        let schema = Schema::from_native(&json!({"dtype": ["int", "str"]})).unwrap();
        assert!(schema.accepts(&json!(3)));
        assert!(!schema.accepts(&json!(true)));
        assert_eq!(schema.coerce(&json!("7")), Some((Dtype::Int, json!(7))));
        assert!(Schema::default().accepts(&json!({"any": "thing"})));
    }

    #[test]
    fn template_rows_are_aligned_and_flagged() {
        let schema = Schema::from_native(&json!({
            ".train": {"dtype": "list", "required": true, "sdesc": "Training years"},
            ".model": {
                "required": true,
                ".name": {"dtype": "str", "default": "RF"}
            },
            ".debug": {"dtype": "bool"}
        }))
        .unwrap();
        let template = schema.template();
        let body: Vec<&str> = template.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body.len(), 4);
        assert!(body[0].starts_with("train: list"), "{}", body[0]);
        assert!(body[0].contains("# * | list"));
        assert!(body[1].starts_with("model:"));
        assert!(body[2].starts_with("  name: RF"));
        assert!(body[2].contains("# + | str"));
        assert!(body[3].starts_with("debug: ${!null}"));
        let comment_cols: Vec<usize> = body.iter().filter_map(|l| l.find("  # ")).collect();
        assert!(comment_cols.windows(2).all(|w| w[0] == w[1]));
    }
}
