//! Named checks run against resolved values during validation.
//!
//! In a definitions document a check is written either as a bare name or as a
//! single-key mapping carrying its parameters:
//!
//! ```yaml
//! .kind:
//!   checks:
//!     - oneof: [rf, nn]
//! .pattern:
//!   checks:
//!     - oneof: {options: ["^rf", "^nn"], regex: true}
//! .input:
//!   checks:
//!     - isfile
//! .depth:
//!   checks:
//!     - between: {lower: 1, upper: 10, inclusive: both}
//! ```
//!
//! Any other name refers to a custom check registered on the builder.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::error::{Result, SectfigError};
use crate::types::Native;

/// A custom check: `(value, params) -> Ok(()) | Err(reason)`.
pub type CheckFn = Arc<dyn Fn(&Native, &Native) -> std::result::Result<(), String> + Send + Sync>;

/// Filesystem predicates used by `isfile` / `isdir`.
pub trait FileSystem: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// Which ends of a `between` range are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Inclusive {
    #[default]
    None,
    Lower,
    Upper,
    Both,
}

impl Inclusive {
    fn parse(value: &Native) -> Option<Self> {
        match value {
            Native::Bool(true) => Some(Inclusive::Both),
            Native::Bool(false) | Native::Null => Some(Inclusive::None),
            Native::String(s) => match s.to_ascii_lowercase().as_str() {
                "none" => Some(Inclusive::None),
                "lower" => Some(Inclusive::Lower),
                "upper" => Some(Inclusive::Upper),
                "both" => Some(Inclusive::Both),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Numeric bounds; every bound that is set must hold.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub lt: Option<f64>,
    pub lte: Option<f64>,
    pub gt: Option<f64>,
    pub gte: Option<f64>,
}

impl Bounds {
    fn between(lower: f64, upper: f64, inclusive: Inclusive) -> Self {
        let lower_inclusive = matches!(inclusive, Inclusive::Lower | Inclusive::Both);
        let upper_inclusive = matches!(inclusive, Inclusive::Upper | Inclusive::Both);
        Bounds {
            gt: (!lower_inclusive).then_some(lower),
            gte: lower_inclusive.then_some(lower),
            lt: (!upper_inclusive).then_some(upper),
            lte: upper_inclusive.then_some(upper),
        }
    }

    fn check(&self, value: f64) -> std::result::Result<(), String> {
        let mut errors = Vec::new();
        if let Some(b) = self.lt
            && value >= b
        {
            errors.push(format!("must be less than {b}"));
        }
        if let Some(b) = self.lte
            && value > b
        {
            errors.push(format!("must be less than or equal to {b}"));
        }
        if let Some(b) = self.gt
            && value <= b
        {
            errors.push(format!("must be greater than {b}"));
        }
        if let Some(b) = self.gte
            && value < b
        {
            errors.push(format!("must be greater than or equal to {b}"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!("{value} {}", errors.join(", ")))
        }
    }
}

/// One parsed check.
#[derive(Debug, Clone)]
pub enum Check {
    OneOf(Vec<Native>),
    OneOfRegex(Vec<Regex>),
    IsFile,
    IsDir,
    /// `compare` and `between` both become bounds.
    Range { name: &'static str, bounds: Bounds },
    Custom { name: String, params: Native },
}

impl Check {
    /// Parse one entry of a `checks` list. `path` locates errors.
    pub fn parse(entry: &Native, path: &str) -> Result<Self> {
        let single = match entry {
            Native::String(name) => Some((name.clone(), Native::Null)),
            Native::Object(map) if map.len() == 1 => {
                map.iter().next().map(|(k, v)| (k.clone(), v.clone()))
            }
            _ => None,
        };
        let Some((name, params)) = single else {
            return Err(SectfigError::schema(
                path,
                format!("a check must be a name or a single-key mapping, got {entry}"),
            ));
        };

        match name.as_str() {
            "oneof" => parse_oneof(&params, path),
            "isfile" => Ok(Check::IsFile),
            "isdir" => Ok(Check::IsDir),
            "compare" => Ok(Check::Range {
                name: "compare",
                bounds: Bounds {
                    lt: number_param(&params, "lt", path)?,
                    lte: number_param(&params, "lte", path)?,
                    gt: number_param(&params, "gt", path)?,
                    gte: number_param(&params, "gte", path)?,
                },
            }),
            "between" => {
                let lower = number_param(&params, "lower", path)?;
                let upper = number_param(&params, "upper", path)?;
                let (Some(lower), Some(upper)) = (lower, upper) else {
                    return Err(SectfigError::schema(path, "between requires lower and upper"));
                };
                let inclusive = match params.get("inclusive") {
                    None => Inclusive::None,
                    Some(v) => Inclusive::parse(v).ok_or_else(|| {
                        SectfigError::schema(
                            path,
                            format!("inclusive must be none, lower, upper or both, got {v}"),
                        )
                    })?,
                };
                Ok(Check::Range {
                    name: "between",
                    bounds: Bounds::between(lower, upper, inclusive),
                })
            }
            _ => Ok(Check::Custom { name, params }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Check::OneOf(_) | Check::OneOfRegex(_) => "oneof",
            Check::IsFile => "isfile",
            Check::IsDir => "isdir",
            Check::Range { name, .. } => name,
            Check::Custom { name, .. } => name,
        }
    }

    /// Run the check. `Err` carries a human-readable reason.
    pub fn run(
        &self,
        value: &Native,
        fs: &dyn FileSystem,
        custom: &CheckTable,
    ) -> std::result::Result<(), String> {
        match self {
            Check::OneOf(options) => {
                if options.contains(value) {
                    Ok(())
                } else {
                    let listed = Native::Array(options.clone());
                    Err(format!("invalid option {value}, should be one of {listed}"))
                }
            }
            Check::OneOfRegex(patterns) => {
                let text = display(value);
                if patterns.iter().any(|re| re.is_match(&text)) {
                    Ok(())
                } else {
                    let listed: Vec<&str> = patterns.iter().map(Regex::as_str).collect();
                    Err(format!("invalid option {value}, should match one of {listed:?}"))
                }
            }
            Check::IsFile => match value.as_str() {
                Some(p) if fs.is_file(Path::new(p)) => Ok(()),
                _ => Err(format!("file not found: {}", display(value))),
            },
            Check::IsDir => match value.as_str() {
                Some(p) if fs.is_dir(Path::new(p)) => Ok(()),
                _ => Err(format!("directory not found: {}", display(value))),
            },
            Check::Range { bounds, .. } => match value.as_f64() {
                Some(n) => bounds.check(n),
                None => Err(format!("{value} is not a number")),
            },
            Check::Custom { name, params } => match custom.get(name) {
                Some(f) => f(value, params),
                None => Err(format!("no check named '{name}' is registered")),
            },
        }
    }
}

fn display(value: &Native) -> String {
    value.as_str().map(String::from).unwrap_or_else(|| value.to_string())
}

fn parse_oneof(params: &Native, path: &str) -> Result<Check> {
    let (options, regex) = match params {
        Native::Array(options) => (options.clone(), false),
        Native::Object(map) => {
            let options = match map.get("options") {
                Some(Native::Array(options)) => options.clone(),
                _ => return Err(SectfigError::schema(path, "oneof requires an options list")),
            };
            let regex = map.get("regex").and_then(Native::as_bool).unwrap_or(false);
            (options, regex)
        }
        _ => return Err(SectfigError::schema(path, "oneof requires an options list")),
    };

    if !regex {
        return Ok(Check::OneOf(options));
    }
    options
        .iter()
        .map(|opt| {
            let pattern = opt
                .as_str()
                .ok_or_else(|| SectfigError::schema(path, "regex options must be strings"))?;
            Regex::new(pattern).map_err(|e| SectfigError::schema(path, format!("bad regex: {e}")))
        })
        .collect::<Result<Vec<_>>>()
        .map(Check::OneOfRegex)
}

fn number_param(params: &Native, key: &str, path: &str) -> Result<Option<f64>> {
    match params.get(key) {
        None | Some(Native::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| SectfigError::schema(path, format!("{key} must be a number, got {v}"))),
    }
}

/// Custom checks by name.
#[derive(Clone, Default)]
pub struct CheckTable {
    checks: HashMap<String, CheckFn>,
}

impl CheckTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Native, &Native) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&CheckFn> {
        self.checks.get(name)
    }
}

impl fmt::Debug for CheckTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.checks.keys().collect();
        names.sort();
        f.debug_struct("CheckTable").field("checks", &names).finish()
    }
}
