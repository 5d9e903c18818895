//! Declared value types and the coercion rules between them.
//!
//! | dtype            | accepts                     | coerces from                              |
//! |------------------|-----------------------------|-------------------------------------------|
//! | `any`            | everything                  | —                                         |
//! | `str`, `path`    | strings                     | integers, floats, booleans (display form) |
//! | `int`            | integers                    | integer strings, floats without fraction  |
//! | `float`          | floats and integers         | numeric strings                           |
//! | `bool`           | booleans                    | `"true"` / `"false"` (any case)           |
//! | `list`           | sequences                   | —                                         |
//! | `dict`           | mappings                    | —                                         |
//! | `null`           | `null`                      | —                                         |
//!
//! Strings are never silently parsed unless the declared dtype asks for a
//! number or boolean, so quoted numerals (`"5"`) stay strings everywhere else.

use std::fmt;
use std::str::FromStr;

use crate::types::Native;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    Any,
    Str,
    Int,
    Float,
    Bool,
    Path,
    List,
    Dict,
    Null,
}

impl Dtype {
    pub fn label(self) -> &'static str {
        match self {
            Dtype::Any => "any",
            Dtype::Str => "str",
            Dtype::Int => "int",
            Dtype::Float => "float",
            Dtype::Bool => "bool",
            Dtype::Path => "path",
            Dtype::List => "list",
            Dtype::Dict => "dict",
            Dtype::Null => "null",
        }
    }

    /// Whether `value` already has this type.
    pub fn matches(self, value: &Native) -> bool {
        match self {
            Dtype::Any => true,
            Dtype::Str | Dtype::Path => value.is_string(),
            Dtype::Int => value.is_i64() || value.is_u64(),
            Dtype::Float => value.is_number(),
            Dtype::Bool => value.is_boolean(),
            Dtype::List => value.is_array(),
            Dtype::Dict => value.is_object(),
            Dtype::Null => value.is_null(),
        }
    }

    /// Convert `value` into this type following the table in the module docs.
    /// Returns `None` when no documented coercion applies.
    pub fn coerce(self, value: &Native) -> Option<Native> {
        if self.matches(value) {
            return Some(value.clone());
        }
        match (self, value) {
            (Dtype::Int, Native::String(s)) => s.trim().parse::<i64>().ok().map(Native::from),
            (Dtype::Int, Native::Number(n)) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| Native::from(f as i64)),
            (Dtype::Float, Native::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(|f| serde_json::Number::from_f64(f).map(Native::Number)),
            (Dtype::Bool, Native::String(s)) if s.eq_ignore_ascii_case("true") => {
                Some(Native::Bool(true))
            }
            (Dtype::Bool, Native::String(s)) if s.eq_ignore_ascii_case("false") => {
                Some(Native::Bool(false))
            }
            (Dtype::Str | Dtype::Path, Native::Number(n)) => Some(Native::String(n.to_string())),
            (Dtype::Str | Dtype::Path, Native::Bool(b)) => Some(Native::String(b.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" | "*" => Ok(Dtype::Any),
            "str" | "string" => Ok(Dtype::Str),
            "int" | "integer" => Ok(Dtype::Int),
            "float" => Ok(Dtype::Float),
            "bool" | "boolean" => Ok(Dtype::Bool),
            "path" => Ok(Dtype::Path),
            "list" | "sequence" => Ok(Dtype::List),
            "dict" | "mapping" => Ok(Dtype::Dict),
            "null" | "none" => Ok(Dtype::Null),
            other => Err(format!("unknown dtype '{other}'")),
        }
    }
}

/// Native type name used in mismatch messages.
pub fn native_type_name(value: &Native) -> &'static str {
    match value {
        Native::Null => "null",
        Native::Bool(_) => "bool",
        Native::Number(n) if n.is_f64() => "float",
        Native::Number(_) => "int",
        Native::String(_) => "str",
        Native::Array(_) => "list",
        Native::Object(_) => "dict",
    }
}
