use std::collections::HashMap;

use crate::types::Native;

/// Where `${$NAME}` markers read environment variables from.
///
/// `Process` reads the live process environment on every lookup. `Fixed`
/// holds a snapshot, so tests can pass synthetic data instead of mutating
/// the real environment.
#[derive(Debug, Clone, Default)]
pub enum Environment {
    #[default]
    Process,
    Fixed(HashMap<String, String>),
}

impl Environment {
    pub fn fixed(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Environment::Fixed(vars.into_iter().collect())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        match self {
            Environment::Process => std::env::var(name).ok(),
            Environment::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

/// Parse a textual value into a typed native value.
/// Tries: bool → integer → float → string.
pub fn parse_scalar(s: &str) -> Native {
    if s.eq_ignore_ascii_case("true") {
        return Native::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Native::Bool(false);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Native::from(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        // Only use float if the string actually contains a dot,
        // to avoid "NaN" / "inf" being parsed as float.
        if s.contains('.')
            && let Some(n) = serde_json::Number::from_f64(f)
        {
            return Native::Number(n);
        }
    }
    Native::String(s.to_string())
}
