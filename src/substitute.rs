//! Lazy `${...}` substitution.
//!
//! A marker is `${` + sigil + key + `}`:
//!
//! | marker      | replaced with                                                    |
//! |-------------|------------------------------------------------------------------|
//! | `${.key}`   | the resolved value at `key`, relative to the enclosing container |
//! | `${..key}`  | same, one container further up (each extra dot climbs a level)   |
//! | `${key}`    | the resolved value at `key`, looked up from the root only         |
//! | `${$NAME}`  | environment variable `NAME`                                      |
//! | `${?name}`  | the stringified return of function `name`                        |
//! | `${!name}`  | the native return of function `name` (whole-value markers only)  |
//!
//! Keys may contain markers themselves (`${.models.${$MODEL}}`); inner markers
//! resolve first. Multiple markers in one string resolve left to right.
//!
//! A relative lookup that misses is retried from the root, so a nested value
//! can reference top-level keys with a single dot.
//!
//! A value consisting of exactly one key or `!` marker takes the native type
//! of what it resolves to; embedded markers are stringified. Any other
//! leading character is not a sigil and leaves the marker as literal text. Unresolved
//! markers become empty strings and are reported as [`Unresolved`] warnings.
//! A chain of lookups that revisits a value being resolved is a
//! [`SectfigError::SubstitutionCycle`].

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::env::Environment;
use crate::error::{Result, SectfigError};
use crate::functions::FunctionTable;
use crate::node::{Node, Value};
use crate::types::{DELETE_TOKEN, Native, NativeMap, join_path, parse_path};

/// A marker that could not be resolved. Soft: the marker became an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    /// Path of the value containing the marker.
    pub path: String,
    /// The marker text, e.g. `${$DATA_DIR}`.
    pub marker: String,
    pub reason: String,
}

/// A marker without a sigil starts straight away with its key.
fn is_key_start(sigil: char) -> bool {
    sigil.is_alphanumeric() || sigil == '_'
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.marker, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Marker(Marker),
}

#[derive(Debug, Clone, PartialEq)]
struct Marker {
    sigil: char,
    key: Vec<Segment>,
    text: String,
}

fn parse(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        let body = &rest[start + 2..];
        let Some(len) = closing_brace(body) else {
            break;
        };
        literal.push_str(&rest[..start]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let inner = &body[..len];
        let mut chars = inner.chars();
        let sigil = chars.next().unwrap_or('\0');
        segments.push(Segment::Marker(Marker {
            sigil,
            key: parse(chars.as_str()),
            text: rest[start..start + len + 3].to_string(),
        }));
        rest = &body[len + 1..];
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Byte offset of the `}` closing a marker body, skipping nested markers.
fn closing_brace(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if depth == 0 => return Some(i),
            b'}' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Whether `text` contains at least one complete marker.
pub fn has_markers(text: &str) -> bool {
    parse(text).iter().any(|s| matches!(s, Segment::Marker(_)))
}

/// String form used when a value is embedded in a larger string.
pub fn to_text(value: &Native) -> String {
    match value {
        Native::String(s) => s.clone(),
        Native::Null => "null".to_string(),
        Native::Bool(b) => b.to_string(),
        Native::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Resolves values of one tree against a function table and an environment.
pub(crate) struct Resolver<'a> {
    root: &'a Node,
    functions: &'a FunctionTable,
    env: &'a Environment,
    generation: u64,
    stack: Vec<String>,
    warnings: Vec<Unresolved>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        root: &'a Node,
        functions: &'a FunctionTable,
        env: &'a Environment,
        generation: u64,
    ) -> Self {
        Self {
            root,
            functions,
            env,
            generation,
            stack: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn into_warnings(self) -> Vec<Unresolved> {
        self.warnings
    }

    /// Resolve whatever lives at `path`. `None` when the path is absent.
    pub(crate) fn resolve_path(&mut self, path: &[String]) -> Result<Option<Native>> {
        let root = self.root;
        match root.get_segments(path) {
            Node::Absent => Ok(None),
            node => self.resolve_node(node, path).map(Some),
        }
    }

    pub(crate) fn resolve_node(&mut self, node: &Node, path: &[String]) -> Result<Native> {
        match node {
            Node::Value(value) => self.resolve_value(value, path),
            Node::Container(container) if container.is_sequence() => {
                let mut items = Vec::with_capacity(container.len());
                for (key, child) in container {
                    let child_path = child_path(path, key.to_string());
                    items.push(self.resolve_node(child, &child_path)?);
                }
                Ok(Native::Array(items))
            }
            Node::Container(container) => {
                let mut map = NativeMap::new();
                for (key, child) in container {
                    if child.is_absent() {
                        continue;
                    }
                    let child_path = child_path(path, key.to_string());
                    map.insert(key.to_string(), self.resolve_node(child, &child_path)?);
                }
                Ok(Native::Object(map))
            }
            Node::Absent => Ok(Native::Null),
        }
    }

    pub(crate) fn resolve_value(&mut self, value: &Value, path: &[String]) -> Result<Native> {
        if let Some(cached) = value.cached(self.generation) {
            return Ok(cached);
        }

        let key = join_path(path);
        if self.stack.contains(&key) {
            let start = self.stack.iter().position(|k| *k == key).unwrap_or(0);
            let mut chain = self.stack[start..].to_vec();
            chain.push(key);
            return Err(SectfigError::SubstitutionCycle { chain });
        }

        self.stack.push(key);
        let computed = self.compute(value, path);
        self.stack.pop();
        let mut resolved = computed?;

        if let Some(dtype) = value.coerce_to()
            && let Some(coerced) = dtype.coerce(&resolved)
        {
            resolved = coerced;
        }
        value.store(self.generation, resolved.clone());
        Ok(resolved)
    }

    fn compute(&mut self, value: &Value, path: &[String]) -> Result<Native> {
        match value.raw() {
            Native::String(s) if s == DELETE_TOKEN => Ok(Native::Null),
            Native::String(s) if s.contains("${") => self.interpolate(s, path),
            raw => Ok(raw.clone()),
        }
    }

    fn interpolate(&mut self, text: &str, path: &[String]) -> Result<Native> {
        let segments = parse(text);

        if let [Segment::Marker(marker)] = segments.as_slice()
            && (matches!(marker.sigil, '.' | '!') || is_key_start(marker.sigil))
        {
            return Ok(match self.evaluate(marker, path, true)? {
                Some(value) => value,
                None if marker.sigil == '!' => Native::Null,
                None => Native::String(String::new()),
            });
        }

        let mut out = String::new();
        for segment in &segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Marker(marker) => {
                    if let Some(value) = self.evaluate(marker, path, false)? {
                        out.push_str(&to_text(&value));
                    }
                }
            }
        }
        Ok(Native::String(out))
    }

    /// Evaluate one marker. `None` means unresolved (already recorded).
    fn evaluate(&mut self, marker: &Marker, path: &[String], whole: bool) -> Result<Option<Native>> {
        let key = self.expand(&marker.key, path)?;
        match marker.sigil {
            '.' => {
                let found = self.lookup(&key, path)?;
                if found.is_none() {
                    self.unresolved(path, marker, "key not found");
                }
                Ok(found)
            }
            '$' => {
                let found = self.env.get(&key).map(Native::String);
                if found.is_none() {
                    self.unresolved(path, marker, "environment variable not set");
                }
                Ok(found)
            }
            '?' | '!' => {
                if marker.sigil == '!' && !whole {
                    warn!(
                        path = %join_path(path),
                        marker = %marker.text,
                        "Function marker embedded in a larger string, substituting its text form"
                    );
                }
                let found = self.functions.call(&key);
                if found.is_none() {
                    self.unresolved(path, marker, "function not registered");
                }
                Ok(found)
            }
            sigil if is_key_start(sigil) => {
                let found = self.resolve_path(&parse_path(&format!("{sigil}{key}")))?;
                if found.is_none() {
                    self.unresolved(path, marker, "key not found");
                }
                Ok(found)
            }
            _ => {
                warn!(
                    path = %join_path(path),
                    marker = %marker.text,
                    "Marker has no valid sigil, leaving it as-is"
                );
                Ok(Some(Native::String(marker.text.clone())))
            }
        }
    }

    /// Resolve nested markers in a key to plain text.
    fn expand(&mut self, key: &[Segment], path: &[String]) -> Result<String> {
        let mut out = String::new();
        for segment in key {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Marker(marker) => {
                    if let Some(value) = self.evaluate(marker, path, false)? {
                        out.push_str(&to_text(&value));
                    }
                }
            }
        }
        Ok(out)
    }

    fn lookup(&mut self, key: &str, path: &[String]) -> Result<Option<Native>> {
        let ups = key.chars().take_while(|c| *c == '.').count();
        let target = parse_path(&key[ups..]);
        if target.is_empty() {
            return Ok(None);
        }

        // The enclosing container of the value, then `ups` levels higher.
        let base_len = path.len().saturating_sub(1);
        if ups <= base_len {
            let mut relative = path[..base_len - ups].to_vec();
            relative.extend(target.iter().cloned());
            if !self.root.get_segments(&relative).is_absent() {
                return self.resolve_path(&relative);
            }
        }
        self.resolve_path(&target)
    }

    fn unresolved(&mut self, path: &[String], marker: &Marker, reason: &str) {
        let path = join_path(path);
        warn!(path = %path, marker = %marker.text, reason, "Unresolved substitution");
        self.warnings.push(Unresolved {
            path,
            marker: marker.text.clone(),
            reason: reason.to_string(),
        });
    }
}

fn child_path(path: &[String], key: String) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(key);
    child
}
