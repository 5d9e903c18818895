//! Validation: walk the definitions and the configuration tree in lockstep.
//!
//! Runs in three phases so the tree is only borrowed mutably when it changes:
//!
//! 1. [`inject_defaults`] fills declared keys that are missing from the tree
//!    and records `MissingRequired` for required keys without a default.
//! 2. [`check`] resolves every declared value, type-checks it (coercing where
//!    the dtype allows), runs its checks and reports undeclared keys in
//!    strict mode.
//! 3. [`apply_coercions`] records the coercions found in phase 2 on their
//!    values, so later reads return the coerced form.
//!
//! Nothing here fails: every problem becomes a [`ValidationIssue`] and the
//! caller decides what to do with the [`ValidationReport`].

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::checks::{CheckTable, FileSystem};
use crate::dtype::{Dtype, native_type_name};
use crate::env::Environment;
use crate::error::{Result, SectfigError};
use crate::functions::FunctionTable;
use crate::node::{Container, Node};
use crate::schema::Schema;
use crate::substitute::{Resolver, Unresolved};
use crate::types::{Native, join_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingRequired,
    TypeMismatch,
    CheckFailed,
    /// Only reported in strict mode.
    UnknownKey,
    /// The value could not be resolved (substitution cycle).
    Unresolvable,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::MissingRequired => "missing required",
            IssueKind::TypeMismatch => "type mismatch",
            IssueKind::CheckFailed => "check failed",
            IssueKind::UnknownKey => "unknown key",
            IssueKind::Unresolvable => "unresolvable",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Dotted path of the offending key.
    pub path: String,
    /// Name of the failing check, for `CheckFailed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.check {
            Some(check) => write!(f, "{}: {} ({check}): {}", self.path, self.kind, self.message),
            None => write!(f, "{}: {}: {}", self.path, self.kind, self.message),
        }
    }
}

/// Every issue found by one validation pass, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    /// Turn a failed report into [`SectfigError::Invalid`].
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SectfigError::Invalid(self))
        }
    }

    pub(crate) fn push(&mut self, kind: IssueKind, path: &[String], message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            kind,
            path: join_path(path),
            check: None,
            message: message.into(),
        });
    }

    fn push_check(&mut self, path: &[String], check: &str, message: String) {
        self.issues.push(ValidationIssue {
            kind: IssueKind::CheckFailed,
            path: join_path(path),
            check: Some(check.to_string()),
            message,
        });
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return writeln!(f, "No issues found");
        }
        let path_width = self.issues.iter().map(|i| i.path.len()).max().unwrap_or(0).max(4);
        let kind_width = self
            .issues
            .iter()
            .map(|i| i.kind.to_string().len())
            .max()
            .unwrap_or(0);
        writeln!(f, "{:<path_width$}  {:<kind_width$}  message", "path", "kind")?;
        for issue in &self.issues {
            let message = match &issue.check {
                Some(check) => format!("{check}: {}", issue.message),
                None => issue.message.clone(),
            };
            writeln!(
                f,
                "{:<path_width$}  {:<kind_width$}  {message}",
                issue.path,
                issue.kind.to_string()
            )?;
        }
        write!(f, "{} issue(s)", self.issues.len())
    }
}

/// Everything a validation pass reads besides the tree.
pub(crate) struct Context<'a> {
    pub schema: &'a Schema,
    pub functions: &'a FunctionTable,
    pub env: &'a Environment,
    pub fs: &'a dyn FileSystem,
    pub checks: &'a CheckTable,
    pub strict: bool,
}

/// Paths whose values were injected from defaults.
pub(crate) type Injected = HashSet<String>;

/// Phase 1: fill missing declared keys.
pub(crate) fn inject_defaults(schema: &Schema, root: &mut Container) -> (ValidationReport, Injected) {
    let mut report = ValidationReport::new();
    let mut injected = Injected::new();
    inject(schema, root, &mut Vec::new(), true, &mut report, &mut injected);
    (report, injected)
}

fn inject(
    schema: &Schema,
    container: &mut Container,
    path: &mut Vec<String>,
    report_missing: bool,
    report: &mut ValidationReport,
    injected: &mut Injected,
) {
    for (key, child) in &schema.children {
        path.push(key.clone());
        let present = container.child(key).is_some_and(|node| !node.is_absent());

        if !present {
            if let Some(default) = &child.default {
                debug!(path = %join_path(path), "Injecting default");
                put(container, key, Node::from_native(default.clone()));
                injected.insert(join_path(path));
                if let Some(Node::Container(nested)) = container.child_mut(key) {
                    inject(child, nested, path, report_missing, report, injected);
                }
            } else if child.required {
                if report_missing {
                    report.push(IssueKind::MissingRequired, path, "required key is not set");
                    put(container, key, Node::Absent);
                }
            } else if child.is_mapping() {
                // Optional section: inject its defaults, drop it again if nothing landed.
                put(container, key, Container::mapping());
                let mut empty = false;
                if let Some(Node::Container(nested)) = container.child_mut(key) {
                    inject(child, nested, path, false, report, injected);
                    empty = nested.is_empty();
                }
                if empty {
                    container.remove([key.as_str()]);
                }
            }
        } else if let Some(Node::Container(nested)) = container.child_mut(key) {
            if !nested.is_sequence() {
                if child.is_mapping() {
                    inject(child, nested, path, report_missing, report, injected);
                }
            } else if let Some(items) = child.items.as_deref().filter(|i| i.is_mapping()) {
                for index in 0..nested.len() {
                    let segment = index.to_string();
                    path.push(segment.clone());
                    if let Some(Node::Container(element)) = nested.child_mut(&segment) {
                        inject(items, element, path, report_missing, report, injected);
                    }
                    path.pop();
                }
            }
        }
        path.pop();
    }
}

fn put(container: &mut Container, key: &str, node: impl Into<Node>) {
    // Single-segment paths on a mapping cannot fail.
    let _ = container.set([key], node);
}

/// What phase 2 found besides issues.
#[derive(Debug, Default)]
pub(crate) struct Findings {
    pub coercions: Vec<(Vec<String>, Dtype)>,
    pub warnings: Vec<Unresolved>,
}

/// Phase 2: resolve, type-check and run checks.
pub(crate) fn check(
    ctx: &Context<'_>,
    root: &Node,
    generation: u64,
    injected: &Injected,
    report: &mut ValidationReport,
) -> Findings {
    let mut pass = Pass {
        ctx,
        resolver: Resolver::new(root, ctx.functions, ctx.env, generation),
        injected,
        report,
        coercions: Vec::new(),
    };
    pass.check_node(ctx.schema, root, &mut Vec::new(), ctx.strict);
    let coercions = pass.coercions;
    Findings {
        coercions,
        warnings: pass.resolver.into_warnings(),
    }
}

/// Phase 3: record coercions on their values.
pub(crate) fn apply_coercions(root: &mut Node, coercions: &[(Vec<String>, Dtype)]) {
    let Some(container) = root.as_container_mut() else {
        return;
    };
    for (path, dtype) in coercions {
        if let Some(Node::Value(value)) = container.get_mut(path.as_slice()) {
            debug!(path = %join_path(path), dtype = %dtype, "Coercing value");
            value.set_coerce(Some(*dtype));
        }
    }
}

struct Pass<'c, 'a> {
    ctx: &'c Context<'a>,
    resolver: Resolver<'c>,
    injected: &'c Injected,
    report: &'c mut ValidationReport,
    coercions: Vec<(Vec<String>, Dtype)>,
}

impl Pass<'_, '_> {
    fn check_node(&mut self, schema: &Schema, node: &Node, path: &mut Vec<String>, strict: bool) {
        let strict = schema.strict.unwrap_or(strict);
        match node {
            // Reported during injection when required.
            Node::Absent => {}
            Node::Value(value) => {
                let resolved = match self.resolver.resolve_value(value, path) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        self.report.push(IssueKind::Unresolvable, path, e.to_string());
                        return;
                    }
                };
                if let Some(dtype) = self.check_native(schema, &resolved, path, strict) {
                    self.coercions.push((path.clone(), dtype));
                }
            }
            Node::Container(container) => {
                if !schema.subtypes.is_empty() || !schema.checks.is_empty() {
                    match self.resolver.resolve_node(node, path) {
                        Ok(resolved) if !schema.subtypes.is_empty() => {
                            self.check_native(schema, &resolved, path, strict);
                            return;
                        }
                        Ok(resolved) => self.run_checks(schema, &resolved, path),
                        Err(e) => {
                            self.report.push(IssueKind::Unresolvable, path, e.to_string());
                            return;
                        }
                    }
                }
                if !container_fits(schema, container) {
                    let got = if container.is_sequence() { "list" } else { "dict" };
                    self.report.push(
                        IssueKind::TypeMismatch,
                        path,
                        format!("expected {}, got {got}", schema.dtype_label()),
                    );
                    return;
                }

                if container.is_sequence() {
                    if let Some(items) = schema.items.as_deref() {
                        for (key, child) in container {
                            path.push(key.to_string());
                            self.check_node(items, child, path, strict);
                            path.pop();
                        }
                    }
                    return;
                }

                for (key, child_schema) in &schema.children {
                    let child = container.child(key).unwrap_or(Node::absent());
                    path.push(key.clone());
                    self.check_node(child_schema, child, path, strict);
                    path.pop();
                }
                if strict && !schema.children.is_empty() {
                    for key in container.keys() {
                        let key = key.to_string();
                        if schema.child(&key).is_none() {
                            path.push(key);
                            self.report.push(IssueKind::UnknownKey, path, "key is not declared");
                            path.pop();
                        }
                    }
                }
            }
        }
    }

    /// Check a resolved value. Returns the dtype it must be coerced to, if any.
    fn check_native(
        &mut self,
        schema: &Schema,
        value: &Native,
        path: &mut Vec<String>,
        strict: bool,
    ) -> Option<Dtype> {
        if value.is_null() && !schema.dtypes.contains(&Dtype::Null) {
            if schema.required {
                self.report.push(IssueKind::MissingRequired, path, "required key is null");
            }
            return None;
        }

        if !schema.subtypes.is_empty() {
            return match schema.subtypes.iter().find(|alt| native_fits(alt, value)) {
                Some(alt) => self.check_native(alt, value, path, strict),
                None => {
                    let labels: Vec<String> =
                        schema.subtypes.iter().map(Schema::dtype_label).collect();
                    self.report.push(
                        IssueKind::TypeMismatch,
                        path,
                        format!(
                            "{} matches none of the subtypes [{}]",
                            native_type_name(value),
                            labels.join("; ")
                        ),
                    );
                    None
                }
            };
        }

        let mut coerced_to = None;
        let mut value = Cow::Borrowed(value);
        if !schema.accepts(&value) {
            match schema.coerce(&value) {
                Some((dtype, coerced)) => {
                    coerced_to = Some(dtype);
                    value = Cow::Owned(coerced);
                }
                None => {
                    self.report.push(
                        IssueKind::TypeMismatch,
                        path,
                        format!(
                            "expected {}, got {} {}",
                            schema.dtype_label(),
                            native_type_name(&value),
                            value
                        ),
                    );
                    return None;
                }
            }
        }

        self.run_checks(schema, &value, path);

        match value.as_ref() {
            Native::Array(elements) => {
                if let Some(items) = schema.items.as_deref() {
                    for (index, element) in elements.iter().enumerate() {
                        path.push(index.to_string());
                        self.check_native(items, element, path, strict);
                        path.pop();
                    }
                }
            }
            Native::Object(map) if !schema.children.is_empty() => {
                for (key, child) in &schema.children {
                    path.push(key.clone());
                    match map.get(key) {
                        Some(element) => {
                            self.check_native(child, element, path, strict);
                        }
                        None if child.required && child.default.is_none() => {
                            self.report.push(IssueKind::MissingRequired, path, "required key is not set");
                        }
                        None => {}
                    }
                    path.pop();
                }
                if schema.strict.unwrap_or(strict) {
                    for key in map.keys().filter(|k| schema.child(k).is_none()) {
                        path.push(key.clone());
                        self.report.push(IssueKind::UnknownKey, path, "key is not declared");
                        path.pop();
                    }
                }
            }
            _ => {}
        }
        coerced_to
    }

    fn run_checks(&mut self, schema: &Schema, value: &Native, path: &[String]) {
        if schema.checks.is_empty() || self.is_injected(path) {
            return;
        }
        for check in &schema.checks {
            if let Err(detail) = check.run(value, self.ctx.fs, self.ctx.checks) {
                self.report.push_check(path, check.name(), detail);
            }
        }
    }

    fn is_injected(&self, path: &[String]) -> bool {
        (1..=path.len()).any(|n| self.injected.contains(&join_path(&path[..n])))
    }
}

fn container_fits(schema: &Schema, container: &Container) -> bool {
    if schema.dtypes.is_empty() {
        return schema.children.is_empty() || !container.is_sequence();
    }
    schema.dtypes.iter().any(|d| match d {
            Dtype::Any => true,
            Dtype::List => container.is_sequence(),
            Dtype::Dict => !container.is_sequence(),
            _ => false,
        })
}

/// Whether `value` type-checks against `schema`, recursively. Used to pick a subtype.
fn native_fits(schema: &Schema, value: &Native) -> bool {
    if value.is_null() {
        return schema.dtypes.is_empty() || schema.dtypes.contains(&Dtype::Null);
    }
    if !schema.subtypes.is_empty() {
        return schema.subtypes.iter().any(|alt| native_fits(alt, value));
    }
    let value = if schema.accepts(value) {
        Cow::Borrowed(value)
    } else {
        match schema.coerce(value) {
            Some((_, coerced)) => Cow::Owned(coerced),
            None => return false,
        }
    };
    match value.as_ref() {
        Native::Array(elements) => match schema.items.as_deref() {
            Some(items) => elements.iter().all(|e| native_fits(items, e)),
            None => true,
        },
        Native::Object(map) => schema
            .children
            .iter()
            .all(|(key, child)| map.get(key).is_none_or(|v| native_fits(child, v))),
        _ => true,
    }
}
