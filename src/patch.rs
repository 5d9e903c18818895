//! Section patching: compose named top-level sections of a raw document into
//! one effective configuration.
//!
//! A patch is an ordered list of section names, written either as a list or
//! as `"default<-gpu<-debug"`. Resolution starts from an empty mapping and
//! deep-merges each section on top (see [`deep_merge`]), so the rightmost
//! section wins every conflict.
//!
//! A section may name its own parents with the [`INHERIT_KEY`] key:
//!
//! ```yaml
//! default:
//!   epochs: 10
//! gpu:
//!   sectfig.patch: default
//!   device: cuda
//! ```
//!
//! Patching `["gpu"]` then expands to `["default", "gpu"]`. The key itself is
//! stripped from the result.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{Result, SectfigError};
use crate::merge::deep_merge;
use crate::types::{Native, NativeMap};

/// Reserved key a section uses to declare the sections it patches on top of.
pub const INHERIT_KEY: &str = "sectfig.patch";

/// Ordered section names; later sections override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSpec(Vec<String>);

impl PatchSpec {
    /// Parse `"a<-b<-c"`. Whitespace around names is ignored, empty names dropped.
    pub fn parse(spec: &str) -> Self {
        Self(
            spec.split("<-")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn sections(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("<-"))
    }
}

impl From<&str> for PatchSpec {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<String> for PatchSpec {
    fn from(spec: String) -> Self {
        Self::parse(&spec)
    }
}

impl<S: Into<String>> From<Vec<S>> for PatchSpec {
    fn from(sections: Vec<S>) -> Self {
        Self(sections.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String> + Clone> From<&[S]> for PatchSpec {
    fn from(sections: &[S]) -> Self {
        Self(sections.iter().cloned().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for PatchSpec {
    fn from(sections: [S; N]) -> Self {
        Self(sections.into_iter().map(Into::into).collect())
    }
}

/// The merged document plus diagnostics about which sections were used.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub merged: NativeMap,
    /// Sections applied, in application order (after inheritance expansion).
    pub found: Vec<String>,
    /// Requested sections that do not exist in the document.
    pub missing: Vec<String>,
}

/// Merge the sections named by `patch` out of `raw`.
///
/// Unknown sections are skipped and reported in [`PatchOutcome::missing`].
/// A section that is not a mapping, or an inheritance cycle, is an error.
pub fn resolve(raw: &Native, patch: &PatchSpec) -> Result<PatchOutcome> {
    let Some(document) = raw.as_object() else {
        return Err(SectfigError::structure(
            "",
            "a patched document must be a mapping of sections",
        ));
    };

    let mut order = Vec::new();
    let mut missing = Vec::new();
    let mut stack = Vec::new();
    for section in patch.sections() {
        expand(document, section, &mut stack, &mut order, &mut missing)?;
    }

    let mut merged = NativeMap::new();
    for section in &order {
        let Some(Native::Object(map)) = document.get(section) else {
            continue;
        };
        debug!(section = %section, "Applying section");
        let mut overlay = map.clone();
        overlay.shift_remove(INHERIT_KEY);
        merged = deep_merge(merged, overlay);
    }

    Ok(PatchOutcome {
        merged,
        found: order,
        missing,
    })
}

fn expand(
    document: &NativeMap,
    section: &str,
    stack: &mut Vec<String>,
    order: &mut Vec<String>,
    missing: &mut Vec<String>,
) -> Result<()> {
    if stack.iter().any(|s| s == section) {
        let mut chain = stack.clone();
        chain.push(section.to_string());
        return Err(SectfigError::PatchCycle { chain });
    }

    let map = match document.get(section) {
        None => {
            warn!(section = %section, "Section not found, skipping");
            if !missing.iter().any(|m| m == section) {
                missing.push(section.to_string());
            }
            return Ok(());
        }
        Some(Native::Object(map)) => map,
        Some(other) => {
            return Err(SectfigError::structure(
                section,
                format!("a section must be a mapping, got {other}"),
            ));
        }
    };

    stack.push(section.to_string());
    if let Some(parents) = map.get(INHERIT_KEY) {
        for parent in inherited(parents, section)?.sections() {
            expand(document, parent, stack, order, missing)?;
        }
    }
    stack.pop();

    order.push(section.to_string());
    Ok(())
}

fn inherited(value: &Native, section: &str) -> Result<PatchSpec> {
    match value {
        Native::String(spec) => Ok(PatchSpec::parse(spec)),
        Native::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(String::from).ok_or_else(|| {
                    SectfigError::structure(
                        format!("{section}.{INHERIT_KEY}"),
                        "inherited section names must be strings",
                    )
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(PatchSpec::from),
        other => Err(SectfigError::structure(
            format!("{section}.{INHERIT_KEY}"),
            format!("expected a patch string or list, got {other}"),
        )),
    }
}
