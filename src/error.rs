use std::path::PathBuf;
use thiserror::Error;

use crate::validate::ValidationReport;

#[derive(Debug, Error)]
pub enum SectfigError {
    #[error("Invalid structure at '{path}': {reason}")]
    Structure { path: String, reason: String },

    #[error("Invalid definitions at '{path}': {reason}")]
    InvalidSchema { path: String, reason: String },

    #[error("Substitution cycle detected: {}", chain.join(" -> "))]
    SubstitutionCycle { chain: Vec<String> },

    #[error("Patch cycle detected: {}", chain.join(" <- "))]
    PatchCycle { chain: Vec<String> },

    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("No definitions configured; call .definitions() on the builder")]
    NoDefinitions,

    #[error("Configuration is invalid:\n{0}")]
    Invalid(ValidationReport),
}

impl SectfigError {
    pub(crate) fn structure(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = SectfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_formats_path() {
        let err = SectfigError::structure("model.params", "expected a mapping");
        let msg = err.to_string();
        assert!(msg.contains("model.params"));
        assert!(msg.contains("expected a mapping"));
    }

    #[test]
    fn cycle_formats_chain() {
        let err = SectfigError::SubstitutionCycle {
            chain: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Substitution cycle detected: a -> b -> a");
    }

    #[test]
    fn patch_cycle_formats_chain() {
        let err = SectfigError::PatchCycle {
            chain: vec!["dev".into(), "base".into(), "dev".into()],
        };
        assert!(err.to_string().contains("dev <- base <- dev"));
    }

    #[test]
    fn no_definitions_mentions_builder() {
        let err = SectfigError::NoDefinitions;
        assert!(err.to_string().contains("definitions"));
    }
}
