//! Readers and writers for the document formats.
//!
//! Every format parses into the same [`Native`] model; nothing downstream
//! knows which syntax a document came from. Mapping order is preserved.

use std::path::Path;

use tracing::debug;

use crate::error::{Result, SectfigError};
use crate::types::Native;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    /// Pick a format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yml" | "yaml" => Some(Format::Yaml),
            "toml" => Some(Format::Toml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// Parse `content` as `format`. `origin` is only used in error messages.
pub fn load_str(content: &str, format: Format, origin: &Path) -> Result<Native> {
    let parsed = match format {
        Format::Yaml => serde_yaml::from_str::<Native>(content).map_err(|e| e.to_string()),
        Format::Toml => toml::from_str::<Native>(content).map_err(|e| e.to_string()),
        Format::Json => serde_json::from_str::<Native>(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|reason| SectfigError::ParseError {
        path: origin.to_path_buf(),
        reason,
    })
}

/// Read and parse a file, picking the format from its extension.
pub fn load_file(path: &Path) -> Result<Native> {
    let format =
        Format::from_path(path).ok_or_else(|| SectfigError::UnsupportedFormat(path.to_path_buf()))?;
    let content = std::fs::read_to_string(path).map_err(|e| SectfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(path = %path.display(), ?format, "Loaded document");
    load_str(&content, format, path)
}

pub fn to_yaml_string(native: &Native) -> Result<String> {
    serde_yaml::to_string(native).map_err(|e| SectfigError::Serialize(e.to_string()))
}
