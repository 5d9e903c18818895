use std::fmt;
use std::path::PathBuf;

/// Plain nested document: what format readers produce and what
/// [`Config::to_native`](crate::Config::to_native) hands back.
///
/// Mapping order is preserved (`serde_json` is built with `preserve_order`).
pub type Native = serde_json::Value;

/// Native mapping type.
pub type NativeMap = serde_json::Map<String, Native>;

/// The bare-backslash token. During a patch merge it deletes the key it is
/// assigned to; anywhere else it resolves to native `null`.
pub const DELETE_TOKEN: &str = "\\";

/// A child slot of a container: a key in mapping mode, an index in sequence mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Anything that can address a node in the tree.
///
/// Strings are split on `.` and `[i]` brackets (`"sects[1].name"` and
/// `"sects.1.name"` are the same path). Slices, arrays and vectors are taken
/// segment by segment without further splitting, which allows keys that
/// themselves contain dots.
pub trait AsPath {
    fn to_segments(&self) -> Vec<String>;
}

impl AsPath for str {
    fn to_segments(&self) -> Vec<String> {
        parse_path(self)
    }
}

impl AsPath for String {
    fn to_segments(&self) -> Vec<String> {
        parse_path(self)
    }
}

impl<S: AsRef<str>> AsPath for [S] {
    fn to_segments(&self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> AsPath for [S; N] {
    fn to_segments(&self) -> Vec<String> {
        self.as_slice().to_segments()
    }
}

impl<S: AsRef<str>> AsPath for Vec<S> {
    fn to_segments(&self) -> Vec<String> {
        self.as_slice().to_segments()
    }
}

impl<T: AsPath + ?Sized> AsPath for &T {
    fn to_segments(&self) -> Vec<String> {
        (**self).to_segments()
    }
}

/// Split a dotted path into segments. Empty segments are dropped, so `""`
/// addresses the root and `"a..b"` is `["a", "b"]`.
pub fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        // `name[0][1]` -> name, 0, 1
        while let Some(open) = rest.find('[') {
            let head = &rest[..open];
            if !head.is_empty() {
                segments.push(head.to_string());
            }
            match rest[open..].find(']') {
                Some(close) => {
                    let index = &rest[open + 1..open + close];
                    if !index.is_empty() {
                        segments.push(index.to_string());
                    }
                    rest = &rest[open + close + 1..];
                }
                None => {
                    // Unbalanced bracket: keep the remainder literally.
                    segments.push(rest[open..].to_string());
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            segments.push(rest.to_string());
        }
    }
    segments
}

/// Join segments back into the dotted form used in messages and reports.
pub fn join_path(segments: &[String]) -> String {
    segments.join(".")
}

/// A config operation, independent of any CLI framework.
/// The CLI layer converts parsed clap args into this.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigAction {
    /// Dump the resolved configuration.
    Print,
    /// Show every resolved leaf as `key = value`.
    List,
    /// Validate against the definitions and report every issue.
    Validate,
    /// Render a commented template from the definitions.
    Generate { output: Option<PathBuf> },
    /// Show one resolved value and its description.
    Get { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_path() {
        assert_eq!(parse_path("model.params.depth"), ["model", "params", "depth"]);
    }

    #[test]
    fn bracket_indices() {
        assert_eq!(parse_path("sects[1].name"), ["sects", "1", "name"]);
        assert_eq!(parse_path("grid[0][2]"), ["grid", "0", "2"]);
    }

    #[test]
    fn empty_path_is_root() {
        assert!(parse_path("").is_empty());
        assert_eq!(parse_path("a..b"), ["a", "b"]);
    }

    #[test]
    fn slices_are_not_split() {
        let segments = ["a.b", "c"].to_segments();
        assert_eq!(segments, ["a.b", "c"]);
    }

    #[test]
    fn join_round_trips_dotted() {
        let segments = parse_path("x.y.0");
        assert_eq!(join_path(&segments), "x.y.0");
    }
}
