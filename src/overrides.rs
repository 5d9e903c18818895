//! Convert dotted-key overrides into a nested mapping.
//!
//! Each `("model.depth", Native)` pair is expanded into the nested structure
//! needed for deep-merge on top of the patched document.

use crate::env::parse_scalar;
use crate::types::{Native, NativeMap, parse_path};

/// Convert dotted-key overrides into a nested mapping.
///
/// `("model.name", "RF")` becomes `{model: {name: "RF"}}`.
///
/// If multiple entries target the same key, the last one wins. A scalar that
/// sits where a later entry needs a mapping is replaced by that mapping.
pub fn overrides_to_map(entries: &[(String, Native)]) -> NativeMap {
    let mut map = NativeMap::new();
    for (dotted_key, value) in entries {
        set_nested(&mut map, &parse_path(dotted_key), value.clone());
    }
    map
}

fn set_nested(map: &mut NativeMap, segments: &[String], value: Native) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return;
    }
    let slot = map
        .entry(first.clone())
        .or_insert_with(|| Native::Object(NativeMap::new()));
    if !slot.is_object() {
        *slot = Native::Object(NativeMap::new());
    }
    if let Native::Object(sub) = slot {
        set_nested(sub, rest, value);
    }
}

/// Parse a `key=value` override string. The value goes through the same
/// bool → integer → float → string heuristic as environment values.
/// Returns `None` when there is no `=` or the key is empty.
pub fn parse_override(entry: &str) -> Option<(String, Native)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), parse_scalar(value.trim())))
}
