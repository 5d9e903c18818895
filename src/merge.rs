use crate::types::{DELETE_TOKEN, Native, NativeMap};

/// Deep-merge `overlay` on top of `base`.
/// If both sides have a mapping for the same key, recurse.
/// If the overlay value is the bare-backslash token, the key is removed.
/// Otherwise, `overlay`'s value wins (sequences are replaced, never concatenated).
pub fn deep_merge(mut base: NativeMap, overlay: NativeMap) -> NativeMap {
    for (key, overlay_val) in overlay {
        if is_delete_token(&overlay_val) {
            base.shift_remove(&key);
            continue;
        }
        match overlay_val {
            Native::Object(overlay_map) if base.get(&key).is_some_and(Native::is_object) => {
                if let Some(Native::Object(base_map)) = base.get_mut(&key) {
                    let merged = deep_merge(std::mem::take(base_map), overlay_map);
                    *base_map = merged;
                }
            }
            overlay_val => {
                base.insert(key, strip_delete_tokens(overlay_val));
            }
        }
    }
    base
}

/// Layer one whole document over another before any section is applied.
///
/// Like [`deep_merge`] but delete tokens are kept verbatim: they are
/// instructions for the patch step, not for layering files.
pub fn layer(mut base: NativeMap, overlay: NativeMap) -> NativeMap {
    for (key, overlay_val) in overlay {
        match overlay_val {
            Native::Object(overlay_map) if base.get(&key).is_some_and(Native::is_object) => {
                if let Some(Native::Object(base_map)) = base.get_mut(&key) {
                    let merged = layer(std::mem::take(base_map), overlay_map);
                    *base_map = merged;
                }
            }
            overlay_val => {
                base.insert(key, overlay_val);
            }
        }
    }
    base
}

pub fn is_delete_token(value: &Native) -> bool {
    value.as_str() == Some(DELETE_TOKEN)
}

/// Remove delete tokens from mappings that are inserted wholesale, so a token
/// never survives a merge regardless of whether the key existed before.
fn strip_delete_tokens(value: Native) -> Native {
    match value {
        Native::Object(map) => Native::Object(
            map.into_iter()
                .filter(|(_, v)| !is_delete_token(v))
                .map(|(k, v)| (k, strip_delete_tokens(v)))
                .collect(),
        ),
        other => other,
    }
}
