//! Helpers for reading resource documents.
//!
//! Resource files are maps of maps; these helpers pull typed scalars out of
//! a [`serde_json::Value`] with a logged warning (rather than an abort)
//! when a property has the wrong shape, so a bad field degrades to its
//! default and the rest of the mod still parses.

use serde_json::Value;

/// Log a bad-property warning in a consistent format.
pub fn property_warning(resource_type: &str, resource: &str, property: &str, expected: &str) {
    log::warn!(
        "{resource_type} {resource:?}: property {property:?} is not a {expected}, using default"
    );
}

pub fn as_object<'v>(value: &'v Value) -> Option<&'v serde_json::Map<String, Value>> {
    value.as_object()
}

pub fn get_str<'v>(map: &'v serde_json::Map<String, Value>, key: &str) -> Option<&'v str> {
    map.get(key).and_then(Value::as_str)
}

pub fn string_or(
    map: &serde_json::Map<String, Value>,
    key: &str,
    resource_type: &str,
    resource: &str,
    default: &str,
) -> String {
    match map.get(key) {
        None => default.to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            property_warning(resource_type, resource, key, "string");
            default.to_owned()
        }
    }
}

pub fn bool_or(
    map: &serde_json::Map<String, Value>,
    key: &str,
    resource_type: &str,
    resource: &str,
    default: bool,
) -> bool {
    match map.get(key) {
        None => default,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            property_warning(resource_type, resource, key, "bool");
            default
        }
    }
}

pub fn u32_or(
    map: &serde_json::Map<String, Value>,
    key: &str,
    resource_type: &str,
    resource: &str,
    default: u32,
) -> u32 {
    match map.get(key).and_then(Value::as_u64) {
        Some(v) => v as u32,
        None if !map.contains_key(key) => default,
        None => {
            property_warning(resource_type, resource, key, "unsigned integer");
            default
        }
    }
}

pub fn i32_or(
    map: &serde_json::Map<String, Value>,
    key: &str,
    resource_type: &str,
    resource: &str,
    default: i32,
) -> i32 {
    match map.get(key).and_then(Value::as_i64) {
        Some(v) => v as i32,
        None if !map.contains_key(key) => default,
        None => {
            property_warning(resource_type, resource, key, "integer");
            default
        }
    }
}

/// Merge a sequence value over `previous`.
///
/// A plain string becomes a one-element addition. Inside an array the
/// directive strings switch modes: `"="` clears the inherited sequence,
/// `"+"` switches back to adding (the default) and `"-"` removes the
/// following names. `["-", "a", "+", "b", "c"]` removes `a` then adds `b`
/// and `c`.
pub fn merge_sequence(value: &Value, previous: &[String]) -> Vec<String> {
    enum Mode {
        Add,
        Remove,
    }

    let mut out: Vec<String> = previous.to_vec();
    let items: Vec<&str> = match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return out,
    };

    let mut mode = Mode::Add;
    for item in items {
        match item {
            "=" => {
                out.clear();
                mode = Mode::Add;
            }
            "+" => mode = Mode::Add,
            "-" => mode = Mode::Remove,
            name => match mode {
                Mode::Add => {
                    if !out.iter().any(|n| n == name) {
                        out.push(name.to_owned());
                    }
                }
                Mode::Remove => out.retain(|n| n != name),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_modes() {
        let prev = vec!["a".to_owned(), "b".to_owned()];
        // default is append
        assert_eq!(
            merge_sequence(&json!(["c"]), &prev),
            vec!["a", "b", "c"]
        );
        // replace
        assert_eq!(merge_sequence(&json!(["=", "x"]), &prev), vec!["x"]);
        // remove then add
        assert_eq!(
            merge_sequence(&json!(["-", "a", "+", "c"]), &prev),
            vec!["b", "c"]
        );
        // scalar shorthand
        assert_eq!(
            merge_sequence(&json!("c"), &prev),
            vec!["a", "b", "c"]
        );
        // duplicates are not re-added
        assert_eq!(merge_sequence(&json!(["b"]), &prev), vec!["a", "b"]);
    }

    #[test]
    fn scalar_helpers_fall_back() {
        let map = json!({"name": "grass", "size": "big", "flag": true});
        let map = map.as_object().unwrap();
        assert_eq!(string_or(map, "name", "tileset", "t", ""), "grass");
        assert_eq!(u32_or(map, "size", "tileset", "t", 8), 8);
        assert!(bool_or(map, "flag", "tileset", "t", false));
        assert_eq!(u32_or(map, "missing", "tileset", "t", 4), 4);
    }
}
