//! Untyped variable documents and dotted-path access.
//!
//! Variables are plain JSON documents. Paths like `connector.port` walk
//! nested mappings one segment at a time.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// An empty mapping document.
pub fn empty() -> Value {
    Value::Object(Map::new())
}

/// Look up a dotted path.
///
/// Fails with [`Error::KeyNotFound`] if any segment is missing or any
/// intermediate value is not a mapping.
pub fn get<'a>(doc: &'a Value, path: &str) -> Result<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current
            .as_object()
            .and_then(|map| map.get(segment))
            .ok_or_else(|| Error::key_not_found(path))?;
    }
    Ok(current)
}

/// Look up a dotted path, returning `None` instead of an error.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    get(doc, path).ok()
}

/// Assign `value` at a dotted path.
///
/// Intermediate mappings are created as needed. A non-mapping value sitting
/// where a mapping is required is replaced.
pub fn set(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        current = as_object_mut(current)
            .entry((*segment).to_string())
            .or_insert_with(empty);
    }
    as_object_mut(current).insert((*last).to_string(), value);
}

fn as_object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = empty();
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with a mapping"),
    }
}

/// Deep-merge `overlay` into `base`.
///
/// Mappings merge key by key; any other value in `overlay` replaces the one
/// in `base`.
pub fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Merge a sequence of layers, later layers taking precedence.
pub fn combine<'a>(layers: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut result = empty();
    for layer in layers {
        if layer.is_null() {
            continue;
        }
        merge(&mut result, layer);
    }
    result
}

/// Read a string variable.
pub fn string_var(doc: &Value, path: &str) -> Result<String> {
    match get(doc, path)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(Error::TypeMismatch {
            path: path.to_string(),
            expected: "a string",
        }),
    }
}

/// Read an integer variable. Numeric strings are accepted.
pub fn int_var(doc: &Value, path: &str) -> Result<i64> {
    let mismatch = || Error::TypeMismatch {
        path: path.to_string(),
        expected: "an integer",
    };

    match get(doc, path)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(mismatch),
        Value::String(s) => s.trim().parse().map_err(|_| mismatch()),
        _ => Err(mismatch()),
    }
}

/// Read a boolean variable. `"true"`/`"false"` strings are accepted.
pub fn bool_var(doc: &Value, path: &str) -> Result<bool> {
    match get(doc, path)? {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(Error::TypeMismatch {
            path: path.to_string(),
            expected: "a boolean",
        }),
    }
}

/// Read a list of strings.
///
/// Accepts an array of strings, a string holding a JSON array, or a single
/// string (returned as a one-element list).
pub fn string_slice_var(doc: &Value, path: &str) -> Result<Vec<String>> {
    let mismatch = || Error::TypeMismatch {
        path: path.to_string(),
        expected: "a list of strings",
    };

    match get(doc, path)? {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(mismatch))
            .collect(),
        Value::String(s) => match serde_json::from_str::<Vec<String>>(s) {
            Ok(list) => Ok(list),
            Err(_) => Ok(vec![s.clone()]),
        },
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested() {
        let doc = json!({"a": {"b": {"c": 1}}});
        assert_eq!(get(&doc, "a.b.c").unwrap(), &json!(1));
        assert_eq!(get(&doc, "a.b").unwrap(), &json!({"c": 1}));
    }

    #[test]
    fn test_get_missing_segment() {
        let doc = json!({"a": {"b": 1}});
        assert!(matches!(get(&doc, "a.x"), Err(Error::KeyNotFound { .. })));
        // intermediate value is not a mapping
        assert!(matches!(get(&doc, "a.b.c"), Err(Error::KeyNotFound { .. })));
    }

    #[test]
    fn test_set_creates_intermediate_mappings() {
        let mut doc = empty();
        set(&mut doc, "a.b.c", json!("v"));
        assert_eq!(doc, json!({"a": {"b": {"c": "v"}}}));
    }

    #[test]
    fn test_set_replaces_scalar_in_the_way() {
        let mut doc = json!({"a": 5});
        set(&mut doc, "a.b", json!(true));
        assert_eq!(doc, json!({"a": {"b": true}}));
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let paths = ["x", "x.y", "deep.er.than.that", "k8s.version"];
        let values = [json!(null), json!(1), json!("s"), json!([1, 2]), json!({"n": {}})];
        for path in paths {
            for value in &values {
                let mut doc = empty();
                set(&mut doc, path, value.clone());
                assert_eq!(get(&doc, path).unwrap(), value, "path {path}");
            }
        }
    }

    #[test]
    fn test_set_on_non_object_root() {
        let mut doc = json!("scalar");
        set(&mut doc, "a", json!(1));
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_merge_is_deep() {
        let mut base = json!({"connector": {"user": "root", "port": 22}, "keep": 1});
        merge(&mut base, &json!({"connector": {"port": 2222}, "new": true}));
        assert_eq!(
            base,
            json!({"connector": {"user": "root", "port": 2222}, "keep": 1, "new": true})
        );
    }

    #[test]
    fn test_merge_replaces_non_mappings() {
        let mut base = json!({"list": [1, 2]});
        merge(&mut base, &json!({"list": [3]}));
        assert_eq!(base, json!({"list": [3]}));
    }

    #[test]
    fn test_combine_skips_null_layers() {
        let a = json!({"x": 1});
        let b = Value::Null;
        let c = json!({"x": 2});
        assert_eq!(combine([&a, &b, &c]), json!({"x": 2}));
    }

    #[test]
    fn test_int_var_accepts_numeric_strings() {
        let doc = json!({"port": "2222", "n": 3, "f": 4.0, "bad": "abc"});
        assert_eq!(int_var(&doc, "port").unwrap(), 2222);
        assert_eq!(int_var(&doc, "n").unwrap(), 3);
        assert_eq!(int_var(&doc, "f").unwrap(), 4);
        assert!(matches!(int_var(&doc, "bad"), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_string_slice_var_forms() {
        let doc = json!({
            "list": ["a", "b"],
            "encoded": "[\"c\",\"d\"]",
            "single": "e",
            "mixed": ["a", 1]
        });
        assert_eq!(string_slice_var(&doc, "list").unwrap(), vec!["a", "b"]);
        assert_eq!(string_slice_var(&doc, "encoded").unwrap(), vec!["c", "d"]);
        assert_eq!(string_slice_var(&doc, "single").unwrap(), vec!["e"]);
        assert!(string_slice_var(&doc, "mixed").is_err());
    }

    #[test]
    fn test_bool_and_string_vars() {
        let doc = json!({"on": "TRUE", "off": false, "name": "node1"});
        assert!(bool_var(&doc, "on").unwrap());
        assert!(!bool_var(&doc, "off").unwrap());
        assert_eq!(string_var(&doc, "name").unwrap(), "node1");
        assert!(string_var(&doc, "on.x").is_err());
    }
}
