//! JSON merge algebra (§4.2): per-key suffix classification, the six merge
//! modes, and mode-aware deep clone.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Strict,
    Auto,
    Replace,
    Cond,
    Prepend,
    Exclude,
}

/// Strips a key's trailing modifier character and returns the mode it
/// selects. Keys with no recognized suffix are `Auto`.
pub fn classify_key(key: &str) -> (MergeMode, &str) {
    let mut chars = key.chars();
    match chars.next_back() {
        Some('=') => (MergeMode::Replace, &key[..key.len() - 1]),
        Some('?') => (MergeMode::Cond, &key[..key.len() - 1]),
        Some('+') => (MergeMode::Prepend, &key[..key.len() - 1]),
        Some('!') => (MergeMode::Exclude, &key[..key.len() - 1]),
        _ => (MergeMode::Auto, key),
    }
}

/// Merges `from` into `to` in place under `mode`.
pub fn merge_json(to: &mut Value, from: &Value, mode: MergeMode) {
    match (to.is_object(), from.is_object(), to.is_array(), from.is_array()) {
        (true, true, _, _) => merge_obj(to.as_object_mut().unwrap(), from.as_object().unwrap(), mode),
        (_, _, true, true) => merge_arr(to, from, mode),
        _ => {
            if !to.is_object() && !to.is_array() {
                if !from.is_null() {
                    *to = clone_under_mode(from, mode);
                }
            }
            // Differing JSON kinds (object vs array, etc.): silent no-op.
        }
    }
}

fn merge_obj(to: &mut Map<String, Value>, from: &Map<String, Value>, outer_mode: MergeMode) {
    for (raw_key, from_value) in from {
        let (mode, name) = if outer_mode == MergeMode::Strict {
            (MergeMode::Strict, raw_key.as_str())
        } else {
            classify_key(raw_key)
        };

        match to.get_mut(name) {
            Some(existing) => merge_json(existing, from_value, mode),
            None => {
                to.insert(name.to_string(), clone_under_mode(from_value, mode));
            }
        }
    }
}

fn merge_arr(to: &mut Value, from: &Value, mode: MergeMode) {
    let to_arr = to.as_array().unwrap().clone();
    let from_arr = from.as_array().unwrap().clone();

    let merged = match mode {
        MergeMode::Replace => from_arr.iter().map(|v| clone_under_mode(v, mode)).collect(),
        MergeMode::Cond => {
            if to_arr.is_empty() {
                from_arr.iter().map(|v| clone_under_mode(v, mode)).collect()
            } else {
                to_arr
            }
        }
        MergeMode::Prepend => {
            let mut out: Vec<Value> = from_arr.iter().map(|v| clone_under_mode(v, mode)).collect();
            out.extend(to_arr);
            out
        }
        MergeMode::Exclude => exclude(&to_arr, &from_arr),
        // Auto and Strict both append.
        _ => {
            let mut out = to_arr;
            out.extend(from_arr.iter().map(|v| clone_under_mode(v, mode)));
            out
        }
    };

    *to = Value::Array(merged);
}

/// Builds a fresh array holding every string in `to` whose value does not
/// appear in `from`. Non-string entries are skipped entirely, matching the
/// original's string-only comparison.
fn exclude(to: &[Value], from: &[Value]) -> Vec<Value> {
    let from_strs: Vec<&str> = from.iter().filter_map(Value::as_str).collect();
    to.iter()
        .filter(|item| match item.as_str() {
            Some(s) => !from_strs.contains(&s),
            None => false,
        })
        .cloned()
        .collect()
}

/// Deep-clones `value` under `mode`. For non-strict modes this is realized
/// by merging from an empty container so nested suffix-bearing keys are
/// rewritten by the same classification rules as a top-level merge.
pub fn clone_under_mode(value: &Value, mode: MergeMode) -> Value {
    match value {
        Value::Object(_) => {
            let mut out = Value::Object(Map::new());
            merge_json(&mut out, value, mode);
            out
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| clone_under_mode(v, mode)).collect())
        }
        other => other.clone(),
    }
}
