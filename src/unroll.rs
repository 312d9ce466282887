//! Variable unrolling (§4.4): substitutes `<(name)` tokens inside strings
//! and walks JSON trees replacing every string leaf with its unrolled form.
//!
//! The reference implementation does this in two passes (calc-size, then
//! write) because it operates on raw C buffers. Building a `String` lets
//! this be a single forward pass over the source bytes instead.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::value::{ProtoMap, Value};

#[derive(PartialEq)]
enum State {
    Scanning,
    SawLt,
    InName,
}

/// Replaces every `<(name)` token in `s` with its resolved value from `env`
/// (or an ancestor). A lone `<` not followed by `(` is copied literally.
pub fn unroll_str(env: &Rc<RefCell<ProtoMap>>, s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut state = State::Scanning;
    let mut name = String::new();

    for ch in s.chars() {
        match state {
            State::Scanning => {
                if ch == '<' {
                    state = State::SawLt;
                } else {
                    out.push(ch);
                }
            }
            State::SawLt => {
                if ch == '(' {
                    state = State::InName;
                    name.clear();
                } else {
                    out.push('<');
                    out.push(ch);
                    state = State::Scanning;
                }
            }
            State::InName => {
                if ch == ')' {
                    let value = env.borrow().lookup(&name).ok_or_else(|| {
                        Error::gyp(format!("undefined variable referenced in unroll: {name}"))
                    })?;
                    out.push_str(&value.to_string());
                    state = State::Scanning;
                } else {
                    name.push(ch);
                }
            }
        }
    }

    if state != State::Scanning {
        return Err(Error::gyp(format!(
            "unterminated <( token in string: {s}"
        )));
    }

    Ok(out)
}

/// Unrolls a variable value: strings are substituted, int/bool values pass
/// through unchanged (they cannot contain interpolation tokens).
pub fn unroll_value(env: &Rc<RefCell<ProtoMap>>, value: &Value) -> Result<Value> {
    match value {
        Value::Str(s) => Ok(Value::Str(unroll_str(env, s)?)),
        other => Ok(other.clone()),
    }
}

/// Walks a JSON tree, unrolling every string leaf. Arrays are traversed
/// element-wise and objects are unrolled key by key (both branches actually
/// execute here, unlike the array branch in the reference source).
pub fn unroll_json(env: &Rc<RefCell<ProtoMap>>, value: &mut Json) -> Result<()> {
    match value {
        Json::String(s) => {
            *s = unroll_str(env, s)?;
        }
        Json::Array(items) => {
            for item in items {
                unroll_json(env, item)?;
            }
        }
        Json::Object(map) => {
            for (_, v) in map.iter_mut() {
                unroll_json(env, v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Unrolls a single object key's value in place.
pub fn unroll_json_key(env: &Rc<RefCell<ProtoMap>>, obj: &mut serde_json::Map<String, Json>, key: &str) -> Result<()> {
    if let Some(v) = obj.get_mut(key) {
        unroll_json(env, v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_with(pairs: &[(&str, Value)]) -> Rc<RefCell<ProtoMap>> {
        let env = ProtoMap::root();
        for (k, v) in pairs {
            env.borrow_mut().define(k, v.clone());
        }
        env
    }

    #[test]
    fn substitutes_single_token() {
        let env = env_with(&[("name", Value::Str("build".into()))]);
        let out = unroll_str(&env, "<(name)/x.c").unwrap();
        assert_eq!(out, "build/x.c");
    }

    #[test]
    fn literal_lt_without_paren_is_preserved() {
        let env = env_with(&[]);
        let out = unroll_str(&env, "a < b").unwrap();
        assert_eq!(out, "a < b");
    }

    #[test]
    fn undefined_variable_is_error() {
        let env = env_with(&[]);
        assert!(unroll_str(&env, "<(missing)").is_err());
    }

    #[test]
    fn falls_back_to_parent_environment() {
        let root = ProtoMap::root();
        root.borrow_mut().define("os", Value::Str("linux".into()));
        let child = ProtoMap::child(&root);
        let out = unroll_str(&child, "<(os)").unwrap();
        assert_eq!(out, "linux");
    }

    #[test]
    fn no_tokens_left_after_unroll() {
        let env = env_with(&[("a", Value::Str("1".into())), ("b", Value::Str("2".into()))]);
        let out = unroll_str(&env, "<(a)-<(b)").unwrap();
        assert!(!out.contains("<("));
    }

    #[test]
    fn unroll_json_traverses_arrays_element_wise() {
        let env = env_with(&[("name", Value::Str("util".into()))]);
        let mut tree = json!(["<(name)/a.c", "<(name)/b.c"]);
        unroll_json(&env, &mut tree).unwrap();
        assert_eq!(tree, json!(["util/a.c", "util/b.c"]));
    }

    #[test]
    fn unroll_json_traverses_nested_objects_and_arrays() {
        let env = env_with(&[("name", Value::Str("util".into()))]);
        let mut tree = json!({"sources": ["<(name)/a.c"], "nested": {"x": "<(name)"}});
        unroll_json(&env, &mut tree).unwrap();
        assert_eq!(
            tree,
            json!({"sources": ["util/a.c"], "nested": {"x": "util"}})
        );
    }
}
