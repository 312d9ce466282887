//! Variable values and the lexically-scoped proto-map environment they live
//! in (§3 "Variable value", §4.1 "proto-map").

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::hashmap::HashMap as OpenMap;

/// A variable's resolved value. Strings, integers and booleans are the only
/// shapes `variables` blocks and condition evaluation ever produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
        }
    }

    /// Converts a JSON scalar from a `variables` block into a `Value`.
    /// Objects and arrays are not valid variable values.
    pub fn from_json(json: &Json) -> Result<Value> {
        match json {
            Json::String(s) => Ok(Value::Str(s.clone())),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| Error::gyp(format!("variable value {n} is not an integer"))),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(Error::gyp(format!(
                "variable value must be string, int or bool, got {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A lexically-scoped variable environment. Writes go to `map` only; reads
/// walk `parent` on miss. The project environment is the parent of every
/// target environment defined within it.
pub struct ProtoMap {
    map: OpenMap<Value>,
    parent: Option<Rc<RefCell<ProtoMap>>>,
}

impl ProtoMap {
    pub fn root() -> Rc<RefCell<ProtoMap>> {
        Rc::new(RefCell::new(ProtoMap {
            map: OpenMap::new(16),
            parent: None,
        }))
    }

    pub fn child(parent: &Rc<RefCell<ProtoMap>>) -> Rc<RefCell<ProtoMap>> {
        Rc::new(RefCell::new(ProtoMap {
            map: OpenMap::new(16),
            parent: Some(Rc::clone(parent)),
        }))
    }

    pub fn define(&mut self, name: &str, value: Value) {
        self.map.insert(name, value);
    }

    pub fn contains_local_or_ancestor(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Innermost match wins; the parent chain is consulted only on miss.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.map.get(name) {
            return Some(v.clone());
        }
        self.parent
            .as_ref()
            .and_then(|p| p.borrow().lookup(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_lookup_falls_back_to_parent() {
        let root = ProtoMap::root();
        root.borrow_mut().define("os", Value::Str("linux".into()));
        let child = ProtoMap::child(&root);
        child.borrow_mut().define("name", Value::Str("util".into()));

        assert_eq!(
            child.borrow().lookup("os"),
            Some(Value::Str("linux".into()))
        );
        assert_eq!(
            child.borrow().lookup("name"),
            Some(Value::Str("util".into()))
        );
        assert_eq!(root.borrow().lookup("name"), None);
    }

    #[test]
    fn child_write_never_touches_parent() {
        let root = ProtoMap::root();
        let child = ProtoMap::child(&root);
        child.borrow_mut().define("x", Value::Int(1));
        assert_eq!(root.borrow().lookup("x"), None);
    }

    #[test]
    fn inner_definition_shadows_outer() {
        let root = ProtoMap::root();
        root.borrow_mut().define("x", Value::Int(1));
        let child = ProtoMap::child(&root);
        child.borrow_mut().define("x", Value::Int(2));
        assert_eq!(child.borrow().lookup("x"), Some(Value::Int(2)));
        assert_eq!(root.borrow().lookup("x"), Some(Value::Int(1)));
    }

    #[test]
    fn value_from_json_rejects_objects() {
        let j = serde_json::json!({"a": 1});
        assert!(Value::from_json(&j).is_err());
    }
}
