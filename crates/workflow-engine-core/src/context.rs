//! # Execution Context
//!
//! [`ExecutionContext`] is the hierarchical key-value store threaded through a workflow
//! run: every effector reads its inputs from it and the executor writes each node's
//! outputs back into it under that node's own namespace once the node completes.
//!
//! Addressing is by dotted path over nested maps and ordered, integer-indexed sequences
//! (e.g. `"user.details.0.name"`). Per the contract in spec §4.B, `get`/`remove` never
//! fail — a missing or type-mismatched path segment simply yields `null` — and `put`
//! always succeeds, creating whatever intermediate maps or lists the path implies.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A hierarchical, dotted-path-addressable store of JSON values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    data: Value,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            data: Value::Object(Map::new()),
        }
    }

    /// Deep-copy constructor. `serde_json::Value::clone` is already a fully
    /// independent deep copy (no shared interior pointers), so this is a
    /// thin, intention-revealing wrapper used at workflow-instance fan-out
    /// boundaries where independence must be guaranteed by construction.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Returns the value at `path`, or `Value::Null` if any segment is
    /// missing or the wrong container type to continue descending. Never
    /// fails.
    pub fn get(&self, path: &str) -> Value {
        Self::get_ref(&self.data, path).cloned().unwrap_or(Value::Null)
    }

    /// Like [`Self::get`], but returns `default` in place of `Value::Null`
    /// when the path is absent or itself resolves to `null`.
    pub fn get_or_default(&self, path: &str, default: Value) -> Value {
        match self.get(path) {
            Value::Null => default,
            other => other,
        }
    }

    /// Writes `value` at `path`, creating any missing intermediate maps or
    /// lists. A segment that exists as a non-collection value is overwritten
    /// by a fresh container of the type the next segment implies: integer
    /// segments require a list (padded with `null` up to the index),
    /// non-integer segments require a map.
    pub fn put(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::put_recursive(&mut self.data, &segments, value);
    }

    /// Merges every entry of `values` into the context via [`Self::put`].
    pub fn put_all(&mut self, values: BTreeMap<String, Value>) {
        for (path, value) in values {
            self.put(&path, value);
        }
    }

    /// Removes and returns the value at `path`, or `Value::Null` if absent.
    /// Removing an array element shifts subsequent indices down.
    pub fn remove(&mut self, path: &str) -> Value {
        let segments: Vec<&str> = path.split('.').collect();
        Self::remove_recursive(&mut self.data, &segments).unwrap_or(Value::Null)
    }

    /// The top-level (root) keys currently present.
    pub fn keys(&self) -> Vec<String> {
        match &self.data {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// The raw backing value, for serialization at observability boundaries.
    pub fn as_value(&self) -> &Value {
        &self.data
    }

    fn get_ref<'a>(current: &'a Value, path: &str) -> Option<&'a Value> {
        let mut node = current;
        for segment in path.split('.') {
            node = Self::descend_get(node, segment)?;
        }
        Some(node)
    }

    fn descend_get<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
        match current {
            Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
            Value::Object(map) => map.get(segment),
            _ => None,
        }
    }

    fn put_recursive(current: &mut Value, segments: &[&str], value: Value) {
        let segment = segments[0];
        let index: Option<usize> = segment.parse().ok();
        let rest = &segments[1..];

        if let Some(idx) = index {
            if !matches!(current, Value::Array(_)) {
                *current = Value::Array(Vec::new());
            }
            let arr = match current {
                Value::Array(arr) => arr,
                _ => unreachable!(),
            };
            if arr.len() <= idx {
                arr.resize(idx + 1, Value::Null);
            }
            if rest.is_empty() {
                arr[idx] = value;
            } else {
                Self::put_recursive(&mut arr[idx], rest, value);
            }
        } else {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(Map::new());
            }
            let map = match current {
                Value::Object(map) => map,
                _ => unreachable!(),
            };
            if rest.is_empty() {
                map.insert(segment.to_string(), value);
            } else {
                let entry = map.entry(segment.to_string()).or_insert(Value::Null);
                Self::put_recursive(entry, rest, value);
            }
        }
    }

    fn remove_recursive(current: &mut Value, segments: &[&str]) -> Option<Value> {
        let segment = segments[0];
        let rest = &segments[1..];
        if rest.is_empty() {
            return match current {
                Value::Object(map) => map.remove(segment),
                Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| {
                    if i < arr.len() {
                        Some(arr.remove(i))
                    } else {
                        None
                    }
                }),
                _ => None,
            };
        }
        match current {
            Value::Object(map) => map.get_mut(segment).and_then(|child| Self::remove_recursive(child, rest)),
            Value::Array(arr) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| arr.get_mut(i))
                .and_then(|child| Self::remove_recursive(child, rest)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let mut ctx = ExecutionContext::new();
        ctx.put("user.name", json!("ada"));
        assert_eq!(ctx.get("user.name"), json!("ada"));
    }

    #[test]
    fn get_on_missing_path_returns_null_rather_than_failing() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.get("a.b.c"), Value::Null);
    }

    #[test]
    fn put_auto_creates_intermediate_maps() {
        let mut ctx = ExecutionContext::new();
        ctx.put("a.b.c", json!(1));
        assert_eq!(ctx.get("a.b.c"), json!(1));
        assert_eq!(ctx.get("a.b"), json!({"c": 1}));
    }

    #[test]
    fn put_promotes_integer_segment_to_list_padding_with_null() {
        let mut ctx = ExecutionContext::new();
        ctx.put("items.2", json!("third"));
        assert_eq!(ctx.get("items"), json!([null, null, "third"]));
    }

    #[test]
    fn put_overwrites_scalar_with_fresh_map_when_descending() {
        let mut ctx = ExecutionContext::new();
        ctx.put("a", json!("scalar"));
        ctx.put("a.b", json!(1));
        assert_eq!(ctx.get("a.b"), json!(1));
    }

    #[test]
    fn root_level_empty_string_is_a_literal_key() {
        let mut ctx = ExecutionContext::new();
        ctx.put("", json!("root-value"));
        assert_eq!(ctx.get(""), json!("root-value"));
        assert!(ctx.keys().contains(&"".to_string()));
    }

    #[test]
    fn get_or_default_falls_back_on_null_or_missing() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.get_or_default("missing", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn put_all_merges_every_entry() {
        let mut ctx = ExecutionContext::new();
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), json!(1));
        values.insert("b.c".to_string(), json!(2));
        ctx.put_all(values);
        assert_eq!(ctx.get("a"), json!(1));
        assert_eq!(ctx.get("b.c"), json!(2));
    }

    #[test]
    fn remove_returns_removed_value_and_shifts_array_indices() {
        let mut ctx = ExecutionContext::new();
        ctx.put("items.0", json!("a"));
        ctx.put("items.1", json!("b"));
        let removed = ctx.remove("items.0");
        assert_eq!(removed, json!("a"));
        assert_eq!(ctx.get("items.0"), json!("b"));
    }

    #[test]
    fn remove_on_missing_path_returns_null() {
        let mut ctx = ExecutionContext::new();
        assert_eq!(ctx.remove("nope"), Value::Null);
    }

    #[test]
    fn deep_copy_is_independent_of_the_original() {
        let mut ctx = ExecutionContext::new();
        ctx.put("a", json!(1));
        let mut copy = ctx.deep_copy();
        copy.put("a", json!(2));
        assert_eq!(ctx.get("a"), json!(1));
        assert_eq!(copy.get("a"), json!(2));
    }

    #[test]
    fn keys_lists_only_root_level_keys() {
        let mut ctx = ExecutionContext::new();
        ctx.put("a.b", json!(1));
        ctx.put("c", json!(2));
        let mut keys = ctx.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
    }
}
