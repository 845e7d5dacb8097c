// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered-key extraction over loosely shaped JSON.
//!
//! Remote systems name the same datum differently from tenant to tenant
//! (`contactKey` vs `Key` vs `id`, `data` vs `value`). Every extraction goes
//! through these helpers with an explicit, ordered candidate list.

use serde_json::{Map, Value};

/// Containers that commonly wrap a list of records.
pub const ROW_CONTAINERS: &[&str] = &["data", "value", "Value", "items", "Items", "results"];

/// Return the first candidate key holding a non-null, non-empty value.
pub fn first_present<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

/// Like [`first_present`], rendering strings, numbers, and booleans as text.
pub fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| map.get(*k)).find_map(scalar_text)
}

/// Text form of a scalar value; `None` for null, empty strings, and containers.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Extract the records carried by a response body.
///
/// Accepts a bare array, an object wrapping an array under one of
/// [`ROW_CONTAINERS`], or a single object that is itself a record. Non-object
/// array elements are skipped.
pub fn rows(body: &Value) -> Vec<&Map<String, Value>> {
    match body {
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        Value::Object(map) => {
            for key in ROW_CONTAINERS {
                match map.get(*key) {
                    Some(Value::Array(items)) => {
                        return items.iter().filter_map(Value::as_object).collect();
                    }
                    Some(Value::Object(inner)) => return vec![inner],
                    _ => {}
                }
            }
            if map.is_empty() || is_envelope_only(map) {
                Vec::new()
            } else {
                vec![map]
            }
        }
        _ => Vec::new(),
    }
}

/// Objects carrying only paging metadata (`@odata.context`, counts) are not records.
fn is_envelope_only(map: &Map<String, Value>) -> bool {
    map.keys()
        .all(|k| k.starts_with('@') || k.starts_with("odata.") || k == "count" || k == "total")
}
