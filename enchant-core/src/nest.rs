//! JSON shape helpers used when persisting and restoring values.

use serde_json::{Map, Value};

/// Wrap `value` so it sits at `path`.
///
/// `["user", "profile"]` and `v` give `{"user": {"profile": v}}`.
/// An empty path returns the value unchanged.
pub fn nest_by_path(path: &[String], value: Value) -> Value {
    path.iter().rev().fold(value, |inner, segment| {
        let mut map = Map::with_capacity(1);
        map.insert(segment.clone(), inner);
        Value::Object(map)
    })
}

/// Single field projection. Missing fields and non-object values give `Null`.
pub fn project_field(value: &Value, field: &str) -> Value {
    value.get(field).cloned().unwrap_or(Value::Null)
}
