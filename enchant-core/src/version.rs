//! Version token identifying the shape of persisted data

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Reserved storage key holding the last-synced version token.
///
/// Distinct from any user-chosen `store_name`; config validation rejects
/// rules that try to use it.
pub const VERSION_KEY: &str = "&_cacheVersion_$";

/// A scalar version token compared by strict equality.
///
/// No cross-type coercion: `1` and `"1"` are different versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionToken {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl VersionToken {
    /// Build a token from a JSON scalar. Null and compound values are not tokens.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// The JSON form written under [`VERSION_KEY`].
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
        }
    }

    /// Strict equality against a stored value. Absent never matches.
    pub fn matches(&self, stored: Option<&Value>) -> bool {
        match (self, stored) {
            (Self::Bool(a), Some(Value::Bool(b))) => a == b,
            (Self::Text(a), Some(Value::String(b))) => a == b,
            (Self::Number(a), Some(Value::Number(b))) => numbers_equal(a, b),
            _ => false,
        }
    }
}

/// `1` and `1.0` are the same number once decoded from storage.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if a.is_f64() || b.is_f64() {
        match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    } else {
        a == b
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for VersionToken {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for VersionToken {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for VersionToken {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<i32> for VersionToken {
    fn from(value: i32) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for VersionToken {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
