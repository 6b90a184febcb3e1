//! Session values.
//!
//! Sessions hold a closed set of value kinds so reads never need a dynamic
//! cast: pattern-match or use the typed accessors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<SessionValue>),
    Map(HashMap<String, SessionValue>),
}

impl SessionValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SessionValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as a float; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SessionValue::Float(f) => Some(*f),
            SessionValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SessionValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SessionValue]> {
        match self {
            SessionValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, SessionValue>> {
        match self {
            SessionValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Whether this value, or anything nested in it, is a NaN or infinite
    /// float.
    pub fn has_non_finite(&self) -> bool {
        match self {
            SessionValue::Float(f) => !f.is_finite(),
            SessionValue::List(items) => items.iter().any(SessionValue::has_non_finite),
            SessionValue::Map(map) => map.values().any(SessionValue::has_non_finite),
            _ => false,
        }
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Int(v)
    }
}

impl From<i32> for SessionValue {
    fn from(v: i32) -> Self {
        SessionValue::Int(v.into())
    }
}

impl From<u32> for SessionValue {
    fn from(v: u32) -> Self {
        SessionValue::Int(v.into())
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::String(v.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::String(v)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        SessionValue::Bytes(v)
    }
}

impl From<Vec<SessionValue>> for SessionValue {
    fn from(v: Vec<SessionValue>) -> Self {
        SessionValue::List(v)
    }
}

impl From<HashMap<String, SessionValue>> for SessionValue {
    fn from(v: HashMap<String, SessionValue>) -> Self {
        SessionValue::Map(v)
    }
}

impl<T: Into<SessionValue>> From<Option<T>> for SessionValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SessionValue::Null)
    }
}

impl From<serde_json::Value> for SessionValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => SessionValue::Null,
            Value::Bool(b) => SessionValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SessionValue::Int(i),
                None => SessionValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SessionValue::String(s),
            Value::Array(items) => {
                SessionValue::List(items.into_iter().map(SessionValue::from).collect())
            }
            Value::Object(map) => SessionValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, SessionValue::from(v)))
                    .collect(),
            ),
        }
    }
}
