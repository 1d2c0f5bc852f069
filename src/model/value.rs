//! Attribute and system property values.
//!
//! Catalog attributes are primitives, lists and maps; soft references live
//! here as `"{type_name}:{guid}"` strings inside those containers. System
//! properties add trait-name lists and modification timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// String members of a list value. Anything else yields nothing.
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        let items: &[Value] = match self {
            Value::List(items) => items,
            _ => &[],
        };
        items.iter().filter_map(Value::as_str)
    }

    /// Search terms contributed by this value, in order.
    ///
    /// Nulls, empty strings and maps contribute nothing; lists contribute
    /// their members' terms.
    pub fn push_terms(&self, out: &mut Vec<String>) {
        match self {
            Value::Null | Value::Map(_) => {}
            Value::String(s) => {
                if !s.is_empty() {
                    out.push(s.clone());
                }
            }
            Value::Bool(b) => out.push(b.to_string()),
            Value::Int(i) => out.push(i.to_string()),
            Value::Float(f) => out.push(f.to_string()),
            Value::DateTime(dt) => out.push(dt.to_rfc3339()),
            Value::List(items) => {
                for item in items {
                    item.push_terms(out);
                }
            }
        }
    }
}

// ==================== Conversions ====================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
