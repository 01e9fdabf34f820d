//! Scalar values stored in columns.

use crate::error::{DataError, DataResult};
use ep_core::{Compare, Type, compare_values};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single present (non-null) value. Absent values are `None` in a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// UTF-8 string
    Str(String),
}

impl Value {
    /// The column type this value belongs to
    #[must_use]
    pub const fn ty(&self) -> Type {
        match self {
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Integer,
            Self::Str(_) => Type::Str,
        }
    }

    /// Convert a JSON scalar; `null` maps to an absent value.
    ///
    /// # Errors
    ///
    /// Returns error for arrays, objects and non-integer numbers
    pub fn from_json(json: &serde_json::Value) -> DataResult<Option<Self>> {
        match json {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Bool(b) => Ok(Some(Self::Bool(*b))),
            serde_json::Value::String(s) => Ok(Some(Self::Str(s.clone()))),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(|i| Some(Self::Int(i)))
                .ok_or_else(|| DataError::Unsupported(n.to_string())),
            other => Err(DataError::Unsupported(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Compare two possibly-absent values of the same type.
///
/// # Errors
///
/// Returns error when both values are present but of different types
pub fn compare_opt(left: Option<&Value>, right: Option<&Value>) -> DataResult<Compare> {
    match (left, right) {
        (Some(Value::Int(l)), Some(Value::Int(r))) => Ok(compare_values(Some(l), Some(r))),
        (Some(Value::Str(l)), Some(Value::Str(r))) => Ok(compare_values(Some(l), Some(r))),
        (Some(Value::Bool(l)), Some(Value::Bool(r))) => Ok(compare_values(Some(l), Some(r))),
        (Some(l), Some(r)) => Err(DataError::TypeMismatch {
            expected: l.ty(),
            actual: r.ty(),
        }),
        (None, None) => Ok(Compare::BothNulls),
        _ => Ok(Compare::Null),
    }
}
