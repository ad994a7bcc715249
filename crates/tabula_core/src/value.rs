//! Cell values exchanged with callers.

use crate::types::ColumnType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds per stored date unit.
const MILLIS_PER_SECOND: i64 = 1000;

/// Rounds a millisecond timestamp down to a whole second.
///
/// Dates are stored with one-second resolution. Rounding is toward negative
/// infinity, so `-1` becomes `-1000`.
#[must_use]
pub fn truncate_date(millis: i64) -> i64 {
    millis
        .div_euclid(MILLIS_PER_SECOND)
        .saturating_mul(MILLIS_PER_SECOND)
}

/// Value stored in a MIXED column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mixed {
    /// Integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Bytes.
    Binary(Vec<u8>),
    /// Timestamp in milliseconds (whole seconds once stored).
    Date(i64),
}

impl Mixed {
    /// Returns the type of the contained value.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::Int(_) => ColumnType::Int,
            Self::Bool(_) => ColumnType::Bool,
            Self::Float(_) => ColumnType::Float,
            Self::Double(_) => ColumnType::Double,
            Self::String(_) => ColumnType::String,
            Self::Binary(_) => ColumnType::Binary,
            Self::Date(_) => ColumnType::Date,
        }
    }

    /// Applies storage normalisation (date truncation).
    pub(crate) fn normalized(self) -> Self {
        match self {
            Self::Date(ms) => Self::Date(truncate_date(ms)),
            other => other,
        }
    }
}

impl Default for Mixed {
    fn default() -> Self {
        Self::Int(0)
    }
}

/// A dynamically typed cell value.
///
/// Subtable cells have no `Value` form; reach them through
/// [`crate::Table::get_subtable`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null cell (nullable column or unset link).
    Null,
    /// Integer.
    Int(i64),
    /// Boolean.
    Bool(bool),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// String.
    String(String),
    /// Bytes.
    Binary(Vec<u8>),
    /// Timestamp in milliseconds.
    Date(i64),
    /// Mixed value.
    Mixed(Mixed),
    /// Target row index of a link.
    Link(usize),
    /// Target row indices of a link list.
    LinkList(Vec<usize>),
}

impl Value {
    /// Returns the column type this value belongs in, or `None` for null.
    #[must_use]
    pub const fn column_type(&self) -> Option<ColumnType> {
        Some(match self {
            Self::Null => return None,
            Self::Int(_) => ColumnType::Int,
            Self::Bool(_) => ColumnType::Bool,
            Self::Float(_) => ColumnType::Float,
            Self::Double(_) => ColumnType::Double,
            Self::String(_) => ColumnType::String,
            Self::Binary(_) => ColumnType::Binary,
            Self::Date(_) => ColumnType::Date,
            Self::Mixed(_) => ColumnType::Mixed,
            Self::Link(_) => ColumnType::Link,
            Self::LinkList(_) => ColumnType::LinkList,
        })
    }

    /// Whether this is [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Self::Date(v) => write!(f, "date({v})"),
            Self::Mixed(m) => write!(f, "mixed({m:?})"),
            Self::Link(v) => write!(f, "-> {v}"),
            Self::LinkList(v) => write!(f, "-> {v:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

impl From<Mixed> for Value {
    fn from(v: Mixed) -> Self {
        Self::Mixed(v)
    }
}
