//! Stored cell representation.

use super::table::{ColumnSpec, TableData};
use crate::error::{CoreError, CoreResult};
use crate::types::ColumnType;
use crate::value::{truncate_date, Mixed, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One stored cell. Dates are already truncated to whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Cell {
    Null,
    Int(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Date(i64),
    Mixed(Mixed),
    Link(usize),
    LinkList(Vec<usize>),
    Table(TableData),
}

impl Cell {
    /// Initial value of a new cell in a column.
    pub(crate) fn default_for(spec: &ColumnSpec) -> Self {
        if spec.nullable || spec.column_type == ColumnType::Link {
            return Self::Null;
        }
        match spec.column_type {
            ColumnType::Int => Self::Int(0),
            ColumnType::Bool => Self::Bool(false),
            ColumnType::Float => Self::Float(0.0),
            ColumnType::Double => Self::Double(0.0),
            ColumnType::String => Self::String(String::new()),
            ColumnType::Binary => Self::Binary(Vec::new()),
            ColumnType::Date => Self::Date(0),
            ColumnType::Mixed => Self::Mixed(Mixed::default()),
            ColumnType::Link => Self::Null,
            ColumnType::LinkList => Self::LinkList(Vec::new()),
            ColumnType::Table => Self::Table(TableData::with_columns(&spec.subcolumns)),
        }
    }

    /// Converts a caller value into a cell for column `column`.
    ///
    /// Checks the value type and nullability and applies date truncation.
    pub(crate) fn from_value(value: Value, spec: &ColumnSpec, column: usize) -> CoreResult<Self> {
        let expected = spec.column_type;
        let cell = match value {
            Value::Null => {
                if !(spec.nullable || expected == ColumnType::Link) {
                    return Err(CoreError::NullNotAllowed { column });
                }
                Self::Null
            }
            Value::Int(v) if expected == ColumnType::Int => Self::Int(v),
            Value::Bool(v) if expected == ColumnType::Bool => Self::Bool(v),
            Value::Float(v) if expected == ColumnType::Float => Self::Float(v),
            Value::Double(v) if expected == ColumnType::Double => Self::Double(v),
            Value::String(v) if expected == ColumnType::String => Self::String(v),
            Value::Binary(v) if expected == ColumnType::Binary => Self::Binary(v),
            Value::Date(v) if expected == ColumnType::Date => Self::Date(truncate_date(v)),
            Value::Mixed(v) if expected == ColumnType::Mixed => Self::Mixed(v.normalized()),
            Value::Link(v) if expected == ColumnType::Link => Self::Link(v),
            Value::LinkList(v) if expected == ColumnType::LinkList => Self::LinkList(v),
            other => {
                return Err(CoreError::TypeMismatch {
                    column,
                    expected: other.column_type().unwrap_or(expected),
                    actual: expected,
                });
            }
        };
        Ok(cell)
    }

    /// Converts back to a caller value. Subtables have no value form.
    pub(crate) fn to_value(&self) -> Option<Value> {
        Some(match self {
            Self::Null => Value::Null,
            Self::Int(v) => Value::Int(*v),
            Self::Bool(v) => Value::Bool(*v),
            Self::Float(v) => Value::Float(*v),
            Self::Double(v) => Value::Double(*v),
            Self::String(v) => Value::String(v.clone()),
            Self::Binary(v) => Value::Binary(v.clone()),
            Self::Date(v) => Value::Date(*v),
            Self::Mixed(v) => Value::Mixed(v.clone()),
            Self::Link(v) => Value::Link(*v),
            Self::LinkList(v) => Value::LinkList(v.clone()),
            Self::Table(_) => return None,
        })
    }

    pub(crate) const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Ordering used by sorting and range predicates.
    ///
    /// Null sorts first. Cells of different kinds compare equal, which only
    /// happens for null against a value and is handled above.
    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Int(a), Self::Int(b)) | (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Binary(a), Self::Binary(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// Whether two cells hold the same value, with null equal only to null.
    pub(crate) fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            _ => self == other,
        }
    }
}
