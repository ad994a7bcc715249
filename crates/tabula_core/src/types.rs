//! Core identifier and enumeration types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic commit counter identifying one committed state of a file.
///
/// Every successful commit produces a version strictly greater than the
/// previous one. A read transaction is pinned to exactly one version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// The version of a freshly created, empty file.
    pub const INITIAL: Self = Self(0);

    /// Creates a version from a raw value.
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the version after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Stable identity of a top-level table.
///
/// Keys survive renames and are never reused within a file, so handles and
/// link columns refer to tables by key rather than by position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TableKey(u32);

impl TableKey {
    /// Creates a key from a raw value.
    #[must_use]
    pub const fn new(k: u32) -> Self {
        Self(k)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit signed integer.
    Int,
    /// Boolean.
    Bool,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Byte string.
    Binary,
    /// Timestamp in milliseconds, stored with one-second resolution.
    Date,
    /// Value of any primitive type.
    Mixed,
    /// Optional reference to a row of another table.
    Link,
    /// Ordered list of references to rows of another table.
    LinkList,
    /// Nested table per row.
    Table,
}

impl ColumnType {
    /// Whether the column refers to rows of a target table.
    #[must_use]
    pub const fn is_link(self) -> bool {
        matches!(self, Self::Link | Self::LinkList)
    }

    /// Whether a cell of this type can be null.
    ///
    /// Link cells can always be null; lists, mixed values and subtables
    /// never can. Other types are nullable when the column says so.
    #[must_use]
    pub const fn supports_null(self) -> bool {
        !matches!(self, Self::LinkList | Self::Mixed | Self::Table)
    }

    /// Whether rows can be ordered by this column.
    #[must_use]
    pub const fn is_sortable(self) -> bool {
        matches!(
            self,
            Self::Int | Self::Bool | Self::Float | Self::Double | Self::String | Self::Date
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Date => "date",
            Self::Mixed => "mixed",
            Self::Link => "link",
            Self::LinkList => "linklist",
            Self::Table => "table",
        };
        f.write_str(name)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Smallest first; nulls before everything else.
    #[default]
    Ascending,
    /// Largest first; nulls last.
    Descending,
}

/// Case sensitivity of string predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Case {
    /// Exact byte comparison.
    #[default]
    Sensitive,
    /// Unicode lowercase comparison.
    Insensitive,
}

/// Phase of a session's transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction open.
    Idle,
    /// Explicit read transaction.
    ReadActive,
    /// Explicit write transaction.
    WriteActive,
    /// Long-lived read transaction that can advance and promote.
    ImplicitReadActive,
    /// Implicit read promoted to a write.
    ImplicitWriteActive,
}

impl TransactionState {
    /// Whether a transaction of any kind is open.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Whether mutations are allowed.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::WriteActive | Self::ImplicitWriteActive)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ReadActive => "read",
            Self::WriteActive => "write",
            Self::ImplicitReadActive => "implicit read",
            Self::ImplicitWriteActive => "implicit write",
        };
        f.write_str(name)
    }
}
