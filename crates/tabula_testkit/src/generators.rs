//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random cell values, row edits,
//! link-list edits and transaction call sequences.

use proptest::prelude::*;
use tabula_core::{truncate_date, ColumnType, Mixed, Value};

/// Strategy for the column types that hold plain values.
pub fn scalar_type_strategy() -> impl Strategy<Value = ColumnType> {
    prop_oneof![
        Just(ColumnType::Int),
        Just(ColumnType::Bool),
        Just(ColumnType::Float),
        Just(ColumnType::Double),
        Just(ColumnType::String),
        Just(ColumnType::Binary),
        Just(ColumnType::Date),
        Just(ColumnType::Mixed),
    ]
}

/// Strategy for millisecond timestamps, including negative ones.
pub fn date_strategy() -> impl Strategy<Value = i64> {
    -4_102_444_800_000i64..4_102_444_800_000i64
}

/// Strategy for table and column names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for a [`Mixed`] value. Floats are finite.
pub fn mixed_strategy() -> impl Strategy<Value = Mixed> {
    prop_oneof![
        any::<i64>().prop_map(Mixed::Int),
        any::<bool>().prop_map(Mixed::Bool),
        (-1.0e6f32..1.0e6f32).prop_map(Mixed::Float),
        (-1.0e12f64..1.0e12f64).prop_map(Mixed::Double),
        ".{0,32}".prop_map(Mixed::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Mixed::Binary),
        date_strategy().prop_map(Mixed::Date),
    ]
}

/// Strategy for a non-null value of `ty`. Floats are finite.
///
/// # Panics
///
/// Panics for link and subtable types, which have no standalone value.
pub fn value_strategy(ty: ColumnType) -> BoxedStrategy<Value> {
    match ty {
        ColumnType::Int => any::<i64>().prop_map(Value::Int).boxed(),
        ColumnType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ColumnType::Float => (-1.0e6f32..1.0e6f32).prop_map(Value::Float).boxed(),
        ColumnType::Double => (-1.0e12f64..1.0e12f64).prop_map(Value::Double).boxed(),
        ColumnType::String => ".{0,32}".prop_map(Value::String).boxed(),
        ColumnType::Binary => prop::collection::vec(any::<u8>(), 0..64)
            .prop_map(Value::Binary)
            .boxed(),
        ColumnType::Date => date_strategy().prop_map(Value::Date).boxed(),
        ColumnType::Mixed => mixed_strategy().prop_map(Value::Mixed).boxed(),
        other => panic!("no value strategy for {other} columns"),
    }
}

/// Strategy for a column type paired with a value of that type.
pub fn typed_value_strategy() -> impl Strategy<Value = (ColumnType, Value)> {
    scalar_type_strategy().prop_flat_map(|ty| (Just(ty), value_strategy(ty)))
}

/// The value a cell returns after `value` was stored in it.
///
/// Dates come back rounded down to whole seconds; everything else is
/// returned unchanged.
pub fn stored_form(value: &Value) -> Value {
    match value {
        Value::Date(ms) => Value::Date(truncate_date(*ms)),
        Value::Mixed(Mixed::Date(ms)) => Value::Mixed(Mixed::Date(truncate_date(*ms))),
        other => other.clone(),
    }
}

/// An edit of the rows of a single-integer-column table.
///
/// Positions are reduced modulo the current row count when applied, so
/// every generated op is applicable to a non-empty table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOp {
    /// Append a row holding the value.
    Append(i64),
    /// Insert a row holding the value before the position.
    Insert(usize, i64),
    /// Remove the row at the position, shifting later rows down.
    Remove(usize),
    /// Replace the row at the position with the last row.
    MoveLastOver(usize),
    /// Overwrite the value at the position.
    Set(usize, i64),
}

/// Strategy for row edits.
pub fn row_op_strategy() -> impl Strategy<Value = RowOp> {
    prop_oneof![
        3 => any::<i64>().prop_map(RowOp::Append),
        2 => (any::<usize>(), any::<i64>()).prop_map(|(p, v)| RowOp::Insert(p, v)),
        2 => any::<usize>().prop_map(RowOp::Remove),
        1 => any::<usize>().prop_map(RowOp::MoveLastOver),
        2 => (any::<usize>(), any::<i64>()).prop_map(|(p, v)| RowOp::Set(p, v)),
    ]
}

/// An edit of one link list.
///
/// Positions and targets are reduced modulo the list length and the target
/// table size when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    /// Append a link to the target row.
    Add(usize),
    /// Insert a link before the position.
    Insert(usize, usize),
    /// Point the link at the position to another target.
    Set(usize, usize),
    /// Move the link at `from` so that it ends up at `to`.
    Move(usize, usize),
    /// Remove the link at the position.
    Remove(usize),
}

/// Strategy for link-list edits.
pub fn link_op_strategy() -> impl Strategy<Value = LinkOp> {
    prop_oneof![
        3 => any::<usize>().prop_map(LinkOp::Add),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(p, t)| LinkOp::Insert(p, t)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(p, t)| LinkOp::Set(p, t)),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(f, t)| LinkOp::Move(f, t)),
        1 => any::<usize>().prop_map(LinkOp::Remove),
    ]
}

/// A call on the transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnCall {
    /// `begin_read`
    BeginRead,
    /// `begin_write`
    BeginWrite,
    /// `end_read`
    EndRead,
    /// `commit`
    Commit,
    /// `rollback`
    Rollback,
    /// `begin_implicit_transaction`
    BeginImplicit,
    /// `advance_read`
    AdvanceRead,
    /// `promote_to_write`
    PromoteToWrite,
    /// `commit_and_continue_as_read`
    CommitAndContinue,
    /// `rollback_and_continue_as_read`
    RollbackAndContinue,
}

/// Strategy for state machine calls.
pub fn txn_call_strategy() -> impl Strategy<Value = TxnCall> {
    prop_oneof![
        Just(TxnCall::BeginRead),
        Just(TxnCall::BeginWrite),
        Just(TxnCall::EndRead),
        Just(TxnCall::Commit),
        Just(TxnCall::Rollback),
        Just(TxnCall::BeginImplicit),
        Just(TxnCall::AdvanceRead),
        Just(TxnCall::PromoteToWrite),
        Just(TxnCall::CommitAndContinue),
        Just(TxnCall::RollbackAndContinue),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
