//! Row accessor.

use super::{LinkView, Table};
use crate::context::{ArenaTicket, HandleKind};
use crate::error::CoreResult;
use crate::types::ColumnType;
use crate::value::{Mixed, Value};

/// One row of a table.
///
/// Goes stale when a row at or before it is inserted, removed or moved, and
/// when the snapshot moves. Accessors behave like the [`Table`] accessor of
/// the same name applied to [`Row::index`].
///
/// # Errors
///
/// Every accessor fails with `Stale` once the row is stale, on top of the
/// errors of the matching [`Table`] accessor.
pub struct Row {
    table: Table,
    index: usize,
    epoch: u64,
    generation: usize,
    _ticket: ArenaTicket,
}

impl Row {
    pub(crate) fn new(table: Table, index: usize, epoch: u64, generation: usize) -> Self {
        let ticket = table.session().register(HandleKind::Row, epoch);
        Self {
            table,
            index,
            epoch,
            generation,
            _ticket: ticket,
        }
    }

    /// Index of the row, after checking it is still valid.
    fn at(&self) -> CoreResult<usize> {
        self.table.session().read(|s| {
            self.table.check(s)?;
            s.check_epoch(self.epoch)?;
            s.check_rows(self.table.path(), self.generation, Some(self.index))?;
            s.group()?.table(self.table.path())?.check_row(self.index)?;
            Ok(self.index)
        })
    }

    /// Row index in its table.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the row can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.at().is_ok()
    }

    /// The table the row belongs to.
    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of columns.
    pub fn column_count(&self) -> CoreResult<usize> {
        self.at()?;
        self.table.column_count()
    }

    /// Type of a column.
    pub fn column_type(&self, column: usize) -> CoreResult<ColumnType> {
        self.at()?;
        self.table.column_type(column)
    }

    /// Integer in `column`.
    pub fn get_long(&self, column: usize) -> CoreResult<i64> {
        self.table.get_long(column, self.at()?)
    }

    /// Boolean in `column`.
    pub fn get_bool(&self, column: usize) -> CoreResult<bool> {
        self.table.get_bool(column, self.at()?)
    }

    /// Float in `column`.
    pub fn get_float(&self, column: usize) -> CoreResult<f32> {
        self.table.get_float(column, self.at()?)
    }

    /// Double in `column`.
    pub fn get_double(&self, column: usize) -> CoreResult<f64> {
        self.table.get_double(column, self.at()?)
    }

    /// Date in `column`, in milliseconds rounded down to whole seconds.
    pub fn get_date(&self, column: usize) -> CoreResult<i64> {
        self.table.get_date(column, self.at()?)
    }

    /// String in `column`, `None` if null.
    pub fn get_string(&self, column: usize) -> CoreResult<Option<String>> {
        self.table.get_string(column, self.at()?)
    }

    /// Bytes in `column`, `None` if null.
    pub fn get_binary(&self, column: usize) -> CoreResult<Option<Vec<u8>>> {
        self.table.get_binary(column, self.at()?)
    }

    /// Mixed value in `column`.
    pub fn get_mixed(&self, column: usize) -> CoreResult<Mixed> {
        self.table.get_mixed(column, self.at()?)
    }

    /// Target row of the link in `column`, `None` if unset.
    pub fn get_link(&self, column: usize) -> CoreResult<Option<usize>> {
        self.table.get_link(column, self.at()?)
    }

    /// Whether `column` holds null.
    pub fn is_null(&self, column: usize) -> CoreResult<bool> {
        self.table.is_null(column, self.at()?)
    }

    /// Any cell as a [`Value`]. See [`Table::get_value`].
    pub fn get_value(&self, column: usize) -> CoreResult<Value> {
        self.table.get_value(column, self.at()?)
    }

    /// Stores a [`Value`] of the column's type. See [`Table::set_value`].
    pub fn set_value(&self, column: usize, value: impl Into<Value>) -> CoreResult<()> {
        self.table.set_value(column, self.at()?, value)
    }

    /// Stores an integer.
    pub fn set_long(&self, column: usize, value: i64) -> CoreResult<()> {
        self.table.set_long(column, self.at()?, value)
    }

    /// Stores a boolean.
    pub fn set_bool(&self, column: usize, value: bool) -> CoreResult<()> {
        self.table.set_bool(column, self.at()?, value)
    }

    /// Stores a float.
    pub fn set_float(&self, column: usize, value: f32) -> CoreResult<()> {
        self.table.set_float(column, self.at()?, value)
    }

    /// Stores a double.
    pub fn set_double(&self, column: usize, value: f64) -> CoreResult<()> {
        self.table.set_double(column, self.at()?, value)
    }

    /// Stores a date, truncated to whole seconds.
    pub fn set_date(&self, column: usize, millis: i64) -> CoreResult<()> {
        self.table.set_date(column, self.at()?, millis)
    }

    /// Stores a string.
    pub fn set_string(&self, column: usize, value: &str) -> CoreResult<()> {
        self.table.set_string(column, self.at()?, value)
    }

    /// Stores a copy of `value`.
    pub fn set_binary(&self, column: usize, value: &[u8]) -> CoreResult<()> {
        self.table.set_binary(column, self.at()?, value)
    }

    /// Stores a mixed value.
    pub fn set_mixed(&self, column: usize, value: Mixed) -> CoreResult<()> {
        self.table.set_mixed(column, self.at()?, value)
    }

    /// Points the link in `column` at `target`.
    pub fn set_link(&self, column: usize, target: usize) -> CoreResult<()> {
        self.table.set_link(column, self.at()?, target)
    }

    /// Clears the link in `column`.
    pub fn nullify_link(&self, column: usize) -> CoreResult<()> {
        self.table.nullify_link(column, self.at()?)
    }

    /// Sets a nullable `column` to null.
    pub fn set_null(&self, column: usize) -> CoreResult<()> {
        self.table.set_null(column, self.at()?)
    }

    /// The link list in a `LinkList` column of this row.
    pub fn get_link_list(&self, column: usize) -> CoreResult<LinkView> {
        self.table.get_link_list(column, self.at()?)
    }

    /// The subtable in a subtable column of this row.
    pub fn get_subtable(&self, column: usize) -> CoreResult<Table> {
        self.table.get_subtable(column, self.at()?)
    }
}

impl std::fmt::Debug for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("table", &self.table)
            .field("index", &self.index)
            .finish()
    }
}
