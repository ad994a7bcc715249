//! Row subsets of a table.

use super::{Row, Table};
use crate::context::{ArenaTicket, HandleKind};
use crate::error::{CoreError, CoreResult};
use crate::group::{Cell, LogOp, TableData};
use crate::query::{aggregate, Query, Restriction};
use crate::transaction::SessionState;
use crate::types::{ColumnType, Order};
use crate::value::{Mixed, Value};
use std::sync::Arc;

/// Sorts `rows` by the cells of `column`. Stable; nulls first when ascending.
pub(crate) fn sort_rows(
    data: &TableData,
    rows: &mut [usize],
    column: usize,
    order: Order,
) -> CoreResult<()> {
    let spec = data.spec(column)?;
    if !spec.column_type.is_sortable() {
        return Err(CoreError::illegal_argument(format!(
            "cannot sort by a {} column",
            spec.column_type
        )));
    }
    let cells = &data.column(column)?.cells;
    match order {
        Order::Ascending => rows.sort_by(|&a, &b| cells[a].compare(&cells[b])),
        Order::Descending => rows.sort_by(|&a, &b| cells[b].compare(&cells[a])),
    }
    Ok(())
}

/// An ordered list of rows of one table.
///
/// Produced by queries, searches and sorting. Positions in the view map to
/// source rows through [`View::get_source_row_index`]. A view goes stale when
/// a row at or before one of its rows is inserted, removed or moved, except
/// through the view's own [`View::remove`] and [`View::clear`], and when the
/// snapshot moves.
pub struct View {
    table: Table,
    rows: Vec<usize>,
    epoch: u64,
    generation: usize,
    _ticket: ArenaTicket,
}

impl View {
    pub(crate) fn new(table: Table, rows: Vec<usize>, epoch: u64, generation: usize) -> Self {
        let ticket = table.session().register(HandleKind::View, epoch);
        Self {
            table,
            rows,
            epoch,
            generation,
            _ticket: ticket,
        }
    }

    fn check(&self, s: &SessionState) -> CoreResult<()> {
        self.table.check(s)?;
        s.check_epoch(self.epoch)?;
        s.check_rows(
            self.table.path(),
            self.generation,
            self.rows.iter().max().copied(),
        )
    }

    fn read<R>(&self, f: impl FnOnce(&TableData, &[usize]) -> CoreResult<R>) -> CoreResult<R> {
        self.table.session().read(|s| {
            self.check(s)?;
            f(s.group()?.table(self.table.path())?, &self.rows)
        })
    }

    /// Whether the view can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.read(|_, _| Ok(())).is_ok()
    }

    /// Number of rows in the view.
    pub fn size(&self) -> CoreResult<usize> {
        self.read(|_, rows| Ok(rows.len()))
    }

    /// Whether the view lists no rows.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.read(|_, rows| Ok(rows.is_empty()))
    }

    /// The table row shown at view position `pos`.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if `pos >= size()`; `Stale` if the view is stale.
    pub fn get_source_row_index(&self, pos: usize) -> CoreResult<usize> {
        self.read(|_, rows| {
            rows.get(pos)
                .copied()
                .ok_or_else(|| CoreError::out_of_bounds("view position", pos, rows.len()))
        })
    }

    /// The table this view selects from.
    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Row accessor for view position `pos`.
    pub fn get_row(&self, pos: usize) -> CoreResult<Row> {
        let row = self.get_source_row_index(pos)?;
        self.table.get_row(row)
    }

    /// Integer at view position `pos`.
    ///
    /// Cell accessors take a view position instead of a table row and
    /// otherwise behave like the [`Table`] accessor of the same name.
    ///
    /// # Errors
    ///
    /// `Stale` if the view is stale and `IndexOutOfBounds` if `pos` is past
    /// the end, then the errors of the matching [`Table`] accessor.
    pub fn get_long(&self, column: usize, pos: usize) -> CoreResult<i64> {
        self.table.get_long(column, self.get_source_row_index(pos)?)
    }

    /// Boolean at view position `pos`.
    pub fn get_bool(&self, column: usize, pos: usize) -> CoreResult<bool> {
        self.table.get_bool(column, self.get_source_row_index(pos)?)
    }

    /// Float at view position `pos`.
    pub fn get_float(&self, column: usize, pos: usize) -> CoreResult<f32> {
        self.table.get_float(column, self.get_source_row_index(pos)?)
    }

    /// Double at view position `pos`.
    pub fn get_double(&self, column: usize, pos: usize) -> CoreResult<f64> {
        self.table.get_double(column, self.get_source_row_index(pos)?)
    }

    /// Date at view position `pos`, in whole-second milliseconds.
    pub fn get_date(&self, column: usize, pos: usize) -> CoreResult<i64> {
        self.table.get_date(column, self.get_source_row_index(pos)?)
    }

    /// String at view position `pos`, `None` if null.
    pub fn get_string(&self, column: usize, pos: usize) -> CoreResult<Option<String>> {
        self.table.get_string(column, self.get_source_row_index(pos)?)
    }

    /// Bytes at view position `pos`, `None` if null.
    pub fn get_binary(&self, column: usize, pos: usize) -> CoreResult<Option<Vec<u8>>> {
        self.table.get_binary(column, self.get_source_row_index(pos)?)
    }

    /// Mixed value at view position `pos`.
    pub fn get_mixed(&self, column: usize, pos: usize) -> CoreResult<Mixed> {
        self.table.get_mixed(column, self.get_source_row_index(pos)?)
    }

    /// Link target at view position `pos`.
    pub fn get_link(&self, column: usize, pos: usize) -> CoreResult<Option<usize>> {
        self.table.get_link(column, self.get_source_row_index(pos)?)
    }

    /// Whether the cell at view position `pos` is null.
    pub fn is_null(&self, column: usize, pos: usize) -> CoreResult<bool> {
        self.table.is_null(column, self.get_source_row_index(pos)?)
    }

    /// Any cell at view position `pos` as a [`Value`].
    pub fn get_value(&self, column: usize, pos: usize) -> CoreResult<Value> {
        self.table.get_value(column, self.get_source_row_index(pos)?)
    }

    /// Writes any cell at view position `pos`.
    pub fn set_value(&self, column: usize, pos: usize, value: impl Into<Value>) -> CoreResult<()> {
        self.table
            .set_value(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores an integer at view position `pos`.
    pub fn set_long(&self, column: usize, pos: usize, value: i64) -> CoreResult<()> {
        self.table
            .set_long(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores a boolean.
    pub fn set_bool(&self, column: usize, pos: usize, value: bool) -> CoreResult<()> {
        self.table
            .set_bool(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores a float.
    pub fn set_float(&self, column: usize, pos: usize, value: f32) -> CoreResult<()> {
        self.table
            .set_float(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores a double.
    pub fn set_double(&self, column: usize, pos: usize, value: f64) -> CoreResult<()> {
        self.table
            .set_double(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores a date, truncated to whole seconds.
    pub fn set_date(&self, column: usize, pos: usize, millis: i64) -> CoreResult<()> {
        self.table
            .set_date(column, self.get_source_row_index(pos)?, millis)
    }

    /// Stores a string.
    pub fn set_string(&self, column: usize, pos: usize, value: &str) -> CoreResult<()> {
        self.table
            .set_string(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores a copy of `value`.
    pub fn set_binary(&self, column: usize, pos: usize, value: &[u8]) -> CoreResult<()> {
        self.table
            .set_binary(column, self.get_source_row_index(pos)?, value)
    }

    /// Stores a mixed value.
    pub fn set_mixed(&self, column: usize, pos: usize, value: Mixed) -> CoreResult<()> {
        self.table
            .set_mixed(column, self.get_source_row_index(pos)?, value)
    }

    /// Sets a nullable cell to null.
    pub fn set_null(&self, column: usize, pos: usize) -> CoreResult<()> {
        self.table
            .set_null(column, self.get_source_row_index(pos)?)
    }

    /// Reorders the view by `column`.
    pub fn sort(&mut self, column: usize, order: Order) -> CoreResult<()> {
        let mut rows = self.rows.clone();
        self.read(|data, _| sort_rows(data, &mut rows, column, order))?;
        self.rows = rows;
        Ok(())
    }

    /// Removes the source row at view position `pos` from the table.
    ///
    /// The view stays valid and no longer lists the row.
    pub fn remove(&mut self, pos: usize) -> CoreResult<()> {
        let session = Arc::clone(self.table.session());
        let (row, generation) = session.write(|s| {
            self.check(s)?;
            let row = *self
                .rows
                .get(pos)
                .ok_or_else(|| CoreError::out_of_bounds("view position", pos, self.rows.len()))?;
            self.table.apply_locked(
                s,
                LogOp::RemoveRow {
                    table: self.table.path(),
                    row,
                },
            )?;
            Ok((row, s.log.generation(self.table.path())))
        })?;
        self.rows.retain(|&r| r != row);
        for r in &mut self.rows {
            if *r > row {
                *r -= 1;
            }
        }
        self.generation = generation;
        Ok(())
    }

    /// Removes every source row of the view from the table.
    pub fn clear(&mut self) -> CoreResult<()> {
        let session = Arc::clone(self.table.session());
        let generation = session.write(|s| {
            self.check(s)?;
            let mut rows = self.rows.clone();
            rows.sort_unstable_by(|a, b| b.cmp(a));
            rows.dedup();
            for row in rows {
                self.table.apply_locked(
                    s,
                    LogOp::RemoveRow {
                        table: self.table.path(),
                        row,
                    },
                )?;
            }
            Ok(s.log.generation(self.table.path()))
        })?;
        self.rows.clear();
        self.generation = generation;
        Ok(())
    }

    /// Starts a query restricted to the rows of this view, in view order.
    pub fn where_(&self) -> CoreResult<Query> {
        self.table.session().read(|s| {
            self.check(s)?;
            let restriction = Restriction::Rows {
                rows: self.rows.clone(),
                generation: self.generation,
            };
            Ok(Query::new(self.table.duplicate(s.epoch), Some(restriction), s))
        })
    }

    /// View position of the first row whose `column` equals `value`.
    pub fn find_first_long(&self, column: usize, value: i64) -> CoreResult<Option<usize>> {
        self.read(|data, rows| {
            data.expect_type(column, ColumnType::Int)?;
            let cells = &data.column(column)?.cells;
            Ok(rows
                .iter()
                .position(|&r| matches!(cells[r], Cell::Int(v) if v == value)))
        })
    }

    // === Aggregates ===

    fn values<T>(
        &self,
        column: usize,
        ty: ColumnType,
        extract: fn(&Cell) -> Option<T>,
    ) -> CoreResult<Vec<T>> {
        self.read(|data, rows| aggregate::collect(data, column, ty, rows, extract))
    }

    /// Sum of the non-null values of an int column. Wraps on overflow.
    pub fn sum_int(&self, column: usize) -> CoreResult<i64> {
        Ok(aggregate::sum_int(&self.values(column, ColumnType::Int, aggregate::int)?))
    }

    /// Sum of a float column, accumulated in double precision.
    pub fn sum_float(&self, column: usize) -> CoreResult<f64> {
        Ok(aggregate::sum(&self.values(
            column,
            ColumnType::Float,
            aggregate::float,
        )?))
    }

    /// Sum of the non-null values of a double column.
    pub fn sum_double(&self, column: usize) -> CoreResult<f64> {
        Ok(aggregate::sum(&self.values(
            column,
            ColumnType::Double,
            aggregate::double,
        )?))
    }

    /// Smallest non-null value; `None` if there are none.
    ///
    /// # Errors
    ///
    /// Aggregates fail with `TypeMismatch` on a column of another type and
    /// with `Stale` on a stale view.
    pub fn min_int(&self, column: usize) -> CoreResult<Option<i64>> {
        Ok(aggregate::min(self.values(column, ColumnType::Int, aggregate::int)?))
    }

    /// Largest non-null value; `None` if there are none.
    pub fn max_int(&self, column: usize) -> CoreResult<Option<i64>> {
        Ok(aggregate::max(self.values(column, ColumnType::Int, aggregate::int)?))
    }

    /// Mean of the non-null values; `None` if there are none.
    pub fn average_int(&self, column: usize) -> CoreResult<Option<f64>> {
        let values = self.values(column, ColumnType::Int, aggregate::int)?;
        Ok(aggregate::average(values.iter().map(|&v| v as f64)))
    }

    /// Smallest non-null value. NaN only wins if nothing else is there.
    pub fn min_float(&self, column: usize) -> CoreResult<Option<f32>> {
        Ok(aggregate::min_partial(self.values(
            column,
            ColumnType::Float,
            aggregate::float_raw,
        )?))
    }

    /// Largest non-null value. NaN only wins if nothing else is there.
    pub fn max_float(&self, column: usize) -> CoreResult<Option<f32>> {
        Ok(aggregate::max_partial(self.values(
            column,
            ColumnType::Float,
            aggregate::float_raw,
        )?))
    }

    /// Mean of the non-null values, computed in double precision.
    pub fn average_float(&self, column: usize) -> CoreResult<Option<f64>> {
        let values = self.values(column, ColumnType::Float, aggregate::float)?;
        Ok(aggregate::average(values.into_iter()))
    }

    /// Smallest non-null value. NaN only wins if nothing else is there.
    pub fn min_double(&self, column: usize) -> CoreResult<Option<f64>> {
        Ok(aggregate::min_partial(self.values(
            column,
            ColumnType::Double,
            aggregate::double,
        )?))
    }

    /// Largest non-null value. NaN only wins if nothing else is there.
    pub fn max_double(&self, column: usize) -> CoreResult<Option<f64>> {
        Ok(aggregate::max_partial(self.values(
            column,
            ColumnType::Double,
            aggregate::double,
        )?))
    }

    /// Mean of the non-null values.
    pub fn average_double(&self, column: usize) -> CoreResult<Option<f64>> {
        let values = self.values(column, ColumnType::Double, aggregate::double)?;
        Ok(aggregate::average(values.into_iter()))
    }

    /// Earliest non-null date in milliseconds.
    pub fn min_date(&self, column: usize) -> CoreResult<Option<i64>> {
        Ok(aggregate::min(self.values(column, ColumnType::Date, aggregate::date)?))
    }

    /// Latest non-null date in milliseconds.
    pub fn max_date(&self, column: usize) -> CoreResult<Option<i64>> {
        Ok(aggregate::max(self.values(column, ColumnType::Date, aggregate::date)?))
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("table", &self.table)
            .field("rows", &self.rows.len())
            .finish()
    }
}
