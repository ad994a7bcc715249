//! Table accessor.

use super::{null_cell, sort_rows, wrong_cell, LinkView, Row, View};
use crate::context::{ArenaTicket, HandleKind};
use crate::error::{CoreError, CoreResult};
use crate::group::{Cell, ColumnSpec, LogOp, TableData, TablePath};
use crate::query::Query;
use crate::transaction::{Session, SessionState};
use crate::types::{ColumnType, Order, TableKey};
use crate::value::{Mixed, Value};
use std::sync::Arc;

/// Position of a subtable's parent row when the handle was made.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Anchor {
    pub(crate) epoch: u64,
    pub(crate) generation: usize,
}

/// A table in the current transaction.
///
/// Cells are addressed by `(column, row)`. Getters of numeric, boolean and
/// date columns fail with `IllegalState` on a null cell; string and binary
/// getters return `None` instead.
///
/// A top-level table handle stays valid until its transaction ends. A
/// subtable handle additionally goes stale when its parent row moves.
pub struct Table {
    session: Arc<Session>,
    path: TablePath,
    serial: u64,
    anchor: Option<Anchor>,
    _ticket: ArenaTicket,
}

impl Table {
    pub(crate) fn new(
        session: Arc<Session>,
        path: TablePath,
        serial: u64,
        anchor: Option<Anchor>,
        epoch: u64,
    ) -> Self {
        let ticket = session.register(HandleKind::Table, epoch);
        Self {
            session,
            path,
            serial,
            anchor,
            _ticket: ticket,
        }
    }

    /// Another handle to the same table, registered under `epoch`.
    pub(crate) fn duplicate(&self, epoch: u64) -> Self {
        Self::new(
            Arc::clone(&self.session),
            self.path,
            self.serial,
            self.anchor,
            epoch,
        )
    }

    /// Handle to another top-level table of the same transaction.
    pub(crate) fn sibling(&self, key: TableKey, epoch: u64) -> Self {
        Self::new(
            Arc::clone(&self.session),
            TablePath::root(key),
            self.serial,
            None,
            epoch,
        )
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub(crate) fn path(&self) -> TablePath {
        self.path
    }

    /// Validates this handle against the session.
    pub(crate) fn check(&self, s: &SessionState) -> CoreResult<()> {
        s.check_serial(self.serial)?;
        if let (Some(anchor), Some((_, row))) = (self.anchor, self.path.sub) {
            s.check_epoch(anchor.epoch)?;
            let parent = TablePath::root(self.path.key);
            s.check_rows(parent, anchor.generation, Some(row))?;
            s.check_schema(self.path.key, anchor.generation)?;
        }
        Ok(())
    }

    pub(crate) fn data<'s>(&self, s: &'s SessionState) -> CoreResult<&'s TableData> {
        self.check(s)?;
        s.group()?.table(self.path)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&TableData) -> CoreResult<R>) -> CoreResult<R> {
        self.session.read(|s| f(self.data(s)?))
    }

    /// Applies an op built from the current data.
    fn mutate<R>(&self, f: impl FnOnce(&TableData) -> CoreResult<(LogOp, R)>) -> CoreResult<R> {
        self.session.write(|s| {
            let (op, out) = {
                let data = self.data(s)?;
                s.ensure_writable()?;
                f(data)?
            };
            s.apply(op)?;
            Ok(out)
        })
    }

    /// Applies `op` while the caller holds the session.
    pub(crate) fn apply_locked(&self, s: &mut SessionState, op: LogOp) -> CoreResult<()> {
        self.check(s)?;
        s.apply(op)
    }

    fn mutate_schema<R>(
        &self,
        f: impl FnOnce(&TableData) -> CoreResult<(LogOp, R)>,
    ) -> CoreResult<R> {
        if self.path.sub.is_some() {
            return Err(CoreError::illegal_state(
                "the schema of a subtable is fixed by its parent column",
            ));
        }
        self.mutate(f)
    }

    /// Whether the handle can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.read(|_| Ok(())).is_ok()
    }

    /// Whether this is a subtable held in a cell of another table.
    #[must_use]
    pub fn is_subtable(&self) -> bool {
        self.path.sub.is_some()
    }

    /// Name of the table. Subtables have an empty name.
    pub fn name(&self) -> CoreResult<String> {
        self.session.read(|s| {
            self.check(s)?;
            if self.path.sub.is_some() {
                return Ok(String::new());
            }
            Ok(s.group()?.name_of(self.path.key)?.to_owned())
        })
    }

    // === Schema ===

    /// Appends a non-nullable column and returns its index.
    pub fn add_column(&self, column_type: ColumnType, name: &str) -> CoreResult<usize> {
        self.add_column_spec(ColumnSpec::new(column_type, name))
    }

    /// Appends a nullable column and returns its index.
    pub fn add_column_nullable(&self, column_type: ColumnType, name: &str) -> CoreResult<usize> {
        self.add_column_spec(ColumnSpec::new(column_type, name).nullable(true))
    }

    /// Appends a `Link` or `LinkList` column pointing into `target`.
    pub fn add_column_link(
        &self,
        column_type: ColumnType,
        name: &str,
        target: &Table,
    ) -> CoreResult<usize> {
        if !column_type.is_link() {
            return Err(CoreError::illegal_argument(format!(
                "{column_type} is not a link type"
            )));
        }
        if target.path.sub.is_some() || !Arc::ptr_eq(&self.session, &target.session) {
            return Err(CoreError::illegal_argument(
                "link target must be a top-level table of the same transaction",
            ));
        }
        let mut spec = ColumnSpec::new(column_type, name);
        spec.link_target = Some(target.path.key);
        self.add_column_spec(spec)
    }

    /// Appends a subtable column whose subtables have `columns`.
    pub fn add_subtable_column(&self, name: &str, columns: Vec<ColumnSpec>) -> CoreResult<usize> {
        let mut spec = ColumnSpec::new(ColumnType::Table, name);
        spec.subcolumns = columns;
        self.add_column_spec(spec)
    }

    fn add_column_spec(&self, spec: ColumnSpec) -> CoreResult<usize> {
        let table = self.path.key;
        self.mutate_schema(|t| Ok((LogOp::AddColumn { table, spec }, t.columns.len())))
    }

    /// Removes a column. Later columns shift down by one.
    pub fn remove_column(&self, column: usize) -> CoreResult<()> {
        let table = self.path.key;
        self.mutate_schema(|_| Ok((LogOp::RemoveColumn { table, column }, ())))
    }

    /// Renames a column.
    ///
    /// # Errors
    ///
    /// `IllegalArgument` if the name is empty or already used.
    pub fn rename_column(&self, column: usize, name: &str) -> CoreResult<()> {
        let table = self.path.key;
        let name = name.to_owned();
        self.mutate_schema(|_| {
            Ok((
                LogOp::RenameColumn {
                    table,
                    column,
                    name,
                },
                (),
            ))
        })
    }

    /// Number of columns.
    pub fn column_count(&self) -> CoreResult<usize> {
        self.read(|t| Ok(t.columns.len()))
    }

    /// Name of a column.
    pub fn column_name(&self, column: usize) -> CoreResult<String> {
        self.read(|t| Ok(t.spec(column)?.name.clone()))
    }

    /// Index of the column called `name`, if any.
    pub fn column_index(&self, name: &str) -> CoreResult<Option<usize>> {
        self.read(|t| Ok(t.column_index(name)))
    }

    /// Type of a column.
    pub fn column_type(&self, column: usize) -> CoreResult<ColumnType> {
        self.read(|t| Ok(t.spec(column)?.column_type))
    }

    /// Whether a column accepts null.
    pub fn is_column_nullable(&self, column: usize) -> CoreResult<bool> {
        self.read(|t| Ok(t.spec(column)?.nullable))
    }

    /// The table a link column points into.
    pub fn link_target(&self, column: usize) -> CoreResult<Table> {
        let (key, epoch) = self.session.read(|s| {
            let spec = self.data(s)?.spec(column)?;
            let key = spec.link_target.ok_or_else(|| {
                CoreError::illegal_argument(format!("column {column} is not a link column"))
            })?;
            Ok((key, s.epoch))
        })?;
        Ok(self.sibling(key, epoch))
    }

    // === Rows ===

    /// Number of rows.
    pub fn size(&self) -> CoreResult<usize> {
        self.read(|t| Ok(t.rows))
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.read(|t| Ok(t.rows == 0))
    }

    /// Appends a row of default values and returns its index.
    pub fn add_empty_row(&self) -> CoreResult<usize> {
        self.add_empty_rows(1)
    }

    /// Appends `count` rows and returns the index of the first.
    pub fn add_empty_rows(&self, count: usize) -> CoreResult<usize> {
        let table = self.path;
        self.mutate(|t| {
            let at = t.rows;
            Ok((LogOp::InsertRows { table, at, count }, at))
        })
    }

    /// Inserts a row before `at`. Rows at or after `at` shift up.
    pub fn insert_empty_row(&self, at: usize) -> CoreResult<()> {
        let table = self.path;
        self.mutate(|_| {
            Ok((
                LogOp::InsertRows {
                    table,
                    at,
                    count: 1,
                },
                (),
            ))
        })
    }

    /// Removes a row. Later rows shift down; links to the row are cleared.
    pub fn remove(&self, row: usize) -> CoreResult<()> {
        let table = self.path;
        self.mutate(|_| Ok((LogOp::RemoveRow { table, row }, ())))
    }

    /// Removes the last row.
    pub fn remove_last(&self) -> CoreResult<()> {
        let table = self.path;
        self.mutate(|t| {
            let row = t
                .rows
                .checked_sub(1)
                .ok_or_else(|| CoreError::out_of_bounds("row", 0, 0))?;
            Ok((LogOp::RemoveRow { table, row }, ()))
        })
    }

    /// Removes a row by moving the last row into its place.
    pub fn move_last_over(&self, row: usize) -> CoreResult<()> {
        let table = self.path;
        self.mutate(|_| Ok((LogOp::MoveLastOver { table, row }, ())))
    }

    /// Removes every row.
    pub fn clear(&self) -> CoreResult<()> {
        let table = self.path;
        self.mutate(|_| Ok((LogOp::Clear { table }, ())))
    }

    /// Accessor for one row.
    pub fn get_row(&self, row: usize) -> CoreResult<Row> {
        self.session.read(|s| {
            self.data(s)?.check_row(row)?;
            Ok(Row::new(
                self.duplicate(s.epoch),
                row,
                s.epoch,
                s.log.generation(self.path),
            ))
        })
    }

    // === Cells ===

    /// Reads a cell of a column of type `ty`.
    fn cell<R>(
        &self,
        column: usize,
        row: usize,
        ty: ColumnType,
        f: impl FnOnce(&Cell) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.read(|t| {
            t.expect_type(column, ty)?;
            f(t.cell(column, row)?)
        })
    }

    /// Reads a cell that must not be null.
    fn present<R>(
        &self,
        column: usize,
        row: usize,
        ty: ColumnType,
        f: impl FnOnce(&Cell) -> Option<R>,
    ) -> CoreResult<R> {
        self.cell(column, row, ty, |cell| {
            if cell.is_null() {
                return Err(null_cell(column, row));
            }
            f(cell).ok_or_else(wrong_cell)
        })
    }

    /// Integer in a cell.
    ///
    /// The typed getters below share these errors.
    ///
    /// # Errors
    ///
    /// - `IndexOutOfBounds` for a bad column or row
    /// - `TypeMismatch` if the column has another type
    /// - `IllegalState` if the cell is null; check [`Table::is_null`] first
    ///   on nullable columns
    /// - `Stale` once the transaction ended or the table went stale
    pub fn get_long(&self, column: usize, row: usize) -> CoreResult<i64> {
        self.present(column, row, ColumnType::Int, |c| match c {
            Cell::Int(v) => Some(*v),
            _ => None,
        })
    }

    /// Boolean in a cell.
    pub fn get_bool(&self, column: usize, row: usize) -> CoreResult<bool> {
        self.present(column, row, ColumnType::Bool, |c| match c {
            Cell::Bool(v) => Some(*v),
            _ => None,
        })
    }

    /// Float in a cell.
    pub fn get_float(&self, column: usize, row: usize) -> CoreResult<f32> {
        self.present(column, row, ColumnType::Float, |c| match c {
            Cell::Float(v) => Some(*v),
            _ => None,
        })
    }

    /// Double in a cell.
    pub fn get_double(&self, column: usize, row: usize) -> CoreResult<f64> {
        self.present(column, row, ColumnType::Double, |c| match c {
            Cell::Double(v) => Some(*v),
            _ => None,
        })
    }

    /// Milliseconds since the epoch, always a whole second.
    pub fn get_date(&self, column: usize, row: usize) -> CoreResult<i64> {
        self.present(column, row, ColumnType::Date, |c| match c {
            Cell::Date(v) => Some(*v),
            _ => None,
        })
    }

    /// `None` for a null cell.
    pub fn get_string(&self, column: usize, row: usize) -> CoreResult<Option<String>> {
        self.cell(column, row, ColumnType::String, |c| match c {
            Cell::Null => Ok(None),
            Cell::String(v) => Ok(Some(v.clone())),
            _ => Err(wrong_cell()),
        })
    }

    /// `None` for a null cell.
    pub fn get_binary(&self, column: usize, row: usize) -> CoreResult<Option<Vec<u8>>> {
        self.cell(column, row, ColumnType::Binary, |c| match c {
            Cell::Null => Ok(None),
            Cell::Binary(v) => Ok(Some(v.clone())),
            _ => Err(wrong_cell()),
        })
    }

    /// Mixed value in a cell. A mixed cell is never null.
    pub fn get_mixed(&self, column: usize, row: usize) -> CoreResult<Mixed> {
        self.present(column, row, ColumnType::Mixed, |c| match c {
            Cell::Mixed(v) => Some(v.clone()),
            _ => None,
        })
    }

    /// Type of the value held by a mixed cell.
    pub fn get_mixed_type(&self, column: usize, row: usize) -> CoreResult<ColumnType> {
        self.get_mixed(column, row).map(|m| m.column_type())
    }

    /// Target row of a link cell, `None` if the link is null.
    pub fn get_link(&self, column: usize, row: usize) -> CoreResult<Option<usize>> {
        self.cell(column, row, ColumnType::Link, |c| match c {
            Cell::Null => Ok(None),
            Cell::Link(v) => Ok(Some(*v)),
            _ => Err(wrong_cell()),
        })
    }

    /// Whether a link cell is unset.
    pub fn is_null_link(&self, column: usize, row: usize) -> CoreResult<bool> {
        self.get_link(column, row).map(|l| l.is_none())
    }

    /// Whether a cell holds null.
    ///
    /// Works on every column type; only nullable and link columns can
    /// actually hold null.
    pub fn is_null(&self, column: usize, row: usize) -> CoreResult<bool> {
        self.read(|t| Ok(t.cell(column, row)?.is_null()))
    }

    /// Any cell as a [`Value`]. Subtable cells have no value form.
    pub fn get_value(&self, column: usize, row: usize) -> CoreResult<Value> {
        self.read(|t| {
            t.cell(column, row)?.to_value().ok_or_else(|| {
                CoreError::illegal_argument(format!(
                    "column {column} holds subtables, use get_subtable"
                ))
            })
        })
    }

    /// Writes any cell. The value must match the column type.
    ///
    /// # Errors
    ///
    /// - `TypeMismatch` if the value has another type
    /// - `NullNotAllowed` for null in a non-nullable column
    /// - `IndexOutOfBounds` for a bad column, row or link target
    pub fn set_value(&self, column: usize, row: usize, value: impl Into<Value>) -> CoreResult<()> {
        let table = self.path;
        let value = value.into();
        self.mutate(|t| {
            t.check_row(row)?;
            let cell = Cell::from_value(value, t.spec(column)?, column)?;
            Ok((
                LogOp::Set {
                    table,
                    column,
                    row,
                    cell,
                },
                (),
            ))
        })
    }

    /// Stores an integer.
    ///
    /// The typed setters fail like [`Table::set_value`], and with
    /// `IllegalState` outside a write transaction.
    pub fn set_long(&self, column: usize, row: usize, value: i64) -> CoreResult<()> {
        self.set_value(column, row, Value::Int(value))
    }

    /// Stores a boolean.
    pub fn set_bool(&self, column: usize, row: usize, value: bool) -> CoreResult<()> {
        self.set_value(column, row, Value::Bool(value))
    }

    /// Stores a float.
    pub fn set_float(&self, column: usize, row: usize, value: f32) -> CoreResult<()> {
        self.set_value(column, row, Value::Float(value))
    }

    /// Stores a double.
    pub fn set_double(&self, column: usize, row: usize, value: f64) -> CoreResult<()> {
        self.set_value(column, row, Value::Double(value))
    }

    /// Stores a date given in milliseconds, truncated to the whole second.
    pub fn set_date(&self, column: usize, row: usize, millis: i64) -> CoreResult<()> {
        self.set_value(column, row, Value::Date(millis))
    }

    /// Stores a string.
    pub fn set_string(&self, column: usize, row: usize, value: &str) -> CoreResult<()> {
        self.set_value(column, row, Value::String(value.to_owned()))
    }

    /// Stores a copy of `value`.
    pub fn set_binary(&self, column: usize, row: usize, value: &[u8]) -> CoreResult<()> {
        self.set_value(column, row, Value::Binary(value.to_vec()))
    }

    /// Stores a mixed value.
    pub fn set_mixed(&self, column: usize, row: usize, value: Mixed) -> CoreResult<()> {
        self.set_value(column, row, Value::Mixed(value))
    }

    /// Points a link cell at row `target` of the target table.
    pub fn set_link(&self, column: usize, row: usize, target: usize) -> CoreResult<()> {
        self.set_value(column, row, Value::Link(target))
    }

    /// Clears a link cell.
    pub fn nullify_link(&self, column: usize, row: usize) -> CoreResult<()> {
        self.cell(column, row, ColumnType::Link, |_| Ok(()))?;
        self.set_null(column, row)
    }

    /// Sets a cell to null.
    ///
    /// # Errors
    ///
    /// `NullNotAllowed` unless the column is nullable or a link column.
    pub fn set_null(&self, column: usize, row: usize) -> CoreResult<()> {
        self.set_value(column, row, Value::Null)
    }

    /// The subtable held in a cell of a subtable column.
    pub fn get_subtable(&self, column: usize, row: usize) -> CoreResult<Table> {
        if self.path.sub.is_some() {
            return Err(CoreError::illegal_argument("subtables cannot be nested"));
        }
        self.session.read(|s| {
            let data = self.data(s)?;
            data.expect_type(column, ColumnType::Table)?;
            data.check_row(row)?;
            let anchor = Anchor {
                epoch: s.epoch,
                generation: s.log.generation(self.path),
            };
            Ok(Self::new(
                Arc::clone(&self.session),
                TablePath::subtable(self.path.key, column, row),
                self.serial,
                Some(anchor),
                s.epoch,
            ))
        })
    }

    /// The link list held in a cell of a `LinkList` column.
    pub fn get_link_list(&self, column: usize, row: usize) -> CoreResult<LinkView> {
        self.session.read(|s| {
            let data = self.data(s)?;
            let spec = data.expect_type(column, ColumnType::LinkList)?;
            let target = spec.link_target.ok_or_else(wrong_cell)?;
            data.check_row(row)?;
            Ok(LinkView::new(
                self.duplicate(s.epoch),
                column,
                row,
                target,
                s.epoch,
                s.log.generation(self.path),
            ))
        })
    }

    // === Search ===

    /// Starts a query over all rows.
    pub fn where_(&self) -> CoreResult<Query> {
        self.session.read(|s| {
            self.check(s)?;
            Ok(Query::new(self.duplicate(s.epoch), None, s))
        })
    }

    /// First row whose integer `column` equals `value`.
    pub fn find_first_long(&self, column: usize, value: i64) -> CoreResult<Option<usize>> {
        self.where_()?.equal_to(column, value)?.find_first()
    }

    /// First row whose boolean `column` equals `value`.
    pub fn find_first_bool(&self, column: usize, value: bool) -> CoreResult<Option<usize>> {
        self.where_()?.equal_to(column, value)?.find_first()
    }

    /// First row whose string `column` equals `value`, case sensitive.
    pub fn find_first_string(&self, column: usize, value: &str) -> CoreResult<Option<usize>> {
        self.where_()?.equal_to(column, value)?.find_first()
    }

    /// All rows whose integer `column` equals `value`, as a view.
    pub fn find_all_long(&self, column: usize, value: i64) -> CoreResult<View> {
        self.where_()?.equal_to(column, value)?.find_all()
    }

    /// All rows whose string `column` equals `value`, as a view.
    pub fn find_all_string(&self, column: usize, value: &str) -> CoreResult<View> {
        self.where_()?.equal_to(column, value)?.find_all()
    }

    /// All rows ordered by `column`. Nulls sort first; ties keep table order.
    pub fn get_sorted_view(&self, column: usize, order: Order) -> CoreResult<View> {
        self.session.read(|s| {
            let data = self.data(s)?;
            let mut rows: Vec<usize> = (0..data.rows).collect();
            sort_rows(data, &mut rows, column, order)?;
            Ok(View::new(
                self.duplicate(s.epoch),
                rows,
                s.epoch,
                s.log.generation(self.path),
            ))
        })
    }

    /// The first row of every distinct value in `column`, in table order.
    pub fn distinct(&self, column: usize) -> CoreResult<View> {
        self.session.read(|s| {
            let data = self.data(s)?;
            let spec = data.spec(column)?;
            if !spec.column_type.is_sortable() {
                return Err(CoreError::illegal_argument(format!(
                    "distinct is not supported on {} columns",
                    spec.column_type
                )));
            }
            let cells = &data.column(column)?.cells;
            let mut rows: Vec<usize> = (0..data.rows).collect();
            rows.sort_by(|&a, &b| cells[a].compare(&cells[b]).then(a.cmp(&b)));
            rows.dedup_by(|later, kept| cells[*later].same_value(&cells[*kept]));
            rows.sort_unstable();
            Ok(View::new(
                self.duplicate(s.epoch),
                rows,
                s.epoch,
                s.log.generation(self.path),
            ))
        })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("key", &self.path.key)
            .field("sub", &self.path.sub)
            .finish()
    }
}
