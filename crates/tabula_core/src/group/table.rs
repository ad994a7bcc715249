//! Column-oriented table storage.

use super::cell::Cell;
use crate::error::{CoreError, CoreResult};
use crate::types::{ColumnType, TableKey};
use serde::{Deserialize, Serialize};

/// Schema description of one column.
///
/// Used to declare subtable layouts and returned by schema inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub(crate) name: String,
    pub(crate) column_type: ColumnType,
    pub(crate) nullable: bool,
    pub(crate) link_target: Option<TableKey>,
    pub(crate) subcolumns: Vec<ColumnSpec>,
}

impl ColumnSpec {
    /// Creates a non-nullable column description.
    pub fn new(column_type: ColumnType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            link_target: None,
            subcolumns: Vec::new(),
        }
    }

    /// Sets nullability.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Whether the column accepts null.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Layout of the nested tables of a TABLE column.
    #[must_use]
    pub fn subcolumns(&self) -> &[ColumnSpec] {
        &self.subcolumns
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ColumnData {
    pub(crate) spec: ColumnSpec,
    pub(crate) cells: Vec<Cell>,
}

/// Rows of one table (top-level or nested), stored per column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct TableData {
    pub(crate) columns: Vec<ColumnData>,
    pub(crate) rows: usize,
}

impl TableData {
    /// Empty table with the given layout.
    pub(crate) fn with_columns(specs: &[ColumnSpec]) -> Self {
        Self {
            columns: specs
                .iter()
                .map(|spec| ColumnData {
                    spec: spec.clone(),
                    cells: Vec::new(),
                })
                .collect(),
            rows: 0,
        }
    }

    pub(crate) fn column(&self, column: usize) -> CoreResult<&ColumnData> {
        self.columns
            .get(column)
            .ok_or_else(|| CoreError::out_of_bounds("column", column, self.columns.len()))
    }

    pub(crate) fn spec(&self, column: usize) -> CoreResult<&ColumnSpec> {
        self.column(column).map(|c| &c.spec)
    }

    pub(crate) fn check_row(&self, row: usize) -> CoreResult<()> {
        if row < self.rows {
            Ok(())
        } else {
            Err(CoreError::out_of_bounds("row", row, self.rows))
        }
    }

    pub(crate) fn cell(&self, column: usize, row: usize) -> CoreResult<&Cell> {
        let col = self.column(column)?;
        self.check_row(row)?;
        Ok(&col.cells[row])
    }

    pub(crate) fn cell_mut(&mut self, column: usize, row: usize) -> CoreResult<&mut Cell> {
        self.check_row(row)?;
        let len = self.columns.len();
        self.columns
            .get_mut(column)
            .map(|c| &mut c.cells[row])
            .ok_or_else(|| CoreError::out_of_bounds("column", column, len))
    }

    /// Checks that `column` has type `ty`.
    pub(crate) fn expect_type(&self, column: usize, ty: ColumnType) -> CoreResult<&ColumnSpec> {
        let spec = self.spec(column)?;
        if spec.column_type == ty {
            Ok(spec)
        } else {
            Err(CoreError::TypeMismatch {
                column,
                expected: ty,
                actual: spec.column_type,
            })
        }
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.spec.name == name)
    }

    /// Whether any column links into `target`.
    pub(crate) fn links_to(&self, target: TableKey) -> bool {
        self.columns
            .iter()
            .any(|c| c.spec.link_target == Some(target))
    }

    pub(crate) fn add_column(&mut self, spec: ColumnSpec) {
        let default = Cell::default_for(&spec);
        self.columns.push(ColumnData {
            cells: vec![default; self.rows],
            spec,
        });
    }

    pub(crate) fn insert_rows(&mut self, at: usize, count: usize) {
        for column in &mut self.columns {
            let default = Cell::default_for(&column.spec);
            column
                .cells
                .splice(at..at, std::iter::repeat(default).take(count));
        }
        self.rows += count;
    }

    pub(crate) fn remove_row(&mut self, row: usize) {
        for column in &mut self.columns {
            column.cells.remove(row);
        }
        self.rows -= 1;
    }

    pub(crate) fn move_last_over(&mut self, row: usize) {
        for column in &mut self.columns {
            column.cells.swap_remove(row);
        }
        self.rows -= 1;
    }

    pub(crate) fn clear(&mut self) {
        for column in &mut self.columns {
            column.cells.clear();
        }
        self.rows = 0;
    }

    /// Rewrites every link cell in columns targeting `target`.
    ///
    /// `map` returns the new target row, or `None` when the target is gone.
    pub(crate) fn remap_links(&mut self, target: TableKey, map: &dyn Fn(usize) -> Option<usize>) {
        for column in &mut self.columns {
            if column.spec.link_target != Some(target) {
                continue;
            }
            for cell in &mut column.cells {
                match cell {
                    Cell::Link(t) => match map(*t) {
                        Some(n) => *t = n,
                        None => *cell = Cell::Null,
                    },
                    Cell::LinkList(list) => {
                        *list = list.iter().filter_map(|t| map(*t)).collect();
                    }
                    _ => {}
                }
            }
        }
    }
}
