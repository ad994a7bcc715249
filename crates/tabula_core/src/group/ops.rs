//! Mutation operations and their application.

use super::{Cell, ColumnSpec, GroupData, TableEntry, TablePath};
use crate::error::{CoreError, CoreResult};
use crate::types::{ColumnType, TableKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One recorded mutation.
///
/// Write transactions record the ops they apply; a commit persists them and
/// recovery applies them again in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum LogOp {
    AddTable { key: TableKey, name: String },
    RemoveTable { key: TableKey },
    RenameTable { key: TableKey, name: String },
    AddColumn { table: TableKey, spec: ColumnSpec },
    RemoveColumn { table: TableKey, column: usize },
    RenameColumn { table: TableKey, column: usize, name: String },
    InsertRows { table: TablePath, at: usize, count: usize },
    RemoveRow { table: TablePath, row: usize },
    MoveLastOver { table: TablePath, row: usize },
    Clear { table: TablePath },
    Set { table: TablePath, column: usize, row: usize, cell: Cell },
    LinkListInsert { table: TableKey, column: usize, row: usize, pos: usize, target: usize },
    LinkListSet { table: TableKey, column: usize, row: usize, pos: usize, target: usize },
    LinkListMove { table: TableKey, column: usize, row: usize, from: usize, to: usize },
    LinkListRemove { table: TableKey, column: usize, row: usize, pos: usize },
    LinkListClear { table: TableKey, column: usize, row: usize },
}

impl LogOp {
    /// The top-level table the op touches.
    pub(crate) const fn table_key(&self) -> TableKey {
        match self {
            Self::AddTable { key, .. } | Self::RemoveTable { key } | Self::RenameTable { key, .. } => {
                *key
            }
            Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::RenameColumn { table, .. }
            | Self::LinkListInsert { table, .. }
            | Self::LinkListSet { table, .. }
            | Self::LinkListMove { table, .. }
            | Self::LinkListRemove { table, .. }
            | Self::LinkListClear { table, .. } => *table,
            Self::InsertRows { table, .. }
            | Self::RemoveRow { table, .. }
            | Self::MoveLastOver { table, .. }
            | Self::Clear { table }
            | Self::Set { table, .. } => table.key,
        }
    }
}

/// What an applied op means for handles into the touched table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Row positions are unchanged.
    None,
    /// Rows at or after `from` moved or disappeared.
    Rows { table: TablePath, from: usize },
    /// Column layout changed.
    Schema { table: TableKey },
}

impl GroupData {
    /// Applies one op. On error nothing has been modified.
    pub(crate) fn apply(&mut self, op: &LogOp) -> CoreResult<Effect> {
        match op {
            LogOp::AddTable { key, name } => {
                if name.is_empty() {
                    return Err(CoreError::illegal_argument("table name must not be empty"));
                }
                if self.key_of(name).is_some() {
                    return Err(CoreError::illegal_argument(format!(
                        "table '{name}' already exists"
                    )));
                }
                if key.as_u32() < self.next_key {
                    return Err(CoreError::illegal_state(format!("{key} was already used")));
                }
                self.tables.push(TableEntry {
                    key: *key,
                    name: name.clone(),
                    data: Arc::default(),
                });
                self.next_key = key.as_u32().saturating_add(1);
                Ok(Effect::None)
            }
            LogOp::RemoveTable { key } => {
                let pos = self
                    .tables
                    .iter()
                    .position(|e| e.key == *key)
                    .ok_or_else(super::removed)?;
                if self
                    .tables
                    .iter()
                    .any(|e| e.key != *key && e.data.links_to(*key))
                {
                    return Err(CoreError::illegal_state(format!(
                        "table '{}' is the target of links from another table",
                        self.tables[pos].name
                    )));
                }
                self.tables.remove(pos);
                Ok(Effect::None)
            }
            LogOp::RenameTable { key, name } => {
                if name.is_empty() {
                    return Err(CoreError::illegal_argument("table name must not be empty"));
                }
                if self.key_of(name).is_some_and(|k| k != *key) {
                    return Err(CoreError::illegal_argument(format!(
                        "table '{name}' already exists"
                    )));
                }
                self.entry_mut(*key)?.name = name.clone();
                Ok(Effect::None)
            }
            LogOp::AddColumn { table, spec } => {
                self.validate_spec(spec)?;
                let t = self.table_mut(TablePath::root(*table))?;
                if t.column_index(&spec.name).is_some() {
                    return Err(CoreError::illegal_argument(format!(
                        "column '{}' already exists",
                        spec.name
                    )));
                }
                t.add_column(spec.clone());
                Ok(Effect::Schema { table: *table })
            }
            LogOp::RemoveColumn { table, column } => {
                let t = self.table_mut(TablePath::root(*table))?;
                t.column(*column)?;
                t.columns.remove(*column);
                Ok(Effect::Schema { table: *table })
            }
            LogOp::RenameColumn {
                table,
                column,
                name,
            } => {
                let t = self.table_mut(TablePath::root(*table))?;
                t.column(*column)?;
                if name.is_empty() || t.column_index(name).is_some_and(|c| c != *column) {
                    return Err(CoreError::illegal_argument(format!(
                        "invalid column name '{name}'"
                    )));
                }
                t.columns[*column].spec.name = name.clone();
                Ok(Effect::None)
            }
            LogOp::InsertRows { table, at, count } => {
                let (at, count) = (*at, *count);
                let t = self.table_mut(*table)?;
                if at > t.rows {
                    return Err(CoreError::out_of_bounds("row", at, t.rows));
                }
                if count == 0 {
                    return Ok(Effect::None);
                }
                t.insert_rows(at, count);
                if table.sub.is_none() {
                    self.remap_links(table.key, &|r| Some(if r >= at { r + count } else { r }));
                }
                Ok(Effect::Rows {
                    table: *table,
                    from: at,
                })
            }
            LogOp::RemoveRow { table, row } => {
                let row = *row;
                let t = self.table_mut(*table)?;
                t.check_row(row)?;
                t.remove_row(row);
                if table.sub.is_none() {
                    self.remap_links(table.key, &|r| match r {
                        r if r == row => None,
                        r if r > row => Some(r - 1),
                        r => Some(r),
                    });
                }
                Ok(Effect::Rows {
                    table: *table,
                    from: row,
                })
            }
            LogOp::MoveLastOver { table, row } => {
                let row = *row;
                let t = self.table_mut(*table)?;
                t.check_row(row)?;
                let last = t.rows - 1;
                t.move_last_over(row);
                if table.sub.is_none() {
                    self.remap_links(table.key, &|r| match r {
                        r if r == row => None,
                        r if r == last => Some(row),
                        r => Some(r),
                    });
                }
                Ok(Effect::Rows {
                    table: *table,
                    from: row,
                })
            }
            LogOp::Clear { table } => {
                self.table_mut(*table)?.clear();
                if table.sub.is_none() {
                    self.remap_links(table.key, &|_| None);
                }
                Ok(Effect::Rows {
                    table: *table,
                    from: 0,
                })
            }
            LogOp::Set {
                table,
                column,
                row,
                cell,
            } => {
                let target_rows = match table.sub {
                    None => self.target_rows(table.key, *column).ok(),
                    Some(_) => None,
                };
                let t = self.table(*table)?;
                t.check_row(*row)?;
                check_cell(t.spec(*column)?, *column, cell, target_rows)?;
                *self.table_mut(*table)?.cell_mut(*column, *row)? = cell.clone();
                Ok(Effect::None)
            }
            LogOp::LinkListInsert {
                table,
                column,
                row,
                pos,
                target,
            } => {
                self.check_target(*table, *column, *target)?;
                let list = self.link_list_mut(*table, *column, *row)?;
                if *pos > list.len() {
                    return Err(CoreError::out_of_bounds("link position", *pos, list.len()));
                }
                list.insert(*pos, *target);
                Ok(Effect::None)
            }
            LogOp::LinkListSet {
                table,
                column,
                row,
                pos,
                target,
            } => {
                self.check_target(*table, *column, *target)?;
                let list = self.link_list_mut(*table, *column, *row)?;
                let len = list.len();
                let slot = list
                    .get_mut(*pos)
                    .ok_or_else(|| CoreError::out_of_bounds("link position", *pos, len))?;
                *slot = *target;
                Ok(Effect::None)
            }
            LogOp::LinkListMove {
                table,
                column,
                row,
                from,
                to,
            } => {
                let list = self.link_list_mut(*table, *column, *row)?;
                for pos in [*from, *to] {
                    if pos >= list.len() {
                        return Err(CoreError::out_of_bounds("link position", pos, list.len()));
                    }
                }
                let moved = list.remove(*from);
                list.insert(*to, moved);
                Ok(Effect::None)
            }
            LogOp::LinkListRemove {
                table,
                column,
                row,
                pos,
            } => {
                let list = self.link_list_mut(*table, *column, *row)?;
                if *pos >= list.len() {
                    return Err(CoreError::out_of_bounds("link position", *pos, list.len()));
                }
                list.remove(*pos);
                Ok(Effect::None)
            }
            LogOp::LinkListClear { table, column, row } => {
                self.link_list_mut(*table, *column, *row)?.clear();
                Ok(Effect::None)
            }
        }
    }

    fn validate_spec(&self, spec: &ColumnSpec) -> CoreResult<()> {
        if spec.name.is_empty() {
            return Err(CoreError::illegal_argument("column name must not be empty"));
        }
        if spec.nullable && !spec.column_type.supports_null() {
            return Err(CoreError::illegal_argument(format!(
                "{} columns cannot be nullable",
                spec.column_type
            )));
        }
        match (spec.column_type.is_link(), spec.link_target) {
            (true, Some(target)) => {
                self.name_of(target)?;
            }
            (true, None) => {
                return Err(CoreError::illegal_argument("link column needs a target table"));
            }
            (false, Some(_)) => {
                return Err(CoreError::illegal_argument(
                    "only link columns have a target table",
                ));
            }
            (false, None) => {}
        }
        if spec.column_type == ColumnType::Table {
            for sub in &spec.subcolumns {
                if sub.column_type.is_link() || sub.column_type == ColumnType::Table {
                    return Err(CoreError::illegal_argument(format!(
                        "subtable column '{}' cannot have type {}",
                        sub.name, sub.column_type
                    )));
                }
                if sub.nullable && !sub.column_type.supports_null() {
                    return Err(CoreError::illegal_argument(format!(
                        "{} columns cannot be nullable",
                        sub.column_type
                    )));
                }
            }
        } else if !spec.subcolumns.is_empty() {
            return Err(CoreError::illegal_argument(
                "only table columns have subcolumns",
            ));
        }
        Ok(())
    }

    /// Row count of the table a link column points into.
    pub(crate) fn target_rows(&self, table: TableKey, column: usize) -> CoreResult<usize> {
        let spec = self.table(TablePath::root(table))?.spec(column)?;
        let target = spec
            .link_target
            .ok_or_else(|| CoreError::illegal_argument(format!("column {column} is not a link")))?;
        Ok(self.table(TablePath::root(target))?.rows)
    }

    fn check_target(&self, table: TableKey, column: usize, target: usize) -> CoreResult<()> {
        let rows = self.target_rows(table, column)?;
        if target < rows {
            Ok(())
        } else {
            Err(CoreError::out_of_bounds("link target", target, rows))
        }
    }

    fn link_list_mut(
        &mut self,
        table: TableKey,
        column: usize,
        row: usize,
    ) -> CoreResult<&mut Vec<usize>> {
        let t = self.table_mut(TablePath::root(table))?;
        t.expect_type(column, ColumnType::LinkList)?;
        match t.cell_mut(column, row)? {
            Cell::LinkList(list) => Ok(list),
            _ => Err(CoreError::illegal_state("link list cell holds another type")),
        }
    }
}

fn check_cell(
    spec: &ColumnSpec,
    column: usize,
    cell: &Cell,
    target_rows: Option<usize>,
) -> CoreResult<()> {
    let actual = match cell {
        Cell::Null => {
            return if spec.nullable || spec.column_type == ColumnType::Link {
                Ok(())
            } else {
                Err(CoreError::NullNotAllowed { column })
            };
        }
        Cell::Table(_) => {
            return Err(CoreError::illegal_argument(
                "subtable cells are modified through the subtable",
            ));
        }
        Cell::Int(_) => ColumnType::Int,
        Cell::Bool(_) => ColumnType::Bool,
        Cell::Float(_) => ColumnType::Float,
        Cell::Double(_) => ColumnType::Double,
        Cell::String(_) => ColumnType::String,
        Cell::Binary(_) => ColumnType::Binary,
        Cell::Date(_) => ColumnType::Date,
        Cell::Mixed(_) => ColumnType::Mixed,
        Cell::Link(_) => ColumnType::Link,
        Cell::LinkList(_) => ColumnType::LinkList,
    };
    if actual != spec.column_type {
        return Err(CoreError::TypeMismatch {
            column,
            expected: actual,
            actual: spec.column_type,
        });
    }
    let rows = target_rows.unwrap_or(0);
    let targets: &[usize] = match cell {
        Cell::Link(t) => std::slice::from_ref(t),
        Cell::LinkList(list) => list,
        _ => &[],
    };
    if let Some(&bad) = targets.iter().find(|&&t| t >= rows) {
        return Err(CoreError::out_of_bounds("link target", bad, rows));
    }
    Ok(())
}
