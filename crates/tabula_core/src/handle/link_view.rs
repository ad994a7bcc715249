//! Link list accessor.

use super::{wrong_cell, Row, Table};
use crate::context::{ArenaTicket, HandleKind};
use crate::error::{CoreError, CoreResult};
use crate::group::{Cell, LogOp};
use crate::query::{Query, Restriction};
use crate::transaction::SessionState;
use crate::types::TableKey;

/// The ordered links held in one `LinkList` cell.
///
/// Entries are row indices of the target table. They follow the target rows
/// when those are inserted or removed, so the view itself only goes stale
/// when the row holding the list moves or the snapshot moves.
pub struct LinkView {
    origin: Table,
    column: usize,
    row: usize,
    target: TableKey,
    epoch: u64,
    generation: usize,
    _ticket: ArenaTicket,
}

impl LinkView {
    pub(crate) fn new(
        origin: Table,
        column: usize,
        row: usize,
        target: TableKey,
        epoch: u64,
        generation: usize,
    ) -> Self {
        let ticket = origin.session().register(HandleKind::LinkView, epoch);
        Self {
            origin,
            column,
            row,
            target,
            epoch,
            generation,
            _ticket: ticket,
        }
    }

    fn check(&self, s: &SessionState) -> CoreResult<()> {
        self.origin.check(s)?;
        s.check_epoch(self.epoch)?;
        s.check_rows(self.origin.path(), self.generation, Some(self.row))?;
        s.check_schema(self.origin.path().key, self.generation)
    }

    fn read<R>(&self, f: impl FnOnce(&[usize]) -> CoreResult<R>) -> CoreResult<R> {
        self.origin.session().read(|s| {
            self.check(s)?;
            match s.group()?.table(self.origin.path())?.cell(self.column, self.row)? {
                Cell::LinkList(list) => f(list),
                _ => Err(wrong_cell()),
            }
        })
    }

    fn mutate(&self, f: impl FnOnce(&[usize]) -> CoreResult<LogOp>) -> CoreResult<()> {
        self.origin.session().write(|s| {
            let op = {
                self.check(s)?;
                s.ensure_writable()?;
                match s.group()?.table(self.origin.path())?.cell(self.column, self.row)? {
                    Cell::LinkList(list) => f(list)?,
                    _ => return Err(wrong_cell()),
                }
            };
            self.origin.apply_locked(s, op)
        })
    }

    /// Whether the link view can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.read(|_| Ok(())).is_ok()
    }

    /// Number of links.
    pub fn size(&self) -> CoreResult<usize> {
        self.read(|list| Ok(list.len()))
    }

    /// Whether the list has no links.
    pub fn is_empty(&self) -> CoreResult<bool> {
        self.read(|list| Ok(list.is_empty()))
    }

    /// Target row index of the link at `pos`.
    pub fn get(&self, pos: usize) -> CoreResult<usize> {
        self.read(|list| {
            list.get(pos)
                .copied()
                .ok_or_else(|| CoreError::out_of_bounds("link position", pos, list.len()))
        })
    }

    /// All target row indices, in list order.
    pub fn targets(&self) -> CoreResult<Vec<usize>> {
        self.read(|list| Ok(list.to_vec()))
    }

    /// The table the links point into.
    pub fn target_table(&self) -> CoreResult<Table> {
        let epoch = self.origin.session().read(|s| {
            self.check(s)?;
            Ok(s.epoch)
        })?;
        Ok(self.target_handle(epoch))
    }

    fn target_handle(&self, epoch: u64) -> Table {
        self.origin.sibling(self.target, epoch)
    }

    /// Name of the target table.
    pub fn target_table_name(&self) -> CoreResult<String> {
        self.origin.session().read(|s| {
            self.check(s)?;
            Ok(s.group()?.name_of(self.target)?.to_owned())
        })
    }

    /// Row accessor for the target of the link at `pos`.
    pub fn get_target_row(&self, pos: usize) -> CoreResult<Row> {
        let row = self.get(pos)?;
        self.target_table()?.get_row(row)
    }

    /// Appends a link to `target_row`.
    pub fn add(&self, target_row: usize) -> CoreResult<()> {
        let (table, column, row) = (self.origin.path().key, self.column, self.row);
        self.mutate(|list| {
            Ok(LogOp::LinkListInsert {
                table,
                column,
                row,
                pos: list.len(),
                target: target_row,
            })
        })
    }

    /// Inserts a link at `pos`. `pos == size()` appends.
    pub fn insert(&self, pos: usize, target_row: usize) -> CoreResult<()> {
        let (table, column, row) = (self.origin.path().key, self.column, self.row);
        self.mutate(|_| {
            Ok(LogOp::LinkListInsert {
                table,
                column,
                row,
                pos,
                target: target_row,
            })
        })
    }

    /// Replaces the link at `pos`.
    pub fn set(&self, pos: usize, target_row: usize) -> CoreResult<()> {
        let (table, column, row) = (self.origin.path().key, self.column, self.row);
        self.mutate(|_| {
            Ok(LogOp::LinkListSet {
                table,
                column,
                row,
                pos,
                target: target_row,
            })
        })
    }

    /// Moves the link at `from` so that it ends up at `to`.
    ///
    /// The other links keep their relative order.
    pub fn move_link(&self, from: usize, to: usize) -> CoreResult<()> {
        let (table, column, row) = (self.origin.path().key, self.column, self.row);
        self.mutate(|_| {
            Ok(LogOp::LinkListMove {
                table,
                column,
                row,
                from,
                to,
            })
        })
    }

    /// Removes the link at `pos`. The target row is untouched.
    pub fn remove(&self, pos: usize) -> CoreResult<()> {
        let (table, column, row) = (self.origin.path().key, self.column, self.row);
        self.mutate(|_| {
            Ok(LogOp::LinkListRemove {
                table,
                column,
                row,
                pos,
            })
        })
    }

    /// Removes every link.
    pub fn clear(&self) -> CoreResult<()> {
        let (table, column, row) = (self.origin.path().key, self.column, self.row);
        self.mutate(|_| Ok(LogOp::LinkListClear { table, column, row }))
    }

    /// Starts a query over the target rows, in list order.
    pub fn where_(&self) -> CoreResult<Query> {
        self.origin.session().read(|s| {
            self.check(s)?;
            let restriction = Restriction::LinkList {
                origin: self.origin.path(),
                column: self.column,
                row: self.row,
                generation: self.generation,
            };
            Ok(Query::new(self.target_handle(s.epoch), Some(restriction), s))
        })
    }
}

impl std::fmt::Debug for LinkView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkView")
            .field("origin", &self.origin)
            .field("column", &self.column)
            .field("row", &self.row)
            .finish()
    }
}
