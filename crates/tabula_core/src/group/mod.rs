//! Versioned snapshot data.
//!
//! A [`GroupData`] is the complete state of one file at one version. Committed
//! group data is immutable and shared through `Arc`; a write transaction
//! works on a clone whose tables are copied on first write. Every mutation is
//! a [`LogOp`] applied through [`GroupData::apply`], which is also how the
//! commit log is replayed on open.

mod cell;
mod ops;
mod table;

pub(crate) use cell::Cell;
pub(crate) use ops::{Effect, LogOp};
pub use table::ColumnSpec;
pub(crate) use table::TableData;

use crate::error::{CoreError, CoreResult};
use crate::types::TableKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Address of a table: a top-level table, or the subtable held in one cell of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct TablePath {
    pub(crate) key: TableKey,
    /// `(column, row)` of the subtable cell.
    pub(crate) sub: Option<(usize, usize)>,
}

impl TablePath {
    pub(crate) const fn root(key: TableKey) -> Self {
        Self { key, sub: None }
    }

    pub(crate) const fn subtable(key: TableKey, column: usize, row: usize) -> Self {
        Self {
            key,
            sub: Some((column, row)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TableEntry {
    pub(crate) key: TableKey,
    pub(crate) name: String,
    pub(crate) data: Arc<TableData>,
}

/// All tables of a file at one version, in creation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub(crate) struct GroupData {
    pub(crate) tables: Vec<TableEntry>,
    pub(crate) next_key: u32,
}

impl GroupData {
    pub(crate) fn entry(&self, key: TableKey) -> Option<&TableEntry> {
        self.tables.iter().find(|e| e.key == key)
    }

    fn entry_mut(&mut self, key: TableKey) -> CoreResult<&mut TableEntry> {
        self.tables
            .iter_mut()
            .find(|e| e.key == key)
            .ok_or_else(removed)
    }

    pub(crate) fn key_of(&self, name: &str) -> Option<TableKey> {
        self.tables.iter().find(|e| e.name == name).map(|e| e.key)
    }

    pub(crate) fn name_of(&self, key: TableKey) -> CoreResult<&str> {
        self.entry(key).map(|e| e.name.as_str()).ok_or_else(removed)
    }

    pub(crate) fn next_table_key(&self) -> TableKey {
        TableKey::new(self.next_key)
    }

    /// Resolves a path for reading.
    pub(crate) fn table(&self, path: TablePath) -> CoreResult<&TableData> {
        let root = self.entry(path.key).ok_or_else(removed)?;
        match path.sub {
            None => Ok(&root.data),
            Some((column, row)) => match root.data.cell(column, row)? {
                Cell::Table(t) => Ok(t),
                _ => Err(CoreError::illegal_state("cell does not hold a subtable")),
            },
        }
    }

    /// Resolves a path for writing, copying the shared root table if needed.
    pub(crate) fn table_mut(&mut self, path: TablePath) -> CoreResult<&mut TableData> {
        let root = Arc::make_mut(&mut self.entry_mut(path.key)?.data);
        match path.sub {
            None => Ok(root),
            Some((column, row)) => match root.cell_mut(column, row)? {
                Cell::Table(t) => Ok(t),
                _ => Err(CoreError::illegal_state("cell does not hold a subtable")),
            },
        }
    }

    /// Applies `map` to every link into `target`, across all tables.
    fn remap_links(&mut self, target: TableKey, map: &dyn Fn(usize) -> Option<usize>) {
        for entry in &mut self.tables {
            if entry.data.links_to(target) {
                Arc::make_mut(&mut entry.data).remap_links(target, map);
            }
        }
    }

    /// Total number of rows in top-level tables.
    pub(crate) fn total_rows(&self) -> usize {
        self.tables.iter().map(|e| e.data.rows).sum()
    }
}

fn removed() -> CoreError {
    CoreError::illegal_state("table has been removed")
}
