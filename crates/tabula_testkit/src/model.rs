//! Reference models for row and link-list edits.
//!
//! Each model mirrors a table or link list as a plain `Vec`, applies the same
//! generated edits to both, and checks that they agree.

use crate::generators::{LinkOp, RowOp};
use tabula_core::{CoreResult, LinkView, Table};

/// Mirror of a table whose column 0 is an integer column.
#[derive(Debug, Default, Clone)]
pub struct RowModel {
    values: Vec<i64>,
}

impl RowModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model of a table that already holds `values`.
    pub fn from_values(values: Vec<i64>) -> Self {
        Self { values }
    }

    /// Expected column contents.
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the model has no rows.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Applies `op` to the model and to `table`.
    ///
    /// Ops that need a row are skipped on an empty table. Returns whether
    /// the op removed or inserted a row before the end of the table.
    pub fn apply(&mut self, table: &Table, op: &RowOp) -> CoreResult<bool> {
        let len = self.values.len();
        match *op {
            RowOp::Append(v) => {
                let row = table.add_empty_row()?;
                table.set_long(0, row, v)?;
                self.values.push(v);
                Ok(false)
            }
            RowOp::Insert(pos, v) => {
                let at = pos % (len + 1);
                table.insert_empty_row(at)?;
                table.set_long(0, at, v)?;
                self.values.insert(at, v);
                Ok(at < len)
            }
            _ if len == 0 => Ok(false),
            RowOp::Remove(pos) => {
                let row = pos % len;
                table.remove(row)?;
                self.values.remove(row);
                Ok(true)
            }
            RowOp::MoveLastOver(pos) => {
                let row = pos % len;
                table.move_last_over(row)?;
                self.values.swap_remove(row);
                Ok(true)
            }
            RowOp::Set(pos, v) => {
                let row = pos % len;
                table.set_long(0, row, v)?;
                self.values[row] = v;
                Ok(false)
            }
        }
    }

    /// Asserts that `table` holds exactly the modelled values.
    ///
    /// # Panics
    ///
    /// Panics on any difference.
    pub fn assert_matches(&self, table: &Table) -> CoreResult<()> {
        assert_eq!(table.size()?, self.values.len(), "row count");
        for (row, expected) in self.values.iter().enumerate() {
            assert_eq!(table.get_long(0, row)?, *expected, "row {row}");
        }
        Ok(())
    }
}

/// Mirror of one link list.
#[derive(Debug, Clone)]
pub struct LinkModel {
    targets: Vec<usize>,
    target_rows: usize,
}

impl LinkModel {
    /// Creates an empty list model over a target table of `target_rows` rows.
    ///
    /// # Panics
    ///
    /// Panics if `target_rows` is zero.
    pub fn new(target_rows: usize) -> Self {
        assert!(target_rows > 0, "link target table needs rows");
        Self {
            targets: Vec::new(),
            target_rows,
        }
    }

    /// Expected target rows, in list order.
    pub fn targets(&self) -> &[usize] {
        &self.targets
    }

    /// Applies `op` to the model and to `links`.
    ///
    /// Ops that need an existing link are skipped on an empty list.
    pub fn apply(&mut self, links: &LinkView, op: &LinkOp) -> CoreResult<()> {
        let len = self.targets.len();
        match *op {
            LinkOp::Add(t) => {
                let target = t % self.target_rows;
                links.add(target)?;
                self.targets.push(target);
            }
            LinkOp::Insert(pos, t) => {
                let (pos, target) = (pos % (len + 1), t % self.target_rows);
                links.insert(pos, target)?;
                self.targets.insert(pos, target);
            }
            _ if len == 0 => {}
            LinkOp::Set(pos, t) => {
                let (pos, target) = (pos % len, t % self.target_rows);
                links.set(pos, target)?;
                self.targets[pos] = target;
            }
            LinkOp::Move(from, to) => {
                let (from, to) = (from % len, to % len);
                links.move_link(from, to)?;
                let moved = self.targets.remove(from);
                self.targets.insert(to, moved);
            }
            LinkOp::Remove(pos) => {
                let pos = pos % len;
                links.remove(pos)?;
                self.targets.remove(pos);
            }
        }
        Ok(())
    }

    /// Asserts that `links` holds exactly the modelled targets.
    ///
    /// # Panics
    ///
    /// Panics on any difference.
    pub fn assert_matches(&self, links: &LinkView) -> CoreResult<()> {
        assert_eq!(links.targets()?, self.targets);
        Ok(())
    }
}
