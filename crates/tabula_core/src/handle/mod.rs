//! Accessor objects handed out by a transaction.
//!
//! | Handle | Valid until |
//! |--------|-------------|
//! | [`Group`], [`Table`] | the transaction ends |
//! | subtable [`Table`] | the snapshot moves, or its parent row moves |
//! | [`Row`], [`View`], [`LinkView`] | the snapshot moves, or a row they refer to moves |
//! | [`crate::Query`] | the snapshot moves, or the table schema changes |
//!
//! "The snapshot moves" means `advance_read`, a `promote_to_write` onto a
//! newer version, or `rollback_and_continue_as_read` after changes. A handle
//! used past its validity fails with [`crate::CoreError::Stale`]; one used
//! after its transaction ended fails the same way.

mod group;
mod link_view;
mod row;
mod table;
mod view;

pub use group::Group;
pub use link_view::LinkView;
pub use row::Row;
pub use table::Table;
pub use view::View;

pub(crate) use view::sort_rows;

use crate::error::CoreError;

fn null_cell(column: usize, row: usize) -> CoreError {
    CoreError::illegal_state(format!("cell ({column}, {row}) is null"))
}

fn wrong_cell() -> CoreError {
    CoreError::illegal_state("cell content does not match its column type")
}
