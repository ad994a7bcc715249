//! Scoped transaction objects.

use crate::error::CoreResult;
use crate::handle::Group;
use crate::types::Version;
use std::ops::Deref;
use tracing::{debug, warn};

/// An explicit read transaction.
///
/// Dereferences to the [`Group`] it reads. Dropping it ends the read unless
/// it was already ended through the [`super::SharedGroup`].
#[derive(Debug)]
pub struct ReadTransaction {
    group: Group,
}

impl ReadTransaction {
    pub(crate) fn new(group: Group) -> Self {
        Self { group }
    }

    /// Ends the read transaction.
    pub fn end_read(self) -> CoreResult<()> {
        self.group.ensure_current()?;
        self.group.session().end_read()
    }
}

impl Deref for ReadTransaction {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.group
    }
}

impl Drop for ReadTransaction {
    fn drop(&mut self) {
        if self.group.is_current() {
            if let Err(e) = self.group.session().end_read() {
                warn!(error = %e, "ending read transaction on drop failed");
            }
        }
    }
}

/// An explicit write transaction.
///
/// Dereferences to the [`Group`] it writes. Dropping it without
/// [`WriteTransaction::commit`] rolls the transaction back.
#[derive(Debug)]
pub struct WriteTransaction {
    group: Group,
}

impl WriteTransaction {
    pub(crate) fn new(group: Group) -> Self {
        Self { group }
    }

    /// Commits and returns the new version.
    pub fn commit(self) -> CoreResult<Version> {
        self.group.ensure_current()?;
        self.group.session().commit()
    }

    /// Discards every change made in the transaction.
    pub fn rollback(self) -> CoreResult<()> {
        self.group.ensure_current()?;
        self.group.session().rollback()
    }
}

impl Deref for WriteTransaction {
    type Target = Group;

    fn deref(&self) -> &Group {
        &self.group
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if self.group.is_current() {
            debug!("write transaction dropped without commit, rolling back");
            if let Err(e) = self.group.session().rollback() {
                warn!(error = %e, "rollback on drop failed, write lock stays held");
            }
        }
    }
}
