//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use std::path::{Path, PathBuf};
use tabula_core::{Durability, SharedGroup};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database handle.
    pub db: SharedGroup,
    path: PathBuf,
    durability: Durability,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    ///
    /// The path is unique to this fixture, so tests never share state.
    pub fn memory() -> Self {
        Self::open(Durability::MemOnly)
    }

    /// Creates a new file-based test database with full durability.
    pub fn file() -> Self {
        Self::open(Durability::Full)
    }

    fn open(durability: Durability) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.tdb");
        let db = SharedGroup::open(&path, durability, false).expect("Failed to open database");
        Self {
            db,
            path,
            durability,
            _temp_dir: temp_dir,
        }
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens another handle on the same file, as a second thread would.
    pub fn another_handle(&self) -> SharedGroup {
        SharedGroup::open(&self.path, self.durability, true).expect("Failed to open second handle")
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = SharedGroup;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use tabula_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         let wt = db.begin_write().unwrap();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&SharedGroup) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&SharedGroup, &Path) -> R,
{
    let test_db = TestDatabase::file();
    f(&test_db.db, test_db.path())
}

/// Test scenario helpers.
pub mod scenarios {
    use tabula_core::{ColumnType, SharedGroup, Version};

    /// Name of the table created by [`people`].
    pub const PEOPLE: &str = "Person";
    /// Column index of the name column in [`PEOPLE`].
    pub const NAME: usize = 0;
    /// Column index of the age column in [`PEOPLE`].
    pub const AGE: usize = 1;

    /// Creates (or extends) the person table with the given rows.
    pub fn people(db: &SharedGroup, rows: &[(&str, i64)]) -> Version {
        let wt = db.begin_write().expect("begin_write");
        let t = wt.get_table(PEOPLE).expect("get_table");
        if t.column_count().expect("column_count") == 0 {
            t.add_column(ColumnType::String, "name").expect("add name");
            t.add_column(ColumnType::Int, "age").expect("add age");
        }
        for (name, age) in rows {
            let row = t.add_empty_row().expect("add_empty_row");
            t.set_string(NAME, row, name).expect("set name");
            t.set_long(AGE, row, *age).expect("set age");
        }
        wt.commit().expect("commit")
    }

    /// Creates a table of `rows` integers `0..rows` in column 0.
    pub fn numbers(db: &SharedGroup, name: &str, rows: usize) -> Version {
        let wt = db.begin_write().expect("begin_write");
        let t = wt.get_table(name).expect("get_table");
        t.add_column(ColumnType::Int, "n").expect("add_column");
        let first = t.add_empty_rows(rows).expect("add_empty_rows");
        for row in first..first + rows {
            t.set_long(0, row, row as i64).expect("set_long");
        }
        wt.commit().expect("commit")
    }

    /// Creates `origin` with a link-list column (0) into `target`, which gets
    /// `targets` rows numbered in column 0. The origin has one row.
    pub fn linked(db: &SharedGroup, origin: &str, target: &str, targets: usize) -> Version {
        numbers(db, target, targets);
        let wt = db.begin_write().expect("begin_write");
        let t = wt.get_table(target).expect("get_table");
        let o = wt.get_table(origin).expect("get_table");
        o.add_column_link(ColumnType::LinkList, "links", &t)
            .expect("add_column_link");
        o.add_empty_row().expect("add_empty_row");
        wt.commit().expect("commit")
    }

    /// Reads the single-integer counter at row 0 of `table`.
    pub fn read_counter(db: &SharedGroup, table: &str) -> i64 {
        let rt = db.begin_read().expect("begin_read");
        rt.get_table(table)
            .expect("get_table")
            .get_long(0, 0)
            .expect("get_long")
    }
}
