//! Benchmark utilities.

use rand::Rng;
use tabula_core::{ColumnType, Durability, SharedGroup};
use tempfile::TempDir;

/// Column indices of the table built by [`populate`].
pub mod columns {
    /// Integer column, uniformly random in `0..1000`.
    pub const SCORE: usize = 0;
    /// String column, `name-<n>`.
    pub const NAME: usize = 1;
    /// Double column, uniformly random in `0.0..1.0`.
    pub const RATIO: usize = 2;
}

/// Opens a fresh database in its own temporary directory.
pub fn open_db(durability: Durability) -> (TempDir, SharedGroup) {
    let dir = TempDir::new().expect("tempdir");
    let db = SharedGroup::open(&dir.path().join("bench.tdb"), durability, false).expect("open");
    (dir, db)
}

/// Fills `table` with `rows` rows of random data in one commit.
pub fn populate(db: &SharedGroup, table: &str, rows: usize) {
    let mut rng = rand::thread_rng();
    let wt = db.begin_write().expect("begin_write");
    let t = wt.get_table(table).expect("get_table");
    t.add_column(ColumnType::Int, "score").expect("score");
    t.add_column(ColumnType::String, "name").expect("name");
    t.add_column(ColumnType::Double, "ratio").expect("ratio");
    let first = t.add_empty_rows(rows).expect("rows");
    for row in first..first + rows {
        t.set_long(columns::SCORE, row, rng.gen_range(0..1000))
            .expect("set score");
        t.set_string(columns::NAME, row, &format!("name-{row}"))
            .expect("set name");
        t.set_double(columns::RATIO, row, rng.gen())
            .expect("set ratio");
    }
    wt.commit().expect("commit");
}

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}
