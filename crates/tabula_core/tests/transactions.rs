//! Integration tests for the transaction state machine.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::io;
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;
use tabula_core::{
    ColumnType, CoreError, Durability, ErrorKind, SharedGroup, TransactionState, Version,
};
use tempfile::TempDir;

fn mem_db() -> (TempDir, PathBuf, SharedGroup) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tx.db");
    let db = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
    (dir, path, db)
}

fn add_counter(db: &SharedGroup) {
    let wt = db.begin_write().unwrap();
    let t = wt.get_table("counter").unwrap();
    t.add_column(ColumnType::Int, "n").unwrap();
    t.add_empty_row().unwrap();
    wt.commit().unwrap();
}

fn read_counter(db: &SharedGroup) -> i64 {
    let rt = db.begin_read().unwrap();
    rt.get_table("counter").unwrap().get_long(0, 0).unwrap()
}

fn bump_counter(path: &Path) -> Version {
    let db = SharedGroup::open(path, Durability::MemOnly, true).unwrap();
    let wt = db.begin_write().unwrap();
    let t = wt.get_table("counter").unwrap();
    let n = t.get_long(0, 0).unwrap();
    t.set_long(0, 0, n + 1).unwrap();
    wt.commit().unwrap()
}

#[test]
fn explicit_transitions() {
    let (_dir, _path, db) = mem_db();
    assert_eq!(db.state(), TransactionState::Idle);

    let rt = db.begin_read().unwrap();
    assert_eq!(db.state(), TransactionState::ReadActive);
    rt.end_read().unwrap();
    assert_eq!(db.state(), TransactionState::Idle);

    let wt = db.begin_write().unwrap();
    assert_eq!(db.state(), TransactionState::WriteActive);
    wt.rollback().unwrap();
    assert_eq!(db.state(), TransactionState::Idle);

    let g = db.begin_implicit_transaction().unwrap();
    assert_eq!(db.state(), TransactionState::ImplicitReadActive);
    db.promote_to_write().unwrap();
    assert_eq!(db.state(), TransactionState::ImplicitWriteActive);
    g.get_table("t").unwrap();
    db.commit_and_continue_as_read().unwrap();
    assert_eq!(db.state(), TransactionState::ImplicitReadActive);
    db.end_read().unwrap();
    assert_eq!(db.state(), TransactionState::Idle);
}

#[test]
fn every_illegal_call_is_rejected_without_changing_state() {
    let (_dir, _path, db) = mem_db();

    // Idle
    assert!(matches!(db.end_read(), Err(CoreError::IllegalState { .. })));
    assert!(matches!(db.commit(), Err(CoreError::IllegalState { .. })));
    assert!(matches!(db.rollback(), Err(CoreError::IllegalState { .. })));
    assert!(db.advance_read().is_err());
    assert!(db.promote_to_write().is_err());
    assert_eq!(db.state(), TransactionState::Idle);

    // Read
    let _rt = db.begin_read().unwrap();
    assert!(db.begin_read().is_err());
    assert!(db.begin_write().is_err());
    assert!(db.begin_implicit_transaction().is_err());
    assert!(db.commit().is_err());
    assert!(db.rollback().is_err());
    assert!(db.advance_read().is_err());
    assert_eq!(db.state(), TransactionState::ReadActive);
    db.end_read().unwrap();

    // Write
    let _wt = db.begin_write().unwrap();
    assert!(db.begin_read().is_err());
    assert!(db.end_read().is_err());
    assert!(db.commit_and_continue_as_read().is_err());
    assert!(db.close().is_err());
    assert_eq!(db.state(), TransactionState::WriteActive);
    db.rollback().unwrap();
}

#[test]
fn commit_versions_increase_strictly() {
    let (_dir, _path, db) = mem_db();
    let mut last = db.current_version().unwrap();
    for _ in 0..5 {
        let wt = db.begin_write().unwrap();
        let v = wt.commit().unwrap();
        assert!(v > last);
        last = v;
    }
    let wt = db.begin_write().unwrap();
    wt.rollback().unwrap();
    assert_eq!(db.current_version().unwrap(), last);
}

#[test]
fn readers_keep_their_snapshot() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);

    let rt = db.begin_read().unwrap();
    let before = rt.version().unwrap();
    let t = rt.get_table("counter").unwrap();
    assert_eq!(t.get_long(0, 0).unwrap(), 0);

    let after = bump_counter(&path);
    assert!(after > before);
    assert_eq!(t.get_long(0, 0).unwrap(), 0);
    assert_eq!(rt.version().unwrap(), before);
    assert_eq!(db.pinned_version(), Some(before));
    rt.end_read().unwrap();

    assert_eq!(read_counter(&db), 1);
}

#[test]
fn rollback_discards_changes() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    {
        let wt = db.begin_write().unwrap();
        wt.get_table("counter").unwrap().set_long(0, 0, 99).unwrap();
        wt.get_table("scratch").unwrap();
        wt.rollback().unwrap();
    }
    assert_eq!(read_counter(&db), 0);
    let rt = db.begin_read().unwrap();
    assert!(!rt.has_table("scratch").unwrap());
}

#[test]
fn dropped_write_guard_rolls_back() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    {
        let wt = db.begin_write().unwrap();
        wt.get_table("counter").unwrap().set_long(0, 0, 5).unwrap();
    }
    assert_eq!(db.state(), TransactionState::Idle);
    assert_eq!(read_counter(&db), 0);
}

#[test]
fn handles_from_ended_transactions_are_stale() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    let rt = db.begin_read().unwrap();
    let t = rt.get_table("counter").unwrap();
    rt.end_read().unwrap();

    let _rt = db.begin_read().unwrap();
    let err = t.get_long(0, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Staleness);
    assert!(!t.is_valid());
}

#[test]
fn mutation_during_read_fails() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    let rt = db.begin_read().unwrap();
    let t = rt.get_table("counter").unwrap();
    assert!(matches!(
        t.set_long(0, 0, 1),
        Err(CoreError::IllegalState { .. })
    ));
    assert!(matches!(
        rt.get_table("missing"),
        Err(CoreError::TableNotFound { .. })
    ));
}

#[test]
fn implicit_transaction_advances_and_invalidates_rows() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);

    let group = db.begin_implicit_transaction().unwrap();
    let table = group.get_table("counter").unwrap();
    let row = table.get_row(0).unwrap();
    assert_eq!(row.get_long(0).unwrap(), 0);

    assert!(!db.advance_read().unwrap());
    assert!(row.is_valid());

    bump_counter(&path);
    assert!(db.has_changed().unwrap());
    assert!(db.advance_read().unwrap());
    assert!(!db.has_changed().unwrap());

    assert_eq!(row.get_long(0).unwrap_err().kind(), ErrorKind::Staleness);
    assert_eq!(table.get_long(0, 0).unwrap(), 1);
    assert_eq!(table.get_row(0).unwrap().get_long(0).unwrap(), 1);
    db.end_read().unwrap();
}

#[test]
fn promote_sees_latest_and_commit_keeps_handles() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);

    let group = db.begin_implicit_transaction().unwrap();
    let table = group.get_table("counter").unwrap();
    bump_counter(&path);

    db.promote_to_write().unwrap();
    let row = table.get_row(0).unwrap();
    assert_eq!(row.get_long(0).unwrap(), 1);
    row.set_long(0, 10).unwrap();
    let v = db.commit_and_continue_as_read().unwrap();

    assert_eq!(db.pinned_version(), Some(v));
    assert!(row.is_valid());
    assert_eq!(row.get_long(0).unwrap(), 10);
    assert!(row.set_long(0, 11).is_err());
    db.end_read().unwrap();
}

#[test]
fn rollback_and_continue_restores_base() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);

    let group = db.begin_implicit_transaction().unwrap();
    let table = group.get_table("counter").unwrap();
    let base = db.pinned_version();

    db.promote_to_write().unwrap();
    let row = table.get_row(0).unwrap();
    row.set_long(0, 42).unwrap();
    db.rollback_and_continue_as_read().unwrap();

    assert_eq!(db.state(), TransactionState::ImplicitReadActive);
    assert_eq!(db.pinned_version(), base);
    assert!(!row.is_valid());
    assert_eq!(table.get_long(0, 0).unwrap(), 0);
    db.end_read().unwrap();
}

#[test]
fn single_writer_across_handles() {
    let (_dir, path, db) = mem_db();
    let other = SharedGroup::open(&path, Durability::MemOnly, true).unwrap();

    let wt = db.begin_write().unwrap();
    assert!(matches!(
        other.try_begin_write(),
        Err(CoreError::IllegalState { .. })
    ));
    let _g = other.begin_implicit_transaction().unwrap();
    assert!(other.promote_to_write().is_err());
    assert_eq!(other.state(), TransactionState::ImplicitReadActive);
    wt.commit().unwrap();

    other.promote_to_write().unwrap();
    assert!(db.try_begin_write().is_err());
    other.rollback().unwrap();
    assert_eq!(other.state(), TransactionState::Idle);
}

#[test]
fn blocked_writer_proceeds_after_commit() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);
    let wt = db.begin_write().unwrap();

    let started = Arc::new(Barrier::new(2));
    let writer = {
        let path = path.clone();
        let started = Arc::clone(&started);
        thread::spawn(move || {
            started.wait();
            bump_counter(&path)
        })
    };
    started.wait();
    thread::sleep(Duration::from_millis(50));
    wt.get_table("counter").unwrap().set_long(0, 0, 100).unwrap();
    let first = wt.commit().unwrap();
    let second = writer.join().unwrap();

    assert!(second > first);
    assert_eq!(read_counter(&db), 101);
}

#[test]
fn concurrent_increments_are_serialized() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);
    let threads: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    bump_counter(&path);
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(read_counter(&db), 100);
}

#[test]
fn transactions_are_thread_confined() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    let db = Arc::new(db);
    let _wt = db.begin_write().unwrap();

    let remote = Arc::clone(&db);
    let result = thread::spawn(move || remote.commit()).join().unwrap();
    assert!(matches!(result, Err(CoreError::WrongThread)));
    assert_eq!(db.state(), TransactionState::WriteActive);
    db.rollback().unwrap();
}

#[test]
fn stats_count_pinned_snapshots() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);
    assert_eq!(db.stats().unwrap().pinned_snapshots, 0);

    let other = SharedGroup::open(&path, Durability::MemOnly, true).unwrap();
    let rt = db.begin_read().unwrap();
    let _implicit = other.begin_implicit_transaction().unwrap();
    assert_eq!(db.stats().unwrap().pinned_snapshots, 2);

    rt.end_read().unwrap();
    other.end_read().unwrap();
    assert_eq!(other.stats().unwrap().pinned_snapshots, 0);
}

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_guard_dropped_on_another_thread_warns_and_keeps_the_lock() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);
    let wt = db.begin_write().unwrap();

    let log = CapturedLog::default();
    let writer = log.clone();
    thread::spawn(move || {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, || drop(wt));
    })
    .join()
    .unwrap();

    let output = log.contents();
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains("rollback on drop failed"), "{output}");
    assert_eq!(db.state(), TransactionState::WriteActive);

    let other = SharedGroup::open(&path, Durability::MemOnly, true).unwrap();
    assert!(matches!(
        other.try_begin_write(),
        Err(CoreError::IllegalState { .. })
    ));
    db.rollback().unwrap();
    other.try_begin_write().unwrap().rollback().unwrap();
}

#[test]
fn listeners_fire_on_advance() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);

    let seen = Arc::new(AtomicUsize::new(0));
    let id = {
        let seen = Arc::clone(&seen);
        db.add_listener(move |event| {
            assert!(event.tables.iter().all(|t| t == "counter"));
            seen.fetch_add(1, Ordering::SeqCst);
        })
    };

    let _group = db.begin_implicit_transaction().unwrap();
    bump_counter(&path);
    bump_counter(&path);
    assert!(db.advance_read().unwrap());
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    assert!(!db.notify_listeners().unwrap());
    assert!(db.remove_listener(id));
    bump_counter(&path);
    assert!(db.notify_listeners().unwrap());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    db.end_read().unwrap();
}

#[test]
fn subscribers_receive_every_commit() {
    let (_dir, path, db) = mem_db();
    let rx = db.subscribe().unwrap();
    add_counter(&db);
    let v = bump_counter(&path);

    let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(first.tables, vec!["counter".to_owned()]);
    assert_eq!(second.version, v);
    assert!(matches!(
        rx.try_recv(),
        Err(mpsc::TryRecvError::Empty)
    ));
}

#[test]
fn wait_for_change_wakes_on_commit() {
    let (_dir, path, db) = mem_db();
    add_counter(&db);
    assert!(!db.wait_for_change(Duration::from_millis(10)).unwrap());

    let writer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        bump_counter(&path);
    });
    assert!(db.wait_for_change(Duration::from_secs(5)).unwrap());
    writer.join().unwrap();
}

#[test]
fn close_detaches_the_handle() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    let rt = db.begin_read().unwrap();
    let t = rt.get_table("counter").unwrap();
    rt.end_read().unwrap();

    db.close().unwrap();
    db.close().unwrap();
    assert!(db.is_closed());
    assert!(matches!(db.begin_read(), Err(CoreError::DatabaseClosed)));
    assert!(matches!(t.get_long(0, 0), Err(CoreError::DatabaseClosed)));
}

#[test]
fn stats_count_transitions() {
    let (_dir, _path, db) = mem_db();
    add_counter(&db);
    let wt = db.begin_write().unwrap();
    wt.rollback().unwrap();
    let rt = db.begin_read().unwrap();
    rt.end_read().unwrap();

    let stats = db.stats().unwrap();
    assert!(stats.commits >= 1);
    assert!(stats.rollbacks >= 1);
    assert!(stats.reads_begun >= 1);
    assert!(stats.writes_begun >= 2);
}
