//! Property tests for transactions, snapshots and handle validity.

use proptest::prelude::*;
use tabula_core::{ColumnType, CoreError, ErrorKind, TransactionState, Version};
use tabula_testkit::prelude::*;

fn expected_transition(state: TransactionState, call: TxnCall) -> Option<TransactionState> {
    use TransactionState::*;
    use TxnCall::*;
    match (state, call) {
        (Idle, BeginRead) => Some(ReadActive),
        (Idle, BeginWrite) => Some(WriteActive),
        (Idle, BeginImplicit) => Some(ImplicitReadActive),
        (ReadActive | ImplicitReadActive, EndRead) => Some(Idle),
        (WriteActive, Commit) => Some(Idle),
        (WriteActive | ImplicitWriteActive, Rollback) => Some(Idle),
        (ImplicitReadActive, AdvanceRead) => Some(ImplicitReadActive),
        (ImplicitReadActive, PromoteToWrite) => Some(ImplicitWriteActive),
        (ImplicitWriteActive, CommitAndContinue | RollbackAndContinue) => {
            Some(ImplicitReadActive)
        }
        _ => None,
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    /// Every call either performs the documented transition or fails with
    /// `IllegalState` and leaves the state alone. Commits produce strictly
    /// increasing versions and nothing else moves the version.
    #[test]
    fn state_machine_follows_the_transition_table(
        calls in prop::collection::vec(txn_call_strategy(), 1..40)
    ) {
        let db = TestDatabase::memory();
        let mut read_guards = Vec::new();
        let mut write_guards = Vec::new();
        let mut version = db.current_version().unwrap();

        for call in calls {
            let before = db.state();
            let expected = expected_transition(before, call);
            let result: Result<Option<Version>, CoreError> = match call {
                TxnCall::BeginRead => db.begin_read().map(|g| {
                    read_guards.push(g);
                    None
                }),
                TxnCall::BeginWrite => db.begin_write().map(|g| {
                    write_guards.push(g);
                    None
                }),
                TxnCall::EndRead => db.end_read().map(|()| None),
                TxnCall::Commit => db.commit().map(Some),
                TxnCall::Rollback => db.rollback().map(|()| None),
                TxnCall::BeginImplicit => db.begin_implicit_transaction().map(|_| None),
                TxnCall::AdvanceRead => db.advance_read().map(|_| None),
                TxnCall::PromoteToWrite => db.promote_to_write().map(|()| None),
                TxnCall::CommitAndContinue => db.commit_and_continue_as_read().map(Some),
                TxnCall::RollbackAndContinue => db.rollback_and_continue_as_read().map(|()| None),
            };

            match (expected, result) {
                (Some(after), Ok(committed)) => {
                    prop_assert_eq!(db.state(), after);
                    if let Some(v) = committed {
                        prop_assert!(v > version);
                        version = v;
                    }
                }
                (None, Err(e)) => {
                    prop_assert!(matches!(e, CoreError::IllegalState { .. }), "{:?}", e);
                    prop_assert_eq!(db.state(), before);
                }
                (expected, result) => {
                    prop_assert!(false, "{:?} in {}: expected {:?}, got {:?}", call, before, expected, result);
                }
            }
            prop_assert_eq!(db.current_version().unwrap(), version);
        }
    }

    /// A reader pinned before a burst of commits on another handle keeps
    /// seeing exactly the rows it started with.
    #[test]
    fn read_snapshot_is_immutable(
        ops in prop::collection::vec(row_op_strategy(), 1..30),
        initial in 0usize..8,
    ) {
        let db = TestDatabase::memory();
        scenarios::numbers(&db, "n", initial);
        let expected: Vec<i64> = (0..initial as i64).collect();

        let rt = db.begin_read().unwrap();
        let pinned = rt.get_table("n").unwrap();

        let writer = db.another_handle();
        let mut model = RowModel::from_values(expected.clone());
        for chunk in ops.chunks(4) {
            let wt = writer.begin_write().unwrap();
            let t = wt.get_table("n").unwrap();
            for op in chunk {
                model.apply(&t, op).unwrap();
            }
            wt.commit().unwrap();
        }

        prop_assert_eq!(pinned.size().unwrap(), expected.len());
        for (row, v) in expected.iter().enumerate() {
            prop_assert_eq!(pinned.get_long(0, row).unwrap(), *v);
        }
        rt.end_read().unwrap();

        let rt = db.begin_read().unwrap();
        model.assert_matches(&rt.get_table("n").unwrap()).unwrap();
    }

    /// Rolling back never changes the file's version or contents.
    #[test]
    fn rollback_is_invisible(ops in prop::collection::vec(row_op_strategy(), 1..20)) {
        let db = TestDatabase::memory();
        let version = scenarios::numbers(&db, "n", 3);

        let wt = db.begin_write().unwrap();
        let t = wt.get_table("n").unwrap();
        let mut model = RowModel::from_values(vec![0, 1, 2]);
        for op in &ops {
            model.apply(&t, op).unwrap();
        }
        wt.rollback().unwrap();

        prop_assert_eq!(db.current_version().unwrap(), version);
        let rt = db.begin_read().unwrap();
        let t = rt.get_table("n").unwrap();
        prop_assert_eq!(t.size().unwrap(), 3);
        prop_assert_eq!(t.get_long(0, 2).unwrap(), 2);
    }

    /// Every scalar type returns what was stored, with dates rounded down
    /// to whole seconds.
    #[test]
    fn typed_cells_round_trip((ty, value) in typed_value_strategy()) {
        let db = TestDatabase::memory();
        let wt = db.begin_write().unwrap();
        let t = wt.get_table("cells").unwrap();
        t.add_column(ty, "c").unwrap();
        t.add_empty_row().unwrap();
        t.set_value(0, 0, value.clone()).unwrap();
        prop_assert_eq!(t.get_value(0, 0).unwrap(), stored_form(&value));
        wt.commit().unwrap();

        let rt = db.begin_read().unwrap();
        prop_assert_eq!(rt.get_table("cells").unwrap().get_value(0, 0).unwrap(), stored_form(&value));
    }

    /// `set_date(t)` then `get_date()` yields `t` floored to a whole second.
    #[test]
    fn dates_truncate_to_seconds(ms in date_strategy()) {
        let db = TestDatabase::memory();
        let wt = db.begin_write().unwrap();
        let t = wt.get_table("dates").unwrap();
        t.add_column(ColumnType::Date, "d").unwrap();
        t.add_empty_row().unwrap();
        t.set_date(0, 0, ms).unwrap();
        let stored = t.get_date(0, 0).unwrap();
        prop_assert_eq!(stored % 1000, 0);
        prop_assert!(stored <= ms);
        prop_assert!(ms - stored < 1000);
    }

    /// Link lists behave like a `Vec` of target rows under every edit.
    #[test]
    fn link_list_edits_match_a_vec(
        ops in prop::collection::vec(link_op_strategy(), 1..40),
        targets in 1usize..6,
    ) {
        let db = TestDatabase::memory();
        scenarios::linked(&db, "origin", "target", targets);

        let wt = db.begin_write().unwrap();
        let links = wt.get_table("origin").unwrap().get_link_list(0, 0).unwrap();
        let mut model = LinkModel::new(targets);
        for op in &ops {
            model.apply(&links, op).unwrap();
            model.assert_matches(&links).unwrap();
        }
        wt.commit().unwrap();

        let rt = db.begin_read().unwrap();
        let links = rt.get_table("origin").unwrap().get_link_list(0, 0).unwrap();
        model.assert_matches(&links).unwrap();
    }

    /// A view over every row goes stale exactly when a row at or before its
    /// last row is inserted, removed or moved; appends and sets leave it
    /// usable.
    #[test]
    fn views_go_stale_on_structural_edits(
        ops in prop::collection::vec(row_op_strategy(), 1..30)
    ) {
        let db = TestDatabase::memory();
        scenarios::numbers(&db, "n", 2);
        let wt = db.begin_write().unwrap();
        let t = wt.get_table("n").unwrap();
        let mut model = RowModel::from_values(vec![0, 1]);

        for op in &ops {
            let view = t.where_().unwrap().find_all().unwrap();
            let covered = view.size().unwrap();
            let structural = model.apply(&t, op).unwrap();
            match view.size() {
                Ok(size) => {
                    prop_assert!(!structural || covered == 0, "{:?} kept the view", op);
                    prop_assert_eq!(size, covered);
                }
                Err(e) => {
                    prop_assert!(structural, "{:?} made the view stale", op);
                    prop_assert_eq!(e.kind(), ErrorKind::Staleness);
                }
            }
        }
        model.assert_matches(&t).unwrap();
    }
}
