//! Integration tests for tables, rows, views, link views and queries.

use tabula_core::{
    Case, ColumnSpec, ColumnType, CoreError, Durability, ErrorKind, Mixed, Order, SharedGroup,
    Table, Value,
};
use tempfile::TempDir;

const NAME: usize = 0;
const AGE: usize = 1;

fn mem_db() -> (TempDir, SharedGroup) {
    let dir = tempfile::tempdir().unwrap();
    let db = SharedGroup::open(&dir.path().join("handles.db"), Durability::MemOnly, false).unwrap();
    (dir, db)
}

fn add_person(people: &Table, name: &str, age: i64) -> usize {
    let row = people.add_empty_row().unwrap();
    people.set_string(NAME, row, name).unwrap();
    people.set_long(AGE, row, age).unwrap();
    row
}

fn people_table(people: &Table) {
    people.add_column(ColumnType::String, "name").unwrap();
    people.add_column(ColumnType::Int, "age").unwrap();
}

fn assert_stale<T: std::fmt::Debug>(result: Result<T, CoreError>) {
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Staleness);
}

#[test]
fn person_scenario_is_visible_after_commit() {
    let (_dir, db) = mem_db();
    {
        let wt = db.begin_write().unwrap();
        let people = wt.get_table("Person").unwrap();
        people_table(&people);
        add_person(&people, "Alice", 30);
        wt.commit().unwrap();
    }
    let rt = db.begin_read().unwrap();
    let people = rt.get_table("Person").unwrap();
    assert_eq!(people.size().unwrap(), 1);
    assert_eq!(people.get_string(NAME, 0).unwrap().as_deref(), Some("Alice"));
    assert_eq!(people.get_long(AGE, 0).unwrap(), 30);
    assert_eq!(people.column_index("age").unwrap(), Some(AGE));
}

#[test]
fn view_goes_stale_when_its_row_is_removed() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    add_person(&people, "Alice", 30);
    add_person(&people, "Bob", 20);

    let view = people
        .where_()
        .unwrap()
        .greater_than(AGE, 25)
        .unwrap()
        .find_all()
        .unwrap();
    assert_eq!(view.size().unwrap(), 1);
    assert_eq!(view.get_source_row_index(0).unwrap(), 0);

    people.remove(0).unwrap();
    assert!(!view.is_valid());
    assert_stale(view.get_long(AGE, 0));
    assert_stale(view.size());
}

#[test]
fn rows_survive_changes_after_them() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    add_person(&people, "Alice", 30);
    add_person(&people, "Bob", 20);

    let alice = people.get_row(0).unwrap();
    let bob = people.get_row(1).unwrap();
    add_person(&people, "Carol", 40);
    people.set_long(AGE, 1, 21).unwrap();
    assert!(alice.is_valid());
    assert_eq!(bob.get_long(AGE).unwrap(), 21);

    people.insert_empty_row(1).unwrap();
    assert!(alice.is_valid());
    assert!(!bob.is_valid());
    assert_stale(bob.get_string(NAME));
}

#[test]
fn view_remove_keeps_the_view_usable() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for (name, age) in [("A", 50), ("B", 10), ("C", 60), ("D", 70)] {
        add_person(&people, name, age);
    }
    let mut view = people.where_().unwrap().greater_than(AGE, 40).unwrap().find_all().unwrap();
    assert_eq!(view.size().unwrap(), 3);

    view.remove(1).unwrap();
    assert_eq!(people.size().unwrap(), 3);
    assert_eq!(view.size().unwrap(), 2);
    assert_eq!(view.get_string(NAME, 0).unwrap().as_deref(), Some("A"));
    assert_eq!(view.get_string(NAME, 1).unwrap().as_deref(), Some("D"));
    assert_eq!(view.get_source_row_index(1).unwrap(), 2);

    view.clear().unwrap();
    assert!(view.is_empty().unwrap());
    assert_eq!(people.size().unwrap(), 1);
    assert_eq!(people.get_string(NAME, 0).unwrap().as_deref(), Some("B"));
}

#[test]
fn sorted_and_distinct_views() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for (name, age) in [("x", 30), ("y", 10), ("x", 20), ("z", 10)] {
        add_person(&people, name, age);
    }

    let by_age = people.get_sorted_view(AGE, Order::Ascending).unwrap();
    let rows: Vec<usize> = (0..4)
        .map(|i| by_age.get_source_row_index(i).unwrap())
        .collect();
    assert_eq!(rows, vec![1, 3, 2, 0]);

    let mut desc = people.get_sorted_view(AGE, Order::Descending).unwrap();
    assert_eq!(desc.get_long(AGE, 0).unwrap(), 30);
    desc.sort(NAME, Order::Ascending).unwrap();
    assert_eq!(desc.get_string(NAME, 3).unwrap().as_deref(), Some("z"));

    let names = people.distinct(NAME).unwrap();
    assert_eq!(names.size().unwrap(), 3);
    assert_eq!(names.get_source_row_index(1).unwrap(), 1);
}

#[test]
fn view_aggregates() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for age in [10, 20, 30, 40] {
        add_person(&people, "p", age);
    }
    let all = people.where_().unwrap().find_all().unwrap();
    assert_eq!(all.sum_int(AGE).unwrap(), 100);
    assert_eq!(all.min_int(AGE).unwrap(), Some(10));
    assert_eq!(all.max_int(AGE).unwrap(), Some(40));
    assert_eq!(all.average_int(AGE).unwrap(), Some(25.0));
    assert!(all.sum_double(AGE).is_err());

    let none = people.where_().unwrap().greater_than(AGE, 100).unwrap().find_all().unwrap();
    assert_eq!(none.sum_int(AGE).unwrap(), 0);
    assert_eq!(none.max_int(AGE).unwrap(), None);
    assert_eq!(none.average_int(AGE).unwrap(), None);
}

#[test]
fn query_predicates_and_combinators() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for (name, age) in [("Anna", 31), ("bob", 17), ("Alan", 45), ("Zoe", 25)] {
        add_person(&people, name, age);
    }

    let q = people.where_().unwrap();
    assert_eq!(q.count().unwrap(), 4);

    let adults_named_a = people
        .where_()
        .unwrap()
        .greater_than_or_equal(AGE, 18)
        .unwrap()
        .begins_with(NAME, "a", Case::Insensitive)
        .unwrap();
    assert_eq!(adults_named_a.count().unwrap(), 2);

    let young_or_old = people
        .where_()
        .unwrap()
        .less_than(AGE, 20)
        .unwrap()
        .or()
        .unwrap()
        .greater_than(AGE, 40)
        .unwrap();
    let view = young_or_old.find_all().unwrap();
    assert_eq!(view.get_source_row_index(0).unwrap(), 1);
    assert_eq!(view.get_source_row_index(1).unwrap(), 2);

    let not_middle = people
        .where_()
        .unwrap()
        .not()
        .unwrap()
        .group()
        .unwrap()
        .between(AGE, 20, 40)
        .unwrap()
        .end_group()
        .unwrap();
    assert_eq!(not_middle.count().unwrap(), 2);

    assert_eq!(
        people.where_().unwrap().ends_with(NAME, "e", Case::Sensitive).unwrap().find_first().unwrap(),
        Some(3)
    );
    assert_eq!(
        people
            .where_()
            .unwrap()
            .equal_to_string(NAME, "BOB", Case::Insensitive)
            .unwrap()
            .find_first()
            .unwrap(),
        Some(1)
    );
    assert_eq!(people.find_first_string(NAME, "Zoe").unwrap(), Some(3));
    assert_eq!(people.find_first_long(AGE, 99).unwrap(), None);
    assert_eq!(people.find_all_long(AGE, 45).unwrap().size().unwrap(), 1);
}

#[test]
fn malformed_queries_are_rejected() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);

    assert!(people.where_().unwrap().or().is_err());
    assert!(people.where_().unwrap().end_group().is_err());
    assert!(people.where_().unwrap().greater_than(NAME, 3).is_err());
    assert!(people.where_().unwrap().contains(AGE, "1", Case::Sensitive).is_err());
    assert!(people.where_().unwrap().equal_to(7, 1).is_err());

    let open_group = people.where_().unwrap().group().unwrap();
    assert!(matches!(open_group.count(), Err(CoreError::IllegalState { .. })));
    let dangling_or = people.where_().unwrap().equal_to(AGE, 1).unwrap().or().unwrap();
    assert!(matches!(dangling_or.find_all(), Err(CoreError::IllegalState { .. })));
}

#[test]
fn query_goes_stale_on_schema_change() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    add_person(&people, "Alice", 30);

    let q = people.where_().unwrap().greater_than(AGE, 1).unwrap();
    add_person(&people, "Bob", 40);
    assert_eq!(q.count().unwrap(), 2);

    people.add_column(ColumnType::Bool, "member").unwrap();
    assert_stale(q.count());
}

#[test]
fn query_remove_and_limits() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for age in [5, 50, 6, 60, 7, 70] {
        add_person(&people, "p", age);
    }

    let adults = people.where_().unwrap().greater_than(AGE, 18).unwrap();
    let limited = adults.find_all_limited(2, None, Some(1)).unwrap();
    assert_eq!(limited.size().unwrap(), 1);
    assert_eq!(limited.get_source_row_index(0).unwrap(), 3);
    assert!(adults.find_all_limited(4, Some(2), None).is_err());
    assert!(adults.find_all_limited(0, Some(99), None).is_err());

    let mut kids = people.where_().unwrap().less_than(AGE, 18).unwrap();
    assert_eq!(kids.remove().unwrap(), 3);
    assert_eq!(people.size().unwrap(), 3);
    assert_eq!(people.where_().unwrap().find_all().unwrap().min_int(AGE).unwrap(), Some(50));
}

#[test]
fn limited_query_reports_staleness_before_range_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handles.db");
    let db = SharedGroup::open(&path, Durability::MemOnly, false).unwrap();
    {
        let wt = db.begin_write().unwrap();
        let people = wt.get_table("Person").unwrap();
        people_table(&people);
        for age in [20, 30, 40] {
            add_person(&people, "p", age);
        }
        wt.commit().unwrap();
    }

    let group = db.begin_implicit_transaction().unwrap();
    let people = group.get_table("Person").unwrap();
    let q = people.where_().unwrap();
    assert_eq!(q.find_all_limited(0, Some(3), None).unwrap().size().unwrap(), 3);

    let other = SharedGroup::open(&path, Durability::MemOnly, true).unwrap();
    {
        let wt = other.begin_write().unwrap();
        wt.get_table("Person").unwrap().clear().unwrap();
        wt.commit().unwrap();
    }
    assert!(db.advance_read().unwrap());

    assert_stale(q.find_all_limited(0, Some(3), None));
    assert_stale(q.find_all_limited(3, Some(1), None));
    db.end_read().unwrap();
}

#[test]
fn query_over_a_view_follows_view_order() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for (name, age) in [("a", 3), ("b", 1), ("c", 2)] {
        add_person(&people, name, age);
    }
    let sorted = people.get_sorted_view(AGE, Order::Ascending).unwrap();
    let q = sorted.where_().unwrap().greater_than(AGE, 1).unwrap();
    let view = q.find_all().unwrap();
    assert_eq!(view.get_string(NAME, 0).unwrap().as_deref(), Some("c"));
    assert_eq!(view.get_string(NAME, 1).unwrap().as_deref(), Some("a"));
}

#[test]
fn read_transaction_queries_use_the_pinned_snapshot() {
    let (dir, db) = mem_db();
    {
        let wt = db.begin_write().unwrap();
        let people = wt.get_table("Person").unwrap();
        people_table(&people);
        add_person(&people, "Alice", 30);
        wt.commit().unwrap();
    }
    let rt = db.begin_read().unwrap();
    let q = rt.get_table("Person").unwrap().where_().unwrap();

    let writer = SharedGroup::open(&dir.path().join("handles.db"), Durability::MemOnly, true).unwrap();
    {
        let wt = writer.begin_write().unwrap();
        add_person(&wt.get_table("Person").unwrap(), "Bob", 40);
        wt.commit().unwrap();
    }
    assert_eq!(q.count().unwrap(), 1);
}

#[test]
fn typed_cells_and_nulls() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let t = wt.get_table("Cells").unwrap();
    let b = t.add_column(ColumnType::Bool, "b").unwrap();
    let f = t.add_column(ColumnType::Float, "f").unwrap();
    let d = t.add_column(ColumnType::Double, "d").unwrap();
    let when = t.add_column(ColumnType::Date, "when").unwrap();
    let bin = t.add_column(ColumnType::Binary, "bin").unwrap();
    let mixed = t.add_column(ColumnType::Mixed, "mixed").unwrap();
    let maybe = t.add_column_nullable(ColumnType::Int, "maybe").unwrap();
    let row = t.add_empty_row().unwrap();

    assert!(!t.get_bool(b, row).unwrap());
    assert_eq!(t.get_binary(bin, row).unwrap(), Some(Vec::new()));
    assert_eq!(t.get_mixed(mixed, row).unwrap(), Mixed::Int(0));
    assert!(t.is_null(maybe, row).unwrap());
    assert!(matches!(t.get_long(maybe, row), Err(CoreError::IllegalState { .. })));

    t.set_bool(b, row, true).unwrap();
    t.set_float(f, row, 1.5).unwrap();
    t.set_double(d, row, 2.25).unwrap();
    t.set_date(when, row, 1_999).unwrap();
    t.set_binary(bin, row, &[1, 2, 3]).unwrap();
    t.set_mixed(mixed, row, Mixed::String("hi".into())).unwrap();
    t.set_long(maybe, row, 7).unwrap();

    assert!(t.get_bool(b, row).unwrap());
    assert_eq!(t.get_float(f, row).unwrap(), 1.5);
    assert_eq!(t.get_double(d, row).unwrap(), 2.25);
    assert_eq!(t.get_date(when, row).unwrap(), 1_000);
    assert_eq!(t.get_binary(bin, row).unwrap(), Some(vec![1, 2, 3]));
    assert_eq!(t.get_mixed_type(mixed, row).unwrap(), ColumnType::String);
    assert_eq!(t.get_value(maybe, row).unwrap(), Value::Int(7));

    t.set_null(maybe, row).unwrap();
    assert!(t.is_null(maybe, row).unwrap());
    assert!(matches!(t.set_null(b, row), Err(CoreError::NullNotAllowed { .. })));
    assert!(matches!(t.set_long(b, row, 1), Err(CoreError::TypeMismatch { .. })));
    assert!(matches!(t.get_long(maybe, 9), Err(CoreError::IndexOutOfBounds { .. })));
}

#[test]
fn link_lists_follow_target_rows() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for (name, age) in [("a", 1), ("b", 2), ("c", 3)] {
        add_person(&people, name, age);
    }
    let teams = wt.get_table("Team").unwrap();
    let members = teams
        .add_column_link(ColumnType::LinkList, "members", &people)
        .unwrap();
    let lead = teams.add_column_link(ColumnType::Link, "lead", &people).unwrap();
    let team = teams.add_empty_row().unwrap();

    let list = teams.get_link_list(members, team).unwrap();
    list.add(0).unwrap();
    list.add(2).unwrap();
    list.insert(1, 1).unwrap();
    assert_eq!(list.size().unwrap(), 3);
    assert_eq!(list.target_table_name().unwrap(), "Person");
    assert_eq!(list.get_target_row(2).unwrap().get_string(NAME).unwrap().as_deref(), Some("c"));
    assert!(list.add(3).is_err());
    assert!(list.remove(5).is_err());

    list.move_link(0, 2).unwrap();
    assert_eq!(list.targets().unwrap(), vec![1, 2, 0]);

    teams.set_link(lead, team, 1).unwrap();
    people.remove(1).unwrap();
    assert!(list.is_valid());
    assert_eq!(list.targets().unwrap(), vec![1, 0]);
    assert_eq!(teams.get_link(lead, team).unwrap(), None);

    let q = list.where_().unwrap().greater_than(AGE, 1).unwrap();
    assert_eq!(q.find_first().unwrap(), Some(1));

    list.set(0, 0).unwrap();
    list.clear().unwrap();
    assert!(list.is_empty().unwrap());

    teams.insert_empty_row(0).unwrap();
    assert!(!list.is_valid());
    assert!(matches!(
        wt.remove_table("Person"),
        Err(CoreError::IllegalState { .. })
    ));
}

#[test]
fn subtables_are_anchored_to_their_row() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let orders = wt.get_table("Order").unwrap();
    let lines = orders
        .add_subtable_column(
            "lines",
            vec![
                ColumnSpec::new(ColumnType::String, "sku"),
                ColumnSpec::new(ColumnType::Int, "qty"),
            ],
        )
        .unwrap();
    orders.add_empty_rows(2).unwrap();

    let sub = orders.get_subtable(lines, 1).unwrap();
    assert!(sub.is_subtable());
    let line = sub.add_empty_row().unwrap();
    sub.set_string(0, line, "apple").unwrap();
    sub.set_long(1, line, 3).unwrap();
    assert!(sub.add_column(ColumnType::Int, "extra").is_err());
    assert_eq!(orders.get_subtable(lines, 0).unwrap().size().unwrap(), 0);

    orders.add_empty_row().unwrap();
    assert_eq!(sub.get_long(1, line).unwrap(), 3);

    orders.remove(0).unwrap();
    assert_stale(sub.size());
    let moved = orders.get_subtable(lines, 0).unwrap();
    assert_eq!(moved.get_string(0, 0).unwrap().as_deref(), Some("apple"));
}

#[test]
fn schema_edits_and_table_management() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let t = wt.get_table("Old").unwrap();
    let a = t.add_column(ColumnType::Int, "a").unwrap();
    t.add_column(ColumnType::String, "b").unwrap();
    t.rename_column(a, "alpha").unwrap();
    assert_eq!(t.column_name(a).unwrap(), "alpha");
    t.remove_column(a).unwrap();
    assert_eq!(t.column_count().unwrap(), 1);
    assert_eq!(t.column_type(0).unwrap(), ColumnType::String);

    wt.rename_table("Old", "New").unwrap();
    assert_eq!(t.name().unwrap(), "New");
    assert!(wt.has_table("New").unwrap());
    assert_eq!(wt.table_count().unwrap(), 1);
    assert_eq!(wt.table_name(0).unwrap(), "New");
    wt.remove_table("New").unwrap();
    assert!(wt.is_empty().unwrap());
}

#[test]
fn move_last_over_and_remove_last() {
    let (_dir, db) = mem_db();
    let wt = db.begin_write().unwrap();
    let people = wt.get_table("Person").unwrap();
    people_table(&people);
    for (name, age) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
        add_person(&people, name, age);
    }
    people.move_last_over(0).unwrap();
    assert_eq!(people.get_string(NAME, 0).unwrap().as_deref(), Some("d"));
    people.remove_last().unwrap();
    assert_eq!(people.size().unwrap(), 2);
    people.clear().unwrap();
    assert!(people.is_empty().unwrap());
}

#[test]
fn handle_arena_tracks_outdated_handles() {
    let (_dir, db) = mem_db();
    {
        let wt = db.begin_write().unwrap();
        people_table(&wt.get_table("Person").unwrap());
        wt.commit().unwrap();
    }
    let group = db.begin_implicit_transaction().unwrap();
    let people = group.get_table("Person").unwrap();
    let view = people.where_().unwrap().find_all().unwrap();
    assert!(db.handle_stats().live >= 3);

    db.promote_to_write().unwrap();
    add_person(&people, "x", 1);
    db.rollback_and_continue_as_read().unwrap();
    assert!(!view.is_valid());
    assert!(db.handle_stats().outdated >= 1);
    drop(view);
    db.end_read().unwrap();
}
