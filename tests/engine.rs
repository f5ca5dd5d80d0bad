// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end scenarios driven entirely through the public `Group`/`Table`/
//! `SharedGroup` surface, one per §8's scenario list.

use coldb::column::btree::FANOUT;
use coldb::{ColumnType, Group, SharedGroup};

fn reopen(group: &Group) -> Group {
    let len = group.alloc().actual_len().expect("len") as usize;
    let bytes = group.alloc().read(0, len).to_vec();
    Group::open_buffer(bytes).expect("reopen")
}

#[test]
fn bit_width_expands_as_larger_values_are_written() {
    let mut group = Group::open_buffer(Vec::new()).expect("open");
    let version = group.version();
    let mut table = group.add_table(b"readings").expect("add table");
    table = table.add_column(group.alloc_mut(), b"value", ColumnType::Int, version).expect("add column");

    // Start narrow: every row fits in a single bit.
    for _ in 0..4 {
        table = table.insert_row(group.alloc_mut(), version).expect("insert row");
    }
    for r in 0..4 {
        table = table.set_int(group.alloc_mut(), 0, r, 1, version).expect("set");
    }
    assert_eq!(1, table.get_int(group.alloc(), 0, 0).expect("get"));

    // Force the leaf to widen to accommodate a value well outside i8 range.
    table = table.set_int(group.alloc_mut(), 0, 2, i64::from(i32::MAX) + 10, version).expect("set");
    assert_eq!(i64::from(i32::MAX) + 10, table.get_int(group.alloc(), 0, 2).expect("get"));
    // Sibling rows must still read back unchanged after the widen.
    assert_eq!(1, table.get_int(group.alloc(), 0, 0).expect("get"));
    assert_eq!(1, table.get_int(group.alloc(), 0, 1).expect("get"));
    assert_eq!(1, table.get_int(group.alloc(), 0, 3).expect("get"));

    group.update_table(b"readings", table).expect("update");
    group.commit().expect("commit");

    let reopened = reopen(&group);
    let table = reopened.get_table(b"readings").expect("table");
    assert_eq!(i64::from(i32::MAX) + 10, table.get_int(reopened.alloc(), 0, 2).expect("get"));
}

#[test]
fn low_cardinality_string_column_is_promoted_to_enum_by_optimize() {
    let mut group = Group::open_buffer(Vec::new()).expect("open");
    let version = group.version();
    let mut table = group.add_table(b"events").expect("add table");
    table = table.add_column(group.alloc_mut(), b"kind", ColumnType::String, version).expect("add column");

    let kinds: [&[u8]; 3] = [b"create", b"update", b"delete"];
    for i in 0..30_u64 {
        table = table.insert_row(group.alloc_mut(), version).expect("insert row");
        table = table.set_string(group.alloc_mut(), 0, i, kinds[(i % 3) as usize], version).expect("set");
    }

    assert_eq!(ColumnType::String, table.schema(group.alloc()).type_at(group.alloc(), 0));

    table = table.optimize(group.alloc_mut(), version).expect("optimize");
    assert_eq!(ColumnType::StringEnum, table.schema(group.alloc()).type_at(group.alloc(), 0));

    // Every value must still read back correctly after promotion.
    for i in 0..30_u64 {
        assert_eq!(kinds[(i % 3) as usize].to_vec(), table.get_string(group.alloc(), 0, i).expect("get"));
    }

    // A second optimize call is a no-op: still an enum, nothing corrupted.
    table = table.optimize(group.alloc_mut(), version).expect("optimize again");
    assert_eq!(ColumnType::StringEnum, table.schema(group.alloc()).type_at(group.alloc(), 0));

    group.update_table(b"events", table).expect("update");
    group.commit().expect("commit");
}

#[test]
fn column_past_fanout_becomes_an_inner_node_and_collapses_back_on_delete() {
    let mut group = Group::open_buffer(Vec::new()).expect("open");
    let version = group.version();
    let mut table = group.add_table(b"big").expect("add table");
    table = table.add_column(group.alloc_mut(), b"n", ColumnType::Int, version).expect("add column");

    let n = FANOUT + 50;
    for i in 0..n {
        table = table.insert_row(group.alloc_mut(), version).expect("insert row");
        table = table.set_int(group.alloc_mut(), 0, i, i as i64, version).expect("set");
    }
    assert_eq!(n, table.row_count(group.alloc()));
    for i in 0..n {
        assert_eq!(i as i64, table.get_int(group.alloc(), 0, i).expect("get"));
    }

    // Delete back down under the fan-out threshold; every remaining row must
    // still be reachable at its shifted index.
    for _ in 0..(n - 10) {
        table = table.remove_row(group.alloc_mut(), 0, version).expect("remove");
    }
    assert_eq!(10, table.row_count(group.alloc()));
    for i in 0..10_u64 {
        assert_eq!((n - 10 + i) as i64, table.get_int(group.alloc(), 0, i).expect("get"));
    }

    group.update_table(b"big", table).expect("update");
    group.commit().expect("commit");
}

#[test]
fn committed_reader_keeps_seeing_its_pinned_version_across_a_later_write() {
    let mut group = Group::open_buffer(Vec::new()).expect("open");
    let version = group.version();
    let mut table = group.add_table(b"accounts").expect("add table");
    table = table.add_column(group.alloc_mut(), b"balance", ColumnType::Int, version).expect("add column");
    table = table.insert_row(group.alloc_mut(), version).expect("insert row");
    table = table.set_int(group.alloc_mut(), 0, 0, 100, version).expect("set");
    group.update_table(b"accounts", table).expect("update");
    group.commit().expect("commit");

    let shared = SharedGroup::new(group);

    let reader = shared.begin_read();
    let reader_table = reader.get_table(b"accounts").expect("table");
    assert_eq!(100, reader.get_int(reader_table, 0, 0).expect("get"));

    {
        let mut writer = shared.begin_write();
        let table = writer.get_table(b"accounts").expect("table");
        let table = table.set_int(writer.alloc_mut(), 0, 0, 999, writer.version()).expect("set");
        writer.update_table(b"accounts", table).expect("update");
        writer.commit().expect("commit");
    }

    // The reader transaction, begun before the write, must still observe
    // 100 even though a writer has since committed 999.
    assert_eq!(100, reader.get_int(reader_table, 0, 0).expect("get"));
    reader.end_read();

    let fresh = shared.begin_read();
    let fresh_table = fresh.get_table(b"accounts").expect("table");
    assert_eq!(999, fresh.get_int(fresh_table, 0, 0).expect("get"));
}

#[test]
fn a_crash_before_commit_returns_leaves_the_prior_committed_state_intact() {
    let mut group = Group::open_buffer(Vec::new()).expect("open");
    let version = group.version();
    let mut table = group.add_table(b"ledger").expect("add table");
    table = table.add_column(group.alloc_mut(), b"amount", ColumnType::Int, version).expect("add column");
    table = table.insert_row(group.alloc_mut(), version).expect("insert row");
    table = table.set_int(group.alloc_mut(), 0, 0, 10, version).expect("set");
    group.update_table(b"ledger", table).expect("update");
    group.commit().expect("first commit");

    // Start a second transaction and mutate in memory, but never call
    // commit — modeling a crash between "transaction began" and "commit
    // returned". Nothing here has touched the backing store past what the
    // first commit already wrote.
    let version = group.version();
    let table = group.get_table(b"ledger").expect("table");
    let _uncommitted = table.set_int(group.alloc_mut(), 0, 0, 999_999, version).expect("set");

    let reopened = reopen(&group);
    let table = reopened.get_table(b"ledger").expect("table survives the first commit");
    assert_eq!(10, table.get_int(reopened.alloc(), 0, 0).expect("the uncommitted write must not be visible"));
}
