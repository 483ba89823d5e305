//! Transaction scoping, isolation and commit-time conflicts.

use ditstore_core::{
    AddContext, Config, DeleteContext, ErrorKind, LookupContext, Modification, ModifyContext, TransactionMode,
};
use ditstore_testkit::prelude::*;
use std::sync::Barrier;
use std::thread;

const PEOPLE: &str = "ou=people,dc=example,dc=com";

#[test]
fn explicit_transaction_commits_all_or_nothing() {
    let t = TestDirectory::memory();
    let tm = t.transactions();
    let before = tm.logical_data_version();

    let handle = tm.begin_write().unwrap();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    t.add(person("cn=bob,ou=people,dc=example,dc=com"));
    // Visible to the transaction itself, not yet published.
    assert!(t.exists("cn=bob,ou=people,dc=example,dc=com"));
    assert_eq!(tm.logical_data_version(), before);

    let version = tm.commit(&handle).unwrap();
    assert_eq!(version, before.next());
    assert_eq!(t.entry_count(), 5);
    t.assert_consistent();
}

#[test]
fn abort_discards_every_operation() {
    let t = TestDirectory::memory();
    let tm = t.transactions();
    tm.begin_write().unwrap();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    t.delete("ou=groups,dc=example,dc=com");
    tm.abort_current().unwrap();

    assert!(!t.exists("cn=ann,ou=people,dc=example,dc=com"));
    assert!(t.exists("ou=groups,dc=example,dc=com"));
    assert_eq!(t.entry_count(), 3);
    t.assert_consistent();
}

#[test]
fn failed_step_keeps_earlier_steps() {
    let t = TestDirectory::memory();
    let tm = t.transactions();
    let handle = tm.begin_write().unwrap();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let refused = t
        .ops()
        .delete(&t.partition, &DeleteContext::new(dn(PEOPLE)))
        .unwrap_err();
    assert_eq!(refused.kind(), ErrorKind::ContextNotEmpty);
    assert!(handle.lock().is_active());
    tm.commit(&handle).unwrap();
    assert!(t.exists("cn=ann,ou=people,dc=example,dc=com"));
    t.assert_consistent();
}

#[test]
fn writes_refused_inside_read_only_transaction() {
    let t = TestDirectory::memory();
    let tm = t.transactions();
    tm.begin_read().unwrap();
    let err = t
        .ops()
        .add(&t.partition, &AddContext::new(person("cn=ann,ou=people,dc=example,dc=com")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(t.lookup(PEOPLE).is_some());
    tm.commit_current().unwrap();
}

#[test]
fn readers_see_their_start_version() {
    let t = TestDirectory::memory();
    let started = Barrier::new(2);
    let written = Barrier::new(2);
    thread::scope(|s| {
        s.spawn(|| {
            let reader = t.transactions().begin_read().unwrap();
            started.wait();
            written.wait();
            assert!(t.lookup("cn=ann,ou=people,dc=example,dc=com").is_none());
            t.transactions().commit(&reader).unwrap();
            // A fresh implicit read sees the commit.
            assert!(t.lookup("cn=ann,ou=people,dc=example,dc=com").is_some());
        });
        s.spawn(|| {
            started.wait();
            t.add(person("cn=ann,ou=people,dc=example,dc=com"));
            written.wait();
        });
    });
}

#[test]
fn uncommitted_writes_are_private() {
    let t = TestDirectory::memory();
    let added = Barrier::new(2);
    let checked = Barrier::new(2);
    thread::scope(|s| {
        s.spawn(|| {
            let writer = t.transactions().begin_write().unwrap();
            t.add(person("cn=ann,ou=people,dc=example,dc=com"));
            added.wait();
            checked.wait();
            t.transactions().commit(&writer).unwrap();
        });
        s.spawn(|| {
            added.wait();
            assert!(!t.exists("cn=ann,ou=people,dc=example,dc=com"));
            checked.wait();
        });
    });
    assert!(t.exists("cn=ann,ou=people,dc=example,dc=com"));
}

#[test]
fn delete_conflicts_with_concurrent_child_add() {
    let t = TestDirectory::memory();
    t.add(ou("ou=team,ou=people,dc=example,dc=com"));
    let deleted = Barrier::new(2);
    let added = Barrier::new(2);
    thread::scope(|s| {
        s.spawn(|| {
            let handle = t.transactions().begin_write().unwrap();
            t.delete("ou=team,ou=people,dc=example,dc=com");
            deleted.wait();
            added.wait();
            let err = t.transactions().commit(&handle).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        });
        s.spawn(|| {
            deleted.wait();
            t.add(person("cn=ann,ou=team,ou=people,dc=example,dc=com"));
            added.wait();
        });
    });
    assert!(t.exists("cn=ann,ou=team,ou=people,dc=example,dc=com"));
    t.assert_consistent();
}

#[test]
fn same_name_added_twice_conflicts() {
    let t = TestDirectory::memory();
    let both_added = Barrier::new(2);
    let first_done = Barrier::new(2);
    thread::scope(|s| {
        s.spawn(|| {
            let handle = t.transactions().begin_write().unwrap();
            t.add(person("cn=ann,ou=people,dc=example,dc=com"));
            both_added.wait();
            t.transactions().commit(&handle).unwrap();
            first_done.wait();
        });
        s.spawn(|| {
            let handle = t.transactions().begin_write().unwrap();
            t.add(person("cn=ann,ou=people,dc=example,dc=com"));
            both_added.wait();
            first_done.wait();
            let err = t.transactions().commit(&handle).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        });
    });
    assert_eq!(t.entry_count(), 4);
    t.assert_consistent();
}

#[test]
fn implicit_writers_retry_until_they_win() {
    let t = TestDirectory::memory_with(Config::default().max_conflict_retries(1_000));
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let threads = 4;
    let per_thread = 10;
    thread::scope(|s| {
        for n in 0..threads {
            let t = &t;
            s.spawn(move || {
                for i in 0..per_thread {
                    let ctx = ModifyContext::new(
                        dn("cn=ann,ou=people,dc=example,dc=com"),
                        vec![Modification::add("description", [format!("t{n}-{i}")])],
                    );
                    t.ops().modify(&t.partition, &ctx).unwrap();
                }
            });
        }
    });
    let entry = t
        .ops()
        .lookup(&t.partition, &LookupContext::new(dn("cn=ann,ou=people,dc=example,dc=com")))
        .unwrap();
    assert_eq!(entry.values("description").len(), threads * per_thread);
    t.assert_consistent();
}

#[test]
fn concurrent_adds_under_one_parent() {
    let t = TestDirectory::memory();
    thread::scope(|s| {
        for n in 0..4 {
            let t = &t;
            s.spawn(move || {
                for i in 0..25 {
                    t.add(person(&format!("cn=p{n}x{i},ou=people,dc=example,dc=com")));
                }
            });
        }
    });
    assert_eq!(t.entry_count(), 103);
    assert_eq!(t.transactions().active_count(), 0);
    t.assert_consistent();
}

#[test]
fn bound_transaction_is_reused_not_nested() {
    let t = TestDirectory::memory();
    let tm = t.transactions();
    let handle = tm.begin_write().unwrap();
    let current = tm.current_transaction(TransactionMode::ReadWrite).unwrap();
    assert!(!current.implicit);
    assert!(std::sync::Arc::ptr_eq(&current.handle, &handle));
    assert_eq!(tm.begin_write().unwrap_err().kind(), ErrorKind::IllegalState);
    tm.abort(&handle).unwrap();
}
