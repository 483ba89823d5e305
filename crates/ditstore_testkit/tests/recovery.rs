//! Restart and crash recovery over a file-backed log.

use ditstore_core::index::IndexKey;
use ditstore_core::{
    AddContext, Config, Directory, ErrorKind, Modification, ModifyContext, MoveContext, Partition, Schema,
    StorePartition,
};
use ditstore_storage::FileBackend;
use ditstore_testkit::prelude::*;
use std::sync::Arc;

const ANN: &str = "cn=ann,ou=people,dc=example,dc=com";

#[test]
fn reopen_restores_entries_and_counters() {
    let t = TestDirectory::file();
    let ann = t.add(person(ANN));
    t.ops()
        .move_entry(&t.partition, &MoveContext::new(dn(ANN), dn("ou=groups,dc=example,dc=com")))
        .unwrap();
    let version = t.transactions().logical_data_version();

    let t = t.reopen();
    assert_eq!(t.report.committed, 5);
    assert_eq!(t.report.discarded, 0);
    assert_eq!(t.report.version, version);
    assert_eq!(t.transactions().logical_data_version(), version);
    assert_eq!(t.dn_of(ann), Some(dn("cn=ann,ou=groups,dc=example,dc=com")));
    t.assert_consistent();

    t.add(person("cn=bob,ou=people,dc=example,dc=com"));
    assert_eq!(t.transactions().logical_data_version(), version.next());
    let t = t.reopen();
    assert_eq!(t.entry_count(), 5);
}

#[test]
fn user_index_survives_reopen() {
    let t = TestDirectory::file();
    let ann = t.add(person(ANN));
    let t = t.reopen();
    let cn = t.partition.user_index("cn").unwrap();
    let v = t.transactions().logical_data_version();
    assert_eq!(cn.forward_lookup(&IndexKey::value("ann"), v), vec![ann]);
}

#[test]
fn index_added_later_is_built_from_entries() {
    let t = TestDirectory::file();
    let ann = t.add(person(ANN));
    let log = t.log_path().unwrap();
    drop(t.dir);

    let schema = Arc::new(Schema::core());
    let dir = Directory::open(Box::new(FileBackend::open(&log).unwrap()), schema.clone(), Config::default());
    let config = partition_config().index("sn");
    let partition: Arc<dyn Partition> = Arc::new(StorePartition::from_config(schema, config));
    dir.add_partition(Arc::clone(&partition)).unwrap();
    let report = dir.recover().unwrap();
    assert!(report.rebuilt_indices.iter().any(|name| name == "example/sn"));

    let sn = partition.user_index("sn").unwrap();
    let v = dir.transactions().logical_data_version();
    assert_eq!(sn.forward_lookup(&IndexKey::value("ann"), v), vec![ann]);
    assert!(dir.verify(PARTITION).unwrap().is_empty());
}

fn open_with_sn_index(log: &std::path::Path) -> (Directory, Arc<dyn Partition>) {
    let schema = Arc::new(Schema::core());
    let dir = Directory::open(Box::new(FileBackend::open(log).unwrap()), schema.clone(), Config::default());
    let partition: Arc<dyn Partition> =
        Arc::new(StorePartition::from_config(schema, partition_config().index("sn")));
    dir.add_partition(Arc::clone(&partition)).unwrap();
    dir.recover().unwrap();
    (dir, partition)
}

#[test]
fn index_added_later_still_covers_old_entries_after_new_writes() {
    let t = TestDirectory::file();
    let ann = t.add(person(ANN));
    let log = t.log_path().unwrap();
    drop(t.dir);

    let (dir, partition) = open_with_sn_index(&log);
    assert!(dir.verify(PARTITION).unwrap().is_empty());
    let bob = dir
        .operations()
        .add(&partition, &AddContext::new(person("cn=bob,ou=people,dc=example,dc=com")))
        .unwrap();
    drop(dir);

    let (dir, partition) = open_with_sn_index(&log);
    assert!(dir.verify(PARTITION).unwrap().is_empty());
    let sn = partition.user_index("sn").unwrap();
    let v = dir.transactions().logical_data_version();
    assert_eq!(sn.forward_lookup(&IndexKey::value("ann"), v), vec![ann]);
    assert_eq!(sn.forward_lookup(&IndexKey::value("bob"), v), vec![bob]);
}

#[test]
fn edits_for_unknown_partitions_are_skipped() {
    let t = TestDirectory::file();
    t.add(person(ANN));
    let log = t.log_path().unwrap();
    drop(t.dir);

    let schema = Arc::new(Schema::core());
    let dir = Directory::open(Box::new(FileBackend::open(&log).unwrap()), schema.clone(), Config::default());
    dir.add_partition(Arc::new(StorePartition::new(schema, "other", dn("dc=other"))))
        .unwrap();
    let report = dir.recover().unwrap();
    assert_eq!(report.replayed_edits, 0);
    assert!(report.skipped_partition_edits > 0);
    assert_eq!(report.committed, 4);
}

#[test]
fn crash_before_log_write_loses_the_operation() {
    let control = CrashControl::new();
    let t = TestDirectory::file_with(|b| Box::new(CrashableBackend::new(Box::new(b), control.clone())));
    CrashPoint::BeforeLogWrite.arm(&control);
    let err = t
        .ops()
        .add(&t.partition, &AddContext::new(person(ANN)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(!t.exists(ANN));

    let t = t.reopen();
    assert!(!t.exists(ANN));
    assert_eq!(t.report.truncated_bytes, 0);
    assert_eq!(t.entry_count(), 3);
    t.assert_consistent();
}

#[test]
fn torn_record_is_cut_on_recovery() {
    let control = CrashControl::new();
    let t = TestDirectory::file_with(|b| Box::new(CrashableBackend::new(Box::new(b), control.clone())));
    let intact = control.bytes_written();
    CrashPoint::DuringLogWrite.arm(&control);
    assert!(t.ops().add(&t.partition, &AddContext::new(person(ANN))).is_err());
    assert!(control.has_crashed());

    let t = t.reopen();
    assert!(!t.exists(ANN));
    assert_eq!(t.report.truncated_bytes, control.bytes_written() - intact);
    t.assert_consistent();

    // The log is clean again, so new commits survive another restart.
    let bob = t.add(person("cn=bob,ou=people,dc=example,dc=com"));
    let t = t.reopen();
    assert_eq!(t.report.truncated_bytes, 0);
    assert!(t.dn_of(bob).is_some());
    t.assert_consistent();
}

#[test]
fn complete_record_survives_failed_flush() {
    let control = CrashControl::new();
    let t = TestDirectory::file_with(|b| Box::new(CrashableBackend::new(Box::new(b), control.clone())));
    CrashPoint::AfterLogWriteBeforeFlush.arm(&control);
    let err = t
        .ops()
        .add(&t.partition, &AddContext::new(person(ANN)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert!(err.to_string().contains("unknown until restart"));
    // Not applied before the restart.
    assert!(!t.exists(ANN));

    // The record reached the file, so recovery replays it.
    let t = t.reopen();
    assert!(t.exists(ANN));
    t.assert_consistent();
}

#[test]
fn failed_apply_is_discarded_on_replay() {
    let t = TestDirectory::file();
    t.add(person(ANN));
    t.store.failpoints().fail_apply_after(1);
    let ctx = ModifyContext::new(dn(ANN), vec![Modification::add("cn", ["annie"])]);
    let err = t.ops().modify(&t.partition, &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert_eq!(t.lookup(ANN).unwrap().values("cn"), ["ann"]);
    assert!(!t.transactions().is_poisoned());
    t.assert_consistent();

    let t = t.reopen();
    assert_eq!(t.report.discarded, 1);
    assert_eq!(t.lookup(ANN).unwrap().values("cn"), ["ann"]);
    t.assert_consistent();
}

#[test]
fn aborted_transactions_leave_no_trace() {
    let t = TestDirectory::file();
    let size = std::fs::metadata(t.log_path().unwrap()).unwrap().len();
    let tm = t.transactions();
    tm.begin_write().unwrap();
    t.add(person(ANN));
    tm.abort_current().unwrap();
    assert_eq!(std::fs::metadata(t.log_path().unwrap()).unwrap().len(), size);

    let t = t.reopen();
    assert!(!t.exists(ANN));
    assert_eq!(t.report.discarded, 0);
}

#[test]
fn second_open_of_a_live_log_is_refused() {
    let t = TestDirectory::file();
    assert!(FileBackend::open(&t.log_path().unwrap()).is_err());
}

#[test]
fn unlogged_abort_blocks_commits_until_reopen() {
    let control = CrashControl::new();
    let t = TestDirectory::file_with(|b| Box::new(CrashableBackend::new(Box::new(b), control.clone())));
    let version = t.transactions().logical_data_version();
    control.set_fail_on_flush(true);
    assert!(t.ops().add(&t.partition, &AddContext::new(person(ANN))).is_err());
    assert!(t.transactions().is_poisoned());
    assert_eq!(t.transactions().logical_data_version(), version);

    control.reset();
    let refused = t
        .ops()
        .add(&t.partition, &AddContext::new(person("cn=bob,ou=people,dc=example,dc=com")));
    assert_eq!(refused.unwrap_err().kind(), ErrorKind::IllegalState);
    assert!(!t.exists("cn=bob,ou=people,dc=example,dc=com"));

    // The commit record without its abort is replayed, and the version it
    // claimed is not reused.
    let t = t.reopen();
    assert!(!t.transactions().is_poisoned());
    assert!(t.exists(ANN));
    assert_eq!(t.report.version, version.next());
    t.add(person("cn=bob,ou=people,dc=example,dc=com"));
    assert_eq!(t.transactions().logical_data_version(), version.next().next());
    t.assert_consistent();
}
