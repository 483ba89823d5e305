//! Property tests over random operation scripts.

use ditstore_core::index::{IndexKey, SystemIndex};
use ditstore_core::{Entry, EntryId};
use ditstore_testkit::prelude::*;
use proptest::prelude::*;

type Snapshot = (Vec<(EntryId, Entry)>, Vec<Vec<(IndexKey, EntryId)>>);

fn snapshot(t: &TestDirectory) -> Snapshot {
    let v = t.transactions().logical_data_version();
    let entries = t.partition.master_table().unwrap().scan(v);
    let mut indices: Vec<_> = SystemIndex::ALL
        .into_iter()
        .map(|s| t.partition.system_index(s).unwrap().cursor(v).collect())
        .collect();
    for index in t.partition.user_indices() {
        indices.push(index.cursor(v).collect());
    }
    (entries, indices)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn scripts_keep_indices_consistent(script in tree_script_strategy(40)) {
        let t = TestDirectory::memory();
        let stats = run_script(&t, &script);
        prop_assert_eq!(stats.applied + stats.refused, script.len());
        t.assert_consistent();
        prop_assert_eq!(t.transactions().active_count(), 0);
    }

    #[test]
    fn explicit_transaction_matches_implicit_steps(script in tree_script_strategy(20)) {
        let implicit = TestDirectory::memory();
        run_script(&implicit, &script);

        let explicit = TestDirectory::memory();
        let handle = explicit.transactions().begin_write().unwrap();
        run_script(&explicit, &script);
        explicit.transactions().commit(&handle).unwrap();

        // Ids are random, so compare names and contents only.
        let names = |t: &TestDirectory| {
            let mut entries: Vec<_> = snapshot(t).0.into_iter().map(|(_, e)| e).collect();
            entries.sort_by(|a, b| a.dn().normalized().cmp(b.dn().normalized()));
            entries
        };
        prop_assert_eq!(names(&implicit), names(&explicit));
        explicit.assert_consistent();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn replay_rebuilds_the_same_state(script in tree_script_strategy(25)) {
        let t = TestDirectory::file();
        run_script(&t, &script);
        let before = snapshot(&t);

        let t = t.reopen();
        prop_assert_eq!(snapshot(&t), before);
        t.assert_consistent();
    }
}
