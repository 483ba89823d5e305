//! Operation execution against a seeded directory.

use ditstore_core::index::{IndexKey, SystemIndex};
use ditstore_core::{
    AddContext, DeleteContext, Entry, EntryId, ErrorKind, LookupContext, Modification, ModifyContext,
    MoveAndRenameContext, MoveContext, Rdn, RenameContext,
};
use ditstore_testkit::prelude::*;

const PEOPLE: &str = "ou=people,dc=example,dc=com";
const GROUPS: &str = "ou=groups,dc=example,dc=com";

fn at(t: &TestDirectory) -> ditstore_core::DataVersion {
    t.transactions().logical_data_version()
}

#[test]
fn add_maintains_structural_indices() {
    let t = TestDirectory::memory();
    let people = t.lookup_id(PEOPLE);
    let ann = t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let v = at(&t);

    let one = t.partition.system_index(SystemIndex::OneLevel).unwrap();
    assert!(one.contains(&IndexKey::Id(people), ann, v));

    let sub = t.partition.system_index(SystemIndex::SubLevel).unwrap();
    for ancestor in [EntryId::DEFAULT, people, ann] {
        assert!(sub.contains(&IndexKey::Id(ancestor), ann, v), "missing subLevel {ancestor}");
    }

    let cn = t.partition.user_index("cn").unwrap();
    assert_eq!(cn.forward_lookup(&IndexKey::value("ann"), v), vec![ann]);
    t.assert_consistent();
}

#[test]
fn add_fills_in_rdn_values() {
    let t = TestDirectory::memory();
    let entry = Entry::new(dn("uid=bob,ou=people,dc=example,dc=com"))
        .with("objectClass", ["top", "person"])
        .with("cn", ["Bob"])
        .with("sn", ["Builder"]);
    t.add(entry);
    let stored = t.lookup("uid=bob,ou=people,dc=example,dc=com").unwrap();
    assert_eq!(stored.values("uid"), ["bob"]);
    t.assert_consistent();
}

#[test]
fn add_refusals() {
    let t = TestDirectory::memory();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));

    let again = t.ops().add(&t.partition, &AddContext::new(person("CN=Ann,ou=people,dc=example,dc=com")));
    assert_eq!(again.unwrap_err().kind(), ErrorKind::EntryAlreadyExists);

    let orphan = t.ops().add(&t.partition, &AddContext::new(person("cn=x,ou=nobody,dc=example,dc=com")));
    assert_eq!(orphan.unwrap_err().kind(), ErrorKind::NoSuchObject);

    let outside = t.ops().add(&t.partition, &AddContext::new(person("cn=x,dc=other")));
    assert_eq!(outside.unwrap_err().kind(), ErrorKind::NoSuchObject);

    let no_sn = Entry::new(dn("cn=y,ou=people,dc=example,dc=com")).with("objectClass", ["top", "person"]);
    let missing = t.ops().add(&t.partition, &AddContext::new(no_sn));
    assert_eq!(missing.unwrap_err().kind(), ErrorKind::SchemaViolation);

    let classless = Entry::new(dn("cn=bare,ou=people,dc=example,dc=com")).with("sn", ["bare"]);
    let bare = t.ops().add(&t.partition, &AddContext::new(classless));
    assert_eq!(bare.unwrap_err().kind(), ErrorKind::SchemaViolation);

    assert_eq!(t.entry_count(), 4);
    t.assert_consistent();
}

#[test]
fn delete_removes_every_key() {
    let t = TestDirectory::memory();
    let ann = t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    t.delete("cn=ann,ou=people,dc=example,dc=com");
    let v = at(&t);
    for index in SystemIndex::ALL {
        let index = t.partition.system_index(index).unwrap();
        assert!(index.reverse_lookup(ann, v).is_empty());
    }
    assert!(t.partition.user_index("cn").unwrap().reverse_lookup(ann, v).is_empty());
    assert!(!t.exists("cn=ann,ou=people,dc=example,dc=com"));
    t.assert_consistent();
}

#[test]
fn delete_refuses_parents_and_wrong_ids() {
    let t = TestDirectory::memory();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let parent = t.ops().delete(&t.partition, &DeleteContext::new(dn(PEOPLE)));
    assert_eq!(parent.unwrap_err().kind(), ErrorKind::ContextNotEmpty);

    let wrong = DeleteContext::new(dn("cn=ann,ou=people,dc=example,dc=com")).with_id(EntryId::new());
    assert_eq!(t.ops().delete(&t.partition, &wrong).unwrap_err().kind(), ErrorKind::NoSuchObject);

    let missing = t.ops().delete(&t.partition, &DeleteContext::new(dn("cn=zed,dc=example,dc=com")));
    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NoSuchObject);
    assert!(t.exists("cn=ann,ou=people,dc=example,dc=com"));
}

#[test]
fn modify_updates_user_index() {
    let t = TestDirectory::memory();
    let ann = t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let ctx = ModifyContext::new(
        dn("cn=ann,ou=people,dc=example,dc=com"),
        vec![Modification::add("cn", ["Annie"]), Modification::replace("description", ["tester"])],
    );
    let after = t.ops().modify(&t.partition, &ctx).unwrap();
    assert_eq!(after.values("description"), ["tester"]);

    let cn = t.partition.user_index("cn").unwrap();
    let v = at(&t);
    assert_eq!(cn.forward_lookup(&IndexKey::value("annie"), v), vec![ann]);
    assert_eq!(cn.forward_lookup(&IndexKey::value("ann"), v), vec![ann]);
    t.assert_consistent();
}

#[test]
fn modify_cannot_drop_the_rdn_value() {
    let t = TestDirectory::memory();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let ctx = ModifyContext::new(
        dn("cn=ann,ou=people,dc=example,dc=com"),
        vec![Modification::remove("cn", ["ann"])],
    );
    assert_eq!(t.ops().modify(&t.partition, &ctx).unwrap_err().kind(), ErrorKind::SchemaViolation);
    let stored = t.lookup("cn=ann,ou=people,dc=example,dc=com").unwrap();
    assert_eq!(stored.values("cn"), ["ann"]);
}

#[test]
fn rename_replaces_rdn_and_keeps_old_value_on_request() {
    let t = TestDirectory::memory();
    let ann = t.add(person("cn=ann,ou=people,dc=example,dc=com"));

    let keep = RenameContext::new(dn("cn=ann,ou=people,dc=example,dc=com"), Rdn::new("cn", "anna"), false);
    let renamed = t.ops().rename(&t.partition, &keep).unwrap();
    assert_eq!(renamed.dn(), &dn("cn=anna,ou=people,dc=example,dc=com"));
    assert_eq!(renamed.values("cn").len(), 2);

    let drop_old = RenameContext::new(dn("cn=anna,ou=people,dc=example,dc=com"), Rdn::new("cn", "ana"), true);
    let renamed = t.ops().rename(&t.partition, &drop_old).unwrap();
    assert_eq!(renamed.values("cn"), ["ann", "ana"]);
    assert_eq!(t.dn_of(ann), Some(dn("cn=ana,ou=people,dc=example,dc=com")));
    assert!(!t.exists("cn=anna,ou=people,dc=example,dc=com"));
    t.assert_consistent();
}

#[test]
fn rename_to_taken_name_fails() {
    let t = TestDirectory::memory();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    t.add(person("cn=bob,ou=people,dc=example,dc=com"));
    let ctx = RenameContext::new(dn("cn=bob,ou=people,dc=example,dc=com"), Rdn::new("cn", "ANN"), true);
    assert_eq!(t.ops().rename(&t.partition, &ctx).unwrap_err().kind(), ErrorKind::EntryAlreadyExists);
}

#[test]
fn move_rewrites_descendant_names_and_ancestry() {
    let t = TestDirectory::memory();
    let team = t.add(ou("ou=team,ou=people,dc=example,dc=com"));
    let ann = t.add(person("cn=ann,ou=team,ou=people,dc=example,dc=com"));
    let people = t.lookup_id(PEOPLE);
    let groups = t.lookup_id(GROUPS);

    let moved = t
        .ops()
        .move_entry(&t.partition, &MoveContext::new(dn("ou=team,ou=people,dc=example,dc=com"), dn(GROUPS)))
        .unwrap();
    assert_eq!(moved.dn(), &dn("ou=team,ou=groups,dc=example,dc=com"));
    assert_eq!(t.dn_of(ann), Some(dn("cn=ann,ou=team,ou=groups,dc=example,dc=com")));

    let sub = t.partition.system_index(SystemIndex::SubLevel).unwrap();
    let v = at(&t);
    assert!(sub.contains(&IndexKey::Id(groups), ann, v));
    assert!(!sub.contains(&IndexKey::Id(people), ann, v));
    assert!(sub.contains(&IndexKey::Id(team), ann, v));
    t.assert_consistent();
}

#[test]
fn move_refusals() {
    let t = TestDirectory::memory();
    t.add(ou("ou=team,ou=people,dc=example,dc=com"));
    let into_self = MoveContext::new(dn(PEOPLE), dn("ou=team,ou=people,dc=example,dc=com"));
    assert_eq!(t.ops().move_entry(&t.partition, &into_self).unwrap_err().kind(), ErrorKind::UnwillingToPerform);

    let nowhere = MoveContext::new(dn(PEOPLE), dn("ou=void,dc=example,dc=com"));
    assert_eq!(t.ops().move_entry(&t.partition, &nowhere).unwrap_err().kind(), ErrorKind::NoSuchObject);

    t.add(referral("ou=remote,dc=example,dc=com", "ldap://elsewhere/ou=remote"));
    let below_referral = MoveContext::new(dn(GROUPS), dn("ou=remote,dc=example,dc=com"));
    assert_eq!(
        t.ops().move_entry(&t.partition, &below_referral).unwrap_err().kind(),
        ErrorKind::UnwillingToPerform
    );
    t.assert_consistent();
}

#[test]
fn move_and_rename_in_one_step() {
    let t = TestDirectory::memory();
    let ann = t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let ctx = MoveAndRenameContext::new(
        dn("cn=ann,ou=people,dc=example,dc=com"),
        dn(GROUPS),
        Rdn::new("cn", "admins"),
        false,
    );
    let entry = t.ops().move_and_rename(&t.partition, &ctx).unwrap();
    assert_eq!(entry.dn(), &dn("cn=admins,ou=groups,dc=example,dc=com"));
    assert!(entry.values("cn").iter().any(|v| v == "ann"));
    assert_eq!(t.dn_of(ann), Some(entry.dn().clone()));
    t.assert_consistent();
}

#[test]
fn lookup_projects_attributes() {
    let t = TestDirectory::memory();
    t.add(person("cn=ann,ou=people,dc=example,dc=com"));
    let ctx = LookupContext::new(dn("cn=ann,ou=people,dc=example,dc=com")).attributes(["sn"]);
    let entry = t.ops().lookup(&t.partition, &ctx).unwrap();
    assert_eq!(entry.values("sn"), ["ann"]);
    assert!(entry.values("cn").is_empty());

    let missing = t.ops().lookup(&t.partition, &LookupContext::new(dn("cn=nope,dc=example,dc=com")));
    assert_eq!(missing.unwrap_err().kind(), ErrorKind::NoSuchObject);
}

trait LookupId {
    fn lookup_id(&self, dn_text: &str) -> EntryId;
}

impl LookupId for TestDirectory {
    fn lookup_id(&self, dn_text: &str) -> EntryId {
        let rdn = self.partition.system_index(SystemIndex::SubLevel).unwrap();
        let v = self.transactions().logical_data_version();
        let target = dn(dn_text);
        rdn.forward_lookup(&IndexKey::Id(EntryId::DEFAULT), v)
            .into_iter()
            .find(|id| self.dn_of(*id).as_ref() == Some(&target))
            .unwrap_or_else(|| panic!("{dn_text} not found"))
    }
}
