//! Property-based test generators using proptest.
//!
//! Scripts address entries by position in the list of ids created so far,
//! so any generated script can run against any tree. Steps that the
//! directory legitimately refuses (moving an entry below itself, deleting
//! a parent) are counted, not treated as failures.

use crate::fixtures::{alias, ou, person, TestDirectory, SUFFIX};
use ditstore_core::{
    DeleteContext, Dn, EntryId, ErrorKind, Modification, ModifyContext, MoveContext, Rdn, RenameContext,
};
use proptest::prelude::*;

/// Strategy for Rdn values that are valid for `cn` and `ou`.
pub fn rdn_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for entry ids.
pub fn entry_id_strategy() -> impl Strategy<Value = EntryId> {
    prop::array::uniform16(any::<u8>()).prop_map(EntryId::from_bytes)
}

/// One step of a tree script.
#[derive(Debug, Clone)]
pub enum TreeOp {
    /// Add an organizational unit below the `parent`-th known entry.
    AddOu {
        /// Parent position.
        parent: usize,
        /// Rdn value.
        name: String,
    },
    /// Add a person below the `parent`-th known entry.
    AddPerson {
        /// Parent position.
        parent: usize,
        /// Rdn value.
        name: String,
    },
    /// Add an alias of the `target`-th entry below the `parent`-th.
    AddAlias {
        /// Parent position.
        parent: usize,
        /// Target position.
        target: usize,
        /// Rdn value.
        name: String,
    },
    /// Delete the `target`-th entry.
    Delete {
        /// Target position.
        target: usize,
    },
    /// Rename the `target`-th entry.
    Rename {
        /// Target position.
        target: usize,
        /// New Rdn value.
        name: String,
    },
    /// Move the `target`-th entry below the `parent`-th.
    Move {
        /// Target position.
        target: usize,
        /// New parent position.
        parent: usize,
    },
    /// Replace the description of the `target`-th entry.
    Describe {
        /// Target position.
        target: usize,
        /// New description.
        text: String,
    },
}

/// Strategy for one script step.
pub fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    let pos = 0usize..64;
    prop_oneof![
        3 => (pos.clone(), rdn_value_strategy()).prop_map(|(parent, name)| TreeOp::AddOu { parent, name }),
        3 => (pos.clone(), rdn_value_strategy()).prop_map(|(parent, name)| TreeOp::AddPerson { parent, name }),
        1 => (pos.clone(), pos.clone(), rdn_value_strategy())
            .prop_map(|(parent, target, name)| TreeOp::AddAlias { parent, target, name }),
        2 => pos.clone().prop_map(|target| TreeOp::Delete { target }),
        1 => (pos.clone(), rdn_value_strategy()).prop_map(|(target, name)| TreeOp::Rename { target, name }),
        2 => (pos.clone(), pos.clone()).prop_map(|(target, parent)| TreeOp::Move { target, parent }),
        1 => (pos, "[a-z ]{1,12}").prop_map(|(target, text)| TreeOp::Describe { target, text }),
    ]
}

/// Strategy for a script of up to `max_len` steps.
pub fn tree_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<TreeOp>> {
    prop::collection::vec(tree_op_strategy(), 1..max_len)
}

/// Outcome counts of [`run_script`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStats {
    /// Steps the directory accepted.
    pub applied: usize,
    /// Steps it refused with a directory error.
    pub refused: usize,
}

/// Runs `script` against `t`, one implicit transaction per step.
///
/// # Panics
///
/// When a step fails with anything other than a directory-level refusal.
pub fn run_script(t: &TestDirectory, script: &[TreeOp]) -> ScriptStats {
    let mut known: Vec<EntryId> = vec![EntryId::DEFAULT];
    let mut stats = ScriptStats::default();
    for step in script {
        let pick = |known: &[EntryId], i: usize| known[i % known.len()];
        let name_of = |id: EntryId| t.dn_of(id);
        let outcome = match step {
            TreeOp::AddOu { parent, name } => name_of(pick(&known, *parent)).map(|p| {
                t.ops()
                    .add(&t.partition, &ditstore_core::AddContext::new(ou(&child(&p, "ou", name))))
                    .map(|id| known.push(id))
            }),
            TreeOp::AddPerson { parent, name } => name_of(pick(&known, *parent)).map(|p| {
                t.ops()
                    .add(&t.partition, &ditstore_core::AddContext::new(person(&child(&p, "cn", name))))
                    .map(|id| known.push(id))
            }),
            TreeOp::AddAlias { parent, target, name } => {
                match (name_of(pick(&known, *parent)), name_of(pick(&known, *target))) {
                    (Some(p), Some(target)) => Some(
                        t.ops()
                            .add(
                                &t.partition,
                                &ditstore_core::AddContext::new(alias(&child(&p, "cn", name), &target.to_string())),
                            )
                            .map(|id| known.push(id)),
                    ),
                    _ => None,
                }
            }
            TreeOp::Delete { target } => name_of(pick(&known, *target)).map(|d| {
                t.ops().delete(&t.partition, &DeleteContext::new(d))
            }),
            TreeOp::Rename { target, name } => name_of(pick(&known, *target)).map(|d| {
                let attr = d.rdn().map_or("cn", |r| r.attribute()).to_string();
                t.ops()
                    .rename(&t.partition, &RenameContext::new(d, Rdn::new(attr, name.clone()), true))
                    .map(drop)
            }),
            TreeOp::Move { target, parent } => {
                match (name_of(pick(&known, *target)), name_of(pick(&known, *parent))) {
                    (Some(d), Some(p)) => Some(t.ops().move_entry(&t.partition, &MoveContext::new(d, p)).map(drop)),
                    _ => None,
                }
            }
            TreeOp::Describe { target, text } => name_of(pick(&known, *target)).map(|d| {
                t.ops()
                    .modify(
                        &t.partition,
                        &ModifyContext::new(d, vec![Modification::replace("description", [text.as_str()])]),
                    )
                    .map(drop)
            }),
        };
        match outcome {
            Some(Ok(())) => stats.applied += 1,
            Some(Err(e)) => {
                assert!(
                    !matches!(e.kind(), ErrorKind::StorageFailure | ErrorKind::IllegalState),
                    "step {step:?} failed: {e}"
                );
                stats.refused += 1;
            }
            // Target was deleted earlier in the script.
            None => stats.refused += 1,
        }
    }
    stats
}

fn child(parent: &Dn, attribute: &str, value: &str) -> String {
    if parent.is_empty() {
        format!("{attribute}={value},{SUFFIX}")
    } else {
        format!("{attribute}={value},{parent}")
    }
}
