//! Rename, move and move-and-rename.
//!
//! All three rewrite the Dn of every entry in the moved subtree and the
//! structural and alias slots that depend on where those entries sit. The
//! ids never change.

use super::keys::{alias_keys, structural_keys, AliasLink, KeySet, Placement};
use super::schema_check;
use super::session::Session;
use crate::entry::{Entry, EntryId, Modification};
use crate::error::{CoreError, CoreResult};
use crate::logedit::EntryChange;
use crate::name::{Dn, Rdn};
use std::collections::{BTreeMap, BTreeSet};

/// What a relocation asks for.
pub(crate) struct Relocation<'a> {
    pub dn: &'a Dn,
    pub new_superior: Option<&'a Dn>,
    pub new_rdn: Option<&'a Rdn>,
    pub delete_old_rdn: bool,
}

struct Moved {
    before: Entry,
    after: Entry,
    from: Placement,
    to: Placement,
}

pub(crate) fn relocate(session: &mut Session<'_>, request: &Relocation<'_>) -> CoreResult<Entry> {
    let dn = request.dn;
    let (id, entry) = session.require(dn)?;
    if id == session.partition().default_id() || dn == session.suffix() {
        return Err(CoreError::unwilling(format!("cannot rename or move the context entry {dn}")));
    }
    let from = session.placement(id)?;
    let old_rdn = dn
        .rdn()
        .cloned()
        .ok_or_else(|| CoreError::unwilling("cannot rename the root"))?;
    let rdn = request.new_rdn.cloned().unwrap_or_else(|| old_rdn.clone());

    let (parent, parent_dn, parent_ancestors) = match request.new_superior {
        None => (
            from.parent,
            dn.parent().unwrap_or_default(),
            from.ancestors.get(1..).unwrap_or_default().to_vec(),
        ),
        Some(superior) => {
            let superior_id = session
                .resolve(superior)?
                .ok_or_else(|| CoreError::no_such_object(superior))?;
            let lineage = session.lineage(superior_id)?;
            if lineage.contains(&id) {
                return Err(CoreError::unwilling(format!("cannot move {dn} below itself")));
            }
            if session.existing(superior_id)?.is_alias() {
                return Err(CoreError::alias(format!("cannot move {dn} below the alias {superior}")));
            }
            for ancestor in &lineage {
                if session.existing(*ancestor)?.is_referral() {
                    return Err(CoreError::unwilling(format!("{superior} lies below a referral")));
                }
            }
            (superior_id, superior.clone(), lineage[1..].to_vec())
        }
    };

    let new_dn = parent_dn.child(rdn.clone());
    if let Some(other) = session.resolve(&new_dn)? {
        if other != id {
            return Err(CoreError::entry_already_exists(&new_dn));
        }
    }
    let to = Placement::under(parent, rdn.normalized(), &parent_ancestors);

    let mut root = entry.clone();
    root.set_dn(new_dn.clone());
    let mut deltas = Vec::new();
    if request.new_rdn.is_some() {
        for ava in rdn.avas() {
            if !entry.values(ava.attribute()).iter().any(|v| v.eq_ignore_ascii_case(ava.value())) {
                deltas.push(Modification::add(ava.attribute(), [ava.value()]));
            }
        }
        schema_check::add_rdn_values(session.schema(), &mut root, &rdn)?;
        if request.delete_old_rdn {
            for ava in old_rdn.avas() {
                if rdn.avas().contains(ava) {
                    continue;
                }
                if schema_check::remove_value(session.schema(), &mut root, ava.attribute(), ava.value())? {
                    deltas.push(Modification::remove(ava.attribute(), [ava.value()]));
                }
            }
        }
        schema_check::check_entry(session.schema(), &root)?;
    }

    let mut moved = BTreeMap::new();
    for member in session.subtree(id)? {
        if member == id {
            continue;
        }
        let before = session.existing(member)?;
        let from = session.placement(member)?;
        let cut = from
            .ancestors
            .iter()
            .position(|a| *a == id)
            .ok_or_else(|| CoreError::storage_failure(format!("{member} is indexed below {id} but not placed there")))?;
        let mut ancestors = from.ancestors[..=cut].to_vec();
        ancestors.extend_from_slice(&to.ancestors);
        let to = Placement {
            parent: from.parent,
            rdn: from.rdn.clone(),
            ancestors,
        };
        let mut after = before.clone();
        let rebased = before
            .dn()
            .rebase(dn, &new_dn)
            .ok_or_else(|| CoreError::storage_failure(format!("stored name {} is not below {dn}", before.dn())))?;
        after.set_dn(rebased);
        moved.insert(member, Moved { before, after, from, to });
    }
    moved.insert(
        id,
        Moved {
            before: entry,
            after: root.clone(),
            from,
            to,
        },
    );

    // Aliases in the subtree and aliases of anything in it.
    let mut aliases = BTreeSet::new();
    for (member, m) in &moved {
        if m.before.is_alias() {
            aliases.insert(*member);
        }
    }
    let members: Vec<EntryId> = moved.keys().copied().collect();
    for member in &members {
        aliases.extend(session.aliases_of(*member)?);
    }

    let mut before_keys = KeySet::new();
    let mut after_keys = KeySet::new();
    for (member, m) in &moved {
        before_keys.extend(session.deriver().content_keys(*member, &m.before));
        before_keys.extend(structural_keys(*member, &m.from));
        after_keys.extend(session.deriver().content_keys(*member, &m.after));
        after_keys.extend(structural_keys(*member, &m.to));
    }
    for alias in &aliases {
        let Some(link) = session.alias_link(*alias)? else {
            continue;
        };
        let (from, to) = match moved.get(alias) {
            Some(m) => (m.from.clone(), m.to.clone()),
            None => {
                let here = session.placement(*alias)?;
                (here.clone(), here)
            }
        };
        let moved_link = match moved.get(&link.target) {
            Some(m) => AliasLink {
                target: link.target,
                target_ancestors: m.to.ancestors.clone(),
            },
            None => link.clone(),
        };
        if to.ancestors.contains(&moved_link.target) {
            return Err(CoreError::alias(format!("alias {alias} would sit below its own target")));
        }
        before_keys.extend(alias_keys(*alias, &from, &link));
        after_keys.extend(alias_keys(*alias, &to, &moved_link));
    }

    let mut affected: BTreeSet<EntryId> = moved.keys().copied().collect();
    affected.extend(aliases.iter().copied());

    let root_change = moved.remove(&id).map(|m| (m.before, m.after));
    if let Some((before, after)) = root_change {
        session.emit_entry(id, new_dn.clone(), EntryChange::Modify { deltas, before, after })?;
    }
    for (member, m) in moved {
        let dn = m.after.dn().clone();
        session.emit_entry(
            member,
            dn,
            EntryChange::Modify {
                deltas: Vec::new(),
                before: m.before,
                after: m.after,
            },
        )?;
    }
    session.emit_diff(&before_keys, &after_keys, &affected)?;
    Ok(root)
}
