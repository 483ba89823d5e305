//! Add, delete and modify.

use super::alias;
use super::context::{AddContext, DeleteContext, ModifyContext};
use super::keys::{alias_keys, KeySet, Placement};
use super::schema_check;
use super::session::Session;
use crate::entry::{Entry, EntryId};
use crate::error::{CoreError, CoreResult};
use crate::logedit::EntryChange;
use std::collections::BTreeSet;

pub(crate) fn add(session: &mut Session<'_>, ctx: &AddContext) -> CoreResult<EntryId> {
    let mut entry = ctx.entry.clone();
    let dn = entry.dn().clone();
    let suffix = session.suffix().clone();
    if !dn.is_descendant_or_self(&suffix) {
        return Err(CoreError::no_such_object(&dn));
    }
    if session.resolve(&dn)?.is_some() {
        return Err(CoreError::entry_already_exists(&dn));
    }

    let is_context = dn == suffix;
    let placement = if is_context {
        Placement::context(suffix.normalized())
    } else {
        let parent_dn = dn.parent().unwrap_or_default();
        let parent = session
            .resolve(&parent_dn)?
            .ok_or_else(|| CoreError::no_such_object(&parent_dn))?;
        if session.existing(parent)?.is_alias() {
            return Err(CoreError::alias(format!("cannot add {dn} below the alias {parent_dn}")));
        }
        let rdn = dn.rdn().map(|r| r.normalized().to_string()).unwrap_or_default();
        let parent_ancestors = session.lineage(parent)?;
        Placement {
            parent,
            rdn,
            ancestors: parent_ancestors,
        }
    };

    if let Some(rdn) = dn.rdn() {
        schema_check::add_rdn_values(session.schema(), &mut entry, rdn)?;
    }
    schema_check::check_entry(session.schema(), &entry)?;
    let link = if entry.is_alias() {
        let target = alias::resolve_target(session, &dn, &entry)?;
        Some(session.link_to(target)?)
    } else {
        None
    };

    let id = if is_context {
        session.partition().default_id()
    } else {
        EntryId::new()
    };
    let after = session.deriver().derive(id, &entry, &placement, link.as_ref());
    session.emit_entry(id, dn, EntryChange::Add { entry })?;
    session.emit_diff(&KeySet::new(), &after, &BTreeSet::from([id]))?;
    Ok(id)
}

pub(crate) fn delete(session: &mut Session<'_>, ctx: &DeleteContext) -> CoreResult<()> {
    let (id, entry) = session.require(&ctx.dn)?;
    if ctx.id.is_some_and(|expected| expected != id) {
        return Err(CoreError::no_such_object(&ctx.dn));
    }
    if !session.children(id)?.is_empty() {
        return Err(CoreError::ContextNotEmpty {
            dn: ctx.dn.to_string(),
        });
    }

    let mut before = session.current_keys(id, &entry)?;
    let mut affected = BTreeSet::from([id]);
    // Aliases of the victim lose their alias slots but stay as dangling
    // entries.
    let link = session.link_to(id)?;
    for alias in session.aliases_of(id)? {
        if alias == id {
            continue;
        }
        let placement = session.placement(alias)?;
        before.extend(alias_keys(alias, &placement, &link));
        affected.insert(alias);
    }

    session.emit_diff(&before, &KeySet::new(), &affected)?;
    session.emit_entry(id, ctx.dn.clone(), EntryChange::Delete { entry })
}

pub(crate) fn modify(session: &mut Session<'_>, ctx: &ModifyContext) -> CoreResult<Entry> {
    let (id, before_entry) = session.require(&ctx.dn)?;
    let mut after_entry = before_entry.clone();
    schema_check::apply_modifications(session.schema(), &mut after_entry, &ctx.modifications)?;
    if let Some(rdn) = ctx.dn.rdn() {
        schema_check::check_rdn_values(session.schema(), &after_entry, rdn)?;
    }
    schema_check::check_entry(session.schema(), &after_entry)?;

    if !before_entry.is_alias() && after_entry.is_alias() {
        if !session.children(id)?.is_empty() {
            return Err(CoreError::alias(format!("{} has children and cannot become an alias", ctx.dn)));
        }
        if !session.aliases_of(id)?.is_empty() {
            return Err(CoreError::alias(format!(
                "{} is an alias target and cannot become an alias",
                ctx.dn
            )));
        }
    }

    let placement = session.placement(id)?;
    let before_link = session.alias_link(id)?;
    let after_link = if !after_entry.is_alias() {
        None
    } else if alias::target_changed(&before_entry, &after_entry) {
        let target = alias::resolve_target(session, &ctx.dn, &after_entry)?;
        Some(session.link_to(target)?)
    } else {
        before_link.clone()
    };

    let before = session.deriver().derive(id, &before_entry, &placement, before_link.as_ref());
    let after = session.deriver().derive(id, &after_entry, &placement, after_link.as_ref());
    session.emit_entry(
        id,
        ctx.dn.clone(),
        EntryChange::Modify {
            deltas: ctx.modifications.clone(),
            before: before_entry,
            after: after_entry.clone(),
        },
    )?;
    session.emit_diff(&before, &after, &BTreeSet::from([id]))?;
    Ok(after_entry)
}
