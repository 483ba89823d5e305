use super::session::Session;
use crate::entry::{Entry, EntryId};
use crate::error::{CoreError, CoreResult};
use crate::name::Dn;

/// Attribute naming the target of an alias.
pub(crate) const ALIASED_OBJECT_NAME: &str = "aliasedObjectName";

/// Resolves and checks the target of alias `entry`, which is named `dn`.
///
/// The target must be a different, existing, non-alias entry of the same
/// partition that is not an ancestor of the alias.
pub(crate) fn resolve_target(session: &mut Session<'_>, dn: &Dn, entry: &Entry) -> CoreResult<EntryId> {
    let raw = match entry.values(ALIASED_OBJECT_NAME) {
        [one] => one,
        [] => return Err(CoreError::alias(format!("alias {dn} has no {ALIASED_OBJECT_NAME}"))),
        _ => return Err(CoreError::alias(format!("alias {dn} has several targets"))),
    };
    let target = Dn::parse(raw).map_err(|e| CoreError::alias(format!("alias {dn}: {e}")))?;
    if target == *dn {
        return Err(CoreError::alias(format!("alias {dn} points to itself")));
    }
    if dn.is_descendant_of(&target) {
        return Err(CoreError::alias(format!("alias {dn} points to its ancestor {target}")));
    }
    if !target.is_descendant_or_self(session.suffix()) {
        return Err(CoreError::alias(format!(
            "alias target {target} is outside {}",
            session.suffix()
        )));
    }
    let Some(id) = session.resolve(&target)? else {
        return Err(CoreError::alias(format!("alias target {target} does not exist")));
    };
    if session.existing(id)?.is_alias() {
        return Err(CoreError::alias(format!("alias target {target} is itself an alias")));
    }
    Ok(id)
}

/// True when the `aliasedObjectName` of the two entries differ.
pub(crate) fn target_changed(before: &Entry, after: &Entry) -> bool {
    let norm = |e: &Entry| {
        e.values(ALIASED_OBJECT_NAME)
            .iter()
            .map(|v| Dn::parse(v).map(|d| d.normalized().to_string()).unwrap_or_else(|_| v.clone()))
            .collect::<Vec<_>>()
    };
    before.is_alias() != after.is_alias() || norm(before) != norm(after)
}
