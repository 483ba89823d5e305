//! Schema validation of entries and modifications.

use crate::entry::{Entry, Modification, ModificationOp};
use crate::error::{CoreError, CoreResult};
use crate::name::Rdn;
use crate::schema::{AttributeType, ObjectClassKind, SchemaAuthority};

fn attribute_type<'s>(schema: &'s dyn SchemaAuthority, id: &str) -> CoreResult<&'s AttributeType> {
    schema
        .attribute_type(id)
        .ok_or_else(|| CoreError::schema_violation(format!("attribute {id} is not defined")))
}

/// Id under which `entry` stores the attribute of type `at`, whatever name
/// the caller originally used.
fn stored_id(schema: &dyn SchemaAuthority, entry: &Entry, at: &AttributeType) -> Option<String> {
    entry
        .attributes()
        .find(|attr| schema.attribute_type(attr.id()).is_some_and(|t| t.oid == at.oid))
        .map(|attr| attr.id().to_string())
}

fn position_of(at: &AttributeType, values: &[String], value: &str) -> CoreResult<Option<usize>> {
    let wanted = at.normalize(value)?;
    for (i, v) in values.iter().enumerate() {
        if at.normalize(v)? == wanted {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// Checks every attribute and object class of `entry`.
pub(crate) fn check_entry(schema: &dyn SchemaAuthority, entry: &Entry) -> CoreResult<()> {
    let mut seen_oids = Vec::new();
    for attr in entry.attributes() {
        let at = attribute_type(schema, attr.id())?;
        if seen_oids.contains(&at.oid) {
            return Err(CoreError::schema_violation(format!(
                "attribute {} given under two names",
                at.name()
            )));
        }
        seen_oids.push(at.oid.clone());
        if attr.is_empty() {
            return Err(CoreError::schema_violation(format!("attribute {} has no values", attr.id())));
        }
        if at.single_valued && attr.values().len() > 1 {
            return Err(CoreError::schema_violation(format!(
                "attribute {} is single-valued",
                at.name()
            )));
        }
        let mut normalized = Vec::with_capacity(attr.values().len());
        for value in attr.values() {
            let norm = at.normalize(value)?;
            if normalized.contains(&norm) {
                return Err(CoreError::schema_violation(format!(
                    "attribute {} repeats value {value:?}",
                    at.name()
                )));
            }
            normalized.push(norm);
        }
    }
    let classes = entry.values("objectClass");
    if classes.is_empty() {
        return Err(CoreError::schema_violation(format!("{} has no objectClass", entry.dn())));
    }
    let mut structural = false;
    for class in classes {
        let Some(oc) = schema.object_class(class) else {
            return Err(CoreError::schema_violation(format!("object class {class} is not defined")));
        };
        structural |= oc.kind == ObjectClassKind::Structural;
        for must in schema.required_attributes(class) {
            let present = attribute_type(schema, &must).map_or(false, |at| stored_id(schema, entry, at).is_some());
            if !present {
                return Err(CoreError::schema_violation(format!(
                    "attribute {must} required by {class} is missing"
                )));
            }
        }
    }
    if !structural {
        return Err(CoreError::schema_violation(format!(
            "{} has no structural object class",
            entry.dn()
        )));
    }
    Ok(())
}

/// Adds any value of the entry's Rdn the entry does not already hold.
pub(crate) fn add_rdn_values(schema: &dyn SchemaAuthority, entry: &mut Entry, rdn: &Rdn) -> CoreResult<()> {
    for ava in rdn.avas() {
        let at = attribute_type(schema, ava.attribute())?;
        let id = stored_id(schema, entry, at).unwrap_or_else(|| ava.attribute().to_string());
        if position_of(at, entry.values(&id), ava.value())?.is_none() {
            entry.add_values(&id, [ava.value()]);
        }
    }
    Ok(())
}

/// Removes one value by matching-rule equality. Returns false when absent.
pub(crate) fn remove_value(schema: &dyn SchemaAuthority, entry: &mut Entry, attribute: &str, value: &str) -> CoreResult<bool> {
    let at = attribute_type(schema, attribute)?;
    let Some(id) = stored_id(schema, entry, at) else {
        return Ok(false);
    };
    let Some(slot) = position_of(at, entry.values(&id), value)? else {
        return Ok(false);
    };
    let emptied = match entry.get_mut(&id) {
        Some(attr) => {
            attr.values_mut().remove(slot);
            attr.is_empty()
        }
        None => false,
    };
    if emptied {
        entry.remove_attribute(&id);
    }
    Ok(true)
}

/// Fails when `entry` no longer holds every value of `rdn`.
pub(crate) fn check_rdn_values(schema: &dyn SchemaAuthority, entry: &Entry, rdn: &Rdn) -> CoreResult<()> {
    for ava in rdn.avas() {
        let at = attribute_type(schema, ava.attribute())?;
        let held = match stored_id(schema, entry, at) {
            Some(id) => position_of(at, entry.values(&id), ava.value())?.is_some(),
            None => false,
        };
        if !held {
            return Err(CoreError::schema_violation(format!(
                "cannot remove Rdn value {}={}",
                ava.attribute(),
                ava.value()
            )));
        }
    }
    Ok(())
}

/// Applies `modifications` to `entry` in order.
pub(crate) fn apply_modifications(
    schema: &dyn SchemaAuthority,
    entry: &mut Entry,
    modifications: &[Modification],
) -> CoreResult<()> {
    for m in modifications {
        let at = attribute_type(schema, &m.attribute)?;
        if !at.user_modifiable {
            return Err(CoreError::schema_violation(format!(
                "attribute {} is not user-modifiable",
                at.name()
            )));
        }
        let id = stored_id(schema, entry, at).unwrap_or_else(|| m.attribute.clone());
        match m.op {
            ModificationOp::Add => {
                if m.values.is_empty() {
                    return Err(CoreError::schema_violation(format!("add of {} carries no values", m.attribute)));
                }
                for value in &m.values {
                    if position_of(at, entry.values(&id), value)?.is_some() {
                        return Err(CoreError::AttributeOrValueExists {
                            attribute: m.attribute.clone(),
                            value: value.clone(),
                        });
                    }
                    entry.add_values(&id, [value.as_str()]);
                }
            }
            ModificationOp::Remove => {
                if !entry.contains_attribute(&id) {
                    return Err(no_such_attribute(entry, &m.attribute));
                }
                if m.values.is_empty() {
                    entry.remove_attribute(&id);
                }
                for value in &m.values {
                    if !remove_value(schema, entry, &id, value)? {
                        return Err(no_such_attribute(entry, &format!("{}={value}", m.attribute)));
                    }
                }
            }
            ModificationOp::Replace => {
                entry.remove_attribute(&id);
                if !m.values.is_empty() {
                    entry.put(&m.attribute, m.values.iter().map(String::as_str));
                }
            }
        }
    }
    Ok(())
}

fn no_such_attribute(entry: &Entry, attribute: &str) -> CoreError {
    CoreError::NoSuchAttribute {
        attribute: attribute.to_string(),
        dn: entry.dn().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::name::Dn;
    use crate::schema::Schema;

    fn person() -> Entry {
        Entry::new(Dn::parse("cn=Ann,ou=people,dc=test").unwrap())
            .with("objectClass", ["top", "person"])
            .with("cn", ["Ann"])
            .with("sn", ["Smith"])
    }

    #[test]
    fn valid_entry_passes() {
        check_entry(&Schema::core(), &person()).unwrap();
    }

    #[test]
    fn missing_must_attribute_is_rejected() {
        let mut entry = person();
        entry.remove_attribute("sn");
        let err = check_entry(&Schema::core(), &entry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn entry_without_structural_class_is_rejected() {
        let schema = Schema::core();
        let mut bare = person();
        bare.remove_attribute("objectClass");
        let err = check_entry(&schema, &bare).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);

        let mut abstract_only = person();
        abstract_only.put("objectClass", ["top", "extensibleObject"]);
        let err = check_entry(&schema, &abstract_only).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn must_attribute_under_alias_name_counts() {
        let mut entry = person();
        entry.remove_attribute("sn");
        entry.put("surname", ["Smith"]);
        check_entry(&Schema::core(), &entry).unwrap();
    }

    #[test]
    fn unknown_attribute_and_class_are_rejected() {
        let schema = Schema::core();
        assert!(check_entry(&schema, &person().with("shoeSize", ["9"])).is_err());
        assert!(check_entry(&schema, &person().with("objectClass", ["spaceship"])).is_err());
    }

    #[test]
    fn single_valued_and_duplicates() {
        let schema = Schema::core();
        let two_countries = person().with("c", ["NZ", "AU"]);
        assert!(check_entry(&schema, &two_countries).is_err());
        let dup = person().with("description", ["a  b", "A B"]);
        assert!(check_entry(&schema, &dup).is_err());
    }

    #[test]
    fn rdn_values_are_added_once() {
        let schema = Schema::core();
        let mut entry = person();
        let rdn = Rdn::new("CN", "ann");
        add_rdn_values(&schema, &mut entry, &rdn).unwrap();
        assert_eq!(entry.values("cn"), ["Ann"]);
        add_rdn_values(&schema, &mut entry, &Rdn::new("uid", "ann")).unwrap();
        assert_eq!(entry.values("uid"), ["ann"]);
    }

    #[test]
    fn modifications_apply_in_order() {
        let schema = Schema::core();
        let mut entry = person();
        apply_modifications(
            &schema,
            &mut entry,
            &[
                Modification::add("description", ["one"]),
                Modification::add("description", ["two"]),
                Modification::remove("description", ["ONE"]),
                Modification::replace("sn", ["Jones"]),
            ],
        )
        .unwrap();
        assert_eq!(entry.values("description"), ["two"]);
        assert_eq!(entry.values("sn"), ["Jones"]);
    }

    #[test]
    fn modification_errors() {
        let schema = Schema::core();
        let mut entry = person();
        let exists = apply_modifications(&schema, &mut entry, &[Modification::add("cn", ["ann"])]).unwrap_err();
        assert_eq!(exists.kind(), ErrorKind::AttributeOrValueExists);

        let missing = apply_modifications(&schema, &mut entry, &[Modification::remove_all("mail")]).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NoSuchAttribute);

        let value = apply_modifications(&schema, &mut entry, &[Modification::remove("sn", ["Nobody"])]).unwrap_err();
        assert_eq!(value.kind(), ErrorKind::NoSuchAttribute);

        let operational =
            apply_modifications(&schema, &mut entry, &[Modification::replace("entryUUID", ["x"])]).unwrap_err();
        assert_eq!(operational.kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn removing_an_rdn_value_is_detected() {
        let schema = Schema::core();
        let mut entry = person();
        apply_modifications(&schema, &mut entry, &[Modification::replace("cn", ["Annie"])]).unwrap();
        let rdn = entry.dn().rdn().unwrap().clone();
        assert!(check_rdn_values(&schema, &entry, &rdn).is_err());
    }
}
