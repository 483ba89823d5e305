use super::{AttributeType, MatchingRule, ObjectClass, ObjectClassKind, SchemaAuthority};
use std::collections::HashMap;

/// In-memory schema registry.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    attribute_types: Vec<AttributeType>,
    object_classes: Vec<ObjectClass>,
    attribute_names: HashMap<String, usize>,
    class_names: HashMap<String, usize>,
}

impl Schema {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attribute type under its OID and every name.
    pub fn add_attribute_type(&mut self, at: AttributeType) {
        let slot = self.attribute_types.len();
        self.attribute_names.insert(at.oid.to_ascii_lowercase(), slot);
        for name in &at.names {
            self.attribute_names.insert(name.to_ascii_lowercase(), slot);
        }
        self.attribute_types.push(at);
    }

    /// Registers an object class under its OID and every name.
    pub fn add_object_class(&mut self, oc: ObjectClass) {
        let slot = self.object_classes.len();
        self.class_names.insert(oc.oid.to_ascii_lowercase(), slot);
        for name in &oc.names {
            self.class_names.insert(name.to_ascii_lowercase(), slot);
        }
        self.object_classes.push(oc);
    }

    /// Registered attribute types.
    pub fn attribute_types(&self) -> impl Iterator<Item = &AttributeType> {
        self.attribute_types.iter()
    }

    /// Standard attribute types and object classes (RFC 4519, 4524, 2798 and
    /// the ApacheDS operational attributes).
    #[must_use]
    pub fn core() -> Self {
        use MatchingRule::{DistinguishedName, Integer, OctetString};

        let mut s = Self::new();
        for at in [
            AttributeType::new("2.5.4.0", &["objectClass"]),
            AttributeType::new("2.5.4.1", &["aliasedObjectName", "aliasedEntryName"])
                .equality(DistinguishedName)
                .single_valued(),
            AttributeType::new("2.5.4.3", &["cn", "commonName"]),
            AttributeType::new("2.5.4.4", &["sn", "surname"]),
            AttributeType::new("2.5.4.6", &["c", "countryName"]).single_valued(),
            AttributeType::new("2.5.4.7", &["l", "localityName"]),
            AttributeType::new("2.5.4.10", &["o", "organizationName"]),
            AttributeType::new("2.5.4.11", &["ou", "organizationalUnitName"]),
            AttributeType::new("2.5.4.12", &["title"]),
            AttributeType::new("2.5.4.13", &["description"]),
            AttributeType::new("2.5.4.20", &["telephoneNumber"]),
            AttributeType::new("2.5.4.31", &["member"]).equality(DistinguishedName),
            AttributeType::new("2.5.4.35", &["userPassword"]).equality(OctetString),
            AttributeType::new("2.5.4.42", &["givenName", "gn"]),
            AttributeType::new("2.16.840.1.113730.3.1.3", &["employeeNumber"]).single_valued(),
            AttributeType::new("2.16.840.1.113730.3.1.34", &["ref"]),
            AttributeType::new("0.9.2342.19200300.100.1.1", &["uid", "userid"]),
            AttributeType::new("0.9.2342.19200300.100.1.3", &["mail", "rfc822Mailbox"]),
            AttributeType::new("0.9.2342.19200300.100.1.25", &["dc", "domainComponent"]).single_valued(),
            AttributeType::new("1.3.6.1.1.1.1.0", &["uidNumber"])
                .equality(Integer)
                .single_valued(),
            AttributeType::new("1.3.6.1.1.16.4", &["entryUUID"])
                .equality(OctetString)
                .single_valued()
                .no_user_modification(),
        ] {
            s.add_attribute_type(at);
        }

        for oc in [
            ObjectClass::structural("2.5.6.0", "top", &["objectClass"], &[])
                .superiors(&[])
                .kind(ObjectClassKind::Abstract),
            ObjectClass::structural("2.5.6.1", "alias", &["aliasedObjectName"], &[]),
            ObjectClass::structural("2.16.840.1.113730.3.2.6", "referral", &["ref"], &[]),
            ObjectClass::structural("2.5.6.6", "person", &["sn", "cn"], &["userPassword", "telephoneNumber", "description"]),
            ObjectClass::structural("2.5.6.7", "organizationalPerson", &[], &["title", "ou", "l"])
                .superiors(&["person"]),
            ObjectClass::structural("2.16.840.1.113730.3.2.2", "inetOrgPerson", &[], &["uid", "mail", "givenName", "employeeNumber"])
                .superiors(&["organizationalPerson"]),
            ObjectClass::structural("2.5.6.5", "organizationalUnit", &["ou"], &["description"]),
            ObjectClass::structural("2.5.6.4", "organization", &["o"], &["description"]),
            ObjectClass::structural("0.9.2342.19200300.100.4.13", "domain", &["dc"], &["description", "o"]),
            ObjectClass::structural("1.3.6.1.4.1.1466.344", "dcObject", &["dc"], &[])
                .kind(ObjectClassKind::Auxiliary),
            ObjectClass::structural("1.3.6.1.4.1.1466.101.120.111", "extensibleObject", &[], &[])
                .kind(ObjectClassKind::Auxiliary),
            ObjectClass::structural("2.5.6.9", "groupOfNames", &["member", "cn"], &["description", "o", "ou"]),
        ] {
            s.add_object_class(oc);
        }
        s
    }
}

impl SchemaAuthority for Schema {
    fn attribute_type(&self, name: &str) -> Option<&AttributeType> {
        self.attribute_names
            .get(&name.trim().to_ascii_lowercase())
            .map(|&slot| &self.attribute_types[slot])
    }

    fn object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.class_names
            .get(&name.trim().to_ascii_lowercase())
            .map(|&slot| &self.object_classes[slot])
    }
}
