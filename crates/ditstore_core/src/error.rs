//! Error types for the directory core.

use crate::types::OperationKind;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Category of a [`CoreError`], independent of its payload.
///
/// The protocol layer maps kinds to wire result codes with
/// [`ErrorKind::result_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A Dn or id does not resolve.
    NoSuchObject,
    /// An add or move destination already exists.
    EntryAlreadyExists,
    /// Delete of an entry that still has children.
    ContextNotEmpty,
    /// Structural or attribute constraint breach.
    SchemaViolation,
    /// A modification names an attribute or value the entry does not hold.
    NoSuchAttribute,
    /// A modification adds a value the entry already holds.
    AttributeOrValueExists,
    /// Alias target is broken, circular or itself an alias.
    AliasDereferencing,
    /// Stale snapshot detected at commit.
    ConcurrencyConflict,
    /// The partition does not offer the requested capability.
    NotImplemented,
    /// The log or the underlying store failed.
    StorageFailure,
    /// A name could not be parsed.
    InvalidDn,
    /// Call made in the wrong lifecycle or transaction state.
    IllegalState,
    /// Request is well formed but refused.
    UnwillingToPerform,
}

impl ErrorKind {
    /// LDAP result code for this kind (RFC 4511 section 4.1.9).
    #[must_use]
    pub const fn result_code(self) -> u16 {
        match self {
            Self::NoSuchAttribute => 16,
            Self::AttributeOrValueExists => 20,
            Self::NoSuchObject => 32,
            Self::InvalidDn => 34,
            Self::AliasDereferencing => 36,
            Self::ConcurrencyConflict => 51,
            Self::NotImplemented | Self::UnwillingToPerform => 53,
            Self::SchemaViolation => 65,
            Self::ContextNotEmpty => 66,
            Self::EntryAlreadyExists => 68,
            Self::IllegalState => 1,
            Self::StorageFailure => 80,
        }
    }
}

/// Errors raised by the directory core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Log backend error.
    #[error("storage error: {0}")]
    Storage(#[from] ditstore_storage::StorageError),

    /// Store-level failure that did not come from the log backend.
    #[error("storage failure: {message}")]
    StorageFailure {
        /// What failed.
        message: String,
    },

    /// A log edit could not be encoded or decoded.
    #[error("log encoding error: {message}")]
    Encoding {
        /// Codec message.
        message: String,
    },

    /// The durable log is damaged.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the damage.
        message: String,
    },

    /// A log record failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// The name does not resolve.
    #[error("no such object: {target}")]
    NoSuchObject {
        /// Dn or id that failed to resolve.
        target: String,
    },

    /// The name is already taken.
    #[error("entry already exists: {dn}")]
    EntryAlreadyExists {
        /// Colliding Dn.
        dn: String,
    },

    /// The entry still has children.
    #[error("entry has children: {dn}")]
    ContextNotEmpty {
        /// Dn of the non-leaf entry.
        dn: String,
    },

    /// Schema constraint breach.
    #[error("schema violation: {message}")]
    SchemaViolation {
        /// Which constraint failed.
        message: String,
    },

    /// Missing attribute or value.
    #[error("no such attribute {attribute} in {dn}")]
    NoSuchAttribute {
        /// Attribute id, with the value when a single value was missing.
        attribute: String,
        /// Entry Dn.
        dn: String,
    },

    /// Value already present.
    #[error("attribute {attribute} already holds value {value:?}")]
    AttributeOrValueExists {
        /// Attribute id.
        attribute: String,
        /// Offending value.
        value: String,
    },

    /// Alias problem.
    #[error("alias dereferencing problem: {message}")]
    AliasDereferencing {
        /// Description of the problem.
        message: String,
    },

    /// Another transaction committed a change to something this one used.
    #[error("concurrency conflict in {txid}: {key}")]
    ConcurrencyConflict {
        /// Losing transaction.
        txid: String,
        /// First conflicting key.
        key: String,
    },

    /// Capability not offered by this partition.
    #[error("not implemented: {capability}")]
    NotImplemented {
        /// Missing capability.
        capability: String,
    },

    /// A user index was referenced that does not exist.
    #[error("no index for {oid}")]
    IndexNotFound {
        /// Attribute OID.
        oid: String,
    },

    /// Dn syntax error.
    #[error("invalid dn {dn:?}: {reason}")]
    InvalidDn {
        /// Input text.
        dn: String,
        /// Parser message.
        reason: String,
    },

    /// Wrong lifecycle or transaction state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// What was attempted.
        message: String,
    },

    /// Refused request.
    #[error("unwilling to perform: {message}")]
    UnwillingToPerform {
        /// Why.
        message: String,
    },

    /// A commit record may be in the log with no abort after it, so the
    /// transaction can reappear on restart even though it was not applied.
    #[error("outcome of {txid} is unknown until restart: {source}")]
    CommitIndeterminate {
        /// Transaction whose outcome is unknown.
        txid: String,
        /// Failure that left it unresolved.
        #[source]
        source: Box<CoreError>,
    },

    /// Lower-layer failure that interrupted an operation.
    #[error("{operation} of {target} failed: {source}")]
    Operation {
        /// Interrupted operation.
        operation: OperationKind,
        /// Target Dn or id.
        target: String,
        /// Underlying failure.
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Creates a storage failure.
    pub fn storage_failure(message: impl Into<String>) -> Self {
        Self::StorageFailure {
            message: message.into(),
        }
    }

    /// Creates an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates a no-such-object error.
    pub fn no_such_object(target: impl ToString) -> Self {
        Self::NoSuchObject {
            target: target.to_string(),
        }
    }

    /// Creates an entry-already-exists error.
    pub fn entry_already_exists(dn: impl ToString) -> Self {
        Self::EntryAlreadyExists { dn: dn.to_string() }
    }

    /// Creates a schema violation.
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            message: message.into(),
        }
    }

    /// Creates an alias dereferencing error.
    pub fn alias(message: impl Into<String>) -> Self {
        Self::AliasDereferencing {
            message: message.into(),
        }
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(capability: impl Into<String>) -> Self {
        Self::NotImplemented {
            capability: capability.into(),
        }
    }

    /// Creates an illegal-state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an unwilling-to-perform error.
    pub fn unwilling(message: impl Into<String>) -> Self {
        Self::UnwillingToPerform {
            message: message.into(),
        }
    }

    /// Taxonomy kind; sees through [`CoreError::Operation`] wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_)
            | Self::StorageFailure { .. }
            | Self::Encoding { .. }
            | Self::LogCorruption { .. }
            | Self::ChecksumMismatch { .. }
            | Self::CommitIndeterminate { .. } => ErrorKind::StorageFailure,
            Self::NoSuchObject { .. } => ErrorKind::NoSuchObject,
            Self::EntryAlreadyExists { .. } => ErrorKind::EntryAlreadyExists,
            Self::ContextNotEmpty { .. } => ErrorKind::ContextNotEmpty,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::NoSuchAttribute { .. } => ErrorKind::NoSuchAttribute,
            Self::AttributeOrValueExists { .. } => ErrorKind::AttributeOrValueExists,
            Self::AliasDereferencing { .. } => ErrorKind::AliasDereferencing,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::NotImplemented { .. } | Self::IndexNotFound { .. } => ErrorKind::NotImplemented,
            Self::InvalidDn { .. } => ErrorKind::InvalidDn,
            Self::IllegalState { .. } => ErrorKind::IllegalState,
            Self::UnwillingToPerform { .. } => ErrorKind::UnwillingToPerform,
            Self::Operation { source, .. } => source.kind(),
        }
    }

    /// Wraps a storage-class failure with the operation and target it
    /// interrupted. Other kinds are returned unchanged since they already
    /// name their target.
    #[must_use]
    pub fn during(self, operation: OperationKind, target: impl ToString) -> Self {
        match self.kind() {
            ErrorKind::StorageFailure if !matches!(self, Self::Operation { .. }) => Self::Operation {
                operation,
                target: target.to_string(),
                source: Box::new(self),
            },
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_result_code() {
        assert_eq!(CoreError::no_such_object("cn=x").kind().result_code(), 32);
        assert_eq!(
            CoreError::ContextNotEmpty {
                dn: "dc=test".into()
            }
            .kind()
            .result_code(),
            66
        );
        assert_eq!(CoreError::schema_violation("x").kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn during_wraps_only_storage_failures() {
        let wrapped = CoreError::storage_failure("disk gone").during(OperationKind::Add, "cn=x,dc=test");
        assert!(matches!(wrapped, CoreError::Operation { operation: OperationKind::Add, .. }));
        assert_eq!(wrapped.kind(), ErrorKind::StorageFailure);
        assert!(wrapped.to_string().contains("cn=x,dc=test"));

        let plain = CoreError::entry_already_exists("cn=x").during(OperationKind::Add, "cn=x");
        assert!(matches!(plain, CoreError::EntryAlreadyExists { .. }));
    }

    #[test]
    fn during_does_not_double_wrap() {
        let once = CoreError::storage_failure("x").during(OperationKind::Move, "a");
        let twice = once.during(OperationKind::MoveAndRename, "b");
        match twice {
            CoreError::Operation { operation, source, .. } => {
                assert_eq!(operation, OperationKind::Move);
                assert!(matches!(*source, CoreError::StorageFailure { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
