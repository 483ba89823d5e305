//! Log record types and payload encoding.

use crate::error::{CoreError, CoreResult};
use crate::logedit::LogEdit;
use crate::types::{DataVersion, TransactionId};

/// Magic bytes opening every record.
pub const LOG_MAGIC: [u8; 4] = *b"DITL";

/// Current record format version.
pub const LOG_VERSION: u16 = 1;

/// Record type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Transaction start.
    Begin = 1,
    /// One edit of a transaction.
    Edit = 2,
    /// Transaction committed at a version.
    Commit = 3,
    /// Transaction abandoned.
    Abort = 4,
}

impl RecordType {
    /// Decodes the type byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Edit),
            3 => Some(Self::Commit),
            4 => Some(Self::Abort),
            _ => None,
        }
    }

    /// Type byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One record of the durable log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Transaction start.
    Begin {
        /// Transaction.
        txid: TransactionId,
    },
    /// One edit against one partition.
    Edit {
        /// Owning transaction.
        txid: TransactionId,
        /// Partition id.
        partition: String,
        /// The edit in wire form.
        edit: LogEdit,
    },
    /// Commit marker.
    Commit {
        /// Transaction.
        txid: TransactionId,
        /// Version the commit published.
        version: DataVersion,
    },
    /// Abort marker; the transaction's edits must not be replayed.
    Abort {
        /// Transaction.
        txid: TransactionId,
    },
}

impl LogRecord {
    /// Type of this record.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Begin { .. } => RecordType::Begin,
            Self::Edit { .. } => RecordType::Edit,
            Self::Commit { .. } => RecordType::Commit,
            Self::Abort { .. } => RecordType::Abort,
        }
    }

    /// Owning transaction.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid }
            | Self::Edit { txid, .. }
            | Self::Commit { txid, .. }
            | Self::Abort { txid } => *txid,
        }
    }

    /// Little-endian payload.
    ///
    /// ```text
    /// Begin  | txid u64 |
    /// Edit   | txid u64 | partition len u16 | partition | CBOR edit |
    /// Commit | txid u64 | version u64 |
    /// Abort  | txid u64 |
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if the partition id is longer than `u16::MAX` bytes or the edit
    /// cannot be encoded.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.txid().as_u64().to_le_bytes());
        match self {
            Self::Begin { .. } | Self::Abort { .. } => {}
            Self::Commit { version, .. } => out.extend_from_slice(&version.as_u64().to_le_bytes()),
            Self::Edit { partition, edit, .. } => {
                let len = u16::try_from(partition.len())
                    .map_err(|_| CoreError::encoding("partition id longer than 65535 bytes"))?;
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(partition.as_bytes());
                out.extend_from_slice(&edit.encode()?);
            }
        }
        Ok(out)
    }

    /// Inverse of [`encode_payload`](Self::encode_payload).
    ///
    /// # Errors
    ///
    /// [`CoreError::LogCorruption`] on short or over-long payloads.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut reader = Payload { bytes: payload, at: 0 };
        let txid = TransactionId::new(reader.u64()?);
        let record = match record_type {
            RecordType::Begin => Self::Begin { txid },
            RecordType::Abort => Self::Abort { txid },
            RecordType::Commit => Self::Commit {
                txid,
                version: DataVersion::new(reader.u64()?),
            },
            RecordType::Edit => {
                let len = usize::from(reader.u16()?);
                let partition = String::from_utf8(reader.take(len)?.to_vec())
                    .map_err(|_| CoreError::log_corruption("partition id is not UTF-8"))?;
                let edit = LogEdit::decode(reader.rest())?;
                Self::Edit { txid, partition, edit }
            }
        };
        reader.finish()?;
        Ok(record)
    }
}

struct Payload<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Payload<'a> {
    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self.at.checked_add(n).filter(|&end| end <= self.bytes.len());
        let Some(end) = end else {
            return Err(CoreError::log_corruption(format!(
                "payload truncated: need {n} bytes at {}, have {}",
                self.at,
                self.bytes.len()
            )));
        };
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn u16(&mut self) -> CoreResult<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.at..];
        self.at = self.bytes.len();
        slice
    }

    fn finish(self) -> CoreResult<()> {
        if self.at == self.bytes.len() {
            Ok(())
        } else {
            Err(CoreError::log_corruption(format!(
                "{} trailing payload bytes",
                self.bytes.len() - self.at
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryId;
    use crate::index::{IndexId, IndexKey, SystemIndex};
    use crate::logedit::{IndexChange, IndexModification};
    use crate::types::EditSequence;

    fn decode(record: &LogRecord) -> LogRecord {
        let payload = record.encode_payload().unwrap();
        LogRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn fixed_records_decode() {
        for record in [
            LogRecord::Begin {
                txid: TransactionId::new(1),
            },
            LogRecord::Commit {
                txid: TransactionId::new(2),
                version: DataVersion::new(40),
            },
            LogRecord::Abort {
                txid: TransactionId::new(3),
            },
        ] {
            assert_eq!(decode(&record), record);
        }
    }

    #[test]
    fn edit_record_decodes() {
        let record = LogRecord::Edit {
            txid: TransactionId::new(7),
            partition: "example".into(),
            edit: LogEdit::Index(IndexModification::new(
                EditSequence(3),
                &IndexId::System(SystemIndex::OneLevel),
                IndexKey::Id(EntryId::DEFAULT),
                EntryId::new(),
                IndexChange::Delete,
            )),
        };
        assert_eq!(decode(&record), record);
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = LogRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(matches!(
            LogRecord::decode_payload(RecordType::Begin, &payload),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn short_payload_is_corruption() {
        assert!(LogRecord::decode_payload(RecordType::Commit, &[1, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(RecordType::from_byte(9).is_none());
    }
}
