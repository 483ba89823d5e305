//! Vector-backed store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;

/// Keeps the log in memory.
///
/// Shareable across threads; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `bytes`, e.g. a log captured from another
    /// backend for a recovery test.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
        }
    }

    /// Copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn offsets_follow_appends() {
        let mut store = InMemoryBackend::new();
        assert_eq!(store.append(b"abc").unwrap(), 0);
        assert_eq!(store.append(b"defg").unwrap(), 3);
        assert_eq!(store.size().unwrap(), 7);
        assert_eq!(store.read_at(3, 4).unwrap(), b"defg");
    }

    #[test]
    fn read_past_end_is_rejected() {
        let mut store = InMemoryBackend::new();
        store.append(b"abc").unwrap();
        assert!(matches!(
            store.read_at(2, 5),
            Err(StorageError::ReadPastEnd { size: 3, .. })
        ));
        assert!(store.read_at(3, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_cannot_grow() {
        let mut store = InMemoryBackend::with_data(b"0123456789".to_vec());
        store.truncate(4).unwrap();
        assert_eq!(store.data(), b"0123");
        assert!(matches!(
            store.truncate(9),
            Err(StorageError::InvalidTruncate { requested: 9, size: 4 })
        ));
    }

    proptest! {
        #[test]
        fn concatenation_of_appends_is_readable(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let mut store = InMemoryBackend::new();
            let mut expected = Vec::new();
            for chunk in &chunks {
                let at = store.append(chunk).unwrap();
                prop_assert_eq!(at, expected.len() as u64);
                expected.extend_from_slice(chunk);
            }
            prop_assert_eq!(store.read_at(0, expected.len()).unwrap(), expected);
        }
    }
}
