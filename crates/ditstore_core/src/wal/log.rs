use super::record::{LogRecord, RecordType, LOG_MAGIC, LOG_VERSION};
use crate::error::{CoreError, CoreResult};
use ditstore_storage::StorageBackend;
use parking_lot::{Mutex, MutexGuard};

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Append-only record log over a [`StorageBackend`].
pub struct DurableLog {
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl DurableLog {
    /// Wraps a backend. Existing bytes are kept and can be replayed.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Frames and appends `record`, returning its offset. The append is not
    /// durable until [`flush`](Self::flush) or [`sync`](Self::sync).
    ///
    /// # Errors
    ///
    /// Encoding or backend failures.
    pub fn append(&self, record: &LogRecord) -> CoreResult<u64> {
        let frame = frame(record)?;
        let offset = self.backend.lock().append(&frame)?;
        Ok(offset)
    }

    /// Appends several records in one backend call.
    ///
    /// # Errors
    ///
    /// Encoding or backend failures. Nothing is written if encoding fails.
    pub fn append_all(&self, records: &[LogRecord]) -> CoreResult<u64> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(&frame(record)?);
        }
        let offset = self.backend.lock().append(&bytes)?;
        Ok(offset)
    }

    /// Flushes the backend.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Syncs the backend.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Log size in bytes.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Streams records from the start. The log is locked against appends
    /// while the iterator lives.
    ///
    /// # Errors
    ///
    /// Backend failure while reading the size.
    pub fn iter(&self) -> CoreResult<LogIterator<'_>> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        Ok(LogIterator {
            backend,
            offset: 0,
            size,
            done: false,
        })
    }

    /// Every record with its offset.
    ///
    /// # Errors
    ///
    /// First fatal read error.
    pub fn read_all(&self) -> CoreResult<Vec<(u64, LogRecord)>> {
        self.iter()?.collect()
    }

    /// Drops everything at or after `offset`.
    ///
    /// # Errors
    ///
    /// Backend failure.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        self.backend.lock().truncate(offset)?;
        Ok(())
    }
}

impl std::fmt::Debug for DurableLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLog").finish_non_exhaustive()
    }
}

fn frame(record: &LogRecord) -> CoreResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len()).map_err(|_| CoreError::encoding("log record payload too large"))?;
    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(record.record_type().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);
    let crc = crc32fast::hash(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Streaming reader returned by [`DurableLog::iter`].
pub struct LogIterator<'a> {
    backend: MutexGuard<'a, Box<dyn StorageBackend>>,
    offset: u64,
    size: u64,
    done: bool,
}

impl LogIterator<'_> {
    /// Offset of the next record, which after exhaustion is the end of the
    /// last complete record.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn read_next(&mut self) -> CoreResult<Option<(u64, LogRecord)>> {
        let remaining = self.size - self.offset;
        if remaining < HEADER_SIZE as u64 {
            if remaining > 0 {
                tracing::warn!(offset = self.offset, remaining, "ignoring truncated log header");
            }
            return Ok(None);
        }
        let header = self.backend.read_at(self.offset, HEADER_SIZE)?;
        if header[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(format!("bad magic at offset {}", self.offset)));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::log_corruption(format!(
                "unsupported log version {version} at offset {}",
                self.offset
            )));
        }
        let record_type = RecordType::from_byte(header[6]).ok_or_else(|| {
            CoreError::log_corruption(format!("unknown record type {} at offset {}", header[6], self.offset))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let total = (HEADER_SIZE + len + CRC_SIZE) as u64;
        if total > remaining {
            tracing::warn!(offset = self.offset, needed = total, remaining, "ignoring truncated log record");
            return Ok(None);
        }
        let bytes = self.backend.read_at(self.offset, total as usize)?;
        let body = &bytes[..HEADER_SIZE + len];
        let tail = &bytes[HEADER_SIZE + len..];
        let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }
        let record = LogRecord::decode_payload(record_type, &body[HEADER_SIZE..])?;
        let at = self.offset;
        self.offset += total;
        Ok(Some((at, record)))
    }
}

impl Iterator for LogIterator<'_> {
    type Item = CoreResult<(u64, LogRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
