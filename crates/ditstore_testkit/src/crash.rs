//! Crash recovery testing for ditstore.
//!
//! [`CrashableBackend`] wraps a real backend and fails on command. The
//! test keeps the [`CrashControl`] handle while the directory owns the
//! backend, arms a [`CrashPoint`], runs an operation, then reopens the log
//! file and checks what recovery restored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ditstore_testkit::prelude::*;
//!
//! let control = CrashControl::new();
//! let t = TestDirectory::file_with(|b| Box::new(CrashableBackend::new(Box::new(b), control.clone())));
//! CrashPoint::DuringLogWrite.arm(&control);
//! assert!(t.ops().add(&t.partition, &AddContext::new(person(..))).is_err());
//! let t = t.reopen();
//! ```

use ditstore_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The next append fails before writing anything.
    BeforeLogWrite,
    /// The next append writes a few bytes of its record and fails.
    DuringLogWrite,
    /// Appends succeed but the following flush and sync fail.
    AfterLogWriteBeforeFlush,
}

impl CrashPoint {
    /// Arms `control` to crash at this point of the next commit.
    pub fn arm(self, control: &CrashControl) {
        let written = control.bytes_written();
        match self {
            Self::BeforeLogWrite => control.crash_after(written),
            Self::DuringLogWrite => control.crash_after(written + 7),
            Self::AfterLogWriteBeforeFlush => control.set_fail_on_flush(true),
        }
    }
}

/// Failure switches shared between a test and its [`CrashableBackend`].
#[derive(Debug)]
pub struct CrashControl {
    crash_after_bytes: AtomicU64,
    bytes_written: AtomicU64,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
}

impl CrashControl {
    /// Disarmed switches.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            crash_after_bytes: AtomicU64::new(u64::MAX),
            bytes_written: AtomicU64::new(0),
            crashed: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
        })
    }

    /// Crash once `bytes` bytes have been written in total.
    pub fn crash_after(&self, bytes: u64) {
        self.crash_after_bytes.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether flush and sync fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Resets the crash state.
    pub fn reset(&self) {
        self.crash_after_bytes.store(u64::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_flush.store(false, Ordering::SeqCst);
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::other(format!("simulated crash during {what}")))
    }
}

/// A storage backend wrapper that can simulate crashes.
///
/// Once crashed it refuses every further write, like a process that died.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    control: Arc<CrashControl>,
}

impl CrashableBackend {
    /// Wraps `inner`, switched by `control`.
    pub fn new(inner: Box<dyn StorageBackend>, control: Arc<CrashControl>) -> Self {
        Self { inner, control }
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.control.has_crashed() {
            return Err(self.control.crash("write after crash"));
        }
        let current = self.control.bytes_written();
        let threshold = self.control.crash_after_bytes.load(Ordering::SeqCst);
        let len = data.len() as u64;

        if current >= threshold {
            return Err(self.control.crash("write"));
        }

        // Check if this write will cross the crash threshold
        if current + len > threshold {
            let partial = usize::try_from(threshold - current).unwrap_or(data.len());
            if partial > 0 {
                self.inner.append(&data[..partial])?;
                self.control.bytes_written.fetch_add(partial as u64, Ordering::SeqCst);
            }
            return Err(self.control.crash("partial write"));
        }

        let offset = self.inner.append(data)?;
        self.control.bytes_written.fetch_add(len, Ordering::SeqCst);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.control.fail_on_flush.load(Ordering::SeqCst) {
            return Err(self.control.crash("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.control.fail_on_flush.load(Ordering::SeqCst) {
            return Err(self.control.crash("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
