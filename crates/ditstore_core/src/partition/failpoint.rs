//! Failure injection for storage tests.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

/// Failpoint fired on every storage apply.
pub const APPLY: &str = "apply";

/// Failpoint fired when the partition initializes.
pub const INIT: &str = "init";

/// Named failpoints plus a one-shot apply countdown.
#[derive(Debug)]
pub struct Failpoints {
    armed: Mutex<HashSet<String>>,
    apply_countdown: AtomicI64,
}

impl Default for Failpoints {
    fn default() -> Self {
        Self {
            armed: Mutex::new(HashSet::new()),
            apply_countdown: AtomicI64::new(-1),
        }
    }
}

impl Failpoints {
    /// Failpoints armed from the given names.
    #[must_use]
    pub fn with_armed(names: impl IntoIterator<Item = String>) -> Self {
        let fp = Self::default();
        fp.armed.lock().extend(names);
        fp
    }

    /// Arms `name` until disarmed.
    pub fn arm(&self, name: &str) {
        self.armed.lock().insert(name.to_string());
    }

    /// Disarms `name`.
    pub fn disarm(&self, name: &str) {
        self.armed.lock().remove(name);
    }

    /// True if `name` is armed.
    #[must_use]
    pub fn is_armed(&self, name: &str) -> bool {
        self.armed.lock().contains(name)
    }

    /// Lets `successes` applies through, fails the next one, then disarms.
    pub fn fail_apply_after(&self, successes: usize) {
        let n = i64::try_from(successes).unwrap_or(i64::MAX);
        self.apply_countdown.store(n, Ordering::SeqCst);
    }

    /// Fails if `name` is armed.
    ///
    /// # Errors
    ///
    /// [`CoreError::StorageFailure`] naming the failpoint.
    pub fn check(&self, name: &str) -> CoreResult<()> {
        if self.is_armed(name) {
            Err(CoreError::storage_failure(format!("failpoint {name}")))
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_apply(&self) -> CoreResult<()> {
        self.check(APPLY)?;
        let previous = self
            .apply_countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n >= 0).then(|| n - 1));
        match previous {
            Ok(0) => Err(CoreError::storage_failure("failpoint apply countdown")),
            _ => Ok(()),
        }
    }
}
