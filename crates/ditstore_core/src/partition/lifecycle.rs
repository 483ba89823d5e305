//! Partition lifecycle state machine.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;

/// Lifecycle states.
///
/// ```text
/// Uninitialized -> Initializing -> Initialized -> Destroying -> Destroyed
/// ```
///
/// A destroyed partition may be initialized again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Configurable, not serving.
    Uninitialized,
    /// Init hook running.
    Initializing,
    /// Serving.
    Initialized,
    /// Destroy hook running.
    Destroying,
    /// Torn down.
    Destroyed,
}

/// Drives the state machine around caller-supplied hooks.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }
}

impl Lifecycle {
    /// Fresh, uninitialized.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// True once init completed and destroy has not started.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Initialized
    }

    /// Runs `init` unless already initialized. If `init` fails, `cleanup`
    /// runs before the error is returned and the state ends `Destroyed`.
    ///
    /// # Errors
    ///
    /// The init error, or [`CoreError::IllegalState`] when a transition is
    /// already in progress.
    pub fn initialize<I, C>(&self, init: I, cleanup: C) -> CoreResult<()>
    where
        I: FnOnce() -> CoreResult<()>,
        C: FnOnce() -> CoreResult<()>,
    {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Initialized => return Ok(()),
                LifecycleState::Initializing | LifecycleState::Destroying => {
                    return Err(CoreError::illegal_state(format!("cannot initialize while {:?}", *state)));
                }
                LifecycleState::Uninitialized | LifecycleState::Destroyed => {
                    *state = LifecycleState::Initializing;
                }
            }
        }
        match init() {
            Ok(()) => {
                *self.state.lock() = LifecycleState::Initialized;
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = LifecycleState::Destroying;
                if let Err(cleanup_err) = cleanup() {
                    tracing::warn!(error = %cleanup_err, "cleanup after failed init also failed");
                }
                *self.state.lock() = LifecycleState::Destroyed;
                Err(e)
            }
        }
    }

    /// Runs `teardown` if initialized; a no-op otherwise.
    ///
    /// # Errors
    ///
    /// The teardown error. The state still ends `Destroyed`.
    pub fn destroy<D>(&self, teardown: D) -> CoreResult<()>
    where
        D: FnOnce() -> CoreResult<()>,
    {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Initialized {
                return Ok(());
            }
            *state = LifecycleState::Destroying;
        }
        let result = teardown();
        *self.state.lock() = LifecycleState::Destroyed;
        result
    }

    /// Fails unless serving.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`].
    pub fn ensure_initialized(&self, partition: &str) -> CoreResult<()> {
        match self.state() {
            LifecycleState::Initialized => Ok(()),
            other => Err(CoreError::illegal_state(format!("partition {partition} is {other:?}"))),
        }
    }

    /// Fails unless identity fields may still change.
    ///
    /// # Errors
    ///
    /// [`CoreError::IllegalState`].
    pub fn ensure_configurable(&self, property: &str) -> CoreResult<()> {
        match self.state() {
            LifecycleState::Uninitialized | LifecycleState::Destroyed => Ok(()),
            other => Err(CoreError::illegal_state(format!(
                "cannot change {property} of a partition that is {other:?}"
            ))),
        }
    }
}
