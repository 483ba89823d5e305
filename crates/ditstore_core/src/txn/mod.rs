//! Transactions.
//!
//! A transaction is bound to the thread that started it. It reads a fixed
//! committed version, keeps its own edits in a private overlay and records
//! what it read. Commit is the only point where storage changes:
//!
//! 1. conflict check against the read and write sets
//! 2. `Begin`, one `Edit` per change and `Commit` appended to the log and flushed
//! 3. every edit applied at the new version, undone in reverse on failure
//! 4. the new version published
//! 5. history below the oldest live snapshot pruned

mod conflict;
mod manager;
mod overlay;
mod transaction;

pub use manager::{CommitGuard, CurrentTransaction, TransactionHandle, TransactionManager};
pub use transaction::{Transaction, TransactionMode, TransactionState};
