//! Supplier ledger engine.
//!
//! Accounts (suppliers) own linked records (invoices and payments). Two
//! accounts can be merged: every record of the source moves to the target,
//! the target balance absorbs the source balance and the source is
//! deactivated. A merge stays reversible for a fixed undo window, after which
//! it becomes permanent.

pub use accounts::{Account, AccountBalance, NewAccount};
pub use amount::Amount;
pub use cache::BalanceCache;
pub use error::{EngineError, ErrorKind};
pub use locks::{LockGuard, LockKey, LockManager};
pub use merges::{MergeRecord, MergeState, MovedRecords, SourceSnapshot};
pub use ops::{Engine, EngineBuilder, MergePreview};
pub use records::{LinkedRecord, RecordKind, balance_of};

mod accounts;
mod amount;
mod cache;
mod error;
mod locks;
mod merges;
mod ops;
mod records;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
