//! The module contains the errors the engine can throw.
//!
//! Every error belongs to one [`ErrorKind`]:
//!
//! - [`Validation`] errors are rejected before any mutation and are never
//!   worth retrying.
//! - [`Concurrency`] errors ([`Busy`]) mean another merge or undo holds one of
//!   the needed locks. The caller may retry with backoff.
//! - [`Deadline`] errors ([`DeadlineExpired`]) are terminal.
//! - [`Storage`] errors abort the running transaction, which rolls back as a
//!   whole.
//!
//!  [`Validation`]: ErrorKind::Validation
//!  [`Concurrency`]: ErrorKind::Concurrency
//!  [`Deadline`]: ErrorKind::Deadline
//!  [`Storage`]: ErrorKind::Storage
//!  [`Busy`]: EngineError::Busy
//!  [`DeadlineExpired`]: EngineError::DeadlineExpired
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Concurrency,
    Deadline,
    Storage,
}

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("source account {0} not found")]
    SourceNotFound(Uuid),
    #[error("target account {0} not found")]
    TargetNotFound(Uuid),
    #[error("source and target are the same account")]
    SameAccount,
    #[error("account {0} is protected and cannot be merged away")]
    ProtectedAccount(Uuid),
    #[error("source account {0} is inactive")]
    SourceInactive(Uuid),
    #[error("target account {0} is inactive")]
    TargetInactive(Uuid),
    #[error("account {0} is inactive")]
    AccountInactive(Uuid),
    /// The source is the target of merge `0`, which can still be undone.
    #[error("source account is the target of pending merge {0}")]
    PendingMergeTarget(Uuid),
    #[error("merge {0} not found")]
    MergeNotFound(Uuid),
    #[error("merge {0} is permanent")]
    AlreadyPermanent(Uuid),
    #[error("undo deadline of merge {0} has expired")]
    DeadlineExpired(Uuid),
    #[error("resources busy: {0}")]
    Busy(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound(_)
            | Self::TargetNotFound(_)
            | Self::SameAccount
            | Self::ProtectedAccount(_)
            | Self::SourceInactive(_)
            | Self::TargetInactive(_)
            | Self::AccountInactive(_)
            | Self::PendingMergeTarget(_)
            | Self::MergeNotFound(_)
            | Self::AlreadyPermanent(_)
            | Self::KeyNotFound(_)
            | Self::ExistingKey(_)
            | Self::InvalidAmount(_)
            | Self::InvalidId(_)
            | Self::InvalidName(_) => ErrorKind::Validation,
            Self::Busy(_) => ErrorKind::Concurrency,
            Self::DeadlineExpired(_) => ErrorKind::Deadline,
            Self::InvariantViolation(_) | Self::Snapshot(_) | Self::Database(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Whether the caller may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }

    /// Storage failures that are worth replaying the whole transaction for.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Database(DbErr::ConnectionAcquire(_)) | Self::Database(DbErr::Conn(_)) => true,
            Self::Database(err) => {
                let message = err.to_string().to_lowercase();
                message.contains("database is locked") || message.contains("database is busy")
            }
            _ => false,
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::SourceNotFound(a), Self::SourceNotFound(b)) => a == b,
            (Self::TargetNotFound(a), Self::TargetNotFound(b)) => a == b,
            (Self::SameAccount, Self::SameAccount) => true,
            (Self::ProtectedAccount(a), Self::ProtectedAccount(b)) => a == b,
            (Self::SourceInactive(a), Self::SourceInactive(b)) => a == b,
            (Self::TargetInactive(a), Self::TargetInactive(b)) => a == b,
            (Self::AccountInactive(a), Self::AccountInactive(b)) => a == b,
            (Self::PendingMergeTarget(a), Self::PendingMergeTarget(b)) => a == b,
            (Self::MergeNotFound(a), Self::MergeNotFound(b)) => a == b,
            (Self::AlreadyPermanent(a), Self::AlreadyPermanent(b)) => a == b,
            (Self::DeadlineExpired(a), Self::DeadlineExpired(b)) => a == b,
            (Self::Busy(a), Self::Busy(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::InvalidName(a), Self::InvalidName(b)) => a == b,
            (Self::InvariantViolation(a), Self::InvariantViolation(b)) => a == b,
            (Self::Snapshot(a), Self::Snapshot(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
