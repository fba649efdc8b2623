use std::{future::Future, sync::Arc, time::Duration};

use chrono::TimeDelta;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseConnection, QueryFilter, QueryOrder, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Account, BalanceCache, EngineError, LinkedRecord, LockManager, ResultEngine, balance_of,
};

mod accounts;
mod balances;
mod merge;
mod registry;
mod undo;

pub use balances::MergePreview;

const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    locks: Arc<LockManager>,
    cache: BalanceCache,
    undo_window: TimeDelta,
    max_retries: u32,
    lock_wait: Duration,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn undo_window(&self) -> TimeDelta {
        self.undo_window
    }

    /// Replay `op` while it fails with a transient storage error, at most
    /// `max_retries` extra times. Each attempt runs its own transaction.
    async fn with_retries<T, F, Fut>(&self, label: &'static str, mut op: F) -> ResultEngine<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ResultEngine<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(op = label, attempt, error = %err, "transient storage error, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }
}

async fn find_account<C: ConnectionTrait>(conn: &C, id: Uuid) -> ResultEngine<Option<Account>> {
    crate::accounts::Entity::find_by_id(id.to_string())
        .one(conn)
        .await?
        .map(Account::try_from)
        .transpose()
}

async fn require_account<C: ConnectionTrait>(conn: &C, id: Uuid) -> ResultEngine<Account> {
    find_account(conn, id)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("account not exists".to_string()))
}

/// Records currently owned by `account_id`, in id order.
async fn records_of<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
) -> ResultEngine<Vec<LinkedRecord>> {
    crate::records::Entity::find()
        .filter(crate::records::Column::AccountId.eq(account_id.to_string()))
        .order_by_asc(crate::records::Column::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(LinkedRecord::try_from)
        .collect()
}

/// Live balance of `account_id` from its linked records.
async fn sum_records<C: ConnectionTrait>(conn: &C, account_id: Uuid) -> ResultEngine<i64> {
    let records = records_of(conn, account_id).await?;
    balance_of(&records)
}

/// Move one record from `from` to `to`. The record must currently belong to
/// `from`.
async fn relink_record<C: ConnectionTrait>(
    conn: &C,
    record_id: Uuid,
    from: Uuid,
    to: Uuid,
) -> ResultEngine<()> {
    let result = crate::records::Entity::update_many()
        .col_expr(crate::records::Column::AccountId, Expr::value(to.to_string()))
        .filter(crate::records::Column::Id.eq(record_id.to_string()))
        .filter(crate::records::Column::AccountId.eq(from.to_string()))
        .exec(conn)
        .await?;
    if result.rows_affected != 1 {
        return Err(EngineError::InvariantViolation(format!(
            "record {record_id} is not linked to account {from}"
        )));
    }
    Ok(())
}

async fn set_account_balance<C: ConnectionTrait>(
    conn: &C,
    account_id: Uuid,
    balance: i64,
) -> ResultEngine<()> {
    let active = crate::accounts::ActiveModel {
        id: ActiveValue::Set(account_id.to_string()),
        balance: ActiveValue::Set(balance),
        ..Default::default()
    };
    active.update(conn).await?;
    Ok(())
}

fn checked_balance(value: Option<i64>) -> ResultEngine<i64> {
    value.ok_or_else(|| EngineError::InvalidAmount("balance overflow".to_string()))
}

fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    locks: Option<Arc<LockManager>>,
    undo_window: TimeDelta,
    max_retries: u32,
    lock_wait: Duration,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            locks: None,
            undo_window: TimeDelta::hours(24),
            max_retries: DEFAULT_MAX_RETRIES,
            lock_wait: Duration::ZERO,
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Share a lock manager with other engines working on the same database.
    pub fn locks(mut self, locks: Arc<LockManager>) -> EngineBuilder {
        self.locks = Some(locks);
        self
    }

    /// How long a merge stays reversible. Defaults to 24 hours.
    pub fn undo_window(mut self, window: TimeDelta) -> EngineBuilder {
        self.undo_window = window;
        self
    }

    /// Extra attempts after a transient storage failure.
    pub fn max_retries(mut self, retries: u32) -> EngineBuilder {
        self.max_retries = retries;
        self
    }

    /// How long to wait for a conflicting operation before failing with
    /// `Busy`. Zero fails fast.
    pub fn lock_wait(mut self, wait: Duration) -> EngineBuilder {
        self.lock_wait = wait;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        if self.undo_window <= TimeDelta::zero() {
            return Err(EngineError::InvalidAmount(
                "undo window must be positive".to_string(),
            ));
        }
        Ok(Engine {
            database: self.database,
            locks: self.locks.unwrap_or_else(|| Arc::new(LockManager::new())),
            cache: BalanceCache::new(),
            undo_window: self.undo_window,
            max_retries: self.max_retries,
            lock_wait: self.lock_wait,
        })
    }
}
