use chrono::Utc;
use uuid::Uuid;

use sea_orm::{ActiveValue, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};

use crate::{
    Account, EngineError, LinkedRecord, LockKey, NewAccount, RecordKind, ResultEngine, accounts,
    records,
};

use super::{
    Engine, checked_balance, normalize_optional_text, normalize_required_name, records_of,
    require_account, with_tx,
};

impl Engine {
    /// Return an account snapshot from DB.
    pub async fn account(&self, account_id: Uuid) -> ResultEngine<Account> {
        require_account(&self.database, account_id).await
    }

    /// Every account, active or not, ordered by name.
    pub async fn accounts(&self) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .order_by_asc(accounts::Column::Name)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Creates a new active account with no linked records.
    ///
    /// Names are unique (case-insensitive) among all accounts, so a merged
    /// away source can always be restored under its own name.
    pub async fn new_account(&self, input: NewAccount) -> ResultEngine<Uuid> {
        let name = normalize_required_name(&input.name, "account")?;
        with_tx!(self, |db_tx| {
            let exists = accounts::Entity::find()
                .filter(Expr::cust("LOWER(name)").eq(name.to_lowercase()))
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(name));
            }

            let account = Account {
                id: Uuid::new_v4(),
                name,
                balance: 0,
                opening_balance: input.opening_balance,
                active: true,
                is_protected: input.is_protected,
            };
            accounts::ActiveModel::from(&account).insert(&db_tx).await?;
            tracing::debug!(account = %account.id, name = %account.name, "account created");
            Ok(account.id)
        })
    }

    /// Links a new invoice or payment to an active account and updates its
    /// balance in the same transaction.
    ///
    /// Takes the account lock, so it never interleaves with a merge or undo
    /// touching the same account.
    pub async fn add_record(
        &self,
        account_id: Uuid,
        kind: RecordKind,
        amount_minor: i64,
        reference: Option<&str>,
    ) -> ResultEngine<Uuid> {
        let record = LinkedRecord::new(
            account_id,
            kind,
            amount_minor,
            normalize_optional_text(reference),
            Utc::now(),
        )?;

        let _guard = self
            .locks
            .acquire([LockKey::Account(account_id)], self.lock_wait)
            .await?;

        let record_id = with_tx!(self, |db_tx| {
            let account = require_account(&db_tx, account_id).await?;
            if !account.active {
                return Err(EngineError::AccountInactive(account_id));
            }

            records::ActiveModel::from(&record).insert(&db_tx).await?;

            let balance =
                checked_balance(account.balance.checked_add(kind.signed(amount_minor)))?;
            let active = accounts::ActiveModel {
                id: ActiveValue::Set(account_id.to_string()),
                balance: ActiveValue::Set(balance),
                ..Default::default()
            };
            active.update(&db_tx).await?;
            Ok::<_, EngineError>(record.id)
        })?;

        self.cache.invalidate(&[account_id]);
        Ok(record_id)
    }

    /// Records currently linked to an account.
    pub async fn records(&self, account_id: Uuid) -> ResultEngine<Vec<LinkedRecord>> {
        require_account(&self.database, account_id).await?;
        records_of(&self.database, account_id).await
    }
}
