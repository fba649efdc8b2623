use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::{QueryFilter, QueryOrder, prelude::*};

use crate::{
    Account, AccountBalance, EngineError, LinkedRecord, RecordKind, ResultEngine, accounts,
    balance_of, records,
};

use super::{Engine, checked_balance, find_account, records_of, require_account, sum_records};

/// Read-only figures shown before confirming a merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePreview {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub source_balance: i64,
    pub target_balance: i64,
    pub invoice_count: usize,
    pub payment_count: usize,
    /// Target balance once the merge commits.
    pub projected_target_balance: i64,
}

impl Engine {
    /// Balance of an account, derived from the records currently linked to
    /// it: invoices minus payments.
    pub async fn compute_balance(&self, account_id: Uuid) -> ResultEngine<i64> {
        require_account(&self.database, account_id).await?;
        sum_records(&self.database, account_id).await
    }

    /// Like [`compute_balance`](Self::compute_balance), answered from the
    /// display cache when possible.
    pub async fn cached_balance(&self, account_id: Uuid) -> ResultEngine<i64> {
        if let Some(balance) = self.cache.get(&account_id) {
            return Ok(balance);
        }
        let balance = self.compute_balance(account_id).await?;
        self.cache.insert(account_id, balance);
        Ok(balance)
    }

    /// Active accounts with their live balances, ordered by name.
    pub async fn list_accounts_with_balances(&self) -> ResultEngine<Vec<AccountBalance>> {
        let account_models = accounts::Entity::find()
            .filter(accounts::Column::Active.eq(true))
            .order_by_asc(accounts::Column::Name)
            .all(&self.database)
            .await?;
        let account_ids: Vec<String> = account_models.iter().map(|m| m.id.clone()).collect();

        let mut by_account: HashMap<Uuid, Vec<LinkedRecord>> = HashMap::new();
        let record_models = records::Entity::find()
            .filter(records::Column::AccountId.is_in(account_ids))
            .all(&self.database)
            .await?;
        for model in record_models {
            let record = LinkedRecord::try_from(model)?;
            by_account.entry(record.account_id).or_default().push(record);
        }

        let mut out = Vec::with_capacity(account_models.len());
        for model in account_models {
            let account = Account::try_from(model)?;
            let records = by_account.remove(&account.id).unwrap_or_default();
            let balance = balance_of(&records)?;
            self.cache.insert(account.id, balance);
            out.push(AccountBalance {
                id: account.id,
                name: account.name,
                balance,
            });
        }
        Ok(out)
    }

    /// Figures for merging `source_id` into `target_id`, without touching
    /// anything.
    pub async fn merge_preview(
        &self,
        source_id: Uuid,
        target_id: Uuid,
    ) -> ResultEngine<MergePreview> {
        if source_id == target_id {
            return Err(EngineError::SameAccount);
        }
        find_account(&self.database, source_id)
            .await?
            .ok_or(EngineError::SourceNotFound(source_id))?;
        find_account(&self.database, target_id)
            .await?
            .ok_or(EngineError::TargetNotFound(target_id))?;

        let source_records = records_of(&self.database, source_id).await?;
        let source_balance = balance_of(&source_records)?;
        let target_balance = sum_records(&self.database, target_id).await?;
        let invoice_count = source_records
            .iter()
            .filter(|r| r.kind == RecordKind::Invoice)
            .count();

        Ok(MergePreview {
            source_id,
            target_id,
            source_balance,
            target_balance,
            invoice_count,
            payment_count: source_records.len() - invoice_count,
            projected_target_balance: checked_balance(
                target_balance.checked_add(source_balance),
            )?,
        })
    }
}
