use uuid::Uuid;

use sea_orm::{ActiveValue, PaginatorTrait, QueryFilter, TransactionTrait, prelude::*};

use crate::{
    EngineError, LockKey, MergeRecord, MovedRecords, ResultEngine, SourceSnapshot, accounts,
    balance_of, merges, records, util::storage_now,
};

use super::{
    Engine, checked_balance, find_account, records_of, relink_record, set_account_balance,
    sum_records, with_tx,
};

impl Engine {
    /// Merges `source_id` into `target_id`.
    ///
    /// Every record linked to the source moves to the target, the target
    /// balance absorbs the source balance and the source is deactivated. The
    /// returned [`MergeRecord`] can be passed to [`undo`](Self::undo) until
    /// its deadline.
    ///
    /// A source that is itself the target of a pending merge is rejected with
    /// [`EngineError::PendingMergeTarget`].
    ///
    /// All writes happen in one transaction. Preconditions are checked inside
    /// it before the first write, so a rejected merge leaves no trace.
    pub async fn merge(&self, source_id: Uuid, target_id: Uuid) -> ResultEngine<MergeRecord> {
        if source_id == target_id {
            return Err(EngineError::SameAccount);
        }

        let _guard = self
            .locks
            .acquire(
                [LockKey::Account(source_id), LockKey::Account(target_id)],
                self.lock_wait,
            )
            .await?;

        let record = self
            .with_retries("merge", || self.try_merge(source_id, target_id))
            .await?;

        self.cache.invalidate(&[source_id, target_id]);
        tracing::info!(
            merge = %record.id,
            source = %source_id,
            target = %target_id,
            moved = record.moved_record_ids.len(),
            merged_balance = record.merged_balance,
            undo_deadline = %record.undo_deadline,
            "accounts merged"
        );
        Ok(record)
    }

    async fn try_merge(&self, source_id: Uuid, target_id: Uuid) -> ResultEngine<MergeRecord> {
        with_tx!(self, |db_tx| {
            let source = find_account(&db_tx, source_id)
                .await?
                .ok_or(EngineError::SourceNotFound(source_id))?;
            let target = find_account(&db_tx, target_id)
                .await?
                .ok_or(EngineError::TargetNotFound(target_id))?;
            if source.is_protected {
                return Err(EngineError::ProtectedAccount(source_id));
            }
            if !source.active {
                return Err(EngineError::SourceInactive(source_id));
            }
            if !target.active {
                return Err(EngineError::TargetInactive(target_id));
            }

            let now = storage_now(&db_tx).await?;
            // The target of a pending merge keeps its records until that merge
            // is undone or expires.
            let absorbed = merges::Entity::find()
                .filter(merges::Column::TargetAccountId.eq(source_id.to_string()))
                .filter(merges::Column::Permanent.eq(false))
                .all(&db_tx)
                .await?;
            for model in absorbed {
                let earlier = MergeRecord::try_from(model)?;
                if earlier.is_pending(now) {
                    return Err(EngineError::PendingMergeTarget(earlier.id));
                }
            }
            let snapshot = SourceSnapshot::capture(&source, now);

            let source_records = records_of(&db_tx, source_id).await?;
            let source_balance = balance_of(&source_records)?;
            let target_balance_before = sum_records(&db_tx, target_id).await?;

            let mut moved = MovedRecords::default();
            for record in &source_records {
                moved.push(record.kind, record.id);
            }
            for record in &source_records {
                relink_record(&db_tx, record.id, source_id, target_id).await?;
            }

            let target_balance =
                checked_balance(target_balance_before.checked_add(source_balance))?;
            set_account_balance(&db_tx, target_id, target_balance).await?;

            // No records are left on the source; the snapshot keeps its balance.
            let deactivate = accounts::ActiveModel {
                id: ActiveValue::Set(source_id.to_string()),
                balance: ActiveValue::Set(0),
                active: ActiveValue::Set(false),
                ..Default::default()
            };
            deactivate.update(&db_tx).await?;

            let record = MergeRecord {
                id: Uuid::new_v4(),
                source_account_id: source_id,
                target_account_id: target_id,
                merged_at: now,
                undo_deadline: now + self.undo_window,
                permanent: false,
                source_snapshot: snapshot,
                moved_record_ids: moved,
                merged_balance: source_balance,
                merged_opening_balance: source.opening_balance,
                target_balance_before,
            };
            merges::ActiveModel::try_from(&record)?.insert(&db_tx).await?;

            // The explicit sum must agree with what the relinked rows say.
            let recomputed = sum_records(&db_tx, target_id).await?;
            if recomputed != target_balance {
                return Err(EngineError::InvariantViolation(format!(
                    "target {target_id} balance {target_balance} disagrees with its records ({recomputed})"
                )));
            }
            let left_behind = records::Entity::find()
                .filter(records::Column::AccountId.eq(source_id.to_string()))
                .count(&db_tx)
                .await?;
            if left_behind != 0 {
                return Err(EngineError::InvariantViolation(format!(
                    "{left_behind} records still linked to merged source {source_id}"
                )));
            }

            Ok(record)
        })
    }
}
