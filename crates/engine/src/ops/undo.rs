use uuid::Uuid;

use sea_orm::{ActiveValue, TransactionTrait, prelude::*};

use crate::{
    EngineError, LockKey, MergeRecord, ResultEngine, accounts, merges, util::storage_now,
};

use super::{Engine, checked_balance, relink_record, require_account, sum_records, with_tx};

impl Engine {
    /// Reverses a pending merge.
    ///
    /// This:
    /// - reactivates the source and restores its display fields from the
    ///   snapshot
    /// - relinks every moved record back to the source
    /// - subtracts the stored `merged_balance` from the target, so records the
    ///   target gained after the merge are left alone
    /// - deletes the merge record
    ///
    /// Rejected with no change once the merge is permanent or its deadline,
    /// measured on the storage clock, has passed.
    pub async fn undo(&self, merge_id: Uuid) -> ResultEngine<()> {
        let pending = merges::Entity::find_by_id(merge_id.to_string())
            .one(&self.database)
            .await?
            .ok_or(EngineError::MergeNotFound(merge_id))?;
        let pending = MergeRecord::try_from(pending)?;
        let (source_id, target_id) = (pending.source_account_id, pending.target_account_id);

        let _guard = self
            .locks
            .acquire(
                [
                    LockKey::Account(source_id),
                    LockKey::Account(target_id),
                    LockKey::Merge(merge_id),
                ],
                self.lock_wait,
            )
            .await?;

        let record = self
            .with_retries("undo", || self.try_undo(merge_id, source_id, target_id))
            .await?;

        self.cache.invalidate(&[source_id, target_id]);
        tracing::info!(
            merge = %merge_id,
            source = %source_id,
            target = %target_id,
            restored = record.moved_record_ids.len(),
            merged_balance = record.merged_balance,
            "merge undone"
        );
        Ok(())
    }

    async fn try_undo(
        &self,
        merge_id: Uuid,
        source_id: Uuid,
        target_id: Uuid,
    ) -> ResultEngine<MergeRecord> {
        with_tx!(self, |db_tx| {
            // Re-read under the locks: a concurrent undo may have won.
            let record = merges::Entity::find_by_id(merge_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or(EngineError::MergeNotFound(merge_id))?;
            let record = MergeRecord::try_from(record)?;
            if record.source_account_id != source_id || record.target_account_id != target_id {
                return Err(EngineError::InvariantViolation(format!(
                    "merge {merge_id} changed participants"
                )));
            }
            if record.permanent {
                return Err(EngineError::AlreadyPermanent(merge_id));
            }
            let now = storage_now(&db_tx).await?;
            if now > record.undo_deadline {
                return Err(EngineError::DeadlineExpired(merge_id));
            }

            let target = require_account(&db_tx, target_id).await?;
            if !target.active {
                return Err(EngineError::TargetInactive(target_id));
            }

            for record_id in record.moved_record_ids.iter() {
                relink_record(&db_tx, *record_id, target_id, source_id).await?;
            }

            let target_balance =
                checked_balance(target.balance.checked_sub(record.merged_balance))?;
            let target_model = accounts::ActiveModel {
                id: ActiveValue::Set(target_id.to_string()),
                balance: ActiveValue::Set(target_balance),
                ..Default::default()
            };
            target_model.update(&db_tx).await?;

            let snapshot = &record.source_snapshot;
            let source_balance = sum_records(&db_tx, source_id).await?;
            if source_balance != record.merged_balance {
                tracing::warn!(
                    merge = %merge_id,
                    expected = record.merged_balance,
                    actual = source_balance,
                    "moved records changed amount during the undo window"
                );
            }
            let source_model = accounts::ActiveModel {
                id: ActiveValue::Set(source_id.to_string()),
                name: ActiveValue::Set(snapshot.name.clone()),
                balance: ActiveValue::Set(source_balance),
                opening_balance: ActiveValue::Set(snapshot.opening_balance),
                active: ActiveValue::Set(true),
                is_protected: ActiveValue::Set(snapshot.is_protected),
            };
            source_model.update(&db_tx).await?;

            let deleted = merges::Entity::delete_by_id(merge_id.to_string())
                .exec(&db_tx)
                .await?;
            if deleted.rows_affected != 1 {
                return Err(EngineError::InvariantViolation(format!(
                    "merge {merge_id} vanished during undo"
                )));
            }

            Ok(record)
        })
    }
}
