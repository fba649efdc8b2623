use uuid::Uuid;

use sea_orm::{QueryFilter, QueryOrder, prelude::*, sea_query::Expr};

use crate::{EngineError, LockKey, MergeRecord, ResultEngine, merges, util::storage_now};

use super::Engine;

impl Engine {
    /// Return a merge record from the registry.
    pub async fn merge_record(&self, merge_id: Uuid) -> ResultEngine<MergeRecord> {
        let model = merges::Entity::find_by_id(merge_id.to_string())
            .one(&self.database)
            .await?
            .ok_or(EngineError::MergeNotFound(merge_id))?;
        MergeRecord::try_from(model)
    }

    /// Every merge still in the registry, oldest first.
    pub async fn list_merges(&self) -> ResultEngine<Vec<MergeRecord>> {
        merges::Entity::find()
            .order_by_asc(merges::Column::MergedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(MergeRecord::try_from)
            .collect()
    }

    /// Merges that can still be undone: not permanent and within their
    /// deadline on the storage clock. Oldest first.
    pub async fn list_pending_merges(&self) -> ResultEngine<Vec<MergeRecord>> {
        let now = storage_now(&self.database).await?;
        let mut pending = Vec::new();
        for record in self.unflagged_merges().await? {
            if record.is_pending(now) {
                pending.push(record);
            }
        }
        Ok(pending)
    }

    /// Flags every expired merge as permanent and returns how many were
    /// flipped.
    ///
    /// Idempotent and safe to run next to merges and undos: a record whose
    /// lock is held is skipped and picked up by the next run. Undo checks the
    /// deadline itself, so skipping the sweep entirely is also correct.
    pub async fn sweep_expired_merges(&self) -> ResultEngine<u64> {
        let now = storage_now(&self.database).await?;
        let mut flipped = 0;
        for record in self.unflagged_merges().await? {
            if record.is_pending(now) {
                continue;
            }
            let Ok(_guard) = self.locks.try_acquire([LockKey::Merge(record.id)]) else {
                tracing::debug!(merge = %record.id, "merge locked, sweep skips it");
                continue;
            };
            let result = merges::Entity::update_many()
                .col_expr(merges::Column::Permanent, Expr::value(true))
                .filter(merges::Column::Id.eq(record.id.to_string()))
                .filter(merges::Column::Permanent.eq(false))
                .exec(&self.database)
                .await?;
            flipped += result.rows_affected;
        }
        if flipped > 0 {
            tracing::info!(flipped, "expired merges made permanent");
        }
        Ok(flipped)
    }

    async fn unflagged_merges(&self) -> ResultEngine<Vec<MergeRecord>> {
        merges::Entity::find()
            .filter(merges::Column::Permanent.eq(false))
            .order_by_asc(merges::Column::MergedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(MergeRecord::try_from)
            .collect()
    }
}
