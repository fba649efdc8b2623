//! Merge registry records.
//!
//! A [`MergeRecord`] is written by every successful merge. It is the audit
//! trail of the operation and, while pending, the only input needed to undo
//! it: the ids of the moved records, the balance that moved with them and a
//! [`SourceSnapshot`] of the deactivated account.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Account, EngineError, RecordKind, ResultEngine, util::parse_uuid};

/// Current layout of [`SourceSnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Immutable copy of the source account's display fields at merge time.
///
/// Kept separate from [`Account`]: it is persisted as a JSON blob and must
/// keep deserializing when `Account` grows new fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    #[serde(default = "snapshot_version")]
    pub version: u32,
    pub id: Uuid,
    pub name: String,
    pub balance: i64,
    pub opening_balance: i64,
    #[serde(default)]
    pub is_protected: bool,
    pub captured_at: DateTime<Utc>,
}

fn snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

impl SourceSnapshot {
    pub fn capture(account: &Account, captured_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            id: account.id,
            name: account.name.clone(),
            balance: account.balance,
            opening_balance: account.opening_balance,
            is_protected: account.is_protected,
            captured_at,
        }
    }

    pub fn encode(&self) -> ResultEngine<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> ResultEngine<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Ids of the records a merge moved, grouped by kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedRecords {
    pub invoices: Vec<Uuid>,
    pub payments: Vec<Uuid>,
}

impl MovedRecords {
    pub fn push(&mut self, kind: RecordKind, id: Uuid) {
        match kind {
            RecordKind::Invoice => self.invoices.push(id),
            RecordKind::Payment => self.payments.push(id),
        }
    }

    pub fn len(&self) -> usize {
        self.invoices.len() + self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.invoices.iter().chain(self.payments.iter())
    }
}

/// Lifecycle of a merge record.
///
/// `Deleted` is never observed on a stored record: a successful undo removes
/// the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeState {
    Pending,
    Permanent,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub id: Uuid,
    pub source_account_id: Uuid,
    pub target_account_id: Uuid,
    pub merged_at: DateTime<Utc>,
    pub undo_deadline: DateTime<Utc>,
    pub permanent: bool,
    pub source_snapshot: SourceSnapshot,
    pub moved_record_ids: MovedRecords,
    pub merged_balance: i64,
    pub merged_opening_balance: i64,
    pub target_balance_before: i64,
}

impl MergeRecord {
    /// State as of `now`. An expired record is permanent even if the sweep has
    /// not flipped its flag yet.
    pub fn state(&self, now: DateTime<Utc>) -> MergeState {
        if self.permanent || now > self.undo_deadline {
            MergeState::Permanent
        } else {
            MergeState::Pending
        }
    }

    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == MergeState::Pending
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "merge_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub source_account_id: String,
    pub target_account_id: String,
    pub merged_at: DateTimeUtc,
    pub undo_deadline: DateTimeUtc,
    pub permanent: bool,
    pub source_snapshot: String,
    pub moved_invoice_ids: String,
    pub moved_payment_ids: String,
    pub merged_balance: i64,
    pub merged_opening_balance: i64,
    pub target_balance_before: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&MergeRecord> for ActiveModel {
    type Error = EngineError;

    fn try_from(record: &MergeRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(record.id.to_string()),
            source_account_id: ActiveValue::Set(record.source_account_id.to_string()),
            target_account_id: ActiveValue::Set(record.target_account_id.to_string()),
            merged_at: ActiveValue::Set(record.merged_at),
            undo_deadline: ActiveValue::Set(record.undo_deadline),
            permanent: ActiveValue::Set(record.permanent),
            source_snapshot: ActiveValue::Set(record.source_snapshot.encode()?),
            moved_invoice_ids: ActiveValue::Set(serde_json::to_string(
                &record.moved_record_ids.invoices,
            )?),
            moved_payment_ids: ActiveValue::Set(serde_json::to_string(
                &record.moved_record_ids.payments,
            )?),
            merged_balance: ActiveValue::Set(record.merged_balance),
            merged_opening_balance: ActiveValue::Set(record.merged_opening_balance),
            target_balance_before: ActiveValue::Set(record.target_balance_before),
        })
    }
}

impl TryFrom<Model> for MergeRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "merge")?,
            source_account_id: parse_uuid(&model.source_account_id, "account")?,
            target_account_id: parse_uuid(&model.target_account_id, "account")?,
            merged_at: model.merged_at,
            undo_deadline: model.undo_deadline,
            permanent: model.permanent,
            source_snapshot: SourceSnapshot::decode(&model.source_snapshot)?,
            moved_record_ids: MovedRecords {
                invoices: serde_json::from_str(&model.moved_invoice_ids)?,
                payments: serde_json::from_str(&model.moved_payment_ids)?,
            },
            merged_balance: model.merged_balance,
            merged_opening_balance: model.merged_opening_balance,
            target_balance_before: model.target_balance_before,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            name: "ACME Srl".to_string(),
            balance: 30000,
            opening_balance: 1200,
            active: true,
            is_protected: false,
        }
    }

    fn merge_at(merged_at: DateTime<Utc>) -> MergeRecord {
        let source = account();
        MergeRecord {
            id: Uuid::new_v4(),
            source_account_id: source.id,
            target_account_id: Uuid::new_v4(),
            merged_at,
            undo_deadline: merged_at + Duration::hours(24),
            permanent: false,
            source_snapshot: SourceSnapshot::capture(&source, merged_at),
            moved_record_ids: MovedRecords::default(),
            merged_balance: source.balance,
            merged_opening_balance: source.opening_balance,
            target_balance_before: 0,
        }
    }

    #[test]
    fn snapshot_survives_the_blob_format() {
        let captured_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let snapshot = SourceSnapshot::capture(&account(), captured_at);
        let decoded = SourceSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn snapshot_tolerates_missing_and_unknown_fields() {
        let raw = r#"{
            "id": "5f0c7b8e-8a55-4c8e-9d36-0c3f1f7c2a11",
            "name": "Old Supplier",
            "balance": 100,
            "opening_balance": 0,
            "captured_at": "2026-01-01T00:00:00Z",
            "vat_number": "IT0123456789"
        }"#;
        let snapshot = SourceSnapshot::decode(raw).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert!(!snapshot.is_protected);
        assert_eq!(snapshot.name, "Old Supplier");
    }

    #[test]
    fn state_turns_permanent_after_the_deadline() {
        let merged_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let record = merge_at(merged_at);

        assert_eq!(record.state(merged_at), MergeState::Pending);
        assert_eq!(record.state(record.undo_deadline), MergeState::Pending);
        assert_eq!(
            record.state(record.undo_deadline + Duration::seconds(1)),
            MergeState::Permanent
        );

        let flagged = MergeRecord {
            permanent: true,
            ..record
        };
        assert_eq!(flagged.state(merged_at), MergeState::Permanent);
    }

    #[test]
    fn moved_records_group_by_kind() {
        let mut moved = MovedRecords::default();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        moved.push(RecordKind::Invoice, a);
        moved.push(RecordKind::Payment, b);
        moved.push(RecordKind::Invoice, c);

        assert_eq!(moved.invoices, vec![a, c]);
        assert_eq!(moved.payments, vec![b]);
        assert_eq!(moved.len(), 3);
        assert_eq!(moved.iter().count(), 3);
    }
}
