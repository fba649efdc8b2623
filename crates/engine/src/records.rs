//! Linked records.
//!
//! A [`LinkedRecord`] is an invoice or a payment owned by exactly one
//! [`Account`](crate::Account). Amounts are stored as positive **minor units**;
//! the kind decides the sign:
//! - invoices increase the account balance (what is owed to the supplier)
//! - payments decrease it

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Invoice,
    Payment,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Payment => "payment",
        }
    }

    /// Signed contribution of `amount_minor` to the owner's balance.
    pub fn signed(self, amount_minor: i64) -> i64 {
        match self {
            Self::Invoice => amount_minor,
            Self::Payment => -amount_minor,
        }
    }
}

impl TryFrom<&str> for RecordKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "invoice" => Ok(Self::Invoice),
            "payment" => Ok(Self::Payment),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid record kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: RecordKind,
    pub amount_minor: i64,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LinkedRecord {
    pub fn new(
        account_id: Uuid,
        kind: RecordKind,
        amount_minor: i64,
        reference: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if amount_minor <= 0 {
            return Err(EngineError::InvalidAmount(
                "amount_minor must be > 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount_minor,
            reference,
            occurred_at,
        })
    }
}

/// Balance of a set of records: invoices minus payments.
///
/// Fails with `InvalidAmount` instead of wrapping on overflow.
pub fn balance_of(records: &[LinkedRecord]) -> ResultEngine<i64> {
    records.iter().try_fold(0i64, |acc, record| {
        acc.checked_add(record.kind.signed(record.amount_minor))
            .ok_or_else(|| EngineError::InvalidAmount("balance overflow".to_string()))
    })
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "linked_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub kind: String,
    pub amount_minor: i64,
    pub reference: Option<String>,
    pub occurred_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&LinkedRecord> for ActiveModel {
    fn from(record: &LinkedRecord) -> Self {
        Self {
            id: ActiveValue::Set(record.id.to_string()),
            account_id: ActiveValue::Set(record.account_id.to_string()),
            kind: ActiveValue::Set(record.kind.as_str().to_string()),
            amount_minor: ActiveValue::Set(record.amount_minor),
            reference: ActiveValue::Set(record.reference.clone()),
            occurred_at: ActiveValue::Set(record.occurred_at),
        }
    }
}

impl TryFrom<Model> for LinkedRecord {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "record")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            kind: RecordKind::try_from(model.kind.as_str())?,
            amount_minor: model.amount_minor,
            reference: model.reference,
            occurred_at: model.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: RecordKind, amount_minor: i64) -> LinkedRecord {
        LinkedRecord::new(Uuid::new_v4(), kind, amount_minor, None, Utc::now()).unwrap()
    }

    #[test]
    fn invoices_minus_payments() {
        let records = vec![
            record(RecordKind::Invoice, 200),
            record(RecordKind::Invoice, 150),
            record(RecordKind::Invoice, 150),
            record(RecordKind::Payment, 200),
        ];
        assert_eq!(balance_of(&records).unwrap(), 300);
        assert_eq!(balance_of(&[]).unwrap(), 0);
    }

    #[test]
    fn payments_only_go_negative() {
        let records = vec![record(RecordKind::Payment, 75)];
        assert_eq!(balance_of(&records).unwrap(), -75);
    }

    #[test]
    fn overflow_is_reported() {
        let records = vec![
            record(RecordKind::Invoice, i64::MAX),
            record(RecordKind::Invoice, 1),
        ];
        assert!(matches!(
            balance_of(&records),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let err = LinkedRecord::new(Uuid::new_v4(), RecordKind::Payment, 0, None, Utc::now());
        assert!(err.is_err());
        assert_eq!(RecordKind::try_from("invoice").unwrap(), RecordKind::Invoice);
        assert!(RecordKind::try_from("refund").is_err());
    }
}
