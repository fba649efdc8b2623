//! The module contains the `Account` struct and its storage model.

use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

/// A ledger party, typically a supplier.
///
/// `balance` is the denormalized sum of the linked records: invoices minus
/// payments. It is kept in sync by the engine and never edited directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier, so the account can be renamed without breaking
    /// references.
    pub id: Uuid,
    pub name: String,
    pub balance: i64,
    pub opening_balance: i64,
    pub active: bool,
    /// Protected accounts can never be the source of a merge.
    pub is_protected: bool,
}

/// Account row as shown on selection screens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub id: Uuid,
    pub name: String,
    pub balance: i64,
}

/// Input for [`Engine::new_account`](crate::Engine::new_account).
#[derive(Clone, Debug, Default)]
pub struct NewAccount {
    pub name: String,
    pub opening_balance: i64,
    pub is_protected: bool,
}

impl NewAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn opening_balance(mut self, opening_balance: i64) -> Self {
        self.opening_balance = opening_balance;
        self
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub balance: i64,
    pub opening_balance: i64,
    pub active: bool,
    pub is_protected: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::records::Entity")]
    LinkedRecords,
}

impl Related<super::records::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LinkedRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::Set(account.id.to_string()),
            name: ActiveValue::Set(account.name.clone()),
            balance: ActiveValue::Set(account.balance),
            opening_balance: ActiveValue::Set(account.opening_balance),
            active: ActiveValue::Set(account.active),
            is_protected: ActiveValue::Set(account.is_protected),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            name: model.name,
            balance: model.balance,
            opening_balance: model.opening_balance,
            active: model.active,
            is_protected: model.is_protected,
        })
    }
}
