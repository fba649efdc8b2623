//! Initial schema.
//!
//! - `accounts`: ledger parties (suppliers) with their denormalized balance
//! - `linked_records`: invoices and payments, each owned by one account
//! - `merge_records`: the merge registry (audit trail and undo data)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    Name,
    Balance,
    OpeningBalance,
    Active,
    IsProtected,
}

#[derive(Iden)]
enum LinkedRecords {
    Table,
    Id,
    AccountId,
    Kind,
    AmountMinor,
    Reference,
    OccurredAt,
}

#[derive(Iden)]
enum MergeRecords {
    Table,
    Id,
    SourceAccountId,
    TargetAccountId,
    MergedAt,
    UndoDeadline,
    Permanent,
    SourceSnapshot,
    MovedInvoiceIds,
    MovedPaymentIds,
    MergedBalance,
    MergedOpeningBalance,
    TargetBalanceBefore,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::OpeningBalance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Accounts::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Accounts::IsProtected)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-active-name")
                    .table(Accounts::Table)
                    .col(Accounts::Active)
                    .col(Accounts::Name)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Linked records
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(LinkedRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LinkedRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LinkedRecords::AccountId).string().not_null())
                    .col(ColumnDef::new(LinkedRecords::Kind).string().not_null())
                    .col(
                        ColumnDef::new(LinkedRecords::AmountMinor)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(LinkedRecords::AmountMinor).gt(0)),
                    )
                    .col(ColumnDef::new(LinkedRecords::Reference).string())
                    .col(
                        ColumnDef::new(LinkedRecords::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-linked_records-account_id")
                            .from(LinkedRecords::Table, LinkedRecords::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-linked_records-account_id")
                    .table(LinkedRecords::Table)
                    .col(LinkedRecords::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Merge registry
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(MergeRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MergeRecords::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::SourceAccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::TargetAccountId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MergeRecords::MergedAt).timestamp().not_null())
                    .col(
                        ColumnDef::new(MergeRecords::UndoDeadline)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::Permanent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(MergeRecords::SourceSnapshot).text().not_null())
                    .col(
                        ColumnDef::new(MergeRecords::MovedInvoiceIds)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::MovedPaymentIds)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::MergedBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::MergedOpeningBalance)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MergeRecords::TargetBalanceBefore)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-merge_records-source_account_id")
                            .from(MergeRecords::Table, MergeRecords::SourceAccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-merge_records-target_account_id")
                            .from(MergeRecords::Table, MergeRecords::TargetAccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-merge_records-permanent-merged_at")
                    .table(MergeRecords::Table)
                    .col(MergeRecords::Permanent)
                    .col(MergeRecords::MergedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(MergeRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LinkedRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
