//! Initial schema.
//!
//! - `ledger`: single-row spend ledger (cumulative withdrawals, allowance
//!   window, spending mode, accrual anchor)
//! - `transfers`: append-only history of executed transfers
//!
//! Amounts are stored as `i64` base units (6 fraction digits).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Ledger {
    Table,
    Id,
    CumulativeWithdrawnBaseUnits,
    PeriodStart,
    SpentThisPeriodBaseUnits,
    SpendingMode,
    AccrualAnchor,
    UpdatedAt,
}

#[derive(Iden)]
enum Transfers {
    Table,
    Id,
    AmountBaseUnits,
    Destination,
    TxReference,
    ExplorerUrl,
    CeilingBaseUnits,
    LimitRemainingBaseUnits,
    ExecutedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Ledger
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Ledger::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ledger::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(Ledger::CumulativeWithdrawnBaseUnits)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Ledger::PeriodStart).timestamp().not_null())
                    .col(
                        ColumnDef::new(Ledger::SpentThisPeriodBaseUnits)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Ledger::SpendingMode)
                            .string()
                            .not_null()
                            .default("balanced"),
                    )
                    .col(ColumnDef::new(Ledger::AccrualAnchor).timestamp().not_null())
                    .col(ColumnDef::new(Ledger::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Transfers
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transfers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transfers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transfers::AmountBaseUnits)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transfers::Destination).string().not_null())
                    .col(ColumnDef::new(Transfers::TxReference).string().not_null())
                    .col(ColumnDef::new(Transfers::ExplorerUrl).string())
                    .col(
                        ColumnDef::new(Transfers::CeilingBaseUnits)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transfers::LimitRemainingBaseUnits)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transfers::ExecutedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transfers-executed_at")
                    .table(Transfers::Table)
                    .col(Transfers::ExecutedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transfers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Ledger::Table).to_owned())
            .await?;
        Ok(())
    }
}
