use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only ledger; balance is always derived from these rows
        manager
            .create_table(
                Table::create()
                    .table(BonusEntries::Table)
                    .if_not_exists()
                    .col(pk_uuid(BonusEntries::Id))
                    .col(uuid(BonusEntries::UserId).not_null())
                    .col(big_integer(BonusEntries::Amount).not_null())
                    .col(timestamp_with_time_zone(BonusEntries::CreatedAt).not_null())
                    .col(integer(BonusEntries::LifetimeDays).not_null())
                    .col(timestamp_with_time_zone(BonusEntries::ExpiresAt).not_null())
                    .col(
                        string_len(BonusEntries::Status, 16)
                            .not_null()
                            .default("active"),
                    )
                    .col(timestamp_with_time_zone_null(BonusEntries::SpentAt))
                    .check(Expr::col(BonusEntries::Amount).gt(0))
                    .check(Expr::col(BonusEntries::LifetimeDays).gt(0))
                    .to_owned(),
            )
            .await?;

        // Partial indexes: FIFO/locked reads go by user, the sweep goes by expiry.
        // Only active rows are ever scanned on these paths.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE INDEX IF NOT EXISTS idx_bonus_entries_user_active
                ON bonus_entries (user_id, created_at)
                WHERE status = 'active'
                "#,
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE INDEX IF NOT EXISTS idx_bonus_entries_expires_active
                ON bonus_entries (expires_at)
                WHERE status = 'active'
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BonusEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BonusEntries {
    Table,
    Id,
    UserId,
    Amount,
    CreatedAt,
    LifetimeDays,
    ExpiresAt,
    Status,
    SpentAt,
}
