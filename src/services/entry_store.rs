use crate::{
    error::{ApiError, Result},
    models::bonus_entry_ext::expires_at,
};
use entity::{bonus_entries, sea_orm_active_enums::BonusEntryStatus};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, DbErr, Statement, TransactionTrait,
};
use std::{future::Future, time::Duration};
use time::OffsetDateTime;
use uuid::Uuid;

/// Persistence primitives for `bonus_entries`.
///
/// Every call but COMMIT runs under the configured time budget; an overrun surfaces as
/// [`ApiError::Timeout`] and the caller's transaction is rolled back when dropped.
#[derive(Debug, Clone)]
pub struct BonusEntryStore {
    query_timeout: Duration,
}

impl BonusEntryStore {
    pub fn new(query_timeout: Duration) -> Self {
        Self { query_timeout }
    }

    /// Run one storage call under the time budget
    pub async fn bounded<T, F>(&self, step: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, DbErr>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ApiError::Timeout(step)),
        }
    }

    pub async fn begin(&self, db: &DatabaseConnection) -> Result<DatabaseTransaction> {
        self.bounded("begin transaction", db.begin()).await
    }

    /// Commit outside the time budget.
    ///
    /// Once COMMIT is sent the server may already have applied it, so abandoning the wait
    /// would report a timeout for a write that persisted.
    pub async fn commit(&self, txn: DatabaseTransaction) -> Result<()> {
        txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(&self, txn: DatabaseTransaction) -> Result<()> {
        self.bounded("rollback transaction", txn.rollback()).await
    }

    /// Append a new active entry created now
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: i64,
        lifetime_days: i32,
    ) -> Result<bonus_entries::Model> {
        let created_at = OffsetDateTime::now_utc();
        self.insert_at(conn, user_id, amount, lifetime_days, created_at)
            .await
    }

    /// Append a new active entry with an explicit creation instant.
    ///
    /// The spend engine uses this for split remainders, which keep their source's age.
    pub async fn insert_at<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: i64,
        lifetime_days: i32,
        created_at: OffsetDateTime,
    ) -> Result<bonus_entries::Model> {
        if amount <= 0 || lifetime_days <= 0 {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "refusing to store entry with amount {} and lifetime {}",
                amount,
                lifetime_days
            )));
        }

        let entry = bonus_entries::ActiveModel {
            // v7 ids are time-ordered, which breaks created_at ties by insertion order
            id: Set(Uuid::now_v7()),
            user_id: Set(user_id),
            amount: Set(amount),
            created_at: Set(created_at),
            lifetime_days: Set(lifetime_days),
            expires_at: Set(expires_at(created_at, lifetime_days)),
            status: Set(BonusEntryStatus::Active),
            spent_at: Set(None),
        };

        self.bounded("insert entry", entry.insert(conn)).await
    }

    fn active_entries_query(user_id: Uuid, now: OffsetDateTime) -> Select<bonus_entries::Entity> {
        bonus_entries::Entity::find()
            .filter(bonus_entries::Column::UserId.eq(user_id))
            .filter(bonus_entries::Column::Status.eq(BonusEntryStatus::Active))
            .filter(bonus_entries::Column::ExpiresAt.gt(now))
            .order_by_asc(bonus_entries::Column::CreatedAt)
            .order_by_asc(bonus_entries::Column::Id)
    }

    /// Usable entries, oldest first, without locking
    pub async fn active_entries<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Vec<bonus_entries::Model>> {
        self.bounded(
            "load active entries",
            Self::active_entries_query(user_id, now).all(conn),
        )
        .await
    }

    /// Per-user transaction lock, held until `txn` ends.
    ///
    /// Row locks alone cannot serialize spends: a waiter blocked on `FOR UPDATE` re-checks only
    /// the rows its snapshot saw and misses remainders inserted by the holder. Taking this lock
    /// first means the following select starts after the previous holder committed.
    /// SQLite has no advisory locks; its writers already serialize on the database.
    pub async fn lock_user(&self, txn: &DatabaseTransaction, user_id: Uuid) -> Result<()> {
        if txn.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
            [user_id.to_string().into()],
        );
        self.bounded("lock user", txn.execute(stmt)).await?;

        Ok(())
    }

    /// Usable entries, oldest first, each row locked until `txn` ends.
    ///
    /// Callers take [`Self::lock_user`] first; the row locks then guard against writers that
    /// skip it, such as the sweep.
    pub async fn active_entries_for_update(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Vec<bonus_entries::Model>> {
        self.bounded(
            "lock active entries",
            Self::active_entries_query(user_id, now)
                .lock_exclusive()
                .all(txn),
        )
        .await
    }

    /// Amounts of usable entries, for aggregation
    pub async fn active_amounts<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Vec<i64>> {
        self.bounded(
            "load active amounts",
            bonus_entries::Entity::find()
                .select_only()
                .column(bonus_entries::Column::Amount)
                .filter(bonus_entries::Column::UserId.eq(user_id))
                .filter(bonus_entries::Column::Status.eq(BonusEntryStatus::Active))
                .filter(bonus_entries::Column::ExpiresAt.gt(now))
                .into_tuple::<i64>()
                .all(conn),
        )
        .await
    }

    /// (expires_at, amount) of usable entries expiring in `(now, until]`
    pub async fn expiring_between<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<(OffsetDateTime, i64)>> {
        self.bounded(
            "load expiring entries",
            bonus_entries::Entity::find()
                .select_only()
                .column(bonus_entries::Column::ExpiresAt)
                .column(bonus_entries::Column::Amount)
                .filter(bonus_entries::Column::UserId.eq(user_id))
                .filter(bonus_entries::Column::Status.eq(BonusEntryStatus::Active))
                .filter(bonus_entries::Column::ExpiresAt.gt(now))
                .filter(bonus_entries::Column::ExpiresAt.lte(until))
                .order_by_asc(bonus_entries::Column::ExpiresAt)
                .into_tuple::<(OffsetDateTime, i64)>()
                .all(conn),
        )
        .await
    }

    /// Flip a locked active entry to spent, recording only the consumed slice as its amount
    pub async fn mark_spent(
        &self,
        txn: &DatabaseTransaction,
        entry: bonus_entries::Model,
        consumed: i64,
        spent_at: OffsetDateTime,
    ) -> Result<bonus_entries::Model> {
        let mut entry_active: bonus_entries::ActiveModel = entry.into();
        entry_active.status = Set(BonusEntryStatus::Spent);
        entry_active.spent_at = Set(Some(spent_at));
        entry_active.amount = Set(consumed);

        self.bounded("mark entry spent", entry_active.update(txn))
            .await
    }

    /// Set-based transition of every overdue active row to expired
    pub async fn expire_overdue<C: ConnectionTrait>(
        &self,
        conn: &C,
        now: OffsetDateTime,
    ) -> Result<u64> {
        let result = self
            .bounded(
                "expire overdue entries",
                bonus_entries::Entity::update_many()
                    .col_expr(
                        bonus_entries::Column::Status,
                        Expr::value(BonusEntryStatus::Expired),
                    )
                    .filter(bonus_entries::Column::Status.eq(BonusEntryStatus::Active))
                    .filter(bonus_entries::Column::ExpiresAt.lte(now))
                    .exec(conn),
            )
            .await?;

        Ok(result.rows_affected)
    }
}
