use crate::{
    error::{ApiError, Result},
    models::ledger::ExpiringBreakdown,
    services::entry_store::BonusEntryStore,
};
use entity::bonus_entries;
use sea_orm::DatabaseConnection;
use std::collections::BTreeMap;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use tracing::instrument;
use uuid::Uuid;

/// Read-only aggregates over the ledger.
///
/// Usability is decided here by `status = active AND expires_at > now` at query time,
/// so a late sweep can only leave a stale label, never a wrong balance.
pub struct BalanceService {
    db: DatabaseConnection,
    store: BonusEntryStore,
}

impl BalanceService {
    pub fn new(db: DatabaseConnection, store: BonusEntryStore) -> Self {
        Self { db, store }
    }

    /// Total usable balance
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: Uuid) -> Result<i64> {
        let now = OffsetDateTime::now_utc();
        let amounts = self.store.active_amounts(&self.db, user_id, now).await?;

        let total: i128 = amounts.into_iter().map(i128::from).sum();
        i64::try_from(total).map_err(|_| {
            ApiError::Internal(anyhow::anyhow!(
                "balance of user {} overflows i64",
                user_id
            ))
        })
    }

    /// Amounts expiring within `horizon_days`, grouped by UTC expiry date
    #[instrument(skip(self))]
    pub async fn get_expiring_breakdown(
        &self,
        user_id: Uuid,
        horizon_days: i32,
    ) -> Result<ExpiringBreakdown> {
        if horizon_days <= 0 {
            return Err(ApiError::Validation(
                "horizon days must be positive".to_string(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let until = now + Duration::days(i64::from(horizon_days));
        let rows = self
            .store
            .expiring_between(&self.db, user_id, now, until)
            .await?;

        let mut totals: BTreeMap<Date, i128> = BTreeMap::new();
        for (expires_at, amount) in rows {
            let date = expires_at.to_offset(UtcOffset::UTC).date();
            *totals.entry(date).or_insert(0) += i128::from(amount);
        }

        totals
            .into_iter()
            .map(|(date, total)| {
                let total = i64::try_from(total).map_err(|_| {
                    ApiError::Internal(anyhow::anyhow!(
                        "amount expiring on {} for user {} overflows i64",
                        date,
                        user_id
                    ))
                })?;
                Ok((date, total))
            })
            .collect::<Result<ExpiringBreakdown>>()
    }

    /// Usable entries oldest first (non-locking read)
    #[instrument(skip(self))]
    pub async fn get_active_entries(&self, user_id: Uuid) -> Result<Vec<bonus_entries::Model>> {
        let now = OffsetDateTime::now_utc();
        self.store.active_entries(&self.db, user_id, now).await
    }
}
