use crate::{
    config::LedgerConfig,
    error::{ApiError, Result},
    models::{bonus_entry_ext::sum_amounts, ledger::SpendReceipt},
    services::{entry_store::BonusEntryStore, spend_engine::SpendEngine},
};
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// `floor(total * percent / 100)`, computed without overflow
pub fn compute_bonus(total: i128, percent: i32) -> Result<i64> {
    let bonus = total * i128::from(percent) / 100;
    i64::try_from(bonus).map_err(|_| {
        ApiError::Internal(anyhow::anyhow!(
            "bonus of {}% on {} does not fit in i64",
            percent,
            total
        ))
    })
}

/// Caller-facing mutations of the bonus ledger
pub struct LedgerService {
    db: DatabaseConnection,
    store: BonusEntryStore,
    spend_engine: SpendEngine,
    config: LedgerConfig,
}

impl LedgerService {
    pub fn new(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        let store = BonusEntryStore::new(config.query_timeout());
        Self {
            db,
            spend_engine: SpendEngine::new(store.clone()),
            store,
            config: config.clone(),
        }
    }

    fn resolve_lifetime(&self, lifetime_days: Option<i32>) -> Result<i32> {
        match lifetime_days {
            Some(days) if days <= 0 => Err(ApiError::Validation(
                "lifetime_days must be positive".to_string(),
            )),
            Some(days) => Ok(days),
            None => Ok(self.config.default_lifetime_days),
        }
    }

    fn check_percent(&self, percent: i32) -> Result<()> {
        let max = self.config.max_multiply_percent;
        if !(1..=max).contains(&percent) {
            return Err(ApiError::MultiplyPercentTooLarge { percent, max });
        }
        // Unreachable after the range check unless the configured maximum is misconfigured
        if percent <= 0 {
            return Err(ApiError::ZeroBonusAfterMultiply);
        }
        Ok(())
    }

    /// Append a new active entry; no lock is taken
    #[instrument(skip(self))]
    pub async fn deposit(
        &self,
        user_id: Uuid,
        amount: i64,
        lifetime_days: Option<i32>,
    ) -> Result<Uuid> {
        let entry_id = self
            .deposit_with(&self.db, user_id, amount, lifetime_days)
            .await?;

        info!(
            user_id = %user_id,
            entry_id = %entry_id,
            amount = amount,
            "Deposited bonus entry"
        );

        Ok(entry_id)
    }

    /// Deposit within an existing transaction
    /// Used by operations that combine a locked read with a credit
    #[instrument(skip(self, txn))]
    pub async fn deposit_in_txn(
        &self,
        user_id: Uuid,
        amount: i64,
        lifetime_days: Option<i32>,
        txn: &DatabaseTransaction,
    ) -> Result<Uuid> {
        self.deposit_with(txn, user_id, amount, lifetime_days).await
    }

    async fn deposit_with<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        amount: i64,
        lifetime_days: Option<i32>,
    ) -> Result<Uuid> {
        if amount <= 0 {
            return Err(ApiError::Validation("amount must be positive".to_string()));
        }
        let lifetime_days = self.resolve_lifetime(lifetime_days)?;

        let entry = self
            .store
            .insert(conn, user_id, amount, lifetime_days)
            .await?;

        Ok(entry.id)
    }

    /// Withdraw `amount` oldest-first; all or nothing
    #[instrument(skip(self))]
    pub async fn withdraw(&self, user_id: Uuid, amount: i64) -> Result<Vec<SpendReceipt>> {
        if amount <= 0 {
            return Err(ApiError::Validation("amount must be positive".to_string()));
        }

        let txn = self.store.begin(&self.db).await?;

        let receipts = match self.spend_engine.spend(&txn, user_id, amount).await {
            Ok(receipts) => receipts,
            Err(e) => {
                // Storage failures may leave the connection unusable; dropping rolls back too
                if e.is_business_rejection() {
                    self.store.rollback(txn).await?;
                }
                return Err(e);
            }
        };

        self.store.commit(txn).await?;

        info!(
            user_id = %user_id,
            amount = amount,
            entries = receipts.len(),
            "Withdrew bonus points"
        );

        Ok(receipts)
    }

    /// Credit `percent`% of the current balance as a new entry
    #[instrument(skip(self))]
    pub async fn multiply(
        &self,
        user_id: Uuid,
        percent: i32,
        lifetime_days: Option<i32>,
    ) -> Result<i64> {
        self.check_percent(percent)?;
        self.resolve_lifetime(lifetime_days)?;

        let txn = self.store.begin(&self.db).await?;

        let credited = match self
            .multiply_in_txn(user_id, percent, lifetime_days, &txn)
            .await
        {
            Ok(credited) => credited,
            Err(e) => {
                if e.is_business_rejection() {
                    self.store.rollback(txn).await?;
                }
                return Err(e);
            }
        };

        self.store.commit(txn).await?;

        info!(
            user_id = %user_id,
            percent = percent,
            credited = credited,
            "Multiplied bonus balance"
        );

        Ok(credited)
    }

    /// Multiply within an existing transaction.
    ///
    /// Takes the same per-user lock as a withdrawal before reading the total, so the
    /// credited bonus is computed from a balance nobody else can change until commit.
    #[instrument(skip(self, txn))]
    pub async fn multiply_in_txn(
        &self,
        user_id: Uuid,
        percent: i32,
        lifetime_days: Option<i32>,
        txn: &DatabaseTransaction,
    ) -> Result<i64> {
        self.check_percent(percent)?;

        self.store.lock_user(txn, user_id).await?;

        let now = OffsetDateTime::now_utc();
        let entries = self
            .store
            .active_entries_for_update(txn, user_id, now)
            .await?;

        let total = sum_amounts(&entries);
        if total <= 0 {
            return Err(ApiError::NoBalanceToMultiply);
        }

        let bonus = compute_bonus(total, percent)?;
        if bonus <= 0 {
            return Err(ApiError::ZeroBonusAfterMultiply);
        }

        self.deposit_in_txn(user_id, bonus, lifetime_days, txn)
            .await?;

        Ok(bonus)
    }
}
