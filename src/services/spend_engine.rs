use crate::{
    error::{ApiError, Result},
    models::{bonus_entry_ext::sum_amounts, ledger::SpendReceipt},
    services::entry_store::BonusEntryStore,
};
use entity::bonus_entries;
use sea_orm::DatabaseTransaction;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

/// What happens to one entry during a withdrawal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendStep {
    /// Index into the oldest-first entry list
    pub index: usize,
    pub consumed: i64,
    /// Amount carried into a new active entry when the entry is only partly consumed
    pub remainder: Option<i64>,
}

/// Decide how `amount` is taken from `entries` (oldest first).
///
/// Fails with `InsufficientFunds` when the entries cannot cover the amount; in that case
/// nothing may be written.
pub fn plan_spend(entries: &[bonus_entries::Model], amount: i64) -> Result<Vec<SpendStep>> {
    let available = sum_amounts(entries);
    if available < i128::from(amount) {
        return Err(ApiError::InsufficientFunds {
            requested: amount,
            available: i64::try_from(available).unwrap_or(i64::MAX),
        });
    }

    let mut remaining = amount;
    let mut steps = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        if remaining == 0 {
            break;
        }

        if entry.amount <= remaining {
            steps.push(SpendStep {
                index,
                consumed: entry.amount,
                remainder: None,
            });
            remaining -= entry.amount;
        } else {
            steps.push(SpendStep {
                index,
                consumed: remaining,
                remainder: Some(entry.amount - remaining),
            });
            remaining = 0;
        }
    }

    Ok(steps)
}

/// FIFO withdrawal over a user's locked active entries
#[derive(Debug, Clone)]
pub struct SpendEngine {
    store: BonusEntryStore,
}

impl SpendEngine {
    pub fn new(store: BonusEntryStore) -> Self {
        Self { store }
    }

    /// Consume `amount` oldest-first inside `txn`.
    ///
    /// A partly consumed entry is split: the remainder becomes a new active entry with the
    /// same age and expiry, and the original row keeps only the consumed slice as `spent`.
    #[instrument(skip(self, txn))]
    pub async fn spend(
        &self,
        txn: &DatabaseTransaction,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Vec<SpendReceipt>> {
        self.store.lock_user(txn, user_id).await?;

        // Taken after the user lock so the read sees the previous holder's commit
        let now = OffsetDateTime::now_utc();
        let entries = self
            .store
            .active_entries_for_update(txn, user_id, now)
            .await?;

        let steps = plan_spend(&entries, amount)?;
        let mut entries: Vec<Option<bonus_entries::Model>> =
            entries.into_iter().map(Some).collect();
        let mut receipts = Vec::with_capacity(steps.len());

        for step in steps {
            let entry = entries[step.index].take().ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!(
                    "spend plan visited entry {} twice",
                    step.index
                ))
            })?;

            if let Some(remainder) = step.remainder {
                // Insert the leftover first so it keeps the source row's age
                let leftover = self
                    .store
                    .insert_at(
                        txn,
                        entry.user_id,
                        remainder,
                        entry.lifetime_days,
                        entry.created_at,
                    )
                    .await?;

                debug!(
                    entry_id = %entry.id,
                    leftover_id = %leftover.id,
                    consumed = step.consumed,
                    remainder = remainder,
                    "Split partially consumed entry"
                );
            }

            let spent = self
                .store
                .mark_spent(txn, entry, step.consumed, now)
                .await?;

            receipts.push(SpendReceipt {
                entry_id: spent.id,
                amount: step.consumed,
                spent_at: now,
            });
        }

        Ok(receipts)
    }
}
