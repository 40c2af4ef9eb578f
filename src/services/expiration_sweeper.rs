use crate::{error::Result, services::entry_store::BonusEntryStore};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

/// Relabels overdue active entries as expired.
///
/// Purely bookkeeping: balance and spend already ignore anything past `expires_at`.
pub struct ExpirationSweeper {
    db: DatabaseConnection,
    store: BonusEntryStore,
}

impl ExpirationSweeper {
    pub fn new(db: DatabaseConnection, store: BonusEntryStore) -> Self {
        Self { db, store }
    }

    /// One set-based pass; returns how many rows flipped to expired
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> Result<u64> {
        let now = OffsetDateTime::now_utc();
        let expired = self.store.expire_overdue(&self.db, now).await?;

        if expired > 0 {
            info!(expired = expired, "Expired overdue bonus entries");
        }

        Ok(expired)
    }

    /// Trigger a sweep every `interval` until the task is aborted.
    ///
    /// A failed pass is logged and retried on the next tick.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    error!(error = %e, "Scheduled expiration sweep failed");
                }
            }
        })
    }
}
