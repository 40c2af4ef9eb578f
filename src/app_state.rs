use crate::{
    config::Config,
    services::{BalanceService, BonusEntryStore, ExpirationSweeper, LedgerService},
};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub ledger_service: Arc<LedgerService>,
    pub balance_service: Arc<BalanceService>,
    pub expiration_sweeper: Arc<ExpirationSweeper>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .connect_timeout(Duration::from_secs(config.database.connect_timeout_secs))
            .sqlx_logging(false);
        let db = sea_orm::Database::connect(options).await?;

        Ok(Self::with_connection(db, config))
    }

    /// Build the state over an existing connection (tests use an in-memory database)
    pub fn with_connection(db: DatabaseConnection, config: Config) -> Self {
        let store = BonusEntryStore::new(config.ledger.query_timeout());

        // Initialize services
        let ledger_service = Arc::new(LedgerService::new(db.clone(), &config.ledger));
        let balance_service = Arc::new(BalanceService::new(db.clone(), store.clone()));
        let expiration_sweeper = Arc::new(ExpirationSweeper::new(db.clone(), store));

        Self {
            db,
            ledger_service,
            balance_service,
            expiration_sweeper,
            config: Arc::new(config),
        }
    }
}
