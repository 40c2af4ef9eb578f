use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Ledger business rules and storage budgets
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Lifetime applied when a deposit does not specify one
    #[serde(default = "default_lifetime_days")]
    pub default_lifetime_days: i32,
    #[serde(default = "default_max_multiply_percent")]
    pub max_multiply_percent: i32,
    /// Time budget for every individual storage call (begin, lock, query, update); commit is unbounded
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_expiring_horizon_days")]
    pub expiring_horizon_days: i32,
    /// Interval of the in-process sweep trigger; 0 disables it
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl LedgerConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_lifetime_days: default_lifetime_days(),
            max_multiply_percent: default_max_multiply_percent(),
            query_timeout_ms: default_query_timeout_ms(),
            expiring_horizon_days: default_expiring_horizon_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_lifetime_days() -> i32 {
    30
}

fn default_max_multiply_percent() -> i32 {
    200
}

fn default_query_timeout_ms() -> u64 {
    3000
}

fn default_expiring_horizon_days() -> i32 {
    7
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            // e.g. BONUS_LEDGER__DATABASE__URL, BONUS_LEDGER__LEDGER__QUERY_TIMEOUT_MS
            .add_source(
                config::Environment::with_prefix("BONUS_LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
