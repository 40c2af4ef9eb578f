use entity::{bonus_entries, sea_orm_active_enums::BonusEntryStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Date, OffsetDateTime};
use uuid::Uuid;
use validator::Validate;

/// Kind of ledger movement requested through `POST /transactions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    /// Credit a percentage of the current balance; `amount` carries the percent.
    /// Older clients send `multiply_percent`, which is the same operation.
    #[serde(alias = "multiply_percent")]
    Multiply,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::Multiply => "multiply",
        }
    }
}

/// Request to move bonus points
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    pub user_id: Uuid,

    #[validate(range(min = 1, message = "must be positive"))]
    pub amount: i64,

    #[serde(rename = "type")]
    pub kind: TransactionType,

    #[validate(range(min = 1, message = "must be positive"))]
    pub lifetime_days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub user_id: Uuid,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Usable balance read after the operation committed
    pub balance: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<SpendReceipt>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credited: Option<i64>,
}

/// Portion of one entry consumed by a withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendReceipt {
    pub entry_id: Uuid,
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub spent_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BalanceQuery {
    /// Horizon of the expiring breakdown, in days
    #[validate(range(min = 1, max = 3650, message = "must be between 1 and 3650"))]
    pub days: Option<i32>,
}

/// Amounts expiring per calendar date (UTC), ascending
pub type ExpiringBreakdown = BTreeMap<Date, i64>;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub balance: i64,
    /// Keys are `YYYY-MM-DD`
    pub expiring: BTreeMap<String, i64>,
}

impl BalanceResponse {
    pub fn new(user_id: Uuid, balance: i64, expiring: ExpiringBreakdown) -> Self {
        Self {
            user_id,
            balance,
            expiring: expiring
                .into_iter()
                .map(|(date, amount)| (date.to_string(), amount))
                .collect(),
        }
    }
}

/// Public view of a stored entry
#[derive(Debug, Serialize)]
pub struct BonusEntryView {
    pub id: Uuid,
    pub amount: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub lifetime_days: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub status: BonusEntryStatus,
}

impl From<bonus_entries::Model> for BonusEntryView {
    fn from(entry: bonus_entries::Model) -> Self {
        Self {
            id: entry.id,
            amount: entry.amount,
            created_at: entry.created_at,
            lifetime_days: entry.lifetime_days,
            expires_at: entry.expires_at,
            status: entry.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub user_id: Uuid,
    pub entries: Vec<BonusEntryView>,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: u64,
}
