/// Ledger rules for bonus_entries rows
///
/// This file complements the entity in entity/src/bonus_entries.rs
use entity::bonus_entries;
use time::{Duration, OffsetDateTime};

/// Expiry instant for an entry created at `created_at` living `lifetime_days`
pub fn expires_at(created_at: OffsetDateTime, lifetime_days: i32) -> OffsetDateTime {
    created_at + Duration::days(i64::from(lifetime_days))
}

/// Sum of entry amounts, accumulated wide enough for any number of i64 rows
pub fn sum_amounts(entries: &[bonus_entries::Model]) -> i128 {
    entries.iter().map(|e| i128::from(e.amount)).sum()
}
