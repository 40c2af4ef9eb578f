use bonus_ledger::{services::BonusEntryStore, ApiError};
use entity::sea_orm_active_enums::BonusEntryStatus;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{is_usable_at, raw_entries, setup_state};

fn store() -> BonusEntryStore {
    BonusEntryStore::new(std::time::Duration::from_secs(3))
}

#[tokio::test]
async fn test_deposit_default_lifetime() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    let entry_id = state
        .ledger_service
        .deposit(user_id, 100, None)
        .await
        .expect("Failed to deposit");

    let balance = state.balance_service.get_balance(user_id).await.unwrap();
    assert_eq!(balance, 100);

    // Expiry is 30 days out, beyond a one-week horizon
    let expiring = state
        .balance_service
        .get_expiring_breakdown(user_id, 7)
        .await
        .unwrap();
    assert!(expiring.is_empty());

    let entries = raw_entries(&state.db, user_id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, entry_id);
    assert_eq!(entries[0].lifetime_days, 30);
    assert_eq!(entries[0].expires_at, entries[0].created_at + Duration::days(30));
    assert_eq!(entries[0].status, BonusEntryStatus::Active);
    assert!(entries[0].spent_at.is_none());
}

#[tokio::test]
async fn test_partial_withdrawal_keeps_age_of_remainder() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    let entry_id = state
        .ledger_service
        .deposit(user_id, 100, Some(60))
        .await
        .unwrap();
    let original = raw_entries(&state.db, user_id).await.remove(0);

    let receipts = state.ledger_service.withdraw(user_id, 50).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].entry_id, entry_id);
    assert_eq!(receipts[0].amount, 50);

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 50);

    let active = state
        .balance_service
        .get_active_entries(user_id)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_ne!(active[0].id, entry_id);
    assert_eq!(active[0].amount, 50);
    assert_eq!(active[0].created_at, original.created_at);
    assert_eq!(active[0].expires_at, original.expires_at);
    assert_eq!(active[0].lifetime_days, 60);

    // The original row now records only the consumed slice
    let spent = raw_entries(&state.db, user_id)
        .await
        .into_iter()
        .find(|e| e.id == entry_id)
        .unwrap();
    assert_eq!(spent.status, BonusEntryStatus::Spent);
    assert_eq!(spent.amount, 50);
    assert!(spent.spent_at.is_some());
}

#[tokio::test]
async fn test_fifo_withdrawal_across_entries() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    let first = state
        .ledger_service
        .deposit(user_id, 100, None)
        .await
        .unwrap();
    let second = state
        .ledger_service
        .deposit(user_id, 50, None)
        .await
        .unwrap();

    let receipts = state.ledger_service.withdraw(user_id, 120).await.unwrap();
    let consumed: Vec<_> = receipts.iter().map(|r| (r.entry_id, r.amount)).collect();
    assert_eq!(consumed, vec![(first, 100), (second, 20)]);
    assert_eq!(receipts.iter().map(|r| r.amount).sum::<i64>(), 120);

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 30);

    let entries = raw_entries(&state.db, user_id).await;
    assert_eq!(entries.len(), 3);

    let by_id = |id: Uuid| entries.iter().find(|e| e.id == id).unwrap();
    assert_eq!(by_id(first).status, BonusEntryStatus::Spent);
    assert_eq!(by_id(first).amount, 100);
    assert_eq!(by_id(second).status, BonusEntryStatus::Spent);
    assert_eq!(by_id(second).amount, 20);

    let remainder = entries
        .iter()
        .find(|e| e.status == BonusEntryStatus::Active)
        .unwrap();
    assert_eq!(remainder.amount, 30);
    assert_eq!(remainder.created_at, by_id(second).created_at);
}

#[tokio::test]
async fn test_insufficient_funds_mutates_nothing() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    state
        .ledger_service
        .deposit(user_id, 50, None)
        .await
        .unwrap();
    let before = raw_entries(&state.db, user_id).await;

    let result = state.ledger_service.withdraw(user_id, 100).await;
    assert!(matches!(
        result,
        Err(ApiError::InsufficientFunds {
            requested: 100,
            available: 50
        })
    ));

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 50);
    assert_eq!(raw_entries(&state.db, user_id).await, before);
}

#[tokio::test]
async fn test_withdraw_entire_balance_leaves_no_active_entries() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    for amount in [10, 20, 30] {
        state
            .ledger_service
            .deposit(user_id, amount, None)
            .await
            .unwrap();
    }

    let receipts = state.ledger_service.withdraw(user_id, 60).await.unwrap();
    assert_eq!(receipts.len(), 3);

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 0);
    assert!(state
        .balance_service
        .get_active_entries(user_id)
        .await
        .unwrap()
        .is_empty());

    // Exact consumption never creates split rows
    assert_eq!(raw_entries(&state.db, user_id).await.len(), 3);
}

#[tokio::test]
async fn test_expired_entries_are_not_spendable() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();

    // Overdue but never swept: still labelled active
    store()
        .insert_at(&state.db, user_id, 100, 30, now - Duration::days(40))
        .await
        .unwrap();
    state
        .ledger_service
        .deposit(user_id, 10, None)
        .await
        .unwrap();

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 10);

    let result = state.ledger_service.withdraw(user_id, 50).await;
    assert!(matches!(
        result,
        Err(ApiError::InsufficientFunds { available: 10, .. })
    ));
}

#[tokio::test]
async fn test_balance_matches_raw_storage() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();

    store()
        .insert_at(&state.db, user_id, 70, 10, now - Duration::days(11))
        .await
        .unwrap();
    for amount in [40, 25, 5] {
        state
            .ledger_service
            .deposit(user_id, amount, Some(90))
            .await
            .unwrap();
    }
    state.ledger_service.withdraw(user_id, 42).await.unwrap();
    state
        .ledger_service
        .multiply(user_id, 10, None)
        .await
        .unwrap();

    let check_time = OffsetDateTime::now_utc();
    let expected: i64 = raw_entries(&state.db, user_id)
        .await
        .iter()
        .filter(|e| is_usable_at(e, check_time))
        .map(|e| e.amount)
        .sum();

    // Backdated 70 is overdue; 40 + 25 + 5 - 42 = 28 usable, plus floor(10% of 28) = 2
    assert_eq!(expected, 30);
    assert_eq!(
        state.balance_service.get_balance(user_id).await.unwrap(),
        expected
    );
}

#[tokio::test]
async fn test_expiring_breakdown_groups_by_date() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    let store = store();

    let soon = store
        .insert_at(&state.db, user_id, 15, 30, now - Duration::days(28))
        .await
        .unwrap();
    let later = store
        .insert_at(&state.db, user_id, 25, 30, now - Duration::days(25))
        .await
        .unwrap();
    let later_twin = store
        .insert_at(&state.db, user_id, 5, 30, later.created_at)
        .await
        .unwrap();
    // Outside the horizon
    state
        .ledger_service
        .deposit(user_id, 1000, None)
        .await
        .unwrap();

    let breakdown = state
        .balance_service
        .get_expiring_breakdown(user_id, 7)
        .await
        .unwrap();

    let expected: Vec<(time::Date, i64)> = vec![
        (soon.expires_at.date(), 15),
        (later.expires_at.date(), 25 + 5),
    ];
    assert_eq!(later_twin.expires_at, later.expires_at);
    assert_eq!(breakdown.into_iter().collect::<Vec<_>>(), expected);

    assert!(matches!(
        state
            .balance_service
            .get_expiring_breakdown(user_id, 0)
            .await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn test_multiply_credits_percentage_of_balance() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    state
        .ledger_service
        .deposit(user_id, 100, None)
        .await
        .unwrap();

    let credited = state
        .ledger_service
        .multiply(user_id, 50, Some(30))
        .await
        .unwrap();
    assert_eq!(credited, 50);

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 150);

    let mut amounts: Vec<i64> = state
        .balance_service
        .get_active_entries(user_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.amount)
        .collect();
    amounts.sort_unstable();
    assert_eq!(amounts, vec![50, 100]);
}

#[tokio::test]
async fn test_multiply_without_balance_creates_nothing() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    let result = state.ledger_service.multiply(user_id, 10, None).await;
    assert!(matches!(result, Err(ApiError::NoBalanceToMultiply)));
    assert!(raw_entries(&state.db, user_id).await.is_empty());
}

#[tokio::test]
async fn test_multiply_rejections() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    state
        .ledger_service
        .deposit(user_id, 1, None)
        .await
        .unwrap();

    // 50% of 1 floors to zero
    let result = state.ledger_service.multiply(user_id, 50, None).await;
    assert!(matches!(result, Err(ApiError::ZeroBonusAfterMultiply)));

    for percent in [0, -5, 201, 1000] {
        let result = state.ledger_service.multiply(user_id, percent, None).await;
        assert!(
            matches!(
                result,
                Err(ApiError::MultiplyPercentTooLarge { max: 200, .. })
            ),
            "percent {percent}"
        );
    }

    assert_eq!(raw_entries(&state.db, user_id).await.len(), 1);
    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_storage() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    assert!(matches!(
        state.ledger_service.deposit(user_id, 0, None).await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        state.ledger_service.deposit(user_id, 10, Some(0)).await,
        Err(ApiError::Validation(_))
    ));
    assert!(matches!(
        state.ledger_service.withdraw(user_id, -1).await,
        Err(ApiError::Validation(_))
    ));

    assert!(raw_entries(&state.db, user_id).await.is_empty());
}

#[tokio::test]
async fn test_users_are_isolated() {
    let state = setup_state().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    state.ledger_service.deposit(alice, 80, None).await.unwrap();
    state.ledger_service.deposit(bob, 20, None).await.unwrap();

    assert!(state.ledger_service.withdraw(bob, 50).await.is_err());
    state.ledger_service.withdraw(alice, 50).await.unwrap();

    assert_eq!(state.balance_service.get_balance(alice).await.unwrap(), 30);
    assert_eq!(state.balance_service.get_balance(bob).await.unwrap(), 20);
}

#[tokio::test]
async fn test_expiring_breakdown_overflow_is_an_error() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();
    let created_at = OffsetDateTime::now_utc() - Duration::hours(12);

    for _ in 0..2 {
        store()
            .insert_at(&state.db, user_id, i64::MAX, 1, created_at)
            .await
            .unwrap();
    }

    let result = state
        .balance_service
        .get_expiring_breakdown(user_id, 7)
        .await;
    assert!(matches!(result, Err(ApiError::Internal(_))));
}

#[tokio::test]
async fn test_commit_is_not_cut_short_by_the_time_budget() {
    let state = setup_state().await;
    let user_id = Uuid::new_v4();

    let txn = store().begin(&state.db).await.unwrap();
    store().insert(&txn, user_id, 25, 30).await.unwrap();

    // A zero budget would abandon any call that has to wait on the driver
    BonusEntryStore::new(std::time::Duration::ZERO)
        .commit(txn)
        .await
        .unwrap();

    assert_eq!(state.balance_service.get_balance(user_id).await.unwrap(), 25);
}
