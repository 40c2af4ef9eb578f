use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, AppJson, AppQuery, Result},
    models::ledger::{
        BalanceQuery, BalanceResponse, EntriesResponse, SweepResponse, TransactionRequest,
        TransactionResponse, TransactionType,
    },
};

fn user_id_from_path(path: std::result::Result<Path<Uuid>, PathRejection>) -> Result<Uuid> {
    match path {
        Ok(Path(user_id)) if !user_id.is_nil() => Ok(user_id),
        _ => Err(ApiError::NotFound(
            "the requested resource could not be found".to_string(),
        )),
    }
}

/// POST /api/v1/transactions
///
/// Request body:
/// ```json
/// { "user_id": "…", "amount": 100, "type": "deposit", "lifetime_days": 60 }
/// ```
///
/// `type` is one of `deposit`, `withdrawal`, `multiply`; for `multiply` the
/// `amount` is the percent of the current balance to credit.
#[instrument(skip(state, request))]
pub async fn create_transaction(
    State(state): State<AppState>,
    AppJson(request): AppJson<TransactionRequest>,
) -> Result<Json<TransactionResponse>> {
    // Validate request
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let user_id = request.user_id;
    let mut response = TransactionResponse {
        user_id,
        amount: request.amount,
        kind: request.kind,
        balance: 0,
        entry_id: None,
        receipts: None,
        credited: None,
    };

    match request.kind {
        TransactionType::Deposit => {
            let entry_id = state
                .ledger_service
                .deposit(user_id, request.amount, request.lifetime_days)
                .await?;
            response.entry_id = Some(entry_id);
        }
        TransactionType::Withdrawal => {
            let receipts = state
                .ledger_service
                .withdraw(user_id, request.amount)
                .await?;
            response.receipts = Some(receipts);
        }
        TransactionType::Multiply => {
            let percent = i32::try_from(request.amount).map_err(|_| {
                ApiError::MultiplyPercentTooLarge {
                    percent: i32::MAX,
                    max: state.config.ledger.max_multiply_percent,
                }
            })?;
            let credited = state
                .ledger_service
                .multiply(user_id, percent, request.lifetime_days)
                .await?;
            response.credited = Some(credited);
        }
    }

    // Balance after commit, for the caller's convenience
    response.balance = state.balance_service.get_balance(user_id).await?;

    Ok(Json(response))
}

/// GET /api/v1/users/{id}/balance
#[instrument(skip(state, path))]
pub async fn get_user_balance(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    AppQuery(query): AppQuery<BalanceQuery>,
) -> Result<Json<BalanceResponse>> {
    let user_id = user_id_from_path(path)?;
    query
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let horizon_days = query
        .days
        .unwrap_or(state.config.ledger.expiring_horizon_days);

    let balance = state.balance_service.get_balance(user_id).await?;
    let expiring = state
        .balance_service
        .get_expiring_breakdown(user_id, horizon_days)
        .await?;

    Ok(Json(BalanceResponse::new(user_id, balance, expiring)))
}

/// GET /api/v1/users/{id}/entries
#[instrument(skip(state, path))]
pub async fn get_user_entries(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<EntriesResponse>> {
    let user_id = user_id_from_path(path)?;

    let entries = state.balance_service.get_active_entries(user_id).await?;

    Ok(Json(EntriesResponse {
        user_id,
        entries: entries.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/v1/maintenance/sweep
///
/// External trigger for the expiration sweep.
#[instrument(skip(state))]
pub async fn sweep_expired(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    let expired = state.expiration_sweeper.sweep_expired().await?;

    Ok(Json(SweepResponse { expired }))
}
