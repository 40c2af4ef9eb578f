use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Storage call timed out: {0}")]
    Timeout(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("No balance to multiply")]
    NoBalanceToMultiply,

    #[error("Bonus is zero after multiply")]
    ZeroBonusAfterMultiply,

    #[error("Multiply percent {percent} is outside 1..={max}")]
    MultiplyPercentTooLarge { percent: i32, max: i32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Business rejections are deterministic for the current ledger state; retrying them
    /// without a state change yields the same answer.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::InsufficientFunds { .. }
                | ApiError::NoBalanceToMultiply
                | ApiError::ZeroBonusAfterMultiply
                | ApiError::MultiplyPercentTooLarge { .. }
        )
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::Timeout(step) => {
                tracing::error!(step = step, "Storage call exceeded its time budget");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_TIMEOUT",
                    "The ledger is busy, please try again".to_string(),
                )
            }
            ApiError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InsufficientFunds { .. } => (
                StatusCode::BAD_REQUEST,
                "INSUFFICIENT_FUNDS",
                self.to_string(),
            ),
            ApiError::NoBalanceToMultiply => (
                StatusCode::BAD_REQUEST,
                "NO_BALANCE_TO_MULTIPLY",
                self.to_string(),
            ),
            ApiError::ZeroBonusAfterMultiply => (
                StatusCode::BAD_REQUEST,
                "ZERO_BONUS_AFTER_MULTIPLY",
                self.to_string(),
            ),
            ApiError::MultiplyPercentTooLarge { .. } => (
                StatusCode::BAD_REQUEST,
                "MULTIPLY_PERCENT_TOO_LARGE",
                self.to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonSyntaxError(e) => {
                ApiError::BadRequest(format!("body contains badly-formed JSON: {}", e.body_text()))
            }
            JsonRejection::JsonDataError(e) => {
                ApiError::BadRequest(format!("body contains invalid data: {}", e.body_text()))
            }
            JsonRejection::MissingJsonContentType(_) => ApiError::BadRequest(
                "expected request with `Content-Type: application/json`".to_string(),
            ),
            JsonRejection::BytesRejection(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::BadRequest("body must not be larger than 10 KiB".to_string())
            }
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

/// JSON body extractor whose rejections render through [`ApiError`]
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("invalid query string: {}", rejection.body_text()))
    }
}

/// Query string extractor whose rejections render through [`ApiError`]
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(AppQuery(value))
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
