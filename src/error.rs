use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{payments::PaymentError, repository::RepositoryError};

/// AppError
///
/// Every failure a request can end with. Gate failures (`Unauthenticated`,
/// `Forbidden`, `IdentityMismatch`, `Unavailable`) are terminal and are
/// rendered with the exact bodies API consumers already match on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing, malformed, badly signed or expired bearer token.
    #[error("Unauthorized access")]
    Unauthenticated,

    /// Valid identity without the admin role.
    #[error("forbidden access")]
    Forbidden,

    /// Valid identity asking about somebody else's records.
    #[error("Forbidden access")]
    IdentityMismatch,

    /// A dependency did not answer in time.
    #[error("Service unavailable")]
    Unavailable,

    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Payment gateway error")]
    Payment(#[from] PaymentError),

    #[error("Internal server error")]
    Repository(#[from] RepositoryError),

    #[error("Internal server error")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::IdentityMismatch => StatusCode::FORBIDDEN,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Payment(_) => StatusCode::BAD_GATEWAY,
            AppError::Repository(_) | AppError::TokenSigning(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Repository(e) => tracing::error!("repository failure: {e}"),
            AppError::Payment(e) => tracing::error!("payment gateway failure: {e}"),
            AppError::TokenSigning(e) => tracing::error!("token signing failure: {e}"),
            AppError::Unavailable => tracing::warn!("dependency unavailable"),
            _ => {}
        }

        // 401 uses `error`, everything else `message`.
        let body = match self {
            AppError::Unauthenticated => json!({ "error": self.to_string() }),
            _ => json!({ "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// AppJson
///
/// `Json` body extractor whose rejections (bad content type, syntax, wrong
/// field types) render as a 400 `{"message": ...}` instead of axum's plain text.
#[derive(Debug, Clone)]
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}
