use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use rouse_crypto::password::PasswordError;
use rouse_db::StoreError;
use rouse_types::error::DomainError;

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    /// Missing, unknown or expired session, or bad credentials.
    Unauthorized,
    Domain(DomainError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Domain(e) => match e {
                DomainError::InvalidInput(_)
                | DomainError::SelfReference
                | DomainError::InvalidSchedule(_)
                | DomainError::MessageTooLong { .. }
                | DomainError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::AlreadyExists(_) => StatusCode::CONFLICT,
                DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Domain(e) => e.code(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        ApiError::Domain(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Domain(e.into())
    }
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::EmptyInput => {
                ApiError::Domain(DomainError::InvalidInput("password must not be empty".into()))
            }
            other => ApiError::Domain(DomainError::Internal(other.into())),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Domain(DomainError::InvalidInput(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Domain(DomainError::InvalidInput(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Domain(DomainError::InvalidInput(rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Domain(DomainError::Internal(anyhow::anyhow!("blocking task failed: {}", e)))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::Domain(DomainError::Internal(e)) => {
                error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            ApiError::Domain(e) => e.to_string(),
        };

        (status, Json(json!({ "error": message, "code": self.code() }))).into_response()
    }
}

/// Run a synchronous service call off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> rouse_types::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
