use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    extract::CookieJar,
    headers::{Authorization, HeaderMapExt, authorization::Bearer},
};
use tracing::debug;
use uuid::Uuid;

use crate::auth::AppState;
use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "session_id";
pub const SESSION_HEADER: &str = "x-session-id";

/// The authenticated caller, attached to request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub token: String,
}

/// Pull the session token out of the request. The first source present wins:
/// cookie, then `Authorization: Bearer`, then `X-Session-ID`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie) = CookieJar::from_headers(headers).get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }

    if let Some(auth) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }

    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the session token to an [`Identity`] or reject with 401.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers()).ok_or(ApiError::Unauthorized)?;

    let session = state.sessions.get(&token).await.map_err(|e| {
        debug!("Session rejected: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(Identity {
        user_id: session.user_id,
        token,
    });
    Ok(next.run(req).await)
}
