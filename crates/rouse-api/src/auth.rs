use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use chrono::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use rouse_core::{MorningCallService, RelationshipService};
use rouse_crypto::password::PasswordService;
use rouse_db::{Repositories, StoreError, UserRepository};
use rouse_session::SessionStore;
use rouse_types::api::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RefreshResponse, RegisterRequest,
    SessionResponse, UserResponse,
};
use rouse_types::clock::Clock;
use rouse_types::error::DomainError;
use rouse_types::models::{Session, SessionData, User};

use crate::error::{ApiError, ApiResult, blocking};
use crate::extract::ApiJson;
use crate::middleware::{Identity, SESSION_COOKIE};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub users: Arc<dyn UserRepository>,
    pub passwords: Arc<dyn PasswordService>,
    pub sessions: SessionStore,
    pub relationships: RelationshipService,
    pub morning_calls: Arc<MorningCallService>,
    pub clock: Arc<dyn Clock>,
    pub cookie_secure: bool,
}

impl AppStateInner {
    pub fn new(
        repos: Repositories,
        passwords: Arc<dyn PasswordService>,
        clock: Arc<dyn Clock>,
        session_ttl: Duration,
        confirm_window: Duration,
        cookie_secure: bool,
    ) -> Self {
        let relationships = RelationshipService::new(
            repos.users.clone(),
            repos.relationships.clone(),
            clock.clone(),
        );
        let morning_calls = Arc::new(MorningCallService::new(
            repos.users.clone(),
            repos.relationships,
            repos.morning_calls,
            clock.clone(),
            confirm_window,
        ));

        Self {
            users: repos.users,
            passwords,
            sessions: SessionStore::with_clock(session_ttl, clock.clone()),
            relationships,
            morning_calls,
            clock,
            cookie_secure,
        }
    }
}

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 8;

fn validate_username(username: &str) -> Result<(), DomainError> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(DomainError::InvalidInput(format!(
            "username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DomainError::InvalidInput(
            "username may only contain letters, digits and underscores".into(),
        ));
    }
    Ok(())
}

/// Lowercased address, or `InvalidInput` unless it is `local@domain`.
fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(email.to_lowercase())
        }
        _ => Err(DomainError::InvalidInput("email address is malformed".into())),
    }
}

fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(DomainError::InvalidInput(format!(
            "password must be at least {} characters",
            PASSWORD_MIN
        )));
    }
    Ok(())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(secure)
        .build()
}

async fn start_session(
    state: &AppState,
    user: &User,
    headers: &HeaderMap,
) -> ApiResult<Session> {
    let data = SessionData {
        username: Some(user.username.clone()),
        user_agent: user_agent(headers),
    };
    Ok(state.sessions.create_with_data(user.id, data).await?)
}

fn auth_response(user: &User, session: Session) -> AuthResponse {
    AuthResponse {
        user: UserResponse::from(user),
        session_token: session.id,
        expires_at: session.expires_at,
    }
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_username(&req.username)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;

    let st = state.clone();
    let user = blocking(move || {
        if st.users.exists_by_username(&req.username)? {
            return Err(DomainError::AlreadyExists("username"));
        }
        if st.users.exists_by_email(&email)? {
            return Err(DomainError::AlreadyExists("email"));
        }

        let password_hash = st
            .passwords
            .hash(&req.password)
            .map_err(|e| DomainError::Internal(e.into()))?;
        let now = st.clock.now();
        let user = User {
            id: Uuid::new_v4(),
            username: req.username,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        };
        st.users.create(&user)?;
        Ok(user)
    })
    .await?;

    info!("Registered user {} ({})", user.username, user.id);
    let session = start_session(&state, &user, &headers).await?;
    let jar = jar.add(session_cookie(session.id.clone(), state.cookie_secure));

    Ok((StatusCode::CREATED, jar, Json(auth_response(&user, session))))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let st = state.clone();
    let user = tokio::task::spawn_blocking(move || -> ApiResult<User> {
        let found = if req.login.contains('@') {
            st.users.find_by_email(&req.login.trim().to_lowercase())
        } else {
            st.users.find_by_username(&req.login)
        };
        let user = match found {
            Ok(user) => user,
            Err(StoreError::NotFound(_)) => return Err(ApiError::Unauthorized),
            Err(e) => return Err(e.into()),
        };

        if st.passwords.verify(&req.password, &user.password_hash)? {
            Ok(user)
        } else {
            warn!("Failed login for user {}", user.id);
            Err(ApiError::Unauthorized)
        }
    })
    .await??;

    let session = start_session(&state, &user, &headers).await?;
    let jar = jar.add(session_cookie(session.id.clone(), state.cookie_secure));

    Ok((jar, Json(auth_response(&user, session))))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    state.sessions.delete(&identity.token).await?;
    info!("User {} logged out", identity.user_id);
    Ok((StatusCode::NO_CONTENT, jar.remove(Cookie::build(SESSION_COOKIE).path("/"))))
}

pub async fn logout_all(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    jar: CookieJar,
) -> ApiResult<impl IntoResponse> {
    let removed = state.sessions.invalidate_all_for_user(identity.user_id).await;
    info!("User {} logged out of {} sessions", identity.user_id, removed);
    Ok((StatusCode::NO_CONTENT, jar.remove(Cookie::build(SESSION_COOKIE).path("/"))))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<RefreshResponse>> {
    let session = state
        .sessions
        .extend(&identity.token, state.sessions.default_ttl())
        .await?;
    Ok(Json(RefreshResponse {
        expires_at: session.expires_at,
    }))
}

/// Verify the current password, store the new one and replace every session
/// of the user with a single fresh one.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    jar: CookieJar,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_password(&req.new_password)?;

    let st = state.clone();
    let user_id = identity.user_id;
    let user = tokio::task::spawn_blocking(move || -> ApiResult<User> {
        let mut user = st.users.find_by_id(user_id)?;
        if !st.passwords.verify(&req.current_password, &user.password_hash)? {
            return Err(DomainError::forbidden("current password does not match").into());
        }
        user.password_hash = st.passwords.hash(&req.new_password)?;
        user.updated_at = st.clock.now();
        st.users.update(&user)?;
        Ok(user)
    })
    .await??;

    let revoked = state.sessions.invalidate_all_for_user(user.id).await;
    info!("User {} changed password, revoked {} sessions", user.id, revoked);

    let session = start_session(&state, &user, &headers).await?;
    let jar = jar.add(session_cookie(session.id.clone(), state.cookie_secure));

    Ok((jar, Json(auth_response(&user, session))))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Json<UserResponse>> {
    let st = state.clone();
    let user = blocking(move || Ok(st.users.find_by_id(identity.user_id)?)).await?;
    Ok(Json(UserResponse::from(&user)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Json<Vec<SessionResponse>> {
    let sessions = state.sessions.list_for_user(identity.user_id).await;
    Json(
        sessions
            .into_iter()
            .map(|s| SessionResponse {
                current: s.id == identity.token,
                created_at: s.created_at,
                expires_at: s.expires_at,
                user_agent: s.data.user_agent,
            })
            .collect(),
    )
}
