use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use rouse_crypto::token::generate_session_token;
use rouse_types::clock::{Clock, SystemClock};
use rouse_types::error::{DomainError, Result};
use rouse_types::models::{Session, SessionData};

/// Owns every live session. Reads take the shared lock, mutations the
/// exclusive one. Absent and expired tokens are indistinguishable to callers.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    /// token -> session
    sessions: RwLock<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl SessionStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                clock,
                default_ttl,
            }),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub async fn create(&self, user_id: Uuid) -> Result<Session> {
        self.create_with_data(user_id, SessionData::default()).await
    }

    pub async fn create_with_data(&self, user_id: Uuid, data: SessionData) -> Result<Session> {
        if user_id.is_nil() {
            return Err(DomainError::InvalidInput("user id is empty".into()));
        }

        let now = self.now();
        let mut sessions = self.inner.sessions.write().await;

        let mut token = generate_session_token();
        while sessions.contains_key(&token) {
            token = generate_session_token();
        }

        let session = Session {
            id: token,
            user_id,
            created_at: now,
            expires_at: now + self.inner.default_ttl,
            data,
        };
        sessions.insert(session.id.clone(), session.clone());

        info!("Session created for user {} (expires {})", user_id, session.expires_at);
        Ok(session)
    }

    /// Resolve a token. An expired record is evicted before `NotFound` is returned.
    pub async fn get(&self, token: &str) -> Result<Session> {
        let now = self.now();
        {
            let sessions = self.inner.sessions.read().await;
            match sessions.get(token) {
                None => return Err(DomainError::NotFound("session")),
                Some(session) if !session.is_expired_at(now) => return Ok(session.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the exclusive lock: it may have been extended or removed meanwhile.
        let mut sessions = self.inner.sessions.write().await;
        match sessions.get(token) {
            Some(session) if !session.is_expired_at(now) => Ok(session.clone()),
            Some(_) => {
                if let Some(expired) = sessions.remove(token) {
                    debug!("Evicted expired session of user {}", expired.user_id);
                }
                Err(DomainError::NotFound("session"))
            }
            None => Err(DomainError::NotFound("session")),
        }
    }

    /// Never fails: absence and expiry both read as `false`.
    pub async fn validate(&self, token: &str) -> bool {
        let now = self.now();
        self.inner
            .sessions
            .read()
            .await
            .get(token)
            .is_some_and(|session| !session.is_expired_at(now))
    }

    /// Reset expiry to exactly `now + duration`.
    pub async fn extend(&self, token: &str, duration: Duration) -> Result<Session> {
        if duration <= Duration::zero() {
            return Err(DomainError::InvalidInput("extension must be positive".into()));
        }

        let now = self.now();
        let mut sessions = self.inner.sessions.write().await;
        let session = live_mut(&mut sessions, token, now)?;
        session.expires_at = now + duration;

        debug!("Session of user {} extended to {}", session.user_id, session.expires_at);
        Ok(session.clone())
    }

    pub async fn delete(&self, token: &str) -> Result<()> {
        let now = self.now();
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions
            .remove(token)
            .ok_or(DomainError::NotFound("session"))?;
        if session.is_expired_at(now) {
            return Err(DomainError::NotFound("session"));
        }

        info!("Session deleted for user {}", session.user_id);
        Ok(())
    }

    /// Drop every session of `user_id`. Returns how many were removed.
    pub async fn invalidate_all_for_user(&self, user_id: Uuid) -> usize {
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        let removed = before - sessions.len();

        info!("Invalidated {} sessions for user {}", removed, user_id);
        removed
    }

    /// Live sessions of `user_id`, oldest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Vec<Session> {
        let now = self.now();
        let mut live: Vec<Session> = self
            .inner
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired_at(now))
            .cloned()
            .collect();
        live.sort_by_key(|s| s.created_at);
        live
    }

    /// Sweep out every expired session in one pass under the exclusive lock.
    pub async fn purge_expired(&self) -> usize {
        let now = self.now();
        let mut sessions = self.inner.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        before - sessions.len()
    }

    /// Number of stored records, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Live record for `token`, evicting it first if it has expired.
fn live_mut<'a>(
    sessions: &'a mut HashMap<String, Session>,
    token: &str,
    now: DateTime<Utc>,
) -> Result<&'a mut Session> {
    let expired = match sessions.get(token) {
        None => return Err(DomainError::NotFound("session")),
        Some(session) => session.is_expired_at(now),
    };
    if expired {
        sessions.remove(token);
        return Err(DomainError::NotFound("session"));
    }
    sessions
        .get_mut(token)
        .ok_or(DomainError::NotFound("session"))
}
