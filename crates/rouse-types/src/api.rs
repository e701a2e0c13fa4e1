use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Relationship, User, UserSummary};

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `login` is either a username or an email address.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub expires_at: DateTime<Utc>,
}

/// A live session of the caller. The token itself is never echoed back.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub current: bool,
}

// -- Friends --

/// Target a user either by id or by username.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequest {
    pub receiver_id: Option<Uuid>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDirection {
    Sent,
    Received,
}

#[derive(Debug, Deserialize)]
pub struct FriendRequestQuery {
    #[serde(default = "default_direction")]
    pub direction: RequestDirection,
}

fn default_direction() -> RequestDirection {
    RequestDirection::Received
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendResponse {
    pub relationship_id: Uuid,
    pub user: UserSummary,
    pub friends_since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestResponse {
    pub relationship: Relationship,
    pub counterpart: UserSummary,
}

// -- Morning calls --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMorningCallRequest {
    pub receiver_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMorningCallRequest {
    pub scheduled_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
}
