use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest morning call message, counted in Unicode scalar values.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// How far ahead a morning call may be scheduled.
pub const MAX_SCHEDULE_AHEAD_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// Public view of a user, safe to hand to any authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
}

// -- Sessions --

/// Typed per-session data captured at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub username: Option<String>,
    pub user_agent: Option<String>,
}

/// Server-side session. `id` is the opaque bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub data: SessionData,
}

impl Session {
    /// A session is live strictly before `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// -- State machines --

/// A closed set of statuses with an explicit table of allowed next states.
pub trait Transition: Copy + PartialEq + fmt::Display + 'static {
    fn allowed_transitions(self) -> &'static [Self];

    /// Self-transitions are never in the table, so they are always rejected.
    fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
    Removed,
}

impl RelationshipStatus {
    pub const ALL: [RelationshipStatus; 5] = [
        Self::Pending,
        Self::Accepted,
        Self::Rejected,
        Self::Blocked,
        Self::Removed,
    ];

    /// Active relationships occupy the pair: no second request may be sent.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Accepted | Self::Blocked)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Blocked => "blocked",
            Self::Removed => "removed",
        }
    }
}

impl Transition for RelationshipStatus {
    fn allowed_transitions(self) -> &'static [Self] {
        use RelationshipStatus::*;
        match self {
            Pending => &[Accepted, Rejected, Blocked, Removed],
            Accepted => &[Blocked, Removed],
            Blocked => &[Removed],
            Rejected => &[Removed],
            Removed => &[],
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorningCallStatus {
    Scheduled,
    Delivered,
    Confirmed,
    Cancelled,
    Expired,
}

impl MorningCallStatus {
    pub const ALL: [MorningCallStatus; 5] = [
        Self::Scheduled,
        Self::Delivered,
        Self::Confirmed,
        Self::Cancelled,
        Self::Expired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Delivered => "delivered",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl Transition for MorningCallStatus {
    fn allowed_transitions(self) -> &'static [Self] {
        use MorningCallStatus::*;
        match self {
            Scheduled => &[Delivered, Cancelled, Expired],
            Delivered => &[Confirmed, Expired],
            Confirmed | Cancelled | Expired => &[],
        }
    }
}

impl fmt::Display for MorningCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MorningCallStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

// -- Entities --

/// Directed friend request between two users, resolved over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RelationshipStatus,
    /// Set while `status` is blocked; only this party may lift the block.
    pub blocked_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id || self.receiver_id == user_id
    }

    /// True when the relationship joins `a` and `b`, in either direction.
    pub fn joins(&self, a: Uuid, b: Uuid) -> bool {
        (self.requester_id == a && self.receiver_id == b)
            || (self.requester_id == b && self.receiver_id == a)
    }

    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.requester_id == user_id {
            Some(self.receiver_id)
        } else if self.receiver_id == user_id {
            Some(self.requester_id)
        } else {
            None
        }
    }
}

/// A wake-up reminder one user schedules for a friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorningCall {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub message: String,
    pub status: MorningCallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MorningCall {
    /// Due: still scheduled and the scheduled time has arrived.
    pub fn should_deliver(&self, now: DateTime<Utc>) -> bool {
        self.status == MorningCallStatus::Scheduled && self.scheduled_time <= now
    }
}
