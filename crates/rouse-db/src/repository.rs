//! Storage capabilities, one trait per entity type.
//!
//! Implementations provide single-record atomicity and enforce the
//! uniqueness rules of their entity. Read-check-write sequences that span
//! calls are serialized by the services, not here.

use rouse_types::error::DomainError;
use rouse_types::models::{MorningCall, MorningCallStatus, Relationship, RelationshipStatus, User};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => DomainError::NotFound(what),
            StoreError::AlreadyExists(what) => DomainError::AlreadyExists(what),
            StoreError::Backend(e) => DomainError::Internal(e),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.into())
    }
}

pub trait UserRepository: Send + Sync {
    /// Fails `AlreadyExists("username")` or `AlreadyExists("email")` on collision.
    fn create(&self, user: &User) -> StoreResult<()>;
    fn find_by_id(&self, id: Uuid) -> StoreResult<User>;
    fn find_by_username(&self, username: &str) -> StoreResult<User>;
    fn find_by_email(&self, email: &str) -> StoreResult<User>;
    fn exists_by_username(&self, username: &str) -> StoreResult<bool>;
    fn exists_by_email(&self, email: &str) -> StoreResult<bool>;
    fn update(&self, user: &User) -> StoreResult<()>;
    fn delete(&self, id: Uuid) -> StoreResult<()>;

    fn exists(&self, id: Uuid) -> StoreResult<bool> {
        match self.find_by_id(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub trait RelationshipRepository: Send + Sync {
    /// Fails `AlreadyExists` when an active relationship joins the same pair.
    fn create(&self, relationship: &Relationship) -> StoreResult<()>;
    fn find_by_id(&self, id: Uuid) -> StoreResult<Relationship>;
    fn update(&self, relationship: &Relationship) -> StoreResult<()>;
    fn delete(&self, id: Uuid) -> StoreResult<()>;
    fn list_all(&self) -> StoreResult<Vec<Relationship>>;

    fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Relationship>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| r.involves(user_id))
            .collect())
    }

    /// The active relationship between `a` and `b` in either direction, if any.
    fn find_active_between(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Relationship>> {
        Ok(self
            .list_for_user(a)?
            .into_iter()
            .find(|r| r.status.is_active() && r.joins(a, b)))
    }

    /// True when an accepted relationship joins the pair, in either direction.
    fn are_friends(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        Ok(self
            .find_active_between(a, b)?
            .is_some_and(|r| r.status == RelationshipStatus::Accepted))
    }
}

pub trait MorningCallRepository: Send + Sync {
    fn create(&self, call: &MorningCall) -> StoreResult<()>;
    fn find_by_id(&self, id: Uuid) -> StoreResult<MorningCall>;
    fn update(&self, call: &MorningCall) -> StoreResult<()>;
    fn delete(&self, id: Uuid) -> StoreResult<()>;
    fn list_all(&self) -> StoreResult<Vec<MorningCall>>;

    fn list_by_sender(&self, sender_id: Uuid) -> StoreResult<Vec<MorningCall>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|c| c.sender_id == sender_id)
            .collect())
    }

    fn list_by_receiver(&self, receiver_id: Uuid) -> StoreResult<Vec<MorningCall>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|c| c.receiver_id == receiver_id)
            .collect())
    }

    fn list_by_status(&self, status: MorningCallStatus) -> StoreResult<Vec<MorningCall>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|c| c.status == status)
            .collect())
    }
}
