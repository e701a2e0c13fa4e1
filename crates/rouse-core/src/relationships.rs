use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use rouse_db::{RelationshipRepository, StoreError, UserRepository};
use rouse_types::api::RequestDirection;
use rouse_types::clock::Clock;
use rouse_types::error::{DomainError, Result};
use rouse_types::models::{Relationship, RelationshipStatus, UserSummary};

use crate::gate::{Role, authorize, check_transition, ensure_distinct};

/// An accepted relationship seen from one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Friend {
    pub relationship_id: Uuid,
    pub user: UserSummary,
    /// When the request was accepted.
    pub since: DateTime<Utc>,
}

/// A pending request with the other party resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequest {
    pub relationship: Relationship,
    pub counterpart: UserSummary,
}

/// Friend request lifecycle. `accept`/`reject` resolve a pending request
/// (receiver only), `block` is open to either party from any active status,
/// and `remove` ends the relationship from any status.
///
/// Removal is logical. Removed relationships vanish from every read path but
/// stay in storage.
pub struct RelationshipService {
    users: Arc<dyn UserRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    clock: Arc<dyn Clock>,
    /// Serializes read-check-write sequences on relationships.
    write_lock: Mutex<()>,
}

impl RelationshipService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        relationships: Arc<dyn RelationshipRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            relationships,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // Guards no data, so a poisoned lock is still usable.
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_user(&self, id: Uuid) -> Result<()> {
        if self.users.exists(id)? {
            Ok(())
        } else {
            Err(DomainError::NotFound("user"))
        }
    }

    /// Load a relationship, hiding removed ones.
    fn load(&self, id: Uuid) -> Result<Relationship> {
        let relationship = self.relationships.find_by_id(id)?;
        if relationship.status == RelationshipStatus::Removed {
            return Err(DomainError::NotFound("relationship"));
        }
        Ok(relationship)
    }

    fn apply(&self, mut relationship: Relationship, next: RelationshipStatus) -> Result<Relationship> {
        check_transition(relationship.status, next)?;
        let previous = relationship.status;
        relationship.status = next;
        relationship.updated_at = self.clock.now();
        self.relationships.update(&relationship)?;

        info!(
            "Relationship {} {} -> {}",
            relationship.id, previous, relationship.status
        );
        Ok(relationship)
    }

    /// Send a friend request. Any active relationship between the pair,
    /// including a block from either side, refuses the request.
    pub fn send(&self, requester_id: Uuid, receiver_id: Uuid) -> Result<Relationship> {
        ensure_distinct(requester_id, receiver_id)?;
        self.ensure_user(requester_id)?;
        self.ensure_user(receiver_id)?;

        let _guard = self.lock();
        if self
            .relationships
            .find_active_between(requester_id, receiver_id)?
            .is_some()
        {
            return Err(DomainError::AlreadyExists("relationship"));
        }

        let now = self.clock.now();
        let relationship = Relationship {
            id: Uuid::new_v4(),
            requester_id,
            receiver_id,
            status: RelationshipStatus::Pending,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        };
        self.relationships.create(&relationship)?;

        info!("Friend request {} sent: {} -> {}", relationship.id, requester_id, receiver_id);
        Ok(relationship)
    }

    /// Shared shape of accept and reject: pending only, receiver only.
    fn resolve_pending(
        &self,
        id: Uuid,
        actor: Uuid,
        next: RelationshipStatus,
        action: &str,
    ) -> Result<Relationship> {
        let _guard = self.lock();
        let relationship = self.load(id)?;
        if relationship.status != RelationshipStatus::Pending {
            return Err(DomainError::NotFound("friend request"));
        }
        authorize(&relationship, actor, Role::Target, action)?;
        self.apply(relationship, next)
    }

    pub fn accept(&self, id: Uuid, actor: Uuid) -> Result<Relationship> {
        self.resolve_pending(id, actor, RelationshipStatus::Accepted, "accept")
    }

    pub fn reject(&self, id: Uuid, actor: Uuid) -> Result<Relationship> {
        self.resolve_pending(id, actor, RelationshipStatus::Rejected, "reject")
    }

    /// Block through an existing relationship. Either party may block.
    pub fn block(&self, id: Uuid, actor: Uuid) -> Result<Relationship> {
        let _guard = self.lock();
        let relationship = self.load(id)?;
        authorize(&relationship, actor, Role::Either, "block")?;
        self.block_existing(relationship, actor)
    }

    fn block_existing(&self, mut relationship: Relationship, actor: Uuid) -> Result<Relationship> {
        relationship.blocked_by = Some(actor);
        self.apply(relationship, RelationshipStatus::Blocked)
    }

    /// Block a user directly. Reuses the active relationship between the pair
    /// when there is one, otherwise records a new relationship already blocked.
    pub fn block_user(&self, actor: Uuid, target: Uuid) -> Result<Relationship> {
        ensure_distinct(actor, target)?;
        self.ensure_user(target)?;

        let _guard = self.lock();
        if let Some(existing) = self.relationships.find_active_between(actor, target)? {
            return self.block_existing(existing, actor);
        }

        let now = self.clock.now();
        let relationship = Relationship {
            id: Uuid::new_v4(),
            requester_id: actor,
            receiver_id: target,
            status: RelationshipStatus::Blocked,
            blocked_by: Some(actor),
            created_at: now,
            updated_at: now,
        };
        self.relationships.create(&relationship)?;

        info!("User {} blocked {} (relationship {})", actor, target, relationship.id);
        Ok(relationship)
    }

    /// Either party may remove, except that only the blocker may lift a block.
    /// Removal frees the pair for a new request.
    pub fn remove(&self, id: Uuid, actor: Uuid) -> Result<Relationship> {
        let _guard = self.lock();
        let mut relationship = self.load(id)?;
        authorize(&relationship, actor, Role::Either, "remove")?;

        if relationship.status == RelationshipStatus::Blocked && relationship.blocked_by != Some(actor) {
            warn!("User {} tried to lift a block placed by the other party on {}", actor, id);
            return Err(DomainError::forbidden("only the blocking user may lift a block"));
        }

        relationship.blocked_by = None;
        self.apply(relationship, RelationshipStatus::Removed)
    }

    /// Visible to either party while not removed.
    pub fn get(&self, id: Uuid, actor: Uuid) -> Result<Relationship> {
        let relationship = self.load(id)?;
        authorize(&relationship, actor, Role::Either, "view")?;
        Ok(relationship)
    }

    fn summary_of(&self, user_id: Uuid) -> Result<Option<UserSummary>> {
        match self.users.find_by_id(user_id) {
            Ok(user) => Ok(Some(user.summary())),
            Err(StoreError::NotFound(_)) => {
                warn!("Relationship references missing user {}", user_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Accepted relationships of `user_id`, most recent friendship first.
    pub fn list_friends(&self, user_id: Uuid) -> Result<Vec<Friend>> {
        let mut friends = Vec::new();
        for relationship in self.relationships.list_for_user(user_id)? {
            if relationship.status != RelationshipStatus::Accepted {
                continue;
            }
            let Some(other) = relationship.counterpart(user_id) else {
                continue;
            };
            if let Some(user) = self.summary_of(other)? {
                friends.push(Friend {
                    relationship_id: relationship.id,
                    user,
                    since: relationship.updated_at,
                });
            }
        }
        friends.sort_by(|a, b| b.since.cmp(&a.since));
        Ok(friends)
    }

    /// Pending requests `user_id` sent or received.
    pub fn list_friend_requests(
        &self,
        user_id: Uuid,
        direction: RequestDirection,
    ) -> Result<Vec<FriendRequest>> {
        let mut requests = Vec::new();
        for relationship in self.relationships.list_for_user(user_id)? {
            if relationship.status != RelationshipStatus::Pending {
                continue;
            }
            let matches = match direction {
                RequestDirection::Sent => relationship.requester_id == user_id,
                RequestDirection::Received => relationship.receiver_id == user_id,
            };
            if !matches {
                continue;
            }
            let other = match direction {
                RequestDirection::Sent => relationship.receiver_id,
                RequestDirection::Received => relationship.requester_id,
            };
            if let Some(counterpart) = self.summary_of(other)? {
                requests.push(FriendRequest {
                    relationship,
                    counterpart,
                });
            }
        }
        Ok(requests)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use rouse_db::memory::{MemoryRelationshipRepository, MemoryUserRepository};
    use rouse_types::clock::ManualClock;
    use rouse_types::models::User;

    pub(crate) struct Fixture {
        pub users: Arc<MemoryUserRepository>,
        pub relationships: Arc<MemoryRelationshipRepository>,
        pub clock: Arc<ManualClock>,
        pub service: RelationshipService,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let users = Arc::new(MemoryUserRepository::new());
            let relationships = Arc::new(MemoryRelationshipRepository::new());
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let service = RelationshipService::new(users.clone(), relationships.clone(), clock.clone());
            Self {
                users,
                relationships,
                clock,
                service,
            }
        }

        pub(crate) fn user(&self, name: &str) -> Uuid {
            let now = self.clock.now();
            let user = User {
                id: Uuid::new_v4(),
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: "$argon2id$stub".to_string(),
                created_at: now,
                updated_at: now,
            };
            self.users.create(&user).unwrap();
            user.id
        }

        pub(crate) fn friends(&self, a: Uuid, b: Uuid) -> Relationship {
            let request = self.service.send(a, b).unwrap();
            self.service.accept(request.id, b).unwrap()
        }
    }

    #[test]
    fn send_creates_pending() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));

        let rel = fx.service.send(a, b).unwrap();
        assert_eq!(rel.status, RelationshipStatus::Pending);
        assert_eq!(rel.requester_id, a);
        assert_eq!(rel.receiver_id, b);
    }

    #[test]
    fn send_to_self_is_rejected() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        assert!(matches!(fx.service.send(a, a), Err(DomainError::SelfReference)));
    }

    #[test]
    fn send_to_unknown_user_is_not_found() {
        let fx = Fixture::new();
        let a = fx.user("alice");
        assert!(matches!(
            fx.service.send(a, Uuid::new_v4()),
            Err(DomainError::NotFound("user"))
        ));
    }

    #[test]
    fn second_request_in_either_direction_fails() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        fx.service.send(a, b).unwrap();

        assert!(matches!(fx.service.send(a, b), Err(DomainError::AlreadyExists(_))));
        assert!(matches!(fx.service.send(b, a), Err(DomainError::AlreadyExists(_))));
    }

    #[test]
    fn only_receiver_may_accept_or_reject() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("alice"), fx.user("bob"), fx.user("carol"));
        let rel = fx.service.send(a, b).unwrap();

        assert!(matches!(fx.service.accept(rel.id, a), Err(DomainError::Forbidden(_))));
        assert!(matches!(fx.service.reject(rel.id, a), Err(DomainError::Forbidden(_))));
        assert!(matches!(fx.service.accept(rel.id, c), Err(DomainError::Forbidden(_))));

        let accepted = fx.service.accept(rel.id, b).unwrap();
        assert_eq!(accepted.status, RelationshipStatus::Accepted);
    }

    #[test]
    fn resolved_request_cannot_be_accepted_again() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let rel = fx.service.send(a, b).unwrap();
        fx.service.reject(rel.id, b).unwrap();

        assert!(matches!(fx.service.accept(rel.id, b), Err(DomainError::NotFound(_))));
        assert!(matches!(fx.service.accept(Uuid::new_v4(), b), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn rejected_request_frees_the_pair() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let rel = fx.service.send(a, b).unwrap();
        fx.service.reject(rel.id, b).unwrap();

        let again = fx.service.send(a, b).unwrap();
        assert_ne!(again.id, rel.id);
    }

    #[test]
    fn block_pending_request_suppresses_new_requests() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let pending = fx.service.send(b, a).unwrap();

        let blocked = fx.service.block_user(a, b).unwrap();
        assert_eq!(blocked.id, pending.id);
        assert_eq!(blocked.status, RelationshipStatus::Blocked);
        assert_eq!(blocked.blocked_by, Some(a));

        assert!(matches!(fx.service.send(b, a), Err(DomainError::AlreadyExists(_))));
        assert!(matches!(fx.service.send(a, b), Err(DomainError::AlreadyExists(_))));
    }

    #[test]
    fn block_without_relationship_creates_one() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let blocked = fx.service.block_user(a, b).unwrap();

        assert_eq!(blocked.status, RelationshipStatus::Blocked);
        assert_eq!(blocked.requester_id, a);
        assert!(matches!(fx.service.send(b, a), Err(DomainError::AlreadyExists(_))));
    }

    #[test]
    fn blocking_twice_is_an_invalid_transition() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let blocked = fx.service.block_user(a, b).unwrap();

        assert!(matches!(
            fx.service.block(blocked.id, b),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn only_blocker_may_lift_block() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let rel = fx.friends(a, b);
        fx.service.block(rel.id, b).unwrap();

        assert!(matches!(fx.service.remove(rel.id, a), Err(DomainError::Forbidden(_))));

        let removed = fx.service.remove(rel.id, b).unwrap();
        assert_eq!(removed.status, RelationshipStatus::Removed);
        assert_eq!(removed.blocked_by, None);

        // The pair is free again.
        fx.service.send(a, b).unwrap();
    }

    #[test]
    fn removed_relationship_is_hidden() {
        let fx = Fixture::new();
        let (a, b) = (fx.user("alice"), fx.user("bob"));
        let rel = fx.friends(a, b);
        fx.service.remove(rel.id, a).unwrap();

        assert!(matches!(fx.service.get(rel.id, a), Err(DomainError::NotFound(_))));
        assert!(matches!(fx.service.remove(rel.id, a), Err(DomainError::NotFound(_))));
        assert!(fx.service.list_friends(a).unwrap().is_empty());
        // still stored for audit
        assert_eq!(
            fx.relationships.find_by_id(rel.id).unwrap().status,
            RelationshipStatus::Removed
        );
    }

    #[test]
    fn outsiders_cannot_view_or_remove() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("alice"), fx.user("bob"), fx.user("carol"));
        let rel = fx.service.send(a, b).unwrap();

        assert!(matches!(fx.service.get(rel.id, c), Err(DomainError::Forbidden(_))));
        assert!(matches!(fx.service.remove(rel.id, c), Err(DomainError::Forbidden(_))));
        assert!(matches!(fx.service.block(rel.id, c), Err(DomainError::Forbidden(_))));
    }

    #[test]
    fn friends_listed_from_both_sides_with_acceptance_time() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("alice"), fx.user("bob"), fx.user("carol"));
        let request = fx.service.send(a, b).unwrap();
        fx.clock.advance(Duration::hours(2));
        let accepted = fx.service.accept(request.id, b).unwrap();
        fx.service.send(a, c).unwrap();

        let alice_friends = fx.service.list_friends(a).unwrap();
        assert_eq!(alice_friends.len(), 1);
        assert_eq!(alice_friends[0].user.username, "bob");
        assert_eq!(alice_friends[0].since, accepted.updated_at);
        assert_ne!(alice_friends[0].since, request.created_at);

        let bob_friends = fx.service.list_friends(b).unwrap();
        assert_eq!(bob_friends[0].user.id, a);
        assert!(fx.relationships.are_friends(b, a).unwrap());
        assert!(!fx.relationships.are_friends(a, c).unwrap());
    }

    #[test]
    fn friend_requests_filtered_by_direction() {
        let fx = Fixture::new();
        let (a, b, c) = (fx.user("alice"), fx.user("bob"), fx.user("carol"));
        fx.service.send(a, b).unwrap();
        fx.service.send(c, a).unwrap();

        let sent = fx.service.list_friend_requests(a, RequestDirection::Sent).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].counterpart.username, "bob");

        let received = fx.service.list_friend_requests(a, RequestDirection::Received).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].counterpart.username, "carol");

        assert!(fx.service.list_friend_requests(b, RequestDirection::Sent).unwrap().is_empty());
    }

    #[test]
    fn concurrent_sends_leave_one_active_relationship() {
        let fx = Arc::new(Fixture::new());
        let (a, b) = (fx.user("alice"), fx.user("bob"));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let fx = fx.clone();
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        fx.service.send(a, b).is_ok()
                    } else {
                        fx.service.send(b, a).is_ok()
                    }
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(fx.relationships.list_all().unwrap().len(), 1);
    }
}
