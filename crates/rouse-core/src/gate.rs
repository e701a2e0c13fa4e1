//! Authorization rules applied uniformly by both state machines.

use rouse_types::error::{DomainError, Result};
use rouse_types::models::{MorningCall, Relationship, Transition};
use tracing::warn;
use uuid::Uuid;

/// An entity linking an initiating user to a target user.
pub trait TwoParty {
    const KIND: &'static str;
    const INITIATOR: &'static str;
    const TARGET: &'static str;

    fn id(&self) -> Uuid;
    fn initiator(&self) -> Uuid;
    fn target(&self) -> Uuid;
}

impl TwoParty for Relationship {
    const KIND: &'static str = "relationship";
    const INITIATOR: &'static str = "requester";
    const TARGET: &'static str = "receiver";

    fn id(&self) -> Uuid {
        self.id
    }

    fn initiator(&self) -> Uuid {
        self.requester_id
    }

    fn target(&self) -> Uuid {
        self.receiver_id
    }
}

impl TwoParty for MorningCall {
    const KIND: &'static str = "morning call";
    const INITIATOR: &'static str = "sender";
    const TARGET: &'static str = "receiver";

    fn id(&self) -> Uuid {
        self.id
    }

    fn initiator(&self) -> Uuid {
        self.sender_id
    }

    fn target(&self) -> Uuid {
        self.receiver_id
    }
}

/// Which side of the entity an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Target,
    Either,
}

impl Role {
    fn describe<E: TwoParty>(self) -> &'static str {
        match self {
            Role::Initiator => E::INITIATOR,
            Role::Target => E::TARGET,
            Role::Either => "participants",
        }
    }
}

/// The role `actor` plays on `entity`, if any.
pub fn role_of<E: TwoParty>(entity: &E, actor: Uuid) -> Option<Role> {
    if actor == entity.initiator() {
        Some(Role::Initiator)
    } else if actor == entity.target() {
        Some(Role::Target)
    } else {
        None
    }
}

/// `Forbidden` unless `actor` holds `required` on `entity`.
pub fn authorize<E: TwoParty>(entity: &E, actor: Uuid, required: Role, action: &str) -> Result<()> {
    let allowed = match (required, role_of(entity, actor)) {
        (Role::Either, Some(_)) => true,
        (required, Some(held)) => required == held,
        (_, None) => false,
    };

    if allowed {
        Ok(())
    } else {
        warn!(
            "User {} denied '{}' on {} {}",
            actor,
            action,
            E::KIND,
            entity.id()
        );
        Err(DomainError::forbidden(format!(
            "only the {} may {} this {}",
            required.describe::<E>(),
            action,
            E::KIND
        )))
    }
}

/// `SelfReference` when both ends are the same user.
pub fn ensure_distinct(a: Uuid, b: Uuid) -> Result<()> {
    if a == b {
        Err(DomainError::SelfReference)
    } else {
        Ok(())
    }
}

/// Consult the status table; `InvalidTransition` when `from -> to` is not listed.
pub fn check_transition<S: Transition>(from: S, to: S) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(DomainError::invalid_transition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rouse_types::models::{MorningCallStatus, RelationshipStatus};

    fn call(sender: Uuid, receiver: Uuid) -> MorningCall {
        let now = Utc::now();
        MorningCall {
            id: Uuid::new_v4(),
            sender_id: sender,
            receiver_id: receiver,
            scheduled_time: now,
            message: String::new(),
            status: MorningCallStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn roles_are_resolved_per_side() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let c = call(a, b);
        assert_eq!(role_of(&c, a), Some(Role::Initiator));
        assert_eq!(role_of(&c, b), Some(Role::Target));
        assert_eq!(role_of(&c, Uuid::new_v4()), None);
    }

    #[test]
    fn authorize_enforces_role() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let c = call(a, b);

        assert!(authorize(&c, a, Role::Initiator, "cancel").is_ok());
        assert!(authorize(&c, b, Role::Target, "confirm").is_ok());
        assert!(authorize(&c, b, Role::Either, "view").is_ok());

        let err = authorize(&c, b, Role::Initiator, "cancel").unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(err.to_string(), "forbidden: only the sender may cancel this morning call");

        assert!(matches!(
            authorize(&c, Uuid::new_v4(), Role::Either, "view"),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn distinct_and_transition_checks() {
        let a = Uuid::new_v4();
        assert!(matches!(ensure_distinct(a, a), Err(DomainError::SelfReference)));
        assert!(ensure_distinct(a, Uuid::new_v4()).is_ok());

        assert!(check_transition(RelationshipStatus::Pending, RelationshipStatus::Accepted).is_ok());
        assert!(matches!(
            check_transition(MorningCallStatus::Confirmed, MorningCallStatus::Confirmed),
            Err(DomainError::InvalidTransition { .. })
        ));
    }
}
