//! Relationship and morning call state machines.
//!
//! Every mutating operation takes the acting user's id (already resolved from
//! a session), checks it against the gate rules for the entity's current
//! state, and persists through the entity's repository.

pub mod delivery;
pub mod gate;
pub mod morning_calls;
pub mod relationships;

pub use delivery::{LogNotifier, Notifier};
pub use morning_calls::{MorningCallChanges, MorningCallService, SweepReport};
pub use relationships::{Friend, FriendRequest, RelationshipService};
