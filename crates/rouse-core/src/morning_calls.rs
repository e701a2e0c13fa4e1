use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use rouse_db::{MorningCallRepository, RelationshipRepository, UserRepository};
use rouse_types::clock::Clock;
use rouse_types::error::{DomainError, Result};
use rouse_types::models::{
    MAX_MESSAGE_CHARS, MAX_SCHEDULE_AHEAD_DAYS, MorningCall, MorningCallStatus,
};

use crate::delivery::Notifier;
use crate::gate::{Role, authorize, check_transition, ensure_distinct};

/// `now < scheduled_time <= now + 30 days`.
pub fn validate_schedule(scheduled_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if scheduled_time <= now {
        return Err(DomainError::InvalidSchedule(
            "scheduled time must be in the future".into(),
        ));
    }
    if scheduled_time > now + Duration::days(MAX_SCHEDULE_AHEAD_DAYS) {
        return Err(DomainError::InvalidSchedule(format!(
            "scheduled time must be at most {} days ahead",
            MAX_SCHEDULE_AHEAD_DAYS
        )));
    }
    Ok(())
}

/// Length is counted in Unicode scalar values, not bytes.
pub fn validate_message(message: &str) -> Result<()> {
    let len = message.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(DomainError::MessageTooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(())
}

/// Fields a sender may edit while the call is still scheduled.
#[derive(Debug, Clone, Default)]
pub struct MorningCallChanges {
    pub scheduled_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl MorningCallChanges {
    pub fn is_empty(&self) -> bool {
        self.scheduled_time.is_none() && self.message.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub delivered: usize,
    pub expired: usize,
}

/// Morning call lifecycle, gated on an accepted relationship between sender
/// and receiver at creation time.
pub struct MorningCallService {
    users: Arc<dyn UserRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    calls: Arc<dyn MorningCallRepository>,
    clock: Arc<dyn Clock>,
    /// How long after `scheduled_time` the receiver may still confirm.
    confirm_window: Duration,
    /// Serializes read-check-write sequences on morning calls.
    write_lock: Mutex<()>,
}

impl MorningCallService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        relationships: Arc<dyn RelationshipRepository>,
        calls: Arc<dyn MorningCallRepository>,
        clock: Arc<dyn Clock>,
        confirm_window: Duration,
    ) -> Self {
        Self {
            users,
            relationships,
            calls,
            clock,
            confirm_window,
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Past `scheduled_time + confirm_window` a call can no longer be confirmed.
    fn window_closed(&self, call: &MorningCall, now: DateTime<Utc>) -> bool {
        now >= call.scheduled_time + self.confirm_window
    }

    fn set_status(&self, call: &mut MorningCall, next: MorningCallStatus, now: DateTime<Utc>) -> Result<()> {
        check_transition(call.status, next)?;
        let previous = call.status;
        call.status = next;
        call.updated_at = now;
        info!("Morning call {} {} -> {}", call.id, previous, next);
        Ok(())
    }

    pub fn create(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        scheduled_time: DateTime<Utc>,
        message: String,
    ) -> Result<MorningCall> {
        ensure_distinct(sender_id, receiver_id)?;
        if !self.users.exists(receiver_id)? {
            return Err(DomainError::NotFound("user"));
        }

        if !self.relationships.are_friends(sender_id, receiver_id)? {
            return Err(DomainError::forbidden(
                "morning calls can only be sent to friends",
            ));
        }

        let now = self.clock.now();
        validate_schedule(scheduled_time, now)?;
        validate_message(&message)?;

        let call = MorningCall {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            scheduled_time,
            message,
            status: MorningCallStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };

        let _guard = self.lock();
        self.calls.create(&call)?;

        info!(
            "Morning call {} scheduled by {} for {} at {}",
            call.id, sender_id, receiver_id, scheduled_time
        );
        Ok(call)
    }

    /// All-or-nothing edit: every supplied field is validated before any is applied.
    pub fn update(&self, id: Uuid, actor: Uuid, changes: MorningCallChanges) -> Result<MorningCall> {
        if changes.is_empty() {
            return Err(DomainError::InvalidInput("nothing to update".into()));
        }

        let _guard = self.lock();
        let mut call = self.calls.find_by_id(id)?;
        authorize(&call, actor, Role::Initiator, "edit")?;
        if call.status != MorningCallStatus::Scheduled {
            return Err(DomainError::InvalidTransition {
                from: call.status.to_string(),
                to: "edited".into(),
            });
        }

        let now = self.clock.now();
        if let Some(time) = changes.scheduled_time {
            validate_schedule(time, now)?;
        }
        if let Some(message) = changes.message.as_deref() {
            validate_message(message)?;
        }

        if let Some(time) = changes.scheduled_time {
            call.scheduled_time = time;
        }
        if let Some(message) = changes.message {
            call.message = message;
        }
        call.updated_at = now;
        self.calls.update(&call)?;

        info!("Morning call {} updated by {}", id, actor);
        Ok(call)
    }

    pub fn cancel(&self, id: Uuid, actor: Uuid) -> Result<MorningCall> {
        let _guard = self.lock();
        let mut call = self.calls.find_by_id(id)?;
        authorize(&call, actor, Role::Initiator, "cancel")?;

        self.set_status(&mut call, MorningCallStatus::Cancelled, self.clock.now())?;
        self.calls.update(&call)?;
        Ok(call)
    }

    /// Receiver confirms being awake. Allowed from the scheduled time until the
    /// confirmation window closes: a due scheduled call walks
    /// `scheduled -> delivered -> confirmed` in one step. Confirming early or
    /// late is refused.
    pub fn confirm_wake(&self, id: Uuid, actor: Uuid) -> Result<MorningCall> {
        let _guard = self.lock();
        let mut call = self.calls.find_by_id(id)?;
        authorize(&call, actor, Role::Target, "confirm")?;

        let now = self.clock.now();
        let open = matches!(
            call.status,
            MorningCallStatus::Scheduled | MorningCallStatus::Delivered
        );
        if open && self.window_closed(&call, now) {
            debug!("Morning call {} confirmed after its window closed", id);
            return Err(DomainError::invalid_transition(
                format!("{} (confirmation window closed)", call.status),
                MorningCallStatus::Confirmed,
            ));
        }
        if call.status == MorningCallStatus::Scheduled {
            if !call.should_deliver(now) {
                debug!("Morning call {} confirmed before it was due", id);
                return Err(DomainError::invalid_transition(
                    "scheduled (not yet due)",
                    MorningCallStatus::Confirmed,
                ));
            }
            self.set_status(&mut call, MorningCallStatus::Delivered, now)?;
        }
        self.set_status(&mut call, MorningCallStatus::Confirmed, now)?;
        self.calls.update(&call)?;
        Ok(call)
    }

    /// Physical removal, sender only, in any status.
    pub fn delete(&self, id: Uuid, actor: Uuid) -> Result<()> {
        let _guard = self.lock();
        let call = self.calls.find_by_id(id)?;
        authorize(&call, actor, Role::Initiator, "delete")?;
        self.calls.delete(id)?;

        info!("Morning call {} deleted by {}", id, actor);
        Ok(())
    }

    pub fn get(&self, id: Uuid, actor: Uuid) -> Result<MorningCall> {
        let call = self.calls.find_by_id(id)?;
        authorize(&call, actor, Role::Either, "view")?;
        Ok(call)
    }

    pub fn list_sent(&self, user_id: Uuid) -> Result<Vec<MorningCall>> {
        Ok(self.calls.list_by_sender(user_id)?)
    }

    pub fn list_received(&self, user_id: Uuid) -> Result<Vec<MorningCall>> {
        Ok(self.calls.list_by_receiver(user_id)?)
    }

    /// One delivery pass. Due scheduled calls are delivered and handed to
    /// `notifier`; calls left unconfirmed past `scheduled_time + confirm_window`
    /// expire, whether or not they were delivered.
    pub fn sweep(&self, notifier: &dyn Notifier) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let _guard = self.lock();
        let mut pending = self.calls.list_by_status(MorningCallStatus::Scheduled)?;
        pending.extend(self.calls.list_by_status(MorningCallStatus::Delivered)?);

        for mut call in pending {
            let next = if self.window_closed(&call, now) {
                MorningCallStatus::Expired
            } else if call.should_deliver(now) {
                MorningCallStatus::Delivered
            } else {
                continue;
            };

            self.set_status(&mut call, next, now)?;
            self.calls.update(&call)?;

            if next == MorningCallStatus::Delivered {
                notifier.morning_call_due(&call);
                report.delivered += 1;
            } else {
                report.expired += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use rouse_db::memory::MemoryMorningCallRepository;

    use crate::relationships::tests::Fixture;

    fn window() -> Duration {
        Duration::minutes(30)
    }

    struct Harness {
        fx: Fixture,
        calls: Arc<MemoryMorningCallRepository>,
        service: MorningCallService,
        alice: Uuid,
        bob: Uuid,
    }

    /// Alice and Bob are friends; Carol knows nobody.
    fn harness() -> Harness {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        fx.friends(alice, bob);

        let calls = Arc::new(MemoryMorningCallRepository::new());
        let service = MorningCallService::new(
            fx.users.clone(),
            fx.relationships.clone(),
            calls.clone(),
            fx.clock.clone(),
            window(),
        );
        Harness {
            fx,
            calls,
            service,
            alice,
            bob,
        }
    }

    impl Harness {
        fn now(&self) -> DateTime<Utc> {
            self.fx.clock.now()
        }

        fn schedule(&self, ahead: Duration) -> MorningCall {
            self.service
                .create(self.alice, self.bob, self.now() + ahead, "good morning".into())
                .unwrap()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: StdMutex<Vec<Uuid>>,
    }

    impl Notifier for RecordingNotifier {
        fn morning_call_due(&self, call: &MorningCall) {
            self.seen.lock().unwrap().push(call.id);
        }
    }

    #[test]
    fn create_between_friends_is_scheduled() {
        let h = harness();
        let call = h.service
            .create(h.alice, h.bob, h.now() + Duration::days(29), "0123456789".into())
            .unwrap();
        assert_eq!(call.status, MorningCallStatus::Scheduled);
        assert_eq!(call.message.chars().count(), 10);
    }

    #[test]
    fn create_requires_accepted_relationship() {
        let h = harness();
        let carol = h.fx.user("carol");
        assert!(matches!(
            h.service.create(h.alice, carol, h.now() + Duration::hours(8), String::new()),
            Err(DomainError::Forbidden(_))
        ));

        // a pending request is not enough
        h.fx.service.send(h.alice, carol).unwrap();
        assert!(matches!(
            h.service.create(h.alice, carol, h.now() + Duration::hours(8), String::new()),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn create_is_order_independent_on_friendship() {
        let h = harness();
        // bob received the request, alice sent it; both directions may schedule
        let call = h.service
            .create(h.bob, h.alice, h.now() + Duration::hours(8), String::new())
            .unwrap();
        assert_eq!(call.sender_id, h.bob);
    }

    #[test]
    fn create_to_self_or_unknown_user() {
        let h = harness();
        assert!(matches!(
            h.service.create(h.alice, h.alice, h.now() + Duration::hours(1), String::new()),
            Err(DomainError::SelfReference)
        ));
        assert!(matches!(
            h.service.create(h.alice, Uuid::new_v4(), h.now() + Duration::hours(1), String::new()),
            Err(DomainError::NotFound("user"))
        ));
    }

    #[test]
    fn schedule_window_edges() {
        let h = harness();
        let now = h.now();
        let create = |t| h.service.create(h.alice, h.bob, t, String::new());

        assert!(matches!(create(now - Duration::seconds(1)), Err(DomainError::InvalidSchedule(_))));
        assert!(matches!(create(now), Err(DomainError::InvalidSchedule(_))));
        assert!(create(now + Duration::days(30)).is_ok());
        assert!(matches!(
            create(now + Duration::days(30) + Duration::seconds(1)),
            Err(DomainError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn message_limit_counts_scalar_values() {
        let h = harness();
        let at = h.now() + Duration::hours(8);

        let exactly = "☀".repeat(MAX_MESSAGE_CHARS);
        assert!(exactly.len() > MAX_MESSAGE_CHARS);
        assert!(h.service.create(h.alice, h.bob, at, exactly).is_ok());

        let too_long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            h.service.create(h.alice, h.bob, at, too_long),
            Err(DomainError::MessageTooLong { len: 501, max: 500 })
        ));
    }

    #[test]
    fn update_is_all_or_nothing() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.clock.advance(Duration::minutes(5));

        let result = h.service.update(
            call.id,
            h.alice,
            MorningCallChanges {
                scheduled_time: Some(h.now() + Duration::hours(9)),
                message: Some("x".repeat(501)),
            },
        );
        assert!(matches!(result, Err(DomainError::MessageTooLong { .. })));

        let stored = h.calls.find_by_id(call.id).unwrap();
        assert_eq!(stored, call);
        assert_eq!(stored.updated_at, call.updated_at);
    }

    #[test]
    fn update_rejects_bad_time_without_touching_message() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));

        let result = h.service.update(
            call.id,
            h.alice,
            MorningCallChanges {
                scheduled_time: Some(h.now() - Duration::minutes(1)),
                message: Some("new text".into()),
            },
        );
        assert!(matches!(result, Err(DomainError::InvalidSchedule(_))));
        assert_eq!(h.calls.find_by_id(call.id).unwrap().message, "good morning");
    }

    #[test]
    fn update_applies_both_fields() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.clock.advance(Duration::minutes(1));
        let new_time = h.now() + Duration::hours(10);

        let updated = h.service
            .update(
                call.id,
                h.alice,
                MorningCallChanges {
                    scheduled_time: Some(new_time),
                    message: Some("rise and shine".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.scheduled_time, new_time);
        assert_eq!(updated.message, "rise and shine");
        assert_eq!(updated.updated_at, h.now());
    }

    #[test]
    fn update_guards() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        let edit = || MorningCallChanges {
            message: Some("hi".into()),
            ..Default::default()
        };

        assert!(matches!(
            h.service.update(call.id, h.bob, edit()),
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            h.service.update(call.id, h.alice, MorningCallChanges::default()),
            Err(DomainError::InvalidInput(_))
        ));

        h.service.cancel(call.id, h.alice).unwrap();
        assert!(matches!(
            h.service.update(call.id, h.alice, edit()),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cancel_is_sender_only_and_once() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));

        assert!(matches!(h.service.cancel(call.id, h.bob), Err(DomainError::Forbidden(_))));
        assert_eq!(
            h.service.cancel(call.id, h.alice).unwrap().status,
            MorningCallStatus::Cancelled
        );
        assert!(matches!(
            h.service.cancel(call.id, h.alice),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn confirm_before_due_is_refused() {
        let h = harness();
        let call = h.schedule(Duration::hours(20));

        assert!(matches!(
            h.service.confirm_wake(call.id, h.bob),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(
            h.calls.find_by_id(call.id).unwrap().status,
            MorningCallStatus::Scheduled
        );
    }

    #[test]
    fn confirm_due_scheduled_call() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.clock.advance(Duration::hours(8));

        let confirmed = h.service.confirm_wake(call.id, h.bob).unwrap();
        assert_eq!(confirmed.status, MorningCallStatus::Confirmed);
    }

    #[test]
    fn confirm_closes_with_the_window() {
        let h = harness();
        let inside = h.schedule(Duration::hours(1));
        let outside = h.schedule(Duration::hours(1));
        h.fx.clock.advance(Duration::hours(1) + window() - Duration::seconds(1));

        let confirmed = h.service.confirm_wake(inside.id, h.bob).unwrap();
        assert_eq!(confirmed.status, MorningCallStatus::Confirmed);

        h.fx.clock.advance(Duration::seconds(1));
        assert!(matches!(
            h.service.confirm_wake(outside.id, h.bob),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(
            h.calls.find_by_id(outside.id).unwrap().status,
            MorningCallStatus::Scheduled
        );
    }

    #[test]
    fn late_confirm_refused_without_a_sweep() {
        let h = harness();
        let call = h.schedule(Duration::hours(1));
        h.fx.clock.advance(Duration::hours(1));
        h.service.sweep(&RecordingNotifier::default()).unwrap();
        assert_eq!(
            h.calls.find_by_id(call.id).unwrap().status,
            MorningCallStatus::Delivered
        );

        h.fx.clock.advance(Duration::days(3));
        assert!(matches!(
            h.service.confirm_wake(call.id, h.bob),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn confirm_is_receiver_only() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.clock.advance(Duration::hours(9));

        assert!(matches!(
            h.service.confirm_wake(call.id, h.alice),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn confirmed_call_is_terminal() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.clock.advance(Duration::hours(8));
        h.service.confirm_wake(call.id, h.bob).unwrap();

        assert!(matches!(
            h.service.confirm_wake(call.id, h.bob),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.service.cancel(call.id, h.alice),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn delete_is_sender_only_in_any_status() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.clock.advance(Duration::hours(8));
        h.service.confirm_wake(call.id, h.bob).unwrap();

        assert!(matches!(h.service.delete(call.id, h.bob), Err(DomainError::Forbidden(_))));
        h.service.delete(call.id, h.alice).unwrap();
        assert!(matches!(
            h.service.get(call.id, h.alice),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn get_and_lists_respect_roles() {
        let h = harness();
        let carol = h.fx.user("carol");
        let call = h.schedule(Duration::hours(8));

        assert_eq!(h.service.get(call.id, h.bob).unwrap().id, call.id);
        assert!(matches!(h.service.get(call.id, carol), Err(DomainError::Forbidden(_))));

        assert_eq!(h.service.list_sent(h.alice).unwrap().len(), 1);
        assert!(h.service.list_sent(h.bob).unwrap().is_empty());
        assert_eq!(h.service.list_received(h.bob).unwrap().len(), 1);
    }

    #[test]
    fn block_does_not_cancel_existing_calls() {
        let h = harness();
        let call = h.schedule(Duration::hours(8));
        h.fx.service.block_user(h.bob, h.alice).unwrap();

        assert_eq!(
            h.calls.find_by_id(call.id).unwrap().status,
            MorningCallStatus::Scheduled
        );
        assert!(matches!(
            h.service.create(h.alice, h.bob, h.now() + Duration::hours(9), String::new()),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn sweep_delivers_then_expires() {
        let h = harness();
        let early = h.schedule(Duration::hours(1));
        let later = h.schedule(Duration::hours(5));
        let notifier = RecordingNotifier::default();

        h.fx.clock.advance(Duration::hours(1));
        let report = h.service.sweep(&notifier).unwrap();
        assert_eq!(report, SweepReport { delivered: 1, expired: 0 });
        assert_eq!(*notifier.seen.lock().unwrap(), vec![early.id]);
        assert_eq!(
            h.calls.find_by_id(later.id).unwrap().status,
            MorningCallStatus::Scheduled
        );

        h.fx.clock.advance(Duration::minutes(30));
        let report = h.service.sweep(&notifier).unwrap();
        assert_eq!(report, SweepReport { delivered: 0, expired: 1 });
        assert_eq!(
            h.calls.find_by_id(early.id).unwrap().status,
            MorningCallStatus::Expired
        );
    }

    #[test]
    fn delivered_call_can_be_confirmed_within_window() {
        let h = harness();
        let call = h.schedule(Duration::hours(1));
        let notifier = RecordingNotifier::default();

        h.fx.clock.advance(Duration::hours(1));
        h.service.sweep(&notifier).unwrap();
        h.fx.clock.advance(Duration::minutes(10));

        let confirmed = h.service.confirm_wake(call.id, h.bob).unwrap();
        assert_eq!(confirmed.status, MorningCallStatus::Confirmed);

        h.fx.clock.advance(Duration::hours(1));
        let report = h.service.sweep(&notifier).unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn missed_scheduled_call_expires_without_delivery() {
        let h = harness();
        let call = h.schedule(Duration::hours(1));
        let notifier = RecordingNotifier::default();

        h.fx.clock.advance(Duration::hours(3));
        let report = h.service.sweep(&notifier).unwrap();
        assert_eq!(report, SweepReport { delivered: 0, expired: 1 });
        assert!(notifier.seen.lock().unwrap().is_empty());
        assert_eq!(
            h.calls.find_by_id(call.id).unwrap().status,
            MorningCallStatus::Expired
        );
    }

    #[test]
    fn concurrent_updates_do_not_interleave() {
        let h = Arc::new(harness());
        let call = h.schedule(Duration::hours(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let h = h.clone();
                std::thread::spawn(move || {
                    let text = format!("{}", i).repeat(20);
                    h.service
                        .update(
                            call.id,
                            h.alice,
                            MorningCallChanges {
                                scheduled_time: Some(h.now() + Duration::hours(i + 1)),
                                message: Some(text),
                            },
                        )
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whichever update landed last, its time and message belong together.
        let stored = h.calls.find_by_id(call.id).unwrap();
        let digit: i64 = stored.message[..1].parse().unwrap();
        assert_eq!(stored.scheduled_time, h.now() + Duration::hours(digit + 1));
    }
}
