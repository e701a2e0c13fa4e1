use std::sync::Arc;
use std::time::Duration;

use rouse_types::models::MorningCall;
use rouse_types::task::PeriodicTask;
use tracing::{info, warn};

use crate::morning_calls::MorningCallService;

/// Receives calls the moment they become due. Delivery transport (push,
/// websocket, SMS) lives behind this seam.
pub trait Notifier: Send + Sync {
    fn morning_call_due(&self, call: &MorningCall);
}

/// Notifier that only records the delivery in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn morning_call_due(&self, call: &MorningCall) {
        info!(
            "Wake-up call {} for user {} from {}: {:?}",
            call.id, call.receiver_id, call.sender_id, call.message
        );
    }
}

/// Background task that delivers due calls and expires unconfirmed ones.
pub fn spawn_delivery(
    service: Arc<MorningCallService>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
) -> PeriodicTask {
    PeriodicTask::spawn("delivery-sweep", interval, move || {
        let service = service.clone();
        let notifier = notifier.clone();
        async move {
            // Repositories may block (SQLite), so keep the sweep off the async workers.
            let outcome =
                tokio::task::spawn_blocking(move || service.sweep(notifier.as_ref())).await;

            match outcome {
                Ok(Ok(report)) => {
                    if report.delivered > 0 || report.expired > 0 {
                        info!(
                            "Delivery: {} delivered, {} expired",
                            report.delivered, report.expired
                        );
                    }
                }
                Ok(Err(e)) => warn!("Delivery sweep error: {}", e),
                Err(e) => warn!("Delivery sweep join error: {}", e),
            }
        }
    })
}
