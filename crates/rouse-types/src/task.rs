use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to a background loop that runs `tick` once per period until stopped.
///
/// The first pass happens one full period after spawn, not immediately.
pub struct PeriodicTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately on the first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => tick().await,
                }
            }
            debug!("{} stopped", name);
        });

        debug!("{} started, period {:?}", name, period);
        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop to stop and wait for it. An in-flight tick completes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("{} ended abnormally: {}", self.name, e);
        }
    }
}
