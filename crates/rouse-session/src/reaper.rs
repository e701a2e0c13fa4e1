use std::time::Duration;

use rouse_types::task::PeriodicTask;
use tracing::info;

use crate::SessionStore;

/// Background task that prunes expired sessions.
///
/// Runs independently of request traffic; stop it with `PeriodicTask::shutdown`.
pub fn spawn_reaper(store: SessionStore, interval: Duration) -> PeriodicTask {
    PeriodicTask::spawn("session-reaper", interval, move || {
        let store = store.clone();
        async move {
            let count = store.purge_expired().await;
            if count > 0 {
                info!("Reaper: pruned {} expired sessions", count);
            }
        }
    })
}
