//! Periodic maintenance loops (spec §4.4 task cleanup, §4.7 nonce sync).
//!
//! Same cancellable-ticker shape as `scheduler.rs`'s tick loop: each runs on
//! its own timer, independent of the request/response pipeline, and exits
//! as soon as `cancel` fires.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::evm::fanout::Destination;
use crate::evm::nonce::NonceTable;
use crate::task::registry::TaskRegistry;
use crate::timestamp::UnixTimestamp;

/// Re-syncs every destination's nonce table against its chain on
/// `interval` (spec §4.7, default 15s): drops confirmed entries and
/// escalates stuck ones.
pub async fn run_nonce_sync(
    destinations: Arc<Vec<Destination>>,
    nonce_table: Arc<NonceTable>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }
        for destination in destinations.iter() {
            let pending = match destination.client.get_pending_nonce(destination.account).await {
                Ok(pending) => pending,
                Err(err) => {
                    warn!(chain = %destination.chain, error = %err, "nonce sync: failed to read pending nonce");
                    continue;
                }
            };
            // `EvmClient` exposes only the pending-inclusive count, not a
            // separate confirmed/latest query, so both `sync` arguments
            // come from the same read.
            let escalated = nonce_table.sync(&destination.chain, destination.account, pending, pending).await;
            for tx in escalated.iter().filter(|tx| tx.is_stuck) {
                warn!(
                    chain = %destination.chain,
                    nonce = tx.nonce,
                    retry_count = tx.retry_count,
                    gas_price = tx.gas_price,
                    "nonce sync: transaction stuck, escalated gas price"
                );
            }
        }
    }
    debug!("nonce sync loop stopped");
}

/// Sweeps terminal tasks older than `max_age` out of `registry` on
/// `interval` (spec §4.4, default 24h horizon).
pub async fn run_registry_cleanup(
    registry: Arc<TaskRegistry>,
    max_age: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }
        let Ok(now) = UnixTimestamp::try_now() else {
            warn!("registry cleanup: system clock is before the unix epoch, skipping sweep");
            continue;
        };
        let removed = registry.cleanup_older_than(max_age.as_secs(), now);
        if removed > 0 {
            info!(removed, "registry cleanup: swept stale terminal tasks");
        }
    }
    debug!("registry cleanup loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn registry_cleanup_sweeps_on_its_own_timer() {
        let registry = Arc::new(TaskRegistry::new());
        registry.register(Task::new("old".into(), UnixTimestamp(0)));
        registry.mark_completed("old", UnixTimestamp(0));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_registry_cleanup(
            registry.clone(),
            Duration::from_secs(0),
            Duration::from_millis(5),
            cancel.clone(),
        ));

        tokio::time::sleep(StdDuration::from_millis(30)).await;
        cancel.cancel();
        let _ = handle.await;

        assert!(registry.get("old").is_none());
    }
}
