//! Pause-check ticker (spec §4.9 "EnforcedPause", §8 scenario #6).
//!
//! A prover contract under `EnforcedPause` rejects every write until an
//! operator lifts it. The batch poster records that as a paused queue
//! (`BatchQueue::set_paused`); this ticker is what flips it back and
//! resumes posting, on its own timer, independent of the fan-out path that
//! first noticed the pause.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cosmos::SedaClient;
use crate::evm::fanout::{Destination, drain_batch_queue};
use crate::evm::nonce::NonceTable;
use crate::evm::prover_cache::ProverCache;

/// Polls every destination's prover contract on `interval` for `paused()`
/// and resumes a paused batch queue once it reads false.
pub async fn run(
    destinations: Arc<Vec<Destination>>,
    seda_client: Arc<dyn SedaClient>,
    prover_cache: Arc<ProverCache>,
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
            if !destination.batch_queue.lock().await.is_paused() {
                continue;
            }
            let Some(prover) = prover_cache.cached(&destination.chain, destination.core_address) else {
                continue;
            };
            let still_paused = match destination.client.read(prover, "paused", vec![]).await {
                Ok(bytes) => bytes.first() == Some(&1),
                Err(err) => {
                    warn!(chain = %destination.chain, error = %err, "pause-check read failed");
                    continue;
                }
            };
            if still_paused {
                continue;
            }

            destination.batch_queue.lock().await.set_paused(false);
            let Some(target_height) = destination.batch_queue.lock().await.peek_back() else {
                continue;
            };
            info!(chain = %destination.chain, target_height, "contract unpaused, resuming batch queue");
            if let Err(err) =
                drain_batch_queue(destination, seda_client.as_ref(), &prover_cache, &nonce_table, prover, target_height)
                    .await
            {
                warn!(chain = %destination.chain, error = %err, "resume after unpause failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::EvmClient;
    use crate::evm::batch_poster::BatchQueue;
    use crate::types::{Batch, DataRequest, DataResult, DrId};
    use alloy_primitives::Address;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    struct FakeSeda;
    #[async_trait]
    impl SedaClient for FakeSeda {
        async fn submit_tx(&self, _b: DataRequest, _m: Vec<u8>, _s: u64) -> Result<(String, Option<DrId>, u64), String> {
            unimplemented!()
        }
        async fn get_data_result(&self, _dr_id: DrId, _h: u64) -> Result<Option<DataResult>, String> {
            unimplemented!()
        }
        async fn get_signed_batch(&self, _batch_number: u64) -> Result<Option<Batch>, String> {
            Ok(None)
        }
        async fn get_account_sequence(&self, _a: &str) -> Result<u64, String> {
            Ok(0)
        }
    }

    struct UnpausingEvm {
        prover: Address,
        paused: AtomicBool,
    }
    #[async_trait]
    impl EvmClient for UnpausingEvm {
        async fn read(&self, contract: Address, method: &str, _args: Vec<u8>) -> Result<Vec<u8>, String> {
            match method {
                "paused" if contract == self.prover => {
                    Ok(vec![if self.paused.load(Ordering::SeqCst) { 1 } else { 0 }])
                }
                "get_last_batch_height" => Ok(0u64.to_be_bytes().to_vec()),
                _ => Ok(vec![]),
            }
        }
        async fn write(&self, _c: Address, _m: &str, _a: Vec<u8>, _g: u64, _n: u64) -> Result<String, String> {
            Err("EnforcedPause".into())
        }
        async fn wait_receipt(&self, _h: &str) -> Result<bool, String> {
            Ok(true)
        }
        async fn get_pending_nonce(&self, _account: Address) -> Result<u64, String> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn resumes_a_paused_queue_once_the_contract_reports_unpaused() {
        let prover = Address::from([9u8; 20]);
        let client = Arc::new(UnpausingEvm { prover, paused: AtomicBool::new(true) });
        let prover_cache = Arc::new(ProverCache::new());
        prover_cache.discover(client.as_ref(), "base", Address::from([5u8; 20])).await;

        let batch_queue = Arc::new(Mutex::new(BatchQueue::new()));
        batch_queue.lock().await.push(10);
        batch_queue.lock().await.set_paused(true);

        let destination = Destination {
            chain: "base".into(),
            client: client.clone(),
            core_address: Address::from([5u8; 20]),
            account: Address::from([6u8; 20]),
            gas_price: 1_000_000_000,
            batch_queue: batch_queue.clone(),
        };
        let destinations = Arc::new(vec![destination]);
        let nonce_table = Arc::new(NonceTable::new(1_000_000_000));
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();

        client.paused.store(false, Ordering::SeqCst);

        let handle = tokio::spawn(run(
            destinations,
            Arc::new(FakeSeda),
            prover_cache,
            nonce_table,
            Duration::from_millis(5),
            cancel_for_task,
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let _ = handle.await;

        assert!(!batch_queue.lock().await.is_paused());
    }
}
