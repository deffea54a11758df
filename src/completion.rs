//! Completion Handler (spec §4.13, component C13).
//!
//! Sole subscriber of `TaskOutcome` (spec §9 message-passing redesign).
//! Updates statistics and, on success, hands the result to the fan-out
//! coordinator — the executor itself never blocks on this.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::evm::fanout::{self, Destination, DestinationOutcome};
use crate::evm::nonce::NonceTable;
use crate::evm::prover_cache::ProverCache;
use crate::cosmos::SedaClient;
use crate::stats::Stats;
use crate::task::executor::TaskOutcome;

/// Runs until `outcome_rx` closes (i.e. every executor/scheduler handle has
/// been dropped, typically at shutdown).
pub async fn run<C: SedaClient + 'static>(
    mut outcome_rx: mpsc::Receiver<TaskOutcome>,
    stats: Arc<Stats>,
    seda_client: Arc<C>,
    prover_cache: Arc<ProverCache>,
    nonce_table: Arc<NonceTable>,
    destinations: Arc<Vec<Destination>>,
) {
    while let Some(outcome) = outcome_rx.recv().await {
        handle_outcome(outcome, &stats, seda_client.clone(), &prover_cache, &nonce_table, &destinations).await;
    }
}

async fn handle_outcome<C: SedaClient + 'static>(
    outcome: TaskOutcome,
    stats: &Arc<Stats>,
    seda_client: Arc<C>,
    prover_cache: &Arc<ProverCache>,
    nonce_table: &Arc<NonceTable>,
    destinations: &Arc<Vec<Destination>>,
) {
    match outcome {
        TaskOutcome { task_id, success: true, result: Some(result), .. } => {
            stats.record_completed(0);
            info!(task_id, dr_id = %hex::encode(result.dr_id), "task completed, evaluating fan-out");

            if !result.should_fan_out() {
                info!(task_id, "result does not meet fan-out policy, skipping");
                return;
            }

            let outcomes = fanout::fan_out(
                destinations,
                seda_client,
                prover_cache.clone(),
                nonce_table.clone(),
                Arc::new(result),
            )
            .await;
            summarize_fanout(&task_id, stats, &outcomes);
        }
        TaskOutcome { task_id, success: false, error, .. } => {
            stats.record_failed();
            warn!(task_id, error = ?error, "task failed");
        }
        TaskOutcome { task_id, .. } => {
            warn!(task_id, "task reported success with no result, treating as failure");
            stats.record_failed();
        }
    }
}

fn summarize_fanout(task_id: &str, stats: &Arc<Stats>, outcomes: &[DestinationOutcome]) {
    for outcome in outcomes {
        stats.record_fanout(outcome.success);
        if outcome.success {
            info!(task_id, chain = %outcome.chain, "fan-out destination succeeded");
        } else {
            warn!(task_id, chain = %outcome.chain, error = ?outcome.error, "fan-out destination failed");
        }
    }
    let succeeded = outcomes.iter().filter(|o| o.success).count();
    info!(task_id, succeeded, total = outcomes.len(), "fan-out summary");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::executor::TaskError;
    use crate::types::{Batch, DataResult, DrId};
    use async_trait::async_trait;

    struct FakeSeda;
    #[async_trait]
    impl SedaClient for FakeSeda {
        async fn submit_tx(&self, _b: crate::types::DataRequest, _m: Vec<u8>, _s: u64) -> Result<(String, Option<DrId>, u64), String> {
            unimplemented!()
        }
        async fn get_data_result(&self, _dr_id: DrId, _h: u64) -> Result<Option<DataResult>, String> {
            Ok(None)
        }
        async fn get_signed_batch(&self, _n: u64) -> Result<Option<Batch>, String> {
            Ok(None)
        }
        async fn get_account_sequence(&self, _a: &str) -> Result<u64, String> {
            Ok(0)
        }
    }

    fn completed_result(consensus: bool) -> DataResult {
        DataResult {
            dr_id: [3u8; 32],
            version: "0.1".into(),
            consensus,
            exit_code: 0,
            result: vec![],
            block_height: 1,
            block_timestamp: 1,
            gas_used: 0,
            payback_address: vec![],
            seda_payload: vec![],
            batch_assignment: 0,
        }
    }

    #[tokio::test]
    async fn successful_non_consensus_result_updates_stats_without_fanout() {
        let stats = Arc::new(Stats::new());
        handle_outcome(
            TaskOutcome { task_id: "t1".into(), success: true, result: Some(completed_result(false)), error: None },
            &stats,
            Arc::new(FakeSeda),
            &Arc::new(ProverCache::new()),
            &Arc::new(NonceTable::new(1)),
            &Arc::new(vec![]),
        )
        .await;
        let snap = stats.snapshot();
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.fanout_success + snap.fanout_failure, 0);
    }

    #[tokio::test]
    async fn failed_task_increments_failure_counter() {
        let stats = Arc::new(Stats::new());
        handle_outcome(
            TaskOutcome { task_id: "t1".into(), success: false, result: None, error: Some(TaskError::OracleTimeout) },
            &stats,
            Arc::new(FakeSeda),
            &Arc::new(ProverCache::new()),
            &Arc::new(NonceTable::new(1)),
            &Arc::new(vec![]),
        )
        .await;
        assert_eq!(stats.snapshot().failed, 1);
    }
}
