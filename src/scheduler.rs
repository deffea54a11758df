//! Interval Scheduler (spec §4.6, component C6).
//!
//! Fires a new task every `interval_ms` and never blocks on task execution:
//! `queue_task` only spawns the executor's future onto the runtime and
//! returns, mirroring the facilitator's own preference for fire-and-forget
//! `tokio::spawn` at request boundaries rather than awaiting downstream work
//! inline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::stats::Stats;
use crate::task::TaskIdGenerator;
use crate::task::executor::{TaskExecutor, TaskOutcome};
use crate::cosmos::SedaClient;
use crate::types::DataRequest;

/// What the scheduler enqueues per tick: the DR template to submit. Built
/// fresh per tick by the caller (e.g. randomized inputs, rotated program),
/// so the scheduler itself stays a pure cadence engine.
pub type DrFactory = Arc<dyn Fn() -> DataRequest + Send + Sync>;

pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    ticks_fired: Arc<AtomicU64>,
}

impl SchedulerHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn ticks_fired(&self) -> u64 {
        self.ticks_fired.load(Ordering::SeqCst)
    }
}

/// Starts the scheduler: enqueues immediately, then every `interval`.
/// Returns a handle to stop it; the ticker and countdown logger run on
/// spawned tasks so `start` itself returns immediately.
pub fn start<C: SedaClient + 'static>(
    interval: Duration,
    continuous: bool,
    executor: Arc<TaskExecutor<C>>,
    dr_factory: DrFactory,
    task_ids: Arc<TaskIdGenerator>,
    stats: Arc<Stats>,
    outcome_tx: mpsc::Sender<TaskOutcome>,
    cancel: CancellationToken,
) -> SchedulerHandle {
    let running = Arc::new(AtomicBool::new(true));
    let ticks_fired = Arc::new(AtomicU64::new(0));

    let handle = SchedulerHandle { running: running.clone(), cancel: cancel.clone(), ticks_fired: ticks_fired.clone() };

    stats.reset();

    // Fires the first task immediately, per spec §4.6 `start` protocol.
    queue_task(&executor, &dr_factory, &task_ids, &stats, &outcome_tx);
    ticks_fired.fetch_add(1, Ordering::SeqCst);

    let loop_running = running.clone();
    let loop_cancel = cancel.clone();
    let loop_ticks = ticks_fired.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !loop_running.load(Ordering::SeqCst) {
                        break;
                    }
                    queue_task(&executor, &dr_factory, &task_ids, &stats, &outcome_tx);
                    loop_ticks.fetch_add(1, Ordering::SeqCst);
                }
                _ = loop_cancel.cancelled() => break,
            }
        }
        debug!("scheduler tick loop stopped");
    });

    if continuous {
        let countdown_cancel = cancel;
        let countdown_running = running.clone();
        tokio::spawn(async move {
            let mut countdown = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = countdown.tick() => {
                        if !countdown_running.load(Ordering::SeqCst) {
                            break;
                        }
                        debug!("scheduler countdown tick");
                    }
                    _ = countdown_cancel.cancelled() => break,
                }
            }
        });
    }

    handle
}

/// Enqueues one task. Must return in O(1) without touching the network
/// (spec §4.6, §8 "p99 < 50ms" guarantee) — all it does is spawn.
fn queue_task<C: SedaClient + 'static>(
    executor: &Arc<TaskExecutor<C>>,
    dr_factory: &DrFactory,
    task_ids: &Arc<TaskIdGenerator>,
    stats: &Arc<Stats>,
    outcome_tx: &mpsc::Sender<TaskOutcome>,
) {
    let task_id = task_ids.next();
    let dr = dr_factory();
    let executor = executor.clone();
    let outcome_tx = outcome_tx.clone();
    stats.record_posted();
    info!(task_id, "queued task");
    tokio::spawn(async move {
        executor.run(task_id, dr, outcome_tx).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmos::SequenceCoordinator;
    use crate::task::executor::ExecutorParams;
    use crate::task::registry::TaskRegistry;
    use crate::types::{Batch, DataResult, DrId};
    use async_trait::async_trait;
    use std::time::Instant;

    struct ImmediateClient;
    #[async_trait]
    impl SedaClient for ImmediateClient {
        async fn submit_tx(&self, _b: DataRequest, _m: Vec<u8>, seq: u64) -> Result<(String, Option<DrId>, u64), String> {
            Ok((format!("0x{seq}"), Some([seq as u8; 32]), 1))
        }
        async fn get_data_result(&self, dr_id: DrId, _h: u64) -> Result<Option<DataResult>, String> {
            Ok(Some(DataResult {
                dr_id,
                version: "0.1".into(),
                consensus: true,
                exit_code: 0,
                result: vec![],
                block_height: 1,
                block_timestamp: 1,
                gas_used: 0,
                payback_address: vec![],
                seda_payload: vec![],
                batch_assignment: 1,
            }))
        }
        async fn get_signed_batch(&self, _n: u64) -> Result<Option<Batch>, String> {
            Ok(None)
        }
        async fn get_account_sequence(&self, _addr: &str) -> Result<u64, String> {
            Ok(0)
        }
    }

    fn dr_factory() -> DrFactory {
        Arc::new(|| DataRequest {
            version: "0.1".into(),
            exec_program_id: crate::config::ProgramId([0u8; 32]),
            tally_program_id: crate::config::ProgramId([0u8; 32]),
            exec_inputs: vec![],
            tally_inputs: vec![],
            consensus_filter: vec![],
            memo: vec![],
            replication_factor: 1,
            gas_price: 1,
            exec_gas_limit: 1,
            tally_gas_limit: 1,
            payback_address: vec![],
            request_fee: 0,
            result_fee: 0,
            batch_fee: 0,
        })
    }

    #[tokio::test]
    async fn queue_task_returns_in_constant_time_regardless_of_downstream_latency() {
        let cancel = CancellationToken::new();
        let client = Arc::new(ImmediateClient);
        let coordinator = Arc::new(SequenceCoordinator::new(100, cancel.clone()));
        coordinator.initialize(client.as_ref(), "seda1abc").await;
        let registry = Arc::new(TaskRegistry::new());
        let params = ExecutorParams {
            posting_timeout: std::time::Duration::from_secs(1),
            dr_timeout: std::time::Duration::from_secs(1),
            dr_polling_interval: std::time::Duration::from_millis(5),
            base_memo: "solver".into(),
            max_retries: 2,
        };
        let executor = Arc::new(TaskExecutor::new(client, coordinator, registry, params, cancel));
        let task_ids = Arc::new(TaskIdGenerator::default());
        let stats = Arc::new(Stats::new());
        let (tx, mut rx) = mpsc::channel(16);

        let start = Instant::now();
        queue_task(&executor, &dr_factory(), &task_ids, &stats, &tx);
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(50), "queue_task took {elapsed:?}");

        let outcome = rx.recv().await.unwrap();
        assert!(outcome.success);
    }
}
