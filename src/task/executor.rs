//! Task Executor (spec §4.5, component C5).
//!
//! Drives one task through Post → Await-Result → Fan-out-trigger and
//! publishes a `TaskOutcome` message rather than calling back into a
//! completion closure (spec §9 "Callback-driven task completion ->
//! message-passing"): the executor stays reentrant and the completion
//! handler (C13) subscribes independently.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cosmos::{CosmosError, PostOutcome, SedaClient, SequenceCoordinator, SequencedPosting};
use crate::memo;
use crate::retry::{self, Backoff, RetryError};
use crate::task::registry::TaskRegistry;
use crate::task::{Task, TaskStatus};
use crate::timestamp::UnixTimestamp;
use crate::types::{DataRequest, DataResult, DrId};

/// Spec §7 taxonomy entries that originate from task execution.
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    #[error("sequence coordinator rejected posting: {0}")]
    PostingFailed(String),
    #[error("sequence coordinator error: {0}")]
    Coordinator(String),
    #[error("oracle result did not arrive within the configured timeout")]
    OracleTimeout,
    #[error("cancelled")]
    Cancelled,
}

/// Message published when a task leaves `Posting`/`Posted` for a terminal
/// state; the completion handler (C13) is the sole subscriber.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub success: bool,
    pub result: Option<DataResult>,
    pub error: Option<TaskError>,
}

/// Configuration the executor needs per run, factored out of `SedaConfig`
/// so tests don't need a full config object.
#[derive(Debug, Clone)]
pub struct ExecutorParams {
    pub posting_timeout: Duration,
    pub dr_timeout: Duration,
    pub dr_polling_interval: Duration,
    pub base_memo: String,
    /// `SCHEDULER_MAX_RETRIES` (spec §6): attempts, beyond the first, the
    /// submission retry helper (C1) is allowed for a single posting.
    pub max_retries: u32,
}

pub struct TaskExecutor<C: SedaClient + 'static> {
    client: Arc<C>,
    coordinator: Arc<SequenceCoordinator>,
    registry: Arc<TaskRegistry>,
    params: ExecutorParams,
    cancel: CancellationToken,
}

impl<C: SedaClient + 'static> TaskExecutor<C> {
    pub fn new(
        client: Arc<C>,
        coordinator: Arc<SequenceCoordinator>,
        registry: Arc<TaskRegistry>,
        params: ExecutorParams,
        cancel: CancellationToken,
    ) -> Self {
        Self { client, coordinator, registry, params, cancel }
    }

    /// Runs one task end to end and publishes its outcome on `outcome_tx`.
    /// The task is `Completed` the moment an oracle result is observed; the
    /// caller (C13/C11) takes it from there for fan-out.
    #[instrument(skip_all, fields(task_id = %task_id))]
    pub async fn run(&self, task_id: String, dr: DataRequest, outcome_tx: mpsc::Sender<TaskOutcome>) {
        self.registry.register(Task::new(task_id.clone(), UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0))));

        let posted = match self.post(&task_id, dr).await {
            Ok(posted) => posted,
            Err(error) => {
                self.fail(&task_id, error.clone(), None).await;
                let _ = outcome_tx
                    .send(TaskOutcome { task_id, success: false, result: None, error: Some(error) })
                    .await;
                return;
            }
        };

        match self.await_result(&task_id, posted).await {
            Ok(result) => {
                self.registry.mark_completed(&task_id, UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0)));
                info!(dr_id = %hex::encode(result.dr_id), "oracle result observed");
                let _ = outcome_tx
                    .send(TaskOutcome { task_id, success: true, result: Some(result), error: None })
                    .await;
            }
            Err(error) => {
                self.fail(&task_id, error.clone(), None).await;
                let _ = outcome_tx
                    .send(TaskOutcome { task_id, success: false, result: None, error: Some(error) })
                    .await;
            }
        }
    }

    async fn fail(&self, task_id: &str, error: TaskError, seq: Option<u64>) {
        warn!(task_id, %error, "task failed");
        self.registry.mark_failed(task_id, error.to_string(), seq, UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0)));
    }

    /// Phase 1: build a `SequencedPosting`, run it through the sequence
    /// coordinator under the posting timeout.
    async fn post(&self, task_id: &str, dr: DataRequest) -> Result<PostOutcome, TaskError> {
        let client = self.client.clone();
        let base_memo = self.params.base_memo.clone();
        let cancel = self.cancel.clone();
        let max_retries = self.params.max_retries;

        let posting = SequencedPosting {
            task_id: task_id.to_string(),
            timeout: self.params.posting_timeout,
            post_transaction: Box::new(move |seq| {
                Box::pin(async move {
                    let memo_bytes = memo::generate(&base_memo, seq);
                    let result = retry::run(
                        |_attempt| {
                            let client = client.clone();
                            let dr = dr.clone();
                            let memo_bytes = memo_bytes.clone();
                            async move { client.submit_tx(dr, memo_bytes, seq).await }
                        },
                        max_retries,
                        Backoff::constant_secs(1),
                        &cancel,
                    )
                    .await;
                    match result {
                        Ok((tx_hash, dr_id, block_height)) => {
                            Ok(PostOutcome { dr_id, block_height, tx_hash: Some(tx_hash) })
                        }
                        Err(RetryError::Cancelled) => Err("cancelled".to_string()),
                        Err(RetryError::Exhausted(e)) => Err(e),
                    }
                })
            }),
        };

        let execute_result = self.coordinator.execute(posting).await.map_err(|e| match e {
            CosmosError::QueueFull => TaskError::Coordinator("queue full".to_string()),
            CosmosError::Cancelled => TaskError::Cancelled,
            CosmosError::NotInitialized => TaskError::Coordinator("not initialized".to_string()),
        })?;

        if !execute_result.success {
            return Err(TaskError::PostingFailed(
                execute_result.error.unwrap_or_else(|| "unknown posting error".to_string()),
            ));
        }
        let outcome = execute_result.value.expect("successful execute always carries a value");
        self.registry.mark_posted(
            task_id,
            outcome.dr_id,
            outcome.block_height,
            outcome.tx_hash.clone(),
            execute_result.seq,
            UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0)),
        );
        Ok(outcome)
    }

    /// Phase 2: poll `get_data_result` until it resolves or the DR timeout
    /// elapses (spec §4.5 Phase 2).
    async fn await_result(&self, task_id: &str, posted: PostOutcome) -> Result<DataResult, TaskError> {
        let Some(dr_id) = posted.dr_id else {
            // `DataRequestAlreadyExists` synthesized a posting with unknown
            // dr_id; without it we cannot poll for a result.
            return Err(TaskError::OracleTimeout);
        };
        let deadline = tokio::time::Instant::now() + self.params.dr_timeout;
        let mut interval = tokio::time::interval(self.params.dr_polling_interval);
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(TaskError::OracleTimeout);
            }
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(TaskError::OracleTimeout),
            }
            match self.client.get_data_result(dr_id, posted.block_height).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => continue,
                Err(err) => {
                    warn!(task_id, error = %err, "transient error polling for oracle result");
                    continue;
                }
            }
        }
    }
}
