//! Cosmos Sequence Coordinator (spec §4.3, component C3).
//!
//! Serializes every Cosmos submission behind a single FIFO processing loop,
//! the way the facilitator serializes nonce allocation behind
//! `PendingNonceManager` (`chain/eip155/pending_nonce_manager.rs`) — one
//! mutex-guarded counter per signer instead of letting callers race the RPC.

pub mod classify;
pub mod local_client;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use classify::{CosmosErrorKind, classify};

/// The SEDA signing/RPC client. Out-of-scope collaborator (spec §1); only
/// the shape the coordinator and task executor need is declared here.
#[async_trait]
pub trait SedaClient: Send + Sync {
    /// Broadcasts a DR submission tx at the given account sequence.
    async fn submit_tx(
        &self,
        body: crate::types::DataRequest,
        memo: Vec<u8>,
        seq: u64,
    ) -> Result<(String, Option<crate::types::DrId>, u64), String>;
    /// Polls for a finalized oracle result.
    async fn get_data_result(
        &self,
        dr_id: crate::types::DrId,
        post_height: u64,
    ) -> Result<Option<crate::types::DataResult>, String>;
    /// Fetches the signed batch at a given batch number.
    async fn get_signed_batch(&self, batch_number: u64) -> Result<Option<crate::types::Batch>, String>;
    async fn get_account_sequence(&self, address: &str) -> Result<u64, String>;
}

/// What a successful (or duplicate-but-landed) submission yields.
#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub dr_id: Option<[u8; 32]>,
    pub block_height: u64,
    pub tx_hash: Option<String>,
}

type PostTransactionFn =
    Box<dyn FnOnce(u64) -> Pin<Box<dyn Future<Output = Result<PostOutcome, String>> + Send>> + Send>;

/// One pending Cosmos submission, waiting for the coordinator to hand it a
/// sequence number (spec §4.3 `execute(posting)`).
pub struct SequencedPosting {
    pub task_id: String,
    pub timeout: Duration,
    pub post_transaction: PostTransactionFn,
}

/// Result handed back to the caller of `execute`. Never an `Err` on posting
/// failure (spec §4.3 Failure semantics) — failure is communicated through
/// `success = false`.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    pub success: bool,
    pub seq: u64,
    pub value: Option<PostOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum CosmosError {
    #[error("sequence coordinator queue is full")]
    QueueFull,
    #[error("sequence coordinator was cleared before this posting ran")]
    Cancelled,
    #[error("sequence coordinator is not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorStats {
    pub queue_size: usize,
    pub processing: bool,
    pub next_seq: u64,
}

struct QueueItem {
    posting: SequencedPosting,
    reply: oneshot::Sender<Result<ExecuteResult, CosmosError>>,
}

struct Shared {
    queue: Mutex<VecDeque<QueueItem>>,
    notify: Notify,
    processing: AtomicBool,
    next_seq: AtomicU64,
    initialized: AtomicBool,
    max_queue_size: usize,
}

/// Serialized FIFO gate around the Cosmos signer (spec §3, §4.3, §5).
///
/// Only one posting is in flight at a time across the whole process; the
/// processing loop is the sole writer of `next_seq`.
pub struct SequenceCoordinator {
    shared: Arc<Shared>,
}

impl SequenceCoordinator {
    /// Spawns the processing loop. `initialize` must be called before the
    /// first `execute`.
    pub fn new(max_queue_size: usize, cancel: CancellationToken) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            processing: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            max_queue_size: max_queue_size.max(1),
        });
        tokio::spawn(Self::run_loop(shared.clone(), cancel));
        Self { shared }
    }

    /// Queries the chain once for the current account sequence. Falls back
    /// to `0` with a warning on query failure (fresh-account case), per
    /// spec §4.3 — startup failure here is *not* fatal to the coordinator,
    /// matching §6's exit-code note.
    pub async fn initialize(&self, client: &dyn SedaClient, address: &str) {
        let seq = match client.get_account_sequence(address).await {
            Ok(seq) => seq,
            Err(err) => {
                warn!(error = %err, "failed to query account sequence, falling back to 0");
                0
            }
        };
        self.shared.next_seq.store(seq, Ordering::SeqCst);
        self.shared.initialized.store(true, Ordering::SeqCst);
        info!(next_seq = seq, "sequence coordinator initialized");
    }

    pub async fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            queue_size: self.shared.queue.lock().await.len(),
            processing: self.shared.processing.load(Ordering::SeqCst),
            next_seq: self.shared.next_seq.load(Ordering::SeqCst),
        }
    }

    /// Enqueues `posting` and waits for the coordinator to run it.
    pub async fn execute(&self, posting: SequencedPosting) -> Result<ExecuteResult, CosmosError> {
        if !self.shared.initialized.load(Ordering::SeqCst) {
            return Err(CosmosError::NotInitialized);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut queue = self.shared.queue.lock().await;
            if queue.len() >= self.shared.max_queue_size {
                return Err(CosmosError::QueueFull);
            }
            queue.push_back(QueueItem { posting, reply: reply_tx });
        }
        self.shared.notify.notify_one();
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(CosmosError::Cancelled),
        }
    }

    /// Drains all currently-queued waiters with a cancellation error.
    /// Does **not** reset `next_seq` (spec §4.3 `clear()`).
    pub async fn clear(&self) {
        let mut queue = self.shared.queue.lock().await;
        for item in queue.drain(..) {
            let _ = item.reply.send(Err(CosmosError::Cancelled));
        }
    }

    async fn run_loop(shared: Arc<Shared>, cancel: CancellationToken) {
        loop {
            let item = {
                let mut queue = shared.queue.lock().await;
                queue.pop_front()
            };
            let Some(QueueItem { posting, reply }) = item else {
                tokio::select! {
                    _ = shared.notify.notified() => continue,
                    _ = cancel.cancelled() => break,
                }
            };

            shared.processing.store(true, Ordering::SeqCst);
            let candidate = shared.next_seq.load(Ordering::SeqCst);
            let post = posting.post_transaction;
            let outcome = tokio::select! {
                res = post(candidate) => res,
                _ = tokio::time::sleep(posting.timeout) => Err("posting timed out".to_string()),
            };

            let result = match outcome {
                Ok(value) => {
                    shared.next_seq.store(candidate + 1, Ordering::SeqCst);
                    ExecuteResult { success: true, seq: candidate, value: Some(value), error: None }
                }
                Err(message) => match classify(&message) {
                    CosmosErrorKind::DataRequestAlreadyExists => {
                        shared.next_seq.store(candidate + 1, Ordering::SeqCst);
                        ExecuteResult {
                            success: true,
                            seq: candidate,
                            value: Some(PostOutcome { dr_id: None, block_height: 0, tx_hash: None }),
                            error: Some(message),
                        }
                    }
                    CosmosErrorKind::SequenceMismatch => {
                        warn!(task_id = %posting.task_id, seq = candidate, "sequence mismatch, not advancing");
                        ExecuteResult { success: false, seq: candidate, value: None, error: Some(message) }
                    }
                    CosmosErrorKind::Other => {
                        ExecuteResult { success: false, seq: candidate, value: None, error: Some(message) }
                    }
                },
            };

            let _ = reply.send(Ok(result));
            shared.processing.store(false, Ordering::SeqCst);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }
}
