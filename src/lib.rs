//! SEDA oracle push-solver: posts DataRequests to SEDA on a schedule, awaits
//! oracle results, and fans finalized consensus results out to every
//! enabled EVM destination chain.
//!
//! Module layout mirrors the facilitator's own (`config`, `telemetry`,
//! `error`, `sig_down`) plus the solver-specific pipeline components named
//! in the design ledger (`DESIGN.md`).

pub mod completion;
pub mod config;
pub mod cosmos;
pub mod error;
pub mod evm;
pub mod health;
pub mod maintenance;
pub mod memo;
pub mod retry;
pub mod scheduler;
pub mod sig_down;
pub mod stats;
pub mod task;
pub mod telemetry;
pub mod timestamp;
pub mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{ProgramId, SedaConfig};
use crate::cosmos::SequenceCoordinator;
use crate::cosmos::local_client::LocalSedaClient;
use crate::error::SolverError;
use crate::evm::fanout::Destination;
use crate::evm::nonce::NonceTable;
use crate::evm::prover_cache::ProverCache;
use crate::sig_down::SigDown;
use crate::stats::Stats;
use crate::task::TaskIdGenerator;
use crate::task::executor::{ExecutorParams, TaskExecutor};
use crate::task::registry::TaskRegistry;
use crate::types::DataRequest;

/// Builds the DataRequest template posted on every scheduler tick, from the
/// first configured oracle program (spec §6 program-id Open Question: one
/// configured id serves as both exec and tally program).
fn dr_factory(program_id: ProgramId, base_memo: String) -> scheduler::DrFactory {
    Arc::new(move || DataRequest {
        version: "0.1".to_string(),
        exec_program_id: program_id,
        tally_program_id: program_id,
        exec_inputs: vec![],
        tally_inputs: vec![],
        consensus_filter: vec![],
        memo: base_memo.clone().into_bytes(),
        replication_factor: 1,
        gas_price: 1,
        exec_gas_limit: 1_000_000,
        tally_gas_limit: 1_000_000,
        payback_address: vec![],
        request_fee: 0,
        result_fee: 0,
        batch_fee: 0,
    })
}

/// Wires the full pipeline and runs until `SigDown` fires. Mirrors the
/// facilitator's own `main` shape: load config, init telemetry, build the
/// long-lived components, serve, wait for shutdown.
pub async fn run(config: SedaConfig, healthz_port: u16) -> Result<(), SolverError> {
    let sig_down = SigDown::try_new().map_err(|e| SolverError::CosmosInit(e.to_string()))?;
    let cancel = sig_down.cancellation_token();

    // Only `SedaNetwork::Local` is wired against a real-ish client today;
    // mainnet/testnet require a concrete SEDA/EVM SDK client, which is an
    // out-of-scope collaborator (see DESIGN.md).
    let seda_client = Arc::new(LocalSedaClient::new());

    let coordinator = Arc::new(SequenceCoordinator::new(config.cosmos_max_queue_size, cancel.clone()));
    let signer_address = config.signer_address.to_string();
    coordinator.initialize(seda_client.as_ref(), &signer_address).await;

    let registry = Arc::new(TaskRegistry::new());
    let stats = Arc::new(Stats::new());
    let task_ids = Arc::new(TaskIdGenerator::default());

    let executor_params = ExecutorParams {
        posting_timeout: config.posting_timeout(),
        dr_timeout: config.dr_timeout(),
        dr_polling_interval: config.dr_polling_interval(),
        base_memo: config.scheduler_memo.clone(),
        max_retries: config.scheduler_max_retries,
    };
    let executor = Arc::new(TaskExecutor::new(
        seda_client.clone(),
        coordinator.clone(),
        registry.clone(),
        executor_params,
        cancel.clone(),
    ));

    let program_id = *config
        .oracle_program_ids
        .first()
        .expect("from_env() requires at least one oracle program id");
    let factory = dr_factory(program_id, config.scheduler_memo.clone());

    let (outcome_tx, outcome_rx) = mpsc::channel(256);

    let nonce_table = Arc::new(NonceTable::new(1_000_000_000));
    let prover_cache = Arc::new(ProverCache::new());
    // No EVM destinations are wired in local mode; a real deployment builds
    // one `Destination` per `config::load_evm_networks()` entry with a
    // concrete `EvmClient` for that chain.
    let destinations: Arc<Vec<Destination>> = Arc::new(vec![]);

    let completion_handle = tokio::spawn(completion::run(
        outcome_rx,
        stats.clone(),
        seda_client.clone(),
        prover_cache.clone(),
        nonce_table.clone(),
        destinations.clone(),
    ));

    let nonce_sync_handle = tokio::spawn(maintenance::run_nonce_sync(
        destinations.clone(),
        nonce_table.clone(),
        config.nonce_sync_interval(),
        cancel.clone(),
    ));
    let registry_cleanup_handle = tokio::spawn(maintenance::run_registry_cleanup(
        registry.clone(),
        std::time::Duration::from_secs(config.task_max_age_secs),
        config.task_cleanup_interval(),
        cancel.clone(),
    ));
    let pause_monitor_handle = tokio::spawn(evm::pause_monitor::run(
        destinations.clone(),
        seda_client.clone(),
        prover_cache,
        nonce_table,
        config.queue_processing_interval(),
        cancel.clone(),
    ));

    let scheduler_handle = scheduler::start(
        std::time::Duration::from_millis(config.scheduler_interval_ms),
        config.scheduler_continuous,
        executor,
        factory,
        task_ids,
        stats.clone(),
        outcome_tx,
        cancel.clone(),
    );

    info!("seda-push-solver started");

    let health_handle = tokio::spawn(health::serve(healthz_port, stats.clone(), cancel.clone()));

    sig_down.recv().await;

    scheduler_handle.stop();
    if let Err(err) = health_handle.await {
        warn!(error = %err, "health endpoint task panicked");
    }
    coordinator.clear().await;

    if let Err(err) = completion_handle.await {
        warn!(error = %err, "completion handler task panicked");
    }
    if let Err(err) = nonce_sync_handle.await {
        warn!(error = %err, "nonce sync task panicked");
    }
    if let Err(err) = registry_cleanup_handle.await {
        warn!(error = %err, "registry cleanup task panicked");
    }
    if let Err(err) = pause_monitor_handle.await {
        warn!(error = %err, "pause monitor task panicked");
    }

    info!(snapshot = ?stats.snapshot(), "shutdown complete");
    Ok(())
}
