//! Root error types.
//!
//! Each component owns its own `thiserror` enum (see `cosmos::CosmosError`,
//! `evm::nonce::NonceError`, `evm::batch_poster::BatchPosterError`,
//! `evm::result_poster::ResultPosterError`, `task::executor::TaskError`),
//! matching the facilitator's per-module error convention
//! (`PaymentError`, `FacilitatorLocalError`). `SolverError` aggregates the
//! ones that can abort the process at startup.

use thiserror::Error;

/// Errors that can occur while loading configuration from the environment.
/// Per spec §7, every `ConfigError` is fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("no EVM networks configured")]
    NoEvmNetworks,
}

/// Top-level error returned from `main`.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("sequence coordinator failed to initialize: {0}")]
    CosmosInit(String),
    #[error("health endpoint failed: {0}")]
    Health(#[source] std::io::Error),
}
