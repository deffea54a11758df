//! Configuration loading for the solver process.
//!
//! Grounded on the facilitator's own `config.rs`: small `mod *_defaults`
//! functions supply defaults, and a `clap::Parser` carries the process-level
//! CLI surface. Unlike the teacher (a JSON config file resolved through
//! `serde`), the external interface here (spec §6) is environment variables,
//! so `from_env()` reads `std::env::var` directly instead of deserializing a
//! file, while keeping the same "default function per field" shape.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use clap::Parser;
use url::Url;

use crate::error::ConfigError;

/// Process-level CLI flags. Everything else is environment-driven (spec §6).
#[derive(Parser, Debug)]
#[command(name = "seda-push-solver")]
#[command(about = "Pushes finalized SEDA oracle results to EVM destination chains")]
pub struct CliArgs {
    /// Log verbosity, also settable via `LOG_LEVEL`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    /// Port for the `/healthz` and `/readyz` endpoints. 0 disables the server.
    #[arg(long, env = "HEALTHZ_PORT", default_value_t = 0)]
    pub healthz_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SedaNetwork {
    Mainnet,
    Testnet,
    Local,
}

impl FromStr for SedaNetwork {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(SedaNetwork::Mainnet),
            "testnet" => Ok(SedaNetwork::Testnet),
            "local" => Ok(SedaNetwork::Local),
            other => Err(ConfigError::InvalidValue {
                name: "SEDA_NETWORK",
                value: other.to_string(),
                reason: "expected one of mainnet, testnet, local".to_string(),
            }),
        }
    }
}

/// A 32-byte content-addressed program id (`exec_program_id` / `tally_program_id`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub [u8; 32]);

impl fmt::Debug for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramId(0x{})", hex::encode(self.0))
    }
}

impl FromStr for ProgramId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| ConfigError::InvalidValue {
            name: "SEDA_ORACLE_PROGRAM_ID",
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| ConfigError::InvalidValue {
            name: "SEDA_ORACLE_PROGRAM_ID",
            value: s.to_string(),
            reason: "expected 32 bytes".to_string(),
        })?;
        Ok(ProgramId(arr))
    }
}

/// SEDA-side configuration: network, signer mnemonic, and DR template fields
/// carried verbatim into every submitted DataRequest (spec §3).
pub struct SedaConfig {
    pub network: SedaNetwork,
    pub rpc_endpoint: Url,
    /// Signing mnemonic. Never logged or `Debug`-printed in full.
    pub mnemonic: String,
    /// Bech32 account address the mnemonic above signs for; the sequence
    /// coordinator queries this address's account sequence on startup.
    pub signer_address: cosmrs::AccountId,
    /// One oracle program is pushed per entry; each is used as both
    /// `exec_program_id` and `tally_program_id` (see DESIGN.md Open Questions).
    pub oracle_program_ids: Vec<ProgramId>,
    pub dr_timeout_seconds: u64,
    pub dr_polling_interval_seconds: u64,
    pub scheduler_interval_ms: u64,
    pub scheduler_continuous: bool,
    pub scheduler_max_retries: u32,
    pub scheduler_memo: String,
    pub cosmos_posting_timeout_ms: u64,
    pub cosmos_max_queue_size: usize,
    /// Nonce coordinator periodic sync interval (spec §4.7, §5).
    pub nonce_sync_interval_ms: u64,
    /// Batch posting queue tick (spec §5 Timeouts, `queue_processing_interval_ms`).
    pub queue_processing_interval_ms: u64,
    /// How often the task registry sweeps for stale terminal tasks (spec §4.4).
    pub task_cleanup_interval_secs: u64,
    /// Age, from `completed_at`, at which a terminal task is swept (spec §4.4).
    pub task_max_age_secs: u64,
}

impl fmt::Debug for SedaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SedaConfig")
            .field("network", &self.network)
            .field("rpc_endpoint", &self.rpc_endpoint)
            .field("mnemonic", &"<redacted>")
            .field("signer_address", &self.signer_address)
            .field("oracle_program_ids", &self.oracle_program_ids)
            .field("dr_timeout_seconds", &self.dr_timeout_seconds)
            .field("dr_polling_interval_seconds", &self.dr_polling_interval_seconds)
            .field("scheduler_interval_ms", &self.scheduler_interval_ms)
            .field("scheduler_continuous", &self.scheduler_continuous)
            .field("scheduler_max_retries", &self.scheduler_max_retries)
            .field("cosmos_posting_timeout_ms", &self.cosmos_posting_timeout_ms)
            .field("cosmos_max_queue_size", &self.cosmos_max_queue_size)
            .field("nonce_sync_interval_ms", &self.nonce_sync_interval_ms)
            .field("queue_processing_interval_ms", &self.queue_processing_interval_ms)
            .field("task_cleanup_interval_secs", &self.task_cleanup_interval_secs)
            .field("task_max_age_secs", &self.task_max_age_secs)
            .finish()
    }
}

impl SedaConfig {
    pub fn posting_timeout(&self) -> Duration {
        Duration::from_millis(self.cosmos_posting_timeout_ms)
    }

    pub fn dr_timeout(&self) -> Duration {
        Duration::from_secs(self.dr_timeout_seconds)
    }

    pub fn dr_polling_interval(&self) -> Duration {
        Duration::from_secs(self.dr_polling_interval_seconds)
    }

    pub fn nonce_sync_interval(&self) -> Duration {
        Duration::from_millis(self.nonce_sync_interval_ms)
    }

    pub fn queue_processing_interval(&self) -> Duration {
        Duration::from_millis(self.queue_processing_interval_ms)
    }

    pub fn task_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.task_cleanup_interval_secs)
    }
}

/// Gas pricing policy for an EVM destination chain, selected automatically:
/// any EIP-1559 field present selects `Eip1559`, otherwise `Legacy`.
#[derive(Debug, Clone, Copy)]
pub enum GasPolicy {
    Legacy { gas_price: u128 },
    Eip1559 { max_fee_per_gas: u128, max_priority_fee_per_gas: u128 },
}

/// Static per-chain descriptor (spec §3 `EvmNetworkConfig`).
#[derive(Debug, Clone)]
pub struct EvmNetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Url,
    pub rpc_fallbacks: Vec<Url>,
    pub core_contract_address: Address,
    pub gas_limit: u64,
    pub gas_policy: GasPolicy,
    pub enabled: bool,
    pub fee_claim_threshold: u128,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn required_env(name: &'static str) -> Result<String, ConfigError> {
    env_var(name).ok_or(ConfigError::MissingVar(name))
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

mod seda_defaults {
    pub const DR_TIMEOUT_SECONDS: u64 = 60;
    pub const DR_POLLING_INTERVAL_SECONDS: u64 = 2;
    pub const SCHEDULER_INTERVAL_MS: u64 = 15_000;
    pub const SCHEDULER_MAX_RETRIES: u32 = 3;
    pub const SCHEDULER_MEMO: &str = "seda-push-solver";
    pub const COSMOS_POSTING_TIMEOUT_MS: u64 = 20_000;
    pub const COSMOS_MAX_QUEUE_SIZE: usize = 1_000;
    /// Spec §4.7 "periodic sync (default interval 15s)".
    pub const NONCE_SYNC_INTERVAL_MS: u64 = 15_000;
    /// Spec §5 Timeouts: "batch processing has its own queue tick".
    pub const QUEUE_PROCESSING_INTERVAL_MS: u64 = 5_000;
    pub const TASK_CLEANUP_INTERVAL_SECS: u64 = 3_600;
    /// Spec §4.4 default horizon for sweeping terminal tasks.
    pub const TASK_MAX_AGE_SECS: u64 = 86_400;
}

impl SedaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let network_raw = env_var("SEDA_NETWORK").unwrap_or_else(|| "testnet".to_string());
        let network = network_raw.parse()?;
        let rpc_endpoint_raw = required_env("SEDA_RPC_ENDPOINT")?;
        let rpc_endpoint = Url::parse(&rpc_endpoint_raw).map_err(|e| ConfigError::InvalidValue {
            name: "SEDA_RPC_ENDPOINT",
            value: rpc_endpoint_raw,
            reason: e.to_string(),
        })?;
        let mnemonic = required_env("SEDA_MNEMONIC")?;
        let signer_address_raw = required_env("SEDA_SIGNER_ADDRESS")?;
        let signer_address: cosmrs::AccountId = signer_address_raw.parse().map_err(|e| ConfigError::InvalidValue {
            name: "SEDA_SIGNER_ADDRESS",
            value: signer_address_raw,
            reason: format!("{e}"),
        })?;

        let ids_raw = env_var("SEDA_ORACLE_PROGRAM_IDS").or_else(|| env_var("SEDA_ORACLE_PROGRAM_ID"));
        let ids_raw = ids_raw.ok_or(ConfigError::MissingVar("SEDA_ORACLE_PROGRAM_ID(S)"))?;
        let oracle_program_ids = ids_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SedaConfig {
            network,
            rpc_endpoint,
            mnemonic,
            signer_address,
            oracle_program_ids,
            dr_timeout_seconds: parse_env("SEDA_DR_TIMEOUT_SECONDS", seda_defaults::DR_TIMEOUT_SECONDS)?,
            dr_polling_interval_seconds: parse_env(
                "SEDA_DR_POLLING_INTERVAL_SECONDS",
                seda_defaults::DR_POLLING_INTERVAL_SECONDS,
            )?,
            scheduler_interval_ms: parse_env("SCHEDULER_INTERVAL_MS", seda_defaults::SCHEDULER_INTERVAL_MS)?,
            scheduler_continuous: parse_env("SCHEDULER_CONTINUOUS", true)?,
            scheduler_max_retries: parse_env("SCHEDULER_MAX_RETRIES", seda_defaults::SCHEDULER_MAX_RETRIES)?,
            scheduler_memo: env_var("SCHEDULER_MEMO").unwrap_or_else(|| seda_defaults::SCHEDULER_MEMO.to_string()),
            cosmos_posting_timeout_ms: parse_env(
                "COSMOS_POSTING_TIMEOUT_MS",
                seda_defaults::COSMOS_POSTING_TIMEOUT_MS,
            )?,
            cosmos_max_queue_size: parse_env("COSMOS_MAX_QUEUE_SIZE", seda_defaults::COSMOS_MAX_QUEUE_SIZE)?,
            nonce_sync_interval_ms: parse_env("NONCE_SYNC_INTERVAL_MS", seda_defaults::NONCE_SYNC_INTERVAL_MS)?,
            queue_processing_interval_ms: parse_env(
                "QUEUE_PROCESSING_INTERVAL_MS",
                seda_defaults::QUEUE_PROCESSING_INTERVAL_MS,
            )?,
            task_cleanup_interval_secs: parse_env(
                "TASK_CLEANUP_INTERVAL_SECS",
                seda_defaults::TASK_CLEANUP_INTERVAL_SECS,
            )?,
            task_max_age_secs: parse_env("TASK_MAX_AGE_SECS", seda_defaults::TASK_MAX_AGE_SECS)?,
        })
    }
}

/// Scans `EVM_NETWORKS` (a comma-separated list of network names, e.g.
/// `BASE,POLYGON`) and resolves `<NAME>_*` variables for each. The teacher's
/// config resolves chains from a JSON `chains` map; with an env-var only
/// interface there is no directory to scan, so the network list itself must
/// be named once (documented in DESIGN.md as a necessary supplement).
pub fn load_evm_networks(private_key: &str) -> Result<HashMap<String, EvmNetworkConfig>, ConfigError> {
    let _ = private_key; // validated by the signer collaborator, not here
    let names_raw = required_env("EVM_NETWORKS")?;
    let mut networks = HashMap::new();
    for raw_name in names_raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let prefix = raw_name.to_uppercase();
        let rpc_url_raw = required_env_prefixed(&prefix, "RPC_URL")?;
        let rpc_url = Url::parse(&rpc_url_raw).map_err(|e| ConfigError::InvalidValue {
            name: "RPC_URL",
            value: rpc_url_raw,
            reason: e.to_string(),
        })?;
        let rpc_fallbacks = env_var(&format!("{prefix}_RPC_URL_FALLBACKS"))
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Url::parse)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                name: "RPC_URL_FALLBACKS",
                value: prefix.clone(),
                reason: e.to_string(),
            })?
            .unwrap_or_default();

        let contract_address_raw = required_env_prefixed(&prefix, "CONTRACT_ADDRESS")?;
        let core_contract_address: Address =
            contract_address_raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "CONTRACT_ADDRESS",
                value: contract_address_raw,
                reason: "expected a 20-byte hex address".to_string(),
            })?;

        let chain_id: u64 = parse_env_prefixed(&prefix, "CHAIN_ID")?;
        let gas_limit: u64 = parse_env_prefixed(&prefix, "GAS_LIMIT")?;

        let max_fee = env_var(&format!("{prefix}_MAX_FEE_PER_GAS"));
        let max_priority_fee = env_var(&format!("{prefix}_MAX_PRIORITY_FEE_PER_GAS"));
        let gas_policy = if max_fee.is_some() || max_priority_fee.is_some() {
            GasPolicy::Eip1559 {
                max_fee_per_gas: parse_env_prefixed(&prefix, "MAX_FEE_PER_GAS")?,
                max_priority_fee_per_gas: parse_env_prefixed(&prefix, "MAX_PRIORITY_FEE_PER_GAS")?,
            }
        } else {
            GasPolicy::Legacy {
                gas_price: parse_env_prefixed(&prefix, "GAS_PRICE")?,
            }
        };

        let enabled = env_var(&format!("{prefix}_ENABLED"))
            .map(|raw| raw.parse::<bool>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                name: "ENABLED",
                value: prefix.clone(),
                reason: e.to_string(),
            })?
            .unwrap_or(true);

        let fee_claim_threshold: u128 = env_var(&format!("{prefix}_FEE_CLAIM_THRESHOLD"))
            .map(|raw| raw.parse())
            .transpose()
            .map_err(|_| ConfigError::InvalidValue {
                name: "FEE_CLAIM_THRESHOLD",
                value: prefix.clone(),
                reason: "expected a non-negative integer".to_string(),
            })?
            .unwrap_or(0);

        networks.insert(
            raw_name.to_string(),
            EvmNetworkConfig {
                name: raw_name.to_string(),
                chain_id,
                rpc_url,
                rpc_fallbacks,
                core_contract_address,
                gas_limit,
                gas_policy,
                enabled,
                fee_claim_threshold,
            },
        );
    }
    if networks.is_empty() {
        return Err(ConfigError::NoEvmNetworks);
    }
    Ok(networks)
}

fn required_env_prefixed(prefix: &str, suffix: &'static str) -> Result<String, ConfigError> {
    let key = format!("{prefix}_{suffix}");
    env_var(&key).ok_or_else(|| ConfigError::MissingVar(Box::leak(key.into_boxed_str())))
}

fn parse_env_prefixed<T: FromStr>(prefix: &str, suffix: &'static str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let key = format!("{prefix}_{suffix}");
    let raw = required_env_prefixed(prefix, suffix)?;
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        name: Box::leak(key.into_boxed_str()),
        value: raw,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_id_parses_with_and_without_0x_prefix() {
        let hex32 = "11".repeat(32);
        let a: ProgramId = hex32.parse().unwrap();
        let b: ProgramId = format!("0x{hex32}").parse().unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(a.0, [0x11u8; 32]);
    }

    #[test]
    fn program_id_rejects_wrong_length() {
        let res: Result<ProgramId, _> = "abcd".parse();
        assert!(res.is_err());
    }

    #[test]
    fn seda_network_parses_known_values() {
        assert_eq!("mainnet".parse::<SedaNetwork>().unwrap(), SedaNetwork::Mainnet);
        assert!("other".parse::<SedaNetwork>().is_err());
    }

    #[test]
    fn signer_address_rejects_malformed_bech32() {
        let res: Result<cosmrs::AccountId, _> = "not-a-bech32-address".parse();
        assert!(res.is_err());
    }
}
