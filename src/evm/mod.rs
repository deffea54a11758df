//! EVM destination-chain collaborators (spec §4.7-§4.11, components C7-C11).

pub mod batch_poster;
pub mod fanout;
pub mod local_client;
pub mod nonce;
pub mod pause_monitor;
pub mod prover_cache;
pub mod result_poster;

use async_trait::async_trait;

/// The EVM RPC/signing client. Out-of-scope collaborator (spec §1) — only
/// the shape the nonce coordinator, batch poster, and result poster need is
/// declared here, mirroring how `cosmos::SedaClient` stands in for the
/// Cosmos side.
#[async_trait]
pub trait EvmClient: Send + Sync {
    /// Calls a read-only contract method and returns its ABI-decoded bytes.
    async fn read(
        &self,
        contract: alloy_primitives::Address,
        method: &str,
        args: Vec<u8>,
    ) -> Result<Vec<u8>, String>;

    /// Submits a state-changing contract call, returning the tx hash.
    #[allow(clippy::too_many_arguments)]
    async fn write(
        &self,
        contract: alloy_primitives::Address,
        method: &str,
        args: Vec<u8>,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<String, String>;

    /// Blocks until `tx_hash` lands, returning whether it succeeded.
    async fn wait_receipt(&self, tx_hash: &str) -> Result<bool, String>;

    /// Queries the pending-inclusive transaction count for `account`.
    async fn get_pending_nonce(&self, account: alloy_primitives::Address) -> Result<u64, String>;
}
