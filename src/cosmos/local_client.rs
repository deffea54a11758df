//! In-memory `SedaClient` for `SedaNetwork::Local` (spec §6 "local").
//!
//! A real Cosmos RPC/signer client is an out-of-scope collaborator (spec
//! §1); this stands in for it during local development the same way a
//! test double would, except it's wired through `SedaNetwork::Local`
//! instead of `#[cfg(test)]` so the rest of the pipeline can be exercised
//! end to end without a live SEDA chain.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::cosmos::SedaClient;
use crate::types::{Batch, DataRequest, DataResult, DrId};

pub struct LocalSedaClient {
    sequence: AtomicU64,
    results: DashMap<DrId, DataResult>,
}

impl LocalSedaClient {
    pub fn new() -> Self {
        Self { sequence: AtomicU64::new(0), results: DashMap::new() }
    }
}

impl Default for LocalSedaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SedaClient for LocalSedaClient {
    async fn submit_tx(&self, body: DataRequest, memo: Vec<u8>, seq: u64) -> Result<(String, Option<DrId>, u64), String> {
        let mut dr_id = [0u8; 32];
        dr_id[..8].copy_from_slice(&seq.to_be_bytes());
        dr_id[8] = memo.len() as u8;
        let tx_hash = format!("0xlocal{seq:016x}");
        self.results.insert(
            dr_id,
            DataResult {
                dr_id,
                version: body.version,
                consensus: true,
                exit_code: 0,
                result: vec![0x01],
                block_height: seq + 1,
                block_timestamp: seq,
                gas_used: 1,
                payback_address: body.payback_address,
                seda_payload: vec![],
                batch_assignment: 1,
            },
        );
        Ok((tx_hash, Some(dr_id), seq + 1))
    }

    async fn get_data_result(&self, dr_id: DrId, _post_height: u64) -> Result<Option<DataResult>, String> {
        Ok(self.results.get(&dr_id).map(|r| r.clone()))
    }

    async fn get_signed_batch(&self, batch_number: u64) -> Result<Option<Batch>, String> {
        Ok(Some(Batch {
            batch_number,
            block_height: batch_number,
            data_result_root: [0u8; 32],
            validator_root: [0u8; 32],
            secp256k1_signatures: vec![],
        }))
    }

    async fn get_account_sequence(&self, _address: &str) -> Result<u64, String> {
        Ok(self.sequence.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgramId;

    fn dr() -> DataRequest {
        DataRequest {
            version: "0.1".into(),
            exec_program_id: ProgramId([0u8; 32]),
            tally_program_id: ProgramId([0u8; 32]),
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
        }
    }

    #[tokio::test]
    async fn submit_then_fetch_round_trips_through_the_in_memory_store() {
        let client = LocalSedaClient::new();
        let (_, dr_id, _) = client.submit_tx(dr(), b"memo".to_vec(), 0).await.unwrap();
        let dr_id = dr_id.unwrap();
        let result = client.get_data_result(dr_id, 1).await.unwrap();
        assert!(result.is_some());
    }
}
