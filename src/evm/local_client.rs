//! In-memory `EvmClient` for local development (spec §6 "local", mirrors
//! `cosmos::local_client`). A real EVM RPC/signer client is an out-of-scope
//! collaborator (spec §1).

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::evm::EvmClient;

pub struct LocalEvmClient {
    nonces: DashMap<Address, AtomicU64>,
    prover: Address,
    last_batch_height: AtomicU64,
}

impl LocalEvmClient {
    pub fn new(prover: Address) -> Self {
        Self { nonces: DashMap::new(), prover, last_batch_height: AtomicU64::new(0) }
    }
}

#[async_trait]
impl EvmClient for LocalEvmClient {
    async fn read(&self, _contract: Address, method: &str, _args: Vec<u8>) -> Result<Vec<u8>, String> {
        match method {
            "get_seda_prover" => Ok(self.prover.to_vec()),
            "get_last_batch_height" => Ok(self.last_batch_height.load(Ordering::SeqCst).to_be_bytes().to_vec()),
            "hasResult" => Ok(vec![0]),
            _ => Ok(vec![]),
        }
    }

    async fn write(&self, _contract: Address, method: &str, _args: Vec<u8>, _gas_limit: u64, nonce: u64) -> Result<String, String> {
        if method == "postBatch" {
            self.last_batch_height.fetch_add(1, Ordering::SeqCst);
        }
        Ok(format!("0xlocalevm{nonce:016x}"))
    }

    async fn wait_receipt(&self, _tx_hash: &str) -> Result<bool, String> {
        Ok(true)
    }

    async fn get_pending_nonce(&self, account: Address) -> Result<u64, String> {
        let counter = self.nonces.entry(account).or_insert_with(|| AtomicU64::new(0));
        Ok(counter.load(Ordering::SeqCst))
    }
}
