//! Prover Discovery & Batch-State Cache (spec §4.8, component C8).
//!
//! Mirrors the facilitator's provider cache pattern (one entry per network,
//! populated lazily on first use) but over the two pieces of state the
//! fan-out coordinator actually needs: the prover address and the last
//! known batch height.

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;
use tracing::warn;

use crate::evm::EvmClient;

#[derive(Debug, Clone, Copy, Default)]
struct CacheEntry {
    prover: Option<Address>,
    last_batch_height: Option<u64>,
}

/// Keyed by `chain.name + "-" + core_address` (spec §4.8).
pub struct ProverCache {
    entries: DashMap<String, CacheEntry>,
}

fn cache_key(chain: &str, core_address: Address) -> String {
    format!("{chain}-{core_address}")
}

impl ProverCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Calls `get_seda_prover()` on the SEDA Core contract if not cached.
    /// A failed read is cached as unknown and surfaces as `None` — the
    /// caller treats the destination as offline for this operation.
    pub async fn discover(
        &self,
        client: &dyn EvmClient,
        chain: &str,
        core_address: Address,
    ) -> Option<Address> {
        let key = cache_key(chain, core_address);
        if let Some(entry) = self.entries.get(&key) {
            if let Some(prover) = entry.prover {
                return Some(prover);
            }
        }
        match client.read(core_address, "get_seda_prover", vec![]).await {
            Ok(bytes) if bytes.len() >= 20 => {
                let mut raw = [0u8; 20];
                raw.copy_from_slice(&bytes[bytes.len() - 20..]);
                let prover = Address::from(raw);
                self.entries.entry(key).or_default().prover = Some(prover);
                Some(prover)
            }
            Ok(_) => {
                warn!(chain, "get_seda_prover returned a malformed address");
                None
            }
            Err(err) => {
                warn!(chain, error = %err, "failed to discover prover contract");
                None
            }
        }
    }

    /// Calls `get_last_batch_height()` on the prover if not cached.
    pub async fn last_batch_height(
        &self,
        client: &dyn EvmClient,
        chain: &str,
        core_address: Address,
        prover: Address,
    ) -> Option<u64> {
        let key = cache_key(chain, core_address);
        if let Some(entry) = self.entries.get(&key) {
            if let Some(height) = entry.last_batch_height {
                return Some(height);
            }
        }
        match client.read(prover, "get_last_batch_height", vec![]).await {
            Ok(bytes) if bytes.len() >= 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[bytes.len() - 8..]);
                let height = u64::from_be_bytes(raw);
                self.entries.entry(key).or_default().last_batch_height = Some(height);
                Some(height)
            }
            Ok(_) => {
                warn!(chain, "get_last_batch_height returned a malformed value");
                None
            }
            Err(err) => {
                warn!(chain, error = %err, "failed to read last batch height");
                None
            }
        }
    }

    /// Updates the cached batch height after a successful post, avoiding a
    /// redundant read on the next fan-out.
    pub fn record_batch_height(&self, chain: &str, core_address: Address, height: u64) {
        let key = cache_key(chain, core_address);
        self.entries.entry(key).or_default().last_batch_height = Some(height);
    }

    pub fn cached(&self, chain: &str, core_address: Address) -> Option<Address> {
        self.entries.get(&cache_key(chain, core_address)).and_then(|e| e.prover)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for ProverCache {
    fn default() -> Self {
        Self::new()
    }
}
