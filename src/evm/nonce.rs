//! EVM Nonce Coordinator (spec §4.7, component C7).
//!
//! Generalizes the facilitator's `PendingNonceManager`
//! (`chain/eip155/pending_nonce_manager.rs`) from a single sentinel-backed
//! counter per address to a full pending-nonce table per (chain, account):
//! where the facilitator only ever needs "the next nonce", the fan-out side
//! needs gap detection, stuck-transaction escalation, and explicit failure
//! recovery, so the single `Mutex<u64>` becomes a `Mutex<AccountNonces>`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::evm::EvmClient;

const DEFAULT_GAP_TOLERANCE: u64 = 10;
const DEFAULT_STUCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_MAX_RETRY_COUNT: u32 = 3;
const DEFAULT_MAX_PENDING_TRANSACTIONS: usize = 50;
const GAS_ESCALATION_FACTOR: f64 = 1.2;
const REPLACEMENT_GAS_FACTOR: f64 = 1.1;

#[derive(Debug, Error)]
pub enum NonceError {
    #[error("pending transaction table is full for this account ({0} entries)")]
    TableFull(usize),
    #[error("rpc error while reading nonce state: {0}")]
    Rpc(String),
}

#[derive(Debug, Clone)]
pub struct PendingEvmTx {
    pub nonce: u64,
    pub gas_price: u128,
    pub first_seen: Instant,
    pub retry_count: u32,
    pub is_stuck: bool,
    pub tx_hash: Option<String>,
}

/// A successful reservation. `confirm`/`release` act on the same (chain,
/// account, nonce) entry that `reserve` inserted.
pub struct Reservation {
    pub nonce: u64,
    pub gas_price: u128,
    pub is_replacement: bool,
}

#[derive(Default)]
struct AccountNonces {
    confirmed_nonce: u64,
    pending_nonce: u64,
    pending_tx_by_nonce: BTreeMap<u64, PendingEvmTx>,
}

pub struct NonceTable {
    accounts: DashMap<(String, Address), Arc<Mutex<AccountNonces>>>,
    gap_tolerance: u64,
    stuck_timeout: Duration,
    max_retry_count: u32,
    max_pending_transactions: usize,
    default_gas_price: u128,
}

impl NonceTable {
    pub fn new(default_gas_price: u128) -> Self {
        Self {
            accounts: DashMap::new(),
            gap_tolerance: DEFAULT_GAP_TOLERANCE,
            stuck_timeout: DEFAULT_STUCK_TIMEOUT,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            max_pending_transactions: DEFAULT_MAX_PENDING_TRANSACTIONS,
            default_gas_price,
        }
    }

    fn entry(&self, chain: &str, account: Address) -> Arc<Mutex<AccountNonces>> {
        Arc::clone(
            self.accounts
                .entry((chain.to_string(), account))
                .or_insert_with(|| Arc::new(Mutex::new(AccountNonces::default())))
                .value(),
        )
    }

    /// Reserves the next nonce for (chain, account). Always re-reads
    /// latest+pending from the chain (spec §4.7 "not cached").
    pub async fn reserve(
        &self,
        client: &dyn EvmClient,
        chain: &str,
        account: Address,
        latest: u64,
        gas_price: u128,
    ) -> Result<Reservation, NonceError> {
        let pending = client
            .get_pending_nonce(account)
            .await
            .map_err(NonceError::Rpc)?;
        if pending.saturating_sub(latest) > self.gap_tolerance {
            warn!(chain, %account, latest, pending, "nonce gap exceeds tolerance");
        }

        let slot = self.entry(chain, account);
        let mut table = slot.lock().await;
        table.confirmed_nonce = latest;
        table.pending_nonce = pending;
        table.pending_tx_by_nonce.retain(|&nonce, _| nonce >= latest);

        if table.pending_tx_by_nonce.len() >= self.max_pending_transactions {
            return Err(NonceError::TableFull(table.pending_tx_by_nonce.len()));
        }

        let highest_reserved = table.pending_tx_by_nonce.keys().next_back().copied();
        let next = match highest_reserved {
            Some(highest) => pending.max(highest + 1),
            None => pending,
        };

        let (resolved_gas_price, is_replacement) = match table.pending_tx_by_nonce.get(&next) {
            Some(existing) => {
                let escalated = (existing.gas_price as f64 * REPLACEMENT_GAS_FACTOR) as u128;
                (gas_price.max(escalated), true)
            }
            None => (gas_price, false),
        };

        table.pending_tx_by_nonce.insert(
            next,
            PendingEvmTx {
                nonce: next,
                gas_price: resolved_gas_price,
                first_seen: Instant::now(),
                retry_count: 0,
                is_stuck: false,
                tx_hash: None,
            },
        );

        Ok(Reservation { nonce: next, gas_price: resolved_gas_price, is_replacement })
    }

    /// Attaches a broadcast hash to a reserved nonce.
    pub async fn confirm(&self, chain: &str, account: Address, nonce: u64, tx_hash: String) {
        let slot = self.entry(chain, account);
        let mut table = slot.lock().await;
        if let Some(entry) = table.pending_tx_by_nonce.get_mut(&nonce) {
            entry.tx_hash = Some(tx_hash);
        }
    }

    /// Releases a reserved nonce without confirming it (e.g. the caller
    /// decided not to broadcast after all).
    pub async fn release(&self, chain: &str, account: Address, nonce: u64) {
        let slot = self.entry(chain, account);
        let mut table = slot.lock().await;
        table.pending_tx_by_nonce.remove(&nonce);
    }

    /// Failure recovery (spec §4.7): drop the failed entry, force-refresh,
    /// and reserve a fresh nonce with fresh gas price.
    pub async fn handle_failure(
        &self,
        client: &dyn EvmClient,
        chain: &str,
        account: Address,
        failed_nonce: u64,
        latest: u64,
    ) -> Result<Reservation, NonceError> {
        {
            let slot = self.entry(chain, account);
            let mut table = slot.lock().await;
            table.pending_tx_by_nonce.remove(&failed_nonce);
        }
        self.reserve(client, chain, account, latest, self.default_gas_price).await
    }

    /// Periodic sync (spec §4.7, default interval 15s): drops confirmed
    /// entries, flags stuck ones and escalates their gas price.
    pub async fn sync(&self, chain: &str, account: Address, latest: u64, pending: u64) -> Vec<PendingEvmTx> {
        let slot = self.entry(chain, account);
        let mut table = slot.lock().await;
        table.confirmed_nonce = latest;
        table.pending_nonce = pending;
        table.pending_tx_by_nonce.retain(|&nonce, _| nonce >= latest);

        let now = Instant::now();
        let mut escalated = Vec::new();
        for entry in table.pending_tx_by_nonce.values_mut() {
            if now.duration_since(entry.first_seen) > self.stuck_timeout {
                entry.is_stuck = true;
                if entry.retry_count < self.max_retry_count {
                    entry.retry_count += 1;
                    entry.gas_price = (entry.gas_price as f64 * GAS_ESCALATION_FACTOR) as u128;
                    escalated.push(entry.clone());
                }
            }
        }
        escalated
    }

    pub async fn pending_count(&self, chain: &str, account: Address) -> usize {
        let slot = self.entry(chain, account);
        slot.lock().await.pending_tx_by_nonce.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeEvm {
        pending: AtomicU64,
    }

    #[async_trait]
    impl EvmClient for FakeEvm {
        async fn read(&self, _c: Address, _m: &str, _a: Vec<u8>) -> Result<Vec<u8>, String> {
            unimplemented!()
        }
        async fn write(&self, _c: Address, _m: &str, _a: Vec<u8>, _g: u64, _n: u64) -> Result<String, String> {
            unimplemented!()
        }
        async fn wait_receipt(&self, _h: &str) -> Result<bool, String> {
            unimplemented!()
        }
        async fn get_pending_nonce(&self, _account: Address) -> Result<u64, String> {
            Ok(self.pending.load(Ordering::SeqCst))
        }
    }

    fn account() -> Address {
        Address::from([0x11; 20])
    }

    #[tokio::test]
    async fn first_reservation_starts_from_pending_count() {
        let client = FakeEvm { pending: AtomicU64::new(5) };
        let table = NonceTable::new(1_000_000_000);
        let reservation = table.reserve(&client, "eth", account(), 5, 1_000_000_000).await.unwrap();
        assert_eq!(reservation.nonce, 5);
        assert!(!reservation.is_replacement);
    }

    #[tokio::test]
    async fn second_reservation_skips_past_the_first() {
        let client = FakeEvm { pending: AtomicU64::new(5) };
        let table = NonceTable::new(1_000_000_000);
        let first = table.reserve(&client, "eth", account(), 5, 1_000_000_000).await.unwrap();
        let second = table.reserve(&client, "eth", account(), 5, 1_000_000_000).await.unwrap();
        assert_eq!(first.nonce, 5);
        assert_eq!(second.nonce, 6);
    }

    #[tokio::test]
    async fn reserving_an_already_pending_nonce_marks_it_a_replacement_with_higher_gas() {
        let client = FakeEvm { pending: AtomicU64::new(5) };
        let table = NonceTable::new(1_000_000_000);
        table.reserve(&client, "eth", account(), 5, 1_000_000_000).await.unwrap();
        // Next call still reports pending=5 from the chain (no sync happened),
        // so the table must detect the collision against its own reserved set.
        client.pending.store(5, Ordering::SeqCst);
        let slot = table.entry("eth", account());
        {
            let mut guard = slot.lock().await;
            guard.pending_tx_by_nonce.retain(|&n, _| n != 5);
            guard.pending_tx_by_nonce.insert(
                5,
                PendingEvmTx {
                    nonce: 5,
                    gas_price: 1_000_000_000,
                    first_seen: Instant::now(),
                    retry_count: 0,
                    is_stuck: false,
                    tx_hash: None,
                },
            );
        }
        let reservation = table.reserve(&client, "eth", account(), 5, 1_000_000_000).await.unwrap();
        assert_eq!(reservation.nonce, 5);
        assert!(reservation.is_replacement);
        assert!(reservation.gas_price > 1_000_000_000);
    }

    #[tokio::test]
    async fn table_full_rejects_further_reservations() {
        let client = FakeEvm { pending: AtomicU64::new(0) };
        let mut table = NonceTable::new(1_000_000_000);
        table.max_pending_transactions = 2;
        table.reserve(&client, "eth", account(), 0, 1_000_000_000).await.unwrap();
        client.pending.store(1, Ordering::SeqCst);
        table.reserve(&client, "eth", account(), 0, 1_000_000_000).await.unwrap();
        client.pending.store(2, Ordering::SeqCst);
        let result = table.reserve(&client, "eth", account(), 0, 1_000_000_000).await;
        assert!(matches!(result, Err(NonceError::TableFull(_))));
    }

    #[tokio::test]
    async fn sync_drops_confirmed_entries_and_flags_stuck_ones() {
        let client = FakeEvm { pending: AtomicU64::new(0) };
        let table = NonceTable::new(1_000_000_000);
        table.reserve(&client, "eth", account(), 0, 1_000_000_000).await.unwrap();
        {
            let slot = table.entry("eth", account());
            let mut guard = slot.lock().await;
            for entry in guard.pending_tx_by_nonce.values_mut() {
                entry.first_seen = Instant::now() - Duration::from_secs(10 * 60);
            }
        }
        let escalated = table.sync("eth", account(), 0, 0).await;
        assert_eq!(escalated.len(), 1);
        assert!(escalated[0].is_stuck);
        assert!(escalated[0].gas_price > 1_000_000_000);
    }

    #[tokio::test]
    async fn handle_failure_drops_and_reissues() {
        let client = FakeEvm { pending: AtomicU64::new(5) };
        let table = NonceTable::new(1_000_000_000);
        let first = table.reserve(&client, "eth", account(), 5, 1_000_000_000).await.unwrap();
        let recovered = table.handle_failure(&client, "eth", account(), first.nonce, 5).await.unwrap();
        assert_eq!(recovered.nonce, 5);
        assert_eq!(table.pending_count("eth", account()).await, 1);
    }
}
