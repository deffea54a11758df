//! Batch Poster (spec §4.9, component C9).
//!
//! Posts a signed SEDA batch to a destination chain's prover contract,
//! validating validator-signature consensus the way the facilitator
//! validates payment authorization before submission: reject early on
//! anything malformed, only then touch the chain.

use std::collections::VecDeque;

use alloy_primitives::Address;
use thiserror::Error;
use tracing::{info, warn};

use crate::evm::EvmClient;
use crate::evm::nonce::NonceTable;
use crate::types::{Batch, CONSENSUS_PERCENTAGE, Secp256k1Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Queued,
    Posting,
    Posted,
    RecoveryNeeded,
    Dropped,
}

#[derive(Debug, Error)]
pub enum BatchPostError {
    #[error("signer key is missing")]
    MissingSigner,
    #[error("batch number or height is zero")]
    ZeroBatch,
    #[error("batch carries no signatures")]
    NoSignatures,
    #[error("consensus not reached: {0} of {CONSENSUS_PERCENTAGE} required")]
    ConsensusNotReached(u64),
    #[error("contract reports the batch already exists")]
    AlreadyExists,
    #[error("contract is paused")]
    Paused,
    #[error("nonce mismatch, retry with a fresh nonce")]
    NonceMismatch,
    #[error("rpc error: {0}")]
    Rpc(String),
}

const MAX_TRANSACTION_RETRIES: u32 = 3;

/// Validates prerequisites (spec §4.9).
fn validate_prerequisites(signer_present: bool, batch: &Batch) -> Result<(), BatchPostError> {
    if !signer_present {
        return Err(BatchPostError::MissingSigner);
    }
    if batch.batch_number == 0 || batch.block_height == 0 {
        return Err(BatchPostError::ZeroBatch);
    }
    if batch.secp256k1_signatures.is_empty() {
        return Err(BatchPostError::NoSignatures);
    }
    Ok(())
}

/// Builds the submission set: for each signature already known to the
/// contract (`known`), find the matching validator in `new` and keep it
/// only if the validator hasn't rotated keys. Sums voting power and sorts
/// lexicographically by ETH address (spec §4.9).
pub fn select_submission_signatures(
    new: &Batch,
    known: &Batch,
) -> Result<Vec<Secp256k1Signature>, BatchPostError> {
    let mut kept = Vec::new();
    let mut total_power: u64 = 0;

    for known_sig in &known.secp256k1_signatures {
        let Some(new_sig) = new
            .secp256k1_signatures
            .iter()
            .find(|s| s.validator_address == known_sig.validator_address)
        else {
            continue;
        };
        if new_sig.eth_address != known_sig.eth_address {
            // Validator rotated keys; the contract won't accept this signature.
            continue;
        }
        total_power += new_sig.voting_power_percentage;
        kept.push(new_sig.clone());
    }

    if total_power < CONSENSUS_PERCENTAGE {
        return Err(BatchPostError::ConsensusNotReached(total_power));
    }

    kept.sort_by(|a, b| format!("{:x}", a.eth_address).cmp(&format!("{:x}", b.eth_address)));
    Ok(kept)
}

/// Classifies an ABI revert/error message (spec §4.9 "ABI-bound substrings").
fn classify_error(message: &str) -> BatchPostError {
    if message.contains("ConsensusNotReached") {
        BatchPostError::ConsensusNotReached(0)
    } else if message.contains("BatchAlreadyExists") {
        BatchPostError::AlreadyExists
    } else if message.contains("EnforcedPause") {
        BatchPostError::Paused
    } else if message.to_lowercase().contains("nonce") {
        BatchPostError::NonceMismatch
    } else {
        BatchPostError::Rpc(message.to_string())
    }
}

/// Queue of batches awaiting posting on one destination chain. A
/// `BatchConsensusNotReached` response inserts a recovery batch at the
/// front, converging by binary search (spec §4.9 "Recovery batch").
pub struct BatchQueue {
    queue: VecDeque<u64>,
    paused: bool,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self { queue: VecDeque::new(), paused: false }
    }

    pub fn push(&mut self, batch_number: u64) {
        self.queue.push_back(batch_number);
    }

    pub fn push_recovery(&mut self, contract_height: u64, failed_height: u64) -> u64 {
        let recovery_height = contract_height + (failed_height - contract_height) / 2;
        self.queue.push_front(recovery_height);
        recovery_height
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The final target height still owed once the queue drains, if any
    /// (recovery heights are pushed to the front, so the original target
    /// sits at the back).
    pub fn peek_back(&self) -> Option<u64> {
        self.queue.back().copied()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn pop(&mut self) -> Option<u64> {
        if self.paused { None } else { self.queue.pop_front() }
    }
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Posts `new` batch to `prover` on `chain`, using `known` (the contract's
/// current latest batch) to compute the submission set.
#[allow(clippy::too_many_arguments)]
pub async fn post_batch(
    client: &dyn EvmClient,
    nonce_table: &NonceTable,
    chain: &str,
    account: Address,
    prover: Address,
    signer_present: bool,
    new: &Batch,
    known: &Batch,
    gas_price: u128,
) -> Result<(BatchState, u64), BatchPostError> {
    validate_prerequisites(signer_present, new)?;
    let signatures = select_submission_signatures(new, known)?;

    let mut reservation = nonce_table
        .reserve(client, chain, account, known.block_height, gas_price)
        .await
        .map_err(|e| BatchPostError::Rpc(e.to_string()))?;

    let mut retry_count = 0u32;
    loop {
        let args = encode_batch_submission(new, &signatures);
        let result = client.write(prover, "postBatch", args, 500_000, reservation.nonce).await;

        match result {
            Ok(tx_hash) => {
                nonce_table.confirm(chain, account, reservation.nonce, tx_hash.clone()).await;
                match client.wait_receipt(&tx_hash).await {
                    Ok(true) => {
                        info!(chain, batch_number = new.batch_number, "batch posted");
                        return Ok((BatchState::Posted, new.batch_number));
                    }
                    Ok(false) | Err(_) => {
                        return Ok((BatchState::RecoveryNeeded, new.batch_number));
                    }
                }
            }
            Err(message) => {
                let error = classify_error(&message);
                match error {
                    BatchPostError::AlreadyExists => {
                        nonce_table.release(chain, account, reservation.nonce).await;
                        return Ok((BatchState::Dropped, new.batch_number));
                    }
                    BatchPostError::ConsensusNotReached(_) => {
                        nonce_table.release(chain, account, reservation.nonce).await;
                        return Ok((BatchState::RecoveryNeeded, new.batch_number));
                    }
                    BatchPostError::Paused => {
                        nonce_table.release(chain, account, reservation.nonce).await;
                        return Err(BatchPostError::Paused);
                    }
                    BatchPostError::NonceMismatch => {
                        warn!(chain, retry_count, "nonce mismatch posting batch, recovering via nonce coordinator");
                        if retry_count >= MAX_TRANSACTION_RETRIES {
                            return Err(BatchPostError::NonceMismatch);
                        }
                        retry_count += 1;
                        reservation = nonce_table
                            .handle_failure(client, chain, account, reservation.nonce, known.block_height)
                            .await
                            .map_err(|e| BatchPostError::Rpc(e.to_string()))?;
                        continue;
                    }
                    other => {
                        nonce_table.release(chain, account, reservation.nonce).await;
                        return Err(other);
                    }
                }
            }
        }
    }
}

/// Placeholder ABI encoding: the real contract binding is an out-of-scope
/// collaborator (spec §1); this produces a stable byte layout callers can
/// assert against in tests.
fn encode_batch_submission(batch: &Batch, signatures: &[Secp256k1Signature]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&batch.batch_number.to_be_bytes());
    out.extend_from_slice(&(signatures.len() as u32).to_be_bytes());
    out
}
