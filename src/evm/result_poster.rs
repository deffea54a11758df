//! Result Poster (spec §4.10, component C10).

use alloy_primitives::Address;
use thiserror::Error;
use tracing::{info, warn};

use crate::evm::EvmClient;
use crate::evm::nonce::NonceTable;
use crate::types::DataResult;

const MAX_TRANSACTION_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ResultPostError {
    #[error("result already posted")]
    AlreadyExists,
    #[error("result carries an invalid timestamp")]
    InvalidTimestamp,
    #[error("contract is paused")]
    Paused,
    #[error("nonce mismatch, retry with a fresh nonce")]
    NonceMismatch,
    #[error("retry budget exhausted after {0} attempts")]
    RetriesExhausted(u32),
    #[error("rpc error: {0}")]
    Rpc(String),
}

/// Hex-prefixed, integer-width-normalized encoding for `postResult` (spec
/// §4.10 "Serialization"). The real ABI binding is an out-of-scope
/// collaborator; this produces a stable byte layout for tests.
pub fn serialize_result(result: &DataResult, target_batch_height: u64, proof: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&result.dr_id);
    out.extend_from_slice(&result.block_height.to_be_bytes());
    out.extend_from_slice(&(result.gas_used as u64).to_be_bytes());
    out.extend_from_slice(&result.payback_address);
    out.extend_from_slice(&result.seda_payload);
    out.extend_from_slice(&target_batch_height.to_be_bytes());
    out.extend_from_slice(&(proof.len() as u32).to_be_bytes());
    for limb in proof {
        out.extend_from_slice(limb);
    }
    out
}

fn classify_error(message: &str) -> ResultPostError {
    if message.contains("InvalidResultTimestamp") {
        ResultPostError::InvalidTimestamp
    } else if message.contains("ResultAlreadyExists") {
        ResultPostError::AlreadyExists
    } else if message.contains("EnforcedPause") {
        ResultPostError::Paused
    } else if message.to_lowercase().contains("nonce") {
        ResultPostError::NonceMismatch
    } else {
        ResultPostError::Rpc(message.to_string())
    }
}

/// Posts `result` to `contract`, reserving an EVM nonce via C7 around the
/// write (spec §4.10 "Submission").
#[allow(clippy::too_many_arguments)]
pub async fn post_result(
    client: &dyn EvmClient,
    nonce_table: &NonceTable,
    chain: &str,
    account: Address,
    contract: Address,
    result: &DataResult,
    target_batch_height: u64,
    proof: &[Vec<u8>],
    gas_price: u128,
    confirmed_nonce: u64,
) -> Result<(), ResultPostError> {
    // Optional pre-submit check (spec §4.10): absent or reverting
    // `hasResult` is treated as "proceed".
    if let Ok(bytes) = client.read(contract, "hasResult", result.dr_id.to_vec()).await {
        if bytes.first() == Some(&1) {
            return Err(ResultPostError::AlreadyExists);
        }
    }

    let args = serialize_result(result, target_batch_height, proof);
    let mut reservation = nonce_table
        .reserve(client, chain, account, confirmed_nonce, gas_price)
        .await
        .map_err(|e| ResultPostError::Rpc(e.to_string()))?;

    let mut retry_count = 0u32;
    loop {
        match client.write(contract, "postResult", args.clone(), 300_000, reservation.nonce).await {
            Ok(tx_hash) => {
                nonce_table.confirm(chain, account, reservation.nonce, tx_hash.clone()).await;
                match client.wait_receipt(&tx_hash).await {
                    Ok(true) => {
                        info!(chain, dr_id = %hex::encode(result.dr_id), "result posted");
                        return Ok(());
                    }
                    Ok(false) | Err(_) => {
                        if retry_count >= MAX_TRANSACTION_RETRIES {
                            return Err(ResultPostError::RetriesExhausted(retry_count));
                        }
                        retry_count += 1;
                        reservation = nonce_table
                            .handle_failure(client, chain, account, reservation.nonce, confirmed_nonce)
                            .await
                            .map_err(|e| ResultPostError::Rpc(e.to_string()))?;
                        continue;
                    }
                }
            }
            Err(message) => {
                let error = classify_error(&message);
                match error {
                    ResultPostError::NonceMismatch => {
                        warn!(chain, retry_count, "nonce mismatch posting result, recovering via nonce coordinator");
                        if retry_count >= MAX_TRANSACTION_RETRIES {
                            return Err(ResultPostError::RetriesExhausted(retry_count));
                        }
                        retry_count += 1;
                        reservation = nonce_table
                            .handle_failure(client, chain, account, reservation.nonce, confirmed_nonce)
                            .await
                            .map_err(|e| ResultPostError::Rpc(e.to_string()))?;
                        continue;
                    }
                    terminal => {
                        nonce_table.release(chain, account, reservation.nonce).await;
                        return Err(terminal);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> DataResult {
        DataResult {
            dr_id: [7u8; 32],
            version: "0.1".into(),
            consensus: true,
            exit_code: 0,
            result: vec![1, 2, 3],
            block_height: 10,
            block_timestamp: 1000,
            gas_used: 55,
            payback_address: vec![0xaa],
            seda_payload: vec![0xbb],
            batch_assignment: 3,
        }
    }

    #[test]
    fn serialize_result_embeds_dr_id_and_target_batch_height() {
        let bytes = serialize_result(&sample_result(), 99, &[vec![1, 2]]);
        assert!(bytes.starts_with(&[7u8; 32]));
        assert!(bytes.windows(8).any(|w| w == 99u64.to_be_bytes()));
    }

    #[test]
    fn classify_error_maps_known_abi_substrings() {
        assert!(matches!(classify_error("InvalidResultTimestamp"), ResultPostError::InvalidTimestamp));
        assert!(matches!(classify_error("ResultAlreadyExists"), ResultPostError::AlreadyExists));
        assert!(matches!(classify_error("EnforcedPause"), ResultPostError::Paused));
        assert!(matches!(classify_error("nonce too low"), ResultPostError::NonceMismatch));
        assert!(matches!(classify_error("out of gas"), ResultPostError::Rpc(_)));
    }
}
