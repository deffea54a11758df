//! Shared domain data model (spec §3).

use crate::config::ProgramId;

/// Content-addressed DataRequest id: a 32-byte hash of its canonical
/// encoding, matched bit-exact with SEDA's own hashing by the (out-of-scope)
/// SEDA client collaborator.
pub type DrId = [u8; 32];

/// A unit of work addressed to the oracle (spec §3 DataRequest).
/// Fields are carried verbatim from configuration into every submission.
#[derive(Debug, Clone)]
pub struct DataRequest {
    pub version: String,
    pub exec_program_id: ProgramId,
    pub tally_program_id: ProgramId,
    pub exec_inputs: Vec<u8>,
    pub tally_inputs: Vec<u8>,
    pub consensus_filter: Vec<u8>,
    pub memo: Vec<u8>,
    pub replication_factor: u16,
    pub gas_price: u128,
    pub exec_gas_limit: u64,
    pub tally_gas_limit: u64,
    pub payback_address: Vec<u8>,
    pub request_fee: u128,
    pub result_fee: u128,
    pub batch_fee: u128,
}

/// The oracle's response to a DataRequest (spec §3 DataResult).
#[derive(Debug, Clone)]
pub struct DataResult {
    pub dr_id: DrId,
    pub version: String,
    pub consensus: bool,
    pub exit_code: u8,
    pub result: Vec<u8>,
    pub block_height: u64,
    pub block_timestamp: u64,
    pub gas_used: u128,
    pub payback_address: Vec<u8>,
    pub seda_payload: Vec<u8>,
    /// Height of the signed batch that attests to this result.
    pub batch_assignment: u64,
}

impl DataResult {
    /// Fan-out policy (spec §4.11): only consensus results with `exit_code`
    /// 0 are pushed to destination chains.
    pub fn should_fan_out(&self) -> bool {
        self.consensus && self.exit_code == 0
    }
}

/// One validator's signature over a batch (spec §3 Batch).
#[derive(Debug, Clone)]
pub struct Secp256k1Signature {
    pub validator_address: String,
    pub eth_address: alloy_primitives::Address,
    pub public_key: Vec<u8>,
    /// Out of 100_000_000 (spec §4.9 consensus percentage).
    pub voting_power_percentage: u64,
    pub signature: Vec<u8>,
    pub merkle_proof: Vec<Vec<u8>>,
}

/// A signed batch of finalized data results (spec §3 Batch).
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_number: u64,
    pub block_height: u64,
    pub data_result_root: [u8; 32],
    pub validator_root: [u8; 32],
    pub secp256k1_signatures: Vec<Secp256k1Signature>,
}

/// Two-thirds of voting power, expressed out of 100_000_000 (spec §4.9).
pub const CONSENSUS_PERCENTAGE: u64 = 66_666_666;

#[cfg(test)]
mod tests {
    use super::*;

    fn result(consensus: bool, exit_code: u8) -> DataResult {
        DataResult {
            dr_id: [0u8; 32],
            version: "0.1".into(),
            consensus,
            exit_code,
            result: vec![],
            block_height: 1,
            block_timestamp: 1,
            gas_used: 0,
            payback_address: vec![],
            seda_payload: vec![],
            batch_assignment: 1,
        }
    }

    #[test]
    fn fans_out_only_on_consensus_and_zero_exit_code() {
        assert!(result(true, 0).should_fan_out());
        assert!(!result(false, 0).should_fan_out());
        assert!(!result(true, 1).should_fan_out());
    }
}
