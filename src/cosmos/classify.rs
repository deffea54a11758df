//! Centralized substring classification table (spec §4.3, §9).
//!
//! The RPC layer shapes Cosmos SDK broadcast errors as plain strings; this is
//! the single place that turns those strings into a classification the
//! sequence coordinator can act on. Centralizing it here means a new
//! substring only needs to be added once.

/// Classification of a Cosmos broadcast error, as seen by the sequence
/// coordinator (spec §4.3 outcome table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CosmosErrorKind {
    /// The account sequence used for the submission was stale; `next_seq`
    /// must not advance and the task should retry.
    SequenceMismatch,
    /// The DR already landed on-chain under a different attempt; `next_seq`
    /// advanced regardless, so the coordinator treats this as success.
    DataRequestAlreadyExists,
    /// Anything else: transient RPC failure, timeout, or an error the
    /// coordinator doesn't special-case.
    Other,
}

const SEQUENCE_MISMATCH_SUBSTRINGS: &[&str] = &[
    "account sequence mismatch",
    "incorrect account sequence",
    "sequence number",
    "nonce too low",
    "sequence too low",
];

const ALREADY_EXISTS_SUBSTRINGS: &[&str] = &["DataRequestAlreadyExists"];

/// Classifies a raw error message from a Cosmos broadcast attempt.
pub fn classify(message: &str) -> CosmosErrorKind {
    if ALREADY_EXISTS_SUBSTRINGS.iter().any(|s| message.contains(s)) {
        return CosmosErrorKind::DataRequestAlreadyExists;
    }
    let lowered = message.to_lowercase();
    if SEQUENCE_MISMATCH_SUBSTRINGS
        .iter()
        .any(|s| lowered.contains(&s.to_lowercase()))
    {
        return CosmosErrorKind::SequenceMismatch;
    }
    CosmosErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_documented_sequence_mismatch_substring() {
        for s in SEQUENCE_MISMATCH_SUBSTRINGS {
            let msg = format!("rpc error: {s} (expected 5, got 4)");
            assert_eq!(classify(&msg), CosmosErrorKind::SequenceMismatch, "failed for {s}");
        }
    }

    #[test]
    fn recognizes_data_request_already_exists() {
        let msg = "codespace seda: DataRequestAlreadyExists: dr 0xabc already posted";
        assert_eq!(classify(msg), CosmosErrorKind::DataRequestAlreadyExists);
    }

    #[test]
    fn already_exists_takes_priority_over_sequence_wording() {
        let msg = "DataRequestAlreadyExists even though sequence number looked fine";
        assert_eq!(classify(msg), CosmosErrorKind::DataRequestAlreadyExists);
    }

    #[test]
    fn unrecognized_errors_classify_as_other() {
        assert_eq!(classify("connection reset by peer"), CosmosErrorKind::Other);
    }
}
