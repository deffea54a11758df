//! Unique-memo generator (spec §4.2, component C2).
//!
//! Stamps the Cosmos sequence number assigned by the sequence coordinator
//! onto a base memo, so that otherwise-identical DataRequests hash to
//! distinct content-addressed ids.

/// Generates `base_memo + " | seq:" + decimal(sequence_number)`.
pub fn generate(base_memo: &str, sequence_number: u64) -> Vec<u8> {
    format!("{base_memo} | seq:{sequence_number}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_base_memo_with_decimal_sequence() {
        let memo = generate("seda-push-solver", 17);
        assert_eq!(memo, b"seda-push-solver | seq:17");
    }

    #[test]
    fn distinct_sequence_numbers_yield_distinct_memos() {
        let a = generate("same base", 1);
        let b = generate("same base", 2);
        assert_ne!(a, b);
    }
}
