//! Input Classifier: routing scanned strings
//!
//! A scanned code is either a mediated payment id, a bare wallet address,
//! or garbage. Classification is pure and total: it performs no I/O and
//! makes no claim that a well-formed id actually exists on the ledger.

use chrono::{DateTime, Utc};
use ledger_client::Address;

/// Prefix carried by every mediated payment id
pub const PAYMENT_ID_PREFIX: &str = "pay_";

/// Alphanumeric characters after the prefix (millisecond timestamps when
/// generated here)
pub const PAYMENT_ID_TOKEN_LEN: usize = 13;

/// Routing decision for a scanned input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScannedInput {
    /// A mediated payment id; pay through the request lifecycle
    MediatedId(String),
    /// A wallet address; pay directly
    WalletAddress(Address),
    /// Neither shape; reject before any ledger traffic
    Invalid,
}

/// Classify a scanned string.
///
/// The two accepted shapes are disjoint: ids start with `pay_`, addresses
/// with `0x`. Surrounding whitespace is tolerated; anything else is not.
pub fn classify(input: &str) -> ScannedInput {
    let trimmed = input.trim();

    if let Some(token) = trimmed.strip_prefix(PAYMENT_ID_PREFIX) {
        if token.len() == PAYMENT_ID_TOKEN_LEN && token.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return ScannedInput::MediatedId(trimmed.to_string());
        }
        return ScannedInput::Invalid;
    }

    match Address::parse(trimmed) {
        Ok(address) => ScannedInput::WalletAddress(address),
        Err(_) => ScannedInput::Invalid,
    }
}

/// Mint a new payment id from a timestamp: `pay_` + 13-digit milliseconds.
///
/// Time-based, not random. Collisions are possible in principle and the
/// ledger's duplicate-id rejection is the arbiter.
pub fn new_payment_id(now: DateTime<Utc>) -> String {
    format!("{PAYMENT_ID_PREFIX}{:013}", now.timestamp_millis().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mediated_id_shape() {
        assert_eq!(
            classify("pay_1731519811637"),
            ScannedInput::MediatedId("pay_1731519811637".to_string())
        );
        // Whitespace from the scanner is tolerated
        assert_eq!(
            classify("  pay_1731519811637\n"),
            ScannedInput::MediatedId("pay_1731519811637".to_string())
        );
    }

    #[test]
    fn test_wallet_address_shape() {
        let input = "0xAbCd0000000000000000000000000000000012Ef";
        match classify(input) {
            ScannedInput::WalletAddress(addr) => {
                assert_eq!(addr.as_str(), input.to_ascii_lowercase());
            }
            other => panic!("expected address, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(classify(""), ScannedInput::Invalid);
        assert_eq!(classify("hello"), ScannedInput::Invalid);
        // Prefix right, token too short
        assert_eq!(classify("pay_123"), ScannedInput::Invalid);
        // Token right length, non-alphanumeric
        assert_eq!(classify("pay_17315198116-7"), ScannedInput::Invalid);
        // Token too long
        assert_eq!(classify("pay_17315198116370"), ScannedInput::Invalid);
        // Address one digit short
        assert_eq!(
            classify(&format!("0x{}", "a".repeat(39))),
            ScannedInput::Invalid
        );
    }

    #[test]
    fn test_generated_ids_classify_as_mediated() {
        let now = Utc.with_ymd_and_hms(2024, 11, 13, 17, 3, 31).unwrap();
        let id = new_payment_id(now);
        assert_eq!(id.len(), PAYMENT_ID_PREFIX.len() + PAYMENT_ID_TOKEN_LEN);
        assert!(matches!(classify(&id), ScannedInput::MediatedId(_)));
    }
}
