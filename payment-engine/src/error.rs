//! Error types for the payment engine

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::PaymentStatus;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payment engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// No wallet identity is available for this session
    #[error("no wallet identity available")]
    NotInitialized,

    /// A seller-only operation was attempted without registration
    #[error("not registered as a seller")]
    NotRegistered,

    /// A submission for this key is already in flight
    #[error("a submission for `{0}` is already in flight")]
    AlreadyProcessing(String),

    /// No payment request with this id is known to the ledger
    #[error("payment request `{0}` not found")]
    RequestNotFound(String),

    /// The payment window for this request has closed
    #[error("payment request `{0}` has expired")]
    Expired(String),

    /// This request has already been paid
    #[error("payment request `{0}` is already paid")]
    AlreadyPaid(String),

    /// The scanned input is neither a payment id nor a wallet address
    #[error("invalid input format: `{0}`")]
    InvalidInputFormat(String),

    /// Amounts must be strictly positive
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// A ledger call failed; the cause travels up unchanged
    #[error(transparent)]
    Ledger(#[from] ledger_client::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Two terminal statuses were reported for the same id.
    ///
    /// Resolved by the dominance rule (`completed` wins) and logged, never
    /// returned to callers.
    #[error("conflicting terminal status for `{payment_id}`: {observed} reported after {recorded}")]
    ReconciliationConflict {
        /// The request in conflict
        payment_id: String,
        /// Terminal status already recorded locally
        recorded: PaymentStatus,
        /// Terminal status just observed
        observed: PaymentStatus,
    },
}
