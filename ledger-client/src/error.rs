//! Error types for ledger calls

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger client errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A ledger call failed (transport error or ledger rejection).
    ///
    /// The client performs no business interpretation: whatever the ledger
    /// reported travels up unchanged in `cause`.
    #[error("ledger call `{method}` failed: {cause}")]
    CallFailed {
        /// Name of the failed call
        method: &'static str,
        /// Underlying cause as reported by the transport or ledger
        cause: String,
    },

    /// A string did not parse as a ledger address
    #[error("invalid address `{0}`: expected 0x followed by 40 hex digits")]
    InvalidAddress(String),
}

impl Error {
    /// Shorthand for a failed call
    pub fn call(method: &'static str, cause: impl Into<String>) -> Self {
        Error::CallFailed {
            method,
            cause: cause.into(),
        }
    }
}
