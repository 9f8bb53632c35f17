//! Domain scalars exchanged with the ledger
//!
//! All types decode straight from the ledger's call/event surface. Money is
//! exact decimal in the ledger's native unit; timestamps are UTC.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Number of hex digits in an address (excluding the `0x` prefix)
const ADDRESS_HEX_LEN: usize = 40;

/// A ledger account address: `0x` followed by 40 hex digits.
///
/// Stored normalised to lowercase so addresses compare and hash by value
/// regardless of the casing they were scanned or typed with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Parse and normalise an address string
    pub fn parse(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix("0x")
            .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
        if hex.len() != ADDRESS_HEX_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// The all-zero address the ledger uses for "no buyer"
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(ADDRESS_HEX_LEN)))
    }

    /// Whether this is the all-zero address
    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

/// Decoded result of a `check_status` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    /// Payment received for this request
    pub is_paid: bool,

    /// Payment window closed without payment, as computed by the ledger
    pub is_expired: bool,

    /// Time left in the payment window (zero once closed)
    pub remaining_time: Duration,

    /// Paying address; `None` until paid (the zero address decodes to `None`)
    pub buyer: Option<Address>,
}

/// Full on-ledger payment request record, from the public request getter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Requester-assigned identifier
    pub payment_id: String,

    /// Entitled recipient
    pub seller: Address,

    /// Fixed amount, in the ledger's native unit
    pub amount: Decimal,

    /// End of the payment window
    pub expiry_time: DateTime<Utc>,

    /// Payment received
    pub is_paid: bool,

    /// Marked expired on the ledger
    pub is_expired: bool,

    /// Paying address, once paid
    pub buyer: Option<Address>,
}

/// Registered seller aggregates maintained by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerStats {
    /// Immutable business name chosen at registration
    pub business_name: String,

    /// Completed transactions, monotonically non-decreasing
    pub total_transactions: u64,

    /// Total value received, monotonically non-decreasing
    pub total_amount: Decimal,
}

/// One row of the paginated seller directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerListing {
    /// Seller address
    pub address: Address,

    /// Business name
    pub business_name: String,

    /// Completed transactions
    pub total_transactions: u64,

    /// Total value received
    pub total_amount: Decimal,
}

/// A completed mediated payment, as recorded by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediatedRecord {
    /// The request this payment fulfilled
    pub payment_id: String,

    /// Paying address
    pub buyer: Address,

    /// Receiving address
    pub seller: Address,

    /// Seller business name, when the ledger knows it
    pub business_name: Option<String>,

    /// Amount paid
    pub amount: Decimal,

    /// When the payment completed
    pub timestamp: DateTime<Utc>,
}

/// An unmediated transfer attributed to a registered seller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectRecord {
    /// Paying address
    pub payer: Address,

    /// Receiving address
    pub recipient: Address,

    /// Amount transferred
    pub amount: Decimal,

    /// When the transfer was recorded
    pub timestamp: DateTime<Utc>,
}

/// History query result: both record kinds, disjoint by construction
/// (mediated records always carry an id, direct records never do)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Mediated payments
    pub mediated: Vec<MediatedRecord>,

    /// Direct payments
    pub direct: Vec<DirectRecord>,
}

/// Events pushed by the ledger.
///
/// Delivery order relative to call results is not guaranteed, and the same
/// event may be delivered more than once; consumers must merge idempotently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A payment request entered its window
    RequestCreated {
        /// Request identifier
        payment_id: String,
        /// Requesting seller
        seller: Address,
        /// Fixed amount
        amount: Decimal,
        /// End of the payment window
        expiry_time: DateTime<Utc>,
    },

    /// A payment request was paid
    RequestCompleted {
        /// Request identifier
        payment_id: String,
        /// Paying address
        buyer: Address,
        /// Receiving address
        seller: Address,
        /// Amount paid
        amount: Decimal,
    },

    /// A payment request's window closed unpaid
    RequestExpired {
        /// Request identifier
        payment_id: String,
    },

    /// A seller registered
    SellerRegistered {
        /// Seller address
        seller: Address,
        /// Business name
        business_name: String,
    },
}

impl LedgerEvent {
    /// The payment id this event concerns, if any
    pub fn payment_id(&self) -> Option<&str> {
        match self {
            LedgerEvent::RequestCreated { payment_id, .. }
            | LedgerEvent::RequestCompleted { payment_id, .. }
            | LedgerEvent::RequestExpired { payment_id } => Some(payment_id),
            LedgerEvent::SellerRegistered { .. } => None,
        }
    }
}
