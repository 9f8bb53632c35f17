//! Core types for the payment engine

use chrono::{DateTime, Utc};
use ledger_client::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle status of a payment request.
///
/// Transitions are monotonic: `Pending` may advance to either terminal
/// status, and a terminal status never regresses. When both terminal
/// statuses are ever reported for one id, `Completed` dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting payment inside the window
    Pending,
    /// Paid (terminal)
    Completed,
    /// Window closed unpaid (terminal)
    Expired,
}

impl PaymentStatus {
    /// Whether no further transitions are permitted
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Expired)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// Locally cached view of one payment request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Requester-assigned identifier, unique per request
    pub payment_id: String,

    /// Entitled recipient
    pub seller: Address,

    /// Fixed amount, immutable after creation
    pub amount: Decimal,

    /// When the request was first observed locally
    pub created_at: DateTime<Utc>,

    /// End of the payment window
    pub expiry_time: DateTime<Utc>,

    /// Current lifecycle status
    pub status: PaymentStatus,

    /// Paying address, set on completion
    pub buyer: Option<Address>,

    /// Amount actually recorded as paid (observed, not assumed)
    pub paid_amount: Option<Decimal>,
}

/// An unmediated transfer made during this session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectPayment {
    /// Receiving address
    pub counterparty: Address,

    /// Amount transferred
    pub amount: Decimal,

    /// When the transfer confirmed
    pub timestamp: DateTime<Utc>,
}

/// Cached seller registration and ledger-maintained aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerAccount {
    /// Seller address
    pub address: Address,

    /// Business name chosen at registration
    pub business_name: String,

    /// Registration flag as last mirrored from the ledger
    pub is_registered: bool,

    /// Completed transactions, mirrored from the ledger
    pub total_transactions: u64,

    /// Total value received, mirrored from the ledger
    pub total_amount: Decimal,
}

/// One row of a merged payment history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HistoryEntry {
    /// A payment that fulfilled a request
    Mediated {
        /// The fulfilled request
        payment_id: String,
        /// The other party (seller for client views, buyer for seller views)
        counterparty: Address,
        /// Seller business name when known
        business_name: Option<String>,
        /// Amount paid
        amount: Decimal,
        /// Completion time
        timestamp: DateTime<Utc>,
    },

    /// An unmediated transfer
    Direct {
        /// The other party
        counterparty: Address,
        /// Amount transferred
        amount: Decimal,
        /// Transfer time
        timestamp: DateTime<Utc>,
    },
}

impl HistoryEntry {
    /// Entry timestamp, for sorting
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HistoryEntry::Mediated { timestamp, .. } | HistoryEntry::Direct { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Entry amount
    pub fn amount(&self) -> Decimal {
        match self {
            HistoryEntry::Mediated { amount, .. } | HistoryEntry::Direct { amount, .. } => *amount,
        }
    }

    /// The other party
    pub fn counterparty(&self) -> &Address {
        match self {
            HistoryEntry::Mediated { counterparty, .. }
            | HistoryEntry::Direct { counterparty, .. } => counterparty,
        }
    }

    /// The fulfilled request id, for mediated entries
    pub fn payment_id(&self) -> Option<&str> {
        match self {
            HistoryEntry::Mediated { payment_id, .. } => Some(payment_id),
            HistoryEntry::Direct { .. } => None,
        }
    }
}

/// Merged view returned by a status check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusView {
    /// Reconciled lifecycle status
    pub status: PaymentStatus,

    /// Time left in the window as reported by the ledger at call time
    pub remaining_time: Duration,

    /// The locally cached record after the merge
    pub details: PaymentRequest,
}

/// Filter for local request views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    /// Every request
    #[default]
    All,
    /// Only pending requests
    Pending,
    /// Only completed requests
    Completed,
    /// Only expired requests
    Expired,
}

impl StatusFilter {
    /// Whether a status passes this filter
    pub fn matches(&self, status: PaymentStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status == PaymentStatus::Pending,
            StatusFilter::Completed => status == PaymentStatus::Completed,
            StatusFilter::Expired => status == PaymentStatus::Expired,
        }
    }
}
