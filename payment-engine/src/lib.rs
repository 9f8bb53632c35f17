//! PayFlow payment engine
//!
//! Client-side engine driving payment flows against an external
//! authoritative ledger. The ledger owns the request lifecycle; this crate
//! owns a per-session cache of it and keeps that cache consistent while
//! observations arrive late, duplicated, and out of order.
//!
//! The pieces, inside out:
//!
//! - [`store::RequestStore`] caches requests, seller accounts, and direct
//!   payments with monotonic merge-by-id semantics.
//! - [`reconcile::ReconciliationEngine`] folds pushed events, status polls,
//!   and the expiry sweep into the store.
//! - [`guard::SubmissionGuard`] keeps at most one submission in flight per
//!   payment id or recipient address.
//! - [`classifier`] routes scanned input between mediated and direct
//!   payment flows.
//! - [`orchestrator::PaymentOrchestrator`] is the operation surface a UI
//!   talks to, one per wallet identity.
//! - [`session`] opens, supervises, and tears down orchestrators as the
//!   wallet identity changes.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod classifier;
pub mod config;
pub mod error;
pub mod guard;
pub mod orchestrator;
pub mod poller;
pub mod reconcile;
pub mod records;
pub mod session;
pub mod store;
pub mod types;

pub use classifier::{classify, new_payment_id, ScannedInput};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use guard::{SubmissionGuard, SubmissionPermit};
pub use orchestrator::{PaymentOrchestrator, PaymentOutcome};
pub use poller::PollerHandle;
pub use reconcile::ReconciliationEngine;
pub use records::{MemoryRecordService, NullRecordService, RecordService};
pub use session::{PaymentSession, SessionManager, StaticWallet, WalletProvider};
pub use store::{MergeOutcome, RequestStore};
pub use types::{
    DirectPayment, HistoryEntry, PaymentRequest, PaymentStatus, SellerAccount, StatusFilter,
    StatusView,
};
