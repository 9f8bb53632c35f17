//! PayFlow Ledger Client
//!
//! Typed call/event surface for the external settlement ledger.
//!
//! This crate carries no business logic: it defines the domain scalars
//! exchanged with the ledger, the [`LedgerApi`] call/event contract, and an
//! in-memory reference ledger ([`MemoryLedger`]) that reproduces the
//! observable contract semantics for tests and demos.
//!
//! # Contract surface
//!
//! - Mutating calls (`register_seller`, `create_payment_request`,
//!   `make_payment`, `transfer_direct`, `record_direct_payment`,
//!   `mark_expired`) take the transaction sender explicitly and resolve only
//!   after the ledger confirms them.
//! - Read calls (`check_status`, `get_request`, seller and history queries)
//!   return `Option` for unknown ids rather than erroring.
//! - `subscribe` yields a broadcast stream of [`LedgerEvent`]s; delivery may
//!   be duplicated or lag behind the calls that caused them.
//!
//! Failures propagate as a single [`Error::CallFailed`] condition carrying
//! the original cause. No retries happen at this layer.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod api;
pub mod error;
pub mod memory;
pub mod types;

// Re-exports
pub use api::LedgerApi;
pub use error::{Error, Result};
pub use memory::MemoryLedger;
pub use types::{
    Address, DirectRecord, HistoryPage, LedgerEvent, MediatedRecord, RequestSnapshot,
    SellerListing, SellerStats, StatusReport,
};
