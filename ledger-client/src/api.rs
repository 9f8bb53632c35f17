//! The ledger call/event contract
//!
//! [`LedgerApi`] is the complete surface the engine consumes. Implementations
//! are pure transport + decoding: no retries, no business interpretation.
//! Mutating calls resolve only once the ledger has confirmed the transaction,
//! so a returned `Ok` means durable.

use crate::types::{
    Address, HistoryPage, LedgerEvent, RequestSnapshot, SellerListing, SellerStats, StatusReport,
};
use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::broadcast;

/// Typed wrapper around the external ledger.
///
/// Mutating calls take the transaction sender explicitly (`from`); identity
/// belongs to the wallet session, not to this client.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Register `from` as a seller under `business_name`.
    ///
    /// The ledger rejects duplicate registration; this client does not
    /// pre-check.
    async fn register_seller(&self, from: &Address, business_name: &str) -> Result<()>;

    /// Open a payment request for a fixed `amount`, identified by the
    /// requester-assigned `payment_id`. The ledger stamps the expiry as
    /// now + payment window and rejects duplicate ids.
    async fn create_payment_request(
        &self,
        from: &Address,
        payment_id: &str,
        amount: Decimal,
    ) -> Result<()>;

    /// Pay an open request. `amount` is the value sent with the call and
    /// must equal the request's fixed amount.
    async fn make_payment(&self, from: &Address, payment_id: &str, amount: Decimal) -> Result<()>;

    /// Raw value transfer to `recipient`, outside any request lifecycle.
    async fn transfer_direct(
        &self,
        from: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> Result<()>;

    /// Attribute a direct transfer to a registered seller's aggregates.
    /// Fails if `recipient` is not registered; callers treat this call as
    /// best-effort.
    async fn record_direct_payment(
        &self,
        from: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> Result<()>;

    /// Authoritative status of a request; `None` for unknown ids.
    async fn check_status(&self, payment_id: &str) -> Result<Option<StatusReport>>;

    /// Full on-ledger request record; `None` for unknown ids.
    async fn get_request(&self, payment_id: &str) -> Result<Option<RequestSnapshot>>;

    /// Make a request whose window has elapsed durably expired.
    ///
    /// Idempotent on the ledger side: multiple observers may race to issue
    /// this for the same id.
    async fn mark_expired(&self, from: &Address, payment_id: &str) -> Result<()>;

    /// Seller aggregates; `None` if the address never registered.
    async fn get_seller_stats(&self, seller: &Address) -> Result<Option<SellerStats>>;

    /// Paginated seller directory.
    async fn get_all_sellers(&self, offset: u64, limit: u64) -> Result<Vec<SellerListing>>;

    /// Payments made by `client`, as recorded by the ledger.
    async fn get_client_history(&self, client: &Address) -> Result<HistoryPage>;

    /// Payments received by `seller`, mediated and direct.
    async fn get_seller_history(&self, seller: &Address) -> Result<HistoryPage>;

    /// The ledger-defined payment window applied to new requests.
    async fn payment_window(&self) -> Result<Duration>;

    /// Subscribe to pushed ledger events.
    ///
    /// Broadcast semantics: a slow consumer may observe lag, and events may
    /// arrive out of order relative to call results.
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;
}
