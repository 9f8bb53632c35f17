//! In-memory reference ledger
//!
//! [`MemoryLedger`] implements [`LedgerApi`] with the observable semantics of
//! the real contract: registration, the request lifecycle with a fixed
//! payment window, idempotent expiry marking, seller aggregates, and event
//! emission. It exists for tests and demos; nothing persists.

use crate::api::LedgerApi;
use crate::types::{
    Address, DirectRecord, HistoryPage, LedgerEvent, MediatedRecord, RequestSnapshot,
    SellerListing, SellerStats, StatusReport,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default payment window applied to new requests
const DEFAULT_PAYMENT_WINDOW: Duration = Duration::from_secs(300);

/// Event channel capacity
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
struct SellerRecord {
    business_name: String,
    total_transactions: u64,
    total_amount: Decimal,
}

#[derive(Debug, Clone)]
struct RequestRecord {
    seller: Address,
    amount: Decimal,
    expiry_time: DateTime<Utc>,
    is_paid: bool,
    is_expired: bool,
    buyer: Option<Address>,
}

#[derive(Default)]
struct State {
    sellers: HashMap<Address, SellerRecord>,
    /// Registration order, for stable pagination
    seller_order: Vec<Address>,
    requests: HashMap<String, RequestRecord>,
    client_history: HashMap<Address, Vec<MediatedRecord>>,
    seller_history: HashMap<Address, HistoryPage>,
}

/// In-memory [`LedgerApi`] implementation
pub struct MemoryLedger {
    state: Mutex<State>,
    events: broadcast::Sender<LedgerEvent>,
    payment_window: Duration,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    /// Create a ledger with the default payment window
    pub fn new() -> Self {
        Self::with_payment_window(DEFAULT_PAYMENT_WINDOW)
    }

    /// Create a ledger with a custom payment window
    pub fn with_payment_window(payment_window: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(State::default()),
            events,
            payment_window,
        }
    }

    /// Move a request's deadline into the past without emitting an event.
    ///
    /// Test support: the real ledger computes expiry from chain time, which
    /// a test cannot advance. This simulates a window that elapsed with no
    /// `RequestExpired` push observed.
    pub fn force_expiry(&self, payment_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let request = state
            .requests
            .get_mut(payment_id)
            .ok_or_else(|| Error::call("force_expiry", "unknown payment id"))?;
        request.expiry_time = Utc::now() - chrono::Duration::seconds(1);
        Ok(())
    }

    fn emit(&self, event: LedgerEvent) {
        // Send fails only when no subscriber exists, which is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl LedgerApi for MemoryLedger {
    async fn register_seller(&self, from: &Address, business_name: &str) -> Result<()> {
        if business_name.trim().is_empty() {
            return Err(Error::call("register_seller", "empty business name"));
        }
        {
            let mut state = self.state.lock();
            if state.sellers.contains_key(from) {
                return Err(Error::call("register_seller", "already registered"));
            }
            state.sellers.insert(
                from.clone(),
                SellerRecord {
                    business_name: business_name.to_string(),
                    total_transactions: 0,
                    total_amount: Decimal::ZERO,
                },
            );
            state.seller_order.push(from.clone());
        }
        self.emit(LedgerEvent::SellerRegistered {
            seller: from.clone(),
            business_name: business_name.to_string(),
        });
        Ok(())
    }

    async fn create_payment_request(
        &self,
        from: &Address,
        payment_id: &str,
        amount: Decimal,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::call("create_payment_request", "non-positive amount"));
        }
        let expiry_time = {
            let mut state = self.state.lock();
            if !state.sellers.contains_key(from) {
                return Err(Error::call("create_payment_request", "not a registered seller"));
            }
            if state.requests.contains_key(payment_id) {
                return Err(Error::call("create_payment_request", "duplicate payment id"));
            }
            let expiry_time = Utc::now()
                + chrono::Duration::from_std(self.payment_window)
                    .map_err(|e| Error::call("create_payment_request", e.to_string()))?;
            state.requests.insert(
                payment_id.to_string(),
                RequestRecord {
                    seller: from.clone(),
                    amount,
                    expiry_time,
                    is_paid: false,
                    is_expired: false,
                    buyer: None,
                },
            );
            expiry_time
        };
        self.emit(LedgerEvent::RequestCreated {
            payment_id: payment_id.to_string(),
            seller: from.clone(),
            amount,
            expiry_time,
        });
        Ok(())
    }

    async fn make_payment(&self, from: &Address, payment_id: &str, amount: Decimal) -> Result<()> {
        let seller = {
            let mut state = self.state.lock();
            let now = Utc::now();
            let request = state
                .requests
                .get_mut(payment_id)
                .ok_or_else(|| Error::call("make_payment", "unknown payment id"))?;
            if request.is_paid {
                return Err(Error::call("make_payment", "already paid"));
            }
            if request.is_expired || now >= request.expiry_time {
                return Err(Error::call("make_payment", "payment window closed"));
            }
            if amount != request.amount {
                return Err(Error::call("make_payment", "incorrect amount"));
            }
            request.is_paid = true;
            request.buyer = Some(from.clone());
            let seller = request.seller.clone();

            let seller_record = state
                .sellers
                .get_mut(&seller)
                .ok_or_else(|| Error::call("make_payment", "seller record missing"))?;
            seller_record.total_transactions += 1;
            seller_record.total_amount += amount;
            let business_name = seller_record.business_name.clone();

            let record = MediatedRecord {
                payment_id: payment_id.to_string(),
                buyer: from.clone(),
                seller: seller.clone(),
                business_name: Some(business_name),
                amount,
                timestamp: now,
            };
            state
                .client_history
                .entry(from.clone())
                .or_default()
                .push(record.clone());
            state
                .seller_history
                .entry(seller.clone())
                .or_default()
                .mediated
                .push(record);
            seller
        };
        self.emit(LedgerEvent::RequestCompleted {
            payment_id: payment_id.to_string(),
            buyer: from.clone(),
            seller,
            amount,
        });
        Ok(())
    }

    async fn transfer_direct(
        &self,
        _from: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> Result<()> {
        // Native value transfer: no contract state involved
        if recipient.is_zero() {
            return Err(Error::call("transfer_direct", "zero recipient"));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::call("transfer_direct", "non-positive amount"));
        }
        Ok(())
    }

    async fn record_direct_payment(
        &self,
        from: &Address,
        recipient: &Address,
        amount: Decimal,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let seller_record = state
            .sellers
            .get_mut(recipient)
            .ok_or_else(|| Error::call("record_direct_payment", "recipient not registered"))?;
        seller_record.total_transactions += 1;
        seller_record.total_amount += amount;
        state
            .seller_history
            .entry(recipient.clone())
            .or_default()
            .direct
            .push(DirectRecord {
                payer: from.clone(),
                recipient: recipient.clone(),
                amount,
                timestamp: Utc::now(),
            });
        Ok(())
    }

    async fn check_status(&self, payment_id: &str) -> Result<Option<StatusReport>> {
        let state = self.state.lock();
        let Some(request) = state.requests.get(payment_id) else {
            return Ok(None);
        };
        let now = Utc::now();
        let is_expired = !request.is_paid && (request.is_expired || now >= request.expiry_time);
        let remaining_time = (request.expiry_time - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        Ok(Some(StatusReport {
            is_paid: request.is_paid,
            is_expired,
            remaining_time: if request.is_paid || is_expired {
                Duration::ZERO
            } else {
                remaining_time
            },
            buyer: request.buyer.clone(),
        }))
    }

    async fn get_request(&self, payment_id: &str) -> Result<Option<RequestSnapshot>> {
        let state = self.state.lock();
        Ok(state.requests.get(payment_id).map(|r| RequestSnapshot {
            payment_id: payment_id.to_string(),
            seller: r.seller.clone(),
            amount: r.amount,
            expiry_time: r.expiry_time,
            is_paid: r.is_paid,
            is_expired: r.is_expired,
            buyer: r.buyer.clone(),
        }))
    }

    async fn mark_expired(&self, _from: &Address, payment_id: &str) -> Result<()> {
        let newly_marked = {
            let mut state = self.state.lock();
            let request = state
                .requests
                .get_mut(payment_id)
                .ok_or_else(|| Error::call("mark_expired", "unknown payment id"))?;
            if request.is_paid {
                return Err(Error::call("mark_expired", "already paid"));
            }
            // Idempotent: marking an expired request again is a no-op
            if request.is_expired {
                false
            } else if Utc::now() < request.expiry_time {
                return Err(Error::call("mark_expired", "payment window still open"));
            } else {
                request.is_expired = true;
                true
            }
        };
        if newly_marked {
            self.emit(LedgerEvent::RequestExpired {
                payment_id: payment_id.to_string(),
            });
        }
        Ok(())
    }

    async fn get_seller_stats(&self, seller: &Address) -> Result<Option<SellerStats>> {
        let state = self.state.lock();
        Ok(state.sellers.get(seller).map(|s| SellerStats {
            business_name: s.business_name.clone(),
            total_transactions: s.total_transactions,
            total_amount: s.total_amount,
        }))
    }

    async fn get_all_sellers(&self, offset: u64, limit: u64) -> Result<Vec<SellerListing>> {
        let state = self.state.lock();
        Ok(state
            .seller_order
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .filter_map(|addr| {
                state.sellers.get(addr).map(|s| SellerListing {
                    address: addr.clone(),
                    business_name: s.business_name.clone(),
                    total_transactions: s.total_transactions,
                    total_amount: s.total_amount,
                })
            })
            .collect())
    }

    async fn get_client_history(&self, client: &Address) -> Result<HistoryPage> {
        let state = self.state.lock();
        Ok(HistoryPage {
            mediated: state.client_history.get(client).cloned().unwrap_or_default(),
            direct: Vec::new(),
        })
    }

    async fn get_seller_history(&self, seller: &Address) -> Result<HistoryPage> {
        let state = self.state.lock();
        Ok(state.seller_history.get(seller).cloned().unwrap_or_default())
    }

    async fn payment_window(&self) -> Result<Duration> {
        Ok(self.payment_window)
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    #[tokio::test]
    async fn test_register_and_stats() {
        let ledger = MemoryLedger::new();
        let seller = addr('1');

        ledger.register_seller(&seller, "Acme").await.unwrap();
        let stats = ledger.get_seller_stats(&seller).await.unwrap().unwrap();
        assert_eq!(stats.business_name, "Acme");
        assert_eq!(stats.total_transactions, 0);
        assert_eq!(stats.total_amount, Decimal::ZERO);

        // Duplicate registration rejected
        assert!(ledger.register_seller(&seller, "Acme again").await.is_err());
        // Unknown address has no stats
        assert!(ledger.get_seller_stats(&addr('2')).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_lifecycle_paid() {
        let ledger = MemoryLedger::new();
        let seller = addr('1');
        let buyer = addr('2');

        ledger.register_seller(&seller, "Acme").await.unwrap();
        ledger
            .create_payment_request(&seller, "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();

        let status = ledger
            .check_status("pay_0000000001000")
            .await
            .unwrap()
            .unwrap();
        assert!(!status.is_paid);
        assert!(!status.is_expired);
        assert!(status.remaining_time > Duration::ZERO);

        // Wrong amount rejected
        assert!(ledger
            .make_payment(&buyer, "pay_0000000001000", dec!(0.4))
            .await
            .is_err());

        ledger
            .make_payment(&buyer, "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();

        let status = ledger
            .check_status("pay_0000000001000")
            .await
            .unwrap()
            .unwrap();
        assert!(status.is_paid);
        assert_eq!(status.buyer, Some(buyer.clone()));

        // Double payment rejected
        assert!(ledger
            .make_payment(&buyer, "pay_0000000001000", dec!(0.5))
            .await
            .is_err());

        let stats = ledger.get_seller_stats(&seller).await.unwrap().unwrap();
        assert_eq!(stats.total_transactions, 1);
        assert_eq!(stats.total_amount, dec!(0.5));

        let history = ledger.get_client_history(&buyer).await.unwrap();
        assert_eq!(history.mediated.len(), 1);
        assert_eq!(history.mediated[0].payment_id, "pay_0000000001000");
    }

    #[tokio::test]
    async fn test_create_requires_registration_and_unique_id() {
        let ledger = MemoryLedger::new();
        let seller = addr('1');

        assert!(ledger
            .create_payment_request(&seller, "pay_0000000001000", dec!(1))
            .await
            .is_err());

        ledger.register_seller(&seller, "Acme").await.unwrap();
        ledger
            .create_payment_request(&seller, "pay_0000000001000", dec!(1))
            .await
            .unwrap();
        assert!(ledger
            .create_payment_request(&seller, "pay_0000000001000", dec!(1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mark_expired_idempotent() {
        let ledger = MemoryLedger::new();
        let seller = addr('1');
        ledger.register_seller(&seller, "Acme").await.unwrap();
        ledger
            .create_payment_request(&seller, "pay_0000000002000", dec!(1))
            .await
            .unwrap();

        // Window still open
        assert!(ledger.mark_expired(&seller, "pay_0000000002000").await.is_err());

        ledger.force_expiry("pay_0000000002000").unwrap();

        let mut events = ledger.subscribe();
        ledger.mark_expired(&seller, "pay_0000000002000").await.unwrap();
        // Second call is a no-op, not an error
        ledger.mark_expired(&seller, "pay_0000000002000").await.unwrap();

        let snapshot = ledger
            .get_request("pay_0000000002000")
            .await
            .unwrap()
            .unwrap();
        assert!(snapshot.is_expired);

        // Exactly one RequestExpired emitted
        assert!(matches!(
            events.try_recv().unwrap(),
            LedgerEvent::RequestExpired { .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_payment_rejected_after_window() {
        let ledger = MemoryLedger::new();
        let seller = addr('1');
        let buyer = addr('2');
        ledger.register_seller(&seller, "Acme").await.unwrap();
        ledger
            .create_payment_request(&seller, "pay_0000000003000", dec!(1))
            .await
            .unwrap();
        ledger.force_expiry("pay_0000000003000").unwrap();

        assert!(ledger
            .make_payment(&buyer, "pay_0000000003000", dec!(1))
            .await
            .is_err());
        let status = ledger
            .check_status("pay_0000000003000")
            .await
            .unwrap()
            .unwrap();
        assert!(status.is_expired);
        assert_eq!(status.remaining_time, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_record_direct_payment_requires_registration() {
        let ledger = MemoryLedger::new();
        let seller = addr('1');
        let payer = addr('2');

        assert!(ledger
            .record_direct_payment(&payer, &seller, dec!(0.2))
            .await
            .is_err());

        ledger.register_seller(&seller, "Acme").await.unwrap();
        ledger
            .record_direct_payment(&payer, &seller, dec!(0.2))
            .await
            .unwrap();

        let stats = ledger.get_seller_stats(&seller).await.unwrap().unwrap();
        assert_eq!(stats.total_transactions, 1);
        assert_eq!(stats.total_amount, dec!(0.2));

        let history = ledger.get_seller_history(&seller).await.unwrap();
        assert_eq!(history.direct.len(), 1);
        assert!(history.mediated.is_empty());
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let ledger = MemoryLedger::new();
        let mut events = ledger.subscribe();
        let seller = addr('1');
        let buyer = addr('2');

        ledger.register_seller(&seller, "Acme").await.unwrap();
        ledger
            .create_payment_request(&seller, "pay_0000000004000", dec!(2))
            .await
            .unwrap();
        ledger
            .make_payment(&buyer, "pay_0000000004000", dec!(2))
            .await
            .unwrap();

        assert!(matches!(
            events.try_recv().unwrap(),
            LedgerEvent::SellerRegistered { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            LedgerEvent::RequestCreated { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            LedgerEvent::RequestCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_seller_directory_pagination() {
        let ledger = MemoryLedger::new();
        for (i, fill) in ['1', '2', '3'].iter().enumerate() {
            ledger
                .register_seller(&addr(*fill), &format!("Shop {i}"))
                .await
                .unwrap();
        }

        let page = ledger.get_all_sellers(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].business_name, "Shop 1");

        let all = ledger.get_all_sellers(0, 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }
}
