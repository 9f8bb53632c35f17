//! Reconciliation Engine: folding ledger observations into the cache
//!
//! All Request Store writes flow through this module, from three sources:
//! pushed events, on-demand status polls, and the background expiry sweep.
//! Observations may arrive late, duplicated, or out of order; every merge
//! is monotonic, so replaying any of them is harmless.
//!
//! A terminal disagreement (completed reported after expired) is resolved
//! in favour of completed and logged at `warn`. It is never surfaced to
//! callers: the caller asked for the reconciled state, and that state is
//! well-defined.

use crate::error::{Error, Result};
use crate::store::{MergeOutcome, RequestStore};
use crate::types::{PaymentStatus, StatusView};
use chrono::Utc;
use ledger_client::{Address, LedgerApi, LedgerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Merges ledger observations into the Request Store
pub struct ReconciliationEngine {
    ledger: Arc<dyn LedgerApi>,
    store: Arc<RequestStore>,

    /// Transaction sender for expiry marks issued by this session
    session: Address,
}

impl ReconciliationEngine {
    /// Create an engine writing into `store` on behalf of `session`
    pub fn new(ledger: Arc<dyn LedgerApi>, store: Arc<RequestStore>, session: Address) -> Self {
        Self {
            ledger,
            store,
            session,
        }
    }

    /// Fold one pushed event into the cache.
    ///
    /// Duplicate and late deliveries collapse to no-ops; a completion
    /// arriving after a recorded expiry applies and is logged as a
    /// conflict.
    pub fn apply_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::RequestCreated {
                payment_id,
                seller,
                amount,
                expiry_time,
            } => {
                let outcome = self
                    .store
                    .merge_created(payment_id, seller, *amount, *expiry_time);
                if outcome == MergeOutcome::Inserted {
                    info!(payment_id = %payment_id, amount = %amount, "request observed");
                }
            }
            LedgerEvent::RequestCompleted {
                payment_id,
                buyer,
                seller,
                amount,
            } => {
                let outcome = self
                    .store
                    .merge_completed(payment_id, buyer, seller, *amount);
                self.report(payment_id, PaymentStatus::Completed, outcome);
            }
            LedgerEvent::RequestExpired { payment_id } => {
                let outcome = self.store.merge_expired(payment_id);
                self.report(payment_id, PaymentStatus::Expired, outcome);
            }
            LedgerEvent::SellerRegistered {
                seller,
                business_name,
            } => {
                self.store.note_registered(seller, business_name);
                debug!(seller = %seller, business_name = %business_name, "seller registered");
            }
        }
    }

    /// Pull the authoritative status for one request and merge it.
    ///
    /// Unknown-to-the-cache ids are hydrated from the ledger's request
    /// getter first. When the ledger reports expiry for a locally pending
    /// request, the durable expiry mark is issued before the local record
    /// transitions; once the record already reads expired the mark is not
    /// re-issued.
    pub async fn refresh(&self, payment_id: &str) -> Result<StatusView> {
        let report = self
            .ledger
            .check_status(payment_id)
            .await?
            .ok_or_else(|| Error::RequestNotFound(payment_id.to_string()))?;

        let record = match self.store.get(payment_id) {
            Some(record) => record,
            None => {
                let snapshot = self
                    .ledger
                    .get_request(payment_id)
                    .await?
                    .ok_or_else(|| Error::RequestNotFound(payment_id.to_string()))?;
                let outcome = self.store.merge_snapshot(&snapshot);
                debug!(payment_id = %payment_id, ?outcome, "hydrated from ledger");
                self.store
                    .get(payment_id)
                    .ok_or_else(|| Error::RequestNotFound(payment_id.to_string()))?
            }
        };

        if report.is_paid {
            let buyer = report.buyer.clone().unwrap_or_else(Address::zero);
            let outcome =
                self.store
                    .merge_completed(payment_id, &buyer, &record.seller, record.amount);
            self.report(payment_id, PaymentStatus::Completed, outcome);
        } else if report.is_expired {
            if record.status == PaymentStatus::Pending {
                // Redundant-safe: other observers may race to mark the same
                // id, and the ledger treats repeats as no-ops
                if let Err(e) = self.ledger.mark_expired(&self.session, payment_id).await {
                    warn!(payment_id = %payment_id, error = %e, "expiry mark failed");
                }
            }
            let outcome = self.store.merge_expired(payment_id);
            self.report(payment_id, PaymentStatus::Expired, outcome);
        }

        let details = self
            .store
            .get(payment_id)
            .ok_or_else(|| Error::RequestNotFound(payment_id.to_string()))?;
        Ok(StatusView {
            status: details.status,
            remaining_time: report.remaining_time,
            details,
        })
    }

    /// Refresh every pending request whose cached deadline has passed.
    ///
    /// The cached deadline only selects candidates; the transition itself
    /// still waits for the ledger's own expiry verdict inside `refresh`.
    pub async fn sweep(&self) {
        for payment_id in self.store.pending_past_expiry(Utc::now()) {
            if let Err(e) = self.refresh(&payment_id).await {
                warn!(payment_id = %payment_id, error = %e, "sweep refresh failed");
            }
        }
    }

    fn report(&self, payment_id: &str, observed: PaymentStatus, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Applied | MergeOutcome::Inserted => {
                info!(payment_id = %payment_id, status = %observed, "request reconciled");
            }
            MergeOutcome::Unchanged => {
                debug!(payment_id = %payment_id, status = %observed, "duplicate observation");
            }
            MergeOutcome::CompletedDominates => {
                debug!(payment_id = %payment_id, "expiry ignored for completed request");
            }
            MergeOutcome::Conflict => {
                let conflict = Error::ReconciliationConflict {
                    payment_id: payment_id.to_string(),
                    recorded: PaymentStatus::Expired,
                    observed: PaymentStatus::Completed,
                };
                warn!(payment_id = %payment_id, "{conflict}");
            }
            MergeOutcome::Unknown => {
                debug!(payment_id = %payment_id, status = %observed, "observation for unknown request");
            }
        }
    }

    /// Consume the ledger's event subscription until shutdown.
    ///
    /// Lagged deliveries are logged and skipped; the monotonic merges and
    /// the sweep make missed events recoverable.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<LedgerEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    received = events.recv() => match received {
                        Ok(event) => engine.apply_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event subscription lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("event loop stopped");
        })
    }

    /// Run the expiry sweep at a fixed cadence until shutdown
    pub fn spawn_sweep_loop(
        self: &Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => engine.sweep().await,
                }
            }
            debug!("sweep loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::MemoryLedger;
    use rust_decimal_macros::dec;

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    async fn seeded() -> (Arc<MemoryLedger>, Arc<RequestStore>, ReconciliationEngine) {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::new(RequestStore::new());
        ledger.register_seller(&addr('1'), "Acme").await.unwrap();
        let engine = ReconciliationEngine::new(
            Arc::clone(&ledger) as Arc<dyn LedgerApi>,
            Arc::clone(&store),
            addr('2'),
        );
        (ledger, store, engine)
    }

    #[tokio::test]
    async fn test_refresh_hydrates_unknown_id() {
        let (ledger, store, engine) = seeded().await;
        ledger
            .create_payment_request(&addr('1'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();

        assert!(store.get("pay_0000000001000").is_none());
        let view = engine.refresh("pay_0000000001000").await.unwrap();
        assert_eq!(view.status, PaymentStatus::Pending);
        assert!(view.remaining_time > Duration::ZERO);
        assert!(store.get("pay_0000000001000").is_some());
    }

    #[tokio::test]
    async fn test_refresh_unknown_everywhere_is_not_found() {
        let (_ledger, _store, engine) = seeded().await;
        let err = engine.refresh("pay_0000000009999").await.unwrap_err();
        assert!(matches!(err, Error::RequestNotFound(_)));
    }

    #[tokio::test]
    async fn test_refresh_applies_completion() {
        let (ledger, store, engine) = seeded().await;
        ledger
            .create_payment_request(&addr('1'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();
        engine.refresh("pay_0000000001000").await.unwrap();
        ledger
            .make_payment(&addr('2'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();

        let view = engine.refresh("pay_0000000001000").await.unwrap();
        assert_eq!(view.status, PaymentStatus::Completed);
        assert_eq!(view.details.buyer, Some(addr('2')));
        assert_eq!(store.get("pay_0000000001000").unwrap().paid_amount, Some(dec!(0.5)));
    }

    #[tokio::test]
    async fn test_refresh_marks_elapsed_request_expired() {
        let (ledger, store, engine) = seeded().await;
        ledger
            .create_payment_request(&addr('1'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();
        engine.refresh("pay_0000000001000").await.unwrap();

        // Deadline passes with no pushed event
        ledger.force_expiry("pay_0000000001000").unwrap();

        let view = engine.refresh("pay_0000000001000").await.unwrap();
        assert_eq!(view.status, PaymentStatus::Expired);
        assert_eq!(view.remaining_time, Duration::ZERO);

        // The durable mark landed: payment is now rejected by the ledger
        let err = ledger
            .make_payment(&addr('2'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("window closed"));

        // A second refresh is a pure no-op
        let view = engine.refresh("pay_0000000001000").await.unwrap();
        assert_eq!(view.status, PaymentStatus::Expired);
        assert_eq!(
            store.get("pay_0000000001000").unwrap().status,
            PaymentStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_event_interleaving_is_order_insensitive() {
        let (_ledger, store, engine) = seeded().await;

        // Completion delivered before creation
        engine.apply_event(&LedgerEvent::RequestCompleted {
            payment_id: "pay_0000000001000".to_string(),
            buyer: addr('2'),
            seller: addr('1'),
            amount: dec!(0.5),
        });
        engine.apply_event(&LedgerEvent::RequestCreated {
            payment_id: "pay_0000000001000".to_string(),
            seller: addr('1'),
            amount: dec!(0.5),
            expiry_time: Utc::now() + chrono::Duration::seconds(300),
        });
        // Duplicate completion and a late expiry
        engine.apply_event(&LedgerEvent::RequestCompleted {
            payment_id: "pay_0000000001000".to_string(),
            buyer: addr('2'),
            seller: addr('1'),
            amount: dec!(0.5),
        });
        engine.apply_event(&LedgerEvent::RequestExpired {
            payment_id: "pay_0000000001000".to_string(),
        });

        let record = store.get("pay_0000000001000").unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.buyer, Some(addr('2')));
    }

    #[tokio::test]
    async fn test_event_loop_applies_pushed_events() {
        let (ledger, store, engine) = seeded().await;
        let engine = Arc::new(engine);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = engine.spawn_event_loop(ledger.subscribe(), shutdown_rx);

        ledger
            .create_payment_request(&addr('1'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();
        ledger
            .make_payment(&addr('2'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();

        // Give the loop a chance to drain the channel
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            store.get("pay_0000000001000").unwrap().status,
            PaymentStatus::Completed
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_expires_elapsed_pending_requests() {
        let (ledger, store, engine) = seeded().await;
        ledger
            .create_payment_request(&addr('1'), "pay_0000000001000", dec!(0.5))
            .await
            .unwrap();
        ledger
            .create_payment_request(&addr('1'), "pay_0000000002000", dec!(1))
            .await
            .unwrap();
        engine.refresh("pay_0000000001000").await.unwrap();
        engine.refresh("pay_0000000002000").await.unwrap();

        ledger.force_expiry("pay_0000000001000").unwrap();
        // Mirror the elapsed deadline into the cache so the sweep selects
        // this id (in production the cached deadline simply passes)
        store.merge_created(
            "pay_0000000001000",
            &addr('1'),
            dec!(0.5),
            Utc::now() - chrono::Duration::seconds(1),
        );
        engine.sweep().await;

        assert_eq!(
            store.get("pay_0000000001000").unwrap().status,
            PaymentStatus::Expired
        );
        assert_eq!(
            store.get("pay_0000000002000").unwrap().status,
            PaymentStatus::Pending
        );
    }
}
