//! Payment Orchestrator: the session's operation surface
//!
//! One orchestrator per wallet identity. Every operation composes the same
//! collaborators in a fixed order: claim the submission key, re-check the
//! ledger, submit, reconcile the result into the cache. Auxiliary record
//! writes ride along best-effort and never fail a payment.

use crate::classifier::{classify, new_payment_id, ScannedInput};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::guard::SubmissionGuard;
use crate::poller::{spawn_status_poller, PollerHandle};
use crate::reconcile::ReconciliationEngine;
use crate::records::{PaymentRecord, RecordService};
use crate::store::RequestStore;
use crate::types::{
    DirectPayment, HistoryEntry, PaymentRequest, PaymentStatus, SellerAccount, StatusFilter,
    StatusView,
};
use chrono::Utc;
use ledger_client::{Address, HistoryPage, LedgerApi, SellerListing};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// What a scanned-input payment did
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// The input was a payment id; the request was paid
    Mediated(StatusView),
    /// The input was a wallet address; value was transferred directly
    Direct {
        /// Receiving address
        recipient: Address,
        /// Amount transferred
        amount: Decimal,
    },
}

/// Session-scoped facade over ledger, cache, guard, and records
pub struct PaymentOrchestrator {
    address: Address,
    ledger: Arc<dyn LedgerApi>,
    store: Arc<RequestStore>,
    reconciler: Arc<ReconciliationEngine>,
    guard: SubmissionGuard,
    records: Arc<dyn RecordService>,
    config: EngineConfig,
    watchers: Mutex<Vec<watch::Sender<bool>>>,
}

impl std::fmt::Debug for PaymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentOrchestrator")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl PaymentOrchestrator {
    /// Build an orchestrator bound to one wallet address
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        records: Arc<dyn RecordService>,
        config: EngineConfig,
        address: Address,
    ) -> Self {
        let store = Arc::new(RequestStore::new());
        let reconciler = Arc::new(ReconciliationEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&store),
            address.clone(),
        ));
        Self {
            address,
            ledger,
            store,
            reconciler,
            guard: SubmissionGuard::new(),
            records,
            config,
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// The wallet identity this session acts as
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The session cache
    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    /// The reconciliation engine, for spawning session loops
    pub fn reconciler(&self) -> &Arc<ReconciliationEngine> {
        &self.reconciler
    }

    /// Warm the session from the ledger: mirror the seller account (if
    /// registered) and ensure the auxiliary user record exists.
    pub async fn bootstrap(&self) -> Result<()> {
        if let Err(e) = self.records.upsert_user(&self.address).await {
            warn!(address = %self.address, error = %e, "user record write failed");
        }
        self.refresh_seller_account().await?;
        info!(address = %self.address, "session bootstrapped");
        Ok(())
    }

    /// Register this wallet as a seller
    pub async fn register_seller(&self, business_name: &str) -> Result<SellerAccount> {
        self.ledger
            .register_seller(&self.address, business_name)
            .await?;
        self.refresh_seller_account().await?;
        self.store
            .seller(&self.address)
            .ok_or(Error::NotRegistered)
    }

    /// Open a payment request for `amount`, minting a fresh id.
    ///
    /// The ledger stamps the expiry; the returned record is the reconciled
    /// local copy, deadline included.
    pub async fn create_payment_request(&self, amount: Decimal) -> Result<PaymentRequest> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        if self.store.seller(&self.address).is_none()
            && self.ledger.get_seller_stats(&self.address).await?.is_none()
        {
            return Err(Error::NotRegistered);
        }

        let payment_id = new_payment_id(Utc::now());
        self.ledger
            .create_payment_request(&self.address, &payment_id, amount)
            .await?;
        let view = self.reconciler.refresh(&payment_id).await?;
        info!(payment_id = %payment_id, amount = %amount, "payment request created");
        Ok(view.details)
    }

    /// Pay a mediated payment request.
    ///
    /// The submission key is claimed before the first ledger call, so a
    /// concurrent attempt on the same id fails fast with
    /// [`Error::AlreadyProcessing`]. The ledger is re-checked under the
    /// claim; stale cached state never drives a submission.
    pub async fn pay_mediated(&self, payment_id: &str) -> Result<StatusView> {
        let _permit = self
            .guard
            .acquire(payment_id)
            .ok_or_else(|| Error::AlreadyProcessing(payment_id.to_string()))?;

        let view = self.reconciler.refresh(payment_id).await?;
        match view.status {
            PaymentStatus::Completed => return Err(Error::AlreadyPaid(payment_id.to_string())),
            PaymentStatus::Expired => return Err(Error::Expired(payment_id.to_string())),
            PaymentStatus::Pending => {}
        }

        self.ledger
            .make_payment(&self.address, payment_id, view.details.amount)
            .await?;
        let view = self.reconciler.refresh(payment_id).await?;
        info!(payment_id = %payment_id, amount = %view.details.amount, "mediated payment confirmed");

        self.mirror_payment(PaymentRecord {
            payment_id: Some(payment_id.to_string()),
            payer: self.address.clone(),
            recipient: view.details.seller.clone(),
            amount: view.details.amount,
            timestamp: Utc::now(),
        })
        .await;

        Ok(view)
    }

    /// Transfer value directly to a wallet address.
    ///
    /// If the recipient is a registered seller the transfer is attributed
    /// to their ledger aggregates; that attribution is best-effort.
    pub async fn pay_direct(&self, recipient: &Address, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        let _permit = self
            .guard
            .acquire(recipient.as_str())
            .ok_or_else(|| Error::AlreadyProcessing(recipient.to_string()))?;

        self.ledger
            .transfer_direct(&self.address, recipient, amount)
            .await?;
        let timestamp = Utc::now();
        self.store.push_direct(DirectPayment {
            counterparty: recipient.clone(),
            amount,
            timestamp,
        });
        info!(recipient = %recipient, amount = %amount, "direct payment confirmed");

        match self.ledger.get_seller_stats(recipient).await {
            Ok(Some(_)) => {
                if let Err(e) = self
                    .ledger
                    .record_direct_payment(&self.address, recipient, amount)
                    .await
                {
                    warn!(recipient = %recipient, error = %e, "direct payment attribution failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(recipient = %recipient, error = %e, "seller lookup failed"),
        }

        self.mirror_payment(PaymentRecord {
            payment_id: None,
            payer: self.address.clone(),
            recipient: recipient.clone(),
            amount,
            timestamp,
        })
        .await;

        Ok(())
    }

    /// Pay whatever was scanned.
    ///
    /// Classification happens before any ledger traffic; garbage is
    /// rejected locally. A mediated id pays its fixed amount and ignores
    /// `direct_amount`; a wallet address requires one.
    pub async fn pay_scanned(
        &self,
        input: &str,
        direct_amount: Option<Decimal>,
    ) -> Result<PaymentOutcome> {
        match classify(input) {
            ScannedInput::MediatedId(payment_id) => {
                let view = self.pay_mediated(&payment_id).await?;
                Ok(PaymentOutcome::Mediated(view))
            }
            ScannedInput::WalletAddress(recipient) => {
                let amount = direct_amount.ok_or(Error::InvalidAmount(Decimal::ZERO))?;
                self.pay_direct(&recipient, amount).await?;
                Ok(PaymentOutcome::Direct { recipient, amount })
            }
            ScannedInput::Invalid => Err(Error::InvalidInputFormat(input.trim().to_string())),
        }
    }

    /// Reconciled status of one request, pulled from the ledger now
    pub async fn check_status(&self, payment_id: &str) -> Result<StatusView> {
        self.reconciler.refresh(payment_id).await
    }

    /// Payments made by this wallet: on-ledger mediated rows merged with
    /// this session's direct transfers, newest first
    pub async fn list_client_history(&self) -> Result<Vec<HistoryEntry>> {
        let page = self.ledger.get_client_history(&self.address).await?;
        let mut entries = mediated_entries(&page, MediatedSide::Client);
        entries.extend(self.store.direct_payments().into_iter().map(|p| {
            HistoryEntry::Direct {
                counterparty: p.counterparty,
                amount: p.amount,
                timestamp: p.timestamp,
            }
        }));
        entries.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(entries)
    }

    /// Payments received by this wallet as a seller, newest first
    pub async fn list_seller_history(&self) -> Result<Vec<HistoryEntry>> {
        let page = self.ledger.get_seller_history(&self.address).await?;
        let mut entries = mediated_entries(&page, MediatedSide::Seller);
        entries.extend(page.direct.iter().map(|r| HistoryEntry::Direct {
            counterparty: r.payer.clone(),
            amount: r.amount,
            timestamp: r.timestamp,
        }));
        entries.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(entries)
    }

    /// One page of the registered-seller directory
    pub async fn list_sellers(&self, offset: u64, limit: u64) -> Result<Vec<SellerListing>> {
        let limit = if limit == 0 {
            self.config.seller_page_size
        } else {
            limit
        };
        Ok(self.ledger.get_all_sellers(offset, limit).await?)
    }

    /// Locally cached requests passing the filter, newest first
    pub fn payment_requests(&self, filter: StatusFilter) -> Vec<PaymentRequest> {
        self.store.requests(filter)
    }

    /// This wallet's cached seller account, if registered
    pub fn seller_account(&self) -> Option<SellerAccount> {
        self.store.seller(&self.address)
    }

    /// Start the periodic status poller for a displayed request
    pub fn watch(&self, payment_id: &str) -> PollerHandle {
        let handle = spawn_status_poller(
            Arc::clone(&self.reconciler),
            payment_id.to_string(),
            self.config.poll_interval(),
        );
        let mut watchers = self.watchers.lock();
        // An exited poller has dropped its receiver; drop its stop handle too
        watchers.retain(|stop| !stop.is_closed());
        watchers.push(handle.stop_sender());
        handle
    }

    /// Number of registered poller stop handles
    pub fn active_watchers(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Stop every poller started through [`watch`](Self::watch)
    pub fn stop_watchers(&self) {
        for stop in self.watchers.lock().drain(..) {
            let _ = stop.send(true);
        }
    }

    /// Release session state: pollers stopped, claims and cache dropped
    pub fn teardown(&self) {
        self.stop_watchers();
        self.guard.clear();
        self.store.clear();
        info!(address = %self.address, "session state cleared");
    }

    async fn refresh_seller_account(&self) -> Result<()> {
        if let Some(stats) = self.ledger.get_seller_stats(&self.address).await? {
            self.store.set_seller(SellerAccount {
                address: self.address.clone(),
                business_name: stats.business_name,
                is_registered: true,
                total_transactions: stats.total_transactions,
                total_amount: stats.total_amount,
            });
        }
        Ok(())
    }

    async fn mirror_payment(&self, record: PaymentRecord) {
        if let Err(e) = self.records.record_payment(record).await {
            warn!(error = %e, "payment record write failed");
        }
    }
}

enum MediatedSide {
    Client,
    Seller,
}

fn mediated_entries(page: &HistoryPage, side: MediatedSide) -> Vec<HistoryEntry> {
    page.mediated
        .iter()
        .map(|r| HistoryEntry::Mediated {
            payment_id: r.payment_id.clone(),
            counterparty: match side {
                MediatedSide::Client => r.seller.clone(),
                MediatedSide::Seller => r.buyer.clone(),
            },
            business_name: r.business_name.clone(),
            amount: r.amount,
            timestamp: r.timestamp,
        })
        .collect()
}
