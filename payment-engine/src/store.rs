//! Request Store: the session's authoritative cache
//!
//! Single owner of the mutable payment-request, seller-account, and
//! direct-payment collections. Every mutation takes the lock once, so each
//! merge-by-id is one atomic step relative to every other engine operation;
//! a poll result and an event can never each apply half an update.
//!
//! The store enforces the status partial order (`pending < completed`,
//! `pending < expired`) and the completed-over-expired dominance rule. It
//! reports what each merge did through [`MergeOutcome`] and leaves logging
//! and follow-up calls to the reconciliation engine. The ledger remains the
//! long-lived source of truth: this cache is rebuilt from it on session
//! start and discarded on identity change.

use crate::types::{DirectPayment, PaymentRequest, PaymentStatus, SellerAccount, StatusFilter};
use chrono::Utc;
use ledger_client::{Address, RequestSnapshot};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// What a merge did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A record was created
    Inserted,
    /// The record advanced or its fields were reconciled
    Applied,
    /// Duplicate observation; the record already reflected it
    Unchanged,
    /// A late or duplicate expiry was ignored because the record is completed
    CompletedDominates,
    /// Completion was applied over an already-expired record (terminal
    /// disagreement; the caller must surface it)
    Conflict,
    /// No record with this id, and the observation carries too little to
    /// create one
    Unknown,
}

#[derive(Default)]
struct Inner {
    requests: HashMap<String, PaymentRequest>,
    sellers: HashMap<Address, SellerAccount>,
    direct_payments: Vec<DirectPayment>,
}

/// In-memory session cache of payment requests and seller accounts
#[derive(Default)]
pub struct RequestStore {
    inner: RwLock<Inner>,
}

impl RequestStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a `RequestCreated` observation.
    ///
    /// Inserts a pending record if absent; otherwise reconciles the
    /// immutable fields without ever downgrading the status.
    pub fn merge_created(
        &self,
        payment_id: &str,
        seller: &Address,
        amount: Decimal,
        expiry_time: chrono::DateTime<Utc>,
    ) -> MergeOutcome {
        let mut inner = self.inner.write();
        match inner.requests.get_mut(payment_id) {
            None => {
                inner.requests.insert(
                    payment_id.to_string(),
                    PaymentRequest {
                        payment_id: payment_id.to_string(),
                        seller: seller.clone(),
                        amount,
                        created_at: Utc::now(),
                        expiry_time,
                        status: PaymentStatus::Pending,
                        buyer: None,
                        paid_amount: None,
                    },
                );
                MergeOutcome::Inserted
            }
            Some(record) => {
                // Optimistic local insert raced the event: reconcile fields,
                // keep whatever status has already been reached
                record.seller = seller.clone();
                record.amount = amount;
                record.expiry_time = expiry_time;
                MergeOutcome::Applied
            }
        }
    }

    /// Merge a `RequestCompleted` observation.
    ///
    /// Applied unconditionally; an already-expired record is overwritten
    /// (completed dominates) but reported as [`MergeOutcome::Conflict`].
    pub fn merge_completed(
        &self,
        payment_id: &str,
        buyer: &Address,
        seller: &Address,
        amount: Decimal,
    ) -> MergeOutcome {
        let mut inner = self.inner.write();
        match inner.requests.get_mut(payment_id) {
            None => {
                // Completion for a request created before this session
                let now = Utc::now();
                inner.requests.insert(
                    payment_id.to_string(),
                    PaymentRequest {
                        payment_id: payment_id.to_string(),
                        seller: seller.clone(),
                        amount,
                        created_at: now,
                        expiry_time: now,
                        status: PaymentStatus::Completed,
                        buyer: Some(buyer.clone()),
                        paid_amount: Some(amount),
                    },
                );
                MergeOutcome::Inserted
            }
            Some(record) => {
                let prior = record.status;
                record.buyer = Some(buyer.clone());
                record.paid_amount = Some(amount);
                record.status = PaymentStatus::Completed;
                match prior {
                    PaymentStatus::Pending => MergeOutcome::Applied,
                    PaymentStatus::Completed => MergeOutcome::Unchanged,
                    PaymentStatus::Expired => MergeOutcome::Conflict,
                }
            }
        }
    }

    /// Merge a `RequestExpired` observation: `pending → expired` only.
    pub fn merge_expired(&self, payment_id: &str) -> MergeOutcome {
        let mut inner = self.inner.write();
        match inner.requests.get_mut(payment_id) {
            None => MergeOutcome::Unknown,
            Some(record) => match record.status {
                PaymentStatus::Pending => {
                    record.status = PaymentStatus::Expired;
                    MergeOutcome::Applied
                }
                PaymentStatus::Expired => MergeOutcome::Unchanged,
                PaymentStatus::Completed => MergeOutcome::CompletedDominates,
            },
        }
    }

    /// Merge a full on-ledger snapshot under the same monotonicity rules.
    pub fn merge_snapshot(&self, snapshot: &RequestSnapshot) -> MergeOutcome {
        let snapshot_status = if snapshot.is_paid {
            PaymentStatus::Completed
        } else if snapshot.is_expired {
            PaymentStatus::Expired
        } else {
            PaymentStatus::Pending
        };

        let mut inner = self.inner.write();
        match inner.requests.get_mut(&snapshot.payment_id) {
            None => {
                inner.requests.insert(
                    snapshot.payment_id.clone(),
                    PaymentRequest {
                        payment_id: snapshot.payment_id.clone(),
                        seller: snapshot.seller.clone(),
                        amount: snapshot.amount,
                        created_at: Utc::now(),
                        expiry_time: snapshot.expiry_time,
                        status: snapshot_status,
                        buyer: snapshot.buyer.clone(),
                        paid_amount: snapshot.is_paid.then_some(snapshot.amount),
                    },
                );
                MergeOutcome::Inserted
            }
            Some(record) => {
                record.seller = snapshot.seller.clone();
                record.amount = snapshot.amount;
                record.expiry_time = snapshot.expiry_time;
                match (record.status, snapshot_status) {
                    (PaymentStatus::Pending, PaymentStatus::Completed) => {
                        record.status = PaymentStatus::Completed;
                        record.buyer = snapshot.buyer.clone();
                        record.paid_amount = Some(snapshot.amount);
                        MergeOutcome::Applied
                    }
                    (PaymentStatus::Pending, PaymentStatus::Expired) => {
                        record.status = PaymentStatus::Expired;
                        MergeOutcome::Applied
                    }
                    (PaymentStatus::Expired, PaymentStatus::Completed) => {
                        record.status = PaymentStatus::Completed;
                        record.buyer = snapshot.buyer.clone();
                        record.paid_amount = Some(snapshot.amount);
                        MergeOutcome::Conflict
                    }
                    (PaymentStatus::Completed, PaymentStatus::Expired) => {
                        MergeOutcome::CompletedDominates
                    }
                    _ => MergeOutcome::Unchanged,
                }
            }
        }
    }

    /// Get one request by id
    pub fn get(&self, payment_id: &str) -> Option<PaymentRequest> {
        self.inner.read().requests.get(payment_id).cloned()
    }

    /// Requests passing the filter, newest first
    pub fn requests(&self, filter: StatusFilter) -> Vec<PaymentRequest> {
        let inner = self.inner.read();
        let mut requests: Vec<PaymentRequest> = inner
            .requests
            .values()
            .filter(|r| filter.matches(r.status))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        requests
    }

    /// Ids of pending requests whose cached deadline has passed.
    ///
    /// Candidate selection only: the ledger's own `is_expired` remains the
    /// sole trigger for a status transition.
    pub fn pending_past_expiry(&self, now: chrono::DateTime<Utc>) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .requests
            .values()
            .filter(|r| r.status == PaymentStatus::Pending && r.expiry_time <= now)
            .map(|r| r.payment_id.clone())
            .collect()
    }

    /// Cache a seller account mirrored from the ledger
    pub fn set_seller(&self, account: SellerAccount) {
        self.inner.write().sellers.insert(account.address.clone(), account);
    }

    /// Note a `SellerRegistered` event without clobbering mirrored aggregates
    pub fn note_registered(&self, address: &Address, business_name: &str) {
        let mut inner = self.inner.write();
        inner
            .sellers
            .entry(address.clone())
            .or_insert_with(|| SellerAccount {
                address: address.clone(),
                business_name: business_name.to_string(),
                is_registered: true,
                total_transactions: 0,
                total_amount: Decimal::ZERO,
            });
    }

    /// Cached seller account for an address
    pub fn seller(&self, address: &Address) -> Option<SellerAccount> {
        self.inner.read().sellers.get(address).cloned()
    }

    /// Record a direct payment made during this session
    pub fn push_direct(&self, payment: DirectPayment) {
        self.inner.write().direct_payments.push(payment);
    }

    /// Direct payments made during this session
    pub fn direct_payments(&self) -> Vec<DirectPayment> {
        self.inner.read().direct_payments.clone()
    }

    /// Number of cached requests
    pub fn len(&self) -> usize {
        self.inner.read().requests.len()
    }

    /// Whether the request cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().requests.is_empty()
    }

    /// Drop everything (session reset on identity change)
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.requests.clear();
        inner.sellers.clear();
        inner.direct_payments.clear();
    }
}
