//! Auxiliary record service: best-effort mirrors
//!
//! An off-ledger backend keeping user profiles and payment mirror rows for
//! display and support tooling. It is never authoritative: no lifecycle
//! decision reads from it, and a failed write is logged and forgotten
//! rather than failing the payment that triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_client::Address;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Record-service failure; carried in logs only
#[derive(Error, Debug)]
#[error("record service: {0}")]
pub struct RecordError(pub String);

/// Mirrored user profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Wallet address the profile is keyed by
    pub address: Address,

    /// First time this address was seen by the service
    pub first_seen: DateTime<Utc>,
}

/// Mirrored payment row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Fulfilled request id; `None` for direct transfers
    pub payment_id: Option<String>,

    /// Paying address
    pub payer: Address,

    /// Receiving address
    pub recipient: Address,

    /// Amount moved
    pub amount: Decimal,

    /// When the payment confirmed
    pub timestamp: DateTime<Utc>,
}

/// Off-ledger mirror store
#[async_trait]
pub trait RecordService: Send + Sync {
    /// Create the user profile if absent
    async fn upsert_user(&self, address: &Address) -> Result<(), RecordError>;

    /// Fetch a mirrored profile
    async fn get_user(&self, address: &Address) -> Result<Option<UserRecord>, RecordError>;

    /// Append a payment mirror row
    async fn record_payment(&self, record: PaymentRecord) -> Result<(), RecordError>;

    /// Mirror rows where `address` is payer or recipient
    async fn payments_for(&self, address: &Address) -> Result<Vec<PaymentRecord>, RecordError>;
}

/// Disabled record service; every call succeeds and stores nothing
#[derive(Default)]
pub struct NullRecordService;

#[async_trait]
impl RecordService for NullRecordService {
    async fn upsert_user(&self, _address: &Address) -> Result<(), RecordError> {
        Ok(())
    }

    async fn get_user(&self, _address: &Address) -> Result<Option<UserRecord>, RecordError> {
        Ok(None)
    }

    async fn record_payment(&self, _record: PaymentRecord) -> Result<(), RecordError> {
        Ok(())
    }

    async fn payments_for(&self, _address: &Address) -> Result<Vec<PaymentRecord>, RecordError> {
        Ok(Vec::new())
    }
}

/// In-memory record service for tests and demos
#[derive(Default)]
pub struct MemoryRecordService {
    users: Mutex<HashMap<Address, UserRecord>>,
    payments: Mutex<Vec<PaymentRecord>>,
}

impl MemoryRecordService {
    /// Create an empty service
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordService for MemoryRecordService {
    async fn upsert_user(&self, address: &Address) -> Result<(), RecordError> {
        self.users
            .lock()
            .entry(address.clone())
            .or_insert_with(|| UserRecord {
                address: address.clone(),
                first_seen: Utc::now(),
            });
        Ok(())
    }

    async fn get_user(&self, address: &Address) -> Result<Option<UserRecord>, RecordError> {
        Ok(self.users.lock().get(address).cloned())
    }

    async fn record_payment(&self, record: PaymentRecord) -> Result<(), RecordError> {
        self.payments.lock().push(record);
        Ok(())
    }

    async fn payments_for(&self, address: &Address) -> Result<Vec<PaymentRecord>, RecordError> {
        Ok(self
            .payments
            .lock()
            .iter()
            .filter(|r| &r.payer == address || &r.recipient == address)
            .cloned()
            .collect())
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
    async fn test_upsert_user_is_idempotent() {
        let service = MemoryRecordService::new();
        service.upsert_user(&addr('1')).await.unwrap();
        let first = service.get_user(&addr('1')).await.unwrap().unwrap();

        service.upsert_user(&addr('1')).await.unwrap();
        let second = service.get_user(&addr('1')).await.unwrap().unwrap();
        assert_eq!(first.first_seen, second.first_seen);
    }

    #[tokio::test]
    async fn test_payments_filtered_by_party() {
        let service = MemoryRecordService::new();
        service
            .record_payment(PaymentRecord {
                payment_id: Some("pay_0000000001000".to_string()),
                payer: addr('1'),
                recipient: addr('2'),
                amount: dec!(1),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        service
            .record_payment(PaymentRecord {
                payment_id: None,
                payer: addr('3'),
                recipient: addr('4'),
                amount: dec!(2),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(service.payments_for(&addr('1')).await.unwrap().len(), 1);
        assert_eq!(service.payments_for(&addr('4')).await.unwrap().len(), 1);
        assert!(service.payments_for(&addr('5')).await.unwrap().is_empty());
    }
}
