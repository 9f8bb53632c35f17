//! End-to-end walkthrough on the in-memory reference ledger.
//!
//! A seller registers and opens a payment request; a client scans the
//! request id and pays it, then tips the seller directly by address.
//! Run with `RUST_LOG=debug` to watch the reconciliation traffic.

use anyhow::Result;
use ledger_client::{Address, LedgerApi, MemoryLedger};
use payment_engine::{
    EngineConfig, MemoryRecordService, PaymentOutcome, PaymentSession, StatusFilter,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let ledger = Arc::new(MemoryLedger::new());
    let records = Arc::new(MemoryRecordService::new());
    let config = EngineConfig::default();

    let seller_address = Address::parse("0x1111111111111111111111111111111111111111")?;
    let client_address = Address::parse("0x2222222222222222222222222222222222222222")?;

    let seller_session = PaymentSession::open(
        Arc::clone(&ledger) as Arc<dyn LedgerApi>,
        records.clone(),
        config.clone(),
        seller_address.clone(),
    )
    .await?;
    let client_session = PaymentSession::open(
        Arc::clone(&ledger) as Arc<dyn LedgerApi>,
        records,
        config,
        client_address,
    )
    .await?;

    let seller = seller_session.orchestrator();
    let client = client_session.orchestrator();

    let account = seller.register_seller("Corner Coffee").await?;
    info!(business_name = %account.business_name, "seller registered");

    let request = seller.create_payment_request(dec!(3.50)).await?;
    info!(
        payment_id = %request.payment_id,
        amount = %request.amount,
        expires = %request.expiry_time,
        "payment request open"
    );

    // The client scans the request id off the seller's screen
    match client.pay_scanned(&request.payment_id, None).await? {
        PaymentOutcome::Mediated(view) => {
            info!(payment_id = %view.details.payment_id, status = %view.status, "scan paid a request");
        }
        PaymentOutcome::Direct { .. } => unreachable!("a payment id was scanned"),
    }

    // Then tips the seller directly by address
    client.pay_direct(&seller_address, dec!(0.50)).await?;

    for entry in client.list_client_history().await? {
        info!(
            amount = %entry.amount(),
            counterparty = %entry.counterparty(),
            mediated = entry.payment_id().is_some(),
            "client history entry"
        );
    }

    let stats = ledger
        .get_seller_stats(&seller_address)
        .await?
        .ok_or_else(|| anyhow::anyhow!("seller stats missing"))?;
    info!(
        transactions = stats.total_transactions,
        total = %stats.total_amount,
        "seller totals"
    );

    for request in seller.payment_requests(StatusFilter::All) {
        info!(payment_id = %request.payment_id, status = %request.status, "seller request view");
    }

    client_session.close().await;
    seller_session.close().await;
    Ok(())
}
