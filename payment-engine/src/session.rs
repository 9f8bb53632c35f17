//! Session management: binding the engine to a wallet identity
//!
//! The wallet is an external collaborator: it owns key material and tells
//! us which address is active. A session exists only while exactly one
//! address is active; when the wallet switches identity, the old session's
//! loops, claims, and cache are all torn down before a new session opens.
//! Cached state never leaks across identities.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::orchestrator::PaymentOrchestrator;
use crate::records::RecordService;
use async_trait::async_trait;
use ledger_client::{Address, LedgerApi};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// External wallet: identity source for the engine
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// The currently active address, if any wallet is connected
    async fn current_address(&self) -> Option<Address>;

    /// Identity-change notifications; the receiver holds the latest value
    fn watch_address(&self) -> watch::Receiver<Option<Address>>;
}

/// Fixed-identity wallet for tests and demos
pub struct StaticWallet {
    current: watch::Sender<Option<Address>>,
}

impl StaticWallet {
    /// Create a wallet holding `address` (or disconnected when `None`)
    pub fn new(address: Option<Address>) -> Self {
        let (current, _) = watch::channel(address);
        Self { current }
    }

    /// Switch the active identity, notifying watchers
    pub fn switch(&self, address: Option<Address>) {
        let _ = self.current.send(address);
    }
}

#[async_trait]
impl WalletProvider for StaticWallet {
    async fn current_address(&self) -> Option<Address> {
        self.current.borrow().clone()
    }

    fn watch_address(&self) -> watch::Receiver<Option<Address>> {
        self.current.subscribe()
    }
}

/// A live session: one orchestrator plus its background loops
pub struct PaymentSession {
    orchestrator: Arc<PaymentOrchestrator>,
    shutdown: watch::Sender<bool>,
    event_loop: JoinHandle<()>,
    sweep_loop: JoinHandle<()>,
}

impl PaymentSession {
    /// Open a session for `address`: bootstrap from the ledger and start
    /// the event and sweep loops.
    pub async fn open(
        ledger: Arc<dyn LedgerApi>,
        records: Arc<dyn RecordService>,
        config: EngineConfig,
        address: Address,
    ) -> Result<Self> {
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            Arc::clone(&ledger),
            records,
            config.clone(),
            address.clone(),
        ));
        orchestrator.bootstrap().await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let event_loop = orchestrator
            .reconciler()
            .spawn_event_loop(ledger.subscribe(), shutdown_rx.clone());
        let sweep_loop = orchestrator
            .reconciler()
            .spawn_sweep_loop(config.sweep_interval(), shutdown_rx);

        info!(address = %address, "session opened");
        Ok(Self {
            orchestrator,
            shutdown,
            event_loop,
            sweep_loop,
        })
    }

    /// The session's operation surface
    pub fn orchestrator(&self) -> &Arc<PaymentOrchestrator> {
        &self.orchestrator
    }

    /// The identity this session acts as
    pub fn address(&self) -> &Address {
        self.orchestrator.address()
    }

    /// Tear the session down: loops stopped and awaited, pollers stopped,
    /// in-flight claims and cache dropped.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        self.orchestrator.teardown();
        let _ = self.event_loop.await;
        let _ = self.sweep_loop.await;
        info!(address = %self.orchestrator.address(), "session closed");
    }
}

/// Opens and replaces sessions as the wallet identity changes
pub struct SessionManager {
    ledger: Arc<dyn LedgerApi>,
    records: Arc<dyn RecordService>,
    config: EngineConfig,
    wallet: Arc<dyn WalletProvider>,
    session: tokio::sync::Mutex<Option<PaymentSession>>,
}

impl SessionManager {
    /// Create a manager over the given collaborators
    pub fn new(
        ledger: Arc<dyn LedgerApi>,
        records: Arc<dyn RecordService>,
        config: EngineConfig,
        wallet: Arc<dyn WalletProvider>,
    ) -> Self {
        Self {
            ledger,
            records,
            config,
            wallet,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Open a session for the wallet's current identity, replacing any
    /// existing session. Fails with [`Error::NotInitialized`] when no
    /// wallet is connected.
    pub async fn open_current(&self) -> Result<Arc<PaymentOrchestrator>> {
        let address = self
            .wallet
            .current_address()
            .await
            .ok_or(Error::NotInitialized)?;

        let mut slot = self.session.lock().await;
        if let Some(existing) = slot.take() {
            existing.close().await;
        }
        let session = PaymentSession::open(
            Arc::clone(&self.ledger),
            Arc::clone(&self.records),
            self.config.clone(),
            address,
        )
        .await?;
        let orchestrator = Arc::clone(session.orchestrator());
        *slot = Some(session);
        Ok(orchestrator)
    }

    /// The active session's orchestrator, if a session is open
    pub async fn current(&self) -> Option<Arc<PaymentOrchestrator>> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| Arc::clone(s.orchestrator()))
    }

    /// Close the active session, if any
    pub async fn close(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close().await;
        }
    }

    /// React to wallet identity changes until the wallet channel closes:
    /// a new address replaces the session, a disconnect closes it.
    pub fn spawn_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut addresses = manager.wallet.watch_address();
        tokio::spawn(async move {
            while addresses.changed().await.is_ok() {
                let address = addresses.borrow_and_update().clone();
                match address {
                    Some(address) => {
                        info!(address = %address, "wallet identity changed");
                        if let Err(e) = manager.open_current().await {
                            warn!(error = %e, "session reopen failed");
                        }
                    }
                    None => {
                        info!("wallet disconnected");
                        manager.close().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecordService;
    use crate::types::StatusFilter;
    use ledger_client::MemoryLedger;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn addr(fill: char) -> Address {
        Address::parse(&format!("0x{}", fill.to_string().repeat(40))).unwrap()
    }

    fn manager(
        ledger: &Arc<MemoryLedger>,
        wallet: &Arc<StaticWallet>,
    ) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::clone(ledger) as Arc<dyn LedgerApi>,
            Arc::new(MemoryRecordService::new()),
            EngineConfig::default(),
            Arc::clone(wallet) as Arc<dyn WalletProvider>,
        ))
    }

    #[tokio::test]
    async fn test_open_requires_identity() {
        let ledger = Arc::new(MemoryLedger::new());
        let wallet = Arc::new(StaticWallet::new(None));
        let manager = manager(&ledger, &wallet);

        let err = manager.open_current().await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_session_sees_pushed_events() {
        let ledger = Arc::new(MemoryLedger::new());
        let wallet = Arc::new(StaticWallet::new(Some(addr('2'))));
        let manager = manager(&ledger, &wallet);
        let orchestrator = manager.open_current().await.unwrap();

        ledger.register_seller(&addr('1'), "Acme").await.unwrap();
        ledger
            .create_payment_request(&addr('1'), "pay_0000000001000", dec!(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(orchestrator.payment_requests(StatusFilter::Pending).len(), 1);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_identity_change_resets_state() {
        let ledger = Arc::new(MemoryLedger::new());
        let wallet = Arc::new(StaticWallet::new(Some(addr('1'))));
        let manager = manager(&ledger, &wallet);
        let supervisor = manager.spawn_supervisor();

        let first = manager.open_current().await.unwrap();
        first.register_seller("Acme").await.unwrap();
        first.create_payment_request(dec!(1)).await.unwrap();
        assert_eq!(first.payment_requests(StatusFilter::All).len(), 1);

        wallet.switch(Some(addr('2')));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The old session's cache is gone and a fresh one is live
        assert!(first.payment_requests(StatusFilter::All).is_empty());
        let second = manager.current().await.unwrap();
        assert_eq!(second.address(), &addr('2'));
        assert!(second.payment_requests(StatusFilter::All).is_empty());

        wallet.switch(None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.current().await.is_none());

        supervisor.abort();
    }
}
