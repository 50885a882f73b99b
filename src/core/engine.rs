//! Settlement engine wiring
//!
//! This module provides the `SettlementEngine` struct, which assembles the
//! ledger, transfer store, rate resolver, orchestrator, payment adapter and
//! compensation consumer into one running unit.
//!
//! # Architecture
//!
//! ```text
//! SettlementEngine
//!     ├── Arc<AccountLedger>           (balances, per-account locks)
//!     ├── Arc<dyn TransferStore>       (ledger rows)
//!     ├── Arc<ExchangeRateResolver>    (cached rates, ranked providers)
//!     ├── Arc<TransferOrchestrator>    (transfers and reversals)
//!     ├── Arc<PaymentAdapter>          (payments and refunds)
//!     └── compensation task            (CompensationConsumer::run on a tokio task)
//!              ▲
//!              └── ChannelPublisher ◄── TransferOrchestrator
//! ```
//!
//! # Lifecycle
//!
//! [`SettlementEngine::start`] must be called from within a tokio runtime: it
//! spawns the compensation consumer. [`SettlementEngine::shutdown`] stops the
//! consumer after it has drained every event already published.

use super::account_ledger::AccountLedger;
use super::compensation::{ChannelPublisher, CompensationConsumer};
use super::credentials::PlainCredentialVerifier;
use super::orchestrator::TransferOrchestrator;
use super::payment_adapter::PaymentAdapter;
use super::traits::TransferStore;
use super::transfer_store::InMemoryTransferStore;
use crate::config::SettlementConfig;
use crate::rates::{ExchangeRateResolver, RateProvider};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct SettlementEngine {
    ledger: Arc<AccountLedger>,
    store: Arc<dyn TransferStore>,
    resolver: Arc<ExchangeRateResolver>,
    orchestrator: Arc<TransferOrchestrator>,
    payments: Arc<PaymentAdapter>,
    shutdown: CancellationToken,
    consumer: JoinHandle<usize>,
}

impl SettlementEngine {
    /// Start an engine with an in-memory transfer store
    ///
    /// # Arguments
    ///
    /// * `providers` - Rate providers, primary first
    /// * `config` - Engine settings; invalid values fall back to defaults
    pub fn start(providers: Vec<Arc<dyn RateProvider>>, config: SettlementConfig) -> Self {
        Self::start_with_store(Arc::new(InMemoryTransferStore::new()), providers, config)
    }

    /// Start an engine over an existing transfer store
    pub fn start_with_store(
        store: Arc<dyn TransferStore>,
        providers: Vec<Arc<dyn RateProvider>>,
        config: SettlementConfig,
    ) -> Self {
        let config = config.validated();
        let ledger = Arc::new(AccountLedger::new());
        let resolver = Arc::new(ExchangeRateResolver::new(providers, &config));
        let (publisher, events) = ChannelPublisher::channel(config.channel_capacity);

        let orchestrator = Arc::new(TransferOrchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&resolver),
            Arc::clone(&store),
            Arc::new(publisher),
            Arc::new(PlainCredentialVerifier),
            &config,
        ));
        let payments = Arc::new(PaymentAdapter::new(
            Arc::clone(&orchestrator),
            Arc::clone(&ledger),
        ));

        let shutdown = CancellationToken::new();
        let consumer = Arc::new(CompensationConsumer::new(
            Arc::clone(&ledger),
            Arc::clone(&store),
        ));
        let consumer = tokio::spawn(consumer.run(events, shutdown.clone()));

        info!(
            rate_ttl_secs = config.rate_ttl_secs,
            provider_timeout_ms = config.provider_timeout_ms,
            "Settlement engine started"
        );

        Self {
            ledger,
            store,
            resolver,
            orchestrator,
            payments,
            shutdown,
            consumer,
        }
    }

    pub fn ledger(&self) -> &Arc<AccountLedger> {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<ExchangeRateResolver> {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &Arc<TransferOrchestrator> {
        &self.orchestrator
    }

    pub fn payments(&self) -> &Arc<PaymentAdapter> {
        &self.payments
    }

    /// Stop the compensation consumer once its queue is empty
    ///
    /// # Returns
    ///
    /// Number of compensation events handled over the engine's lifetime
    pub async fn shutdown(self) -> usize {
        self.shutdown.cancel();
        match self.consumer.await {
            Ok(handled) => {
                info!(compensations = handled, "Settlement engine stopped");
                handled
            }
            Err(e) => {
                warn!(error = %e, "Compensation consumer ended abnormally");
                0
            }
        }
    }
}
