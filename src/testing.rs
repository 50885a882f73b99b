//! Shared test doubles and fixtures

use crate::config::SettlementConfig;
use crate::core::traits::{EventPublisher, TransferStore};
use crate::core::{
    AccountLedger, CompensationConsumer, InMemoryTransferStore, PaymentAdapter,
    PlainCredentialVerifier, TransferOrchestrator,
};
use crate::rates::{ExchangeRateResolver, ProviderError, RateProvider, StaticRateProvider};
use crate::types::{
    AccountId, Currency, RatePair, SettlementError, Transfer, TransferFailedEvent,
    TransferGroupId, TransferId, TransferType, UserId,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted rate provider that counts its calls
#[derive(Debug, Default)]
pub(crate) struct CountingProvider {
    name: String,
    rates: Mutex<HashMap<RatePair, String>>,
    per_pair: Mutex<HashMap<RatePair, usize>>,
    delay: Option<Duration>,
    pair_delays: HashMap<RatePair, Duration>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_rate(self, base: Currency, quote: Currency, payload: &str) -> Self {
        self.set_rate(base, quote, payload);
        self
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_pair_delay(mut self, pair: RatePair, delay: Duration) -> Self {
        self.pair_delays.insert(pair, delay);
        self
    }

    pub fn set_rate(&self, base: Currency, quote: Currency, payload: &str) {
        self.rates
            .lock()
            .unwrap()
            .insert(RatePair::new(base, quote), payload.to_string());
    }

    pub fn calls_for(&self, pair: RatePair) -> usize {
        self.per_pair.lock().unwrap().get(&pair).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RateProvider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rate(&self, pair: RatePair) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.per_pair.lock().unwrap().entry(pair).or_insert(0) += 1;

        if let Some(delay) = self.pair_delays.get(&pair).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("scripted outage".to_string()));
        }

        let payload = self.rates.lock().unwrap().get(&pair).cloned();
        payload.ok_or(ProviderError::UnsupportedPair(pair))
    }

    fn parse_rate(&self, _pair: RatePair, payload: &str) -> Result<Decimal, ProviderError> {
        Decimal::from_str(payload).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

/// In-memory store that can be told to reject one side's rows
#[derive(Debug, Default)]
pub(crate) struct FailingTransferStore {
    inner: InMemoryTransferStore,
    failing: Mutex<Option<TransferType>>,
}

impl FailingTransferStore {
    pub fn fail_side(&self, side: TransferType) {
        *self.failing.lock().unwrap() = Some(side);
    }

    pub fn heal(&self) {
        *self.failing.lock().unwrap() = None;
    }

    pub fn row_count(&self) -> usize {
        self.inner.row_count()
    }
}

impl TransferStore for FailingTransferStore {
    fn insert(&self, row: Transfer) -> Result<TransferId, SettlementError> {
        if *self.failing.lock().unwrap() == Some(row.transfer_type) {
            return Err(SettlementError::ledger_write(
                row.transfer_group_id,
                row.transfer_type,
                "injected write failure",
            ));
        }
        self.inner.insert(row)
    }

    fn find_by_group(&self, group: TransferGroupId) -> Vec<Transfer> {
        self.inner.find_by_group(group)
    }

    fn find_by_account(&self, account: AccountId) -> Vec<Transfer> {
        self.inner.find_by_account(account)
    }
}

/// Publisher that keeps every event it receives
#[derive(Debug, Default)]
pub(crate) struct RecordingPublisher {
    events: Mutex<Vec<TransferFailedEvent>>,
    closed: AtomicBool,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<TransferFailedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: TransferFailedEvent) -> Result<(), SettlementError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SettlementError::EventPublish {
                group: event.transfer_group_id,
                message: "publisher closed".to_string(),
            });
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Fully wired core over test doubles
///
/// Accounts opened through [`Harness::open`] use their number as display name
/// and `pw-<number>` as password.
pub(crate) struct Harness {
    pub ledger: Arc<AccountLedger>,
    pub store: Arc<FailingTransferStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub orchestrator: Arc<TransferOrchestrator>,
    pub payments: Arc<PaymentAdapter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_provider(StaticRateProvider::new("static"))
    }

    pub fn with_rate(base: Currency, quote: Currency, rate: &str) -> Self {
        let rate = Decimal::from_str(rate).unwrap();
        Self::with_provider(StaticRateProvider::new("static").with_rate(base, quote, rate))
    }

    fn with_provider(provider: StaticRateProvider) -> Self {
        let config = SettlementConfig::default();
        let ledger = Arc::new(AccountLedger::new());
        let store = Arc::new(FailingTransferStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let resolver = Arc::new(ExchangeRateResolver::new(vec![Arc::new(provider)], &config));

        let orchestrator = Arc::new(TransferOrchestrator::new(
            Arc::clone(&ledger),
            resolver,
            Arc::clone(&store) as Arc<dyn TransferStore>,
            Arc::clone(&publisher) as Arc<dyn EventPublisher>,
            Arc::new(PlainCredentialVerifier),
            &config,
        ));
        let payments = Arc::new(PaymentAdapter::new(
            Arc::clone(&orchestrator),
            Arc::clone(&ledger),
        ));

        Self {
            ledger,
            store,
            publisher,
            orchestrator,
            payments,
        }
    }

    pub fn open(&self, user: UserId, number: &str, currency: Currency, balance: Decimal) -> AccountId {
        self.ledger
            .open_account(user, number, currency, number, &format!("pw-{}", number), balance)
            .unwrap()
    }

    pub async fn balance(&self, number: &str) -> Decimal {
        self.ledger.snapshot_by_number(number).await.unwrap().balance
    }

    pub fn consumer(&self) -> CompensationConsumer {
        CompensationConsumer::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.store) as Arc<dyn TransferStore>,
        )
    }
}
