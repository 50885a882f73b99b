//! Asynchronous repair of half-applied transfer groups
//!
//! When a transfer commits one side but not the other, the orchestrator
//! publishes a [`TransferFailedEvent`]. The [`CompensationConsumer`] reacts by
//! reversing whichever side did commit, so that every group ends up either
//! fully applied or fully undone.
//!
//! # Delivery
//!
//! The channel is at-least-once: the same event may arrive more than once, and
//! the consumer may be retried after a crash. Handling is idempotent because
//! the reversing row is written under a group id derived from the failed
//! group ([`TransferGroupId::compensation`]) and the store refuses a second
//! row for the same side of a group. The check and the write happen under the
//! affected account's lock, so concurrent redeliveries serialize.

use super::account_ledger::AccountLedger;
use super::traits::{EventPublisher, TransferStore};
use crate::types::{
    AccountId, SettlementError, Transfer, TransferFailedEvent, TransferGroupId, TransferType,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Number of attempts per delivered event before giving up on it
const MAX_ATTEMPTS: u32 = 3;

/// What handling one event did
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationOutcome {
    /// No row of the group is durable; nothing to undo
    NothingCommitted,
    /// Both sides are durable; the group is consistent
    AlreadyComplete,
    /// The committed side was reversed by an earlier delivery
    AlreadyCompensated,
    /// The committed side has been reversed now
    Compensated {
        account: AccountId,
        /// Side of the reversing row
        side: TransferType,
        amount: Decimal,
    },
}

/// In-process compensation channel backed by a bounded tokio mpsc queue
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<TransferFailedEvent>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end for the consumer
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TransferFailedEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: TransferFailedEvent) -> Result<(), SettlementError> {
        let group = event.transfer_group_id;
        self.sender
            .send(event)
            .await
            .map_err(|_| SettlementError::EventPublish {
                group,
                message: "compensation channel closed".to_string(),
            })
    }
}

pub struct CompensationConsumer {
    ledger: Arc<AccountLedger>,
    store: Arc<dyn TransferStore>,
}

impl CompensationConsumer {
    pub fn new(ledger: Arc<AccountLedger>, store: Arc<dyn TransferStore>) -> Self {
        Self { ledger, store }
    }

    /// Bring one transfer group to a consistent state
    ///
    /// The event only says which group to look at; the decision is made from
    /// the rows actually stored for it.
    ///
    /// # Returns
    ///
    /// * `Ok(CompensationOutcome)` - The group is consistent now
    /// * `Err(SettlementError)` - The reversal could not be applied; the event
    ///   should be delivered again
    pub async fn handle(
        &self,
        event: &TransferFailedEvent,
    ) -> Result<CompensationOutcome, SettlementError> {
        let group = event.transfer_group_id;
        let rows = self.store.find_by_group(group);

        let committed = match rows.as_slice() {
            [] => {
                debug!(transfer_group_id = %group, "No committed side to compensate");
                return Ok(CompensationOutcome::NothingCommitted);
            }
            [row] => row.clone(),
            _ => {
                debug!(transfer_group_id = %group, "Group complete, nothing to compensate");
                return Ok(CompensationOutcome::AlreadyComplete);
            }
        };

        if committed.transfer_type != event.failed_side.counterpart() {
            warn!(
                transfer_group_id = %group,
                reported = %event.failed_side,
                committed = %committed.transfer_type,
                "Event disagrees with stored rows; compensating stored side"
            );
        }

        self.reverse_row(&committed).await
    }

    /// Undo a single committed row under its account's lock
    async fn reverse_row(&self, row: &Transfer) -> Result<CompensationOutcome, SettlementError> {
        let compensation_group = row.transfer_group_id.compensation();
        let mut account = self.ledger.lock(row.account_id).await?;

        if !self.store.find_by_group(compensation_group).is_empty() {
            debug!(transfer_group_id = %row.transfer_group_id, "Already compensated");
            return Ok(CompensationOutcome::AlreadyCompensated);
        }

        let balance_before = account.balance;
        let side = row.transfer_type.counterpart();
        match side {
            TransferType::Deposit => account.increase_balance(row.amount)?,
            TransferType::Withdrawal => account.decrease_balance(row.amount)?,
        }

        let reversing = Transfer {
            id: 0,
            transfer_group_id: compensation_group,
            user_id: row.user_id,
            transfer_type: side,
            account_id: row.account_id,
            currency: row.currency,
            exchange_rate: row.exchange_rate,
            amount: row.amount,
            balance_after: account.balance,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.insert(reversing) {
            account.balance = balance_before;
            return Err(e);
        }

        info!(
            transfer_group_id = %row.transfer_group_id,
            compensation_group_id = %compensation_group,
            account_id = row.account_id,
            side = %side,
            amount = %row.amount,
            "Transfer group compensated"
        );
        Ok(CompensationOutcome::Compensated {
            account: row.account_id,
            side,
            amount: row.amount,
        })
    }

    /// Handle one delivery, retrying transient failures
    async fn handle_with_retry(&self, event: &TransferFailedEvent) -> bool {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.handle(event).await {
                Ok(_) => return true,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        transfer_group_id = %event.transfer_group_id,
                        attempt,
                        error = %e,
                        "Compensation attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(e) => {
                    error!(
                        transfer_group_id = %event.transfer_group_id,
                        error = %e,
                        "Compensation abandoned; group needs manual repair"
                    );
                }
            }
        }
        false
    }

    /// Consume events until every publisher is gone or `shutdown` fires
    ///
    /// On shutdown the events already queued are still handled before
    /// returning, so nothing accepted by the channel is dropped.
    ///
    /// # Returns
    ///
    /// Number of events handled successfully
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<TransferFailedEvent>,
        shutdown: CancellationToken,
    ) -> usize {
        let mut handled = 0;
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle_with_retry(&event).await {
                            handled += 1;
                        }
                    }
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    events.close();
                    while let Some(event) = events.recv().await {
                        if self.handle_with_retry(&event).await {
                            handled += 1;
                        }
                    }
                    break;
                }
            }
        }
        debug!(handled, "Compensation consumer stopped");
        handled
    }
}
