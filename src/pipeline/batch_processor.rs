//! Batch processing with key-based partitioning
//!
//! This module provides the `BatchProcessor` struct, which runs a batch of
//! operations concurrently while keeping the operations that share a
//! partition key in input order.
//!
//! # Design
//!
//! A batch is split by [`Operation::partition_key`]. Each partition runs on
//! its own tokio task and handles its operations one after another. Different
//! partitions may still touch the same accounts; the account locks inside the
//! orchestrator keep those interleavings correct.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     ├── Arc<AccountLedger>              (account number lookups)
//!     ├── Arc<TransferOrchestrator>       (transfer operations)
//!     ├── Arc<PaymentAdapter>             (payment and refund operations)
//!     └── Arc<DashMap<String, PaymentId>> (payment references seen so far)
//! ```

use crate::core::{AccountLedger, PaymentAdapter, TransferOrchestrator};
use crate::io::NumberedOperation;
use crate::types::{
    Operation, PaymentId, PaymentRequest, RefundRequest, SettlementError, TransferGroupId,
    TransferRequest,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

/// What a successful operation produced
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Transferred(TransferGroupId),
    Paid(PaymentId),
    Refunded(TransferGroupId),
}

/// Result of processing a single operation
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The operation that was processed
    pub record: NumberedOperation,

    /// The result of processing (success or error)
    pub result: Result<OperationOutcome, SettlementError>,
}

/// Results of one batch
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One result per operation that ran to completion
    pub results: Vec<ProcessingResult>,

    /// Lines of operations lost to a panicked partition task
    pub aborted: Vec<u64>,
}

impl BatchReport {
    /// Fold a finished partition task into the report
    ///
    /// A task that panicked yields no results, so every line it was given is
    /// recorded as aborted.
    fn absorb(&mut self, joined: Result<Vec<ProcessingResult>, JoinError>, lines: Vec<u64>) {
        match joined {
            Ok(partition_results) => self.results.extend(partition_results),
            Err(e) => {
                error!(error = ?e, lines = ?lines, "Partition task panicked; operations aborted");
                self.aborted.extend(lines);
            }
        }
    }
}

#[derive(Clone)]
pub struct BatchProcessor {
    ledger: Arc<AccountLedger>,
    orchestrator: Arc<TransferOrchestrator>,
    payments: Arc<PaymentAdapter>,
    references: Arc<DashMap<String, PaymentId>>,
}

impl BatchProcessor {
    pub fn new(
        ledger: Arc<AccountLedger>,
        orchestrator: Arc<TransferOrchestrator>,
        payments: Arc<PaymentAdapter>,
    ) -> Self {
        Self {
            ledger,
            orchestrator,
            payments,
            references: Arc::new(DashMap::new()),
        }
    }

    /// Partition a batch by partition key
    ///
    /// # Guarantees
    ///
    /// - Each operation appears in exactly one sub-batch
    /// - Operations in each sub-batch keep their original order
    pub fn partition(
        &self,
        batch: Vec<NumberedOperation>,
    ) -> HashMap<String, Vec<NumberedOperation>> {
        let mut partitions: HashMap<String, Vec<NumberedOperation>> = HashMap::new();

        for record in batch {
            partitions
                .entry(record.operation.partition_key().to_string())
                .or_default()
                .push(record);
        }

        partitions
    }

    /// Execute one operation
    pub async fn execute(&self, operation: &Operation) -> Result<OperationOutcome, SettlementError> {
        match operation {
            Operation::Transfer {
                user,
                from,
                password,
                to,
                amount,
            } => {
                let withdrawal_account_id = self
                    .ledger
                    .id_by_number(from)
                    .ok_or_else(|| SettlementError::withdrawal_account_not_found(from))?;
                let receipt = self
                    .orchestrator
                    .transfer(
                        *user,
                        TransferRequest {
                            withdrawal_account_id,
                            withdrawal_account_password: password.clone(),
                            deposit_account_number: to.clone(),
                            amount: *amount,
                        },
                    )
                    .await?;
                Ok(OperationOutcome::Transferred(receipt.transfer_group_id))
            }
            Operation::Payment {
                user,
                reference,
                from,
                password,
                to,
                amount,
            } => {
                if self.references.contains_key(reference) {
                    return Err(SettlementError::DuplicateReference {
                        reference: reference.clone(),
                    });
                }
                let payment = self
                    .payments
                    .make_payment(
                        *user,
                        PaymentRequest {
                            withdrawal_account_number: from.clone(),
                            withdrawal_account_password: password.clone(),
                            deposit_account_number: to.clone(),
                            amount: *amount,
                        },
                    )
                    .await?;
                match self.references.entry(reference.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(payment);
                    }
                    Entry::Occupied(_) => {
                        error!(reference = %reference, payment_id = payment, "Payment reference raced");
                    }
                }
                Ok(OperationOutcome::Paid(payment))
            }
            Operation::Refund {
                user,
                reference,
                password,
            } => {
                let payment_id = self
                    .references
                    .get(reference)
                    .map(|entry| *entry.value())
                    .ok_or_else(|| SettlementError::UnknownReference {
                        reference: reference.clone(),
                    })?;
                let group = self
                    .payments
                    .refund_payment(
                        *user,
                        RefundRequest {
                            payment_id,
                            withdrawal_account_password: password.clone(),
                        },
                    )
                    .await?;
                Ok(OperationOutcome::Refunded(group))
            }
        }
    }

    /// Process all operations of one partition sequentially
    ///
    /// Failures are logged and recorded; they never stop the partition.
    pub async fn process_partition(
        &self,
        operations: Vec<NumberedOperation>,
    ) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(operations.len());

        for record in operations {
            let result = self.execute(&record.operation).await;
            match &result {
                Ok(outcome) => debug!(line = record.line, ?outcome, "Operation applied"),
                Err(e) => warn!(
                    line = record.line,
                    op = record.operation.name(),
                    kind = ?e.kind(),
                    error = %e,
                    "Operation rejected"
                ),
            }
            results.push(ProcessingResult { record, result });
        }

        results
    }

    /// Process a batch with key-based partitioning
    ///
    /// # Returns
    ///
    /// One result per completed operation, in no particular order since
    /// partitions run concurrently, plus the lines of any operations whose
    /// partition task panicked.
    pub async fn process_batch(&self, batch: Vec<NumberedOperation>) -> BatchReport {
        let partitions = self.partition(batch);

        let mut tasks = Vec::with_capacity(partitions.len());
        for (_key, operations) in partitions {
            let lines: Vec<u64> = operations.iter().map(|record| record.line).collect();
            let processor = self.clone();
            let handle = tokio::spawn(async move { processor.process_partition(operations).await });
            tasks.push((handle, lines));
        }

        let mut report = BatchReport::default();
        for (handle, lines) in tasks {
            report.absorb(handle.await, lines);
        }

        report
    }
}
