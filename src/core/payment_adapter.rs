//! Payments on top of transfers
//!
//! A payment is a transfer with a lifecycle: it settles through one transfer
//! group and can later be refunded exactly once by a reverse transfer.
//!
//! # Concurrency
//!
//! Each payment has its own lock in a [`KeyedLocks`] map. Refunds of the same
//! payment serialize on it, so the status check and the reverse transfer
//! happen atomically with respect to each other: of two concurrent refunds,
//! exactly one moves money and the other sees `CANCELLED`.

use super::account_ledger::AccountLedger;
use super::keyed_lock::KeyedLocks;
use super::orchestrator::TransferOrchestrator;
use crate::types::{
    PaymentId, Payment, PaymentRequest, PaymentStatus, PaymentView, RefundRequest,
    SettlementError, TransferGroupId, TransferRequest, TransferType, UserId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub struct PaymentAdapter {
    orchestrator: Arc<TransferOrchestrator>,
    ledger: Arc<AccountLedger>,
    payments: KeyedLocks<PaymentId, Payment>,
    next_id: AtomicU64,
}

impl PaymentAdapter {
    pub fn new(orchestrator: Arc<TransferOrchestrator>, ledger: Arc<AccountLedger>) -> Self {
        Self {
            orchestrator,
            ledger,
            payments: KeyedLocks::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Settle a payment from the payer's account to the payee's
    ///
    /// The payment is recorded as `PENDING` under a fresh transfer group and
    /// stays locked while that group's transfer runs. It becomes `COMPLETED`
    /// once the transfer commits; if the transfer fails the record is dropped,
    /// so a failed payment leaves no trace besides its error.
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentId)` - The payment is `COMPLETED`
    /// * `Err(SettlementError::WithdrawalAccountNotFound)` - Unknown payer account number
    /// * `Err(_)` - Any transfer failure, unchanged
    pub async fn make_payment(
        &self,
        user_id: UserId,
        request: PaymentRequest,
    ) -> Result<PaymentId, SettlementError> {
        let withdrawal_account_id = self
            .ledger
            .id_by_number(&request.withdrawal_account_number)
            .ok_or_else(|| {
                SettlementError::withdrawal_account_not_found(&request.withdrawal_account_number)
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let group = TransferGroupId::new();
        let mut payment = self
            .payments
            .lock_or_insert_with(id, || Payment {
                id,
                transfer_group_id: group,
                status: PaymentStatus::Pending,
            })
            .await;
        debug!(payment_id = id, transfer_group_id = %group, "Payment pending");

        let settled = self
            .orchestrator
            .transfer_in_group(
                user_id,
                group,
                TransferRequest {
                    withdrawal_account_id,
                    withdrawal_account_password: request.withdrawal_account_password,
                    deposit_account_number: request.deposit_account_number,
                    amount: request.amount,
                },
            )
            .await;

        match settled {
            Ok(_) => {
                payment.status = PaymentStatus::Completed;
                info!(payment_id = id, transfer_group_id = %group, "Payment completed");
                Ok(id)
            }
            Err(e) => {
                self.payments.remove(&id);
                Err(e)
            }
        }
    }

    /// Refund a completed payment
    ///
    /// Runs a reverse transfer that returns the payer's balance and the
    /// payee's balance to their values before the payment, then marks the
    /// payment `CANCELLED`. The caller must own the payee account and present
    /// its password.
    ///
    /// # Returns
    ///
    /// * `Ok(TransferGroupId)` - Group id of the reverse transfer
    /// * `Err(SettlementError::PaymentNotFound)` - Unknown or not yet settled payment
    /// * `Err(SettlementError::AlreadyCancelled)` - The payment was already refunded
    /// * `Err(_)` - The reverse transfer failed; the payment stays `COMPLETED`
    pub async fn refund_payment(
        &self,
        user_id: UserId,
        request: RefundRequest,
    ) -> Result<TransferGroupId, SettlementError> {
        let mut payment = self
            .payments
            .lock(&request.payment_id)
            .await
            .ok_or(SettlementError::PaymentNotFound {
                payment: request.payment_id,
            })?;

        match payment.status {
            PaymentStatus::Completed => {}
            PaymentStatus::Cancelled => {
                return Err(SettlementError::AlreadyCancelled {
                    payment: payment.id,
                })
            }
            // Settling, or dropped after its transfer failed
            PaymentStatus::Pending => {
                return Err(SettlementError::PaymentNotFound {
                    payment: payment.id,
                })
            }
        }

        let receipt = self
            .orchestrator
            .reverse(
                user_id,
                payment.transfer_group_id,
                &request.withdrawal_account_password,
            )
            .await?;

        payment.status = PaymentStatus::Cancelled;
        info!(
            payment_id = payment.id,
            refund_group_id = %receipt.transfer_group_id,
            "Payment refunded"
        );
        Ok(receipt.transfer_group_id)
    }

    /// Current state of a payment
    pub async fn payment(&self, payment_id: PaymentId) -> Option<Payment> {
        let payment = self.payments.lock(&payment_id).await?;
        Some(payment.clone())
    }

    /// Display projection of a payment
    ///
    /// # Returns
    ///
    /// * `Ok(PaymentView)` - Built from the payment, its group rows and both accounts
    /// * `Err(SettlementError::PaymentNotFound)` - Unknown payment
    /// * `Err(SettlementError::TransferGroupNotFound)` - The settling group is incomplete
    pub async fn view(&self, payment_id: PaymentId) -> Result<PaymentView, SettlementError> {
        let payment = self
            .payment(payment_id)
            .await
            .ok_or(SettlementError::PaymentNotFound {
                payment: payment_id,
            })?;

        let rows = self.orchestrator.transfers_in_group(payment.transfer_group_id);
        let side = |side: TransferType| {
            rows.iter()
                .find(|row| row.transfer_type == side)
                .ok_or(SettlementError::TransferGroupNotFound {
                    group: payment.transfer_group_id,
                })
        };
        let withdrawal = side(TransferType::Withdrawal)?;
        let deposit = side(TransferType::Deposit)?;

        let payer = self
            .ledger
            .snapshot(withdrawal.account_id)
            .await
            .ok_or_else(|| SettlementError::account_not_found(withdrawal.account_id))?;
        let payee = self
            .ledger
            .snapshot(deposit.account_id)
            .await
            .ok_or_else(|| SettlementError::account_not_found(deposit.account_id))?;

        Ok(PaymentView {
            payment_id: payment.id,
            status: payment.status,
            payer_account_number: payer.number,
            payee_account_number: payee.number,
            amount: deposit.amount,
            exchange_rate: deposit.exchange_rate,
            currency: deposit.currency,
        })
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}
