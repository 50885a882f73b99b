//! Transfer orchestration
//!
//! This module provides the `TransferOrchestrator` struct, which drives one
//! logical money movement from request to two durable ledger rows.
//!
//! # State Machine
//!
//! ```text
//! INITIATED ─► RATE_RESOLVED ─► LOCKED ─► BALANCES_MUTATED ─► LEDGER_WRITTEN
//!     │              │             │              │
//!     └──────────────┴─────────────┴──────────────┴──────────► FAILED
//! ```
//!
//! Everything up to and including the rate lookup happens without any account
//! lock, so a slow rate provider never holds funds hostage. Validation,
//! not-found and authorization failures are all raised before `LOCKED`.
//!
//! # Commit Protocol
//!
//! With both account locks held (lower id first), the orchestrator:
//! 1. checks funds against the unrounded withdrawal equivalent,
//! 2. debits the withdrawal account and credits the deposit account,
//! 3. writes the WITHDRAWAL row, then the DEPOSIT row, under a fresh group id.
//!
//! Each side commits as a unit of balance change plus row. If the WITHDRAWAL
//! row cannot be written nothing is durable yet, so both balances are put back
//! and the transfer fails cleanly. If the DEPOSIT row cannot be written the
//! withdrawal side is already durable: the deposit balance is put back, the
//! locks are released, and a [`TransferFailedEvent`] is published so the
//! compensation consumer reverses the withdrawal side asynchronously.

use super::account_ledger::{AccountGuard, AccountLedger};
use super::traits::{CredentialVerifier, EventPublisher, TransferStore};
use crate::config::SettlementConfig;
use crate::rates::ExchangeRateResolver;
use crate::types::{
    Account, AccountId, Currency, SettlementError, Transfer, TransferFailedEvent, TransferGroupId,
    TransferReceipt, TransferRequest, TransferState, TransferType, UserId,
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything needed to move funds once both accounts are known
#[derive(Debug, Clone)]
struct SettlementPlan {
    group: TransferGroupId,
    user_id: UserId,
    withdrawal_account: AccountId,
    withdrawal_currency: Currency,
    deposit_account: AccountId,
    deposit_currency: Currency,
    /// Unrounded withdrawal equivalent, used for the funds check
    required: Decimal,
    /// Rounded amount actually debited
    withdrawal_amount: Decimal,
    deposit_amount: Decimal,
    exchange_rate: Decimal,
}

/// Tracks and logs the state of one transfer
struct Progress {
    group: TransferGroupId,
    state: TransferState,
}

impl Progress {
    fn new(group: TransferGroupId) -> Self {
        debug!(transfer_group_id = %group, state = %TransferState::Initiated, "Transfer initiated");
        Self {
            group,
            state: TransferState::Initiated,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transfer transition {} -> {}",
            self.state,
            next
        );
        debug!(transfer_group_id = %self.group, from = %self.state, to = %next, "Transfer state");
        self.state = next;
    }

    fn fail(&mut self, error: SettlementError) -> SettlementError {
        warn!(
            transfer_group_id = %self.group,
            from = %self.state,
            error = %error,
            "Transfer failed"
        );
        self.state = TransferState::Failed;
        error
    }
}

/// Coordinates single transfers and their reversals
///
/// # Thread Safety
///
/// Cheap to share behind an `Arc`; any number of transfers may run at once.
/// Serialization happens only on the account locks they have in common.
pub struct TransferOrchestrator {
    ledger: Arc<AccountLedger>,
    resolver: Arc<ExchangeRateResolver>,
    store: Arc<dyn TransferStore>,
    publisher: Arc<dyn EventPublisher>,
    verifier: Arc<dyn CredentialVerifier>,
    min_amount: Decimal,
    amount_scale: u32,
    rate_scale: u32,
}

impl TransferOrchestrator {
    pub fn new(
        ledger: Arc<AccountLedger>,
        resolver: Arc<ExchangeRateResolver>,
        store: Arc<dyn TransferStore>,
        publisher: Arc<dyn EventPublisher>,
        verifier: Arc<dyn CredentialVerifier>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            resolver,
            store,
            publisher,
            verifier,
            min_amount: config.min_amount,
            amount_scale: config.amount_scale,
            rate_scale: config.rate_scale,
        }
    }

    /// Execute a transfer on behalf of `user_id`
    ///
    /// `request.amount` is credited to the deposit account in its own currency;
    /// the withdrawal account is debited the equivalent at the current rate,
    /// rounded up to the configured amount scale.
    ///
    /// # Returns
    ///
    /// * `Ok(TransferReceipt)` - Both ledger rows are durable
    /// * `Err(SettlementError::InvalidAmount | SameAccount)` - Rejected before any lock
    /// * `Err(SettlementError::WithdrawalAccountNotFound | DepositAccountNotFound)` -
    ///   Rejected before any lock
    /// * `Err(SettlementError::NotAccountOwner | PasswordMismatch)` - Rejected before any lock
    /// * `Err(SettlementError::RateUnavailable | InvalidCurrency | RateParse)` -
    ///   Rejected before any lock
    /// * `Err(SettlementError::ArithmeticOverflow)` - The withdrawal equivalent does not
    ///   fit a `Decimal`; rejected before any lock
    /// * `Err(SettlementError::InsufficientFunds)` - Detected under lock, nothing changed
    /// * `Err(SettlementError::LedgerWrite)` - WITHDRAWAL row failed, nothing changed
    /// * `Err(SettlementError::CompensationPending | EventPublish)` - DEPOSIT row failed
    ///   after the withdrawal side committed
    pub async fn transfer(
        &self,
        user_id: UserId,
        request: TransferRequest,
    ) -> Result<TransferReceipt, SettlementError> {
        self.transfer_in_group(user_id, TransferGroupId::new(), request)
            .await
    }

    /// Execute a transfer under a group id chosen by the caller
    ///
    /// Lets a caller record the group before the transfer runs. `group` must
    /// be fresh: rows of a group that already has them are refused by the
    /// store, which surfaces as `LedgerWrite`.
    pub async fn transfer_in_group(
        &self,
        user_id: UserId,
        group: TransferGroupId,
        request: TransferRequest,
    ) -> Result<TransferReceipt, SettlementError> {
        let mut progress = Progress::new(group);

        let (withdrawal, deposit) = self
            .prepare(user_id, &request)
            .await
            .map_err(|e| progress.fail(e))?;

        let exchange_rate = self
            .resolver
            .rate(withdrawal.currency, deposit.currency)
            .await
            .map_err(|e| progress.fail(e))?;
        progress.advance(TransferState::RateResolved);

        let (required, withdrawal_amount) = self
            .withdrawal_equivalent(withdrawal.id, request.amount, exchange_rate)
            .map_err(|e| progress.fail(e))?;

        let plan = SettlementPlan {
            group: progress.group,
            user_id,
            withdrawal_account: withdrawal.id,
            withdrawal_currency: withdrawal.currency,
            deposit_account: deposit.id,
            deposit_currency: deposit.currency,
            required,
            withdrawal_amount,
            deposit_amount: request.amount,
            exchange_rate,
        };

        self.settle(plan, progress).await
    }

    /// Move back the funds of a completed transfer group
    ///
    /// The account credited by the original group is debited exactly what it
    /// received, and the account debited by it is credited exactly what it
    /// paid, so both balances return to their pre-transfer values. The
    /// initiating user must own the originally credited account and present
    /// its password.
    pub async fn reverse(
        &self,
        user_id: UserId,
        group: TransferGroupId,
        password: &str,
    ) -> Result<TransferReceipt, SettlementError> {
        let mut progress = Progress::new(TransferGroupId::new());
        debug!(transfer_group_id = %progress.group, original = %group, "Reversing transfer group");

        let rows = self.store.find_by_group(group);
        let original_withdrawal = rows
            .iter()
            .find(|row| row.transfer_type == TransferType::Withdrawal)
            .cloned();
        let original_deposit = rows
            .iter()
            .find(|row| row.transfer_type == TransferType::Deposit)
            .cloned();
        let (Some(original_withdrawal), Some(original_deposit)) =
            (original_withdrawal, original_deposit)
        else {
            return Err(progress.fail(SettlementError::TransferGroupNotFound { group }));
        };

        let payee = self
            .ledger
            .snapshot(original_deposit.account_id)
            .await
            .ok_or_else(|| SettlementError::withdrawal_account_not_found(original_deposit.account_id))
            .map_err(|e| progress.fail(e))?;
        let payer = self
            .ledger
            .snapshot(original_withdrawal.account_id)
            .await
            .ok_or_else(|| SettlementError::deposit_account_not_found(original_withdrawal.account_id))
            .map_err(|e| progress.fail(e))?;

        self.authorize(user_id, &payee, password)
            .map_err(|e| progress.fail(e))?;

        let exchange_rate = Decimal::ONE
            .checked_div(original_deposit.exchange_rate)
            .ok_or_else(|| SettlementError::arithmetic_overflow("rate inversion", payee.id))
            .map_err(|e| progress.fail(e))?
            .round_dp_with_strategy(self.rate_scale, RoundingStrategy::ToPositiveInfinity);
        progress.advance(TransferState::RateResolved);

        let plan = SettlementPlan {
            group: progress.group,
            user_id,
            withdrawal_account: payee.id,
            withdrawal_currency: payee.currency,
            deposit_account: payer.id,
            deposit_currency: payer.currency,
            required: original_deposit.amount,
            withdrawal_amount: original_deposit.amount,
            deposit_amount: original_withdrawal.amount,
            exchange_rate,
        };

        self.settle(plan, progress).await
    }

    /// Ledger rows of a transfer group
    pub fn transfers_in_group(&self, group: TransferGroupId) -> Vec<Transfer> {
        self.store.find_by_group(group)
    }

    /// Ledger rows touching an account, oldest first
    pub fn account_history(&self, account: AccountId) -> Vec<Transfer> {
        self.store.find_by_account(account)
    }

    /// Validate the request, resolve both accounts and authorize the caller
    async fn prepare(
        &self,
        user_id: UserId,
        request: &TransferRequest,
    ) -> Result<(Account, Account), SettlementError> {
        if request.amount <= Decimal::ZERO || request.amount < self.min_amount {
            return Err(SettlementError::InvalidAmount {
                amount: request.amount,
                minimum: self.min_amount,
            });
        }

        let withdrawal = self
            .ledger
            .snapshot(request.withdrawal_account_id)
            .await
            .ok_or_else(|| SettlementError::withdrawal_account_not_found(request.withdrawal_account_id))?;

        let deposit_id = self
            .ledger
            .id_by_number(&request.deposit_account_number)
            .ok_or_else(|| SettlementError::deposit_account_not_found(&request.deposit_account_number))?;

        if deposit_id == withdrawal.id {
            return Err(SettlementError::SameAccount {
                account: withdrawal.id,
            });
        }

        let deposit = self
            .ledger
            .snapshot(deposit_id)
            .await
            .ok_or_else(|| SettlementError::deposit_account_not_found(&request.deposit_account_number))?;

        self.authorize(user_id, &withdrawal, &request.withdrawal_account_password)?;

        Ok((withdrawal, deposit))
    }

    fn authorize(
        &self,
        user_id: UserId,
        account: &Account,
        password: &str,
    ) -> Result<(), SettlementError> {
        if account.user_id != user_id {
            return Err(SettlementError::NotAccountOwner {
                account: account.id,
                user: user_id,
            });
        }
        if !self.verifier.verify(account, password) {
            return Err(SettlementError::PasswordMismatch {
                account: account.id,
            });
        }
        Ok(())
    }

    /// Withdrawal-currency amount needed to credit `deposit_amount`
    ///
    /// # Returns
    ///
    /// `(unrounded, debited)`. The debited amount is rounded up to the amount
    /// scale so the withdrawal side never pays less than the deposit side
    /// receives. Same-currency transfers are never rounded.
    ///
    /// # Errors
    ///
    /// `ArithmeticOverflow` when the equivalent does not fit a `Decimal`.
    fn withdrawal_equivalent(
        &self,
        withdrawal_account: AccountId,
        deposit_amount: Decimal,
        rate: Decimal,
    ) -> Result<(Decimal, Decimal), SettlementError> {
        if rate == Decimal::ONE {
            return Ok((deposit_amount, deposit_amount));
        }
        let unrounded = deposit_amount
            .checked_div(rate)
            .ok_or_else(|| SettlementError::arithmetic_overflow("conversion", withdrawal_account))?;
        let debited =
            unrounded.round_dp_with_strategy(self.amount_scale, RoundingStrategy::ToPositiveInfinity);
        Ok((unrounded, debited))
    }

    /// Lock both accounts, mutate balances and write both rows
    async fn settle(
        &self,
        plan: SettlementPlan,
        mut progress: Progress,
    ) -> Result<TransferReceipt, SettlementError> {
        let (mut withdrawal, mut deposit) = self
            .ledger
            .lock_pair(plan.withdrawal_account, plan.deposit_account)
            .await
            .map_err(|e| progress.fail(e))?;
        progress.advance(TransferState::Locked);

        if plan.required > withdrawal.balance {
            return Err(progress.fail(SettlementError::insufficient_funds(
                withdrawal.id,
                withdrawal.balance,
                plan.required,
            )));
        }

        let withdrawal_before = withdrawal.balance;
        let deposit_before = deposit.balance;

        withdrawal
            .decrease_balance(plan.withdrawal_amount)
            .map_err(|e| progress.fail(e))?;
        if let Err(e) = deposit.increase_balance(plan.deposit_amount) {
            withdrawal.balance = withdrawal_before;
            return Err(progress.fail(e));
        }
        progress.advance(TransferState::BalancesMutated);

        let withdrawal_row = self.ledger_row(&plan, TransferType::Withdrawal, &withdrawal);
        if let Err(e) = self.store.insert(withdrawal_row) {
            withdrawal.balance = withdrawal_before;
            deposit.balance = deposit_before;
            return Err(progress.fail(e));
        }

        let deposit_row = self.ledger_row(&plan, TransferType::Deposit, &deposit);
        if let Err(e) = self.store.insert(deposit_row) {
            deposit.balance = deposit_before;
            drop(withdrawal);
            drop(deposit);
            let failure = self.request_compensation(plan.group, e).await;
            return Err(progress.fail(failure));
        }

        progress.advance(TransferState::LedgerWritten);
        info!(
            transfer_group_id = %plan.group,
            withdrawal_account = plan.withdrawal_account,
            deposit_account = plan.deposit_account,
            withdrawal_amount = %plan.withdrawal_amount,
            deposit_amount = %plan.deposit_amount,
            rate = %plan.exchange_rate,
            "Transfer committed"
        );

        Ok(TransferReceipt {
            transfer_group_id: plan.group,
            state: progress.state,
            withdrawal_amount: plan.withdrawal_amount,
            deposit_amount: plan.deposit_amount,
            exchange_rate: plan.exchange_rate,
        })
    }

    fn ledger_row(&self, plan: &SettlementPlan, side: TransferType, account: &AccountGuard) -> Transfer {
        let (currency, amount) = match side {
            TransferType::Withdrawal => (plan.withdrawal_currency, plan.withdrawal_amount),
            TransferType::Deposit => (plan.deposit_currency, plan.deposit_amount),
        };
        Transfer {
            id: 0,
            transfer_group_id: plan.group,
            user_id: plan.user_id,
            transfer_type: side,
            account_id: account.id,
            currency,
            exchange_rate: plan.exchange_rate,
            amount,
            balance_after: account.balance,
            created_at: Utc::now(),
        }
    }

    /// Publish the compensation trigger for a group missing its DEPOSIT row
    async fn request_compensation(
        &self,
        group: TransferGroupId,
        cause: SettlementError,
    ) -> SettlementError {
        let event = TransferFailedEvent::new(group, TransferType::Deposit);
        match self.publisher.publish(event).await {
            Ok(()) => {
                warn!(transfer_group_id = %group, cause = %cause, "Compensation requested");
                SettlementError::CompensationPending {
                    group,
                    failed_side: TransferType::Deposit,
                    message: cause.to_string(),
                }
            }
            Err(publish_error) => {
                error!(
                    transfer_group_id = %group,
                    cause = %cause,
                    error = %publish_error,
                    "Compensation event lost; transfer group left half-applied"
                );
                SettlementError::EventPublish {
                    group,
                    message: publish_error.to_string(),
                }
            }
        }
    }
}
