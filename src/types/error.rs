//! Error types for the funds settlement engine
//!
//! This module defines every failure a transfer, payment, refund or
//! compensation can surface. Errors are designed to be descriptive enough to
//! diagnose a failed transfer from the log line alone.
//!
//! # Error Categories
//!
//! - **Validation**: bad amount, same-account transfer. Rejected before any lock.
//! - **Not found**: account or payment missing. Rejected before any lock.
//! - **Authorization**: password mismatch, non-owner. Rejected before any lock.
//! - **Insufficient funds**: detected inside the lock, no mutation applied.
//! - **Rate**: provider outage, unsupported currency, malformed payload.
//!   Detected before any lock, no side effects.
//! - **Post-commit**: a ledger write failed after funds moved. A compensation
//!   event has been (or could not be) emitted for the transfer group.
//! - **I/O**: CLI file handling and CSV parsing.

use super::currency::RatePair;
use super::transfer::{TransferGroupId, TransferType};
use super::{AccountId, PaymentId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the settlement engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    /// Amount is not positive or is below the minimum transferable amount
    #[error("Invalid amount {amount}: must be at least {minimum}")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
        /// Smallest accepted amount
        minimum: Decimal,
    },

    /// Withdrawal and deposit sides refer to the same account
    #[error("Cannot transfer from account {account} to itself")]
    SameAccount {
        /// The account used on both sides
        account: AccountId,
    },

    /// An account with this number is already registered
    #[error("Account number {number} is already registered")]
    DuplicateAccountNumber {
        /// The conflicting account number
        number: String,
    },

    /// Account lookup by id or number failed outside a transfer
    #[error("Account {account} not found")]
    AccountNotFound {
        /// Account id or number as supplied
        account: String,
    },

    /// The withdrawal-side account of a transfer does not exist
    #[error("Withdrawal account {account} not found")]
    WithdrawalAccountNotFound {
        /// Account id or number as supplied
        account: String,
    },

    /// The deposit-side account of a transfer does not exist
    #[error("Deposit account {account} not found")]
    DepositAccountNotFound {
        /// Account id or number as supplied
        account: String,
    },

    /// Payment lookup failed
    #[error("Payment {payment} not found")]
    PaymentNotFound {
        /// The missing payment id
        payment: PaymentId,
    },

    /// No ledger rows exist for the transfer group
    #[error("Transfer group {group} not found")]
    TransferGroupNotFound {
        /// The missing group
        group: TransferGroupId,
    },

    /// The initiating user does not own the withdrawal account
    #[error("User {user} does not own account {account}")]
    NotAccountOwner {
        /// Withdrawal account
        account: AccountId,
        /// Initiating user
        user: UserId,
    },

    /// The supplied account password does not match
    #[error("Password mismatch for account {account}")]
    PasswordMismatch {
        /// Account whose password was checked
        account: AccountId,
    },

    /// Withdrawal would take the balance below zero
    ///
    /// The balance is left unchanged.
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Account being debited
        account: AccountId,
        /// Balance at the time of the check
        balance: Decimal,
        /// Requested debit
        requested: Decimal,
    },

    /// Arithmetic overflow would occur
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account being mutated
        account: AccountId,
    },

    /// Every configured rate provider failed for the pair
    #[error("Exchange rate unavailable for {pair}")]
    RateUnavailable {
        /// Requested pair
        pair: RatePair,
    },

    /// A provider does not quote the requested currency
    #[error("Provider {provider} does not support {pair}")]
    InvalidCurrency {
        /// Provider name
        provider: String,
        /// Requested pair
        pair: RatePair,
    },

    /// A provider answered with a payload that is not a positive number
    #[error("Malformed rate payload from {provider}: {message}")]
    RateParse {
        /// Provider name
        provider: String,
        /// What was wrong with the payload
        message: String,
    },

    /// A ledger row could not be written
    ///
    /// Raised by a transfer store. The orchestrator turns it into either a
    /// clean abort or [`SettlementError::CompensationPending`].
    #[error("Failed to write {side} row for transfer group {group}: {message}")]
    LedgerWrite {
        /// Transfer group being written
        group: TransferGroupId,
        /// Side whose row was lost
        side: TransferType,
        /// Store failure description
        message: String,
    },

    /// Funds moved on one side but the other side's row was not written
    ///
    /// A TransferFailedEvent has been published; the compensation consumer
    /// will reverse the committed side asynchronously.
    #[error("Transfer group {group} failed on the {failed_side} side and is being compensated: {message}")]
    CompensationPending {
        /// Transfer group awaiting compensation
        group: TransferGroupId,
        /// Side that is missing
        failed_side: TransferType,
        /// Underlying failure
        message: String,
    },

    /// The compensation event could not be handed to the event channel
    #[error("Failed to publish compensation event for transfer group {group}: {message}")]
    EventPublish {
        /// Transfer group left half-applied
        group: TransferGroupId,
        /// Channel failure description
        message: String,
    },

    /// Refund requested for a payment that is already cancelled
    #[error("Payment {payment} is already cancelled")]
    AlreadyCancelled {
        /// The payment id
        payment: PaymentId,
    },

    /// A payment reference was used twice in one input
    #[error("Payment reference '{reference}' is already in use")]
    DuplicateReference {
        /// The reference as given
        reference: String,
    },

    /// No payment was recorded under a reference
    #[error("No payment with reference '{reference}'")]
    UnknownReference {
        /// The reference as given
        reference: String,
    },
}

/// Coarse classification of a [`SettlementError`]
///
/// Everything except [`FailureKind::PostCommit`] is guaranteed to have left
/// balances untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    NotFound,
    Authorization,
    InsufficientFunds,
    Rate,
    PostCommit,
}

impl SettlementError {
    /// Classify this error
    pub fn kind(&self) -> FailureKind {
        match self {
            SettlementError::InvalidAmount { .. }
            | SettlementError::SameAccount { .. }
            | SettlementError::DuplicateAccountNumber { .. }
            | SettlementError::AlreadyCancelled { .. }
            | SettlementError::DuplicateReference { .. }
            | SettlementError::ArithmeticOverflow { .. } => FailureKind::Validation,
            SettlementError::AccountNotFound { .. }
            | SettlementError::WithdrawalAccountNotFound { .. }
            | SettlementError::DepositAccountNotFound { .. }
            | SettlementError::PaymentNotFound { .. }
            | SettlementError::UnknownReference { .. }
            | SettlementError::TransferGroupNotFound { .. } => FailureKind::NotFound,
            SettlementError::NotAccountOwner { .. } | SettlementError::PasswordMismatch { .. } => {
                FailureKind::Authorization
            }
            SettlementError::InsufficientFunds { .. } => FailureKind::InsufficientFunds,
            SettlementError::RateUnavailable { .. }
            | SettlementError::InvalidCurrency { .. }
            | SettlementError::RateParse { .. } => FailureKind::Rate,
            SettlementError::LedgerWrite { .. }
            | SettlementError::CompensationPending { .. }
            | SettlementError::EventPublish { .. } => FailureKind::PostCommit,
        }
    }
}

// Helper functions for creating common errors

impl SettlementError {
    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: AccountId, balance: Decimal, requested: Decimal) -> Self {
        SettlementError::InsufficientFunds {
            account,
            balance,
            requested,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        SettlementError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: impl ToString) -> Self {
        SettlementError::AccountNotFound {
            account: account.to_string(),
        }
    }

    /// Create a WithdrawalAccountNotFound error
    pub fn withdrawal_account_not_found(account: impl ToString) -> Self {
        SettlementError::WithdrawalAccountNotFound {
            account: account.to_string(),
        }
    }

    /// Create a DepositAccountNotFound error
    pub fn deposit_account_not_found(account: impl ToString) -> Self {
        SettlementError::DepositAccountNotFound {
            account: account.to_string(),
        }
    }

    /// Create a RateParse error
    pub fn rate_parse(provider: &str, message: impl Into<String>) -> Self {
        SettlementError::RateParse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Create a LedgerWrite error
    pub fn ledger_write(group: TransferGroupId, side: TransferType, message: impl Into<String>) -> Self {
        SettlementError::LedgerWrite {
            group,
            side,
            message: message.into(),
        }
    }
}
