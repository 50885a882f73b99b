//! Transfer-related types for the funds settlement engine
//!
//! This module defines the transfer group key, the immutable ledger row written
//! for each account side of a movement, the inbound request shapes and the
//! per-transfer state machine.

use super::currency::Currency;
use super::{AccountId, TransferId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Idempotency and correlation key shared by both rows of one movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferGroupId(Uuid);

impl TransferGroupId {
    /// Generate a fresh random group id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Key of the group that compensates `self`
    ///
    /// Deterministic, so every delivery of the same failure event derives the
    /// same key.
    pub fn compensation(&self) -> Self {
        Self(Uuid::new_v5(&self.0, b"compensation"))
    }
}

impl Default for TransferGroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferGroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Account side of a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    /// Funds left the account
    Withdrawal,
    /// Funds entered the account
    Deposit,
}

impl TransferType {
    /// The other side of the same movement
    pub fn counterpart(&self) -> Self {
        match self {
            TransferType::Withdrawal => TransferType::Deposit,
            TransferType::Deposit => TransferType::Withdrawal,
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferType::Withdrawal => f.write_str("WITHDRAWAL"),
            TransferType::Deposit => f.write_str("DEPOSIT"),
        }
    }
}

/// Ledger row for one account side of a transfer group
///
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Row identifier, assigned by the transfer store
    pub id: TransferId,

    /// Group this row belongs to
    pub transfer_group_id: TransferGroupId,

    /// User who initiated the movement
    pub user_id: UserId,

    pub transfer_type: TransferType,

    /// Account whose balance changed
    pub account_id: AccountId,

    /// Currency of `amount` and `balance_after`
    pub currency: Currency,

    /// Withdrawal-currency to deposit-currency rate applied to the movement
    pub exchange_rate: Decimal,

    /// Amount applied to this side, in this side's currency
    pub amount: Decimal,

    /// Balance of the account right after the mutation
    pub balance_after: Decimal,

    pub created_at: DateTime<Utc>,
}

/// Inbound transfer request
///
/// `amount` is always expressed in the deposit account's currency.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub withdrawal_account_id: AccountId,
    pub withdrawal_account_password: String,
    pub deposit_account_number: String,
    pub amount: Decimal,
}

/// Result of a committed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub transfer_group_id: TransferGroupId,
    pub state: TransferState,
    /// Amount debited from the withdrawal account, in its currency
    pub withdrawal_amount: Decimal,
    /// Amount credited to the deposit account, in its currency
    pub deposit_amount: Decimal,
    pub exchange_rate: Decimal,
}

/// Lifecycle of a single transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Initiated,
    RateResolved,
    Locked,
    BalancesMutated,
    /// Terminal success: both ledger rows are durable
    LedgerWritten,
    /// Terminal failure
    Failed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::LedgerWritten | TransferState::Failed)
    }

    /// Whether moving from `self` to `next` is a legal step
    ///
    /// Every non-terminal state may fail; otherwise states advance strictly in order.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Initiated, RateResolved)
                | (RateResolved, Locked)
                | (Locked, BalancesMutated)
                | (BalancesMutated, LedgerWritten)
                | (Initiated | RateResolved | Locked | BalancesMutated, Failed)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferState::Initiated => "INITIATED",
            TransferState::RateResolved => "RATE_RESOLVED",
            TransferState::Locked => "LOCKED",
            TransferState::BalancesMutated => "BALANCES_MUTATED",
            TransferState::LedgerWritten => "LEDGER_WRITTEN",
            TransferState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
