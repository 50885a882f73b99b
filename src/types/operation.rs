//! Batch input records
//!
//! An `Operation` is one line of a batch operations file, already validated
//! and typed. An `AccountSeed` is one line of an accounts file.

use super::currency::Currency;
use super::UserId;
use rust_decimal::Decimal;

/// One requested settlement operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Direct transfer between two accounts
    Transfer {
        user: UserId,
        from: String,
        password: String,
        to: String,
        amount: Decimal,
    },
    /// Payment recorded under a caller-chosen reference
    Payment {
        user: UserId,
        reference: String,
        from: String,
        password: String,
        to: String,
        amount: Decimal,
    },
    /// Refund of the payment recorded under `reference`
    ///
    /// `password` is the payee account's.
    Refund {
        user: UserId,
        reference: String,
        password: String,
    },
}

impl Operation {
    /// Key that orders operations within a batch
    ///
    /// Operations sharing a key run sequentially in input order. Transfers
    /// are keyed by their withdrawal account; payments and refunds by their
    /// reference, so a refund always runs after the payment it cancels.
    pub fn partition_key(&self) -> &str {
        match self {
            Operation::Transfer { from, .. } => from,
            Operation::Payment { reference, .. } | Operation::Refund { reference, .. } => {
                reference
            }
        }
    }

    pub fn user(&self) -> UserId {
        match self {
            Operation::Transfer { user, .. }
            | Operation::Payment { user, .. }
            | Operation::Refund { user, .. } => *user,
        }
    }

    /// Lower-case operation name as written in the input
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Transfer { .. } => "transfer",
            Operation::Payment { .. } => "payment",
            Operation::Refund { .. } => "refund",
        }
    }
}

/// An account to open before processing starts
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSeed {
    pub number: String,
    pub user: UserId,
    pub currency: Currency,
    pub name: String,
    pub password: String,
    pub balance: Decimal,
}
