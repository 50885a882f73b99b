//! Account-related types for the funds settlement engine
//!
//! This module defines the Account structure and the only two operations
//! allowed to change its balance.

use super::currency::Currency;
use super::error::SettlementError;
use super::{AccountId, UserId};
use rust_decimal::Decimal;
use std::fmt;

/// Account state
///
/// An account holds a single currency and a non-negative balance. The balance
/// is only ever changed through [`Account::decrease_balance`] and
/// [`Account::increase_balance`], and only by the holder of the account lock.
#[derive(Clone, PartialEq)]
pub struct Account {
    /// Internal account identifier, also the lock-ordering key
    pub id: AccountId,

    /// Owning user
    pub user_id: UserId,

    /// Unique, externally visible account number
    pub number: String,

    /// Currency of the balance
    pub currency: Currency,

    /// Current balance, never negative at a commit boundary
    pub balance: Decimal,

    /// Display name chosen by the owner
    pub name: String,

    /// Stored credential, checked by a `CredentialVerifier`
    pub(crate) password: String,
}

impl Account {
    /// Create a new account with zero balance
    pub fn new(
        id: AccountId,
        user_id: UserId,
        number: impl Into<String>,
        currency: Currency,
        name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Account {
            id,
            user_id,
            number: number.into(),
            currency,
            balance: Decimal::ZERO,
            name: name.into(),
            password: password.into(),
        }
    }

    /// Set the opening balance
    pub fn with_balance(mut self, balance: Decimal) -> Self {
        self.balance = balance;
        self
    }

    /// Subtract `amount` from the balance
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The balance was reduced by exactly `amount`
    /// * `Err(SettlementError::InsufficientFunds)` - `amount` exceeds the balance;
    ///   the balance is unchanged
    pub fn decrease_balance(&mut self, amount: Decimal) -> Result<(), SettlementError> {
        if amount > self.balance {
            return Err(SettlementError::insufficient_funds(
                self.id,
                self.balance,
                amount,
            ));
        }
        self.balance -= amount;
        Ok(())
    }

    /// Add `amount` to the balance
    ///
    /// Only fails if the result no longer fits in a `Decimal`.
    pub fn increase_balance(&mut self, amount: Decimal) -> Result<(), SettlementError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| SettlementError::arithmetic_overflow("increase", self.id))?;
        Ok(())
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("number", &self.number)
            .field("currency", &self.currency)
            .field("balance", &self.balance)
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}
