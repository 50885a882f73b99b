//! Account balance state with exclusive per-account locking
//!
//! This module provides the `AccountLedger` struct, the database of record for
//! account balances. Every account lives behind its own lock obtained from a
//! [`KeyedLocks`] manager, so balance mutations on one account are strictly
//! serialized while unrelated accounts proceed in parallel.
//!
//! # Design
//!
//! A lock guard plays the role of a transaction-scoped row lock: it is taken
//! before the balance is read for a decision and released only when the
//! caller's unit of work ends. [`AccountLedger::with_lock`] wraps that pattern
//! for single-account work and restores the balance if the closure fails.
//!
//! # Lock Ordering
//!
//! Any operation touching two accounts must go through
//! [`AccountLedger::lock_pair`], which always acquires the lower account id
//! first. Two transfers between the same accounts in opposite directions
//! therefore request the locks in the same order and cannot deadlock.

use super::keyed_lock::{KeyGuard, KeyedLocks};
use crate::types::{Account, AccountId, Currency, SettlementError, UserId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Exclusive, transaction-scoped lock on one account
pub type AccountGuard = KeyGuard<Account>;

/// Thread-safe account store with per-account locks
///
/// # Thread Safety
///
/// All methods take `&self` and are safe to call from many tasks at once.
/// Lookups by number go through a separate `DashMap` index and never wait on
/// an account lock.
#[derive(Debug)]
pub struct AccountLedger {
    /// Account rows, one lock per account id
    accounts: KeyedLocks<AccountId, Account>,

    /// Account number to id index
    numbers: DashMap<String, AccountId>,

    /// Next id handed out by `open_account`
    next_id: AtomicU64,
}

impl AccountLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            accounts: KeyedLocks::new(),
            numbers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new account
    ///
    /// # Arguments
    ///
    /// * `user_id` - Owning user
    /// * `number` - Unique account number
    /// * `currency` - Currency of the balance
    /// * `name` - Display name
    /// * `password` - Credential checked before any withdrawal
    /// * `opening_balance` - Initial balance, must not be negative
    ///
    /// # Returns
    ///
    /// * `Ok(AccountId)` - The id assigned to the new account
    /// * `Err(SettlementError::DuplicateAccountNumber)` - The number is taken
    /// * `Err(SettlementError::InvalidAmount)` - The opening balance is negative
    pub fn open_account(
        &self,
        user_id: UserId,
        number: &str,
        currency: Currency,
        name: &str,
        password: &str,
        opening_balance: Decimal,
    ) -> Result<AccountId, SettlementError> {
        if opening_balance < Decimal::ZERO {
            return Err(SettlementError::InvalidAmount {
                amount: opening_balance,
                minimum: Decimal::ZERO,
            });
        }

        match self.numbers.entry(number.to_string()) {
            Entry::Occupied(_) => Err(SettlementError::DuplicateAccountNumber {
                number: number.to_string(),
            }),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let account = Account::new(id, user_id, number, currency, name, password)
                    .with_balance(opening_balance);
                self.accounts.insert_if_absent(id, account);
                slot.insert(id);
                info!(account_id = id, number, %currency, "Account opened");
                Ok(id)
            }
        }
    }

    /// Resolve an account number to its id
    pub fn id_by_number(&self, number: &str) -> Option<AccountId> {
        self.numbers.get(number).map(|entry| *entry.value())
    }

    /// Read a consistent copy of an account
    ///
    /// Waits for any in-flight transaction on the account to finish. The copy
    /// is stale as soon as this returns; decisions about the balance must be
    /// made under [`AccountLedger::lock`] instead.
    pub async fn snapshot(&self, account_id: AccountId) -> Option<Account> {
        let guard = self.accounts.lock(&account_id).await?;
        Some(guard.clone())
    }

    /// Read a copy of an account by number
    pub async fn snapshot_by_number(&self, number: &str) -> Option<Account> {
        let id = self.id_by_number(number)?;
        self.snapshot(id).await
    }

    /// Acquire the exclusive lock on one account
    ///
    /// The lock is held until the returned guard is dropped.
    pub async fn lock(&self, account_id: AccountId) -> Result<AccountGuard, SettlementError> {
        self.accounts
            .lock(&account_id)
            .await
            .ok_or_else(|| SettlementError::account_not_found(account_id))
    }

    /// Acquire the locks on two distinct accounts in ascending id order
    ///
    /// # Returns
    ///
    /// The guards in the order the ids were passed, regardless of the order
    /// they were acquired in.
    ///
    /// # Errors
    ///
    /// * `SettlementError::SameAccount` - Both ids are equal
    /// * `SettlementError::AccountNotFound` - Either account does not exist;
    ///   no lock is held on return
    pub async fn lock_pair(
        &self,
        first: AccountId,
        second: AccountId,
    ) -> Result<(AccountGuard, AccountGuard), SettlementError> {
        if first == second {
            return Err(SettlementError::SameAccount { account: first });
        }

        let (low, high) = if first < second {
            (first, second)
        } else {
            (second, first)
        };

        debug!(low, high, "Acquiring account locks");
        let low_guard = self.lock(low).await?;
        let high_guard = self.lock(high).await?;

        if first < second {
            Ok((low_guard, high_guard))
        } else {
            Ok((high_guard, low_guard))
        }
    }

    /// Run `f` with the account locked, as one unit of work
    ///
    /// The lock is held for the whole closure and released when it returns.
    /// If the closure fails, the balance is restored to its value at lock
    /// acquisition before the lock is released.
    ///
    /// # Arguments
    ///
    /// * `account_id` - Account to lock
    /// * `f` - Work to run against the locked account
    pub async fn with_lock<T, F>(&self, account_id: AccountId, f: F) -> Result<T, SettlementError>
    where
        F: FnOnce(&mut Account) -> Result<T, SettlementError>,
    {
        let mut guard = self.lock(account_id).await?;
        let balance_before = guard.balance;

        let result = f(&mut *guard);
        if result.is_err() {
            guard.balance = balance_before;
        }
        result
    }

    /// Copies of every account, ordered by id
    pub async fn all_accounts(&self) -> Vec<Account> {
        let mut ids = self.accounts.keys();
        ids.sort_unstable();

        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.snapshot(id).await {
                accounts.push(account);
            }
        }
        accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}
