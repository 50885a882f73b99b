//! Thread-safe ledger row storage
//!
//! This module provides `InMemoryTransferStore`, the in-process
//! [`TransferStore`] implementation. Rows are grouped by transfer group id in
//! a `DashMap`, so writers for different groups never contend.
//!
//! # Invariants
//!
//! - A group holds at most one WITHDRAWAL and one DEPOSIT row; a second row
//!   for an occupied side is rejected, which makes retried writes idempotent.
//! - Rows are immutable once stored. There is no update or delete.

use super::traits::TransferStore;
use crate::types::{AccountId, SettlementError, Transfer, TransferGroupId, TransferId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct InMemoryTransferStore {
    /// Rows by transfer group, in insertion order
    groups: DashMap<TransferGroupId, Vec<Transfer>>,

    /// Next row id
    next_id: AtomicU64,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored rows across all groups
    pub fn row_count(&self) -> usize {
        self.groups.iter().map(|group| group.value().len()).sum()
    }
}

impl Default for InMemoryTransferStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStore for InMemoryTransferStore {
    fn insert(&self, mut row: Transfer) -> Result<TransferId, SettlementError> {
        let mut group = self
            .groups
            .entry(row.transfer_group_id)
            .or_insert_with(Vec::new);

        if group
            .iter()
            .any(|existing| existing.transfer_type == row.transfer_type)
        {
            return Err(SettlementError::ledger_write(
                row.transfer_group_id,
                row.transfer_type,
                "side already recorded",
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        row.id = id;
        group.push(row);
        Ok(id)
    }

    fn find_by_group(&self, group: TransferGroupId) -> Vec<Transfer> {
        self.groups
            .get(&group)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    fn find_by_account(&self, account: AccountId) -> Vec<Transfer> {
        let mut rows: Vec<Transfer> = self
            .groups
            .iter()
            .flat_map(|group| {
                group
                    .value()
                    .iter()
                    .filter(|row| row.account_id == account)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        rows.sort_by_key(|row| row.id);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, TransferType};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn row(group: TransferGroupId, side: TransferType, account: AccountId) -> Transfer {
        Transfer {
            id: 0,
            transfer_group_id: group,
            user_id: 1,
            transfer_type: side,
            account_id: account,
            currency: Currency::Krw,
            exchange_rate: Decimal::ONE,
            amount: Decimal::new(50000, 0),
            balance_after: Decimal::new(50000, 0),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_assigns_ids_and_groups_rows() {
        let store = InMemoryTransferStore::new();
        let group = TransferGroupId::new();

        let w = store.insert(row(group, TransferType::Withdrawal, 1)).unwrap();
        let d = store.insert(row(group, TransferType::Deposit, 2)).unwrap();
        assert!(w < d);

        let rows = store.find_by_group(group);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, w);
        assert_eq!(rows[0].transfer_type, TransferType::Withdrawal);
        assert_eq!(rows[1].transfer_type, TransferType::Deposit);
    }

    #[test]
    fn test_insert_rejects_second_row_for_same_side() {
        let store = InMemoryTransferStore::new();
        let group = TransferGroupId::new();

        store.insert(row(group, TransferType::Deposit, 2)).unwrap();
        let err = store.insert(row(group, TransferType::Deposit, 2)).unwrap_err();

        assert!(matches!(err, SettlementError::LedgerWrite { side: TransferType::Deposit, .. }));
        assert_eq!(store.row_count(), 1);
    }

    #[test]
    fn test_find_by_group_unknown_is_empty() {
        let store = InMemoryTransferStore::new();
        assert!(store.find_by_group(TransferGroupId::new()).is_empty());
    }

    #[test]
    fn test_find_by_account_across_groups() {
        let store = InMemoryTransferStore::new();
        let first = TransferGroupId::new();
        let second = TransferGroupId::new();

        store.insert(row(first, TransferType::Withdrawal, 1)).unwrap();
        store.insert(row(first, TransferType::Deposit, 2)).unwrap();
        store.insert(row(second, TransferType::Deposit, 1)).unwrap();

        let history = store.find_by_account(1);
        assert_eq!(history.len(), 2);
        assert!(history[0].id < history[1].id);
        assert!(history.iter().all(|r| r.account_id == 1));
    }
}
