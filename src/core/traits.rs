//! Trait seams between the settlement core and its collaborators
//!
//! This module defines the abstractions the core consumes: ledger row
//! persistence, the compensation event channel and credential checking.
//! Each has an in-process implementation in this crate; production transports
//! plug in behind the same traits.

use crate::types::{
    Account, AccountId, SettlementError, Transfer, TransferFailedEvent, TransferGroupId, TransferId,
};
use async_trait::async_trait;

/// Durable store for ledger rows
///
/// A store never holds two rows for the same side of the same group: a second
/// insert for an existing `(transfer_group_id, transfer_type)` is rejected.
pub trait TransferStore: Send + Sync {
    /// Persist a ledger row
    ///
    /// The row's `id` is assigned by the store; the incoming value is ignored.
    ///
    /// # Returns
    ///
    /// * `Ok(TransferId)` - The row is durable
    /// * `Err(SettlementError::LedgerWrite)` - Nothing was written
    fn insert(&self, row: Transfer) -> Result<TransferId, SettlementError>;

    /// All rows of a transfer group, in insertion order
    fn find_by_group(&self, group: TransferGroupId) -> Vec<Transfer>;

    /// All rows touching an account, oldest first
    fn find_by_account(&self, account: AccountId) -> Vec<Transfer>;
}

/// Producer side of the at-least-once compensation channel
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Hand an event to the channel
    ///
    /// Returns once the channel has acknowledged the write.
    async fn publish(&self, event: TransferFailedEvent) -> Result<(), SettlementError>;
}

/// Checks a presented password against an account's stored credential
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, account: &Account, presented: &str) -> bool;
}
