//! Compensation trigger published when a transfer group is left half-applied

use super::transfer::{TransferGroupId, TransferType};
use serde::{Deserialize, Serialize};

/// Message carried by the compensation channel
///
/// The consumer only uses it as a trigger: the group's actual state is always
/// re-read from the transfer store. Partition key is `transfer_group_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferFailedEvent {
    pub transfer_group_id: TransferGroupId,
    /// Side whose ledger row is missing
    pub failed_side: TransferType,
}

impl TransferFailedEvent {
    pub fn new(transfer_group_id: TransferGroupId, failed_side: TransferType) -> Self {
        Self {
            transfer_group_id,
            failed_side,
        }
    }
}
