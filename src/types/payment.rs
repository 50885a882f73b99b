//! Payment types
//!
//! A payment references the transfer group that settled it and owns nothing
//! but its own status.

use super::currency::Currency;
use super::transfer::TransferGroupId;
use super::PaymentId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    /// Accepted but not yet settled
    Pending,
    /// Settled by its transfer group
    Completed,
    /// Refunded by a reverse transfer
    Cancelled,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => f.write_str("PENDING"),
            PaymentStatus::Completed => f.write_str("COMPLETED"),
            PaymentStatus::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: PaymentId,
    pub transfer_group_id: TransferGroupId,
    pub status: PaymentStatus,
}

/// Inbound payment request
///
/// `amount` is expressed in the deposit account's currency.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub withdrawal_account_number: String,
    pub withdrawal_account_password: String,
    pub deposit_account_number: String,
    pub amount: Decimal,
}

/// Inbound refund request
///
/// The password is the payee's: the refund debits the account that received
/// the payment.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundRequest {
    pub payment_id: PaymentId,
    pub withdrawal_account_password: String,
}

/// Read-only projection of a payment for display
///
/// Derived from the payment, its transfer group and both accounts; never
/// mutated on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub payer_account_number: String,
    pub payee_account_number: String,
    /// Amount received by the payee
    pub amount: Decimal,
    pub exchange_rate: Decimal,
    /// Currency of `amount`
    pub currency: Currency,
}
