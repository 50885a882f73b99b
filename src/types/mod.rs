//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `currency`: Currency codes and rate pairs
//! - `account`: Account state and balance mutation
//! - `transfer`: Ledger rows, transfer groups, requests and the transfer state machine
//! - `payment`: Payments, refunds and the payment view
//! - `event`: Compensation trigger event
//! - `operation`: Batch input records
//! - `error`: Error types for the settlement engine

pub mod account;
pub mod currency;
pub mod error;
pub mod event;
pub mod operation;
pub mod payment;
pub mod transfer;

pub use account::Account;
pub use currency::{Currency, RatePair};
pub use error::{FailureKind, SettlementError};
pub use event::TransferFailedEvent;
pub use operation::{AccountSeed, Operation};
pub use payment::{Payment, PaymentRequest, PaymentStatus, PaymentView, RefundRequest};
pub use transfer::{
    Transfer, TransferGroupId, TransferReceipt, TransferRequest, TransferState, TransferType,
};

/// Account identifier, also the lock-ordering key
pub type AccountId = u64;

/// User identifier
pub type UserId = u64;

/// Ledger row identifier
pub type TransferId = u64;

/// Payment identifier
pub type PaymentId = u64;
