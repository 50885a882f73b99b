//! Funds Settlement Engine Library
//! # Overview
//!
//! This library moves money between accounts, possibly across currencies,
//! with exact decimal arithmetic, per-account locking and asynchronous
//! compensation of partially applied transfers.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Transfer, Payment, errors, etc.)
//! - [`config`] - Engine configuration
//! - [`rates`] - Exchange-rate providers and the caching [`rates::ExchangeRateResolver`]
//! - [`core`] - Business logic components:
//!   - [`core::account_ledger`] - Account balances and per-account locks
//!   - [`core::orchestrator`] - Transfer execution and its state machine
//!   - [`core::payment_adapter`] - Payments and refunds on top of transfers
//!   - [`core::compensation`] - Repair of half-applied transfer groups
//!   - [`core::engine`] - Wiring of all of the above
//! - [`io`] - CSV input and output
//! - [`pipeline`] - Batch processing of operation files
//! - [`cli`] - CLI arguments parsing
//! - [`logging`] - Tracing subscriber setup
//!
//! # Transfers
//!
//! A transfer debits one account and credits another. When the currencies
//! differ the requested amount is credited in the deposit currency and the
//! withdrawal account pays the equivalent at the current rate, rounded up.
//! Every transfer writes exactly two ledger rows, one WITHDRAWAL and one
//! DEPOSIT, sharing a transfer group id.
//!
//! # Failure Handling
//!
//! - Validation, lookup, authorization and rate failures happen before any
//!   lock is taken and leave no trace.
//! - Insufficient funds are detected under lock and change nothing.
//! - If the DEPOSIT row cannot be written after the WITHDRAWAL row committed,
//!   a compensation event is published and the withdrawal is reversed
//!   asynchronously.

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod rates;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SettlementConfig;
pub use core::{
    AccountLedger, CompensationConsumer, PaymentAdapter, SettlementEngine, TransferOrchestrator,
};
pub use io::write_accounts_csv;
pub use rates::ExchangeRateResolver;
pub use types::{
    Account, AccountId, Currency, PaymentId, SettlementError, Transfer, TransferGroupId,
    TransferType, UserId,
};
