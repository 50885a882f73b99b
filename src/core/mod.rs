//! Core settlement logic module
//!
//! This module contains the core settlement components:
//! - `traits` - Trait seams for ledger storage, event publishing and credentials
//! - `keyed_lock` - One async lock per key, shared by accounts, rates and payments
//! - `account_ledger` - Account balances and lock ordering
//! - `transfer_store` - In-memory ledger row storage
//! - `orchestrator` - Transfer execution and reversal
//! - `payment_adapter` - Payment lifecycle on top of transfers
//! - `compensation` - Repair of half-applied transfer groups
//! - `engine` - Wiring of all of the above into a running unit

pub mod account_ledger;
pub mod compensation;
pub mod credentials;
pub mod engine;
pub mod keyed_lock;
pub mod orchestrator;
pub mod payment_adapter;
pub mod traits;
pub mod transfer_store;

pub use account_ledger::{AccountGuard, AccountLedger};
pub use compensation::{ChannelPublisher, CompensationConsumer, CompensationOutcome};
pub use credentials::PlainCredentialVerifier;
pub use engine::SettlementEngine;
pub use keyed_lock::KeyedLocks;
pub use orchestrator::TransferOrchestrator;
pub use payment_adapter::PaymentAdapter;
pub use traits::{CredentialVerifier, EventPublisher, TransferStore};
pub use transfer_store::InMemoryTransferStore;
