//! Exchange-rate resolution
//!
//! This module contains the [`RateProvider`] capability, the concrete
//! providers, and the [`ExchangeRateResolver`] that caches rates per currency
//! pair and walks a ranked provider list on a miss.
//!
//! # Architecture
//!
//! ```text
//! ExchangeRateResolver
//!     ├── KeyedLocks<RatePair, Option<CachedRate>>  (one lock + entry per pair)
//!     └── Vec<Arc<dyn RateProvider>>                 (primary first, then fallbacks)
//!             ├── LocalBankRateProvider   (HTTP, quotes against KRW only)
//!             ├── OpenRatesProvider       (HTTP, any pair)
//!             └── StaticRateProvider      (in-memory table)
//! ```

pub mod providers;
pub mod resolver;

pub use providers::{LocalBankRateProvider, OpenRatesProvider, StaticRateProvider};
pub use resolver::{CachedRate, ExchangeRateResolver};

use crate::types::RatePair;
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure of a single provider call
///
/// The resolver logs these and moves on to the next provider; only the
/// aggregate outcome reaches the caller as a `SettlementError`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The provider does not quote this pair
    #[error("pair {0} is not supported")]
    UnsupportedPair(RatePair),

    /// The call did not finish within the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Network or HTTP-level failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The payload arrived but did not contain a positive number
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// A source of exchange rates
///
/// Fetching and parsing are split so that transport failures and payload
/// failures stay distinguishable.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Retrieve the provider's raw payload for `pair`
    async fn fetch_rate(&self, pair: RatePair) -> Result<String, ProviderError>;

    /// Extract how many units of `pair.quote` one unit of `pair.base` buys
    fn parse_rate(&self, pair: RatePair, payload: &str) -> Result<Decimal, ProviderError>;
}
