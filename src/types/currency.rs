//! Currency codes and currency pairs
//!
//! Accounts hold exactly one currency. A [`RatePair`] is the ordered
//! `(base, quote)` tuple used as both the cache key and the lock key for
//! exchange-rate lookups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ISO 4217 currency supported by the settlement engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Korean won, the local currency
    Krw,
    Usd,
    Eur,
    Jpy,
    Cny,
    Gbp,
}

impl Currency {
    /// The currency every local-bank quote is expressed against
    pub const LOCAL: Currency = Currency::Krw;

    /// Three-letter code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Krw => "KRW",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Jpy => "JPY",
            Currency::Cny => "CNY",
            Currency::Gbp => "GBP",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KRW" => Ok(Currency::Krw),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "JPY" => Ok(Currency::Jpy),
            "CNY" => Ok(Currency::Cny),
            "GBP" => Ok(Currency::Gbp),
            other => Err(format!("Unsupported currency '{}'", other)),
        }
    }
}

/// Ordered currency pair: one unit of `base` is worth `rate` units of `quote`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RatePair {
    pub base: Currency,
    pub quote: Currency,
}

impl RatePair {
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// The same pair quoted the other way round
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote,
            quote: self.base,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }
}

impl fmt::Display for RatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
