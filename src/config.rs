//! Runtime configuration
//!
//! [`SettlementConfig`] tunes the rate cache, provider timeouts, decimal
//! scales and the compensation channel. Zero values fall back to the defaults
//! with a warning so a bad flag never disables a safety bound.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Settlement engine configuration
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// How long a fetched rate stays fresh, in seconds
    pub rate_ttl_secs: u64,
    /// Per-call timeout for a rate provider, in milliseconds
    pub provider_timeout_ms: u64,
    /// Decimal places kept on exchange rates
    pub rate_scale: u32,
    /// Decimal places kept on converted amounts
    pub amount_scale: u32,
    /// Smallest accepted transfer amount
    pub min_amount: Decimal,
    /// Buffered compensation events before publishers wait
    pub channel_capacity: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            rate_ttl_secs: 60,
            provider_timeout_ms: 3_000,
            rate_scale: 4,
            amount_scale: 2,
            min_amount: Decimal::new(1, 2),
            channel_capacity: 1024,
        }
    }
}

impl SettlementConfig {
    /// Replace zero or negative values with defaults
    pub fn validated(self) -> Self {
        let default = Self::default();

        let rate_ttl_secs = if self.rate_ttl_secs == 0 {
            warn!(default = default.rate_ttl_secs, "Invalid rate_ttl_secs (0), using default");
            default.rate_ttl_secs
        } else {
            self.rate_ttl_secs
        };

        let provider_timeout_ms = if self.provider_timeout_ms == 0 {
            warn!(
                default = default.provider_timeout_ms,
                "Invalid provider_timeout_ms (0), using default"
            );
            default.provider_timeout_ms
        } else {
            self.provider_timeout_ms
        };

        let min_amount = if self.min_amount <= Decimal::ZERO {
            warn!(
                value = %self.min_amount,
                default = %default.min_amount,
                "Invalid min_amount, using default"
            );
            default.min_amount
        } else {
            self.min_amount
        };

        let channel_capacity = if self.channel_capacity == 0 {
            warn!(
                default = default.channel_capacity,
                "Invalid channel_capacity (0), using default"
            );
            default.channel_capacity
        } else {
            self.channel_capacity
        };

        Self {
            rate_ttl_secs,
            provider_timeout_ms,
            min_amount,
            channel_capacity,
            ..self
        }
    }

    pub fn rate_ttl(&self) -> Duration {
        Duration::from_secs(self.rate_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}
