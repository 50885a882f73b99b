//! Cached, per-pair serialized exchange-rate resolution
//!
//! # Concurrency
//!
//! Each [`RatePair`] owns one lock and one cache slot. A lookup takes the
//! pair's lock, checks freshness, and only on a miss calls out to providers
//! while still holding it. Concurrent lookups for the same pair therefore
//! wait for the single in-flight fetch and then read its result from the
//! cache; lookups for different pairs never wait on each other.
//!
//! # Failure
//!
//! Providers are tried in rank order, each under its own timeout. If all of
//! them fail the cached entry is left exactly as it was, so an outage never
//! poisons the cache with a bad or empty value.

use super::{ProviderError, RateProvider};
use crate::config::SettlementConfig;
use crate::core::keyed_lock::KeyedLocks;
use crate::types::{Currency, RatePair, SettlementError};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A fetched rate and when it was fetched
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRate {
    pub rate: Decimal,
    pub fetched_at: Instant,
}

pub struct ExchangeRateResolver {
    /// Providers in priority order: primary first
    providers: Vec<Arc<dyn RateProvider>>,
    cache: KeyedLocks<RatePair, Option<CachedRate>>,
    ttl: Duration,
    timeout: Duration,
    scale: u32,
}

impl ExchangeRateResolver {
    pub fn new(providers: Vec<Arc<dyn RateProvider>>, config: &SettlementConfig) -> Self {
        Self {
            providers,
            cache: KeyedLocks::new(),
            ttl: config.rate_ttl(),
            timeout: config.provider_timeout(),
            scale: config.rate_scale,
        }
    }

    /// Units of `quote` bought by one unit of `base`
    ///
    /// Returns exactly 1 for identical currencies without touching the cache
    /// or any provider.
    ///
    /// # Errors
    ///
    /// * `SettlementError::RateParse` - A provider answered with a malformed payload
    ///   and no provider succeeded
    /// * `SettlementError::InvalidCurrency` - Every provider rejected the pair
    /// * `SettlementError::RateUnavailable` - Any other all-providers-failed outcome
    pub async fn rate(&self, base: Currency, quote: Currency) -> Result<Decimal, SettlementError> {
        let pair = RatePair::new(base, quote);
        if pair.is_identity() {
            return Ok(Decimal::ONE);
        }

        let mut entry = self.cache.lock_or_insert_with(pair, || None).await;

        if let Some(cached) = *entry {
            if cached.fetched_at.elapsed() < self.ttl {
                debug!(%pair, rate = %cached.rate, "Rate cache hit");
                return Ok(cached.rate);
            }
        }

        let rate = self.fetch_from_providers(pair).await?;
        *entry = Some(CachedRate {
            rate,
            fetched_at: Instant::now(),
        });
        Ok(rate)
    }

    /// Current cache entry for a pair, fresh or not
    pub async fn cached(&self, pair: RatePair) -> Option<CachedRate> {
        let entry = self.cache.lock(&pair).await?;
        *entry
    }

    async fn fetch_from_providers(&self, pair: RatePair) -> Result<Decimal, SettlementError> {
        let mut failures: Vec<(String, ProviderError)> = Vec::new();

        for provider in &self.providers {
            match self.fetch_one(provider.as_ref(), pair).await {
                Ok(rate) => {
                    info!(%pair, %rate, provider = provider.name(), "Rate refreshed");
                    return Ok(rate);
                }
                Err(e) => {
                    warn!(%pair, provider = provider.name(), error = %e, "Rate provider failed");
                    failures.push((provider.name().to_string(), e));
                }
            }
        }

        Err(Self::classify(pair, failures))
    }

    async fn fetch_one(
        &self,
        provider: &dyn RateProvider,
        pair: RatePair,
    ) -> Result<Decimal, ProviderError> {
        let payload = tokio::time::timeout(self.timeout, provider.fetch_rate(pair))
            .await
            .map_err(|_| ProviderError::Timeout)??;
        let raw = provider.parse_rate(pair, &payload)?;
        normalize_rate(raw, self.scale)
    }

    /// Fold per-provider failures into the error the caller sees
    fn classify(pair: RatePair, failures: Vec<(String, ProviderError)>) -> SettlementError {
        if let Some((provider, ProviderError::Malformed(message))) = failures
            .iter()
            .find(|(_, e)| matches!(e, ProviderError::Malformed(_)))
        {
            return SettlementError::rate_parse(provider, message.clone());
        }

        let all_unsupported = !failures.is_empty()
            && failures
                .iter()
                .all(|(_, e)| matches!(e, ProviderError::UnsupportedPair(_)));
        if all_unsupported {
            if let Some((provider, _)) = failures.into_iter().next() {
                return SettlementError::InvalidCurrency { provider, pair };
            }
        }

        SettlementError::RateUnavailable { pair }
    }
}

/// Round a provider rate up to `scale` places
///
/// Ceiling rounding keeps the rate from under-crediting the deposit side.
/// Zero and negative rates are rejected as malformed.
pub fn normalize_rate(raw: Decimal, scale: u32) -> Result<Decimal, ProviderError> {
    if raw <= Decimal::ZERO {
        return Err(ProviderError::Malformed(format!("non-positive rate {}", raw)));
    }
    Ok(raw.round_dp_with_strategy(scale, RoundingStrategy::ToPositiveInfinity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingProvider;
    use rstest::rstest;
    use std::sync::atomic::Ordering;

    fn config() -> SettlementConfig {
        SettlementConfig {
            rate_ttl_secs: 60,
            provider_timeout_ms: 500,
            ..SettlementConfig::default()
        }
    }

    fn resolver(providers: Vec<Arc<CountingProvider>>) -> ExchangeRateResolver {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn RateProvider>)
            .collect();
        ExchangeRateResolver::new(providers, &config())
    }

    #[rstest]
    #[case::exact(Decimal::new(1300, 0), Decimal::new(1300, 0))]
    #[case::rounds_up(Decimal::new(13001234567, 7), Decimal::new(13001235, 4))]
    #[case::tiny_rounds_up(Decimal::new(1, 9), Decimal::new(1, 4))]
    fn test_normalize_rate_ceiling(#[case] raw: Decimal, #[case] expected: Decimal) {
        assert_eq!(normalize_rate(raw, 4).unwrap(), expected);
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::new(-5, 0))]
    fn test_normalize_rate_rejects_non_positive(#[case] raw: Decimal) {
        assert!(matches!(normalize_rate(raw, 4), Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_same_currency_is_one_without_fetch() {
        let provider = Arc::new(CountingProvider::new("primary"));
        let resolver = resolver(vec![Arc::clone(&provider)]);

        let rate = resolver.rate(Currency::Krw, Currency::Krw).await.unwrap();
        assert_eq!(rate, Decimal::ONE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_providers() {
        let provider = Arc::new(
            CountingProvider::new("primary").with_rate(Currency::Usd, Currency::Krw, "1300"),
        );
        let resolver = resolver(vec![Arc::clone(&provider)]);

        let first = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap();
        let second = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap();

        assert_eq!(first, Decimal::new(1300, 0));
        assert_eq!(second, first);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_is_refreshed() {
        let provider = Arc::new(
            CountingProvider::new("primary").with_rate(Currency::Usd, Currency::Krw, "1300"),
        );
        let resolver = resolver(vec![Arc::clone(&provider)]);

        resolver.rate(Currency::Usd, Currency::Krw).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        provider.set_rate(Currency::Usd, Currency::Krw, "1310");

        let refreshed = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap();
        assert_eq!(refreshed, Decimal::new(1310, 0));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let primary = Arc::new(CountingProvider::new("primary").failing());
        let fallback = Arc::new(
            CountingProvider::new("fallback").with_rate(Currency::Eur, Currency::Krw, "1450.5"),
        );
        let resolver = resolver(vec![Arc::clone(&primary), Arc::clone(&fallback)]);

        let rate = resolver.rate(Currency::Eur, Currency::Krw).await.unwrap();
        assert_eq!(rate, Decimal::new(14505, 1));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out_and_falls_back() {
        let slow = Arc::new(
            CountingProvider::new("slow")
                .with_rate(Currency::Usd, Currency::Krw, "1")
                .with_delay(Duration::from_secs(30)),
        );
        let fallback = Arc::new(
            CountingProvider::new("fallback").with_rate(Currency::Usd, Currency::Krw, "1300"),
        );
        let resolver = resolver(vec![slow, Arc::clone(&fallback)]);

        let rate = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap();
        assert_eq!(rate, Decimal::new(1300, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_failing_leaves_stale_entry_untouched() {
        let provider = Arc::new(
            CountingProvider::new("primary").with_rate(Currency::Usd, Currency::Krw, "1300"),
        );
        let resolver = resolver(vec![Arc::clone(&provider)]);
        let pair = RatePair::new(Currency::Usd, Currency::Krw);

        resolver.rate(Currency::Usd, Currency::Krw).await.unwrap();
        let before = resolver.cached(pair).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        provider.fail.store(true, Ordering::SeqCst);

        let err = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap_err();
        assert_eq!(err, SettlementError::RateUnavailable { pair });
        assert_eq!(resolver.cached(pair).await, Some(before));

        // Lock was released: a later lookup proceeds once the provider recovers.
        provider.fail.store(false, Ordering::SeqCst);
        assert!(resolver.rate(Currency::Usd, Currency::Krw).await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let provider = Arc::new(
            CountingProvider::new("primary").with_rate(Currency::Usd, Currency::Krw, "abc"),
        );
        let resolver = resolver(vec![provider]);

        let err = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap_err();
        assert!(matches!(err, SettlementError::RateParse { ref provider, .. } if provider == "primary"));
    }

    #[tokio::test]
    async fn test_every_provider_unsupported_is_invalid_currency() {
        let first = Arc::new(CountingProvider::new("first"));
        let second = Arc::new(CountingProvider::new("second"));
        let resolver = resolver(vec![first, second]);

        let err = resolver.rate(Currency::Gbp, Currency::Jpy).await.unwrap_err();
        assert_eq!(
            err,
            SettlementError::InvalidCurrency {
                provider: "first".to_string(),
                pair: RatePair::new(Currency::Gbp, Currency::Jpy),
            }
        );
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let resolver = ExchangeRateResolver::new(Vec::new(), &config());
        let err = resolver.rate(Currency::Usd, Currency::Krw).await.unwrap_err();
        assert!(matches!(err, SettlementError::RateUnavailable { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_lookups_fetch_once_per_pair() {
        let provider = Arc::new(
            CountingProvider::new("primary")
                .with_rate(Currency::Usd, Currency::Krw, "1300")
                .with_rate(Currency::Eur, Currency::Krw, "1450")
                .with_delay(Duration::from_millis(50)),
        );
        let resolver = Arc::new(resolver(vec![Arc::clone(&provider)]));

        let mut tasks = Vec::new();
        for i in 0..40 {
            let resolver = Arc::clone(&resolver);
            let base = if i % 2 == 0 { Currency::Usd } else { Currency::Eur };
            tasks.push(tokio::spawn(async move {
                resolver.rate(base, Currency::Krw).await
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(provider.calls_for(RatePair::new(Currency::Usd, Currency::Krw)), 1);
        assert_eq!(provider.calls_for(RatePair::new(Currency::Eur, Currency::Krw)), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_pair_does_not_block_other_pair() {
        let provider = Arc::new(
            CountingProvider::new("primary")
                .with_rate(Currency::Usd, Currency::Krw, "1300")
                .with_rate(Currency::Eur, Currency::Krw, "1450")
                .with_pair_delay(
                    RatePair::new(Currency::Usd, Currency::Krw),
                    Duration::from_millis(400),
                ),
        );
        let resolver = Arc::new(resolver(vec![provider]));

        let slow = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move { resolver.rate(Currency::Usd, Currency::Krw).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        resolver.rate(Currency::Eur, Currency::Krw).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));

        assert!(slow.await.unwrap().is_ok());
    }
}
