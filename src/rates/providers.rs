//! Concrete rate providers
//!
//! Each provider speaks its own payload format; all of them hand the resolver
//! a plain quote-per-base `Decimal`.

use super::{ProviderError, RateProvider};
use crate::types::{Currency, RatePair};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

fn parse_decimal(text: &str) -> Result<Decimal, ProviderError> {
    let cleaned = text.trim().replace(',', "");
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| ProviderError::Malformed(format!("'{}' is not a number", text)))
}

fn transport(error: reqwest::Error) -> ProviderError {
    ProviderError::Transport(error.to_string())
}

/// Fixed rate table held in memory
///
/// Answers a pair directly or through its inverse. Used as the offline
/// fallback and as the rate source of the CLI.
#[derive(Debug, Clone, Default)]
pub struct StaticRateProvider {
    name: String,
    rates: HashMap<RatePair, Decimal>,
}

impl StaticRateProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, base: Currency, quote: Currency, rate: Decimal) -> Self {
        self.insert(base, quote, rate);
        self
    }

    pub fn insert(&mut self, base: Currency, quote: Currency, rate: Decimal) {
        self.rates.insert(RatePair::new(base, quote), rate);
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rate(&self, pair: RatePair) -> Result<String, ProviderError> {
        if let Some(rate) = self.rates.get(&pair) {
            return Ok(rate.to_string());
        }
        self.rates
            .get(&pair.inverse())
            .and_then(|inverse| Decimal::ONE.checked_div(*inverse))
            .map(|rate| rate.to_string())
            .ok_or(ProviderError::UnsupportedPair(pair))
    }

    fn parse_rate(&self, _pair: RatePair, payload: &str) -> Result<Decimal, ProviderError> {
        parse_decimal(payload)
    }
}

/// One entry of the local bank's daily rate sheet
#[derive(Debug, Deserialize)]
struct LocalBankQuote {
    /// Currency code, with the quotation unit appended for some currencies, e.g. `JPY(100)`
    cur_unit: String,
    /// Base rate in KRW, with thousands separators
    deal_bas_r: String,
}

/// Local bank rate sheet over HTTP
///
/// Publishes KRW per unit of foreign currency only: any pair whose quote
/// currency is not KRW is rejected as unsupported before a request is made.
#[derive(Debug, Clone)]
pub struct LocalBankRateProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl LocalBankRateProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl RateProvider for LocalBankRateProvider {
    fn name(&self) -> &str {
        "local-bank"
    }

    async fn fetch_rate(&self, pair: RatePair) -> Result<String, ProviderError> {
        if pair.quote != Currency::LOCAL {
            return Err(ProviderError::UnsupportedPair(pair));
        }

        debug!(%pair, url = %self.base_url, "Requesting local bank rate sheet");
        self.client
            .get(&self.base_url)
            .query(&[("authkey", self.api_key.as_str()), ("data", "AP01")])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(transport)?
            .text()
            .await
            .map_err(transport)
    }

    fn parse_rate(&self, pair: RatePair, payload: &str) -> Result<Decimal, ProviderError> {
        let quotes: Vec<LocalBankQuote> = serde_json::from_str(payload)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let base = pair.base.code();
        for quote in quotes {
            let (code, unit) = match quote.cur_unit.split_once('(') {
                Some((code, rest)) => (code, parse_decimal(rest.trim_end_matches(')'))?),
                None => (quote.cur_unit.as_str(), Decimal::ONE),
            };
            if code.trim() == base {
                if unit.is_zero() {
                    return Err(ProviderError::Malformed(format!(
                        "zero quotation unit for {}",
                        base
                    )));
                }
                return Ok(parse_decimal(&quote.deal_bas_r)? / unit);
            }
        }
        Err(ProviderError::UnsupportedPair(pair))
    }
}

/// Open exchange-rate API over HTTP
///
/// `GET {base_url}/latest/{BASE}` answers every quote currency for a base in
/// one payload: `{"result": "success", "rates": {"KRW": 1300.5, ...}}`.
#[derive(Debug, Clone)]
pub struct OpenRatesProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenRatesProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RateProvider for OpenRatesProvider {
    fn name(&self) -> &str {
        "open-rates"
    }

    async fn fetch_rate(&self, pair: RatePair) -> Result<String, ProviderError> {
        let url = format!("{}/latest/{}", self.base_url.trim_end_matches('/'), pair.base);
        debug!(%pair, %url, "Requesting open rates");
        self.client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(transport)?
            .text()
            .await
            .map_err(transport)
    }

    fn parse_rate(&self, pair: RatePair, payload: &str) -> Result<Decimal, ProviderError> {
        let body: serde_json::Value =
            serde_json::from_str(payload).map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if body.get("result").and_then(|r| r.as_str()) == Some("error") {
            return Err(ProviderError::UnsupportedPair(pair));
        }

        let rates = body
            .get("rates")
            .and_then(|r| r.as_object())
            .ok_or_else(|| ProviderError::Malformed("missing 'rates' object".to_string()))?;

        match rates.get(pair.quote.code()) {
            Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
            Some(serde_json::Value::String(s)) => parse_decimal(s),
            Some(other) => Err(ProviderError::Malformed(format!(
                "rate for {} is {}",
                pair.quote, other
            ))),
            None => Err(ProviderError::UnsupportedPair(pair)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SHEET: &str = r#"[
        {"result": 1, "cur_unit": "USD", "deal_bas_r": "1,300.5"},
        {"result": 1, "cur_unit": "JPY(100)", "deal_bas_r": "905"},
        {"result": 1, "cur_unit": "EUR", "deal_bas_r": "N/A"}
    ]"#;

    fn pair(base: Currency, quote: Currency) -> RatePair {
        RatePair::new(base, quote)
    }

    #[tokio::test]
    async fn test_static_direct_and_inverse() {
        let provider = StaticRateProvider::new("static").with_rate(
            Currency::Usd,
            Currency::Krw,
            Decimal::new(1250, 0),
        );

        let direct = provider.fetch_rate(pair(Currency::Usd, Currency::Krw)).await.unwrap();
        assert_eq!(direct, "1250");

        let inverse = provider.fetch_rate(pair(Currency::Krw, Currency::Usd)).await.unwrap();
        assert_eq!(
            provider.parse_rate(pair(Currency::Krw, Currency::Usd), &inverse).unwrap(),
            Decimal::new(8, 4)
        );
    }

    #[tokio::test]
    async fn test_static_unknown_pair() {
        let provider = StaticRateProvider::new("static");
        let err = provider.fetch_rate(pair(Currency::Eur, Currency::Gbp)).await.unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedPair(pair(Currency::Eur, Currency::Gbp)));
    }

    #[tokio::test]
    async fn test_static_zero_rate_has_no_inverse() {
        let provider =
            StaticRateProvider::new("static").with_rate(Currency::Usd, Currency::Krw, Decimal::ZERO);
        let err = provider.fetch_rate(pair(Currency::Krw, Currency::Usd)).await.unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedPair(pair(Currency::Krw, Currency::Usd)));
    }

    #[rstest]
    #[case::usd(Currency::Usd, Decimal::new(13005, 1))]
    #[case::jpy_per_100(Currency::Jpy, Decimal::new(905, 2))]
    fn test_local_bank_parse(#[case] base: Currency, #[case] expected: Decimal) {
        let provider = LocalBankRateProvider::new("http://localhost", "key");
        let rate = provider.parse_rate(pair(base, Currency::Krw), SHEET).unwrap();
        assert_eq!(rate, expected);
    }

    #[test]
    fn test_local_bank_non_numeric_rate_is_malformed() {
        let provider = LocalBankRateProvider::new("http://localhost", "key");
        let err = provider.parse_rate(pair(Currency::Eur, Currency::Krw), SHEET).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn test_local_bank_missing_currency_is_unsupported() {
        let provider = LocalBankRateProvider::new("http://localhost", "key");
        let err = provider.parse_rate(pair(Currency::Gbp, Currency::Krw), SHEET).unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedPair(pair(Currency::Gbp, Currency::Krw)));
    }

    #[tokio::test]
    async fn test_local_bank_rejects_non_local_quote_without_request() {
        // Unroutable address: reaching the network would surface a transport error instead.
        let provider = LocalBankRateProvider::new("http://127.0.0.1:9", "key");
        let err = provider.fetch_rate(pair(Currency::Usd, Currency::Eur)).await.unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedPair(pair(Currency::Usd, Currency::Eur)));
    }

    #[rstest]
    #[case::number(r#"{"result":"success","rates":{"KRW":1300.25}}"#, Decimal::new(130025, 2))]
    #[case::string(r#"{"result":"success","rates":{"KRW":"1300.25"}}"#, Decimal::new(130025, 2))]
    fn test_open_rates_parse(#[case] payload: &str, #[case] expected: Decimal) {
        let provider = OpenRatesProvider::new("http://localhost");
        let rate = provider.parse_rate(pair(Currency::Usd, Currency::Krw), payload).unwrap();
        assert_eq!(rate, expected);
    }

    #[rstest]
    #[case::not_json("<html>busy</html>")]
    #[case::no_rates(r#"{"result":"success"}"#)]
    #[case::bool_rate(r#"{"result":"success","rates":{"KRW":true}}"#)]
    #[case::text_rate(r#"{"result":"success","rates":{"KRW":"n/a"}}"#)]
    fn test_open_rates_malformed(#[case] payload: &str) {
        let provider = OpenRatesProvider::new("http://localhost");
        let err = provider.parse_rate(pair(Currency::Usd, Currency::Krw), payload).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)), "got {:?}", err);
    }

    #[test]
    fn test_open_rates_error_result_is_unsupported() {
        let provider = OpenRatesProvider::new("http://localhost");
        let payload = r#"{"result":"error","error-type":"unsupported-code"}"#;
        let err = provider.parse_rate(pair(Currency::Usd, Currency::Krw), payload).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedPair(_)));
    }
}
