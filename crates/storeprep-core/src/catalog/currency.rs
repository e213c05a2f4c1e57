//! Currency conversion and exchange-rate acquisition.
//!
//! Rates are either fixed in the settings or fetched from an exchange-rate
//! endpoint. Fetched rates are cached by [`RateProvider`] under an explicit
//! [`RateRefresh`] policy. The cache lock is held across a fetch, so at most
//! one request is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, StoreprepError};
use crate::obs;

/// Google Play style micros: one currency unit is a million minor units.
pub const DEFAULT_MINOR_UNIT_SCALE: u64 = 1_000_000;

fn default_minor_unit_scale() -> u64 {
    DEFAULT_MINOR_UNIT_SCALE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSource {
    Fixed { rate: Decimal },
    /// Fetch the live `base -> currency` rate.
    Live { base: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Keep the full precision of the converted amount.
    #[default]
    None,
    /// Round to a whole currency unit, half away from zero.
    NearestUnit,
}

/// Conversion of base prices into one target currency and store region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConversion {
    /// Store region code, e.g. `VN`.
    pub region: String,
    /// ISO currency code, e.g. `VND`.
    pub currency: String,
    pub source: RateSource,

    /// Rate used when a live fetch fails and nothing is cached.
    #[serde(default)]
    pub fallback_rate: Option<Decimal>,

    #[serde(default = "default_minor_unit_scale")]
    pub minor_unit_scale: u64,

    #[serde(default)]
    pub rounding: RoundingRule,
}

impl CurrencyConversion {
    pub fn fixed(region: &str, currency: &str, rate: Decimal) -> Self {
        Self {
            region: region.to_string(),
            currency: currency.to_string(),
            source: RateSource::Fixed { rate },
            fallback_rate: None,
            minor_unit_scale: DEFAULT_MINOR_UNIT_SCALE,
            rounding: RoundingRule::None,
        }
    }

    pub fn live(region: &str, currency: &str, base: &str) -> Self {
        Self {
            region: region.to_string(),
            currency: currency.to_string(),
            source: RateSource::Live {
                base: base.to_string(),
            },
            fallback_rate: None,
            minor_unit_scale: DEFAULT_MINOR_UNIT_SCALE,
            rounding: RoundingRule::NearestUnit,
        }
    }

    pub fn with_rounding(mut self, rounding: RoundingRule) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_fallback_rate(mut self, rate: Decimal) -> Self {
        self.fallback_rate = Some(rate);
        self
    }

    /// Convert a base amount into minor units of the target currency.
    ///
    /// Fails with [`StoreprepError::Overflow`] when the product does not fit
    /// a `Decimal` or the minor-unit scale is zero.
    pub fn to_minor_units(&self, amount: Decimal, rate: Decimal) -> Result<Decimal> {
        let overflow = || {
            StoreprepError::Overflow(format!(
                "{amount} x {rate} in {} (scale {})",
                self.currency, self.minor_unit_scale
            ))
        };
        if self.minor_unit_scale == 0 {
            return Err(overflow());
        }
        let scale = Decimal::from(self.minor_unit_scale);
        let minor = amount
            .checked_mul(rate)
            .and_then(|v| v.checked_mul(scale))
            .ok_or_else(overflow)?;
        match self.rounding {
            RoundingRule::None => Ok(minor),
            RoundingRule::NearestUnit => minor
                .checked_div(scale)
                .map(|units| units.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
                .and_then(|units| units.checked_mul(scale))
                .ok_or_else(overflow),
        }
    }
}

/// How long a fetched rate stays valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RateRefresh {
    /// Fetch once, reuse for the lifetime of the provider.
    #[default]
    ProcessLifetime,
    MaxAge { secs: u64 },
    /// Fetch on every request.
    Always,
}

impl RateRefresh {
    fn is_fresh(&self, fetched_at: Instant) -> bool {
        match self {
            RateRefresh::ProcessLifetime => true,
            RateRefresh::MaxAge { secs } => fetched_at.elapsed() < Duration::from_secs(*secs),
            RateRefresh::Always => false,
        }
    }
}

/// Source of live exchange rates.
#[async_trait]
pub trait RateFetcher: Send + Sync {
    async fn fetch(&self, base: &str, target: &str) -> Result<Decimal>;
}

#[derive(Debug, Deserialize)]
struct ExchangeRateResponse {
    rates: HashMap<String, Decimal>,
}

/// Fetches rates from an endpoint answering `{"rates": {"VND": 25200, ...}}`.
///
/// `{base}` in the endpoint is replaced by the base currency code.
pub struct HttpRateFetcher {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpRateFetcher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("storeprep/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    fn url(&self, base: &str) -> String {
        self.endpoint.replace("{base}", base)
    }
}

#[async_trait]
impl RateFetcher for HttpRateFetcher {
    async fn fetch(&self, base: &str, target: &str) -> Result<Decimal> {
        let response = self
            .http_client
            .get(self.url(base))
            .send()
            .await?
            .error_for_status()?;
        let body: ExchangeRateResponse = response.json().await?;
        body.rates.get(target).copied().ok_or_else(|| {
            StoreprepError::External(format!("rate {base}->{target} missing from response"))
        })
    }
}

/// A rate plus the warning raised while obtaining it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRate {
    pub rate: Decimal,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: Decimal,
    fetched_at: Instant,
}

/// Resolves conversion rates, caching live ones per (base, target) pair.
pub struct RateProvider {
    fetcher: Arc<dyn RateFetcher>,
    refresh: RateRefresh,
    cache: Mutex<HashMap<(String, String), CachedRate>>,
}

impl RateProvider {
    pub fn new(fetcher: Arc<dyn RateFetcher>, refresh: RateRefresh) -> Self {
        Self {
            fetcher,
            refresh,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the rate for a conversion. Never fails: a failed fetch falls
    /// back to the last known rate, then the conversion's fallback rate,
    /// then zero, and reports a warning.
    pub async fn resolve(&self, conversion: &CurrencyConversion) -> ResolvedRate {
        let base = match &conversion.source {
            RateSource::Fixed { rate } => {
                return ResolvedRate {
                    rate: *rate,
                    warning: None,
                }
            }
            RateSource::Live { base } => base,
        };

        let key = (base.clone(), conversion.currency.clone());
        let mut cache = self.cache.lock().await;
        let cached = cache.get(&key).copied();
        if let Some(hit) = cached.filter(|c| self.refresh.is_fresh(c.fetched_at)) {
            return ResolvedRate {
                rate: hit.rate,
                warning: None,
            };
        }

        match self.fetcher.fetch(base, &conversion.currency).await {
            Ok(rate) => {
                obs::emit_rate_fetched(base, &conversion.currency, &rate);
                cache.insert(
                    key,
                    CachedRate {
                        rate,
                        fetched_at: Instant::now(),
                    },
                );
                ResolvedRate {
                    rate,
                    warning: None,
                }
            }
            Err(e) => {
                let (rate, used) = match (cached, conversion.fallback_rate) {
                    (Some(stale), _) => (stale.rate, "last known rate"),
                    (None, Some(fallback)) => (fallback, "fallback rate"),
                    (None, None) => (Decimal::ZERO, "zero"),
                };
                let warning = format!(
                    "could not fetch {base}->{} rate ({e}); using {used} {rate}",
                    conversion.currency
                );
                obs::emit_rate_fallback(&conversion.currency, &warning);
                ResolvedRate {
                    rate,
                    warning: Some(warning),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        rate: Option<Decimal>,
    }

    impl CountingFetcher {
        fn ok(rate: i64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                rate: Some(Decimal::from(rate)),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                rate: None,
            })
        }
    }

    #[async_trait]
    impl RateFetcher for CountingFetcher {
        async fn fetch(&self, _base: &str, _target: &str) -> Result<Decimal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rate
                .ok_or_else(|| StoreprepError::External("network unreachable".to_string()))
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_minor_units_before_rounding() {
        let conversion = CurrencyConversion::fixed("VN", "VND", dec("25200"));
        let micros = conversion.to_minor_units(dec("1.00"), dec("25200")).unwrap();
        assert_eq!(micros, Decimal::from(25_200_000_000i64));
    }

    #[test]
    fn test_nearest_unit_rounding() {
        let conversion = CurrencyConversion::fixed("VN", "VND", dec("25431.7"))
            .with_rounding(RoundingRule::NearestUnit);
        // 0.99 * 25431.7 = 25177.383 -> 25177 units
        let micros = conversion.to_minor_units(dec("0.99"), dec("25431.7")).unwrap();
        assert_eq!(micros, Decimal::from(25_177_000_000i64));
    }

    #[test]
    fn test_no_rounding_keeps_precision() {
        let conversion = CurrencyConversion::fixed("US", "USD", Decimal::ONE);
        let micros = conversion.to_minor_units(dec("0.9912345"), Decimal::ONE).unwrap();
        assert_eq!(micros, dec("991234.5"));
    }

    #[test]
    fn test_minor_units_overflow_is_error() {
        let conversion = CurrencyConversion::fixed("VN", "VND", dec("25200"));
        let err = conversion
            .to_minor_units(dec("99999999999999999999999"), dec("25200"))
            .unwrap_err();
        assert!(matches!(err, StoreprepError::Overflow(_)));

        let rounded = conversion.with_rounding(RoundingRule::NearestUnit);
        assert!(rounded.to_minor_units(Decimal::MAX, dec("2")).is_err());
    }

    #[test]
    fn test_zero_scale_is_error() {
        let mut conversion = CurrencyConversion::live("VN", "VND", "USD");
        conversion.minor_unit_scale = 0;
        assert!(matches!(
            conversion.to_minor_units(dec("1"), dec("25200")),
            Err(StoreprepError::Overflow(_))
        ));
    }

    #[test]
    fn test_conversion_serde_defaults() {
        let conversion: CurrencyConversion = serde_json::from_str(
            r#"{ "region": "VN", "currency": "VND", "source": { "kind": "live", "base": "USD" } }"#,
        )
        .unwrap();
        assert_eq!(conversion.minor_unit_scale, DEFAULT_MINOR_UNIT_SCALE);
        assert_eq!(conversion.rounding, RoundingRule::None);
        assert_eq!(conversion.fallback_rate, None);
    }

    #[tokio::test]
    async fn test_fixed_rate_never_fetches() {
        let fetcher = CountingFetcher::ok(1);
        let provider = RateProvider::new(fetcher.clone(), RateRefresh::Always);
        let resolved = provider
            .resolve(&CurrencyConversion::fixed("VN", "VND", dec("25200")))
            .await;
        assert_eq!(resolved.rate, dec("25200"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_process_lifetime_fetches_once() {
        let fetcher = CountingFetcher::ok(25200);
        let provider = RateProvider::new(fetcher.clone(), RateRefresh::ProcessLifetime);
        let conversion = CurrencyConversion::live("VN", "VND", "USD");

        for _ in 0..3 {
            let resolved = provider.resolve(&conversion).await;
            assert_eq!(resolved.rate, Decimal::from(25200));
            assert!(resolved.warning.is_none());
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_always_refetches() {
        let fetcher = CountingFetcher::ok(25200);
        let provider = RateProvider::new(fetcher.clone(), RateRefresh::Always);
        let conversion = CurrencyConversion::live("VN", "VND", "USD");
        provider.resolve(&conversion).await;
        provider.resolve(&conversion).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_age_expires() {
        let fetcher = CountingFetcher::ok(25200);
        let provider = RateProvider::new(fetcher.clone(), RateRefresh::MaxAge { secs: 60 });
        let conversion = CurrencyConversion::live("VN", "VND", "USD");

        provider.resolve(&conversion).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        provider.resolve(&conversion).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        provider.resolve(&conversion).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_zero_with_warning() {
        let provider = RateProvider::new(CountingFetcher::failing(), RateRefresh::ProcessLifetime);
        let resolved = provider
            .resolve(&CurrencyConversion::live("VN", "VND", "USD"))
            .await;
        assert_eq!(resolved.rate, Decimal::ZERO);
        let warning = resolved.warning.unwrap();
        assert!(warning.contains("USD->VND"));
        assert!(warning.contains("network unreachable"));
    }

    #[tokio::test]
    async fn test_failed_fetch_uses_configured_fallback() {
        let provider = RateProvider::new(CountingFetcher::failing(), RateRefresh::ProcessLifetime);
        let conversion =
            CurrencyConversion::live("VN", "VND", "USD").with_fallback_rate(dec("24000"));
        let resolved = provider.resolve(&conversion).await;
        assert_eq!(resolved.rate, dec("24000"));
        assert!(resolved.warning.is_some());
    }

    #[test]
    fn test_http_fetcher_url_template() {
        let fetcher = HttpRateFetcher::new("https://rates.example/v4/latest/{base}").unwrap();
        assert_eq!(fetcher.url("USD"), "https://rates.example/v4/latest/USD");
    }

    #[test]
    fn test_exchange_rate_response_parses_numbers() {
        let body: ExchangeRateResponse =
            serde_json::from_str(r#"{ "base": "USD", "rates": { "VND": 25200, "USD": 1 } }"#)
                .unwrap();
        assert_eq!(body.rates["VND"], Decimal::from(25200));
        assert_eq!(body.rates["USD"], Decimal::ONE);
    }
}
