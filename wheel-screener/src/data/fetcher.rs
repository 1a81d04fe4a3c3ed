//! Fetch helpers around a [`MarketDataProvider`].
//!
//! - [`GatedMarketData`] puts the global minimum-interval gate in front of
//!   option-chain and historical-data calls.
//! - [`fetch_quotes_batch`] fans quote lookups out with bounded
//!   concurrency; one failing ticker never aborts the batch.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::provider::{MarketDataProvider, ProviderError, SharedMarketData};
use super::rate_limiter::SharedGate;
use super::{OptionContract, OptionQuery, PricePoint, Quote};

// ============================================================================
// Gated provider
// ============================================================================

/// Provider decorator that waits on a shared gate before rate-limited calls.
pub struct GatedMarketData {
    inner: SharedMarketData,
    gate: SharedGate,
}

impl GatedMarketData {
    pub fn new(inner: SharedMarketData, gate: SharedGate) -> Self {
        Self { inner, gate }
    }

    pub fn gate(&self) -> &SharedGate {
        &self.gate
    }
}

#[async_trait]
impl MarketDataProvider for GatedMarketData {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_stock_quote(&self, ticker: &str) -> Result<Option<Quote>, ProviderError> {
        self.inner.get_stock_quote(ticker).await
    }

    async fn get_option_expirations(&self, ticker: &str) -> Result<Vec<String>, ProviderError> {
        self.inner.get_option_expirations(ticker).await
    }

    async fn get_options_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        query: &OptionQuery,
    ) -> Result<Vec<OptionContract>, ProviderError> {
        self.gate.wait().await;
        self.inner.get_options_chain(ticker, expiration, query).await
    }

    async fn get_historical_prices(
        &self,
        ticker: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        self.gate.wait().await;
        self.inner.get_historical_prices(ticker, days).await
    }
}

// ============================================================================
// Batch quotes
// ============================================================================

/// Result of a batch quote fetch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Quotes by ticker
    pub quotes: HashMap<String, Quote>,
    /// Tickers whose fetch failed, with the error
    pub failures: Vec<(String, ProviderError)>,
    /// Tickers the provider had no quote for
    pub missing: Vec<String>,
}

impl BatchOutcome {
    pub fn success_rate(&self) -> f64 {
        let total = self.quotes.len() + self.failures.len() + self.missing.len();
        if total == 0 {
            return 0.0;
        }
        self.quotes.len() as f64 / total as f64
    }
}

/// Fetch quotes for many tickers with at most `concurrency` requests in flight.
pub async fn fetch_quotes_batch(
    provider: &dyn MarketDataProvider,
    tickers: &[String],
    concurrency: usize,
) -> BatchOutcome {
    let requests = tickers.iter().map(|ticker| async move {
        let result = provider.get_stock_quote(ticker).await;
        (ticker.clone(), result)
    });

    let results = stream::iter(requests)
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut outcome = BatchOutcome::default();
    for (ticker, result) in results {
        match result {
            Ok(Some(quote)) => {
                outcome.quotes.insert(ticker, quote);
            }
            Ok(None) => {
                debug!(ticker = %ticker, "No quote returned");
                outcome.missing.push(ticker);
            }
            Err(e) => {
                warn!(
                    ticker = %ticker,
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Quote fetch failed"
                );
                outcome.failures.push((ticker, e));
            }
        }
    }

    debug!(
        provider = provider.name(),
        requested = tickers.len(),
        fetched = outcome.quotes.len(),
        failed = outcome.failures.len(),
        "Batch quote fetch complete"
    );

    outcome
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::rate_limiter::MinIntervalGate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    struct StubProvider {
        quote_calls: AtomicU32,
        chain_calls: AtomicU32,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                quote_calls: AtomicU32::new(0),
                chain_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn get_stock_quote(&self, ticker: &str) -> Result<Option<Quote>, ProviderError> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            match ticker {
                "FAIL" => Err(ProviderError::Network("connection reset".into())),
                "NONE" => Ok(None),
                _ => Ok(Some(Quote {
                    ticker: ticker.to_string(),
                    price: 100.0,
                    bid: None,
                    ask: None,
                    volume: None,
                    market_cap: None,
                })),
            }
        }

        async fn get_option_expirations(&self, _ticker: &str) -> Result<Vec<String>, ProviderError> {
            Ok(vec![])
        }

        async fn get_options_chain(
            &self,
            _ticker: &str,
            _expiration: NaiveDate,
            _query: &OptionQuery,
        ) -> Result<Vec<OptionContract>, ProviderError> {
            self.chain_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        async fn get_historical_prices(
            &self,
            _ticker: &str,
            _days: u32,
        ) -> Result<Vec<PricePoint>, ProviderError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let provider = StubProvider::new();
        let tickers: Vec<String> = ["AAPL", "FAIL", "NONE", "KO"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let outcome = fetch_quotes_batch(&provider, &tickers, 2).await;

        assert_eq!(outcome.quotes.len(), 2);
        assert!(outcome.quotes.contains_key("AAPL"));
        assert!(outcome.quotes.contains_key("KO"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "FAIL");
        assert_eq!(outcome.missing, vec!["NONE".to_string()]);
        assert_eq!(provider.quote_calls.load(Ordering::SeqCst), 4);
        assert!((outcome.success_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_gated_provider_spaces_chain_calls() {
        let inner = Arc::new(StubProvider::new());
        let gate = Arc::new(MinIntervalGate::new("test", Duration::from_millis(40)));
        let gated = GatedMarketData::new(inner.clone(), gate);
        let expiration = NaiveDate::from_ymd_opt(2026, 4, 17).unwrap();

        let start = Instant::now();
        gated
            .get_options_chain("AAPL", expiration, &OptionQuery::puts())
            .await
            .unwrap();
        gated
            .get_options_chain("AAPL", expiration, &OptionQuery::puts())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(inner.chain_calls.load(Ordering::SeqCst), 2);
        assert_eq!(gated.name(), "stub");
    }
}
