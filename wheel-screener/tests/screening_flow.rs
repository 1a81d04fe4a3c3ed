//! End-to-end screening over mock providers.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use wheel_screener::data::{EarningsEvent, PricePoint};
use wheel_screener::{
    EarningsCalendarProvider, ManualClock, MarketDataProvider, OptionContract, OptionQuery,
    OptionType, ProviderError, Quote, ScreenerConfig, TermStructure, WheelScreener,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2026, 3, 2)
}

const FRONT: &str = "2026-04-03"; // 32 DTE
const SECOND: &str = "2026-04-10"; // 39 DTE
const BACK: &str = "2026-05-15"; // back month for FRONT

// ============================================================================
// Mock market data
// ============================================================================

struct MockMarket {
    prices: HashMap<&'static str, f64>,
    expirations: HashMap<&'static str, Vec<String>>,
    quote_calls: AtomicU32,
    chain_calls: AtomicU32,
    history_calls: AtomicU32,
}

impl MockMarket {
    fn new() -> Self {
        let standard = vec![FRONT.to_string(), SECOND.to_string(), BACK.to_string()];
        Self {
            prices: HashMap::from([
                ("KO", 60.0),
                ("TQQQ", 80.0),
                ("NOCAL", 40.0),
                ("AAPL", 250.0),
                ("NOEXP", 50.0),
                ("FAR", 50.0),
                ("EARN", 70.0),
            ]),
            expirations: HashMap::from([
                ("KO", standard.clone()),
                ("TQQQ", standard.clone()),
                ("NOCAL", standard.clone()),
                ("AAPL", standard.clone()),
                ("NOEXP", vec![]),
                ("FAR", vec!["2026-06-19".to_string()]),
                ("EARN", standard),
            ]),
            quote_calls: AtomicU32::new(0),
            chain_calls: AtomicU32::new(0),
            history_calls: AtomicU32::new(0),
        }
    }

    fn chain_for(&self, ticker: &str, expiration: NaiveDate) -> Vec<OptionContract> {
        let Some(spot) = self.prices.get(ticker) else {
            return vec![];
        };
        let iv = if expiration == date(2026, 5, 15) { 0.30 } else { 0.25 };
        [(0.0, -0.50), (2.5, -0.35), (5.0, -0.25), (7.5, -0.18)]
            .iter()
            .map(|(offset, delta)| {
                let strike = spot - offset;
                let bid = (strike * 0.011 * 100.0).round() / 100.0;
                OptionContract {
                    code: format!("{}{}P{}", ticker, expiration.format("%y%m%d"), strike),
                    strike,
                    expiration,
                    option_type: OptionType::Put,
                    delta: Some(*delta),
                    bid: Some(bid),
                    ask: Some(bid + 0.04),
                    last_price: Some(bid),
                    volume: 120,
                    open_interest: 800,
                    implied_volatility: Some(iv),
                }
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarket {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_stock_quote(&self, ticker: &str) -> Result<Option<Quote>, ProviderError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if ticker == "FAIL" {
            return Err(ProviderError::Network("connection reset".into()));
        }
        Ok(self.prices.get(ticker).map(|price| Quote {
            ticker: ticker.to_string(),
            price: *price,
            bid: None,
            ask: None,
            volume: Some(1_000_000),
            market_cap: None,
        }))
    }

    async fn get_option_expirations(&self, ticker: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self.expirations.get(ticker).cloned().unwrap_or_default())
    }

    async fn get_options_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        query: &OptionQuery,
    ) -> Result<Vec<OptionContract>, ProviderError> {
        self.chain_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .chain_for(ticker, expiration)
            .into_iter()
            .filter(|c| query.option_type.map_or(true, |t| t == c.option_type))
            .filter(|c| match (c.delta, query.delta_min, query.delta_max) {
                (Some(d), Some(lo), Some(hi)) => d >= lo && d <= hi,
                _ => true,
            })
            .collect())
    }

    async fn get_historical_prices(
        &self,
        ticker: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let Some(spot) = self.prices.get(ticker) else {
            return Ok(vec![]);
        };
        let start = today() - Duration::days(days as i64);
        Ok((0..days as i64)
            .map(|i| {
                let swing = if i < 120 { 0.004 } else { 0.015 };
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                PricePoint {
                    date: start + Duration::days(i),
                    close: spot * (1.0 + sign * swing * ((i % 5) as f64 + 1.0) / 3.0),
                    volume: 1e6,
                }
            })
            .collect())
    }
}

// ============================================================================
// Mock earnings calendar
// ============================================================================

struct MockCalendar {
    calls: AtomicU32,
}

#[async_trait]
impl EarningsCalendarProvider for MockCalendar {
    fn name(&self) -> &'static str {
        "mock-calendar"
    }

    async fn get_earnings_calendar(&self) -> Result<Vec<EarningsEvent>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let event = |ticker: &str, d: NaiveDate| EarningsEvent {
            ticker: ticker.to_string(),
            date: d,
        };
        Ok(vec![
            event("KO", date(2026, 2, 10)),
            event("KO", date(2026, 4, 28)),
            event("EARN", date(2026, 3, 20)),
            event("AAPL", date(2026, 4, 30)),
        ])
    }
}

fn setup(config: ScreenerConfig) -> (WheelScreener, Arc<MockMarket>, Arc<MockCalendar>) {
    let market = Arc::new(MockMarket::new());
    let calendar = Arc::new(MockCalendar {
        calls: AtomicU32::new(0),
    });
    let clock = Arc::new(ManualClock::at_date(today()));
    let screener = WheelScreener::new(config, market.clone(), calendar.clone(), clock);
    (screener, market, calendar)
}

fn fast_config() -> ScreenerConfig {
    let mut config = ScreenerConfig::default();
    config.fetch.api_delay_secs = 0.0;
    config
}

fn universe(tickers: &[&str]) -> Vec<String> {
    tickers.iter().map(|t| t.to_string()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_screen_candidates_end_to_end() {
    let (screener, market, calendar) = setup(fast_config());
    let tickers = universe(&["KO", "TQQQ", "NOCAL", "AAPL", "NOEXP", "FAR", "EARN", "FAIL"]);

    let result = screener.screen_candidates(&tickers).await;

    let found: Vec<&str> = result.candidates.iter().map(|c| c.ticker.as_str()).collect();
    assert_eq!(found.len(), 3);
    for t in ["KO", "TQQQ", "NOCAL"] {
        assert!(found.contains(&t), "missing candidate {t}");
    }
    assert!(result
        .candidates
        .windows(2)
        .all(|w| w[0].score >= w[1].score));

    let reason = |t: &str| result.rejection(t).map(|r| r.reason.clone()).unwrap();
    assert_eq!(reason("AAPL"), "Price $250.00 outside $15-$200 range");
    assert_eq!(reason("NOEXP"), "No option expirations available");
    assert_eq!(reason("FAR"), "No expirations in 30-45 DTE range");
    assert_eq!(reason("EARN"), "Earnings conflict for all expirations");
    assert_eq!(reason("FAIL"), "No quote available");
    assert_eq!(result.rejections.len(), 5);
    assert_eq!(result.total_screened, 8);

    assert_eq!(market.quote_calls.load(Ordering::SeqCst), 8);
    // Calendar fetched once and cached for the rest of the run
    assert_eq!(calendar.calls.load(Ordering::SeqCst), 1);
    // History cached per ticker
    assert_eq!(market.history_calls.load(Ordering::SeqCst), 3);
    assert!(result.summary().contains("3 candidates, 5 rejected"));
}

#[tokio::test]
async fn test_candidate_details() {
    let (screener, _, _) = setup(fast_config());
    let result = screener.screen_candidates(&universe(&["KO"])).await;

    let ko = &result.candidates[0];
    assert_eq!(ko.expiration, date(2026, 4, 3));
    assert_eq!(ko.dte, 32);
    assert_eq!(ko.best_option.contract.strike, 55.0);
    assert_eq!(ko.best_option.delta, 0.25);
    assert!(ko.alternates.is_empty());
    assert!(ko.earnings.is_safe());
    assert!(ko.earnings.reason.starts_with("SAFE - earnings on 2026-04-28"));

    // Front 25% vs back 30%: 5 points of contango
    assert_eq!(ko.volatility.term_structure, TermStructure::Contango);
    assert_eq!(ko.volatility.current_iv, Some(25.0));
    assert!(ko.volatility.iv_rank.is_some());
    assert!(ko.score > 0.0);
    assert!(!ko.has_warning("earnings unverified"));
}

#[tokio::test]
async fn test_manual_ticker_and_unverified() {
    let (screener, _, _) = setup(fast_config());
    let result = screener.screen_candidates(&universe(&["TQQQ", "NOCAL"])).await;

    let tqqq = result.candidates.iter().find(|c| c.ticker == "TQQQ").unwrap();
    assert_eq!(tqqq.earnings.reason, "SAFE - ETF/manual ticker (no earnings)");

    let nocal = result.candidates.iter().find(|c| c.ticker == "NOCAL").unwrap();
    assert!(nocal.has_warning("earnings unverified"));
}

#[tokio::test]
async fn test_strict_mode_rejects_unknown_earnings() {
    let mut config = fast_config();
    config.wheel.allow_unverified = false;
    let (screener, _, _) = setup(config);

    let result = screener.screen_candidates(&universe(&["NOCAL", "KO"])).await;

    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].ticker, "KO");
    assert_eq!(
        result.rejection("NOCAL").unwrap().reason,
        "Earnings conflict for all expirations"
    );
}

#[tokio::test]
async fn test_empty_universe() {
    let (screener, market, _) = setup(fast_config());
    let result = screener.screen_candidates(&[]).await;

    assert!(result.candidates.is_empty());
    assert!(result.rejections.is_empty());
    assert_eq!(market.quote_calls.load(Ordering::SeqCst), 0);
}
