//! Screening pipeline.
//!
//! Per universe ticker:
//! quote -> price range -> expirations -> DTE window -> earnings-safe
//! expiration -> volatility profile -> put chain -> candidate score.
//!
//! A ticker that drops out at any step is recorded as a [`Rejection`]
//! with a readable reason; provider failures never abort the run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use wheel_common::logging::generate_run_id;

use crate::candidate::{Candidate, CandidateScorer};
use crate::clock::SharedClock;
use crate::config::ScreenerConfig;
use crate::data::{
    fetch_quotes_batch, filter_expirations_by_dte, GatedMarketData, MarketDataProvider,
    MinIntervalGate, OptionQuery, SharedEarningsCalendar, SharedMarketData,
};
use crate::earnings::{EarningsSafetyChecker, EarningsWindowDecision};
use crate::volatility::VolatilityAnalyzer;

// ============================================================================
// Results
// ============================================================================

/// A ticker that did not produce a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub ticker: String,
    pub reason: String,
}

impl Rejection {
    fn new(ticker: &str, reason: impl Into<String>) -> Self {
        Self {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }
}

/// Wall-clock time spent per phase, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineTimings {
    pub quotes_secs: f64,
    pub screening_secs: f64,
    pub total_secs: f64,
}

/// Result of one screening run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenResult {
    pub run_id: String,
    /// Candidates sorted by score descending
    pub candidates: Vec<Candidate>,
    pub rejections: Vec<Rejection>,
    pub total_screened: usize,
    pub timings: PipelineTimings,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ScreenResult {
    pub fn top(&self, n: usize) -> &[Candidate] {
        &self.candidates[..n.min(self.candidates.len())]
    }

    pub fn rejection(&self, ticker: &str) -> Option<&Rejection> {
        self.rejections.iter().find(|r| r.ticker == ticker)
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} tickers in {:.1}s: {} candidates, {} rejected",
            self.total_screened,
            self.timings.total_secs,
            self.candidates.len(),
            self.rejections.len()
        )
    }
}

// ============================================================================
// Screener
// ============================================================================

/// Per-trade screener over a ranked universe.
pub struct WheelScreener {
    config: ScreenerConfig,
    market: SharedMarketData,
    volatility: VolatilityAnalyzer,
    earnings: EarningsSafetyChecker,
    scorer: CandidateScorer,
    clock: SharedClock,
}

impl WheelScreener {
    /// Wire the screener. Option-chain and history calls on `market` go
    /// through one shared minimum-interval gate.
    pub fn new(
        config: ScreenerConfig,
        market: SharedMarketData,
        calendar: SharedEarningsCalendar,
        clock: SharedClock,
    ) -> Self {
        let gate = Arc::new(MinIntervalGate::from_secs_f64(
            "market_data",
            config.fetch.api_delay_secs,
        ));
        let market: SharedMarketData = Arc::new(GatedMarketData::new(market, gate));

        let volatility =
            VolatilityAnalyzer::new(market.clone(), config.volatility.clone(), clock.clone());
        let earnings = EarningsSafetyChecker::new(
            calendar,
            config.earnings.clone(),
            config.wheel.manual_tickers.clone(),
            clock.clone(),
        );
        let scorer = CandidateScorer::new(config.wheel.clone());

        Self {
            config,
            market,
            volatility,
            earnings,
            scorer,
            clock,
        }
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn volatility(&self) -> &VolatilityAnalyzer {
        &self.volatility
    }

    pub fn earnings(&self) -> &EarningsSafetyChecker {
        &self.earnings
    }

    /// Screen every ticker of `universe` for a cash-secured put.
    pub async fn screen_candidates(&self, universe: &[String]) -> ScreenResult {
        let run_id = generate_run_id();
        let started_at = Utc::now();
        let start = Instant::now();
        let wheel = &self.config.wheel;

        info!(run_id = %run_id, tickers = universe.len(), "Starting screening run");

        let batch =
            fetch_quotes_batch(self.market.as_ref(), universe, self.config.fetch.concurrency).await;
        let quotes_secs = start.elapsed().as_secs_f64();
        info!(
            run_id = %run_id,
            quotes = batch.quotes.len(),
            success_rate = batch.success_rate(),
            "Quotes fetched"
        );

        let today = self.clock.today();
        let mut candidates = Vec::new();
        let mut rejections = Vec::new();
        let screening_start = Instant::now();

        for ticker in universe {
            let Some(quote) = batch.quotes.get(ticker) else {
                rejections.push(Rejection::new(ticker, "No quote available"));
                continue;
            };

            let price = quote.price;
            if price < wheel.price_min || price > wheel.price_max {
                rejections.push(Rejection::new(
                    ticker,
                    format!(
                        "Price ${:.2} outside ${:.0}-${:.0} range",
                        price, wheel.price_min, wheel.price_max
                    ),
                ));
                continue;
            }

            match self.screen_ticker(ticker, price, today).await {
                Ok(candidate) => {
                    debug!(ticker = %ticker, score = candidate.score, "Candidate found");
                    candidates.push(candidate);
                }
                Err(rejection) => {
                    debug!(ticker = %ticker, reason = %rejection.reason, "Rejected");
                    rejections.push(rejection);
                }
            }
        }

        candidates.sort_by(|a, b| {
            crate::numeric::desc(a.score, b.score).then_with(|| a.ticker.cmp(&b.ticker))
        });

        let timings = PipelineTimings {
            quotes_secs,
            screening_secs: screening_start.elapsed().as_secs_f64(),
            total_secs: start.elapsed().as_secs_f64(),
        };
        let result = ScreenResult {
            run_id,
            candidates,
            rejections,
            total_screened: universe.len(),
            timings,
            started_at,
            completed_at: Utc::now(),
        };
        info!(run_id = %result.run_id, "{}", result.summary());
        result
    }

    async fn screen_ticker(
        &self,
        ticker: &str,
        price: f64,
        today: NaiveDate,
    ) -> Result<Candidate, Rejection> {
        let wheel = &self.config.wheel;

        let expirations = match self.market.get_option_expirations(ticker).await {
            Ok(list) => list,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Expirations unavailable");
                return Err(Rejection::new(ticker, format!("Option expirations unavailable: {}", e)));
            }
        };
        if expirations.is_empty() {
            return Err(Rejection::new(ticker, "No option expirations available"));
        }

        let in_window = filter_expirations_by_dte(&expirations, wheel.dte_min, wheel.dte_max, today);
        if in_window.is_empty() {
            return Err(Rejection::new(
                ticker,
                format!("No expirations in {}-{} DTE range", wheel.dte_min, wheel.dte_max),
            ));
        }

        let Some((expiration, dte, earnings)) = self.first_tradeable(ticker, &in_window).await else {
            return Err(Rejection::new(ticker, "Earnings conflict for all expirations"));
        };

        let volatility = self
            .volatility
            .analyze(ticker, expiration, price, &expirations)
            .await;

        let query = OptionQuery::puts_in_delta(-wheel.delta_max, -wheel.delta_min);
        let chain = match self.market.get_options_chain(ticker, expiration, &query).await {
            Ok(chain) => chain,
            Err(e) => {
                warn!(ticker = %ticker, expiration = %expiration, error = %e, "Option chain unavailable");
                return Err(Rejection::new(ticker, format!("Option chain unavailable: {}", e)));
            }
        };

        self.scorer
            .score_candidate(ticker, price, &chain, volatility, earnings, dte)
            .ok_or_else(|| {
                Rejection::new(
                    ticker,
                    format!("No puts with a bid in delta {:.2}-{:.2}", wheel.delta_min, wheel.delta_max),
                )
            })
    }

    /// First in-window expiration whose earnings decision is tradeable.
    async fn first_tradeable(
        &self,
        ticker: &str,
        in_window: &[(NaiveDate, i64)],
    ) -> Option<(NaiveDate, i64, EarningsWindowDecision)> {
        let wheel = &self.config.wheel;
        for (expiration, dte) in in_window {
            let decision = self
                .earnings
                .check_safe(ticker, *expiration, wheel.earnings_buffer_days, wheel.allow_unverified)
                .await;
            if decision.is_safe() {
                return Some((*expiration, *dte, decision));
            }
            debug!(ticker = %ticker, expiration = %expiration, reason = %decision.reason, "Expiration blocked");
        }
        None
    }
}
