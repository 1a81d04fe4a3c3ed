//! Provider abstraction for quotes, option chains, history, earnings and
//! fundamentals.
//!
//! Concrete clients live outside this crate. They implement these traits
//! and report "no data" as `Ok(None)` / empty collections, reserving
//! `ProviderError` for genuinely exceptional conditions.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{EarningsEvent, OptionContract, OptionQuery, PricePoint, Quote, Sector};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors raised at the data boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider answered but has nothing for the request
    DataUnavailable(String),
    /// Upstream quota exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Temporary upstream failure
    Transient(String),
    /// Connection failed or timed out
    Network(String),
    /// Response did not match the expected schema
    Malformed(String),
    /// Internal provider error
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUnavailable(msg) => write!(f, "Data unavailable: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::Transient(msg) => write!(f, "Transient error: {}", msg),
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Malformed(msg) => write!(f, "Malformed response: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for wheel_common::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::DataUnavailable(msg) => Self::NotFound(msg),
            ProviderError::RateLimited { .. } => Self::RateLimited(err.to_string()),
            ProviderError::Transient(msg) | ProviderError::Network(msg) => Self::External(msg),
            ProviderError::Malformed(msg) => Self::InvalidInput(msg),
            ProviderError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl ProviderError {
    /// Worth retrying (by the collaborator, not the core).
    pub fn is_recoverable(&self) -> bool {
        wheel_common::Error::from(self.clone()).is_transient()
    }

    /// The provider simply had nothing to return.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::DataUnavailable(_))
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// Quotes, option chains and daily history.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Latest quote, `None` when the ticker is unknown.
    async fn get_stock_quote(&self, ticker: &str) -> Result<Option<Quote>, ProviderError>;

    /// Listed expirations as `YYYY-MM-DD` strings.
    async fn get_option_expirations(&self, ticker: &str) -> Result<Vec<String>, ProviderError>;

    /// Contracts for one expiration matching the query filters.
    async fn get_options_chain(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        query: &OptionQuery,
    ) -> Result<Vec<OptionContract>, ProviderError>;

    /// Daily closes, oldest first, covering roughly `days` calendar days.
    async fn get_historical_prices(
        &self,
        ticker: &str,
        days: u32,
    ) -> Result<Vec<PricePoint>, ProviderError>;
}

// ============================================================================
// Earnings Calendar
// ============================================================================

/// Bulk earnings calendar.
#[async_trait]
pub trait EarningsCalendarProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every known report, past and scheduled.
    async fn get_earnings_calendar(&self) -> Result<Vec<EarningsEvent>, ProviderError>;
}

// ============================================================================
// Fundamentals
// ============================================================================

/// Company profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Sector,
    pub industry: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub avg_volume: Option<f64>,
}

/// Trailing-twelve-month ratios. Percent-valued fields are in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtmRatios {
    pub pe_ratio: Option<f64>,
    pub operating_margin: Option<f64>,
    pub roe: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub gross_margin: Option<f64>,
}

/// Latest annual cash flow figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashFlowSummary {
    pub free_cash_flow: Option<f64>,
    pub revenue: Option<f64>,
}

/// Bankruptcy and quality scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialScores {
    pub altman_z: Option<f64>,
    pub piotroski: Option<u8>,
}

/// Analyst rating distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystConsensus {
    pub strong_buy: u32,
    pub buy: u32,
    pub hold: u32,
    pub sell: u32,
    pub strong_sell: u32,
}

impl AnalystConsensus {
    /// Share of buy + strong-buy ratings in percent, `None` without ratings.
    pub fn buy_pct(&self) -> Option<f64> {
        let total = self.strong_buy + self.buy + self.hold + self.sell + self.strong_sell;
        if total == 0 {
            return None;
        }
        Some(f64::from(self.strong_buy + self.buy) / f64::from(total) * 100.0)
    }
}

/// Fundamentals source. Every call returns `None` / empty on unavailability.
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_profile(&self, ticker: &str) -> Result<Option<CompanyProfile>, ProviderError>;

    async fn get_ttm_ratios(&self, ticker: &str) -> Result<Option<TtmRatios>, ProviderError>;

    async fn get_cash_flow(&self, ticker: &str) -> Result<Option<CashFlowSummary>, ProviderError>;

    /// Annual revenue, oldest first.
    async fn get_revenue_history(&self, ticker: &str) -> Result<Vec<f64>, ProviderError>;

    /// Annual ROE in percent, oldest first.
    async fn get_roe_history(&self, ticker: &str) -> Result<Vec<f64>, ProviderError>;

    async fn get_financial_scores(
        &self,
        ticker: &str,
    ) -> Result<Option<FinancialScores>, ProviderError>;

    async fn get_analyst_consensus(
        &self,
        ticker: &str,
    ) -> Result<Option<AnalystConsensus>, ProviderError>;
}

pub type SharedMarketData = Arc<dyn MarketDataProvider>;
pub type SharedEarningsCalendar = Arc<dyn EarningsCalendarProvider>;
pub type SharedFundamentals = Arc<dyn FundamentalsProvider>;

// ============================================================================
// Tests
// ============================================================================
