//! Market data boundary.
//!
//! Typed records exchanged with the external data collaborators, the
//! provider traits they implement, and the plumbing around them:
//! - `provider`: quote / chain / history / calendar / fundamentals traits
//! - `mapping`: fallible conversion of raw provider rows into typed records
//! - `cache`: TTL cache with an injected clock
//! - `rate_limiter`: global minimum-interval gate
//! - `fetcher`: gated provider decorator and bounded batch quote fetch

pub mod cache;
pub mod fetcher;
pub mod mapping;
pub mod provider;
pub mod rate_limiter;

pub use cache::{CacheStats, TtlCache};
pub use fetcher::{fetch_quotes_batch, BatchOutcome, GatedMarketData};
pub use mapping::{map_earnings_events, map_option_rows, RawEarningsEvent, RawOptionRow};
pub use provider::{
    AnalystConsensus, CashFlowSummary, CompanyProfile, EarningsCalendarProvider, FinancialScores,
    FundamentalsProvider, MarketDataProvider, ProviderError, SharedEarningsCalendar,
    SharedFundamentals, SharedMarketData, TtmRatios,
};
pub use rate_limiter::{MinIntervalGate, SharedGate};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Date format used by option expirations and earnings calendars.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Sector
// ============================================================================

/// Market sector classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sector {
    #[serde(rename = "Technology", alias = "Information Technology")]
    Technology,
    #[serde(rename = "Healthcare", alias = "Health Care")]
    Healthcare,
    #[serde(rename = "Financial Services", alias = "Financials")]
    FinancialServices,
    #[serde(rename = "Consumer Defensive", alias = "Consumer Staples")]
    ConsumerDefensive,
    #[serde(rename = "Consumer Cyclical", alias = "Consumer Discretionary")]
    ConsumerCyclical,
    #[serde(rename = "Communication Services")]
    CommunicationServices,
    #[serde(rename = "Industrials")]
    Industrials,
    #[serde(rename = "Energy")]
    Energy,
    #[serde(rename = "Basic Materials", alias = "Materials")]
    BasicMaterials,
    #[serde(rename = "Utilities")]
    Utilities,
    #[serde(rename = "Real Estate")]
    RealEstate,
    #[serde(rename = "ETF")]
    Etf,
}

impl Sector {
    pub const ALL: [Sector; 12] = [
        Sector::Technology,
        Sector::Healthcare,
        Sector::FinancialServices,
        Sector::ConsumerDefensive,
        Sector::ConsumerCyclical,
        Sector::CommunicationServices,
        Sector::Industrials,
        Sector::Energy,
        Sector::BasicMaterials,
        Sector::Utilities,
        Sector::RealEstate,
        Sector::Etf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "Technology",
            Self::Healthcare => "Healthcare",
            Self::FinancialServices => "Financial Services",
            Self::ConsumerDefensive => "Consumer Defensive",
            Self::ConsumerCyclical => "Consumer Cyclical",
            Self::CommunicationServices => "Communication Services",
            Self::Industrials => "Industrials",
            Self::Energy => "Energy",
            Self::BasicMaterials => "Basic Materials",
            Self::Utilities => "Utilities",
            Self::RealEstate => "Real Estate",
            Self::Etf => "ETF",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sector {
    type Err = ProviderError;

    /// Accepts canonical names and the common GICS-style aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let sector = match normalized.as_str() {
            "technology" | "information technology" | "tech" => Self::Technology,
            "healthcare" | "health care" => Self::Healthcare,
            "financial services" | "financials" | "financial" => Self::FinancialServices,
            "consumer defensive" | "consumer staples" => Self::ConsumerDefensive,
            "consumer cyclical" | "consumer discretionary" => Self::ConsumerCyclical,
            "communication services" | "telecommunication services" => {
                Self::CommunicationServices
            }
            "industrials" => Self::Industrials,
            "energy" => Self::Energy,
            "basic materials" | "materials" => Self::BasicMaterials,
            "utilities" => Self::Utilities,
            "real estate" => Self::RealEstate,
            "etf" => Self::Etf,
            _ => return Err(ProviderError::Malformed(format!("unknown sector '{}'", s))),
        };
        Ok(sector)
    }
}

// ============================================================================
// Quotes and History
// ============================================================================

/// Latest stock quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
}

/// One daily close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub volume: f64,
}

// ============================================================================
// Options
// ============================================================================

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Put,
    Call,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => write!(f, "PUT"),
            Self::Call => write!(f, "CALL"),
        }
    }
}

impl FromStr for OptionType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUT" | "P" => Ok(Self::Put),
            "CALL" | "C" => Ok(Self::Call),
            other => Err(ProviderError::Malformed(format!("unknown option type '{}'", other))),
        }
    }
}

/// A single listed option contract.
///
/// Strike is always positive and `bid <= ask` when both are present; the
/// mapping step rejects rows that break either rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub code: String,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub option_type: OptionType,
    /// Signed delta as reported (puts negative). `None` when the feed omits it.
    pub delta: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub volume: u64,
    pub open_interest: u64,
    /// Implied volatility as a decimal (0.35 = 35%).
    pub implied_volatility: Option<f64>,
}

impl OptionContract {
    /// Bid usable for selling premium.
    pub fn valid_bid(&self) -> Option<f64> {
        self.bid.filter(|b| b.is_finite() && *b > 0.0)
    }
}

/// Filters forwarded to the option-chain collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionQuery {
    pub option_type: Option<OptionType>,
    pub delta_min: Option<f64>,
    pub delta_max: Option<f64>,
    pub volume_min: Option<u64>,
    pub open_interest_min: Option<u64>,
}

impl OptionQuery {
    /// Every put on the expiration.
    pub fn puts() -> Self {
        Self {
            option_type: Some(OptionType::Put),
            ..Default::default()
        }
    }

    /// Puts whose signed delta lies in `[delta_min, delta_max]`.
    pub fn puts_in_delta(delta_min: f64, delta_max: f64) -> Self {
        Self {
            option_type: Some(OptionType::Put),
            delta_min: Some(delta_min),
            delta_max: Some(delta_max),
            ..Default::default()
        }
    }
}

// ============================================================================
// Earnings
// ============================================================================

/// One earnings report on the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsEvent {
    pub ticker: String,
    pub date: NaiveDate,
}

/// Most recent and next known report dates for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EarningsInfo {
    pub last_earnings: Option<NaiveDate>,
    pub next_earnings: Option<NaiveDate>,
}

// ============================================================================
// Expiration helpers
// ============================================================================

/// Parse a `YYYY-MM-DD` expiration string.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Calendar days from `today` to `expiration`.
pub fn days_to_expiration(expiration: NaiveDate, today: NaiveDate) -> i64 {
    (expiration - today).num_days()
}

/// Keep expirations whose DTE lies in `[dte_min, dte_max]`, in input order.
pub fn filter_expirations_by_dte(
    expirations: &[String],
    dte_min: i64,
    dte_max: i64,
    today: NaiveDate,
) -> Vec<(NaiveDate, i64)> {
    expirations
        .iter()
        .filter_map(|raw| {
            let date = parse_date(raw);
            if date.is_none() {
                debug!(expiration = %raw, "Skipping unparseable expiration");
            }
            date
        })
        .map(|date| (date, days_to_expiration(date, today)))
        .filter(|(_, dte)| (dte_min..=dte_max).contains(dte))
        .collect()
}
