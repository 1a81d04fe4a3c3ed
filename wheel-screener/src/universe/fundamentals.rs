//! Per-stock fundamentals snapshot and its assembly from providers.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use tracing::{debug, warn};

use crate::data::{FundamentalsProvider, ProviderError, Sector};

// ============================================================================
// Snapshot
// ============================================================================

/// Fundamentals for one stock. Percent-valued ratios are in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFundamentals {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Sector,
    pub industry: Option<String>,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub avg_volume: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub operating_margin: Option<f64>,
    pub roe: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub gross_margin: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub fcf_margin: Option<f64>,
    /// Multi-year revenue CAGR in percent
    pub revenue_cagr: Option<f64>,
    /// Population std of year-over-year revenue growth, percent
    pub revenue_volatility: Option<f64>,
    pub roe_avg: Option<f64>,
    pub roe_std: Option<f64>,
    /// Bankruptcy-safety score (Altman Z)
    pub altman_z: Option<f64>,
    /// Quality ordinal (Piotroski F, 0-9)
    pub piotroski: Option<u8>,
    pub analyst_buy_pct: Option<f64>,
}

impl StockFundamentals {
    pub fn new(ticker: &str, sector: Sector) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            name: None,
            sector,
            industry: None,
            price: None,
            market_cap: None,
            avg_volume: None,
            pe_ratio: None,
            operating_margin: None,
            roe: None,
            current_ratio: None,
            debt_to_equity: None,
            gross_margin: None,
            free_cash_flow: None,
            fcf_margin: None,
            revenue_cagr: None,
            revenue_volatility: None,
            roe_avg: None,
            roe_std: None,
            altman_z: None,
            piotroski: None,
            analyst_buy_pct: None,
        }
    }

    pub fn has_advanced_data(&self) -> bool {
        self.altman_z.is_some()
    }

    pub fn is_biotech(&self) -> bool {
        self.sector == Sector::Healthcare
            && self
                .industry
                .as_deref()
                .is_some_and(|i| i.to_ascii_lowercase().contains("biotechnology"))
    }

    pub fn metric(&self, metric: Metric) -> Option<f64> {
        let value = match metric {
            Metric::PeRatio => self.pe_ratio,
            Metric::OperatingMargin => self.operating_margin,
            Metric::Roe => self.roe,
            Metric::CurrentRatio => self.current_ratio,
            Metric::DebtToEquity => self.debt_to_equity,
            Metric::GrossMargin => self.gross_margin,
            Metric::FcfMargin => self.fcf_margin,
            Metric::AvgVolume => self.avg_volume,
        };
        value.filter(|v| v.is_finite())
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Scalar metrics read by the data-quality and scoring stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    PeRatio,
    OperatingMargin,
    Roe,
    CurrentRatio,
    DebtToEquity,
    GrossMargin,
    FcfMargin,
    AvgVolume,
}

impl Metric {
    /// Metrics that must be present on most rows before scoring.
    pub const COMPLETENESS: [Metric; 6] = [
        Metric::OperatingMargin,
        Metric::Roe,
        Metric::CurrentRatio,
        Metric::DebtToEquity,
        Metric::GrossMargin,
        Metric::AvgVolume,
    ];

    /// Metrics screened for outliers, in removal order.
    pub const OUTLIER_CHECKED: [Metric; 6] = [
        Metric::PeRatio,
        Metric::OperatingMargin,
        Metric::Roe,
        Metric::CurrentRatio,
        Metric::DebtToEquity,
        Metric::GrossMargin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeRatio => "pe_ratio",
            Self::OperatingMargin => "operating_margin",
            Self::Roe => "roe",
            Self::CurrentRatio => "current_ratio",
            Self::DebtToEquity => "debt_to_equity",
            Self::GrossMargin => "gross_margin",
            Self::FcfMargin => "fcf_margin",
            Self::AvgVolume => "avg_volume",
        }
    }

    /// Balance-sheet ratios that mean little for banks.
    pub fn exempts_financials(&self) -> bool {
        matches!(self, Self::CurrentRatio | Self::DebtToEquity)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Derived history metrics
// ============================================================================

/// Revenue CAGR and growth volatility from annual revenue, oldest first.
///
/// Non-positive years are dropped; at least three remaining years are
/// needed for a CAGR and two growth rates for a volatility.
pub fn revenue_trend(revenues: &[f64]) -> (Option<f64>, Option<f64>) {
    let clean: Vec<f64> = revenues
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
        .collect();
    if clean.len() < 3 {
        return (None, None);
    }

    let years = (clean.len() - 1) as f64;
    let first = clean[0];
    let last = clean[clean.len() - 1];
    let cagr = ((last / first).powf(1.0 / years) - 1.0) * 100.0;

    let growth: Vec<f64> = clean.windows(2).map(|w| (w[1] / w[0] - 1.0) * 100.0).collect();
    let volatility = (growth.len() >= 2).then(|| growth.iter().population_std_dev());

    (Some(cagr), volatility)
}

/// Average and population std of up to the last five annual ROE values.
///
/// Values at or below -100% are treated as bad data.
pub fn roe_consistency(history: &[f64]) -> (Option<f64>, Option<f64>) {
    let clean: Vec<f64> = history
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > -100.0)
        .collect();
    let recent = &clean[clean.len().saturating_sub(5)..];
    if recent.len() < 3 {
        return (None, None);
    }
    (Some(recent.mean()), Some(recent.population_std_dev()))
}

// ============================================================================
// Raw rows
// ============================================================================

/// Flat fundamentals row as exported by screener-style providers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFundamentalsRow {
    #[serde(default, alias = "symbol", alias = "Ticker")]
    pub ticker: Option<String>,
    #[serde(default, alias = "companyName", alias = "Company")]
    pub name: Option<String>,
    #[serde(default, alias = "Sector")]
    pub sector: Option<String>,
    #[serde(default, alias = "Industry")]
    pub industry: Option<String>,
    #[serde(default, alias = "Price")]
    pub price: Option<f64>,
    #[serde(default, alias = "marketCap", alias = "Market Cap")]
    pub market_cap: Option<f64>,
    #[serde(default, alias = "avgVolume", alias = "Avg Volume")]
    pub avg_volume: Option<f64>,
    #[serde(default, alias = "peRatio", alias = "P/E")]
    pub pe_ratio: Option<f64>,
    #[serde(default, alias = "operatingMargin", alias = "Oper M")]
    pub operating_margin: Option<f64>,
    #[serde(default, alias = "ROE")]
    pub roe: Option<f64>,
    #[serde(default, alias = "currentRatio", alias = "Curr R")]
    pub current_ratio: Option<f64>,
    #[serde(default, alias = "debtToEquity", alias = "Debt/Eq")]
    pub debt_to_equity: Option<f64>,
    #[serde(default, alias = "grossMargin", alias = "Gross M")]
    pub gross_margin: Option<f64>,
    #[serde(default, alias = "freeCashFlow", alias = "FCF")]
    pub free_cash_flow: Option<f64>,
    #[serde(default, alias = "fcfMargin", alias = "FCF_Margin")]
    pub fcf_margin: Option<f64>,
    #[serde(default, alias = "altmanZ", alias = "Altman_Z")]
    pub altman_z: Option<f64>,
    #[serde(default, alias = "piotroskiScore", alias = "Piotroski")]
    pub piotroski: Option<f64>,
    #[serde(default, alias = "analystBuyPct", alias = "Analyst_Buy_Pct")]
    pub analyst_buy_pct: Option<f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl RawFundamentalsRow {
    /// Convert into a snapshot. Ticker and a recognised sector are required.
    pub fn into_fundamentals(self) -> Result<StockFundamentals, ProviderError> {
        let ticker = self
            .ticker
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::Malformed("fundamentals row without ticker".into()))?;

        let sector: Sector = self
            .sector
            .as_deref()
            .ok_or_else(|| ProviderError::Malformed(format!("{}: missing sector", ticker)))?
            .parse()?;

        let mut row = StockFundamentals::new(&ticker, sector);
        row.name = self.name;
        row.industry = self.industry;
        row.price = finite(self.price);
        row.market_cap = finite(self.market_cap);
        row.avg_volume = finite(self.avg_volume);
        row.pe_ratio = finite(self.pe_ratio);
        row.operating_margin = finite(self.operating_margin);
        row.roe = finite(self.roe);
        row.current_ratio = finite(self.current_ratio);
        row.debt_to_equity = finite(self.debt_to_equity);
        row.gross_margin = finite(self.gross_margin);
        row.free_cash_flow = finite(self.free_cash_flow);
        row.fcf_margin = finite(self.fcf_margin);
        row.altman_z = finite(self.altman_z);
        row.piotroski = finite(self.piotroski).map(|p| p.clamp(0.0, 9.0).round() as u8);
        row.analyst_buy_pct = finite(self.analyst_buy_pct);
        Ok(row)
    }
}

/// Map raw rows, dropping the malformed ones with a warning.
pub fn map_fundamentals_rows(rows: Vec<RawFundamentalsRow>) -> Vec<StockFundamentals> {
    rows.into_iter()
        .filter_map(|row| match row.into_fundamentals() {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(error = %e, "Dropping fundamentals row");
                None
            }
        })
        .collect()
}

// ============================================================================
// Provider assembly
// ============================================================================

/// Result of assembling fundamentals for many tickers.
#[derive(Debug, Default)]
pub struct FundamentalsBatch {
    pub rows: Vec<StockFundamentals>,
    /// Tickers without a profile
    pub missing: Vec<String>,
    pub failures: Vec<(String, ProviderError)>,
}

fn soft<T: Default>(ticker: &str, what: &str, result: Result<T, ProviderError>) -> T {
    result.unwrap_or_else(|e| {
        warn!(ticker = %ticker, error = %e, "{} unavailable", what);
        T::default()
    })
}

/// Assemble one snapshot. Only a missing or failed profile is fatal.
pub async fn fetch_fundamentals(
    provider: &dyn FundamentalsProvider,
    ticker: &str,
) -> Result<Option<StockFundamentals>, ProviderError> {
    let Some(profile) = provider.get_profile(ticker).await? else {
        return Ok(None);
    };

    let ratios = soft(ticker, "TTM ratios", provider.get_ttm_ratios(ticker).await).unwrap_or_default();
    let cash = soft(ticker, "Cash flow", provider.get_cash_flow(ticker).await).unwrap_or_default();
    let revenues = soft(ticker, "Revenue history", provider.get_revenue_history(ticker).await);
    let roe_history = soft(ticker, "ROE history", provider.get_roe_history(ticker).await);
    let scores =
        soft(ticker, "Financial scores", provider.get_financial_scores(ticker).await).unwrap_or_default();
    let consensus = soft(ticker, "Analyst consensus", provider.get_analyst_consensus(ticker).await);

    let mut row = StockFundamentals::new(&profile.ticker, profile.sector);
    row.name = profile.name;
    row.industry = profile.industry;
    row.price = profile.price;
    row.market_cap = profile.market_cap;
    row.avg_volume = profile.avg_volume;
    row.pe_ratio = ratios.pe_ratio;
    row.operating_margin = ratios.operating_margin;
    row.roe = ratios.roe;
    row.current_ratio = ratios.current_ratio;
    row.debt_to_equity = ratios.debt_to_equity;
    row.gross_margin = ratios.gross_margin;
    row.free_cash_flow = cash.free_cash_flow;
    row.fcf_margin = match (cash.free_cash_flow, cash.revenue) {
        (Some(fcf), Some(revenue)) if revenue > 0.0 => Some(fcf * 100.0 / revenue),
        (Some(_), Some(_)) => Some(0.0),
        _ => None,
    };
    (row.revenue_cagr, row.revenue_volatility) = revenue_trend(&revenues);
    (row.roe_avg, row.roe_std) = roe_consistency(&roe_history);
    row.altman_z = scores.altman_z;
    row.piotroski = scores.piotroski;
    row.analyst_buy_pct = consensus.and_then(|c| c.buy_pct());

    Ok(Some(row))
}

/// Assemble snapshots with at most `concurrency` tickers in flight.
pub async fn fetch_fundamentals_batch(
    provider: &dyn FundamentalsProvider,
    tickers: &[String],
    concurrency: usize,
) -> FundamentalsBatch {
    let requests = tickers.iter().map(|ticker| async move {
        let result = fetch_fundamentals(provider, ticker).await;
        (ticker.clone(), result)
    });

    let mut results = stream::iter(requests)
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut batch = FundamentalsBatch::default();
    for (ticker, result) in results {
        match result {
            Ok(Some(row)) => batch.rows.push(row),
            Ok(None) => {
                debug!(ticker = %ticker, "No profile");
                batch.missing.push(ticker);
            }
            Err(e) => {
                warn!(
                    ticker = %ticker,
                    error = %e,
                    recoverable = e.is_recoverable(),
                    "Fundamentals fetch failed"
                );
                batch.failures.push((ticker, e));
            }
        }
    }

    debug!(
        provider = provider.name(),
        requested = tickers.len(),
        fetched = batch.rows.len(),
        "Fundamentals batch complete"
    );
    batch
}
