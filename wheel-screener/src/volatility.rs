//! Volatility analytics: historical volatility, IV rank and term structure.
//!
//! No true IV history is available from the option feed, so the 52-week IV
//! range is approximated by the range of a rolling 20-day historical
//! volatility series. Current IV comes from the at-the-money contract of
//! the target expiration.
//!
//! Volatilities are decimals internally (0.35 = 35%) and percent with one
//! decimal in [`VolatilityProfile`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::VolatilityConfig;
use crate::data::{
    parse_date, OptionContract, OptionQuery, ProviderError, SharedMarketData, TtlCache,
};
use crate::numeric::round_dp;

// ============================================================================
// Types
// ============================================================================

/// Relative IV of back vs front month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TermStructure {
    /// Back month richer than front: favorable for premium sellers
    Contango,
    /// Front month richer than back: stress priced in
    Backwardation,
    Neutral,
    Unknown,
}

impl fmt::Display for TermStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contango => write!(f, "CONTANGO"),
            Self::Backwardation => write!(f, "BACKWARDATION"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Term-structure classification with its spread and advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermStructureAnalysis {
    pub structure: TermStructure,
    /// Back IV minus front IV, in percentage points (2 dp)
    pub diff_pct: f64,
    pub recommendation: String,
}

/// Approximate 52-week IV range (decimals).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvRange {
    pub low: f64,
    pub high: f64,
}

/// Everything derived from one price-history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistoryStats {
    /// Latest trailing-window HV
    pub hv_current: Option<f64>,
    pub range: Option<IvRange>,
}

/// Per-ticker volatility snapshot, reported in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityProfile {
    pub ticker: String,
    pub expiration: NaiveDate,
    pub current_iv: Option<f64>,
    pub iv_52w_low: Option<f64>,
    pub iv_52w_high: Option<f64>,
    pub iv_rank: Option<f64>,
    pub hv_20: Option<f64>,
    /// Current IV minus HV, in points; positive means IV is rich
    pub iv_hv_spread: Option<f64>,
    pub term_structure: TermStructure,
    pub term_structure_diff: Option<f64>,
    pub term_structure_recommendation: String,
}

impl VolatilityProfile {
    /// Profile with every metric unknown.
    pub fn unknown(ticker: &str, expiration: NaiveDate) -> Self {
        let term = classify_term_structure(None, None, 0.0);
        Self {
            ticker: ticker.to_string(),
            expiration,
            current_iv: None,
            iv_52w_low: None,
            iv_52w_high: None,
            iv_rank: None,
            hv_20: None,
            iv_hv_spread: None,
            term_structure: term.structure,
            term_structure_diff: None,
            term_structure_recommendation: term.recommendation,
        }
    }
}

// ============================================================================
// Pure calculations
// ============================================================================

/// Close-to-close log returns. Non-positive closes are skipped.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    let clean: Vec<f64> = closes
        .iter()
        .copied()
        .filter(|c| c.is_finite() && *c > 0.0)
        .collect();
    clean.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// Annualised sample standard deviation of the last `window` log returns.
///
/// Needs at least `window + 1` closes.
pub fn historical_volatility(closes: &[f64], window: usize, periods_per_year: f64) -> Option<f64> {
    let returns = log_returns(closes);
    if window < 2 || returns.len() < window {
        return None;
    }
    let tail = &returns[returns.len() - window..];
    let std = tail.iter().copied().std_dev();
    std.is_finite().then(|| std * periods_per_year.sqrt())
}

/// Rolling annualised HV, one point per full window of returns.
pub fn rolling_hv(closes: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    if window < 2 {
        return Vec::new();
    }
    let annualise = periods_per_year.sqrt();
    log_returns(closes)
        .windows(window)
        .map(|w| w.iter().copied().std_dev() * annualise)
        .filter(|v| v.is_finite())
        .collect()
}

impl HistoryStats {
    pub fn from_closes(closes: &[f64], config: &VolatilityConfig) -> Self {
        let hv_current =
            historical_volatility(closes, config.hv_window, config.trading_days_per_year);

        let range = if closes.len() < config.min_prices {
            None
        } else {
            let series = rolling_hv(closes, config.hv_window, config.trading_days_per_year);
            if series.len() < config.min_hv_points {
                None
            } else {
                let low = series.iter().copied().fold(f64::INFINITY, f64::min);
                let high = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Some(IvRange { low, high })
            }
        };

        Self { hv_current, range }
    }
}

/// IV rank in percent, one decimal.
///
/// A degenerate range yields exactly 50.0. Values above the range high
/// exceed 100; values below the range low floor at 0.
pub fn calculate_iv_rank(current_iv: f64, range_low: f64, range_high: f64) -> f64 {
    if range_high == range_low {
        return 50.0;
    }
    let rank = (current_iv - range_low) / (range_high - range_low) * 100.0;
    round_dp(rank.max(0.0), 1)
}

/// IV of the contract whose strike is closest to spot.
///
/// `None` when the chain is empty or the ATM contract carries no IV.
pub fn atm_implied_volatility(chain: &[OptionContract], spot: f64) -> Option<f64> {
    let atm = chain.iter().min_by(|a, b| {
        let da = (a.strike - spot).abs();
        let db = (b.strike - spot).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    })?;
    atm.implied_volatility.filter(|iv| *iv > 0.0)
}

/// Classify front/back IVs (decimals) against a threshold in points.
pub fn classify_term_structure(
    front_iv: Option<f64>,
    back_iv: Option<f64>,
    threshold_pts: f64,
) -> TermStructureAnalysis {
    let (front, back) = match (front_iv, back_iv) {
        (Some(f), Some(b)) => (f, b),
        _ => {
            return TermStructureAnalysis {
                structure: TermStructure::Unknown,
                diff_pct: 0.0,
                recommendation: "Could not determine term structure".to_string(),
            }
        }
    };

    let diff_pct = (back - front) * 100.0;
    let (structure, recommendation) = if diff_pct > threshold_pts {
        (TermStructure::Contango, "FAVORABLE - Proceed with trade")
    } else if diff_pct < -threshold_pts {
        (TermStructure::Backwardation, "UNFAVORABLE - Wait or reduce size")
    } else {
        (TermStructure::Neutral, "NEUTRAL - Use other factors to decide")
    };

    TermStructureAnalysis {
        structure,
        diff_pct: round_dp(diff_pct, 2),
        recommendation: recommendation.to_string(),
    }
}

/// First listed expiration at least `offset_days` after `target`.
pub fn back_month_expiration(
    expirations: &[String],
    target: NaiveDate,
    offset_days: i64,
) -> Option<NaiveDate> {
    let threshold = target + Duration::days(offset_days);
    expirations
        .iter()
        .filter_map(|e| parse_date(e))
        .filter(|d| *d >= threshold)
        .min()
}

/// Advisory IV-rank gate. An unknown rank passes and asks for a manual check.
pub fn passes_iv_filter(iv_rank: Option<f64>, min_iv_rank: f64) -> (bool, String) {
    match iv_rank {
        None => (true, "IV Rank unavailable - manual check required".to_string()),
        Some(rank) if rank >= min_iv_rank => (
            true,
            format!("IV Rank {:.1}% >= {}% threshold", rank, min_iv_rank),
        ),
        Some(rank) => (
            false,
            format!("IV Rank {:.1}% < {}% threshold", rank, min_iv_rank),
        ),
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Provider-backed volatility analytics with a per-ticker history cache.
pub struct VolatilityAnalyzer {
    provider: SharedMarketData,
    config: VolatilityConfig,
    /// Keyed by ticker only; the 52-week range moves slowly
    cache: TtlCache<String, HistoryStats>,
}

impl VolatilityAnalyzer {
    pub fn new(provider: SharedMarketData, config: VolatilityConfig, clock: SharedClock) -> Self {
        let ttl = Duration::days(config.cache_ttl_days);
        Self {
            provider,
            config,
            cache: TtlCache::new("volatility", ttl, clock),
        }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// HV and IV range for a ticker, read-through cached.
    ///
    /// Only complete results (range available) are cached.
    pub async fn history_stats(&self, ticker: &str) -> Result<HistoryStats, ProviderError> {
        if let Some(stats) = self.cache.get(ticker) {
            debug!(ticker = %ticker, "Volatility cache hit");
            return Ok(stats);
        }

        let prices = self
            .provider
            .get_historical_prices(ticker, self.config.lookback_days)
            .await?;
        let closes: Vec<f64> = prices.iter().map(|p| p.close).collect();
        let stats = HistoryStats::from_closes(&closes, &self.config);

        if stats.range.is_some() {
            self.cache.insert(ticker.to_string(), stats);
        } else {
            debug!(ticker = %ticker, closes = closes.len(), "Not enough history for IV range");
        }

        Ok(stats)
    }

    pub async fn get_iv_range(&self, ticker: &str) -> Result<Option<IvRange>, ProviderError> {
        Ok(self.history_stats(ticker).await?.range)
    }

    pub async fn historical_volatility(&self, ticker: &str) -> Result<Option<f64>, ProviderError> {
        Ok(self.history_stats(ticker).await?.hv_current)
    }

    /// ATM implied volatility for an expiration.
    pub async fn get_current_iv(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        spot: f64,
    ) -> Result<Option<f64>, ProviderError> {
        let chain = self
            .provider
            .get_options_chain(ticker, expiration, &OptionQuery::puts())
            .await?;
        Ok(atm_implied_volatility(&chain, spot))
    }

    /// IV rank for a known current IV.
    pub async fn iv_rank_for(
        &self,
        ticker: &str,
        current_iv: f64,
    ) -> Result<Option<f64>, ProviderError> {
        Ok(self
            .get_iv_range(ticker)
            .await?
            .map(|r| calculate_iv_rank(current_iv, r.low, r.high)))
    }

    /// IV rank from the ATM contract of `expiration`, spot from a fresh quote.
    pub async fn get_iv_rank(
        &self,
        ticker: &str,
        expiration: NaiveDate,
    ) -> Result<Option<f64>, ProviderError> {
        let spot = match self.provider.get_stock_quote(ticker).await? {
            Some(quote) => quote.price,
            None => return Ok(None),
        };
        match self.get_current_iv(ticker, expiration, spot).await? {
            Some(iv) => self.iv_rank_for(ticker, iv).await,
            None => Ok(None),
        }
    }

    /// Compare ATM IV of two expirations.
    pub async fn analyze_term_structure(
        &self,
        ticker: &str,
        front: NaiveDate,
        back: NaiveDate,
        spot: f64,
    ) -> Result<TermStructureAnalysis, ProviderError> {
        let front_iv = self.get_current_iv(ticker, front, spot).await?;
        let back_iv = self.get_current_iv(ticker, back, spot).await?;
        Ok(classify_term_structure(
            front_iv,
            back_iv,
            self.config.term_structure_threshold,
        ))
    }

    /// Full profile for a ticker and target expiration.
    ///
    /// Provider failures degrade the affected fields to unknown instead of
    /// failing the ticker.
    pub async fn analyze(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        spot: f64,
        expirations: &[String],
    ) -> VolatilityProfile {
        let mut profile = VolatilityProfile::unknown(ticker, expiration);

        let current_iv = match self.get_current_iv(ticker, expiration, spot).await {
            Ok(iv) => iv,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Current IV unavailable");
                None
            }
        };

        let stats = match self.history_stats(ticker).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Price history unavailable");
                HistoryStats::default()
            }
        };

        profile.current_iv = current_iv.map(|iv| round_dp(iv * 100.0, 1));
        if let Some(range) = stats.range {
            profile.iv_52w_low = Some(round_dp(range.low * 100.0, 1));
            profile.iv_52w_high = Some(round_dp(range.high * 100.0, 1));
            profile.iv_rank = current_iv.map(|iv| calculate_iv_rank(iv, range.low, range.high));
        }
        if let Some(hv) = stats.hv_current {
            profile.hv_20 = Some(round_dp(hv * 100.0, 1));
            profile.iv_hv_spread = current_iv.map(|iv| round_dp((iv - hv) * 100.0, 1));
        }

        if let Some(back) =
            back_month_expiration(expirations, expiration, self.config.back_month_offset_days)
        {
            let back_iv = match self.get_current_iv(ticker, back, spot).await {
                Ok(iv) => iv,
                Err(e) => {
                    warn!(ticker = %ticker, back = %back, error = %e, "Back-month IV unavailable");
                    None
                }
            };
            let term =
                classify_term_structure(current_iv, back_iv, self.config.term_structure_threshold);
            profile.term_structure_diff =
                (term.structure != TermStructure::Unknown).then_some(term.diff_pct);
            profile.term_structure = term.structure;
            profile.term_structure_recommendation = term.recommendation;
        }

        debug!(
            ticker = %ticker,
            iv = ?profile.current_iv,
            iv_rank = ?profile.iv_rank,
            term = %profile.term_structure,
            "Volatility profile"
        );

        profile
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> crate::data::CacheStats {
        self.cache.stats()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::OptionType;
    use proptest::prelude::*;

    fn contract(strike: f64, iv: Option<f64>) -> OptionContract {
        OptionContract {
            code: format!("P{}", strike),
            strike,
            expiration: NaiveDate::from_ymd_opt(2026, 4, 17).unwrap(),
            option_type: OptionType::Put,
            delta: None,
            bid: Some(1.0),
            ask: Some(1.1),
            last_price: None,
            volume: 0,
            open_interest: 0,
            implied_volatility: iv,
        }
    }

    fn alternating(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect()
    }

    #[test]
    fn test_degenerate_range_is_fifty() {
        assert_eq!(calculate_iv_rank(0.30, 0.30, 0.30), 50.0);
        assert_eq!(calculate_iv_rank(0.45, 0.30, 0.30), 50.0);
    }

    #[test]
    fn test_iv_rank_values() {
        assert_eq!(calculate_iv_rank(0.25, 0.20, 0.40), 25.0);
        assert_eq!(calculate_iv_rank(0.50, 0.20, 0.40), 150.0);
        assert_eq!(calculate_iv_rank(0.10, 0.20, 0.40), 0.0);
    }

    #[test]
    fn test_historical_volatility_needs_window_plus_one() {
        let closes = alternating(20);
        assert!(historical_volatility(&closes, 20, 252.0).is_none());

        let closes = alternating(21);
        let hv = historical_volatility(&closes, 20, 252.0).unwrap();
        let a = (101.0f64 / 100.0).ln();
        let expected = a * (20.0f64 / 19.0).sqrt() * 252f64.sqrt();
        assert!((hv - expected).abs() < 1e-9, "hv {} vs {}", hv, expected);
    }

    #[test]
    fn test_constant_growth_has_zero_hv() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let hv = historical_volatility(&closes, 20, 252.0).unwrap();
        assert!(hv.abs() < 1e-9);
    }

    #[test]
    fn test_history_stats_thresholds() {
        let config = VolatilityConfig::default();

        // 29 closes: HV computable, range not
        let stats = HistoryStats::from_closes(&alternating(29), &config);
        assert!(stats.hv_current.is_some());
        assert!(stats.range.is_none());

        // 30 closes give only 10 rolling points
        let stats = HistoryStats::from_closes(&alternating(30), &config);
        assert!(stats.range.is_none());

        // 40 closes give exactly 20 rolling points
        let stats = HistoryStats::from_closes(&alternating(40), &config);
        let range = stats.range.unwrap();
        assert!(range.low <= range.high);
    }

    #[test]
    fn test_atm_iv_uses_closest_strike() {
        let chain = vec![
            contract(95.0, Some(0.30)),
            contract(100.0, Some(0.28)),
            contract(105.0, Some(0.26)),
        ];
        assert_eq!(atm_implied_volatility(&chain, 101.0), Some(0.28));

        let chain = vec![contract(100.0, None), contract(110.0, Some(0.3))];
        assert_eq!(atm_implied_volatility(&chain, 100.0), None);
        assert_eq!(atm_implied_volatility(&[], 100.0), None);
    }

    #[test]
    fn test_term_structure_classification() {
        let c = classify_term_structure(Some(0.25), Some(0.28), 2.0);
        assert_eq!(c.structure, TermStructure::Contango);
        assert_eq!(c.diff_pct, 3.0);
        assert_eq!(c.recommendation, "FAVORABLE - Proceed with trade");

        let b = classify_term_structure(Some(0.30), Some(0.27), 2.0);
        assert_eq!(b.structure, TermStructure::Backwardation);

        let n = classify_term_structure(Some(0.30), Some(0.31), 2.0);
        assert_eq!(n.structure, TermStructure::Neutral);
        assert_eq!(n.recommendation, "NEUTRAL - Use other factors to decide");

        let u = classify_term_structure(Some(0.30), None, 2.0);
        assert_eq!(u.structure, TermStructure::Unknown);
        assert_eq!(u.diff_pct, 0.0);
    }

    #[test]
    fn test_back_month_expiration() {
        let expirations: Vec<String> = ["2026-04-17", "2026-05-15", "2026-05-22", "2026-06-19"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let target = NaiveDate::from_ymd_opt(2026, 4, 17).unwrap();
        assert_eq!(
            back_month_expiration(&expirations, target, 30),
            NaiveDate::from_ymd_opt(2026, 5, 22)
        );
        assert_eq!(back_month_expiration(&expirations, target, 90), None);
    }

    #[test]
    fn test_passes_iv_filter() {
        let (ok, reason) = passes_iv_filter(None, 30.0);
        assert!(ok);
        assert_eq!(reason, "IV Rank unavailable - manual check required");

        assert!(passes_iv_filter(Some(30.0), 30.0).0);
        assert!(!passes_iv_filter(Some(29.9), 30.0).0);
    }

    proptest! {
        #[test]
        fn prop_iv_rank_is_non_negative(
            current in 0.0f64..3.0,
            low in 0.0f64..2.0,
            width in 0.0f64..2.0,
        ) {
            let rank = calculate_iv_rank(current, low, low + width);
            prop_assert!(rank >= 0.0);
            if width == 0.0 {
                prop_assert_eq!(rank, 50.0);
            }
        }
    }
}
