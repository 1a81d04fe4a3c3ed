//! Universe filtering funnel.
//!
//! Stages, in order:
//! 1. Data quality: completeness check (fatal) and IQR outlier removal
//! 2. Hard filters: size, price, valuation and sector-aware balance sheet floors
//! 3. Cash flow: positive FCF with a minimum margin
//! 4. Advanced: bankruptcy safety, quality ordinal and analyst sentiment
//!
//! Every stage reports a [`FilterResult`] so the caller can see where the
//! pool shrank.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use super::fundamentals::{Metric, StockFundamentals};
use crate::config::UniverseConfig;
use crate::data::Sector;
use crate::error::{Result, ScreenerError};

// ============================================================================
// Filter Stage
// ============================================================================

/// Funnel stage identifier for tracking where stocks are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStage {
    /// Raw input rows
    Input,
    /// Outlier removal
    DataQuality,
    /// Hard fundamental filters
    Hard,
    /// Free cash flow validation
    CashFlow,
    /// Bankruptcy / quality / sentiment floors
    Advanced,
    /// Diversified selection
    Selection,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::DataQuality => write!(f, "data quality"),
            Self::Hard => write!(f, "hard filters"),
            Self::CashFlow => write!(f, "cash flow"),
            Self::Advanced => write!(f, "advanced filters"),
            Self::Selection => write!(f, "selection"),
        }
    }
}

// ============================================================================
// Filter Result
// ============================================================================

/// Result of a filtering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub stage: FilterStage,
    /// Number of stocks that passed this stage
    pub passed: usize,
    /// Number of stocks eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

/// A stock removed by a filter, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub ticker: String,
    pub stage: FilterStage,
    pub reason: String,
}

/// A row dropped because one metric fell outside the IQR fences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierRemoval {
    pub ticker: String,
    pub metric: Metric,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

// ============================================================================
// Data quality
// ============================================================================

/// Linear-interpolated quantile of sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Fail when any metric is missing on more than `max_missing` of the rows.
pub fn check_completeness(
    rows: &[StockFundamentals],
    metrics: &[Metric],
    max_missing: f64,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    for metric in metrics {
        let missing = rows.iter().filter(|r| r.metric(*metric).is_none()).count();
        let missing_frac = missing as f64 / rows.len() as f64;
        if missing_frac > max_missing {
            warn!(
                metric = %metric,
                missing,
                total = rows.len(),
                "Completeness below threshold"
            );
            return Err(ScreenerError::SchemaMismatch {
                metric: metric.to_string(),
                missing_pct: missing_frac * 100.0,
                threshold_pct: max_missing * 100.0,
            });
        }
        debug!(metric = %metric, missing, "Completeness ok");
    }
    Ok(())
}

/// Drop rows outside `[Q1 - k*IQR, Q3 + k*IQR]`, metric by metric.
///
/// Each metric's fences are computed on the rows that survived the
/// previous metrics. Financial Services rows are left out of the
/// balance-sheet ratio distributions and never removed for them.
pub fn remove_outliers(
    rows: Vec<StockFundamentals>,
    multiplier: f64,
) -> (Vec<StockFundamentals>, Vec<OutlierRemoval>) {
    let mut rows = rows;
    let mut removed = Vec::new();

    for metric in Metric::OUTLIER_CHECKED {
        let in_scope = |row: &StockFundamentals| {
            !(metric.exempts_financials() && row.sector == Sector::FinancialServices)
        };

        let mut values: Vec<f64> = rows
            .iter()
            .filter(|r| in_scope(*r))
            .filter_map(|r| r.metric(metric))
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let (Some(q1), Some(q3)) = (quantile(&values, 0.25), quantile(&values, 0.75)) else {
            continue;
        };
        let iqr = q3 - q1;
        let lower = q1 - multiplier * iqr;
        let upper = q3 + multiplier * iqr;

        let before = removed.len();
        rows.retain(|row| {
            if !in_scope(row) {
                return true;
            }
            match row.metric(metric) {
                Some(value) if value < lower || value > upper => {
                    removed.push(OutlierRemoval {
                        ticker: row.ticker.clone(),
                        metric,
                        value,
                        lower,
                        upper,
                    });
                    false
                }
                _ => true,
            }
        });

        let dropped = removed.len() - before;
        if dropped > 0 {
            warn!(metric = %metric, dropped, lower, upper, "Removed outliers");
        }
    }

    (rows, removed)
}

// ============================================================================
// Universe Filter
// ============================================================================

/// Fundamental filters for the universe build.
pub struct UniverseFilter {
    config: UniverseConfig,
}

impl UniverseFilter {
    pub fn new(config: UniverseConfig) -> Self {
        Self { config }
    }

    fn partition<F>(
        &self,
        rows: Vec<StockFundamentals>,
        stage: FilterStage,
        reason_for: F,
    ) -> (Vec<StockFundamentals>, FilterResult, Vec<Exclusion>)
    where
        F: Fn(&StockFundamentals) -> Option<String>,
    {
        let input_count = rows.len();
        let mut passed = Vec::with_capacity(input_count);
        let mut excluded = Vec::new();

        for row in rows {
            match reason_for(&row) {
                Some(reason) => {
                    debug!(ticker = %row.ticker, stage = %stage, reason = %reason, "Excluded");
                    excluded.push(Exclusion {
                        ticker: row.ticker,
                        stage,
                        reason,
                    });
                }
                None => passed.push(row),
            }
        }

        let result = FilterResult::new(stage, input_count, passed.len());
        info!(
            stage = %stage,
            passed = result.passed,
            eliminated = result.eliminated,
            "Filter stage complete"
        );
        (passed, result, excluded)
    }

    // ========================================================================
    // Stage: Hard filters
    // ========================================================================

    pub fn filter_hard(
        &self,
        rows: Vec<StockFundamentals>,
    ) -> (Vec<StockFundamentals>, FilterResult, Vec<Exclusion>) {
        self.partition(rows, FilterStage::Hard, |row| self.hard_filter_reason(row))
    }

    /// Why `row` fails the hard filters, if it does.
    ///
    /// Size and price must be present. Missing ratios pass their checks.
    pub fn hard_filter_reason(&self, row: &StockFundamentals) -> Option<String> {
        let cfg = &self.config;
        let sector = row.sector;

        match row.market_cap {
            Some(cap) if cap >= cfg.min_market_cap => {}
            Some(cap) => return Some(format!("market cap ${:.1}B below floor", cap / 1e9)),
            None => return Some("market cap unavailable".to_string()),
        }

        match row.price {
            Some(p) if p >= cfg.price_min && p <= cfg.price_max => {}
            Some(p) => {
                return Some(format!(
                    "price ${:.2} outside ${:.0}-${:.0}",
                    p, cfg.price_min, cfg.price_max
                ))
            }
            None => return Some("price unavailable".to_string()),
        }

        if let Some(pe) = row.pe_ratio {
            let healthcare_exception = sector == Sector::Healthcare && pe < cfg.healthcare_pe_max;
            if pe > cfg.pe_max && !healthcare_exception {
                return Some(format!("P/E {:.1} above {:.0}", pe, cfg.pe_max));
            }
        }

        if let Some(om) = row.operating_margin {
            if om < cfg.operating_margin_min {
                return Some(format!("operating margin {:.1}% below {:.0}%", om, cfg.operating_margin_min));
            }
        }

        if let Some(roe) = row.roe {
            let floor = if sector == Sector::Utilities {
                cfg.utilities_roe_min
            } else {
                cfg.roe_min
            };
            if roe < floor {
                return Some(format!("ROE {:.1}% below {:.0}%", roe, floor));
            }
        }

        if let Some(cr) = row.current_ratio {
            let floor = match sector {
                Sector::FinancialServices => None,
                Sector::ConsumerDefensive | Sector::Utilities => Some(cfg.relaxed_current_ratio_min),
                _ => Some(cfg.current_ratio_min),
            };
            if let Some(floor) = floor.filter(|f| cr < *f) {
                return Some(format!("current ratio {:.2} below {:.1}", cr, floor));
            }
        }

        if let Some(de) = row.debt_to_equity {
            let ceiling = match sector {
                Sector::FinancialServices => None,
                Sector::ConsumerDefensive => Some(cfg.relaxed_debt_to_equity_max),
                _ => Some(cfg.debt_to_equity_max),
            };
            if let Some(ceiling) = ceiling.filter(|c| de > *c) {
                return Some(format!("debt/equity {:.2} above {:.1}", de, ceiling));
            }
        }

        if let Some(gm) = row.gross_margin {
            if gm < cfg.gross_margin_min {
                return Some(format!("gross margin {:.1}% below {:.0}%", gm, cfg.gross_margin_min));
            }
        }

        if cfg.exclude_biotech && row.is_biotech() {
            return Some("biotechnology (binary regulatory risk)".to_string());
        }

        None
    }

    // ========================================================================
    // Stage: Cash flow
    // ========================================================================

    pub fn filter_cash_flow(
        &self,
        rows: Vec<StockFundamentals>,
    ) -> (Vec<StockFundamentals>, FilterResult, Vec<Exclusion>) {
        self.partition(rows, FilterStage::CashFlow, |row| self.cash_flow_reason(row))
    }

    /// Financial Services and Consumer Defensive skip the check entirely.
    pub fn cash_flow_reason(&self, row: &StockFundamentals) -> Option<String> {
        if matches!(row.sector, Sector::FinancialServices | Sector::ConsumerDefensive) {
            return None;
        }
        match (row.free_cash_flow, row.fcf_margin) {
            (Some(fcf), Some(margin)) if fcf > 0.0 && margin > self.config.fcf_margin_min => None,
            (Some(fcf), Some(margin)) => Some(format!(
                "FCF ${:.2}B with {:.1}% margin fails FCF > 0 and margin > {:.0}%",
                fcf / 1e9,
                margin,
                self.config.fcf_margin_min
            )),
            _ => Some("missing FCF data".to_string()),
        }
    }

    // ========================================================================
    // Stage: Advanced
    // ========================================================================

    /// Apply the advanced floors to rows carrying bankruptcy-score data.
    ///
    /// Rows without that data are excluded. When no row has it the stage
    /// is skipped and everything passes.
    pub fn filter_advanced(
        &self,
        rows: Vec<StockFundamentals>,
    ) -> (Vec<StockFundamentals>, FilterResult, Vec<Exclusion>) {
        if !rows.iter().any(StockFundamentals::has_advanced_data) {
            warn!("No stocks carry advanced data, skipping advanced filters");
            let n = rows.len();
            return (rows, FilterResult::new(FilterStage::Advanced, n, n), Vec::new());
        }
        self.partition(rows, FilterStage::Advanced, |row| self.advanced_filter_reason(row))
    }

    pub fn advanced_filter_reason(&self, row: &StockFundamentals) -> Option<String> {
        let cfg = &self.config;
        let sector = row.sector;

        let Some(z) = row.altman_z else {
            return Some("no advanced data".to_string());
        };
        if z < cfg.altman_z_min && sector != Sector::FinancialServices {
            return Some(format!("Altman Z {:.2} below {:.1}", z, cfg.altman_z_min));
        }

        if sector != Sector::ConsumerDefensive {
            match row.piotroski {
                Some(p) if p >= cfg.piotroski_min => {}
                Some(p) => return Some(format!("Piotroski {} below {}", p, cfg.piotroski_min)),
                None => return Some("Piotroski unavailable".to_string()),
            }
        }

        let analyst_exempt = matches!(
            sector,
            Sector::FinancialServices | Sector::ConsumerDefensive | Sector::Healthcare
        );
        if !analyst_exempt {
            match row.analyst_buy_pct {
                Some(b) if b >= cfg.analyst_buy_pct_min => {}
                Some(b) => {
                    return Some(format!(
                        "analyst buy {:.0}% below {:.0}%",
                        b, cfg.analyst_buy_pct_min
                    ))
                }
                None => return Some("analyst ratings unavailable".to_string()),
            }
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::testing::healthy;

    fn filter() -> UniverseFilter {
        UniverseFilter::new(UniverseConfig::default())
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&v, 0.25), Some(1.75));
        assert_eq!(quantile(&v, 0.75), Some(3.25));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_completeness_fails_loudly() {
        let mut rows: Vec<_> = (0..10).map(|i| healthy(&format!("T{}", i), Sector::Technology)).collect();
        rows[0].roe = None;
        assert!(check_completeness(&rows, &Metric::COMPLETENESS, 0.10).is_ok());

        rows[1].roe = None;
        let err = check_completeness(&rows, &Metric::COMPLETENESS, 0.10).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert!(err.to_string().contains("roe missing for 20.0%"));
    }

    #[test]
    fn test_outlier_removed_and_financials_exempt() {
        let mut rows: Vec<_> = (0..8)
            .map(|i| {
                let mut f = healthy(&format!("T{}", i), Sector::Technology);
                f.pe_ratio = Some(20.0 + i as f64);
                f
            })
            .collect();
        rows[3].pe_ratio = Some(9999.0);

        let mut bank = healthy("JPM", Sector::FinancialServices);
        bank.debt_to_equity = Some(12.0);
        rows.push(bank);

        let (kept, removed) = remove_outliers(rows, 3.0);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].ticker, "T3");
        assert_eq!(removed[0].metric, Metric::PeRatio);
        assert!(kept.iter().any(|r| r.ticker == "JPM"));
    }

    #[test]
    fn test_hard_filters_sector_rules() {
        let f = filter();

        let mut hc = healthy("CVS", Sector::Healthcare);
        hc.pe_ratio = Some(180.0);
        assert!(f.hard_filter_reason(&hc).is_none());

        let mut tech = healthy("SNOW", Sector::Technology);
        tech.pe_ratio = Some(180.0);
        assert!(f.hard_filter_reason(&tech).unwrap().starts_with("P/E"));

        let mut util = healthy("DUK", Sector::Utilities);
        util.roe = Some(9.0);
        util.current_ratio = Some(0.7);
        assert!(f.hard_filter_reason(&util).is_none());

        let mut bank = healthy("JPM", Sector::FinancialServices);
        bank.current_ratio = Some(0.2);
        bank.debt_to_equity = Some(8.0);
        assert!(f.hard_filter_reason(&bank).is_none());

        let mut staple = healthy("KO", Sector::ConsumerDefensive);
        staple.debt_to_equity = Some(1.8);
        assert!(f.hard_filter_reason(&staple).is_none());
        staple.debt_to_equity = Some(2.3);
        assert!(f.hard_filter_reason(&staple).unwrap().starts_with("debt/equity"));

        let mut bio = healthy("VRTX", Sector::Healthcare);
        bio.industry = Some("Biotechnology".into());
        assert!(f.hard_filter_reason(&bio).unwrap().contains("biotech"));

        let mut small = healthy("TINY", Sector::Technology);
        small.market_cap = Some(2e9);
        assert!(f.hard_filter_reason(&small).unwrap().contains("market cap"));

        let mut pricey = healthy("AZO", Sector::ConsumerCyclical);
        pricey.price = Some(3000.0);
        assert!(f.hard_filter_reason(&pricey).unwrap().contains("outside"));
    }

    #[test]
    fn test_cash_flow_filter() {
        let f = filter();
        let mut burner = healthy("BURN", Sector::Technology);
        burner.free_cash_flow = Some(-1e9);
        burner.fcf_margin = Some(-5.0);
        let mut unknown = healthy("UNK", Sector::Industrials);
        unknown.free_cash_flow = None;
        let mut bank = healthy("BAC", Sector::FinancialServices);
        bank.free_cash_flow = None;

        let (passed, result, excluded) =
            f.filter_cash_flow(vec![healthy("MSFT", Sector::Technology), burner, unknown, bank]);
        let tickers: Vec<_> = passed.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["MSFT", "BAC"]);
        assert_eq!(result.eliminated, 2);
        assert_eq!(result.elimination_rate, 50.0);
        assert_eq!(excluded[1].reason, "missing FCF data");
    }

    #[test]
    fn test_advanced_filter_exemptions() {
        let f = filter();

        let mut bank = healthy("WFC", Sector::FinancialServices);
        bank.altman_z = Some(0.4);
        bank.analyst_buy_pct = Some(20.0);
        assert!(f.advanced_filter_reason(&bank).is_none());

        let mut staple = healthy("PG", Sector::ConsumerDefensive);
        staple.piotroski = Some(3);
        assert!(f.advanced_filter_reason(&staple).is_none());

        let mut pharma = healthy("PFE", Sector::Healthcare);
        pharma.analyst_buy_pct = Some(25.0);
        assert!(f.advanced_filter_reason(&pharma).is_none());

        let mut weak = healthy("WEAK", Sector::Industrials);
        weak.altman_z = Some(1.2);
        assert!(f.advanced_filter_reason(&weak).unwrap().starts_with("Altman Z"));

        let mut no_data = healthy("ND", Sector::Industrials);
        no_data.altman_z = None;
        let (passed, _, excluded) = f.filter_advanced(vec![no_data, healthy("CAT", Sector::Industrials)]);
        assert_eq!(passed.len(), 1);
        assert_eq!(excluded[0].reason, "no advanced data");
    }

    #[test]
    fn test_advanced_filter_skipped_without_any_data() {
        let f = filter();
        let mut a = healthy("A", Sector::Technology);
        a.altman_z = None;
        let mut b = healthy("B", Sector::Energy);
        b.altman_z = None;
        let (passed, result, excluded) = f.filter_advanced(vec![a, b]);
        assert_eq!(passed.len(), 2);
        assert_eq!(result.eliminated, 0);
        assert!(excluded.is_empty());
    }
}
