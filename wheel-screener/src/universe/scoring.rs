//! Sector-relative quality scoring.
//!
//! Every metric is ranked against peers in the same sector, so a sector
//! with structurally higher margins does not crowd out the others. The
//! weighted percentile sum is topped up with bonus points and then
//! discounted for cyclical and geopolitical exposure.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::fundamentals::StockFundamentals;
use crate::config::UniverseConfig;
use crate::data::Sector;
use crate::numeric::round_dp;

/// Percentile given to every metric in a one-member sector, and to
/// missing history-derived inputs.
pub const NEUTRAL_PERCENTILE: f64 = 0.5;

// ============================================================================
// Percentile ranking
// ============================================================================

/// Percentile ranks in (0, 1] among the present values, ties averaged.
///
/// With `ascending` the largest value ranks 1.0; otherwise the smallest
/// does. Missing values stay `None`.
pub fn percentile_ranks(values: &[Option<f64>], ascending: bool) -> Vec<Option<f64>> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let n = present.len() as f64;

    values
        .iter()
        .map(|value| {
            let v = (*value)?;
            let (below, equal) = present.iter().fold((0usize, 0usize), |(b, e), other| {
                let better = if ascending { *other < v } else { *other > v };
                if better {
                    (b + 1, e)
                } else if *other == v {
                    (b, e + 1)
                } else {
                    (b, e)
                }
            });
            let rank = below as f64 + (equal as f64 + 1.0) / 2.0;
            Some(rank / n)
        })
        .collect()
}

// ============================================================================
// Score breakdown
// ============================================================================

/// Points per component after weighting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub debt_to_equity: f64,
    pub current_ratio: f64,
    pub roe_consistency: f64,
    pub fcf_margin: f64,
    pub revenue_growth: f64,
    pub gross_margin: f64,
    pub operating_margin: f64,
    pub volume: f64,
    pub bonus: f64,
    /// Product of the applied penalty factors (1.0 when none apply)
    pub penalty_factor: f64,
}

impl ScoreBreakdown {
    pub fn base(&self) -> f64 {
        self.debt_to_equity
            + self.current_ratio
            + self.roe_consistency
            + self.fcf_margin
            + self.revenue_growth
            + self.gross_margin
            + self.operating_margin
            + self.volume
    }

    /// `(base + bonus) * penalty`, clamped to [0, 100].
    pub fn total(&self) -> f64 {
        ((self.base() + self.bonus) * self.penalty_factor).clamp(0.0, 100.0)
    }
}

/// A fundamentals row with its quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredStock {
    pub fundamentals: StockFundamentals,
    pub breakdown: ScoreBreakdown,
    pub score: f64,
    pub cyclical: bool,
}

impl ScoredStock {
    pub fn ticker(&self) -> &str {
        &self.fundamentals.ticker
    }

    pub fn sector(&self) -> Sector {
        self.fundamentals.sector
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Per-metric percentiles for one sector group.
struct SectorPercentiles {
    debt_to_equity: Vec<Option<f64>>,
    current_ratio: Vec<Option<f64>>,
    roe_consistency: Vec<f64>,
    fcf_margin: Vec<Option<f64>>,
    revenue_growth: Vec<f64>,
    gross_margin: Vec<Option<f64>>,
    operating_margin: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

fn column<F>(rows: &[&StockFundamentals], get: F) -> Vec<Option<f64>>
where
    F: Fn(&StockFundamentals) -> Option<f64>,
{
    rows.iter().map(|r| get(*r).filter(|v| v.is_finite())).collect()
}

/// `high_pct * w + (1 - low_pct) * (1 - w)`, missing inputs neutral.
fn blend(high: &[Option<f64>], low: &[Option<f64>], weight: f64) -> Vec<f64> {
    high.iter()
        .zip(low)
        .map(|(h, l)| {
            let h = h.unwrap_or(NEUTRAL_PERCENTILE);
            let l = l.unwrap_or(NEUTRAL_PERCENTILE);
            h * weight + (1.0 - l) * (1.0 - weight)
        })
        .collect()
}

impl SectorPercentiles {
    fn compute(rows: &[&StockFundamentals]) -> Self {
        if rows.len() == 1 {
            let neutral = vec![Some(NEUTRAL_PERCENTILE)];
            return Self {
                debt_to_equity: neutral.clone(),
                current_ratio: neutral.clone(),
                roe_consistency: vec![NEUTRAL_PERCENTILE],
                fcf_margin: neutral.clone(),
                revenue_growth: vec![NEUTRAL_PERCENTILE],
                gross_margin: neutral.clone(),
                operating_margin: neutral.clone(),
                volume: neutral,
            };
        }

        let roe_avg = percentile_ranks(&column(rows, |r| r.roe_avg), true);
        let roe_std = percentile_ranks(&column(rows, |r| r.roe_std), true);
        let cagr = percentile_ranks(&column(rows, |r| r.revenue_cagr), true);
        let rev_vol = percentile_ranks(&column(rows, |r| r.revenue_volatility), true);

        Self {
            debt_to_equity: percentile_ranks(&column(rows, |r| r.debt_to_equity), false),
            current_ratio: percentile_ranks(&column(rows, |r| r.current_ratio), true),
            roe_consistency: blend(&roe_avg, &roe_std, 0.7),
            fcf_margin: percentile_ranks(&column(rows, |r| r.fcf_margin), true),
            revenue_growth: blend(&cagr, &rev_vol, 0.6),
            gross_margin: percentile_ranks(&column(rows, |r| r.gross_margin), true),
            operating_margin: percentile_ranks(&column(rows, |r| r.operating_margin), true),
            volume: percentile_ranks(&column(rows, |r| r.avg_volume), true),
        }
    }
}

/// Scores rows against their sector peers.
pub struct QualityScorer {
    config: UniverseConfig,
}

impl QualityScorer {
    pub fn new(config: UniverseConfig) -> Self {
        Self { config }
    }

    /// Bonus points for elite balance sheets and analyst conviction.
    pub fn bonus(&self, row: &StockFundamentals) -> f64 {
        let b = &self.config.bonus;
        let mut bonus = 0.0;

        if let (Some(z), Some(p)) = (row.altman_z, row.piotroski) {
            if z > b.elite_altman_z && p >= b.elite_piotroski {
                bonus += b.financial_health_bonus;
            }
        }

        if let Some(buy) = row.analyst_buy_pct {
            if buy > b.elite_analyst_buy_pct {
                bonus += b.elite_analyst_bonus;
            } else if buy > b.strong_analyst_buy_pct {
                bonus += b.strong_analyst_bonus;
            }
        }

        bonus
    }

    /// Multiplicative penalty. Cyclical and geopolitical factors compound.
    pub fn penalty_factor(&self, row: &StockFundamentals) -> f64 {
        let mut factor = 1.0;
        if self.config.is_cyclical(&row.ticker, row.sector) {
            factor *= self.config.cyclical_penalty;
        }
        if self.config.is_geopolitical(&row.ticker) {
            factor *= self.config.geopolitical_penalty;
        }
        factor
    }

    /// Score all rows. Output keeps input order.
    pub fn score(&self, rows: Vec<StockFundamentals>) -> Vec<ScoredStock> {
        let w = &self.config.weights;

        let mut groups: BTreeMap<Sector, Vec<usize>> = BTreeMap::new();
        for (idx, row) in rows.iter().enumerate() {
            groups.entry(row.sector).or_default().push(idx);
        }

        let mut breakdowns = vec![ScoreBreakdown::default(); rows.len()];
        for (sector, indices) in &groups {
            let members: Vec<&StockFundamentals> = indices.iter().map(|i| &rows[*i]).collect();
            let pct = SectorPercentiles::compute(&members);

            for (pos, idx) in indices.iter().enumerate() {
                let points = |p: Option<f64>, weight: f64| p.unwrap_or(0.0) * weight;
                breakdowns[*idx] = ScoreBreakdown {
                    debt_to_equity: points(pct.debt_to_equity[pos], w.debt_to_equity),
                    current_ratio: points(pct.current_ratio[pos], w.current_ratio),
                    roe_consistency: pct.roe_consistency[pos] * w.roe_consistency,
                    fcf_margin: points(pct.fcf_margin[pos], w.fcf_margin),
                    revenue_growth: pct.revenue_growth[pos] * w.revenue_growth,
                    gross_margin: points(pct.gross_margin[pos], w.gross_margin),
                    operating_margin: points(pct.operating_margin[pos], w.operating_margin),
                    volume: points(pct.volume[pos], w.volume),
                    bonus: self.bonus(&rows[*idx]),
                    penalty_factor: self.penalty_factor(&rows[*idx]),
                };
            }
            debug!(sector = %sector, members = indices.len(), "Scored sector");
        }

        rows.into_iter()
            .zip(breakdowns)
            .map(|(fundamentals, breakdown)| {
                let cyclical = self.config.is_cyclical(&fundamentals.ticker, fundamentals.sector);
                ScoredStock {
                    score: round_dp(breakdown.total(), 2),
                    cyclical,
                    breakdown,
                    fundamentals,
                }
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
