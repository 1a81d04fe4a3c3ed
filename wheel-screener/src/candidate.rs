//! Candidate scoring for cash-secured puts.
//!
//! Two levels:
//! - [`OptionScore`]: one contract scored on premium (0-40), liquidity
//!   (0-20), spread (0-20) and delta (0-10)
//! - [`Candidate`]: a ticker's best contract combined with its volatility
//!   profile, earnings decision and DTE into a composite score
//!
//! Only contracts without a usable bid are excluded. Thin liquidity, wide
//! spreads and low IV rank lower the score and attach warnings but never
//! reject.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::config::WheelConfig;
use crate::data::{OptionContract, OptionType};
use crate::earnings::{EarningsDecision, EarningsWindowDecision};
use crate::numeric::{desc, round_dp};
use crate::volatility::{TermStructure, VolatilityProfile};

// ============================================================================
// Option scoring
// ============================================================================

pub const MAX_PREMIUM_SCORE: f64 = 40.0;
pub const MAX_LIQUIDITY_SCORE: f64 = 20.0;
pub const MAX_SPREAD_SCORE: f64 = 20.0;
pub const MAX_DELTA_SCORE: f64 = 10.0;

/// Scored option contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionScore {
    pub contract: OptionContract,
    /// Absolute delta used for scoring
    pub delta: f64,
    pub delta_estimated: bool,
    pub premium: f64,
    pub mid: Option<f64>,
    pub spread: Option<f64>,
    /// Spread as a fraction of mid
    pub spread_pct: Option<f64>,
    /// Premium as percent of strike
    pub return_pct: f64,
    pub cash_required: f64,
    pub premium_score: f64,
    pub liquidity_score: f64,
    pub spread_score: f64,
    pub delta_score: f64,
    pub total: f64,
    pub warnings: Vec<String>,
}

/// Premium points: ten per percent of strike, capped.
pub fn premium_score(return_pct: f64) -> f64 {
    (return_pct * 10.0).clamp(0.0, MAX_PREMIUM_SCORE)
}

/// Open-interest tiers plus a volume bonus, capped.
pub fn liquidity_score(open_interest: u64, volume: u64) -> f64 {
    let oi_points = match open_interest {
        oi if oi >= 100 => 20.0,
        oi if oi >= 50 => 15.0,
        oi if oi >= 10 => 10.0,
        oi if oi >= 1 => 5.0,
        _ => 0.0,
    };
    let volume_bonus = if volume >= 10 { 5.0 } else { 0.0 };
    f64::min(oi_points + volume_bonus, MAX_LIQUIDITY_SCORE)
}

/// Spread tiers on `(ask - bid) / mid`.
pub fn spread_score(spread_pct: f64) -> f64 {
    if spread_pct <= 0.05 {
        20.0
    } else if spread_pct <= 0.10 {
        15.0
    } else if spread_pct <= 0.20 {
        10.0
    } else if spread_pct <= 0.50 {
        5.0
    } else {
        0.0
    }
}

/// Delta tiers around the 0.25-0.30 sweet spot.
pub fn delta_score(delta_abs: f64) -> f64 {
    if (0.25..=0.30).contains(&delta_abs) {
        10.0
    } else if (0.20..=0.35).contains(&delta_abs) {
        7.0
    } else if (0.15..=0.40).contains(&delta_abs) {
        4.0
    } else {
        0.0
    }
}

/// Delta magnitude from moneyness when the feed has none.
///
/// Moneyness is oriented so values above 1 mean in the money for either
/// right: strike/spot for puts, spot/strike for calls.
pub fn estimate_delta(option_type: OptionType, strike: f64, spot: f64) -> f64 {
    if strike <= 0.0 || spot <= 0.0 {
        return 0.5;
    }
    let moneyness = match option_type {
        OptionType::Put => strike / spot,
        OptionType::Call => spot / strike,
    };
    if moneyness > 1.1 {
        0.8
    } else if moneyness > 0.9 {
        0.5
    } else {
        0.2
    }
}

// ============================================================================
// Candidate
// ============================================================================

/// Composite score components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositeBreakdown {
    pub iv_points: f64,
    pub term_points: f64,
    pub option_points: f64,
    pub dte_points: f64,
    pub earnings_points: f64,
    pub total: f64,
}

/// A ranked trade idea for one ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub ticker: String,
    pub stock_price: f64,
    pub expiration: NaiveDate,
    pub dte: i64,
    pub best_option: OptionScore,
    /// Next-best contracts after `best_option`
    pub alternates: Vec<OptionScore>,
    pub volatility: VolatilityProfile,
    pub earnings: EarningsWindowDecision,
    pub score: f64,
    pub breakdown: CompositeBreakdown,
    pub warnings: Vec<String>,
}

impl Candidate {
    pub fn has_warning(&self, needle: &str) -> bool {
        self.warnings.iter().any(|w| w.contains(needle))
    }
}

/// Candidate warning for an IV rank below the configured minimum.
pub const LOW_IV_WARNING: &str = "lowIv";

// ============================================================================
// Scorer
// ============================================================================

/// Scores contracts and candidates against a [`WheelConfig`].
#[derive(Debug, Clone)]
pub struct CandidateScorer {
    config: WheelConfig,
}

impl CandidateScorer {
    pub fn new(config: WheelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    /// Score one contract. `None` when it has no usable bid.
    pub fn score_option(&self, contract: &OptionContract, stock_price: f64) -> Option<OptionScore> {
        let bid = contract.valid_bid()?;
        let strike = contract.strike;
        let mut warnings = Vec::new();

        let (delta, delta_estimated) = match contract.delta {
            Some(d) if d != 0.0 => (d.abs(), false),
            _ => (estimate_delta(contract.option_type, strike, stock_price), true),
        };

        let ask = contract.ask.filter(|a| *a > 0.0);
        let (mid, spread, spread_pct) = match ask {
            Some(ask) => {
                let mid = (bid + ask) / 2.0;
                let spread = ask - bid;
                (Some(mid), Some(spread), Some(spread / mid))
            }
            None => (None, None, None),
        };

        let return_pct = bid / strike * 100.0;
        let premium_points = premium_score(return_pct);
        let liquidity_points = liquidity_score(contract.open_interest, contract.volume);
        let spread_points = spread_pct.map_or(0.0, spread_score);
        let delta_points = delta_score(delta);

        if contract.open_interest < self.config.open_interest_min {
            warnings.push("low OI".to_string());
        }
        if contract.volume < self.config.volume_min {
            warnings.push("low volume".to_string());
        }
        match spread_pct {
            Some(pct) if pct > self.config.spread_warn_pct => {
                warnings.push("wide spread".to_string())
            }
            None => warnings.push("no ask quote".to_string()),
            _ => {}
        }
        if delta_estimated {
            warnings.push("delta estimated".to_string());
        }
        if delta < self.config.delta_min || delta > self.config.delta_max {
            warnings.push(format!(
                "delta {:.2} outside {:.2}-{:.2}",
                delta, self.config.delta_min, self.config.delta_max
            ));
        }
        if return_pct < self.config.premium_min_pct * 100.0 {
            warnings.push("premium below minimum".to_string());
        }

        let total = round_dp(
            premium_points + liquidity_points + spread_points + delta_points,
            2,
        );

        Some(OptionScore {
            contract: contract.clone(),
            delta,
            delta_estimated,
            premium: bid,
            mid,
            spread,
            spread_pct,
            return_pct,
            cash_required: strike * 100.0,
            premium_score: round_dp(premium_points, 2),
            liquidity_score: liquidity_points,
            spread_score: spread_points,
            delta_score: delta_points,
            total,
            warnings,
        })
    }

    /// Score every bid-able contract, best first.
    pub fn score_options(&self, contracts: &[OptionContract], stock_price: f64) -> Vec<OptionScore> {
        let mut scored: Vec<OptionScore> = contracts
            .iter()
            .filter_map(|c| self.score_option(c, stock_price))
            .collect();

        scored.sort_by(|a, b| match desc(a.total, b.total) {
            Ordering::Equal => a.contract.code.cmp(&b.contract.code),
            other => other,
        });
        scored
    }

    fn iv_points(&self, iv_rank: Option<f64>) -> f64 {
        let Some(rank) = iv_rank else {
            return 0.0;
        };
        let midpoint = (self.config.iv_rank_min + self.config.iv_rank_preferred) / 2.0;
        if rank >= self.config.iv_rank_preferred {
            30.0
        } else if rank >= midpoint {
            20.0
        } else if rank >= self.config.iv_rank_min {
            10.0
        } else {
            0.0
        }
    }

    fn dte_points(&self, dte: i64) -> f64 {
        if (self.config.dte_preferred_min..=self.config.dte_preferred_max).contains(&dte) {
            10.0
        } else if (self.config.dte_min..=self.config.dte_max).contains(&dte) {
            5.0
        } else {
            0.0
        }
    }

    /// Composite score for a candidate's inputs.
    pub fn composite_score(
        &self,
        best: &OptionScore,
        volatility: &VolatilityProfile,
        earnings: &EarningsWindowDecision,
        dte: i64,
    ) -> CompositeBreakdown {
        let iv_points = self.iv_points(volatility.iv_rank);

        let term_points = match volatility.term_structure {
            TermStructure::Contango => 20.0,
            TermStructure::Neutral => 10.0,
            TermStructure::Backwardation | TermStructure::Unknown => 0.0,
        };

        let spread_points = match best.spread_pct.map(|p| p * 100.0) {
            Some(pct) if pct < 5.0 => 15.0,
            Some(pct) if pct < 10.0 => 10.0,
            _ => 0.0,
        };
        let option_points = f64::min(best.return_pct * 5.0, 15.0) + spread_points;

        let dte_points = self.dte_points(dte);

        let earnings_points = match earnings.decision {
            EarningsDecision::Safe => 10.0,
            EarningsDecision::Unverified => 5.0,
            EarningsDecision::Reject => 0.0,
        };

        let total = round_dp(
            iv_points + term_points + option_points + dte_points + earnings_points,
            1,
        );

        CompositeBreakdown {
            iv_points,
            term_points,
            option_points,
            dte_points,
            earnings_points,
            total,
        }
    }

    /// Build a candidate. `None` when no contract has a usable bid.
    pub fn score_candidate(
        &self,
        ticker: &str,
        stock_price: f64,
        options: &[OptionContract],
        volatility: VolatilityProfile,
        earnings: EarningsWindowDecision,
        dte: i64,
    ) -> Option<Candidate> {
        let mut ranked = self.score_options(options, stock_price);
        if ranked.is_empty() {
            debug!(ticker = %ticker, contracts = options.len(), "No bid-able contracts");
            return None;
        }
        let best = ranked.remove(0);
        ranked.truncate(self.config.top_options);

        let breakdown = self.composite_score(&best, &volatility, &earnings, dte);

        let mut warnings = best.warnings.clone();
        match volatility.iv_rank {
            Some(rank) if rank < self.config.iv_rank_min => warnings.push(LOW_IV_WARNING.to_string()),
            None => warnings.push("IV unavailable".to_string()),
            _ => {}
        }
        if volatility.term_structure == TermStructure::Unknown {
            warnings.push("term structure unknown".to_string());
        }
        if earnings.decision == EarningsDecision::Unverified {
            warnings.push("earnings unverified".to_string());
        }

        Some(Candidate {
            ticker: ticker.to_string(),
            stock_price,
            expiration: earnings.expiration,
            dte,
            best_option: best,
            alternates: ranked,
            volatility,
            earnings,
            score: breakdown.total,
            breakdown,
            warnings,
        })
    }
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new(WheelConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
