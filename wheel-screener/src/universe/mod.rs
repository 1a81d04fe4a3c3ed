//! Universe ranking engine.
//!
//! Turns raw per-stock fundamentals into a bounded, diversified,
//! quality-ordered list of tickers:
//!
//! ```text
//! raw rows -> completeness -> outliers -> hard -> cash flow -> advanced
//!          -> sector-relative scoring -> diversified selection
//! ```
//!
//! A completeness failure aborts the build. Everything else degrades into
//! exclusions and warnings on the returned [`UniverseBuild`].

pub mod filters;
pub mod fundamentals;
pub mod scoring;
pub mod selection;

pub use filters::{
    check_completeness, remove_outliers, Exclusion, FilterResult, FilterStage, OutlierRemoval,
    UniverseFilter,
};
pub use fundamentals::{
    fetch_fundamentals, fetch_fundamentals_batch, map_fundamentals_rows, FundamentalsBatch, Metric,
    RawFundamentalsRow, StockFundamentals,
};
pub use scoring::{percentile_ranks, QualityScorer, ScoreBreakdown, ScoredStock};
pub use selection::{select_diversified, validate_selection, Selection};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};
use wheel_common::logging::generate_run_id;

use crate::config::UniverseConfig;
use crate::data::{FundamentalsProvider, Sector};
use crate::error::{Result, ScreenerError};

/// Everything produced by one universe build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseBuild {
    pub run_id: String,
    pub target_size: usize,
    /// Selected tickers, best first
    pub tickers: Vec<String>,
    pub selected: Vec<ScoredStock>,
    /// Per-stage funnel, input first
    pub funnel: Vec<FilterResult>,
    pub exclusions: Vec<Exclusion>,
    pub outliers: Vec<OutlierRemoval>,
    pub warnings: Vec<String>,
    pub sector_counts: BTreeMap<Sector, usize>,
}

impl UniverseBuild {
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Exclusion reason for a ticker, if it was filtered out.
    pub fn exclusion(&self, ticker: &str) -> Option<&Exclusion> {
        self.exclusions.iter().find(|e| e.ticker == ticker)
    }

    pub fn summary(&self) -> String {
        let input = self.funnel.first().map(|f| f.passed).unwrap_or(0);
        format!(
            "Universe {}: {} of {} stocks selected across {} sectors ({} warnings)",
            self.run_id,
            self.tickers.len(),
            input,
            self.sector_counts.len(),
            self.warnings.len()
        )
    }
}

/// Builds the stock universe from fundamentals.
pub struct UniverseRankingEngine {
    config: UniverseConfig,
    filter: UniverseFilter,
    scorer: QualityScorer,
}

impl UniverseRankingEngine {
    pub fn new(config: UniverseConfig) -> Self {
        Self {
            filter: UniverseFilter::new(config.clone()),
            scorer: QualityScorer::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &UniverseConfig {
        &self.config
    }

    /// Filter, score and diversify `raw` into at most `target_size` tickers.
    pub fn build_universe(
        &self,
        raw: Vec<StockFundamentals>,
        target_size: usize,
    ) -> Result<UniverseBuild> {
        let run_id = generate_run_id();
        let cfg = &self.config;
        info!(run_id = %run_id, input = raw.len(), target_size, "Building universe");

        let mut funnel = vec![FilterResult::new(FilterStage::Input, raw.len(), raw.len())];
        let mut exclusions = Vec::new();
        let mut warnings = Vec::new();

        // Data quality
        check_completeness(&raw, &Metric::COMPLETENESS, cfg.max_missing_pct)?;
        let input_count = raw.len();
        let (rows, outliers) = remove_outliers(raw, cfg.outlier_iqr_multiplier);
        funnel.push(FilterResult::new(FilterStage::DataQuality, input_count, rows.len()));
        exclusions.extend(outliers.iter().map(|o| Exclusion {
            ticker: o.ticker.clone(),
            stage: FilterStage::DataQuality,
            reason: format!(
                "{} {:.2} outside [{:.2}, {:.2}]",
                o.metric, o.value, o.lower, o.upper
            ),
        }));

        // Fundamental funnel
        let (rows, result, excluded) = self.filter.filter_hard(rows);
        funnel.push(result);
        exclusions.extend(excluded);

        if rows.len() < cfg.min_admissible_pool {
            let msg = format!(
                "Admissible pool of {} after hard filters is below minimum {}",
                rows.len(),
                cfg.min_admissible_pool
            );
            warn!(run_id = %run_id, "{}", msg);
            warnings.push(msg);
        }

        let (rows, result, excluded) = self.filter.filter_cash_flow(rows);
        funnel.push(result);
        exclusions.extend(excluded);

        let (rows, result, excluded) = self.filter.filter_advanced(rows);
        funnel.push(result);
        exclusions.extend(excluded);

        // Score and select
        let scored = self.scorer.score(rows);
        let scored_count = scored.len();
        let selection = select_diversified(scored, target_size, cfg);
        funnel.push(FilterResult::new(
            FilterStage::Selection,
            scored_count,
            selection.selected.len(),
        ));

        warnings.extend(selection.warnings.iter().cloned());
        warnings.extend(validate_selection(&selection, cfg));

        let tickers = selection.tickers();
        info!(
            run_id = %run_id,
            selected = tickers.len(),
            sectors = selection.sector_counts.len(),
            warnings = warnings.len(),
            "Universe build complete"
        );

        Ok(UniverseBuild {
            run_id,
            target_size,
            tickers,
            selected: selection.selected,
            funnel,
            exclusions,
            outliers,
            warnings,
            sector_counts: selection.sector_counts,
        })
    }

    /// Build with the configured target size.
    pub fn build_default(&self, raw: Vec<StockFundamentals>) -> Result<UniverseBuild> {
        self.build_universe(raw, self.config.target_size)
    }

    /// Fetch fundamentals for `tickers` and build from them.
    ///
    /// Tickers the provider cannot describe are skipped and listed in the
    /// build warnings. Fails when none of a non-empty ticker list could be
    /// fetched.
    pub async fn build_from_provider(
        &self,
        provider: &dyn FundamentalsProvider,
        tickers: &[String],
        concurrency: usize,
    ) -> Result<UniverseBuild> {
        let batch = fetch_fundamentals_batch(provider, tickers, concurrency).await;
        if batch.rows.is_empty() && !tickers.is_empty() {
            return Err(ScreenerError::InsufficientData(format!(
                "no fundamentals retrieved for any of {} tickers ({} failed, {} missing)",
                tickers.len(),
                batch.failures.len(),
                batch.missing.len()
            )));
        }
        let mut build = self.build_default(batch.rows)?;
        if !batch.failures.is_empty() {
            let failed: Vec<&str> = batch.failures.iter().map(|(t, _)| t.as_str()).collect();
            build.warnings.push(format!(
                "Fundamentals fetch failed for {} tickers: {}",
                failed.len(),
                failed.join(", ")
            ));
        }
        if !batch.missing.is_empty() {
            build.warnings.push(format!(
                "No fundamentals for {} tickers: {}",
                batch.missing.len(),
                batch.missing.join(", ")
            ));
        }
        Ok(build)
    }
}

impl Default for UniverseRankingEngine {
    fn default() -> Self {
        Self::new(UniverseConfig::default())
    }
}
