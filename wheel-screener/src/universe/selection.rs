//! Diversified universe selection.
//!
//! Three passes over the score-ordered pool:
//! 1. Greedy admission under the per-sector and cyclical caps
//! 2. Required sector minimums, evicting the weakest non-required member
//!    when the universe is full
//! 3. Backfill up to the target size under the same caps
//!
//! Ties on score are broken alphabetically everywhere, both for admission
//! order and for eviction.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use super::scoring::ScoredStock;
use crate::config::UniverseConfig;
use crate::data::Sector;
use crate::numeric::desc;

/// Outcome of the selection passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Selected stocks, best first
    pub selected: Vec<ScoredStock>,
    pub sector_counts: BTreeMap<Sector, usize>,
    pub cyclical_count: usize,
    /// Share-class duplicates dropped before selection
    pub deduplicated: Vec<String>,
    /// Members evicted to satisfy a required sector minimum
    pub evicted: Vec<String>,
    pub warnings: Vec<String>,
}

impl Selection {
    pub fn tickers(&self) -> Vec<String> {
        self.selected.iter().map(|s| s.ticker().to_string()).collect()
    }
}

fn by_score_then_ticker(a: &ScoredStock, b: &ScoredStock) -> Ordering {
    match desc(a.score, b.score) {
        Ordering::Equal => a.ticker().cmp(b.ticker()),
        other => other,
    }
}

/// Drop secondary share classes whose primary listing is also present.
pub fn dedupe_share_classes(
    pool: Vec<ScoredStock>,
    duplicates: &BTreeMap<String, String>,
) -> (Vec<ScoredStock>, Vec<String>) {
    let present: HashSet<String> = pool.iter().map(|s| s.ticker().to_string()).collect();
    let drop: HashSet<&str> = duplicates
        .iter()
        .filter(|(dup, primary)| present.contains(*dup) && present.contains(*primary))
        .map(|(dup, _)| dup.as_str())
        .collect();

    let mut dropped = Vec::new();
    let kept = pool
        .into_iter()
        .filter(|s| {
            if drop.contains(s.ticker()) {
                dropped.push(s.ticker().to_string());
                false
            } else {
                true
            }
        })
        .collect();
    (kept, dropped)
}

/// Tracks admitted members against the caps.
struct Roster<'a> {
    config: &'a UniverseConfig,
    target: usize,
    max_for_sector: usize,
    members: Vec<ScoredStock>,
    chosen: HashSet<String>,
    sector_counts: BTreeMap<Sector, usize>,
    cyclical_count: usize,
}

impl<'a> Roster<'a> {
    fn new(config: &'a UniverseConfig, target: usize) -> Self {
        Self {
            config,
            target,
            max_for_sector: config.max_for_sector(target),
            members: Vec::new(),
            chosen: HashSet::new(),
            sector_counts: BTreeMap::new(),
            cyclical_count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.members.len() >= self.target
    }

    fn contains(&self, ticker: &str) -> bool {
        self.chosen.contains(ticker)
    }

    fn count(&self, sector: Sector) -> usize {
        self.sector_counts.get(&sector).copied().unwrap_or(0)
    }

    /// Reason `stock` may not be admitted, ignoring the size limit.
    fn blocked_by(&self, stock: &ScoredStock) -> Option<&'static str> {
        if stock.score < self.config.quality_floor {
            Some("quality floor")
        } else if self.count(stock.sector()) >= self.max_for_sector {
            Some("sector limit")
        } else if stock.cyclical && self.cyclical_count >= self.config.max_cyclical {
            Some("cyclical limit")
        } else {
            None
        }
    }

    fn admit(&mut self, stock: ScoredStock) {
        *self.sector_counts.entry(stock.sector()).or_insert(0) += 1;
        if stock.cyclical {
            self.cyclical_count += 1;
        }
        self.chosen.insert(stock.ticker().to_string());
        self.members.push(stock);
    }

    fn evict(&mut self, ticker: &str) -> Option<ScoredStock> {
        let pos = self.members.iter().position(|m| m.ticker() == ticker)?;
        let stock = self.members.remove(pos);
        if let Some(count) = self.sector_counts.get_mut(&stock.sector()) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.sector_counts.remove(&stock.sector());
            }
        }
        if stock.cyclical {
            self.cyclical_count = self.cyclical_count.saturating_sub(1);
        }
        self.chosen.remove(ticker);
        Some(stock)
    }

    /// Lowest-scored member outside the required sectors, ties by ticker.
    fn eviction_candidate(&self) -> Option<String> {
        self.members
            .iter()
            .filter(|m| !self.config.required_minimums.contains_key(&m.sector()))
            .min_by(|a, b| match a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal) {
                Ordering::Equal => a.ticker().cmp(b.ticker()),
                other => other,
            })
            .map(|m| m.ticker().to_string())
    }
}

/// Run the three selection passes over a scored pool.
pub fn select_diversified(
    pool: Vec<ScoredStock>,
    target: usize,
    config: &UniverseConfig,
) -> Selection {
    let (mut pool, deduplicated) = dedupe_share_classes(pool, &config.share_class_duplicates);
    pool.sort_by(by_score_then_ticker);

    let mut roster = Roster::new(config, target);
    let mut warnings = Vec::new();
    let mut evicted = Vec::new();

    // Pass 1: greedy
    for stock in &pool {
        if roster.is_full() {
            break;
        }
        match roster.blocked_by(stock) {
            Some(reason) => {
                debug!(ticker = %stock.ticker(), score = stock.score, reason, "Not admitted");
            }
            None => roster.admit(stock.clone()),
        }
    }
    debug!(selected = roster.members.len(), "Greedy pass complete");

    // Pass 2: required sector minimums
    for (sector, minimum) in &config.required_minimums {
        let required = (*minimum).min(roster.max_for_sector);
        let current = roster.count(*sector);
        if current >= required {
            continue;
        }
        let shortage = required - current;

        let candidates: Vec<&ScoredStock> = pool
            .iter()
            .filter(|s| s.sector() == *sector)
            .filter(|s| !roster.contains(s.ticker()))
            .filter(|s| s.score >= config.quality_floor)
            .filter(|s| !(*sector == Sector::FinancialServices && config.is_crypto(s.ticker())))
            .take(shortage)
            .collect();

        if candidates.is_empty() {
            let msg = format!(
                "No quality candidates (score >= {}) for required sector {}",
                config.quality_floor, sector
            );
            warn!("{}", msg);
            warnings.push(msg);
            continue;
        }

        for stock in candidates {
            if stock.cyclical && roster.cyclical_count >= config.max_cyclical {
                debug!(ticker = %stock.ticker(), "Required-sector candidate blocked by cyclical cap");
                continue;
            }
            if roster.is_full() {
                let Some(victim) = roster.eviction_candidate() else {
                    let msg = format!(
                        "Cannot meet {} minimum: universe full of required-sector members",
                        sector
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                    break;
                };
                if let Some(out) = roster.evict(&victim) {
                    info!(removed = %out.ticker(), added = %stock.ticker(), "Swapped for sector minimum");
                    evicted.push(out.ticker().to_string());
                }
            }
            roster.admit(stock.clone());
        }

        let now = roster.count(*sector);
        if now < required {
            let msg = format!("{} has {}/{} required members", sector, now, required);
            warn!("{}", msg);
            warnings.push(msg);
        }
    }

    // Pass 3: backfill
    if !roster.is_full() {
        for stock in &pool {
            if roster.is_full() {
                break;
            }
            if roster.contains(stock.ticker()) {
                continue;
            }
            if roster.blocked_by(stock).is_none() {
                debug!(ticker = %stock.ticker(), "Backfilled");
                roster.admit(stock.clone());
            }
        }
    }

    let mut selected = roster.members;
    selected.sort_by(by_score_then_ticker);

    info!(
        selected = selected.len(),
        target,
        cyclical = roster.cyclical_count,
        sectors = roster.sector_counts.len(),
        "Universe selection complete"
    );

    Selection {
        selected,
        sector_counts: roster.sector_counts,
        cyclical_count: roster.cyclical_count,
        deduplicated,
        evicted,
        warnings,
    }
}

/// Post-selection sanity checks. Violations are reported, never enforced.
pub fn validate_selection(selection: &Selection, config: &UniverseConfig) -> Vec<String> {
    let checks = &config.checks;
    let size = selection.selected.len();
    let mut warnings = Vec::new();

    if size < checks.min_size {
        warnings.push(format!(
            "Universe size {} is below minimum {}",
            size, checks.min_size
        ));
    }

    let sectors = selection.sector_counts.len();
    if sectors < checks.min_sectors {
        warnings.push(format!(
            "Only {} sectors represented (minimum {})",
            sectors, checks.min_sectors
        ));
    }

    if size > 0 {
        for (sector, count) in &selection.sector_counts {
            let share = *count as f64 / size as f64;
            if share > checks.max_sector_concentration {
                warnings.push(format!(
                    "{} is {:.1}% of the universe (max {:.0}%)",
                    sector,
                    share * 100.0,
                    checks.max_sector_concentration * 100.0
                ));
            }
        }
    }

    let cyclical_members: usize = selection
        .sector_counts
        .iter()
        .filter(|(sector, _)| config.cyclical_sectors.contains(sector))
        .map(|(_, count)| count)
        .sum();
    if cyclical_members > checks.max_cyclical_sector_members {
        warnings.push(format!(
            "{} cyclical-sector members (max {})",
            cyclical_members, checks.max_cyclical_sector_members
        ));
    }

    for w in &warnings {
        warn!("{}", w);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::scoring::ScoreBreakdown;
    use crate::universe::testing::healthy;
    use proptest::prelude::*;

    fn stock(ticker: &str, sector: Sector, score: f64, config: &UniverseConfig) -> ScoredStock {
        ScoredStock {
            fundamentals: healthy(ticker, sector),
            breakdown: ScoreBreakdown::default(),
            score,
            cyclical: config.is_cyclical(ticker, sector),
        }
    }

    fn config() -> UniverseConfig {
        UniverseConfig {
            required_minimums: BTreeMap::new(),
            ..UniverseConfig::default()
        }
    }

    #[test]
    fn test_sector_cap_uses_fraction_of_target() {
        let cfg = config();
        // min(7, floor(10 * 0.25)) = 2
        let pool: Vec<_> = (0..5)
            .map(|i| stock(&format!("T{}", i), Sector::Technology, 90.0 - i as f64, &cfg))
            .chain((0..5).map(|i| stock(&format!("I{}", i), Sector::Industrials, 80.0 - i as f64, &cfg)))
            .collect();

        let sel = select_diversified(pool, 10, &cfg);
        assert_eq!(sel.sector_counts[&Sector::Technology], 2);
        assert_eq!(sel.sector_counts[&Sector::Industrials], 2);
        assert_eq!(sel.selected.len(), 4);
        assert_eq!(sel.tickers(), vec!["T0", "T1", "I0", "I1"]);
    }

    #[test]
    fn test_quality_floor_and_cyclical_cap() {
        let cfg = config();
        let pool = vec![
            stock("XOM", Sector::Energy, 95.0, &cfg),
            stock("CVX", Sector::Energy, 94.0, &cfg),
            stock("LIN", Sector::BasicMaterials, 93.0, &cfg),
            stock("NUE", Sector::BasicMaterials, 92.0, &cfg),
            stock("LOW", Sector::Technology, 40.0, &cfg),
        ];
        let sel = select_diversified(pool, 32, &cfg);
        assert_eq!(sel.cyclical_count, 3);
        assert_eq!(sel.tickers(), vec!["XOM", "CVX", "LIN"]);
    }

    #[test]
    fn test_required_minimum_evicts_lowest_non_required() {
        let mut cfg = config();
        cfg.required_minimums = BTreeMap::from([(Sector::Healthcare, 1)]);

        let pool = vec![
            stock("MSFT", Sector::Technology, 90.0, &cfg),
            stock("CAT", Sector::Industrials, 85.0, &cfg),
            stock("HON", Sector::Industrials, 70.0, &cfg),
            stock("ADP", Sector::Industrials, 70.0, &cfg),
            stock("JNJ", Sector::Healthcare, 60.0, &cfg),
        ];
        // target 4 -> max per sector min(7, 1) = 1
        let sel = select_diversified(pool, 4, &cfg);
        assert!(sel.tickers().contains(&"JNJ".to_string()));
        assert_eq!(sel.selected.len(), 3);
        assert!(sel.evicted.is_empty());

        let pool = vec![
            stock("MSFT", Sector::Technology, 90.0, &cfg),
            stock("CAT", Sector::Industrials, 85.0, &cfg),
            stock("JNJ", Sector::Healthcare, 60.0, &cfg),
        ];
        cfg.max_sector_fraction = 1.0;
        let sel = select_diversified(pool, 2, &cfg);
        // Universe full after greedy; JNJ displaces the weaker of MSFT/CAT
        assert_eq!(sel.evicted, vec!["CAT"]);
        assert_eq!(sel.tickers(), vec!["MSFT", "JNJ"]);
    }

    #[test]
    fn test_eviction_tie_breaks_alphabetically() {
        let mut cfg = config();
        cfg.max_per_sector = 7;
        cfg.max_sector_fraction = 1.0;
        cfg.required_minimums = BTreeMap::from([(Sector::Utilities, 1)]);

        let pool = vec![
            stock("AAA", Sector::Technology, 70.0, &cfg),
            stock("BBB", Sector::Technology, 70.0, &cfg),
            stock("NEE", Sector::Utilities, 60.0, &cfg),
        ];
        let sel = select_diversified(pool, 2, &cfg);
        assert_eq!(sel.evicted, vec!["AAA"]);
        assert_eq!(sel.tickers(), vec!["BBB", "NEE"]);
    }

    #[test]
    fn test_crypto_never_fills_financial_minimum() {
        let mut cfg = config();
        cfg.required_minimums = BTreeMap::from([(Sector::FinancialServices, 1)]);
        cfg.crypto_tickers = vec!["COIN".into()];
        cfg.max_sector_fraction = 1.0;

        let pool = vec![
            stock("MSFT", Sector::Technology, 90.0, &cfg),
            stock("COIN", Sector::FinancialServices, 80.0, &cfg),
        ];
        // target 1: greedy takes MSFT, COIN cannot satisfy the minimum
        let sel = select_diversified(pool, 1, &cfg);
        assert_eq!(sel.tickers(), vec!["MSFT"]);
        assert!(sel.warnings.iter().any(|w| w.contains("Financial Services")));
    }

    #[test]
    fn test_share_class_duplicate_dropped() {
        let cfg = config();
        let pool = vec![
            stock("GOOGL", Sector::CommunicationServices, 90.0, &cfg),
            stock("GOOG", Sector::CommunicationServices, 91.0, &cfg),
            stock("META", Sector::CommunicationServices, 80.0, &cfg),
        ];
        let sel = select_diversified(pool, 32, &cfg);
        assert_eq!(sel.deduplicated, vec!["GOOG"]);
        assert_eq!(sel.tickers(), vec!["GOOGL", "META"]);
    }

    #[test]
    fn test_validation_warnings() {
        let cfg = config();
        let pool = vec![
            stock("XOM", Sector::Energy, 95.0, &cfg),
            stock("CVX", Sector::Energy, 94.0, &cfg),
            stock("LIN", Sector::BasicMaterials, 93.0, &cfg),
            stock("MSFT", Sector::Technology, 90.0, &cfg),
        ];
        let sel = select_diversified(pool, 32, &cfg);
        let warnings = validate_selection(&sel, &cfg);

        assert!(warnings.iter().any(|w| w.contains("Universe size 4 is below minimum 15")));
        assert!(warnings.iter().any(|w| w.contains("Only 3 sectors")));
        assert!(warnings.iter().any(|w| w.contains("Energy is 50.0%")));
        assert!(warnings.iter().any(|w| w.contains("3 cyclical-sector members")));
    }

    #[test]
    fn test_balanced_selection_has_no_warnings() {
        let cfg = config();
        let sectors = [
            Sector::Technology,
            Sector::Healthcare,
            Sector::Industrials,
            Sector::ConsumerDefensive,
            Sector::Utilities,
        ];
        let pool: Vec<_> = sectors
            .iter()
            .flat_map(|sector| {
                (0..4).map(move |i| (format!("{}{}", &sector.as_str()[..3].to_uppercase(), i), *sector))
            })
            .map(|(t, sector)| stock(&t, sector, 70.0, &cfg))
            .collect();

        let sel = select_diversified(pool, 20, &cfg);
        assert_eq!(sel.selected.len(), 20);
        assert!(validate_selection(&sel, &cfg).is_empty());
    }

    fn arb_sector() -> impl Strategy<Value = Sector> {
        prop::sample::select(Sector::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_caps_hold(
            entries in prop::collection::vec((arb_sector(), 0.0f64..100.0), 0..80),
            target in 1usize..40,
        ) {
            let cfg = UniverseConfig::default();
            let pool: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (sector, score))| stock(&format!("S{}", i), *sector, *score, &cfg))
                .collect();

            let sel = select_diversified(pool, target, &cfg);
            let cap = cfg.max_for_sector(target);

            prop_assert!(sel.selected.len() <= target);
            prop_assert!(sel.cyclical_count <= cfg.max_cyclical);
            for count in sel.sector_counts.values() {
                prop_assert!(*count <= cap);
            }
            for s in &sel.selected {
                prop_assert!(s.score >= cfg.quality_floor);
            }
        }
    }
}
