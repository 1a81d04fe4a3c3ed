//! Portfolio sector-exposure guard.
//!
//! Advisory pre-trade check against an externally owned position ledger.
//! The guard never mutates the ledger: it aggregates a read-only
//! [`ExposureSnapshot`] and decides whether a proposed trade fits the
//! per-sector position-count and capital limits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::ExposureConfig;
use crate::data::Sector;
use crate::numeric::{desc, round_dp};

// ============================================================================
// Ledger Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
    Assigned,
}

/// One ledger row as seen by the guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub sector: Sector,
    /// Cash secured for the position (strike x 100 per contract)
    pub capital_deployed: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn open(ticker: &str, sector: Sector, capital_deployed: f64) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            sector,
            capital_deployed,
            status: PositionStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

/// Aggregated exposure for one sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorExposure {
    pub positions: usize,
    pub capital_deployed: f64,
    /// Percent of total account capital, one decimal
    pub pct_of_capital: f64,
    pub tickers: Vec<String>,
}

/// Per-sector view of the open positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub total_capital: f64,
    pub sectors: BTreeMap<Sector, SectorExposure>,
}

fn pct_of(capital: f64, total: f64) -> f64 {
    if total > 0.0 {
        capital / total
    } else {
        0.0
    }
}

impl ExposureSnapshot {
    /// Aggregate the open rows of `positions`. Closed rows are ignored.
    pub fn from_positions(positions: &[Position], total_capital: f64) -> Self {
        let mut sectors: BTreeMap<Sector, SectorExposure> = BTreeMap::new();

        for position in positions.iter().filter(|p| p.is_open()) {
            let entry = sectors.entry(position.sector).or_insert_with(|| SectorExposure {
                positions: 0,
                capital_deployed: 0.0,
                pct_of_capital: 0.0,
                tickers: Vec::new(),
            });
            entry.positions += 1;
            entry.capital_deployed += position.capital_deployed;
            entry.tickers.push(position.ticker.clone());
        }

        for exposure in sectors.values_mut() {
            exposure.pct_of_capital =
                round_dp(pct_of(exposure.capital_deployed, total_capital) * 100.0, 1);
        }

        Self {
            total_capital,
            sectors,
        }
    }

    pub fn empty(total_capital: f64) -> Self {
        Self {
            total_capital,
            sectors: BTreeMap::new(),
        }
    }

    pub fn get(&self, sector: Sector) -> Option<&SectorExposure> {
        self.sectors.get(&sector)
    }

    pub fn positions_in(&self, sector: Sector) -> usize {
        self.get(sector).map_or(0, |e| e.positions)
    }

    pub fn capital_in(&self, sector: Sector) -> f64 {
        self.get(sector).map_or(0.0, |e| e.capital_deployed)
    }

    pub fn active_sectors(&self) -> usize {
        self.sectors.len()
    }

    pub fn total_deployed(&self) -> f64 {
        self.sectors.values().map(|e| e.capital_deployed).sum()
    }

    pub fn total_positions(&self) -> usize {
        self.sectors.values().map(|e| e.positions).sum()
    }
}

// ============================================================================
// Check Result
// ============================================================================

/// Outcome of a pre-trade exposure check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureCheck {
    pub can_deploy: bool,
    pub reason: String,
    /// Post-trade sector exposure as a fraction of total capital
    pub projected_fraction: f64,
    pub projected_positions: usize,
}

impl ExposureCheck {
    pub fn is_warning(&self) -> bool {
        self.can_deploy && self.reason.starts_with("WARN")
    }

    pub fn as_tuple(&self) -> (bool, &str) {
        (self.can_deploy, &self.reason)
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureFlag {
    Limit,
    Warn,
    MaxPositions,
}

impl fmt::Display for ExposureFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "[LIMIT]"),
            Self::Warn => write!(f, "[WARN]"),
            Self::MaxPositions => write!(f, "[MAX POS]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureReportRow {
    pub sector: Sector,
    pub positions: usize,
    pub capital_deployed: f64,
    pub pct_of_capital: f64,
    pub tickers: Vec<String>,
    pub flag: Option<ExposureFlag>,
}

/// Read-only exposure summary, largest sector first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureReport {
    pub rows: Vec<ExposureReportRow>,
    pub total_positions: usize,
    pub total_deployed: f64,
    pub total_pct: f64,
    pub active_sectors: usize,
    pub min_sectors: usize,
}

impl ExposureReport {
    pub fn meets_min_sectors(&self) -> bool {
        self.active_sectors >= self.min_sectors
    }

    pub fn flagged(&self) -> impl Iterator<Item = &ExposureReportRow> {
        self.rows.iter().filter(|r| r.flag.is_some())
    }
}

impl fmt::Display for ExposureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "No open positions - sector exposure: 0%");
        }

        let rule = "=".repeat(70);
        let thin = "-".repeat(70);
        writeln!(f, "{}", rule)?;
        writeln!(f, "SECTOR EXPOSURE REPORT")?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "{:<25} {:<12} {:<15} {:<15}",
            "Sector", "Positions", "Capital", "% of Capital"
        )?;
        writeln!(f, "{}", thin)?;

        for row in &self.rows {
            let flag = row.flag.map(|fl| fl.to_string()).unwrap_or_default();
            writeln!(
                f,
                "{:<25} {:<12} ${:>13.0} {:>13.1}%  {}",
                row.sector.as_str(),
                row.positions,
                row.capital_deployed,
                row.pct_of_capital,
                flag
            )?;
            writeln!(f, "  -> {}", row.tickers.join(", "))?;
        }

        writeln!(f, "{}", thin)?;
        writeln!(
            f,
            "{:<25} {:<12} ${:>13.0} {:>13.1}%",
            "TOTAL DEPLOYED", self.total_positions, self.total_deployed, self.total_pct
        )?;

        let status = if self.meets_min_sectors() {
            format!("[OK] (min {})", self.min_sectors)
        } else {
            format!("[WARN] (min {} required)", self.min_sectors)
        };
        writeln!(f, "\nActive sectors: {} {}", self.active_sectors, status)?;
        writeln!(f, "{}", rule)
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Checks proposed trades against sector limits.
#[derive(Debug, Clone)]
pub struct SectorExposureGuard {
    config: ExposureConfig,
}

impl SectorExposureGuard {
    pub fn new(config: ExposureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExposureConfig {
        &self.config
    }

    /// Snapshot using the configured account capital.
    pub fn snapshot(&self, positions: &[Position]) -> ExposureSnapshot {
        ExposureSnapshot::from_positions(positions, self.config.total_capital)
    }

    /// Decide whether `new_capital` in `new_sector` may be deployed.
    ///
    /// Rejects when the sector already holds the maximum position count or
    /// when the post-trade exposure would exceed the maximum fraction.
    /// Approvals carry `WARN:` reasons at or above the warning thresholds.
    pub fn check_limits(
        &self,
        new_ticker: &str,
        new_sector: Sector,
        new_capital: f64,
        current: &ExposureSnapshot,
    ) -> ExposureCheck {
        let cfg = &self.config;
        let current_positions = current.positions_in(new_sector);
        let current_capital = current.capital_in(new_sector);
        let projected_positions = current_positions + 1;
        let projected_fraction = pct_of(current_capital + new_capital, current.total_capital);

        if current.total_capital.is_nan() || current.total_capital <= 0.0 {
            let reason = "REJECTED: total capital must be positive".to_string();
            warn!(
                ticker = %new_ticker,
                sector = %new_sector,
                total_capital = current.total_capital,
                "{}",
                reason
            );
            return ExposureCheck {
                can_deploy: false,
                reason,
                projected_fraction,
                projected_positions,
            };
        }

        if current_positions >= cfg.max_positions_per_sector {
            let reason = format!(
                "REJECTED: Already have {} {} positions (max {})",
                current_positions, new_sector, cfg.max_positions_per_sector
            );
            info!(ticker = %new_ticker, sector = %new_sector, "{}", reason);
            return ExposureCheck {
                can_deploy: false,
                reason,
                projected_fraction,
                projected_positions,
            };
        }

        if projected_fraction > cfg.max_sector_pct {
            let current_pct = pct_of(current_capital, current.total_capital) * 100.0;
            let reason = format!(
                "REJECTED: Would create {:.1}% {} exposure (current: {:.1}%, max: {:.0}%)",
                projected_fraction * 100.0,
                new_sector,
                current_pct,
                cfg.max_sector_pct * 100.0
            );
            info!(ticker = %new_ticker, sector = %new_sector, "{}", reason);
            return ExposureCheck {
                can_deploy: false,
                reason,
                projected_fraction,
                projected_positions,
            };
        }

        let mut warnings = Vec::new();
        if projected_positions >= cfg.warn_positions_per_sector {
            warnings.push(format!(
                "WARN: Will have {} {} positions",
                projected_positions, new_sector
            ));
        }
        if projected_fraction >= cfg.warn_sector_pct {
            warnings.push(format!(
                "WARN: {} exposure will be {:.1}% (approaching {:.0}% limit)",
                new_sector,
                projected_fraction * 100.0,
                cfg.max_sector_pct * 100.0
            ));
        }

        let reason = if warnings.is_empty() {
            format!(
                "OK: {} exposure will be {:.1}% ({} position{})",
                new_sector,
                projected_fraction * 100.0,
                projected_positions,
                if projected_positions > 1 { "s" } else { "" }
            )
        } else {
            warnings.join(" | ")
        };

        debug!(ticker = %new_ticker, sector = %new_sector, reason = %reason, "Exposure check passed");

        ExposureCheck {
            can_deploy: true,
            reason,
            projected_fraction,
            projected_positions,
        }
    }

    /// Per-sector report with limit flags and the sector-diversity check.
    pub fn report(&self, current: &ExposureSnapshot) -> ExposureReport {
        let cfg = &self.config;
        let max_pct = cfg.max_sector_pct * 100.0;
        let warn_pct = cfg.warn_sector_pct * 100.0;

        let mut rows: Vec<ExposureReportRow> = current
            .sectors
            .iter()
            .map(|(sector, exposure)| {
                let flag = if exposure.pct_of_capital >= max_pct {
                    Some(ExposureFlag::Limit)
                } else if exposure.pct_of_capital >= warn_pct {
                    Some(ExposureFlag::Warn)
                } else if exposure.positions >= cfg.max_positions_per_sector {
                    Some(ExposureFlag::MaxPositions)
                } else {
                    None
                };
                ExposureReportRow {
                    sector: *sector,
                    positions: exposure.positions,
                    capital_deployed: exposure.capital_deployed,
                    pct_of_capital: exposure.pct_of_capital,
                    tickers: exposure.tickers.clone(),
                    flag,
                }
            })
            .collect();
        rows.sort_by(|a, b| desc(a.capital_deployed, b.capital_deployed));

        let total_deployed = current.total_deployed();
        ExposureReport {
            rows,
            total_positions: current.total_positions(),
            total_deployed,
            total_pct: round_dp(pct_of(total_deployed, current.total_capital) * 100.0, 1),
            active_sectors: current.active_sectors(),
            min_sectors: cfg.min_sectors,
        }
    }
}

impl Default for SectorExposureGuard {
    fn default() -> Self {
        Self::new(ExposureConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Vec<Position> {
        vec![
            Position::open("MSFT", Sector::Technology, 7_000.0),
            Position::open("GOOGL", Sector::Technology, 7_500.0),
            Position::open("V", Sector::FinancialServices, 7_000.0),
            Position {
                ticker: "KO".into(),
                sector: Sector::ConsumerDefensive,
                capital_deployed: 6_000.0,
                status: PositionStatus::Closed,
            },
        ]
    }

    #[test]
    fn test_snapshot_ignores_closed_positions() {
        let snapshot = ExposureSnapshot::from_positions(&ledger(), 44_500.0);
        assert_eq!(snapshot.active_sectors(), 2);
        let tech = snapshot.get(Sector::Technology).unwrap();
        assert_eq!(tech.positions, 2);
        assert_eq!(tech.capital_deployed, 14_500.0);
        assert_eq!(tech.pct_of_capital, 32.6);
        assert_eq!(tech.tickers, vec!["MSFT", "GOOGL"]);
        assert!(snapshot.get(Sector::ConsumerDefensive).is_none());
    }

    #[test]
    fn test_zero_capital_snapshot_is_rejected() {
        let guard = SectorExposureGuard::default();

        for snapshot in [
            ExposureSnapshot::empty(0.0),
            ExposureSnapshot::from_positions(&ledger(), 0.0),
            ExposureSnapshot::empty(-1.0),
            ExposureSnapshot::empty(f64::NAN),
        ] {
            let check = guard.check_limits("XOM", Sector::Energy, 1_000_000.0, &snapshot);
            assert!(!check.can_deploy);
            assert_eq!(check.reason, "REJECTED: total capital must be positive");
        }
    }

    #[test]
    fn test_first_position_is_ok() {
        let guard = SectorExposureGuard::default();
        let snapshot = ExposureSnapshot::empty(44_500.0);
        let check = guard.check_limits("KO", Sector::ConsumerDefensive, 6_000.0, &snapshot);
        assert!(check.can_deploy);
        assert_eq!(check.reason, "OK: Consumer Defensive exposure will be 13.5% (1 position)");
    }

    #[test]
    fn test_second_position_warns_on_count() {
        let guard = SectorExposureGuard::default();
        let snapshot = guard.snapshot(&ledger());
        let check = guard.check_limits("JPM", Sector::FinancialServices, 5_000.0, &snapshot);
        assert!(check.can_deploy);
        assert!(check.is_warning());
        assert_eq!(check.reason, "WARN: Will have 2 Financial Services positions");
    }

    #[test]
    fn test_exposure_above_max_is_rejected() {
        let guard = SectorExposureGuard::default();
        let snapshot = guard.snapshot(&ledger());
        let check = guard.check_limits("NVDA", Sector::Technology, 4_000.0, &snapshot);
        assert!(!check.can_deploy);
        assert_eq!(
            check.reason,
            "REJECTED: Would create 41.6% Technology exposure (current: 32.6%, max: 40%)"
        );
    }

    #[test]
    fn test_both_warnings_are_joined() {
        let guard = SectorExposureGuard::default();
        let snapshot = guard.snapshot(&ledger());
        let check = guard.check_limits("AAPL", Sector::Technology, 2_000.0, &snapshot);
        assert!(check.can_deploy);
        assert_eq!(
            check.reason,
            "WARN: Will have 3 Technology positions | WARN: Technology exposure will be 37.1% (approaching 40% limit)"
        );
    }

    #[test]
    fn test_position_count_limit_is_rejected() {
        let guard = SectorExposureGuard::default();
        let mut positions = ledger();
        positions.push(Position::open("TSM", Sector::Technology, 1_000.0));
        let snapshot = guard.snapshot(&positions);

        let check = guard.check_limits("AMD", Sector::Technology, 500.0, &snapshot);
        assert!(!check.can_deploy);
        assert_eq!(check.reason, "REJECTED: Already have 3 Technology positions (max 3)");
    }

    #[test]
    fn test_exactly_at_max_is_allowed() {
        let guard = SectorExposureGuard::default();
        let snapshot = ExposureSnapshot::empty(10_000.0);
        let check = guard.check_limits("XOM", Sector::Energy, 4_000.0, &snapshot);
        assert!(check.can_deploy);
        assert!(check.reason.contains("approaching 40% limit"));
    }

    #[test]
    fn test_report_flags_and_diversity() {
        let guard = SectorExposureGuard::default();
        let mut positions = ledger();
        positions.push(Position::open("TSM", Sector::Technology, 4_000.0));
        let report = guard.report(&guard.snapshot(&positions));

        assert_eq!(report.rows[0].sector, Sector::Technology);
        assert_eq!(report.rows[0].flag, Some(ExposureFlag::Limit));
        assert_eq!(report.rows[1].flag, None);
        assert_eq!(report.total_positions, 4);
        assert_eq!(report.total_deployed, 25_500.0);
        assert_eq!(report.active_sectors, 2);
        assert!(!report.meets_min_sectors());

        let text = report.to_string();
        assert!(text.contains("[LIMIT]"));
        assert!(text.contains("[WARN] (min 3 required)"));
    }

    #[test]
    fn test_report_on_empty_ledger() {
        let guard = SectorExposureGuard::default();
        let report = guard.report(&guard.snapshot(&[]));
        assert!(report.rows.is_empty());
        assert_eq!(report.to_string().trim(), "No open positions - sector exposure: 0%");
    }
}
