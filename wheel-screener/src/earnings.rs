//! Earnings safety checks.
//!
//! Selling a put across an earnings report exposes the position to a gap
//! move, so every (ticker, expiration) pair is classified before a trade is
//! considered. The decision itself is the pure [`evaluate_earnings_window`];
//! [`EarningsSafetyChecker`] only adds calendar lookup and caching.
//!
//! What to do when no earnings data exists is always the caller's choice
//! through `allow_unverified`:
//! - `true` (fail-open): proceed with an UNVERIFIED warning
//! - `false` (fail-closed): reject

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::EarningsConfig;
use crate::data::{
    CacheStats, EarningsEvent, EarningsInfo, ProviderError, SharedEarningsCalendar, TtlCache,
    DATE_FORMAT,
};

// ============================================================================
// Decision
// ============================================================================

/// Outcome of an earnings window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EarningsDecision {
    Safe,
    Reject,
    /// Tradeable, but the next report date could not be confirmed
    Unverified,
}

impl fmt::Display for EarningsDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Reject => write!(f, "REJECT"),
            Self::Unverified => write!(f, "UNVERIFIED"),
        }
    }
}

/// Classification of one (ticker, expiration) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsWindowDecision {
    pub ticker: String,
    pub expiration: NaiveDate,
    pub buffer_days: i64,
    pub decision: EarningsDecision,
    /// Earnings date that drove the decision, if any
    pub trigger_date: Option<NaiveDate>,
    pub reason: String,
}

impl EarningsWindowDecision {
    /// SAFE and UNVERIFIED are both tradeable.
    pub fn is_safe(&self) -> bool {
        self.decision != EarningsDecision::Reject
    }

    /// `(is_safe, trigger_date, reason)` view.
    pub fn as_tuple(&self) -> (bool, Option<NaiveDate>, &str) {
        (self.is_safe(), self.trigger_date, &self.reason)
    }
}

/// Inputs of a window check that are not about the ticker's calendar.
#[derive(Debug, Clone, Copy)]
pub struct WindowPolicy {
    pub buffer_days: i64,
    pub allow_unverified: bool,
    /// A last report this recent means the next is beyond the window
    pub recent_report_days: i64,
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Classify a trade window.
///
/// Evaluated in order: manual/ETF whitelist, scheduled next report,
/// recent past report, stale past report, no data. A `next_earnings`
/// already before `today` is treated as a past report.
pub fn evaluate_earnings_window(
    ticker: &str,
    info: Option<EarningsInfo>,
    is_manual: bool,
    expiration: NaiveDate,
    policy: WindowPolicy,
    today: NaiveDate,
) -> EarningsWindowDecision {
    let decide = |decision, trigger_date, reason: String| EarningsWindowDecision {
        ticker: ticker.to_string(),
        expiration,
        buffer_days: policy.buffer_days,
        decision,
        trigger_date,
        reason,
    };

    if is_manual {
        return decide(
            EarningsDecision::Safe,
            None,
            "SAFE - ETF/manual ticker (no earnings)".to_string(),
        );
    }

    let info = info.unwrap_or_default();
    let (last, next) = match info.next_earnings {
        Some(next) if next < today => {
            let last = info.last_earnings.map_or(next, |l| l.max(next));
            (Some(last), None)
        }
        next => (info.last_earnings, next),
    };

    let danger_end = expiration + Duration::days(policy.buffer_days);

    if let Some(next) = next {
        if today <= next && next <= danger_end {
            let days_away = (next - today).num_days();
            return decide(
                EarningsDecision::Reject,
                Some(next),
                format!("REJECT - earnings on {} ({} days away)", fmt_date(next), days_away),
            );
        }
        let margin = (next - danger_end).num_days();
        return decide(
            EarningsDecision::Safe,
            Some(next),
            format!("SAFE - earnings on {} ({} days after buffer)", fmt_date(next), margin),
        );
    }

    if let Some(last) = last {
        let days_since = (today - last).num_days();
        if days_since <= policy.recent_report_days {
            return decide(
                EarningsDecision::Safe,
                Some(last),
                format!(
                    "SAFE - last earnings {}d ago ({}), next not yet scheduled",
                    days_since,
                    fmt_date(last)
                ),
            );
        }
        return if policy.allow_unverified {
            decide(
                EarningsDecision::Unverified,
                Some(last),
                format!(
                    "UNVERIFIED - last earnings {}d ago, manually verify next date",
                    days_since
                ),
            )
        } else {
            decide(
                EarningsDecision::Reject,
                Some(last),
                format!(
                    "REJECTED - last earnings {}d ago, no next date (strict mode)",
                    days_since
                ),
            )
        };
    }

    if policy.allow_unverified {
        decide(
            EarningsDecision::Unverified,
            None,
            "UNVERIFIED - earnings data unavailable, manually verify earnings before trading"
                .to_string(),
        )
    } else {
        decide(
            EarningsDecision::Reject,
            None,
            "REJECTED - earnings date unavailable (strict mode enabled)".to_string(),
        )
    }
}

/// Index a calendar by ticker: most recent report on or before `today`,
/// earliest report after it.
pub fn index_calendar(events: &[EarningsEvent], today: NaiveDate) -> HashMap<String, EarningsInfo> {
    let mut calendar: HashMap<String, EarningsInfo> = HashMap::new();

    for event in events {
        let entry = calendar.entry(event.ticker.clone()).or_default();
        if event.date <= today {
            if entry.last_earnings.map_or(true, |d| event.date > d) {
                entry.last_earnings = Some(event.date);
            }
        } else if entry.next_earnings.map_or(true, |d| event.date < d) {
            entry.next_earnings = Some(event.date);
        }
    }

    calendar
}

// ============================================================================
// Checker
// ============================================================================

type Calendar = Arc<HashMap<String, EarningsInfo>>;

/// Calendar-backed earnings checker with per-ticker caching.
pub struct EarningsSafetyChecker {
    provider: SharedEarningsCalendar,
    clock: SharedClock,
    config: EarningsConfig,
    manual_tickers: HashSet<String>,
    /// `None` records a ticker the calendar does not know
    info_cache: TtlCache<String, Option<EarningsInfo>>,
    calendar_cache: TtlCache<(), Calendar>,
}

impl EarningsSafetyChecker {
    pub fn new(
        provider: SharedEarningsCalendar,
        config: EarningsConfig,
        manual_tickers: impl IntoIterator<Item = String>,
        clock: SharedClock,
    ) -> Self {
        let ttl = Duration::hours(config.cache_ttl_hours);
        Self {
            provider,
            info_cache: TtlCache::new("earnings_info", ttl, clock.clone()),
            calendar_cache: TtlCache::new("earnings_calendar", ttl, clock.clone()),
            clock,
            config,
            manual_tickers: manual_tickers
                .into_iter()
                .map(|t| t.to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn is_manual_ticker(&self, ticker: &str) -> bool {
        self.manual_tickers.contains(&ticker.to_ascii_uppercase())
    }

    async fn calendar(&self) -> Result<Calendar, ProviderError> {
        if let Some(calendar) = self.calendar_cache.get(&()) {
            return Ok(calendar);
        }

        let events = self.provider.get_earnings_calendar().await?;
        let calendar = Arc::new(index_calendar(&events, self.clock.today()));
        info!(
            provider = self.provider.name(),
            events = events.len(),
            tickers = calendar.len(),
            "Indexed earnings calendar"
        );

        self.calendar_cache.insert((), calendar.clone());
        Ok(calendar)
    }

    /// Last and next report dates, `None` when the calendar has no entry.
    ///
    /// Lookup failures are not cached.
    pub async fn get_earnings_info(
        &self,
        ticker: &str,
    ) -> Result<Option<EarningsInfo>, ProviderError> {
        if let Some(cached) = self.info_cache.get(ticker) {
            debug!(ticker = %ticker, "Earnings cache hit");
            return Ok(cached);
        }

        let calendar = self.calendar().await?;
        let info = calendar.get(ticker).copied();
        self.info_cache.insert(ticker.to_string(), info);
        Ok(info)
    }

    /// Classify one (ticker, expiration) pair.
    ///
    /// A failed calendar lookup counts as missing data and falls through to
    /// the `allow_unverified` policy.
    pub async fn check_safe(
        &self,
        ticker: &str,
        expiration: NaiveDate,
        buffer_days: i64,
        allow_unverified: bool,
    ) -> EarningsWindowDecision {
        let policy = WindowPolicy {
            buffer_days,
            allow_unverified,
            recent_report_days: self.config.recent_report_days,
        };
        let today = self.clock.today();

        if self.is_manual_ticker(ticker) {
            return evaluate_earnings_window(ticker, None, true, expiration, policy, today);
        }

        let info = match self.get_earnings_info(ticker).await {
            Ok(info) => info,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "Earnings lookup failed");
                None
            }
        };

        let decision = evaluate_earnings_window(ticker, info, false, expiration, policy, today);
        debug!(
            ticker = %ticker,
            expiration = %expiration,
            decision = %decision.decision,
            reason = %decision.reason,
            "Earnings check"
        );
        decision
    }

    pub async fn batch_check(
        &self,
        tickers: &[String],
        expiration: NaiveDate,
        buffer_days: i64,
        allow_unverified: bool,
    ) -> HashMap<String, EarningsWindowDecision> {
        let mut results = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            let decision = self
                .check_safe(ticker, expiration, buffer_days, allow_unverified)
                .await;
            results.insert(ticker.clone(), decision);
        }
        results
    }

    /// Tickers that are tradeable for the window, in input order.
    pub async fn safe_tickers(
        &self,
        tickers: &[String],
        expiration: NaiveDate,
        buffer_days: i64,
        allow_unverified: bool,
    ) -> Vec<String> {
        let results = self
            .batch_check(tickers, expiration, buffer_days, allow_unverified)
            .await;
        tickers
            .iter()
            .filter(|t| results.get(*t).is_some_and(|d| d.is_safe()))
            .cloned()
            .collect()
    }

    pub fn clear_cache(&self) {
        self.info_cache.clear();
        self.calendar_cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.info_cache.stats()
    }
}

// ============================================================================
// Tests
// ============================================================================
