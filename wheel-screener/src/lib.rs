//! Wheel Screener Library
//!
//! Screens equities for options-income (wheel strategy) trades and produces
//! a ranked, diversification-constrained shortlist of cash-secured puts.
//!
//! # Architecture
//!
//! ```text
//! fundamentals ──► UniverseRankingEngine ──► universe tickers
//!                                              │
//!                     ┌────────────────────────┼───────────────────────┐
//!                     ▼                        ▼                       ▼
//!            VolatilityAnalyzer     EarningsSafetyChecker       option chain
//!                     └────────────────────────┼───────────────────────┘
//!                                              ▼
//!                                      CandidateScorer ──► ranked candidates
//!                                                                │
//!                                  SectorExposureGuard ◄─────────┘ (at execution)
//! ```
//!
//! # Key Concepts
//!
//! ## Universe
//! - Hard fundamental floors, cash-flow and bankruptcy-safety checks
//! - Quality score from percentile ranks within each sector
//! - Greedy diversified selection with per-sector and cyclical caps
//!
//! ## Per-trade screening
//! - IV rank from a 52-week realised-volatility proxy range
//! - Term structure from front/back-month ATM implied volatility
//! - Earnings window: SAFE, REJECT or UNVERIFIED per expiration
//! - Contract score from premium, liquidity, spread and delta

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod candidate;
pub mod clock;
pub mod config;
pub mod data;
pub mod earnings;
pub mod error;
pub mod exposure;
pub mod numeric;
pub mod pipeline;
pub mod universe;
pub mod volatility;

pub use candidate::{Candidate, CandidateScorer, CompositeBreakdown, OptionScore};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{
    EarningsConfig, ExposureConfig, FetchConfig, ScreenerConfig, UniverseConfig, VolatilityConfig,
    WheelConfig,
};
pub use data::{
    EarningsCalendarProvider, FundamentalsProvider, MarketDataProvider, OptionContract,
    OptionQuery, OptionType, ProviderError, Quote, Sector,
};
pub use earnings::{EarningsDecision, EarningsSafetyChecker, EarningsWindowDecision};
pub use error::{Result, ScreenerError};
pub use exposure::{
    ExposureCheck, ExposureReport, ExposureSnapshot, Position, PositionStatus, SectorExposureGuard,
};
pub use pipeline::{Rejection, ScreenResult, WheelScreener};
pub use universe::{StockFundamentals, UniverseBuild, UniverseRankingEngine};
pub use volatility::{TermStructure, VolatilityAnalyzer, VolatilityProfile};
