//! Screener configuration module.
//!
//! Every threshold the screener applies is an explicit, typed field here.
//! All fields carry serde defaults, so an empty JSON object (or no config
//! files at all) yields the stock configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use wheel_common::validation::{check_fraction, check_positive, check_range, collect_errors};
use wheel_common::{ResultExt, Validate, ValidationError, ValidationResult};

use crate::data::Sector;

// ============================================================================
// Main Screener Configuration
// ============================================================================

/// Configuration for the whole screener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Universe ranking thresholds
    #[serde(default)]
    pub universe: UniverseConfig,

    /// Per-trade wheel screening thresholds
    #[serde(default)]
    pub wheel: WheelConfig,

    #[serde(default)]
    pub volatility: VolatilityConfig,

    #[serde(default)]
    pub earnings: EarningsConfig,

    #[serde(default)]
    pub exposure: ExposureConfig,

    /// Data fetch behaviour at the provider boundary
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScreenerConfig {
    /// Load from the standard config files in `dir` (default
    /// `~/.wheel-screener/`) and validate.
    pub fn load(dir: Option<PathBuf>) -> wheel_common::Result<Self> {
        let config: Self = wheel_common::load_typed_config(dir)
            .map_err(|e| wheel_common::Error::Config(format!("{e:#}")))?;
        config.validate().context("validating screener config")?;
        Ok(config)
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let errors: Vec<ValidationError> = [
            self.universe.validate(),
            self.wheel.validate(),
            self.volatility.validate(),
            self.earnings.validate(),
            self.exposure.validate(),
            self.fetch.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .flat_map(|e| match e {
            ValidationError::Multiple(inner) => inner,
            other => vec![other],
        })
        .collect();
        collect_errors(errors)
    }
}

// ============================================================================
// Universe Configuration
// ============================================================================

/// Weights of the within-sector percentile blend. Sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_weight_debt_to_equity")]
    pub debt_to_equity: f64,
    #[serde(default = "default_weight_current_ratio")]
    pub current_ratio: f64,
    #[serde(default = "default_weight_roe_consistency")]
    pub roe_consistency: f64,
    #[serde(default = "default_weight_fcf_margin")]
    pub fcf_margin: f64,
    #[serde(default = "default_weight_revenue_growth")]
    pub revenue_growth: f64,
    #[serde(default = "default_weight_gross_margin")]
    pub gross_margin: f64,
    #[serde(default = "default_weight_operating_margin")]
    pub operating_margin: f64,
    #[serde(default = "default_weight_volume")]
    pub volume: f64,
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.debt_to_equity
            + self.current_ratio
            + self.roe_consistency
            + self.fcf_margin
            + self.revenue_growth
            + self.gross_margin
            + self.operating_margin
            + self.volume
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            debt_to_equity: default_weight_debt_to_equity(),
            current_ratio: default_weight_current_ratio(),
            roe_consistency: default_weight_roe_consistency(),
            fcf_margin: default_weight_fcf_margin(),
            revenue_growth: default_weight_revenue_growth(),
            gross_margin: default_weight_gross_margin(),
            operating_margin: default_weight_operating_margin(),
            volume: default_weight_volume(),
        }
    }
}

fn default_weight_debt_to_equity() -> f64 {
    20.0
}

fn default_weight_current_ratio() -> f64 {
    15.0
}

fn default_weight_roe_consistency() -> f64 {
    15.0
}

fn default_weight_fcf_margin() -> f64 {
    15.0
}

fn default_weight_revenue_growth() -> f64 {
    10.0
}

fn default_weight_gross_margin() -> f64 {
    10.0
}

fn default_weight_operating_margin() -> f64 {
    10.0
}

fn default_weight_volume() -> f64 {
    5.0
}

/// Universe ranking configuration.
///
/// Percent-valued thresholds (margins, ROE, analyst buy share) are in
/// percent; ratios are plain numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Default universe size
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    // === Data Quality ===

    /// Maximum fraction of rows allowed to miss a scoring metric
    #[serde(default = "default_max_missing_pct")]
    pub max_missing_pct: f64,

    /// IQR multiplier for outlier removal
    #[serde(default = "default_outlier_iqr_multiplier")]
    pub outlier_iqr_multiplier: f64,

    /// Pool size after hard filters below which a warning is raised
    #[serde(default = "default_min_admissible_pool")]
    pub min_admissible_pool: usize,

    // === Hard Filters ===

    #[serde(default = "default_min_market_cap")]
    pub min_market_cap: f64,

    #[serde(default = "default_universe_price_min")]
    pub price_min: f64,

    #[serde(default = "default_universe_price_max")]
    pub price_max: f64,

    #[serde(default = "default_pe_max")]
    pub pe_max: f64,

    /// Healthcare P/E is often distorted by write-offs; allowed up to this
    #[serde(default = "default_healthcare_pe_max")]
    pub healthcare_pe_max: f64,

    #[serde(default = "default_operating_margin_min")]
    pub operating_margin_min: f64,

    #[serde(default = "default_roe_min")]
    pub roe_min: f64,

    #[serde(default = "default_utilities_roe_min")]
    pub utilities_roe_min: f64,

    #[serde(default = "default_current_ratio_min")]
    pub current_ratio_min: f64,

    /// Current-ratio floor for Consumer Defensive and Utilities
    #[serde(default = "default_relaxed_current_ratio_min")]
    pub relaxed_current_ratio_min: f64,

    #[serde(default = "default_debt_to_equity_max")]
    pub debt_to_equity_max: f64,

    /// Debt/equity ceiling for Consumer Defensive
    #[serde(default = "default_relaxed_debt_to_equity_max")]
    pub relaxed_debt_to_equity_max: f64,

    #[serde(default = "default_gross_margin_min")]
    pub gross_margin_min: f64,

    #[serde(default = "default_fcf_margin_min")]
    pub fcf_margin_min: f64,

    /// Drop Healthcare names whose industry mentions biotechnology
    #[serde(default = "default_true")]
    pub exclude_biotech: bool,

    // === Advanced Filters ===

    #[serde(default = "default_altman_z_min")]
    pub altman_z_min: f64,

    #[serde(default = "default_piotroski_min")]
    pub piotroski_min: u8,

    #[serde(default = "default_analyst_buy_pct_min")]
    pub analyst_buy_pct_min: f64,

    // === Scoring ===

    #[serde(default)]
    pub weights: ScoringWeights,

    #[serde(default)]
    pub bonus: BonusConfig,

    /// Multiplier for cyclical names
    #[serde(default = "default_penalty_factor")]
    pub cyclical_penalty: f64,

    /// Multiplier for high geopolitical-risk names
    #[serde(default = "default_penalty_factor")]
    pub geopolitical_penalty: f64,

    #[serde(default = "default_cyclical_sectors")]
    pub cyclical_sectors: Vec<Sector>,

    #[serde(default = "default_crypto_tickers")]
    pub crypto_tickers: Vec<String>,

    #[serde(default = "default_cyclical_consumer_tickers")]
    pub cyclical_consumer_tickers: Vec<String>,

    #[serde(default = "default_geopolitical_tickers")]
    pub geopolitical_tickers: Vec<String>,

    // === Selection ===

    /// No stock below this score is admitted
    #[serde(default = "default_quality_floor")]
    pub quality_floor: f64,

    #[serde(default = "default_max_per_sector")]
    pub max_per_sector: usize,

    /// Per-sector cap as a fraction of the target size
    #[serde(default = "default_max_sector_fraction")]
    pub max_sector_fraction: f64,

    #[serde(default = "default_max_cyclical")]
    pub max_cyclical: usize,

    #[serde(default = "default_required_minimums")]
    pub required_minimums: BTreeMap<Sector, usize>,

    /// Secondary share class -> primary listing
    #[serde(default = "default_share_class_duplicates")]
    pub share_class_duplicates: BTreeMap<String, String>,

    #[serde(default)]
    pub checks: UniverseChecks,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            max_missing_pct: default_max_missing_pct(),
            outlier_iqr_multiplier: default_outlier_iqr_multiplier(),
            min_admissible_pool: default_min_admissible_pool(),
            min_market_cap: default_min_market_cap(),
            price_min: default_universe_price_min(),
            price_max: default_universe_price_max(),
            pe_max: default_pe_max(),
            healthcare_pe_max: default_healthcare_pe_max(),
            operating_margin_min: default_operating_margin_min(),
            roe_min: default_roe_min(),
            utilities_roe_min: default_utilities_roe_min(),
            current_ratio_min: default_current_ratio_min(),
            relaxed_current_ratio_min: default_relaxed_current_ratio_min(),
            debt_to_equity_max: default_debt_to_equity_max(),
            relaxed_debt_to_equity_max: default_relaxed_debt_to_equity_max(),
            gross_margin_min: default_gross_margin_min(),
            fcf_margin_min: default_fcf_margin_min(),
            exclude_biotech: true,
            altman_z_min: default_altman_z_min(),
            piotroski_min: default_piotroski_min(),
            analyst_buy_pct_min: default_analyst_buy_pct_min(),
            weights: ScoringWeights::default(),
            bonus: BonusConfig::default(),
            cyclical_penalty: default_penalty_factor(),
            geopolitical_penalty: default_penalty_factor(),
            cyclical_sectors: default_cyclical_sectors(),
            crypto_tickers: default_crypto_tickers(),
            cyclical_consumer_tickers: default_cyclical_consumer_tickers(),
            geopolitical_tickers: default_geopolitical_tickers(),
            quality_floor: default_quality_floor(),
            max_per_sector: default_max_per_sector(),
            max_sector_fraction: default_max_sector_fraction(),
            max_cyclical: default_max_cyclical(),
            required_minimums: default_required_minimums(),
            share_class_duplicates: default_share_class_duplicates(),
            checks: UniverseChecks::default(),
        }
    }
}

impl UniverseConfig {
    /// Per-sector cap for a given target size.
    pub fn max_for_sector(&self, target_size: usize) -> usize {
        let fractional = (target_size as f64 * self.max_sector_fraction).floor() as usize;
        self.max_per_sector.min(fractional)
    }

    pub fn is_crypto(&self, ticker: &str) -> bool {
        self.crypto_tickers.iter().any(|t| t == ticker)
    }

    /// Cyclical sector, crypto-correlated or cyclical-consumer name.
    pub fn is_cyclical(&self, ticker: &str, sector: Sector) -> bool {
        self.cyclical_sectors.contains(&sector)
            || self.is_crypto(ticker)
            || self.cyclical_consumer_tickers.iter().any(|t| t == ticker)
    }

    pub fn is_geopolitical(&self, ticker: &str) -> bool {
        self.geopolitical_tickers.iter().any(|t| t == ticker)
    }
}

impl Validate for UniverseConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.target_size == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "universe.target_size".into(),
                reason: "must be greater than 0".into(),
            });
        }
        let checks = [
            check_fraction("universe.max_missing_pct", self.max_missing_pct),
            check_positive("universe.outlier_iqr_multiplier", self.outlier_iqr_multiplier),
            check_range("universe.price", self.price_min, self.price_max),
            check_fraction("universe.max_sector_fraction", self.max_sector_fraction),
            check_fraction("universe.cyclical_penalty", self.cyclical_penalty),
            check_fraction("universe.geopolitical_penalty", self.geopolitical_penalty),
        ];
        errors.extend(checks.into_iter().filter_map(Result::err));

        if (self.weights.total() - 100.0).abs() > 1e-6 {
            errors.push(ValidationError::InvalidValue {
                field: "universe.weights".into(),
                reason: format!("weights sum to {} instead of 100", self.weights.total()),
            });
        }

        collect_errors(errors)
    }
}

/// Bonus points for elite balance sheets and strong analyst sentiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusConfig {
    /// Bankruptcy score must exceed this for the health bonus
    #[serde(default = "default_elite_altman_z")]
    pub elite_altman_z: f64,

    /// Quality ordinal must reach this for the health bonus
    #[serde(default = "default_elite_piotroski")]
    pub elite_piotroski: u8,

    #[serde(default = "default_financial_health_bonus")]
    pub financial_health_bonus: f64,

    #[serde(default = "default_elite_analyst_buy_pct")]
    pub elite_analyst_buy_pct: f64,

    #[serde(default = "default_elite_analyst_bonus")]
    pub elite_analyst_bonus: f64,

    #[serde(default = "default_strong_analyst_buy_pct")]
    pub strong_analyst_buy_pct: f64,

    #[serde(default = "default_strong_analyst_bonus")]
    pub strong_analyst_bonus: f64,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            elite_altman_z: default_elite_altman_z(),
            elite_piotroski: default_elite_piotroski(),
            financial_health_bonus: default_financial_health_bonus(),
            elite_analyst_buy_pct: default_elite_analyst_buy_pct(),
            elite_analyst_bonus: default_elite_analyst_bonus(),
            strong_analyst_buy_pct: default_strong_analyst_buy_pct(),
            strong_analyst_bonus: default_strong_analyst_bonus(),
        }
    }
}

/// Post-selection sanity checks; violations become warnings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseChecks {
    #[serde(default = "default_min_universe_size")]
    pub min_size: usize,

    #[serde(default = "default_min_universe_sectors")]
    pub min_sectors: usize,

    #[serde(default = "default_max_sector_concentration")]
    pub max_sector_concentration: f64,

    /// Maximum members from cyclical sectors
    #[serde(default = "default_max_cyclical_sector_members")]
    pub max_cyclical_sector_members: usize,
}

impl Default for UniverseChecks {
    fn default() -> Self {
        Self {
            min_size: default_min_universe_size(),
            min_sectors: default_min_universe_sectors(),
            max_sector_concentration: default_max_sector_concentration(),
            max_cyclical_sector_members: default_max_cyclical_sector_members(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_target_size() -> usize {
    32
}

fn default_max_missing_pct() -> f64 {
    0.10
}

fn default_outlier_iqr_multiplier() -> f64 {
    3.0
}

fn default_min_admissible_pool() -> usize {
    15
}

fn default_min_market_cap() -> f64 {
    10_000_000_000.0 // $10B
}

fn default_universe_price_min() -> f64 {
    15.0
}

fn default_universe_price_max() -> f64 {
    600.0
}

fn default_pe_max() -> f64 {
    50.0
}

fn default_healthcare_pe_max() -> f64 {
    300.0
}

fn default_operating_margin_min() -> f64 {
    2.0
}

fn default_roe_min() -> f64 {
    10.0
}

fn default_utilities_roe_min() -> f64 {
    8.0
}

fn default_current_ratio_min() -> f64 {
    1.0
}

fn default_relaxed_current_ratio_min() -> f64 {
    0.6
}

fn default_debt_to_equity_max() -> f64 {
    1.0
}

fn default_relaxed_debt_to_equity_max() -> f64 {
    2.0
}

fn default_gross_margin_min() -> f64 {
    15.0
}

fn default_fcf_margin_min() -> f64 {
    2.0
}

fn default_altman_z_min() -> f64 {
    2.0
}

fn default_piotroski_min() -> u8 {
    4
}

fn default_analyst_buy_pct_min() -> f64 {
    40.0
}

fn default_penalty_factor() -> f64 {
    0.80
}

fn default_elite_altman_z() -> f64 {
    3.0
}

fn default_elite_piotroski() -> u8 {
    7
}

fn default_financial_health_bonus() -> f64 {
    5.0
}

fn default_elite_analyst_buy_pct() -> f64 {
    80.0
}

fn default_elite_analyst_bonus() -> f64 {
    5.0
}

fn default_strong_analyst_buy_pct() -> f64 {
    70.0
}

fn default_strong_analyst_bonus() -> f64 {
    3.0
}

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

fn default_cyclical_sectors() -> Vec<Sector> {
    vec![Sector::BasicMaterials, Sector::Energy]
}

fn default_crypto_tickers() -> Vec<String> {
    tickers(&["COIN", "MARA", "RIOT", "CLSK", "HUT", "BITF", "HOOD"])
}

fn default_cyclical_consumer_tickers() -> Vec<String> {
    tickers(&["LULU", "NKE", "SBUX", "MCD", "HD", "LOW", "TJX", "ROST"])
}

fn default_geopolitical_tickers() -> Vec<String> {
    tickers(&[
        "PDD", "BABA", "JD", "NIO", "XPEV", "LI", "BIDU", "TME", "TCOM", "FUTU",
    ])
}

fn default_quality_floor() -> f64 {
    48.0
}

fn default_max_per_sector() -> usize {
    7
}

fn default_max_sector_fraction() -> f64 {
    0.25
}

fn default_max_cyclical() -> usize {
    3
}

fn default_required_minimums() -> BTreeMap<Sector, usize> {
    BTreeMap::from([
        (Sector::ConsumerDefensive, 3),
        (Sector::Healthcare, 3),
        (Sector::FinancialServices, 2),
    ])
}

fn default_share_class_duplicates() -> BTreeMap<String, String> {
    BTreeMap::from([("GOOG".to_string(), "GOOGL".to_string())])
}

fn default_min_universe_size() -> usize {
    15
}

fn default_min_universe_sectors() -> usize {
    4
}

fn default_max_sector_concentration() -> f64 {
    0.30
}

fn default_max_cyclical_sector_members() -> usize {
    2
}

// ============================================================================
// Wheel Configuration
// ============================================================================

/// Per-trade screening thresholds for cash-secured puts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    #[serde(default = "default_wheel_price_min")]
    pub price_min: f64,

    #[serde(default = "default_wheel_price_max")]
    pub price_max: f64,

    #[serde(default = "default_dte_min")]
    pub dte_min: i64,

    #[serde(default = "default_dte_max")]
    pub dte_max: i64,

    /// DTE band that earns the full proximity score
    #[serde(default = "default_dte_preferred_min")]
    pub dte_preferred_min: i64,

    #[serde(default = "default_dte_preferred_max")]
    pub dte_preferred_max: i64,

    /// Absolute put delta window
    #[serde(default = "default_delta_min")]
    pub delta_min: f64,

    #[serde(default = "default_delta_max")]
    pub delta_max: f64,

    /// Minimum IV rank before the `lowIv` warning is set
    #[serde(default = "default_iv_rank_min")]
    pub iv_rank_min: f64,

    /// IV rank earning the full IV tier
    #[serde(default = "default_iv_rank_preferred")]
    pub iv_rank_preferred: f64,

    /// Volume below this raises a "low volume" warning
    #[serde(default = "default_volume_min")]
    pub volume_min: u64,

    /// Open interest below this raises a "low OI" warning
    #[serde(default = "default_open_interest_min")]
    pub open_interest_min: u64,

    /// Spread fraction above this raises a "wide spread" warning
    #[serde(default = "default_spread_warn_pct")]
    pub spread_warn_pct: f64,

    /// Bid/strike fraction below which a premium warning is raised
    #[serde(default = "default_premium_min_pct")]
    pub premium_min_pct: f64,

    #[serde(default = "default_earnings_buffer_days")]
    pub earnings_buffer_days: i64,

    /// Fail-open policy for missing earnings data
    #[serde(default = "default_true")]
    pub allow_unverified: bool,

    /// Ranked alternates kept per candidate
    #[serde(default = "default_top_options")]
    pub top_options: usize,

    /// Tickers without earnings reports (ETFs, manual overrides)
    #[serde(default = "default_manual_tickers")]
    pub manual_tickers: Vec<String>,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            price_min: default_wheel_price_min(),
            price_max: default_wheel_price_max(),
            dte_min: default_dte_min(),
            dte_max: default_dte_max(),
            dte_preferred_min: default_dte_preferred_min(),
            dte_preferred_max: default_dte_preferred_max(),
            delta_min: default_delta_min(),
            delta_max: default_delta_max(),
            iv_rank_min: default_iv_rank_min(),
            iv_rank_preferred: default_iv_rank_preferred(),
            volume_min: default_volume_min(),
            open_interest_min: default_open_interest_min(),
            spread_warn_pct: default_spread_warn_pct(),
            premium_min_pct: default_premium_min_pct(),
            earnings_buffer_days: default_earnings_buffer_days(),
            allow_unverified: true,
            top_options: default_top_options(),
            manual_tickers: default_manual_tickers(),
        }
    }
}

impl Validate for WheelConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            check_range("wheel.price", self.price_min, self.price_max),
            check_range("wheel.dte", self.dte_min as f64, self.dte_max as f64),
            check_range(
                "wheel.dte_preferred",
                self.dte_preferred_min as f64,
                self.dte_preferred_max as f64,
            ),
            check_range("wheel.delta", self.delta_min, self.delta_max),
            check_range("wheel.iv_rank", self.iv_rank_min, self.iv_rank_preferred),
            check_fraction("wheel.delta_max", self.delta_max),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if self.dte_min < 0 {
            errors.push(ValidationError::InvalidValue {
                field: "wheel.dte_min".into(),
                reason: "must not be negative".into(),
            });
        }
        if self.earnings_buffer_days < 0 {
            errors.push(ValidationError::InvalidValue {
                field: "wheel.earnings_buffer_days".into(),
                reason: "must not be negative".into(),
            });
        }

        collect_errors(errors)
    }
}

fn default_wheel_price_min() -> f64 {
    15.0
}

fn default_wheel_price_max() -> f64 {
    200.0
}

fn default_dte_min() -> i64 {
    30
}

fn default_dte_max() -> i64 {
    45
}

fn default_dte_preferred_min() -> i64 {
    35
}

fn default_dte_preferred_max() -> i64 {
    40
}

fn default_delta_min() -> f64 {
    0.20
}

fn default_delta_max() -> f64 {
    0.30
}

fn default_iv_rank_min() -> f64 {
    30.0
}

fn default_iv_rank_preferred() -> f64 {
    50.0
}

fn default_volume_min() -> u64 {
    1
}

fn default_open_interest_min() -> u64 {
    10
}

fn default_spread_warn_pct() -> f64 {
    0.50
}

fn default_premium_min_pct() -> f64 {
    0.001
}

fn default_earnings_buffer_days() -> i64 {
    7
}

fn default_top_options() -> usize {
    3
}

fn default_manual_tickers() -> Vec<String> {
    vec!["TQQQ".to_string()]
}

// ============================================================================
// Volatility Configuration
// ============================================================================

/// Historical/implied volatility analytics settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityConfig {
    /// Trailing window of log returns for HV
    #[serde(default = "default_hv_window")]
    pub hv_window: usize,

    /// Calendar days of history requested for the IV range proxy
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    #[serde(default = "default_trading_days_per_year")]
    pub trading_days_per_year: f64,

    /// Minimum closes needed to build an IV range
    #[serde(default = "default_min_prices")]
    pub min_prices: usize,

    /// Minimum rolling HV points needed to build an IV range
    #[serde(default = "default_min_hv_points")]
    pub min_hv_points: usize,

    /// Term-structure classification threshold in IV points
    #[serde(default = "default_term_structure_threshold")]
    pub term_structure_threshold: f64,

    /// Back-month expiration is the first at least this many days after the front
    #[serde(default = "default_back_month_offset_days")]
    pub back_month_offset_days: i64,

    #[serde(default = "default_iv_cache_ttl_days")]
    pub cache_ttl_days: i64,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            hv_window: default_hv_window(),
            lookback_days: default_lookback_days(),
            trading_days_per_year: default_trading_days_per_year(),
            min_prices: default_min_prices(),
            min_hv_points: default_min_hv_points(),
            term_structure_threshold: default_term_structure_threshold(),
            back_month_offset_days: default_back_month_offset_days(),
            cache_ttl_days: default_iv_cache_ttl_days(),
        }
    }
}

impl Validate for VolatilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.hv_window < 2 {
            errors.push(ValidationError::InvalidValue {
                field: "volatility.hv_window".into(),
                reason: "needs at least 2 returns".into(),
            });
        }
        if self.min_prices <= self.hv_window {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "volatility.min_prices ({}) must exceed hv_window ({})",
                    self.min_prices, self.hv_window
                ),
            });
        }
        errors.extend(
            [
                check_positive("volatility.trading_days_per_year", self.trading_days_per_year),
                check_positive("volatility.cache_ttl_days", self.cache_ttl_days as f64),
            ]
            .into_iter()
            .filter_map(Result::err),
        );
        collect_errors(errors)
    }
}

fn default_hv_window() -> usize {
    20
}

fn default_lookback_days() -> u32 {
    252
}

fn default_trading_days_per_year() -> f64 {
    252.0
}

fn default_min_prices() -> usize {
    30
}

fn default_min_hv_points() -> usize {
    20
}

fn default_term_structure_threshold() -> f64 {
    2.0
}

fn default_back_month_offset_days() -> i64 {
    30
}

fn default_iv_cache_ttl_days() -> i64 {
    7
}

// ============================================================================
// Earnings Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsConfig {
    #[serde(default = "default_earnings_cache_ttl_hours")]
    pub cache_ttl_hours: i64,

    /// A report this recent means the next one is beyond any trade window
    #[serde(default = "default_recent_report_days")]
    pub recent_report_days: i64,
}

impl Default for EarningsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_hours: default_earnings_cache_ttl_hours(),
            recent_report_days: default_recent_report_days(),
        }
    }
}

impl Validate for EarningsConfig {
    fn validate(&self) -> ValidationResult<()> {
        collect_errors(
            [
                check_positive("earnings.cache_ttl_hours", self.cache_ttl_hours as f64),
                check_positive("earnings.recent_report_days", self.recent_report_days as f64),
            ]
            .into_iter()
            .filter_map(Result::err)
            .collect(),
        )
    }
}

fn default_earnings_cache_ttl_hours() -> i64 {
    12
}

fn default_recent_report_days() -> i64 {
    90
}

// ============================================================================
// Exposure Configuration
// ============================================================================

/// Account capital and per-sector limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureConfig {
    #[serde(default = "default_total_capital")]
    pub total_capital: f64,

    /// Hard cap on sector share of total capital
    #[serde(default = "default_max_sector_pct")]
    pub max_sector_pct: f64,

    #[serde(default = "default_warn_sector_pct")]
    pub warn_sector_pct: f64,

    #[serde(default = "default_max_positions_per_sector")]
    pub max_positions_per_sector: usize,

    #[serde(default = "default_warn_positions_per_sector")]
    pub warn_positions_per_sector: usize,

    /// Portfolio should span at least this many sectors
    #[serde(default = "default_min_sectors")]
    pub min_sectors: usize,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            total_capital: default_total_capital(),
            max_sector_pct: default_max_sector_pct(),
            warn_sector_pct: default_warn_sector_pct(),
            max_positions_per_sector: default_max_positions_per_sector(),
            warn_positions_per_sector: default_warn_positions_per_sector(),
            min_sectors: default_min_sectors(),
        }
    }
}

impl Validate for ExposureConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            check_positive("exposure.total_capital", self.total_capital),
            check_fraction("exposure.max_sector_pct", self.max_sector_pct),
            check_fraction("exposure.warn_sector_pct", self.warn_sector_pct),
            check_range("exposure.sector_pct", self.warn_sector_pct, self.max_sector_pct),
            check_range(
                "exposure.positions_per_sector",
                self.warn_positions_per_sector as f64,
                self.max_positions_per_sector as f64,
            ),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if self.max_positions_per_sector == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "exposure.max_positions_per_sector".into(),
                reason: "must be greater than 0".into(),
            });
        }

        collect_errors(errors)
    }
}

fn default_total_capital() -> f64 {
    44_500.0
}

fn default_max_sector_pct() -> f64 {
    0.40
}

fn default_warn_sector_pct() -> f64 {
    0.35
}

fn default_max_positions_per_sector() -> usize {
    3
}

fn default_warn_positions_per_sector() -> usize {
    2
}

fn default_min_sectors() -> usize {
    3
}

// ============================================================================
// Fetch Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Concurrent quote requests in a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum gap between option-chain / history calls, in seconds
    #[serde(default = "default_api_delay_secs")]
    pub api_delay_secs: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            api_delay_secs: default_api_delay_secs(),
        }
    }
}

impl Validate for FetchConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.concurrency == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "fetch.concurrency".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.api_delay_secs.is_nan() || self.api_delay_secs < 0.0 {
            errors.push(ValidationError::InvalidValue {
                field: "fetch.api_delay_secs".into(),
                reason: "must not be negative".into(),
            });
        }
        collect_errors(errors)
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_api_delay_secs() -> f64 {
    3.0
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber with these settings.
    pub fn init(&self) {
        wheel_common::logging::init_logging(&self.level, &self.format);
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Tests
// ============================================================================
