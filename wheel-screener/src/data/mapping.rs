//! Explicit mapping from raw provider rows to typed records.
//!
//! Provider clients deserialize their payloads into the `Raw*` structs
//! below (field aliases cover the common vendor spellings) and call the
//! conversion functions here. A row that cannot be turned into a valid
//! record is a [`ProviderError::Malformed`]; absent optional fields stay
//! `None` instead of defaulting to zero.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};

use super::provider::ProviderError;
use super::{parse_date, EarningsEvent, OptionContract, OptionType};

// ============================================================================
// Option rows
// ============================================================================

/// One option-chain row as delivered by a provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawOptionRow {
    #[serde(default, alias = "symbol", alias = "option_code")]
    pub code: Option<String>,
    #[serde(default, alias = "strike_price")]
    pub strike: Option<f64>,
    #[serde(default, alias = "strike_time", alias = "expiry", alias = "expiration_date")]
    pub expiration: Option<String>,
    #[serde(default, alias = "type", alias = "right")]
    pub option_type: Option<String>,
    #[serde(default, alias = "option_delta")]
    pub delta: Option<f64>,
    #[serde(default, alias = "bid_price")]
    pub bid: Option<f64>,
    #[serde(default, alias = "ask_price")]
    pub ask: Option<f64>,
    #[serde(default, alias = "last", alias = "last_done")]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default, alias = "oi", alias = "option_open_interest")]
    pub open_interest: Option<f64>,
    #[serde(
        default,
        alias = "iv",
        alias = "impliedVolatility",
        alias = "option_iv",
        alias = "option_implied_volatility"
    )]
    pub implied_volatility: Option<f64>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn count(value: Option<f64>) -> u64 {
    finite(value).map_or(0, |v| v.max(0.0).round() as u64)
}

impl RawOptionRow {
    /// Convert into a typed contract.
    ///
    /// `default_expiration` and `default_type` fill in fields that chain
    /// endpoints often leave implicit because they were part of the request.
    pub fn into_contract(
        self,
        default_expiration: NaiveDate,
        default_type: Option<OptionType>,
    ) -> Result<OptionContract, ProviderError> {
        let code = self.code.unwrap_or_default();

        let strike = finite(self.strike)
            .ok_or_else(|| ProviderError::Malformed(format!("option '{}' has no strike", code)))?;
        if strike <= 0.0 {
            return Err(ProviderError::Malformed(format!(
                "option '{}' has non-positive strike {}",
                code, strike
            )));
        }

        let expiration = match self.expiration.as_deref() {
            Some(raw) => parse_date(raw).ok_or_else(|| {
                ProviderError::Malformed(format!("option '{}' has invalid expiration '{}'", code, raw))
            })?,
            None => default_expiration,
        };

        let option_type = match self.option_type.as_deref() {
            Some(raw) => raw.parse()?,
            None => default_type.ok_or_else(|| {
                ProviderError::Malformed(format!("option '{}' has no option type", code))
            })?,
        };

        let bid = finite(self.bid);
        let ask = finite(self.ask);
        if let (Some(b), Some(a)) = (bid, ask) {
            if b > a {
                return Err(ProviderError::Malformed(format!(
                    "option '{}' has bid {} above ask {}",
                    code, b, a
                )));
            }
        }

        Ok(OptionContract {
            code,
            strike,
            expiration,
            option_type,
            delta: finite(self.delta),
            bid,
            ask,
            last_price: finite(self.last_price),
            volume: count(self.volume),
            open_interest: count(self.open_interest),
            implied_volatility: finite(self.implied_volatility),
        })
    }
}

/// Map a chain payload, dropping malformed rows with a warning.
pub fn map_option_rows(
    ticker: &str,
    rows: Vec<RawOptionRow>,
    default_expiration: NaiveDate,
    default_type: Option<OptionType>,
) -> Vec<OptionContract> {
    let total = rows.len();
    let contracts: Vec<OptionContract> = rows
        .into_iter()
        .filter_map(
            |row| match row.into_contract(default_expiration, default_type) {
                Ok(contract) => Some(contract),
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Dropping malformed option row");
                    None
                }
            },
        )
        .collect();

    if contracts.len() < total {
        debug!(
            ticker = %ticker,
            kept = contracts.len(),
            dropped = total - contracts.len(),
            "Mapped option chain"
        );
    }

    contracts
}

// ============================================================================
// Earnings rows
// ============================================================================

/// One earnings-calendar row as delivered by a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEarningsEvent {
    #[serde(alias = "symbol")]
    pub ticker: String,
    #[serde(alias = "earnings_date", alias = "reportDate")]
    pub date: String,
}

impl RawEarningsEvent {
    pub fn into_event(self) -> Result<EarningsEvent, ProviderError> {
        let date = parse_date(&self.date).ok_or_else(|| {
            ProviderError::Malformed(format!(
                "earnings row for '{}' has invalid date '{}'",
                self.ticker, self.date
            ))
        })?;
        Ok(EarningsEvent {
            ticker: self.ticker.trim().to_ascii_uppercase(),
            date,
        })
    }
}

/// Map a calendar payload, dropping rows with unparseable dates.
pub fn map_earnings_events(rows: Vec<RawEarningsEvent>) -> Vec<EarningsEvent> {
    rows.into_iter()
        .filter_map(|row| match row.into_event() {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "Skipping earnings row");
                None
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expiration() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 17).unwrap()
    }

    #[test]
    fn test_row_with_vendor_aliases() {
        let row: RawOptionRow = serde_json::from_value(json!({
            "option_code": "US.KO260417P60000",
            "strike_price": 60.0,
            "option_delta": -0.27,
            "bid_price": 0.95,
            "ask_price": 1.00,
            "volume": 12.0,
            "option_open_interest": 150.0,
            "option_implied_volatility": 0.24
        }))
        .unwrap();

        let contract = row
            .into_contract(expiration(), Some(OptionType::Put))
            .unwrap();
        assert_eq!(contract.strike, 60.0);
        assert_eq!(contract.expiration, expiration());
        assert_eq!(contract.option_type, OptionType::Put);
        assert_eq!(contract.delta, Some(-0.27));
        assert_eq!(contract.open_interest, 150);
        assert_eq!(contract.volume, 12);
        assert_eq!(contract.implied_volatility, Some(0.24));
        assert_eq!(contract.last_price, None);
    }

    #[test]
    fn test_missing_strike_is_malformed() {
        let row = RawOptionRow {
            code: Some("X".into()),
            option_type: Some("PUT".into()),
            ..Default::default()
        };
        let err = row.into_contract(expiration(), None).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[test]
    fn test_non_positive_strike_and_crossed_quote_rejected() {
        let zero = RawOptionRow {
            strike: Some(0.0),
            option_type: Some("P".into()),
            ..Default::default()
        };
        assert!(zero.into_contract(expiration(), None).is_err());

        let crossed = RawOptionRow {
            strike: Some(50.0),
            bid: Some(1.2),
            ask: Some(1.1),
            ..Default::default()
        };
        assert!(crossed
            .into_contract(expiration(), Some(OptionType::Put))
            .is_err());
    }

    #[test]
    fn test_map_option_rows_drops_bad_rows() {
        let rows = vec![
            RawOptionRow {
                strike: Some(50.0),
                bid: Some(1.0),
                ..Default::default()
            },
            RawOptionRow::default(),
        ];
        let contracts = map_option_rows("KO", rows, expiration(), Some(OptionType::Put));
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].ask, None);
        assert_eq!(contracts[0].open_interest, 0);
    }

    #[test]
    fn test_map_earnings_events() {
        let rows: Vec<RawEarningsEvent> = serde_json::from_value(json!([
            {"symbol": "aapl", "date": "2026-04-30"},
            {"ticker": "MSFT", "earnings_date": "not a date"}
        ]))
        .unwrap();

        let events = map_earnings_events(rows);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ticker, "AAPL");
        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2026, 4, 30).unwrap());
    }
}
