//! Money - amounts the risk engine consumes
//!
//! The currency catalog itself is maintained elsewhere. Here a currency is a
//! validated ISO-4217-style code plus the number of decimal places it uses,
//! and an amount is a non-negative decimal normalised to that precision.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::TrustError;

/// Errors that can occur when building money values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Empty currency code")]
    EmptyCode,

    #[error("Invalid currency code (expected 3 letters): {0}")]
    InvalidCode(String),

    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),
}

impl From<MoneyError> for TrustError {
    fn from(err: MoneyError) -> Self {
        TrustError::InvalidArgument(err.to_string())
    }
}

/// Currency codes without minor units
const ZERO_DECIMAL: &[&str] = &["CLP", "ISK", "JPY", "KRW", "PYG", "UGX", "VND", "XAF", "XOF"];

/// Currency codes with three decimal places
const THREE_DECIMAL: &[&str] = &["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

/// A three-letter currency code
///
/// # Example
/// ```
/// use trustdesk_core::Currency;
///
/// let eur: Currency = "eur".parse().unwrap();
/// assert_eq!(eur.code(), "EUR");
/// assert_eq!(eur.precision(), 2);
///
/// let jpy: Currency = "JPY".parse().unwrap();
/// assert_eq!(jpy.precision(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal places used by this currency
    pub fn precision(&self) -> u32 {
        if ZERO_DECIMAL.contains(&self.0.as_str()) {
            0
        } else if THREE_DECIMAL.contains(&self.0.as_str()) {
            3
        } else {
            2
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if s.is_empty() {
            return Err(MoneyError::EmptyCode);
        }

        if s.len() != 3 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCode(s));
        }

        Ok(Currency(s))
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// A non-negative amount in a given currency
///
/// # Invariant
/// `amount >= 0` and `amount` has at most `currency.precision()` decimals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Create a money value, rounding half-to-even to the currency precision.
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        if amount < Decimal::ZERO {
            return Err(MoneyError::NegativeAmount(amount));
        }

        let amount = amount.round_dp_with_strategy(
            currency.precision(),
            RoundingStrategy::MidpointNearestEven,
        );
        Ok(Self { amount, currency })
    }

    /// Parse both parts from text, e.g. `Money::parse("120.50", "EUR")`
    pub fn parse(amount: &str, currency: &str) -> Result<Self, TrustError> {
        let value = Decimal::from_str(amount.trim())
            .map_err(|e| TrustError::invalid_argument(format!("invalid amount '{}': {}", amount, e)))?;
        let currency: Currency = currency.parse()?;
        Ok(Self::new(value, currency)?)
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    #[inline]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    #[inline]
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eur() -> Currency {
        "EUR".parse().unwrap()
    }

    #[test]
    fn test_currency_normalised_to_uppercase() {
        let c: Currency = " usd ".parse().unwrap();
        assert_eq!(c.code(), "USD");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        assert_eq!("".parse::<Currency>(), Err(MoneyError::EmptyCode));
        assert!(matches!("EURO".parse::<Currency>(), Err(MoneyError::InvalidCode(_))));
        assert!(matches!("E1R".parse::<Currency>(), Err(MoneyError::InvalidCode(_))));
    }

    #[test]
    fn test_precision_table() {
        assert_eq!("VND".parse::<Currency>().unwrap().precision(), 0);
        assert_eq!("KWD".parse::<Currency>().unwrap().precision(), 3);
        assert_eq!(eur().precision(), 2);
    }

    #[test]
    fn test_money_rounds_to_precision() {
        let m = Money::new(dec!(10.125), eur()).unwrap();
        assert_eq!(m.amount(), dec!(10.12));

        let jpy = Money::new(dec!(1500.5), "JPY".parse().unwrap()).unwrap();
        assert_eq!(jpy.amount(), dec!(1500));
    }

    #[test]
    fn test_money_negative_rejected() {
        let result = Money::new(dec!(-1), eur());
        assert!(matches!(result, Err(MoneyError::NegativeAmount(_))));
    }

    #[test]
    fn test_money_parse() {
        let m = Money::parse("99.90", "eur").unwrap();
        assert_eq!(m.amount(), dec!(99.90));
        assert_eq!(m.to_string(), "99.90 EUR");

        let err = Money::parse("abc", "EUR").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_currency_serde() {
        let json = serde_json::to_string(&eur()).unwrap();
        assert_eq!(json, "\"EUR\"");
        assert!(serde_json::from_str::<Currency>("\"EURO\"").is_err());
    }
}
