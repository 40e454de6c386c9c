//! Amount normalization
//!
//! Providers send amounts as decimal strings (occasionally as JSON numbers)
//! next to a separate credit/debit indicator. Normalized amounts are signed:
//! debits are negative, credits positive, regardless of the sign the
//! provider put on the raw value.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Direction of a movement as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditDebit {
    Credit,
    Debit,
}

impl CreditDebit {
    /// Parse a provider indicator. Unknown values yield `None`.
    pub fn parse(indicator: &str) -> Option<Self> {
        match indicator.trim().to_ascii_lowercase().as_str() {
            "credit" | "crdt" | "cr" => Some(Self::Credit),
            "debit" | "dbit" | "dr" => Some(Self::Debit),
            _ => None,
        }
    }

    /// Apply this direction to an unsigned amount.
    pub fn apply(self, amount: Decimal) -> Decimal {
        match self {
            Self::Credit => amount.abs(),
            Self::Debit => -amount.abs(),
        }
    }
}

impl fmt::Display for CreditDebit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credit => write!(f, "Credit"),
            Self::Debit => write!(f, "Debit"),
        }
    }
}

/// Parse a decimal amount leniently.
///
/// Accepts plain (`"1500.00"`) and scientific (`"1.5e3"`) notation.
/// Anything else, including the empty string, is zero. Never fails.
pub fn parse_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .unwrap_or(Decimal::ZERO)
}

/// Signed amount for a raw value and an optional indicator.
///
/// Without an indicator the provider's own sign is kept.
pub fn signed_amount(amount: Decimal, indicator: Option<&str>) -> Decimal {
    match indicator.and_then(CreditDebit::parse) {
        Some(direction) => direction.apply(amount),
        None => amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_plain() {
        assert_eq!(parse_amount("1500.00"), dec!(1500.00));
        assert_eq!(parse_amount(" 42 "), dec!(42));
        assert_eq!(parse_amount("-7.5"), dec!(-7.5));
    }

    #[test]
    fn test_parse_amount_scientific() {
        assert_eq!(parse_amount("1.5e3"), dec!(1500));
    }

    #[test]
    fn test_parse_amount_garbage_is_zero() {
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("abc"), Decimal::ZERO);
        assert_eq!(parse_amount("12,50 RUB"), Decimal::ZERO);
    }

    #[test]
    fn test_debit_is_negative() {
        assert_eq!(signed_amount(dec!(50.00), Some("Debit")), dec!(-50.00));
        // Already-negative debits stay negative
        assert_eq!(signed_amount(dec!(-50.00), Some("DEBIT")), dec!(-50.00));
    }

    #[test]
    fn test_credit_is_positive() {
        assert_eq!(signed_amount(dec!(50.00), Some("Credit")), dec!(50.00));
        assert_eq!(signed_amount(dec!(-50.00), Some("crdt")), dec!(50.00));
    }

    #[test]
    fn test_missing_indicator_keeps_sign() {
        assert_eq!(signed_amount(dec!(-3), None), dec!(-3));
        assert_eq!(signed_amount(dec!(3), Some("Pending")), dec!(3));
    }
}
