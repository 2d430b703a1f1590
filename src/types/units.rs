//! Unit Conversion Utilities
//!
//! Both assets use six decimals on the ledger: user-facing amounts are exact
//! decimals in asset units, the ledger sees integer micro-units.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// Micro-units per asset unit
pub const MICRO_PER_UNIT: u64 = 1_000_000;

/// Decimal places carried by the ledger
pub const LEDGER_DECIMALS: u32 = 6;

/// Convert ledger micro-units to an asset amount (e.g. 1_500_000 -> 1.5)
pub fn micro_to_units(micro: u64) -> Decimal {
    Decimal::from_i128_with_scale(micro as i128, LEDGER_DECIMALS)
}

/// Convert an asset amount to micro-units, dropping precision the ledger cannot carry
///
/// Returns `None` for negative amounts or amounts that overflow `u64`.
pub fn units_to_micro(amount: Decimal) -> Option<u64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    (truncate_to_ledger(amount) * Decimal::from(MICRO_PER_UNIT)).to_u64()
}

/// Truncate an amount to ledger precision (never rounds up)
pub fn truncate_to_ledger(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(LEDGER_DECIMALS, RoundingStrategy::ToZero)
}

/// Format an amount for display without trailing zeros
pub fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Parse a user supplied amount ("1.5", "0.25", "1e-3")
///
/// Negative values and anything that is not a number yield `None`.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let amount = Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()?;

    if amount.is_sign_negative() && !amount.is_zero() {
        return None;
    }
    Some(amount.abs())
}

/// Amount requested by a withdrawal: a fixed value or the whole balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountRequest {
    Exact(Decimal),
    All,
}

impl AmountRequest {
    /// Parse "all" (any case) or a decimal amount
    pub fn parse(s: &str) -> Option<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            Some(AmountRequest::All)
        } else {
            parse_amount(s).map(AmountRequest::Exact)
        }
    }
}

impl fmt::Display for AmountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountRequest::Exact(amount) => write!(f, "{}", format_amount(*amount)),
            AmountRequest::All => write!(f, "all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micro_conversions() {
        assert_eq!(micro_to_units(0), Decimal::ZERO);
        assert_eq!(micro_to_units(1), Decimal::new(1, 6));
        assert_eq!(micro_to_units(5_000_000), Decimal::from(5));
        assert_eq!(units_to_micro(Decimal::new(4999, 3)), Some(4_999_000));
        assert_eq!(units_to_micro(Decimal::new(-1, 0)), None);
    }

    #[test]
    fn test_truncation_never_rounds_up() {
        let amount = Decimal::from_str("1.0000009").unwrap();
        assert_eq!(truncate_to_ledger(amount), Decimal::from_str("1.000000").unwrap());
        assert_eq!(units_to_micro(amount), Some(1_000_000));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.5"), Some(Decimal::new(15, 1)));
        assert_eq!(parse_amount(" 2 "), Some(Decimal::from(2)));
        assert_eq!(parse_amount("1e-7"), Some(Decimal::new(1, 7)));
        assert_eq!(parse_amount("-3"), None);
        assert_eq!(parse_amount("ten"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_amount_request() {
        assert_eq!(AmountRequest::parse("ALL"), Some(AmountRequest::All));
        assert_eq!(
            AmountRequest::parse("0.5"),
            Some(AmountRequest::Exact(Decimal::new(5, 1)))
        );
        assert_eq!(AmountRequest::parse("half"), None);
        assert_eq!(AmountRequest::All.to_string(), "all");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(micro_to_units(1_500_000)), "1.5");
        assert_eq!(format_amount(Decimal::from(3)), "3");
    }
}
