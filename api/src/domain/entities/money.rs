//! Money helpers
//!
//! All amounts are `Decimal` rounded to cents. Percentages are expressed as
//! whole numbers (10 = 10%).

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Round a monetary value to cents, half away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `part / whole`, or zero when `whole` is zero
pub fn ratio(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        Decimal::ZERO
    } else {
        part / whole
    }
}

/// `part / whole * 100` rounded to two places, or zero when `whole` is zero
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    round_money(ratio(part, whole) * Decimal::ONE_HUNDRED)
}

/// How a discount value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    #[default]
    Fixed,
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "PERCENTAGE"),
            DiscountType::Fixed => write!(f, "FIXED"),
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PERCENTAGE" => Ok(DiscountType::Percentage),
            "FIXED" => Ok(DiscountType::Fixed),
            _ => Err(format!("Unknown discount type: {}", s)),
        }
    }
}

/// Discount value for `base` under the percentage/fixed rule
pub fn discount_value(base: Decimal, discount: Decimal, discount_type: DiscountType) -> Decimal {
    match discount_type {
        DiscountType::Percentage => round_money(base * discount / Decimal::ONE_HUNDRED),
        DiscountType::Fixed => round_money(discount),
    }
}
