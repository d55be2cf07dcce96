//! Fixed-precision money helpers.
//!
//! All arithmetic is done on `Decimal`; amounts are persisted as integer minor
//! units (cents) so sums and equality checks are exact on every backend.

use rust_decimal::prelude::*;

use crate::errors::ServiceError;

/// Number of decimal places carried by every monetary value.
pub const DECIMAL_PLACES: u32 = 2;

/// Reconciliation tolerance: one minor unit (0.01).
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Tax rate applied when the settings provider has none configured.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// Rounds to two decimal places, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

pub fn compute_tax(subtotal: Decimal, rate: Decimal) -> Decimal {
    round2(subtotal * rate)
}

pub fn compute_total(subtotal: Decimal, tax: Decimal) -> Decimal {
    round2(subtotal + tax)
}

/// `quantity * unit_price`, exact for already-rounded prices.
pub fn line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// True when `total` equals `subtotal + tax` within one minor unit.
pub fn reconciles(subtotal: Decimal, tax: Decimal, total: Decimal) -> bool {
    (subtotal + tax - total).abs() <= MONEY_TOLERANCE
}

/// Converts an already-rounded amount into cents.
///
/// Amounts with more than two significant decimal places are rejected rather
/// than silently rounded.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| ServiceError::InvalidAmount(format!("{} is out of range", amount)))?;
    if scaled != scaled.trunc() {
        return Err(ServiceError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            amount, DECIMAL_PLACES
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| ServiceError::InvalidAmount(format!("{} is out of range", amount)))
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, DECIMAL_PLACES)
}

/// Renders an amount for display, e.g. `$23.07` or `-$1.50`.
pub fn format_currency(amount: Decimal, symbol: &str) -> String {
    let rounded = round2(amount);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{}{:.2}", symbol, rounded.abs())
    } else {
        format!("{}{:.2}", symbol, rounded.abs())
    }
}
