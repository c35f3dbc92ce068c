use bigdecimal::BigDecimal;

/// Monetary amounts are integer minor units (cents) to avoid floating-point drift.
pub type MinorUnits = i64;

const MINOR_UNITS_PER_MAJOR: i64 = 100;
const CURRENCY_SCALE: i64 = 2;

/// Render minor units as a two-place decimal, e.g. `1234` -> `12.34`.
pub fn to_decimal(amount: MinorUnits) -> BigDecimal {
    (BigDecimal::from(amount) / BigDecimal::from(MINOR_UNITS_PER_MAJOR)).with_scale(CURRENCY_SCALE)
}
