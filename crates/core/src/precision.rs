//! Decimal precision helpers.
//!
//! Monetary results are rounded to the largest scale present among the
//! monetary inputs of a formula, never truncated beyond it.

use rust_decimal::{Decimal, RoundingStrategy};

pub const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest decimal scale among `values` (0 for an empty input).
pub fn monetary_scale<'a>(values: impl IntoIterator<Item = &'a Decimal>) -> u32 {
    values.into_iter().map(Decimal::scale).max().unwrap_or(0)
}

/// Round half away from zero to `scale` decimal places.
pub fn round_to(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamp a percentage into `[0, 100]`.
pub fn clamp_percentage(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, ONE_HUNDRED)
}
