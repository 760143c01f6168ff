//! Human-readable price to base-unit conversion.
//!
//! Prices are configured as decimal amounts of an asset (e.g. `10.00` USDC) and
//! advertised on the wire as an integer count of the asset's smallest unit.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal exponent of USDC: one USDC is `10^6` base units.
pub const USDC_DECIMALS: u32 = 6;

/// Errors raised when a configured price cannot be expressed in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The price is NaN or infinite.
    #[error("price must be a finite number")]
    NotFinite,
    /// The price is below zero.
    #[error("price must not be negative")]
    Negative,
    /// The price does not fit the base-unit range for the given decimals.
    #[error("price overflows base units at {decimals} decimals")]
    Overflow {
        /// Decimal exponent that was requested.
        decimals: u32,
    },
}

/// Converts a human price into base units of an asset with `decimals` decimals.
///
/// The conversion goes through [`Decimal`] so that float noise does not leak
/// into the result, and rounds half away from zero to the nearest base unit.
///
/// ```rust
/// use logo_agent::amount::{USDC_DECIMALS, to_base_units};
///
/// assert_eq!(to_base_units(10.0, USDC_DECIMALS), Ok(10_000_000));
/// assert_eq!(to_base_units(0.000_001, USDC_DECIMALS), Ok(1));
/// ```
///
/// # Errors
///
/// Returns [`AmountError`] for non-finite, negative, or out-of-range prices.
pub fn to_base_units(price: f64, decimals: u32) -> Result<u128, AmountError> {
    if !price.is_finite() {
        return Err(AmountError::NotFinite);
    }
    if price < 0.0 {
        return Err(AmountError::Negative);
    }
    let overflow = AmountError::Overflow { decimals };
    let price = Decimal::from_f64(price).ok_or(overflow)?;
    let scale = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or(overflow)?;
    price
        .checked_mul(scale)
        .ok_or(overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u128()
        .ok_or(overflow)
}
