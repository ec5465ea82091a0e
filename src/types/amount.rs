//! Fixed-point amount and flow-speed arithmetic.
//!
//! ## Overview
//!
//! All balances are plain `u128` token base units, hard-capped at
//! [`BALANCE_MAX`] (112 bits). Flow speeds are amounts-per-second scaled by
//! `2^32` ([`FLOW_SHIFT`]), so integer arithmetic introduces no drift over
//! long durations.
//!
//! ## Why fixed-point?
//!
//! Floating-point arithmetic can produce different results on different
//! hardware, breaking determinism. The settlement algorithm must be a pure
//! function of state and time: every replayed claim has to reproduce the
//! engine's own numbers bit-for-bit.
//!
//! ## Overflow policy
//!
//! Arithmetic here fails loudly: any operation that would leave the
//! representable range returns [`PoolError::ArithmeticOverflow`] instead of
//! saturating. The engine escalates that into its fatal class.

use primitive_types::U256;
use rust_decimal::Decimal;

use crate::error::{PoolError, PoolResult};

/// Hard cap on any single balance: `2^112 - 1`.
///
/// Leaves headroom in `u128` for flow-speed scaling and keeps totals far
/// away from the `U256` intermediates used by quotes.
pub const BALANCE_MAX: u128 = (1 << 112) - 1;

/// Binary scale of flow speeds: amounts-per-second are stored `<< 32`.
pub const FLOW_SHIFT: u32 = 32;

/// One whole unit of flow-speed precision (`1 << FLOW_SHIFT`).
pub const FLOW_ONE: u128 = 1 << FLOW_SHIFT;

/// Fee denominator: fees are expressed per mille.
pub const FEE_DENOMINATOR: u128 = 1000;

// ============================================================================
// Checked balance arithmetic
// ============================================================================

/// Add two balances, enforcing [`BALANCE_MAX`].
pub fn balance_add(a: u128, b: u128) -> PoolResult<u128> {
    let sum = a.checked_add(b).ok_or(PoolError::ArithmeticOverflow)?;
    if sum > BALANCE_MAX {
        return Err(PoolError::ArithmeticOverflow);
    }
    Ok(sum)
}

/// Subtract `b` from `a`; underflow is an arithmetic failure, never a clamp.
pub fn balance_sub(a: u128, b: u128) -> PoolResult<u128> {
    a.checked_sub(b).ok_or(PoolError::ArithmeticOverflow)
}

/// Compute `a * b / denom` with a 256-bit intermediate.
///
/// # Example
///
/// ```
/// use flowpool::types::amount::mul_div;
///
/// // 10^30 * 3 / 10^12 does not fit a naive u128 product path
/// assert_eq!(
///     mul_div(1_000_000_000_000_000_000_000_000_000_000, 3, 1_000_000_000_000),
///     Ok(3_000_000_000_000_000_000),
/// );
/// ```
pub fn mul_div(a: u128, b: u128, denom: u128) -> PoolResult<u128> {
    if denom == 0 {
        return Err(PoolError::ArithmeticOverflow);
    }
    let wide = U256::from(a) * U256::from(b) / U256::from(denom);
    u256_to_u128(wide)
}

/// Narrow a `U256` back to `u128`, failing loudly if it does not fit.
pub fn u256_to_u128(value: U256) -> PoolResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(PoolError::ArithmeticOverflow);
    }
    Ok(value.as_u128())
}

// ============================================================================
// Flow-speed arithmetic
// ============================================================================

/// Derive the input flow speed of an order: `amount << 32 / period`.
///
/// # Example
///
/// ```
/// use flowpool::types::amount::{flow_speed, FLOW_ONE};
///
/// // 100 units over 10 seconds -> 10 units/second
/// assert_eq!(flow_speed(100, 10), Ok(10 * FLOW_ONE));
/// ```
pub fn flow_speed(amount: u128, period: u64) -> PoolResult<u128> {
    if period == 0 {
        return Err(PoolError::ArithmeticOverflow);
    }
    let wide = (U256::from(amount) << FLOW_SHIFT) / U256::from(period);
    u256_to_u128(wide)
}

/// Integer amount carried by `speed` over `dt` seconds: `speed * dt >> 32`.
pub fn flow_elapsed(speed: u128, dt: u64) -> PoolResult<u128> {
    let wide = (U256::from(speed) * U256::from(dt)) >> FLOW_SHIFT;
    u256_to_u128(wide)
}

// ============================================================================
// Integer square root (for protocol-fee share math)
// ============================================================================

/// Floor square root of a `u128`, Newton's method.
pub fn isqrt(value: u128) -> u128 {
    if value < 2 {
        return value;
    }
    let mut x = 1u128 << ((128 - value.leading_zeros()).div_ceil(2));
    loop {
        let next = (x + value / x) / 2;
        if next >= x {
            return x;
        }
        x = next;
    }
}

/// Floor square root of a product `a * b`, via a 256-bit intermediate.
///
/// With both factors capped at [`BALANCE_MAX`] the result always fits
/// `u128`.
pub fn isqrt_wide(a: u128, b: u128) -> u128 {
    let value = U256::from(a) * U256::from(b);
    if value < U256::from(2) {
        return value.as_u128();
    }
    let mut x = U256::one() << ((256 - value.leading_zeros()).div_ceil(2));
    loop {
        let next = (x + value / x) >> 1;
        if next >= x {
            return x.as_u128();
        }
        x = next;
    }
}

// ============================================================================
// Display helpers (rust_decimal; never used in settlement paths)
// ============================================================================

/// Convert a balance to a `Decimal` for display.
///
/// Returns `None` for values beyond `Decimal`'s 96-bit mantissa; settlement
/// never routes through this.
pub fn amount_to_decimal(amount: u128) -> Option<Decimal> {
    let signed = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(signed, 0).ok()
}

/// Convert a flow speed to a human `Decimal` in units-per-second.
pub fn flow_to_decimal(speed: u128) -> Option<Decimal> {
    let whole = u64::try_from(speed >> FLOW_SHIFT).ok()?;
    let frac = (speed & (FLOW_ONE - 1)) as u64;
    Some(Decimal::from(whole) + Decimal::from(frac) / Decimal::from(1u64 << FLOW_SHIFT))
}

/// Render a flow speed as a trimmed decimal string.
///
/// # Example
///
/// ```
/// use flowpool::types::amount::{flow_display, FLOW_ONE};
///
/// assert_eq!(flow_display(10 * FLOW_ONE), "10");
/// assert_eq!(flow_display(FLOW_ONE / 2), "0.5");
/// ```
pub fn flow_display(speed: u128) -> String {
    match flow_to_decimal(speed) {
        Some(d) => format!("{}", d.normalize()),
        None => format!("{}:{}", speed >> FLOW_SHIFT, speed & (FLOW_ONE - 1)),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
