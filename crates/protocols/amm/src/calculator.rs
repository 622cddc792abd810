//! AMM Calculator
//!
//! Slip-based constant product math. For input depth X, input amount x and
//! output depth Y:
//!
//! - emission: (x * X * Y) / (x + X)^2
//! - liquidity fee: (x^2 * Y) / (x + X)^2
//! - slip: x / (x + X), in basis points

use asgard_core::share::{get_uncapped_share, round_half_even};
use asgard_core::types::constants::MAX_BASIS_POINTS;
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

/// Amount of output asset sent to the swapper
pub fn calc_asset_emission(depth_in: u64, amount_in: u64, depth_out: u64) -> u64 {
    let x = BigUint::from(amount_in);
    let sum = &x + BigUint::from(depth_in);
    let denominator = &sum * &sum;
    if denominator.is_zero() {
        return 0;
    }
    let numerator = x * BigUint::from(depth_in) * BigUint::from(depth_out);
    (numerator / denominator).to_u64().unwrap_or(0)
}

/// Liquidity fee kept by the pool, denominated in the output side
pub fn calc_liquidity_fee(depth_in: u64, amount_in: u64, depth_out: u64) -> u64 {
    let x = BigUint::from(amount_in);
    let sum = &x + BigUint::from(depth_in);
    let denominator = &sum * &sum;
    if denominator.is_zero() {
        return 0;
    }
    let numerator = &x * &x * BigUint::from(depth_out);
    (numerator / denominator).to_u64().unwrap_or(0)
}

/// Swap slip in basis points, rounded half to even
pub fn calc_swap_slip(depth_in: u64, amount_in: u64) -> u64 {
    let denominator = BigUint::from(amount_in) + BigUint::from(depth_in);
    if denominator.is_zero() {
        return 0;
    }
    let numerator = BigUint::from(amount_in) * BigUint::from(MAX_BASIS_POINTS);
    let quo = &numerator / &denominator;
    let rem = &numerator % &denominator;
    round_half_even(quo, rem, &denominator)
}

/// Depth seen by synth swaps: `depth * mult / 10000`
pub fn virtual_depth(depth: u64, mult_basis_points: u64) -> u64 {
    get_uncapped_share(mult_basis_points, MAX_BASIS_POINTS, depth)
}

/// Round an 8-decimal amount to the pool asset's native precision.
///
/// Decimals of 0 (unknown) or 8 and above leave the amount untouched.
pub fn round_to_decimal(amount: u64, decimals: i64) -> u64 {
    if decimals <= 0 || decimals >= 8 {
        return amount;
    }
    let unit = BigUint::from(10u64.pow((8 - decimals) as u32));
    let amount = BigUint::from(amount);
    let quo = &amount / &unit;
    let rem = &amount % &unit;
    let rounded = round_half_even(quo, rem, &unit);
    (BigUint::from(rounded) * unit).to_u64().unwrap_or(u64::MAX)
}
