//! Proportional share helpers
//!
//! All intermediate products are computed in `BigUint`, so no u64
//! combination can overflow.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use std::cmp::Ordering;

/// `round(allocation * part / total)`, 0 when `part` or `total` is 0
pub fn get_uncapped_share(part: u64, total: u64, allocation: u64) -> u64 {
    if part == 0 || total == 0 {
        return 0;
    }
    let num = BigUint::from(allocation) * BigUint::from(part);
    let total = BigUint::from(total);
    let quo = &num / &total;
    let rem = &num % &total;
    round_half_even(quo, rem, &total)
}

/// Round `quo + rem/divisor` to the nearest integer, ties to even
pub fn round_half_even(quo: BigUint, rem: BigUint, divisor: &BigUint) -> u64 {
    let twice = rem * 2u32;
    let up = match twice.cmp(divisor) {
        Ordering::Greater => true,
        Ordering::Equal => quo.bit(0),
        Ordering::Less => false,
    };
    let quo = if up { quo + 1u32 } else { quo };
    quo.to_u64().unwrap_or(u64::MAX)
}

/// Same as [`get_uncapped_share`] with `part` capped at `total`
pub fn get_safe_share(part: u64, total: u64, allocation: u64) -> u64 {
    get_uncapped_share(part.min(total), total, allocation)
}

/// Subtraction clamped at zero
pub fn safe_sub(a: u64, b: u64) -> u64 {
    a.saturating_sub(b)
}

/// `a * b / c` with truncation, 0 when `c` is 0
pub fn mul_div(a: u64, b: u64, c: u64) -> u64 {
    let c = BigUint::from(c);
    if c.is_zero() {
        return 0;
    }
    (BigUint::from(a) * BigUint::from(b) / c)
        .to_u64()
        .unwrap_or(u64::MAX)
}

/// True when `n` of `total` is a two-thirds super majority
pub fn has_super_majority(n: usize, total: usize) -> bool {
    if total == 0 {
        return false;
    }
    n * 3 >= total * 2
}
