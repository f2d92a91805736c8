//! Exact integer price arithmetic
//!
//! Every price is an unsigned integer carrying an implied number of decimals.
//! Cross-pair math happens at one working precision (`SCALED_DECIMALS`) so that
//! independent nodes produce bit-identical output. No floating point here.

use ruint::aliases::{U256, U512};

use crate::errors::{MathError, MathResult};
use crate::types::Price;

/// Working precision shared by all cross-pair arithmetic
pub const SCALED_DECIMALS: u64 = 36;

/// 10^exp, failing on overflow
pub fn pow10(exp: u64) -> MathResult<U256> {
    U256::from(10u64)
        .checked_pow(U256::from(exp))
        .ok_or(MathError::Overflow)
}

/// Factor converting between two decimal precisions
pub fn scaling_factor(first: u64, second: u64) -> MathResult<U256> {
    pow10(first.abs_diff(second))
}

fn working_factor(decimals: u64) -> MathResult<U256> {
    if decimals > SCALED_DECIMALS {
        return Err(MathError::DecimalsOutOfRange {
            decimals,
            max: SCALED_DECIMALS,
        });
    }
    scaling_factor(SCALED_DECIMALS, decimals)
}

/// Rescale a price from its native decimals to the working precision
pub fn scale_up(decimals: u64, price: Price) -> MathResult<Price> {
    let factor = working_factor(decimals)?;
    price.checked_mul(factor).ok_or(MathError::Overflow)
}

/// Rescale a working-precision price back to `decimals`.
///
/// Truncates only the digits that are below the target precision.
pub fn scale_down(decimals: u64, price: Price) -> MathResult<Price> {
    let factor = working_factor(decimals)?;
    Ok(price / factor)
}

/// `(10^decimals)^2 / price`, i.e. the price of the inverse pair at the same decimals
pub fn invert(price: Price, decimals: u64) -> MathResult<Price> {
    if price.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let unit = pow10(decimals)?;
    let numerator = unit.checked_mul(unit).ok_or(MathError::Overflow)?;
    Ok(numerator / price)
}

fn widen(value: U256) -> U512 {
    U512::from_limbs_slice(value.as_limbs())
}

/// Fixed-point multiply of two working-precision prices.
///
/// The product is formed at 512 bits, so only a result that does not fit
/// back into 256 bits fails.
pub fn mul_scaled(lhs: Price, rhs: Price) -> MathResult<Price> {
    let unit = widen(pow10(SCALED_DECIMALS)?);
    let product = widen(lhs)
        .checked_mul(widen(rhs))
        .ok_or(MathError::Overflow)?;
    let scaled = product / unit;
    U256::checked_from_limbs_slice(scaled.as_limbs()).ok_or(MathError::Overflow)
}

/// Median of a set of prices.
///
/// Odd counts return the middle element, even counts the floor of the mean
/// of the two middle elements. Empty input has no median.
pub fn median(values: &[Price]) -> Option<Price> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Some(sorted[mid]);
    }

    let two = U256::from(2u64);
    let (lo, hi) = (sorted[mid - 1], sorted[mid]);
    // (lo + hi) / 2 without the intermediate sum
    Some(lo / two + hi / two + (lo % two + hi % two) / two)
}

/// Parse a human decimal ("70000.25") into an integer price at `decimals`.
///
/// Rejects signs, exponents and more fractional digits than `decimals`.
pub fn parse_decimal(text: &str, decimals: u64) -> MathResult<Price> {
    let malformed = |reason: &str| MathError::MalformedDecimal {
        input: text.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = text.trim();
    let (integer, fraction) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    if integer.is_empty() {
        return Err(malformed("missing integer part"));
    }
    if !integer.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("expected only ascii digits and one '.'"));
    }
    if fraction.len() as u64 > decimals {
        return Err(malformed("more fractional digits than the ticker's decimals"));
    }

    let width = decimals as usize;
    let digits = format!("{integer}{fraction:0<width$}");
    U256::from_str_radix(&digits, 10).map_err(|_| MathError::Overflow)
}

/// Render an integer price at `decimals` as a human decimal, trailing zeros trimmed
pub fn format_decimal(price: Price, decimals: u64) -> String {
    let digits = price.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (integer, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}
