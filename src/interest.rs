// 4.0: stability fee compounding. per-second rate raised to the elapsed seconds on an integer
// mantissa scaled by 1e18, squared in 256 bits so the intermediate never wraps.
// 4.1 relative_pow, 4.2 interest factor, 4.3 per-position interest from factor snapshots.

use crate::types::Amount;
use ethnum::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub const SCALING_FACTOR: u128 = 1_000_000_000_000_000_000;
const SCALE_DIGITS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterestError {
    #[error("Interest factor overflows after {seconds}s at rate {rate}")]
    Overflow { rate: Decimal, seconds: u64 },

    #[error("Stability fee must be positive, got {0}")]
    InvalidRate(Decimal),
}

fn fits_mantissa(value: U256) -> bool {
    let (high, _) = value.into_words();
    high == 0
}

/// 4.1: `x^n` where `x` and the result are fixed point with base `b`.
///
/// Exponentiation by squaring. Every multiplication is rounded half up back to base `b`.
/// Returns `None` if an intermediate no longer fits 128 bits, since its square would not
/// fit 256.
pub fn relative_pow(x: u128, n: u64, b: u128) -> Option<u128> {
    if x == 0 {
        return Some(if n == 0 { b } else { 0 });
    }

    let base = U256::new(b);
    let half = base / 2;

    let mut x = U256::new(x);
    let mut z = if n % 2 == 0 { base } else { x };
    let mut n = n / 2;

    while n > 0 {
        x = (x * x + half) / base;
        if !fits_mantissa(x) {
            return None;
        }
        if n % 2 == 1 {
            z = (z * x + half) / base;
            if !fits_mantissa(z) {
                return None;
            }
        }
        n /= 2;
    }

    let (_, low) = z.into_words();
    Some(low)
}

/// 4.2: cumulative factor for `seconds` of compounding at `per_second_rate`.
///
/// The rate is truncated to 18 decimal places before exponentiation. Zero seconds
/// always yields exactly one.
pub fn calculate_interest_factor(per_second_rate: Decimal, seconds: u64) -> Result<Decimal, InterestError> {
    if per_second_rate <= Decimal::ZERO {
        return Err(InterestError::InvalidRate(per_second_rate));
    }
    if seconds == 0 {
        return Ok(Decimal::ONE);
    }

    let overflow = || InterestError::Overflow {
        rate: per_second_rate,
        seconds,
    };

    let mantissa = per_second_rate
        .checked_mul(Decimal::from(SCALING_FACTOR as u64))
        .ok_or_else(overflow)?
        .trunc()
        .to_u128()
        .ok_or_else(overflow)?;

    let result = relative_pow(mantissa, seconds, SCALING_FACTOR).ok_or_else(overflow)?;
    let signed = i128::try_from(result).map_err(|_| overflow())?;

    Decimal::try_from_i128_with_scale(signed, SCALE_DIGITS)
        .map(|d| d.normalize())
        .map_err(|_| overflow())
}

/// Grows `amount` by `factor`, banker's rounding to whole units.
pub fn apply_factor(amount: Amount, factor: Decimal) -> Option<Amount> {
    let grown = amount.to_decimal()?.checked_mul(factor)?;
    Amount::from_decimal_rounded(grown)
}

/// 4.3: interest a debt owes since its factor snapshot.
///
/// `floor(debt * global / snapshot) - debt`, clamped at zero. Flooring keeps the sum of synced
/// position debts at or below the aggregate. An identical snapshot owes nothing.
pub fn interest_since_snapshot(debt: Amount, global_factor: Decimal, snapshot: Decimal) -> Option<Amount> {
    if global_factor == snapshot || debt.is_zero() {
        return Some(Amount::ZERO);
    }
    if snapshot <= Decimal::ZERO {
        return None;
    }
    let growth = global_factor.checked_div(snapshot)?;
    let grown = Amount::from_decimal_floor(debt.to_decimal()?.checked_mul(growth)?)?;
    Some(grown.saturating_sub(debt))
}
