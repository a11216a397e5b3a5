//! Order-preserving fixed-width encoding for collateral:debt ratios.
//!
//! A ratio is written as `IIIIIIIIIIIIIIIIII.FFFFFFFFFFFFFFFFFF`: eighteen
//! zero-padded integer digits, a dot, eighteen fractional digits. Every encoding
//! has the same width, so comparing the bytes compares the numbers. Digits past
//! the eighteenth decimal place are truncated.
//!
//! Bounds:
//! - minimum: `0`, encoded as all zeros. Negative input clamps to it.
//! - maximum: [`max_sortable_ratio`] (`999999999999999999.9999999999`). Anything
//!   at or above it encodes to the all-nines sentinel, so very safe (or debt-free)
//!   positions still get a sortable slot at the top of the index.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;

pub const INT_DIGITS: usize = 18;
pub const FRAC_DIGITS: usize = 18;
pub const RATIO_WIDTH: usize = INT_DIGITS + 1 + FRAC_DIGITS;

const FRAC_SCALE: u64 = 1_000_000_000_000_000_000;

/// Largest ratio that keeps its own encoding; everything above clamps here.
pub fn max_sortable_ratio() -> Decimal {
    Decimal::from_i128_with_scale(9_999_999_999_999_999_999_999_999_999, 10)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortableRatio([u8; RATIO_WIDTH]);

impl SortableRatio {
    pub const MIN: SortableRatio = SortableRatio(min_bytes());
    pub const MAX: SortableRatio = SortableRatio(max_bytes());

    pub fn as_bytes(&self) -> &[u8; RATIO_WIDTH] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // only ascii digits and '.' are ever written
        std::str::from_utf8(&self.0).unwrap_or("")
    }

    pub fn is_max(&self) -> bool {
        *self == Self::MAX
    }
}

impl fmt::Display for SortableRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn min_bytes() -> [u8; RATIO_WIDTH] {
    let mut out = [b'0'; RATIO_WIDTH];
    out[INT_DIGITS] = b'.';
    out
}

const fn max_bytes() -> [u8; RATIO_WIDTH] {
    let mut out = [b'9'; RATIO_WIDTH];
    out[INT_DIGITS] = b'.';
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortableError {
    #[error("Sortable ratio must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Sortable ratio has a malformed byte at offset {0}")]
    MalformedByte(usize),
}

pub fn encode_ratio(ratio: Decimal) -> SortableRatio {
    if ratio >= max_sortable_ratio() {
        return SortableRatio::MAX;
    }
    if ratio <= Decimal::ZERO {
        return SortableRatio::MIN;
    }

    let int_part = ratio.trunc();
    let frac_part = ((ratio - int_part) * Decimal::from(FRAC_SCALE)).trunc();

    let int_digits = int_part.to_u64().unwrap_or(0);
    let frac_digits = frac_part.to_u64().unwrap_or(0);

    let text = format!(
        "{:0>int_w$}.{:0>frac_w$}",
        int_digits,
        frac_digits,
        int_w = INT_DIGITS,
        frac_w = FRAC_DIGITS
    );

    let mut out = [0u8; RATIO_WIDTH];
    out.copy_from_slice(text.as_bytes());
    SortableRatio(out)
}

pub fn decode_ratio(bytes: &[u8]) -> Result<Decimal, SortableError> {
    if bytes.len() != RATIO_WIDTH {
        return Err(SortableError::InvalidLength {
            expected: RATIO_WIDTH,
            actual: bytes.len(),
        });
    }
    if bytes == SortableRatio::MAX.as_bytes() {
        return Ok(max_sortable_ratio());
    }

    let mut int_digits: u64 = 0;
    let mut frac_digits: u64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        if i == INT_DIGITS {
            if *b != b'.' {
                return Err(SortableError::MalformedByte(i));
            }
            continue;
        }
        if !b.is_ascii_digit() {
            return Err(SortableError::MalformedByte(i));
        }
        let digit = u64::from(b - b'0');
        if i < INT_DIGITS {
            int_digits = int_digits * 10 + digit;
        } else {
            frac_digits = frac_digits * 10 + digit;
        }
    }

    let int_part = Decimal::from(int_digits);
    let frac_part = Decimal::from_i128_with_scale(i128::from(frac_digits), FRAC_DIGITS as u32);
    // 36 significant digits do not fit a decimal mantissa; the sum rounds in the last place
    Ok((int_part + frac_part).normalize())
}

impl TryFrom<&[u8]> for SortableRatio {
    type Error = SortableError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        decode_ratio(bytes)?;
        let mut out = [0u8; RATIO_WIDTH];
        out.copy_from_slice(bytes);
        Ok(SortableRatio(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fixed_width_layout() {
        let encoded = encode_ratio(dec!(40));
        assert_eq!(encoded.as_str(), "000000000000000040.000000000000000000");
        assert_eq!(encoded.as_bytes().len(), RATIO_WIDTH);
    }

    #[test]
    fn byte_order_matches_numeric_order() {
        let values = [
            dec!(0),
            dec!(0.000000000000000001),
            dec!(0.5),
            dec!(1.5),
            dec!(2),
            dec!(9.99),
            dec!(10),
            dec!(123456789.123456789),
        ];
        for pair in values.windows(2) {
            assert!(encode_ratio(pair[0]) < encode_ratio(pair[1]), "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn decode_inverts_encode() {
        for value in [dec!(0), dec!(1.5), dec!(40), dec!(2.333333333333333333), dec!(1000000)] {
            let encoded = encode_ratio(value);
            assert_eq!(decode_ratio(encoded.as_bytes()).unwrap(), value.normalize());
        }
    }

    #[test]
    fn huge_ratios_clamp_to_sentinel() {
        let huge = dec!(5_000_000_000_000_000_000);
        assert!(encode_ratio(huge).is_max());
        assert!(encode_ratio(max_sortable_ratio()).is_max());
        assert!(encode_ratio(dec!(999_999_999_999_999_998)) < SortableRatio::MAX);
        assert_eq!(decode_ratio(SortableRatio::MAX.as_bytes()).unwrap(), max_sortable_ratio());
    }

    #[test]
    fn negative_clamps_to_min() {
        assert_eq!(encode_ratio(dec!(-3)), SortableRatio::MIN);
    }

    #[test]
    fn malformed_input_rejected() {
        assert!(matches!(
            decode_ratio(b"12.5"),
            Err(SortableError::InvalidLength { .. })
        ));
        let mut bad = *encode_ratio(dec!(1)).as_bytes();
        bad[INT_DIGITS] = b'x';
        assert_eq!(decode_ratio(&bad), Err(SortableError::MalformedByte(INT_DIGITS)));
    }
}
