// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, addresses, amounts, prices, timestamps. each is a newtype so the compiler catches type mixups.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl PositionId {
    // big endian so byte order matches numeric order inside index keys
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const MODULE_PREFIX: &str = "module/";

// 1.1: account address. module accounts (lending pool, liquidation pool) carry a reserved prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn module(name: &str) -> Self {
        Self(format!("{MODULE_PREFIX}{name}"))
    }

    pub fn is_module(&self) -> bool {
        self.0.starts_with(MODULE_PREFIX)
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// 1.2: collateral type tag ("bnb-a"). distinct from the collateral denom ("bnb").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollateralType(String);

impl CollateralType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollateralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollateralType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// 1.3: token amount in base units. never negative, so underflow is a None, not a sign flip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub fn checked_add(&self, other: Amount) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(&self, other: Amount) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_mul(&self, factor: u128) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    pub fn saturating_sub(&self, other: Amount) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn checked_sum<'a, I: IntoIterator<Item = &'a Amount>>(iter: I) -> Option<Self> {
        iter.into_iter().try_fold(Self::ZERO, |acc, a| acc.checked_add(*a))
    }

    // None when the amount exceeds the 96-bit decimal mantissa
    pub fn to_decimal(&self) -> Option<Decimal> {
        Decimal::from_u128(self.0)
    }

    // banker's rounding, same as the integer conversion used for fees
    pub fn from_decimal_rounded(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        value.round().to_u128().map(Self)
    }

    pub fn from_decimal_floor(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        value.floor().to_u128().map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

// 1.4: a single (denom, amount) pair. collateral and principal are always exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: impl Into<Amount>) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.into(),
        }
    }

    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, Amount::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount.is_positive()
    }

    pub fn with_amount(&self, amount: Amount) -> Self {
        Self {
            denom: self.denom.clone(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

// 1.5: price of one collateral base unit in the debt reference asset. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal")]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = &'static str;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("price must be positive")
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.6: millisecond block timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn add_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(1000)))
    }

    // whole seconds from self to later, half-to-even on the millisecond remainder.
    // negative spans clamp to zero; block time never runs backwards.
    pub fn elapsed_seconds(&self, later: &Timestamp) -> u64 {
        let diff_ms = later.0.saturating_sub(self.0);
        if diff_ms <= 0 {
            return 0;
        }
        let secs = Decimal::new(diff_ms, 3).round();
        secs.to_u64().unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn module_addresses_are_flagged() {
        let pool = Address::module("cdp");
        assert!(pool.is_module());
        assert!(!Address::new("kava1user").is_module());
    }

    #[test]
    fn amount_underflow_is_none() {
        let a = Amount::new(5);
        assert_eq!(a.checked_sub(Amount::new(6)), None);
        assert_eq!(a.checked_sub(Amount::new(5)), Some(Amount::ZERO));
        assert_eq!(Amount::new(u128::MAX).checked_add(Amount::new(1)), None);
    }

    #[test]
    fn decimal_rounding_is_bankers() {
        assert_eq!(Amount::from_decimal_rounded(dec!(2.5)), Some(Amount::new(2)));
        assert_eq!(Amount::from_decimal_rounded(dec!(3.5)), Some(Amount::new(4)));
        assert_eq!(Amount::from_decimal_floor(dec!(3.99)), Some(Amount::new(3)));
        assert_eq!(Amount::from_decimal_rounded(dec!(-1)), None);
    }

    #[test]
    fn elapsed_seconds_rounds_half_even() {
        let t0 = Timestamp::from_millis(0);
        assert_eq!(t0.elapsed_seconds(&Timestamp::from_millis(6_000)), 6);
        assert_eq!(t0.elapsed_seconds(&Timestamp::from_millis(2_500)), 2);
        assert_eq!(t0.elapsed_seconds(&Timestamp::from_millis(3_500)), 4);
        assert_eq!(Timestamp::from_secs(10).elapsed_seconds(&t0), 0);
    }

    #[test]
    fn price_must_be_positive() {
        assert!(Price::new(Decimal::ZERO).is_none());
        assert!(Price::new(dec!(-0.25)).is_none());
        assert_eq!(Price::new(dec!(0.25)).map(|p| p.value()), Some(dec!(0.25)));

        assert!(serde_json::from_str::<Price>("\"0\"").is_err());
        let parsed: Price = serde_json::from_str("\"0.25\"").unwrap();
        assert_eq!(parsed.value(), dec!(0.25));
    }

    #[test]
    fn coin_display() {
        let coin = Coin::new("usdx", 1_000u128);
        assert_eq!(coin.to_string(), "1000usdx");
    }
}
