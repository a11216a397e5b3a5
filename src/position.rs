// 5.0: the position record and the depositor rows that back it.
// 5.1 fee-first payment split, 5.2 collateral:debt ratios (raw for the index, priced for safety checks).

use crate::sortable::max_sortable_ratio;
use crate::types::{Address, Amount, CollateralType, Coin, PositionId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub owner: Address,
    pub collateral_type: CollateralType,
    pub collateral: Coin,
    pub principal: Coin,
    pub accumulated_fees: Coin,
    pub fees_updated: Timestamp,
    // cumulative interest factor of the type when fees were last synced
    pub interest_factor: Decimal,
}

impl Position {
    pub fn new(
        id: PositionId,
        owner: Address,
        collateral_type: CollateralType,
        collateral: Coin,
        principal: Coin,
        timestamp: Timestamp,
        interest_factor: Decimal,
    ) -> Self {
        let accumulated_fees = Coin::zero(principal.denom.clone());
        Self {
            id,
            owner,
            collateral_type,
            collateral,
            principal,
            accumulated_fees,
            fees_updated: timestamp,
            interest_factor,
        }
    }

    /// Principal plus accumulated fees. `None` only on u128 overflow.
    pub fn total_debt(&self) -> Option<Amount> {
        self.principal.amount.checked_add(self.accumulated_fees.amount)
    }

    pub fn total_debt_coin(&self) -> Option<Coin> {
        self.total_debt().map(|a| self.principal.with_amount(a))
    }

    pub fn debt_denom(&self) -> &str {
        &self.principal.denom
    }

    pub fn is_repaid(&self) -> bool {
        self.principal.is_zero() && self.accumulated_fees.is_zero()
    }

    // 5.1: fees are paid before principal. anything above total debt is not taken.
    pub fn split_payment(&self, payment: Amount) -> PaymentSplit {
        let fees = self.accumulated_fees.amount;
        let fee_payment = payment.min(fees);
        let remaining = payment.saturating_sub(fee_payment);
        let principal_payment = remaining.min(self.principal.amount);
        PaymentSplit {
            fee_payment,
            principal_payment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentSplit {
    pub fee_payment: Amount,
    pub principal_payment: Amount,
}

impl PaymentSplit {
    pub fn total(&self) -> Amount {
        // both halves are bounded by the position's own debt
        Amount::new(self.fee_payment.value().saturating_add(self.principal_payment.value()))
    }
}

/// Collateral contributed to a position by one depositor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub position_id: PositionId,
    pub depositor: Address,
    pub amount: Coin,
    // set when the position is seized; blocks withdrawals
    pub in_liquidation: bool,
}

impl Deposit {
    pub fn new(position_id: PositionId, depositor: Address, amount: Coin) -> Self {
        Self {
            position_id,
            depositor,
            amount,
            in_liquidation: false,
        }
    }
}

/// Amount expressed in whole tokens given the denom's decimal places.
pub fn to_base_units(amount: Amount, conversion_factor: u32) -> Option<Decimal> {
    let raw = i128::try_from(amount.value()).ok()?;
    Decimal::try_from_i128_with_scale(raw, conversion_factor).ok()
}

fn ratio_ceiling() -> Decimal {
    // one step below the sentinel so a debt-free ratio still decodes to a real value
    max_sortable_ratio() - Decimal::new(1, 10)
}

/// 5.2: unpriced collateral:debt ratio in whole tokens. this is what the ratio index stores.
///
/// Zero debt (or debt too large to represent) maps to just below the sortable maximum.
pub fn collateral_to_debt_ratio(
    collateral: Amount,
    collateral_conversion: u32,
    debt: Amount,
    debt_conversion: u32,
) -> Option<Decimal> {
    let debt_units = match to_base_units(debt, debt_conversion) {
        Some(d) if !d.is_zero() && d < max_sortable_ratio() => d,
        _ => return Some(ratio_ceiling()),
    };
    let collateral_units = to_base_units(collateral, collateral_conversion)?;
    collateral_units.checked_div(debt_units)
}

/// Collateral value in the debt asset divided by debt. compared against the liquidation ratio.
pub fn collateralization_ratio(
    collateral: Amount,
    collateral_conversion: u32,
    debt: Amount,
    debt_conversion: u32,
    price: Price,
) -> Option<Decimal> {
    let debt_units = match to_base_units(debt, debt_conversion) {
        Some(d) if !d.is_zero() => d,
        _ => return Some(ratio_ceiling()),
    };
    let value = to_base_units(collateral, collateral_conversion)?.checked_mul(price.value())?;
    value.checked_div(debt_units)
}

/// The unpriced ratio below which positions are unsafe at `price`.
pub fn liquidation_threshold(liquidation_ratio: Decimal, price: Price) -> Option<Decimal> {
    liquidation_ratio.checked_div(price.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_position() -> Position {
        let mut position = Position::new(
            PositionId(1),
            Address::new("kava1alice"),
            CollateralType::new("xrp-a"),
            Coin::new("xrp", 400_000_000u128),
            Coin::new("usdx", 10_000_000u128),
            Timestamp::from_secs(0),
            Decimal::ONE,
        );
        position.accumulated_fees = Coin::new("usdx", 500u128);
        position
    }

    #[test]
    fn total_debt_includes_fees() {
        let position = test_position();
        assert_eq!(position.total_debt(), Some(Amount::new(10_000_500)));
        assert!(!position.is_repaid());
    }

    #[test]
    fn payment_is_fee_first() {
        let position = test_position();

        let small = position.split_payment(Amount::new(300));
        assert_eq!(small.fee_payment, Amount::new(300));
        assert_eq!(small.principal_payment, Amount::ZERO);

        let larger = position.split_payment(Amount::new(1_500));
        assert_eq!(larger.fee_payment, Amount::new(500));
        assert_eq!(larger.principal_payment, Amount::new(1_000));

        let over = position.split_payment(Amount::new(20_000_000));
        assert_eq!(over.total(), Amount::new(10_000_500));
    }

    #[test]
    fn raw_ratio_uses_conversion_factors() {
        // 400 xrp against 10 usdx
        let ratio = collateral_to_debt_ratio(Amount::new(400_000_000), 6, Amount::new(10_000_000), 6).unwrap();
        assert_eq!(ratio, dec!(40));

        // 4 bnb (8 decimals) against 10 usdx (6 decimals)
        let ratio = collateral_to_debt_ratio(Amount::new(400_000_000), 8, Amount::new(10_000_000), 6).unwrap();
        assert_eq!(ratio, dec!(0.4));
    }

    #[test]
    fn zero_debt_ratio_is_near_max() {
        let ratio = collateral_to_debt_ratio(Amount::new(1), 6, Amount::ZERO, 6).unwrap();
        assert!(ratio < max_sortable_ratio());
        assert!(ratio > dec!(999_999_999_999_999_998));
    }

    #[test]
    fn priced_ratio_and_threshold_agree() {
        let price = Price::new(dec!(0.25)).unwrap();
        let priced = collateralization_ratio(Amount::new(400_000_000), 6, Amount::new(10_000_000), 6, price).unwrap();
        assert_eq!(priced, dec!(10));

        // unsafe iff raw ratio < liquidation_ratio / price iff priced < liquidation_ratio
        let threshold = liquidation_threshold(dec!(2), price).unwrap();
        assert_eq!(threshold, dec!(8));
    }
}
