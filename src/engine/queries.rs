//! Read-only views over positions, deposits and totals.

use super::core::Engine;
use super::results::{AugmentedPosition, CdpError};
use crate::auction::AuctionMarket;
use crate::config::ParamStore;
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::position::{collateralization_ratio, liquidation_threshold, to_base_units, Deposit, Position};
use crate::sortable::encode_ratio;
use crate::types::{Address, Amount, CollateralType, Coin, PositionId};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    pub fn position(&self, owner: &Address, collateral_type: &CollateralType) -> Result<Position, CdpError> {
        self.collateral_param(collateral_type)?;
        self.find_position(owner, collateral_type)
    }

    pub fn position_by_id(&self, id: PositionId) -> Option<&Position> {
        self.store.get_position_by_id(id)
    }

    /// Positions of a type in id order.
    pub fn positions_by_type(&self, collateral_type: &CollateralType) -> Result<Vec<Position>, CdpError> {
        self.collateral_param(collateral_type)?;
        Ok(self.store.positions_of_type(collateral_type).cloned().collect())
    }

    /// Positions whose priced collateralization ratio at the spot price is below `ratio`,
    /// lowest first. Reads the index, so fees synced since the last mutation are not included.
    pub fn positions_below_ratio(
        &self,
        collateral_type: &CollateralType,
        ratio: Decimal,
    ) -> Result<Vec<Position>, CdpError> {
        let cp = self.collateral_param(collateral_type)?;
        let price = self.spot_price(&cp)?;
        let threshold = liquidation_threshold(ratio, price).ok_or(CdpError::Overflow("ratio threshold"))?;
        Ok(self
            .store
            .iter_below(cp.prefix, encode_ratio(threshold))
            .filter_map(|(_, id)| self.store.get_position(collateral_type, id).cloned())
            .collect())
    }

    pub fn deposits(&self, owner: &Address, collateral_type: &CollateralType) -> Result<Vec<Deposit>, CdpError> {
        let position = self.position(owner, collateral_type)?;
        Ok(self.store.deposits_of(position.id))
    }

    pub fn total_principal(&self, collateral_type: &CollateralType) -> Result<Coin, CdpError> {
        self.collateral_param(collateral_type)?;
        let denom = self.params.params().stable_denom();
        Ok(Coin::new(denom, self.store.total_principal(collateral_type, denom)))
    }

    /// Sum of collateral locked in live positions of the type.
    pub fn total_collateral(&self, collateral_type: &CollateralType) -> Result<Coin, CdpError> {
        let cp = self.collateral_param(collateral_type)?;
        let total = Amount::checked_sum(
            self.store
                .positions_of_type(collateral_type)
                .map(|p| &p.collateral.amount),
        )
        .ok_or(CdpError::Overflow("total collateral"))?;
        Ok(Coin::new(cp.denom, total))
    }

    /// The position with its collateral valued in the debt asset at the spot price.
    pub fn augmented_position(
        &self,
        owner: &Address,
        collateral_type: &CollateralType,
    ) -> Result<AugmentedPosition, CdpError> {
        let cp = self.collateral_param(collateral_type)?;
        let position = self.find_position(owner, collateral_type)?;
        let price = self.spot_price(&cp)?;
        let debt_param = self.debt_param();

        let value = to_base_units(position.collateral.amount, cp.conversion_factor)
            .and_then(|units| units.checked_mul(price.value()))
            .and_then(|usd| {
                10u128
                    .checked_pow(debt_param.conversion_factor)
                    .and_then(Decimal::from_u128)
                    .and_then(|scale| usd.checked_mul(scale))
            })
            .and_then(Amount::from_decimal_floor)
            .ok_or(CdpError::Overflow("collateral value"))?;
        let debt = position.total_debt().ok_or(CdpError::Overflow("position debt"))?;
        let ratio = collateralization_ratio(
            position.collateral.amount,
            cp.conversion_factor,
            debt,
            debt_param.conversion_factor,
            price,
        )
        .ok_or(CdpError::Overflow("collateralization ratio"))?;

        Ok(AugmentedPosition {
            collateral_value: Coin::new(debt_param.denom, value),
            collateralization_ratio: ratio,
            position,
        })
    }

    pub fn positions_by_owner(&self, owner: &Address) -> Vec<Position> {
        self.store
            .owner_position_ids(owner)
            .into_iter()
            .filter_map(|id| self.store.get_position_by_id(id).cloned())
            .collect()
    }

    pub fn interest_factor(&self, collateral_type: &CollateralType) -> Option<Decimal> {
        self.store.interest_factor(collateral_type)
    }
}
