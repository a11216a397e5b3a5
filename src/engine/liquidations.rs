//! Liquidation detection and execution.

use super::core::Engine;
use super::results::{CdpError, LiquidationResult};
use crate::apportion::largest_remainder;
use crate::auction::AuctionMarket;
use crate::config::{CollateralParam, ParamStore};
use crate::events::{EventPayload, PositionLiquidatedEvent};
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::position::{collateralization_ratio, liquidation_threshold, Deposit, Position};
use crate::sortable::{encode_ratio, max_sortable_ratio};
use crate::types::{Address, Amount, CollateralType, Coin, PositionId};

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    /// Seize every position of the type whose ratio is below the liquidation ratio at the
    /// liquidation market price.
    pub fn liquidate_unsafe_positions(&mut self, collateral_type: &CollateralType) -> Result<Vec<LiquidationResult>, CdpError> {
        self.transact(|engine| {
            let cp = engine.collateral_param(collateral_type)?;
            let price = engine.liquidation_price(&cp)?;

            engine.synchronize_risky_inner(&cp, max_sortable_ratio())?;

            // raw collateral:debt below lr / price is priced ratio below lr
            let threshold =
                liquidation_threshold(cp.liquidation_ratio, price).ok_or(CdpError::Overflow("liquidation threshold"))?;
            let ids: Vec<PositionId> = engine
                .store
                .iter_below(cp.prefix, encode_ratio(threshold))
                .map(|(_, id)| id)
                .collect();

            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(position) = engine.store.get_position(&cp.collateral_type, id).cloned() else {
                    continue;
                };
                let position = engine.synchronize_interest(position)?;
                results.push(engine.seize(position, &cp, None)?);
            }

            if !results.is_empty() {
                tracing::info!(
                    collateral_type = %collateral_type,
                    price = %price,
                    count = results.len(),
                    "unsafe positions liquidated"
                );
            }
            Ok(results)
        })
    }

    /// Keeper-triggered liquidation of one position. The keeper is paid a share of the
    /// collateral; the rest goes to auction.
    pub fn liquidate_position(
        &mut self,
        keeper: &Address,
        owner: &Address,
        collateral_type: &CollateralType,
    ) -> Result<LiquidationResult, CdpError> {
        self.transact(|engine| {
            if keeper.is_empty() {
                return Err(CdpError::InvalidAddress);
            }
            let cp = engine.collateral_param(collateral_type)?;
            let position = engine.find_position(owner, collateral_type)?;
            let price = engine.liquidation_price(&cp)?;

            let position = engine.synchronize_interest(position)?;
            let debt = position.total_debt().ok_or(CdpError::Overflow("position debt"))?;
            let debt_conversion = engine.params.params().debt_param.conversion_factor;
            let ratio = collateralization_ratio(
                position.collateral.amount,
                cp.conversion_factor,
                debt,
                debt_conversion,
                price,
            )
            .ok_or(CdpError::Overflow("collateralization ratio"))?;
            if ratio >= cp.liquidation_ratio {
                return Err(CdpError::NotLiquidatable(position.id));
            }

            engine.seize(position, &cp, Some(keeper))
        })
    }

    /// Moves a synced position's collateral and debt into the liquidation pool, deletes it,
    /// and starts its auctions.
    fn seize(
        &mut self,
        position: Position,
        cp: &CollateralParam,
        keeper: Option<&Address>,
    ) -> Result<LiquidationResult, CdpError> {
        self.store.remove_ratio(position.id);
        self.store.remove_owner_index(&position);

        let lending_pool = self.lending_pool();
        let liquidation_pool = self.liquidation_pool();
        let debt_denom = self.debt_denom();

        let total_debt = position.total_debt().ok_or(CdpError::Overflow("position debt"))?;
        let debt_held = self.ledger.balance_of(&lending_pool, &debt_denom);
        let debt_moved = total_debt.min(debt_held);
        self.ledger
            .transfer(&lending_pool, &liquidation_pool, &Coin::new(debt_denom.clone(), debt_moved))?;

        let mut deposits = self.store.deposits_of(position.id);
        let keeper_reward = match keeper {
            Some(keeper) => self.pay_keeper(keeper, &position, cp, &mut deposits)?,
            None => None,
        };

        for deposit in deposits.iter_mut() {
            self.ledger.transfer(&lending_pool, &liquidation_pool, &deposit.amount)?;
            self.store.delete_deposit(position.id, &deposit.depositor);
            deposit.in_liquidation = true;
        }

        let penalty = total_debt
            .to_decimal()
            .and_then(|debt| debt.checked_mul(cp.liquidation_penalty))
            .and_then(Amount::from_decimal_rounded)
            .ok_or(CdpError::Overflow("liquidation penalty"))?;
        self.ledger
            .mint(&liquidation_pool, &Coin::new(debt_denom.clone(), penalty))?;

        self.decrement_total_principal(&position.collateral_type, total_debt)?;
        self.store.delete_position(&position);

        let seized = Amount::checked_sum(deposits.iter().map(|d| &d.amount.amount))
            .ok_or(CdpError::Overflow("seized collateral"))?;
        let collateral = position.collateral.with_amount(seized);

        tracing::info!(
            position = %position.id,
            owner = %position.owner,
            collateral = %collateral,
            debt = %total_debt,
            penalty = %penalty,
            "position seized"
        );
        self.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
            position_id: position.id,
            owner: position.owner.clone(),
            collateral_type: position.collateral_type.clone(),
            collateral: collateral.clone(),
            debt: Coin::new(debt_denom.clone(), debt_moved),
            penalty: Coin::new(debt_denom, penalty),
            keeper: keeper.cloned(),
        }));

        let auctions = self.auction_collateral(cp, &deposits, debt_moved, penalty)?;

        Ok(LiquidationResult {
            position_id: position.id,
            owner: position.owner,
            collateral_type: position.collateral_type,
            collateral,
            debt: total_debt,
            penalty,
            seized_deposits: deposits,
            auctions,
            keeper_reward,
        })
    }

    // reward is a floor share of the collateral, taken from deposits in proportion to size
    fn pay_keeper(
        &mut self,
        keeper: &Address,
        position: &Position,
        cp: &CollateralParam,
        deposits: &mut [Deposit],
    ) -> Result<Option<Coin>, CdpError> {
        let reward = position
            .collateral
            .amount
            .to_decimal()
            .and_then(|c| c.checked_mul(cp.keeper_reward_percentage))
            .and_then(Amount::from_decimal_floor)
            .ok_or(CdpError::Overflow("keeper reward"))?;
        if reward.is_zero() {
            return Ok(None);
        }

        let weights: Vec<Amount> = deposits.iter().map(|d| d.amount.amount).collect();
        let shares = largest_remainder(reward, &weights)?;
        for (deposit, share) in deposits.iter_mut().zip(shares) {
            deposit.amount.amount = deposit.amount.amount.saturating_sub(share);
        }

        let lending_pool = self.lending_pool();
        let coin = position.collateral.with_amount(reward);
        self.ledger.transfer(&lending_pool, keeper, &coin)?;
        tracing::info!(position = %position.id, keeper = %keeper, reward = %coin, "keeper rewarded");
        Ok(Some(coin))
    }
}
