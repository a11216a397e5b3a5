//! Position lifecycle: open, deposit, withdraw, draw, repay.
//!
//! Every mutation follows the same order: sync fees, drop the stale ratio entry, apply the
//! change, recompute the ratio, write the new entry (or delete the position), update aggregate
//! principal, emit. All checks run before the first ledger call.

use super::core::Engine;
use super::results::{CdpError, RepayResult};
use crate::auction::AuctionMarket;
use crate::config::{CollateralParam, ParamStore};
use crate::events::{
    DebtDrawnEvent, DebtRepaidEvent, DepositedEvent, EventPayload, PositionClosedEvent, PositionOpenedEvent,
    WithdrawnEvent,
};
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::position::{Deposit, Position};
use crate::types::{Address, Amount, CollateralType, Coin, PositionId};

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    /// Opens a position for `owner`, locking `collateral` and minting `principal` to them.
    pub fn open_position(
        &mut self,
        owner: &Address,
        collateral: Coin,
        principal: Coin,
        collateral_type: &CollateralType,
    ) -> Result<PositionId, CdpError> {
        self.transact(|engine| {
            require_address(owner)?;
            let cp = engine.collateral_param(collateral_type)?;
            require_collateral_coin(&cp, &collateral)?;
            engine.require_principal_coin(&principal)?;

            if engine.store.position_id_by_owner(owner, collateral_type).is_some() {
                return Err(CdpError::PositionAlreadyExists {
                    owner: owner.clone(),
                    collateral_type: collateral_type.clone(),
                });
            }
            engine.require_debt_floor(principal.amount)?;
            engine.require_within_debt_limits(&cp, principal.amount)?;
            let price = engine.spot_price(&cp)?;
            engine.require_collateralization(&cp, collateral.amount, principal.amount, price)?;
            engine.require_balance(owner, &collateral)?;

            let factor = engine.ensure_accrual_state(collateral_type)?;

            let lending_pool = engine.lending_pool();
            let debt_coin = Coin::new(engine.debt_denom(), principal.amount);
            engine.ledger.transfer(owner, &lending_pool, &collateral)?;
            engine.ledger.mint(owner, &principal)?;
            engine.ledger.mint(&lending_pool, &debt_coin)?;

            let id = engine.store.next_position_id();
            let position = Position::new(
                id,
                owner.clone(),
                collateral_type.clone(),
                collateral.clone(),
                principal.clone(),
                engine.current_time,
                factor,
            );
            engine
                .store
                .set_deposit(Deposit::new(id, owner.clone(), collateral.clone()));
            engine.store.index_owner(&position);
            engine.store_position_and_ratio(position.clone(), &cp)?;
            engine.increment_total_principal(collateral_type, principal.amount)?;
            engine.run_after_created(&position);

            engine.emit_event(EventPayload::PositionOpened(PositionOpenedEvent {
                position_id: id,
                owner: owner.clone(),
                collateral_type: collateral_type.clone(),
                collateral,
                principal,
            }));
            Ok(id)
        })
    }

    /// Adds collateral from `depositor` to `owner`'s position. No price needed.
    pub fn deposit(
        &mut self,
        owner: &Address,
        depositor: &Address,
        collateral: Coin,
        collateral_type: &CollateralType,
    ) -> Result<(), CdpError> {
        self.transact(|engine| {
            require_address(owner)?;
            require_address(depositor)?;
            let cp = engine.collateral_param(collateral_type)?;
            require_collateral_coin(&cp, &collateral)?;
            let position = engine.find_position(owner, collateral_type)?;
            engine.require_balance(depositor, &collateral)?;

            let mut position = engine.synchronize_interest(position)?;

            let lending_pool = engine.lending_pool();
            engine.ledger.transfer(depositor, &lending_pool, &collateral)?;

            let mut row = engine
                .store
                .get_deposit(position.id, depositor)
                .cloned()
                .unwrap_or_else(|| Deposit::new(position.id, depositor.clone(), Coin::zero(cp.denom.clone())));
            row.amount.amount = row
                .amount
                .amount
                .checked_add(collateral.amount)
                .ok_or(CdpError::Overflow("deposit amount"))?;
            engine.store.set_deposit(row);

            position.collateral.amount = position
                .collateral
                .amount
                .checked_add(collateral.amount)
                .ok_or(CdpError::Overflow("position collateral"))?;
            let id = position.id;
            engine.store_position_and_ratio(position, &cp)?;

            engine.emit_event(EventPayload::Deposited(DepositedEvent {
                position_id: id,
                depositor: depositor.clone(),
                amount: collateral,
            }));
            Ok(())
        })
    }

    /// Returns collateral to `depositor`. The remaining collateral must still cover the debt
    /// at the spot price.
    pub fn withdraw(
        &mut self,
        owner: &Address,
        depositor: &Address,
        collateral: Coin,
        collateral_type: &CollateralType,
    ) -> Result<(), CdpError> {
        self.transact(|engine| {
            require_address(owner)?;
            require_address(depositor)?;
            let cp = engine.collateral_param(collateral_type)?;
            require_collateral_coin(&cp, &collateral)?;
            let position = engine.find_position(owner, collateral_type)?;

            let row = engine
                .store
                .get_deposit(position.id, depositor)
                .cloned()
                .ok_or_else(|| CdpError::DepositNotFound {
                    position_id: position.id,
                    depositor: depositor.clone(),
                })?;
            if collateral.amount > row.amount.amount {
                return Err(CdpError::WithdrawalExceedsDeposit {
                    requested: collateral.amount,
                    deposited: row.amount.amount,
                });
            }

            let mut position = engine.synchronize_interest(position)?;
            let remaining = position
                .collateral
                .amount
                .checked_sub(collateral.amount)
                .ok_or(CdpError::Overflow("position collateral"))?;
            let debt = position.total_debt().ok_or(CdpError::Overflow("position debt"))?;
            let price = engine.spot_price(&cp)?;
            engine.require_collateralization(&cp, remaining, debt, price)?;

            let lending_pool = engine.lending_pool();
            engine.ledger.transfer(&lending_pool, depositor, &collateral)?;

            let left = row.amount.amount.saturating_sub(collateral.amount);
            if left.is_zero() {
                engine.store.delete_deposit(position.id, depositor);
            } else {
                engine.store.set_deposit(Deposit {
                    amount: row.amount.with_amount(left),
                    ..row
                });
            }

            position.collateral.amount = remaining;
            let id = position.id;
            engine.store_position_and_ratio(position, &cp)?;

            engine.emit_event(EventPayload::Withdrawn(WithdrawnEvent {
                position_id: id,
                depositor: depositor.clone(),
                amount: collateral,
            }));
            Ok(())
        })
    }

    /// Mints more principal against an existing position.
    pub fn draw(&mut self, owner: &Address, collateral_type: &CollateralType, principal: Coin) -> Result<(), CdpError> {
        self.transact(|engine| {
            require_address(owner)?;
            let cp = engine.collateral_param(collateral_type)?;
            engine.require_principal_coin(&principal)?;
            let position = engine.find_position(owner, collateral_type)?;

            let mut position = engine.synchronize_interest(position)?;
            engine.require_within_debt_limits(&cp, principal.amount)?;

            let new_principal = position
                .principal
                .amount
                .checked_add(principal.amount)
                .ok_or(CdpError::Overflow("position principal"))?;
            let new_debt = new_principal
                .checked_add(position.accumulated_fees.amount)
                .ok_or(CdpError::Overflow("position debt"))?;
            let price = engine.spot_price(&cp)?;
            engine.require_collateralization(&cp, position.collateral.amount, new_debt, price)?;

            let lending_pool = engine.lending_pool();
            let debt_coin = Coin::new(engine.debt_denom(), principal.amount);
            engine.ledger.mint(owner, &principal)?;
            engine.ledger.mint(&lending_pool, &debt_coin)?;

            position.principal.amount = new_principal;
            let id = position.id;
            engine.store_position_and_ratio(position, &cp)?;
            engine.increment_total_principal(collateral_type, principal.amount)?;

            engine.emit_event(EventPayload::DebtDrawn(DebtDrawnEvent {
                position_id: id,
                owner: owner.clone(),
                amount: principal,
            }));
            Ok(())
        })
    }

    /// Pays down fees then principal. Anything above the total debt is not taken. Paying the
    /// full debt closes the position and returns every deposit. No price needed.
    pub fn repay(
        &mut self,
        owner: &Address,
        collateral_type: &CollateralType,
        payment: Coin,
    ) -> Result<RepayResult, CdpError> {
        self.transact(|engine| {
            require_address(owner)?;
            let cp = engine.collateral_param(collateral_type)?;
            engine.require_principal_coin(&payment)?;
            let position = engine.find_position(owner, collateral_type)?;

            let mut position = engine.synchronize_interest(position)?;
            let split = position.split_payment(payment.amount);
            let paid = payment.with_amount(split.total());
            engine.require_balance(owner, &paid)?;

            let remaining_principal = position.principal.amount.saturating_sub(split.principal_payment);
            let remaining_fees = position.accumulated_fees.amount.saturating_sub(split.fee_payment);
            let closes = remaining_principal.is_zero() && remaining_fees.is_zero();
            let floor = engine.debt_param().debt_floor;
            if remaining_principal.is_positive() && remaining_principal < floor {
                return Err(CdpError::BelowDebtFloor {
                    principal: remaining_principal,
                    floor,
                });
            }

            let lending_pool = engine.lending_pool();
            let debt_denom = engine.debt_denom();
            engine.ledger.burn(owner, &paid)?;
            let debt_held = engine.ledger.balance_of(&lending_pool, &debt_denom);
            engine
                .ledger
                .burn(&lending_pool, &Coin::new(debt_denom, paid.amount.min(debt_held)))?;
            engine.decrement_total_principal(collateral_type, paid.amount)?;

            position.principal.amount = remaining_principal;
            position.accumulated_fees.amount = remaining_fees;
            let id = position.id;

            engine.emit_event(EventPayload::DebtRepaid(DebtRepaidEvent {
                position_id: id,
                owner: owner.clone(),
                amount: paid,
                fee_payment: split.fee_payment,
                principal_payment: split.principal_payment,
            }));

            let collateral_returned = if closes {
                Some(engine.close_position(position)?)
            } else {
                engine.store_position_and_ratio(position, &cp)?;
                None
            };

            Ok(RepayResult {
                position_id: id,
                fee_payment: split.fee_payment,
                principal_payment: split.principal_payment,
                closed: closes,
                collateral_returned,
            })
        })
    }

    // every deposit goes back to whoever made it, then all rows of the position are removed
    fn close_position(&mut self, position: Position) -> Result<Coin, CdpError> {
        let lending_pool = self.lending_pool();
        let mut returned = Amount::ZERO;
        for deposit in self.store.deposits_of(position.id) {
            self.ledger.transfer(&lending_pool, &deposit.depositor, &deposit.amount)?;
            self.store.delete_deposit(position.id, &deposit.depositor);
            returned = returned
                .checked_add(deposit.amount.amount)
                .ok_or(CdpError::Overflow("returned collateral"))?;
        }

        self.store.remove_ratio(position.id);
        self.store.remove_owner_index(&position);
        self.store.delete_position(&position);

        let collateral_returned = position.collateral.with_amount(returned);
        self.emit_event(EventPayload::PositionClosed(PositionClosedEvent {
            position_id: position.id,
            owner: position.owner.clone(),
            collateral_returned: collateral_returned.clone(),
        }));
        Ok(collateral_returned)
    }

    pub(super) fn find_position(&self, owner: &Address, collateral_type: &CollateralType) -> Result<Position, CdpError> {
        self.store
            .position_id_by_owner(owner, collateral_type)
            .and_then(|id| self.store.get_position(collateral_type, id))
            .cloned()
            .ok_or_else(|| CdpError::PositionNotFound {
                owner: owner.clone(),
                collateral_type: collateral_type.clone(),
            })
    }

    fn require_principal_coin(&self, principal: &Coin) -> Result<(), CdpError> {
        let expected = self.params.params().stable_denom();
        if principal.denom != expected {
            return Err(CdpError::InvalidDebtDenom {
                expected: expected.to_string(),
                actual: principal.denom.clone(),
            });
        }
        if !principal.is_positive() {
            return Err(CdpError::InvalidAmount(principal.clone()));
        }
        Ok(())
    }

    fn require_debt_floor(&self, principal: Amount) -> Result<(), CdpError> {
        let floor = self.debt_param().debt_floor;
        if principal < floor {
            return Err(CdpError::BelowDebtFloor { principal, floor });
        }
        Ok(())
    }
}

fn require_address(address: &Address) -> Result<(), CdpError> {
    if address.is_empty() {
        return Err(CdpError::InvalidAddress);
    }
    Ok(())
}

fn require_collateral_coin(cp: &CollateralParam, collateral: &Coin) -> Result<(), CdpError> {
    if collateral.denom != cp.denom {
        return Err(CdpError::InvalidCollateralDenom {
            expected: cp.denom.clone(),
            actual: collateral.denom.clone(),
        });
    }
    if !collateral.is_positive() {
        return Err(CdpError::InvalidAmount(collateral.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::auction::AuctionHouse;
    use crate::config::{lending_pool, Params};
    use crate::engine::{CdpError, Engine, EngineConfig};
    use crate::hooks::{HookCall, HookLog};
    use crate::ledger::{InMemoryLedger, TokenLedger};
    use crate::oracle::PriceFeed;
    use crate::sortable::encode_ratio;
    use crate::types::{Address, Amount, CollateralType, Coin, Price, Timestamp};
    use rust_decimal_macros::dec;

    fn alice() -> Address {
        Address::new("kava1alice")
    }

    fn bob() -> Address {
        Address::new("kava1bob")
    }

    fn xrp() -> CollateralType {
        CollateralType::new("xrp-a")
    }

    fn engine() -> Engine {
        let ledger = InMemoryLedger::new()
            .with_balance(&alice(), Coin::new("xrp", 1_000_000_000_000u128))
            .with_balance(&bob(), Coin::new("xrp", 1_000_000_000_000u128));
        let oracle = PriceFeed::new()
            .with_price("xrp:usd", Price::new_unchecked(dec!(0.25)))
            .with_price("xrp:usd:30", Price::new_unchecked(dec!(0.25)));
        let mut engine = Engine::new(EngineConfig::default(), Params::default(), ledger, oracle, AuctionHouse::new()).unwrap();
        engine.set_time(Timestamp::from_secs(1_000));
        engine
    }

    fn open(engine: &mut Engine) {
        engine
            .open_position(
                &alice(),
                Coin::new("xrp", 400_000_000u128),
                Coin::new("usdx", 10_000_000u128),
                &xrp(),
            )
            .unwrap();
    }

    #[test]
    fn open_records_position_and_indexes() {
        let mut engine = engine();
        open(&mut engine);

        let id = engine.store().position_id_by_owner(&alice(), &xrp()).unwrap();
        let position = engine.store().get_position(&xrp(), id).unwrap();
        assert_eq!(position.collateral, Coin::new("xrp", 400_000_000u128));
        assert_eq!(position.principal, Coin::new("usdx", 10_000_000u128));
        assert_eq!(engine.store().ratio_entry(id), Some((0x02, encode_ratio(dec!(40)))));
        assert_eq!(engine.ledger().balance_of(&alice(), "usdx"), Amount::new(10_000_000));
        assert_eq!(engine.ledger().balance_of(&lending_pool(), "xrp"), Amount::new(400_000_000));
        assert_eq!(engine.ledger().balance_of(&lending_pool(), "debt"), Amount::new(10_000_000));
        assert_eq!(engine.store().total_principal(&xrp(), "usdx"), Amount::new(10_000_000));
    }

    #[test]
    fn open_rejects_duplicates_and_bad_input() {
        let mut engine = engine();
        open(&mut engine);

        let dup = engine.open_position(
            &alice(),
            Coin::new("xrp", 400_000_000u128),
            Coin::new("usdx", 10_000_000u128),
            &xrp(),
        );
        assert!(matches!(dup, Err(CdpError::PositionAlreadyExists { .. })));

        let wrong_denom = engine.open_position(
            &bob(),
            Coin::new("bnb", 400_000_000u128),
            Coin::new("usdx", 10_000_000u128),
            &xrp(),
        );
        assert!(matches!(wrong_denom, Err(CdpError::InvalidCollateralDenom { .. })));

        let under_floor = engine.open_position(
            &bob(),
            Coin::new("xrp", 400_000_000u128),
            Coin::new("usdx", 9_999_999u128),
            &xrp(),
        );
        assert!(matches!(under_floor, Err(CdpError::BelowDebtFloor { .. })));

        // 100 usdx of collateral cannot back 60 usdx at ratio 2.0
        let undercollateralized = engine.open_position(
            &bob(),
            Coin::new("xrp", 400_000_000u128),
            Coin::new("usdx", 60_000_000u128),
            &xrp(),
        );
        assert!(matches!(undercollateralized, Err(CdpError::BelowLiquidationRatio { .. })));
        assert_eq!(engine.store().position_count(), 1);
    }

    #[test]
    fn open_accepts_exact_liquidation_ratio() {
        let mut engine = engine();
        let id = engine
            .open_position(
                &bob(),
                Coin::new("xrp", 400_000_000u128),
                Coin::new("usdx", 50_000_000u128),
                &xrp(),
            )
            .unwrap();
        assert!(engine.store().get_position_by_id(id).is_some());
    }

    #[test]
    fn open_without_price_fails_cleanly() {
        let mut engine = engine();
        engine.oracle_mut().remove_price("xrp:usd");
        let result = engine.open_position(
            &alice(),
            Coin::new("xrp", 400_000_000u128),
            Coin::new("usdx", 10_000_000u128),
            &xrp(),
        );
        assert!(matches!(result, Err(CdpError::Oracle(_))));
        assert_eq!(engine.ledger().balance_of(&alice(), "xrp"), Amount::new(1_000_000_000_000));
        assert!(engine.events().is_empty());
    }

    #[test]
    fn deposit_and_withdraw_track_rows() {
        let mut engine = engine();
        open(&mut engine);
        let id = engine.store().position_id_by_owner(&alice(), &xrp()).unwrap();

        engine
            .deposit(&alice(), &bob(), Coin::new("xrp", 100_000_000u128), &xrp())
            .unwrap();
        let position = engine.store().get_position(&xrp(), id).unwrap();
        assert_eq!(position.collateral.amount, Amount::new(500_000_000));
        assert_eq!(engine.store().ratio_entry(id), Some((0x02, encode_ratio(dec!(50)))));

        let too_much = engine.withdraw(&alice(), &bob(), Coin::new("xrp", 100_000_001u128), &xrp());
        assert!(matches!(too_much, Err(CdpError::WithdrawalExceedsDeposit { .. })));

        engine
            .withdraw(&alice(), &bob(), Coin::new("xrp", 100_000_000u128), &xrp())
            .unwrap();
        assert!(engine.store().get_deposit(id, &bob()).is_none());
        assert_eq!(engine.ledger().balance_of(&bob(), "xrp"), Amount::new(1_000_000_000_000));

        let stranger = engine.withdraw(&alice(), &bob(), Coin::new("xrp", 1u128), &xrp());
        assert!(matches!(stranger, Err(CdpError::DepositNotFound { .. })));
    }

    #[test]
    fn withdraw_rechecks_ratio() {
        let mut engine = engine();
        open(&mut engine);
        // 400 xrp at 0.25 backs 10 usdx; keeping 80 xrp is exactly ratio 2.0
        let too_far = engine.withdraw(&alice(), &alice(), Coin::new("xrp", 320_000_001u128), &xrp());
        assert!(matches!(too_far, Err(CdpError::BelowLiquidationRatio { .. })));
        engine
            .withdraw(&alice(), &alice(), Coin::new("xrp", 320_000_000u128), &xrp())
            .unwrap();
    }

    #[test]
    fn draw_moves_ratio_entry() {
        let mut engine = engine();
        open(&mut engine);
        let id = engine.store().position_id_by_owner(&alice(), &xrp()).unwrap();

        engine.draw(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();
        let position = engine.store().get_position(&xrp(), id).unwrap();
        assert_eq!(position.principal.amount, Amount::new(20_000_000));
        assert_eq!(engine.store().ratio_entry(id), Some((0x02, encode_ratio(dec!(20)))));
        assert_eq!(engine.store().ratio_index_len(), 1);

        let too_much = engine.draw(&alice(), &xrp(), Coin::new("usdx", 40_000_000u128));
        assert!(matches!(too_much, Err(CdpError::BelowLiquidationRatio { .. })));
    }

    #[test]
    fn repay_respects_floor_then_closes() {
        let mut engine = engine();
        open(&mut engine);
        engine.draw(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();

        let dust = engine.repay(&alice(), &xrp(), Coin::new("usdx", 15_000_000u128));
        assert!(matches!(dust, Err(CdpError::BelowDebtFloor { .. })));

        let partial = engine.repay(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();
        assert!(!partial.closed);

        let full = engine.repay(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();
        assert!(full.closed);
        assert_eq!(full.collateral_returned, Some(Coin::new("xrp", 400_000_000u128)));
        assert_eq!(engine.ledger().balance_of(&alice(), "xrp"), Amount::new(1_000_000_000_000));
        assert_eq!(engine.store().position_count(), 0);
        assert_eq!(engine.store().ratio_index_len(), 0);
        assert!(engine.store().position_id_by_owner(&alice(), &xrp()).is_none());
        assert_eq!(engine.ledger().balance_of(&lending_pool(), "debt"), Amount::ZERO);
        assert_eq!(engine.store().total_principal(&xrp(), "usdx"), Amount::ZERO);
    }

    #[test]
    fn repay_needs_no_price() {
        let mut engine = engine();
        open(&mut engine);
        engine.oracle_mut().remove_price("xrp:usd");
        engine.oracle_mut().remove_price("xrp:usd:30");
        let result = engine.repay(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();
        assert!(result.closed);
    }

    #[test]
    fn fees_are_paid_first() {
        let mut engine = engine();
        open(&mut engine);
        engine.advance_time(31_536_000);
        engine.accumulate_interest(&xrp()).unwrap();

        let result = engine.repay(&alice(), &xrp(), Coin::new("usdx", 100_000u128)).unwrap();
        assert!(result.fee_payment.is_positive());
        assert_eq!(
            result.fee_payment.checked_add(result.principal_payment),
            Some(Amount::new(100_000))
        );
    }

    #[test]
    fn hooks_observe_creation_and_changes() {
        let log = HookLog::new();
        let mut engine = engine().with_hook(Box::new(log.clone()));
        open(&mut engine);
        engine
            .deposit(&alice(), &alice(), Coin::new("xrp", 1_000_000u128), &xrp())
            .unwrap();
        assert_eq!(log.calls(), vec![HookCall::Created(1), HookCall::Modified(1)]);
    }

    #[test]
    fn rejected_operations_notify_no_hooks() {
        let log = HookLog::new();
        let mut engine = engine().with_hook(Box::new(log.clone()));
        open(&mut engine);

        // syncs fees, then fails the ratio check
        let too_far = engine.withdraw(&alice(), &alice(), Coin::new("xrp", 320_000_001u128), &xrp());
        assert!(matches!(too_far, Err(CdpError::BelowLiquidationRatio { .. })));
        let duplicate = engine.open_position(
            &alice(),
            Coin::new("xrp", 400_000_000u128),
            Coin::new("usdx", 10_000_000u128),
            &xrp(),
        );
        assert!(duplicate.is_err());
        assert_eq!(log.calls(), vec![HookCall::Created(1)]);

        engine
            .withdraw(&alice(), &alice(), Coin::new("xrp", 1_000_000u128), &xrp())
            .unwrap();
        assert_eq!(log.calls(), vec![HookCall::Created(1), HookCall::Modified(1)]);
    }
}
