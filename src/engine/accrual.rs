//! Stability fee accrual.
//!
//! Two halves that must agree. `accumulate_interest` compounds a collateral type's aggregate
//! principal by the incremental factor since the last accrual, mints the new debt, and folds the
//! increment into the type's cumulative factor. `synchronize_interest` brings one position up to
//! that cumulative factor using the snapshot it stored at its last sync.

use super::core::Engine;
use super::results::{AccrualResult, CdpError};
use crate::auction::AuctionMarket;
use crate::config::{CollateralParam, ParamStore};
use crate::events::{EventPayload, InterestAccruedEvent};
use crate::interest::{apply_factor, calculate_interest_factor, interest_since_snapshot};
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::position::Position;
use crate::types::{Amount, CollateralType, Coin};
use rust_decimal::Decimal;

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    /// Factor 1 and accrual time now for a type that has never accrued.
    /// A type with an accrual time but no factor is corrupt.
    pub(super) fn ensure_accrual_state(&mut self, collateral_type: &CollateralType) -> Result<Decimal, CdpError> {
        let factor = self.store.interest_factor(collateral_type);
        let accrued_at = self.store.previous_accrual_time(collateral_type);
        match (factor, accrued_at) {
            (Some(factor), Some(_)) => Ok(factor),
            (Some(factor), None) => {
                self.store.set_previous_accrual_time(collateral_type, self.current_time);
                Ok(factor)
            }
            (None, None) => {
                self.store.set_interest_factor(collateral_type, Decimal::ONE);
                self.store.set_previous_accrual_time(collateral_type, self.current_time);
                Ok(Decimal::ONE)
            }
            (None, Some(_)) => Err(CdpError::MissingInterestFactor(collateral_type.clone())),
        }
    }

    /// Compounds the type's aggregate principal up to the current block time.
    pub fn accumulate_interest(&mut self, collateral_type: &CollateralType) -> Result<AccrualResult, CdpError> {
        self.transact(|engine| engine.accumulate_interest_inner(collateral_type))
    }

    fn accumulate_interest_inner(&mut self, collateral_type: &CollateralType) -> Result<AccrualResult, CdpError> {
        let cp = self.collateral_param(collateral_type)?;
        let stable = self.params.params().stable_denom().to_string();
        let now = self.current_time;

        let unchanged = |factor: Decimal, seconds: u64| AccrualResult {
            collateral_type: collateral_type.clone(),
            interest: Amount::ZERO,
            interest_factor: factor,
            seconds_elapsed: seconds,
        };

        let Some(previous) = self.store.previous_accrual_time(collateral_type) else {
            let factor = self.ensure_accrual_state(collateral_type)?;
            return Ok(unchanged(factor, 0));
        };
        let factor_prior = self
            .store
            .interest_factor(collateral_type)
            .ok_or_else(|| CdpError::MissingInterestFactor(collateral_type.clone()))?;

        let seconds = previous.elapsed_seconds(&now);
        if seconds == 0 {
            return Ok(unchanged(factor_prior, 0));
        }

        let principal_prior = self.store.total_principal(collateral_type, &stable);
        if principal_prior.is_zero() || cp.stability_fee == Decimal::ONE {
            self.store.set_previous_accrual_time(collateral_type, now);
            return Ok(unchanged(factor_prior, seconds));
        }

        let increment = calculate_interest_factor(cp.stability_fee, seconds)?;
        let principal_new = apply_factor(principal_prior, increment).ok_or(CdpError::Overflow("accrued principal"))?;
        let interest = principal_new.saturating_sub(principal_prior);

        // sub-unit interest leaves the clock alone so it keeps compounding
        if interest.is_zero() {
            return Ok(unchanged(factor_prior, seconds));
        }

        let factor_new = factor_prior
            .checked_mul(increment)
            .ok_or(CdpError::Overflow("interest factor"))?;

        // validated: nothing below can fail on user input
        let lending_pool = self.lending_pool();
        let liquidation_pool = self.liquidation_pool();
        let debt_denom = self.debt_denom();
        self.ledger.mint(&lending_pool, &Coin::new(debt_denom, interest))?;
        self.ledger.mint(&liquidation_pool, &Coin::new(stable.clone(), interest))?;

        self.store.set_total_principal(collateral_type, &stable, principal_new);
        self.store.add_rounding_slack(collateral_type);
        self.store.set_interest_factor(collateral_type, factor_new);
        self.store.set_previous_accrual_time(collateral_type, now);

        tracing::debug!(
            collateral_type = %collateral_type,
            seconds,
            interest = %interest,
            factor = %factor_new,
            "interest accrued"
        );

        self.emit_event(EventPayload::InterestAccrued(InterestAccruedEvent {
            collateral_type: collateral_type.clone(),
            interest: Coin::new(stable, interest),
            interest_factor: factor_new,
            total_principal: principal_new,
        }));

        Ok(AccrualResult {
            collateral_type: collateral_type.clone(),
            interest,
            interest_factor: factor_new,
            seconds_elapsed: seconds,
        })
    }

    /// Brings a position's fees up to the type's cumulative factor. Returns the updated copy;
    /// callers persist it together with its new ratio entry.
    pub(super) fn synchronize_interest(&mut self, mut position: Position) -> Result<Position, CdpError> {
        self.run_before_modified(&position);

        let collateral_type = position.collateral_type.clone();
        let Some(global_factor) = self.store.interest_factor(&collateral_type) else {
            self.ensure_accrual_state(&collateral_type)?;
            position.interest_factor = Decimal::ONE;
            position.fees_updated = self.current_time;
            return Ok(position);
        };
        let Some(accrued_at) = self.store.previous_accrual_time(&collateral_type) else {
            return Ok(position);
        };

        let debt = position.total_debt().ok_or(CdpError::Overflow("position debt"))?;
        let interest = interest_since_snapshot(debt, global_factor, position.interest_factor)
            .ok_or(CdpError::Overflow("position interest"))?;

        if interest.is_zero() && position.fees_updated == accrued_at {
            return Ok(position);
        }

        position.accumulated_fees.amount = position
            .accumulated_fees
            .amount
            .checked_add(interest)
            .ok_or(CdpError::Overflow("accumulated fees"))?;
        position.fees_updated = accrued_at;
        position.interest_factor = global_factor;
        Ok(position)
    }

    /// Syncs fees (and index entries) of the riskiest positions below `threshold`, up to the
    /// type's per-scan limit. Returns how many were synced.
    pub fn synchronize_risky_positions(&mut self, collateral_type: &CollateralType, threshold: Decimal) -> Result<usize, CdpError> {
        self.transact(|engine| {
            let cp = engine.collateral_param(collateral_type)?;
            engine.synchronize_risky_inner(&cp, threshold)
        })
    }

    pub(super) fn synchronize_risky_inner(&mut self, cp: &CollateralParam, threshold: Decimal) -> Result<usize, CdpError> {
        let bound = crate::sortable::encode_ratio(threshold);
        let ids: Vec<_> = self
            .store
            .iter_below(cp.prefix, bound)
            .take(cp.check_collateralization_index_count)
            .map(|(_, id)| id)
            .collect();

        let mut synced = 0;
        for id in ids {
            let Some(position) = self.store.get_position(&cp.collateral_type, id).cloned() else {
                continue;
            };
            let position = self.synchronize_interest(position)?;
            self.store_position_and_ratio(position, cp)?;
            synced += 1;
        }
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use crate::auction::AuctionHouse;
    use crate::config::{lending_pool, liquidation_pool, Params};
    use crate::engine::{CdpError, Engine, EngineConfig};
    use crate::ledger::{InMemoryLedger, TokenLedger};
    use crate::oracle::PriceFeed;
    use crate::types::{Amount, CollateralType, Timestamp};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn engine() -> Engine {
        let mut engine = Engine::new(
            EngineConfig::default(),
            Params::default(),
            InMemoryLedger::new(),
            PriceFeed::new(),
            AuctionHouse::new(),
        )
        .unwrap();
        engine.set_time(Timestamp::from_secs(1_000));
        engine
    }

    fn xrp() -> CollateralType {
        CollateralType::new("xrp-a")
    }

    #[test]
    fn first_call_bootstraps() {
        let mut engine = engine();
        let result = engine.accumulate_interest(&xrp()).unwrap();
        assert_eq!(result.interest, Amount::ZERO);
        assert_eq!(engine.store().interest_factor(&xrp()), Some(Decimal::ONE));
        assert_eq!(engine.store().previous_accrual_time(&xrp()), Some(Timestamp::from_secs(1_000)));
    }

    #[test]
    fn zero_principal_advances_clock() {
        let mut engine = engine();
        engine.accumulate_interest(&xrp()).unwrap();
        engine.advance_time(60);
        engine.accumulate_interest(&xrp()).unwrap();
        assert_eq!(engine.store().previous_accrual_time(&xrp()), Some(Timestamp::from_secs(1_060)));
        assert_eq!(engine.store().interest_factor(&xrp()), Some(Decimal::ONE));
    }

    #[test]
    fn accrual_mints_debt_and_surplus() {
        let mut engine = engine();
        engine.accumulate_interest(&xrp()).unwrap();
        engine.store.set_total_principal(&xrp(), "usdx", Amount::new(1_000_000_000_000));

        engine.advance_time(31_536_000);
        let result = engine.accumulate_interest(&xrp()).unwrap();

        // ~5% of 1,000,000 usdx
        assert!(result.interest > Amount::new(49_990_000_000));
        assert!(result.interest < Amount::new(50_010_000_000));
        assert_eq!(engine.ledger().balance_of(&lending_pool(), "debt"), result.interest);
        assert_eq!(engine.ledger().balance_of(&liquidation_pool(), "usdx"), result.interest);
        assert_eq!(
            engine.store().total_principal(&xrp(), "usdx"),
            Amount::new(1_000_000_000_000).checked_add(result.interest).unwrap()
        );
        assert!(engine.store().interest_factor(&xrp()).unwrap() > dec!(1.04));
    }

    #[test]
    fn rounded_to_zero_keeps_clock() {
        let mut engine = engine();
        engine.accumulate_interest(&xrp()).unwrap();
        engine.store.set_total_principal(&xrp(), "usdx", Amount::new(10));

        engine.advance_time(6);
        let result = engine.accumulate_interest(&xrp()).unwrap();
        assert_eq!(result.interest, Amount::ZERO);
        assert_eq!(engine.store().previous_accrual_time(&xrp()), Some(Timestamp::from_secs(1_000)));
    }

    #[test]
    fn missing_factor_is_fatal() {
        let mut engine = engine();
        engine.store.set_previous_accrual_time(&xrp(), Timestamp::from_secs(0));
        let err = engine.accumulate_interest(&xrp()).unwrap_err();
        assert_eq!(err, CdpError::MissingInterestFactor(xrp()));
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_type_rejected() {
        let mut engine = engine();
        let err = engine.accumulate_interest(&CollateralType::new("doge-a")).unwrap_err();
        assert!(matches!(err, CdpError::UnsupportedCollateral(_)));
    }
}
