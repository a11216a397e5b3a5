// 8.8 engine/settlement.rs: system surplus and debt. the liquidation pool collects stable surplus
// (interest, auction proceeds) and debt tokens (seized debt). netting cancels the overlap; what is
// left over a threshold goes to auction; a share of the surplus is paid out to stable holders.

use super::core::Engine;
use super::results::{CdpError, DistributionResult, SettlementResult};
use crate::apportion::largest_remainder;
use crate::auction::AuctionMarket;
use crate::config::ParamStore;
use crate::events::{EventPayload, SavingsDistributedEvent, SurplusNettedEvent};
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::types::{Address, Amount, Coin};

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    /// Burns equal amounts of stable surplus and debt tokens held by the liquidation pool.
    pub fn net_surplus_and_debt(&mut self) -> Result<Amount, CdpError> {
        self.transact(|engine| engine.net_surplus_and_debt_inner())
    }

    fn net_surplus_and_debt_inner(&mut self) -> Result<Amount, CdpError> {
        let pool = self.liquidation_pool();
        let stable = self.params.params().stable_denom().to_string();
        let debt_denom = self.debt_denom();

        let surplus = self.ledger.balance_of(&pool, &stable);
        let debt = self.ledger.balance_of(&pool, &debt_denom);
        let netted = surplus.min(debt);
        if netted.is_zero() {
            return Ok(Amount::ZERO);
        }

        self.ledger.burn(&pool, &Coin::new(stable, netted))?;
        self.ledger.burn(&pool, &Coin::new(debt_denom, netted))?;

        tracing::debug!(amount = %netted, "surplus netted against debt");
        self.emit_event(EventPayload::SurplusNetted(SurplusNettedEvent { amount: netted }));
        Ok(netted)
    }

    /// Nets, then starts a debt auction and/or a surplus auction for balances at or over their
    /// thresholds. Each auction is capped at its configured lot.
    pub fn settle_via_auctions(&mut self) -> Result<SettlementResult, CdpError> {
        self.transact(|engine| {
            let netted = engine.net_surplus_and_debt_inner()?;

            let pool = engine.liquidation_pool();
            let params = engine.params.params();
            let stable = params.stable_denom().to_string();
            let (debt_threshold, debt_lot) = (params.debt_auction_threshold, params.debt_auction_lot);
            let (surplus_threshold, surplus_lot) = (params.surplus_auction_threshold, params.surplus_auction_lot);
            let debt_denom = engine.debt_denom();

            let mut result = SettlementResult {
                netted,
                ..SettlementResult::default()
            };

            let debt = engine.ledger.balance_of(&pool, &debt_denom);
            if debt.is_positive() && debt >= debt_threshold {
                result.debt_auction = Some(engine.start_debt_auction(debt.min(debt_lot))?);
            }

            let surplus = engine.ledger.balance_of(&pool, &stable);
            if surplus.is_positive() && surplus >= surplus_threshold {
                result.surplus_auction = Some(engine.start_surplus_auction(surplus.min(surplus_lot))?);
            }
            Ok(result)
        })
    }

    /// Pays `savings_rate` of the liquidation pool's stable surplus to every non-module holder
    /// of the stable asset, in proportion to balance.
    pub fn distribute_savings(&mut self) -> Result<DistributionResult, CdpError> {
        self.transact(|engine| {
            let pool = engine.liquidation_pool();
            let params = engine.params.params();
            let stable = params.stable_denom().to_string();
            let rate = params.debt_param.savings_rate;

            let surplus = engine.ledger.balance_of(&pool, &stable);
            let intended = surplus
                .to_decimal()
                .and_then(|s| s.checked_mul(rate))
                .and_then(Amount::from_decimal_floor)
                .ok_or(CdpError::Overflow("savings to distribute"))?;

            let now = engine.current_time;
            engine.store.set_previous_distribution_time(now);

            let holders: Vec<(Address, Amount)> = engine
                .ledger
                .holders(&stable)
                .into_iter()
                .filter(|(account, _)| !account.is_module())
                .collect();
            if intended.is_zero() || holders.is_empty() {
                return Ok(DistributionResult {
                    intended,
                    ..DistributionResult::default()
                });
            }

            let weights: Vec<Amount> = holders.iter().map(|(_, balance)| *balance).collect();
            let shares = largest_remainder(intended, &weights)?;

            let mut remaining = intended;
            let mut recipients = 0;
            for ((account, _), share) in holders.iter().zip(shares) {
                let paid = share.min(remaining);
                if paid.is_zero() {
                    continue;
                }
                engine.ledger.transfer(&pool, account, &Coin::new(stable.clone(), paid))?;
                remaining = remaining.saturating_sub(paid);
                recipients += 1;
            }
            let distributed = intended.saturating_sub(remaining);

            tracing::info!(
                intended = %intended,
                distributed = %distributed,
                recipients,
                "savings distributed"
            );
            engine.emit_event(EventPayload::SavingsDistributed(SavingsDistributedEvent {
                total: Coin::new(stable, distributed),
                recipients,
            }));

            Ok(DistributionResult {
                intended,
                distributed,
                recipients,
            })
        })
    }
}
