// 8.7 engine/auctions.rs: hands seized collateral and system surplus/debt to the auction market.
// coins move into the auction escrow account before the market is called.

use super::core::Engine;
use super::results::CdpError;
use crate::apportion::largest_remainder;
use crate::auction::{plan_collateral_lots, AuctionId, AuctionKind, AuctionMarket, LotAuctionRequest, AUCTION_ESCROW};
use crate::config::{CollateralParam, ParamStore, DEBT_AUCTION_BID_MULTIPLIER};
use crate::events::{AuctionStartedEvent, EventPayload};
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::position::Deposit;
use crate::types::{Address, Amount, Coin};

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    /// Splits seized deposits into lots and starts one collateral auction per lot.
    ///
    /// `debt` and `penalty` are apportioned across lots by collateral with the largest
    /// remainder method, so the lots' targets add up to `debt + penalty` exactly.
    pub(super) fn auction_collateral(
        &mut self,
        cp: &CollateralParam,
        deposits: &[Deposit],
        debt: Amount,
        penalty: Amount,
    ) -> Result<Vec<AuctionId>, CdpError> {
        let shares: Vec<(Address, Amount)> = deposits
            .iter()
            .filter(|d| d.amount.is_positive())
            .map(|d| (d.depositor.clone(), d.amount.amount))
            .collect();
        let lots = plan_collateral_lots(&shares, cp.auction_size);
        if lots.is_empty() {
            return Ok(Vec::new());
        }

        let weights: Vec<Amount> = lots.iter().map(|lot| lot.collateral).collect();
        let lot_debts = largest_remainder(debt, &weights)?;
        let lot_penalties = largest_remainder(penalty, &weights)?;

        let seller = self.liquidation_pool();
        let escrow = Address::module(AUCTION_ESCROW);
        let stable = self.params.params().stable_denom().to_string();
        let debt_denom = self.debt_denom();

        let mut ids = Vec::with_capacity(lots.len());
        for ((lot, lot_debt), lot_penalty) in lots.into_iter().zip(lot_debts).zip(lot_penalties) {
            let target = lot_debt
                .checked_add(lot_penalty)
                .ok_or(CdpError::Overflow("auction target"))?;
            let lot_coin = Coin::new(cp.denom.clone(), lot.collateral);
            let max_bid = Coin::new(stable.clone(), target);
            let debt_coin = Coin::new(debt_denom.clone(), target);

            self.ledger.transfer(&seller, &escrow, &lot_coin)?;
            self.ledger.transfer(&seller, &escrow, &debt_coin)?;

            let id = self.auctions.start_lot_auction(LotAuctionRequest {
                seller: seller.clone(),
                lot: lot_coin.clone(),
                max_bid: max_bid.clone(),
                return_addresses: lot.return_addresses,
                return_weights: lot.return_weights,
                debt: debt_coin,
            })?;

            tracing::info!(
                auction = %id,
                collateral_type = %cp.collateral_type,
                lot = %lot_coin,
                max_bid = %max_bid,
                "collateral auction started"
            );
            self.emit_event(EventPayload::AuctionStarted(AuctionStartedEvent {
                auction_id: id,
                kind: AuctionKind::Collateral,
                lot: lot_coin,
                bid: max_bid,
            }));
            ids.push(id);
        }
        Ok(ids)
    }

    /// Sells `amount` of the liquidation pool's stable surplus for the governance token.
    pub(super) fn start_surplus_auction(&mut self, amount: Amount) -> Result<AuctionId, CdpError> {
        let seller = self.liquidation_pool();
        let escrow = Address::module(AUCTION_ESCROW);
        let params = self.params.params();
        let lot = Coin::new(params.stable_denom(), amount);
        let gov_denom = params.gov_denom.clone();

        self.ledger.transfer(&seller, &escrow, &lot)?;
        let id = self.auctions.start_surplus_auction(&seller, lot.clone(), &gov_denom)?;

        tracing::info!(auction = %id, lot = %lot, "surplus auction started");
        self.emit_event(EventPayload::AuctionStarted(AuctionStartedEvent {
            auction_id: id,
            kind: AuctionKind::Surplus,
            lot,
            bid: Coin::zero(gov_denom),
        }));
        Ok(id)
    }

    /// Mints governance tokens to buy back `amount` of bad debt. The first bid is a fixed
    /// multiple of the debt in governance units.
    pub(super) fn start_debt_auction(&mut self, amount: Amount) -> Result<AuctionId, CdpError> {
        let buyer = self.liquidation_pool();
        let escrow = Address::module(AUCTION_ESCROW);
        let params = self.params.params();
        let bid = Coin::new(params.stable_denom(), amount);
        let initial_lot = Coin::new(
            params.gov_denom.clone(),
            amount
                .checked_mul(DEBT_AUCTION_BID_MULTIPLIER)
                .ok_or(CdpError::Overflow("debt auction lot"))?,
        );
        let debt = Coin::new(self.debt_denom(), amount);

        self.ledger.transfer(&buyer, &escrow, &debt)?;
        let id = self
            .auctions
            .start_debt_auction(&buyer, bid.clone(), initial_lot.clone(), debt)?;

        tracing::info!(auction = %id, bid = %bid, initial_lot = %initial_lot, "debt auction started");
        self.emit_event(EventPayload::AuctionStarted(AuctionStartedEvent {
            auction_id: id,
            kind: AuctionKind::Debt,
            lot: initial_lot,
            bid,
        }));
        Ok(id)
    }
}
