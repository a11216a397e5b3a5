// 8.9 engine/blocks.rs: per-block upkeep. accrue every type, liquidate what became unsafe, settle
// surplus and debt, and pay savings on schedule.

use super::core::Engine;
use super::results::{BlockResult, CdpError, ErrorKind};
use crate::auction::AuctionMarket;
use crate::config::ParamStore;
use crate::ledger::TokenLedger;
use crate::oracle::PriceOracle;
use crate::types::{CollateralType, Timestamp};

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    /// Runs the block's upkeep at `now`.
    ///
    /// A type whose liquidation price is unavailable is skipped for this block and reported in
    /// `skipped`. Any fatal error aborts the block and must be treated as a halted step.
    pub fn begin_block(&mut self, now: Timestamp) -> Result<BlockResult, CdpError> {
        self.set_time(now);
        let mut result = BlockResult::default();

        if self.params.params().circuit_breaker {
            tracing::debug!(time = %now, "circuit breaker set, block skipped");
            return Ok(result);
        }

        let types: Vec<CollateralType> = self.params.params().collateral_types().cloned().collect();
        for collateral_type in types {
            self.transact(|engine| engine.ensure_accrual_state(&collateral_type))?;
            result.accruals.push(self.accumulate_interest(&collateral_type)?);

            match self.liquidate_unsafe_positions(&collateral_type) {
                Ok(liquidations) => result.liquidations.extend(liquidations),
                Err(e) if e.kind() != ErrorKind::FatalInvariant => {
                    tracing::warn!(
                        collateral_type = %collateral_type,
                        error = %e,
                        "liquidation skipped"
                    );
                    result.skipped.push((collateral_type, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        result.settlement = Some(self.settle_via_auctions()?);

        let frequency = self.params.params().savings_distribution_frequency_secs;
        match self.store.previous_distribution_time() {
            None => self.store.set_previous_distribution_time(now),
            Some(previous) if previous.elapsed_seconds(&now) >= frequency => {
                result.distribution = Some(self.distribute_savings()?);
            }
            Some(_) => {}
        }

        tracing::debug!(
            time = %now,
            liquidations = result.liquidations.len(),
            skipped = result.skipped.len(),
            "block processed"
        );
        Ok(result)
    }
}
