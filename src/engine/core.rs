// 8.0 engine/core.rs: main engine. owns the position store and handles to every collaborator.

use super::config::EngineConfig;
use super::results::{CdpError, ErrorKind};
use crate::auction::{AuctionHouse, AuctionMarket};
use crate::config::{lending_pool, liquidation_pool, CollateralParam, DebtParam, ParamStore, Params};
use crate::events::{Event, EventId, EventPayload};
use crate::hooks::PositionHooks;
use crate::ledger::{InMemoryLedger, TokenLedger};
use crate::oracle::{PriceFeed, PriceOracle};
use crate::position::{collateral_to_debt_ratio, collateralization_ratio, Position};
use crate::sortable::encode_ratio;
use crate::store::PositionStore;
use crate::types::{Address, Amount, CollateralType, Coin, Price, Timestamp};
use rust_decimal::Decimal;

/** 8.1: main engine struct. all state lives here, collaborators are explicit handles */
pub struct Engine<L = InMemoryLedger, O = PriceFeed, A = AuctionHouse, P = Params> {
    pub(super) config: EngineConfig,
    pub(super) params: P,
    pub(super) ledger: L,
    pub(super) oracle: O,
    pub(super) auctions: A,
    pub(super) hooks: Vec<Box<dyn PositionHooks>>,
    pub(super) store: PositionStore,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
    // nesting depth of transact; events are trimmed and hooks delivered only when the outermost
    // call commits
    depth: usize,
    pending_hooks: Vec<HookNotice>,
}

// observer call captured inside an operation, delivered after it commits
enum HookNotice {
    Created(Position),
    Modified(Position),
}

impl<L, O, A, P> Engine<L, O, A, P>
where
    L: TokenLedger,
    O: PriceOracle,
    A: AuctionMarket,
    P: ParamStore,
{
    pub fn new(config: EngineConfig, params: P, ledger: L, oracle: O, auctions: A) -> Result<Self, CdpError> {
        params.params().validate()?;
        Ok(Self {
            config,
            params,
            ledger,
            oracle,
            auctions,
            hooks: Vec::new(),
            store: PositionStore::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_millis(0),
            depth: 0,
            pending_hooks: Vec::new(),
        })
    }

    pub fn with_hook(mut self, hook: Box<dyn PositionHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: i64) {
        self.current_time = self.current_time.add_secs(secs);
    }

    pub fn params(&self) -> &Params {
        self.params.params()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn auctions(&self) -> &A {
        &self.auctions
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// 8.2: all-or-nothing wrapper. on Err the store writes, events and queued hook calls made
    /// inside `op` are undone.
    ///
    /// Ledger and auction-market calls made after validation are not rolled back here; any such
    /// failure is fatal and the host discards the whole step.
    pub(super) fn transact<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T, CdpError>) -> Result<T, CdpError> {
        let checkpoint = self.store.checkpoint();
        let events_len = self.events.len();
        let next_event_id = self.next_event_id;
        let hooks_len = self.pending_hooks.len();

        self.depth += 1;
        let result = op(self);
        self.depth -= 1;

        match result {
            Ok(value) => {
                self.store.commit(checkpoint);
                if self.depth == 0 {
                    self.trim_events();
                    self.deliver_hooks();
                }
                Ok(value)
            }
            Err(e) => {
                self.store.rollback(checkpoint);
                self.events.truncate(events_len);
                self.next_event_id = next_event_id;
                self.pending_hooks.truncate(hooks_len);
                if e.kind() == ErrorKind::FatalInvariant {
                    tracing::warn!(error = %e, "fatal invariant violation, step must abort");
                } else {
                    tracing::debug!(error = %e, "operation rejected");
                }
                Err(e)
            }
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        tracing::debug!(
            id = event.id.0,
            kind = event.payload.name(),
            position = ?event.payload.position_id(),
            "event"
        );

        self.events.push(event);
    }

    fn trim_events(&mut self) {
        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    // 8.3: parameter lookups. cloned so callers can keep them across store mutations

    pub(super) fn collateral_param(&self, collateral_type: &CollateralType) -> Result<CollateralParam, CdpError> {
        self.params
            .params()
            .collateral_param(collateral_type)
            .cloned()
            .ok_or_else(|| CdpError::UnsupportedCollateral(collateral_type.clone()))
    }

    pub(super) fn debt_param(&self) -> DebtParam {
        self.params.params().debt_param.clone()
    }

    pub(super) fn debt_denom(&self) -> String {
        self.params.params().debt_denom.clone()
    }

    pub(super) fn spot_price(&self, cp: &CollateralParam) -> Result<Price, CdpError> {
        Ok(self.oracle.current_price(&cp.spot_market_id)?)
    }

    pub(super) fn liquidation_price(&self, cp: &CollateralParam) -> Result<Price, CdpError> {
        Ok(self.oracle.current_price(&cp.liquidation_market_id)?)
    }

    pub(super) fn lending_pool(&self) -> Address {
        lending_pool()
    }

    pub(super) fn liquidation_pool(&self) -> Address {
        liquidation_pool()
    }

    // 8.4: shared checks

    pub(super) fn require_balance(&self, account: &Address, coin: &Coin) -> Result<(), CdpError> {
        let available = self.ledger.balance_of(account, &coin.denom);
        if available < coin.amount {
            return Err(CdpError::InsufficientBalance {
                account: account.clone(),
                available: coin.with_amount(available),
                requested: coin.clone(),
            });
        }
        Ok(())
    }

    /// Priced ratio of `collateral` against `debt`, rejected if below the liquidation ratio.
    /// equality passes.
    pub(super) fn require_collateralization(
        &self,
        cp: &CollateralParam,
        collateral: Amount,
        debt: Amount,
        price: Price,
    ) -> Result<Decimal, CdpError> {
        let debt_conversion = self.params.params().debt_param.conversion_factor;
        let ratio = collateralization_ratio(collateral, cp.conversion_factor, debt, debt_conversion, price)
            .ok_or(CdpError::Overflow("collateralization ratio"))?;
        if ratio < cp.liquidation_ratio {
            return Err(CdpError::BelowLiquidationRatio {
                ratio,
                required: cp.liquidation_ratio,
            });
        }
        Ok(ratio)
    }

    /// Type and global debt caps for `additional` new principal.
    pub(super) fn require_within_debt_limits(&self, cp: &CollateralParam, additional: Amount) -> Result<(), CdpError> {
        let params = self.params.params();
        let denom = params.stable_denom();

        let type_total = self.store.total_principal(&cp.collateral_type, denom);
        let requested = type_total
            .checked_add(additional)
            .ok_or(CdpError::Overflow("type debt total"))?;
        if requested > cp.debt_limit.amount {
            return Err(CdpError::ExceedsDebtLimit {
                requested,
                limit: cp.debt_limit.amount,
            });
        }

        let global_total = self
            .store
            .total_principal_all(denom)
            .and_then(|t| t.checked_add(additional))
            .ok_or(CdpError::Overflow("global debt total"))?;
        if global_total > params.global_debt_limit.amount {
            return Err(CdpError::ExceedsDebtLimit {
                requested: global_total,
                limit: params.global_debt_limit.amount,
            });
        }
        Ok(())
    }

    // 8.5: persistence of a changed position. stale index entry out, current one in

    pub(super) fn store_position_and_ratio(&mut self, position: Position, cp: &CollateralParam) -> Result<(), CdpError> {
        let debt_conversion = self.params.params().debt_param.conversion_factor;
        let debt = position.total_debt().ok_or(CdpError::Overflow("position debt"))?;
        let ratio = collateral_to_debt_ratio(position.collateral.amount, cp.conversion_factor, debt, debt_conversion)
            .ok_or(CdpError::Overflow("collateral to debt ratio"))?;
        self.store.insert_ratio(cp.prefix, encode_ratio(ratio), position.id);
        self.store.set_position(position);
        Ok(())
    }

    pub(super) fn increment_total_principal(&mut self, collateral_type: &CollateralType, amount: Amount) -> Result<(), CdpError> {
        let denom = self.params.params().stable_denom().to_string();
        let total = self
            .store
            .total_principal(collateral_type, &denom)
            .checked_add(amount)
            .ok_or(CdpError::Overflow("total principal"))?;
        self.store.set_total_principal(collateral_type, &denom, total);
        Ok(())
    }

    /// Position fees are floored, but each accrual rounds the aggregate to nearest, so the
    /// aggregate can trail live debt by at most one unit per accrual. a shortfall within that
    /// slack clamps to zero; anything larger is a broken invariant.
    pub(super) fn decrement_total_principal(&mut self, collateral_type: &CollateralType, amount: Amount) -> Result<(), CdpError> {
        let denom = self.params.params().stable_denom().to_string();
        let total = self.store.total_principal(collateral_type, &denom);
        let updated = match total.checked_sub(amount) {
            Some(updated) => updated,
            None => {
                let shortfall = amount.saturating_sub(total);
                let tolerance = self.store.rounding_slack(collateral_type).saturating_add(1);
                if shortfall.value() > tolerance {
                    return Err(CdpError::NegativeTotalPrincipal {
                        collateral_type: collateral_type.clone(),
                        shortfall,
                    });
                }
                Amount::ZERO
            }
        };
        self.store.set_total_principal(collateral_type, &denom, updated);
        Ok(())
    }

    pub(super) fn run_after_created(&mut self, position: &Position) {
        self.notify(HookNotice::Created(position.clone()));
    }

    pub(super) fn run_before_modified(&mut self, position: &Position) {
        self.notify(HookNotice::Modified(position.clone()));
    }

    fn notify(&mut self, notice: HookNotice) {
        if self.hooks.is_empty() {
            return;
        }
        self.pending_hooks.push(notice);
        if self.depth == 0 {
            self.deliver_hooks();
        }
    }

    fn deliver_hooks(&mut self) {
        for notice in std::mem::take(&mut self.pending_hooks) {
            for hook in self.hooks.iter_mut() {
                match &notice {
                    HookNotice::Created(position) => hook.after_position_created(position),
                    HookNotice::Modified(position) => hook.before_position_modified(position),
                }
            }
        }
    }
}
