// 11.0: every state change produces an event. used for audit trails, indexers, and the rewards
// observers downstream. the EventPayload enum lists all event types.

use crate::auction::{AuctionId, AuctionKind};
use crate::types::{Address, Amount, CollateralType, Coin, PositionId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Position events
    PositionOpened(PositionOpenedEvent),
    Deposited(DepositedEvent),
    Withdrawn(WithdrawnEvent),
    DebtDrawn(DebtDrawnEvent),
    DebtRepaid(DebtRepaidEvent),
    PositionClosed(PositionClosedEvent),

    // Risk events
    PositionLiquidated(PositionLiquidatedEvent),
    AuctionStarted(AuctionStartedEvent),

    // System events
    InterestAccrued(InterestAccruedEvent),
    SurplusNetted(SurplusNettedEvent),
    SavingsDistributed(SavingsDistributedEvent),
}

impl EventPayload {
    /// Position the event is about, if any.
    pub fn position_id(&self) -> Option<PositionId> {
        match self {
            EventPayload::PositionOpened(e) => Some(e.position_id),
            EventPayload::Deposited(e) => Some(e.position_id),
            EventPayload::Withdrawn(e) => Some(e.position_id),
            EventPayload::DebtDrawn(e) => Some(e.position_id),
            EventPayload::DebtRepaid(e) => Some(e.position_id),
            EventPayload::PositionClosed(e) => Some(e.position_id),
            EventPayload::PositionLiquidated(e) => Some(e.position_id),
            EventPayload::AuctionStarted(_)
            | EventPayload::InterestAccrued(_)
            | EventPayload::SurplusNetted(_)
            | EventPayload::SavingsDistributed(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventPayload::PositionOpened(_) => "position_opened",
            EventPayload::Deposited(_) => "deposited",
            EventPayload::Withdrawn(_) => "withdrawn",
            EventPayload::DebtDrawn(_) => "debt_drawn",
            EventPayload::DebtRepaid(_) => "debt_repaid",
            EventPayload::PositionClosed(_) => "position_closed",
            EventPayload::PositionLiquidated(_) => "position_liquidated",
            EventPayload::AuctionStarted(_) => "auction_started",
            EventPayload::InterestAccrued(_) => "interest_accrued",
            EventPayload::SurplusNetted(_) => "surplus_netted",
            EventPayload::SavingsDistributed(_) => "savings_distributed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionOpenedEvent {
    pub position_id: PositionId,
    pub owner: Address,
    pub collateral_type: CollateralType,
    pub collateral: Coin,
    pub principal: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositedEvent {
    pub position_id: PositionId,
    pub depositor: Address,
    pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawnEvent {
    pub position_id: PositionId,
    pub depositor: Address,
    pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtDrawnEvent {
    pub position_id: PositionId,
    pub owner: Address,
    pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtRepaidEvent {
    pub position_id: PositionId,
    pub owner: Address,
    pub amount: Coin,
    pub fee_payment: Amount,
    pub principal_payment: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClosedEvent {
    pub position_id: PositionId,
    pub owner: Address,
    pub collateral_returned: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub position_id: PositionId,
    pub owner: Address,
    pub collateral_type: CollateralType,
    pub collateral: Coin,
    // debt tokens moved to the liquidation pool, before penalty
    pub debt: Coin,
    pub penalty: Coin,
    pub keeper: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionStartedEvent {
    pub auction_id: AuctionId,
    pub kind: AuctionKind,
    pub lot: Coin,
    pub bid: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestAccruedEvent {
    pub collateral_type: CollateralType,
    pub interest: Coin,
    pub interest_factor: Decimal,
    pub total_principal: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurplusNettedEvent {
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsDistributedEvent {
    pub total: Coin,
    pub recipients: usize,
}
