// 8.0.2: result types and errors for engine operations.

use crate::apportion::ApportionError;
use crate::auction::{AuctionError, AuctionId};
use crate::config::ConfigError;
use crate::interest::InterestError;
use crate::ledger::LedgerError;
use crate::oracle::OracleError;
use crate::position::{Deposit, Position};
use crate::sortable::SortableError;
use crate::types::{Address, Amount, CollateralType, Coin, PositionId};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct RepayResult {
    pub position_id: PositionId,
    pub fee_payment: Amount,
    pub principal_payment: Amount,
    pub closed: bool,
    pub collateral_returned: Option<Coin>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationResult {
    pub position_id: PositionId,
    pub owner: Address,
    pub collateral_type: CollateralType,
    pub collateral: Coin,
    pub debt: Amount,
    pub penalty: Amount,
    pub seized_deposits: Vec<Deposit>,
    pub auctions: Vec<AuctionId>,
    pub keeper_reward: Option<Coin>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccrualResult {
    pub collateral_type: CollateralType,
    pub interest: Amount,
    pub interest_factor: Decimal,
    pub seconds_elapsed: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementResult {
    pub netted: Amount,
    pub debt_auction: Option<AuctionId>,
    pub surplus_auction: Option<AuctionId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionResult {
    pub intended: Amount,
    pub distributed: Amount,
    pub recipients: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockResult {
    pub accruals: Vec<AccrualResult>,
    pub liquidations: Vec<LiquidationResult>,
    pub skipped: Vec<(CollateralType, String)>,
    pub settlement: Option<SettlementResult>,
    pub distribution: Option<DistributionResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedPosition {
    pub position: Position,
    // collateral priced in the debt asset at the spot price
    pub collateral_value: Coin,
    pub collateralization_ratio: Decimal,
}

/// How the enclosing step should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    ExternalDependency,
    FatalInvariant,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CdpError {
    // validation
    #[error("Collateral type {0} is not supported")]
    UnsupportedCollateral(CollateralType),

    #[error("Collateral denom {actual} does not match {expected}")]
    InvalidCollateralDenom { expected: String, actual: String },

    #[error("Debt denom {actual} does not match {expected}")]
    InvalidDebtDenom { expected: String, actual: String },

    #[error("Amount must be positive: {0}")]
    InvalidAmount(Coin),

    #[error("Address is empty")]
    InvalidAddress,

    // business rules
    #[error("{owner} already has a {collateral_type} position")]
    PositionAlreadyExists {
        owner: Address,
        collateral_type: CollateralType,
    },

    #[error("{owner} has no {collateral_type} position")]
    PositionNotFound {
        owner: Address,
        collateral_type: CollateralType,
    },

    #[error("No deposit from {depositor} on position {position_id}")]
    DepositNotFound {
        position_id: PositionId,
        depositor: Address,
    },

    #[error("Collateralization ratio {ratio} is below the liquidation ratio {required}")]
    BelowLiquidationRatio { ratio: Decimal, required: Decimal },

    #[error("Principal {principal} is below the debt floor {floor}")]
    BelowDebtFloor { principal: Amount, floor: Amount },

    #[error("Requested debt {requested} exceeds the limit {limit}")]
    ExceedsDebtLimit { requested: Amount, limit: Amount },

    #[error("Withdrawal of {requested} exceeds deposit of {deposited}")]
    WithdrawalExceedsDeposit { requested: Amount, deposited: Amount },

    #[error("{account} holds {available}, needs {requested}")]
    InsufficientBalance {
        account: Address,
        available: Coin,
        requested: Coin,
    },

    #[error("Position {0} is not below its liquidation ratio")]
    NotLiquidatable(PositionId),

    // collaborators
    #[error("Price oracle: {0}")]
    Oracle(#[from] OracleError),

    // fatal
    // the market is only called once the lot is escrowed, so a refusal strands coins
    #[error("Auction market refused escrowed coins: {0}")]
    Auction(#[from] AuctionError),

    #[error("Ledger failed after validation: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Total principal for {collateral_type} would go negative by {shortfall}")]
    NegativeTotalPrincipal {
        collateral_type: CollateralType,
        shortfall: Amount,
    },

    #[error("Interest factor missing for {0} although accrual has started")]
    MissingInterestFactor(CollateralType),

    #[error("Interest: {0}")]
    Interest(#[from] InterestError),

    #[error("Apportionment: {0}")]
    Apportion(#[from] ApportionError),

    #[error("Ratio encoding: {0}")]
    Sortable(#[from] SortableError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),
}

impl CdpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CdpError::UnsupportedCollateral(_)
            | CdpError::InvalidCollateralDenom { .. }
            | CdpError::InvalidDebtDenom { .. }
            | CdpError::InvalidAmount(_)
            | CdpError::InvalidAddress => ErrorKind::Validation,

            CdpError::PositionAlreadyExists { .. }
            | CdpError::PositionNotFound { .. }
            | CdpError::DepositNotFound { .. }
            | CdpError::BelowLiquidationRatio { .. }
            | CdpError::BelowDebtFloor { .. }
            | CdpError::ExceedsDebtLimit { .. }
            | CdpError::WithdrawalExceedsDeposit { .. }
            | CdpError::InsufficientBalance { .. }
            | CdpError::NotLiquidatable(_) => ErrorKind::BusinessRule,

            // a dark oracle only blocks the operations that need a price
            CdpError::Oracle(_) => ErrorKind::BusinessRule,
            CdpError::Auction(_)
            | CdpError::Ledger(_)
            | CdpError::Overflow(_)
            | CdpError::NegativeTotalPrincipal { .. }
            | CdpError::MissingInterestFactor(_)
            | CdpError::Interest(_)
            | CdpError::Apportion(_)
            | CdpError::Sortable(_)
            | CdpError::Config(_) => ErrorKind::FatalInvariant,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::FatalInvariant
    }
}
