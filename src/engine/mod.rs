// 8.0: lending engine. coordinates position operations, fee accrual, liquidation,
// auction dispatch, and surplus/debt settlement.
// deterministic and event-driven with no external I/O; collaborators are explicit handles.

mod accrual;
mod auctions;
mod blocks;
mod config;
mod core;
mod liquidations;
mod positions;
mod queries;
mod results;
mod settlement;

pub use config::EngineConfig;
pub use self::core::Engine;
pub use results::{
    AccrualResult, AugmentedPosition, BlockResult, CdpError, DistributionResult, ErrorKind, LiquidationResult,
    RepayResult, SettlementResult,
};
