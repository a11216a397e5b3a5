// cdp-core: collateralized debt position engine.
// positions lock collateral and mint a stable asset against it; fees compound per second,
// unsafe positions are seized and auctioned, system surplus and debt are settled by auction.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: PositionId, Address, Amount, Coin, Price, Timestamp
//   2.x  sortable.rs: order-preserving ratio encoding for the ratio index
//   3.x  apportion.rs: largest remainder apportionment
//   4.x  interest.rs: fixed-point stability fee compounding
//   5.x  position.rs: position, deposits, payment split, collateral ratios
//   6.x  store.rs: position store with owner, ratio and deposit indexes
//   7.x  config.rs: collateral/debt params, validation, presets
//   8.x  engine/: core engine: positions, accrual, liquidations, auctions, settlement
//   9.x  ledger.rs: token ledger seam + in-memory ledger
//   9.2  oracle.rs: price oracle seam + fixed feed
//   9.3  auction.rs: auction market seam, lot planning, recording auction house
//   9.4  hooks.rs: position observers
//   11.x events.rs: state transition events for audit

// core lending modules
pub mod apportion;
pub mod engine;
pub mod events;
pub mod interest;
pub mod position;
pub mod sortable;
pub mod store;
pub mod types;

// collaborator seams
pub mod auction;
pub mod config;
pub mod hooks;
pub mod ledger;
pub mod oracle;

// re exports for convenience
pub use apportion::*;
pub use auction::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use hooks::*;
pub use interest::*;
pub use ledger::*;
pub use oracle::*;
pub use position::*;
pub use sortable::*;
pub use store::*;
pub use types::*;
