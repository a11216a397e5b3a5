//! CDP Engine Simulation.
//!
//! Walks the lending lifecycle against the in-memory ledger, price feed and auction house:
//! opening, drawing, repaying, liquidation auctions, savings, and block upkeep.
//! Set `RUST_LOG=cdp_core=debug` to trace every event.

use cdp_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("CDP Engine Simulation");
    println!("Single Debt Asset, Per-Type Collateral, Full Lifecycle\n");

    scenario_1_open_position();
    scenario_2_draw_debt();
    scenario_3_repay_and_close();
    scenario_4_liquidation_auctions();
    scenario_5_savings_distribution();
    scenario_6_block_upkeep();

    println!("\nAll simulations completed successfully.");
}

fn alice() -> Address {
    Address::new("kava1alice")
}

fn xrp() -> CollateralType {
    CollateralType::new("xrp-a")
}

fn price(value: Decimal) -> Price {
    Price::new(value).unwrap()
}

fn new_engine(ledger: InMemoryLedger, spot: Price) -> Engine {
    let oracle = PriceFeed::new()
        .with_price("xrp:usd", spot)
        .with_price("xrp:usd:30", spot);
    let mut engine = Engine::new(EngineConfig::default(), Params::default(), ledger, oracle, AuctionHouse::new()).unwrap();
    engine.set_time(Timestamp::from_secs(1_600_000_000));
    engine
}

fn funded_engine() -> Engine {
    let ledger = InMemoryLedger::new().with_balance(&alice(), Coin::new("xrp", 1_000_000_000u128));
    new_engine(ledger, price(dec!(0.25)))
}

fn print_index(engine: &Engine, id: PositionId) {
    match engine.store().ratio_entry(id) {
        Some((_, ratio)) => println!("  Ratio index entry: {}", decode_ratio(ratio.as_bytes()).unwrap()),
        None => println!("  Ratio index entry: none"),
    }
}

/// Open a position with 400 XRP backing 10 USDX.
fn scenario_1_open_position() {
    println!("Scenario 1: Open Position\n");

    let mut engine = funded_engine();
    let id = engine
        .open_position(&alice(), Coin::new("xrp", 400_000_000u128), Coin::new("usdx", 10_000_000u128), &xrp())
        .unwrap();

    let position = engine.position(&alice(), &xrp()).unwrap();
    println!("  Position {}: collateral {}, principal {}", id, position.collateral, position.principal);
    println!("  Alice holds {}", engine.ledger().balance_of(&alice(), "usdx"));
    print_index(&engine, id);
    println!();
}

/// Draw more debt against the same collateral.
fn scenario_2_draw_debt() {
    println!("Scenario 2: Draw Debt\n");

    let mut engine = funded_engine();
    let id = engine
        .open_position(&alice(), Coin::new("xrp", 400_000_000u128), Coin::new("usdx", 10_000_000u128), &xrp())
        .unwrap();
    engine.draw(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();

    let position = engine.position(&alice(), &xrp()).unwrap();
    println!("  Principal after draw: {}", position.principal);
    print_index(&engine, id);
    println!("  Index entries: {}\n", engine.store().ratio_index_len());
}

/// Repay in two steps; the second closes the position and returns the collateral.
fn scenario_3_repay_and_close() {
    println!("Scenario 3: Repay and Close\n");

    let mut engine = funded_engine();
    engine
        .open_position(&alice(), Coin::new("xrp", 400_000_000u128), Coin::new("usdx", 10_000_000u128), &xrp())
        .unwrap();
    engine.draw(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();

    let first = engine.repay(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();
    println!("  First repayment closed position: {}", first.closed);
    let second = engine.repay(&alice(), &xrp(), Coin::new("usdx", 10_000_000u128)).unwrap();
    println!("  Second repayment closed position: {}", second.closed);
    println!("  Collateral returned: {}", second.collateral_returned.unwrap());
    println!("  Alice holds {}", engine.ledger().balance_of(&alice(), "xrp"));
    println!("  Live positions: {}\n", engine.store().position_count());
}

/// Liquidation price falls; the scan seizes the position and auctions its collateral.
fn scenario_4_liquidation_auctions() {
    println!("Scenario 4: Liquidation and Auctions\n");

    let mut engine = funded_engine();
    engine
        .open_position(&alice(), Coin::new("xrp", 400_000_000u128), Coin::new("usdx", 40_000_000u128), &xrp())
        .unwrap();

    engine
        .oracle_mut()
        .set_price("xrp:usd:30", price(dec!(0.15)));
    println!("  XRP liquidation price drops from $0.25 to $0.15");

    let results = engine.liquidate_unsafe_positions(&xrp()).unwrap();
    for result in &results {
        println!(
            "  Seized position {}: collateral {}, debt {}, penalty {}",
            result.position_id, result.collateral, result.debt, result.penalty
        );
    }

    let mut bid_total = 0u128;
    for request in engine.auctions().collateral_auctions() {
        println!("  Auction lot {} for up to {}", request.lot, request.max_bid);
        bid_total += request.max_bid.amount.value();
    }
    println!("  Total auction target: {}\n", bid_total);
}

/// Pay 95% of the liquidation pool's surplus to stable holders.
fn scenario_5_savings_distribution() {
    println!("Scenario 5: Savings Distribution\n");

    let saver = Address::new("kava1saver");
    let ledger = InMemoryLedger::new()
        .with_balance(&liquidation_pool(), Coin::new("usdx", 10_000u128))
        .with_balance(&saver, Coin::new("usdx", 100u128))
        .with_balance(&Address::new("kava1whale"), Coin::new("usdx", 900u128));
    let mut engine = new_engine(ledger, price(dec!(0.25)));

    let result = engine.distribute_savings().unwrap();
    println!("  Intended {}, distributed {} to {} holders", result.intended, result.distributed, result.recipients);
    println!("  Saver with 10% of supply now holds {}\n", engine.ledger().balance_of(&saver, "usdx"));
}

/// A year of daily blocks accrues stability fees into the system surplus.
fn scenario_6_block_upkeep() {
    println!("Scenario 6: Block Upkeep\n");

    let mut engine = funded_engine();
    let start = engine.time();
    engine.begin_block(start).unwrap();
    engine
        .open_position(&alice(), Coin::new("xrp", 400_000_000u128), Coin::new("usdx", 10_000_000u128), &xrp())
        .unwrap();

    let mut skipped = 0;
    for day in 1..=365 {
        let result = engine.begin_block(start.add_secs(day * 86_400)).unwrap();
        skipped += result.skipped.len();
    }

    println!("  Interest factor after a year: {}", engine.interest_factor(&xrp()).unwrap());
    println!("  Total principal: {}", engine.total_principal(&xrp()).unwrap());
    println!("  Type-blocks skipped for missing prices: {}", skipped);
    println!("  Events recorded: {}\n", engine.events().len());
}
