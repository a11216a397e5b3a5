//! Store invariant tests.
//!
//! Random operation sequences across several owners; after every step the ratio index,
//! deposit rows, pool custody and aggregate principal must agree with the live positions.

use cdp_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
enum Op {
    Open { owner: usize, collateral: u128, principal: u128 },
    Deposit { owner: usize, depositor: usize, amount: u128 },
    Withdraw { owner: usize, depositor: usize, amount: u128 },
    Draw { owner: usize, amount: u128 },
    Repay { owner: usize, amount: u128 },
    Accrue { seconds: i64 },
    Reprice { cents: i64 },
}

const OWNERS: usize = 4;

fn owner(i: usize) -> Address {
    Address::new(format!("kava1owner{}", i % OWNERS))
}

fn xrp() -> CollateralType {
    CollateralType::new("xrp-a")
}

fn price(value: Decimal) -> Price {
    Price::new(value).unwrap()
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..OWNERS, 100u128..2_000, 10u128..200).prop_map(|(owner, c, p)| Op::Open {
            owner,
            collateral: c * 1_000_000,
            principal: p * 1_000_000,
        }),
        (0..OWNERS, 0..OWNERS, 1u128..500).prop_map(|(owner, depositor, a)| Op::Deposit {
            owner,
            depositor,
            amount: a * 1_000_000,
        }),
        (0..OWNERS, 0..OWNERS, 1u128..500).prop_map(|(owner, depositor, a)| Op::Withdraw {
            owner,
            depositor,
            amount: a * 1_000_000,
        }),
        (0..OWNERS, 1u128..100).prop_map(|(owner, a)| Op::Draw { owner, amount: a * 1_000_000 }),
        (0..OWNERS, 1u128..300).prop_map(|(owner, a)| Op::Repay { owner, amount: a * 500_000 }),
        (1i64..2_592_000).prop_map(|seconds| Op::Accrue { seconds }),
        (10i64..60).prop_map(|cents| Op::Reprice { cents }),
    ]
}

fn engine() -> Engine {
    let mut ledger = InMemoryLedger::new();
    for i in 0..OWNERS {
        ledger = ledger
            .with_balance(&owner(i), Coin::new("xrp", 100_000_000_000u128))
            .with_balance(&owner(i), Coin::new("usdx", 1_000_000_000u128));
    }
    let oracle = PriceFeed::new()
        .with_price("xrp:usd", price(dec!(0.25)))
        .with_price("xrp:usd:30", price(dec!(0.25)));
    let mut engine = Engine::new(EngineConfig::default(), Params::default(), ledger, oracle, AuctionHouse::new()).unwrap();
    engine.set_time(Timestamp::from_secs(1_600_000_000));
    engine
}

fn apply(engine: &mut Engine, op: &Op) -> Result<(), CdpError> {
    match *op {
        Op::Open { owner: o, collateral, principal } => engine
            .open_position(&owner(o), Coin::new("xrp", collateral), Coin::new("usdx", principal), &xrp())
            .map(|_| ()),
        Op::Deposit { owner: o, depositor, amount } => {
            engine.deposit(&owner(o), &owner(depositor), Coin::new("xrp", amount), &xrp())
        }
        Op::Withdraw { owner: o, depositor, amount } => {
            engine.withdraw(&owner(o), &owner(depositor), Coin::new("xrp", amount), &xrp())
        }
        Op::Draw { owner: o, amount } => engine.draw(&owner(o), &xrp(), Coin::new("usdx", amount)),
        Op::Repay { owner: o, amount } => engine.repay(&owner(o), &xrp(), Coin::new("usdx", amount)).map(|_| ()),
        Op::Accrue { seconds } => {
            engine.advance_time(seconds);
            engine.accumulate_interest(&xrp()).map(|_| ())
        }
        Op::Reprice { cents } => {
            let quote = price(Decimal::new(cents, 2));
            engine.oracle_mut().set_price("xrp:usd", quote);
            engine.oracle_mut().set_price("xrp:usd:30", quote);
            engine.liquidate_unsafe_positions(&xrp()).map(|_| ())
        }
    }
}

fn check_invariants(engine: &Engine) -> Result<(), TestCaseError> {
    let cp = engine.params().collateral_param(&xrp()).unwrap().clone();
    let debt_conversion = engine.params().debt_param.conversion_factor;
    let positions = engine.positions_by_type(&xrp()).unwrap();

    // one index entry per live position, at its current ratio
    prop_assert_eq!(engine.store().ratio_index_len(), positions.len());
    for position in &positions {
        let debt = position.total_debt().unwrap();
        let ratio = collateral_to_debt_ratio(position.collateral.amount, cp.conversion_factor, debt, debt_conversion).unwrap();
        prop_assert_eq!(engine.store().ratio_entry(position.id), Some((cp.prefix, encode_ratio(ratio))));

        let deposits = engine.store().deposits_of(position.id);
        let deposited = Amount::checked_sum(deposits.iter().map(|d| &d.amount.amount)).unwrap();
        prop_assert_eq!(deposited, position.collateral.amount);
        prop_assert!(deposits.iter().all(|d| !d.in_liquidation));
    }

    // the lending pool custodies exactly the live collateral
    let locked = engine.total_collateral(&xrp()).unwrap();
    prop_assert_eq!(engine.ledger().balance_of(&lending_pool(), "xrp"), locked.amount);

    // the aggregate trails live debt by no more than its own accrual rounding
    let live_debt: u128 = positions.iter().map(|p| p.total_debt().unwrap().value()).sum();
    let aggregate = engine.total_principal(&xrp()).unwrap().amount.value();
    prop_assert!(live_debt <= aggregate + engine.store().rounding_slack(&xrp()));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_stays_consistent(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut engine = engine();
        for op in &ops {
            if let Err(e) = apply(&mut engine, op) {
                prop_assert!(!e.is_fatal(), "fatal error on {:?}: {}", op, e);
            }
            check_invariants(&engine)?;
        }
    }

    /// Failed operations leave no trace in the store or event log.
    #[test]
    fn rejected_operations_are_atomic(ops in proptest::collection::vec(op_strategy(), 1..30)) {
        let mut engine = engine();
        for op in &ops {
            let events_before = engine.events().len();
            let positions_before = engine.positions_by_type(&xrp()).unwrap();
            let entries_before: Vec<_> = engine.store().ratio_entries(0x02).collect();
            if apply(&mut engine, op).is_err() {
                prop_assert_eq!(engine.events().len(), events_before);
                prop_assert_eq!(engine.positions_by_type(&xrp()).unwrap(), positions_before);
                let entries_after: Vec<_> = engine.store().ratio_entries(0x02).collect();
                prop_assert_eq!(entries_after, entries_before);
            }
        }
    }
}

#[test]
fn open_then_repay_round_trip() {
    let mut engine = engine();
    let alice = owner(0);
    let bob = owner(1);
    let before_alice = engine.ledger().balance_of(&alice, "xrp");
    let before_bob = engine.ledger().balance_of(&bob, "xrp");

    let id = engine
        .open_position(&alice, Coin::new("xrp", 1_000_000_000u128), Coin::new("usdx", 50_000_000u128), &xrp())
        .unwrap();
    engine
        .deposit(&alice, &bob, Coin::new("xrp", 300_000_000u128), &xrp())
        .unwrap();
    engine.advance_time(3_600);
    engine.accumulate_interest(&xrp()).unwrap();

    let debt = engine.position(&alice, &xrp()).unwrap().total_debt().unwrap();
    let result = engine.repay(&alice, &xrp(), Coin::new("usdx", debt.value() + 1_000_000)).unwrap();
    assert!(result.closed);
    assert!(result.fee_payment.is_positive());

    assert_eq!(engine.ledger().balance_of(&alice, "xrp"), before_alice);
    assert_eq!(engine.ledger().balance_of(&bob, "xrp"), before_bob);
    assert!(engine.position_by_id(id).is_none());
    assert!(engine.store().deposits_of(id).is_empty());
    assert_eq!(engine.store().ratio_index_len(), 0);
    assert!(engine.store().position_id_by_owner(&alice, &xrp()).is_none());
}
