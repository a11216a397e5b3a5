//! Property-based tests for the core math.
//!
//! These tests verify invariants hold under random inputs.

use cdp_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    // 0% to ~500% APR per second
    (0i64..=51_034_942_716i64).prop_map(|x| Decimal::ONE + Decimal::new(x, 18))
}

// zero or at least ~1% APR, so one more second always outgrows per-step rounding
fn material_rate_strategy() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(Decimal::ONE),
        (300_000_000i64..=51_034_942_716i64).prop_map(|x| Decimal::ONE + Decimal::new(x, 18)),
    ]
}

fn amount_strategy() -> impl Strategy<Value = Amount> {
    (0u128..1_000_000_000_000_000u128).prop_map(Amount::new)
}

fn weights_strategy() -> impl Strategy<Value = Vec<Amount>> {
    proptest::collection::vec((0u128..10_000_000_000u128).prop_map(Amount::new), 1..30)
}

fn ratio_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..i64::MAX, 0u32..=18u32).prop_map(|(m, scale)| Decimal::new(m, scale))
}

fn sum(amounts: &[Amount]) -> u128 {
    amounts.iter().map(|a| a.value()).sum()
}

proptest! {
    /// Factor is exactly one at zero elapsed time
    #[test]
    fn factor_is_one_at_zero(rate in rate_strategy()) {
        prop_assert_eq!(calculate_interest_factor(rate, 0).unwrap(), Decimal::ONE);
    }

    /// Factor never decreases as time passes
    #[test]
    fn factor_monotonic_in_time(
        rate in material_rate_strategy(),
        a in 0u64..(5 * 31_536_000u64),
        b in 0u64..(5 * 31_536_000u64),
    ) {
        let (short, long) = if a <= b { (a, b) } else { (b, a) };
        let f_short = calculate_interest_factor(rate, short).unwrap();
        let f_long = calculate_interest_factor(rate, long).unwrap();
        prop_assert!(f_short >= Decimal::ONE);
        prop_assert!(f_long >= f_short, "{} < {} ({}s vs {}s)", f_long, f_short, long, short);
    }

    /// Snapshot interest is never negative and never more than the growth implies
    #[test]
    fn snapshot_interest_bounded(
        debt in amount_strategy(),
        rate in rate_strategy(),
        seconds in 0u64..31_536_000u64,
    ) {
        let factor = calculate_interest_factor(rate, seconds).unwrap();
        let interest = interest_since_snapshot(debt, factor, Decimal::ONE).unwrap();
        let exact = debt.to_decimal().unwrap() * (factor - Decimal::ONE);
        prop_assert!(interest.to_decimal().unwrap() <= exact + dec!(0.000001));
    }

    /// Apportioned parts always sum to the total exactly
    #[test]
    fn apportion_is_exact(total in amount_strategy(), weights in weights_strategy()) {
        prop_assume!(weights.iter().any(|w| w.is_positive()));
        let parts = largest_remainder(total, &weights).unwrap();
        prop_assert_eq!(parts.len(), weights.len());
        prop_assert_eq!(sum(&parts), total.value());
        for (part, weight) in parts.iter().zip(&weights) {
            if weight.is_zero() {
                prop_assert!(part.is_zero());
            }
        }
    }

    /// Each part is within one unit of its exact proportional share
    #[test]
    fn apportion_is_fair(total in 0u128..1_000_000_000u128, weights in weights_strategy()) {
        let weight_sum = sum(&weights);
        prop_assume!(weight_sum > 0);
        let parts = largest_remainder(Amount::new(total), &weights).unwrap();
        for (part, weight) in parts.iter().zip(&weights) {
            let floor = total * weight.value() / weight_sum;
            prop_assert!(part.value() == floor || part.value() == floor + 1);
        }
    }

    /// Lots cover the deposits exactly and only the last lot may be short
    #[test]
    fn lots_cover_deposits(
        deposits in proptest::collection::vec(1u128..50_000u128, 1..12),
        lot_size in 1u128..20_000u128,
    ) {
        let deposits: Vec<(Address, Amount)> = deposits
            .into_iter()
            .enumerate()
            .map(|(i, a)| (Address::new(format!("kava1d{:02}", i)), Amount::new(a)))
            .collect();
        let total: u128 = deposits.iter().map(|(_, a)| a.value()).sum();

        let lots = plan_collateral_lots(&deposits, Amount::new(lot_size));
        prop_assert_eq!(lots.iter().map(|l| l.collateral.value()).sum::<u128>(), total);
        for (i, lot) in lots.iter().enumerate() {
            prop_assert_eq!(sum(&lot.return_weights), lot.collateral.value());
            prop_assert_eq!(lot.return_addresses.len(), lot.return_weights.len());
            if i + 1 < lots.len() {
                prop_assert_eq!(lot.collateral.value(), lot_size);
            } else {
                prop_assert!(lot.collateral.value() <= lot_size);
            }
        }
    }

    /// Lot debt targets sum to requested debt plus penalty exactly
    #[test]
    fn auction_targets_are_exact(
        deposits in proptest::collection::vec(1u128..50_000u128, 1..12),
        lot_size in 1u128..20_000u128,
        debt in 0u128..1_000_000_000u128,
        penalty_bps in 0u128..1_000u128,
    ) {
        let deposits: Vec<(Address, Amount)> = deposits
            .into_iter()
            .enumerate()
            .map(|(i, a)| (Address::new(format!("kava1d{:02}", i)), Amount::new(a)))
            .collect();
        let penalty = debt * penalty_bps / 10_000;

        let lots = plan_collateral_lots(&deposits, Amount::new(lot_size));
        let weights: Vec<Amount> = lots.iter().map(|l| l.collateral).collect();
        let debts = largest_remainder(Amount::new(debt), &weights).unwrap();
        let penalties = largest_remainder(Amount::new(penalty), &weights).unwrap();
        prop_assert_eq!(sum(&debts) + sum(&penalties), debt + penalty);
    }

    /// Savings never pay out more than intended, and leave less than one unit per recipient
    #[test]
    fn savings_bounded(
        surplus in 0u128..10_000_000_000u128,
        balances in proptest::collection::vec(1u128..1_000_000_000u128, 1..10),
    ) {
        let mut ledger = InMemoryLedger::new().with_balance(&liquidation_pool(), Coin::new("usdx", surplus));
        for (i, balance) in balances.iter().enumerate() {
            ledger = ledger.with_balance(&Address::new(format!("kava1h{:02}", i)), Coin::new("usdx", *balance));
        }
        let mut engine = Engine::new(EngineConfig::default(), Params::default(), ledger, PriceFeed::new(), AuctionHouse::new()).unwrap();

        let result = engine.distribute_savings().unwrap();
        prop_assert!(result.distributed <= result.intended);
        let residual = result.intended.value() - result.distributed.value();
        prop_assert!(residual < balances.len() as u128);
        prop_assert_eq!(
            engine.ledger().balance_of(&liquidation_pool(), "usdx").value(),
            surplus - result.distributed.value()
        );
    }

    /// Encoding preserves numeric order
    #[test]
    fn sortable_preserves_order(a in ratio_strategy(), b in ratio_strategy()) {
        let (ea, eb) = (encode_ratio(a), encode_ratio(b));
        if a < b {
            prop_assert!(ea <= eb);
        } else if a > b {
            prop_assert!(ea >= eb);
        } else {
            prop_assert_eq!(ea, eb);
        }
    }

    /// Decoding an encoded ratio gives it back, up to eighteen decimal places
    #[test]
    fn sortable_round_trips(a in ratio_strategy()) {
        let decoded = decode_ratio(encode_ratio(a).as_bytes()).unwrap();
        prop_assert_eq!(decoded, a.min(max_sortable_ratio()));
    }
}
