// 3.0: largest remainder apportionment. splits an integer total across weights so the parts
// sum to the total exactly. used by auction lot splitting and savings distribution.

use crate::types::Amount;
use ethnum::U256;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApportionError {
    #[error("Cannot apportion {0} across weights that sum to zero")]
    ZeroTotalWeight(Amount),

    #[error("Weight sum overflows")]
    Overflow,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    remainder: U256,
}

// larger remainder first, earlier index breaks ties so the result is reproducible
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.remainder.cmp(&a.remainder).then(a.index.cmp(&b.index))
}

/// 3.1: proportional split of `total` by `weights`.
///
/// Each part starts as `floor(total * weight / sum)`. The units lost to truncation
/// (always fewer than the number of non-zero weights) are awarded one at a time to
/// the parts with the largest truncated remainder. The result never sums above
/// `total`, and with any non-zero weight it sums to exactly `total`.
pub fn largest_remainder(total: Amount, weights: &[Amount]) -> Result<Vec<Amount>, ApportionError> {
    let weight_sum = Amount::checked_sum(weights).ok_or(ApportionError::Overflow)?;
    if weight_sum.is_zero() {
        if total.is_zero() {
            return Ok(vec![Amount::ZERO; weights.len()]);
        }
        return Err(ApportionError::ZeroTotalWeight(total));
    }

    let total_wide = U256::new(total.value());
    let sum_wide = U256::new(weight_sum.value());

    let mut parts = Vec::with_capacity(weights.len());
    let mut candidates = Vec::with_capacity(weights.len());
    let mut allocated: u128 = 0;

    for (index, weight) in weights.iter().enumerate() {
        // total * weight fits in 256 bits for any pair of u128s
        let product = total_wide * U256::new(weight.value());
        let share = product / sum_wide;
        let remainder = product % sum_wide;

        // share <= total, so the low word holds it
        let (_, share_low) = share.into_words();
        parts.push(Amount::new(share_low));
        allocated += share_low;

        if !weight.is_zero() {
            candidates.push(Candidate { index, remainder });
        }
    }

    let deficit = total.value() - allocated;
    candidates.sort_by(rank);
    for candidate in candidates.iter().take(deficit as usize) {
        parts[candidate.index] = Amount::new(parts[candidate.index].value() + 1);
    }

    Ok(parts)
}
