// 9.2: price oracle seam. the engine asks for one market's current price and nothing else.
// aggregation, staleness and medianising happen on the other side of this trait.

use crate::types::Price;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("No price available for market {0}")]
    NoPriceAvailable(String),
}

pub trait PriceOracle {
    fn current_price(&self, market_id: &str) -> Result<Price, OracleError>;
}

/// Fixed prices keyed by market id. removing a price simulates the oracle going dark.
#[derive(Debug, Clone, Default)]
pub struct PriceFeed {
    prices: BTreeMap<String, Price>,
}

impl PriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, market_id: &str, price: Price) -> Self {
        self.set_price(market_id, price);
        self
    }

    pub fn set_price(&mut self, market_id: &str, price: Price) {
        self.prices.insert(market_id.to_string(), price);
    }

    pub fn remove_price(&mut self, market_id: &str) -> Option<Price> {
        self.prices.remove(market_id)
    }
}

impl PriceOracle for PriceFeed {
    fn current_price(&self, market_id: &str) -> Result<Price, OracleError> {
        self.prices
            .get(market_id)
            .copied()
            .ok_or_else(|| OracleError::NoPriceAvailable(market_id.to_string()))
    }
}
