// 7.0 config.rs: every governance parameter the engine reads. collateral types, the debt asset,
// auction sizing, savings cadence. 7.1 validation, 7.2 presets, 7.3 the read-only ParamStore seam.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{Address, Amount, CollateralType, Coin};

pub const LENDING_POOL: &str = "cdp";
pub const LIQUIDATION_POOL: &str = "liquidator";
pub const DEFAULT_DEBT_DENOM: &str = "debt";
pub const DEFAULT_GOV_DENOM: &str = "ukava";

// 500% APR expressed per second
pub const MAX_STABILITY_FEE: Decimal = dec!(1.000000051034942716);

// debt auctions open with a governance token bid of lot * this
pub const DEBT_AUCTION_BID_MULTIPLIER: u128 = 100;

// decimal places a Decimal can carry
const MAX_CONVERSION_FACTOR: u32 = 28;

pub fn lending_pool() -> Address {
    Address::module(LENDING_POOL)
}

pub fn liquidation_pool() -> Address {
    Address::module(LIQUIDATION_POOL)
}

/** 7.0.1: one collateral type. the tag is what positions key on, the denom is what moves */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralParam {
    // e.g. "bnb-a". several types can share a denom
    pub collateral_type: CollateralType,
    pub denom: String,
    // key-space prefix for this type's index rows
    pub prefix: u8,
    // minimum collateral value / debt
    pub liquidation_ratio: Decimal,
    // cap on aggregate principal, in the debt asset
    pub debt_limit: Coin,
    // per second, >= 1
    pub stability_fee: Decimal,
    pub liquidation_penalty: Decimal,
    // collateral per auction lot
    pub auction_size: Amount,
    // open/draw/withdraw price
    pub spot_market_id: String,
    // liquidation scans price
    pub liquidation_market_id: String,
    pub keeper_reward_percentage: Decimal,
    // max positions fee-synced per risky scan
    pub check_collateralization_index_count: usize,
    // decimal places of the collateral denom
    pub conversion_factor: u32,
}

/** 7.0.2: the stable asset every type borrows */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtParam {
    pub denom: String,
    pub reference_asset: String,
    pub conversion_factor: u32,
    // smallest non-zero principal an open position may carry
    pub debt_floor: Amount,
    // share of surplus paid out to holders each distribution
    pub savings_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub collateral_params: Vec<CollateralParam>,
    pub debt_param: DebtParam,
    pub global_debt_limit: Coin,
    pub surplus_auction_threshold: Amount,
    pub surplus_auction_lot: Amount,
    pub debt_auction_threshold: Amount,
    pub debt_auction_lot: Amount,
    pub savings_distribution_frequency_secs: u64,
    // halts begin_block work when set
    pub circuit_breaker: bool,
    // internal debt-obligation token
    pub debt_denom: String,
    pub gov_denom: String,
}

impl CollateralParam {
    pub fn new(collateral_type: &str, denom: &str, prefix: u8) -> Self {
        Self {
            collateral_type: CollateralType::new(collateral_type),
            denom: denom.to_string(),
            prefix,
            liquidation_ratio: dec!(2.0),
            debt_limit: Coin::new("usdx", 2_000_000_000_000u128),
            stability_fee: dec!(1.000000001547125958), // 5% apr
            liquidation_penalty: dec!(0.05),
            auction_size: Amount::new(5_000_000_000),
            spot_market_id: format!("{denom}:usd"),
            liquidation_market_id: format!("{denom}:usd:30"),
            keeper_reward_percentage: dec!(0.01),
            check_collateralization_index_count: 10,
            conversion_factor: 8,
        }
    }
}

impl Default for DebtParam {
    fn default() -> Self {
        Self {
            denom: "usdx".to_string(),
            reference_asset: "usd".to_string(),
            conversion_factor: 6,
            debt_floor: Amount::new(10_000_000),
            savings_rate: dec!(0.95),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        let mut bnb = CollateralParam::new("bnb-a", "bnb", 0x01);
        bnb.liquidation_ratio = dec!(1.5);
        bnb.debt_limit = Coin::new("usdx", 20_000_000_000_000u128);

        let mut xrp = CollateralParam::new("xrp-a", "xrp", 0x02);
        xrp.conversion_factor = 6;
        xrp.auction_size = Amount::new(7_000_000_000);

        let btc = CollateralParam::new("btcb-a", "btcb", 0x03);

        Self {
            collateral_params: vec![bnb, xrp, btc],
            debt_param: DebtParam::default(),
            global_debt_limit: Coin::new("usdx", 50_000_000_000_000u128),
            surplus_auction_threshold: Amount::new(500_000_000_000),
            surplus_auction_lot: Amount::new(10_000_000_000),
            debt_auction_threshold: Amount::new(100_000_000_000),
            debt_auction_lot: Amount::new(10_000_000_000),
            savings_distribution_frequency_secs: 12 * 60 * 60,
            circuit_breaker: false,
            debt_denom: DEFAULT_DEBT_DENOM.to_string(),
            gov_denom: DEFAULT_GOV_DENOM.to_string(),
        }
    }
}

impl Params {
    // 7.2: small lots and low thresholds so auctions and payouts fire often
    pub fn testnet() -> Self {
        let mut params = Self::default();
        for cp in &mut params.collateral_params {
            cp.auction_size = Amount::new(100_000_000);
            cp.check_collateralization_index_count = 50;
        }
        params.debt_param.debt_floor = Amount::new(1_000_000);
        params.surplus_auction_threshold = Amount::new(1_000_000);
        params.surplus_auction_lot = Amount::new(1_000_000);
        params.debt_auction_threshold = Amount::new(1_000_000);
        params.debt_auction_lot = Amount::new(1_000_000);
        params.savings_distribution_frequency_secs = 60;
        params
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Params = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn collateral_param(&self, collateral_type: &CollateralType) -> Option<&CollateralParam> {
        self.collateral_params
            .iter()
            .find(|cp| &cp.collateral_type == collateral_type)
    }

    pub fn collateral_types(&self) -> impl Iterator<Item = &CollateralType> {
        self.collateral_params.iter().map(|cp| &cp.collateral_type)
    }

    pub fn stable_denom(&self) -> &str {
        &self.debt_param.denom
    }

    // 7.1: internal consistency. run at construction and on every load
    pub fn validate(&self) -> Result<(), ConfigError> {
        let debt = &self.debt_param;
        if debt.denom.trim().is_empty() {
            return Err(ConfigError::InvalidDebt {
                reason: "debt denom is empty".to_string(),
            });
        }
        if debt.conversion_factor > MAX_CONVERSION_FACTOR {
            return Err(ConfigError::InvalidDebt {
                reason: format!("conversion factor {} too large", debt.conversion_factor),
            });
        }
        if debt.savings_rate < Decimal::ZERO || debt.savings_rate > Decimal::ONE {
            return Err(ConfigError::InvalidDebt {
                reason: format!("savings rate {} outside [0, 1]", debt.savings_rate),
            });
        }
        if self.global_debt_limit.denom != debt.denom {
            return Err(ConfigError::InvalidDebt {
                reason: format!(
                    "global debt limit denom {} does not match debt denom {}",
                    self.global_debt_limit.denom, debt.denom
                ),
            });
        }
        if self.debt_denom.trim().is_empty() || self.gov_denom.trim().is_empty() {
            return Err(ConfigError::InvalidDebt {
                reason: "internal debt and governance denoms must be set".to_string(),
            });
        }
        if self.debt_denom == debt.denom {
            return Err(ConfigError::InvalidDebt {
                reason: "debt obligation token cannot be the stable asset".to_string(),
            });
        }

        let mut types = HashSet::new();
        let mut prefixes = HashSet::new();

        for cp in &self.collateral_params {
            let tag = cp.collateral_type.as_str();
            let invalid = |reason: String| ConfigError::InvalidCollateral {
                collateral_type: tag.to_string(),
                reason,
            };

            if tag.trim().is_empty() || cp.denom.trim().is_empty() {
                return Err(invalid("type and denom must be set".to_string()));
            }
            if !types.insert(tag) {
                return Err(invalid("duplicate collateral type".to_string()));
            }
            if !prefixes.insert(cp.prefix) {
                return Err(invalid(format!("duplicate prefix {:#04x}", cp.prefix)));
            }
            if cp.liquidation_ratio <= Decimal::ZERO {
                return Err(invalid("liquidation ratio must be positive".to_string()));
            }
            if cp.stability_fee < Decimal::ONE || cp.stability_fee > MAX_STABILITY_FEE {
                return Err(invalid(format!(
                    "stability fee {} outside [1, {}]",
                    cp.stability_fee, MAX_STABILITY_FEE
                )));
            }
            if cp.liquidation_penalty < Decimal::ZERO || cp.liquidation_penalty > Decimal::ONE {
                return Err(invalid("liquidation penalty outside [0, 1]".to_string()));
            }
            if cp.keeper_reward_percentage < Decimal::ZERO || cp.keeper_reward_percentage > Decimal::ONE {
                return Err(invalid("keeper reward outside [0, 1]".to_string()));
            }
            if cp.auction_size.is_zero() {
                return Err(invalid("auction size must be positive".to_string()));
            }
            if cp.debt_limit.denom != debt.denom {
                return Err(invalid(format!("debt limit denom {} is not {}", cp.debt_limit.denom, debt.denom)));
            }
            if cp.conversion_factor > MAX_CONVERSION_FACTOR {
                return Err(invalid(format!("conversion factor {} too large", cp.conversion_factor)));
            }
            if cp.spot_market_id.is_empty() || cp.liquidation_market_id.is_empty() {
                return Err(invalid("market ids must be set".to_string()));
            }
            // a single type may not exceed the global cap; the sum of all of them may
            if cp.debt_limit.amount > self.global_debt_limit.amount {
                return Err(invalid("debt limit exceeds global debt limit".to_string()));
            }
        }

        if self.surplus_auction_lot.is_zero() || self.debt_auction_lot.is_zero() {
            return Err(ConfigError::InvalidAuction {
                reason: "auction lots must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid collateral param {collateral_type}: {reason}")]
    InvalidCollateral { collateral_type: String, reason: String },

    #[error("Invalid debt param: {reason}")]
    InvalidDebt { reason: String },

    #[error("Invalid auction param: {reason}")]
    InvalidAuction { reason: String },

    #[error("Could not parse params: {0}")]
    Parse(String),
}

// 7.3: governance-controlled, read-only from the engine's side
pub trait ParamStore {
    fn params(&self) -> &Params;
}

impl ParamStore for Params {
    fn params(&self) -> &Params {
        self
    }
}
