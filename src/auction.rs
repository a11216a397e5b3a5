// 9.3: auction market seam. three kinds: collateral lots (sell seized collateral for the stable
// asset), surplus (sell stable surplus for the governance token), debt (mint governance token
// to buy back debt). the engine escrows the coins before calling in; AuctionHouse just records.

use crate::types::{Address, Amount, Coin};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const AUCTION_ESCROW: &str = "auction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuctionId(pub u64);

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionKind {
    Collateral,
    Surplus,
    Debt,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuctionError {
    #[error("Auction lot {0} is empty")]
    EmptyLot(String),

    #[error("Return addresses ({addresses}) and weights ({weights}) differ in length")]
    MismatchedReturns { addresses: usize, weights: usize },

    #[error("Auction market rejected the request: {0}")]
    Rejected(String),
}

/// Everything a collateral auction needs to run and to return unsold collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAuctionRequest {
    pub seller: Address,
    pub lot: Coin,
    // most stable asset the auction tries to raise
    pub max_bid: Coin,
    pub return_addresses: Vec<Address>,
    pub return_weights: Vec<Amount>,
    // debt obligation retired when the auction closes
    pub debt: Coin,
}

pub trait AuctionMarket {
    fn start_lot_auction(&mut self, request: LotAuctionRequest) -> Result<AuctionId, AuctionError>;

    fn start_surplus_auction(&mut self, seller: &Address, lot: Coin, bid_denom: &str) -> Result<AuctionId, AuctionError>;

    fn start_debt_auction(
        &mut self,
        buyer: &Address,
        bid: Coin,
        initial_lot: Coin,
        debt: Coin,
    ) -> Result<AuctionId, AuctionError>;
}

/// One collateral lot and the depositors it returns unsold collateral to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotPlan {
    pub collateral: Amount,
    pub return_addresses: Vec<Address>,
    pub return_weights: Vec<Amount>,
}

impl LotPlan {
    fn single(depositor: &Address, amount: u128) -> Self {
        let mut lot = Self::default();
        lot.add(depositor, amount);
        lot
    }

    fn add(&mut self, depositor: &Address, amount: u128) {
        // callers keep every lot at or below the lot size, so this cannot wrap
        self.collateral = Amount::new(self.collateral.value() + amount);
        self.return_addresses.push(depositor.clone());
        self.return_weights.push(Amount::new(amount));
    }

    fn is_empty(&self) -> bool {
        self.collateral.is_zero()
    }
}

/// 9.3.2: cuts seized deposits into lots of `lot_size`.
///
/// Deposits are taken in the given order. Whole lots are cut from each deposit directly;
/// what is left of a deposit fills a shared lot that is flushed when it reaches `lot_size`.
/// Every lot but the last is exactly `lot_size`, and the lots sum to the deposits.
pub fn plan_collateral_lots(deposits: &[(Address, Amount)], lot_size: Amount) -> Vec<LotPlan> {
    let mut lots = Vec::new();
    let mut pending = LotPlan::default();

    if lot_size.is_zero() {
        for (depositor, amount) in deposits.iter().filter(|(_, a)| a.is_positive()) {
            pending.add(depositor, amount.value());
        }
        if !pending.is_empty() {
            lots.push(pending);
        }
        return lots;
    }

    let size = lot_size.value();
    for (depositor, amount) in deposits {
        let mut left = amount.value();
        while left >= size {
            lots.push(LotPlan::single(depositor, size));
            left -= size;
        }
        if left == 0 {
            continue;
        }

        let room = size - pending.collateral.value();
        if left <= room {
            pending.add(depositor, left);
        } else {
            pending.add(depositor, room);
            lots.push(std::mem::take(&mut pending));
            pending.add(depositor, left - room);
        }
        if pending.collateral.value() == size {
            lots.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        lots.push(pending);
    }
    lots
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionRecord {
    Collateral(LotAuctionRequest),
    Surplus {
        seller: Address,
        lot: Coin,
        bid_denom: String,
    },
    Debt {
        buyer: Address,
        bid: Coin,
        initial_lot: Coin,
        debt: Coin,
    },
}

impl AuctionRecord {
    pub fn kind(&self) -> AuctionKind {
        match self {
            AuctionRecord::Collateral(_) => AuctionKind::Collateral,
            AuctionRecord::Surplus { .. } => AuctionKind::Surplus,
            AuctionRecord::Debt { .. } => AuctionKind::Debt,
        }
    }
}

// 9.3.1: records every auction started, ids from 1
#[derive(Debug, Clone, Default)]
pub struct AuctionHouse {
    auctions: Vec<(AuctionId, AuctionRecord)>,
}

impl AuctionHouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auctions(&self) -> &[(AuctionId, AuctionRecord)] {
        &self.auctions
    }

    pub fn get(&self, id: AuctionId) -> Option<&AuctionRecord> {
        self.auctions.iter().find(|(aid, _)| *aid == id).map(|(_, r)| r)
    }

    pub fn collateral_auctions(&self) -> impl Iterator<Item = &LotAuctionRequest> {
        self.auctions.iter().filter_map(|(_, record)| match record {
            AuctionRecord::Collateral(request) => Some(request),
            _ => None,
        })
    }

    pub fn count_of(&self, kind: AuctionKind) -> usize {
        self.auctions.iter().filter(|(_, r)| r.kind() == kind).count()
    }

    fn record(&mut self, record: AuctionRecord) -> AuctionId {
        let id = AuctionId(self.auctions.len() as u64 + 1);
        self.auctions.push((id, record));
        id
    }
}

impl AuctionMarket for AuctionHouse {
    fn start_lot_auction(&mut self, request: LotAuctionRequest) -> Result<AuctionId, AuctionError> {
        if request.lot.is_zero() {
            return Err(AuctionError::EmptyLot(request.lot.to_string()));
        }
        if request.return_addresses.len() != request.return_weights.len() {
            return Err(AuctionError::MismatchedReturns {
                addresses: request.return_addresses.len(),
                weights: request.return_weights.len(),
            });
        }
        Ok(self.record(AuctionRecord::Collateral(request)))
    }

    fn start_surplus_auction(&mut self, seller: &Address, lot: Coin, bid_denom: &str) -> Result<AuctionId, AuctionError> {
        if lot.is_zero() {
            return Err(AuctionError::EmptyLot(lot.to_string()));
        }
        Ok(self.record(AuctionRecord::Surplus {
            seller: seller.clone(),
            lot,
            bid_denom: bid_denom.to_string(),
        }))
    }

    fn start_debt_auction(
        &mut self,
        buyer: &Address,
        bid: Coin,
        initial_lot: Coin,
        debt: Coin,
    ) -> Result<AuctionId, AuctionError> {
        if initial_lot.is_zero() {
            return Err(AuctionError::EmptyLot(initial_lot.to_string()));
        }
        Ok(self.record(AuctionRecord::Debt {
            buyer: buyer.clone(),
            bid,
            initial_lot,
            debt,
        }))
    }
}
