// 9.3 auction.rs: collateral auction collaborator. liquidation hands each matched
// lot to an AuctionKeeper and keeps going; what happens to the auction afterwards
// is not this crate's concern. AuctionHouse just records what it was asked to start.

use crate::coins::Coin;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuctionId(pub u64);

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auction-{}", self.0)
    }
}

/// One sealed collateral auction as it was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAuction {
    pub id: AuctionId,
    pub seller: AccountId,
    pub lot: Coin,
    pub max_bid: Coin,
    pub return_addresses: Vec<AccountId>,
    pub return_weights: Vec<u128>,
    pub debt: Coin,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuctionError {
    #[error("auction lot must be positive")]
    EmptyLot,

    #[error("return addresses ({addresses}) and weights ({weights}) differ in length")]
    WeightMismatch { addresses: usize, weights: usize },

    #[error("auction rejected: {0}")]
    Rejected(String),
}

pub trait AuctionKeeper {
    fn start_collateral_auction(
        &mut self,
        seller: AccountId,
        lot: Coin,
        max_bid: Coin,
        return_addresses: Vec<AccountId>,
        return_weights: Vec<u128>,
        debt: Coin,
    ) -> Result<AuctionId, AuctionError>;
}

#[derive(Debug, Clone, Default)]
pub struct AuctionHouse {
    auctions: Vec<CollateralAuction>,
    next_id: u64,
    // reject every request once this many have been accepted
    fail_after: Option<usize>,
}

impl AuctionHouse {
    pub fn new() -> Self {
        Self {
            auctions: Vec::new(),
            next_id: 1,
            fail_after: None,
        }
    }

    /// Accept `accepted` more auctions, then reject.
    pub fn fail_after(&mut self, accepted: usize) {
        self.fail_after = Some(self.auctions.len() + accepted);
    }

    pub fn auctions(&self) -> &[CollateralAuction] {
        &self.auctions
    }

    pub fn len(&self) -> usize {
        self.auctions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auctions.is_empty()
    }
}

impl AuctionKeeper for AuctionHouse {
    fn start_collateral_auction(
        &mut self,
        seller: AccountId,
        lot: Coin,
        max_bid: Coin,
        return_addresses: Vec<AccountId>,
        return_weights: Vec<u128>,
        debt: Coin,
    ) -> Result<AuctionId, AuctionError> {
        if let Some(limit) = self.fail_after {
            if self.auctions.len() >= limit {
                return Err(AuctionError::Rejected("auction house closed".into()));
            }
        }
        if lot.is_zero() {
            return Err(AuctionError::EmptyLot);
        }
        if return_addresses.len() != return_weights.len() {
            return Err(AuctionError::WeightMismatch {
                addresses: return_addresses.len(),
                weights: return_weights.len(),
            });
        }

        let id = AuctionId(self.next_id);
        self.next_id += 1;
        self.auctions.push(CollateralAuction {
            id,
            seller,
            lot,
            max_bid,
            return_addresses,
            return_weights,
            debt,
        });
        Ok(id)
    }
}
