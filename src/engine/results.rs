// 8.0.2: result types and errors for engine operations.

use crate::auction::{AuctionError, AuctionId};
use crate::bank::{BankError, Holder};
use crate::coins::{Coin, Coins};
use crate::config::ConfigError;
use crate::ledger::InvariantViolation;
use crate::market::MarketError;
use crate::risk::RiskError;
use crate::snapshot::SnapshotError;
use crate::types::{AccountId, Denom, Quote, Timestamp};
use rust_decimal::Decimal;

/// One interest accrual step for one denom.
#[derive(Debug, Clone, PartialEq)]
pub struct AccrualResult {
    pub denom: Denom,
    pub seconds_elapsed: u64,
    pub borrow_interest: u128,
    pub supply_interest: u128,
    pub reserves_delta: u128,
    pub borrow_index: Decimal,
    pub supply_index: Decimal,
}

/// What `apply_interest_rate_updates` did to the registry and indexes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterestUpdateResult {
    pub accruals: Vec<AccrualResult>,
    pub added: Vec<Denom>,
    pub updated: Vec<Denom>,
    pub removed: Vec<Denom>,
}

/// A matched lot, as dispatched to the auction keeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationLot {
    pub auction_id: AuctionId,
    pub lot: Coin,
    pub bid: Coin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationResult {
    pub owner: AccountId,
    pub agent: AccountId,
    pub reward: Coins,
    pub lots: Vec<LiquidationLot>,
    /// Collateral left after every debt bucket cleared, sent back to the owner.
    pub refunded: Coins,
    /// Debt no auction was started for.
    pub unmatched_debt: Coins,
    pub loan_to_value: Decimal,
}

#[derive(Debug, Clone)]
pub struct BlockResult {
    pub time: Timestamp,
    pub interest: InterestUpdateResult,
    pub liquidations: Vec<LiquidationResult>,
    /// Index liquidations that failed with a recoverable error.
    pub skipped: Vec<(AccountId, EngineError)>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    // validation
    #[error("{0} requires a non-empty amount")]
    EmptyCoins(&'static str),

    #[error("no money market for deposit denom {0}")]
    InvalidDepositDenom(Denom),

    #[error("no money market for {0}")]
    MarketNotFound(Denom),

    #[error("no deposit found for {0}")]
    DepositNotFound(AccountId),

    #[error("no borrow found for {0}")]
    BorrowNotFound(AccountId),

    #[error("withdrawal of {requested}{denom} exceeds deposit of {available}{denom}")]
    WithdrawExceedsDeposit {
        denom: Denom,
        available: u128,
        requested: u128,
    },

    #[error("proposed withdraw outside loan-to-value range for {0}")]
    InvalidWithdrawAmount(AccountId),

    #[error("borrow exceeds loan-to-value: borrowed {borrowed}, borrowable {borrowable}")]
    InsufficientLoanToValue { borrowed: Quote, borrowable: Quote },

    #[error(
        "borrow of {requested}{denom} exceeds protocol limit {maximum}, \
         already borrowed {borrowed}"
    )]
    ExceedsProtocolBorrowLimit {
        denom: Denom,
        borrowed: u128,
        requested: u128,
        maximum: Decimal,
    },

    #[error("borrow value {value} is below the minimum {minimum}")]
    BelowMinimumBorrowValue { value: Quote, minimum: Quote },

    #[error("cannot repay {0}, it was never borrowed")]
    InvalidRepaymentDenom(Denom),

    #[error("risk check failed: {0}")]
    Risk(#[from] RiskError),

    #[error("market error: {0}")]
    Market(#[from] MarketError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    // resources
    #[error("{owner} has insufficient {denom}: available {available}, requested {requested}")]
    InsufficientFunds {
        owner: AccountId,
        denom: Denom,
        available: u128,
        requested: u128,
    },

    #[error(
        "insufficient pool liquidity for {denom}: available {available}, \
         requested {requested}"
    )]
    InsufficientPoolLiquidity {
        denom: Denom,
        requested: u128,
        available: u128,
    },

    #[error("transfer failed: {0}")]
    Bank(#[from] BankError),

    // liquidation
    #[error("position of {0} is within a valid loan-to-value range")]
    NotLiquidatable(AccountId),

    #[error("insufficient {denom} collateral: available {available}, requested {requested}")]
    InsufficientCollateral {
        denom: Denom,
        available: u128,
        requested: u128,
    },

    #[error("auction dispatch failed after {} auctions: {source}", .completed.len())]
    Auction {
        completed: Vec<AuctionId>,
        source: AuctionError,
    },

    // fatal
    #[error("ledger invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl EngineError {
    /// Invariant violations mean the store is corrupt and processing must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Invariant(_))
    }

    // bank shortfalls become resource errors that name the account or pool
    pub(crate) fn from_transfer(err: BankError) -> Self {
        match err {
            BankError::InsufficientFunds {
                holder: Holder::Account(owner),
                denom,
                available,
                requested,
            } => EngineError::InsufficientFunds {
                owner,
                denom,
                available,
                requested,
            },
            BankError::InsufficientFunds {
                holder: Holder::Pool,
                denom,
                available,
                requested,
            } => EngineError::InsufficientPoolLiquidity {
                denom,
                requested,
                available,
            },
            other => EngineError::Bank(other),
        }
    }
}
