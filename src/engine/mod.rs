// 8.0: lending engine. runs deposits, withdrawals, borrows, repayments, interest
// accrual, and liquidations against one ledger. single-threaded and deterministic;
// funds, prices, and auctions go through the collaborator traits.

mod accrual;
mod borrows;
mod config;
mod core;
mod deposits;
mod liquidations;
mod results;
mod sync;
mod validation;

pub use config::EngineConfig;
pub use core::{Engine, SimEngine};
pub use results::{
    AccrualResult, BlockResult, EngineError, InterestUpdateResult, LiquidationLot,
    LiquidationResult,
};
