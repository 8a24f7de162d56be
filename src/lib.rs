// lending-core: money market lending protocol core.
// deposits earn supply interest, borrows pay borrow interest, both through
// per-denom global indexes. under-collateralized accounts are liquidated through
// collateral auctions. all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Denom, AccountId, MarketId, Price, Quote, Timestamp
//   2.x  coins.rs: Coin and the multi-asset Coins balance
//   2.1  fixed_point.rs: 18-decimal fixed point, integer power, n-th root
//   3.x  market.rs: money market params + registry
//   3.1  interest.rs: utilization, borrow rate, per-second compounding, accrual
//   4.x  position.rs: deposit/borrow records, index snapshots, interest sync
//   5.x  valuation.rs: usd valuation maps
//   5.1  risk.rs: liquidation data, ltv, borrowable value
//   6.x  ledger.rs: protocol store: registry, indexes, totals, positions
//   6.1  snapshot.rs: ledger export/import
//   7.x  config.rs: protocol params, env presets
//   8.x  engine/: core engine: accrual, sync, validation, deposits, borrows, liquidations
//   9.x  oracle.rs: price oracle trait + static feed
//   9.2  bank.rs: balance transfers (mocked)
//   9.3  auction.rs: collateral auctions (mocked)
//   11.x events.rs: state transition events for audit

// core lending modules
pub mod coins;
pub mod engine;
pub mod events;
pub mod fixed_point;
pub mod interest;
pub mod ledger;
pub mod market;
pub mod position;
pub mod types;

// risk modules
pub mod risk;
pub mod valuation;

// integration modules
pub mod auction;
pub mod bank;
pub mod config;
pub mod oracle;
pub mod snapshot;

// re exports for convenience
pub use coins::*;
pub use engine::*;
pub use events::*;
pub use fixed_point::{FixedDec, FixedPointError};
pub use interest::*;
pub use ledger::*;
pub use market::*;
pub use position::*;
pub use risk::*;
pub use types::*;
pub use valuation::*;
pub use auction::{AuctionError, AuctionHouse, AuctionId, AuctionKeeper, CollateralAuction};
pub use bank::{BankError, BankKeeper, Holder, InMemoryBank};
pub use config::{ConfigError, Environment, LendingParams};
pub use oracle::{CurrentPrice, PriceOracle, StaticPriceFeed, DEFAULT_PRICE_TTL_SECONDS};
pub use snapshot::{AccrualTime, LedgerSnapshot, SnapshotError};
