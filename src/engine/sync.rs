// 8.3 engine/sync.rs: bring an owner's records up to the current global indexes.
// the synced_* views work on copies so an operation can validate against synced
// balances and still leave the ledger untouched if it fails.

use super::core::Engine;
use super::results::EngineError;
use crate::auction::AuctionKeeper;
use crate::bank::BankKeeper;
use crate::coins::Coins;
use crate::ledger::InvariantViolation;
use crate::oracle::PriceOracle;
use crate::position::{Borrow, Deposit, SyncError};
use crate::types::AccountId;
use rust_decimal::Decimal;

fn sync_failure(owner: AccountId, err: SyncError) -> EngineError {
    match err {
        SyncError::MalformedIndex { denom, snapshot } => InvariantViolation::MalformedIndex {
            owner,
            denom,
            snapshot,
        }
        .into(),
        SyncError::Math(source) => InvariantViolation::SyncFailed { owner, source }.into(),
    }
}

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    /// Copy of the owner's deposit with supply interest applied.
    pub fn synced_deposit(&self, owner: AccountId) -> Result<Option<Deposit>, EngineError> {
        let Some(stored) = self.ledger.deposit(owner) else {
            return Ok(None);
        };
        let mut deposit = stored.clone();
        deposit
            .sync_interest(self.ledger.supply_indexes())
            .map_err(|e| sync_failure(owner, e))?;
        Ok(Some(deposit))
    }

    /// Copy of the owner's borrow with borrow interest applied.
    pub fn synced_borrow(&self, owner: AccountId) -> Result<Option<Borrow>, EngineError> {
        let Some(stored) = self.ledger.borrow(owner) else {
            return Ok(None);
        };
        let mut borrow = stored.clone();
        borrow
            .sync_interest(self.ledger.borrow_indexes())
            .map_err(|e| sync_failure(owner, e))?;
        Ok(Some(borrow))
    }

    /// Writes the synced deposit back. Returns the supply interest credited.
    pub fn sync_supply_interest(&mut self, owner: AccountId) -> Result<Coins, EngineError> {
        let Some(mut deposit) = self.ledger.deposit(owner).cloned() else {
            return Ok(Coins::new());
        };
        let credited = deposit
            .sync_interest(self.ledger.supply_indexes())
            .map_err(|e| sync_failure(owner, e))?;
        if !credited.is_empty() {
            tracing::debug!(owner = %owner, interest = %credited, "supply interest synced");
        }
        self.ledger.set_deposit(deposit);
        Ok(credited)
    }

    /// Writes the synced borrow back. Returns the borrow interest added.
    pub fn sync_borrow_interest(&mut self, owner: AccountId) -> Result<Coins, EngineError> {
        let Some(mut borrow) = self.ledger.borrow(owner).cloned() else {
            return Ok(Coins::new());
        };
        let owed = borrow
            .sync_interest(self.ledger.borrow_indexes())
            .map_err(|e| sync_failure(owner, e))?;
        if !owed.is_empty() {
            tracing::debug!(owner = %owner, interest = %owed, "borrow interest synced");
        }
        self.ledger.set_borrow(borrow);
        Ok(owed)
    }

    // 8.3.1: a market that has not accrued yet has no index; start it at 1
    pub(super) fn seed_supply_indexes(&mut self, coins: &Coins) {
        for denom in coins.denoms() {
            if self.ledger.supply_index(denom).is_none() {
                self.ledger.set_supply_index(denom, Decimal::ONE);
            }
        }
    }

    pub(super) fn seed_borrow_indexes(&mut self, coins: &Coins) {
        for denom in coins.denoms() {
            if self.ledger.borrow_index(denom).is_none() {
                self.ledger.set_borrow_index(denom, Decimal::ONE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::AuctionHouse;
    use crate::bank::InMemoryBank;
    use crate::config::LendingParams;
    use crate::engine::{EngineConfig, SimEngine};
    use crate::oracle::StaticPriceFeed;
    use crate::types::{Denom, MarketId, Price, Timestamp};
    use rust_decimal_macros::dec;

    const ALICE: AccountId = AccountId(1);

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    fn coins(d: &str, amount: u128) -> Coins {
        Coins::single(denom(d), amount)
    }

    // alice holds 100 kava and owes 100 usdx; the usdx borrow index then moves to 1.1
    fn setup_engine() -> SimEngine {
        let mut oracle = StaticPriceFeed::new();
        let t0 = Timestamp::from_secs(0);
        oracle.set_price(MarketId::new("usdx:usd"), Price::new(dec!(1)).unwrap(), t0);
        oracle.set_price(MarketId::new("kava:usd"), Price::new(dec!(2)).unwrap(), t0);
        let mut engine = SimEngine::new(
            EngineConfig::default(),
            LendingParams::development().unwrap(),
            InMemoryBank::new(),
            oracle,
            AuctionHouse::new(),
        )
        .unwrap();
        engine.bank_mut().mint_to_account(ALICE, &coins("ukava", 100_000_000));
        engine.bank_mut().fund_pool(&coins("usdx", 1_000_000_000));
        engine.deposit(ALICE, coins("ukava", 100_000_000)).unwrap();
        engine.borrow(ALICE, coins("usdx", 100_000_000)).unwrap();
        engine.ledger.set_borrow_index(&denom("usdx"), dec!(1.1));
        engine
    }

    #[test]
    fn synced_views_leave_the_store_alone() {
        let engine = setup_engine();
        let synced = engine.synced_borrow(ALICE).unwrap().unwrap();
        assert_eq!(synced.amount, coins("usdx", 110_000_000));
        assert_eq!(synced.index.get(&denom("usdx")), Some(dec!(1.1)));
        assert_eq!(
            engine.ledger().borrow(ALICE).unwrap().amount,
            coins("usdx", 100_000_000)
        );
    }

    #[test]
    fn sync_writes_back_once() {
        let mut engine = setup_engine();
        let owed = engine.sync_borrow_interest(ALICE).unwrap();
        assert_eq!(owed, coins("usdx", 10_000_000));
        assert_eq!(
            engine.ledger().borrow(ALICE).unwrap().amount,
            coins("usdx", 110_000_000)
        );
        assert!(engine.sync_borrow_interest(ALICE).unwrap().is_empty());

        // supply index never moved, nothing to credit
        assert!(engine.sync_supply_interest(ALICE).unwrap().is_empty());
        assert!(engine.sync_supply_interest(AccountId(7)).unwrap().is_empty());
    }

    #[test]
    fn zero_snapshot_is_an_invariant_violation() {
        let mut engine = setup_engine();
        let mut borrow = engine.ledger().borrow(ALICE).unwrap().clone();
        borrow.index.set(&denom("usdx"), Decimal::ZERO);
        engine.ledger.set_borrow(borrow);

        let err = engine.synced_borrow(ALICE).unwrap_err();
        assert!(err.is_fatal());
    }
}
