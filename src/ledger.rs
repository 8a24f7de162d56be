// 6.0: protocol store. one table per keyspace: money markets, previous accrual
// times, borrow and supply indexes, reserve/borrowed/supplied totals, and the
// deposit and borrow records keyed by owner. the engine owns exactly one.

use crate::bank::BankError;
use crate::coins::Coins;
use crate::fixed_point::FixedPointError;
use crate::market::MoneyMarketRegistry;
use crate::position::{Borrow, Deposit};
use crate::types::{AccountId, Denom, Timestamp};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub(crate) registry: MoneyMarketRegistry,
    pub(crate) previous_accrual_times: BTreeMap<Denom, Timestamp>,
    pub(crate) borrow_indexes: BTreeMap<Denom, Decimal>,
    pub(crate) supply_indexes: BTreeMap<Denom, Decimal>,
    pub(crate) total_reserves: Coins,
    // None until first written
    pub(crate) total_borrowed: Option<Coins>,
    pub(crate) total_supplied: Option<Coins>,
    pub(crate) deposits: BTreeMap<AccountId, Deposit>,
    pub(crate) borrows: BTreeMap<AccountId, Borrow>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // 6.1: registry
    pub fn registry(&self) -> &MoneyMarketRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MoneyMarketRegistry {
        &mut self.registry
    }

    // 6.2: accrual times and global indexes
    pub fn previous_accrual_time(&self, denom: &Denom) -> Option<Timestamp> {
        self.previous_accrual_times.get(denom).copied()
    }

    pub fn set_previous_accrual_time(&mut self, denom: &Denom, time: Timestamp) {
        self.previous_accrual_times.insert(denom.clone(), time);
    }

    pub fn borrow_index(&self, denom: &Denom) -> Option<Decimal> {
        self.borrow_indexes.get(denom).copied()
    }

    pub fn set_borrow_index(&mut self, denom: &Denom, value: Decimal) {
        self.borrow_indexes.insert(denom.clone(), value);
    }

    pub fn borrow_indexes(&self) -> &BTreeMap<Denom, Decimal> {
        &self.borrow_indexes
    }

    pub fn supply_index(&self, denom: &Denom) -> Option<Decimal> {
        self.supply_indexes.get(denom).copied()
    }

    pub fn set_supply_index(&mut self, denom: &Denom, value: Decimal) {
        self.supply_indexes.insert(denom.clone(), value);
    }

    pub fn supply_indexes(&self) -> &BTreeMap<Denom, Decimal> {
        &self.supply_indexes
    }

    // 6.3: totals. reserves always exist; borrowed/supplied may never have been written.
    pub fn total_reserves(&self) -> &Coins {
        &self.total_reserves
    }

    pub fn set_total_reserves(&mut self, reserves: Coins) {
        self.total_reserves = reserves;
    }

    pub fn total_borrowed(&self) -> Option<&Coins> {
        self.total_borrowed.as_ref()
    }

    pub fn total_supplied(&self) -> Option<&Coins> {
        self.total_supplied.as_ref()
    }

    // an empty increment leaves an unwritten total unwritten
    pub fn increment_total_borrowed(&mut self, coins: &Coins) {
        if coins.is_empty() {
            return;
        }
        self.total_borrowed.get_or_insert_with(Coins::new).add(coins);
    }

    pub fn increment_total_supplied(&mut self, coins: &Coins) {
        if coins.is_empty() {
            return;
        }
        self.total_supplied.get_or_insert_with(Coins::new).add(coins);
    }

    /// Subtracts per denom, clamping at zero. A decrement before any increment
    /// means the store lost the table.
    pub fn decrement_total_borrowed(&mut self, coins: &Coins) -> Result<(), InvariantViolation> {
        decrement_total(&mut self.total_borrowed, coins, "borrowed")
    }

    pub fn decrement_total_supplied(&mut self, coins: &Coins) -> Result<(), InvariantViolation> {
        decrement_total(&mut self.total_supplied, coins, "supplied")
    }

    // 6.4: positions
    pub fn deposit(&self, owner: AccountId) -> Option<&Deposit> {
        self.deposits.get(&owner)
    }

    pub fn set_deposit(&mut self, deposit: Deposit) {
        self.deposits.insert(deposit.depositor, deposit);
    }

    pub fn delete_deposit(&mut self, owner: AccountId) -> Option<Deposit> {
        self.deposits.remove(&owner)
    }

    pub fn deposits(&self) -> impl Iterator<Item = &Deposit> {
        self.deposits.values()
    }

    pub fn borrow(&self, owner: AccountId) -> Option<&Borrow> {
        self.borrows.get(&owner)
    }

    pub fn set_borrow(&mut self, borrow: Borrow) {
        self.borrows.insert(borrow.borrower, borrow);
    }

    pub fn delete_borrow(&mut self, owner: AccountId) -> Option<Borrow> {
        self.borrows.remove(&owner)
    }

    pub fn borrows(&self) -> impl Iterator<Item = &Borrow> {
        self.borrows.values()
    }
}

fn decrement_total(
    total: &mut Option<Coins>,
    coins: &Coins,
    table: &'static str,
) -> Result<(), InvariantViolation> {
    if coins.is_empty() {
        return Ok(());
    }
    let Some(current) = total.as_mut() else {
        let denom = coins.denoms().next().cloned();
        return Err(InvariantViolation::MissingTotal { table, denom });
    };
    *current = current.saturating_sub(coins);
    Ok(())
}

/// Store corruption. Callers must halt instead of continuing on top of it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("total {table} missing while decrementing {denom:?}")]
    MissingTotal {
        table: &'static str,
        denom: Option<Denom>,
    },

    #[error("malformed {denom} index snapshot {snapshot} for {owner}")]
    MalformedIndex {
        owner: AccountId,
        denom: Denom,
        snapshot: Decimal,
    },

    #[error("{denom} accrued at {previous}, after block time {block}")]
    AccrualTimeAhead {
        denom: Denom,
        previous: Timestamp,
        block: Timestamp,
    },

    #[error("interest accrual for {denom} failed: {source}")]
    AccrualFailed {
        denom: Denom,
        source: FixedPointError,
    },

    #[error("interest sync for {owner} failed: {source}")]
    SyncFailed {
        owner: AccountId,
        source: FixedPointError,
    },

    #[error("liquidation of {owner} could not return its lot to the pool: {source}")]
    LiquidationUnwind { owner: AccountId, source: BankError },
}
