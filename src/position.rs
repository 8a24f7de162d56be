// 4.0: per-account positions. one Deposit and one Borrow record per owner, each
// holding multi-asset amounts plus the global index seen when the amount was last
// brought up to date. 4.1 is interest synchronization against the current indexes.

use crate::coins::Coins;
use crate::fixed_point::{FixedDec, FixedPointError};
use crate::types::{AccountId, Denom};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestFactor {
    pub denom: Denom,
    pub value: Decimal,
}

// denom -> index snapshot. stored as an ordered list, used as a map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<InterestFactor>", from = "Vec<InterestFactor>")]
pub struct InterestIndex(BTreeMap<Denom, Decimal>);

impl InterestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, denom: &Denom) -> Option<Decimal> {
        self.0.get(denom).copied()
    }

    pub fn set(&mut self, denom: &Denom, value: Decimal) {
        self.0.insert(denom.clone(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Denom, Decimal)> {
        self.0.iter().map(|(d, v)| (d, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // drop snapshots for denoms the position no longer holds
    pub fn retain_held(&mut self, amount: &Coins) {
        self.0.retain(|denom, _| amount.contains(denom));
    }
}

impl From<Vec<InterestFactor>> for InterestIndex {
    fn from(factors: Vec<InterestFactor>) -> Self {
        Self(factors.into_iter().map(|f| (f.denom, f.value)).collect())
    }
}

impl From<InterestIndex> for Vec<InterestFactor> {
    fn from(index: InterestIndex) -> Self {
        index
            .0
            .into_iter()
            .map(|(denom, value)| InterestFactor { denom, value })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub depositor: AccountId,
    pub amount: Coins,
    pub index: InterestIndex,
}

impl Deposit {
    pub fn new(depositor: AccountId) -> Self {
        Self {
            depositor,
            amount: Coins::new(),
            index: InterestIndex::new(),
        }
    }

    // 4.1: credit supply interest since each snapshot. returns what was credited.
    pub fn sync_interest(
        &mut self,
        supply_indexes: &BTreeMap<Denom, Decimal>,
    ) -> Result<Coins, SyncError> {
        sync_position(&mut self.amount, &mut self.index, supply_indexes, supply_owed)
    }

    /// Adds coins and snapshots their current index.
    pub fn credit(&mut self, coins: &Coins, supply_indexes: &BTreeMap<Denom, Decimal>) {
        self.amount.add(coins);
        snapshot_new_coins(&mut self.index, coins, supply_indexes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrow {
    pub borrower: AccountId,
    pub amount: Coins,
    pub index: InterestIndex,
}

impl Borrow {
    pub fn new(borrower: AccountId) -> Self {
        Self {
            borrower,
            amount: Coins::new(),
            index: InterestIndex::new(),
        }
    }

    // 4.2: add borrow interest owed since each snapshot. returns what was added.
    pub fn sync_interest(
        &mut self,
        borrow_indexes: &BTreeMap<Denom, Decimal>,
    ) -> Result<Coins, SyncError> {
        sync_position(&mut self.amount, &mut self.index, borrow_indexes, borrow_owed)
    }

    pub fn credit(&mut self, coins: &Coins, borrow_indexes: &BTreeMap<Denom, Decimal>) {
        self.amount.add(coins);
        snapshot_new_coins(&mut self.index, coins, borrow_indexes);
    }
}

fn snapshot_new_coins(
    index: &mut InterestIndex,
    coins: &Coins,
    current: &BTreeMap<Denom, Decimal>,
) {
    for denom in coins.denoms() {
        if let Some(value) = current.get(denom) {
            index.set(denom, *value);
        }
    }
}

// stored * current / snapshot - stored
fn supply_owed(
    stored: FixedDec,
    snapshot: FixedDec,
    current: FixedDec,
) -> Result<FixedDec, FixedPointError> {
    stored.mul(&current)?.quo(&snapshot)?.sub(&stored)
}

// stored / snapshot * current - stored
fn borrow_owed(
    stored: FixedDec,
    snapshot: FixedDec,
    current: FixedDec,
) -> Result<FixedDec, FixedPointError> {
    stored.quo(&snapshot)?.mul(&current)?.sub(&stored)
}

type OwedFn = fn(FixedDec, FixedDec, FixedDec) -> Result<FixedDec, FixedPointError>;

// 4.3: shared sync walk. a held denom with no snapshot is seeded at the current
// index with nothing owed; a denom with no global index yet is left alone.
fn sync_position(
    amount: &mut Coins,
    index: &mut InterestIndex,
    current_indexes: &BTreeMap<Denom, Decimal>,
    owed: OwedFn,
) -> Result<Coins, SyncError> {
    let mut accrued = Coins::new();
    let held: Vec<(Denom, u128)> = amount.iter().map(|(d, a)| (d.clone(), a)).collect();

    for (denom, stored) in held {
        let Some(current) = current_indexes.get(&denom).copied() else {
            continue;
        };
        let Some(snapshot) = index.get(&denom) else {
            index.set(&denom, current);
            continue;
        };
        if snapshot <= Decimal::ZERO {
            return Err(SyncError::MalformedIndex { denom, snapshot });
        }
        if snapshot == current {
            continue;
        }

        let interest = owed(
            FixedDec::from_int(stored)?,
            FixedDec::from_decimal(snapshot)?,
            FixedDec::from_decimal(current)?,
        )?;
        // rounding can leave a hair below zero; that truncates to nothing owed
        if !interest.is_negative() {
            accrued.add_amount(&denom, interest.truncate_int()?);
        }
        index.set(&denom, current);
    }

    amount.add(&accrued);
    Ok(accrued)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("malformed index snapshot for {denom}: {snapshot}")]
    MalformedIndex { denom: Denom, snapshot: Decimal },

    #[error("interest sync arithmetic failed: {0}")]
    Math(#[from] FixedPointError),
}
