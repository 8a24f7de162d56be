//! Flat export of the ledger.
//!
//! Every map becomes a list ordered by key so the same ledger always serializes
//! to the same bytes. Importing checks the list for duplicates and bad values
//! before building a ledger from it.

use crate::coins::Coins;
use crate::ledger::Ledger;
use crate::market::{MarketError, MoneyMarket};
use crate::position::{Borrow, Deposit, InterestFactor};
use crate::types::{AccountId, Denom, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualTime {
    pub denom: Denom,
    pub time: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub money_markets: Vec<MoneyMarket>,
    pub previous_accrual_times: Vec<AccrualTime>,
    pub borrow_indexes: Vec<InterestFactor>,
    pub supply_indexes: Vec<InterestFactor>,
    pub total_reserves: Coins,
    pub total_borrowed: Option<Coins>,
    pub total_supplied: Option<Coins>,
    pub deposits: Vec<Deposit>,
    pub borrows: Vec<Borrow>,
}

fn flatten_indexes(indexes: &BTreeMap<Denom, Decimal>) -> Vec<InterestFactor> {
    indexes
        .iter()
        .map(|(denom, value)| InterestFactor {
            denom: denom.clone(),
            value: *value,
        })
        .collect()
}

fn collect_indexes(
    factors: Vec<InterestFactor>,
) -> Result<BTreeMap<Denom, Decimal>, SnapshotError> {
    let mut out = BTreeMap::new();
    for f in factors {
        if f.value <= Decimal::ZERO {
            return Err(SnapshotError::NonPositiveIndex {
                denom: f.denom,
                value: f.value,
            });
        }
        if out.insert(f.denom.clone(), f.value).is_some() {
            return Err(SnapshotError::DuplicateDenom(f.denom));
        }
    }
    Ok(out)
}

impl LedgerSnapshot {
    pub fn from_ledger(ledger: &Ledger) -> Self {
        Self {
            money_markets: ledger.registry.iter().cloned().collect(),
            previous_accrual_times: ledger
                .previous_accrual_times
                .iter()
                .map(|(denom, time)| AccrualTime {
                    denom: denom.clone(),
                    time: *time,
                })
                .collect(),
            borrow_indexes: flatten_indexes(&ledger.borrow_indexes),
            supply_indexes: flatten_indexes(&ledger.supply_indexes),
            total_reserves: ledger.total_reserves.clone(),
            total_borrowed: ledger.total_borrowed.clone(),
            total_supplied: ledger.total_supplied.clone(),
            deposits: ledger.deposits.values().cloned().collect(),
            borrows: ledger.borrows.values().cloned().collect(),
        }
    }

    pub fn into_ledger(self) -> Result<Ledger, SnapshotError> {
        let mut ledger = Ledger::new();

        for market in self.money_markets {
            let denom = market.denom.clone();
            if ledger.registry.get(&denom).is_some() {
                return Err(SnapshotError::DuplicateDenom(denom));
            }
            ledger.registry.set(&denom, market)?;
        }

        for entry in self.previous_accrual_times {
            if ledger
                .previous_accrual_times
                .insert(entry.denom.clone(), entry.time)
                .is_some()
            {
                return Err(SnapshotError::DuplicateDenom(entry.denom));
            }
        }

        ledger.borrow_indexes = collect_indexes(self.borrow_indexes)?;
        ledger.supply_indexes = collect_indexes(self.supply_indexes)?;
        ledger.total_reserves = self.total_reserves;
        ledger.total_borrowed = self.total_borrowed;
        ledger.total_supplied = self.total_supplied;

        for deposit in self.deposits {
            let owner = deposit.depositor;
            if deposit.amount.is_empty() {
                return Err(SnapshotError::EmptyPosition(owner));
            }
            if ledger.deposits.insert(owner, deposit).is_some() {
                return Err(SnapshotError::DuplicatePosition(owner));
            }
        }
        for borrow in self.borrows {
            let owner = borrow.borrower;
            if borrow.amount.is_empty() {
                return Err(SnapshotError::EmptyPosition(owner));
            }
            if ledger.borrows.insert(owner, borrow).is_some() {
                return Err(SnapshotError::DuplicatePosition(owner));
            }
        }

        Ok(ledger)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(self).map_err(|e| SnapshotError::Parse(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        serde_json::from_str(json).map_err(|e| SnapshotError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid money market: {0}")]
    Market(#[from] MarketError),

    #[error("duplicate entry for {0}")]
    DuplicateDenom(Denom),

    #[error("index for {denom} must be positive, got {value}")]
    NonPositiveIndex { denom: Denom, value: Decimal },

    #[error("duplicate position for {0}")]
    DuplicatePosition(AccountId),

    #[error("empty position for {0}")]
    EmptyPosition(AccountId),

    #[error("could not parse snapshot: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{BorrowLimit, InterestRateModel};
    use crate::types::MarketId;
    use rust_decimal_macros::dec;

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        let market = MoneyMarket::new(
            denom("bnb"),
            BorrowLimit::uncapped(dec!(0.5)),
            MarketId::new("bnb:usd"),
            100_000_000,
            InterestRateModel::new(dec!(0), dec!(0.1), dec!(0.8), dec!(0.5)),
            dec!(0.05),
            dec!(0.02),
        );
        ledger.registry_mut().set(&denom("bnb"), market).unwrap();
        ledger.set_previous_accrual_time(&denom("bnb"), Timestamp::from_secs(100));
        ledger.set_borrow_index(&denom("bnb"), dec!(1.01));
        ledger.set_supply_index(&denom("bnb"), dec!(1.001));
        ledger.increment_total_supplied(&Coins::single(denom("bnb"), 500));

        let mut deposit = Deposit::new(AccountId(4));
        deposit.credit(&Coins::single(denom("bnb"), 500), ledger.supply_indexes());
        ledger.set_deposit(deposit);
        ledger
    }

    #[test]
    fn ledger_round_trips_through_json() {
        let ledger = sample_ledger();
        let json = LedgerSnapshot::from_ledger(&ledger).to_json().unwrap();
        let restored = LedgerSnapshot::from_json(&json).unwrap().into_ledger().unwrap();
        assert_eq!(restored, ledger);
    }

    #[test]
    fn rejects_zero_index() {
        let mut snapshot = LedgerSnapshot::from_ledger(&sample_ledger());
        snapshot.borrow_indexes[0].value = dec!(0);
        assert!(matches!(
            snapshot.into_ledger(),
            Err(SnapshotError::NonPositiveIndex { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_positions() {
        let mut snapshot = LedgerSnapshot::from_ledger(&sample_ledger());
        let dup = snapshot.deposits[0].clone();
        snapshot.deposits.push(dup);
        assert_eq!(
            snapshot.into_ledger(),
            Err(SnapshotError::DuplicatePosition(AccountId(4)))
        );
    }
}
