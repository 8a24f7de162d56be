// 2.0: coin amounts. integer base units per denom, never negative.
// Coins is a multi-asset balance kept sorted by denom with no zero entries, so two
// balances holding the same amounts always compare equal and iterate the same way.

use crate::types::Denom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: Denom, amount: u128) -> Self {
        Self { denom, amount }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Coin>", from = "Vec<Coin>")]
pub struct Coins(BTreeMap<Denom, u128>);

impl Coins {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn single(denom: Denom, amount: u128) -> Self {
        let mut coins = Self::new();
        coins.add_amount(&denom, amount);
        coins
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn amount_of(&self, denom: &Denom) -> u128 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn contains(&self, denom: &Denom) -> bool {
        self.0.contains_key(denom)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Denom, u128)> {
        self.0.iter().map(|(d, a)| (d, *a))
    }

    pub fn denoms(&self) -> impl Iterator<Item = &Denom> {
        self.0.keys()
    }

    pub fn to_vec(&self) -> Vec<Coin> {
        self.iter().map(|(d, a)| Coin::new(d.clone(), a)).collect()
    }

    // saturates at u128::MAX; base-unit totals never get near it in practice
    pub fn add_amount(&mut self, denom: &Denom, amount: u128) {
        if amount == 0 {
            return;
        }
        let entry = self.0.entry(denom.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn add(&mut self, other: &Coins) {
        for (denom, amount) in other.iter() {
            self.add_amount(denom, amount);
        }
    }

    pub fn plus(&self, other: &Coins) -> Coins {
        let mut out = self.clone();
        out.add(other);
        out
    }

    pub fn checked_sub(&self, other: &Coins) -> Result<Coins, CoinsError> {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let have = out.amount_of(denom);
            if have < amount {
                return Err(CoinsError::Insufficient {
                    denom: denom.clone(),
                    available: have,
                    requested: amount,
                });
            }
            out.set_amount(denom, have - amount);
        }
        Ok(out)
    }

    // per-denom subtraction that floors at zero instead of failing
    pub fn saturating_sub(&self, other: &Coins) -> Coins {
        let mut out = self.clone();
        for (denom, amount) in other.iter() {
            let have = out.amount_of(denom);
            out.set_amount(denom, have.saturating_sub(amount));
        }
        out
    }

    pub fn set_amount(&mut self, denom: &Denom, amount: u128) {
        if amount == 0 {
            self.0.remove(denom);
        } else {
            self.0.insert(denom.clone(), amount);
        }
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(coins: Vec<Coin>) -> Self {
        let mut out = Coins::new();
        for coin in coins {
            out.add_amount(&coin.denom, coin.amount);
        }
        out
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins.to_vec()
    }
}

impl FromIterator<Coin> for Coins {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        Coins::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(d, a)| format!("{a}{d}")).collect();
        f.write_str(&parts.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoinsError {
    #[error("insufficient {denom}: available {available}, requested {requested}")]
    Insufficient {
        denom: Denom,
        available: u128,
        requested: u128,
    },
}
