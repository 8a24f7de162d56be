//! Usd values per denom, built fresh for one risk or liquidation computation.

use crate::fixed_point::{FixedDec, FixedPointError};
use crate::types::{Denom, Price};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuationMap {
    usd: BTreeMap<Denom, Decimal>,
}

impl ValuationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, denom: &Denom) -> Decimal {
        self.usd.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn increment(&mut self, denom: &Denom, amount: Decimal) {
        let entry = self.usd.entry(denom.clone()).or_insert(Decimal::ZERO);
        *entry += amount;
    }

    pub fn decrement(&mut self, denom: &Denom, amount: Decimal) {
        let entry = self.usd.entry(denom.clone()).or_insert(Decimal::ZERO);
        *entry -= amount;
    }

    pub fn set_zero(&mut self, denom: &Denom) {
        self.usd.insert(denom.clone(), Decimal::ZERO);
    }

    pub fn sum(&self) -> Decimal {
        self.usd.values().copied().sum()
    }

    /// Keys in ascending order. Liquidation walks buckets in this order so every
    /// node matches debt to collateral identically.
    pub fn sorted_keys(&self) -> Vec<Denom> {
        self.usd.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.usd.is_empty()
    }
}

/// `amount / conversion_factor * price`, rounded like every other fixed-point step.
pub fn usd_value(
    amount: u128,
    conversion_factor: u128,
    price: Price,
) -> Result<Decimal, FixedPointError> {
    usd_value_fixed(amount, conversion_factor, price)?.to_decimal()
}

pub(crate) fn usd_value_fixed(
    amount: u128,
    conversion_factor: u128,
    price: Price,
) -> Result<FixedDec, FixedPointError> {
    FixedDec::from_int(amount)?
        .quo(&FixedDec::from_int(conversion_factor)?)?
        .mul(&FixedDec::from_decimal(price.value())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    #[test]
    fn increment_decrement_and_sum() {
        let mut map = ValuationMap::new();
        map.increment(&denom("ukava"), dec!(10));
        map.increment(&denom("ukava"), dec!(2.5));
        map.increment(&denom("bnb"), dec!(100));
        map.decrement(&denom("bnb"), dec!(40));

        assert_eq!(map.get(&denom("ukava")), dec!(12.5));
        assert_eq!(map.get(&denom("bnb")), dec!(60));
        assert_eq!(map.get(&denom("usdx")), dec!(0));
        assert_eq!(map.sum(), dec!(72.5));
    }

    #[test]
    fn set_zero_keeps_key() {
        let mut map = ValuationMap::new();
        map.increment(&denom("ukava"), dec!(3));
        map.set_zero(&denom("ukava"));
        assert_eq!(map.get(&denom("ukava")), dec!(0));
        assert_eq!(map.sorted_keys(), vec![denom("ukava")]);
    }

    #[test]
    fn keys_come_back_sorted() {
        let mut map = ValuationMap::new();
        for d in ["usdx", "bnb", "ukava", "btcb"] {
            map.increment(&denom(d), dec!(1));
        }
        let keys: Vec<String> = map.sorted_keys().into_iter().map(String::from).collect();
        assert_eq!(keys, vec!["bnb", "btcb", "ukava", "usdx"]);
    }

    #[test]
    fn usd_value_applies_conversion_factor() {
        let price = Price::new(dec!(2)).unwrap();
        assert_eq!(usd_value(100_000_000, 1_000_000, price).unwrap(), dec!(200));
        let price = Price::new(dec!(0.3)).unwrap();
        assert_eq!(usd_value(1, 3, price).unwrap(), dec!(0.1));
    }
}
