// 1.0: all the primitives live here. nothing in the engine works without these types.
// denoms, account ids, oracle market ids, prices, usd values, block time. each is a
// newtype so the compiler catches type mixups.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

// 1.1: asset denomination, e.g. "ukava" or "bnb". same shape rule as cosmos coin denoms:
// a letter followed by 2..=127 of [a-zA-Z0-9/:._-].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Denom(String);

impl Denom {
    pub fn new(denom: impl Into<String>) -> Result<Self, DenomError> {
        let denom = denom.into();
        let mut chars = denom.chars();
        let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c));
        if !first_ok || !rest_ok || !(3..=128).contains(&denom.len()) {
            return Err(DenomError(denom));
        }
        Ok(Self(denom))
    }

    /// Marker denom of the zero debt coin handed to collateral auctions.
    pub fn debt_marker() -> Self {
        Self("debt".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Denom {
    type Error = DenomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Denom::new(value)
    }
}

impl From<Denom> for String {
    fn from(denom: Denom) -> Self {
        denom.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid denom: {0:?}")]
pub struct DenomError(pub String);

// 1.2: account owning deposits/borrows. id 0 is reserved for the protocol's own
// liquidator account, which receives seized lots and sells them at auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl AccountId {
    pub const LIQUIDATOR: AccountId = AccountId(0);

    pub fn is_liquidator(&self) -> bool {
        *self == Self::LIQUIDATOR
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_liquidator() {
            f.write_str("liquidator")
        } else {
            write!(f, "account-{}", self.0)
        }
    }
}

// 1.3: oracle market a money market is priced from, e.g. "kava:usd".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub String);

impl MarketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// 1.4: usd price of one whole unit of an asset. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    #[must_use]
    pub fn new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn new_unchecked(value: Decimal) -> Self {
        debug_assert!(value > Decimal::ZERO);
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 1.5: usd-denominated value. collateral value, debt value, borrowable capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote(Decimal);

impl Quote {
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(&self, other: Quote) -> Self {
        Self(self.0 + other.0)
    }

    pub fn sub(&self, other: Quote) -> Self {
        Self(self.0 - other.0)
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl PartialOrd for Quote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl Sum for Quote {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, q| acc.add(q))
    }
}

// 1.6: block time in unix seconds. interest accrues per elapsed second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.0, 0).single()
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    // negative when `earlier` is actually later
    pub fn seconds_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}s", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn denom_validation() {
        assert!(Denom::new("ukava").is_ok());
        assert!(Denom::new("ibc/27394FB092").is_ok());
        assert!(Denom::new("bnb").is_ok());
        assert!(Denom::new("x").is_err());
        assert!(Denom::new("1kava").is_err());
        assert!(Denom::new("ka va").is_err());
        assert!(Denom::new("").is_err());
    }

    #[test]
    fn denom_serde_rejects_malformed() {
        let ok: Denom = serde_json::from_str("\"usdx\"").unwrap();
        assert_eq!(ok.as_str(), "usdx");
        assert!(serde_json::from_str::<Denom>("\"9x\"").is_err());
    }

    #[test]
    fn price_must_be_positive() {
        assert!(Price::new(dec!(0)).is_none());
        assert!(Price::new(dec!(-1)).is_none());
        assert_eq!(Price::new(dec!(2.5)).unwrap().value(), dec!(2.5));
    }

    #[test]
    fn quote_sum_and_order() {
        let total: Quote = vec![Quote::new(dec!(10)), Quote::new(dec!(2.5))].into_iter().sum();
        assert_eq!(total.value(), dec!(12.5));
        assert!(Quote::new(dec!(1)) < Quote::new(dec!(2)));
    }

    #[test]
    fn timestamp_elapsed() {
        let t0 = Timestamp::from_secs(1_600_000_000);
        let t1 = t0.plus_secs(3600);
        assert_eq!(t1.seconds_since(t0), 3600);
        assert_eq!(t0.seconds_since(t1), -3600);
        assert_eq!(t1.to_datetime().unwrap().timestamp(), 1_600_003_600);
        assert_eq!(t1.to_string(), "2020-09-13T13:26:40+00:00");
    }

    #[test]
    fn liquidator_account_is_reserved() {
        assert!(AccountId::LIQUIDATOR.is_liquidator());
        assert!(!AccountId(1).is_liquidator());
        assert_eq!(AccountId(7).to_string(), "account-7");
    }
}
