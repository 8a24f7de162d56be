// Price Oracle
//
// The engine never fetches prices itself. It asks a PriceOracle for the current
// price of a market id and treats "not found" as an ordinary outcome. Each posted
// price carries the time it was posted and how long it stays valid.

use crate::types::{MarketId, Price, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default time to live for a posted price, in seconds
pub const DEFAULT_PRICE_TTL_SECONDS: i64 = 3_600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPrice {
    pub market_id: MarketId,
    pub price: Price,
    /// When the price was posted
    pub timestamp: Timestamp,
    pub ttl_seconds: i64,
}

impl CurrentPrice {
    pub fn new(market_id: MarketId, price: Price, timestamp: Timestamp) -> Self {
        Self {
            market_id,
            price,
            timestamp,
            ttl_seconds: DEFAULT_PRICE_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn expires_at(&self) -> Timestamp {
        self.timestamp.plus_secs(self.ttl_seconds)
    }

    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.expires_at() < now
    }
}

/// Trait for price sources. Return None when the market has no price.
pub trait PriceOracle {
    fn current_price(&self, market_id: &MarketId) -> Option<CurrentPrice>;
}

/// Fixed prices set by hand, for tests and simulation
#[derive(Debug, Clone, Default)]
pub struct StaticPriceFeed {
    prices: BTreeMap<MarketId, CurrentPrice>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, market_id: MarketId, price: Price, timestamp: Timestamp) {
        let current = CurrentPrice::new(market_id.clone(), price, timestamp);
        self.prices.insert(market_id, current);
    }

    pub fn post(&mut self, current: CurrentPrice) {
        self.prices.insert(current.market_id.clone(), current);
    }

    pub fn remove(&mut self, market_id: &MarketId) {
        self.prices.remove(market_id);
    }
}

impl PriceOracle for StaticPriceFeed {
    fn current_price(&self, market_id: &MarketId) -> Option<CurrentPrice> {
        self.prices.get(market_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_staleness() {
        let price = CurrentPrice::new(
            MarketId::new("bnb:usd"),
            Price::new(dec!(300)).unwrap(),
            Timestamp::from_secs(1_000),
        )
        .with_ttl(60);

        assert!(!price.is_stale(Timestamp::from_secs(1_000)));
        // expiry instant itself is still valid
        assert!(!price.is_stale(Timestamp::from_secs(1_060)));
        assert!(price.is_stale(Timestamp::from_secs(1_061)));
    }

    #[test]
    fn test_static_feed() {
        let mut feed = StaticPriceFeed::new();
        let id = MarketId::new("ukava:usd");
        assert!(feed.current_price(&id).is_none());

        feed.set_price(id.clone(), Price::new(dec!(2)).unwrap(), Timestamp::from_secs(0));
        assert_eq!(feed.current_price(&id).unwrap().price.value(), dec!(2));

        feed.remove(&id);
        assert!(feed.current_price(&id).is_none());
    }
}
