//! Collateralization checks.
//!
//! Every risk decision starts by loading the price, loan-to-value, and conversion
//! factor of each denom involved, then values deposits and borrows in usd. The
//! same numbers back borrow validation, withdraw validation, liquidatability, and
//! the stored-ltv ranking used by index liquidations.

use crate::coins::Coins;
use crate::fixed_point::{FixedDec, FixedPointError};
use crate::market::MoneyMarketRegistry;
use crate::oracle::PriceOracle;
use crate::types::{Denom, MarketId, Price, Timestamp};
use crate::valuation::usd_value_fixed;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// What a risk computation needs to know about one denom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationData {
    pub price: Price,
    pub loan_to_value: Decimal,
    pub conversion_factor: u128,
}

pub type LiquidationDataMap = BTreeMap<Denom, LiquidationData>;

/// Loads market parameters and a fresh price for one denom.
pub fn liquidation_data_for<O: PriceOracle + ?Sized>(
    registry: &MoneyMarketRegistry,
    oracle: &O,
    now: Timestamp,
    denom: &Denom,
) -> Result<LiquidationData, RiskError> {
    let market = registry
        .get(denom)
        .ok_or_else(|| RiskError::MarketNotFound(denom.clone()))?;
    let current = oracle
        .current_price(&market.price_market_id)
        .ok_or_else(|| RiskError::PriceNotFound(market.price_market_id.clone()))?;
    if current.is_stale(now) {
        return Err(RiskError::PriceExpired {
            market_id: market.price_market_id.clone(),
            expired_at: current.expires_at(),
            now,
        });
    }
    Ok(LiquidationData {
        price: current.price,
        loan_to_value: market.borrow_limit.loan_to_value,
        conversion_factor: market.conversion_factor,
    })
}

/// Loads data for every denom given; the first missing market or price aborts.
pub fn load_liquidation_data<'a, O: PriceOracle + ?Sized>(
    registry: &MoneyMarketRegistry,
    oracle: &O,
    now: Timestamp,
    denoms: impl IntoIterator<Item = &'a Denom>,
) -> Result<LiquidationDataMap, RiskError> {
    let mut data = LiquidationDataMap::new();
    for denom in denoms {
        if data.contains_key(denom) {
            continue;
        }
        let entry = liquidation_data_for(registry, oracle, now, denom)?;
        data.insert(denom.clone(), entry);
    }
    Ok(data)
}

fn lookup<'m>(
    data: &'m LiquidationDataMap,
    denom: &Denom,
) -> Result<&'m LiquidationData, RiskError> {
    data.get(denom)
        .ok_or_else(|| RiskError::MarketNotFound(denom.clone()))
}

pub(crate) fn coins_value_fixed(
    coins: &Coins,
    data: &LiquidationDataMap,
) -> Result<FixedDec, RiskError> {
    let mut total = FixedDec::ZERO;
    for (denom, amount) in coins.iter() {
        let d = lookup(data, denom)?;
        total = total.add(&usd_value_fixed(amount, d.conversion_factor, d.price)?)?;
    }
    Ok(total)
}

pub(crate) fn borrowable_value_fixed(
    deposit: &Coins,
    data: &LiquidationDataMap,
) -> Result<FixedDec, RiskError> {
    let mut total = FixedDec::ZERO;
    for (denom, amount) in deposit.iter() {
        let d = lookup(data, denom)?;
        let value = usd_value_fixed(amount, d.conversion_factor, d.price)?;
        total = total.add(&value.mul(&FixedDec::from_decimal(d.loan_to_value)?)?)?;
    }
    Ok(total)
}

/// Borrowed usd over deposited usd. Zero when nothing is deposited.
pub fn calculate_ltv(
    deposit: &Coins,
    borrow: &Coins,
    data: &LiquidationDataMap,
) -> Result<Decimal, RiskError> {
    let deposited = coins_value_fixed(deposit, data)?;
    if deposited.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let borrowed = coins_value_fixed(borrow, data)?;
    Ok(borrowed.quo(&deposited)?.to_decimal()?)
}

pub fn is_within_valid_ltv_range(
    deposit: &Coins,
    borrow: &Coins,
    data: &LiquidationDataMap,
) -> Result<bool, RiskError> {
    let borrowable = borrowable_value_fixed(deposit, data)?;
    let borrowed = coins_value_fixed(borrow, data)?;
    Ok(borrowed <= borrowable)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("no money market for {0}")]
    MarketNotFound(Denom),

    #[error("no price for market {0}")]
    PriceNotFound(MarketId),

    #[error("price for {market_id} expired at {expired_at}, block time {now}")]
    PriceExpired {
        market_id: MarketId,
        expired_at: Timestamp,
        now: Timestamp,
    },

    #[error("valuation arithmetic failed: {0}")]
    Math(#[from] FixedPointError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{BorrowLimit, InterestRateModel, MoneyMarket};
    use crate::oracle::{CurrentPrice, StaticPriceFeed};
    use rust_decimal_macros::dec;

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    fn market(d: &str, ltv: Decimal) -> MoneyMarket {
        MoneyMarket::new(
            denom(d),
            BorrowLimit::uncapped(ltv),
            MarketId::new(format!("{}:usd", d)),
            1_000_000,
            InterestRateModel::new(dec!(0.05), dec!(2), dec!(0.8), dec!(10)),
            dec!(0.05),
            dec!(0.05),
        )
    }

    fn setup() -> (MoneyMarketRegistry, StaticPriceFeed) {
        let mut registry = MoneyMarketRegistry::new();
        registry.set(&denom("aaa"), market("aaa", dec!(0.6))).unwrap();
        registry.set(&denom("bbb"), market("bbb", dec!(0.8))).unwrap();
        let mut feed = StaticPriceFeed::new();
        let t0 = Timestamp::from_secs(0);
        feed.set_price(MarketId::new("aaa:usd"), Price::new(dec!(2)).unwrap(), t0);
        feed.set_price(MarketId::new("bbb:usd"), Price::new(dec!(1)).unwrap(), t0);
        (registry, feed)
    }

    fn data_for(feed: &StaticPriceFeed, registry: &MoneyMarketRegistry) -> LiquidationDataMap {
        let all = [denom("aaa"), denom("bbb")];
        load_liquidation_data(registry, feed, Timestamp::from_secs(1), all.iter()).unwrap()
    }

    #[test]
    fn borrowable_value_uses_ltv() {
        let (registry, feed) = setup();
        let data = data_for(&feed, &registry);
        let deposit = Coins::single(denom("aaa"), 100_000_000);
        let borrowable = borrowable_value_fixed(&deposit, &data).unwrap();
        assert_eq!(borrowable.to_decimal().unwrap(), dec!(120));
        let total = coins_value_fixed(&deposit, &data).unwrap();
        assert_eq!(total.to_decimal().unwrap(), dec!(200));
    }

    #[test]
    fn ltv_boundary_is_inclusive() {
        let (registry, feed) = setup();
        let deposit = Coins::single(denom("aaa"), 100_000_000);
        let data = data_for(&feed, &registry);

        let at_limit = Coins::single(denom("bbb"), 120_000_000);
        assert!(is_within_valid_ltv_range(&deposit, &at_limit, &data).unwrap());
        let over = Coins::single(denom("bbb"), 120_000_001);
        assert!(!is_within_valid_ltv_range(&deposit, &over, &data).unwrap());

        assert_eq!(calculate_ltv(&deposit, &at_limit, &data).unwrap(), dec!(0.6));
    }

    #[test]
    fn ltv_is_zero_without_deposits() {
        let (registry, feed) = setup();
        let borrow = Coins::single(denom("bbb"), 5);
        let data = data_for(&feed, &registry);
        assert_eq!(calculate_ltv(&Coins::new(), &borrow, &data).unwrap(), dec!(0));
    }

    #[test]
    fn missing_market_and_price_errors() {
        let (registry, mut feed) = setup();
        let now = Timestamp::from_secs(1);
        let unknown = denom("ccc");
        assert_eq!(
            liquidation_data_for(&registry, &feed, now, &unknown),
            Err(RiskError::MarketNotFound(unknown))
        );

        feed.remove(&MarketId::new("bbb:usd"));
        assert_eq!(
            liquidation_data_for(&registry, &feed, now, &denom("bbb")),
            Err(RiskError::PriceNotFound(MarketId::new("bbb:usd")))
        );
    }

    #[test]
    fn stale_price_is_rejected() {
        let (registry, mut feed) = setup();
        let price = Price::new(dec!(2)).unwrap();
        let posted = CurrentPrice::new(MarketId::new("aaa:usd"), price, Timestamp::from_secs(0));
        feed.post(posted.with_ttl(10));
        let aaa = denom("aaa");
        assert!(liquidation_data_for(&registry, &feed, Timestamp::from_secs(10), &aaa).is_ok());
        assert!(matches!(
            liquidation_data_for(&registry, &feed, Timestamp::from_secs(11), &aaa),
            Err(RiskError::PriceExpired { .. })
        ));
    }
}
