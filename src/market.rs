//! Money market parameters and the registry that holds them.
//!
//! A money market is the parameter set for borrowing and lending one asset:
//! collateral factor, borrow cap, price source, interest curve, reserve factor, and
//! the liquidation agent's cut. Every write goes through `validate`.

use crate::types::{Denom, MarketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-asset borrow cap and loan-to-value ratio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowLimit {
    pub has_max_limit: bool,
    /// Protocol-wide cap in base units, only enforced when `has_max_limit`.
    pub maximum_limit: Decimal,
    /// Fraction of a deposit's usd value that may be borrowed against.
    pub loan_to_value: Decimal,
}

impl BorrowLimit {
    pub fn new(has_max_limit: bool, maximum_limit: Decimal, loan_to_value: Decimal) -> Self {
        Self {
            has_max_limit,
            maximum_limit,
            loan_to_value,
        }
    }

    pub fn uncapped(loan_to_value: Decimal) -> Self {
        Self::new(false, Decimal::ZERO, loan_to_value)
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        if self.maximum_limit < Decimal::ZERO {
            return Err(MarketError::NegativeBorrowLimit(self.maximum_limit));
        }
        if self.loan_to_value < Decimal::ZERO || self.loan_to_value > Decimal::ONE {
            return Err(MarketError::OutOfRange {
                field: "loan_to_value",
                value: self.loan_to_value,
            });
        }
        Ok(())
    }
}

/// Piecewise-linear utilization to borrow APY curve with a kink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRateModel {
    pub base_rate_apy: Decimal,
    pub base_multiplier: Decimal,
    pub kink: Decimal,
    pub jump_multiplier: Decimal,
}

impl InterestRateModel {
    pub fn new(
        base_rate_apy: Decimal,
        base_multiplier: Decimal,
        kink: Decimal,
        jump_multiplier: Decimal,
    ) -> Self {
        Self {
            base_rate_apy,
            base_multiplier,
            kink,
            jump_multiplier,
        }
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        check_fraction("base_rate_apy", self.base_rate_apy)?;
        check_non_negative("base_multiplier", self.base_multiplier)?;
        check_fraction("kink", self.kink)?;
        check_non_negative("jump_multiplier", self.jump_multiplier)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyMarket {
    pub denom: Denom,
    pub borrow_limit: BorrowLimit,
    pub price_market_id: MarketId,
    /// Base units per whole unit, e.g. 1_000_000 for a 6-decimal asset.
    pub conversion_factor: u128,
    pub interest_rate_model: InterestRateModel,
    pub reserve_factor: Decimal,
    pub liquidation_reward_pct: Decimal,
}

impl MoneyMarket {
    pub fn new(
        denom: Denom,
        borrow_limit: BorrowLimit,
        price_market_id: MarketId,
        conversion_factor: u128,
        interest_rate_model: InterestRateModel,
        reserve_factor: Decimal,
        liquidation_reward_pct: Decimal,
    ) -> Self {
        Self {
            denom,
            borrow_limit,
            price_market_id,
            conversion_factor,
            interest_rate_model,
            reserve_factor,
            liquidation_reward_pct,
        }
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        self.borrow_limit.validate()?;
        self.interest_rate_model.validate()?;
        if self.conversion_factor < 1 {
            return Err(MarketError::InvalidConversionFactor(self.conversion_factor));
        }
        if self.price_market_id.0.trim().is_empty() {
            return Err(MarketError::EmptyPriceMarket(self.denom.clone()));
        }
        check_fraction("reserve_factor", self.reserve_factor)?;
        check_fraction("liquidation_reward_pct", self.liquidation_reward_pct)?;
        Ok(())
    }
}

fn check_fraction(field: &'static str, value: Decimal) -> Result<(), MarketError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(MarketError::OutOfRange { field, value });
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: Decimal) -> Result<(), MarketError> {
    if value < Decimal::ZERO {
        return Err(MarketError::OutOfRange { field, value });
    }
    Ok(())
}

/// Stored money markets keyed by denom. Iteration is in denom order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoneyMarketRegistry {
    markets: BTreeMap<Denom, MoneyMarket>,
}

impl MoneyMarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, denom: &Denom) -> Option<&MoneyMarket> {
        self.markets.get(denom)
    }

    pub fn set(&mut self, denom: &Denom, market: MoneyMarket) -> Result<(), MarketError> {
        if market.denom != *denom {
            return Err(MarketError::DenomMismatch {
                key: denom.clone(),
                market: market.denom,
            });
        }
        market.validate()?;
        self.markets.insert(denom.clone(), market);
        Ok(())
    }

    pub fn delete(&mut self, denom: &Denom) -> Option<MoneyMarket> {
        self.markets.remove(denom)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MoneyMarket> {
        self.markets.values()
    }

    pub fn denoms(&self) -> Vec<Denom> {
        self.markets.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: Decimal },

    #[error("borrow limit cannot be negative: {0}")]
    NegativeBorrowLimit(Decimal),

    #[error("conversion factor must be at least 1, got {0}")]
    InvalidConversionFactor(u128),

    #[error("money market {0} has no price market")]
    EmptyPriceMarket(Denom),

    #[error("registry key {key} does not match market denom {market}")]
    DenomMismatch { key: Denom, market: Denom },

    #[error("duplicate money market for {0}")]
    Duplicate(Denom),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usdx_market() -> MoneyMarket {
        MoneyMarket::new(
            Denom::new("usdx").unwrap(),
            BorrowLimit::new(true, dec!(100000000000), dec!(0.9)),
            MarketId::new("usdx:usd"),
            1_000_000,
            InterestRateModel::new(dec!(0.05), dec!(2), dec!(0.8), dec!(10)),
            dec!(0.05),
            dec!(0.02),
        )
    }

    #[test]
    fn valid_market_passes() {
        assert!(usdx_market().validate().is_ok());
    }

    #[test]
    fn ltv_bounds_are_inclusive() {
        let mut mm = usdx_market();
        mm.borrow_limit.loan_to_value = dec!(0);
        assert!(mm.validate().is_ok());
        mm.borrow_limit.loan_to_value = dec!(1);
        assert!(mm.validate().is_ok());
        mm.borrow_limit.loan_to_value = dec!(1.01);
        assert!(matches!(
            mm.validate(),
            Err(MarketError::OutOfRange { field: "loan_to_value", .. })
        ));
    }

    #[test]
    fn conversion_factor_must_be_positive() {
        let mut mm = usdx_market();
        mm.conversion_factor = 0;
        assert_eq!(mm.validate(), Err(MarketError::InvalidConversionFactor(0)));
    }

    #[test]
    fn interest_model_bounds() {
        let mut mm = usdx_market();
        mm.interest_rate_model.kink = dec!(1.2);
        assert!(mm.validate().is_err());

        let mut mm = usdx_market();
        mm.interest_rate_model.jump_multiplier = dec!(-1);
        assert!(mm.validate().is_err());

        let mut mm = usdx_market();
        mm.reserve_factor = dec!(1.5);
        assert!(mm.validate().is_err());

        let mut mm = usdx_market();
        mm.liquidation_reward_pct = dec!(-0.1);
        assert!(mm.validate().is_err());
    }

    #[test]
    fn registry_set_get_delete() {
        let mut registry = MoneyMarketRegistry::new();
        let mm = usdx_market();
        let denom = mm.denom.clone();

        registry.set(&denom, mm.clone()).unwrap();
        assert_eq!(registry.get(&denom), Some(&mm));
        assert_eq!(registry.len(), 1);

        let removed = registry.delete(&denom);
        assert_eq!(removed, Some(mm));
        assert!(registry.is_empty());
    }

    #[test]
    fn registry_rejects_invalid_writes() {
        let mut registry = MoneyMarketRegistry::new();
        let mut mm = usdx_market();
        mm.reserve_factor = dec!(2);
        assert!(registry.set(&mm.denom.clone(), mm).is_err());
        assert!(registry.is_empty());

        let other = Denom::new("ukava").unwrap();
        assert!(matches!(
            registry.set(&other, usdx_market()),
            Err(MarketError::DenomMismatch { .. })
        ));
    }
}
