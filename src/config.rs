// 7.0 config.rs: protocol parameters in one place. money markets, the minimum
// borrow value, and how many accounts index liquidation checks per block.
// 7.1 set by governance; the engine picks changes up on the next block.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::market::{BorrowLimit, InterestRateModel, MarketError, MoneyMarket};
use crate::types::{Denom, MarketId};

// Complete parameter set for the lending protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingParams {
    pub money_markets: Vec<MoneyMarket>,
    // Open borrows below this usd value are rejected as dust
    pub minimum_borrow_usd_value: Decimal,
    // Highest-ltv borrowers checked for liquidation each block
    pub check_ltv_index_count: usize,
}

impl Default for LendingParams {
    fn default() -> Self {
        Self {
            money_markets: Vec::new(),
            minimum_borrow_usd_value: dec!(10),
            check_ltv_index_count: 10,
        }
    }
}

fn preset_market(
    denom: &str,
    market_id: &str,
    conversion_factor: u128,
    loan_to_value: Decimal,
    model: InterestRateModel,
) -> Result<MoneyMarket, ConfigError> {
    let denom = Denom::new(denom).map_err(|e| ConfigError::InvalidDenom(e.to_string()))?;
    Ok(MoneyMarket::new(
        denom,
        BorrowLimit::uncapped(loan_to_value),
        MarketId::new(market_id),
        conversion_factor,
        model,
        dec!(0.05),
        dec!(0.05),
    ))
}

impl LendingParams {
    pub fn new(
        money_markets: Vec<MoneyMarket>,
        minimum_borrow_usd_value: Decimal,
        check_ltv_index_count: usize,
    ) -> Self {
        Self {
            money_markets,
            minimum_borrow_usd_value,
            check_ltv_index_count,
        }
    }

    // Stablecoin plus two volatile assets, moderate curves
    pub fn development() -> Result<Self, ConfigError> {
        let stable = InterestRateModel::new(dec!(0.05), dec!(2), dec!(0.8), dec!(10));
        let volatile = InterestRateModel::new(dec!(0), dec!(0.1), dec!(0.8), dec!(0.5));
        let params = Self {
            money_markets: vec![
                preset_market("usdx", "usdx:usd", 1_000_000, dec!(0.9), stable)?,
                preset_market("ukava", "kava:usd", 1_000_000, dec!(0.6), volatile.clone())?,
                preset_market("bnb", "bnb:usd", 100_000_000, dec!(0.5), volatile)?,
            ],
            ..Self::default()
        };
        params.validate()?;
        Ok(params)
    }

    // Low minimum borrow so small test positions are allowed
    pub fn testnet() -> Result<Self, ConfigError> {
        let mut params = Self::development()?;
        params.minimum_borrow_usd_value = dec!(1);
        params.check_ltv_index_count = 25;
        params.validate()?;
        Ok(params)
    }

    // Conservative collateral factors and capped borrows
    pub fn mainnet() -> Result<Self, ConfigError> {
        let mut params = Self::development()?;
        for market in &mut params.money_markets {
            market.borrow_limit.loan_to_value *= dec!(0.8);
            market.borrow_limit.has_max_limit = true;
            market.borrow_limit.maximum_limit = dec!(1_000_000_000_000);
            market.reserve_factor = dec!(0.1);
        }
        params.validate()?;
        Ok(params)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    // Validate every market and the protocol-wide settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for market in &self.money_markets {
            if !seen.insert(market.denom.clone()) {
                return Err(ConfigError::Market(MarketError::Duplicate(
                    market.denom.clone(),
                )));
            }
            market.validate()?;
        }

        if self.minimum_borrow_usd_value < Decimal::ZERO {
            return Err(ConfigError::NegativeMinimumBorrow(
                self.minimum_borrow_usd_value,
            ));
        }

        Ok(())
    }

    pub fn money_market(&self, denom: &Denom) -> Option<&MoneyMarket> {
        self.money_markets.iter().find(|m| &m.denom == denom)
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid money market: {0}")]
    Market(#[from] MarketError),

    #[error("minimum borrow usd value cannot be negative: {0}")]
    NegativeMinimumBorrow(Decimal),

    #[error("invalid denom: {0}")]
    InvalidDenom(String),

    #[error("could not parse parameters: {0}")]
    Parse(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn params(&self) -> Result<LendingParams, ConfigError> {
        match self {
            Environment::Development => LendingParams::development(),
            Environment::Testnet => LendingParams::testnet(),
            Environment::Mainnet => LendingParams::mainnet(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        let params = LendingParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.minimum_borrow_usd_value, dec!(10));
    }

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.params().is_ok());
        assert_eq!(Environment::Testnet.params().unwrap().check_ltv_index_count, 25);

        let mainnet = Environment::Mainnet.params().unwrap();
        let ukava = mainnet.money_market(&Denom::new("ukava").unwrap()).unwrap();
        assert_eq!(ukava.borrow_limit.loan_to_value, dec!(0.48));
        assert!(ukava.borrow_limit.has_max_limit);
    }

    #[test]
    fn test_duplicate_denom() {
        let mut params = LendingParams::development().unwrap();
        let first = params.money_markets[0].clone();
        params.money_markets.push(first);
        assert!(matches!(
            params.validate(),
            Err(ConfigError::Market(MarketError::Duplicate(_)))
        ));
    }

    #[test]
    fn test_negative_minimum_borrow() {
        let mut params = LendingParams::default();
        params.minimum_borrow_usd_value = dec!(-1);
        assert_eq!(
            params.validate(),
            Err(ConfigError::NegativeMinimumBorrow(dec!(-1)))
        );
    }

    #[test]
    fn test_invalid_market_is_rejected() {
        let mut params = LendingParams::development().unwrap();
        params.money_markets[1].borrow_limit.loan_to_value = dec!(1.5);
        assert!(matches!(params.validate(), Err(ConfigError::Market(_))));
    }

    #[test]
    fn test_json_round_trip() {
        let params = LendingParams::development().unwrap();
        let json = params.to_json().unwrap();
        let back = LendingParams::from_json(&json).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            LendingParams::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
