// 8.4 engine/validation.rs: risk checks the operations run before moving funds.
// all reads; nothing here writes to the ledger.

use super::core::Engine;
use super::results::EngineError;
use crate::auction::AuctionKeeper;
use crate::bank::BankKeeper;
use crate::coins::Coins;
use crate::fixed_point::FixedDec;
use crate::oracle::PriceOracle;
use crate::position::{Borrow, Deposit};
use crate::risk::{
    borrowable_value_fixed, calculate_ltv, coins_value_fixed, is_within_valid_ltv_range,
    liquidation_data_for, load_liquidation_data, LiquidationDataMap, RiskError,
};
use crate::types::{AccountId, Quote};
use rust_decimal::Decimal;

fn quote(value: FixedDec) -> Result<Quote, EngineError> {
    Ok(Quote::new(value.to_decimal().map_err(RiskError::from)?))
}

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    pub(super) fn load_data(&self, sets: &[&Coins]) -> Result<LiquidationDataMap, EngineError> {
        let denoms = sets.iter().flat_map(|coins| coins.denoms());
        Ok(load_liquidation_data(
            &self.ledger.registry,
            &self.oracle,
            self.current_time,
            denoms,
        )?)
    }

    // 8.4.1: borrow must fit under every cap, the owner's ltv, and above the dust floor
    pub(super) fn validate_borrow(
        &self,
        owner: AccountId,
        deposit: Option<&Deposit>,
        borrow: Option<&Borrow>,
        coins: &Coins,
    ) -> Result<(), EngineError> {
        if coins.is_empty() {
            return Err(EngineError::EmptyCoins("borrow"));
        }

        let mut data = LiquidationDataMap::new();
        for (denom, amount) in coins.iter() {
            let market = self
                .ledger
                .registry
                .get(denom)
                .ok_or_else(|| EngineError::MarketNotFound(denom.clone()))?;
            let now = self.current_time;
            let entry = liquidation_data_for(&self.ledger.registry, &self.oracle, now, denom)?;

            let limit = &market.borrow_limit;
            if limit.has_max_limit {
                let borrowed = self
                    .ledger
                    .total_borrowed()
                    .map(|c| c.amount_of(denom))
                    .unwrap_or(0);
                let proposed_total =
                    FixedDec::from_int(borrowed.saturating_add(amount)).map_err(RiskError::from)?;
                let maximum =
                    FixedDec::from_decimal(limit.maximum_limit).map_err(RiskError::from)?;
                if proposed_total > maximum {
                    return Err(EngineError::ExceedsProtocolBorrowLimit {
                        denom: denom.clone(),
                        borrowed,
                        requested: amount,
                        maximum: limit.maximum_limit,
                    });
                }
            }
            data.insert(denom.clone(), entry);
        }

        let deposit = deposit.ok_or(EngineError::DepositNotFound(owner))?;
        let empty = Coins::new();
        let existing = borrow.map(|b| &b.amount).unwrap_or(&empty);
        for (denom, entry) in self.load_data(&[&deposit.amount, existing])? {
            data.entry(denom).or_insert(entry);
        }

        let proposed_value = coins_value_fixed(coins, &data)?;
        let existing_value = coins_value_fixed(existing, &data)?;
        let borrowable = borrowable_value_fixed(&deposit.amount, &data)?;
        let total = proposed_value.add(&existing_value).map_err(RiskError::from)?;

        if total > borrowable {
            return Err(EngineError::InsufficientLoanToValue {
                borrowed: quote(total)?,
                borrowable: quote(borrowable)?,
            });
        }

        let minimum = self.params.minimum_borrow_usd_value;
        if total < FixedDec::from_decimal(minimum).map_err(RiskError::from)? {
            return Err(EngineError::BelowMinimumBorrowValue {
                value: quote(total)?,
                minimum: Quote::new(minimum),
            });
        }
        Ok(())
    }

    // 8.4.2: remaining deposit must still cover the borrow
    pub(super) fn validate_withdraw(
        &self,
        owner: AccountId,
        proposed_deposit: &Coins,
        borrow: Option<&Borrow>,
    ) -> Result<(), EngineError> {
        let Some(borrow) = borrow.filter(|b| !b.amount.is_empty()) else {
            return Ok(());
        };
        let data = self.load_data(&[proposed_deposit, &borrow.amount])?;
        if !is_within_valid_ltv_range(proposed_deposit, &borrow.amount, &data)? {
            return Err(EngineError::InvalidWithdrawAmount(owner));
        }
        Ok(())
    }

    // 8.4.3: a partly repaid borrow may not fall under the dust floor
    pub(super) fn validate_remaining_borrow(&self, remaining: &Coins) -> Result<(), EngineError> {
        if remaining.is_empty() {
            return Ok(());
        }
        let data = self.load_data(&[remaining])?;
        let value = coins_value_fixed(remaining, &data)?;
        let minimum = self.params.minimum_borrow_usd_value;
        if value < FixedDec::from_decimal(minimum).map_err(RiskError::from)? {
            return Err(EngineError::BelowMinimumBorrowValue {
                value: quote(value)?,
                minimum: Quote::new(minimum),
            });
        }
        Ok(())
    }

    /// Pool must keep its reserves after paying `coins` out.
    pub(super) fn check_pool_liquidity(&self, coins: &Coins) -> Result<(), EngineError> {
        for (denom, requested) in coins.iter() {
            let available = self
                .bank
                .pool_balance(denom)
                .saturating_sub(self.ledger.total_reserves().amount_of(denom));
            if requested > available {
                return Err(EngineError::InsufficientPoolLiquidity {
                    denom: denom.clone(),
                    requested,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Synced loan-to-value of the owner. Zero without a deposit.
    pub fn loan_to_value(&self, owner: AccountId) -> Result<Decimal, EngineError> {
        let Some(deposit) = self.synced_deposit(owner)? else {
            return Ok(Decimal::ZERO);
        };
        let borrow = self.synced_borrow(owner)?.map(|b| b.amount).unwrap_or_default();
        let data = self.load_data(&[&deposit.amount, &borrow])?;
        Ok(calculate_ltv(&deposit.amount, &borrow, &data)?)
    }

    /// Loan-to-value of the stored records without pending interest. Zero
    /// unless the owner has both a deposit and a borrow.
    pub fn store_loan_to_value(&self, owner: AccountId) -> Result<Decimal, EngineError> {
        let (Some(deposit), Some(borrow)) = (self.ledger.deposit(owner), self.ledger.borrow(owner))
        else {
            return Ok(Decimal::ZERO);
        };
        let data = self.load_data(&[&deposit.amount, &borrow.amount])?;
        Ok(calculate_ltv(&deposit.amount, &borrow.amount, &data)?)
    }

    /// True when synced debt value exceeds borrowable value.
    pub fn is_liquidatable(&self, owner: AccountId) -> Result<bool, EngineError> {
        let deposit = self.synced_deposit(owner)?;
        let borrow = self.synced_borrow(owner)?;
        let (Some(deposit), Some(borrow)) = (deposit, borrow) else {
            return Ok(false);
        };
        let data = self.load_data(&[&deposit.amount, &borrow.amount])?;
        Ok(!is_within_valid_ltv_range(&deposit.amount, &borrow.amount, &data)?)
    }
}
