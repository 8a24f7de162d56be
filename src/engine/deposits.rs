//! Supplying and withdrawing collateral.

use super::core::Engine;
use super::results::EngineError;
use crate::auction::AuctionKeeper;
use crate::bank::BankKeeper;
use crate::coins::{Coins, CoinsError};
use crate::events::{DepositEvent, EventPayload, WithdrawalEvent};
use crate::oracle::PriceOracle;
use crate::position::Deposit;
use crate::types::AccountId;

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    /// Moves `coins` from the owner into the pool and credits their deposit.
    /// Returns the new deposit balance.
    pub fn deposit(&mut self, owner: AccountId, coins: Coins) -> Result<Coins, EngineError> {
        tracing::debug!(owner = %owner, amount = %coins, "deposit");
        if coins.is_empty() {
            return Err(EngineError::EmptyCoins("deposit"));
        }

        let mut deposit = self
            .synced_deposit(owner)?
            .unwrap_or_else(|| Deposit::new(owner));
        let borrow = self.synced_borrow(owner)?;

        for denom in coins.denoms() {
            if self.ledger.registry.get(denom).is_none() {
                return Err(EngineError::InvalidDepositDenom(denom.clone()));
            }
        }

        self.bank
            .move_from_account_to_pool(owner, &coins)
            .map_err(EngineError::from_transfer)?;

        // commit
        self.seed_supply_indexes(&coins);
        deposit.credit(&coins, self.ledger.supply_indexes());
        let new_balance = deposit.amount.clone();
        self.ledger.set_deposit(deposit);
        if let Some(borrow) = borrow {
            self.ledger.set_borrow(borrow);
        }
        self.ledger.increment_total_supplied(&coins);

        tracing::info!(owner = %owner, amount = %coins, balance = %new_balance, "deposited");
        self.emit_event(EventPayload::Deposit(DepositEvent {
            depositor: owner,
            amount: coins,
            new_balance: new_balance.clone(),
        }));
        Ok(new_balance)
    }

    /// Pays `coins` out of the owner's deposit. The deposit record is removed
    /// once empty. Returns what is left.
    pub fn withdraw(&mut self, owner: AccountId, coins: Coins) -> Result<Coins, EngineError> {
        tracing::debug!(owner = %owner, amount = %coins, "withdraw");
        if coins.is_empty() {
            return Err(EngineError::EmptyCoins("withdraw"));
        }

        let mut deposit = self
            .synced_deposit(owner)?
            .ok_or(EngineError::DepositNotFound(owner))?;
        let borrow = self.synced_borrow(owner)?;

        let proposed = deposit.amount.checked_sub(&coins).map_err(|e| match e {
            CoinsError::Insufficient {
                denom,
                available,
                requested,
            } => EngineError::WithdrawExceedsDeposit {
                denom,
                available,
                requested,
            },
        })?;
        self.validate_withdraw(owner, &proposed, borrow.as_ref())?;
        self.check_pool_liquidity(&coins)?;

        self.bank
            .move_from_pool_to_account(owner, &coins)
            .map_err(EngineError::from_transfer)?;

        // commit
        self.ledger.decrement_total_supplied(&coins)?;
        deposit.amount = proposed;
        deposit.index.retain_held(&deposit.amount);
        let remaining = deposit.amount.clone();
        if remaining.is_empty() {
            self.ledger.delete_deposit(owner);
        } else {
            self.ledger.set_deposit(deposit);
        }
        if let Some(borrow) = borrow {
            self.ledger.set_borrow(borrow);
        }

        tracing::info!(owner = %owner, amount = %coins, balance = %remaining, "withdrawn");
        self.emit_event(EventPayload::Withdrawal(WithdrawalEvent {
            depositor: owner,
            amount: coins,
            new_balance: remaining.clone(),
        }));
        Ok(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::AuctionHouse;
    use crate::bank::InMemoryBank;
    use crate::config::LendingParams;
    use crate::engine::{EngineConfig, SimEngine};
    use crate::oracle::StaticPriceFeed;
    use crate::types::{Denom, MarketId, Price, Timestamp};
    use rust_decimal_macros::dec;

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    fn coins(d: &str, amount: u128) -> Coins {
        Coins::single(denom(d), amount)
    }

    fn setup_engine() -> SimEngine {
        let mut oracle = StaticPriceFeed::new();
        let t0 = Timestamp::from_secs(0);
        oracle.set_price(MarketId::new("usdx:usd"), Price::new(dec!(1)).unwrap(), t0);
        oracle.set_price(MarketId::new("kava:usd"), Price::new(dec!(2)).unwrap(), t0);
        let mut engine = SimEngine::new(
            EngineConfig::default(),
            LendingParams::development().unwrap(),
            InMemoryBank::new(),
            oracle,
            AuctionHouse::new(),
        )
        .unwrap();
        engine
            .bank_mut()
            .mint_to_account(AccountId(1), &coins("ukava", 1_000_000_000));
        engine
    }

    #[test]
    fn deposit_moves_funds_and_tracks_totals() {
        let mut engine = setup_engine();
        let balance = engine.deposit(AccountId(1), coins("ukava", 100_000_000)).unwrap();

        assert_eq!(balance, coins("ukava", 100_000_000));
        assert_eq!(engine.bank().pool_balance(&denom("ukava")), 100_000_000);
        assert_eq!(
            engine.ledger().total_supplied(),
            Some(&coins("ukava", 100_000_000))
        );
        let stored = engine.ledger().deposit(AccountId(1)).unwrap();
        assert_eq!(stored.index.get(&denom("ukava")), Some(dec!(1)));
    }

    #[test]
    fn deposit_rejects_unknown_denom_and_empty_amount() {
        let mut engine = setup_engine();
        assert_eq!(
            engine.deposit(AccountId(1), coins("btc", 5)),
            Err(EngineError::InvalidDepositDenom(denom("btc")))
        );
        assert_eq!(
            engine.deposit(AccountId(1), Coins::new()),
            Err(EngineError::EmptyCoins("deposit"))
        );
        assert!(engine.ledger().deposit(AccountId(1)).is_none());
    }

    #[test]
    fn deposit_without_funds_reports_shortfall() {
        let mut engine = setup_engine();
        let err = engine.deposit(AccountId(2), coins("ukava", 10)).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientFunds {
                owner: AccountId(2),
                denom: denom("ukava"),
                available: 0,
                requested: 10,
            }
        );
        assert!(engine.ledger().total_supplied().is_none());
    }

    #[test]
    fn full_withdraw_deletes_the_deposit() {
        let mut engine = setup_engine();
        engine.deposit(AccountId(1), coins("ukava", 50)).unwrap();

        let err = engine.withdraw(AccountId(1), coins("ukava", 51)).unwrap_err();
        assert!(matches!(err, EngineError::WithdrawExceedsDeposit { available: 50, .. }));

        let left = engine.withdraw(AccountId(1), coins("ukava", 50)).unwrap();
        assert!(left.is_empty());
        assert!(engine.ledger().deposit(AccountId(1)).is_none());
        assert_eq!(
            engine.bank().account_spendable_balance(AccountId(1), &denom("ukava")),
            1_000_000_000
        );
    }

    #[test]
    fn withdraw_may_not_break_the_borrow_ltv() {
        let mut engine = setup_engine();
        engine.bank_mut().fund_pool(&coins("usdx", 1_000_000_000));
        // $200 of collateral at 0.6 -> $120 borrowable
        engine.deposit(AccountId(1), coins("ukava", 100_000_000)).unwrap();
        engine.borrow(AccountId(1), coins("usdx", 100_000_000)).unwrap();

        // leaving $180 -> $108 borrowable
        engine.withdraw(AccountId(1), coins("ukava", 10_000_000)).unwrap();
        // leaving $160 -> $96 borrowable, below the $100 debt
        assert_eq!(
            engine.withdraw(AccountId(1), coins("ukava", 10_000_000)),
            Err(EngineError::InvalidWithdrawAmount(AccountId(1)))
        );
    }
}
