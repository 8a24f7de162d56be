// 9.2 bank.rs: balance transfer service between accounts and the lending pool.
// the engine only ever talks to the trait; InMemoryBank is the deterministic
// version used by tests and the simulator. no real token transfers.

use crate::coins::Coins;
use crate::types::{AccountId, Denom};
use std::collections::BTreeMap;
use std::fmt;

/// Who a balance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    Pool,
    Account(AccountId),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Pool => f.write_str("pool"),
            Holder::Account(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    #[error("{holder} has insufficient {denom}: available {available}, requested {requested}")]
    InsufficientFunds {
        holder: Holder,
        denom: Denom,
        available: u128,
        requested: u128,
    },

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

// Trait for balance transfer backends. Transfers are all-or-nothing.
pub trait BankKeeper {
    fn move_from_account_to_pool(&mut self, owner: AccountId, coins: &Coins)
        -> Result<(), BankError>;

    fn move_from_pool_to_account(&mut self, owner: AccountId, coins: &Coins)
        -> Result<(), BankError>;

    fn pool_balance(&self, denom: &Denom) -> u128;

    fn account_spendable_balance(&self, owner: AccountId, denom: &Denom) -> u128;
}

// In-memory bank for testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryBank {
    accounts: BTreeMap<AccountId, Coins>,
    pool: Coins,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint_to_account(&mut self, owner: AccountId, coins: &Coins) {
        self.accounts.entry(owner).or_default().add(coins);
    }

    pub fn fund_pool(&mut self, coins: &Coins) {
        self.pool.add(coins);
    }

    pub fn account_balance(&self, owner: AccountId) -> Coins {
        self.accounts.get(&owner).cloned().unwrap_or_default()
    }

    pub fn pool_coins(&self) -> &Coins {
        &self.pool
    }

    pub fn total_supply(&self, denom: &Denom) -> u128 {
        self.accounts
            .values()
            .map(|c| c.amount_of(denom))
            .sum::<u128>()
            + self.pool.amount_of(denom)
    }
}

fn debit(balance: &Coins, holder: Holder, coins: &Coins) -> Result<Coins, BankError> {
    balance.checked_sub(coins).map_err(|e| match e {
        crate::coins::CoinsError::Insufficient {
            denom,
            available,
            requested,
        } => BankError::InsufficientFunds {
            holder,
            denom,
            available,
            requested,
        },
    })
}

impl BankKeeper for InMemoryBank {
    fn move_from_account_to_pool(
        &mut self,
        owner: AccountId,
        coins: &Coins,
    ) -> Result<(), BankError> {
        let balance = self.account_balance(owner);
        let remaining = debit(&balance, Holder::Account(owner), coins)?;
        self.accounts.insert(owner, remaining);
        self.pool.add(coins);
        Ok(())
    }

    fn move_from_pool_to_account(
        &mut self,
        owner: AccountId,
        coins: &Coins,
    ) -> Result<(), BankError> {
        self.pool = debit(&self.pool, Holder::Pool, coins)?;
        self.accounts.entry(owner).or_default().add(coins);
        Ok(())
    }

    fn pool_balance(&self, denom: &Denom) -> u128 {
        self.pool.amount_of(denom)
    }

    fn account_spendable_balance(&self, owner: AccountId, denom: &Denom) -> u128 {
        self.accounts
            .get(&owner)
            .map(|c| c.amount_of(denom))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bnb(amount: u128) -> Coins {
        Coins::single(Denom::new("bnb").unwrap(), amount)
    }

    #[test]
    fn test_round_trip_transfer() {
        let mut bank = InMemoryBank::new();
        let alice = AccountId(1);
        bank.mint_to_account(alice, &bnb(100));

        bank.move_from_account_to_pool(alice, &bnb(60)).unwrap();
        assert_eq!(bank.pool_balance(&Denom::new("bnb").unwrap()), 60);
        assert_eq!(bank.account_spendable_balance(alice, &Denom::new("bnb").unwrap()), 40);

        bank.move_from_pool_to_account(alice, &bnb(10)).unwrap();
        assert_eq!(bank.account_balance(alice), bnb(50));
        assert_eq!(bank.total_supply(&Denom::new("bnb").unwrap()), 100);
    }

    #[test]
    fn test_insufficient_funds_reports_available() {
        let mut bank = InMemoryBank::new();
        let alice = AccountId(1);
        bank.mint_to_account(alice, &bnb(5));

        let err = bank.move_from_account_to_pool(alice, &bnb(6)).unwrap_err();
        assert_eq!(
            err,
            BankError::InsufficientFunds {
                holder: Holder::Account(alice),
                denom: Denom::new("bnb").unwrap(),
                available: 5,
                requested: 6,
            }
        );
        // nothing moved
        assert_eq!(bank.account_balance(alice), bnb(5));
        assert!(bank.pool_coins().is_empty());
    }

    #[test]
    fn test_pool_shortfall() {
        let mut bank = InMemoryBank::new();
        bank.fund_pool(&bnb(3));
        let err = bank.move_from_pool_to_account(AccountId(2), &bnb(4)).unwrap_err();
        assert!(matches!(
            err,
            BankError::InsufficientFunds { holder: Holder::Pool, available: 3, .. }
        ));
    }
}
