//! Borrowing against deposits and repaying.

use super::core::Engine;
use super::results::EngineError;
use crate::auction::AuctionKeeper;
use crate::bank::BankKeeper;
use crate::coins::Coins;
use crate::events::{BorrowEvent, EventPayload, RepayEvent};
use crate::oracle::PriceOracle;
use crate::position::Borrow;
use crate::types::AccountId;

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    /// Pays `coins` out of the pool against the owner's deposit. Returns the new
    /// borrow balance.
    pub fn borrow(&mut self, owner: AccountId, coins: Coins) -> Result<Coins, EngineError> {
        tracing::debug!(owner = %owner, amount = %coins, "borrow");

        let deposit = self.synced_deposit(owner)?;
        let borrow = self.synced_borrow(owner)?;
        self.validate_borrow(owner, deposit.as_ref(), borrow.as_ref(), &coins)?;
        self.check_pool_liquidity(&coins)?;

        self.bank
            .move_from_pool_to_account(owner, &coins)
            .map_err(EngineError::from_transfer)?;

        // commit
        self.seed_borrow_indexes(&coins);
        let mut borrow = borrow.unwrap_or_else(|| Borrow::new(owner));
        borrow.credit(&coins, self.ledger.borrow_indexes());
        let new_balance = borrow.amount.clone();
        self.ledger.set_borrow(borrow);
        if let Some(deposit) = deposit {
            self.ledger.set_deposit(deposit);
        }
        self.ledger.increment_total_borrowed(&coins);

        tracing::info!(owner = %owner, amount = %coins, balance = %new_balance, "borrowed");
        self.emit_event(EventPayload::Borrow(BorrowEvent {
            borrower: owner,
            amount: coins,
            new_balance: new_balance.clone(),
        }));
        Ok(new_balance)
    }

    /// Repays the owner's debt from `sender`'s balance. Payments above the debt
    /// are clamped to it. Returns the remaining debt.
    pub fn repay(
        &mut self,
        sender: AccountId,
        owner: AccountId,
        coins: Coins,
    ) -> Result<Coins, EngineError> {
        tracing::debug!(sender = %sender, owner = %owner, amount = %coins, "repay");
        if coins.is_empty() {
            return Err(EngineError::EmptyCoins("repay"));
        }

        let mut borrow = self
            .synced_borrow(owner)?
            .ok_or(EngineError::BorrowNotFound(owner))?;
        let deposit = self.synced_deposit(owner)?;

        let mut payment = Coins::new();
        for (denom, amount) in coins.iter() {
            let owed = borrow.amount.amount_of(denom);
            if owed == 0 {
                return Err(EngineError::InvalidRepaymentDenom(denom.clone()));
            }
            payment.add_amount(denom, amount.min(owed));
        }

        for (denom, requested) in payment.iter() {
            let available = self.bank.account_spendable_balance(sender, denom);
            if available < requested {
                return Err(EngineError::InsufficientFunds {
                    owner: sender,
                    denom: denom.clone(),
                    available,
                    requested,
                });
            }
        }

        let remaining = borrow.amount.saturating_sub(&payment);
        self.validate_remaining_borrow(&remaining)?;

        self.bank
            .move_from_account_to_pool(sender, &payment)
            .map_err(EngineError::from_transfer)?;

        // commit
        self.ledger.decrement_total_borrowed(&payment)?;
        borrow.amount = remaining.clone();
        borrow.index.retain_held(&borrow.amount);
        if remaining.is_empty() {
            self.ledger.delete_borrow(owner);
        } else {
            self.ledger.set_borrow(borrow);
        }
        if let Some(deposit) = deposit {
            self.ledger.set_deposit(deposit);
        }

        tracing::info!(
            sender = %sender,
            owner = %owner,
            amount = %payment,
            remaining = %remaining,
            "repaid"
        );
        self.emit_event(EventPayload::Repay(RepayEvent {
            sender,
            owner,
            amount: payment,
            remaining: remaining.clone(),
        }));
        Ok(remaining)
    }
}
