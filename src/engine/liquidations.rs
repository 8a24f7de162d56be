//! Liquidation of under-collateralized accounts.
//!
//! A liquidation is planned in full before anything moves: the agent reward is
//! skimmed from every collateral denom, the rest is valued in usd, and debt
//! buckets are matched against collateral buckets in sorted denom order. Only
//! then are the reward, the auction lots, and the refund paid out of the pool.

use super::core::Engine;
use super::results::{EngineError, LiquidationLot, LiquidationResult};
use crate::auction::{AuctionId, AuctionKeeper};
use crate::bank::BankKeeper;
use crate::coins::{Coin, Coins};
use crate::events::{
    AuctionStartedEvent, EventPayload, LiquidationEvent, PartialLiquidationEvent,
};
use crate::fixed_point::{FixedDec, FixedPointError};
use crate::ledger::InvariantViolation;
use crate::oracle::PriceOracle;
use crate::position::{Borrow, Deposit};
use crate::risk::{is_within_valid_ltv_range, LiquidationData, LiquidationDataMap, RiskError};
use crate::types::{AccountId, Denom};
use crate::valuation::{usd_value, ValuationMap};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn math(err: FixedPointError) -> EngineError {
    RiskError::Math(err).into()
}

fn fx(value: Decimal) -> Result<FixedDec, EngineError> {
    FixedDec::from_decimal(value).map_err(math)
}

fn dec(value: FixedDec) -> Result<Decimal, EngineError> {
    value.to_decimal().map_err(math)
}

fn data_for<'m>(
    data: &'m LiquidationDataMap,
    denom: &Denom,
) -> Result<&'m LiquidationData, EngineError> {
    data.get(denom)
        .ok_or_else(|| EngineError::MarketNotFound(denom.clone()))
}

#[derive(Debug, Clone)]
struct PlannedLot {
    lot: Coin,
    bid: Coin,
}

#[derive(Debug, Clone, Default)]
struct LiquidationPlan {
    reward: Coins,
    lots: Vec<PlannedLot>,
    refund: Coins,
    // collateral the pool could not cover; dropped with the deposit
    stranded: Coins,
    unmatched_debt: Coins,
    loan_to_value: Decimal,
}

// what a liquidation has paid out so far
#[derive(Debug)]
struct Progress {
    agent: AccountId,
    reward: Coins,
    dispatched: Vec<LiquidationLot>,
    lots_total: Coins,
    bids_total: Coins,
}

impl Progress {
    fn auction_ids(&self) -> Vec<AuctionId> {
        self.dispatched.iter().map(|l| l.auction_id).collect()
    }

    // collateral that has left the pool for the agent or an auction
    fn taken(&self) -> Coins {
        self.reward.plus(&self.lots_total)
    }
}

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    /// Seizes the owner's deposit and auctions it against their debt. Both
    /// records are deleted once every lot is dispatched.
    pub fn liquidate(
        &mut self,
        agent: AccountId,
        owner: AccountId,
    ) -> Result<LiquidationResult, EngineError> {
        tracing::debug!(agent = %agent, owner = %owner, "liquidate");

        let deposit = self
            .synced_deposit(owner)?
            .ok_or(EngineError::DepositNotFound(owner))?;
        let borrow = self
            .synced_borrow(owner)?
            .ok_or(EngineError::BorrowNotFound(owner))?;

        let data = self.load_data(&[&deposit.amount, &borrow.amount])?;
        if is_within_valid_ltv_range(&deposit.amount, &borrow.amount, &data)? {
            return Err(EngineError::NotLiquidatable(owner));
        }

        let plan = self.plan_liquidation(agent, &deposit, &borrow, &data)?;
        self.execute_liquidation(agent, owner, &deposit, &borrow, plan)
    }

    fn plan_liquidation(
        &self,
        agent: AccountId,
        deposit: &Deposit,
        borrow: &Borrow,
        data: &LiquidationDataMap,
    ) -> Result<LiquidationPlan, EngineError> {
        // reward skim; the protocol's own liquidator takes nothing
        let mut reward = Coins::new();
        if !agent.is_liquidator() {
            for (denom, amount) in deposit.amount.iter() {
                let market = self
                    .ledger
                    .registry
                    .get(denom)
                    .ok_or_else(|| EngineError::MarketNotFound(denom.clone()))?;
                let share = fx(market.liquidation_reward_pct)?
                    .mul_int(amount)
                    .and_then(|v| v.truncate_int())
                    .map_err(math)?;
                reward.add_amount(denom, share);
            }
        }

        let mut spendable: BTreeMap<Denom, u128> = BTreeMap::new();
        for (denom, requested) in reward.iter() {
            let available = self.bank.pool_balance(denom);
            if requested > available {
                return Err(EngineError::InsufficientPoolLiquidity {
                    denom: denom.clone(),
                    requested,
                    available,
                });
            }
        }
        for denom in deposit.amount.denoms() {
            let available = self
                .bank
                .pool_balance(denom)
                .saturating_sub(reward.amount_of(denom));
            spendable.insert(denom.clone(), available);
        }

        let mut collateral = deposit.amount.saturating_sub(&reward);
        let mut debt = borrow.amount.clone();

        let mut deposit_values = ValuationMap::new();
        for (denom, amount) in collateral.iter() {
            let d = data_for(data, denom)?;
            let value = usd_value(amount, d.conversion_factor, d.price).map_err(math)?;
            deposit_values.increment(denom, value);
        }
        let mut borrow_values = ValuationMap::new();
        for (denom, amount) in debt.iter() {
            let d = data_for(data, denom)?;
            let value = usd_value(amount, d.conversion_factor, d.price).map_err(math)?;
            borrow_values.increment(denom, value);
        }

        let deposit_sum = fx(deposit_values.sum())?;
        if deposit_sum.is_zero() {
            // nothing left to auction; the debt is written off
            return Ok(LiquidationPlan {
                reward,
                unmatched_debt: debt,
                ..LiquidationPlan::default()
            });
        }
        let ltv = fx(borrow_values.sum())?.quo(&deposit_sum).map_err(math)?;

        let mut lots = Vec::new();
        let deposit_keys = deposit_values.sorted_keys();
        for b_key in borrow_values.sorted_keys() {
            let b_data = data_for(data, &b_key)?;
            let mut max_lot = fx(borrow_values.get(&b_key))?.quo(&ltv).map_err(math)?;

            for d_key in &deposit_keys {
                if max_lot.is_zero() {
                    break;
                }
                let d_data = data_for(data, d_key)?;
                let d_value = fx(deposit_values.get(d_key))?;
                let available = spendable.get(d_key).copied().unwrap_or(0);

                if d_value >= max_lot {
                    // this collateral clears the whole debt bucket
                    let bid = debt.amount_of(&b_key);
                    let lot = max_lot
                        .mul_int(d_data.conversion_factor)
                        .and_then(|v| v.quo(&FixedDec::from_decimal(d_data.price.value())?))
                        .and_then(|v| v.truncate_int())
                        .map_err(math)?
                        .min(available);
                    if lot == 0 {
                        continue;
                    }
                    let held = collateral.amount_of(d_key);
                    if held < lot {
                        return Err(EngineError::InsufficientCollateral {
                            denom: d_key.clone(),
                            available: held,
                            requested: lot,
                        });
                    }

                    lots.push(PlannedLot {
                        lot: Coin::new(d_key.clone(), lot),
                        bid: Coin::new(b_key.clone(), bid),
                    });
                    borrow_values.set_zero(&b_key);
                    deposit_values.decrement(d_key, dec(max_lot)?);
                    debt.set_amount(&b_key, 0);
                    collateral.set_amount(d_key, held - lot);
                    spendable.insert(d_key.clone(), available - lot);
                    max_lot = FixedDec::ZERO;
                } else {
                    // the whole collateral bucket goes against part of the debt
                    let max_bid = d_value.mul(&ltv).map_err(math)?;
                    let bid = max_bid
                        .mul_int(b_data.conversion_factor)
                        .and_then(|v| v.quo(&FixedDec::from_decimal(b_data.price.value())?))
                        .and_then(|v| v.truncate_int())
                        .map_err(math)?
                        .min(debt.amount_of(&b_key));
                    let held = collateral.amount_of(d_key);
                    let lot = held.min(available);
                    if bid == 0 || lot == 0 {
                        continue;
                    }

                    lots.push(PlannedLot {
                        lot: Coin::new(d_key.clone(), lot),
                        bid: Coin::new(b_key.clone(), bid),
                    });
                    borrow_values.decrement(&b_key, dec(max_bid)?);
                    deposit_values.set_zero(d_key);
                    debt.set_amount(&b_key, debt.amount_of(&b_key) - bid);
                    collateral.set_amount(d_key, held - lot);
                    spendable.insert(d_key.clone(), available - lot);
                    max_lot = fx(borrow_values.get(&b_key))?.quo(&ltv).map_err(math)?;
                    if max_lot.is_negative() {
                        max_lot = FixedDec::ZERO;
                    }
                }
            }
        }

        // leftover collateral goes back to the owner, as far as the pool holds it
        let mut refund = Coins::new();
        let mut stranded = Coins::new();
        for (denom, amount) in collateral.iter() {
            let available = spendable.get(denom).copied().unwrap_or(0);
            refund.add_amount(denom, amount.min(available));
            stranded.add_amount(denom, amount.saturating_sub(available));
        }

        Ok(LiquidationPlan {
            reward,
            lots,
            refund,
            stranded,
            unmatched_debt: debt,
            loan_to_value: dec(ltv)?,
        })
    }

    fn execute_liquidation(
        &mut self,
        agent: AccountId,
        owner: AccountId,
        deposit: &Deposit,
        borrow: &Borrow,
        plan: LiquidationPlan,
    ) -> Result<LiquidationResult, EngineError> {
        if !plan.reward.is_empty() {
            self.bank
                .move_from_pool_to_account(agent, &plan.reward)
                .map_err(EngineError::from_transfer)?;
            self.ledger.decrement_total_supplied(&plan.reward)?;
        }

        let mut progress = Progress {
            agent,
            reward: plan.reward.clone(),
            dispatched: Vec::with_capacity(plan.lots.len()),
            lots_total: Coins::new(),
            bids_total: Coins::new(),
        };
        for planned in plan.lots {
            let lot_coins = Coins::single(planned.lot.denom.clone(), planned.lot.amount);
            if let Err(err) = self
                .bank
                .move_from_pool_to_account(AccountId::LIQUIDATOR, &lot_coins)
            {
                let err = EngineError::from_transfer(err);
                return Err(self.abort_liquidation(owner, deposit, borrow, &progress, None, err));
            }

            let started = self.auctions.start_collateral_auction(
                AccountId::LIQUIDATOR,
                planned.lot.clone(),
                planned.bid.clone(),
                vec![owner],
                vec![100],
                Coin::new(Denom::debt_marker(), 0),
            );
            let auction_id = match started {
                Ok(id) => id,
                Err(source) => {
                    let err = EngineError::Auction {
                        completed: progress.auction_ids(),
                        source,
                    };
                    let in_flight = Some(&lot_coins);
                    return Err(self.abort_liquidation(
                        owner, deposit, borrow, &progress, in_flight, err,
                    ));
                }
            };

            // totals drop as each lot leaves
            let bid_coins = Coins::single(planned.bid.denom.clone(), planned.bid.amount);
            self.ledger.decrement_total_supplied(&lot_coins)?;
            self.ledger.decrement_total_borrowed(&bid_coins)?;
            progress.lots_total.add(&lot_coins);
            progress.bids_total.add(&bid_coins);

            tracing::debug!(
                owner = %owner,
                auction_id = %auction_id,
                lot = %planned.lot,
                bid = %planned.bid,
                "collateral auction started"
            );
            self.emit_event(EventPayload::AuctionStarted(AuctionStartedEvent {
                auction_id,
                owner,
                lot: planned.lot.clone(),
                max_bid: planned.bid.clone(),
            }));
            progress.dispatched.push(LiquidationLot {
                auction_id,
                lot: planned.lot,
                bid: planned.bid,
            });
        }

        if !plan.refund.is_empty() {
            if let Err(err) = self.bank.move_from_pool_to_account(owner, &plan.refund) {
                let err = EngineError::from_transfer(err);
                return Err(self.abort_liquidation(owner, deposit, borrow, &progress, None, err));
            }
        }

        // whatever was not auctioned leaves the totals with the records
        let taken = progress.taken();
        self.ledger
            .decrement_total_supplied(&deposit.amount.saturating_sub(&taken))?;
        self.ledger
            .decrement_total_borrowed(&borrow.amount.saturating_sub(&progress.bids_total))?;
        self.ledger.delete_deposit(owner);
        self.ledger.delete_borrow(owner);

        if !plan.unmatched_debt.is_empty() {
            tracing::warn!(
                owner = %owner,
                debt = %plan.unmatched_debt,
                "liquidation left debt unmatched"
            );
        }
        if !plan.stranded.is_empty() {
            tracing::warn!(
                owner = %owner,
                collateral = %plan.stranded,
                "pool could not return collateral"
            );
        }
        tracing::info!(
            owner = %owner,
            agent = %agent,
            reward = %plan.reward,
            auctions = progress.dispatched.len(),
            refunded = %plan.refund,
            ltv = %plan.loan_to_value,
            "liquidated"
        );

        self.emit_event(EventPayload::Liquidation(LiquidationEvent {
            owner,
            agent,
            reward: plan.reward.clone(),
            auctions: progress.auction_ids(),
            refunded: plan.refund.clone(),
        }));

        Ok(LiquidationResult {
            owner,
            agent,
            reward: plan.reward,
            lots: progress.dispatched,
            refunded: plan.refund,
            unmatched_debt: plan.unmatched_debt,
            loan_to_value: plan.loan_to_value,
        })
    }

    // started auctions stay started. the lot that never reached an auction goes
    // back to the pool, and the records shrink by what already left so the next
    // attempt only sees collateral the pool still holds.
    fn abort_liquidation(
        &mut self,
        owner: AccountId,
        deposit: &Deposit,
        borrow: &Borrow,
        progress: &Progress,
        in_flight: Option<&Coins>,
        err: EngineError,
    ) -> EngineError {
        if let Some(lot) = in_flight {
            if let Err(source) = self
                .bank
                .move_from_account_to_pool(AccountId::LIQUIDATOR, lot)
            {
                tracing::error!(owner = %owner, lot = %lot, error = %source, "lot stuck");
                return InvariantViolation::LiquidationUnwind { owner, source }.into();
            }
        }

        let mut remaining_deposit = deposit.clone();
        remaining_deposit.amount = deposit.amount.saturating_sub(&progress.taken());
        remaining_deposit.index.retain_held(&remaining_deposit.amount);
        if remaining_deposit.amount.is_empty() {
            self.ledger.delete_deposit(owner);
        } else {
            self.ledger.set_deposit(remaining_deposit);
        }

        let mut remaining_borrow = borrow.clone();
        remaining_borrow.amount = borrow.amount.saturating_sub(&progress.bids_total);
        remaining_borrow.index.retain_held(&remaining_borrow.amount);
        if remaining_borrow.amount.is_empty() {
            self.ledger.delete_borrow(owner);
        } else {
            self.ledger.set_borrow(remaining_borrow);
        }

        let completed = progress.auction_ids();
        tracing::warn!(
            owner = %owner,
            agent = %progress.agent,
            completed = completed.len(),
            error = %err,
            "partial liquidation"
        );
        self.emit_event(EventPayload::PartialLiquidation(PartialLiquidationEvent {
            owner,
            agent: progress.agent,
            completed,
            reason: err.to_string(),
        }));
        err
    }

    /// Liquidates the riskiest borrowers by stored loan-to-value, with the
    /// protocol liquidator as agent. Recoverable failures are returned, not raised.
    pub fn attempt_index_liquidations(
        &mut self,
    ) -> Result<(Vec<LiquidationResult>, Vec<(AccountId, EngineError)>), EngineError> {
        let owners: Vec<AccountId> = self.ledger.borrows().map(|b| b.borrower).collect();
        let mut ranked = Vec::with_capacity(owners.len());
        for owner in owners {
            // unpriceable positions rank last
            let ltv = self.store_loan_to_value(owner).unwrap_or(Decimal::ZERO);
            ranked.push((ltv, owner));
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut liquidated = Vec::new();
        let mut skipped = Vec::new();
        for (_, owner) in ranked.into_iter().take(self.params.check_ltv_index_count) {
            match self.liquidate(AccountId::LIQUIDATOR, owner) {
                Ok(result) => liquidated.push(result),
                Err(EngineError::NotLiquidatable(_)) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    tracing::warn!(owner = %owner, error = %err, "index liquidation skipped");
                    skipped.push((owner, err));
                }
            }
        }
        Ok((liquidated, skipped))
    }
}
