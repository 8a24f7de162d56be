// 8.2 engine/accrual.rs: per-block entry point and interest accrual.
// 8.2.1 begin_block: accrue every market, then sweep the riskiest borrowers.

use super::core::Engine;
use super::results::{AccrualResult, BlockResult, EngineError, InterestUpdateResult};
use crate::auction::AuctionKeeper;
use crate::bank::BankKeeper;
use crate::coins::Coins;
use crate::events::{EventPayload, InterestAccruedEvent, MoneyMarketEvent};
use crate::interest::{compute_accrual, AccrualInputs};
use crate::ledger::InvariantViolation;
use crate::oracle::PriceOracle;
use crate::types::{Denom, Timestamp};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

impl<B: BankKeeper, O: PriceOracle, A: AuctionKeeper> Engine<B, O, A> {
    pub fn begin_block(&mut self, time: Timestamp) -> Result<BlockResult, EngineError> {
        tracing::debug!(block_time = %time, "begin block");
        self.set_block_time(time);

        let interest = self.apply_interest_rate_updates()?;
        let (liquidations, skipped) = self.attempt_index_liquidations()?;

        Ok(BlockResult {
            time,
            interest,
            liquidations,
            skipped,
        })
    }

    /// Brings stored money markets in line with governance parameters, accruing
    /// each one under the parameters it was stored with.
    pub fn apply_interest_rate_updates(&mut self) -> Result<InterestUpdateResult, EngineError> {
        let mut result = InterestUpdateResult::default();
        let mut in_params = BTreeSet::new();

        let markets = self.params.money_markets.clone();
        for market in markets {
            let denom = market.denom.clone();
            let stored = match self.ledger.registry.get(&denom) {
                Some(stored) => stored.clone(),
                None => {
                    self.ledger.registry.set(&denom, market.clone())?;
                    result.added.push(denom.clone());
                    self.emit_event(EventPayload::MoneyMarketAdded(MoneyMarketEvent {
                        denom: denom.clone(),
                    }));
                    market.clone()
                }
            };

            if let Some(accrual) = self.accrue_interest(&denom)? {
                result.accruals.push(accrual);
            }

            if stored != market {
                self.ledger.registry.set(&denom, market)?;
                result.updated.push(denom.clone());
                self.emit_event(EventPayload::MoneyMarketUpdated(MoneyMarketEvent {
                    denom: denom.clone(),
                }));
            }
            in_params.insert(denom);
        }

        // markets dropped from params accrue one last time before removal
        let stale: Vec<Denom> = self
            .ledger
            .registry
            .denoms()
            .into_iter()
            .filter(|d| !in_params.contains(d))
            .collect();
        for denom in stale {
            if let Some(accrual) = self.accrue_interest(&denom)? {
                result.accruals.push(accrual);
            }
            self.ledger.registry.delete(&denom);
            tracing::info!(denom = %denom, "money market removed");
            self.emit_event(EventPayload::MoneyMarketRemoved(MoneyMarketEvent {
                denom: denom.clone(),
            }));
            result.removed.push(denom);
        }

        Ok(result)
    }

    /// Advances one denom's indexes, totals, and reserves to the block time.
    /// Returns None when nothing accrued (first sighting or zero elapsed).
    pub fn accrue_interest(&mut self, denom: &Denom) -> Result<Option<AccrualResult>, EngineError> {
        let now = self.current_time;
        let Some(previous) = self.ledger.previous_accrual_time(denom) else {
            self.ledger.set_previous_accrual_time(denom, now);
            return Ok(None);
        };

        let elapsed = now.seconds_since(previous);
        if elapsed < 0 {
            return Err(InvariantViolation::AccrualTimeAhead {
                denom: denom.clone(),
                previous,
                block: now,
            }
            .into());
        }
        if elapsed == 0 {
            return Ok(None);
        }

        let market = self
            .ledger
            .registry
            .get(denom)
            .cloned()
            .ok_or_else(|| EngineError::MarketNotFound(denom.clone()))?;

        let inputs = AccrualInputs {
            cash: self.bank.pool_balance(denom),
            borrowed: self
                .ledger
                .total_borrowed()
                .map(|c| c.amount_of(denom))
                .unwrap_or(0),
            supplied: self
                .ledger
                .total_supplied()
                .map(|c| c.amount_of(denom))
                .unwrap_or(0),
            reserves: self.ledger.total_reserves().amount_of(denom),
            borrow_index: self.ledger.borrow_index(denom).unwrap_or(Decimal::ONE),
            supply_index: self.ledger.supply_index(denom).unwrap_or(Decimal::ONE),
        };

        let seconds = elapsed as u64;
        let outcome = compute_accrual(&market, &inputs, seconds).map_err(|source| {
            InvariantViolation::AccrualFailed {
                denom: denom.clone(),
                source,
            }
        })?;

        // 8.2.2: commit
        self.ledger.set_borrow_index(denom, outcome.borrow_index);
        self.ledger.set_supply_index(denom, outcome.supply_index);
        self.ledger
            .increment_total_borrowed(&Coins::single(denom.clone(), outcome.borrow_interest));
        self.ledger
            .increment_total_supplied(&Coins::single(denom.clone(), outcome.supply_interest));
        let mut reserves = self.ledger.total_reserves().clone();
        reserves.add_amount(denom, outcome.reserves_delta);
        self.ledger.set_total_reserves(reserves);
        self.ledger.set_previous_accrual_time(denom, now);

        tracing::debug!(
            denom = %denom,
            seconds,
            utilization = %outcome.utilization,
            borrow_apy = %outcome.borrow_rate_apy,
            borrow_interest = outcome.borrow_interest,
            reserves_delta = outcome.reserves_delta,
            "interest accrued"
        );

        self.emit_event(EventPayload::InterestAccrued(InterestAccruedEvent {
            denom: denom.clone(),
            seconds_elapsed: seconds,
            borrow_interest: outcome.borrow_interest,
            supply_interest: outcome.supply_interest,
            reserves_delta: outcome.reserves_delta,
            borrow_index: outcome.borrow_index,
            supply_index: outcome.supply_index,
        }));

        Ok(Some(AccrualResult {
            denom: denom.clone(),
            seconds_elapsed: seconds,
            borrow_interest: outcome.borrow_interest,
            supply_interest: outcome.supply_interest,
            reserves_delta: outcome.reserves_delta,
            borrow_index: outcome.borrow_index,
            supply_index: outcome.supply_index,
        }))
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
    use crate::types::{AccountId, MarketId, Price};
    use rust_decimal_macros::dec;

    const YEAR: i64 = 365 * 24 * 60 * 60;
    const LENDER: AccountId = AccountId(100);
    const ALICE: AccountId = AccountId(1);

    fn denom(s: &str) -> Denom {
        Denom::new(s).unwrap()
    }

    fn coins(d: &str, amount: u128) -> Coins {
        Coins::single(denom(d), amount)
    }

    fn post_prices(engine: &mut SimEngine) {
        let now = engine.time();
        let feed = engine.oracle_mut();
        feed.set_price(MarketId::new("usdx:usd"), Price::new(dec!(1)).unwrap(), now);
        feed.set_price(MarketId::new("kava:usd"), Price::new(dec!(2)).unwrap(), now);
    }

    // lender supplies 1000 usdx, alice borrows 100 of it against 100 kava
    fn setup_engine() -> SimEngine {
        let mut engine = SimEngine::new(
            EngineConfig::default(),
            LendingParams::development().unwrap(),
            InMemoryBank::new(),
            StaticPriceFeed::new(),
            AuctionHouse::new(),
        )
        .unwrap();
        post_prices(&mut engine);
        engine.begin_block(Timestamp::from_secs(0)).unwrap();

        engine.bank_mut().mint_to_account(LENDER, &coins("usdx", 1_000_000_000));
        engine.bank_mut().mint_to_account(ALICE, &coins("ukava", 100_000_000));
        engine.deposit(LENDER, coins("usdx", 1_000_000_000)).unwrap();
        engine.deposit(ALICE, coins("ukava", 100_000_000)).unwrap();
        engine.borrow(ALICE, coins("usdx", 100_000_000)).unwrap();
        engine
    }

    #[test]
    fn first_sighting_only_records_the_time() {
        let mut engine = SimEngine::new(
            EngineConfig::default(),
            LendingParams::development().unwrap(),
            InMemoryBank::new(),
            StaticPriceFeed::new(),
            AuctionHouse::new(),
        )
        .unwrap();
        engine.set_block_time(Timestamp::from_secs(50));

        let result = engine.apply_interest_rate_updates().unwrap();
        assert!(result.accruals.is_empty());
        assert!(result.added.is_empty());
        assert_eq!(
            engine.ledger().previous_accrual_time(&denom("usdx")),
            Some(Timestamp::from_secs(50))
        );
        assert_eq!(engine.ledger().borrow_index(&denom("usdx")), None);
    }

    #[test]
    fn a_year_of_interest_reaches_totals_and_reserves() {
        let mut engine = setup_engine();
        engine.set_block_time(Timestamp::from_secs(YEAR));

        let result = engine.apply_interest_rate_updates().unwrap();
        let usdx = result
            .accruals
            .iter()
            .find(|a| a.denom == denom("usdx"))
            .unwrap();

        // 10% utilization on the stable curve: 0.05 + 0.1 * 2 = 25% apy
        assert!(usdx.borrow_interest > 24_900_000 && usdx.borrow_interest < 25_100_000);
        assert!(usdx.borrow_index > dec!(1.249) && usdx.borrow_index < dec!(1.251));
        assert!(usdx.supply_index > Decimal::ONE);
        assert_eq!(
            engine.ledger().total_borrowed().unwrap().amount_of(&denom("usdx")),
            100_000_000 + usdx.borrow_interest
        );
        let expected_reserves = usdx.borrow_interest / 20;
        assert_eq!(
            engine.ledger().total_reserves().amount_of(&denom("usdx")),
            expected_reserves
        );
    }

    #[test]
    fn second_accrual_in_the_same_block_is_a_no_op() {
        let mut engine = setup_engine();
        engine.set_block_time(Timestamp::from_secs(600));
        engine.apply_interest_rate_updates().unwrap();
        let after_first = engine.ledger().clone();

        let again = engine.apply_interest_rate_updates().unwrap();
        assert!(again.accruals.is_empty());
        assert_eq!(engine.ledger(), &after_first);
    }

    #[test]
    fn changed_params_replace_the_stored_market_after_accruing() {
        let mut engine = setup_engine();
        let mut params = engine.params().clone();
        for market in &mut params.money_markets {
            if market.denom == denom("usdx") {
                market.reserve_factor = dec!(0.5);
            }
        }
        engine.set_params(params).unwrap();
        engine.set_block_time(Timestamp::from_secs(YEAR));

        let result = engine.apply_interest_rate_updates().unwrap();
        assert_eq!(result.updated, vec![denom("usdx")]);
        let usdx = result
            .accruals
            .iter()
            .find(|a| a.denom == denom("usdx"))
            .unwrap();
        // the year ran under the old 5% reserve factor
        assert_eq!(usdx.reserves_delta, usdx.borrow_interest / 20);
        assert_eq!(
            engine.ledger().registry().get(&denom("usdx")).unwrap().reserve_factor,
            dec!(0.5)
        );
    }

    #[test]
    fn accrual_time_ahead_of_the_block_is_fatal() {
        let mut engine = setup_engine();
        engine
            .ledger
            .set_previous_accrual_time(&denom("usdx"), Timestamp::from_secs(1_000));

        let err = engine.accrue_interest(&denom("usdx")).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            EngineError::Invariant(InvariantViolation::AccrualTimeAhead { .. })
        ));
    }
}
