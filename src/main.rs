//! Lending core simulation.
//!
//! Walks the protocol through its main flows: rate curve, borrow limits,
//! interest pushing a position under water, liquidation, block-level index
//! liquidation, and a ledger snapshot round trip.

use lending_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type SimResult = Result<(), Box<dyn Error>>;

const YEAR: i64 = 365 * 24 * 60 * 60;

fn main() -> SimResult {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lending_core=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("Lending Core Simulation");
    println!("Money markets, indexed interest, collateral auctions\n");

    scenario_1_rate_curve()?;
    scenario_2_borrow_limit()?;
    scenario_3_interest_to_liquidation()?;
    scenario_4_keeper_liquidation()?;
    scenario_5_index_liquidation()?;
    scenario_6_snapshot_round_trip()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn denom(s: &str) -> Result<Denom, DenomError> {
    Denom::new(s)
}

fn coins(d: &str, amount: u128) -> Result<Coins, DenomError> {
    Ok(Coins::single(denom(d)?, amount))
}

fn post_price(engine: &mut SimEngine, market: &str, price: Decimal) -> SimResult {
    let price = Price::new(price).ok_or("price must be positive")?;
    let now = engine.time();
    engine.oracle_mut().set_price(MarketId::new(market), price, now);
    Ok(())
}

fn dev_engine() -> Result<SimEngine, Box<dyn Error>> {
    let mut engine = SimEngine::new(
        EngineConfig::default(),
        LendingParams::development()?,
        InMemoryBank::new(),
        StaticPriceFeed::new(),
        AuctionHouse::new(),
    )?;
    post_price(&mut engine, "usdx:usd", dec!(1))?;
    post_price(&mut engine, "kava:usd", dec!(2))?;
    post_price(&mut engine, "bnb:usd", dec!(300))?;
    engine.begin_block(Timestamp::from_secs(0))?;
    Ok(engine)
}

/// Borrow rate at 20% utilization on a zero-base curve.
fn scenario_1_rate_curve() -> SimResult {
    println!("Scenario 1: Interest Rate Curve\n");

    let model = InterestRateModel::new(dec!(0), dec!(0.1), dec!(0.8), dec!(0.5));
    let utilization = calculate_utilization_ratio(dec!(5000), dec!(1000), dec!(1000))?;
    let apy = calculate_borrow_rate(&model, dec!(5000), dec!(1000), dec!(1000))?;
    let spy = apy_to_spy(apy)?;

    println!("  cash 5000, borrows 1000, reserves 1000");
    println!("  utilization: {}", utilization);
    println!("  borrow APY:  {}", apy);
    println!("  per-second:  {}\n", spy);
    Ok(())
}

/// $200 of collateral at 0.6 ltv supports exactly $120 of debt.
fn scenario_2_borrow_limit() -> SimResult {
    println!("Scenario 2: Borrow Limit\n");

    let mut engine = dev_engine()?;
    let alice = AccountId(1);
    engine.bank_mut().mint_to_account(alice, &coins("ukava", 100_000_000)?);
    engine.bank_mut().fund_pool(&coins("usdx", 1_000_000_000)?);

    engine.deposit(alice, coins("ukava", 100_000_000)?)?;
    println!("  Alice deposits 100 KAVA @ $2 (ltv 0.6)");

    match engine.borrow(alice, coins("usdx", 121_000_000)?) {
        Ok(_) => println!("  borrow 121 USDX: unexpectedly accepted"),
        Err(err) => println!("  borrow 121 USDX rejected: {}", err),
    }
    let balance = engine.borrow(alice, coins("usdx", 120_000_000)?)?;
    println!("  borrow 120 USDX accepted, debt {}", balance);
    println!("  loan-to-value: {}\n", engine.loan_to_value(alice)?);
    Ok(())
}

/// A year of 100%+ APY doubles the debt and breaks the ltv.
fn scenario_3_interest_to_liquidation() -> SimResult {
    println!("Scenario 3: Interest Accrual Into Liquidation\n");

    let collateral = MoneyMarket::new(
        denom("ukava")?,
        BorrowLimit::uncapped(dec!(0.6)),
        MarketId::new("kava:usd"),
        1_000_000,
        InterestRateModel::new(dec!(0), dec!(0.1), dec!(0.8), dec!(0.5)),
        dec!(0.05),
        dec!(0.05),
    );
    let expensive = MoneyMarket::new(
        denom("hard")?,
        BorrowLimit::uncapped(dec!(0.5)),
        MarketId::new("hard:usd"),
        1_000_000,
        InterestRateModel::new(dec!(1), dec!(0.1), dec!(0.8), dec!(0.5)),
        dec!(0.05),
        dec!(0.05),
    );
    let params = LendingParams::new(vec![collateral, expensive], dec!(10), 10);
    let mut engine = SimEngine::new(
        EngineConfig::default(),
        params,
        InMemoryBank::new(),
        StaticPriceFeed::new(),
        AuctionHouse::new(),
    )?;
    post_price(&mut engine, "kava:usd", dec!(5))?;
    post_price(&mut engine, "hard:usd", dec!(5))?;
    engine.apply_interest_rate_updates()?;

    let (alice, bob) = (AccountId(1), AccountId(2));
    engine.bank_mut().mint_to_account(alice, &coins("ukava", 20_000_000)?);
    engine.bank_mut().mint_to_account(bob, &coins("hard", 1_000_000_000)?);
    engine.deposit(bob, coins("hard", 1_000_000_000)?)?;
    engine.deposit(alice, coins("ukava", 20_000_000)?)?;
    engine.borrow(alice, coins("hard", 8_000_000)?)?;

    println!("  Alice: 20 KAVA @ $5 deposited, 8 HARD @ $5 borrowed");
    println!("  liquidatable: {}", engine.is_liquidatable(alice)?);

    engine.set_block_time(Timestamp::from_secs(YEAR));
    post_price(&mut engine, "kava:usd", dec!(5))?;
    post_price(&mut engine, "hard:usd", dec!(5))?;
    let update = engine.apply_interest_rate_updates()?;
    for accrual in &update.accruals {
        println!(
            "  {} accrued: borrow index {}, supply index {}",
            accrual.denom, accrual.borrow_index, accrual.supply_index
        );
    }

    if let Some(borrow) = engine.synced_borrow(alice)? {
        println!("  after one year Alice owes {}", borrow.amount);
    }
    println!("  liquidatable: {}\n", engine.is_liquidatable(alice)?);
    Ok(())
}

/// A keeper liquidates a position after the collateral price drops.
fn scenario_4_keeper_liquidation() -> SimResult {
    println!("Scenario 4: Keeper Liquidation\n");

    let mut engine = dev_engine()?;
    let (alice, keeper) = (AccountId(1), AccountId(9));
    engine.bank_mut().mint_to_account(alice, &coins("ukava", 100_000_000)?);
    engine.bank_mut().fund_pool(&coins("usdx", 1_000_000_000)?);
    engine.deposit(alice, coins("ukava", 100_000_000)?)?;
    engine.borrow(alice, coins("usdx", 120_000_000)?)?;

    post_price(&mut engine, "kava:usd", dec!(1.5))?;
    println!("  KAVA drops to $1.50, ltv now {}", engine.loan_to_value(alice)?);

    let result = engine.liquidate(keeper, alice)?;
    println!("  keeper reward: {}", result.reward);
    for lot in &result.lots {
        println!("  {}: lot {} against bid {}", lot.auction_id, lot.lot, lot.bid);
    }
    println!("  refunded to Alice: {}", result.refunded);
    println!(
        "  records left: deposit {}, borrow {}\n",
        engine.ledger().deposit(alice).is_some(),
        engine.ledger().borrow(alice).is_some()
    );
    Ok(())
}

/// begin_block sweeps the riskiest borrowers with the protocol liquidator.
fn scenario_5_index_liquidation() -> SimResult {
    println!("Scenario 5: Index Liquidation\n");

    let mut engine = dev_engine()?;
    engine.bank_mut().fund_pool(&coins("usdx", 10_000_000_000)?);
    for (id, borrow) in [(1u64, 120_000_000u128), (2, 100_000_000), (3, 60_000_000)] {
        let owner = AccountId(id);
        engine.bank_mut().mint_to_account(owner, &coins("ukava", 100_000_000)?);
        engine.deposit(owner, coins("ukava", 100_000_000)?)?;
        engine.borrow(owner, coins("usdx", borrow)?)?;
    }

    let next = engine.time().plus_secs(6);
    engine.set_block_time(next);
    post_price(&mut engine, "usdx:usd", dec!(1))?;
    post_price(&mut engine, "kava:usd", dec!(1.5))?;

    let block = engine.begin_block(next)?;
    println!("  KAVA at $1.50; three borrowers at 120, 100, 60 USDX");
    for result in &block.liquidations {
        println!(
            "  liquidated {} at ltv {} ({} auctions)",
            result.owner,
            result.loan_to_value,
            result.lots.len()
        );
    }
    println!("  skipped: {}", block.skipped.len());
    println!("  remaining borrowers: {}\n", engine.ledger().borrows().count());
    Ok(())
}

/// Export, serialize, and rebuild the ledger; every ltv must survive.
fn scenario_6_snapshot_round_trip() -> SimResult {
    println!("Scenario 6: Snapshot Round Trip\n");

    let mut engine = dev_engine()?;
    let alice = AccountId(1);
    engine.bank_mut().mint_to_account(alice, &coins("ukava", 100_000_000)?);
    engine.bank_mut().fund_pool(&coins("usdx", 1_000_000_000)?);
    engine.deposit(alice, coins("ukava", 100_000_000)?)?;
    engine.borrow(alice, coins("usdx", 80_000_000)?)?;

    let json = engine.export_snapshot().to_json()?;
    let snapshot = LedgerSnapshot::from_json(&json)?;
    let restored = SimEngine::from_snapshot(
        EngineConfig::default(),
        engine.params().clone(),
        snapshot,
        engine.bank().clone(),
        engine.oracle().clone(),
        AuctionHouse::new(),
    )?;

    println!("  snapshot size: {} bytes", json.len());
    println!("  ltv before: {}", engine.loan_to_value(alice)?);
    println!("  ltv after:  {}", restored.loan_to_value(alice)?);
    Ok(())
}
