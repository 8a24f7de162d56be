// 5.0: interest accrual math. borrowers compound per second on a utilization-driven
// curve; suppliers receive the borrower interest net of the reserve cut.
// 5.1-5.5 are the individual formulas, 5.6 combines them into one accrual step.
// everything runs through FixedDec so results are identical on every replica.

use crate::fixed_point::{relative_pow, FixedDec, FixedPointError, U512};
use crate::market::{InterestRateModel, MoneyMarket};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_YEAR: u64 = 31_536_000;

// 5.1: fraction of effective supply that is borrowed. clamps to 1 when reserves eat
// the whole supply.
pub(crate) fn utilization_ratio(
    cash: FixedDec,
    borrows: FixedDec,
    reserves: FixedDec,
) -> Result<FixedDec, FixedPointError> {
    if borrows.is_zero() {
        return Ok(FixedDec::ZERO);
    }
    let total_supply = cash.add(&borrows)?.sub(&reserves)?;
    if total_supply.is_negative() || total_supply.is_zero() {
        return Ok(FixedDec::ONE);
    }
    Ok(FixedDec::ONE.min(borrows.quo(&total_supply)?))
}

pub fn calculate_utilization_ratio(
    cash: Decimal,
    borrows: Decimal,
    reserves: Decimal,
) -> Result<Decimal, FixedPointError> {
    utilization_ratio(
        FixedDec::from_decimal(cash)?,
        FixedDec::from_decimal(borrows)?,
        FixedDec::from_decimal(reserves)?,
    )?
    .to_decimal()
}

// 5.2: borrow APY. linear up to the kink, steeper jump slope past it.
pub(crate) fn borrow_rate(
    model: &InterestRateModel,
    utilization: FixedDec,
) -> Result<FixedDec, FixedPointError> {
    let base = FixedDec::from_decimal(model.base_rate_apy)?;
    let multiplier = FixedDec::from_decimal(model.base_multiplier)?;
    let kink = FixedDec::from_decimal(model.kink)?;
    if utilization <= kink {
        return utilization.mul(&multiplier)?.add(&base);
    }
    let normal_rate = kink.mul(&multiplier)?.add(&base)?;
    let jump = FixedDec::from_decimal(model.jump_multiplier)?;
    utilization.sub(&kink)?.mul(&jump)?.add(&normal_rate)
}

pub fn calculate_borrow_rate(
    model: &InterestRateModel,
    cash: Decimal,
    borrows: Decimal,
    reserves: Decimal,
) -> Result<Decimal, FixedPointError> {
    let utilization = utilization_ratio(
        FixedDec::from_decimal(cash)?,
        FixedDec::from_decimal(borrows)?,
        FixedDec::from_decimal(reserves)?,
    )?;
    borrow_rate(model, utilization)?.to_decimal()
}

// 5.3: annual growth factor to per-second growth factor. the newton root overflows
// for inputs of 178 and above; that ceiling is part of the protocol.
pub(crate) fn annual_to_per_second(apy: FixedDec) -> Result<FixedDec, FixedPointError> {
    apy.approx_root(SECONDS_PER_YEAR)
}

/// Per-second rate for an annual growth factor, e.g. `apy_to_spy(1.05)` for 5%.
pub fn apy_to_spy(apy: Decimal) -> Result<Decimal, FixedPointError> {
    annual_to_per_second(FixedDec::from_decimal(apy)?)?.to_decimal()
}

// 5.4: spy^seconds on 1e18-scaled integers
pub(crate) fn borrow_interest_factor(
    spy: FixedDec,
    seconds_elapsed: u64,
) -> Result<FixedDec, FixedPointError> {
    let scale = FixedDec::ONE.mantissa();
    let mantissa: U512 = relative_pow(spy.mantissa(), seconds_elapsed, scale)?;
    FixedDec::from_mantissa(mantissa)
}

pub fn calculate_borrow_interest_factor(
    spy: Decimal,
    seconds_elapsed: u64,
) -> Result<Decimal, FixedPointError> {
    borrow_interest_factor(FixedDec::from_decimal(spy)?, seconds_elapsed)?.to_decimal()
}

// 5.5: supplier growth factor. borrower growth scaled by utilization, minus reserve cut.
pub(crate) fn supply_interest_factor(
    borrow_factor_increment: FixedDec,
    utilization: FixedDec,
    reserve_factor: FixedDec,
) -> Result<FixedDec, FixedPointError> {
    let supplier_share = FixedDec::ONE.sub(&reserve_factor)?;
    let increment = borrow_factor_increment.mul(&utilization)?.mul(&supplier_share)?;
    FixedDec::ONE.add(&increment)
}

pub fn calculate_supply_interest_factor(
    borrow_factor_increment: Decimal,
    cash: Decimal,
    borrows: Decimal,
    reserves: Decimal,
    reserve_factor: Decimal,
) -> Result<Decimal, FixedPointError> {
    let utilization = utilization_ratio(
        FixedDec::from_decimal(cash)?,
        FixedDec::from_decimal(borrows)?,
        FixedDec::from_decimal(reserves)?,
    )?;
    supply_interest_factor(
        FixedDec::from_decimal(borrow_factor_increment)?,
        utilization,
        FixedDec::from_decimal(reserve_factor)?,
    )?
    .to_decimal()
}

/// Protocol state for one denom going into an accrual step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualInputs {
    pub cash: u128,
    pub borrowed: u128,
    pub supplied: u128,
    pub reserves: u128,
    pub borrow_index: Decimal,
    pub supply_index: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    pub utilization: Decimal,
    pub borrow_rate_apy: Decimal,
    pub borrow_factor: Decimal,
    pub supply_factor: Decimal,
    /// Added to total borrowed.
    pub borrow_interest: u128,
    /// Added to total supplied.
    pub supply_interest: u128,
    /// Protocol cut of `borrow_interest`, added to total reserves.
    pub reserves_delta: u128,
    pub borrow_index: Decimal,
    pub supply_index: Decimal,
}

// 5.6: one accrual step for one denom over `seconds_elapsed`
pub fn compute_accrual(
    market: &MoneyMarket,
    inputs: &AccrualInputs,
    seconds_elapsed: u64,
) -> Result<AccrualOutcome, FixedPointError> {
    let cash = FixedDec::from_int(inputs.cash)?;
    let borrows = FixedDec::from_int(inputs.borrowed)?;
    let reserves = FixedDec::from_int(inputs.reserves)?;
    let supplied = FixedDec::from_int(inputs.supplied)?;
    let reserve_factor = FixedDec::from_decimal(market.reserve_factor)?;

    let utilization = utilization_ratio(cash, borrows, reserves)?;
    let rate = borrow_rate(&market.interest_rate_model, utilization)?;
    let spy = annual_to_per_second(FixedDec::ONE.add(&rate)?)?;
    let borrow_factor = borrow_interest_factor(spy, seconds_elapsed)?;

    let borrow_interest = borrow_factor
        .mul(&borrows)?
        .truncate_int()?
        .saturating_sub(inputs.borrowed);
    let reserves_delta = FixedDec::from_int(borrow_interest)?
        .mul(&reserve_factor)?
        .truncate_int()?;
    let borrow_index = FixedDec::from_decimal(inputs.borrow_index)?.mul(&borrow_factor)?;

    let increment = borrow_factor.sub(&FixedDec::ONE)?;
    let supply_factor = supply_interest_factor(increment, utilization, reserve_factor)?;
    let supply_interest = supply_factor
        .mul(&supplied)?
        .truncate_int()?
        .saturating_sub(inputs.supplied);
    let supply_index = FixedDec::from_decimal(inputs.supply_index)?.mul(&supply_factor)?;

    Ok(AccrualOutcome {
        utilization: utilization.to_decimal()?,
        borrow_rate_apy: rate.to_decimal()?,
        borrow_factor: borrow_factor.to_decimal()?,
        supply_factor: supply_factor.to_decimal()?,
        borrow_interest,
        supply_interest,
        reserves_delta,
        borrow_index: borrow_index.to_decimal()?,
        supply_index: supply_index.to_decimal()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::BorrowLimit;
    use crate::types::{Denom, MarketId};
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal_macros::dec;

    fn assert_close(actual: Decimal, expected: Decimal) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= dec!(0.000000000000000002),
            "expected {expected}, got {actual}"
        );
    }

    fn model() -> InterestRateModel {
        InterestRateModel::new(dec!(0), dec!(0.1), dec!(0.8), dec!(0.5))
    }

    #[test]
    fn utilization_vectors() {
        let cases = [
            (dec!(1000), dec!(5000), dec!(100), dec!(0.847457627118644068)),
            (dec!(1000), dec!(50), dec!(100), dec!(0.052631578947368421)),
            (dec!(1000), dec!(0), dec!(100), dec!(0)),
            // reserves exceed cash + borrows
            (dec!(10), dec!(50), dec!(100), dec!(1)),
        ];
        for (cash, borrows, reserves, expected) in cases {
            assert_eq!(
                calculate_utilization_ratio(cash, borrows, reserves).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn borrow_rate_vectors() {
        assert_eq!(
            calculate_borrow_rate(&model(), dec!(5000), dec!(1000), dec!(1000)).unwrap(),
            dec!(0.02)
        );
        assert_eq!(
            calculate_borrow_rate(&model(), dec!(1000), dec!(5000), dec!(100)).unwrap(),
            dec!(0.103728813559322034)
        );
    }

    #[test]
    fn borrow_rate_at_kink_uses_normal_slope() {
        // cash 200, borrows 800 -> utilization exactly 0.8
        let rate = calculate_borrow_rate(&model(), dec!(200), dec!(800), dec!(0)).unwrap();
        assert_eq!(rate, dec!(0.08));
    }

    #[test]
    fn borrow_interest_factor_vectors() {
        let year = SECONDS_PER_YEAR;
        let cases = [
            (dec!(1.000000005555), year, dec!(1.191463614477847370)),
            (dec!(1.000000005555), year * 10, dec!(5.765113233897391189)),
            (dec!(1.000000005555), year / 12, dec!(1.014705619075717373)),
            (dec!(1.000000005555), year / 365, dec!(1.000480067194057924)),
            (dec!(1.000000000555), year, dec!(1.017656545925063632)),
            (dec!(1.000000055555), year, dec!(5.766022095987868825)),
        ];
        for (spy, seconds, expected) in cases {
            assert_eq!(calculate_borrow_interest_factor(spy, seconds).unwrap(), expected);
        }
    }

    #[test]
    fn zero_elapsed_factor_is_one() {
        assert_eq!(calculate_borrow_interest_factor(dec!(1.00000001), 0).unwrap(), dec!(1));
    }

    #[test]
    fn supply_interest_factor_vector() {
        let factor = calculate_supply_interest_factor(
            dec!(0.05),
            dec!(100),
            dec!(1000),
            dec!(10),
            dec!(0.05),
        )
        .unwrap();
        assert_eq!(factor, dec!(1.043577981651376147));
    }

    #[test]
    fn apy_to_spy_vectors() {
        let cases = [
            (dec!(0.005), dec!(0.999999831991472557)),
            (dec!(0.05), dec!(0.999999905005957279)),
            (dec!(5), dec!(1.000000051034942717)),
            (dec!(50), dec!(1.000000124049443433)),
            (dec!(177), dec!(1.000002441641340532)),
        ];
        for (apy, expected) in cases {
            assert_close(apy_to_spy(apy).unwrap(), expected);
        }
    }

    #[test]
    fn apy_to_spy_ceiling() {
        assert_eq!(apy_to_spy(dec!(178)), Err(FixedPointError::OutOfBounds));
    }

    fn market(reserve_factor: Decimal) -> MoneyMarket {
        MoneyMarket::new(
            Denom::new("ukava").unwrap(),
            BorrowLimit::uncapped(dec!(0.8)),
            MarketId::new("kava:usd"),
            1_000_000,
            InterestRateModel::new(dec!(0.05), dec!(2), dec!(0.8), dec!(10)),
            reserve_factor,
            dec!(0.05),
        )
    }

    #[test]
    fn accrual_splits_interest_between_reserves_and_suppliers() {
        let inputs = AccrualInputs {
            cash: 800_000_000,
            borrowed: 200_000_000,
            supplied: 1_000_000_000,
            reserves: 0,
            borrow_index: Decimal::ONE,
            supply_index: Decimal::ONE,
        };
        let out = compute_accrual(&market(dec!(0.05)), &inputs, SECONDS_PER_YEAR).unwrap();

        assert_eq!(out.utilization, dec!(0.2));
        assert_eq!(out.borrow_rate_apy, dec!(0.45));
        assert!(out.borrow_interest > 0);
        assert_eq!(
            out.reserves_delta,
            (Decimal::from(out.borrow_interest) * dec!(0.05)).trunc().to_u128().unwrap()
        );
        assert!(out.borrow_index > Decimal::ONE);
        assert!(out.supply_index > Decimal::ONE);
        assert!(out.supply_index < out.borrow_index);
        // suppliers never receive more than borrowers paid
        assert!(out.supply_interest <= out.borrow_interest);
    }

    #[test]
    fn accrual_without_borrows_leaves_indexes_flat() {
        let inputs = AccrualInputs {
            cash: 1_000_000,
            borrowed: 0,
            supplied: 1_000_000,
            reserves: 0,
            borrow_index: dec!(1.5),
            supply_index: dec!(1.2),
        };
        let out = compute_accrual(&market(dec!(0.1)), &inputs, 3600).unwrap();
        assert_eq!(out.borrow_interest, 0);
        assert_eq!(out.supply_interest, 0);
        assert_eq!(out.supply_index, dec!(1.2));
        // base rate still compounds the borrow index
        assert!(out.borrow_index > dec!(1.5));
    }
}
