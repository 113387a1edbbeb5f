use {
    super::error::EngineError,
    super::method::FeeSchedule,
    super::money::MoneyAmount,
    rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive},
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fees {
    pub fee: MoneyAmount,
    pub net: MoneyAmount,
}

/// `fee = round(amount * percentage + fixed)` in minor units, half away
/// from zero; `net = amount - fee`.
pub fn calculate(amount: MoneyAmount, schedule: &FeeSchedule) -> Result<Fees, EngineError> {
    let raw = Decimal::from(amount.minor_units()) * schedule.percentage
        + Decimal::from(schedule.fixed.minor_units());
    let fee = raw
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| EngineError::Validation(format!("fee overflow for amount {amount}")))?;
    let fee = MoneyAmount::new(fee)?;

    let net = amount.checked_sub(fee).ok_or_else(|| {
        EngineError::Validation(format!("fee {fee} exceeds amount {amount}"))
    })?;

    Ok(Fees { fee, net })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn schedule(pct: Decimal, fixed: i64) -> FeeSchedule {
        FeeSchedule::new(pct, MoneyAmount::new(fixed).unwrap())
    }

    #[test]
    fn card_fee_on_one_hundred_dollars() {
        let fees = calculate(MoneyAmount::new(10_000).unwrap(), &schedule(dec!(0.029), 30)).unwrap();
        assert_eq!(fees.fee.minor_units(), 320);
        assert_eq!(fees.net.minor_units(), 9_680);
    }

    #[test]
    fn half_cent_rounds_away_from_zero() {
        // 150 * 0.01 = 1.5 -> 2
        let fees = calculate(MoneyAmount::new(150).unwrap(), &schedule(dec!(0.01), 0)).unwrap();
        assert_eq!(fees.fee.minor_units(), 2);
        assert_eq!(fees.net.minor_units(), 148);
    }

    #[test]
    fn fee_larger_than_amount_is_rejected() {
        let err = calculate(MoneyAmount::new(20).unwrap(), &schedule(dec!(0), 30)).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
