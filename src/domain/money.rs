use bigdecimal::BigDecimal;

/// Round a money value to 2 decimal places (banker's rounding, the same
/// behavior the persisted NUMERIC(12,2) columns expect).
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.round(2)
}

pub fn zero() -> BigDecimal {
    BigDecimal::from(0)
}

/// commission = round(total * rate / 100, 2); net = total - commission.
/// Returns (commission, net).
pub fn split_commission(total: &BigDecimal, commission_rate: &BigDecimal) -> (BigDecimal, BigDecimal) {
    let commission = round_money(&(total * commission_rate / BigDecimal::from(100)));
    let net = total - &commission;
    (commission, net)
}
