//! Token amount conversions between human units (Decimal) and on-chain base
//! units (U256).

use ethers::types::U256;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use thiserror::Error;

/// Decimals of the chain's native gas token
pub const NATIVE_DECIMALS: u32 = 18;

#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("Negative amount: {0}")]
    Negative(Decimal),
    #[error("Amount {0} overflows with {1} decimals")]
    Overflow(Decimal, u32),
}

/// `amount * 10^decimals`, truncated toward zero
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount));
    }

    let scale = 10u128
        .checked_pow(decimals)
        .and_then(Decimal::from_u128)
        .ok_or(AmountError::Overflow(amount, decimals))?;

    amount
        .checked_mul(scale)
        .and_then(|v| v.trunc().to_u128())
        .map(U256::from)
        .ok_or(AmountError::Overflow(amount, decimals))
}

/// Base units back to a Decimal for display. Saturates at `Decimal::MAX`.
pub fn to_decimal(raw: U256, decimals: u32) -> Decimal {
    if raw > U256::from(i128::MAX as u128) {
        return Decimal::MAX;
    }
    Decimal::try_from_i128_with_scale(raw.as_u128() as i128, decimals).unwrap_or(Decimal::MAX)
}
