//! Conversion between human token amounts and on-chain smallest units.

use alloy::primitives::U256;
use rust_decimal::prelude::*;

use crate::types::HunterError;

/// Largest decimal count whose scale factor fits in a u64 (10^19).
const MAX_DECIMALS: u32 = 19;

fn scale_factor(decimals: u32) -> Result<u128, HunterError> {
    if decimals > MAX_DECIMALS {
        return Err(HunterError::Units(format!("{decimals} decimals not supported")));
    }
    Ok(10u128.pow(decimals))
}

/// `amount × 10^decimals`, truncated.
///
/// Integer and fractional parts are scaled separately so large meme-token
/// balances do not overflow `Decimal`'s 96-bit mantissa.
pub fn to_base_units(amount: Decimal, decimals: u32) -> Result<u128, HunterError> {
    if amount.is_sign_negative() {
        return Err(HunterError::Units(format!("negative amount {amount}")));
    }
    let factor = scale_factor(decimals)?;

    let whole = amount
        .trunc()
        .to_u128()
        .ok_or_else(|| HunterError::Units(format!("amount {amount} out of range")))?;
    let frac = (amount.fract() * Decimal::from(factor as u64))
        .trunc()
        .to_u128()
        .unwrap_or(0);

    whole
        .checked_mul(factor)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| HunterError::Units(format!("amount {amount} overflows at {decimals} decimals")))
}

/// Parse a smallest-unit integer string and scale it down by `decimals`.
pub fn from_base_units(raw: &str, decimals: u32) -> Result<Decimal, HunterError> {
    let value = U256::from_str_radix(raw.trim(), 10)
        .map_err(|e| HunterError::Units(format!("invalid integer amount {raw:?}: {e}")))?;
    scale_down(value, decimals)
}

/// `value / 10^decimals` as a `Decimal`.
///
/// Values beyond `Decimal` precision lose their lowest digits rather than
/// failing. Values beyond `Decimal::MAX` are an error.
pub fn scale_down(value: U256, decimals: u32) -> Result<Decimal, HunterError> {
    if value.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let ten = U256::from(10u8);
    let mut mantissa = value;
    let mut scale = decimals;
    let mut shift = 0u32;

    loop {
        let fits = u128::try_from(mantissa)
            .ok()
            .and_then(|m| i128::try_from(m).ok())
            .and_then(|m| Decimal::try_from_i128_with_scale(m, scale).ok());
        if let Some(d) = fits {
            return d
                .checked_mul(Decimal::from(10u64.pow(shift)))
                .map(|d| d.normalize())
                .ok_or_else(|| HunterError::Units(format!("amount {value} out of range")));
        }

        mantissa /= ten;
        if scale > 0 {
            scale -= 1;
        } else {
            shift += 1;
            if shift > MAX_DECIMALS {
                return Err(HunterError::Units(format!("amount {value} out of range")));
            }
        }
    }
}
