//! Overflow-checked arithmetic for monetary values
//!
//! Balances are `bitcoin::Amount` (an unsigned satoshi count). Every sum the
//! selector or the composer computes goes through these helpers so an
//! overflow or underflow surfaces as [`WalletError::AmountMathError`] instead
//! of wrapping or panicking.
//!
//! Example:
//! ```
//! use bitcoin::Amount;
//! use bitvault_tx::math;
//!
//! let total = math::checked_sum([Amount::from_sat(50), Amount::from_sat(30)]).unwrap();
//! assert_eq!(total, Amount::from_sat(80));
//! assert!(math::checked_sub(Amount::from_sat(1), Amount::from_sat(2)).is_err());
//! ```

use bitcoin::Amount;

use crate::error::{WalletError, WalletResult};
use crate::types::MAX_BITCOIN_SUPPLY;

/// Add two amounts, failing on overflow
pub fn checked_add(a: Amount, b: Amount) -> WalletResult<Amount> {
    a.checked_add(b).ok_or_else(|| {
        WalletError::AmountMathError(format!("{} + {} overflows", a.to_sat(), b.to_sat()))
    })
}

/// Subtract `b` from `a`, failing on underflow
pub fn checked_sub(a: Amount, b: Amount) -> WalletResult<Amount> {
    a.checked_sub(b).ok_or_else(|| {
        WalletError::AmountMathError(format!("{} - {} underflows", a.to_sat(), b.to_sat()))
    })
}

/// Sum a sequence of amounts, failing on overflow
pub fn checked_sum<I>(amounts: I) -> WalletResult<Amount>
where
    I: IntoIterator<Item = Amount>,
{
    amounts
        .into_iter()
        .try_fold(Amount::ZERO, checked_add)
}

/// `a - b`, or zero when `b >= a`
pub fn saturating_shortfall(a: Amount, b: Amount) -> Amount {
    a.checked_sub(b).unwrap_or(Amount::ZERO)
}

/// Determines if an amount is considered "dust" (too small to be economically viable)
///
/// # Arguments
/// * `amount_sats` - The amount in satoshis to check
/// * `dust_threshold` - Threshold in satoshis; amounts at or below it are dust
pub fn is_dust(amount_sats: u64, dust_threshold: u64) -> bool {
    amount_sats <= dust_threshold
}

/// Validate that an amount does not exceed the total bitcoin supply
pub fn validate_amount(amount: Amount) -> WalletResult<Amount> {
    if amount.to_sat() > MAX_BITCOIN_SUPPLY {
        return Err(WalletError::AmountMathError(format!(
            "{} sat exceeds the maximum bitcoin supply",
            amount.to_sat()
        )));
    }
    Ok(amount)
}
