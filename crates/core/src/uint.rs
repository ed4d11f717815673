//! Cairo `u256` values carried as `(low, high)` felt pairs.

use alloy_primitives::U256;

use crate::error::{CodecError, Result};
use crate::felt::Felt;

/// Rebuild a 256-bit value as `(high << 128) | low`.
///
/// # Errors
///
/// Returns `CodecError::U256HalfTooWide` if either half exceeds 128 bits.
pub fn reconstruct_u256(low: Felt, high: Felt) -> Result<U256> {
    if low.bit_len() > 128 {
        return Err(CodecError::U256HalfTooWide("low"));
    }
    if high.bit_len() > 128 {
        return Err(CodecError::U256HalfTooWide("high"));
    }
    Ok((high.value() << 128usize) | low.value())
}

/// Split a 256-bit value into `(low, high)` felts.
pub fn split_u256(value: U256) -> (Felt, Felt) {
    let mask = U256::from(u128::MAX);
    // Both halves are below 2^128 and therefore below the prime.
    let low = Felt::from_bounded(value & mask);
    let high = Felt::from_bounded(value >> 128usize);
    (low, high)
}
