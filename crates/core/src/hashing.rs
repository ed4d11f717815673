//! Hashing utilities.
//!
//! Starknet identifies events by `sn_keccak(name)`: keccak256 truncated to
//! the low 250 bits.

use alloy_primitives::{keccak256 as alloy_keccak256, B256, U256};

use crate::constants::{MESSAGE_SENT, PROFILE_UPDATED};
use crate::felt::Felt;

/// Compute keccak256 hash of input data.
pub fn keccak256(data: &[u8]) -> B256 {
    alloy_keccak256(data)
}

/// Starknet keccak: keccak256 masked to 250 bits, always a valid felt.
///
/// # Example
///
/// ```
/// use scrypo_core::hashing::selector;
///
/// assert_eq!(
///     selector("Transfer").to_hex(),
///     "0x99cd8bde557814842a3121e8ddfd433a539b8c9f14bf31ebf108d12e6196e9"
/// );
/// ```
pub fn sn_keccak(data: &[u8]) -> Felt {
    let hash = U256::from_be_bytes(keccak256(data).0);
    let mask = (U256::from(1u64) << 250usize) - U256::from(1u64);
    // 250 bits is below the 251-bit prime.
    Felt::from_bounded(hash & mask)
}

/// Event or entry point selector for a Cairo name.
pub fn selector(name: &str) -> Felt {
    sn_keccak(name.as_bytes())
}

/// Selector of the `ProfileUpdated` event.
pub fn profile_updated_selector() -> Felt {
    selector(PROFILE_UPDATED)
}

/// Selector of the `MessageSent` event.
pub fn message_sent_selector() -> Felt {
    selector(MESSAGE_SENT)
}
