//! Public key split/merge.
//!
//! A 32-byte key does not fit in one felt, so it travels as two 16-byte
//! big-endian halves.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::constants::{PUBLIC_KEY_HALF_LEN, PUBLIC_KEY_LEN};
use crate::error::{CodecError, Result};
use crate::felt::Felt;

/// A public key as carried in call data and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeyFelts {
    /// First 16 bytes, big-endian.
    pub hi: Felt,
    /// Last 16 bytes, big-endian.
    pub lo: Felt,
}

impl PublicKeyFelts {
    /// Validate that both halves fit in 16 bytes.
    pub fn new(hi: Felt, lo: Felt) -> Result<Self> {
        check_half(&hi)?;
        check_half(&lo)?;
        Ok(Self { hi, lo })
    }

    /// Rebuild the 32-byte key.
    pub fn to_bytes(&self) -> Result<[u8; PUBLIC_KEY_LEN]> {
        decode_public_key(self.hi, self.lo)
    }
}

/// Split a 32-byte public key into `(hi, lo)` felts.
///
/// # Errors
///
/// Returns `CodecError::InvalidKeyLength` unless `bytes` is exactly 32 bytes.
pub fn encode_public_key(bytes: &[u8]) -> Result<PublicKeyFelts> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(CodecError::InvalidKeyLength(bytes.len()));
    }

    let (hi, lo) = bytes.split_at(PUBLIC_KEY_HALF_LEN);
    Ok(PublicKeyFelts {
        hi: Felt::new(U256::from_be_slice(hi))?,
        lo: Felt::new(U256::from_be_slice(lo))?,
    })
}

/// Merge `(hi, lo)` felts back into the 32-byte key.
pub fn decode_public_key(hi: Felt, lo: Felt) -> Result<[u8; PUBLIC_KEY_LEN]> {
    check_half(&hi)?;
    check_half(&lo)?;

    let mut key = [0u8; PUBLIC_KEY_LEN];
    key[..PUBLIC_KEY_HALF_LEN].copy_from_slice(&hi.to_be_bytes()[32 - PUBLIC_KEY_HALF_LEN..]);
    key[PUBLIC_KEY_HALF_LEN..].copy_from_slice(&lo.to_be_bytes()[32 - PUBLIC_KEY_HALF_LEN..]);
    Ok(key)
}

fn check_half(half: &Felt) -> Result<()> {
    let bits = half.bit_len();
    if bits > PUBLIC_KEY_HALF_LEN * 8 {
        return Err(CodecError::KeyHalfTooWide(bits));
    }
    Ok(())
}
