//! Starknet field element.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::FIELD_PRIME;
use crate::error::{CodecError, Result};

/// A field element: an integer in `[0, P)` for the Starknet prime `P`.
///
/// Construction always validates the range, including deserialization, so a
/// `Felt` held anywhere in the system is a valid ledger value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Felt(U256);

impl Felt {
    /// The zero element.
    pub const ZERO: Felt = Felt(U256::ZERO);

    /// Create a felt, rejecting values `>= P`.
    pub fn new(value: U256) -> Result<Self> {
        if value >= FIELD_PRIME {
            return Err(CodecError::NotAFieldElement(format!("{:#x}", value)));
        }
        Ok(Felt(value))
    }

    /// Wrap a value the caller has already bounded below `P`.
    pub(crate) fn from_bounded(value: U256) -> Self {
        debug_assert!(value < FIELD_PRIME, "{:#x} is not below the field prime", value);
        Felt(value)
    }

    /// Create a felt from a `u64` (always in range).
    pub fn from_u64(value: u64) -> Self {
        Felt(U256::from(value))
    }

    /// Create a felt from up to 32 big-endian bytes.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > 32 {
            return Err(CodecError::InvalidEncoding(format!(
                "{} bytes do not fit in a felt",
                bytes.len()
            )));
        }
        Self::new(U256::from_be_slice(bytes))
    }

    /// Get the underlying integer.
    pub const fn value(&self) -> U256 {
        self.0
    }

    /// Big-endian 32-byte representation.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }

    /// Number of significant bits.
    pub fn bit_len(&self) -> usize {
        self.0.bit_len()
    }

    /// Whether this is the zero element.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The value as `u64`, if it fits.
    pub fn to_u64(&self) -> Option<u64> {
        let limbs = self.0.as_limbs();
        if limbs[1..].iter().any(|limb| *limb != 0) {
            return None;
        }
        Some(limbs[0])
    }

    /// `0x`-prefixed lowercase hex without leading zeros.
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }

    /// Decimal string.
    pub fn to_decimal(&self) -> String {
        self.0.to_string()
    }
}

impl TryFrom<U256> for Felt {
    type Error = CodecError;

    fn try_from(value: U256) -> Result<Self> {
        Felt::new(value)
    }
}

impl From<Felt> for U256 {
    fn from(felt: Felt) -> Self {
        felt.0
    }
}

impl From<u64> for Felt {
    fn from(value: u64) -> Self {
        Felt::from_u64(value)
    }
}

impl FromStr for Felt {
    type Err = CodecError;

    /// Parse `0x`-prefixed hex or plain decimal.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some("") => return Err(CodecError::InvalidEncoding(s.to_string())),
            Some(hex) => U256::from_str_radix(hex, 16),
            None if s.is_empty() => return Err(CodecError::InvalidEncoding(s.to_string())),
            None => U256::from_str_radix(s, 10),
        };
        let value = parsed.map_err(|e| CodecError::InvalidEncoding(format!("{}: {}", s, e)))?;
        Felt::new(value)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Felt({:#x})", self.0)
    }
}

// Serialized as the hex string used by Starknet JSON-RPC.
impl Serialize for Felt {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Felt>()
            .map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}
