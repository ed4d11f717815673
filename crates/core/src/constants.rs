//! Canonical constants for the Scrypo codec.
//!
//! These values MUST match the ProfileRegistry Cairo contract and the
//! frontend helpers that produce call data for it.

use alloy_primitives::U256;

/// The Starknet field prime: `2^251 + 17 * 2^192 + 1`.
pub const FIELD_PRIME: U256 = U256::from_limbs([1, 0, 0, 0x0800_0000_0000_0011]);

/// `(FIELD_PRIME - 1) / 2`, the largest felt that decodes as a non-negative
/// signed value.
pub const FIELD_PRIME_HALF: U256 =
    U256::from_limbs([0, 0, 0x8000_0000_0000_0000, 0x0400_0000_0000_0008]);

/// Fixed-point scale for coordinates: 1 degree = 1 000 000 units.
pub const DEGREE_SCALE: f64 = 1_000_000.0;

/// Largest valid absolute latitude, in degrees.
pub const MAX_LATITUDE: f64 = 90.0;

/// Largest valid absolute longitude, in degrees.
pub const MAX_LONGITUDE: f64 = 180.0;

/// Bytes carried by one packed payload felt.
pub const CHUNK_BYTES: usize = 31;

/// Maximum length of a Cairo short string.
pub const SHORT_STRING_MAX_BYTES: usize = 31;

/// Length of an X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of each public key half stored in a felt.
pub const PUBLIC_KEY_HALF_LEN: usize = 16;

/// Event name emitted for profile writes.
pub const PROFILE_UPDATED: &str = "ProfileUpdated";

/// Event name emitted for encrypted messages.
pub const MESSAGE_SENT: &str = "MessageSent";

/// Number of felts in a `ProfileUpdated` event.
pub const PROFILE_UPDATED_ARITY: usize = 14;

/// Minimum number of felts in a `MessageSent` event (sender, recipient, length).
pub const MESSAGE_SENT_MIN_ARITY: usize = 3;
