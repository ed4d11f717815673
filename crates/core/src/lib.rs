//! # Scrypo Core
//!
//! Field-element codec for the Scrypo geolocation social registry.
//!
//! Every value the ProfileRegistry contract emits is a Starknet field element
//! (felt). This crate converts felts to and from the richer types the rest of
//! the system works with, and guarantees exact round trips:
//!
//! - **Felt**: validated integer below the Starknet prime
//! - **Degrees**: signed fixed-point coordinates (6 decimals)
//! - **Public keys**: 32-byte keys split into two 16-byte felts
//! - **Payloads**: length-prefixed 31-byte chunk packing
//! - **Short strings** and **u256** `(low, high)` pairs
//! - **Selectors**: `sn_keccak` event identifiers

#![warn(missing_docs)]

pub mod constants;
pub mod degrees;
pub mod error;
pub mod felt;
pub mod hashing;
pub mod payload;
pub mod pubkey;
pub mod short_string;
pub mod types;
pub mod uint;

// Re-export commonly used items
pub use constants::*;
pub use degrees::{decode_degrees, encode_degrees};
pub use error::{CodecError, Result};
pub use felt::Felt;
pub use hashing::{selector, sn_keccak};
pub use payload::{pack_bytes, packed_len, unpack_bytes};
pub use pubkey::{decode_public_key, encode_public_key, PublicKeyFelts};
pub use short_string::{short_string_to_str, str_to_short_string};
pub use types::{BoundingBox, BoundingBoxError, GeoPoint};
pub use uint::{reconstruct_u256, split_u256};

// Re-export Alloy primitives for convenience
pub use alloy_primitives::U256;
