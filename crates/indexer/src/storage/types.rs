//! Database types for the projection store.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use scrypo_core::{Felt, GeoPoint, PublicKeyFelts};

/// Finality of a block as reported by the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finality {
    /// Still subject to reorganization.
    Pending,

    /// Permanently settled.
    #[default]
    Accepted,
}

impl Finality {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Finality::Pending => "pending",
            Finality::Accepted => "accepted",
        }
    }

    /// Whether a block at `self` satisfies a consumer asking for `requested`.
    pub fn satisfies(&self, requested: Finality) -> bool {
        match requested {
            Finality::Pending => true,
            Finality::Accepted => *self == Finality::Accepted,
        }
    }
}

impl fmt::Display for Finality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Finality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Finality::Pending),
            "accepted" => Ok(Finality::Accepted),
            _ => Err(format!("Unknown finality: {}", s)),
        }
    }
}

/// A profile row: the current state for one address.
///
/// Every `ProfileUpdated` event overwrites the whole row. The provenance
/// fields identify the event that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    /// Wallet address (primary key)
    pub address: Felt,

    /// Display name decoded from a short string
    pub name: String,

    /// Four 256-bit tag masks
    pub tags: [U256; 4],

    /// Location (x = longitude, y = latitude)
    pub location: GeoPoint,

    /// Public key halves
    pub pubkey: PublicKeyFelts,

    /// Block that emitted the update
    pub block_number: u64,

    /// Transaction that emitted the update
    pub tx_hash: Felt,
}

/// An append-only message row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// `"{block_number}-{tx_hash}-{event_index}"`
    pub id: String,

    /// Sending address
    pub sender: Felt,

    /// Receiving address
    pub recipient: Felt,

    /// Packed payload exactly as emitted (length prefix first)
    pub payload: Vec<Felt>,

    /// Block number
    pub block_number: u64,

    /// Transaction hash
    pub tx_hash: Felt,

    /// Index of the event within its transaction
    pub event_index: u64,

    /// Block timestamp (unix seconds)
    pub timestamp: u64,
}

impl MessageRecord {
    /// Build the deterministic message id for an event position.
    pub fn message_id(block_number: u64, tx_hash: &Felt, event_index: u64) -> String {
        format!("{}-{}-{}", block_number, tx_hash.to_hex(), event_index)
    }
}

/// Resume cursor (singleton).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// Last committed block number
    pub block_number: u64,

    /// Hash of the last committed block
    pub block_hash: Felt,

    /// Finality the block had when it was committed
    pub finality: Finality,

    /// Unix timestamp of the commit
    pub updated_at: i64,
}

impl Cursor {
    /// Cursor for a block committed now.
    pub fn new(block_number: u64, block_hash: Felt, finality: Finality) -> Self {
        Self {
            block_number,
            block_hash,
            finality,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Number of profiles
    pub profile_count: u64,

    /// Number of messages
    pub message_count: u64,

    /// Last committed block, if any
    pub last_block_number: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finality_str_conversion() {
        assert_eq!(Finality::Pending.as_str(), "pending");
        assert_eq!(Finality::Accepted.as_str(), "accepted");

        assert_eq!("pending".parse::<Finality>().unwrap(), Finality::Pending);
        assert_eq!("accepted".parse::<Finality>().unwrap(), Finality::Accepted);
        assert!("finalized".parse::<Finality>().is_err());
    }

    #[test]
    fn test_finality_satisfies() {
        assert!(Finality::Accepted.satisfies(Finality::Accepted));
        assert!(Finality::Accepted.satisfies(Finality::Pending));
        assert!(Finality::Pending.satisfies(Finality::Pending));
        assert!(!Finality::Pending.satisfies(Finality::Accepted));
    }

    #[test]
    fn test_message_id_format() {
        let id = MessageRecord::message_id(812, &Felt::from_u64(0xabc), 3);
        assert_eq!(id, "812-0xabc-3");
    }
}
