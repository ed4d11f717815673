//! ProfileRegistry event types and decoding.
//!
//! Events arrive as a selector plus an ordered list of felts. Decoding turns
//! them into typed [`DomainEvent`]s or rejects them with a [`DecodeError`];
//! it performs no I/O.

use alloy_primitives::U256;
use thiserror::Error;
use tracing::debug;

use scrypo_core::constants::{
    MAX_LATITUDE, MAX_LONGITUDE, MESSAGE_SENT, MESSAGE_SENT_MIN_ARITY, PROFILE_UPDATED,
    PROFILE_UPDATED_ARITY,
};
use scrypo_core::hashing::selector;
use scrypo_core::payload::validate_packed;
use scrypo_core::{
    decode_degrees, reconstruct_u256, short_string_to_str, CodecError, Felt, GeoPoint,
    PublicKeyFelts,
};

use crate::storage::{Finality, MessageRecord, ProfileRecord};

/// Event variants emitted by the ProfileRegistry contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Full profile write.
    ProfileUpdated,

    /// Encrypted message.
    MessageSent,
}

impl EventKind {
    /// All known kinds.
    pub const ALL: [EventKind; 2] = [EventKind::ProfileUpdated, EventKind::MessageSent];

    /// Cairo event name.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ProfileUpdated => PROFILE_UPDATED,
            EventKind::MessageSent => MESSAGE_SENT,
        }
    }

    /// Wire selector (`sn_keccak` of the name).
    pub fn selector(&self) -> Felt {
        selector(self.name())
    }

    /// Look up the kind for a selector.
    pub fn from_selector(value: &Felt) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.selector() == *value)
    }
}

/// One event as emitted on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    /// Event selector (first key)
    pub selector: Felt,

    /// Remaining keys followed by data, in declaration order
    pub fields: Vec<Felt>,

    /// Block number
    pub block_number: u64,

    /// Transaction hash
    pub tx_hash: Felt,

    /// Index of the event within its transaction
    pub event_index: u64,

    /// Block timestamp (unix seconds)
    pub timestamp: u64,

    /// Finality of the containing block
    pub finality: Finality,
}

/// A block of events, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block number
    pub number: u64,

    /// Block hash
    pub hash: Felt,

    /// Parent block hash
    pub parent_hash: Felt,

    /// Block timestamp (unix seconds)
    pub timestamp: u64,

    /// Block finality
    pub finality: Finality,

    /// Registry events in emission order
    pub events: Vec<ChainEvent>,
}

/// Decoded `ProfileUpdated` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdated {
    /// Wallet address
    pub address: Felt,
    /// Display name
    pub name: String,
    /// Tag masks 0..=3
    pub tags: [U256; 4],
    /// Location (x = longitude, y = latitude)
    pub location: GeoPoint,
    /// Public key halves
    pub pubkey: PublicKeyFelts,
}

/// Decoded `MessageSent` payload. The body stays packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSent {
    /// Sending address
    pub sender: Felt,
    /// Receiving address
    pub recipient: Felt,
    /// Packed payload, length prefix first
    pub payload: Vec<Felt>,
}

/// A typed registry event.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// Profile write.
    ProfileUpdated(ProfileUpdated),
    /// Message append.
    MessageSent(MessageSent),
}

/// A registry event that cannot be decoded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Field count does not match the layout.
    #[error("{event} expects {expected} fields, got {actual}")]
    WrongArity {
        /// Event name
        event: &'static str,
        /// Required count
        expected: usize,
        /// Received count
        actual: usize,
    },

    /// Fewer fields than the layout minimum.
    #[error("{event} expects at least {minimum} fields, got {actual}")]
    TooFewFields {
        /// Event name
        event: &'static str,
        /// Minimum count
        minimum: usize,
        /// Received count
        actual: usize,
    },

    /// A field failed codec validation.
    #[error("Invalid {field}: {source}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Codec failure
        #[source]
        source: CodecError,
    },

    /// Latitude outside [-90, 90].
    #[error("Latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180].
    #[error("Longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

fn field_error(field: &'static str) -> impl FnOnce(CodecError) -> DecodeError {
    move |source| DecodeError::InvalidField { field, source }
}

/// Decode the fields of a known event kind.
pub fn decode(kind: EventKind, fields: &[Felt]) -> Result<DomainEvent, DecodeError> {
    match kind {
        EventKind::ProfileUpdated => decode_profile_updated(fields).map(DomainEvent::ProfileUpdated),
        EventKind::MessageSent => decode_message_sent(fields).map(DomainEvent::MessageSent),
    }
}

fn decode_profile_updated(fields: &[Felt]) -> Result<ProfileUpdated, DecodeError> {
    if fields.len() != PROFILE_UPDATED_ARITY {
        return Err(DecodeError::WrongArity {
            event: PROFILE_UPDATED,
            expected: PROFILE_UPDATED_ARITY,
            actual: fields.len(),
        });
    }

    const TAG_FIELDS: [&str; 4] = ["tags0", "tags1", "tags2", "tags3"];
    let mut tags = [U256::ZERO; 4];
    for (i, tag) in tags.iter_mut().enumerate() {
        let low = fields[2 + 2 * i];
        let high = fields[3 + 2 * i];
        *tag = reconstruct_u256(low, high).map_err(field_error(TAG_FIELDS[i]))?;
    }

    let latitude = decode_degrees(fields[10]);
    if latitude.abs() > MAX_LATITUDE {
        return Err(DecodeError::LatitudeOutOfRange(latitude));
    }
    let longitude = decode_degrees(fields[11]);
    if longitude.abs() > MAX_LONGITUDE {
        return Err(DecodeError::LongitudeOutOfRange(longitude));
    }

    let pubkey = PublicKeyFelts::new(fields[12], fields[13]).map_err(field_error("pubkey"))?;

    Ok(ProfileUpdated {
        address: fields[0],
        name: short_string_to_str(fields[1]),
        tags,
        location: GeoPoint::new(longitude, latitude),
        pubkey,
    })
}

fn decode_message_sent(fields: &[Felt]) -> Result<MessageSent, DecodeError> {
    if fields.len() < MESSAGE_SENT_MIN_ARITY {
        return Err(DecodeError::TooFewFields {
            event: MESSAGE_SENT,
            minimum: MESSAGE_SENT_MIN_ARITY,
            actual: fields.len(),
        });
    }

    let payload = fields[2..].to_vec();
    validate_packed(&payload).map_err(field_error("payload"))?;

    Ok(MessageSent {
        sender: fields[0],
        recipient: fields[1],
        payload,
    })
}

/// A decoded event with its chain position.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    /// Typed event
    pub event: DomainEvent,
    /// Block number
    pub block_number: u64,
    /// Transaction hash
    pub tx_hash: Felt,
    /// Index within the transaction
    pub event_index: u64,
    /// Block timestamp
    pub timestamp: u64,
}

impl DecodedEvent {
    /// Decode a chain event.
    ///
    /// Returns `Ok(None)` for selectors that are not registry events.
    pub fn from_chain_event(event: &ChainEvent) -> Result<Option<Self>, DecodeError> {
        let Some(kind) = EventKind::from_selector(&event.selector) else {
            debug!(
                "Ignoring unknown event selector {} in tx {}",
                event.selector, event.tx_hash
            );
            return Ok(None);
        };

        Ok(Some(Self {
            event: decode(kind, &event.fields)?,
            block_number: event.block_number,
            tx_hash: event.tx_hash,
            event_index: event.event_index,
            timestamp: event.timestamp,
        }))
    }

    /// Profile row for a `ProfileUpdated` event.
    pub fn to_profile_record(&self) -> Option<ProfileRecord> {
        let DomainEvent::ProfileUpdated(profile) = &self.event else {
            return None;
        };

        Some(ProfileRecord {
            address: profile.address,
            name: profile.name.clone(),
            tags: profile.tags,
            location: profile.location,
            pubkey: profile.pubkey,
            block_number: self.block_number,
            tx_hash: self.tx_hash,
        })
    }

    /// Message row for a `MessageSent` event.
    pub fn to_message_record(&self) -> Option<MessageRecord> {
        let DomainEvent::MessageSent(message) = &self.event else {
            return None;
        };

        Some(MessageRecord {
            id: MessageRecord::message_id(self.block_number, &self.tx_hash, self.event_index),
            sender: message.sender,
            recipient: message.recipient,
            payload: message.payload.clone(),
            block_number: self.block_number,
            tx_hash: self.tx_hash,
            event_index: self.event_index,
            timestamp: self.timestamp,
        })
    }
}
