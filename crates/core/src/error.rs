//! Error types for the codec crate.

use thiserror::Error;

/// Codec error type.
///
/// Every variant rejects a single value; callers never see partially decoded
/// output alongside an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Value is not below the field prime.
    #[error("Value {0} is not a field element (must be below the Starknet prime)")]
    NotAFieldElement(String),

    /// Invalid hex or decimal encoding.
    #[error("Invalid felt encoding: {0}")]
    InvalidEncoding(String),

    /// Public key is not exactly 32 bytes.
    #[error("Invalid public key length: {0} (must be 32 bytes)")]
    InvalidKeyLength(usize),

    /// A public key half does not fit in 16 bytes.
    #[error("Public key half is {0} bits wide (must fit in 128 bits)")]
    KeyHalfTooWide(usize),

    /// NaN or infinite coordinate.
    #[error("Coordinate is not a finite number")]
    NonFiniteDegrees,

    /// Scaled coordinate does not fit in the signed half of the field.
    #[error("Coordinate {0} is outside the representable range")]
    DegreesOutOfRange(f64),

    /// Packed payload chunk count does not match its length prefix.
    #[error("Packed payload declares {declared} bytes ({expected} chunks) but carries {actual} chunks")]
    PayloadLengthMismatch {
        /// Byte length from the prefix element.
        declared: u64,
        /// Chunks implied by the prefix.
        expected: usize,
        /// Chunks present.
        actual: usize,
    },

    /// Packed payload is missing its length prefix.
    #[error("Packed payload is empty (missing length prefix)")]
    MissingLengthPrefix,

    /// A payload chunk holds more bytes than its slot allows.
    #[error("Payload chunk {index} does not fit in {width} bytes")]
    ChunkTooWide {
        /// Position of the chunk (0-based, excluding the prefix).
        index: usize,
        /// Width the chunk must fit in.
        width: usize,
    },

    /// A u256 half does not fit in 128 bits.
    #[error("u256 {0} half does not fit in 128 bits")]
    U256HalfTooWide(&'static str),

    /// Short string longer than 31 bytes or not ASCII.
    #[error("Invalid short string: {0}")]
    InvalidShortString(String),
}

/// Result type alias for CodecError.
pub type Result<T> = std::result::Result<T, CodecError>;
