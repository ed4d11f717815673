//! Coordinate quantization.
//!
//! Converts decimal degrees to signed fixed-point felts (6 decimal places)
//! and back. Negative values wrap into the field as `P + value`, so a felt
//! above `(P - 1) / 2` decodes as negative.

use alloy_primitives::U256;

use crate::constants::{DEGREE_SCALE, FIELD_PRIME, FIELD_PRIME_HALF};
use crate::error::{CodecError, Result};
use crate::felt::Felt;

/// Encode decimal degrees as a signed fixed-point felt.
///
/// The value is scaled by 10^6 and rounded half away from zero.
///
/// # Errors
///
/// - `CodecError::NonFiniteDegrees` for NaN or infinities.
/// - `CodecError::DegreesOutOfRange` when the scaled magnitude exceeds
///   `(P - 1) / 2`.
///
/// # Example
///
/// ```
/// use scrypo_core::degrees::{decode_degrees, encode_degrees};
///
/// let felt = encode_degrees(-122.4194).unwrap();
/// assert_eq!(decode_degrees(felt), -122.4194);
/// ```
pub fn encode_degrees(degrees: f64) -> Result<Felt> {
    if !degrees.is_finite() {
        return Err(CodecError::NonFiniteDegrees);
    }

    let scaled = (degrees * DEGREE_SCALE).round();
    if !scaled.is_finite() {
        return Err(CodecError::DegreesOutOfRange(degrees));
    }

    let magnitude = integral_f64_to_u256(scaled.abs());
    if magnitude > FIELD_PRIME_HALF {
        return Err(CodecError::DegreesOutOfRange(degrees));
    }

    let value = if scaled < 0.0 && !magnitude.is_zero() {
        FIELD_PRIME - magnitude
    } else {
        magnitude
    };

    Felt::new(value)
}

/// Decode a signed fixed-point felt back to decimal degrees.
pub fn decode_degrees(felt: Felt) -> f64 {
    let (negative, magnitude) = signed_parts(felt);
    let degrees = u256_to_f64(magnitude) / DEGREE_SCALE;
    if negative {
        -degrees
    } else {
        degrees
    }
}

/// Split a felt into sign and magnitude using the half-field convention.
pub fn signed_parts(felt: Felt) -> (bool, U256) {
    let value = felt.value();
    if value <= FIELD_PRIME_HALF {
        (false, value)
    } else {
        (true, FIELD_PRIME - value)
    }
}

// Exact conversion of a non-negative integral f64 to U256 via its mantissa
// and exponent. `value` must be finite, non-negative and integral.
fn integral_f64_to_u256(value: f64) -> U256 {
    if value == 0.0 {
        return U256::ZERO;
    }

    let bits = value.to_bits();
    let biased_exponent = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1u64 << 52) - 1);

    let (mantissa, exponent) = if biased_exponent == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased_exponent - 1075)
    };

    let mantissa = U256::from(mantissa);
    if exponent >= 0 {
        if exponent >= 256 {
            return U256::MAX;
        }
        mantissa << (exponent as usize)
    } else {
        let shift = (-exponent) as usize;
        if shift >= 64 {
            return U256::ZERO;
        }
        mantissa >> shift
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0f64, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}
