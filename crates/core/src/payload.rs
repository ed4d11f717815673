//! Variable-length byte payload packing.
//!
//! Layout: element 0 is the byte length `L`; the remaining elements carry the
//! payload in 31-byte chunks, most significant byte first. Every chunk but the
//! last is exactly 31 bytes; the last holds `L - 31 * (n - 1)` bytes and is
//! right-aligned in its felt. Leading zero bytes inside a chunk survive the
//! round trip because the unpacker knows each chunk's width from `L`.

use alloy_primitives::U256;

use crate::constants::CHUNK_BYTES;
use crate::error::{CodecError, Result};
use crate::felt::Felt;

/// Number of felts `pack_bytes` produces for a payload of `len` bytes.
pub fn packed_len(len: usize) -> usize {
    1 + len.div_ceil(CHUNK_BYTES)
}

/// Pack bytes into a length-prefixed felt sequence.
///
/// # Example
///
/// ```
/// use scrypo_core::payload::{pack_bytes, unpack_bytes};
///
/// let packed = pack_bytes(&[0u8; 45]);
/// assert_eq!(packed.len(), 3);
/// assert_eq!(unpack_bytes(&packed).unwrap(), vec![0u8; 45]);
/// ```
pub fn pack_bytes(bytes: &[u8]) -> Vec<Felt> {
    let mut felts = Vec::with_capacity(packed_len(bytes.len()));
    felts.push(Felt::from_u64(bytes.len() as u64));
    for chunk in bytes.chunks(CHUNK_BYTES) {
        // 31 bytes is at most 248 bits, always below the prime.
        felts.push(Felt::from_bounded(U256::from_be_slice(chunk)));
    }
    felts
}

/// Unpack a length-prefixed felt sequence produced by [`pack_bytes`].
///
/// # Errors
///
/// - `CodecError::MissingLengthPrefix` for an empty slice.
/// - `CodecError::PayloadLengthMismatch` when the chunk count is not
///   `ceil(L / 31)`.
/// - `CodecError::ChunkTooWide` when a chunk holds more bytes than its slot.
pub fn unpack_bytes(felts: &[Felt]) -> Result<Vec<u8>> {
    let (declared, chunks) = split_prefix(felts)?;
    let len = declared as usize;

    let mut out = Vec::with_capacity(len);
    for (index, chunk) in chunks.iter().enumerate() {
        let width = chunk_width(len, index);
        check_chunk(chunk, index, width)?;
        out.extend_from_slice(&chunk.to_be_bytes()[32 - width..]);
    }

    Ok(out)
}

/// Check that a packed sequence is well formed without materializing it.
pub fn validate_packed(felts: &[Felt]) -> Result<u64> {
    let (declared, chunks) = split_prefix(felts)?;
    for (index, chunk) in chunks.iter().enumerate() {
        check_chunk(chunk, index, chunk_width(declared as usize, index))?;
    }
    Ok(declared)
}

fn split_prefix(felts: &[Felt]) -> Result<(u64, &[Felt])> {
    let (prefix, chunks) = felts.split_first().ok_or(CodecError::MissingLengthPrefix)?;

    let declared = prefix.to_u64().ok_or(CodecError::PayloadLengthMismatch {
        declared: u64::MAX,
        expected: usize::MAX,
        actual: chunks.len(),
    })?;

    let expected = usize::try_from(declared)
        .map(|len| len.div_ceil(CHUNK_BYTES))
        .unwrap_or(usize::MAX);
    if expected != chunks.len() {
        return Err(CodecError::PayloadLengthMismatch {
            declared,
            expected,
            actual: chunks.len(),
        });
    }

    Ok((declared, chunks))
}

fn chunk_width(len: usize, index: usize) -> usize {
    (len - index * CHUNK_BYTES).min(CHUNK_BYTES)
}

fn check_chunk(chunk: &Felt, index: usize, width: usize) -> Result<()> {
    if chunk.bit_len() > width * 8 {
        return Err(CodecError::ChunkTooWide { index, width });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[test]
    fn test_roundtrip_lengths() {
        for len in [0, 1, 30, 31, 32, 61, 62, 63, 930, 931, 1000] {
            let bytes = sample(len);
            let packed = pack_bytes(&bytes);
            assert_eq!(packed.len(), packed_len(len), "len {}", len);
            assert_eq!(unpack_bytes(&packed).unwrap(), bytes, "len {}", len);
        }
    }

    #[test]
    fn test_empty_payload() {
        let packed = pack_bytes(&[]);
        assert_eq!(packed, vec![Felt::ZERO]);
        assert_eq!(unpack_bytes(&packed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_forty_five_bytes_packs_to_three() {
        let bytes = sample(45);
        let packed = pack_bytes(&bytes);
        assert_eq!(packed.len(), 3);
        assert_eq!(packed[0], Felt::from_u64(45));
        assert_eq!(unpack_bytes(&packed).unwrap(), bytes);
    }

    #[test]
    fn test_leading_zero_bytes_survive() {
        let mut bytes = vec![0u8; 40];
        bytes[35] = 0x7f;
        let packed = pack_bytes(&bytes);
        assert!(packed[1].is_zero());
        assert_eq!(unpack_bytes(&packed).unwrap(), bytes);

        let zeros = vec![0u8; 62];
        assert_eq!(unpack_bytes(&pack_bytes(&zeros)).unwrap(), zeros);
    }

    #[test]
    fn test_short_last_chunk_is_right_aligned() {
        let packed = pack_bytes(&[0xaa, 0xbb]);
        assert_eq!(packed, vec![Felt::from_u64(2), Felt::from_u64(0xaabb)]);
    }

    #[test]
    fn test_missing_prefix() {
        assert_eq!(unpack_bytes(&[]), Err(CodecError::MissingLengthPrefix));
    }

    #[test]
    fn test_chunk_count_mismatch() {
        let mut packed = pack_bytes(&sample(40));
        packed.pop();
        assert_eq!(
            unpack_bytes(&packed),
            Err(CodecError::PayloadLengthMismatch {
                declared: 40,
                expected: 2,
                actual: 1,
            })
        );

        let extra = vec![Felt::from_u64(1), Felt::from_u64(1), Felt::from_u64(1)];
        assert!(unpack_bytes(&extra).is_err());
    }

    #[test]
    fn test_chunk_too_wide_for_last_slot() {
        // Length 2 leaves a 2-byte slot; a 3-byte value cannot fit.
        let packed = vec![Felt::from_u64(2), Felt::from_u64(0x01_0000)];
        assert_eq!(
            unpack_bytes(&packed),
            Err(CodecError::ChunkTooWide { index: 0, width: 2 })
        );
        assert!(validate_packed(&packed).is_err());
    }

    #[test]
    fn test_full_chunks_keep_their_value() {
        let packed = pack_bytes(&[0xff; 62]);
        let all_ones = (U256::from(1u64) << 248usize) - U256::from(1u64);
        assert_eq!(packed[1].value(), all_ones);
        assert_eq!(packed[2].value(), all_ones);
    }

    #[test]
    fn test_validate_packed() {
        let packed = pack_bytes(&sample(100));
        assert_eq!(validate_packed(&packed).unwrap(), 100);
    }
}
