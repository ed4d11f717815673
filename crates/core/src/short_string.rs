//! Cairo short strings (`felt252` holding up to 31 ASCII bytes).

use crate::constants::SHORT_STRING_MAX_BYTES;
use crate::error::{CodecError, Result};
use crate::felt::Felt;

/// Decode a short-string felt.
///
/// The felt is read as a big-endian byte string; leading zero padding is
/// dropped and trailing NUL or non-printable bytes are stripped.
pub fn short_string_to_str(felt: Felt) -> String {
    let bytes = felt.to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let mut text = &bytes[start..];

    while let Some((last, rest)) = text.split_last() {
        if is_printable(*last) {
            break;
        }
        text = rest;
    }

    String::from_utf8_lossy(text).into_owned()
}

/// Encode an ASCII string of at most 31 bytes as a short-string felt.
pub fn str_to_short_string(text: &str) -> Result<Felt> {
    if !text.is_ascii() {
        return Err(CodecError::InvalidShortString(format!(
            "{:?} is not ASCII",
            text
        )));
    }
    if text.len() > SHORT_STRING_MAX_BYTES {
        return Err(CodecError::InvalidShortString(format!(
            "{} bytes exceeds {}",
            text.len(),
            SHORT_STRING_MAX_BYTES
        )));
    }
    Felt::from_be_slice(text.as_bytes())
}

// Printable ASCII plus any byte of a multi-byte UTF-8 sequence.
fn is_printable(byte: u8) -> bool {
    (0x20..0x7f).contains(&byte) || byte >= 0x80
}
