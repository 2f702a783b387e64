//! Variable-length unsigned integers
//!
//! Every length, cluster number and blob number in the dirent table (and the
//! blob-end table inside each cluster) is stored as an unsigned LEB128 varint:
//! seven data bits per byte, least significant group first, high bit set on
//! every byte except the last.
//!
//! **Canonical form**: the shortest encoding is the only accepted one. A
//! multi-byte encoding whose final byte is `0x00` carries a redundant zero
//! group and is rejected with [`VarIntError::NonCanonicalEncoding`].

use thiserror::Error;

/// Longest encoding of a `u64` (ceil(64 / 7))
pub const MAX_VARINT_LEN: usize = 10;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    #[error("varint truncated: input ended mid-value")]
    TruncatedInput,

    #[error("varint overflows the target integer width")]
    Overflow,

    #[error("varint is not in canonical (shortest) form")]
    NonCanonicalEncoding,
}

/// Decode a `u64` from the start of `buf`
///
/// Returns the value and the number of bytes consumed.
pub fn decode(buf: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut value: u64 = 0;

    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        let group = u64::from(byte & 0x7f);
        let last = byte & 0x80 == 0;

        // The tenth byte only has room for the top bit of a u64
        if i == MAX_VARINT_LEN - 1 && (!last || group > 1) {
            return Err(VarIntError::Overflow);
        }

        value |= group << (7 * i);

        if last {
            if byte == 0 && i > 0 {
                return Err(VarIntError::NonCanonicalEncoding);
            }
            return Ok((value, i + 1));
        }
    }

    Err(VarIntError::TruncatedInput)
}

/// Decode a varint that must fit in 32 bits
pub fn decode_u32(buf: &[u8]) -> Result<(u32, usize), VarIntError> {
    let (value, used) = decode(buf)?;
    let value = u32::try_from(value).map_err(|_| VarIntError::Overflow)?;
    Ok((value, used))
}

/// Append the canonical encoding of `value` to `out`, returning its length
pub fn encode(mut value: u64, out: &mut Vec<u8>) -> usize {
    let mut written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        written += 1;
        if value == 0 {
            return written;
        }
    }
}

/// Number of bytes [`encode`] produces for `value`
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode(value, &mut out);
        out
    }

    #[test]
    fn test_single_byte_values() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(1), vec![0x01]);
        assert_eq!(encoded(127), vec![0x7f]);
        assert_eq!(decode(&[0x7f]).unwrap(), (127, 1));
    }

    #[test]
    fn test_multi_byte_boundaries() {
        assert_eq!(encoded(128), vec![0x80, 0x01]);
        assert_eq!(encoded(300), vec![0xac, 0x02]);
        assert_eq!(encoded(16_383), vec![0xff, 0x7f]);
        assert_eq!(encoded(16_384), vec![0x80, 0x80, 0x01]);
        assert_eq!(decode(&[0xac, 0x02]).unwrap(), (300, 2));
    }

    #[test]
    fn test_u64_max_uses_ten_bytes() {
        let bytes = encoded(u64::MAX);
        assert_eq!(bytes.len(), MAX_VARINT_LEN);
        assert_eq!(bytes[9], 0x01);
        assert_eq!(decode(&bytes).unwrap(), (u64::MAX, MAX_VARINT_LEN));
    }

    #[test]
    fn test_encoded_len_matches_encode() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(encoded_len(value), encoded(value).len(), "value {}", value);
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode(&[0x05, 0xff, 0xff]).unwrap(), (5, 1));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(decode(&[]), Err(VarIntError::TruncatedInput));
        assert_eq!(decode(&[0x80]), Err(VarIntError::TruncatedInput));
        assert_eq!(decode(&[0xff, 0xff, 0xff]), Err(VarIntError::TruncatedInput));
    }

    #[test]
    fn test_padded_encoding_rejected() {
        // 1 encoded as two bytes
        assert_eq!(decode(&[0x81, 0x00]), Err(VarIntError::NonCanonicalEncoding));
        // 0 encoded as two bytes
        assert_eq!(decode(&[0x80, 0x00]), Err(VarIntError::NonCanonicalEncoding));
    }

    #[test]
    fn test_overflow_u64() {
        // Eleven-byte run never terminates within the limit
        let mut bytes = vec![0xff; 10];
        bytes.push(0x01);
        assert_eq!(decode(&bytes), Err(VarIntError::Overflow));

        // Tenth byte carrying more than one bit
        let mut bytes = vec![0xff; 9];
        bytes.push(0x02);
        assert_eq!(decode(&bytes), Err(VarIntError::Overflow));
    }

    #[test]
    fn test_overflow_u32() {
        let bytes = encoded(u32::MAX as u64 + 1);
        assert_eq!(decode_u32(&bytes), Err(VarIntError::Overflow));

        let bytes = encoded(u32::MAX as u64);
        assert_eq!(decode_u32(&bytes).unwrap(), (u32::MAX, 5));
    }
}
