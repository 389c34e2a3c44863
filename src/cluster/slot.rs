//! Hash slot calculation
//!
//! CRC16 (XMODEM) over the key bytes, modulo the fixed slot count, honoring
//! the `{...}` hash tag convention so callers can force related keys into the
//! same slot.

/// Number of hash slots in a cluster
pub const SLOT_COUNT: u16 = 16384;

/// Calculate the hash slot for a key
///
/// If the key contains a `{` followed by a matching `}` with at least one
/// byte between them, only that substring is hashed. Deterministic and
/// stateless.
pub fn slot_for_key(key: &[u8]) -> u16 {
    crc16(hash_tag(key)) % SLOT_COUNT
}

/// Extract the hash-tag substring, or the whole key when no valid tag exists
fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        if let Some(end) = key[start + 1..].iter().position(|&b| b == b'}') {
            if end > 0 {
                return &key[start + 1..start + 1 + end];
            }
        }
    }
    key
}

/// CRC16/XMODEM, the checksum cluster slot assignment is defined over
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
