//! Key -> slot hashing
//!
//! CRC16 (XMODEM variant, polynomial 0x1021) modulo 16384, computed over the
//! hash tag when the key has one. Keys are raw bytes throughout.

/// Number of hash slots in the cluster
pub const CLUSTER_SLOTS: u16 = 16384;

/// Slot number (0..16383)
pub type Slot = u16;

const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC16-XMODEM over raw bytes
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let index = ((crc >> 8) ^ u16::from(byte)) as usize;
        (crc << 8) ^ CRC16_TABLE[index]
    })
}

/// The bytes between the first `{` and the first `}` after it, if non-empty
pub fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|&b| b == b'{')?;
    let rest = &key[open + 1..];
    let close = rest.iter().position(|&b| b == b'}')?;
    (close > 0).then(|| &rest[..close])
}

/// Slot a key belongs to
#[must_use]
pub fn calculate_slot(key: &[u8]) -> Slot {
    let hashed = hash_tag(key).unwrap_or(key);
    crc16(hashed) % CLUSTER_SLOTS
}
