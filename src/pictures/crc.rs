use crc::{Crc, CRC_32_MPEG_2};

// Polynomial 0x04C11DB7, MSB first, init 0xFFFFFFFF, no final xor.
// Cached thumbnail names written by older installs depend on this exact variant.
const THUMB_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

pub fn compute(bytes: &[u8]) -> u32 {
    THUMB_CRC.checksum(bytes)
}

/// Hash of the ASCII-lowercased text, so `A.JPG` and `a.jpg` share a cache slot.
pub fn compute_from_lower_case(text: &str) -> u32 {
    compute(text.to_ascii_lowercase().as_bytes())
}

pub fn hex(crc: u32) -> String {
    format!("{crc:08x}")
}
