//! 24-bit address framing

/// Number of address bytes sent after an addressed opcode
pub const ADDRESS_BYTES: usize = 3;

/// Largest address reachable with 3-byte addressing (16 MiB - 1)
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

/// Encode an address as three big-endian bytes
///
/// Only the low 24 bits are sent; callers are expected to have checked the
/// address against the part's size.
pub const fn encode(address: u32) -> [u8; ADDRESS_BYTES] {
    [(address >> 16) as u8, (address >> 8) as u8, address as u8]
}

/// Returns true if `len` bytes starting at `address` fit in 24-bit addressing
pub const fn fits(address: u32, len: usize) -> bool {
    if len == 0 {
        return address <= MAX_ADDRESS + 1;
    }
    let end = address as u64 + len as u64 - 1;
    end <= MAX_ADDRESS as u64
}
