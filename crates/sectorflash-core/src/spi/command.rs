//! Command header framing
//!
//! Every transaction starts with an opcode, optionally followed by a 24-bit
//! address and a filler byte. The header never exceeds five bytes, so it is
//! built in a fixed-capacity buffer and sent with a single block transfer.

use heapless::Vec;

use super::address;
use super::opcodes;

/// Maximum header length: opcode + 3 address bytes + 1 filler byte
pub const MAX_HEADER_LEN: usize = 1 + address::ADDRESS_BYTES + 1;

/// Opcode, address and filler bytes sent at the start of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
    bytes: Vec<u8, MAX_HEADER_LEN>,
}

impl CommandHeader {
    /// Create a header with only an opcode (e.g., WREN, WRDI, RDSR)
    pub fn simple(opcode: u8) -> Self {
        let mut bytes = Vec::new();
        // Capacity is never exceeded: one byte into an empty buffer
        let _ = bytes.push(opcode);
        Self { bytes }
    }

    /// Create a header with an opcode and a 3-byte address (e.g., SE, READ)
    pub fn addressed(opcode: u8, addr: u32) -> Self {
        let mut header = Self::simple(opcode);
        let _ = header.bytes.extend_from_slice(&address::encode(addr));
        header
    }

    /// Append one filler byte (used by FAST_READ)
    pub fn with_filler(mut self) -> Self {
        let _ = self.bytes.push(opcodes::FILLER);
        self
    }

    /// The opcode of this command
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// The encoded header bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
