//! Serial NOR flash opcodes
//!
//! The command set is the one shared by the SST25VF and MT25 parts driven by
//! this crate. Every command is a single opcode byte, optionally followed by
//! a 24-bit big-endian address, filler bytes, and data.

use bitflags::bitflags;

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - sets the write enable latch, required before program/erase
pub const WREN: u8 = 0x06;
/// Write Disable - clears the latch and terminates auto-increment programming
pub const WRDI: u8 = 0x04;
/// Enable Write Status Register (must directly precede WRSR)
pub const EWSR: u8 = 0x50;

// ============================================================================
// Status register
// ============================================================================

/// Read Status Register
pub const RDSR: u8 = 0x05;
/// Write Status Register
pub const WRSR: u8 = 0x01;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID (manufacturer, memory type, capacity)
pub const RDID: u8 = 0x9F;

// ============================================================================
// Read
// ============================================================================

/// Read Data (no filler byte)
pub const READ: u8 = 0x03;
/// Fast Read (one filler byte after the address)
pub const FAST_READ: u8 = 0x0B;

// ============================================================================
// Program
// ============================================================================

/// Byte Program on SST25 parts, Page Program (up to one page) on MT25 parts
pub const PP: u8 = 0x02;
/// Auto Address Increment word program
pub const AAI: u8 = 0xAD;

// ============================================================================
// Erase
// ============================================================================

/// Sector Erase 4KB
pub const SE_20: u8 = 0x20;
/// Chip Erase
pub const CE_C7: u8 = 0xC7;
/// Chip Erase (alternate opcode)
pub const CE_60: u8 = 0x60;

// ============================================================================
// Framing
// ============================================================================

/// Byte clocked out while shifting in a response or padding a fast read
pub const FILLER: u8 = 0xA5;

/// Value every byte reads as after an erase
pub const ERASED_STATE: u8 = 0xFF;

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u8 {
        /// Program or erase in progress
        const BUSY = 1 << 0;
        /// Write enable latch
        const WEL  = 1 << 1;
        /// Block protect bit 0
        const BP0  = 1 << 2;
        /// Block protect bit 1
        const BP1  = 1 << 3;
        /// Block protect bit 2
        const BP2  = 1 << 4;
        /// Block protect bit 3
        const BP3  = 1 << 5;
        /// Auto address increment programming active
        const AAI  = 1 << 6;
        /// Block protect bits are read-only
        const BPL  = 1 << 7;

        /// All block protect bits
        const BP_MASK = Self::BP0.bits() | Self::BP1.bits() | Self::BP2.bits() | Self::BP3.bits();
    }
}

impl StatusFlags {
    /// Returns true if a program or erase is still running
    pub fn is_busy(&self) -> bool {
        self.contains(Self::BUSY)
    }

    /// Returns true if any region of the part is write protected
    pub fn is_protected(&self) -> bool {
        self.intersects(Self::BP_MASK)
    }
}
